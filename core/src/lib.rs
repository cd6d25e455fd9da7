//! Pension filing reconciliation pipeline.
//!
//! Joins an annual actuarial-schedule batch to its parent plan-filing
//! batch, validates and enriches each plan, and rolls plans up to the
//! sponsoring employer. See `engine` for the stage order.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod firm_names;
pub mod industry;
pub mod master_subsystem;
pub mod merge_subsystem;
pub mod normalizer_subsystem;
pub mod rollup_subsystem;
pub mod store;
pub mod subsystem;
pub mod summary;
pub mod types;
pub mod validation_subsystem;
