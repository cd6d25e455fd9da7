//! Pipeline stage trait.
//!
//! RULE: Every component implements PipelineStage.
//! The engine calls run() on each stage exactly once per run,
//! in the order documented in engine.rs. Data flows forward only:
//! a stage never sees the output of a later stage.

use crate::{error::PipelineResult, event::PipelineEvent};

/// The contract every pipeline component must fulfill.
pub trait PipelineStage {
    /// What the stage consumes (borrowed from the previous stage's output).
    type Input<'a>;
    /// What the stage hands to the next one.
    type Output;

    /// Unique stable name for this stage.
    fn name(&self) -> &'static str;

    /// Called once per run by the engine.
    ///
    /// - `input`:  the previous stage's output
    /// - `events`: the run event log; stages append, never read
    fn run(
        &self,
        input: Self::Input<'_>,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<Self::Output>;
}
