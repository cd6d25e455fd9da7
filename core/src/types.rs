//! Shared primitive types used across the entire pipeline.
//!
//! RULE: a missing value is never a zero. Raw cells normalize to a
//! three-state `Field`, derived numbers to a two-state `Derived`.

use serde::{Deserialize, Serialize};

/// The canonical run identifier.
pub type RunId = String;

/// Filing acknowledgment identifier (the primary join key).
pub type AckId = String;

/// Employer identification number of the plan sponsor.
pub type Ein = String;

/// A normalized raw cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    /// The cell held a value that passed its coercion rule.
    Present(T),
    /// The cell was blank or held a "not reported" marker.
    Absent,
    /// The cell held text that failed its coercion rule; the raw text is kept.
    Rejected(String),
}

impl<T> Field<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Field::Rejected(_))
    }

    pub fn rejected_raw(&self) -> Option<&str> {
        match self {
            Field::Rejected(raw) => Some(raw),
            _ => None,
        }
    }
}

impl<T: Copy> Field<T> {
    pub fn value(&self) -> Option<T> {
        self.present().copied()
    }
}

/// A derived metric: a finite value or an explicit "undefined" marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Derived<T> {
    Value(T),
    Undefined,
}

impl<T: Copy> Derived<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Derived::Value(v) => Some(*v),
            Derived::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Derived::Undefined)
    }
}

impl Derived<f64> {
    /// `numerator / denominator`, undefined unless both are known, the
    /// denominator is positive and the quotient is finite.
    pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Self {
        match (numerator, denominator) {
            (Some(n), Some(d)) if d > 0.0 => {
                let q = n / d;
                if q.is_finite() {
                    Derived::Value(q)
                } else {
                    Derived::Undefined
                }
            }
            _ => Derived::Undefined,
        }
    }
}
