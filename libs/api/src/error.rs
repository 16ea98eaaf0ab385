//! Validation errors for selectors and disruption budgets.

use thiserror::Error;

/// A label selector that cannot be compiled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// A requirement has an empty key.
    #[error("selector requirement has an empty key")]
    EmptyKey,

    /// `In`/`NotIn` without any values.
    #[error("operator {operator} on key {key:?} requires at least one value")]
    MissingValues { key: String, operator: String },

    /// `Exists`/`DoesNotExist` with values.
    #[error("operator {operator} on key {key:?} must not carry values")]
    UnexpectedValues { key: String, operator: String },
}

/// A disruption budget that does not resolve to a usable count.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// The string form is not `NN%`.
    #[error("invalid value for int-or-percent: {0:?}")]
    InvalidFormat(String),

    /// Negative counts and percentages are rejected.
    #[error("disruption budget must not be negative, got {0}")]
    Negative(i64),
}
