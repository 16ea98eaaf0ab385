//! Integer-or-percentage values for disruption budgets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BudgetError;

/// An absolute count or a percentage string such as `"25%"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(i64),
    String(String),
}

impl IntOrPercent {
    /// Resolve against `total`. Percentages round down.
    pub fn resolve(&self, total: usize) -> Result<usize, BudgetError> {
        match self {
            Self::Int(n) => usize::try_from(*n).map_err(|_| BudgetError::Negative(*n)),
            Self::String(s) => {
                let pct = s
                    .strip_suffix('%')
                    .and_then(|digits| digits.parse::<i64>().ok())
                    .ok_or_else(|| BudgetError::InvalidFormat(s.clone()))?;
                if pct < 0 {
                    return Err(BudgetError::Negative(pct));
                }
                let pct = pct as u128;
                Ok((pct * total as u128 / 100) as usize)
            }
        }
    }
}

impl From<i64> for IntOrPercent {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for IntOrPercent {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl fmt::Display for IntOrPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}
