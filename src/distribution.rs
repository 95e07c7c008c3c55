//! Parameter distribution types.

use serde::{Deserialize, Serialize};

use crate::param::ParamValue;

/// Distribution for floating-point parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatDistribution {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
}

/// Distribution for integer parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntDistribution {
    /// Lower bound (inclusive).
    pub low: i64,
    /// Upper bound (inclusive).
    pub high: i64,
}

/// Distribution for categorical parameters.
///
/// Samplers work on choice indices; the trial maps the index back to the
/// stored choice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoricalDistribution {
    /// The available choices, in declaration order.
    pub choices: Vec<ParamValue>,
}

impl CategoricalDistribution {
    /// Returns the index of `value` among the choices.
    #[must_use]
    pub fn index_of(&self, value: &ParamValue) -> Option<usize> {
        self.choices.iter().position(|c| c == value)
    }
}

/// Enum wrapping all parameter distribution types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// A floating-point distribution.
    Float(FloatDistribution),
    /// An integer distribution.
    Int(IntDistribution),
    /// A categorical distribution.
    Categorical(CategoricalDistribution),
}

impl Distribution {
    /// Returns `true` if `value` lies inside this distribution's domain.
    #[must_use]
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Distribution::Float(d), ParamValue::Float(v)) => *v >= d.low && *v <= d.high,
            (Distribution::Int(d), ParamValue::Int(v)) => *v >= d.low && *v <= d.high,
            (Distribution::Categorical(d), v) => d.index_of(v).is_some(),
            _ => false,
        }
    }
}
