//! Named parameter definitions and the [`Parameter`] trait.
//!
//! A parameter knows its name, the distribution it samples from, and how to
//! turn a raw [`ParamValue`] back into a typed value. Suggesting the same name
//! twice within a trial returns the cached value as long as the distribution
//! is identical.
//!
//! # Example
//!
//! ```
//! use skin_search::Trial;
//! use skin_search::parameter::{BoolParam, FloatParam, IntParam, Parameter};
//!
//! let mut trial = Trial::new(0);
//!
//! let layers = IntParam::new("num_dense_layers", 0, 3).suggest(&mut trial).unwrap();
//! let dropout = FloatParam::new("dropout", 0.1, 0.9).suggest(&mut trial).unwrap();
//! let regul = BoolParam::new("regul").suggest(&mut trial).unwrap();
//! assert!((0..=3).contains(&layers));
//! assert!((0.1..=0.9).contains(&dropout));
//! let _ = regul;
//! ```

use core::fmt::Debug;

use crate::distribution::{
    CategoricalDistribution, Distribution, FloatDistribution, IntDistribution,
};
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::trial::Trial;

/// A named, typed hyperparameter that can be suggested by a [`Trial`].
pub trait Parameter: Debug {
    /// The typed value returned after sampling.
    type Value;

    /// The parameter name under which the value is stored.
    fn name(&self) -> &str;

    /// Returns the distribution that this parameter samples from.
    fn distribution(&self) -> Distribution;

    /// Converts a raw [`ParamValue`] into the typed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the variant doesn't match.
    fn cast_param_value(&self, param_value: &ParamValue) -> Result<Self::Value>;

    /// Validates the parameter configuration before sampling.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter configuration is invalid.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Suggests a value for this parameter from the given trial.
    ///
    /// # Errors
    ///
    /// See [`Trial::suggest_param`].
    fn suggest(&self, trial: &mut Trial) -> Result<Self::Value>
    where
        Self: Sized,
    {
        trial.suggest_param(self)
    }
}

fn mistyped(name: &str, expected: &str, got: &ParamValue) -> Error {
    Error::Configuration(format!("parameter '{name}' should be {expected}, got {got:?}"))
}

/// A floating-point parameter sampled uniformly from `[low, high]`.
#[derive(Clone, Debug)]
pub struct FloatParam {
    name: String,
    low: f64,
    high: f64,
}

impl FloatParam {
    /// Creates a new float parameter with the given bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }
}

impl Parameter for FloatParam {
    type Value = f64;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Float(FloatDistribution { low: self.low, high: self.high })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<f64> {
        match param_value {
            ParamValue::Float(v) => Ok(*v),
            other => Err(mistyped(&self.name, "a float", other)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.low.is_nan() || self.high.is_nan() || self.low > self.high {
            return Err(Error::InvalidBounds {
                name: self.name.clone(),
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// An integer parameter sampled uniformly from `[low, high]`.
///
/// Bounds are inclusive on both ends. A degenerate range (`low == high`) is
/// allowed and always yields `low`, which happens for conditional widths such
/// as `[L1 / 4, L1]` when `L1` is small.
#[derive(Clone, Debug)]
pub struct IntParam {
    name: String,
    low: i64,
    high: i64,
}

impl IntParam {
    /// Creates a new integer parameter with the given bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }
}

impl Parameter for IntParam {
    type Value = i64;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Int(IntDistribution { low: self.low, high: self.high })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<i64> {
        match param_value {
            ParamValue::Int(v) => Ok(*v),
            other => Err(mistyped(&self.name, "an integer", other)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn validate(&self) -> Result<()> {
        if self.low > self.high {
            return Err(Error::InvalidBounds {
                name: self.name.clone(),
                low: self.low as f64,
                high: self.high as f64,
            });
        }
        Ok(())
    }
}

/// A categorical parameter that selects one of a fixed list of values.
///
/// # Example
///
/// ```
/// use skin_search::Trial;
/// use skin_search::ParamValue;
/// use skin_search::parameter::{CategoricalParam, Parameter};
///
/// let mut trial = Trial::new(0);
/// let act = CategoricalParam::new("activation", ["tanh", "elu", "swish"])
///     .suggest(&mut trial)
///     .unwrap();
/// assert!(matches!(act, ParamValue::Str(_)));
/// ```
#[derive(Clone, Debug)]
pub struct CategoricalParam {
    name: String,
    choices: Vec<ParamValue>,
}

impl CategoricalParam {
    /// Creates a new categorical parameter with the given choices.
    #[must_use]
    pub fn new<I, T>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ParamValue>,
    {
        Self {
            name: name.into(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}

impl Parameter for CategoricalParam {
    type Value = ParamValue;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Categorical(CategoricalDistribution {
            choices: self.choices.clone(),
        })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<ParamValue> {
        if self.choices.contains(param_value) {
            Ok(param_value.clone())
        } else {
            Err(mistyped(&self.name, "one of the declared choices", param_value))
        }
    }

    fn validate(&self) -> Result<()> {
        if self.choices.is_empty() {
            return Err(Error::EmptyChoices(self.name.clone()));
        }
        Ok(())
    }
}

/// A boolean parameter (a categorical over `[false, true]`).
#[derive(Clone, Debug)]
pub struct BoolParam {
    name: String,
}

impl BoolParam {
    /// Creates a new boolean parameter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Parameter for BoolParam {
    type Value = bool;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Categorical(CategoricalDistribution {
            choices: vec![ParamValue::Bool(false), ParamValue::Bool(true)],
        })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<bool> {
        match param_value {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(mistyped(&self.name, "a boolean", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_rejects_inverted_bounds() {
        let err = FloatParam::new("x", 1.0, 0.0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidBounds { .. }));
    }

    #[test]
    fn float_rejects_nan_bounds() {
        assert!(FloatParam::new("x", f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn degenerate_int_range_is_valid() {
        assert!(IntParam::new("num_neurons_L2", 2, 2).validate().is_ok());
    }

    #[test]
    fn empty_categorical_is_rejected() {
        let p = CategoricalParam::new("activation", Vec::<&str>::new());
        assert!(matches!(p.validate(), Err(Error::EmptyChoices(_))));
    }

    #[test]
    fn bool_cast_rejects_other_variants() {
        let p = BoolParam::new("regul");
        assert!(p.cast_param_value(&ParamValue::Bool(true)).unwrap());
        assert!(matches!(
            p.cast_param_value(&ParamValue::Int(1)),
            Err(Error::Configuration(_))
        ));
    }
}
