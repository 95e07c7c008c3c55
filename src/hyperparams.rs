//! The ordered name → value mapping sampled for one trial.

use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;

/// One sampled hyperparameter together with the domain it was drawn from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Parameter name.
    pub name: String,
    /// Sampled value.
    pub value: ParamValue,
    /// The distribution the value was drawn from.
    pub distribution: Distribution,
}

/// An ordered mapping from parameter name to sampled value.
///
/// Iteration order is sampling order. Conditional parameters that were never
/// sampled are simply absent.
///
/// # Examples
///
/// ```
/// use skin_search::Trial;
/// use skin_search::parameter::{IntParam, Parameter};
///
/// let mut trial = Trial::new(0);
/// IntParam::new("batch_size", 1, 15).suggest(&mut trial).unwrap();
/// let config = trial.config();
/// assert!(config.int("batch_size").is_ok());
/// assert!(config.int("dropout").is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterConfiguration {
    entries: Vec<ParamEntry>,
}

impl HyperparameterConfiguration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: &str, value: ParamValue, distribution: Distribution) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.value = value;
            entry.distribution = distribution;
        } else {
            self.entries.push(ParamEntry {
                name: name.to_string(),
                value,
                distribution,
            });
        }
    }

    /// Returns the raw value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entry(name).map(|e| &e.value)
    }

    /// Returns the distribution `name` was drawn from.
    #[must_use]
    pub fn distribution(&self, name: &str) -> Option<&Distribution> {
        self.entry(name).map(|e| &e.distribution)
    }

    fn entry(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Returns `true` if `name` was sampled.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Iterates over entries in sampling order.
    pub fn iter(&self) -> impl Iterator<Item = &ParamEntry> {
        self.entries.iter()
    }

    /// Number of sampled parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was sampled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn require(&self, name: &str) -> Result<&ParamValue> {
        self.get(name)
            .ok_or_else(|| Error::Configuration(format!("missing hyperparameter '{name}'")))
    }

    /// Typed integer getter.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `name` is absent or not an integer.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(wrong_type(name, "an integer", other)),
        }
    }

    /// Typed float getter. Integers are widened.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `name` is absent or not numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn float(&self, name: &str) -> Result<f64> {
        match self.require(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(wrong_type(name, "a float", other)),
        }
    }

    /// Typed boolean getter.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `name` is absent or not a boolean.
    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.require(name)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(wrong_type(name, "a boolean", other)),
        }
    }

    /// Typed string getter.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `name` is absent or not a string.
    pub fn str(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            ParamValue::Str(v) => Ok(v),
            other => Err(wrong_type(name, "a string", other)),
        }
    }
}

fn wrong_type(name: &str, expected: &str, got: &ParamValue) -> Error {
    Error::Configuration(format!("hyperparameter '{name}' should be {expected}, got {got:?}"))
}

impl core::fmt::Display for HyperparameterConfiguration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("{")?;
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", e.name, e.value)?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a HyperparameterConfiguration {
    type Item = &'a ParamEntry;
    type IntoIter = core::slice::Iter<'a, ParamEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{CategoricalDistribution, IntDistribution};

    fn int_dist(low: i64, high: i64) -> Distribution {
        Distribution::Int(IntDistribution { low, high })
    }

    #[test]
    fn preserves_sampling_order() {
        let mut c = HyperparameterConfiguration::new();
        c.insert("batch_size", ParamValue::Int(4), int_dist(1, 15));
        c.insert("num_dense_layers", ParamValue::Int(2), int_dist(0, 3));
        c.insert("num_neurons_L1", ParamValue::Int(120), int_dist(10, 300));
        let names: Vec<_> = c.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["batch_size", "num_dense_layers", "num_neurons_L1"]);
    }

    #[test]
    fn typed_getters_check_types() {
        let mut c = HyperparameterConfiguration::new();
        c.insert("batch_size", ParamValue::Int(4), int_dist(1, 15));
        c.insert(
            "activation",
            ParamValue::Str("elu".into()),
            Distribution::Categorical(CategoricalDistribution {
                choices: vec!["tanh".into(), "elu".into(), "swish".into()],
            }),
        );
        assert_eq!(c.int("batch_size").unwrap(), 4);
        assert!((c.float("batch_size").unwrap() - 4.0).abs() < f64::EPSILON);
        assert_eq!(c.str("activation").unwrap(), "elu");
        assert!(matches!(c.bool("activation"), Err(Error::Configuration(_))));
        assert!(matches!(c.int("regul"), Err(Error::Configuration(_))));
    }

    #[test]
    fn display_lists_name_value_pairs() {
        let mut c = HyperparameterConfiguration::new();
        c.insert("batch_size", ParamValue::Int(4), int_dist(1, 15));
        c.insert("regul", ParamValue::Bool(false), int_dist(0, 1));
        assert_eq!(c.to_string(), "{'batch_size': 4, 'regul': False}");
    }
}
