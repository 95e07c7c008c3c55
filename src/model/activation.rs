use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Element-wise activation of a dense layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Hyperbolic tangent.
    Tanh,
    /// Exponential linear unit with `alpha = 1`.
    Elu,
    /// `x · sigmoid(x)`.
    Swish,
    /// Logistic function; used by the output unit.
    Sigmoid,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Activation {
    /// Hidden-layer activations the search space may choose from.
    pub const HIDDEN: [Activation; 3] = [Activation::Tanh, Activation::Elu, Activation::Swish];

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Elu => "elu",
            Activation::Swish => "swish",
            Activation::Sigmoid => "sigmoid",
        }
    }

    pub(crate) fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Elu => {
                if x > 0.0 {
                    x
                } else {
                    x.exp_m1()
                }
            }
            Activation::Swish => x * sigmoid(x),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative with respect to the pre-activation `z`.
    pub(crate) fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::Tanh => {
                let t = z.tanh();
                1.0 - t * t
            }
            Activation::Elu => {
                if z > 0.0 {
                    1.0
                } else {
                    z.exp()
                }
            }
            Activation::Swish => {
                let s = sigmoid(z);
                s + z * s * (1.0 - s)
            }
            Activation::Sigmoid => {
                let s = sigmoid(z);
                s * (1.0 - s)
            }
        }
    }
}

impl core::fmt::Display for Activation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tanh" => Ok(Activation::Tanh),
            "elu" => Ok(Activation::Elu),
            "swish" => Ok(Activation::Swish),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(Error::Configuration(format!("unknown activation '{other}'"))),
        }
    }
}
