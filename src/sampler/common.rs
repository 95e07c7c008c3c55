//! Distribution-level helpers shared by the samplers.

use crate::distribution::Distribution;
use crate::param::ParamValue;
use crate::rng_util;

/// Bounds of a numeric distribution as floats.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn internal_bounds(distribution: &Distribution) -> Option<(f64, f64)> {
    match distribution {
        Distribution::Float(d) => Some((d.low, d.high)),
        Distribution::Int(d) => Some((d.low as f64, d.high as f64)),
        Distribution::Categorical(_) => None,
    }
}

/// Maps a float back onto the distribution, rounding integers and clamping
/// into bounds.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn from_internal(value: f64, distribution: &Distribution) -> Option<ParamValue> {
    match distribution {
        Distribution::Float(d) => Some(ParamValue::Float(value.clamp(d.low, d.high))),
        Distribution::Int(d) => Some(ParamValue::Int((value.round() as i64).clamp(d.low, d.high))),
        Distribution::Categorical(_) => None,
    }
}

/// Internal-space representation of a stored value.
///
/// Returns `None` when the value does not belong to this distribution, which
/// is how observations from other (conditional) domains are ignored.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn to_internal(value: &ParamValue, distribution: &Distribution) -> Option<f64> {
    if !distribution.contains(value) {
        return None;
    }
    match (value, distribution) {
        (ParamValue::Float(v), Distribution::Float(_)) => Some(*v),
        (ParamValue::Int(v), Distribution::Int(_)) => Some(*v as f64),
        _ => None,
    }
}

/// Uniform draw from any distribution.
pub(crate) fn sample_random(rng: &mut fastrand::Rng, distribution: &Distribution) -> ParamValue {
    match distribution {
        Distribution::Float(d) => ParamValue::Float(rng_util::f64_range(rng, d.low, d.high)),
        Distribution::Int(d) => ParamValue::Int(rng.i64(d.low..=d.high)),
        Distribution::Categorical(d) => d.choices[rng.usize(..d.choices.len())].clone(),
    }
}
