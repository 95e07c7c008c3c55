//! Kernel density estimation used by the TPE sampler.

mod univariate;

pub(crate) use univariate::KernelDensityEstimator;
