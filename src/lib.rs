//! Bayesian inference of redshifts, magnitudes and templates for photometric sources that may
//! be blends of several galaxies.
//!
//! The entry point is [`photoz::Photoz`]; the building blocks ([`prior`], [`mapping`],
//! [`posterior`], [`prior_transform`], [`evidence`]) can also be used on their own.
pub mod blendfit_errors;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod conversion;
pub mod cosmology;
pub mod evidence;
pub mod mapping;
pub mod nested_sampling;
pub mod photometry;
pub mod photoz;
pub mod posterior;
pub mod prior;
pub mod prior_transform;
#[cfg(feature = "progress")]
mod progress;
pub mod responses;
pub mod snapshot;
pub mod templates;
