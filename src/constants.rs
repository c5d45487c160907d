//! # Constants and type definitions for Blendfit
//!
//! This module centralizes the **physical constants**, **photometric conversion factors**,
//! and **common type aliases** used throughout the `blendfit` library.
//!
//! ## Overview
//!
//! - Physical constants (speed of light, natural log of 10)
//! - Default calibrated prior parameters for the early/late/irregular template classes
//! - Core type aliases used across the crate (redshift, magnitude, flux, log-probability)

// -------------------------------------------------------------------------------------------------
// Physical constants and conversions
// -------------------------------------------------------------------------------------------------

/// Speed of light in km/s
pub const VLIGHT: f64 = 2.99792458e5;

/// Natural logarithm of 10, used by the magnitude number-count prior
pub const LN_10: f64 = std::f64::consts::LN_10;

/// Pogson ratio: `flux = 10^(-POGSON * mag)`
pub const POGSON: f64 = 0.4;

/// Logarithmic slope of the galaxy number counts used by the magnitude prior
pub const NUMBER_COUNT_SLOPE: f64 = 0.6;

/// Current on-disk snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Calibrated prior parameters for the `early`, `late`, `irr` template classes, in the
/// flat order `k_t(early, late), f_t(early, late), alpha_t(x3), z_0t(x3), k_mt(x3)`.
pub const DEFAULT_PRIOR_PARAMS: [f64; 13] = [
    0.450, 0.147, // k_t
    0.35, 0.50, // f_t
    2.465, 1.806, 0.906, // alpha_t
    0.431, 0.390, 0.0626, // z_0t
    0.0913, 0.0636, 0.123, // k_mt
];

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Cosmological redshift (dimensionless)
pub type Redshift = f64;
/// Apparent magnitude (AB-like, relative zero point)
pub type Magnitude = f64;
/// Flux in units where `flux = 10^(-0.4 mag)`
pub type Flux = f64;
/// Natural-log probability density
pub type LogProb = f64;
/// Distance in megaparsecs
pub type Megaparsec = f64;
