//! # Run configuration
//!
//! This module defines [`Configuration`], the immutable set of numeric bounds, band indices,
//! correlation and cosmology parameters consumed by every stage of a sampling run, together
//! with its validating [`ConfigurationBuilder`].
//!
//! ## Example
//!
//! ```rust
//! use blendfit::config::Configuration;
//!
//! let config = Configuration::builder()
//!     .num_bands(6)
//!     .ref_band(vec![2])
//!     .select_band(vec![2])
//!     .ref_mag_lo(20.0)
//!     .ref_mag_hi(32.0)
//!     .sort_redshifts(false)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.non_ref_bands, vec![0, 1, 3, 4, 5]);
//! ```
//!
//! ## Notes
//!
//! * The configuration is read-only for the duration of a sampling run. Any change to the
//!   magnitude or redshift bounds requires rebuilding the prior model so that its redshift
//!   normalization grid is recomputed.
//! * `non_ref_bands` is derived from `num_bands` and `ref_band` at build time.
use serde::{Deserialize, Serialize};

use crate::{blendfit_errors::BlendfitError, constants::DEFAULT_PRIOR_PARAMS, conversion::linspace};

/// Configuration shared by the prior model, the posterior evaluator and the orchestrator.
///
/// Fields
/// -----------------
/// **Parameter bounds**
/// * `z_lo`, `z_hi` – redshift range explored by the sampler.
/// * `z_len` – number of points of the redshift grid used for prior normalization.
/// * `ref_mag_lo`, `ref_mag_hi` – reference magnitude range; also the range of the
///   redshift-prior normalization grid.
///
/// **Bands**
/// * `num_bands` – number of photometric bands (measurements).
/// * `ref_band` – reference band(s): a single shared band, or one per component.
/// * `select_band` – band(s) carrying the selection effect.
/// * `non_ref_bands` – every band that is not a reference band (derived).
///
/// **Blending**
/// * `sort_redshifts` – break the label-switching degeneracy by redshift (`true`) or by
///   magnitude (`false`).
/// * `r0`, `gamma` – galaxy-galaxy correlation function `(r0 / r)^gamma`, `r0` in Mpc.
/// * `xi_r_cutoff` – small-scale separation cutoff in Mpc.
///
/// **Cosmology**
/// * `omega_mat`, `omega_lam`, `omega_k`, `hubble` – background cosmology (`hubble` is `h`).
///
/// **Prior / selection**
/// * `magnitude_limit` – detection limit of the catalogue in the selection band.
/// * `mag_grid_len` – number of magnitudes in the redshift-prior normalization grid.
/// * `prior_params` – flat prior parameter vector of length `5 * num_types - 2`.
///
/// **Catalogue layout**
/// * `mag_cols`, `sigma_cols` – zero-based catalogue columns of magnitudes and their errors.
/// * `spec_z_col` – optional column holding a spectroscopic (truth) redshift.
/// * `zero_point_errors` – per-band zero-point error in magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub z_lo: f64,
    pub z_hi: f64,
    pub z_len: usize,
    pub ref_mag_lo: f64,
    pub ref_mag_hi: f64,

    pub num_bands: usize,
    pub ref_band: Vec<usize>,
    pub select_band: Vec<usize>,
    pub non_ref_bands: Vec<usize>,

    pub sort_redshifts: bool,
    pub r0: f64,
    pub gamma: f64,
    pub xi_r_cutoff: f64,

    pub omega_mat: f64,
    pub omega_lam: f64,
    pub omega_k: f64,
    pub hubble: f64,

    pub magnitude_limit: f64,
    pub mag_grid_len: usize,
    pub prior_params: Vec<f64>,

    pub mag_cols: Vec<usize>,
    pub sigma_cols: Vec<usize>,
    pub spec_z_col: Option<usize>,
    pub zero_point_errors: Vec<f64>,
}

impl Configuration {
    /// Create a new [`ConfigurationBuilder`] initialized with default values.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Linearly spaced redshift grid over `[z_lo, z_hi]` with `z_len` points.
    pub fn z_grid(&self) -> Vec<f64> {
        linspace(self.z_lo, self.z_hi, self.z_len)
    }

    /// `true` when the selection band coincides with the reference band(s).
    pub fn selection_is_reference(&self) -> bool {
        self.ref_band == self.select_band
    }

    /// `true` when every component shares a single reference band.
    pub fn single_ref_band(&self) -> bool {
        self.ref_band.len() == 1
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            z_lo: 0.0,
            z_hi: 10.0,
            z_len: 1000,
            ref_mag_lo: 20.0,
            ref_mag_hi: 32.0,

            num_bands: 1,
            ref_band: vec![0],
            select_band: vec![0],
            non_ref_bands: Vec::new(),

            sort_redshifts: true,
            r0: 5.0,
            gamma: 1.77,
            xi_r_cutoff: 0.1,

            omega_mat: 0.3,
            omega_lam: 0.7,
            omega_k: 0.0,
            hubble: 0.7,

            magnitude_limit: 32.0,
            mag_grid_len: 100,
            prior_params: DEFAULT_PRIOR_PARAMS.to_vec(),

            mag_cols: vec![0],
            sigma_cols: vec![1],
            spec_z_col: None,
            zero_point_errors: vec![0.01],
        }
    }
}

/// Builder for [`Configuration`], with validation.
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    config: Configuration,
    zero_point_errors_set: bool,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
            zero_point_errors_set: false,
        }
    }

    // --- Bounds ---
    pub fn z_lo(mut self, v: f64) -> Self {
        self.config.z_lo = v;
        self
    }
    pub fn z_hi(mut self, v: f64) -> Self {
        self.config.z_hi = v;
        self
    }
    pub fn z_len(mut self, v: usize) -> Self {
        self.config.z_len = v;
        self
    }
    pub fn ref_mag_lo(mut self, v: f64) -> Self {
        self.config.ref_mag_lo = v;
        self
    }
    pub fn ref_mag_hi(mut self, v: f64) -> Self {
        self.config.ref_mag_hi = v;
        self
    }

    // --- Bands ---
    pub fn num_bands(mut self, v: usize) -> Self {
        self.config.num_bands = v;
        self
    }
    pub fn ref_band(mut self, v: Vec<usize>) -> Self {
        self.config.ref_band = v;
        self
    }
    pub fn select_band(mut self, v: Vec<usize>) -> Self {
        self.config.select_band = v;
        self
    }

    // --- Blending ---
    pub fn sort_redshifts(mut self, v: bool) -> Self {
        self.config.sort_redshifts = v;
        self
    }
    pub fn r0(mut self, v: f64) -> Self {
        self.config.r0 = v;
        self
    }
    pub fn gamma(mut self, v: f64) -> Self {
        self.config.gamma = v;
        self
    }
    pub fn xi_r_cutoff(mut self, v: f64) -> Self {
        self.config.xi_r_cutoff = v;
        self
    }

    // --- Cosmology ---
    pub fn omega_mat(mut self, v: f64) -> Self {
        self.config.omega_mat = v;
        self
    }
    pub fn omega_lam(mut self, v: f64) -> Self {
        self.config.omega_lam = v;
        self
    }
    pub fn omega_k(mut self, v: f64) -> Self {
        self.config.omega_k = v;
        self
    }
    pub fn hubble(mut self, v: f64) -> Self {
        self.config.hubble = v;
        self
    }

    // --- Prior / selection ---
    pub fn magnitude_limit(mut self, v: f64) -> Self {
        self.config.magnitude_limit = v;
        self
    }
    pub fn mag_grid_len(mut self, v: usize) -> Self {
        self.config.mag_grid_len = v;
        self
    }
    pub fn prior_params(mut self, v: Vec<f64>) -> Self {
        self.config.prior_params = v;
        self
    }

    // --- Catalogue ---
    pub fn mag_cols(mut self, v: Vec<usize>) -> Self {
        self.config.mag_cols = v;
        self
    }
    pub fn sigma_cols(mut self, v: Vec<usize>) -> Self {
        self.config.sigma_cols = v;
        self
    }
    pub fn spec_z_col(mut self, v: Option<usize>) -> Self {
        self.config.spec_z_col = v;
        self
    }
    pub fn zero_point_errors(mut self, v: Vec<f64>) -> Self {
        self.config.zero_point_errors = v;
        self.zero_point_errors_set = true;
        self
    }

    /// Validate and build the [`Configuration`].
    ///
    /// Return
    /// ----------
    /// * The validated configuration with `non_ref_bands` derived, or
    ///   [`BlendfitError::InvalidConfiguration`] describing the first violated constraint.
    pub fn build(self) -> Result<Configuration, BlendfitError> {
        let mut c = self.config;
        let invalid = |msg: String| Err(BlendfitError::InvalidConfiguration(msg));

        if !(c.z_lo < c.z_hi) {
            return invalid(format!("z_lo ({}) must be < z_hi ({})", c.z_lo, c.z_hi));
        }
        if c.z_lo < 0.0 {
            return invalid(format!("z_lo must be >= 0, got {}", c.z_lo));
        }
        if c.z_len < 2 {
            return invalid(format!("z_len must be >= 2, got {}", c.z_len));
        }
        if !(c.ref_mag_lo < c.ref_mag_hi) {
            return invalid(format!(
                "ref_mag_lo ({}) must be < ref_mag_hi ({})",
                c.ref_mag_lo, c.ref_mag_hi
            ));
        }
        if c.mag_grid_len < 2 {
            return invalid(format!(
                "mag_grid_len must be >= 2, got {}",
                c.mag_grid_len
            ));
        }
        if c.num_bands == 0 {
            return invalid("num_bands must be >= 1".into());
        }
        if c.ref_band.is_empty() || c.select_band.is_empty() {
            return invalid("ref_band and select_band must not be empty".into());
        }
        if let Some(b) = c
            .ref_band
            .iter()
            .chain(c.select_band.iter())
            .find(|&&b| b >= c.num_bands)
        {
            return invalid(format!(
                "band index {b} out of range for {} bands",
                c.num_bands
            ));
        }
        if !(c.xi_r_cutoff > 0.0) {
            return invalid(format!(
                "xi_r_cutoff must be > 0, got {}",
                c.xi_r_cutoff
            ));
        }
        if !(c.hubble > 0.0) {
            return invalid(format!("hubble must be > 0, got {}", c.hubble));
        }

        if !self.zero_point_errors_set && c.zero_point_errors.len() != c.num_bands {
            c.zero_point_errors = vec![0.01; c.num_bands];
        }
        if c.zero_point_errors.len() != c.num_bands {
            return invalid(format!(
                "zero_point_errors has {} entries for {} bands",
                c.zero_point_errors.len(),
                c.num_bands
            ));
        }
        if c.mag_cols.len() != c.sigma_cols.len() {
            return invalid("mag_cols and sigma_cols must have the same length".into());
        }

        c.non_ref_bands = (0..c.num_bands)
            .filter(|b| !c.ref_band.contains(b))
            .collect();

        Ok(c)
    }
}
