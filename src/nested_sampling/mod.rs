//! # Nested sampling
//!
//! The posterior is explored with nested sampling, which returns both weighted posterior
//! samples and the log-evidence `ln Z` needed for model comparison between component counts.
//!
//! The backend is abstracted behind [`NestedSampler`] so the orchestration code only deals
//! with a log-likelihood closure, a prior transform and [`SamplerOptions`]. The in-crate
//! backend is [`classic::ClassicNestedSampler`].
//!
//! ## Contract
//!
//! * `prior_transform` maps a point of the unit cube `[0, 1]^ndim` to physical parameters.
//! * `log_likelihood` receives physical parameters. It may return `Ok(-inf)` to reject a
//!   region; an `Err` aborts the run and is returned unchanged.
//! * The result holds every dead point with its normalized importance weight.
//!
//! ## See also
//! * [`crate::evidence::EvidenceNormalizer`] – integrates the prior alone.
//! * [`crate::photoz::Photoz::sample`] – integrates the full posterior.
pub mod classic;

use nalgebra::DMatrix;
use rand::{
    distr::{weighted::WeightedIndex, Distribution},
    Rng,
};
use serde::{Deserialize, Serialize};

use crate::{blendfit_errors::BlendfitError, constants::LogProb};

/// Log-likelihood seen by a sampler.
pub type LogLikelihoodFn<'f> = dyn FnMut(&[f64]) -> Result<LogProb, BlendfitError> + 'f;

/// Unit cube → physical parameters.
pub type PriorTransformFn<'f> = dyn Fn(&[f64]) -> Result<Vec<f64>, BlendfitError> + 'f;

/// Options shared by every nested sampling run.
///
/// Fields
/// -----------------
/// * `npoints` – number of live points.
/// * `dlogz` – stop once the estimated remaining evidence `ln(Z + ΔZ) - ln Z` drops below this.
/// * `max_iter` – hard cap on the number of iterations.
/// * `walks` – random-walk steps per replacement point.
/// * `seed` – seed of the sampler's random generator, `None` for an OS-seeded generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerOptions {
    pub npoints: usize,
    pub dlogz: f64,
    pub max_iter: usize,
    pub walks: usize,
    pub seed: Option<u64>,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions {
            npoints: 150,
            dlogz: 0.5,
            max_iter: 50_000,
            walks: 25,
            seed: None,
        }
    }
}

impl SamplerOptions {
    pub fn with_npoints(mut self, npoints: usize) -> Self {
        self.npoints = npoints;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_dlogz(mut self, dlogz: f64) -> Self {
        self.dlogz = dlogz;
        self
    }

    pub fn with_walks(mut self, walks: usize) -> Self {
        self.walks = walks;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidSampleOptions`] if a count is zero or `dlogz` is not positive.
    pub fn validate(&self) -> Result<(), BlendfitError> {
        if self.npoints < 2 {
            return Err(BlendfitError::InvalidSampleOptions(format!(
                "npoints must be >= 2, got {}",
                self.npoints
            )));
        }
        if self.walks == 0 || self.max_iter == 0 {
            return Err(BlendfitError::InvalidSampleOptions(
                "walks and max_iter must be > 0".into(),
            ));
        }
        if !(self.dlogz > 0.0) {
            return Err(BlendfitError::InvalidSampleOptions(format!(
                "dlogz must be > 0, got {}",
                self.dlogz
            )));
        }
        Ok(())
    }
}

/// Output of a nested sampling run.
///
/// Fields
/// -----------------
/// * `samples` – dead points in physical parameters, one row per point.
/// * `log_l` – log-likelihood of every row.
/// * `weights` – normalized importance weights, summing to one.
/// * `log_z`, `log_z_err` – log-evidence and its estimated uncertainty `sqrt(H / npoints)`.
/// * `information` – Kullback–Leibler information `H` of the posterior relative to the prior.
/// * `niter`, `ncall` – iterations performed and likelihood evaluations.
#[derive(Debug, Clone)]
pub struct NestedSamplingResult {
    pub samples: DMatrix<f64>,
    pub log_l: Vec<LogProb>,
    pub weights: Vec<f64>,
    pub log_z: LogProb,
    pub log_z_err: f64,
    pub information: f64,
    pub niter: usize,
    pub ncall: usize,
}

impl NestedSamplingResult {
    /// Draw `n` equally weighted rows from the weighted samples (with replacement).
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::SamplerFailure`] if the weights cannot be sampled from (all zero,
    ///   e.g. when the likelihood was `-inf` everywhere).
    pub fn resample_equal(&self, n: usize, rng: &mut impl Rng) -> Result<DMatrix<f64>, BlendfitError> {
        let index = WeightedIndex::new(&self.weights)
            .map_err(|e| BlendfitError::SamplerFailure(format!("cannot resample: {e}")))?;
        let rows: Vec<usize> = (0..n).map(|_| index.sample(rng)).collect();
        Ok(self.samples.select_rows(rows.iter()))
    }
}

/// A nested sampling backend.
pub trait NestedSampler {
    /// Integrate `log_likelihood` over the prior defined by `prior_transform`.
    ///
    /// Arguments
    /// -----------------
    /// * `log_likelihood`: physical parameters → log-likelihood.
    /// * `prior_transform`: unit cube → physical parameters.
    /// * `ndim`: dimension of the parameter space.
    /// * `options`: run options, validated by the sampler.
    fn sample(
        &self,
        log_likelihood: &mut LogLikelihoodFn<'_>,
        prior_transform: &PriorTransformFn<'_>,
        ndim: usize,
        options: &SamplerOptions,
    ) -> Result<NestedSamplingResult, BlendfitError>;
}

#[cfg(test)]
mod nested_sampling_test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_default_options_valid() {
        let options = SamplerOptions::default();
        assert_eq!(options.npoints, 150);
        assert_eq!(options.walks, 25);
        assert!(options.validate().is_ok());
        assert!(matches!(
            options.clone().with_npoints(1).validate(),
            Err(BlendfitError::InvalidSampleOptions(_))
        ));
        assert!(options.with_dlogz(0.0).validate().is_err());
    }

    #[test]
    fn test_resample_equal_follows_weights() {
        let result = NestedSamplingResult {
            samples: DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]),
            log_l: vec![0.0; 3],
            weights: vec![0.0, 1.0, 0.0],
            log_z: 0.0,
            log_z_err: 0.0,
            information: 0.0,
            niter: 3,
            ncall: 3,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let draws = result.resample_equal(10, &mut rng).unwrap();
        assert_eq!(draws.nrows(), 10);
        assert!(draws.iter().all(|&v| v == 2.0));

        let empty = NestedSamplingResult {
            weights: vec![0.0; 3],
            ..result
        };
        assert!(matches!(
            empty.resample_equal(1, &mut rng),
            Err(BlendfitError::SamplerFailure(_))
        ));
    }
}
