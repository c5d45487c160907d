//! # Photometric redshift inference for blended sources
//!
//! [`Photoz`] drives a whole run: for every galaxy of a [`Photometry`] catalogue and every
//! requested number of blended components it
//!
//! 1. builds the [`MeasurementComponentMap`],
//! 2. binds a [`PosteriorEvaluator`] to the galaxy,
//! 3. integrates the prior alone with the [`EvidenceNormalizer`] to obtain `prior_norm`,
//! 4. samples the normalized posterior with the configured [`NestedSampler`],
//! 5. stores `nresample` equally weighted points and the log-evidence as a [`SampleResult`].
//!
//! Results are kept in memory, keyed by galaxy and component count, and can be checkpointed
//! to a versioned JSON [`Snapshot`] during the run.
//!
//! ## Queries
//!
//! * [`Photoz::chain`] – equally weighted samples, one row per draw,
//!   columns `[z_0, …, z_{C-1}, m_0, …, m_{C-1}]`.
//! * [`Photoz::log_evidence`], [`Photoz::log_bayes`] – model comparison between component
//!   counts; a positive `ln B_mn` favours `m` components.
//! * [`Photoz::apply_to_marginals`] and the summaries built on it: [`Photoz::max`] (histogram
//!   mode), [`Photoz::mean`], [`Photoz::std`], [`Photoz::quantiles`].
//!
//! ## Example
//!
//! ```rust, no_run
//! use blendfit::{
//!     config::Configuration,
//!     photometry::Photometry,
//!     photoz::{Photoz, SampleOptions, SeedPolicy},
//!     prior::bpz::BpzPrior,
//!     responses::TabulatedResponses,
//! };
//! # fn responses() -> TabulatedResponses { unimplemented!() }
//!
//! let config = Configuration::builder().num_bands(4).build()?;
//! let responses = responses();
//! let model = BpzPrior::new(&config, blendfit::responses::FluxResponses::templates(&responses))?;
//! let photometry = Photometry::from_csv("catalogue.csv", &config)?;
//!
//! let mut photoz = Photoz::new(config, model, responses, photometry)?;
//! let options = SampleOptions::default().with_seed(SeedPolicy::GalaxyIndex);
//! photoz.sample(&[1, 2], None, &options)?;
//! let ln_b21 = photoz.log_bayes(2, 1, 0, None)?;
//! # Ok::<(), blendfit::blendfit_errors::BlendfitError>(())
//! ```
use std::{collections::BTreeMap, path::PathBuf};

use nalgebra::DMatrix;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    blendfit_errors::BlendfitError,
    calibration::{cache_truth_likelihood, calibrate, CalibrationOptions, CalibrationResult},
    config::Configuration,
    constants::LogProb,
    evidence::{EvidenceNormalizer, PriorNormalization},
    mapping::MeasurementComponentMap,
    nested_sampling::{classic::ClassicNestedSampler, NestedSampler, SamplerOptions},
    photometry::{Galaxy, Photometry},
    posterior::PosteriorEvaluator,
    prior::{bpz::BpzPrior, PriorModel},
    prior_transform::{PriorTransform, RedshiftScaling},
    responses::FluxResponses,
    snapshot::{ResultTable, Snapshot},
};

#[cfg(feature = "progress")]
use crate::progress::{galaxy_bar, GalaxyTimer};

/// How the random generators of a run are seeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedPolicy {
    /// Fresh OS entropy for every galaxy.
    #[default]
    Unseeded,
    /// Seed with the galaxy index.
    GalaxyIndex,
    /// Seed with `offset + galaxy index`.
    Offset(u64),
}

impl SeedPolicy {
    pub fn seed_for(&self, galaxy: usize) -> Option<u64> {
        match self {
            SeedPolicy::Unseeded => None,
            SeedPolicy::GalaxyIndex => Some(galaxy as u64),
            SeedPolicy::Offset(offset) => Some(offset.wrapping_add(galaxy as u64)),
        }
    }
}

/// Options of [`Photoz::sample`].
///
/// Fields
/// -----------------
/// * `nresample` – equally weighted draws stored per galaxy and component count.
/// * `seed` – seeding policy for both the sampler and the resampling.
/// * `specification` – measurement-component specification (one entry per band listing the
///   contributing components); `None` for a fully blended source.
/// * `sampler` – options of the posterior run.
/// * `prior_sampler` – options of the prior normalization run.
/// * `redshift_scaling` – redshift convention of the prior transform.
/// * `save_path` – checkpoint file, also written once at the end of the run.
/// * `save_interval` – checkpoint every galaxy whose index is a multiple of this value.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOptions {
    pub nresample: usize,
    pub seed: SeedPolicy,
    pub specification: Option<Vec<Vec<usize>>>,
    pub sampler: SamplerOptions,
    pub prior_sampler: SamplerOptions,
    pub redshift_scaling: RedshiftScaling,
    pub save_path: Option<PathBuf>,
    pub save_interval: Option<usize>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        SampleOptions {
            nresample: 1000,
            seed: SeedPolicy::Unseeded,
            specification: None,
            sampler: SamplerOptions::default(),
            prior_sampler: SamplerOptions::default().with_npoints(50),
            redshift_scaling: RedshiftScaling::Standard,
            save_path: None,
            save_interval: None,
        }
    }
}

impl SampleOptions {
    pub fn with_nresample(mut self, nresample: usize) -> Self {
        self.nresample = nresample;
        self
    }

    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_specification(mut self, specification: Vec<Vec<usize>>) -> Self {
        self.specification = Some(specification);
        self
    }

    pub fn with_npoints(mut self, npoints: usize) -> Self {
        self.sampler.npoints = npoints;
        self
    }

    pub fn with_prior_npoints(mut self, npoints: usize) -> Self {
        self.prior_sampler.npoints = npoints;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>, interval: Option<usize>) -> Self {
        self.save_path = Some(path.into());
        self.save_interval = interval;
        self
    }
}

/// Sampling output for one galaxy and one number of components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Equally weighted posterior draws, `nresample × 2C`.
    pub chain: DMatrix<f64>,
    pub log_z: LogProb,
    pub log_z_err: f64,
    pub prior_norm: PriorNormalization,
    pub niter: usize,
    pub ncall: usize,
}

/// Blended-source photometric redshift run.
///
/// Fields
/// -----------------
/// * `config` – run configuration, shared by the model, the catalogue and the sampler.
/// * `model` – prior model.
/// * `responses` – template flux provider.
/// * `photometry` – the catalogue.
/// * `sampler` – nested sampling backend, [`ClassicNestedSampler`] by default.
/// * `results` – galaxy → (num_components → [`SampleResult`]).
pub struct Photoz<P: PriorModel, R: FluxResponses> {
    config: Configuration,
    model: P,
    responses: R,
    photometry: Photometry,
    sampler: Box<dyn NestedSampler>,
    results: ResultTable,
}

impl<P: PriorModel, R: FluxResponses> Photoz<P, R> {
    /// Assemble a run.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidConfiguration`] if the responses do not cover
    ///   `config.num_bands` bands or a galaxy carries a different number of bands.
    pub fn new(
        config: Configuration,
        model: P,
        responses: R,
        photometry: Photometry,
    ) -> Result<Self, BlendfitError> {
        if responses.num_bands() != config.num_bands {
            return Err(BlendfitError::InvalidConfiguration(format!(
                "responses cover {} bands, configuration {}",
                responses.num_bands(),
                config.num_bands
            )));
        }
        if let Some(g) = photometry
            .iter()
            .find(|g| g.flux_data.len() != config.num_bands)
        {
            return Err(BlendfitError::InvalidConfiguration(format!(
                "galaxy {} has {} bands, configuration {}",
                g.index,
                g.flux_data.len(),
                config.num_bands
            )));
        }

        tracing::info!(
            num_galaxies = photometry.len(),
            num_templates = responses.templates().num_templates(),
            num_bands = config.num_bands,
            "photo-z run initialized"
        );

        Ok(Photoz {
            config,
            model,
            responses,
            photometry,
            sampler: Box::new(ClassicNestedSampler::default()),
            results: BTreeMap::new(),
        })
    }

    /// Replace the nested sampling backend.
    pub fn with_sampler(mut self, sampler: Box<dyn NestedSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn model(&self) -> &P {
        &self.model
    }

    pub fn responses(&self) -> &R {
        &self.responses
    }

    pub fn photometry(&self) -> &Photometry {
        &self.photometry
    }

    pub fn results(&self) -> &ResultTable {
        &self.results
    }

    /// Sample the posterior of every requested galaxy for every requested component count.
    ///
    /// Arguments
    /// -----------------
    /// * `num_components`: component counts to sample.
    /// * `galaxy`: a single galaxy index, or `None` for the whole catalogue.
    /// * `options`: see [`SampleOptions`].
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidSampleOptions`] if no component count is given, or if a
    ///   measurement specification is combined with several component counts.
    /// * [`BlendfitError::GalaxyNotFound`] for an unknown galaxy index.
    /// * Any error of the posterior (e.g. [`BlendfitError::MagnitudeOutsidePriorGrid`]) aborts
    ///   the run; results of the galaxies already sampled are kept.
    pub fn sample(
        &mut self,
        num_components: &[usize],
        galaxy: Option<usize>,
        options: &SampleOptions,
    ) -> Result<(), BlendfitError> {
        if num_components.is_empty() {
            return Err(BlendfitError::InvalidSampleOptions(
                "at least one number of components is required".into(),
            ));
        }
        if num_components.len() > 1 && options.specification.is_some() {
            return Err(BlendfitError::InvalidSampleOptions(
                "a measurement specification cannot be used with several numbers of components; \
                 sample each case separately"
                    .into(),
            ));
        }
        if options.nresample == 0 {
            return Err(BlendfitError::InvalidSampleOptions(
                "nresample must be > 0".into(),
            ));
        }
        options.sampler.validate()?;
        options.prior_sampler.validate()?;

        let indices: Vec<usize> = match galaxy {
            Some(g) if g < self.photometry.len() => vec![g],
            Some(g) => return Err(BlendfitError::GalaxyNotFound(g)),
            None => (0..self.photometry.len()).collect(),
        };

        #[cfg(feature = "progress")]
        let pb = galaxy_bar(indices.len() as u64);
        #[cfg(feature = "progress")]
        let mut timer = GalaxyTimer::new(0.2);

        for g in indices {
            for &nb in num_components {
                let result = self.sample_galaxy(&self.photometry[g], nb, options)?;
                tracing::info!(
                    galaxy = g,
                    num_components = nb,
                    log_z = result.log_z,
                    log_z_err = result.log_z_err,
                    "galaxy sampled"
                );
                self.results.entry(g).or_default().insert(nb, result);
            }

            #[cfg(feature = "progress")]
            {
                let last = timer.tick();
                pb.set_message(timer.message(last));
                pb.inc(1);
            }

            if let (Some(path), Some(interval)) = (&options.save_path, options.save_interval) {
                if interval > 0 && g % interval == 0 {
                    self.save_state(path)?;
                }
            }
        }

        #[cfg(feature = "progress")]
        pb.finish_and_clear();

        if let Some(path) = &options.save_path {
            self.save_state(path)?;
        }
        Ok(())
    }

    /// Prior normalization followed by the posterior run, for one galaxy.
    fn sample_galaxy(
        &self,
        galaxy: &Galaxy,
        num_components: usize,
        options: &SampleOptions,
    ) -> Result<SampleResult, BlendfitError> {
        let seed = options.seed.seed_for(galaxy.index);
        tracing::debug!(galaxy = galaxy.index, num_components, ?seed, "sampling galaxy");

        let mapping = MeasurementComponentMap::build(
            options.specification.as_deref(),
            num_components,
            self.config.num_bands,
            &self.config.ref_band,
        )?;
        let evaluator =
            PosteriorEvaluator::new(&self.config, &self.model, &self.responses, &mapping, galaxy)?;
        let transform = PriorTransform::new(
            &self.config,
            galaxy.ref_mag_hi,
            num_components,
            options.redshift_scaling,
        );

        let normalizer = EvidenceNormalizer::new(
            self.sampler.as_ref(),
            options.prior_sampler.clone().with_seed(seed),
        );
        let prior_norm = normalizer.normalize(&evaluator, &transform)?;
        let evaluator = evaluator.with_prior_norm(prior_norm.log_z);

        let mut log_posterior = |params: &[f64]| evaluator.log_posterior(params);
        let prior_transform = |cube: &[f64]| transform.transform(cube);
        let result = self.sampler.sample(
            &mut log_posterior,
            &prior_transform,
            evaluator.ndim(),
            &options.sampler.clone().with_seed(seed),
        )?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let chain = result.resample_equal(options.nresample, &mut rng)?;

        Ok(SampleResult {
            chain,
            log_z: result.log_z,
            log_z_err: result.log_z_err,
            prior_norm,
            niter: result.niter,
            ncall: result.ncall,
        })
    }

    /// Stored result of one galaxy and component count.
    pub fn result(&self, num_components: usize, galaxy: usize) -> Result<&SampleResult, BlendfitError> {
        self.results
            .get(&galaxy)
            .and_then(|r| r.get(&num_components))
            .ok_or(BlendfitError::ResultNotFound {
                galaxy,
                num_components,
            })
    }

    /// Equally weighted posterior draws of one galaxy.
    pub fn chain(&self, num_components: usize, galaxy: usize) -> Result<&DMatrix<f64>, BlendfitError> {
        Ok(&self.result(num_components, galaxy)?.chain)
    }

    /// Natural log of the evidence of one galaxy.
    pub fn log_evidence(&self, num_components: usize, galaxy: usize) -> Result<LogProb, BlendfitError> {
        Ok(self.result(num_components, galaxy)?.log_z)
    }

    /// Log-evidence and its uncertainty.
    pub fn log_evidence_with_error(
        &self,
        num_components: usize,
        galaxy: usize,
    ) -> Result<(LogProb, f64), BlendfitError> {
        let r = self.result(num_components, galaxy)?;
        Ok((r.log_z, r.log_z_err))
    }

    /// Log-evidence of every galaxy of the catalogue, in catalogue order.
    pub fn log_evidences(&self, num_components: usize) -> Result<Vec<LogProb>, BlendfitError> {
        (0..self.photometry.len())
            .map(|g| self.log_evidence(num_components, g))
            .collect()
    }

    /// Log of the Bayes factor `B_mn` between `m` and `n` components.
    ///
    /// Arguments
    /// -----------------
    /// * `m`, `n`: component counts to compare.
    /// * `galaxy`: galaxy index.
    /// * `base`: base of the logarithm, natural log when `None`.
    pub fn log_bayes(
        &self,
        m: usize,
        n: usize,
        galaxy: usize,
        base: Option<f64>,
    ) -> Result<f64, BlendfitError> {
        let scale = base.map_or(1.0, f64::ln);
        Ok((self.log_evidence(m, galaxy)? - self.log_evidence(n, galaxy)?) / scale)
    }

    /// Apply `func` to the samples of every 1-D marginal.
    ///
    /// Return
    /// ----------
    /// * A matrix with one row per galaxy (a single row when `galaxy` is given) and one column
    ///   per parameter, `2 * num_components`.
    pub fn apply_to_marginals<F>(
        &self,
        num_components: usize,
        galaxy: Option<usize>,
        func: F,
    ) -> Result<DMatrix<f64>, BlendfitError>
    where
        F: Fn(&[f64]) -> f64,
    {
        let galaxies: Vec<usize> = match galaxy {
            Some(g) => vec![g],
            None => (0..self.photometry.len()).collect(),
        };
        let ndim = 2 * num_components;
        let mut out = DMatrix::zeros(galaxies.len(), ndim);
        for (row, &g) in galaxies.iter().enumerate() {
            let chain = self.chain(num_components, g)?;
            for col in 0..ndim {
                let samples: Vec<f64> = chain.column(col).iter().copied().collect();
                out[(row, col)] = func(&samples);
            }
        }
        Ok(out)
    }

    /// Mode of every 1-D marginal: centre of the tallest of `bins` histogram bins.
    pub fn max(
        &self,
        num_components: usize,
        galaxy: Option<usize>,
        bins: usize,
    ) -> Result<DMatrix<f64>, BlendfitError> {
        self.apply_to_marginals(num_components, galaxy, |s| histogram_mode(s, bins))
    }

    pub fn mean(&self, num_components: usize, galaxy: Option<usize>) -> Result<DMatrix<f64>, BlendfitError> {
        self.apply_to_marginals(num_components, galaxy, mean)
    }

    /// Population standard deviation of every 1-D marginal.
    pub fn std(&self, num_components: usize, galaxy: Option<usize>) -> Result<DMatrix<f64>, BlendfitError> {
        self.apply_to_marginals(num_components, galaxy, std_dev)
    }

    /// Quantiles `q ∈ [0, 1]` of every 1-D marginal, one matrix per quantile.
    pub fn quantiles(
        &self,
        num_components: usize,
        galaxy: Option<usize>,
        q: &[f64],
    ) -> Result<Vec<DMatrix<f64>>, BlendfitError> {
        if let Some(bad) = q.iter().find(|q| !(0.0..=1.0).contains(*q)) {
            return Err(BlendfitError::InvalidSampleOptions(format!(
                "quantile {bad} is outside [0, 1]"
            )));
        }
        q.iter()
            .map(|&qq| self.apply_to_marginals(num_components, galaxy, |s| quantile(s, qq)))
            .collect()
    }

    /// Checkpoint the configuration and every result.
    pub fn save_state<T: AsRef<std::path::Path>>(&self, path: T) -> Result<(), BlendfitError> {
        Snapshot::new(self.config.clone(), self.results.clone()).save(path)
    }

    /// Restore results from a snapshot, replacing those in memory.
    ///
    /// Results are restored even if the snapshot was written with another configuration, in
    /// which case a warning is logged.
    pub fn restore_results<T: AsRef<std::path::Path>>(&mut self, path: T) -> Result<(), BlendfitError> {
        let snapshot = Snapshot::load(path)?;
        if snapshot.config != self.config {
            tracing::warn!("restoring results written with a different configuration");
        }
        if let Some(&g) = snapshot
            .results
            .keys()
            .find(|&&g| g >= self.photometry.len())
        {
            return Err(BlendfitError::GalaxyNotFound(g));
        }
        self.results = snapshot.results;
        Ok(())
    }
}

impl<R: FluxResponses> Photoz<BpzPrior, R> {
    /// Calibrate the prior on the galaxies of the catalogue, which must all carry a truth
    /// redshift. The model keeps the best parameters; results already sampled are not updated.
    pub fn calibrate(
        &mut self,
        options: &CalibrationOptions,
    ) -> Result<CalibrationResult, BlendfitError> {
        let cached = cache_truth_likelihood(&self.config, &self.responses, &self.photometry)?;
        calibrate(&mut self.model, &self.photometry, &cached, options)
    }
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn std_dev(samples: &[f64]) -> f64 {
    let m = mean(samples);
    (samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / samples.len() as f64).sqrt()
}

/// Linear-interpolation quantile between closest ranks.
fn quantile(samples: &[f64], q: f64) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn histogram_mode(samples: &[f64], bins: usize) -> f64 {
    let (lo, hi) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    if samples.is_empty() || bins == 0 {
        return f64::NAN;
    }
    if hi == lo {
        return lo;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &x in samples {
        let bin = (((x - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    // first tallest bin
    let tallest = counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
        .0;
    lo + width * (tallest as f64 + 0.5)
}
