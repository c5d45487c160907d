//! # Prior calibration on a spectroscopic sample
//!
//! The [`BpzPrior`] parameters can be fitted to galaxies of known (truth) redshift, treated as
//! single-component sources. Calibration runs in two stages:
//!
//! 1. [`cache_truth_likelihood`] evaluates, once, the flux log-likelihood of every galaxy for
//!    every template at its truth redshift, the template being scaled to the galaxy's
//!    reference magnitude. The result does not depend on the prior parameters.
//! 2. [`calibrate`] maximizes
//!
//! ```text
//! ln P(θ) + Σ_g ln Σ_T exp( L[g, T] + ln P(t_T | m_g) + ln P(z_g | t_T, m_g) )
//! ```
//!
//! over the parameters `θ` by seeded stochastic hill-climbing. The redshift prior is the
//! normalized one, so its normalization table is recomputed for every proposal.
use nalgebra::DMatrix;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::{
    blendfit_errors::BlendfitError,
    config::Configuration,
    constants::LogProb,
    conversion::{log_sum_exp, mag_to_flux},
    mapping::MeasurementComponentMap,
    photometry::Photometry,
    posterior::PosteriorEvaluator,
    prior::{bpz::BpzPrior, bpz::PriorParameters, likelihood_only::LikelihoodOnly, PriorModel},
    responses::FluxResponses,
};

/// Per galaxy and template single-component flux log-likelihood at the truth redshift.
///
/// Arguments
/// -----------------
/// * `config`: band layout; the first reference band scales the templates.
/// * `responses`: template fluxes.
/// * `photometry`: galaxies with a truth redshift.
///
/// Return
/// ----------
/// * A `num_galaxies × num_templates` matrix; `-inf` where the template has no flux in the
///   reference band.
/// * [`BlendfitError::MissingTruth`] if a galaxy has no truth redshift.
pub fn cache_truth_likelihood<R: FluxResponses + ?Sized>(
    config: &Configuration,
    responses: &R,
    photometry: &Photometry,
) -> Result<DMatrix<f64>, BlendfitError> {
    let mapping = MeasurementComponentMap::build(None, 1, config.num_bands, &config.ref_band)?;
    let num_templates = responses.templates().num_templates();
    let ref_band = config.ref_band[0];
    let mut cached = DMatrix::from_element(photometry.len(), num_templates, f64::NEG_INFINITY);

    for (row, galaxy) in photometry.iter().enumerate() {
        let z = galaxy
            .truth_redshift
            .ok_or(BlendfitError::MissingTruth(galaxy.index))?;
        let evaluator =
            PosteriorEvaluator::new(config, &LikelihoodOnly, responses, &mapping, galaxy)?;
        let fluxes = responses.interp(&[z]);
        let ref_flux = mag_to_flux(galaxy.ref_mag_data);

        for t in 0..num_templates {
            let template_ref = fluxes.get(t, ref_band, 0);
            if !(template_ref > 0.0) {
                continue;
            }
            let scaling = ref_flux / template_ref;
            let model: Vec<f64> = config
                .non_ref_bands
                .iter()
                .map(|&b| fluxes.get(t, b, 0) * scaling)
                .collect();
            cached[(row, t)] = evaluator.ln_likelihood_flux(&model);
        }
    }

    tracing::debug!(
        galaxies = photometry.len(),
        templates = num_templates,
        "truth likelihoods cached"
    );
    Ok(cached)
}

/// Hill-climbing settings.
///
/// Fields
/// -----------------
/// * `iterations` – number of proposals.
/// * `step_scale` – relative size of the Gaussian steps, `σ_i = step_scale · max(|θ_i|, 0.1)`.
/// * `seed` – seed of the proposal generator, OS entropy when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOptions {
    pub iterations: usize,
    pub step_scale: f64,
    pub seed: Option<u64>,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        CalibrationOptions {
            iterations: 200,
            step_scale: 0.05,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub params: PriorParameters,
    pub ln_posterior: LogProb,
    pub accepted: usize,
}

/// Calibration objective of `model` against the cached likelihoods.
fn ln_calibration_posterior(
    model: &BpzPrior,
    photometry: &Photometry,
    cached: &DMatrix<f64>,
) -> Result<LogProb, BlendfitError> {
    let ln_prior = model.ln_calibration_prior();
    if ln_prior == f64::NEG_INFINITY {
        return Ok(f64::NEG_INFINITY);
    }
    let templates = model.templates();
    let mut total = ln_prior;
    let mut terms = Vec::with_capacity(templates.num_templates());
    for (row, galaxy) in photometry.iter().enumerate() {
        // truth checked when the cache was built
        let Some(z) = galaxy.truth_redshift else {
            return Err(BlendfitError::MissingTruth(galaxy.index));
        };
        let m = galaxy.ref_mag_data;
        terms.clear();
        for t in 0..templates.num_templates() {
            let ty = templates.template_type(t);
            terms.push(
                cached[(row, t)]
                    + model.ln_template_prior(ty, m)?
                    + model.ln_redshift_prior(z, ty, m, true)?,
            );
        }
        total += log_sum_exp(terms.iter().copied());
    }
    Ok(total)
}

/// Fit the prior parameters of `model` to a spectroscopic sample.
///
/// The model is left with the best parameters found.
///
/// Arguments
/// -----------------
/// * `model`: starting point of the fit.
/// * `photometry`: the galaxies used for [`cache_truth_likelihood`], in the same order.
/// * `cached`: output of [`cache_truth_likelihood`].
/// * `options`: see [`CalibrationOptions`].
///
/// Return
/// ----------
/// * The best parameters, their objective and the number of accepted proposals.
/// * [`BlendfitError::InvalidParameterLength`] if `cached` does not match the photometry and
///   the template set.
pub fn calibrate(
    model: &mut BpzPrior,
    photometry: &Photometry,
    cached: &DMatrix<f64>,
    options: &CalibrationOptions,
) -> Result<CalibrationResult, BlendfitError> {
    if cached.shape() != (photometry.len(), model.templates().num_templates()) {
        return Err(BlendfitError::InvalidParameterLength(format!(
            "cached likelihoods are {:?}, expected ({}, {})",
            cached.shape(),
            photometry.len(),
            model.templates().num_templates()
        )));
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut best = ln_calibration_posterior(model, photometry, cached)?;
    let mut accepted = 0;
    tracing::info!(ln_posterior = best, "starting prior calibration");

    for iter in 0..options.iterations {
        let proposal: Vec<f64> = model
            .parameters()
            .values()
            .iter()
            .map(|&v| {
                let step: f64 = StandardNormal.sample(&mut rng);
                v + step * options.step_scale * v.abs().max(0.1)
            })
            .collect();
        let params = model.parameters().with_values(proposal)?;
        if params.fraction_sum() > 1.0 || params.values().iter().any(|&v| v < 0.0) {
            continue;
        }

        let mut candidate = model.clone();
        candidate.set_parameters(params)?;
        let ln_post = ln_calibration_posterior(&candidate, photometry, cached)?;
        if ln_post > best {
            best = ln_post;
            accepted += 1;
            *model = candidate;
            tracing::debug!(iter, ln_posterior = best, "calibration step accepted");
        }
    }

    tracing::info!(
        ln_posterior = best,
        accepted,
        iterations = options.iterations,
        "prior calibration finished"
    );
    Ok(CalibrationResult {
        params: model.parameters().clone(),
        ln_posterior: best,
        accepted,
    })
}

#[cfg(test)]
mod calibration_test {
    use super::*;
    use crate::{photometry::Galaxy, responses::TabulatedResponses, templates::TemplateSet};
    use approx::assert_relative_eq;

    fn config() -> Configuration {
        Configuration::builder()
            .num_bands(3)
            .z_hi(4.0)
            .z_len(200)
            .mag_grid_len(20)
            .build()
            .unwrap()
    }

    fn responses() -> TabulatedResponses {
        let templates =
            TemplateSet::from_labels(&[("El", "early"), ("Sbc", "late"), ("Im", "irr")]).unwrap();
        let z_grid = vec![0.0, 2.0, 4.0];
        let early = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 1.0, 3.0, 5.0]);
        let late = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 1.0, 1.0, 1.5, 2.0, 1.0, 2.0, 3.0]);
        let irr = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        TabulatedResponses::new(templates, z_grid, vec![early, late, irr]).unwrap()
    }

    fn photometry(cfg: &Configuration) -> Photometry {
        let galaxies = vec![
            Galaxy::from_magnitudes(0, vec![22.0, 21.5, 21.0], vec![0.05; 3], Some(0.5), cfg)
                .unwrap(),
            Galaxy::from_magnitudes(1, vec![23.0, 23.0, 23.0], vec![0.05; 3], Some(1.2), cfg)
                .unwrap(),
            Galaxy::from_magnitudes(2, vec![22.5, 22.0, 21.6], vec![0.05; 3], Some(0.8), cfg)
                .unwrap(),
        ];
        Photometry::from_galaxies(galaxies)
    }

    #[test]
    fn test_cached_likelihood() {
        let cfg = config();
        let resp = responses();
        let phot = photometry(&cfg);
        let cached = cache_truth_likelihood(&cfg, &resp, &phot).unwrap();
        assert_eq!(cached.shape(), (3, 3));

        // flat template: the model repeats the reference flux in every band
        let g = &phot[1];
        let expected: f64 = g
            .flux_data_no_ref
            .iter()
            .zip(&g.flux_sigma_no_ref)
            .map(|(d, s)| ((d - mag_to_flux(23.0)) / s).powi(2))
            .sum::<f64>()
            * -0.5;
        assert_relative_eq!(cached[(1, 2)], expected, epsilon = 1e-9);
        assert_relative_eq!(cached[(1, 2)], 0.0, epsilon = 1e-9);
        assert!(cached[(1, 0)] < cached[(1, 2)]);
    }

    #[test]
    fn test_missing_truth() {
        let cfg = config();
        let g = Galaxy::from_magnitudes(0, vec![22.0; 3], vec![0.05; 3], None, &cfg).unwrap();
        let phot = Photometry::from_galaxies(vec![g]);
        assert_eq!(
            cache_truth_likelihood(&cfg, &responses(), &phot).unwrap_err(),
            BlendfitError::MissingTruth(0)
        );
    }

    #[test]
    fn test_calibration_improves_objective() {
        let cfg = config();
        let resp = responses();
        let phot = photometry(&cfg);
        let cached = cache_truth_likelihood(&cfg, &resp, &phot).unwrap();

        let mut model = BpzPrior::new(&cfg, resp.templates()).unwrap();
        let start = ln_calibration_posterior(&model, &phot, &cached).unwrap();
        let options = CalibrationOptions {
            iterations: 30,
            seed: Some(11),
            ..CalibrationOptions::default()
        };
        let result = calibrate(&mut model, &phot, &cached, &options).unwrap();

        assert!(result.ln_posterior >= start);
        assert_eq!(model.parameters(), &result.params);
        assert_eq!(model.ln_calibration_prior(), 0.0);
        assert_relative_eq!(
            ln_calibration_posterior(&model, &phot, &cached).unwrap(),
            result.ln_posterior,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_cache_shape_checked() {
        let cfg = config();
        let resp = responses();
        let phot = photometry(&cfg);
        let mut model = BpzPrior::new(&cfg, resp.templates()).unwrap();
        let cached = DMatrix::zeros(2, 3);
        assert!(matches!(
            calibrate(&mut model, &phot, &cached, &CalibrationOptions::default()),
            Err(BlendfitError::InvalidParameterLength(_))
        ));
    }
}
