//! # Blended-source posterior
//!
//! [`PosteriorEvaluator`] is the log-probability function handed to the nested sampler. It is
//! bound to one galaxy, one number of blended components `C` and one
//! [`MeasurementComponentMap`], and evaluates at a point
//!
//! ```text
//! params = [z_0, …, z_{C-1}, m_0, …, m_{C-1}]
//! ```
//!
//! the posterior marginalized over every assignment of templates to components:
//!
//! ```text
//! ln p(z, m | data) = ln Σ_{T ∈ templates^C} exp( Σ_a [ln P(z_a | t_a, m_a) + ln P(t_a | m_a)]
//!                                                 + ln S + ln(1 + ξ(z))
//!                                                 + ln L_flux(T) + ln L_mag )
//!                     - prior_norm
//! ```
//!
//! where `S` is the selection effect, `ξ` the correlation function and `prior_norm` the
//! log-evidence of the prior alone (see [`crate::evidence`]).
//!
//! ## Template scaling
//!
//! Each template is rescaled so that its flux in the reference band matches the component's
//! magnitude: `scale = 10^(-0.4 m_a) / flux[T, ref, a]`. With a single reference band every
//! component is scaled against that band and the reference fluxes add up into one blended
//! flux; with one reference band per component they stay separate.
//!
//! ## Domain boundaries
//!
//! Negative redshifts, ordering violations (for exchangeable components) and out-of-range
//! template indices give `Ok(-inf)`, so the sampler simply rejects the region. Configuration
//! mistakes (a magnitude outside the prior normalization grid, a malformed parameter vector)
//! are errors that abort the run.
//!
//! ## See also
//! * [`crate::prior::PriorModel`] – prior factors.
//! * [`crate::responses::FluxResponses`] – model fluxes.
//! * [`crate::prior_transform::PriorTransform`] – unit cube → `params`.
use itertools::Itertools;

use crate::{
    blendfit_errors::BlendfitError,
    config::Configuration,
    constants::{Flux, LogProb, Magnitude, Redshift},
    conversion::{log_add_exp, mag_to_flux},
    mapping::MeasurementComponentMap,
    photometry::Galaxy,
    prior::PriorModel,
    responses::{FluxGrid, FluxResponses},
};

/// Log-posterior of one galaxy for a fixed number of blended components.
///
/// The evaluator only borrows its context, so one instance per galaxy (or per worker) is
/// cheap to build and every evaluation is pure.
///
/// Fields
/// -----------------
/// * `config` – band layout and ordering convention.
/// * `model` – the prior model.
/// * `responses` – model flux provider.
/// * `mapping` – which components contribute to which band.
/// * `galaxy` – the bound photometry.
/// * `prior_norm` – log-normalization of the prior for this galaxy and component count.
#[derive(Debug)]
pub struct PosteriorEvaluator<'a, P: PriorModel + ?Sized, R: FluxResponses + ?Sized> {
    config: &'a Configuration,
    model: &'a P,
    responses: &'a R,
    mapping: &'a MeasurementComponentMap,
    galaxy: &'a Galaxy,
    prior_norm: LogProb,
}

/// Quantities shared by every template combination at one point.
struct PointTerms {
    priors: Vec<Vec<LogProb>>,
    correlation: LogProb,
    total_ref_flux: Vec<Flux>,
    selection_ref: Option<LogProb>,
}

impl<'a, P: PriorModel + ?Sized, R: FluxResponses + ?Sized> PosteriorEvaluator<'a, P, R> {
    /// Bind an evaluator to a galaxy.
    ///
    /// Arguments
    /// -----------------
    /// * `config`: the run configuration.
    /// * `model`: prior model.
    /// * `responses`: flux provider, must cover `config.num_bands` bands.
    /// * `mapping`: measurement-component mapping (fixes the number of components).
    /// * `galaxy`: the galaxy whose posterior is evaluated.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidConfiguration`] if the bands of the responses, the mapping and
    ///   the configuration disagree.
    /// * [`BlendfitError::ReferenceFluxMismatch`] if several reference bands are configured but
    ///   their number differs from the number of components, or if the galaxy does not carry
    ///   one reference flux per reference band.
    pub fn new(
        config: &'a Configuration,
        model: &'a P,
        responses: &'a R,
        mapping: &'a MeasurementComponentMap,
        galaxy: &'a Galaxy,
    ) -> Result<Self, BlendfitError> {
        if responses.num_bands() != config.num_bands
            || mapping.num_measurements() != config.num_bands
        {
            return Err(BlendfitError::InvalidConfiguration(format!(
                "band count mismatch: configuration {}, responses {}, mapping {}",
                config.num_bands,
                responses.num_bands(),
                mapping.num_measurements()
            )));
        }
        if !config.single_ref_band() && config.ref_band.len() != mapping.num_components() {
            return Err(BlendfitError::ReferenceFluxMismatch {
                expected: mapping.num_components(),
                got: config.ref_band.len(),
            });
        }
        if galaxy.ref_flux_data.len() != config.ref_band.len() {
            return Err(BlendfitError::ReferenceFluxMismatch {
                expected: config.ref_band.len(),
                got: galaxy.ref_flux_data.len(),
            });
        }

        Ok(PosteriorEvaluator {
            config,
            model,
            responses,
            mapping,
            galaxy,
            prior_norm: 0.0,
        })
    }

    /// Set the prior log-normalization subtracted by [`PosteriorEvaluator::log_posterior`].
    pub fn with_prior_norm(mut self, prior_norm: LogProb) -> Self {
        self.prior_norm = prior_norm;
        self
    }

    pub fn prior_norm(&self) -> LogProb {
        self.prior_norm
    }

    pub fn num_components(&self) -> usize {
        self.mapping.num_components()
    }

    /// Dimension of the sampled parameter space, `2 C`.
    pub fn ndim(&self) -> usize {
        2 * self.num_components()
    }

    pub fn galaxy(&self) -> &Galaxy {
        self.galaxy
    }

    fn split<'p>(
        &self,
        params: &'p [f64],
        per_component: usize,
    ) -> Result<&'p [f64], BlendfitError> {
        let expected = per_component * self.num_components();
        if params.len() != expected {
            return Err(BlendfitError::InvalidParameterLength(format!(
                "expected {expected} parameters for {} components, got {}",
                self.num_components(),
                params.len()
            )));
        }
        Ok(params)
    }

    /// Marginalized log-posterior at `params = [redshifts…, magnitudes…]`.
    ///
    /// Return
    /// ----------
    /// * `Ok(-inf)` outside the ordering and positivity constraints.
    /// * [`BlendfitError::MagnitudeOutsidePriorGrid`] if a magnitude lies outside the redshift
    ///   prior normalization grid.
    /// * [`BlendfitError::InvalidParameterLength`] if `params.len() != 2 C`.
    pub fn log_posterior(&self, params: &[f64]) -> Result<LogProb, BlendfitError> {
        let params = self.split(params, 2)?;
        let (redshifts, magnitudes) = params.split_at(self.num_components());
        let ln_prob = self.marginalize(redshifts, magnitudes, true)?;
        Ok(ln_prob - self.prior_norm)
    }

    /// Prior alone (template, redshift, correlation and selection terms) marginalized over
    /// templates; no likelihood and no normalization. This is what the evidence normalizer
    /// integrates.
    pub fn log_prior_marginal(&self, params: &[f64]) -> Result<LogProb, BlendfitError> {
        let params = self.split(params, 2)?;
        let (redshifts, magnitudes) = params.split_at(self.num_components());
        self.marginalize(redshifts, magnitudes, false)
    }

    /// Total prior at one discrete template assignment, used during prior calibration.
    ///
    /// `params = [redshifts…, template_continuous…, magnitudes…]`, where each continuous
    /// template coordinate is rounded to the nearest template index. Returns
    /// `ln(1 + ξ) + Σ_a [ln P(z_a | t_a, m_a) + ln P(t_a | m_a) + ln P(m_a)]`, without the
    /// selection effect.
    ///
    /// Return
    /// ----------
    /// * `Ok(-inf)` if a rounded template index lies outside `[0, num_templates - 1]` or the
    ///   ordering constraints fail.
    pub fn ln_total_prior(&self, params: &[f64]) -> Result<LogProb, BlendfitError> {
        let params = self.split(params, 3)?;
        let c = self.num_components();
        let redshifts = &params[..c];
        let templates_cont = &params[c..2 * c];
        let magnitudes = &params[2 * c..];

        let num_templates = self.responses.templates().num_templates() as f64;
        let templates_disc: Vec<f64> = templates_cont.iter().map(|t| t.round()).collect();
        let template_okay = templates_disc
            .iter()
            .all(|&t| t >= 0.0 && t <= num_templates - 1.0);

        if !template_okay
            || !self.mapping.check_ordering_constraints(
                redshifts,
                magnitudes,
                self.config.sort_redshifts,
            )
        {
            return Ok(f64::NEG_INFINITY);
        }

        let templates = self.responses.templates();
        let mut ln_prior = self.model.correlation_function(redshifts)?.ln_1p();
        for ((&z, &t), &m) in redshifts.iter().zip(&templates_disc).zip(magnitudes) {
            let template_type = templates.template_type(t as usize);
            ln_prior += self.model.ln_redshift_prior(z, template_type, m, true)?;
            ln_prior += self.model.ln_template_prior(template_type, m)?;
            ln_prior += self.model.ln_magnitude_prior(m);
        }
        Ok(ln_prior)
    }

    /// Flux log-likelihood `-½ χ²` over the non-reference bands.
    ///
    /// `model_flux` holds the blended model flux at `config.non_ref_bands`.
    pub fn ln_likelihood_flux(&self, model_flux: &[Flux]) -> LogProb {
        -0.5 * chi_square(
            &self.galaxy.flux_data_no_ref,
            model_flux,
            &self.galaxy.flux_sigma_no_ref,
        )
    }

    /// Reference-magnitude log-likelihood `-½ χ²` between observed and predicted reference flux.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::ReferenceFluxMismatch`] unless `total_ref_flux` has one entry per
    ///   reference flux of the galaxy.
    pub fn ln_likelihood_mag(&self, total_ref_flux: &[Flux]) -> Result<LogProb, BlendfitError> {
        if total_ref_flux.len() != self.galaxy.ref_flux_data.len() {
            return Err(BlendfitError::ReferenceFluxMismatch {
                expected: self.galaxy.ref_flux_data.len(),
                got: total_ref_flux.len(),
            });
        }
        Ok(-0.5
            * chi_square(
                &self.galaxy.ref_flux_data,
                total_ref_flux,
                &self.galaxy.ref_flux_sigma,
            ))
    }

    /// Terms evaluated once per point, before the template loop.
    fn point_terms(
        &self,
        redshifts: &[Redshift],
        magnitudes: &[Magnitude],
    ) -> Result<PointTerms, BlendfitError> {
        let possible_types = self.responses.templates().possible_types();
        let priors = redshifts
            .iter()
            .zip(magnitudes)
            .map(|(&z, &m)| self.model.ln_prior(z, m, possible_types))
            .collect::<Result<Vec<_>, BlendfitError>>()?;

        let correlation = self.model.correlation_function(redshifts)?.ln_1p();

        let component_flux = magnitudes.iter().map(|&m| mag_to_flux(m));
        let total_ref_flux: Vec<Flux> = if self.config.single_ref_band() {
            vec![component_flux.sum()]
        } else {
            component_flux.collect()
        };

        let selection_ref = self.config.selection_is_reference().then(|| {
            self.model
                .ln_selection(&total_ref_flux, &self.galaxy.ref_flux_sigma)
        });

        Ok(PointTerms {
            priors,
            correlation,
            total_ref_flux,
            selection_ref,
        })
    }

    /// Accumulate the blended flux of one template combination into `blend_flux`.
    ///
    /// Return
    /// ----------
    /// * `false` if a template has no flux in its reference band, in which case the
    ///   combination cannot reproduce the component magnitude.
    fn blend_combination(
        &self,
        fluxes: &FluxGrid,
        combination: &[usize],
        magnitudes: &[Magnitude],
        blend_flux: &mut [Flux],
    ) -> bool {
        blend_flux.iter_mut().for_each(|f| *f = 0.0);
        for (component, (&template, &mag)) in combination.iter().zip(magnitudes).enumerate() {
            let ref_band = if self.config.single_ref_band() {
                self.config.ref_band[0]
            } else {
                self.config.ref_band[component]
            };
            let ref_flux = fluxes.get(template, ref_band, component);
            if !(ref_flux > 0.0) {
                return false;
            }
            let scaling = mag_to_flux(mag) / ref_flux;
            let model = fluxes.template(template).column(component);
            for (band, f) in blend_flux.iter_mut().enumerate() {
                *f += model[band] * scaling * self.mapping.get(component, band);
            }
        }
        true
    }

    /// Discrete marginalization over `templates^C` at one point.
    fn marginalize(
        &self,
        redshifts: &[Redshift],
        magnitudes: &[Magnitude],
        with_likelihood: bool,
    ) -> Result<LogProb, BlendfitError> {
        if !self
            .mapping
            .check_ordering_constraints(redshifts, magnitudes, self.config.sort_redshifts)
        {
            return Ok(f64::NEG_INFINITY);
        }

        let terms = self.point_terms(redshifts, magnitudes)?;
        let templates = self.responses.templates();

        // Model fluxes are only needed for the likelihood or a band-dependent selection.
        let fluxes = (with_likelihood || terms.selection_ref.is_none())
            .then(|| self.responses.interp(redshifts));
        let ln_mag = if with_likelihood {
            self.ln_likelihood_mag(&terms.total_ref_flux)?
        } else {
            0.0
        };

        let mut blend_flux = vec![0.0; self.config.num_bands];
        let mut ln_prob = f64::NEG_INFINITY;

        for combination in (0..redshifts.len())
            .map(|_| 0..templates.num_templates())
            .multi_cartesian_product()
        {
            let mut ln_combination: LogProb = combination
                .iter()
                .enumerate()
                .map(|(component, &t)| terms.priors[component][templates.type_index(t)])
                .sum();

            if let Some(fluxes) = &fluxes {
                if !self.blend_combination(fluxes, &combination, magnitudes, &mut blend_flux) {
                    continue;
                }
            }

            ln_combination += match terms.selection_ref {
                Some(selection) => selection,
                None => {
                    let select_flux: Vec<Flux> = self
                        .config
                        .select_band
                        .iter()
                        .map(|&b| blend_flux[b])
                        .collect();
                    self.model
                        .ln_selection(&select_flux, &self.galaxy.sigma_at(&self.config.select_band))
                }
            };

            ln_combination += terms.correlation;

            if with_likelihood {
                let model_flux: Vec<Flux> = self
                    .config
                    .non_ref_bands
                    .iter()
                    .map(|&b| blend_flux[b])
                    .collect();
                ln_combination += self.ln_likelihood_flux(&model_flux) + ln_mag;
            }

            ln_prob = log_add_exp(ln_prob, ln_combination);
        }

        Ok(ln_prob)
    }
}

fn chi_square(data: &[f64], model: &[f64], sigma: &[f64]) -> f64 {
    data.iter()
        .zip(model)
        .zip(sigma)
        .map(|((&d, &m), &s)| ((d - m) / s).powi(2))
        .sum()
}
