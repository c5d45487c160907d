//! # Prior models
//!
//! A blended source with `C` components is described by one `(redshift, template, magnitude)`
//! triple per component. The joint prior used by the posterior is
//!
//! ```text
//! p({z}, {t}, {m}) = [1 + ξ({z})] Π_a  P(z_a | t_a, m_a) P(t_a | m_a) P(m_a)
//! ```
//!
//! where `ξ` is the galaxy-galaxy correlation function. The [`PriorModel`] trait exposes these
//! factors (in natural-log space) plus the selection-effect term. Two implementations exist:
//!
//! * [`bpz::BpzPrior`] – the calibrated physical prior (type fractions decaying with magnitude,
//!   power-law × exponential redshift distributions, power-law correlation function).
//! * [`likelihood_only::LikelihoodOnly`] – every factor is flat, isolating the likelihood.
//!
//! The posterior evaluator is generic over `PriorModel`; the choice is made by injecting one
//! implementation or the other, never by subclassing.
//!
//! ## See also
//! * [`crate::posterior::PosteriorEvaluator`] – consumes a `PriorModel`.
//! * [`normalization::RedshiftPriorNormalization`] – per-type magnitude → log-normalization table.
pub mod bpz;
pub mod likelihood_only;
pub mod normalization;

use crate::{
    blendfit_errors::BlendfitError,
    constants::{Flux, LogProb, Magnitude, Redshift},
    templates::TemplateType,
};

/// Log-prior factors of a blended-source model.
///
/// All methods are pure functions of their arguments and of the model's immutable
/// parameters, so a single model can be shared by concurrent evaluators.
pub trait PriorModel {
    /// `ln P(t | m)`: probability of a template of type `template_type` given its reference
    /// magnitude, already divided by the number of templates of that type.
    fn ln_template_prior(
        &self,
        template_type: TemplateType,
        ref_mag: Magnitude,
    ) -> Result<LogProb, BlendfitError>;

    /// `ln P(z | t, m)`, optionally normalized over the redshift grid.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::MagnitudeOutsidePriorGrid`] if `normalize` and `ref_mag` lies outside
    ///   the precomputed normalization grid.
    fn ln_redshift_prior(
        &self,
        redshift: Redshift,
        template_type: TemplateType,
        ref_mag: Magnitude,
        normalize: bool,
    ) -> Result<LogProb, BlendfitError>;

    /// Galaxy-galaxy correlation `ξ({z})` of the blended components (linear, not log).
    fn correlation_function(&self, redshifts: &[Redshift]) -> Result<f64, BlendfitError>;

    /// `ln P(m)`: magnitude number-count prior.
    fn ln_magnitude_prior(&self, magnitude: Magnitude) -> LogProb;

    /// Log-probability that a source with the given true fluxes enters the catalogue.
    ///
    /// `flux` and `sigma` are index-aligned; a flat prior ignores both.
    fn ln_selection(&self, _flux: &[Flux], _sigma: &[Flux]) -> LogProb {
        0.0
    }

    /// Per-type `ln P(z | t, m) + ln P(t | m)` for every type in `types`.
    fn ln_prior(
        &self,
        redshift: Redshift,
        ref_mag: Magnitude,
        types: &[TemplateType],
    ) -> Result<Vec<LogProb>, BlendfitError> {
        types
            .iter()
            .map(|&t| {
                Ok(self.ln_redshift_prior(redshift, t, ref_mag, true)?
                    + self.ln_template_prior(t, ref_mag)?)
            })
            .collect()
    }
}
