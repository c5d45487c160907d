//! # Prior evidence normalization
//!
//! Marginalizing over templates is a sum, not an average, and the ordering constraint of
//! exchangeable components removes part of the parameter box, so the prior seen by the sampler
//! is not normalized. [`EvidenceNormalizer`] integrates the prior alone
//! ([`PosteriorEvaluator::log_prior_marginal`]) with nested sampling over the same unit cube as
//! the posterior. Its log-evidence, `prior_norm`, is then subtracted from every posterior
//! evaluation so log-evidences are comparable across galaxies and component counts.
//!
//! The normalization depends on the galaxy (through `ref_mag_hi` and the selection effect),
//! the number of components and the measurement-component mapping; it must be recomputed
//! whenever one of them changes.
use serde::{Deserialize, Serialize};

use crate::{
    blendfit_errors::BlendfitError,
    constants::LogProb,
    nested_sampling::{NestedSampler, SamplerOptions},
    posterior::PosteriorEvaluator,
    prior::PriorModel,
    prior_transform::PriorTransform,
    responses::FluxResponses,
};

/// Log-evidence of the prior alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorNormalization {
    pub log_z: LogProb,
    pub log_z_err: f64,
}

/// Runs the prior-only integral with a given sampler.
pub struct EvidenceNormalizer<'s, S: NestedSampler + ?Sized> {
    sampler: &'s S,
    options: SamplerOptions,
}

impl<'s, S: NestedSampler + ?Sized> EvidenceNormalizer<'s, S> {
    pub fn new(sampler: &'s S, options: SamplerOptions) -> Self {
        EvidenceNormalizer { sampler, options }
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    /// Integrate the template-marginalized prior of `evaluator` over the box of `transform`.
    ///
    /// Arguments
    /// -----------------
    /// * `evaluator`: bound to the galaxy, component count and mapping to normalize.
    /// * `transform`: the same unit cube → parameter map used for the posterior.
    ///
    /// Return
    /// ----------
    /// * The prior log-evidence, or the first error raised by the prior (for instance
    ///   [`BlendfitError::MagnitudeOutsidePriorGrid`]).
    /// * [`BlendfitError::InvalidParameterLength`] if the transform and the evaluator disagree
    ///   on the dimension.
    pub fn normalize<P, R>(
        &self,
        evaluator: &PosteriorEvaluator<'_, P, R>,
        transform: &PriorTransform,
    ) -> Result<PriorNormalization, BlendfitError>
    where
        P: PriorModel + ?Sized,
        R: FluxResponses + ?Sized,
    {
        if transform.ndim() != evaluator.ndim() {
            return Err(BlendfitError::InvalidParameterLength(format!(
                "prior transform has {} dimensions, the evaluator {}",
                transform.ndim(),
                evaluator.ndim()
            )));
        }

        let mut log_prior = |params: &[f64]| evaluator.log_prior_marginal(params);
        let prior_transform = |cube: &[f64]| transform.transform(cube);
        let result = self.sampler.sample(
            &mut log_prior,
            &prior_transform,
            evaluator.ndim(),
            &self.options,
        )?;

        tracing::debug!(
            galaxy = evaluator.galaxy().index,
            num_components = evaluator.num_components(),
            log_z = result.log_z,
            "prior normalization computed"
        );

        Ok(PriorNormalization {
            log_z: result.log_z,
            log_z_err: result.log_z_err,
        })
    }
}

#[cfg(test)]
mod evidence_test {
    use super::*;
    use crate::{
        config::Configuration,
        mapping::MeasurementComponentMap,
        nested_sampling::classic::ClassicNestedSampler,
        photometry::Galaxy,
        prior::likelihood_only::LikelihoodOnly,
        prior_transform::RedshiftScaling,
        responses::TabulatedResponses,
        templates::TemplateSet,
    };
    use nalgebra::DMatrix;

    fn setup() -> (Configuration, TabulatedResponses, Galaxy) {
        let cfg = Configuration::builder()
            .num_bands(2)
            .z_hi(3.0)
            .ref_mag_hi(26.0)
            .build()
            .unwrap();
        let templates =
            TemplateSet::from_labels(&[("a", "early"), ("b", "late"), ("c", "irr")]).unwrap();
        let table = vec![DMatrix::from_element(2, 2, 1.0); 3];
        let responses = TabulatedResponses::new(templates, vec![0.0, 3.0], table).unwrap();
        let gal = Galaxy::from_magnitudes(0, vec![24.0, 24.5], vec![0.1, 0.1], None, &cfg).unwrap();
        (cfg, responses, gal)
    }

    #[test]
    fn test_flat_prior_normalization() {
        let (cfg, responses, gal) = setup();
        let sampler = ClassicNestedSampler::default();
        let options = SamplerOptions::default().with_seed(Some(4));
        let normalizer = EvidenceNormalizer::new(&sampler, options);

        // one component, flat prior: the marginal is ln 3 everywhere
        let map = MeasurementComponentMap::build(None, 1, 2, &cfg.ref_band).unwrap();
        let eval = PosteriorEvaluator::new(&cfg, &LikelihoodOnly, &responses, &map, &gal).unwrap();
        let transform = PriorTransform::new(&cfg, gal.ref_mag_hi, 1, RedshiftScaling::Standard);
        let norm = normalizer.normalize(&eval, &transform).unwrap();
        assert!((norm.log_z - 3.0_f64.ln()).abs() < 1e-9, "{}", norm.log_z);

        // two exchangeable components: 9 combinations on the ordered half of the box
        let map = MeasurementComponentMap::build(None, 2, 2, &cfg.ref_band).unwrap();
        let eval = PosteriorEvaluator::new(&cfg, &LikelihoodOnly, &responses, &map, &gal).unwrap();
        let transform = PriorTransform::new(&cfg, gal.ref_mag_hi, 2, RedshiftScaling::Standard);
        let norm = normalizer.normalize(&eval, &transform).unwrap();
        assert!((norm.log_z - 4.5_f64.ln()).abs() < 0.25, "{}", norm.log_z);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (cfg, responses, gal) = setup();
        let sampler = ClassicNestedSampler::default();
        let normalizer = EvidenceNormalizer::new(&sampler, SamplerOptions::default());
        let map = MeasurementComponentMap::build(None, 1, 2, &cfg.ref_band).unwrap();
        let eval = PosteriorEvaluator::new(&cfg, &LikelihoodOnly, &responses, &map, &gal).unwrap();
        let transform = PriorTransform::new(&cfg, gal.ref_mag_hi, 2, RedshiftScaling::Standard);
        assert!(matches!(
            normalizer.normalize(&eval, &transform),
            Err(BlendfitError::InvalidParameterLength(_))
        ));
    }
}
