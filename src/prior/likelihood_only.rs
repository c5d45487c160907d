use crate::{
    blendfit_errors::BlendfitError,
    constants::{LogProb, Magnitude, Redshift},
    templates::TemplateType,
};

use super::PriorModel;

/// Flat prior: every factor is `ln 1 = 0` and the correlation function vanishes.
///
/// Used to isolate the likelihood, e.g. when checking a flux model against data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikelihoodOnly;

impl PriorModel for LikelihoodOnly {
    fn ln_template_prior(
        &self,
        _template_type: TemplateType,
        _ref_mag: Magnitude,
    ) -> Result<LogProb, BlendfitError> {
        Ok(0.0)
    }

    fn ln_redshift_prior(
        &self,
        _redshift: Redshift,
        _template_type: TemplateType,
        _ref_mag: Magnitude,
        _normalize: bool,
    ) -> Result<LogProb, BlendfitError> {
        Ok(0.0)
    }

    fn correlation_function(&self, _redshifts: &[Redshift]) -> Result<f64, BlendfitError> {
        Ok(0.0)
    }

    fn ln_magnitude_prior(&self, _magnitude: Magnitude) -> LogProb {
        0.0
    }
}

#[cfg(test)]
mod likelihood_only_test {
    use super::*;

    #[test]
    fn test_everything_flat() {
        let prior = LikelihoodOnly;
        assert_eq!(
            prior.ln_template_prior(TemplateType::Late, 40.0).unwrap(),
            0.0
        );
        // no normalization grid: any magnitude is accepted
        assert_eq!(
            prior
                .ln_redshift_prior(0.0, TemplateType::Early, 99.0, true)
                .unwrap(),
            0.0
        );
        assert_eq!(prior.correlation_function(&[0.1, 0.2, 0.3]).unwrap(), 0.0);
        assert_eq!(prior.ln_magnitude_prior(25.0), 0.0);
        assert_eq!(prior.ln_selection(&[1e-10], &[1e-11]), 0.0);
        assert_eq!(
            prior
                .ln_prior(1.0, 25.0, &[TemplateType::Early, TemplateType::Irregular])
                .unwrap(),
            vec![0.0, 0.0]
        );
    }
}
