//! # Calibrated physical prior
//!
//! [`BpzPrior`] implements the magnitude-dependent type and redshift priors of Benítez (2000),
//! extended with a galaxy-galaxy correlation term for blended pairs.
//!
//! ## Template-type prior
//!
//! With `Δ = m - ref_mag_lo` and `N_t` the number of templates of type `t`:
//!
//! ```text
//! early, late : ln(f_t / N_t) - k_t Δ
//! irr         : ln(1 - f_early e^{-k_early Δ} - f_late e^{-k_late Δ}) - ln N_irr
//! ```
//!
//! ## Redshift prior
//!
//! ```text
//! ln P(z | t, m) = α_t ln z - (z / z0(m))^α_t + ln N(t, m),     z0(m) = z_0t + k_mt Δ
//! ```
//!
//! where `ln N(t, m)` comes from the precomputed [`RedshiftPriorNormalization`].
//!
//! ## Parameters
//!
//! [`PriorParameters`] decodes a flat vector of length `5 n - 2` for `n` template types, in the
//! order `k_t` and `f_t` for every type but the last, then `α_t`, `z_0t`, `k_mt` for every type.
//! The model keeps the normalization table consistent with its parameters: changing them goes
//! through [`BpzPrior::set_parameters`], which recomputes the table.
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::{
    blendfit_errors::BlendfitError,
    config::Configuration,
    constants::{Flux, LogProb, Magnitude, Redshift, LN_10, NUMBER_COUNT_SLOPE},
    conversion::{linspace, mag_to_flux},
    cosmology::Cosmology,
    templates::{TemplateSet, TemplateType},
};

use super::{normalization::RedshiftPriorNormalization, PriorModel};

/// Decoded parameters of one template type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeParameters {
    /// Magnitude decay rate of the type fraction (absent for the last type).
    pub k_t: Option<f64>,
    /// Type fraction at `ref_mag_lo` (absent for the last type).
    pub f_t: Option<f64>,
    /// Power-law index of the redshift distribution.
    pub alpha_t: f64,
    /// Characteristic redshift at `ref_mag_lo`.
    pub z_0t: f64,
    /// Magnitude slope of the characteristic redshift.
    pub k_mt: f64,
}

/// Flat prior parameter vector and its per-type decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorParameters {
    values: Vec<f64>,
    types: Vec<TemplateType>,
    per_type: [Option<TypeParameters>; 3],
}

impl PriorParameters {
    /// Decode `values` for the template types `types` (in parameter order).
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidPriorParameterCount`] unless `values.len() == 5 n - 2`.
    pub fn new(values: Vec<f64>, types: &[TemplateType]) -> Result<Self, BlendfitError> {
        let nt = types.len();
        let expected = (5 * nt).saturating_sub(2);
        if nt == 0 || values.len() != expected {
            return Err(BlendfitError::InvalidPriorParameterCount {
                expected,
                got: values.len(),
            });
        }

        let mut per_type = [None; 3];
        for (i, t) in types.iter().enumerate() {
            let (k_t, f_t) = if i + 1 < nt {
                (Some(values[i]), Some(values[i + nt - 1]))
            } else {
                (None, None)
            };
            per_type[t.index()] = Some(TypeParameters {
                k_t,
                f_t,
                alpha_t: values[i + 2 * nt - 2],
                z_0t: values[i + 3 * nt - 2],
                k_mt: values[i + 4 * nt - 2],
            });
        }

        Ok(PriorParameters {
            values,
            types: types.to_vec(),
            per_type,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn types(&self) -> &[TemplateType] {
        &self.types
    }

    pub fn get(&self, template_type: TemplateType) -> Option<&TypeParameters> {
        self.per_type[template_type.index()].as_ref()
    }

    /// Sum of the type fractions `f_t` over every type that carries one.
    pub fn fraction_sum(&self) -> f64 {
        self.per_type.iter().flatten().filter_map(|p| p.f_t).sum()
    }

    /// Same decoding, new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, BlendfitError> {
        PriorParameters::new(values, &self.types)
    }
}

/// Unnormalized `ln P(z | t, m)`.
fn ln_redshift_prior_unnormalized(
    params: &PriorParameters,
    ref_mag_lo: Magnitude,
    redshift: Redshift,
    template_type: TemplateType,
    ref_mag: Magnitude,
) -> Result<LogProb, BlendfitError> {
    let p = params
        .get(template_type)
        .ok_or_else(|| BlendfitError::UnknownTemplateType {
            context: "redshift prior",
            label: template_type.to_string(),
        })?;

    let first = if redshift == 0.0 {
        f64::NEG_INFINITY
    } else {
        p.alpha_t * redshift.ln()
    };
    let z0 = p.z_0t + p.k_mt * (ref_mag - ref_mag_lo);
    Ok(first - (redshift / z0).powf(p.alpha_t))
}

/// Calibrated physical prior.
///
/// Fields
/// -----------------
/// * `config` – bounds, correlation parameters and magnitude limit.
/// * `templates` – template set, for the per-type template counts.
/// * `cosmology` – background cosmology of the correlation function.
/// * `params` – decoded prior parameters.
/// * `normalization` – redshift prior normalization matching `params`.
#[derive(Debug, Clone)]
pub struct BpzPrior {
    config: Configuration,
    templates: TemplateSet,
    cosmology: Cosmology,
    params: PriorParameters,
    normalization: RedshiftPriorNormalization,
}

impl BpzPrior {
    /// Build the prior from the parameters stored in the configuration.
    pub fn new(config: &Configuration, templates: &TemplateSet) -> Result<Self, BlendfitError> {
        let params = PriorParameters::new(config.prior_params.clone(), templates.possible_types())?;
        BpzPrior::with_parameters(config, templates, params)
    }

    /// Build the prior from explicit parameters and precompute its redshift normalization.
    pub fn with_parameters(
        config: &Configuration,
        templates: &TemplateSet,
        params: PriorParameters,
    ) -> Result<Self, BlendfitError> {
        let normalization = Self::compute_normalization(config, &params)?;
        Ok(BpzPrior {
            config: config.clone(),
            templates: templates.clone(),
            cosmology: Cosmology::from_config(config),
            params,
            normalization,
        })
    }

    fn compute_normalization(
        config: &Configuration,
        params: &PriorParameters,
    ) -> Result<RedshiftPriorNormalization, BlendfitError> {
        let mag_grid = linspace(config.ref_mag_lo, config.ref_mag_hi, config.mag_grid_len);
        tracing::debug!(
            mag_grid_len = config.mag_grid_len,
            z_len = config.z_len,
            "computing redshift prior normalization"
        );
        RedshiftPriorNormalization::compute(
            mag_grid,
            &config.z_grid(),
            params.types(),
            |z, t, m| ln_redshift_prior_unnormalized(params, config.ref_mag_lo, z, t, m),
        )
    }

    pub fn parameters(&self) -> &PriorParameters {
        &self.params
    }

    pub fn normalization(&self) -> &RedshiftPriorNormalization {
        &self.normalization
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Replace the parameters and recompute the redshift normalization accordingly.
    pub fn set_parameters(&mut self, params: PriorParameters) -> Result<(), BlendfitError> {
        self.normalization = Self::compute_normalization(&self.config, &params)?;
        self.params = params;
        Ok(())
    }

    /// Flat hyper-prior on the parameters used during calibration.
    ///
    /// Return
    /// ----------
    /// * `-inf` if the type fractions sum above one or any parameter is negative, `0` otherwise.
    pub fn ln_calibration_prior(&self) -> LogProb {
        if self.params.fraction_sum() > 1.0 || self.params.values().iter().any(|&v| v < 0.0) {
            f64::NEG_INFINITY
        } else {
            0.0
        }
    }

    fn fraction_params(
        &self,
        template_type: TemplateType,
    ) -> Result<(f64, f64), BlendfitError> {
        self.params
            .get(template_type)
            .and_then(|p| Some((p.f_t?, p.k_t?)))
            .ok_or_else(|| BlendfitError::UnknownTemplateType {
                context: "template prior",
                label: template_type.to_string(),
            })
    }

    /// `f_t e^{-k_t Δ}` for a type carrying fraction parameters, `0` otherwise.
    fn decayed_fraction(&self, template_type: TemplateType, delta: f64) -> f64 {
        self.fraction_params(template_type)
            .map_or(0.0, |(f, k)| f * (-k * delta).exp())
    }
}

impl PriorModel for BpzPrior {
    fn ln_template_prior(
        &self,
        template_type: TemplateType,
        ref_mag: Magnitude,
    ) -> Result<LogProb, BlendfitError> {
        let delta = ref_mag - self.config.ref_mag_lo;
        match template_type {
            TemplateType::Early | TemplateType::Late => {
                let (f, k) = self.fraction_params(template_type)?;
                let n = self.templates.num_type(template_type) as f64;
                Ok((f / n).ln() - k * delta)
            }
            TemplateType::Irregular => {
                if self.params.get(TemplateType::Irregular).is_none() {
                    return Err(BlendfitError::UnknownTemplateType {
                        context: "template prior",
                        label: template_type.to_string(),
                    });
                }
                let early = self.decayed_fraction(TemplateType::Early, delta);
                let late = self.decayed_fraction(TemplateType::Late, delta);
                let n = self.templates.num_type(TemplateType::Irregular) as f64;
                let remaining = 1.0 - early - late;
                if remaining > 0.0 {
                    Ok(remaining.ln() - n.ln())
                } else {
                    Ok(f64::NEG_INFINITY)
                }
            }
        }
    }

    fn ln_redshift_prior(
        &self,
        redshift: Redshift,
        template_type: TemplateType,
        ref_mag: Magnitude,
        normalize: bool,
    ) -> Result<LogProb, BlendfitError> {
        let out = ln_redshift_prior_unnormalized(
            &self.params,
            self.config.ref_mag_lo,
            redshift,
            template_type,
            ref_mag,
        )?;
        if normalize {
            Ok(out + self.normalization.ln_norm(template_type, ref_mag)?)
        } else {
            Ok(out)
        }
    }

    fn correlation_function(&self, redshifts: &[Redshift]) -> Result<f64, BlendfitError> {
        match redshifts.len() {
            0 | 1 => Ok(0.0),
            2 => {
                let mut pair = [redshifts[0], redshifts[1]];
                // Only sorted when the sampler does not already order by redshift.
                if !self.config.sort_redshifts {
                    pair.sort_by(|a, b| a.total_cmp(b));
                }
                let separation = self
                    .cosmology
                    .comoving_separation(pair[0], pair[1])
                    .max(self.config.xi_r_cutoff);
                Ok((self.config.r0 / separation).powf(self.config.gamma))
            }
            n => Err(BlendfitError::UnsupportedComponentCount(n)),
        }
    }

    fn ln_magnitude_prior(&self, magnitude: Magnitude) -> LogProb {
        NUMBER_COUNT_SLOPE * (magnitude - self.config.ref_mag_hi) * LN_10
    }

    fn ln_selection(&self, flux: &[Flux], sigma: &[Flux]) -> LogProb {
        if sigma.is_empty() {
            return 0.0;
        }
        let flux_limit = mag_to_flux(self.config.magnitude_limit);
        flux.iter()
            .enumerate()
            .map(|(i, &f)| {
                let s = sigma[i.min(sigma.len() - 1)];
                let x = (f - flux_limit) / s;
                (0.5 * erfc(-x / std::f64::consts::SQRT_2)).ln()
            })
            .sum()
    }
}

#[cfg(test)]
mod bpz_test {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> Configuration {
        Configuration::builder()
            .num_bands(3)
            .z_len(400)
            .mag_grid_len(25)
            .build()
            .unwrap()
    }

    fn templates() -> TemplateSet {
        TemplateSet::from_labels(&[
            ("El", "early"),
            ("Sbc", "late"),
            ("Scd", "late"),
            ("Im", "irr"),
            ("SB2", "irr"),
            ("SB3", "irr"),
        ])
        .unwrap()
    }

    fn prior() -> BpzPrior {
        BpzPrior::new(&config(), &templates()).unwrap()
    }

    #[test]
    fn test_parameter_decoding() {
        let p = PriorParameters::new((0..13).map(|i| i as f64).collect(), &TemplateType::ALL)
            .unwrap();
        let early = p.get(TemplateType::Early).unwrap();
        let late = p.get(TemplateType::Late).unwrap();
        let irr = p.get(TemplateType::Irregular).unwrap();
        assert_eq!((early.k_t, early.f_t), (Some(0.0), Some(2.0)));
        assert_eq!((late.k_t, late.f_t), (Some(1.0), Some(3.0)));
        assert_eq!((irr.k_t, irr.f_t), (None, None));
        assert_eq!((early.alpha_t, late.alpha_t, irr.alpha_t), (4.0, 5.0, 6.0));
        assert_eq!((early.z_0t, late.z_0t, irr.z_0t), (7.0, 8.0, 9.0));
        assert_eq!((early.k_mt, late.k_mt, irr.k_mt), (10.0, 11.0, 12.0));
        assert_eq!(p.fraction_sum(), 5.0);
    }

    #[test]
    fn test_wrong_parameter_count() {
        let err = PriorParameters::new(vec![0.1; 12], &TemplateType::ALL).unwrap_err();
        assert_eq!(
            err,
            BlendfitError::InvalidPriorParameterCount {
                expected: 13,
                got: 12
            }
        );
    }

    #[test]
    fn test_template_prior_early_late() {
        let prior = prior();
        let m = 24.0;
        let expected = (0.35_f64 / 1.0).ln() - 0.450 * (m - 20.0);
        assert_relative_eq!(
            prior.ln_template_prior(TemplateType::Early, m).unwrap(),
            expected,
            epsilon = 1e-12
        );
        let expected = (0.50_f64 / 2.0).ln() - 0.147 * (m - 20.0);
        assert_relative_eq!(
            prior.ln_template_prior(TemplateType::Late, m).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_template_prior_irr_limit() {
        let prior = prior();
        let m = 24.0;
        let d: f64 = m - 20.0;
        let expected =
            (1.0 - 0.35 * (-0.450 * d).exp() - 0.50 * (-0.147 * d).exp()).ln() - 3.0_f64.ln();
        assert_relative_eq!(
            prior.ln_template_prior(TemplateType::Irregular, m).unwrap(),
            expected,
            epsilon = 1e-12
        );
        // both exponentials vanish for very faint magnitudes
        assert_relative_eq!(
            prior
                .ln_template_prior(TemplateType::Irregular, 1.0e4)
                .unwrap(),
            -(3.0_f64.ln()),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_template_prior_irr_not_finite_when_fractions_exceed_one() {
        let cfg = config();
        let tmps = templates();
        let mut values = DEFAULT_VALUES.to_vec();
        values[2] = 0.7;
        values[3] = 0.6;
        let params = PriorParameters::new(values, tmps.possible_types()).unwrap();
        let prior = BpzPrior::with_parameters(&cfg, &tmps, params).unwrap();
        assert!(!prior
            .ln_template_prior(TemplateType::Irregular, 20.0)
            .unwrap()
            .is_finite());
        assert!(prior.ln_calibration_prior().is_infinite());
    }

    #[test]
    fn test_template_prior_irr_negative_remainder_is_neg_inf() {
        let cfg = config();
        let tmps = templates();
        let mut values = DEFAULT_VALUES.to_vec();
        values[2] = 1.2;
        let params = PriorParameters::new(values, tmps.possible_types()).unwrap();
        let prior = BpzPrior::with_parameters(&cfg, &tmps, params).unwrap();
        assert_eq!(
            prior.ln_template_prior(TemplateType::Irregular, 20.0).unwrap(),
            f64::NEG_INFINITY
        );
        assert_eq!(
            prior.ln_template_prior(TemplateType::Irregular, 21.0).unwrap(),
            f64::NEG_INFINITY
        );
    }

    const DEFAULT_VALUES: [f64; 13] = crate::constants::DEFAULT_PRIOR_PARAMS;

    #[test]
    fn test_redshift_prior_zero_redshift() {
        let prior = prior();
        for t in TemplateType::ALL {
            for m in [20.0, 25.0, 31.5] {
                assert_eq!(
                    prior.ln_redshift_prior(0.0, t, m, false).unwrap(),
                    f64::NEG_INFINITY
                );
            }
        }
    }

    #[test]
    fn test_redshift_prior_value() {
        let prior = prior();
        let (z, m): (f64, f64) = (0.8, 23.0);
        let z0 = 0.390 + 0.0636 * 3.0;
        let expected = 1.806 * z.ln() - (z / z0).powf(1.806);
        assert_relative_eq!(
            prior
                .ln_redshift_prior(z, TemplateType::Late, m, false)
                .unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_redshift_prior_normalized_integrates_to_one() {
        let prior = prior();
        let z_grid = config().z_grid();
        for t in TemplateType::ALL {
            // on a magnitude grid node the interpolation is exact
            let m = 20.0 + 12.0 * 6.0 / 24.0;
            let density: Vec<f64> = z_grid
                .iter()
                .map(|&z| prior.ln_redshift_prior(z, t, m, true).unwrap().exp())
                .collect();
            assert_relative_eq!(
                crate::conversion::trapz(&density, &z_grid),
                1.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_redshift_prior_out_of_grid() {
        let prior = prior();
        let err = prior
            .ln_redshift_prior(1.0, TemplateType::Early, 40.0, true)
            .unwrap_err();
        assert!(matches!(
            err,
            BlendfitError::MagnitudeOutsidePriorGrid { magnitude, .. } if magnitude == 40.0
        ));
        // unnormalized prior has no grid restriction
        assert!(prior
            .ln_redshift_prior(1.0, TemplateType::Early, 40.0, false)
            .is_ok());
    }

    #[test]
    fn test_missing_type_errors_are_distinct() {
        let cfg = config();
        let tmps = TemplateSet::from_labels(&[("El", "early"), ("Im", "irr")]).unwrap();
        let params =
            PriorParameters::new(vec![0.4, 0.3, 2.0, 1.0, 0.4, 0.1, 0.1, 0.1], tmps.possible_types())
                .unwrap();
        let prior = BpzPrior::with_parameters(&cfg, &tmps, params).unwrap();

        assert_eq!(
            prior
                .ln_template_prior(TemplateType::Late, 22.0)
                .unwrap_err(),
            BlendfitError::UnknownTemplateType {
                context: "template prior",
                label: "late".into()
            }
        );
        assert_eq!(
            prior
                .ln_redshift_prior(0.5, TemplateType::Late, 22.0, true)
                .unwrap_err(),
            BlendfitError::UnknownTemplateType {
                context: "redshift prior",
                label: "late".into()
            }
        );
        // irr only uses the early fraction when late is absent
        let expected = (1.0 - 0.3 * (-0.4 * 2.0_f64).exp()).ln() - 0.0;
        assert_relative_eq!(
            prior
                .ln_template_prior(TemplateType::Irregular, 22.0)
                .unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_correlation_function() {
        let prior = prior();
        assert_eq!(prior.correlation_function(&[0.5]).unwrap(), 0.0);

        let cosmo = Cosmology::from_config(&config());
        let sep = cosmo.comoving_separation(0.5, 0.7);
        let expected = (5.0 / sep).powf(1.77);
        assert_relative_eq!(
            prior.correlation_function(&[0.5, 0.7]).unwrap(),
            expected,
            max_relative = 1e-12
        );

        // identical redshifts are clamped to the cutoff
        assert_relative_eq!(
            prior.correlation_function(&[0.5, 0.5]).unwrap(),
            (5.0_f64 / 0.1).powf(1.77),
            max_relative = 1e-12
        );

        assert_eq!(
            prior.correlation_function(&[0.1, 0.2, 0.3]).unwrap_err(),
            BlendfitError::UnsupportedComponentCount(3)
        );
    }

    #[test]
    fn test_correlation_sorting_only_when_not_sorting_redshifts() {
        // sort_redshifts = true: a decreasing pair gives a negative separation -> cutoff
        let sorted_prior = prior();
        assert_relative_eq!(
            sorted_prior.correlation_function(&[0.7, 0.5]).unwrap(),
            (5.0_f64 / 0.1).powf(1.77),
            max_relative = 1e-12
        );

        let cfg = Configuration::builder()
            .num_bands(3)
            .z_len(400)
            .mag_grid_len(25)
            .sort_redshifts(false)
            .build()
            .unwrap();
        let unsorted_prior = BpzPrior::new(&cfg, &templates()).unwrap();
        assert_relative_eq!(
            unsorted_prior.correlation_function(&[0.7, 0.5]).unwrap(),
            unsorted_prior.correlation_function(&[0.5, 0.7]).unwrap(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_magnitude_prior() {
        let prior = prior();
        assert_eq!(prior.ln_magnitude_prior(32.0), 0.0);
        assert_relative_eq!(
            prior.ln_magnitude_prior(27.0),
            0.6 * -5.0 * 10.0_f64.ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_calibration_prior() {
        let prior = prior();
        assert_eq!(prior.ln_calibration_prior(), 0.0);

        let cfg = config();
        let tmps = templates();
        let mut values = DEFAULT_VALUES.to_vec();
        values[5] = -0.1;
        let params = PriorParameters::new(values, tmps.possible_types()).unwrap();
        let negative = BpzPrior::with_parameters(&cfg, &tmps, params).unwrap();
        assert_eq!(negative.ln_calibration_prior(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_set_parameters_recomputes_normalization() {
        let mut prior = prior();
        let before = prior
            .normalization()
            .ln_norm(TemplateType::Early, 25.0)
            .unwrap();
        let mut values = DEFAULT_VALUES.to_vec();
        values[7] = 1.0; // z_0t(early)
        let params = prior.parameters().with_values(values).unwrap();
        prior.set_parameters(params).unwrap();
        let after = prior
            .normalization()
            .ln_norm(TemplateType::Early, 25.0)
            .unwrap();
        assert!((before - after).abs() > 1e-3);
    }

    #[test]
    fn test_selection_effect() {
        let prior = prior();
        let limit = mag_to_flux(32.0);
        // exactly at the limit: half of the sources are detected
        assert_relative_eq!(
            prior.ln_selection(&[limit], &[limit]),
            0.5_f64.ln(),
            epsilon = 1e-12
        );
        // far brighter than the limit: always detected
        assert_relative_eq!(
            prior.ln_selection(&[1e6 * limit], &[limit]),
            0.0,
            epsilon = 1e-12
        );
        assert_eq!(prior.ln_selection(&[limit], &[]), 0.0);
    }
}
