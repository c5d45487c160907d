mod common;

use blendfit::calibration::CalibrationOptions;
use blendfit::mapping::MeasurementComponentMap;
use blendfit::photoz::Photoz;
use blendfit::posterior::PosteriorEvaluator;
use blendfit::prior::bpz::BpzPrior;
use blendfit::prior_transform::{PriorTransform, RedshiftScaling};
use blendfit::responses::FluxResponses;
use proptest::prelude::*;

use crate::common::{config, photometry, responses};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn negative_redshift_has_zero_posterior(
        z_neg in -5.0f64..-1e-6,
        z_other in 0.0f64..3.0,
        m0 in 20.0f64..28.0,
        m1 in 20.0f64..28.0,
    ) {
        let cfg = config();
        let resp = responses();
        let model = BpzPrior::new(&cfg, resp.templates()).unwrap();
        let phot = photometry(&cfg);
        let map = MeasurementComponentMap::build(None, 2, 3, &cfg.ref_band).unwrap();
        let eval = PosteriorEvaluator::new(&cfg, &model, &resp, &map, &phot[0]).unwrap();

        prop_assert_eq!(eval.log_posterior(&[z_neg, z_other, m0, m1]).unwrap(), f64::NEG_INFINITY);
        prop_assert_eq!(eval.log_prior_marginal(&[z_neg, z_other, m0, m1]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn unit_cube_maps_inside_prior_box(u in proptest::collection::vec(0.0f64..=1.0, 4)) {
        let cfg = config();
        let transform = PriorTransform::new(&cfg, 27.0, 2, RedshiftScaling::Standard);
        let p = transform.transform(&u).unwrap();
        prop_assert!(p[..2].iter().all(|z| (cfg.z_lo..=cfg.z_hi).contains(z)));
        prop_assert!(p[2..].iter().all(|m| (cfg.ref_mag_lo..=27.0).contains(m)));
    }
}

#[test]
fn test_calibration_through_photoz() {
    let cfg = config();
    let resp = responses();
    let model = BpzPrior::new(&cfg, resp.templates()).unwrap();
    let phot = photometry(&cfg);
    let mut pz = Photoz::new(cfg, model, resp, phot).unwrap();

    let before = pz.model().parameters().clone();
    let options = CalibrationOptions {
        iterations: 20,
        seed: Some(3),
        ..CalibrationOptions::default()
    };
    let result = pz.calibrate(&options).unwrap();
    assert!(result.ln_posterior.is_finite());
    assert_eq!(pz.model().parameters(), &result.params);
    if result.accepted == 0 {
        assert_eq!(result.params, before);
    }
}
