//! # Unit cube → physical parameters
//!
//! Nested sampling draws points uniformly in `[0, 1]^{2C}`. [`PriorTransform`] maps such a
//! point affinely onto the parameter box of [`crate::posterior::PosteriorEvaluator`]:
//! the first `C` coordinates onto redshift, the last `C` onto reference magnitude
//! `[ref_mag_lo, ref_mag_hi(galaxy)]`.
//!
//! Two redshift conventions exist:
//!
//! * [`RedshiftScaling::Standard`] – `z = z_lo + u (z_hi - z_lo)`.
//! * [`RedshiftScaling::ZeroBased`] – `z = z_lo + u z_hi`, for samplers that integrate from
//!   zero and only fold `z_lo` in as a shift.
use serde::{Deserialize, Serialize};

use crate::{blendfit_errors::BlendfitError, config::Configuration, constants::Magnitude};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedshiftScaling {
    #[default]
    Standard,
    ZeroBased,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorTransform {
    num_components: usize,
    scale: Vec<f64>,
    shift: Vec<f64>,
}

impl PriorTransform {
    /// Build the transform for one galaxy.
    ///
    /// Arguments
    /// -----------------
    /// * `config`: provides `z_lo`, `z_hi` and `ref_mag_lo`.
    /// * `ref_mag_hi`: the galaxy's upper magnitude bound.
    /// * `num_components`: number of blended components `C`.
    /// * `scaling`: redshift convention.
    pub fn new(
        config: &Configuration,
        ref_mag_hi: Magnitude,
        num_components: usize,
        scaling: RedshiftScaling,
    ) -> Self {
        let z_scale = match scaling {
            RedshiftScaling::Standard => config.z_hi - config.z_lo,
            RedshiftScaling::ZeroBased => config.z_hi,
        };
        let mag_scale = ref_mag_hi - config.ref_mag_lo;

        let scale = [vec![z_scale; num_components], vec![mag_scale; num_components]].concat();
        let shift = [
            vec![config.z_lo; num_components],
            vec![config.ref_mag_lo; num_components],
        ]
        .concat();

        PriorTransform {
            num_components,
            scale,
            shift,
        }
    }

    pub fn ndim(&self) -> usize {
        2 * self.num_components
    }

    fn check_len(&self, len: usize) -> Result<(), BlendfitError> {
        if len != self.ndim() {
            return Err(BlendfitError::InvalidParameterLength(format!(
                "prior transform expects {} coordinates, got {len}",
                self.ndim()
            )));
        }
        Ok(())
    }

    /// Map a unit-cube point to `[redshifts…, magnitudes…]`.
    pub fn transform(&self, cube: &[f64]) -> Result<Vec<f64>, BlendfitError> {
        self.check_len(cube.len())?;
        Ok(cube
            .iter()
            .zip(self.scale.iter().zip(&self.shift))
            .map(|(&u, (&scale, &shift))| u * scale + shift)
            .collect())
    }

    /// Map physical parameters back into the unit cube.
    pub fn inverse(&self, params: &[f64]) -> Result<Vec<f64>, BlendfitError> {
        self.check_len(params.len())?;
        Ok(params
            .iter()
            .zip(self.scale.iter().zip(&self.shift))
            .map(|(&p, (&scale, &shift))| (p - shift) / scale)
            .collect())
    }
}
