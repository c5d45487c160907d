//! # Measurement-component mapping
//!
//! In a partially blended observation not every component contributes flux to every band
//! (e.g. a high-resolution band resolves the pair while a ground-based band does not).
//! [`MeasurementComponentMap`] records this as a `num_components × num_measurements` 0/1
//! matrix: entry `(c, m)` is `1` iff component `c` contributes to band `m`.
//!
//! When every component has the same visibility pattern the components are physically
//! interchangeable and the posterior is invariant under relabelling. The sampler then has to be
//! restricted to one canonical ordering (by redshift or by magnitude), see
//! [`MeasurementComponentMap::check_ordering_constraints`].
//!
//! ## Example
//!
//! ```rust
//! use blendfit::mapping::MeasurementComponentMap;
//!
//! // 3 bands, 2 components; band 0 is the reference band and sees both,
//! // band 1 only sees component 0, band 2 only sees component 1.
//! let spec = vec![vec![0, 1], vec![0], vec![1]];
//! let map = MeasurementComponentMap::build(Some(spec.as_slice()), 2, 3, &[0]).unwrap();
//! assert!(!map.redshifts_exchangeable());
//! assert_eq!(map.get(1, 1), 0.0);
//! ```
use nalgebra::DMatrix;

use crate::{
    blendfit_errors::BlendfitError,
    constants::{Magnitude, Redshift},
};

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementComponentMap {
    matrix: DMatrix<f64>,
    redshifts_exchangeable: bool,
}

impl MeasurementComponentMap {
    /// Build the mapping matrix.
    ///
    /// Arguments
    /// -----------------
    /// * `specification`: `None` for a fully blended source (every component in every band), or
    ///   one entry per band listing the (zero-based) components contributing to that band.
    /// * `num_components`: number of blended components.
    /// * `num_measurements`: number of bands.
    /// * `ref_band`: reference band index(es); their columns must contain every component.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::ReferenceBandNotCovered`] if a reference column is not all ones.
    /// * [`BlendfitError::InvalidMeasurementSpecification`] if the specification does not have
    ///   one entry per band or names a component that does not exist.
    pub fn build(
        specification: Option<&[Vec<usize>]>,
        num_components: usize,
        num_measurements: usize,
        ref_band: &[usize],
    ) -> Result<Self, BlendfitError> {
        if num_components == 0 {
            return Err(BlendfitError::InvalidMeasurementSpecification(
                "at least one component is required".into(),
            ));
        }

        let Some(spec) = specification else {
            return Ok(MeasurementComponentMap {
                matrix: DMatrix::from_element(num_components, num_measurements, 1.0),
                redshifts_exchangeable: true,
            });
        };

        if spec.len() != num_measurements {
            return Err(BlendfitError::InvalidMeasurementSpecification(format!(
                "expected one entry per band ({num_measurements}), got {}",
                spec.len()
            )));
        }

        let mut matrix = DMatrix::zeros(num_components, num_measurements);
        for (m, components) in spec.iter().enumerate() {
            for &c in components {
                if c >= num_components {
                    return Err(BlendfitError::InvalidMeasurementSpecification(format!(
                        "band {m} refers to component {c} but only {num_components} exist"
                    )));
                }
                matrix[(c, m)] = 1.0;
            }
        }

        if let Some(&band) = ref_band
            .iter()
            .find(|&&b| b >= num_measurements || matrix.column(b).iter().any(|&v| v != 1.0))
        {
            return Err(BlendfitError::ReferenceBandNotCovered(band));
        }

        let redshifts_exchangeable = num_components > 1
            && (1..num_components).all(|c| matrix.row(c) == matrix.row(0));

        Ok(MeasurementComponentMap {
            matrix,
            redshifts_exchangeable,
        })
    }

    pub fn num_components(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_measurements(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// `1.0` iff `component` contributes to `measurement`.
    #[inline]
    pub fn get(&self, component: usize, measurement: usize) -> f64 {
        self.matrix[(component, measurement)]
    }

    /// Whether the components share one visibility pattern and so need an ordering constraint.
    pub fn redshifts_exchangeable(&self) -> bool {
        self.redshifts_exchangeable
    }

    /// Check positivity and, for exchangeable blends, the canonical ordering of a point.
    ///
    /// Arguments
    /// -----------------
    /// * `redshifts`, `magnitudes`: one value per component.
    /// * `sort_redshifts`: order by redshift (`true`) or by magnitude (`false`).
    ///
    /// Return
    /// ----------
    /// * `true` if every redshift is `≥ 0` and, when more than one exchangeable component is
    ///   present, the chosen coordinate is non-decreasing.
    pub fn check_ordering_constraints(
        &self,
        redshifts: &[Redshift],
        magnitudes: &[Magnitude],
        sort_redshifts: bool,
    ) -> bool {
        let redshift_positive = redshifts.iter().all(|&z| z >= 0.0);
        if redshifts.len() > 1 && self.redshifts_exchangeable {
            let ordered = if sort_redshifts { redshifts } else { magnitudes };
            redshift_positive && ordered.windows(2).all(|w| w[1] >= w[0])
        } else {
            redshift_positive
        }
    }
}
