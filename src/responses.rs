//! # Template flux responses
//!
//! The posterior never integrates spectra itself: it asks a [`FluxResponses`] provider for the
//! predicted flux of every template in every band, at the redshift of every blended component.
//! The answer is a [`FluxGrid`], indexed `[template, band, component]`.
//!
//! [`TabulatedResponses`] is the in-crate provider: fluxes precomputed on a redshift grid for
//! every `(template, band)` pair, linearly interpolated in redshift.
//!
//! ## Structure
//!
//! ```text
//! FluxGrid
//! └── per template: DMatrix<f64>  (num_bands × num_components)
//! ```
use nalgebra::DMatrix;

use crate::{blendfit_errors::BlendfitError, constants::Redshift, templates::TemplateSet};

/// Predicted fluxes, one `num_bands × num_components` matrix per template.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxGrid {
    per_template: Vec<DMatrix<f64>>,
}

impl FluxGrid {
    /// Wrap one `bands × components` matrix per template.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidConfiguration`] if the matrices do not share a shape.
    pub fn new(per_template: Vec<DMatrix<f64>>) -> Result<Self, BlendfitError> {
        if let Some(first) = per_template.first() {
            let shape = first.shape();
            if per_template.iter().any(|m| m.shape() != shape) {
                return Err(BlendfitError::InvalidConfiguration(
                    "all templates of a flux grid must share the same (band, component) shape"
                        .into(),
                ));
            }
        }
        Ok(FluxGrid { per_template })
    }

    pub fn num_templates(&self) -> usize {
        self.per_template.len()
    }

    pub fn num_bands(&self) -> usize {
        self.per_template.first().map_or(0, |m| m.nrows())
    }

    pub fn num_components(&self) -> usize {
        self.per_template.first().map_or(0, |m| m.ncols())
    }

    /// Flux of `template` in `band` for `component`.
    #[inline]
    pub fn get(&self, template: usize, band: usize, component: usize) -> f64 {
        self.per_template[template][(band, component)]
    }

    /// The `bands × components` matrix of one template.
    pub fn template(&self, template: usize) -> &DMatrix<f64> {
        &self.per_template[template]
    }
}

/// Provider of model fluxes for every template, band and blended component.
///
/// Implementations must be pure: the same redshifts always give the same grid, so the
/// posterior can be evaluated repeatedly and reentrantly.
pub trait FluxResponses {
    /// The template set whose fluxes are predicted.
    fn templates(&self) -> &TemplateSet;

    /// Number of photometric bands.
    fn num_bands(&self) -> usize;

    /// Predicted non-negative fluxes at `redshifts` (one per component).
    fn interp(&self, redshifts: &[Redshift]) -> FluxGrid;
}

/// Template fluxes tabulated on a redshift grid.
///
/// Fields
/// -----------------
/// * `templates` – the template set, one entry per table row.
/// * `z_grid` – strictly increasing redshift grid.
/// * `table` – `table[template]` is a `num_bands × z_grid.len()` matrix of fluxes.
#[derive(Debug, Clone)]
pub struct TabulatedResponses {
    templates: TemplateSet,
    z_grid: Vec<Redshift>,
    table: Vec<DMatrix<f64>>,
}

impl TabulatedResponses {
    /// Build a tabulated provider.
    ///
    /// Arguments
    /// -----------------
    /// * `templates`: the template set.
    /// * `z_grid`: strictly increasing redshift grid (at least two points).
    /// * `table`: one `num_bands × z_grid.len()` matrix per template.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::InvalidConfiguration`] on inconsistent shapes, a non-increasing grid
    ///   or negative fluxes.
    pub fn new(
        templates: TemplateSet,
        z_grid: Vec<Redshift>,
        table: Vec<DMatrix<f64>>,
    ) -> Result<Self, BlendfitError> {
        let invalid = |msg: &str| Err(BlendfitError::InvalidConfiguration(msg.to_string()));

        if z_grid.len() < 2 || z_grid.windows(2).any(|w| w[1] <= w[0]) {
            return invalid("the response redshift grid must be strictly increasing");
        }
        if table.len() != templates.num_templates() {
            return invalid("the response table needs one matrix per template");
        }
        let num_bands = table[0].nrows();
        if num_bands == 0
            || table
                .iter()
                .any(|m| m.nrows() != num_bands || m.ncols() != z_grid.len())
        {
            return invalid("every response matrix must be num_bands × z_grid.len()");
        }
        if table.iter().any(|m| m.iter().any(|&f| !(f >= 0.0))) {
            return invalid("template fluxes must be non-negative");
        }

        Ok(TabulatedResponses {
            templates,
            z_grid,
            table,
        })
    }

    pub fn z_grid(&self) -> &[Redshift] {
        &self.z_grid
    }

    /// Interpolated flux of one template in one band, clamped to the table edges.
    fn flux_at(&self, template: usize, band: usize, z: Redshift) -> f64 {
        let row = self.table[template].row(band);
        let last = self.z_grid.len() - 1;
        if z <= self.z_grid[0] {
            return row[0];
        }
        if z >= self.z_grid[last] {
            return row[last];
        }
        let upper = self.z_grid.partition_point(|&v| v < z).clamp(1, last);
        let (z0, z1) = (self.z_grid[upper - 1], self.z_grid[upper]);
        let (f0, f1) = (row[upper - 1], row[upper]);
        f0 + (f1 - f0) * (z - z0) / (z1 - z0)
    }
}

impl FluxResponses for TabulatedResponses {
    fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    fn num_bands(&self) -> usize {
        self.table[0].nrows()
    }

    fn interp(&self, redshifts: &[Redshift]) -> FluxGrid {
        let num_bands = self.num_bands();
        let per_template = (0..self.templates.num_templates())
            .map(|t| {
                DMatrix::from_fn(num_bands, redshifts.len(), |b, c| {
                    self.flux_at(t, b, redshifts[c])
                })
            })
            .collect();
        FluxGrid { per_template }
    }
}

#[cfg(test)]
mod responses_test {
    use super::*;
    use crate::templates::TemplateSet;
    use approx::assert_relative_eq;

    fn responses() -> TabulatedResponses {
        let templates = TemplateSet::from_labels(&[("e", "early"), ("i", "irr")]).unwrap();
        let z_grid = vec![0.0, 1.0, 2.0];
        let table = vec![
            DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 10.0, 20.0, 30.0]),
            DMatrix::from_row_slice(2, 3, &[5.0, 5.0, 5.0, 1.0, 0.0, 1.0]),
        ];
        TabulatedResponses::new(templates, z_grid, table).unwrap()
    }

    #[test]
    fn test_interp_shape_and_values() {
        let r = responses();
        let grid = r.interp(&[0.5, 1.5]);
        assert_eq!(grid.num_templates(), 2);
        assert_eq!(grid.num_bands(), 2);
        assert_eq!(grid.num_components(), 2);
        assert_relative_eq!(grid.get(0, 0, 0), 1.5);
        assert_relative_eq!(grid.get(0, 1, 1), 25.0);
        assert_relative_eq!(grid.get(1, 1, 0), 0.5);
    }

    #[test]
    fn test_interp_clamps_edges() {
        let r = responses();
        let grid = r.interp(&[5.0]);
        assert_relative_eq!(grid.get(0, 0, 0), 3.0);
        let grid = r.interp(&[-1.0]);
        assert_relative_eq!(grid.get(0, 1, 0), 10.0);
    }

    #[test]
    fn test_invalid_tables() {
        let templates = TemplateSet::from_labels(&[("e", "early")]).unwrap();
        assert!(TabulatedResponses::new(
            templates.clone(),
            vec![0.0, 0.0],
            vec![DMatrix::zeros(1, 2)]
        )
        .is_err());
        assert!(TabulatedResponses::new(
            templates.clone(),
            vec![0.0, 1.0],
            vec![DMatrix::from_element(1, 2, -1.0)]
        )
        .is_err());
        assert!(
            TabulatedResponses::new(templates, vec![0.0, 1.0], vec![DMatrix::zeros(1, 3)])
                .is_err()
        );
    }

    #[test]
    fn test_flux_grid_shape_check() {
        assert!(FluxGrid::new(vec![DMatrix::zeros(2, 1), DMatrix::zeros(3, 1)]).is_err());
        let g = FluxGrid::new(vec![DMatrix::from_element(2, 1, 4.0)]).unwrap();
        assert_eq!(g.template(0)[(1, 0)], 4.0);
    }
}
