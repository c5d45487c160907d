//! # Redshift prior normalization
//!
//! The unnormalized redshift prior `z^α exp(-(z/z0(m))^α)` depends on the reference magnitude
//! through `z0(m)`, so its integral over redshift differs from one magnitude to the next.
//! [`RedshiftPriorNormalization`] precomputes `ln(1 / ∫ P(z | t, m) dz)` on a magnitude grid
//! spanning `[ref_mag_lo, ref_mag_hi]` for every template type, and linearly interpolates it.
//!
//! The table must be rebuilt whenever the prior parameters or either grid change; queries
//! outside the magnitude grid are an error rather than an extrapolation.
use crate::{
    blendfit_errors::BlendfitError,
    constants::{LogProb, Magnitude, Redshift},
    conversion::{interp_linear, trapz},
    templates::TemplateType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RedshiftPriorNormalization {
    mag_grid: Vec<Magnitude>,
    norms: [Option<Vec<LogProb>>; 3],
}

impl RedshiftPriorNormalization {
    /// Integrate the unnormalized redshift prior over `z_grid` at every magnitude of `mag_grid`.
    ///
    /// Arguments
    /// -----------------
    /// * `mag_grid`: increasing magnitude grid.
    /// * `z_grid`: increasing redshift grid used for the trapezoidal integral.
    /// * `types`: template types to tabulate.
    /// * `ln_unnormalized`: `(z, type, mag) ↦ ln P(z | t, m)` without normalization.
    ///
    /// Return
    /// ----------
    /// * The normalization table. Non-finite densities (overflow, NaN) are dropped from the
    ///   integral together with their abscissa.
    pub fn compute<F>(
        mag_grid: Vec<Magnitude>,
        z_grid: &[Redshift],
        types: &[TemplateType],
        ln_unnormalized: F,
    ) -> Result<Self, BlendfitError>
    where
        F: Fn(Redshift, TemplateType, Magnitude) -> Result<LogProb, BlendfitError>,
    {
        let mut norms: [Option<Vec<LogProb>>; 3] = [None, None, None];

        for &t in types {
            let column = mag_grid
                .iter()
                .map(|&mag| {
                    let mut xs = Vec::with_capacity(z_grid.len());
                    let mut ys = Vec::with_capacity(z_grid.len());
                    for &z in z_grid {
                        let p = ln_unnormalized(z, t, mag)?.exp();
                        if p.is_finite() {
                            xs.push(z);
                            ys.push(p);
                        }
                    }
                    Ok((1.0 / trapz(&ys, &xs)).ln())
                })
                .collect::<Result<Vec<_>, BlendfitError>>()?;
            norms[t.index()] = Some(column);
        }

        Ok(RedshiftPriorNormalization { mag_grid, norms })
    }

    pub fn mag_range(&self) -> (Magnitude, Magnitude) {
        (
            self.mag_grid.first().copied().unwrap_or(f64::NAN),
            self.mag_grid.last().copied().unwrap_or(f64::NAN),
        )
    }

    /// Interpolated log-normalization of the redshift prior of `template_type` at `ref_mag`.
    pub fn ln_norm(
        &self,
        template_type: TemplateType,
        ref_mag: Magnitude,
    ) -> Result<LogProb, BlendfitError> {
        let column = self.norms[template_type.index()].as_ref().ok_or_else(|| {
            BlendfitError::UnknownTemplateType {
                context: "redshift prior normalization",
                label: template_type.to_string(),
            }
        })?;
        interp_linear(&self.mag_grid, column, ref_mag).ok_or_else(|| {
            let (lo, hi) = self.mag_range();
            BlendfitError::MagnitudeOutsidePriorGrid {
                magnitude: ref_mag,
                lo,
                hi,
            }
        })
    }
}
