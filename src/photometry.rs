//! # Photometric catalogue
//!
//! A [`Galaxy`] carries the flux measurements of one (possibly blended) object, already split
//! into reference-band and non-reference-band arrays as the posterior consumes them.
//! A [`Photometry`] is the ordered collection of galaxies of a run.
//!
//! ## Catalogue format
//!
//! [`Photometry::from_csv`] reads a comma-separated file without header, where `#` starts a
//! comment line. Magnitudes and magnitude errors are taken from the configured `mag_cols` and
//! `sigma_cols` (one per band, in band order) and the optional truth redshift from `spec_z_col`.
//!
//! ```text
//! # mag_0, err_0, mag_1, err_1, mag_2, err_2, z_spec
//! 24.31, 0.05, 23.87, 0.04, 23.52, 0.06, 0.84
//! ```
//!
//! ## Conversions
//!
//! * flux: `f = 10^(-0.4 m)`
//! * flux error: `f · sqrt((10^(0.4 σ) - 1)^2 + zp^2)` with `zp = 10^(0.4 zero_point_error) - 1`
//! * per-galaxy upper magnitude bound: `min(magnitude_limit, ref_mag_hi)`
use std::{io::Read, path::Path};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::{
    blendfit_errors::BlendfitError,
    config::Configuration,
    constants::{Flux, Magnitude, Redshift, POGSON},
    conversion::{mag_sigma_to_flux_sigma, mag_to_flux},
};

/// Flux measurements of one catalogue object.
///
/// Fields
/// -----------------
/// * `index` – position of the galaxy in its catalogue.
/// * `mag_data`, `mag_sigma` – measured magnitudes and errors, one per band.
/// * `flux_data`, `flux_sigma` – the same measurements as fluxes, one per band.
/// * `ref_flux_data`, `ref_flux_sigma` – fluxes of the reference band(s).
/// * `flux_data_no_ref`, `flux_sigma_no_ref` – fluxes of every non-reference band.
/// * `ref_mag_data` – magnitude in the first reference band.
/// * `ref_mag_hi` – faintest reference magnitude explored for this galaxy.
/// * `truth_redshift` – optional spectroscopic redshift, used by calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    pub index: usize,
    pub mag_data: Vec<Magnitude>,
    pub mag_sigma: Vec<f64>,
    pub flux_data: Vec<Flux>,
    pub flux_sigma: Vec<Flux>,
    pub ref_flux_data: Vec<Flux>,
    pub ref_flux_sigma: Vec<Flux>,
    pub flux_data_no_ref: Vec<Flux>,
    pub flux_sigma_no_ref: Vec<Flux>,
    pub ref_mag_data: Magnitude,
    pub ref_mag_hi: Magnitude,
    pub truth_redshift: Option<Redshift>,
}

impl Galaxy {
    /// Build a galaxy from measured magnitudes.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: catalogue index.
    /// * `mags`, `sigmas`: one magnitude and magnitude error per band.
    /// * `truth_redshift`: optional spectroscopic redshift.
    /// * `config`: provides band layout, zero-point errors and magnitude limits.
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::CatalogParse`] if the band count does not match the configuration or a
    ///   magnitude error is negative or not finite.
    pub fn from_magnitudes(
        index: usize,
        mags: Vec<Magnitude>,
        sigmas: Vec<f64>,
        truth_redshift: Option<Redshift>,
        config: &Configuration,
    ) -> Result<Self, BlendfitError> {
        if mags.len() != config.num_bands || sigmas.len() != config.num_bands {
            return Err(BlendfitError::CatalogParse(format!(
                "galaxy {index}: expected {} bands, got {} magnitudes and {} errors",
                config.num_bands,
                mags.len(),
                sigmas.len()
            )));
        }
        if let Some(s) = sigmas.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
            return Err(BlendfitError::CatalogParse(format!(
                "galaxy {index}: invalid magnitude error {s}"
            )));
        }

        let flux_data: Vec<Flux> = mags.iter().map(|&m| mag_to_flux(m)).collect();
        let flux_sigma: Vec<Flux> = flux_data
            .iter()
            .zip(sigmas.iter())
            .zip(config.zero_point_errors.iter())
            .map(|((&f, &s), &zp)| {
                mag_sigma_to_flux_sigma(f, s, 10f64.powf(POGSON * zp) - 1.0)
            })
            .collect();

        let pick = |values: &[f64], bands: &[usize]| -> Vec<f64> {
            bands.iter().map(|&b| values[b]).collect()
        };

        Ok(Galaxy {
            index,
            ref_flux_data: pick(&flux_data, &config.ref_band),
            ref_flux_sigma: pick(&flux_sigma, &config.ref_band),
            flux_data_no_ref: pick(&flux_data, &config.non_ref_bands),
            flux_sigma_no_ref: pick(&flux_sigma, &config.non_ref_bands),
            ref_mag_data: mags[config.ref_band[0]],
            ref_mag_hi: config.magnitude_limit.min(config.ref_mag_hi),
            mag_data: mags,
            mag_sigma: sigmas,
            flux_data,
            flux_sigma,
            truth_redshift,
        })
    }

    /// Flux errors at the given band indices.
    pub fn sigma_at(&self, bands: &[usize]) -> Vec<Flux> {
        bands.iter().map(|&b| self.flux_sigma[b]).collect()
    }
}

/// Ordered collection of galaxies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    galaxies: Vec<Galaxy>,
}

impl Photometry {
    /// Wrap already built galaxies. Their `index` fields are reassigned to their position.
    pub fn from_galaxies(mut galaxies: Vec<Galaxy>) -> Self {
        for (i, g) in galaxies.iter_mut().enumerate() {
            g.index = i;
        }
        Photometry { galaxies }
    }

    /// Read a comma-separated catalogue from disk.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        config: &Configuration,
    ) -> Result<Self, BlendfitError> {
        let file = std::fs::File::open(path)?;
        Photometry::from_reader(file, config)
    }

    /// Read a comma-separated catalogue from any reader.
    ///
    /// See the [module documentation](crate::photometry) for the expected layout.
    pub fn from_reader<R: Read>(reader: R, config: &Configuration) -> Result<Self, BlendfitError> {
        if config.mag_cols.len() != config.num_bands {
            return Err(BlendfitError::InvalidConfiguration(format!(
                "mag_cols has {} entries for {} bands",
                config.mag_cols.len(),
                config.num_bands
            )));
        }

        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let mut galaxies = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            let field = |col: usize| -> Result<f64, BlendfitError> {
                record
                    .get(col)
                    .ok_or_else(|| {
                        BlendfitError::CatalogParse(format!("row {index}: missing column {col}"))
                    })?
                    .parse::<f64>()
                    .map_err(|e| {
                        BlendfitError::CatalogParse(format!("row {index}, column {col}: {e}"))
                    })
            };

            let mags = config
                .mag_cols
                .iter()
                .map(|&c| field(c))
                .collect::<Result<Vec<_>, _>>()?;
            let sigmas = config
                .sigma_cols
                .iter()
                .map(|&c| field(c))
                .collect::<Result<Vec<_>, _>>()?;
            let truth = config.spec_z_col.map(field).transpose()?;

            galaxies.push(Galaxy::from_magnitudes(index, mags, sigmas, truth, config)?);
        }

        tracing::info!(num_galaxies = galaxies.len(), "photometric catalogue loaded");
        Ok(Photometry { galaxies })
    }

    pub fn len(&self) -> usize {
        self.galaxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.galaxies.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Galaxy> {
        self.galaxies.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Galaxy> {
        self.galaxies.iter()
    }

    /// Faintest per-galaxy reference magnitude bound across the catalogue.
    pub fn max_ref_mag_hi(&self) -> Option<Magnitude> {
        self.galaxies
            .iter()
            .map(|g| g.ref_mag_hi)
            .fold(None, |acc, m| Some(acc.map_or(m, |a: f64| a.max(m))))
    }
}

impl std::ops::Index<usize> for Photometry {
    type Output = Galaxy;

    fn index(&self, index: usize) -> &Self::Output {
        &self.galaxies[index]
    }
}

impl<'a> IntoIterator for &'a Photometry {
    type Item = &'a Galaxy;
    type IntoIter = std::slice::Iter<'a, Galaxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.galaxies.iter()
    }
}
