#![allow(dead_code)]

use blendfit::config::Configuration;
use blendfit::photometry::{Galaxy, Photometry};
use blendfit::responses::TabulatedResponses;
use blendfit::templates::TemplateSet;
use nalgebra::DMatrix;

/// Three bands, reference band 0, coarse grids so tests stay fast.
pub fn config() -> Configuration {
    Configuration::builder()
        .num_bands(3)
        .z_lo(0.0)
        .z_hi(3.0)
        .z_len(200)
        .ref_mag_lo(20.0)
        .ref_mag_hi(28.0)
        .mag_grid_len(30)
        .build()
        .unwrap()
}

/// One template per type, fluxes tabulated on `z = 0, 0.5, …, 3`.
pub fn responses() -> TabulatedResponses {
    let templates =
        TemplateSet::from_labels(&[("El", "early"), ("Sbc", "late"), ("Im", "irr")]).unwrap();
    let z_grid: Vec<f64> = (0..=6).map(|i| 0.5 * i as f64).collect();
    let early = DMatrix::from_fn(3, 7, |b, z| 1.0 + 0.4 * b as f64 * z as f64);
    let late = DMatrix::from_fn(3, 7, |b, z| 1.0 + 0.15 * b as f64 * z as f64);
    let irr = DMatrix::from_fn(3, 7, |b, z| 1.0 + 0.05 * b as f64 * (6 - z) as f64);
    TabulatedResponses::new(templates, z_grid, vec![early, late, irr]).unwrap()
}

pub fn photometry(cfg: &Configuration) -> Photometry {
    let galaxies = vec![
        Galaxy::from_magnitudes(0, vec![23.0, 22.6, 22.2], vec![0.05; 3], Some(0.8), cfg).unwrap(),
        Galaxy::from_magnitudes(1, vec![24.0, 23.9, 23.8], vec![0.08; 3], Some(1.1), cfg).unwrap(),
    ];
    Photometry::from_galaxies(galaxies)
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("blendfit_it_{name}_{}.json", std::process::id()))
}
