//! # Background cosmology
//!
//! Line-of-sight comoving distances for a ΛCDM background with curvature term, used by the
//! galaxy-galaxy correlation function to turn a pair of redshifts into a physical separation.
//!
//! ```text
//! E(z)   = sqrt(Ωm (1+z)^3 + Ωk (1+z)^2 + ΩΛ)
//! D_C(z) = (c / H0) ∫_0^z dz' / E(z')          H0 = 100 h km/s/Mpc
//! ```
use serde::{Deserialize, Serialize};

use crate::{
    config::Configuration,
    constants::{Megaparsec, Redshift, VLIGHT},
};

/// Number of Simpson intervals per unit redshift (rounded up, always even).
const SIMPSON_STEPS_PER_Z: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    pub omega_mat: f64,
    pub omega_lam: f64,
    pub omega_k: f64,
    pub hubble: f64,
}

impl Cosmology {
    pub fn new(omega_mat: f64, omega_lam: f64, omega_k: f64, hubble: f64) -> Self {
        Cosmology {
            omega_mat,
            omega_lam,
            omega_k,
            hubble,
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Cosmology::new(
            config.omega_mat,
            config.omega_lam,
            config.omega_k,
            config.hubble,
        )
    }

    /// Hubble distance `c / H0` in Mpc.
    pub fn hubble_distance(&self) -> Megaparsec {
        VLIGHT / (100.0 * self.hubble)
    }

    /// Dimensionless Hubble parameter `E(z) = H(z) / H0`.
    pub fn efunc(&self, z: Redshift) -> f64 {
        let a = 1.0 + z;
        (self.omega_mat * a.powi(3) + self.omega_k * a.powi(2) + self.omega_lam).sqrt()
    }

    /// Line-of-sight comoving distance to redshift `z`, in Mpc.
    ///
    /// Composite Simpson integration of `1 / E(z)`; negative redshifts give a negative distance.
    pub fn comoving_distance(&self, z: Redshift) -> Megaparsec {
        if z == 0.0 {
            return 0.0;
        }
        let mut n = (z.abs() * SIMPSON_STEPS_PER_Z).ceil().max(2.0) as usize;
        if n % 2 == 1 {
            n += 1;
        }
        let h = z / n as f64;
        let inner: f64 = (1..n)
            .map(|i| {
                let w = if i % 2 == 1 { 4.0 } else { 2.0 };
                w / self.efunc(h * i as f64)
            })
            .sum();
        let integral = h / 3.0 * (1.0 / self.efunc(0.0) + inner + 1.0 / self.efunc(z));
        self.hubble_distance() * integral
    }

    /// Signed comoving separation `D_C(z_b) - D_C(z_a)` along the line of sight, in Mpc.
    pub fn comoving_separation(&self, z_a: Redshift, z_b: Redshift) -> Megaparsec {
        self.comoving_distance(z_b) - self.comoving_distance(z_a)
    }
}
