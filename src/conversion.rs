use crate::constants::{Flux, Magnitude, POGSON};

/// Convert an apparent magnitude to a flux, `10^(-0.4 m)`.
pub fn mag_to_flux(mag: Magnitude) -> Flux {
    10f64.powf(-POGSON * mag)
}

/// Convert a flux back to an apparent magnitude.
pub fn flux_to_mag(flux: Flux) -> Magnitude {
    -flux.log10() / POGSON
}

/// Propagate a magnitude uncertainty and a zero-point fraction into a flux uncertainty.
///
/// Arguments
/// ---------------
/// * `flux`: the flux corresponding to the measured magnitude
/// * `mag_sigma`: the 1σ magnitude uncertainty
/// * `zero_point_frac`: fractional zero-point error, `10^(0.4 zp) - 1`
///
/// Return
/// ----------
/// * `flux * sqrt((10^(0.4 σ) - 1)^2 + zero_point_frac^2)`
pub fn mag_sigma_to_flux_sigma(flux: Flux, mag_sigma: f64, zero_point_frac: f64) -> Flux {
    let frac = 10f64.powf(POGSON * mag_sigma) - 1.0;
    flux * frac.hypot(zero_point_frac)
}

/// Numerically stable `ln(exp(a) + exp(b))`.
///
/// `-inf` acts as the identity element, so a running marginalization can start from
/// `f64::NEG_INFINITY`.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln Σ exp(x_i)` over an iterator, `-inf` for an empty input.
pub fn log_sum_exp<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .fold(f64::NEG_INFINITY, log_add_exp)
}

/// Trapezoidal integral of `y(x)` over the (sorted) abscissae `x`.
pub(crate) fn trapz(y: &[f64], x: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// Linear interpolation of tabulated `(xs, ys)` at `x`.
///
/// Return
/// ----------
/// * `None` if `x` lies outside `[xs[0], xs[last]]` or the table is degenerate.
pub(crate) fn interp_linear(xs: &[f64], ys: &[f64], x: f64) -> Option<f64> {
    let n = xs.len();
    if n < 2 || ys.len() != n || x.is_nan() || x < xs[0] || x > xs[n - 1] {
        return None;
    }
    let upper = xs.partition_point(|&v| v < x).clamp(1, n - 1);
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    if x1 == x0 {
        return Some(y0);
    }
    Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}

/// Linearly spaced grid of `len` points over `[lo, hi]`.
pub(crate) fn linspace(lo: f64, hi: f64, len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (len - 1) as f64;
            (0..len)
                .map(|i| if i == len - 1 { hi } else { lo + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod conversion_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mag_flux_roundtrip() {
        assert_relative_eq!(mag_to_flux(25.0), 1e-10, max_relative = 1e-12);
        assert_relative_eq!(flux_to_mag(mag_to_flux(23.7)), 23.7, epsilon = 1e-12);
    }

    #[test]
    fn test_log_add_exp() {
        assert_relative_eq!(
            log_add_exp(1.0_f64.ln(), 3.0_f64.ln()),
            4.0_f64.ln(),
            epsilon = 1e-14
        );
        assert_eq!(log_add_exp(f64::NEG_INFINITY, -2.5), -2.5);
        assert_eq!(log_add_exp(-2.5, f64::NEG_INFINITY), -2.5);
        assert_eq!(
            log_add_exp(f64::NEG_INFINITY, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
        // no overflow for large log values
        assert_relative_eq!(
            log_add_exp(1000.0, 1000.0),
            1000.0 + 2.0_f64.ln(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_log_sum_exp_empty() {
        assert_eq!(log_sum_exp(Vec::<f64>::new()), f64::NEG_INFINITY);
        assert_relative_eq!(
            log_sum_exp([0.0, 0.0, 0.0]),
            3.0_f64.ln(),
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_trapz_and_interp() {
        let x = linspace(0.0, 1.0, 101);
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        assert_relative_eq!(trapz(&y, &x), 1.0, epsilon = 1e-12);

        assert_eq!(interp_linear(&[0.0, 1.0], &[0.0, 10.0], 0.25), Some(2.5));
        assert_eq!(interp_linear(&[0.0, 1.0], &[0.0, 10.0], 1.0), Some(10.0));
        assert_eq!(interp_linear(&[0.0, 1.0], &[0.0, 10.0], 1.5), None);
        assert_eq!(interp_linear(&[0.0, 1.0], &[0.0, 10.0], -0.1), None);
    }

    #[test]
    fn test_flux_sigma() {
        let f = mag_to_flux(20.0);
        let s = mag_sigma_to_flux_sigma(f, 0.1, 0.0);
        assert_relative_eq!(s, f * (10f64.powf(0.04) - 1.0), max_relative = 1e-12);
    }
}
