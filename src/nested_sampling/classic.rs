//! # Classic nested sampling
//!
//! Skilling's algorithm with a constrained random walk for the replacement step:
//!
//! 1. Draw `npoints` live points uniformly in the unit cube, redrawing points of zero
//!    likelihood. The accepted fraction `f` is the initial prior volume `X_0`.
//! 2. At iteration `i` remove the worst live point `L*`, giving it the prior-volume weight
//!    `w_i = X_i (1 - e^{-1/n})` with `ln X_i = ln f - i / n`.
//! 3. Replace it by walking `walks` Gaussian steps from a randomly chosen live point,
//!    accepting a step only if it stays in the cube and its likelihood exceeds `L*`. The step
//!    size adapts to keep the acceptance rate near one half.
//! 4. Stop once `ln(Z + L_max X_i) - ln Z < dlogz` (or at `max_iter`), then add the remaining
//!    live points with equal shares of the last volume.
//!
//! The evidence uncertainty is the usual `sqrt(H / n)` with `H` the information.
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::{blendfit_errors::BlendfitError, constants::LogProb, conversion::log_add_exp};

use super::{LogLikelihoodFn, NestedSampler, NestedSamplingResult, PriorTransformFn, SamplerOptions};

/// Random-walk nested sampler.
///
/// Fields
/// -----------------
/// * `initial_step` – initial random-walk step size, in unit-cube coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassicNestedSampler {
    pub initial_step: f64,
}

impl Default for ClassicNestedSampler {
    fn default() -> Self {
        ClassicNestedSampler { initial_step: 0.1 }
    }
}

struct LivePoint {
    u: Vec<f64>,
    v: Vec<f64>,
    log_l: LogProb,
}

/// Running evidence and information.
struct Accumulator {
    log_z: LogProb,
    h: f64,
    dead: Vec<(Vec<f64>, LogProb, LogProb)>,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            // finite start so that `log_z - log_z_new` stays defined
            log_z: -1e300,
            h: 0.0,
            dead: Vec::new(),
        }
    }

    fn add(&mut self, v: Vec<f64>, log_l: LogProb, log_wt: LogProb) {
        if log_wt > f64::NEG_INFINITY {
            let log_z_new = log_add_exp(self.log_z, log_wt);
            self.h = (log_wt - log_z_new).exp() * log_l
                + (self.log_z - log_z_new).exp() * (self.h + self.log_z)
                - log_z_new;
            self.log_z = log_z_new;
        }
        self.dead.push((v, log_l, log_wt));
    }
}

impl ClassicNestedSampler {
    pub fn new(initial_step: f64) -> Self {
        ClassicNestedSampler { initial_step }
    }

    /// Walk from `start` to a new point with likelihood above `log_l_star`.
    #[allow(clippy::too_many_arguments)]
    fn replace(
        &self,
        start: &LivePoint,
        log_l_star: LogProb,
        step: &mut f64,
        walks: usize,
        rng: &mut StdRng,
        log_likelihood: &mut LogLikelihoodFn<'_>,
        prior_transform: &PriorTransformFn<'_>,
        ncall: &mut usize,
    ) -> Result<LivePoint, BlendfitError> {
        let mut current = LivePoint {
            u: start.u.clone(),
            v: start.v.clone(),
            log_l: start.log_l,
        };
        let (mut accept, mut reject) = (0usize, 0usize);

        for _ in 0..walks {
            let proposal: Vec<f64> = current
                .u
                .iter()
                .map(|&x| {
                    let dx: f64 = StandardNormal.sample(rng);
                    x + *step * dx
                })
                .collect();

            if proposal.iter().any(|&x| !(0.0..=1.0).contains(&x)) {
                reject += 1;
                continue;
            }

            let v = prior_transform(&proposal)?;
            let log_l = log_likelihood(&v)?;
            *ncall += 1;

            if log_l > log_l_star {
                current = LivePoint {
                    u: proposal,
                    v,
                    log_l,
                };
                accept += 1;
            } else {
                reject += 1;
            }
        }

        if accept > reject {
            *step *= (1.0 / accept as f64).exp();
        } else if reject > 0 {
            *step /= (1.0 / reject as f64).exp();
        }
        *step = step.min(1.0);

        Ok(current)
    }
}

impl NestedSampler for ClassicNestedSampler {
    fn sample(
        &self,
        log_likelihood: &mut LogLikelihoodFn<'_>,
        prior_transform: &PriorTransformFn<'_>,
        ndim: usize,
        options: &SamplerOptions,
    ) -> Result<NestedSamplingResult, BlendfitError> {
        options.validate()?;
        if ndim == 0 {
            return Err(BlendfitError::InvalidSampleOptions(
                "cannot sample a zero-dimensional space".into(),
            ));
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let npoints = options.npoints;
        let mut ncall = 0usize;

        // at least 1% of the prior volume must carry a finite likelihood
        let max_draws = 100 * npoints;
        let mut ndraw = 0usize;
        let mut live = Vec::with_capacity(npoints);
        while live.len() < npoints {
            if ndraw >= max_draws {
                return Err(BlendfitError::SamplerFailure(format!(
                    "only {} of {ndraw} prior draws have a finite likelihood",
                    live.len()
                )));
            }
            let u: Vec<f64> = (0..ndim).map(|_| rng.random::<f64>()).collect();
            let v = prior_transform(&u)?;
            let log_l = log_likelihood(&v)?;
            ncall += 1;
            ndraw += 1;
            if log_l > f64::NEG_INFINITY {
                live.push(LivePoint { u, v, log_l });
            }
        }
        let log_vol_init = (npoints as f64 / ndraw as f64).ln();

        let mut acc = Accumulator::new();
        let shrink = 1.0 / npoints as f64;
        let log_width = (1.0 - (-shrink).exp()).ln();
        let mut step = self.initial_step;
        let mut niter = 0usize;
        let mut stopped_at = None;

        while niter < options.max_iter {
            let (worst, log_l_star) = live
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.log_l))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .ok_or_else(|| BlendfitError::SamplerFailure("no live points".into()))?;

            let log_vol = log_vol_init - niter as f64 * shrink;
            acc.add(live[worst].v.clone(), log_l_star, log_vol + log_width + log_l_star);

            let log_l_max = live
                .iter()
                .map(|p| p.log_l)
                .fold(f64::NEG_INFINITY, f64::max);
            let log_z_remain = log_l_max + log_vol;
            niter += 1;
            if log_add_exp(acc.log_z, log_z_remain) - acc.log_z < options.dlogz {
                stopped_at = Some(worst);
                break;
            }

            let mut start = rng.random_range(0..npoints);
            if start == worst {
                start = (start + 1) % npoints;
            }
            let replacement = self.replace(
                &live[start],
                log_l_star,
                &mut step,
                options.walks,
                &mut rng,
                log_likelihood,
                prior_transform,
                &mut ncall,
            )?;
            live[worst] = replacement;
        }

        // remaining live points share the final prior volume
        if let Some(worst) = stopped_at {
            live.swap_remove(worst);
        }
        let log_vol_final = log_vol_init - niter as f64 * shrink - (live.len() as f64).ln();
        for p in live {
            acc.add(p.v, p.log_l, log_vol_final + p.log_l);
        }

        let log_z = if acc.log_z <= -1e299 {
            f64::NEG_INFINITY
        } else {
            acc.log_z
        };
        let n_dead = acc.dead.len();
        let mut flat = Vec::with_capacity(n_dead * ndim);
        let mut log_l = Vec::with_capacity(n_dead);
        let mut weights = Vec::with_capacity(n_dead);
        for (v, l, w) in acc.dead {
            flat.extend_from_slice(&v);
            log_l.push(l);
            weights.push(if log_z.is_finite() { (w - log_z).exp() } else { 0.0 });
        }
        let information = acc.h.max(0.0);

        tracing::debug!(
            niter,
            ncall,
            log_z,
            information,
            "nested sampling finished"
        );

        Ok(NestedSamplingResult {
            samples: DMatrix::from_row_slice(n_dead, ndim, &flat),
            log_l,
            weights,
            log_z,
            log_z_err: (information / npoints as f64).sqrt(),
            information,
            niter,
            ncall,
        })
    }
}
