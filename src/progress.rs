//! Galaxy-loop progress reporting (`progress` feature).
//!
//! * [`galaxy_bar`] – an `indicatif` bar counting sampled galaxies.
//! * [`GalaxyTimer`] – per-galaxy wall time with an exponential moving average
//!   `ema ← α·dt + (1 - α)·ema`, shown in the bar message.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn galaxy_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total.max(1));
    if let Ok(style) = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} galaxies ({percent:>3}%) | ETA {eta_precise} | {msg}",
    ) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

pub(crate) struct GalaxyTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl GalaxyTimer {
    pub(crate) fn new(alpha: f64) -> Self {
        GalaxyTimer {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    /// Close the current galaxy and return its duration.
    pub(crate) fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    pub(crate) fn message(&self, last: Duration) -> String {
        format!(
            "last galaxy: {}, avg: {}",
            fmt_dur(last),
            fmt_dur(Duration::from_nanos(self.ema_ns as u64))
        )
    }
}

fn fmt_dur(d: Duration) -> String {
    match d.as_millis() {
        0 => format!("{}µs", d.as_micros()),
        ms if ms < 1_000 => format!("{ms}ms"),
        _ => format!("{:.2}s", d.as_secs_f32()),
    }
}
