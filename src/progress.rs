//! Progress reporting for long-running kernels (DTW, Kalman filtering, optimal partition,
//! routing preparation).
//!
//! [`Progress`] counts iterations towards a known total.
//!
//! * With the `progress` feature, an `indicatif` bar is drawn, its message showing the last
//!   iteration duration and a moving average (weight [`SMOOTHING`] on the newest sample).
//! * Without it, a `trace!` event is emitted every 10 % of the total.
//!
//! ```rust, no_run
//! use geotrack::progress::Progress;
//!
//! let mut progress = Progress::new("dtw", 1_000);
//! for _ in 0..1_000 {
//!     // ... work ...
//!     progress.inc();
//! }
//! progress.finish();
//! ```
use std::time::{Duration, Instant};

use tracing::trace;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Weight of the newest iteration in the moving average of iteration durations.
pub const SMOOTHING: f64 = 0.2;

/// `"253µs"`, `"42ms"` or `"3.14s"` depending on the scale.
fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if us < 1_000_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f32())
    }
}

pub struct Progress {
    label: &'static str,
    total: u64,
    done: u64,
    next_report: u64,
    last_tick: Instant,
    avg: Option<Duration>,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl Progress {
    pub fn new(label: &'static str, total: u64) -> Self {
        #[cfg(feature = "progress")]
        let bar = {
            let pb = ProgressBar::new(total.max(1));
            pb.set_style(
                ProgressStyle::with_template(
                    "{prefix} {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
                )
                .expect("indicatif template"),
            );
            pb.set_prefix(label);
            pb.enable_steady_tick(Duration::from_millis(200));
            pb
        };
        Progress {
            label,
            total,
            done: 0,
            next_report: total.div_ceil(10).max(1),
            last_tick: Instant::now(),
            avg: None,
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// Duration of the iteration just closed; the first one seeds the average.
    fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.avg = Some(match self.avg {
            None => dt,
            Some(avg) => avg.mul_f64(1.0 - SMOOTHING) + dt.mul_f64(SMOOTHING),
        });
        dt
    }

    /// Smoothed iteration duration, zero before the first iteration.
    pub fn average(&self) -> Duration {
        self.avg.unwrap_or_default()
    }

    /// Count one finished iteration.
    pub fn inc(&mut self) {
        self.done += 1;
        let last = self.tick();

        #[cfg(feature = "progress")]
        {
            self.bar
                .set_message(format!("last: {}, avg: {}", fmt_dur(last), fmt_dur(self.average())));
            self.bar.inc(1);
        }

        if self.done >= self.next_report {
            trace!(
                task = self.label,
                done = self.done,
                total = self.total,
                last = %fmt_dur(last),
                avg = %fmt_dur(self.average()),
                "progress"
            );
            self.next_report += self.total.div_ceil(10).max(1);
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn finish(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
        trace!(task = self.label, total = self.done, "finished");
    }
}

#[cfg(test)]
mod progress_test {
    use super::*;

    #[test]
    fn test_fmt_dur() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_counts() {
        let mut p = Progress::new("test", 25);
        assert_eq!(p.average(), Duration::ZERO);
        for _ in 0..25 {
            p.inc();
        }
        assert_eq!(p.done(), 25);
        p.finish();
    }

    #[test]
    fn test_average_follows_slow_iterations() {
        let mut p = Progress::new("test", 3);
        std::thread::sleep(Duration::from_millis(20));
        p.inc();
        let first = p.average();
        assert!(first >= Duration::from_millis(20));
        // a fast iteration only pulls the average down by the smoothing weight
        p.inc();
        assert!(p.average() >= first.mul_f64(1.0 - SMOOTHING));
        assert!(p.average() < first);
    }
}
