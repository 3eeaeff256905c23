//! Frequency-domain low/high pass filtering of track columns.
//!
//! Each listed column is transformed with a DFT, the bins beyond (low pass) or below
//! (high pass) the cutoff are zeroed, and the inverse transform replaces the column.
//! The cutoff `fc ∈ (0, 1)` is a fraction of the Nyquist frequency.
//!
//! The track should be regularly sampled along the chosen [`SamplingMode`]; a warning is
//! emitted otherwise but the filter still runs.
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::warn;

use crate::track::{SamplingMode, Track};
use crate::track_errors::TrackError;

/// Relative spread of the sampling steps above which a track counts as irregular.
const IRREGULARITY_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBand {
    /// Keep frequencies up to the cutoff.
    LowPass,
    /// Keep frequencies from the cutoff up.
    HighPass,
}

fn sampling_steps(track: &Track, mode: SamplingMode) -> Vec<f64> {
    match mode {
        SamplingMode::Temporal => track.timestamps().windows(2).map(|w| w[1] - w[0]).collect(),
        SamplingMode::Spatial => track
            .positions()
            .windows(2)
            .map(|w| w[0].distance_2d(&w[1]))
            .collect(),
    }
}

/// `true` when the sampling steps have a coefficient of variation below 1 %.
pub fn is_regular(track: &Track, mode: SamplingMode) -> bool {
    let steps = sampling_steps(track, mode);
    if steps.len() < 2 {
        return true;
    }
    let n = steps.len() as f64;
    let mean = steps.iter().sum::<f64>() / n;
    let std = (steps.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
    mean.abs() > 0.0 && std / mean.abs() <= IRREGULARITY_TOLERANCE
}

/// Filter a signal in place.
pub fn filter_signal(values: &mut [f64], cutoff: f64, band: FilterBand) {
    let n = values.len();
    if n < 2 {
        return;
    }
    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
    forward.process(&mut buffer);

    let nyquist = n as f64 / 2.0;
    for (k, bin) in buffer.iter_mut().enumerate() {
        let f = k.min(n - k) as f64 / nyquist;
        let drop = match band {
            FilterBand::LowPass => f > cutoff,
            FilterBand::HighPass => f < cutoff,
        };
        if drop {
            *bin = Complex::new(0.0, 0.0);
        }
    }

    inverse.process(&mut buffer);
    for (v, c) in values.iter_mut().zip(&buffer) {
        *v = c.re / n as f64;
    }
}

/// Filter columns of `track` in place.
///
/// Arguments
/// -----------------
/// * `cutoff` – cutoff frequency as a fraction of Nyquist, in `(0, 1)`.
/// * `mode` – sampling axis checked for regularity.
/// * `band` – low or high pass.
/// * `columns` – columns to filter; empty means `x`, `y` and `z`.
///
/// Errors
/// ----------
/// * `OutOfDomain` when the cutoff is outside `(0, 1)`.
/// * `MissingFeature` for an unknown column.
pub fn fourier_filter(
    track: &mut Track,
    cutoff: f64,
    mode: SamplingMode,
    band: FilterBand,
    columns: &[&str],
) -> Result<(), TrackError> {
    if !(cutoff > 0.0 && cutoff < 1.0) {
        return Err(TrackError::OutOfDomain(format!(
            "cutoff must lie in (0, 1), got {cutoff}"
        )));
    }
    if !is_regular(track, mode) {
        warn!(
            tid = %track.tid,
            ?mode,
            "Fourier filtering of an irregularly sampled track"
        );
    }
    let columns: &[&str] = if columns.is_empty() {
        &["x", "y", "z"]
    } else {
        columns
    };
    for &name in columns {
        let mut values = track.column(name)?;
        filter_signal(&mut values, cutoff, band);
        track.write_column(name, values)?;
    }
    Ok(())
}
