//! ECG window analysis
//!
//! Band-pass filtering in the frequency domain, min-max normalization,
//! R-peak detection and heart rate estimation over one served window.

use std::f64::consts::PI;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::FeedResult;
use crate::window::{Window, read_leading};

/// Result of analyzing one window
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Filtered, normalized samples
    pub samples: Vec<f64>,
    /// Indices of detected R peaks into `samples`
    pub peaks: Vec<usize>,
    /// Height a peak had to reach
    pub threshold: f64,
    pub heart_rate_bpm: Option<f64>,
}

/// Replace absent markers so the signal is contiguous
///
/// An absent sample repeats the previous valid one; leading absents take the
/// first valid value. A window with no valid sample yields an empty signal.
pub fn fill_absent(window: &[Option<f64>]) -> Vec<f64> {
    let Some(first) = window.iter().flatten().next().copied() else {
        return Vec::new();
    };

    let mut last = first;
    window
        .iter()
        .map(|v| {
            if let Some(v) = v {
                last = *v;
            }
            last
        })
        .collect()
}

/// Twiddle table for an `n`-point transform: `(cos, sin)` of `2*pi*m/n`
fn twiddles(n: usize) -> Vec<(f64, f64)> {
    (0..n)
        .map(|m| {
            let theta = 2.0 * PI * m as f64 / n as f64;
            (theta.cos(), theta.sin())
        })
        .collect()
}

/// Zero every frequency bin outside `(low, high)` Hz and transform back
///
/// Zero-phase, so peak positions are preserved.
pub fn bandpass(signal: &[f64], sample_rate: f64, low: f64, high: f64) -> Vec<f64> {
    let n = signal.len();
    debug!(n, sample_rate, low, high, "bandpass: called");
    if n == 0 {
        return Vec::new();
    }

    let table = twiddles(n);
    let bin_hz = sample_rate / n as f64;

    // Forward transform, computing only the bins that survive the mask
    let mut spectrum: Vec<Option<(f64, f64)>> = Vec::with_capacity(n);
    for k in 0..n {
        let freq = k.min(n - k) as f64 * bin_hz;
        if freq <= low || freq >= high {
            spectrum.push(None);
            continue;
        }
        let (mut re, mut im) = (0.0, 0.0);
        for (t, x) in signal.iter().enumerate() {
            let (c, s) = table[(k * t) % n];
            re += x * c;
            im -= x * s;
        }
        spectrum.push(Some((re, im)));
    }

    // Inverse transform, real part only
    (0..n)
        .map(|t| {
            let sum: f64 = spectrum
                .iter()
                .enumerate()
                .filter_map(|(k, bin)| bin.map(|b| (k, b)))
                .map(|(k, (re, im))| {
                    let (c, s) = table[(k * t) % n];
                    re * c - im * s
                })
                .sum();
            sum / n as f64
        })
        .collect()
}

/// Scale to `[0, 1]`; a constant signal maps to all zeros
pub fn normalize(signal: &[f64]) -> Vec<f64> {
    let min = signal.iter().copied().fold(f64::INFINITY, f64::min);
    let max = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !(span > 0.0) {
        return vec![0.0; signal.len()];
    }
    signal.iter().map(|v| (v - min) / span).collect()
}

/// Local maxima at least `height` tall and at least `distance` samples apart
///
/// Flat-topped maxima resolve to the middle of the plateau. When two peaks
/// are closer than `distance`, the taller one wins. Indices are ascending.
pub fn find_peaks(signal: &[f64], height: f64, distance: usize) -> Vec<usize> {
    let n = signal.len();
    let mut candidates = Vec::new();

    let mut i = 1;
    while n >= 3 && i < n - 1 {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                let peak = (i + ahead - 1) / 2;
                if signal[peak] >= height {
                    candidates.push(peak);
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    if distance <= 1 || candidates.len() < 2 {
        return candidates;
    }

    // Visit tallest first; a kept peak suppresses its close neighbours
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| signal[candidates[b]].total_cmp(&signal[candidates[a]]));

    let mut keep = vec![true; candidates.len()];
    for &idx in &order {
        if !keep[idx] {
            continue;
        }
        let pos = candidates[idx];
        for (other, &other_pos) in candidates.iter().enumerate() {
            if other != idx && pos.abs_diff(other_pos) < distance {
                keep[other] = false;
            }
        }
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

/// Beats per minute from the mean spacing between consecutive peaks
pub fn heart_rate(peaks: &[usize], sample_rate: f64) -> Option<f64> {
    let (first, last) = (peaks.first()?, peaks.last()?);
    if peaks.len() < 2 || last == first {
        return None;
    }
    let mean_spacing = (last - first) as f64 / (peaks.len() - 1) as f64;
    Some(sample_rate * 60.0 / mean_spacing)
}

/// Run the whole pipeline over one window
pub fn analyze(window: &Window, config: &AnalysisConfig) -> Analysis {
    debug!(len = window.len(), "analyze: called");
    let raw = fill_absent(window);
    let filtered = bandpass(&raw, config.sample_rate, config.low_cut, config.high_cut);
    let samples = normalize(&filtered);

    let max = samples.iter().copied().fold(0.0, f64::max);
    let threshold = config.threshold_ratio * max;
    let peaks = find_peaks(&samples, threshold, config.min_peak_distance());
    let heart_rate_bpm = heart_rate(&peaks, config.sample_rate);

    debug!(peaks = peaks.len(), ?heart_rate_bpm, "analyze: done");
    Analysis {
        samples,
        peaks,
        threshold,
        heart_rate_bpm,
    }
}

/// Analyze the leading `count` samples of a local recording
///
/// Returns the raw window alongside the analysis so callers can save it.
pub fn analyze_recording(
    path: &Path,
    field_index: usize,
    count: u64,
    header: bool,
    config: &AnalysisConfig,
) -> FeedResult<(Window, Analysis)> {
    debug!(path = %path.display(), field_index, count, header, "analyze_recording: called");
    let window = read_leading(path, field_index, count, header)?;
    let analysis = analyze(&window, config);
    Ok((window, analysis))
}
