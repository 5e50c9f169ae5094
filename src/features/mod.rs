//! Per-bout feature extraction.
//!
//! A feature policy names a fixed, ordered set of per-frame channels; each
//! channel is derived from one bout's raw series and brought to a common
//! frame length, and the channels are concatenated into one flat vector.
//! The resulting vectors have identical length and field order for every
//! bout of a clustering run, which is what lets them be stacked into a
//! single matrix downstream.
//!
//! Everything here is a pure function of its inputs.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bout::Bout;

/// A single per-frame channel derived from a bout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Smoothed tail angle, radians
    Angle,
    /// Head displacement per frame, pixels
    Speed,
    /// Absolute heading change of the head trajectory per frame, radians
    Heading,
    /// Cumulative head displacement since the bout start, pixels
    Disp,
    /// Instantaneous tail-beat frequency, Hz
    Freq,
    /// Absolute amplitude of the governing bend, radians
    Amp,
    /// Signed left/right imbalance of successive bend pairs
    Asym,
}

/// A named, fixed mapping from a bout's raw series to a numeric vector.
///
/// The variants mirror the feature sets of the original analysis scripts;
/// the policy is fixed for a whole clustering run and mixing policies
/// across bouts is an error by construction (the policy travels with the
/// assembled dataframe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeaturePolicy {
    Angles,
    AnglesSpeed,
    AnglesHeading,
    AnglesHeadingDisp,
    AnglesSpeedHeading,
    AnglesSpeedHeadingDisp,
    FreqAmpAsym,
    FreqAmpAsymSpeedHeadingDisp,
}

impl FeaturePolicy {
    /// The ordered channels this policy concatenates.
    pub fn channels(&self) -> &'static [Channel] {
        use Channel::*;
        match self {
            FeaturePolicy::Angles => &[Angle],
            FeaturePolicy::AnglesSpeed => &[Angle, Speed],
            FeaturePolicy::AnglesHeading => &[Angle, Heading],
            FeaturePolicy::AnglesHeadingDisp => &[Angle, Heading, Disp],
            FeaturePolicy::AnglesSpeedHeading => &[Angle, Speed, Heading],
            FeaturePolicy::AnglesSpeedHeadingDisp => &[Angle, Speed, Heading, Disp],
            FeaturePolicy::FreqAmpAsym => &[Freq, Amp, Asym],
            FeaturePolicy::FreqAmpAsymSpeedHeadingDisp => {
                &[Freq, Amp, Asym, Speed, Heading, Disp]
            }
        }
    }
}

/// The common per-channel frame length of a clustering run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameLength {
    /// Every per-frame channel is truncated or padded to exactly this
    /// many frames. Must be positive.
    Fixed(usize),
    /// Use the minimum bout length of the whole batch, computed once
    /// before any vector is built.
    Unbounded,
}

/// An error turning one bout into a feature vector.
///
/// These are the per-bout half of the pipeline's `MalformedBout` failure:
/// the assembler wraps them with the offending [`BoutId`](crate::BoutId)
/// and decides between skip-and-count and abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("tail-angle series is missing")]
    MissingTailAngle,
    #[error("head-position series is missing or mismatched")]
    MissingHeadTrack,
    #[error("per-frame series is empty")]
    EmptySeries,
    #[error("needs at least 2 recorded bends, found {found}")]
    NotEnoughBends { found: usize },
}

/// Builds the feature vector of one bout.
///
/// Each channel of `policy` is derived from the bout, brought to exactly
/// `len` frames (truncated at the end, or padded at the end by holding the
/// last value, so channels stay aligned at the bout start), and the channels
/// are concatenated in policy order. The returned vector always has length
/// `len * policy.channels().len()`.
///
/// `fps` is the acquisition rate of the source video; only the frequency
/// channel depends on it.
pub fn build_feature(
    bout: &Bout,
    policy: FeaturePolicy,
    len: usize,
    fps: f64,
) -> Result<Array1<f64>, FeatureError> {
    let channels = policy.channels();
    let mut out = Vec::with_capacity(len * channels.len());
    for channel in channels {
        let series = channel_series(bout, *channel, fps)?;
        if series.is_empty() {
            return Err(FeatureError::EmptySeries);
        }
        fit_to_len(&series, len, &mut out);
    }
    Ok(Array1::from(out))
}

/// Derives one channel's raw series from a bout, at the bout's own length.
pub fn channel_series(bout: &Bout, channel: Channel, fps: f64) -> Result<Vec<f64>, FeatureError> {
    match channel {
        Channel::Angle => bout
            .tail_angle
            .clone()
            .ok_or(FeatureError::MissingTailAngle),
        Channel::Speed => {
            let steps = head_steps(bout)?;
            let mut speed = Vec::with_capacity(steps.len() + 1);
            speed.push(0.0);
            speed.extend(steps.iter().map(|(dx, dy)| dx.hypot(*dy)));
            Ok(speed)
        }
        Channel::Heading => {
            let steps = head_steps(bout)?;
            let headings: Vec<f64> = steps.iter().map(|(dx, dy)| dy.atan2(*dx)).collect();
            let mut change = Vec::with_capacity(headings.len() + 1);
            change.push(0.0);
            for w in headings.windows(2) {
                change.push(wrap_angle(w[1] - w[0]).abs());
            }
            // one value per frame: frame 0 has no step, frame 1 no previous step
            if !headings.is_empty() {
                change.insert(1, 0.0);
            }
            Ok(change)
        }
        Channel::Disp => {
            let steps = head_steps(bout)?;
            let mut cumulative = Vec::with_capacity(steps.len() + 1);
            let mut total = 0.0;
            cumulative.push(0.0);
            for (dx, dy) in steps {
                total += dx.hypot(dy);
                cumulative.push(total);
            }
            Ok(cumulative)
        }
        Channel::Freq => {
            let bends = bend_pairs(bout)?;
            Ok(per_frame_from_intervals(bout.n_frames(), &bends, |k| {
                let dt = (bends[k + 1].0.saturating_sub(bends[k].0)).max(1);
                fps / (2.0 * dt as f64)
            }))
        }
        Channel::Amp => {
            let bends = bend_pairs(bout)?;
            let n = bout.n_frames();
            let mut out = Vec::with_capacity(n);
            for frame in 0..n {
                let k = governing_bend(&bends, frame);
                out.push(bends[k].1.abs());
            }
            Ok(out)
        }
        Channel::Asym => {
            let bends = bend_pairs(bout)?;
            Ok(per_frame_from_intervals(bout.n_frames(), &bends, |k| {
                let (a, b) = (bends[k].1, bends[k + 1].1);
                let denom = a.abs() + b.abs();
                if denom == 0.0 {
                    0.0
                } else {
                    (a + b) / denom
                }
            }))
        }
    }
}

/// Appends `series` truncated or pad-extended to exactly `len` values.
fn fit_to_len(series: &[f64], len: usize, out: &mut Vec<f64>) {
    if series.len() >= len {
        out.extend_from_slice(&series[..len]);
    } else {
        out.extend_from_slice(series);
        let last = *series.last().unwrap_or(&0.0);
        out.extend(std::iter::repeat(last).take(len - series.len()));
    }
}

fn head_steps(bout: &Bout) -> Result<Vec<(f64, f64)>, FeatureError> {
    let (x, y) = match (&bout.head_x, &bout.head_y) {
        (Some(x), Some(y)) if x.len() == y.len() && !x.is_empty() => (x, y),
        _ => return Err(FeatureError::MissingHeadTrack),
    };
    Ok(x.windows(2)
        .zip(y.windows(2))
        .map(|(wx, wy)| (wx[1] - wx[0], wy[1] - wy[0]))
        .collect())
}

/// Bend `(frame offset, signed amplitude)` pairs, truncated to the shorter
/// of the two recorded lists. At least two are required: one inter-bend
/// interval is the smallest unit frequency and asymmetry are defined on.
fn bend_pairs(bout: &Bout) -> Result<Vec<(usize, f64)>, FeatureError> {
    let n = bout.bend_timing.len().min(bout.bend_amplitude.len());
    if n < 2 {
        return Err(FeatureError::NotEnoughBends { found: n });
    }
    Ok(bout
        .bend_timing
        .iter()
        .zip(bout.bend_amplitude.iter())
        .take(n)
        .map(|(t, a)| (*t, *a))
        .collect())
}

/// Index of the last bend at or before `frame`, clamped into range.
fn governing_bend(bends: &[(usize, f64)], frame: usize) -> usize {
    bends
        .iter()
        .rposition(|(t, _)| *t <= frame)
        .unwrap_or(0)
        .min(bends.len() - 1)
}

/// Expands an inter-bend interval quantity to one value per frame,
/// piecewise-constant on each interval and extended to both bout
/// boundaries.
fn per_frame_from_intervals<F: Fn(usize) -> f64>(
    n_frames: usize,
    bends: &[(usize, f64)],
    interval_value: F,
) -> Vec<f64> {
    let last_interval = bends.len() - 2;
    (0..n_frames)
        .map(|frame| interval_value(governing_bend(bends, frame).min(last_interval)))
        .collect()
}

fn wrap_angle(a: f64) -> f64 {
    let mut a = a % (2.0 * std::f64::consts::PI);
    if a > std::f64::consts::PI {
        a -= 2.0 * std::f64::consts::PI;
    } else if a < -std::f64::consts::PI {
        a += 2.0 * std::f64::consts::PI;
    }
    a
}
