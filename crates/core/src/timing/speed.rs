//! Speed changes: factor decomposition and pitch-preserving time stretch.
//!
//! A speed ratio above 1 makes audio faster (shorter), below 1 slower.
//! Stretch backends only handle a bounded ratio per pass, so large ratios
//! are split into a chain of equal in-range factors first.

use crate::audio::AudioClip;
use crate::error::{Error, Result};

/// Smallest ratio a single stretch pass accepts.
pub const MIN_FACTOR: f64 = 0.5;
/// Largest ratio a single stretch pass accepts.
pub const MAX_FACTOR: f64 = 100.0;

/// Split `ratio` into factors, each within `[MIN_FACTOR, MAX_FACTOR]`,
/// whose product is `ratio`.
///
/// A ratio of exactly 1 needs no pass and yields an empty list.
/// Non-positive or non-finite ratios are rejected.
pub fn factorize(ratio: f64) -> Result<Vec<f64>> {
    if !(ratio > 0.0) || !ratio.is_finite() {
        return Err(Error::InvalidSpeedFactor(ratio));
    }
    if ratio == 1.0 {
        return Ok(vec![]);
    }
    if (MIN_FACTOR..=MAX_FACTOR).contains(&ratio) {
        return Ok(vec![ratio]);
    }
    if (MIN_FACTOR * MIN_FACTOR..=MAX_FACTOR * MAX_FACTOR).contains(&ratio) {
        let root = ratio.sqrt();
        return Ok(vec![root, root]);
    }

    let base = if ratio < MIN_FACTOR { MIN_FACTOR } else { MAX_FACTOR };
    let mut power = ratio.log(base).ceil().max(1.0) as usize;
    let mut factor = ratio.powf(1.0 / power as f64);
    // log rounding can leave the root a hair outside the bounds
    while !(MIN_FACTOR..=MAX_FACTOR).contains(&factor) {
        power += 1;
        factor = ratio.powf(1.0 / power as f64);
    }
    Ok(vec![factor; power])
}

/// ffmpeg filter graph applying `factors` as a chain of `atempo` stages.
pub fn atempo_filter(factors: &[f64]) -> String {
    if factors.is_empty() {
        return "anull".to_string();
    }
    factors
        .iter()
        .map(|f| format!("atempo={f}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// A pitch-preserving tempo changer.
pub trait TimeStretch: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Change speed by a single in-range `factor`.
    fn stretch(&self, clip: &AudioClip, factor: f64) -> Result<AudioClip>;

    /// Apply `factors` in order. Backends that can run a whole chain in one
    /// pass override this.
    fn stretch_chain(&self, clip: &AudioClip, factors: &[f64]) -> Result<AudioClip> {
        let mut current = clip.clone();
        for &factor in factors {
            current = self.stretch(&current, factor)?;
        }
        Ok(current)
    }
}

/// Time stretch via Signalsmith Stretch (phase vocoder), in process.
///
/// The output length is set exactly to `len / factor` samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalsmithStretch;

impl TimeStretch for SignalsmithStretch {
    fn name(&self) -> &str {
        "signalsmith"
    }

    fn stretch(&self, clip: &AudioClip, factor: f64) -> Result<AudioClip> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(Error::InvalidSpeedFactor(factor));
        }
        if factor == 1.0 || clip.is_empty() {
            return Ok(clip.clone());
        }

        let sr = clip.sample_rate();
        let out_len = (clip.len() as f64 / factor).round() as usize;
        if out_len == 0 {
            return Ok(AudioClip::empty(sr));
        }

        let mut stretch = ssstretch::Stretch::new();
        stretch.preset_default(1, sr as f32);

        let input_f32: Vec<f32> = clip.samples().iter().map(|&s| s as f32).collect();
        let in_len = input_f32.len() as i32;

        let mut output_f32 = vec![vec![0.0f32; out_len]; 1];
        stretch.process_vec(&[input_f32], in_len, &mut output_f32, out_len as i32);

        let samples = output_f32
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|s| s as f64)
            .collect();
        Ok(AudioClip::new(samples, sr))
    }
}

/// Change the speed of `clip` by `ratio`, splitting it into in-range passes.
pub fn speed_change(clip: &AudioClip, ratio: f64, stretcher: &dyn TimeStretch) -> Result<AudioClip> {
    let factors = factorize(ratio)?;
    if factors.is_empty() {
        return Ok(clip.clone());
    }
    log::debug!(
        "Speed change x{:.4} via {} ({} pass{})",
        ratio,
        stretcher.name(),
        factors.len(),
        if factors.len() == 1 { "" } else { "es" }
    );
    stretcher.stretch_chain(clip, &factors)
}
