//! Owned mono audio buffer with a measured duration.

use std::path::Path;

use crate::audio::effects::{concatenate, generate_silence, ms_to_samples, overlay_into};
use crate::audio::io::{read_wav, resample, write_wav};
use crate::error::Result;

/// A mono PCM clip.
///
/// The duration is always derived from the sample count, never stored,
/// since synthesized speech has no known length until it is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f64>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Digital silence. Non-positive durations give an empty clip.
    pub fn silent(duration_ms: f64, sample_rate: u32) -> Self {
        Self::new(generate_silence(duration_ms, sample_rate), sample_rate)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (samples, sample_rate) = read_wav(path)?;
        Ok(Self::new(samples, sample_rate))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_wav(path, &self.samples, self.sample_rate)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Convert to another sample rate. A no-op when the rate already matches.
    pub fn resampled(self, sample_rate: u32) -> Result<Self> {
        if self.sample_rate == sample_rate {
            return Ok(self);
        }
        let samples = resample(&self.samples, self.sample_rate, sample_rate)?;
        Ok(Self::new(samples, sample_rate))
    }

    /// Append `other` after `self`, hard splice, no cross-fade.
    ///
    /// Consumes `self` and copies `other`; `other` is resampled first when
    /// the rates differ.
    pub fn concat(self, other: &AudioClip) -> Result<Self> {
        if other.sample_rate != self.sample_rate {
            let other = other.clone().resampled(self.sample_rate)?;
            return self.concat(&other);
        }
        let mut samples = self.samples;
        samples.extend_from_slice(&other.samples);
        Ok(Self::new(samples, self.sample_rate))
    }

    /// Prepend `padding_ms` of silence.
    pub fn with_leading_silence(&self, padding_ms: f64) -> Self {
        let silence = generate_silence(padding_ms, self.sample_rate);
        Self::new(concatenate(&[&silence, &self.samples]), self.sample_rate)
    }

    /// Mix `patch` in at `offset_ms`, scaling what lies under it by
    /// `gain_during_overlay_db`. The clip keeps its length.
    pub fn overlay(&mut self, patch: &AudioClip, offset_ms: f64, gain_during_overlay_db: f64) -> Result<()> {
        if patch.sample_rate != self.sample_rate {
            let patch = patch.clone().resampled(self.sample_rate)?;
            return self.overlay(&patch, offset_ms, gain_during_overlay_db);
        }
        let offset = ms_to_samples(offset_ms, self.sample_rate);
        overlay_into(&mut self.samples, &patch.samples, offset, gain_during_overlay_db);
        Ok(())
    }

    /// Copy of the range `[start_ms, end_ms)`, clamped to the clip.
    pub fn slice_ms(&self, start_ms: f64, end_ms: f64) -> Self {
        let start = ms_to_samples(start_ms, self.sample_rate).min(self.len());
        let end = ms_to_samples(end_ms, self.sample_rate).min(self.len());
        if start >= end {
            return Self::empty(self.sample_rate);
        }
        Self::new(self.samples[start..end].to_vec(), self.sample_rate)
    }
}
