//! Combining the dubbed track with the original soundtrack.

use serde::{Deserialize, Serialize};

use crate::audio::analysis::detect_nonsilent;
use crate::audio::effects::{adjust_volume, mix_down};
use crate::audio::AudioClip;
use crate::error::Result;

/// How the dub is laid over the original audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MixPolicy {
    /// Add the dub at `gain_db` on top of the untouched original.
    Overlay { gain_db: f64 },
    /// Sum both tracks at equal weight.
    FullMix,
    /// Attenuate the original only where the dub is speaking.
    SidechainDuck {
        min_silence_len_ms: u64,
        silence_thresh_db: f64,
        gain_during_overlay_db: f64,
    },
}

impl Default for MixPolicy {
    fn default() -> Self {
        MixPolicy::SidechainDuck {
            min_silence_len_ms: 100,
            silence_thresh_db: f64::NEG_INFINITY,
            gain_during_overlay_db: -11.0,
        }
    }
}

/// Spans of the dub that carry speech, in milliseconds.
pub fn speech_intervals(dub: &AudioClip, min_silence_len_ms: u64, silence_thresh_db: f64) -> Vec<(u64, u64)> {
    detect_nonsilent(dub.samples(), dub.sample_rate(), min_silence_len_ms, silence_thresh_db)
}

/// Mix `dub` into `original` according to `policy`.
///
/// The dub is resampled to the original's rate first. `Overlay` and
/// `SidechainDuck` keep the original's length; `FullMix` runs to the
/// longer of the two.
pub fn mix(original: &AudioClip, dub: &AudioClip, policy: MixPolicy) -> Result<AudioClip> {
    let sr = original.sample_rate();
    let dub = dub.clone().resampled(sr)?;

    if dub.len() > original.len() && !matches!(policy, MixPolicy::FullMix) {
        log::warn!(
            "Dub ({:.0} ms) is longer than the original audio ({:.0} ms), the tail is dropped",
            dub.duration_ms(),
            original.duration_ms()
        );
    }

    match policy {
        MixPolicy::Overlay { gain_db } => {
            let mut patch = dub.into_samples();
            adjust_volume(&mut patch, gain_db);
            let mut out = original.clone();
            out.overlay(&AudioClip::new(patch, sr), 0.0, 0.0)?;
            Ok(out)
        }
        MixPolicy::FullMix => Ok(AudioClip::new(
            mix_down(&[original.samples(), dub.samples()]),
            sr,
        )),
        MixPolicy::SidechainDuck {
            min_silence_len_ms,
            silence_thresh_db,
            gain_during_overlay_db,
        } => {
            let intervals = speech_intervals(&dub, min_silence_len_ms, silence_thresh_db);
            log::debug!("Ducking original under {} speech spans", intervals.len());

            let mut out = original.clone();
            for (start_ms, end_ms) in intervals {
                let span = dub.slice_ms(start_ms as f64, end_ms as f64);
                out.overlay(&span, start_ms as f64, gain_during_overlay_db)?;
            }
            Ok(out)
        }
    }
}
