//! Fitting one synthesized clip into the time slot of its subtitle line.

use serde::Serialize;

use crate::audio::AudioClip;
use crate::error::{Error, Result};
use crate::timing::speed::{speed_change, TimeStretch};

/// The space around one line, in milliseconds.
///
/// `left_border_ms` is the gap between the end of the audio placed so far
/// and the line start. It is negative when earlier lines ran late.
/// `right_border_ms` is the gap to the next line start (or to the end of
/// the media for the last line).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitWindow {
    pub left_border_ms: f64,
    pub need_duration_ms: f64,
    pub right_border_ms: f64,
}

impl FitWindow {
    /// Total room the clip may occupy.
    pub fn free_space_ms(&self) -> f64 {
        self.left_border_ms + self.need_duration_ms + self.right_border_ms
    }
}

/// A clip ready to append to the track: leading padding included.
#[derive(Debug, Clone)]
pub struct Fitted {
    pub clip: AudioClip,
    pub padding_ms: f64,
    /// Speed ratio that was applied, 1.0 when none.
    pub speed_ratio: f64,
}

/// Fit `clip` into `window`.
///
/// A clip longer than the free space is sped up to exactly fill it. A clip
/// that overflows the line's own slot (duration plus right gap) is placed
/// early: the spare room is split by `align`, so `align = 2` centres it. A
/// clip that fits its slot starts at the line start. Padding never goes
/// negative.
pub fn fit(clip: &AudioClip, window: FitWindow, align: f64, stretcher: &dyn TimeStretch) -> Result<Fitted> {
    if !(align > 0.0) || !align.is_finite() {
        return Err(Error::InvalidAlignment(align));
    }

    let free = window.free_space_ms();
    let mut duration = clip.duration_ms();
    let mut speed_ratio = 1.0;

    let squeezed = if duration > free && !clip.is_empty() {
        speed_ratio = duration / free;
        let stretched = speed_change(clip, speed_ratio, stretcher)?;
        duration = stretched.duration_ms();
        Some(stretched)
    } else {
        None
    };

    let padding = if duration > window.need_duration_ms + window.right_border_ms {
        (free - duration) / align
    } else {
        window.left_border_ms
    };
    let padding_ms = padding.max(0.0);

    let source = squeezed.as_ref().unwrap_or(clip);
    Ok(Fitted {
        clip: source.with_leading_silence(padding_ms),
        padding_ms,
        speed_ratio,
    })
}
