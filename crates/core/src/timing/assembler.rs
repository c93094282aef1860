//! Sequential assembly of fitted clips into one dubbed track.
//!
//! Lines are placed in order. Each line's window is measured from the end
//! of the audio already placed, so overruns on one line shrink the room of
//! the next instead of pushing the whole track out of sync.

use serde::Serialize;

use crate::audio::AudioClip;
use crate::error::{Error, Result};
use crate::subtitles::Line;
use crate::timing::fit::{fit, FitWindow};
use crate::timing::speed::{speed_change, TimeStretch};

/// Where one line ended up.
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub window: FitWindow,
    pub padding_ms: f64,
    pub speed_ratio: f64,
    /// Track position where the speech itself begins.
    pub speech_start_ms: f64,
    pub speech_ms: f64,
}

/// The final whole-track adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reconciliation {
    None,
    SpeedChange { ratio: f64 },
    LeadingSilence { ms: f64 },
}

#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub clip: AudioClip,
    /// Sum of the fitted clip durations before reconciliation.
    pub total_placed_ms: f64,
    pub target_end_ms: u64,
    pub reconciliation: Reconciliation,
    pub placements: Vec<Placement>,
}

/// Where the tail gap after the last line ends: the later of the media end
/// and the last line end. Only the last line's right border uses it; the
/// track itself is reconciled against the last line end.
pub fn trailing_boundary_ms(lines: &[Line], media_end_ms: Option<u64>) -> u64 {
    let last_end = lines.iter().map(|l| l.ms.end_ms()).max().unwrap_or(0);
    media_end_ms.unwrap_or(0).max(last_end)
}

pub struct Assembler<'a> {
    stretcher: &'a dyn TimeStretch,
    align: f64,
    sample_rate: u32,
}

impl<'a> Assembler<'a> {
    pub fn new(stretcher: &'a dyn TimeStretch, align: f64, sample_rate: u32) -> Self {
        Self {
            stretcher,
            align,
            sample_rate,
        }
    }

    /// Place `clips[i]` for `lines[i]` and reconcile the result with the
    /// trailing boundary.
    ///
    /// `lines` must be sorted by start time. Clips at another sample rate
    /// are resampled to the assembler's rate first.
    pub fn assemble(
        &self,
        lines: &[Line],
        clips: Vec<AudioClip>,
        media_end_ms: Option<u64>,
    ) -> Result<AssembledTrack> {
        if lines.is_empty() {
            return Err(Error::EmptyTranscript);
        }
        if clips.len() != lines.len() {
            return Err(Error::Mismatch {
                lines: lines.len(),
                clips: clips.len(),
            });
        }
        if !(self.align > 0.0) || !self.align.is_finite() {
            return Err(Error::InvalidAlignment(self.align));
        }

        let tail_ms = trailing_boundary_ms(lines, media_end_ms);
        let target_end_ms = lines.last().map(|l| l.ms.end_ms()).unwrap_or(0);
        let mut track = AudioClip::empty(self.sample_rate);
        let mut total_placed_ms = 0.0;
        let mut placements = Vec::with_capacity(lines.len());

        for (index, (line, clip)) in lines.iter().zip(clips).enumerate() {
            let next_start = lines
                .get(index + 1)
                .map(|next| next.ms.start_ms())
                .unwrap_or(tail_ms);
            let window = FitWindow {
                left_border_ms: line.ms.start_ms() as f64 - total_placed_ms,
                need_duration_ms: line.ms.duration_ms() as f64,
                right_border_ms: next_start as f64 - line.ms.end_ms() as f64,
            };

            let clip = clip.resampled(self.sample_rate)?;
            let fitted = fit(&clip, window, self.align, self.stretcher).map_err(|e| {
                log::warn!("Line {} ({}): {}", index + 1, line.ms, e);
                e
            })?;

            let speech_start_ms = total_placed_ms + fitted.padding_ms;
            let placed_ms = fitted.clip.duration_ms();
            log::debug!(
                "Line {} [{}]: window {:.0}/{:.0}/{:.0} ms, pad {:.0} ms, speed x{:.3}",
                index + 1,
                line.ms,
                window.left_border_ms,
                window.need_duration_ms,
                window.right_border_ms,
                fitted.padding_ms,
                fitted.speed_ratio
            );

            placements.push(Placement {
                index,
                start_ms: line.ms.start_ms(),
                end_ms: line.ms.end_ms(),
                window,
                padding_ms: fitted.padding_ms,
                speed_ratio: fitted.speed_ratio,
                speech_start_ms,
                speech_ms: placed_ms - fitted.padding_ms,
            });

            total_placed_ms += placed_ms;
            track = track.concat(&fitted.clip)?;
        }

        let target = target_end_ms as f64;
        // Sample rounding of the padding can leave the total a fraction of a
        // sample off the target.
        let tolerance_ms = 500.0 / self.sample_rate as f64;

        let (clip, reconciliation) = if total_placed_ms - target > tolerance_ms {
            let ratio = total_placed_ms / target;
            log::warn!(
                "Dub runs {:.0} ms past the end, speeding up the whole track x{:.4}",
                total_placed_ms - target,
                ratio
            );
            let sped = speed_change(&track, ratio, self.stretcher)?;
            (sped, Reconciliation::SpeedChange { ratio })
        } else if target - total_placed_ms > tolerance_ms {
            let first_start = lines[0].ms.start_ms() as f64;
            let ms = (target - total_placed_ms).min(first_start);
            if ms > 0.0 {
                log::debug!("Prepending {:.0} ms of leading silence", ms);
                (track.with_leading_silence(ms), Reconciliation::LeadingSilence { ms })
            } else {
                (track, Reconciliation::None)
            }
        } else {
            (track, Reconciliation::None)
        };

        Ok(AssembledTrack {
            clip,
            total_placed_ms,
            target_end_ms,
            reconciliation,
            placements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::TimeLabel;
    use crate::timing::speed::SignalsmithStretch;

    const SR: u32 = 8000;

    fn line(start: u64, end: u64, text: &str) -> Line {
        Line::new(TimeLabel::new(start, end).unwrap(), text)
    }

    fn clip_ms(ms: u64) -> AudioClip {
        let n = (ms * SR as u64 / 1000) as usize;
        let samples = (0..n).map(|i| ((i % 32) as f64 / 32.0 - 0.5) * 0.5).collect();
        AudioClip::new(samples, SR)
    }

    #[test]
    fn test_trailing_boundary() {
        let lines = vec![line(0, 1000, "a"), line(1200, 2000, "b")];
        assert_eq!(trailing_boundary_ms(&lines, None), 2000);
        assert_eq!(trailing_boundary_ms(&lines, Some(5000)), 5000);
        assert_eq!(trailing_boundary_ms(&lines, Some(1500)), 2000);
    }

    #[test]
    fn test_squeeze_then_no_leading_silence() {
        let lines = vec![line(0, 1000, "a"), line(1200, 2000, "b")];
        let clips = vec![clip_ms(1500), clip_ms(300)];
        let stretcher = SignalsmithStretch;
        let track = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&lines, clips, None)
            .unwrap();

        let first = &track.placements[0];
        assert!((first.speed_ratio - 1.25).abs() < 1e-9);
        assert_eq!(first.padding_ms, 0.0);

        let second = &track.placements[1];
        assert!(second.window.left_border_ms.abs() < 0.2);
        assert_eq!(second.padding_ms, 0.0);
        assert_eq!(second.speed_ratio, 1.0);

        assert!((track.total_placed_ms - 1500.0).abs() < 0.2);
        assert_eq!(track.target_end_ms, 2000);
        assert_eq!(track.reconciliation, Reconciliation::None);
        assert!((track.clip.duration_ms() - 1500.0).abs() < 0.2);
    }

    #[test]
    fn test_lines_start_on_time() {
        let lines = vec![line(500, 1500, "a"), line(2000, 3000, "b")];
        let clips = vec![clip_ms(600), clip_ms(1000)];
        let stretcher = SignalsmithStretch;
        let track = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&lines, clips, Some(4000))
            .unwrap();

        assert_eq!(track.placements[0].padding_ms, 500.0);
        assert!((track.placements[0].speech_start_ms - 500.0).abs() < 1e-9);
        // 500 + 600 placed, second line starts 900 ms later
        assert!((track.placements[1].padding_ms - 900.0).abs() < 1e-9);
        assert!((track.placements[1].speech_start_ms - 2000.0).abs() < 1e-9);
        assert!((track.total_placed_ms - 3000.0).abs() < 1e-9);

        // the media end only widens the last gap
        assert_eq!(track.placements[1].window.right_border_ms, 1000.0);
        assert_eq!(track.target_end_ms, 3000);
        assert_eq!(track.reconciliation, Reconciliation::None);
        assert!((track.clip.duration_ms() - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_media_does_not_delay_speech() {
        let lines = vec![line(5000, 6000, "a"), line(8000, 9000, "b")];
        let clips = vec![clip_ms(1000), clip_ms(1000)];
        let stretcher = SignalsmithStretch;
        let track = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&lines, clips, Some(60000))
            .unwrap();

        assert_eq!(track.target_end_ms, 9000);
        assert_eq!(track.reconciliation, Reconciliation::None);
        assert!((track.placements[0].speech_start_ms - 5000.0).abs() < 1e-9);
        assert!((track.placements[1].speech_start_ms - 8000.0).abs() < 1e-9);
        assert!((track.clip.duration_ms() - 9000.0).abs() < 1e-9);
    }

    #[test]
    fn test_tail_gap_overrun_speeds_up_track() {
        // the last clip spills into the gap before the media end
        let lines = vec![line(0, 1000, "a")];
        let track = Assembler::new(&Passthrough, 2.0, SR)
            .assemble(&lines, vec![clip_ms(1400)], Some(2000))
            .unwrap();

        assert_eq!(track.placements[0].speed_ratio, 1.0);
        assert_eq!(track.reconciliation, Reconciliation::SpeedChange { ratio: 1.4 });
    }

    #[test]
    fn test_sub_sample_overrun_is_ignored() {
        let sr = 44100;
        let lines = vec![line(6, 1006, "a")];
        let clip = AudioClip::new(vec![0.1; 44200], sr);
        let track = Assembler::new(&SignalsmithStretch, 1.0, sr)
            .assemble(&lines, vec![clip], None)
            .unwrap();

        assert!(track.total_placed_ms > 1006.0);
        assert!(track.total_placed_ms - 1006.0 < 0.5);
        assert_eq!(track.reconciliation, Reconciliation::None);
        assert_eq!(track.clip.len(), 44200 + 165);
    }

    #[test]
    fn test_media_end_before_last_line_is_ignored() {
        let lines = vec![line(0, 1000, "a")];
        let clips = vec![clip_ms(1000)];
        let stretcher = SignalsmithStretch;
        let track = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&lines, clips, Some(800))
            .unwrap();

        assert_eq!(track.target_end_ms, 1000);
        assert_eq!(track.reconciliation, Reconciliation::None);
    }

    /// Leaves audio untouched, so squeezes have no effect.
    struct Passthrough;

    impl TimeStretch for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn stretch(&self, clip: &AudioClip, _factor: f64) -> Result<AudioClip> {
            Ok(clip.clone())
        }
    }

    #[test]
    fn test_overrun_speeds_up_whole_track() {
        let lines = vec![line(0, 1000, "a")];
        let track = Assembler::new(&Passthrough, 2.0, SR)
            .assemble(&lines, vec![clip_ms(1500)], None)
            .unwrap();

        assert!((track.total_placed_ms - 1500.0).abs() < 1e-9);
        assert_eq!(track.reconciliation, Reconciliation::SpeedChange { ratio: 1.5 });
    }

    #[test]
    fn test_mismatched_counts() {
        let lines = vec![line(0, 1000, "a"), line(1000, 2000, "b")];
        let stretcher = SignalsmithStretch;
        let err = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&lines, vec![clip_ms(100)], None)
            .unwrap_err();
        assert!(matches!(err, Error::Mismatch { lines: 2, clips: 1 }));
    }

    #[test]
    fn test_empty_transcript() {
        let stretcher = SignalsmithStretch;
        let err = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&[], vec![], None)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyTranscript));
    }

    #[test]
    fn test_invalid_alignment() {
        let stretcher = SignalsmithStretch;
        let err = Assembler::new(&stretcher, 0.0, SR)
            .assemble(&[line(0, 10, "a")], vec![clip_ms(5)], None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAlignment(_)));
    }

    #[test]
    fn test_resamples_foreign_clips() {
        let lines = vec![line(0, 1000, "a")];
        let clip = AudioClip::new(vec![0.1; 4000], 16000);
        let stretcher = SignalsmithStretch;
        let track = Assembler::new(&stretcher, 2.0, SR)
            .assemble(&lines, vec![clip], None)
            .unwrap();
        assert_eq!(track.clip.sample_rate(), SR);
    }
}
