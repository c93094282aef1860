use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::mix::MixPolicy;
use crate::timing::{FitWindow, Reconciliation};

/// Settings for a dubbing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DubConfig {
    /// Language tag used in output names and as the default voice
    pub language: String,
    /// Output audio extension, e.g. "wav" or "mp3"
    pub audio_format: String,
    /// Divisor for splitting spare room around an overflowing clip
    pub fit_align: f64,
    /// Working sample rate, Hz
    pub sample_rate: u32,
    pub mix: MixPolicy,
    /// Remove the mixed audio once it has been muxed into the video
    pub cleanup_audio: bool,
    /// Mux the result into `<name>_<lang>.mkv` when a video is present
    pub export_video: bool,
    /// Synthesis worker threads
    pub threads: usize,
    /// Write `<name>_<lang>.json` next to the output
    pub write_report: bool,
}

impl Default for DubConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            audio_format: "wav".to_string(),
            fit_align: 2.0,
            sample_rate: 44100,
            mix: MixPolicy::default(),
            cleanup_audio: true,
            export_video: true,
            threads: 1,
            write_report: false,
        }
    }
}

/// How one subtitle line was voiced and placed.
#[derive(Debug, Clone, Serialize)]
pub struct LineReport {
    pub index: usize,
    pub text: String,
    pub voice: String,
    /// Subtitle start (ms)
    pub start_ms: u64,
    /// Subtitle end (ms)
    pub end_ms: u64,
    pub window: FitWindow,
    /// Track position where the speech begins, before reconciliation (ms)
    pub placed_start_ms: f64,
    pub padding_ms: f64,
    pub speed_ratio: f64,
    /// Speech length after fitting (ms)
    pub clip_ms: f64,
    /// Synthesis failed and silence was used instead
    pub fell_back: bool,
}

/// Per-file record of a dubbing run.
#[derive(Debug, Clone, Serialize)]
pub struct DubReport {
    pub name: String,
    pub language: String,
    pub lines: Vec<LineReport>,
    pub total_placed_ms: f64,
    pub target_end_ms: u64,
    pub reconciliation: Reconciliation,
    pub audio: Option<PathBuf>,
    pub video: Option<PathBuf>,
}
