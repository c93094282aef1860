//! The external media converter: format conversion, encoding, muxing and
//! an `atempo`-based time-stretch backend.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::audio::AudioClip;
use crate::error::{Error, Result};
use crate::process::{discard_on_error, run, CancelToken};
use crate::timing::speed::{atempo_filter, TimeStretch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Executable name or path.
    pub exe: PathBuf,
    /// Value for `-loglevel`.
    pub loglevel: String,
    /// Arguments placed before every invocation's inputs.
    pub default_args: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            exe: PathBuf::from("ffmpeg"),
            loglevel: "error".to_string(),
            default_args: vec!["-y".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    config: FfmpegConfig,
    cancel: CancelToken,
}

impl Ffmpeg {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Share `cancel` with the caller so a running conversion can be killed.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// Run one invocation with `args` after the configured defaults.
    pub fn convert<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut cmd = Command::new(&self.config.exe);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg(&self.config.loglevel)
            .args(&self.config.default_args)
            .args(args.into_iter().map(Into::<OsString>::into));
        run(cmd, None, &self.cancel)
    }

    /// Convert `input` into `output`, the container and codec following the
    /// output extension. `output` is removed if the conversion fails.
    pub fn convert_file(&self, input: &Path, output: &Path, extra_args: &[&str]) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
        args.extend(extra_args.iter().map(OsString::from));
        args.push(output.into());
        discard_on_error(output, self.convert(args))
    }

    /// Encode `clip` into `output`. WAV is written directly; other formats
    /// go through a temporary WAV.
    pub fn encode(&self, clip: &AudioClip, output: &Path) -> Result<()> {
        let is_wav = output
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            return discard_on_error(output, clip.save(output));
        }

        let tmp = tempfile::Builder::new().prefix("dubfit_").tempdir()?;
        let wav = tmp.path().join("encode.wav");
        clip.save(&wav)?;
        self.convert_file(&wav, output, &[])
    }

    /// Decode the first audio stream of `media` to a mono clip at `sample_rate`.
    pub fn extract_audio(&self, media: &Path, sample_rate: u32) -> Result<AudioClip> {
        let tmp = tempfile::Builder::new().prefix("dubfit_").tempdir()?;
        let wav = tmp.path().join("extract.wav");
        let sr = sample_rate.to_string();
        self.convert_file(media, &wav, &["-vn", "-ac", "1", "-ar", &sr])?;
        AudioClip::load(&wav)?.resampled(sample_rate)
    }

    /// Mux `audio` into `video` as the default audio track.
    ///
    /// The video stream is copied. The video's own audio, if any, is kept as
    /// a secondary track, and `subtitles` are embedded when given.
    pub fn mux(&self, video: &Path, audio: &Path, subtitles: Option<&Path>, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        discard_on_error(output, self.convert(mux_args(video, audio, subtitles, output)))
    }
}

fn mux_args(video: &Path, audio: &Path, subtitles: Option<&Path>, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), video.into(), "-i".into(), audio.into()];
    if let Some(subs) = subtitles {
        args.extend(["-i".into(), subs.into()]);
    }
    for arg in ["-map", "0:v:0", "-map", "1:a:0", "-map", "0:a:0?"] {
        args.push(arg.into());
    }
    if subtitles.is_some() {
        args.extend(["-map".into(), "2:s:0".into()]);
    }
    for arg in ["-c:v", "copy", "-c:a", "copy", "-disposition:a:0", "default", "-disposition:a:1", "0"] {
        args.push(arg.into());
    }
    if subtitles.is_some() {
        args.extend(["-c:s".into(), "srt".into()]);
    }
    args.push(output.into());
    args
}

/// Time stretch through ffmpeg's `atempo` filter.
///
/// A whole factor chain is applied in one invocation.
#[derive(Debug, Clone)]
pub struct FfmpegStretch {
    ffmpeg: Ffmpeg,
}

impl FfmpegStretch {
    pub fn new(ffmpeg: Ffmpeg) -> Self {
        Self { ffmpeg }
    }
}

impl TimeStretch for FfmpegStretch {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn stretch(&self, clip: &AudioClip, factor: f64) -> Result<AudioClip> {
        self.stretch_chain(clip, &[factor])
    }

    fn stretch_chain(&self, clip: &AudioClip, factors: &[f64]) -> Result<AudioClip> {
        if factors.is_empty() || clip.is_empty() {
            return Ok(clip.clone());
        }
        if let Some(&bad) = factors.iter().find(|f| !(**f > 0.0) || !f.is_finite()) {
            return Err(Error::InvalidSpeedFactor(bad));
        }

        let tmp = tempfile::Builder::new().prefix("dubfit_").tempdir()?;
        let input = tmp.path().join("in.wav");
        let output = tmp.path().join("out.wav");
        clip.save(&input)?;
        let filter = atempo_filter(factors);
        self.ffmpeg.convert_file(&input, &output, &["-filter:a", &filter])?;
        AudioClip::load(&output)?.resampled(clip.sample_rate())
    }
}
