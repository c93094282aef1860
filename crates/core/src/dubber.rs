//! End-to-end dubbing of one subtitle file, and batches of them.
//!
//! Per file: parse the subtitles, plan voices, synthesize lines (in
//! parallel), fit them onto the timeline (sequentially), then mix with the
//! original soundtrack and optionally mux everything into a video.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::audio::io::decode_audio;
use crate::audio::AudioClip;
use crate::error::{Error, Result};
use crate::ffmpeg::Ffmpeg;
use crate::mix::mix;
use crate::process::CancelToken;
use crate::speech::{SpeechEngine, Voicer};
use crate::subtitles;
use crate::timing::{Assembler, TimeStretch};
use crate::types::{DubConfig, DubReport, LineReport};

/// Output directory created next to the subtitle file.
pub const RESULT_DIR: &str = "_result";

/// Files found under one stem: extension (lowercase, no dot) to path.
pub type InputGroups = BTreeMap<String, BTreeMap<String, PathBuf>>;

/// Group the files in `dir` by stem and extension.
///
/// Names starting with `_` are skipped when `skip_underscore` is set (this
/// keeps `_result` out). `exclude` matches either full file names or stems.
pub fn collect_inputs(dir: &Path, skip_underscore: bool, exclude: &[String]) -> Result<InputGroups> {
    let mut groups = InputGroups::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let (Some(file_name), Some(stem)) = (
            path.file_name().and_then(|n| n.to_str()),
            path.file_stem().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if skip_underscore && file_name.starts_with('_') {
            continue;
        }
        if exclude.iter().any(|x| x == file_name || x == stem) {
            log::debug!("Excluded {}", file_name);
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        groups
            .entry(stem.to_string())
            .or_default()
            .insert(ext, path.clone());
    }
    Ok(groups)
}

/// One unit of work: a subtitle file and, optionally, the video it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DubJob {
    pub name: String,
    pub subtitles: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

/// Pair each group's subtitle and video files by extension.
pub fn jobs_from_groups(groups: &InputGroups, subtitle_ext: &str, video_ext: &str) -> Vec<DubJob> {
    let subtitle_ext = subtitle_ext.trim_start_matches('.').to_ascii_lowercase();
    let video_ext = video_ext.trim_start_matches('.').to_ascii_lowercase();
    groups
        .iter()
        .filter_map(|(name, files)| {
            let subtitles = files.get(&subtitle_ext).cloned();
            let video = files.get(&video_ext).cloned();
            if subtitles.is_none() && video.is_none() {
                return None;
            }
            Some(DubJob {
                name: name.clone(),
                subtitles,
                video,
            })
        })
        .collect()
}

/// Files written for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DubOutputs {
    pub audio: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    /// Job name and error message.
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outputs written so far; deleted on drop unless committed.
#[derive(Default)]
struct PendingOutputs(Vec<PathBuf>);

impl PendingOutputs {
    fn add(&mut self, path: &Path) {
        self.0.push(path.to_path_buf());
    }

    fn forget(&mut self, path: &Path) {
        self.0.retain(|p| p != path);
    }

    fn commit(mut self) {
        self.0.clear();
    }
}

impl Drop for PendingOutputs {
    fn drop(&mut self) {
        for path in &self.0 {
            if path.exists() {
                log::debug!("Removing partial output {}", path.display());
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

pub struct Dubber<E: SpeechEngine> {
    config: DubConfig,
    voicer: Voicer<E>,
    stretcher: Box<dyn TimeStretch>,
    ffmpeg: Ffmpeg,
    cancel: CancelToken,
}

impl<E: SpeechEngine> Dubber<E> {
    pub fn new(config: DubConfig, voicer: Voicer<E>, stretcher: Box<dyn TimeStretch>, ffmpeg: Ffmpeg) -> Self {
        Self {
            config,
            voicer,
            stretcher,
            ffmpeg,
            cancel: CancelToken::new(),
        }
    }

    /// Stop between files once `cancel` fires; running conversions are
    /// killed too.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.ffmpeg = self.ffmpeg.with_cancel(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DubConfig {
        &self.config
    }

    pub fn voicer(&self) -> &Voicer<E> {
        &self.voicer
    }

    fn output_path(&self, dir: &Path, name: &str, ext: &str) -> PathBuf {
        dir.join(format!("{}_{}.{}", name, self.config.language, ext))
    }

    /// Read the video's soundtrack, in process if possible, else through
    /// ffmpeg. `None` when the video has no usable audio.
    fn load_original(&self, video: &Path) -> Option<AudioClip> {
        let sr = self.config.sample_rate;
        match decode_audio(video, sr) {
            Ok(samples) => return Some(AudioClip::new(samples, sr)),
            Err(e) => log::debug!("In-process decode failed ({}), trying ffmpeg", e),
        }
        match self.ffmpeg.extract_audio(video, sr) {
            Ok(clip) => Some(clip),
            Err(e) => {
                log::warn!("No usable audio in {} ({}), writing the dub alone", video.display(), e);
                None
            }
        }
    }

    /// Dub one job. Returns `None` when there are no subtitles to voice.
    ///
    /// On failure every output already written for this job is removed.
    pub fn dub_one(&self, job: &DubJob) -> Result<Option<DubOutputs>> {
        let Some(subs_path) = &job.subtitles else {
            log::info!("{}: no subtitles, skipping", job.name);
            return Ok(None);
        };

        log::info!("{}: reading {}", job.name, subs_path.display());
        let mut lines = subtitles::load(subs_path, &self.ffmpeg)?;
        lines.sort_by_key(|l| l.ms.start_ms());
        if lines.is_empty() {
            return Err(Error::EmptyTranscript);
        }

        let requests = self.voicer.plan(&lines)?;
        log::info!("{}: synthesizing {} lines", job.name, requests.len());
        let synthesized = self.voicer.synthesize_all(&requests, self.config.threads);
        let fell_back: Vec<bool> = synthesized.iter().map(|s| s.fell_back).collect();
        let clips = synthesized.into_iter().map(|s| s.clip).collect();

        let original = job.video.as_deref().and_then(|v| self.load_original(v));
        let media_end_ms = original.as_ref().map(|c| c.duration_ms() as u64);

        log::info!("{}: fitting speech to the timeline", job.name);
        let track = Assembler::new(self.stretcher.as_ref(), self.config.fit_align, self.config.sample_rate)
            .assemble(&lines, clips, media_end_ms)?;

        let result_dir = subs_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(RESULT_DIR);
        std::fs::create_dir_all(&result_dir)?;

        let mut pending = PendingOutputs::default();
        let mut outputs = DubOutputs::default();

        let final_audio = match &original {
            Some(original) => mix(original, &track.clip, self.config.mix)?,
            None => track.clip.clone(),
        };
        let audio_path = self.output_path(&result_dir, &job.name, &self.config.audio_format);
        log::info!("{}: writing {}", job.name, audio_path.display());
        self.ffmpeg.encode(&final_audio, &audio_path)?;
        pending.add(&audio_path);
        outputs.audio = Some(audio_path.clone());

        if let (Some(video), true) = (&job.video, self.config.export_video) {
            let video_out = self.output_path(&result_dir, &job.name, "mkv");
            log::info!("{}: muxing {}", job.name, video_out.display());
            let subs_srt = tempfile::Builder::new()
                .prefix(".subs_")
                .suffix(".srt")
                .tempfile_in(&result_dir)?;
            subtitles::write_file(subs_srt.path(), &lines)?;
            self.ffmpeg.mux(video, &audio_path, Some(subs_srt.path()), &video_out)?;
            pending.add(&video_out);
            outputs.video = Some(video_out);

            if self.config.cleanup_audio {
                std::fs::remove_file(&audio_path)?;
                pending.forget(&audio_path);
                outputs.audio = None;
            }
        }

        if self.config.write_report {
            let report = DubReport {
                name: job.name.clone(),
                language: self.config.language.clone(),
                lines: track
                    .placements
                    .iter()
                    .zip(&requests)
                    .zip(&fell_back)
                    .map(|((p, r), &fell_back)| LineReport {
                        index: p.index,
                        text: r.text.clone(),
                        voice: r.voice.clone(),
                        start_ms: p.start_ms,
                        end_ms: p.end_ms,
                        window: p.window,
                        placed_start_ms: p.speech_start_ms,
                        padding_ms: p.padding_ms,
                        speed_ratio: p.speed_ratio,
                        clip_ms: p.speech_ms,
                        fell_back,
                    })
                    .collect(),
                total_placed_ms: track.total_placed_ms,
                target_end_ms: track.target_end_ms,
                reconciliation: track.reconciliation,
                audio: outputs.audio.clone(),
                video: outputs.video.clone(),
            };
            let report_path = self.output_path(&result_dir, &job.name, "json");
            std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
            pending.add(&report_path);
            outputs.report = Some(report_path);
        }

        pending.commit();
        Ok(Some(outputs))
    }

    /// Dub every job. A failing job is logged and recorded; the rest go on.
    pub fn dub_all(&self, jobs: &[DubJob]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (i, job) in jobs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                for rest in &jobs[i..] {
                    summary.failed.push((rest.name.clone(), "cancelled".to_string()));
                }
                break;
            }
            match self.dub_one(job) {
                Ok(Some(_)) => summary.succeeded.push(job.name.clone()),
                Ok(None) => summary.skipped.push(job.name.clone()),
                Err(e) => {
                    log::error!("{}: {}", job.name, e);
                    summary.failed.push((job.name.clone(), e.to_string()));
                }
            }
        }
        log::info!(
            "Done: {} dubbed, {} skipped, {} failed",
            summary.succeeded.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        summary
    }
}
