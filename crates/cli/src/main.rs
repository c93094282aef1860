//! dubfit CLI: voice subtitles and fit the speech onto the original timeline.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use dubfit_core::dubber::{collect_inputs, jobs_from_groups, DubJob, Dubber};
use dubfit_core::ffmpeg::{Ffmpeg, FfmpegConfig, FfmpegStretch};
use dubfit_core::mix::MixPolicy;
use dubfit_core::speech::{default_cache_dir, CommandEngine, SpeechCache, SpeechEngine, Voicer};
use dubfit_core::timing::{SignalsmithStretch, TimeStretch};
use dubfit_core::types::DubConfig;

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "dubfit",
    about = "Dub videos from their subtitles with synthesized speech",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dub every subtitle file in a directory (or a single file)
    Dub(DubArgs),
    /// List the voices the speech engine offers
    Voices(EngineArgs),
    /// Delete cached speech
    ClearCache(CacheArgs),
}

// ─── Shared arguments ────────────────────────────────────────────

#[derive(Parser, Debug)]
struct EngineArgs {
    /// Speech command with {voice}, {out} and optional {text} placeholders
    /// (default: espeak-ng reading stdin)
    #[arg(long)]
    tts_cmd: Option<String>,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct CacheArgs {
    /// Speech cache directory (default: $DUBFIT_CACHE_DIR or ~/.cache/dubfit/tts)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum MixMode {
    /// Lower the original only while the dub speaks
    Duck,
    /// Lay the dub over the untouched original
    Overlay,
    /// Average both tracks
    Full,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StretchBackend {
    Signalsmith,
    Ffmpeg,
}

// ─── Dub ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(allow_negative_numbers = true)]
struct DubArgs {
    /// Directory of subtitle/video pairs, or one subtitle file
    #[arg(default_value = ".")]
    input: PathBuf,

    /// Subtitle extension
    #[arg(long, default_value = "srt")]
    subtitle_ext: String,

    /// Video extension
    #[arg(long, default_value = "mp4")]
    video_ext: String,

    /// Language tag for output names
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Voice to start with (default: the language tag)
    #[arg(long)]
    voice: Option<String>,

    /// Line prefix that switches voice, e.g. "!:Russian"
    #[arg(long, default_value = "!:")]
    voice_anchor: String,

    /// Ignore voice switches in the subtitle text
    #[arg(long, default_value_t = false)]
    no_voice_anchor: bool,

    #[command(flatten)]
    engine: EngineArgs,

    /// Output audio format
    #[arg(long, default_value = "wav")]
    audio_format: String,

    /// Split spare room around an overflowing line by this divisor
    #[arg(long, default_value_t = 2.0)]
    fit_align: f64,

    /// Working sample rate (Hz)
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// How to combine dub and original audio
    #[arg(long, value_enum, default_value_t = MixMode::Duck)]
    mix: MixMode,

    /// Dub gain for --mix overlay (dB)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    overlay_gain: f64,

    /// Shortest pause in the dub that ends a ducked span (ms)
    #[arg(long, default_value_t = 100)]
    min_silence_len: u64,

    /// Level at or below which the dub counts as silent (dBFS, "-inf" for digital silence)
    #[arg(long, default_value_t = f64::NEG_INFINITY, allow_hyphen_values = true)]
    silence_thresh: f64,

    /// Original level under the dub when ducking (dB)
    #[arg(long, default_value_t = -11.0, allow_hyphen_values = true)]
    gain_during_overlay: f64,

    /// Mux the result into <name>_<lang>.mkv [use --no-export-video to disable]
    #[arg(long, default_value_t = true)]
    export_video: bool,

    /// Only write the audio track
    #[arg(long, overrides_with = "export_video")]
    no_export_video: bool,

    /// Remove the audio file once muxed [use --no-cleanup-audio to keep it]
    #[arg(long, default_value_t = true)]
    cleanup_audio: bool,

    /// Keep the audio file next to the muxed video
    #[arg(long, overrides_with = "cleanup_audio")]
    no_cleanup_audio: bool,

    /// Skip files whose name starts with "_" [use --no-skip-underscore to include them]
    #[arg(long, default_value_t = true)]
    skip_underscore: bool,

    /// Include files whose name starts with "_"
    #[arg(long, overrides_with = "skip_underscore")]
    no_skip_underscore: bool,

    /// File names or stems to leave out
    #[arg(long)]
    exclude: Vec<String>,

    /// Write a JSON report of every line's placement
    #[arg(long, default_value_t = false)]
    report: bool,

    /// Synthesis threads: "N", or "*F" for F times the CPU count
    #[arg(long, default_value = "1", value_parser = parse_threads)]
    threads: usize,

    /// Speech cache cleanup: 0 never, 1 before dubbing, 2 after dubbing
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    remove_cache: u8,

    /// Speech cache directory (default: $DUBFIT_CACHE_DIR or ~/.cache/dubfit/tts)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Time-stretch backend
    #[arg(long, value_enum, default_value_t = StretchBackend::Signalsmith)]
    stretch: StretchBackend,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffmpeg -loglevel (quiet, error, warning, info, verbose, debug)
    #[arg(long, default_value = "error")]
    ffmpeg_loglevel: String,
}

impl DubArgs {
    fn mix_policy(&self) -> MixPolicy {
        match self.mix {
            MixMode::Duck => MixPolicy::SidechainDuck {
                min_silence_len_ms: self.min_silence_len,
                silence_thresh_db: self.silence_thresh,
                gain_during_overlay_db: self.gain_during_overlay,
            },
            MixMode::Overlay => MixPolicy::Overlay {
                gain_db: self.overlay_gain,
            },
            MixMode::Full => MixPolicy::FullMix,
        }
    }

    fn config(&self) -> DubConfig {
        DubConfig {
            language: self.language.clone(),
            audio_format: self.audio_format.trim_start_matches('.').to_string(),
            fit_align: self.fit_align,
            sample_rate: self.sample_rate,
            mix: self.mix_policy(),
            cleanup_audio: self.cleanup_audio && !self.no_cleanup_audio,
            export_video: self.export_video && !self.no_export_video,
            threads: self.threads,
            write_report: self.report,
        }
    }

    fn ffmpeg_config(&self) -> FfmpegConfig {
        FfmpegConfig {
            exe: self.ffmpeg.clone(),
            loglevel: self.ffmpeg_loglevel.clone(),
            ..Default::default()
        }
    }
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Init logging
    let log_level = match &cli.command {
        Command::Dub(a) if a.engine.verbose => "debug",
        Command::Voices(a) if a.verbose => "debug",
        Command::ClearCache(a) if a.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Dub(args) => run_dub(args),
        Command::Voices(args) => run_voices(args),
        Command::ClearCache(args) => run_clear_cache(args),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Parse "N" or "*F" (F times the number of CPUs). Never below 1.
fn parse_threads(s: &str) -> std::result::Result<usize, String> {
    let s = s.trim();
    if let Some(factor) = s.strip_prefix('*') {
        let factor: f64 = factor
            .trim()
            .parse()
            .map_err(|_| format!("invalid thread factor: {s:?}"))?;
        if !(factor > 0.0) {
            return Err(format!("thread factor must be positive: {s:?}"));
        }
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        return Ok(((cpus as f64 * factor).round() as usize).max(1));
    }
    let n: usize = s.parse().map_err(|_| format!("invalid thread count: {s:?}"))?;
    Ok(n.max(1))
}

fn build_engine(tts_cmd: Option<&str>) -> Result<CommandEngine> {
    let Some(cmd) = tts_cmd else {
        return Ok(CommandEngine::espeak());
    };
    let mut parts = cmd.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("--tts-cmd is empty");
    };
    let args: Vec<&str> = parts.collect();
    if !args.iter().any(|a| a.contains("{out}")) {
        bail!("--tts-cmd must contain an {{out}} placeholder: {}", cmd);
    }
    Ok(CommandEngine::new(program, &args, None))
}

fn cache_for(dir: Option<&PathBuf>) -> SpeechCache {
    SpeechCache::new(dir.cloned().unwrap_or_else(default_cache_dir))
}

/// Jobs for a directory of inputs, or for a single subtitle file.
fn discover_jobs(args: &DubArgs) -> Result<Vec<DubJob>> {
    if args.input.is_file() {
        let name = args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .context("Input file has no name")?;
        let video = args.input.with_extension(args.video_ext.trim_start_matches('.'));
        return Ok(vec![DubJob {
            name,
            subtitles: Some(args.input.clone()),
            video: video.is_file().then_some(video),
        }]);
    }
    if !args.input.is_dir() {
        bail!("Input not found: {}", args.input.display());
    }
    let groups = collect_inputs(&args.input, args.skip_underscore && !args.no_skip_underscore, &args.exclude)
        .with_context(|| format!("Failed to list {}", args.input.display()))?;
    Ok(jobs_from_groups(&groups, &args.subtitle_ext, &args.video_ext))
}

// ─── Dub runner ──────────────────────────────────────────────────

fn run_dub(args: DubArgs) -> Result<bool> {
    let config = args.config();
    let jobs = discover_jobs(&args)?;
    if jobs.is_empty() {
        log::warn!("Nothing to dub in {}", args.input.display());
        return Ok(true);
    }

    let cache = cache_for(args.cache_dir.as_ref());
    if args.remove_cache == 1 {
        cache.clear().context("Failed to clear speech cache")?;
    }

    let engine = build_engine(args.engine.tts_cmd.as_deref())?;
    let anchor = (!args.no_voice_anchor).then_some(args.voice_anchor.as_str());
    let mut voicer = Voicer::new(engine, cache, &config.language, config.sample_rate).with_anchor(anchor);
    let voice = args.voice.clone().unwrap_or_else(|| config.language.clone());
    voicer
        .select_voice(&voice)
        .with_context(|| format!("Cannot use voice \"{}\"", voice))?;

    let ffmpeg = Ffmpeg::new(args.ffmpeg_config());
    let stretcher: Box<dyn TimeStretch> = match args.stretch {
        StretchBackend::Signalsmith => Box::new(SignalsmithStretch),
        StretchBackend::Ffmpeg => Box::new(FfmpegStretch::new(ffmpeg.clone())),
    };

    log::info!(
        "Dubbing {} file(s) into \"{}\" with {} thread(s)",
        jobs.len(),
        config.language,
        config.threads
    );
    let dubber = Dubber::new(config, voicer, stretcher, ffmpeg);
    let summary = dubber.dub_all(&jobs);

    if args.remove_cache == 2 {
        dubber
            .voicer()
            .cache()
            .clear()
            .context("Failed to clear speech cache")?;
    }

    for (name, message) in &summary.failed {
        eprintln!("FAILED {}: {}", name, message);
    }
    Ok(summary.is_success())
}

// ─── Voices / cache runners ──────────────────────────────────────

fn run_voices(args: EngineArgs) -> Result<bool> {
    let engine = build_engine(args.tts_cmd.as_deref())?;
    let voices = engine
        .voices()
        .with_context(|| format!("Failed to list voices of {}", engine.name()))?;
    if voices.is_empty() {
        println!("{} does not list its voices", engine.name());
    }
    for voice in voices {
        println!("{}", voice);
    }
    Ok(true)
}

fn run_clear_cache(args: CacheArgs) -> Result<bool> {
    let cache = cache_for(args.cache_dir.as_ref());
    let removed = cache
        .clear()
        .with_context(|| format!("Failed to clear {}", cache.dir().display()))?;
    println!("Removed {} cached clips from {}", removed, cache.dir().display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threads() {
        assert_eq!(parse_threads("4"), Ok(4));
        assert_eq!(parse_threads("0"), Ok(1));
        assert!(parse_threads("*1").unwrap() >= 1);
        assert!(parse_threads("*0.01").unwrap() >= 1);
        assert!(parse_threads("*-1").is_err());
        assert!(parse_threads("many").is_err());
    }

    #[test]
    fn test_dub_args_defaults() {
        let cli = Cli::parse_from(["dubfit", "dub", "subs"]);
        let Command::Dub(args) = cli.command else {
            panic!("expected dub");
        };
        let config = args.config();
        assert_eq!(config.language, "en");
        assert!(config.export_video);
        assert!(config.cleanup_audio);
        assert_eq!(config.mix, MixPolicy::default());
        assert_eq!(args.remove_cache, 0);
    }

    #[test]
    fn test_dub_args_overrides() {
        let cli = Cli::parse_from([
            "dubfit",
            "dub",
            "subs",
            "--no-export-video",
            "--mix",
            "overlay",
            "--overlay-gain",
            "-6",
            "--threads",
            "3",
            "--remove-cache",
            "2",
            "--audio-format",
            ".mp3",
        ]);
        let Command::Dub(args) = cli.command else {
            panic!("expected dub");
        };
        let config = args.config();
        assert!(!config.export_video);
        assert_eq!(config.mix, MixPolicy::Overlay { gain_db: -6.0 });
        assert_eq!(config.threads, 3);
        assert_eq!(config.audio_format, "mp3");
        assert_eq!(args.remove_cache, 2);
    }

    #[test]
    fn test_ffmpeg_loglevel_flag() {
        let cli = Cli::parse_from(["dubfit", "dub", "subs", "--ffmpeg-loglevel", "warning"]);
        let Command::Dub(args) = cli.command else {
            panic!("expected dub");
        };
        let config = args.ffmpeg_config();
        assert_eq!(config.loglevel, "warning");
        assert_eq!(config.exe, PathBuf::from("ffmpeg"));

        let cli = Cli::parse_from(["dubfit", "dub", "subs"]);
        let Command::Dub(args) = cli.command else {
            panic!("expected dub");
        };
        assert_eq!(args.ffmpeg_config().loglevel, FfmpegConfig::default().loglevel);
    }

    #[test]
    fn test_remove_cache_out_of_range() {
        assert!(Cli::try_parse_from(["dubfit", "dub", "--remove-cache", "3"]).is_err());
    }

    #[test]
    fn test_build_engine_custom_command() {
        let engine = build_engine(Some("say -v {voice} -o {out} {text}")).unwrap();
        assert_eq!(engine.program, "say");
        assert_eq!(engine.render_args, vec!["-v", "{voice}", "-o", "{out}", "{text}"]);
        assert!(build_engine(Some("say {text}")).is_err());
        assert!(build_engine(Some("   ")).is_err());
    }
}
