//! SRT transcript model: parse, serialize, load from disk.
//!
//! A transcript is a list of [`Line`]s ordered by start time. Times are
//! whole milliseconds; fractional input is floored, never rounded.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Error, Result};
use crate::ffmpeg::Ffmpeg;

lazy_static::lazy_static! {
    /// Blank line followed by a line holding only the block number.
    static ref BLOCK_DELIMITER: Regex = Regex::new(r"(?m)\n\n^\d+[ \t]*$\n").unwrap();
}

/// Render milliseconds as `HH:MM:SS,mmm`.
pub fn ms_to_srt_time(ms: u64) -> String {
    let (s, ms) = (ms / 1000, ms % 1000);
    let (m, s) = (s / 60, s % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Parse `HH:MM:SS,fff` into milliseconds.
///
/// The fraction may have 1 to 6 digits and is read as a decimal fraction of
/// a second (",5" is 500 ms), then floored to whole milliseconds. `.` is
/// accepted in place of `,`.
pub fn parse_srt_time(token: &str) -> std::result::Result<u64, String> {
    let token = token.trim();
    let (clock, frac) = match token.find(&[',', '.'][..]) {
        Some(idx) => (&token[..idx], &token[idx + 1..]),
        None => (token, ""),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return Err(format!("expected HH:MM:SS in {token:?}"));
    };
    let field = |v: &str, name: &str| -> std::result::Result<u64, String> {
        if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("bad {name} in {token:?}"));
        }
        v.parse::<u64>().map_err(|e| format!("bad {name} in {token:?}: {e}"))
    };
    let hours = field(*h, "hours")?;
    let minutes = field(*m, "minutes")?;
    let seconds = field(*s, "seconds")?;
    if minutes >= 60 || seconds >= 60 {
        return Err(format!("minutes/seconds out of range in {token:?}"));
    }

    let micros = if frac.is_empty() {
        0
    } else {
        if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("bad fraction in {token:?}"));
        }
        format!("{frac:0<6}").parse::<u64>().map_err(|e| e.to_string())?
    };

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + micros / 1000)
}

/// Start and end of one subtitle, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLabel {
    start_ms: u64,
    end_ms: u64,
}

impl TimeLabel {
    pub fn new(start_ms: u64, end_ms: u64) -> Result<Self> {
        if end_ms < start_ms {
            return Err(Error::MalformedTimecode {
                block: 0,
                detail: format!(
                    "end {} is before start {}",
                    ms_to_srt_time(end_ms),
                    ms_to_srt_time(start_ms)
                ),
            });
        }
        Ok(Self { start_ms, end_ms })
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", ms_to_srt_time(self.start_ms), ms_to_srt_time(self.end_ms))
    }
}

/// One subtitle: when, and what is said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub ms: TimeLabel,
    pub text: String,
}

impl Line {
    pub fn new(ms: TimeLabel, text: impl Into<String>) -> Self {
        Self { ms, text: text.into() }
    }
}

fn parse_time_range(range: &str, block: usize) -> Result<TimeLabel> {
    let malformed = |detail: String| Error::MalformedTimecode { block, detail };

    let (start, end) = range
        .split_once("-->")
        .ok_or_else(|| malformed(format!("missing \"-->\" in {range:?}")))?;
    // Anything after the end token (positioning hints) is ignored.
    let start = start.split_whitespace().next().unwrap_or_default();
    let end = end.split_whitespace().next().unwrap_or_default();

    let start_ms = parse_srt_time(start).map_err(&malformed)?;
    let end_ms = parse_srt_time(end).map_err(&malformed)?;
    TimeLabel::new(start_ms, end_ms).map_err(|e| match e {
        Error::MalformedTimecode { detail, .. } => malformed(detail),
        other => other,
    })
}

/// Parse SRT text into lines.
///
/// Blocks whose text is empty after trimming are dropped. Any block with an
/// unparseable or inverted time range fails the whole parse.
pub fn parse(source: &str) -> Result<Vec<Line>> {
    let normalized = format!("\n\n{}", source.replace("\r\n", "\n").trim_start());
    let mut lines = Vec::new();

    for (i, block) in BLOCK_DELIMITER.split(&normalized).skip(1).enumerate() {
        let (range, text) = block.split_once('\n').unwrap_or((block, ""));
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let ms = parse_time_range(range, i + 1)?;
        lines.push(Line::new(ms, text));
    }

    Ok(lines)
}

/// Render lines as SRT, sorted by start time and numbered from 1.
pub fn serialize(lines: &[Line]) -> String {
    let mut sorted: Vec<&Line> = lines.iter().collect();
    sorted.sort_by_key(|l| l.ms.start_ms());

    let mut out = sorted
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}\n{}\n{}", i + 1, line.ms, line.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Read a subtitle file as text: BOM stripped, line endings normalized.
pub fn read_file(path: &Path) -> Result<String> {
    let raw = std::fs::read(path)?;
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&raw);
    Ok(String::from_utf8_lossy(raw).replace("\r\n", "\n"))
}

/// Load and parse a subtitle file.
///
/// Files that are not `.srt` are converted to SRT next to the original
/// first (the converter understands VTT, ASS and friends).
pub fn load(path: &Path, ffmpeg: &Ffmpeg) -> Result<Vec<Line>> {
    let is_srt = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("srt"))
        .unwrap_or(false);

    let srt_path: PathBuf = if is_srt {
        path.to_path_buf()
    } else {
        let converted = path.with_extension("srt");
        log::info!("Converting subtitles {} -> {}", path.display(), converted.display());
        ffmpeg.convert_file(path, &converted, &[])?;
        converted
    };

    parse(&read_file(&srt_path)?)
}

pub fn write_file(path: &Path, lines: &[Line]) -> Result<()> {
    std::fs::write(path, serialize(lines))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n\
                          2\n00:00:03,000 --> 00:00:04,000\nSecond line\nwraps here\n\n\
                          3\n00:00:05,000 --> 00:00:06,000\n   \n";

    #[test]
    fn test_ms_to_srt_time() {
        assert_eq!(ms_to_srt_time(0), "00:00:00,000");
        assert_eq!(ms_to_srt_time(3_723_004), "01:02:03,004");
        assert_eq!(ms_to_srt_time(360_000_000), "100:00:00,000");
    }

    #[test]
    fn test_parse_srt_time() {
        assert_eq!(parse_srt_time("01:02:03,004"), Ok(3_723_004));
        assert_eq!(parse_srt_time("00:00:00,5"), Ok(500));
        assert_eq!(parse_srt_time("00:00:01.250"), Ok(1250));
        assert_eq!(parse_srt_time("00:00:01"), Ok(1000));
    }

    #[test]
    fn test_parse_srt_time_floors_micros() {
        assert_eq!(parse_srt_time("00:00:00,999999"), Ok(999));
        assert_eq!(parse_srt_time("00:00:00,0019"), Ok(1));
    }

    #[test]
    fn test_parse_srt_time_rejects_garbage() {
        assert!(parse_srt_time("00:61:00,000").is_err());
        assert!(parse_srt_time("00:00,000").is_err());
        assert!(parse_srt_time("aa:00:00,000").is_err());
        assert!(parse_srt_time("00:00:00,1234567").is_err());
    }

    #[test]
    fn test_time_label_rejects_inverted() {
        assert!(TimeLabel::new(2000, 1000).is_err());
        let label = TimeLabel::new(1000, 2500).unwrap();
        assert_eq!(label.duration_ms(), 1500);
        assert_eq!(label.to_string(), "00:00:01,000 --> 00:00:02,500");
    }

    #[test]
    fn test_parse_basic() {
        let lines = parse(SAMPLE).unwrap();
        assert_eq!(lines.len(), 2, "empty block must be dropped");
        assert_eq!(lines[0].ms.start_ms(), 1000);
        assert_eq!(lines[0].ms.end_ms(), 2500);
        assert_eq!(lines[0].text, "Hello there");
        assert_eq!(lines[1].text, "Second line\nwraps here");
    }

    #[test]
    fn test_parse_crlf_and_leading_blank_lines() {
        let source = "\r\n\r\n1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n";
        let lines = parse(source).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hi");
    }

    #[test]
    fn test_parse_ignores_position_hints() {
        let source = "1\n00:00:01,000 --> 00:00:02,000 X1:10 X2:20\nHi\n";
        let lines = parse(source).unwrap();
        assert_eq!(lines[0].ms.end_ms(), 2000);
    }

    #[test]
    fn test_parse_malformed_aborts() {
        let source = "1\n00:00:01,000 --> 00:00:02,000\nok\n\n2\n00:0x:03,000 --> 00:00:04,000\nbad\n";
        let err = parse(source).unwrap_err();
        match err {
            Error::MalformedTimecode { block, .. } => assert_eq!(block, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_inverted_range_aborts() {
        let source = "1\n00:00:05,000 --> 00:00:02,000\nbackwards\n";
        assert!(matches!(parse(source), Err(Error::MalformedTimecode { .. })));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_serialize_sorts_and_renumbers() {
        let lines = vec![
            Line::new(TimeLabel::new(5000, 6000).unwrap(), "later"),
            Line::new(TimeLabel::new(1000, 2000).unwrap(), "first"),
        ];
        let out = serialize(&lines);
        assert_eq!(
            out,
            "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\n2\n00:00:05,000 --> 00:00:06,000\nlater\n"
        );
    }

    #[test]
    fn test_roundtrip() {
        let parsed = parse(SAMPLE).unwrap();
        let again = parse(&serialize(&parsed)).unwrap();
        assert_eq!(parsed, again);
    }

    #[test]
    fn test_read_file_strips_bom() {
        let dir = std::env::temp_dir().join(format!("dubfit_subs_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bom.srt");
        std::fs::write(&path, b"\xEF\xBB\xBF1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n").unwrap();

        let text = read_file(&path).unwrap();
        assert!(text.starts_with('1'));
        assert!(!text.contains('\r'));
        assert_eq!(parse(&text).unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_srt_needs_no_converter() {
        let dir = std::env::temp_dir().join(format!("dubfit_subs_load_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("video.srt");
        write_file(&path, &parse(SAMPLE).unwrap()).unwrap();

        let ffmpeg = Ffmpeg::new(Default::default());
        let lines = load(&path, &ffmpeg).unwrap();
        assert_eq!(lines.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
