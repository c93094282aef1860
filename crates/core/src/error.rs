use std::path::PathBuf;

/// All errors that can occur while dubbing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed timecode in block {block}: {detail}")]
    MalformedTimecode { block: usize, detail: String },

    #[error("invalid speed factor {0}: this is usually caused by broken subtitle timecodes")]
    InvalidSpeedFactor(f64),

    #[error("invalid fit alignment divisor {0} (must be > 0)")]
    InvalidAlignment(f64),

    #[error("transcript has no non-empty lines")]
    EmptyTranscript,

    #[error("got {clips} clips for {lines} subtitle lines")]
    Mismatch { lines: usize, clips: usize },

    #[error("speech synthesis failed for line {line}: {message}")]
    Synthesis { line: usize, message: String },

    #[error("unknown voice \"{voice}\" (available: {available})")]
    UnknownVoice { voice: String, available: String },

    #[error("{program} failed: {message}")]
    Subprocess { program: String, message: String },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("audio decoding error in {path}: {message}")]
    AudioDecode { path: PathBuf, message: String },

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn decode(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::AudioDecode {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_malformed_timecode() {
        let e = Error::MalformedTimecode {
            block: 3,
            detail: "bad hour".into(),
        };
        assert_eq!(e.to_string(), "malformed timecode in block 3: bad hour");
    }

    #[test]
    fn test_error_display_speed_factor() {
        let e = Error::InvalidSpeedFactor(-0.5);
        assert!(e.to_string().contains("-0.5"));
        assert!(e.to_string().contains("subtitle timecodes"));
    }

    #[test]
    fn test_error_display_unknown_voice() {
        let e = Error::UnknownVoice {
            voice: "klingon".into(),
            available: "en, ru".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("klingon"));
        assert!(msg.contains("en, ru"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_decode_helper() {
        let e = Error::decode("/tmp/video.mp4", "no audio track");
        assert!(e.to_string().contains("/tmp/video.mp4"));
        assert!(e.to_string().contains("no audio track"));
    }
}
