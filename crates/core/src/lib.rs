//! Automatic dubbing: synthesize speech for subtitle lines and fit it onto
//! the original timeline.

pub mod audio;
pub mod dubber;
pub mod error;
pub mod ffmpeg;
pub mod mix;
pub mod process;
pub mod speech;
pub mod subtitles;
pub mod timing;
pub mod types;

pub use error::{Error, Result};
