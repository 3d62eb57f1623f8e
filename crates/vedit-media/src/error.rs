//! Media error types.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    /// `ffmpeg` or `ffprobe` is not on PATH.
    #[error("{0} not found in PATH")]
    ToolMissing(&'static str),

    #[error("ffmpeg exited with {exit_code:?}: {message}")]
    Ffmpeg {
        message: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("ffprobe could not read {}: {stderr}", path.display())]
    Probe { path: PathBuf, stderr: String },

    #[error("Input file missing: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Concatenation needs at least one input")]
    EmptyConcat,

    #[error("ffmpeg killed after {0}s")]
    TimedOut(u64),

    #[error("Unreadable ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error("Unusable video: {0}")]
    Unusable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Build an ffmpeg failure, using the last stderr line as the message.
    pub(crate) fn ffmpeg(stderr: String, exit_code: Option<i32>) -> Self {
        let message = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or("no diagnostic output")
            .to_string();
        Self::Ffmpeg {
            message,
            stderr,
            exit_code,
        }
    }
}
