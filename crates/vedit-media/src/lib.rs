//! Video edits by shelling out to `ffmpeg` and `ffprobe`.
//!
//! Commands are assembled with [`FfmpegCommand`] and run by an
//! [`FfmpegRunner`], which enforces a timeout and keeps stderr for errors.

pub mod command;
pub mod concat;
pub mod edit;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod srt;

pub use command::{check_ffmpeg, check_ffprobe, Encoding, FfmpegCommand, FfmpegRunner};
pub use concat::concat_videos;
pub use edit::{burn_subtitles, trim_video};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{file_size, remove_if_exists};
pub use probe::{probe_video, VideoInfo};
pub use srt::{format_srt_timestamp, generate_srt};
