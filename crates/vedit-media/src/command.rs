//! FFmpeg invocation.
//!
//! Every edit is a single-input ffmpeg call: `input_args -i <input>
//! output_args <output>`. [`FfmpegCommand`] assembles that argument list
//! and [`FfmpegRunner`] executes it with a deadline.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Re-encode settings for edits that cannot stream-copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub video_codec: &'static str,
    pub preset: &'static str,
    pub crf: u8,
    pub audio_codec: &'static str,
}

impl Encoding {
    /// Frame-accurate cuts; audio re-encoded so it starts on the cut.
    pub const TRIM: Encoding = Encoding {
        video_codec: "libx264",
        preset: "veryfast",
        crf: 20,
        audio_codec: "aac",
    };

    /// Subtitle burn-in only touches the video stream.
    pub const BURN_IN: Encoding = Encoding {
        audio_codec: "copy",
        ..Encoding::TRIM
    };

    fn args(&self) -> [String; 8] {
        [
            "-c:v".into(),
            self.video_codec.into(),
            "-preset".into(),
            self.preset.into(),
            "-crf".into(),
            self.crf.to_string(),
            "-c:a".into(),
            self.audio_codec.into(),
        ]
    }
}

/// Argument list for one ffmpeg run.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Before `-i`
    input_args: Vec<String>,
    /// Between the input and the output path
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Treat the input as a concat demuxer list file.
    pub fn concat_list(self) -> Self {
        self.input_args(["-f", "concat", "-safe", "0"])
    }

    /// Read `length` seconds starting at `start`, seeking on the input.
    pub fn window(self, start: f64, length: f64) -> Self {
        self.input_args([
            "-ss".to_string(),
            format!("{:.3}", start),
            "-t".to_string(),
            format!("{:.3}", length),
        ])
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_args(["-vf".to_string(), filter.into()])
    }

    /// Copy every stream as is.
    pub fn stream_copy(self) -> Self {
        self.output_args(["-c", "copy"])
    }

    pub fn encode(self, encoding: Encoding) -> Self {
        self.output_args(encoding.args())
    }

    /// Put the moov atom first so players can start before the download ends.
    pub fn faststart(self) -> Self {
        self.output_args(["-movflags", "+faststart"])
    }

    /// Full argument vector, without the program name.
    pub fn build_args(&self) -> Vec<String> {
        ["-y", "-hide_banner", "-v", "error"]
            .into_iter()
            .map(String::from)
            .chain(self.input_args.iter().cloned())
            .chain(["-i".to_string(), self.input.to_string_lossy().into_owned()])
            .chain(self.output_args.iter().cloned())
            .chain(std::iter::once(self.output.to_string_lossy().into_owned()))
            .collect()
    }
}

/// Executes ffmpeg, optionally bounded by a timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    /// Run `cmd` to completion, killing the child when the timeout elapses.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let waited = child.wait_with_output();
        let output = match self.timeout {
            None => waited.await?,
            Some(limit) => tokio::time::timeout(limit, waited).await.map_err(|_| {
                warn!(output = %cmd.output.display(), "ffmpeg exceeded {:?}, killed", limit);
                MediaError::TimedOut(limit.as_secs())
            })??,
        };

        if output.status.success() {
            return Ok(());
        }

        Err(MediaError::ffmpeg(
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.code(),
        ))
    }
}

/// Locate ffmpeg on PATH.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolMissing("ffmpeg"))
}

/// Locate ffprobe on PATH.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::ToolMissing("ffprobe"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_command_layout() {
        let args = FfmpegCommand::new("input.mp4", "output.mp4")
            .window(10.0, 2.5)
            .encode(Encoding::TRIM)
            .build_args();

        assert_eq!(&args[..4], &["-y", "-hide_banner", "-v", "error"]);
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(&args[4..i], &["-ss", "10.000", "-t", "2.500"]);
        assert_eq!(args[i + 1], "input.mp4");
        assert!(args[i..].windows(2).any(|w| w == ["-crf", "20"]));
        assert_eq!(args.last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn test_burn_in_copies_audio() {
        assert_eq!(Encoding::BURN_IN.audio_codec, "copy");
        assert_eq!(Encoding::BURN_IN.video_codec, Encoding::TRIM.video_codec);
    }

    #[test]
    fn test_concat_args_precede_input() {
        let args = FfmpegCommand::new("list.txt", "out.mp4")
            .concat_list()
            .stream_copy()
            .build_args();

        let f = args.iter().position(|a| a == "-f").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        let c = args.iter().position(|a| a == "-c").unwrap();
        assert!(f < i);
        assert!(i < c);
        assert_eq!(args[i + 1], "list.txt");
    }
}
