//! Single-input edits: trimming and subtitle burn-in.

use std::path::Path;
use tracing::info;
use vedit_models::TrimRange;

use crate::command::{Encoding, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Cut `range` out of `input` into `output`.
///
/// Re-encodes so the cut is frame accurate; stream copy can only cut on
/// keyframes.
pub async fn trim_video(
    runner: &FfmpegRunner,
    input: &Path,
    output: &Path,
    range: TrimRange,
) -> MediaResult<()> {
    if !input.exists() {
        return Err(MediaError::MissingInput(input.to_path_buf()));
    }

    let cmd = FfmpegCommand::new(input, output)
        .window(range.start, range.duration())
        .encode(Encoding::TRIM)
        .output_args(["-avoid_negative_ts", "make_zero"])
        .faststart();

    runner.run(&cmd).await?;

    info!(
        input = %input.display(),
        start = range.start,
        end = range.end,
        "Trim completed"
    );
    Ok(())
}

/// Burn the cues in `srt` into the video frames.
pub async fn burn_subtitles(
    runner: &FfmpegRunner,
    input: &Path,
    srt: &Path,
    output: &Path,
) -> MediaResult<()> {
    for path in [input, srt] {
        if !path.exists() {
            return Err(MediaError::MissingInput(path.to_path_buf()));
        }
    }

    let filter = format!("subtitles='{}'", escape_filter_path(&srt.to_string_lossy()));
    let cmd = FfmpegCommand::new(input, output)
        .video_filter(filter)
        .encode(Encoding::BURN_IN)
        .faststart();

    runner.run(&cmd).await?;

    info!(input = %input.display(), "Subtitle burn-in completed");
    Ok(())
}

/// Escape a path for use inside a quoted filtergraph argument.
fn escape_filter_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' | ':' => {
                out.push('\\');
                out.push(c);
            }
            '\'' => out.push_str(r"'\''"),
            _ => out.push(c),
        }
    }
    out
}
