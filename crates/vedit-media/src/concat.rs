//! Concatenation through the FFmpeg concat demuxer.
//!
//! Inputs are listed in a demuxer file next to the output and joined with
//! stream copy, so all inputs must share codec parameters. Trimmed clips
//! of one source satisfy that.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Concatenate `inputs` in order into `output`.
pub async fn concat_videos(
    runner: &FfmpegRunner,
    inputs: &[PathBuf],
    output: &Path,
) -> MediaResult<()> {
    if inputs.is_empty() {
        return Err(MediaError::EmptyConcat);
    }
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::MissingInput(input.clone()));
        }
    }

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let list_path = list_path_for(output);
    tokio::fs::write(&list_path, build_concat_list(inputs)).await?;

    debug!(
        inputs = inputs.len(),
        list = %list_path.display(),
        output = %output.display(),
        "Concatenating with concat demuxer"
    );

    let cmd = FfmpegCommand::new(&list_path, output)
        .concat_list()
        .stream_copy()
        .faststart();
    let result = runner.run(&cmd).await;

    if let Err(e) = tokio::fs::remove_file(&list_path).await {
        warn!("Failed to remove concat list {}: {}", list_path.display(), e);
    }

    result?;

    info!(inputs = inputs.len(), output = %output.display(), "Concat completed");
    Ok(())
}

fn list_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".concat.txt");
    output.with_file_name(name)
}

/// Demuxer list body, one `file '<path>'` line per input.
fn build_concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", escape_list_path(&p.to_string_lossy())))
        .collect()
}

/// Quote a path for the concat list. A single quote closes the string,
/// emits an escaped quote and reopens it.
fn escape_list_path(path: &str) -> String {
    path.replace('\'', r"'\''")
}
