//! Media metadata via ffprobe.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Only the entries [`VideoInfo`] is built from.
const SHOW_ENTRIES: &str = "format=duration,size:stream=codec_type,codec_name,width,height";

/// Facts about a container and its first video stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds; 0 when the container does not declare a duration.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    /// Bytes, as reported by the container.
    pub size: u64,
}

/// ffprobe reports numeric format fields as strings.
#[derive(Deserialize)]
struct Report {
    #[serde(rename = "format")]
    container: Container,
    #[serde(default)]
    streams: Vec<Stream>,
}

#[derive(Deserialize)]
struct Container {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Deserialize)]
struct Stream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::MissingInput(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-of", "json", "-show_entries", SHOW_ENTRIES])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::Probe {
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    VideoInfo::from_report(&output.stdout)
}

impl VideoInfo {
    fn from_report(json: &[u8]) -> MediaResult<Self> {
        let Report { container, streams } = serde_json::from_slice(json)?;

        let Some(video) = streams.into_iter().find(|s| s.codec_type == "video") else {
            return Err(MediaError::Unusable("no video stream".into()));
        };

        let duration = container
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0);

        Ok(Self {
            duration: duration.unwrap_or(0.0),
            width: video.width.unwrap_or_default(),
            height: video.height.unwrap_or_default(),
            codec: video.codec_name.unwrap_or_default(),
            size: container.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        })
    }
}
