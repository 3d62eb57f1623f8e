//! SubRip (SRT) generation.

use std::fmt::Write;
use vedit_models::SubtitleCue;

/// Render cues as an SRT document with 1-based indices.
pub fn generate_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(cue.start_time),
            format_srt_timestamp(cue.end_time),
            cue.text.trim()
        );
    }
    out
}

/// Format seconds as `HH:MM:SS,mmm`.
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(1.5), "00:00:01,500");
        assert_eq!(format_srt_timestamp(3725.042), "01:02:05,042");
        assert_eq!(format_srt_timestamp(-2.0), "00:00:00,000");
    }

    #[test]
    fn test_generate_srt() {
        let cues = vec![
            SubtitleCue::new("Hello", 0.0, 1.25),
            SubtitleCue::new(" World ", 1.25, 3.0),
        ];
        assert_eq!(
            generate_srt(&cues),
            "1\n00:00:00,000 --> 00:00:01,250\nHello\n\n2\n00:00:01,250 --> 00:00:03,000\nWorld\n\n"
        );
    }

    #[test]
    fn test_generate_srt_empty() {
        assert_eq!(generate_srt(&[]), "");
    }
}
