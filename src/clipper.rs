// clipserver (video upload, subtitle preparation, and clip search service)

use crate::config::ClipConfig;
use crate::error::ClipError;
use crate::srt::{self, Cue};
use crate::tools;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub cue: Cue,
    pub keyword: String,
    pub output_path: Option<PathBuf>,
    pub padding_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClipResult {
    pub output_path: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub subtitle_text: String,
}

/// Replaces every character outside [A-Za-z0-9_\-.] with an underscore so
/// keywords are safe as filename components.
pub fn sanitize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// start is clamped at zero; the end is left unclamped, the cutting tool
// truncates at the end of the video.
fn padded_bounds(cue: &Cue, padding_seconds: f64) -> Result<(f64, f64), ClipError> {
    let start = (srt::cue_time_to_seconds(&cue.start)? - padding_seconds).max(0.0);
    let end = srt::cue_time_to_seconds(&cue.end)? + padding_seconds;
    Ok((start, end))
}

fn derive_output_path(video_path: &Path, keyword: &str) -> PathBuf {
    let dir = video_path.parent().unwrap_or_else(|| Path::new("."));
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!(
        "{}_clip_{}.mp4",
        sanitize_keyword(keyword),
        timestamp
    ))
}

fn clip_args(input: &Path, start: f64, end: f64, output: &Path) -> Vec<String> {
    vec![
        "-i",
        &input.to_string_lossy(),
        "-ss",
        &format!("{}", start),
        "-to",
        &format!("{}", end),
        "-c:v",
        "libx264",
        "-c:a",
        "copy",
        "-avoid_negative_ts",
        "make_zero",
        "-y",
        &output.to_string_lossy(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect()
}

/// Cuts a padded MP4 segment around a cue, re-encoding video and
/// stream-copying audio.
pub async fn cut(
    cfg: &ClipConfig,
    video_path: &Path,
    req: &ClipRequest,
) -> Result<ClipResult, ClipError> {
    if !video_path.is_file() {
        return Err(ClipError::FileMissing(video_path.to_path_buf()));
    }

    let (start, end) = padded_bounds(&req.cue, req.padding_seconds)?;
    let output = req
        .output_path
        .clone()
        .unwrap_or_else(|| derive_output_path(video_path, &req.keyword));

    let args = clip_args(video_path, start, end, &output);
    tools::run_tool(&cfg.ffmpeg_path, &args).await?;

    tracing::info!(output = %output.display(), start, end, "created clip");
    Ok(ClipResult {
        output_path: output.to_string_lossy().to_string(),
        start,
        end,
        duration: end - start,
        subtitle_text: req.cue.text.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: &str, end: &str) -> Cue {
        Cue {
            index: 1,
            start: start.to_string(),
            end: end.to_string(),
            text: "sample".to_string(),
        }
    }

    #[test]
    fn test_sanitize_keyword() {
        assert_eq!(sanitize_keyword("hello"), "hello");
        assert_eq!(sanitize_keyword("hello world!"), "hello_world_");
        assert_eq!(sanitize_keyword("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_keyword("v1.2_final-cut"), "v1.2_final-cut");
        assert_eq!(sanitize_keyword("你好"), "__");
    }

    #[test]
    fn test_padded_bounds() {
        let (start, end) = padded_bounds(&cue("00:00:10,000", "00:00:12,000"), 1.0).unwrap();
        assert_eq!(start, 9.0);
        assert_eq!(end, 13.0);
    }

    #[test]
    fn test_padded_bounds_clamps_start_at_zero() {
        let (start, end) = padded_bounds(&cue("00:00:00,500", "00:00:02,000"), 2.0).unwrap();
        assert_eq!(start, 0.0);
        assert_eq!(end, 4.0);
    }

    #[test]
    fn test_padded_bounds_invalid_stamp() {
        assert!(padded_bounds(&cue("nope", "00:00:02,000"), 1.0).is_err());
    }

    #[test]
    fn test_derive_output_path() {
        let path = derive_output_path(Path::new("/videos/demo.mp4"), "hello world");
        assert_eq!(path.parent().unwrap(), Path::new("/videos"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("hello_world_clip_"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_clip_args() {
        let args = clip_args(
            Path::new("/videos/demo.mp4"),
            9.0,
            13.5,
            Path::new("/videos/out.mp4"),
        );
        assert_eq!(
            args,
            vec![
                "-i",
                "/videos/demo.mp4",
                "-ss",
                "9",
                "-to",
                "13.5",
                "-c:v",
                "libx264",
                "-c:a",
                "copy",
                "-avoid_negative_ts",
                "make_zero",
                "-y",
                "/videos/out.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn test_cut_missing_video() {
        let cfg = ClipConfig::default();
        let req = ClipRequest {
            cue: cue("00:00:01,000", "00:00:02,000"),
            keyword: "x".to_string(),
            output_path: None,
            padding_seconds: 1.0,
        };
        match cut(&cfg, Path::new("/nonexistent/video.mp4"), &req).await {
            Err(ClipError::FileMissing(_)) => {}
            other => panic!("expected FileMissing, got {:?}", other),
        }
    }
}
