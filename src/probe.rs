// clipserver (video upload, subtitle preparation, and clip search service)

use crate::config::ClipConfig;
use crate::error::ClipError;
use crate::tools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct SubtitleStream {
    pub index: i64,
    pub codec_name: String,
    pub language: String,
    pub title: String,
    pub disposition: HashMap<String, i64>,
    pub duration: String,
}

#[derive(Debug, Serialize)]
pub struct SubtitleProbe {
    pub has_subtitles: bool,
    pub subtitle_streams: Vec<SubtitleStream>,
    pub total_streams: usize,
    pub error: Option<String>,
}

impl SubtitleProbe {
    fn failed(err: &ClipError) -> Self {
        Self {
            has_subtitles: false,
            subtitle_streams: Vec::new(),
            total_streams: 0,
            error: Some(err.to_string()),
        }
    }
}

/// Inspects a video for subtitle tracks. Probe failures are reported in the
/// result rather than raised, so the acquirer can fall through to the next
/// subtitle source.
pub async fn subtitle_streams(cfg: &ClipConfig, video_path: &Path) -> SubtitleProbe {
    match run_probe(cfg, video_path).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(
                video = %video_path.display(),
                error = %e,
                "subtitle stream probe failed"
            );
            SubtitleProbe::failed(&e)
        }
    }
}

async fn run_probe(cfg: &ClipConfig, video_path: &Path) -> Result<SubtitleProbe, ClipError> {
    let path_str = video_path.to_string_lossy();
    let args: Vec<String> = vec![
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_streams",
        path_str.as_ref(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect();

    let output = tools::run_tool(&cfg.ffprobe_path, &args).await?;
    parse_stream_report(&output.stdout)
}

pub fn parse_stream_report(report: &str) -> Result<SubtitleProbe, ClipError> {
    #[derive(Deserialize)]
    struct Report {
        #[serde(default)]
        streams: Vec<RawStream>,
    }

    #[derive(Deserialize)]
    struct RawStream {
        index: i64,
        codec_type: Option<String>,
        codec_name: Option<String>,
        duration: Option<String>,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        disposition: HashMap<String, i64>,
    }

    let report: Report = serde_json::from_str(report)
        .map_err(|e| ClipError::MalformedOutput(format!("unparseable stream report: {}", e)))?;

    let total_streams = report.streams.len();
    let subtitle_streams: Vec<SubtitleStream> = report
        .streams
        .into_iter()
        .filter(|s| s.codec_type.as_deref() == Some("subtitle"))
        .map(|s| SubtitleStream {
            index: s.index,
            codec_name: s.codec_name.unwrap_or_default(),
            language: s
                .tags
                .get("language")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            title: s.tags.get("title").cloned().unwrap_or_default(),
            disposition: s.disposition,
            duration: s.duration.unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();

    Ok(SubtitleProbe {
        has_subtitles: !subtitle_streams.is_empty(),
        subtitle_streams,
        total_streams,
        error: None,
    })
}

/// Probes the container duration and formats it as HH:MM:SS for display.
pub async fn video_duration(cfg: &ClipConfig, video_path: &Path) -> Result<String, ClipError> {
    let path_str = video_path.to_string_lossy();
    let args: Vec<String> = vec![
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        path_str.as_ref(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect();

    let output = tools::run_tool(&cfg.ffprobe_path, &args).await?;
    let raw = output.stdout.trim();
    let seconds: f64 = raw
        .parse()
        .map_err(|_| ClipError::MalformedOutput(format!("unparseable duration: {}", raw)))?;

    let total_seconds = seconds.round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    Ok(format!("{:02}:{:02}:{:02}", hours, minutes, secs))
}
