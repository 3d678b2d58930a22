// clipserver (video upload, subtitle preparation, and clip search service)

use crate::config::ClipConfig;
use crate::error::ClipError;
use crate::probe::{self, SubtitleStream};
use crate::sidecar;
use crate::tools;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleSource {
    Embedded,
    External,
    Asr,
    Unknown,
}

impl SubtitleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleSource::Embedded => "embedded",
            SubtitleSource::External => "external",
            SubtitleSource::Asr => "asr",
            SubtitleSource::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "embedded" => SubtitleSource::Embedded,
            "external" => SubtitleSource::External,
            "asr" => SubtitleSource::Asr,
            _ => SubtitleSource::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtitleArtifact {
    pub subtitle_path: PathBuf,
    pub subtitle_source: SubtitleSource,
    pub subtitle_language: String,
    pub asr_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub asr_model: String,
    pub preferred_language: Option<String>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            asr_model: "base".to_string(),
            preferred_language: None,
        }
    }
}

/// Produces exactly one subtitle artifact for a video by falling through
/// three sources: an embedded track, a sidecar file, and finally speech
/// recognition. The first stage that succeeds wins; only the last stage's
/// error is returned.
pub async fn acquire(
    cfg: &ClipConfig,
    video_path: &Path,
    opts: &AcquireOptions,
) -> Result<SubtitleArtifact, ClipError> {
    if let Some(artifact) =
        extract_embedded(cfg, video_path, opts.preferred_language.as_deref()).await
    {
        return Ok(artifact);
    }

    if let Some(artifact) = use_sidecar(video_path) {
        return Ok(artifact);
    }

    generate_with_asr(cfg, video_path, opts).await
}

async fn extract_embedded(
    cfg: &ClipConfig,
    video_path: &Path,
    preferred_language: Option<&str>,
) -> Option<SubtitleArtifact> {
    let report = probe::subtitle_streams(cfg, video_path).await;
    if report.error.is_some() || !report.has_subtitles {
        return None;
    }

    let stream = select_best_stream(&report.subtitle_streams, preferred_language)?;
    // Record the requested code when the stream was picked by language
    // preference, the raw stream tag otherwise.
    let language = match preferred_language {
        Some(pref)
            if stream
                .language
                .to_lowercase()
                .starts_with(&pref.to_lowercase()) =>
        {
            pref.to_string()
        }
        _ => stream.language.clone(),
    };
    let stem = video_path.file_stem()?.to_str()?;
    let output = video_path.with_file_name(format!("{}_embedded.srt", stem));

    let in_str = video_path.to_string_lossy();
    let out_str = output.to_string_lossy();
    let args: Vec<String> = vec![
        "-i",
        in_str.as_ref(),
        "-map",
        &format!("0:s:{}", stream.index),
        "-c:s",
        "srt",
        "-y",
        out_str.as_ref(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect();

    match tools::run_tool(&cfg.ffmpeg_path, &args).await {
        Ok(_) if output.is_file() => {
            info!(
                path = %output.display(),
                language = %language,
                "extracted embedded subtitle track"
            );
            Some(SubtitleArtifact {
                subtitle_path: output,
                subtitle_source: SubtitleSource::Embedded,
                subtitle_language: language,
                asr_model: None,
            })
        }
        Ok(_) => {
            warn!("subtitle extraction exited cleanly but produced no file");
            None
        }
        Err(e) => {
            warn!(error = %e, "embedded subtitle extraction failed, falling through");
            None
        }
    }
}

fn select_best_stream<'a>(
    streams: &'a [SubtitleStream],
    preferred_language: Option<&str>,
) -> Option<&'a SubtitleStream> {
    if let Some(preferred) = preferred_language {
        let preferred = preferred.to_lowercase();
        if let Some(stream) = streams
            .iter()
            .find(|s| s.language.to_lowercase().starts_with(&preferred))
        {
            return Some(stream);
        }
    }
    streams.first()
}

fn use_sidecar(video_path: &Path) -> Option<SubtitleArtifact> {
    let candidates = sidecar::find_sidecar_subtitles(video_path);
    if candidates.is_empty() {
        return None;
    }

    let chosen = candidates
        .iter()
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("srt"))
        .unwrap_or(&candidates[0])
        .clone();
    let language = sidecar::infer_language_from_path(&chosen).to_string();

    info!(path = %chosen.display(), "using sidecar subtitle file");
    Some(SubtitleArtifact {
        subtitle_path: chosen,
        subtitle_source: SubtitleSource::External,
        subtitle_language: language,
        asr_model: None,
    })
}

async fn generate_with_asr(
    cfg: &ClipConfig,
    video_path: &Path,
    opts: &AcquireOptions,
) -> Result<SubtitleArtifact, ClipError> {
    let output_dir = cfg.subtitles_dir();
    std::fs::create_dir_all(&output_dir)?;

    let in_str = video_path.to_string_lossy();
    let dir_str = output_dir.to_string_lossy();
    let mut args: Vec<String> = vec![
        in_str.as_ref(),
        "--output_format",
        "srt",
        "--output_dir",
        dir_str.as_ref(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(language) = &opts.preferred_language {
        args.push("--language".to_string());
        args.push(language.clone());
    }
    args.extend([
        "--model".to_string(),
        opts.asr_model.clone(),
        "--verbose".to_string(),
        "False".to_string(),
        "--fp16".to_string(),
        "False".to_string(),
    ]);

    let output = tools::run_tool(&cfg.whisper_path, &args).await?;

    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            ClipError::Validation(format!("video path has no stem: {}", video_path.display()))
        })?;
    let subtitle_path = output_dir.join(format!("{}.srt", stem));
    if !subtitle_path.is_file() {
        return Err(ClipError::MalformedOutput(
            "speech recognition exited cleanly but produced no subtitle file".to_string(),
        ));
    }

    let language = detect_language(&output.stderr)
        .or_else(|| opts.preferred_language.clone())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        path = %subtitle_path.display(),
        model = %opts.asr_model,
        language = %language,
        "generated subtitles with speech recognition"
    );
    Ok(SubtitleArtifact {
        subtitle_path,
        subtitle_source: SubtitleSource::Asr,
        subtitle_language: language,
        asr_model: Some(opts.asr_model.clone()),
    })
}

fn detect_language(stderr: &str) -> Option<String> {
    let re = Regex::new(r"Detected language:\s*(\w+)").unwrap();
    re.captures(stderr).map(|caps| caps[1].to_string())
}
