// clipserver (video upload, subtitle preparation, and clip search service)

use crate::config::ClipConfig;
use crate::db::{self, PreparationRecord, ProcessingStatus};
use crate::error::ClipError;
use crate::probe;
use crate::subtitles::{self, AcquireOptions, SubtitleArtifact, SubtitleSource};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Keyed mutex table serializing preparation per video id. A second
/// concurrent call for the same video waits here, then observes the first
/// call's outcome through the cache check.
#[derive(Default)]
pub struct PrepareLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PrepareLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_video(&self, video_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(video_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub video_id: String,
    pub video_path: PathBuf,
    pub force_regenerate: bool,
    pub asr_model: Option<String>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareOutcome {
    pub video_id: String,
    pub subtitle_path: String,
    pub subtitle_source: SubtitleSource,
    pub subtitle_language: String,
    pub asr_model: Option<String>,
    pub from_cache: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Idempotent per-video entry point: guarantees one searchable transcript
/// per video and records the outcome in the subtitle_processing table.
pub async fn prepare(
    cfg: &ClipConfig,
    locks: &PrepareLocks,
    req: &PrepareRequest,
) -> Result<PrepareOutcome, ClipError> {
    let video_lock = locks.for_video(&req.video_id);
    let _guard = video_lock.lock().await;

    let db_path = cfg.db_path();

    if !req.video_path.is_file() {
        let message = format!("video file does not exist: {}", req.video_path.display());
        persist_record(
            &db_path,
            terminal_record(req, ProcessingStatus::Failed, None, Some(message)),
        );
        return Err(ClipError::FileMissing(req.video_path.clone()));
    }

    if !req.force_regenerate
        && let Some(existing) = db::latest_preparation(&db_path, &req.video_id)?
        && existing.processing_status == ProcessingStatus::Success
        && let Some(subtitle_path) = &existing.subtitle_path
        && Path::new(subtitle_path).is_file()
    {
        info!(
            video_id = %req.video_id,
            subtitle = %subtitle_path,
            "transcript already prepared, returning cached record"
        );
        return Ok(PrepareOutcome {
            video_id: req.video_id.clone(),
            subtitle_path: subtitle_path.clone(),
            subtitle_source: SubtitleSource::from_str(&existing.subtitle_source),
            subtitle_language: existing.subtitle_language.clone(),
            asr_model: existing.asr_model.clone(),
            from_cache: true,
        });
    }

    info!(video_id = %req.video_id, path = %req.video_path.display(), "preparing transcript");
    db::save_preparation(
        &db_path,
        &terminal_record(req, ProcessingStatus::Processing, None, None),
    )?;

    let opts = AcquireOptions {
        asr_model: req
            .asr_model
            .clone()
            .unwrap_or_else(|| cfg.model_name.clone()),
        preferred_language: req
            .preferred_language
            .clone()
            .or_else(|| cfg.preferred_language.clone()),
    };

    match subtitles::acquire(cfg, &req.video_path, &opts).await {
        Ok(artifact) if artifact.subtitle_path.is_file() => {
            db::save_preparation(&db_path, &success_record(req, &artifact))?;
            update_duration(cfg, &db_path, &req.video_id, &req.video_path).await;
            info!(
                video_id = %req.video_id,
                source = artifact.subtitle_source.as_str(),
                subtitle = %artifact.subtitle_path.display(),
                "transcript prepared"
            );
            Ok(PrepareOutcome {
                video_id: req.video_id.clone(),
                subtitle_path: artifact.subtitle_path.to_string_lossy().to_string(),
                subtitle_source: artifact.subtitle_source,
                subtitle_language: artifact.subtitle_language,
                asr_model: artifact.asr_model,
                from_cache: false,
            })
        }
        Ok(artifact) => {
            let message = format!(
                "subtitle artifact vanished before it could be recorded: {}",
                artifact.subtitle_path.display()
            );
            persist_record(
                &db_path,
                terminal_record(req, ProcessingStatus::Failed, None, Some(message.clone())),
            );
            Err(ClipError::Persistence(message))
        }
        Err(e) => {
            warn!(video_id = %req.video_id, error = %e, "transcript preparation failed");
            persist_record(
                &db_path,
                terminal_record(req, ProcessingStatus::Failed, None, Some(e.to_string())),
            );
            Err(e)
        }
    }
}

fn terminal_record(
    req: &PrepareRequest,
    status: ProcessingStatus,
    subtitle_path: Option<String>,
    error_message: Option<String>,
) -> PreparationRecord {
    let now = db::now_stamp();
    PreparationRecord {
        video_id: req.video_id.clone(),
        video_path: req.video_path.to_string_lossy().to_string(),
        subtitle_source: SubtitleSource::Unknown.as_str().to_string(),
        subtitle_path,
        subtitle_language: "unknown".to_string(),
        processing_status: status,
        error_message,
        asr_model: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn success_record(req: &PrepareRequest, artifact: &SubtitleArtifact) -> PreparationRecord {
    let now = db::now_stamp();
    PreparationRecord {
        video_id: req.video_id.clone(),
        video_path: req.video_path.to_string_lossy().to_string(),
        subtitle_source: artifact.subtitle_source.as_str().to_string(),
        subtitle_path: Some(artifact.subtitle_path.to_string_lossy().to_string()),
        subtitle_language: artifact.subtitle_language.clone(),
        processing_status: ProcessingStatus::Success,
        error_message: None,
        asr_model: artifact.asr_model.clone(),
        created_at: now.clone(),
        updated_at: now,
    }
}

// Failure records must not mask the error that produced them.
fn persist_record(db_path: &Path, record: PreparationRecord) {
    if let Err(e) = db::save_preparation(db_path, &record) {
        error!(video_id = %record.video_id, error = %e, "failed to persist preparation record");
    }
}

// The row keeps "unknown" when the probe cannot determine a duration.
async fn update_duration(cfg: &ClipConfig, db_path: &Path, video_id: &str, video_path: &Path) {
    match probe::video_duration(cfg, video_path).await {
        Ok(duration) => {
            if let Err(e) = db::set_duration(db_path, video_id, &duration) {
                warn!(video_id, error = %e, "failed to store video duration");
            }
        }
        Err(e) => warn!(video_id, error = %e, "could not determine video duration"),
    }
}

/// Re-dispatches preparations a previous process left in `processing`.
pub async fn redrive_incomplete(cfg: &ClipConfig, locks: Arc<PrepareLocks>) {
    let pending = match db::incomplete_preparations(&cfg.db_path()) {
        Ok(pending) => pending,
        Err(e) => {
            warn!(error = %e, "could not scan for abandoned preparations");
            return;
        }
    };

    for (video_id, video_path) in pending {
        info!(video_id = %video_id, "re-driving preparation abandoned by a previous run");
        let req = PrepareRequest {
            video_id,
            video_path: PathBuf::from(video_path),
            force_regenerate: false,
            asr_model: None,
            preferred_language: None,
        };
        let cfg = cfg.clone();
        let locks = locks.clone();
        tokio::spawn(async move {
            if let Err(e) = prepare(&cfg, &locks, &req).await {
                warn!(video_id = %req.video_id, error = %e, "re-driven preparation failed");
            }
        });
    }
}

/// Batch preparation over every stored video.
pub async fn prepare_all(
    cfg: &ClipConfig,
    locks: &PrepareLocks,
    force_regenerate: bool,
    asr_model: Option<String>,
) -> Result<BatchReport, ClipError> {
    let videos = db::list_videos(&cfg.db_path())?;
    let mut report = BatchReport {
        total: videos.len(),
        ..Default::default()
    };

    for video in videos {
        if !force_regenerate && video.subtitle_ready {
            report.skipped += 1;
            continue;
        }
        let req = PrepareRequest {
            video_id: video.id.clone(),
            video_path: PathBuf::from(&video.file_path),
            force_regenerate,
            asr_model: asr_model.clone(),
            preferred_language: None,
        };
        match prepare(cfg, locks, &req).await {
            Ok(outcome) if outcome.from_cache => report.skipped += 1,
            Ok(_) => report.successful += 1,
            Err(e) => {
                warn!(video_id = %video.id, error = %e, "batch preparation failed for video");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
