// clipserver (video upload, subtitle preparation, and clip search service)

use crate::config::{self, ClipConfig};
use crate::db;
use crate::error::ClipError;
use crate::jobs::{JobStatus, JobTracker};
use crate::prepare::{self, PrepareLocks, PrepareRequest};
use crate::search::{self, SearchClipOptions, SearchClipReport};
use rocket::data::{Limits, ToByteUnit};
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State, delete, get, post, routes};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub const ALLOWED_VIDEO_EXTENSIONS: [&str; 7] =
    ["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];

pub struct AppState {
    pub locks: Arc<PrepareLocks>,
    pub jobs: Arc<JobTracker>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = status::Custom<Json<ErrorBody>>;

fn status_for(err: &ClipError) -> Status {
    match err {
        ClipError::Validation(_) | ClipError::UnsupportedFormat(_) => Status::BadRequest,
        ClipError::NotFound(_) => Status::NotFound,
        _ => Status::InternalServerError,
    }
}

fn api_error(err: ClipError) -> ApiError {
    status::Custom(
        status_for(&err),
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

#[get("/")]
fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Video Clip API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[get("/api/health")]
fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

#[derive(rocket::FromForm)]
pub struct UploadForm<'r> {
    file: Option<TempFile<'r>>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub video_id: String,
    pub filename: String,
    pub file_size: u64,
    pub upload_time: String,
}

#[post("/upload", data = "<form>")]
async fn upload(
    form: Form<UploadForm<'_>>,
    state: &State<AppState>,
) -> Result<status::Created<Json<UploadResponse>>, ApiError> {
    let cfg = config::load_config_or_default();
    let mut form = form.into_inner();

    let Some(file) = form.file.as_mut() else {
        return Err(api_error(ClipError::Validation(
            "no file selected".to_string(),
        )));
    };

    let original_filename = file
        .raw_name()
        .map(|n| n.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| api_error(ClipError::Validation("no file selected".to_string())))?;

    let extension = Path::new(&original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| {
            api_error(ClipError::UnsupportedFormat(format!(
                "file has no extension: {}",
                original_filename
            )))
        })?;
    if !ALLOWED_VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(api_error(ClipError::UnsupportedFormat(format!(
            "unsupported video format: .{} (supported: {})",
            extension,
            ALLOWED_VIDEO_EXTENSIONS.join(", ")
        ))));
    }

    let video_id = Uuid::new_v4().to_string();
    let stored_filename = format!("{}.{}", video_id, extension);
    let video_dir = cfg.video_dir();
    let file_path = video_dir.join(&stored_filename);

    if let Err(e) = tokio::fs::create_dir_all(&video_dir).await {
        return Err(api_error(ClipError::Persistence(format!(
            "failed to create video directory: {}",
            e
        ))));
    }
    if let Err(e) = file.copy_to(&file_path).await {
        // Drop whatever partial bytes landed on disk.
        let _ = std::fs::remove_file(&file_path);
        return Err(api_error(ClipError::Persistence(format!(
            "failed to store upload: {}",
            e
        ))));
    }

    let file_size = file.len();
    let content_type = file.content_type().map(|c| c.to_string());
    let title = Path::new(&original_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| original_filename.clone());
    let upload_time = db::now_stamp();

    let video = db::VideoRecord {
        id: video_id.clone(),
        original_filename: original_filename.clone(),
        stored_filename,
        file_path: file_path.to_string_lossy().to_string(),
        file_size: file_size as i64,
        content_type,
        upload_time: upload_time.clone(),
        title,
        description: String::new(),
        tags: Vec::new(),
        likes: 0,
        duration: "unknown".to_string(),
        subtitle_ready: false,
    };
    if let Err(e) = db::insert_video(&cfg.db_path(), &video) {
        let _ = std::fs::remove_file(&file_path);
        return Err(api_error(e));
    }

    let task_id = spawn_prepare(
        cfg,
        state,
        PrepareRequest {
            video_id: video_id.clone(),
            video_path: file_path,
            force_regenerate: false,
            asr_model: None,
            preferred_language: None,
        },
    );
    info!(video_id = %video_id, task_id = %task_id, "upload accepted, preparation dispatched");

    Ok(status::Created::new(format!("/videos/{}", video_id)).body(Json(UploadResponse {
        message: "video uploaded".to_string(),
        video_id,
        filename: original_filename,
        file_size,
        upload_time,
    })))
}

// Exactly one background preparation task per accepted upload.
fn spawn_prepare(cfg: ClipConfig, state: &State<AppState>, req: PrepareRequest) -> String {
    let task_id = JobTracker::task_id(&req.video_id);
    state.jobs.start(&task_id);

    let jobs = state.jobs.clone();
    let locks = state.locks.clone();
    let id = task_id.clone();
    tokio::spawn(async move {
        match prepare::prepare(&cfg, &locks, &req).await {
            Ok(outcome) => {
                let value = serde_json::to_value(&outcome).unwrap_or_default();
                jobs.complete(&id, value);
            }
            Err(e) => {
                error!(task_id = %id, error = %e, "background preparation failed");
                jobs.fail(&id, e.to_string());
            }
        }
    });

    task_id
}

#[derive(Serialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub cover: String,
    pub likes: i64,
    pub duration: String,
    pub upload_time: String,
    pub file_size: i64,
    pub original_filename: String,
}

fn summarize(video: db::VideoRecord) -> VideoSummary {
    let cover = format!("/api/thumbnail/{}", video.id);
    VideoSummary {
        id: video.id,
        title: video.title,
        cover,
        likes: video.likes,
        duration: video.duration,
        upload_time: video.upload_time,
        file_size: video.file_size,
        original_filename: video.original_filename,
    }
}

#[get("/search?<q>")]
fn search_library(q: Option<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let q = q.unwrap_or_default();
    let term = q.trim().to_string();
    if term.is_empty() {
        return Err(api_error(ClipError::Validation(
            "search query must not be empty".to_string(),
        )));
    }

    let cfg = config::load_config_or_default();
    let results: Vec<VideoSummary> = db::search_videos(&cfg.db_path(), &term)
        .map_err(api_error)?
        .into_iter()
        .map(summarize)
        .collect();

    Ok(Json(serde_json::json!({
        "query": q,
        "total": results.len(),
        "results": results,
    })))
}

#[get("/videos")]
fn list_videos() -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = config::load_config_or_default();
    let videos: Vec<VideoSummary> = db::list_videos(&cfg.db_path())
        .map_err(api_error)?
        .into_iter()
        .map(summarize)
        .collect();

    Ok(Json(serde_json::json!({
        "total": videos.len(),
        "videos": videos,
    })))
}

#[get("/videos/<id>")]
fn video_details(id: &str) -> Result<Json<db::VideoRecord>, ApiError> {
    let cfg = config::load_config_or_default();
    let video = db::get_video(&cfg.db_path(), id)
        .map_err(api_error)?
        .ok_or_else(|| api_error(ClipError::NotFound(format!("video does not exist: {}", id))))?;
    Ok(Json(video))
}

#[delete("/videos/<id>")]
fn delete_video(id: &str) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = config::load_config_or_default();
    let db_path = cfg.db_path();
    let video = db::get_video(&db_path, id)
        .map_err(api_error)?
        .ok_or_else(|| api_error(ClipError::NotFound(format!("video does not exist: {}", id))))?;

    // Bytes first, then the row; a row-removal failure after the bytes are
    // gone is reported as a server error.
    let file_path = Path::new(&video.file_path);
    if file_path.exists()
        && let Err(e) = std::fs::remove_file(file_path)
    {
        return Err(api_error(ClipError::Persistence(format!(
            "failed to remove video file: {}",
            e
        ))));
    }

    if !db::delete_video(&db_path, id).map_err(api_error)? {
        return Err(api_error(ClipError::Persistence(format!(
            "failed to remove metadata row for {}",
            id
        ))));
    }

    info!(video_id = %id, "video deleted");
    Ok(Json(serde_json::json!({
        "message": format!("video {} deleted", id),
    })))
}

#[derive(Deserialize, Default)]
pub struct PrepareBody {
    #[serde(default)]
    pub force_regenerate: bool,
    pub asr_model: Option<String>,
    pub preferred_language: Option<String>,
}

#[post("/videos/<id>/prepare", data = "<body>")]
async fn dispatch_prepare(
    id: &str,
    body: Option<Json<PrepareBody>>,
    state: &State<AppState>,
) -> Result<status::Custom<Json<serde_json::Value>>, ApiError> {
    let cfg = config::load_config_or_default();
    let video = db::get_video(&cfg.db_path(), id)
        .map_err(api_error)?
        .ok_or_else(|| api_error(ClipError::NotFound(format!("video does not exist: {}", id))))?;

    let body = body.map(|b| b.into_inner()).unwrap_or_default();
    let task_id = spawn_prepare(
        cfg,
        state,
        PrepareRequest {
            video_id: video.id.clone(),
            video_path: PathBuf::from(&video.file_path),
            force_regenerate: body.force_regenerate,
            asr_model: body.asr_model,
            preferred_language: body.preferred_language,
        },
    );

    Ok(status::Custom(
        Status::Accepted,
        Json(serde_json::json!({
            "message": "subtitle preparation started",
            "video_id": video.id,
            "task_id": task_id,
        })),
    ))
}

#[get("/tasks/<task_id>")]
fn task_status(task_id: &str, state: &State<AppState>) -> Json<JobStatus> {
    Json(state.jobs.status(task_id))
}

#[derive(Deserialize)]
pub struct SearchClipBody {
    pub keyword: String,
    pub padding_seconds: Option<f64>,
    #[serde(default)]
    pub case_sensitive: bool,
    pub srt_path: Option<String>,
    pub output_dir: Option<String>,
}

#[post("/videos/<id>/clips", data = "<body>")]
async fn clip_matches(
    id: &str,
    body: Json<SearchClipBody>,
) -> Result<Json<SearchClipReport>, ApiError> {
    let cfg = config::load_config_or_default();
    let db_path = cfg.db_path();
    let video = db::get_video(&db_path, id)
        .map_err(api_error)?
        .ok_or_else(|| api_error(ClipError::NotFound(format!("video does not exist: {}", id))))?;

    // Prefer the prepared transcript when the caller supplies none.
    let srt_path = match &body.srt_path {
        Some(path) => Some(PathBuf::from(path)),
        None => db::latest_preparation(&db_path, id)
            .map_err(api_error)?
            .filter(|r| r.processing_status == db::ProcessingStatus::Success)
            .and_then(|r| r.subtitle_path.map(PathBuf::from)),
    };

    let opts = SearchClipOptions {
        srt_path,
        output_dir: body.output_dir.as_ref().map(PathBuf::from),
        padding_seconds: body.padding_seconds.unwrap_or(1.0),
        case_sensitive: body.case_sensitive,
    };
    let report = search::search_and_clip(&cfg, Path::new(&video.file_path), &body.keyword, &opts)
        .await
        .map_err(api_error)?;
    Ok(Json(report))
}

#[get("/db/stats")]
fn db_stats() -> Result<Json<db::DbStats>, ApiError> {
    let cfg = config::load_config_or_default();
    db::stats(&cfg.db_path()).map(Json).map_err(api_error)
}

fn build_rocket(figment: rocket::figment::Figment, state: AppState) -> Rocket<Build> {
    rocket::custom(figment).manage(state).mount(
        "/",
        routes![
            index,
            health,
            upload,
            search_library,
            list_videos,
            video_details,
            delete_video,
            dispatch_prepare,
            task_status,
            clip_matches,
            db_stats,
        ],
    )
}

pub async fn launch_server(cfg: &ClipConfig) -> Result<(), rocket::Error> {
    let limits = Limits::default()
        .limit("file", 8.gibibytes())
        .limit("data-form", 8.gibibytes());
    let figment = rocket::Config::figment()
        .merge(("address", cfg.address.clone()))
        .merge(("port", cfg.port))
        .merge(("limits", limits));

    let state = AppState {
        locks: Arc::new(PrepareLocks::new()),
        jobs: Arc::new(JobTracker::new()),
    };
    prepare::redrive_incomplete(cfg, state.locks.clone()).await;

    build_rocket(figment, state).launch().await?;
    Ok(())
}
