// clipserver (video upload, subtitle preparation, and clip search service)

use crate::error::ClipError;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VideoRecord {
    pub id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub upload_time: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub likes: i64,
    pub duration: String,
    pub subtitle_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => ProcessingStatus::Processing,
            "success" => ProcessingStatus::Success,
            _ => ProcessingStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparationRecord {
    pub video_id: String,
    pub video_path: String,
    pub subtitle_source: String,
    pub subtitle_path: Option<String>,
    pub subtitle_language: String,
    pub processing_status: ProcessingStatus,
    pub error_message: Option<String>,
    pub asr_model: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct LatestVideo {
    pub title: String,
    pub upload_time: String,
}

#[derive(Debug, Serialize)]
pub struct DbStats {
    pub total_videos: i64,
    pub total_size_bytes: i64,
    pub total_size_mb: f64,
    pub latest_video: Option<LatestVideo>,
}

pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

const VIDEO_COLUMNS: &str = "id, original_filename, stored_filename, file_path, file_size, \
     content_type, upload_time, title, description, tags, likes, duration, subtitle_ready";

const PREPARATION_COLUMNS: &str = "video_id, video_path, subtitle_source, subtitle_path, \
     subtitle_language, processing_status, error_message, asr_model, created_at, updated_at";

// Every operation opens its own connection: open, execute, close. No
// cross-request transaction ever spans connections.
pub fn get_connection(db_path: &Path) -> Result<Connection, ClipError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS video_metadata (
            id TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            stored_filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            content_type TEXT,
            upload_time TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT DEFAULT '',
            tags TEXT DEFAULT '',
            likes INTEGER DEFAULT 0,
            duration TEXT DEFAULT 'unknown',
            subtitle_ready BOOLEAN DEFAULT FALSE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subtitle_processing (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL,
            video_path TEXT NOT NULL,
            subtitle_source TEXT NOT NULL,
            subtitle_path TEXT,
            subtitle_language TEXT,
            processing_status TEXT NOT NULL,
            error_message TEXT,
            asr_model TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (video_id) REFERENCES video_metadata (id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subtitle_video_id ON subtitle_processing(video_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subtitle_status ON subtitle_processing(processing_status)",
        [],
    )?;

    Ok(())
}

fn video_from_row(row: &Row) -> rusqlite::Result<VideoRecord> {
    let tags: String = row.get(9)?;
    Ok(VideoRecord {
        id: row.get(0)?,
        original_filename: row.get(1)?,
        stored_filename: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        content_type: row.get(5)?,
        upload_time: row.get(6)?,
        title: row.get(7)?,
        description: row.get(8)?,
        tags: if tags.is_empty() {
            Vec::new()
        } else {
            tags.split(',').map(|s| s.to_string()).collect()
        },
        likes: row.get(10)?,
        duration: row.get(11)?,
        subtitle_ready: row.get(12)?,
    })
}

fn preparation_from_row(row: &Row) -> rusqlite::Result<PreparationRecord> {
    let status: String = row.get(5)?;
    Ok(PreparationRecord {
        video_id: row.get(0)?,
        video_path: row.get(1)?,
        subtitle_source: row.get(2)?,
        subtitle_path: row.get(3)?,
        subtitle_language: row
            .get::<_, Option<String>>(4)?
            .unwrap_or_else(|| "unknown".to_string()),
        processing_status: ProcessingStatus::from_str(&status),
        error_message: row.get(6)?,
        asr_model: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn insert_video(db_path: &Path, video: &VideoRecord) -> Result<(), ClipError> {
    let conn = get_connection(db_path)?;
    conn.execute(
        "INSERT INTO video_metadata (id, original_filename, stored_filename, file_path, \
         file_size, content_type, upload_time, title, description, tags, likes, duration, \
         subtitle_ready) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        (
            &video.id,
            &video.original_filename,
            &video.stored_filename,
            &video.file_path,
            video.file_size,
            &video.content_type,
            &video.upload_time,
            &video.title,
            &video.description,
            video.tags.join(","),
            video.likes,
            &video.duration,
            video.subtitle_ready,
        ),
    )?;
    Ok(())
}

pub fn list_videos(db_path: &Path) -> Result<Vec<VideoRecord>, ClipError> {
    let conn = get_connection(db_path)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM video_metadata ORDER BY upload_time DESC",
        VIDEO_COLUMNS
    ))?;
    let rows = stmt.query_map([], video_from_row)?;

    let mut videos = Vec::new();
    for video in rows {
        videos.push(video?);
    }
    Ok(videos)
}

pub fn get_video(db_path: &Path, video_id: &str) -> Result<Option<VideoRecord>, ClipError> {
    let conn = get_connection(db_path)?;
    let video = conn
        .query_row(
            &format!("SELECT {} FROM video_metadata WHERE id = ?1", VIDEO_COLUMNS),
            [video_id],
            video_from_row,
        )
        .optional()?;
    Ok(video)
}

pub fn delete_video(db_path: &Path, video_id: &str) -> Result<bool, ClipError> {
    let conn = get_connection(db_path)?;
    let deleted = conn.execute("DELETE FROM video_metadata WHERE id = ?1", [video_id])?;
    Ok(deleted > 0)
}

/// Case-insensitive substring search over title, description, original
/// filename, and the comma-joined tag string.
pub fn search_videos(db_path: &Path, term: &str) -> Result<Vec<VideoRecord>, ClipError> {
    let conn = get_connection(db_path)?;
    let pattern = format!("%{}%", term.to_lowercase());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM video_metadata \
         WHERE LOWER(title) LIKE ?1 \
            OR LOWER(description) LIKE ?1 \
            OR LOWER(original_filename) LIKE ?1 \
            OR LOWER(tags) LIKE ?1 \
         ORDER BY upload_time DESC",
        VIDEO_COLUMNS
    ))?;
    let rows = stmt.query_map([&pattern], video_from_row)?;

    let mut videos = Vec::new();
    for video in rows {
        videos.push(video?);
    }
    Ok(videos)
}

pub fn set_duration(db_path: &Path, video_id: &str, duration: &str) -> Result<(), ClipError> {
    let conn = get_connection(db_path)?;
    conn.execute(
        "UPDATE video_metadata SET duration = ?1 WHERE id = ?2",
        (duration, video_id),
    )?;
    Ok(())
}

/// Replaces the video's preparation record and mirrors `subtitle_ready`
/// on the video row, in one transaction. At most one record per video.
pub fn save_preparation(db_path: &Path, record: &PreparationRecord) -> Result<(), ClipError> {
    let conn = get_connection(db_path)?;
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "DELETE FROM subtitle_processing WHERE video_id = ?1",
        [&record.video_id],
    )?;
    tx.execute(
        "INSERT INTO subtitle_processing (video_id, video_path, subtitle_source, subtitle_path, \
         subtitle_language, processing_status, error_message, asr_model, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        (
            &record.video_id,
            &record.video_path,
            &record.subtitle_source,
            &record.subtitle_path,
            &record.subtitle_language,
            record.processing_status.as_str(),
            &record.error_message,
            &record.asr_model,
            &record.created_at,
            &record.updated_at,
        ),
    )?;
    tx.execute(
        "UPDATE video_metadata SET subtitle_ready = ?1 WHERE id = ?2",
        (
            record.processing_status == ProcessingStatus::Success,
            &record.video_id,
        ),
    )?;

    tx.commit()?;
    Ok(())
}

pub fn latest_preparation(
    db_path: &Path,
    video_id: &str,
) -> Result<Option<PreparationRecord>, ClipError> {
    let conn = get_connection(db_path)?;
    let record = conn
        .query_row(
            &format!(
                "SELECT {} FROM subtitle_processing WHERE video_id = ?1 \
                 ORDER BY created_at DESC LIMIT 1",
                PREPARATION_COLUMNS
            ),
            [video_id],
            preparation_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Preparations a previous process abandoned mid-flight.
pub fn incomplete_preparations(db_path: &Path) -> Result<Vec<(String, String)>, ClipError> {
    let conn = get_connection(db_path)?;
    let mut stmt = conn.prepare(
        "SELECT video_id, video_path FROM subtitle_processing \
         WHERE processing_status = 'processing'",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut pending = Vec::new();
    for row in rows {
        pending.push(row?);
    }
    Ok(pending)
}

pub fn stats(db_path: &Path) -> Result<DbStats, ClipError> {
    let conn = get_connection(db_path)?;

    let total_videos: i64 =
        conn.query_row("SELECT COUNT(*) FROM video_metadata", [], |row| row.get(0))?;
    let total_size_bytes: i64 = conn.query_row(
        "SELECT COALESCE(SUM(file_size), 0) FROM video_metadata",
        [],
        |row| row.get(0),
    )?;
    let latest_video = conn
        .query_row(
            "SELECT title, upload_time FROM video_metadata ORDER BY upload_time DESC LIMIT 1",
            [],
            |row| {
                Ok(LatestVideo {
                    title: row.get(0)?,
                    upload_time: row.get(1)?,
                })
            },
        )
        .optional()?;

    Ok(DbStats {
        total_videos,
        total_size_bytes,
        total_size_mb: (total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        latest_video,
    })
}
