// clipserver (video upload, subtitle preparation, and clip search service)

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-process registry of background preparation jobs. Telemetry only;
/// durable state lives in the subtitle_processing table.
#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_id(video_id: &str) -> String {
        format!("prepare_{}", video_id)
    }

    pub fn start(&self, task_id: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(
            task_id.to_string(),
            JobStatus {
                status: JobState::Running,
                created_at: Some(now_stamp()),
                completed_at: None,
                result: None,
                error: None,
            },
        );
    }

    pub fn complete(&self, task_id: &str, result: Value) {
        self.finish(task_id, JobState::Completed, Some(result), None);
    }

    pub fn fail(&self, task_id: &str, error: String) {
        self.finish(task_id, JobState::Failed, None, Some(error));
    }

    // A job transitions out of Running exactly once; later calls are ignored.
    fn finish(&self, task_id: &str, state: JobState, result: Option<Value>, error: Option<String>) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = jobs.get_mut(task_id) {
            if entry.status != JobState::Running {
                return;
            }
            entry.status = state;
            entry.completed_at = Some(now_stamp());
            entry.result = result;
            entry.error = error;
        }
    }

    pub fn status(&self, task_id: &str) -> JobStatus {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(task_id).cloned().unwrap_or(JobStatus {
            status: JobState::NotFound,
            created_at: None,
            completed_at: None,
            result: None,
            error: None,
        })
    }
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}
