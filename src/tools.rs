// clipserver (video upload, subtitle preparation, and clip search service)

use crate::error::ClipError;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external media tool with a discrete argument vector. Arguments
/// are never passed through a shell, so filenames cannot inject options.
pub async fn run_tool(tool: &str, args: &[String]) -> Result<ToolOutput, ClipError> {
    tracing::debug!(tool, ?args, "invoking external tool");

    let output = Command::new(tool).args(args).output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ClipError::tool_missing(tool)
        } else {
            ClipError::Persistence(format!("failed to spawn {}: {}", tool, e))
        }
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ClipError::tool_failed(tool, output.status.code(), stderr));
    }

    Ok(ToolOutput {
        exit_code: output.status.code().unwrap_or(0),
        stdout,
        stderr,
    })
}

pub fn find_in_path(tool: &str) -> Option<PathBuf> {
    which::which(tool).ok()
}

/// One-shot availability probe (`<tool> -version` or `<tool> --help`).
pub async fn is_installed(tool: &str, probe_arg: &str) -> bool {
    if !Path::new(tool).exists() && find_in_path(tool).is_none() {
        return false;
    }
    match run_tool(tool, &[probe_arg.to_string()]).await {
        Ok(_) => true,
        Err(ClipError::ToolMissing { .. }) => false,
        // A non-zero exit still proves the binary exists.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let result = run_tool("definitely-not-a-real-tool-9f2c", &[]).await;
        match result {
            Err(ClipError::ToolMissing { tool }) => {
                assert_eq!(tool, "definitely-not-a-real-tool-9f2c");
            }
            other => panic!("expected ToolMissing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_tool_captures_output() {
        // `sh -c` here is the test driving a known shell, not the runner
        // interpolating anything.
        let args = vec!["-c".to_string(), "echo out; echo err >&2".to_string()];
        let output = run_tool("sh", &args).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_tool_nonzero_exit() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        match run_tool("sh", &args).await {
            Err(ClipError::ToolFailed {
                tool,
                exit_code,
                stderr,
            }) => {
                assert_eq!(tool, "sh");
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_is_installed_missing() {
        assert!(!is_installed("definitely-not-a-real-tool-9f2c", "-version").await);
    }
}
