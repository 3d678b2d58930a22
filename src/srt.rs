// clipserver (video upload, subtitle preparation, and clip search service)

use crate::error::ClipError;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

/// One timed text entry: index, `HH:MM:SS,mmm` range, text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    pub index: usize,
    pub start: String,
    pub end: String,
    pub text: String,
}

pub fn parse_srt_file(path: &Path) -> Result<Vec<Cue>, ClipError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ClipError::Decode(format!("cannot read {}: {}", path.display(), e)))?;
    let content = decode_subtitle_bytes(&bytes, path);
    Ok(parse_srt(&content))
}

// Tries UTF-8, then GBK, then Latin-1. Latin-1 accepts any byte sequence,
// so the fallback chain cannot fail.
fn decode_subtitle_bytes(bytes: &[u8], path: &Path) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        tracing::debug!(path = %path.display(), encoding = "utf-8", "decoded subtitle file");
        return text.to_string();
    }

    let (decoded, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if !had_errors {
        tracing::debug!(path = %path.display(), encoding = "gbk", "decoded subtitle file");
        return decoded.into_owned();
    }

    tracing::debug!(path = %path.display(), encoding = "latin-1", "decoded subtitle file");
    encoding_rs::mem::decode_latin1(bytes).into_owned()
}

/// Parses SRT content into cues. Malformed blocks are skipped with a
/// warning, never fatal.
pub fn parse_srt(content: &str) -> Vec<Cue> {
    let cleaned = content.trim().replace('\r', "");
    let block_sep = Regex::new(r"\n\s*\n").unwrap();

    let mut cues = Vec::new();
    for block in block_sep.split(&cleaned) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let lines: Vec<&str> = block.split('\n').collect();
        if lines.len() < 3 {
            tracing::warn!(block = %truncate(block), "skipping malformed subtitle block");
            continue;
        }

        let Ok(index) = lines[0].trim().parse::<usize>() else {
            tracing::warn!(block = %truncate(block), "skipping block with invalid index");
            continue;
        };

        let Some((start, end)) = parse_time_line(lines[1]) else {
            tracing::warn!(block = %truncate(block), "skipping block with invalid time range");
            continue;
        };

        let text = lines[2..].join("\n");
        if text.trim().is_empty() {
            tracing::warn!(block = %truncate(block), "skipping block with empty text");
            continue;
        }

        cues.push(Cue {
            index,
            start,
            end,
            text,
        });
    }

    cues
}

fn truncate(block: &str) -> String {
    block.chars().take(50).collect()
}

fn parse_time_line(line: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = line.trim().split(" --> ").collect();
    if parts.len() != 2 {
        return None;
    }
    let start = parts[0].trim().to_string();
    let end = parts[1].trim().to_string();

    let (Ok(start_secs), Ok(end_secs)) = (cue_time_to_seconds(&start), cue_time_to_seconds(&end))
    else {
        return None;
    };
    if end_secs <= start_secs {
        return None;
    }

    Some((start, end))
}

/// `"00:01:30,500"` -> 90.5. The comma is the SRT decimal separator.
pub fn cue_time_to_seconds(stamp: &str) -> Result<f64, ClipError> {
    let normalized = stamp.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() != 3 {
        return Err(ClipError::Validation(format!(
            "invalid cue timestamp: {}",
            stamp
        )));
    }

    let hours: f64 = parts[0]
        .parse()
        .map_err(|_| ClipError::Validation(format!("invalid cue timestamp: {}", stamp)))?;
    let minutes: f64 = parts[1]
        .parse()
        .map_err(|_| ClipError::Validation(format!("invalid cue timestamp: {}", stamp)))?;
    let seconds: f64 = parts[2]
        .parse()
        .map_err(|_| ClipError::Validation(format!("invalid cue timestamp: {}", stamp)))?;

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Inverse of parsing: a parsed well-formed file re-emits byte-identically
/// modulo trailing-newline normalization.
pub fn format_cues(cues: &[Cue]) -> String {
    let blocks: Vec<String> = cues
        .iter()
        .map(|c| format!("{}\n{} --> {}\n{}", c.index, c.start, c.end, c.text))
        .collect();
    format!("{}\n", blocks.join("\n\n"))
}
