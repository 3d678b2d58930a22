// clipserver (video upload, subtitle preparation, and clip search service)

use crate::clipper::{self, ClipRequest, ClipResult};
use crate::config::ClipConfig;
use crate::error::ClipError;
use crate::sidecar;
use crate::srt::{self, Cue};
use regex::RegexBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A cue whose text contains the keyword, with the occurrences wrapped in
/// `**…**` markers.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub index: usize,
    pub start: String,
    pub end: String,
    pub text: String,
    pub keyword: String,
    pub highlighted_text: String,
}

#[derive(Debug, Serialize)]
pub struct ClipOutcome {
    pub success: bool,
    #[serde(flatten)]
    pub result: Option<ClipResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClipEntry {
    pub match_index: usize,
    pub subtitle_index: usize,
    pub text: String,
    pub highlighted_text: String,
    pub start: String,
    pub end: String,
    pub clip_result: ClipOutcome,
}

#[derive(Debug, Serialize)]
pub struct SearchClipReport {
    pub keyword: String,
    pub subtitle_file: String,
    pub total_matches: usize,
    pub successful_clips: usize,
    pub message: String,
    pub clips: Vec<ClipEntry>,
}

#[derive(Debug, Clone)]
pub struct SearchClipOptions {
    pub srt_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub padding_seconds: f64,
    pub case_sensitive: bool,
}

impl Default for SearchClipOptions {
    fn default() -> Self {
        Self {
            srt_path: None,
            output_dir: None,
            padding_seconds: 1.0,
            case_sensitive: false,
        }
    }
}

pub fn search_cues(cues: &[Cue], keyword: &str, case_sensitive: bool) -> Vec<Match> {
    cues.iter()
        .filter(|cue| contains_keyword(&cue.text, keyword, case_sensitive))
        .map(|cue| Match {
            index: cue.index,
            start: cue.start.clone(),
            end: cue.end.clone(),
            text: cue.text.clone(),
            keyword: keyword.to_string(),
            highlighted_text: highlight(&cue.text, keyword, case_sensitive),
        })
        .collect()
}

fn contains_keyword(text: &str, keyword: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        text.contains(keyword)
    } else {
        text.to_lowercase().contains(&keyword.to_lowercase())
    }
}

// The keyword is escaped before it becomes a pattern, so regex
// metacharacters stay literal. Original casing in the text is preserved.
fn highlight(text: &str, keyword: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        return text.replace(keyword, &format!("**{}**", keyword));
    }
    match RegexBuilder::new(&regex::escape(keyword))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re
            .replace_all(text, |caps: &regex::Captures| format!("**{}**", &caps[0]))
            .into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Locates keyword matches in a transcript and cuts one padded clip per
/// match. A failed cut never aborts the rest of the batch; zero matches is
/// a successful, empty report.
pub async fn search_and_clip(
    cfg: &ClipConfig,
    video_path: &Path,
    keyword: &str,
    opts: &SearchClipOptions,
) -> Result<SearchClipReport, ClipError> {
    if keyword.trim().is_empty() {
        return Err(ClipError::Validation(
            "search keyword must not be empty".to_string(),
        ));
    }

    let srt_path = match &opts.srt_path {
        Some(path) => path.clone(),
        None => sidecar::find_sidecar_subtitles(video_path)
            .into_iter()
            .find(|p| p.extension().and_then(|e| e.to_str()) == Some("srt"))
            .ok_or_else(|| {
                ClipError::NoTranscript(format!(
                    "no SRT transcript found for {}",
                    video_path.display()
                ))
            })?,
    };

    let cues = srt::parse_srt_file(&srt_path)?;
    let matches = search_cues(&cues, keyword, opts.case_sensitive);

    if matches.is_empty() {
        info!(keyword, "keyword not found in transcript");
        return Ok(SearchClipReport {
            keyword: keyword.to_string(),
            subtitle_file: srt_path.to_string_lossy().to_string(),
            total_matches: 0,
            successful_clips: 0,
            message: format!("keyword not found in transcript: {}", keyword),
            clips: Vec::new(),
        });
    }

    if let Some(dir) = &opts.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut clips = Vec::new();
    let mut successful_clips = 0usize;
    for (i, m) in matches.iter().enumerate() {
        let output_path = opts.output_dir.as_ref().map(|dir| {
            dir.join(format!(
                "{}_clip_{}.mp4",
                clipper::sanitize_keyword(keyword),
                i + 1
            ))
        });
        let req = ClipRequest {
            cue: Cue {
                index: m.index,
                start: m.start.clone(),
                end: m.end.clone(),
                text: m.text.clone(),
            },
            keyword: keyword.to_string(),
            output_path,
            padding_seconds: opts.padding_seconds,
        };

        let clip_result = match clipper::cut(cfg, video_path, &req).await {
            Ok(result) => {
                successful_clips += 1;
                ClipOutcome {
                    success: true,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                warn!(subtitle_index = m.index, error = %e, "clip generation failed");
                ClipOutcome {
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };

        clips.push(ClipEntry {
            match_index: i + 1,
            subtitle_index: m.index,
            text: m.text.clone(),
            highlighted_text: m.highlighted_text.clone(),
            start: m.start.clone(),
            end: m.end.clone(),
            clip_result,
        });
    }

    Ok(SearchClipReport {
        keyword: keyword.to_string(),
        subtitle_file: srt_path.to_string_lossy().to_string(),
        total_matches: matches.len(),
        successful_clips,
        message: format!(
            "found {} matches, produced {} clips",
            matches.len(),
            successful_clips
        ),
        clips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(index: usize, start: &str, end: &str, text: &str) -> Cue {
        Cue {
            index,
            start: start.to_string(),
            end: end.to_string(),
            text: text.to_string(),
        }
    }

    fn sample_cues() -> Vec<Cue> {
        vec![
            cue(1, "00:00:10,000", "00:00:12,000", "Hello world"),
            cue(2, "00:01:00,000", "00:01:02,500", "well hello there"),
            cue(3, "00:02:00,000", "00:02:01,000", "nothing to see"),
        ]
    }

    #[test]
    fn test_search_case_insensitive_by_default() {
        let matches = search_cues(&sample_cues(), "hello", false);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].index, 1);
        assert_eq!(matches[0].highlighted_text, "**Hello** world");
        assert_eq!(matches[1].highlighted_text, "well **hello** there");
    }

    #[test]
    fn test_search_case_sensitive_opt_in() {
        let matches = search_cues(&sample_cues(), "Hello", true);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index, 1);
        assert_eq!(matches[0].highlighted_text, "**Hello** world");
    }

    #[test]
    fn test_highlight_preserves_original_casing() {
        assert_eq!(
            highlight("HELLO and hello and HeLLo", "hello", false),
            "**HELLO** and **hello** and **HeLLo**"
        );
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let cues = vec![cue(1, "00:00:01,000", "00:00:02,000", "price is $5.00 (sale)")];
        let matches = search_cues(&cues, "$5.00 (sale)", false);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].highlighted_text,
            "price is **$5.00 (sale)**"
        );

        // "a.b" must not match "axb" through the highlight pattern.
        let cues = vec![cue(1, "00:00:01,000", "00:00:02,000", "axb a.b")];
        let matches = search_cues(&cues, "a.b", false);
        assert_eq!(matches[0].highlighted_text, "axb **a.b**");
    }

    #[test]
    fn test_no_matches() {
        assert!(search_cues(&sample_cues(), "absent", false).is_empty());
    }

    #[tokio::test]
    async fn test_search_and_clip_rejects_blank_keyword() {
        let cfg = ClipConfig::default();
        let opts = SearchClipOptions::default();
        match search_and_clip(&cfg, Path::new("/tmp/v.mp4"), "   ", &opts).await {
            Err(ClipError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_and_clip_requires_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.mp4");
        std::fs::write(&video, "stub").unwrap();

        let cfg = ClipConfig::default();
        let opts = SearchClipOptions::default();
        match search_and_clip(&cfg, &video, "hello", &opts).await {
            Err(ClipError::NoTranscript(_)) => {}
            other => panic!("expected NoTranscript, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_and_clip_zero_matches_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.mp4");
        std::fs::write(&video, "stub").unwrap();
        std::fs::write(
            dir.path().join("v.srt"),
            "1\n00:00:01,000 --> 00:00:02,000\nnothing here\n",
        )
        .unwrap();

        let cfg = ClipConfig::default();
        let report = search_and_clip(&cfg, &video, "absent", &SearchClipOptions::default())
            .await
            .unwrap();
        assert_eq!(report.total_matches, 0);
        assert_eq!(report.successful_clips, 0);
        assert!(report.clips.is_empty());
    }

    #[tokio::test]
    async fn test_search_and_clip_survives_cutter_failure() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.mp4");
        std::fs::write(&video, "stub").unwrap();
        std::fs::write(
            dir.path().join("v.srt"),
            "1\n00:00:10,000 --> 00:00:12,000\nHello world\n\n2\n00:01:00,000 --> 00:01:02,500\nwell hello there\n",
        )
        .unwrap();

        // The cutting tool is missing, so every cut fails but the batch
        // still reports both matches.
        let cfg = ClipConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..ClipConfig::default()
        };
        let report = search_and_clip(&cfg, &video, "hello", &SearchClipOptions::default())
            .await
            .unwrap();

        assert_eq!(report.total_matches, 2);
        assert_eq!(report.successful_clips, 0);
        assert_eq!(report.clips.len(), 2);
        assert!(!report.clips[0].clip_result.success);
        assert!(report.clips[0]
            .clip_result
            .error
            .as_ref()
            .unwrap()
            .contains("not installed"));
        assert_eq!(report.clips[1].match_index, 2);
        assert_eq!(report.clips[1].highlighted_text, "well **hello** there");
    }
}
