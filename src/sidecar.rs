// clipserver (video upload, subtitle preparation, and clip search service)

use std::path::{Path, PathBuf};

const SUBTITLE_EXTENSIONS: [&str; 5] = ["srt", "ass", "ssa", "vtt", "sub"];
const SIDECAR_LANGUAGES: [&str; 7] = ["zh", "en", "chi", "eng", "chs", "cht", "cn"];

/// Finds subtitle files stored next to a video with a matching stem:
/// `{stem}.{ext}` and `{stem}.{lang}.{ext}`. Ordering is deterministic:
/// by extension in declaration order, then the bare variant, then
/// languages in declaration order.
pub fn find_sidecar_subtitles(video_path: &Path) -> Vec<PathBuf> {
    let Some(stem) = video_path.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let dir = video_path.parent().unwrap_or_else(|| Path::new("."));

    let mut found = Vec::new();
    for ext in SUBTITLE_EXTENSIONS {
        let bare = dir.join(format!("{}.{}", stem, ext));
        if bare.is_file() {
            found.push(bare);
        }
        for lang in SIDECAR_LANGUAGES {
            let tagged = dir.join(format!("{}.{}.{}", stem, lang, ext));
            if tagged.is_file() {
                found.push(tagged);
            }
        }
    }
    found
}

/// Infers a subtitle language from substrings of the whole path. Known
/// limitation: a directory like /home/chinese-films/ taints every file
/// under it to zh.
pub fn infer_language_from_path(path: &Path) -> &'static str {
    let lowered = path.to_string_lossy().to_lowercase();
    if ["zh", "chi", "chinese", "cn"].iter().any(|l| lowered.contains(l)) {
        "zh"
    } else if ["en", "eng", "english"].iter().any(|l| lowered.contains(l)) {
        "en"
    } else {
        "unknown"
    }
}
