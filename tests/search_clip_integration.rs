use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Stands in for ffmpeg: writes a stub clip to its final argument.
const FFMPEG_STUB: &str = concat!(
    "#!/bin/sh\n",
    "out=\"\"\n",
    "for a in \"$@\"; do out=\"$a\"; done\n",
    "printf 'clip bytes' > \"$out\"\n",
);

fn write_stub(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }
    path
}

fn write_config(dir: &TempDir, ffmpeg_path: &Path) -> PathBuf {
    let config_content = format!(
        r#"
ffmpeg_path = "{}"
ffprobe_path = "ffprobe"
whisper_path = "whisper"
data_dir = "{}"
model_name = "base"
"#,
        ffmpeg_path.to_string_lossy(),
        dir.path().join("data").to_string_lossy()
    );
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn create_video_with_transcript(dir: &TempDir) -> PathBuf {
    let video_path = dir.path().join("demo.mp4");
    fs::write(&video_path, b"fake video content").unwrap();
    fs::write(
        dir.path().join("demo.srt"),
        "1\n00:00:10,000 --> 00:00:12,000\nHello world\n\n2\n00:01:00,000 --> 00:01:02,500\nwell hello there\n",
    )
    .unwrap();
    video_path
}

#[test]
fn test_search_clip_cuts_one_clip_per_match() {
    let temp_dir = TempDir::new().unwrap();
    let ffmpeg = write_stub(temp_dir.path(), "ffmpeg", FFMPEG_STUB);
    let config_path = write_config(&temp_dir, &ffmpeg);
    let video_path = create_video_with_transcript(&temp_dir);
    let clips_dir = temp_dir.path().join("clips");

    let mut cmd = Command::cargo_bin("clipserver").unwrap();
    cmd.env("CLIPSERVER_CONFIG_PATH", &config_path);
    cmd.args([
        "search-clip",
        video_path.to_str().unwrap(),
        "hello",
        "--output-dir",
        clips_dir.to_str().unwrap(),
    ]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(stdout.contains("\"total_matches\": 2"));
    assert!(stdout.contains("\"successful_clips\": 2"));
    assert!(stdout.contains("well **hello** there"));
    assert!(stdout.contains("**Hello** world"));

    // Padded boundaries: 10-1 -> 9, 12+1 -> 13; 60-1 -> 59, 62.5+1 -> 63.5.
    assert!(stdout.contains("\"start\": 9.0"));
    assert!(stdout.contains("\"end\": 13.0"));
    assert!(stdout.contains("\"start\": 59.0"));
    assert!(stdout.contains("\"end\": 63.5"));

    assert!(clips_dir.join("hello_clip_1.mp4").is_file());
    assert!(clips_dir.join("hello_clip_2.mp4").is_file());
}

#[test]
fn test_search_clip_zero_matches_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    let ffmpeg = write_stub(temp_dir.path(), "ffmpeg", FFMPEG_STUB);
    let config_path = write_config(&temp_dir, &ffmpeg);
    let video_path = create_video_with_transcript(&temp_dir);

    let mut cmd = Command::cargo_bin("clipserver").unwrap();
    cmd.env("CLIPSERVER_CONFIG_PATH", &config_path);
    cmd.args(["search-clip", video_path.to_str().unwrap(), "absent"]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\"total_matches\": 0"));
    assert!(stdout.contains("\"successful_clips\": 0"));
}

#[test]
fn test_search_clip_explicit_srt_path() {
    let temp_dir = TempDir::new().unwrap();
    let ffmpeg = write_stub(temp_dir.path(), "ffmpeg", FFMPEG_STUB);
    let config_path = write_config(&temp_dir, &ffmpeg);

    let video_path = temp_dir.path().join("demo.mp4");
    fs::write(&video_path, b"fake video content").unwrap();
    let srt_path = temp_dir.path().join("elsewhere.srt");
    fs::write(
        &srt_path,
        "1\n00:00:01,000 --> 00:00:02,000\nspoken keyword\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("clipserver").unwrap();
    cmd.env("CLIPSERVER_CONFIG_PATH", &config_path);
    cmd.args([
        "search-clip",
        video_path.to_str().unwrap(),
        "keyword",
        "--srt",
        srt_path.to_str().unwrap(),
    ]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\"total_matches\": 1"));
    assert!(stdout.contains("spoken **keyword**"));
}

#[test]
fn test_search_clip_without_transcript_fails() {
    let temp_dir = TempDir::new().unwrap();
    let ffmpeg = write_stub(temp_dir.path(), "ffmpeg", FFMPEG_STUB);
    let config_path = write_config(&temp_dir, &ffmpeg);

    let video_path = temp_dir.path().join("demo.mp4");
    fs::write(&video_path, b"fake video content").unwrap();

    let mut cmd = Command::cargo_bin("clipserver").unwrap();
    cmd.env("CLIPSERVER_CONFIG_PATH", &config_path);
    cmd.args(["search-clip", video_path.to_str().unwrap(), "hello"]);

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("no SRT transcript"));
}

#[test]
fn test_search_clip_case_sensitive_flag() {
    let temp_dir = TempDir::new().unwrap();
    let ffmpeg = write_stub(temp_dir.path(), "ffmpeg", FFMPEG_STUB);
    let config_path = write_config(&temp_dir, &ffmpeg);
    let video_path = create_video_with_transcript(&temp_dir);

    let mut cmd = Command::cargo_bin("clipserver").unwrap();
    cmd.env("CLIPSERVER_CONFIG_PATH", &config_path);
    cmd.args([
        "search-clip",
        video_path.to_str().unwrap(),
        "Hello",
        "--case-sensitive",
    ]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\"total_matches\": 1"));
}
