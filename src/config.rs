// clipserver (video upload, subtitle preparation, and clip search service)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_whisper_path() -> String {
    "whisper".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_model_name() -> String {
    "base".to_string()
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClipConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    #[serde(default = "default_whisper_path")]
    pub whisper_path: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    pub preferred_language: Option<String>,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            whisper_path: default_whisper_path(),
            data_dir: default_data_dir(),
            model_name: default_model_name(),
            preferred_language: None,
            address: default_address(),
            port: default_port(),
        }
    }
}

impl ClipConfig {
    pub fn video_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("videos")
    }

    pub fn subtitles_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("subtitles")
    }

    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("video_metadata.db")
    }
}

pub fn load_config() -> Result<ClipConfig, confy::ConfyError> {
    if let Ok(config_path) = std::env::var("CLIPSERVER_CONFIG_PATH") {
        confy::load_path(&config_path)
    } else {
        confy::load("clipserver", "config")
    }
}

pub fn load_config_or_default() -> ClipConfig {
    load_config().unwrap_or_default()
}

pub fn store_config(config: &ClipConfig) -> Result<(), confy::ConfyError> {
    if let Ok(config_path) = std::env::var("CLIPSERVER_CONFIG_PATH") {
        confy::store_path(&config_path, config)
    } else {
        confy::store("clipserver", "config", config)
    }
}

pub fn set_config_field(cfg: &mut ClipConfig, field: &str, value: &str) -> Result<(), String> {
    match field {
        "ffmpeg_path" => cfg.ffmpeg_path = value.to_string(),
        "ffprobe_path" => cfg.ffprobe_path = value.to_string(),
        "whisper_path" => cfg.whisper_path = value.to_string(),
        "data_dir" => cfg.data_dir = value.to_string(),
        "model_name" => cfg.model_name = value.to_string(),
        "preferred_language" => {
            cfg.preferred_language = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        }
        "address" => cfg.address = value.to_string(),
        "port" => {
            cfg.port = value
                .parse::<u16>()
                .map_err(|_| format!("Invalid port number: {}", value))?;
        }
        _ => return Err(format!("Unknown field: {}", field)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let cfg = ClipConfig::default();
        assert_eq!(cfg.video_dir(), Path::new("data/videos"));
        assert_eq!(cfg.subtitles_dir(), Path::new("data/subtitles"));
        assert_eq!(cfg.db_path(), Path::new("data/video_metadata.db"));
    }

    #[test]
    fn test_set_config_field() {
        let mut cfg = ClipConfig::default();
        set_config_field(&mut cfg, "ffmpeg_path", "/opt/ffmpeg").unwrap();
        assert_eq!(cfg.ffmpeg_path, "/opt/ffmpeg");

        set_config_field(&mut cfg, "port", "9000").unwrap();
        assert_eq!(cfg.port, 9000);

        set_config_field(&mut cfg, "preferred_language", "en").unwrap();
        assert_eq!(cfg.preferred_language.as_deref(), Some("en"));
        set_config_field(&mut cfg, "preferred_language", "").unwrap();
        assert!(cfg.preferred_language.is_none());
    }

    #[test]
    fn test_set_config_field_rejects_unknown() {
        let mut cfg = ClipConfig::default();
        assert!(set_config_field(&mut cfg, "no_such_field", "x").is_err());
        assert!(set_config_field(&mut cfg, "port", "not-a-number").is_err());
    }
}
