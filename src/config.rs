//! Application settings, read from TOML or JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::export::{FfmpegEncoder, VideoCodec};
use crate::navigation::ZoomAnchor;
use crate::render::RenderBackend;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "fractal_studio.toml";
pub const DEFAULT_LOG_FILTER: &str = "fractal_studio=info,wgpu=warn,eframe=warn";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config {} is neither JSON nor TOML", .0.display())]
    UnknownFormat(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub crf: u8,
    pub ffmpeg: PathBuf,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::default(),
            crf: 20,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl VideoSettings {
    pub fn encoder(&self) -> FfmpegEncoder {
        FfmpegEncoder {
            codec: self.codec,
            crf: self.crf,
            binary: self.ffmpeg.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub shader_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub video_dir: PathBuf,
    pub state_dir: PathBuf,
    pub position_log: PathBuf,
    pub render_backend: RenderBackend,
    /// Preview resolution relative to the widget size while interacting.
    pub preview_scale: f32,
    pub zoom_anchor: ZoomAnchor,
    /// Wheel units per egui scroll point; one notch is 120 units.
    pub wheel_units_per_point: f32,
    pub animation_speed: f64,
    pub tick_interval_ms: u64,
    pub video: VideoSettings,
    pub log_filter: String,
    pub initial_fractal: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            screenshot_dir: PathBuf::from("screenshots"),
            video_dir: PathBuf::from("videos"),
            state_dir: PathBuf::from("states"),
            position_log: PathBuf::from("positions.txt"),
            render_backend: RenderBackend::default(),
            preview_scale: 1.0,
            zoom_anchor: ZoomAnchor::default(),
            wheel_units_per_point: 2.4,
            animation_speed: 1.0,
            tick_interval_ms: 16,
            video: VideoSettings::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            initial_fractal: None,
        }
    }
}

impl AppConfig {
    /// Reads JSON or TOML by extension, trying both for anything else.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
            "json" => serde_json::from_str(&data)?,
            "toml" => toml::from_str(&data)?,
            _ => serde_json::from_str(&data)
                .or_else(|_| toml::from_str(&data))
                .map_err(|_| ConfigError::UnknownFormat(path.to_path_buf()))?,
        };
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// `explicit` if given, else the default file when present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.toml");
        fs::write(
            &path,
            "zoom_anchor = \"center\"\ntick_interval_ms = 8\n[video]\ncodec = \"vp9\"\n",
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.zoom_anchor, ZoomAnchor::Center);
        assert_eq!(config.tick_interval_ms, 8);
        assert_eq!(config.video.codec, VideoCodec::Vp9);
        assert_eq!(config.video.crf, 20);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn json_and_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("studio.json");
        fs::write(&json, r#"{ "initial_fractal": "Julia 2D", "preview_scale": 0.5 }"#).unwrap();
        let config = AppConfig::load(&json).unwrap();
        assert_eq!(config.initial_fractal.as_deref(), Some("Julia 2D"));
        assert_eq!(config.preview_scale, 0.5);

        let other = dir.path().join("studio.cfg");
        fs::write(&other, "animation_speed = 2.0\n").unwrap();
        assert_eq!(AppConfig::load(&other).unwrap().animation_speed, 2.0);

        fs::write(&other, "{{ nope").unwrap();
        assert!(matches!(
            AppConfig::load(&other),
            Err(ConfigError::UnknownFormat(_))
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(matches!(
            AppConfig::discover(Some(Path::new("/nonexistent/studio.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
