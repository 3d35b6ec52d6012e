use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub terminal: TerminalConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Configuration for the draw surface and the frame clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_density: f32,
    /// Interval between display ticks driven by the frame loop.
    pub frame_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            pixel_density: 1.0,
            frame_interval_ms: 16,
        }
    }
}

/// Configuration specific to the terminal front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Pixel density used when mapping the logical scene onto terminal
    /// half-block cells. 0.25 means one cell column covers four logical
    /// pixels.
    pub cell_scale: f32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { cell_scale: 0.25 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "render": { "width": 800 } }"#).unwrap();

        assert_eq!(config.render.width, 800);
        assert_eq!(config.render.height, 720);
        assert_eq!(config.render.frame_interval_ms, 16);
        assert!((config.terminal.cell_scale - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_path_uses_defaults() {
        let config = AppConfig::load_or_default(None).unwrap();
        assert_eq!(config.render.width, 1280);
    }

    #[test]
    fn rejects_malformed_files() {
        let dir = std::env::temp_dir().join(format!(
            "spectrum-player-config-{}-malformed.json",
            std::process::id()
        ));
        std::fs::write(&dir, "{ not json").unwrap();

        let err = AppConfig::load(&dir).unwrap_err();
        assert!(matches!(err, crate::PlayerError::Config(_)));

        let _ = std::fs::remove_file(&dir);
    }
}
