//! Configuration for the session worker.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Screen capture settings.
    pub capture: CaptureConfig,
    /// Clipboard sync settings.
    pub clipboard: ClipboardConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target frames per second.
    pub fps: u8,
}

/// Clipboard sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Mirror clipboard contents with the peer. The peer's session
    /// options must also allow it.
    pub enabled: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            clipboard: ClipboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = HostConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("fps"));
        assert!(text.contains("enabled"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = HostConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.capture.fps, 30);
        assert!(parsed.clipboard.enabled);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: HostConfig = toml::from_str("[capture]\nfps = 15\n").unwrap();
        assert_eq!(parsed.capture.fps, 15);
        assert_eq!(parsed.logging.level, "info");
    }
}
