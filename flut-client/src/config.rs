//! Configuration for the pixel-flooding client.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
///
/// CLI flags override anything set here; the file mostly exists so the
/// server address and favorite stream settings survive between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlutConfig {
    /// Server connection settings.
    pub network: NetworkConfig,
    /// Default stream parameters.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Pixel-flooding server host.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
}

/// Default stream parameters, overridable per run from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Resampling factor applied to every loaded image.
    pub scale: f32,
    /// Number of parallel sender tasks.
    pub workers: usize,
    /// Randomize pixel transmission order (dithering).
    pub dither: bool,
    /// Per-frame display duration in milliseconds (animations).
    pub duration_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for FlutConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1234,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            workers: 4,
            dither: false,
            duration_ms: 1000,
        }
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

impl FlutConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
