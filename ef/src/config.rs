//! ecgfeed configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::catalog::SourceSelection;
use crate::window::{ReadStrategy, WindowGeometry};

/// Project-local config file name
const LOCAL_CONFIG: &str = ".ecgfeed.yml";

/// Main ecgfeed configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener
    pub server: ServerConfig,

    /// Where samples come from
    pub source: SourceConfig,

    /// Window geometry and read strategy
    pub window: WindowConfig,

    /// Signal processing for `ef watch`
    pub analysis: AnalysisConfig,

    /// Polling client for `ef watch`
    pub client: ClientConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this before loading the catalog or binding the listener so a bad
    /// geometry never reaches the cursor.
    pub fn validate(&self) -> Result<()> {
        self.window.geometry().validate()?;

        if normalized_extension(&self.source.extension).is_empty() {
            return Err(eyre::eyre!("source.extension must not be empty"));
        }

        if !(self.analysis.sample_rate > 0.0) {
            return Err(eyre::eyre!(
                "analysis.sample-rate must be positive, got {}",
                self.analysis.sample_rate
            ));
        }

        if self.analysis.low_cut >= self.analysis.high_cut {
            return Err(eyre::eyre!(
                "analysis.low-cut ({}) must be below analysis.high-cut ({})",
                self.analysis.low_cut,
                self.analysis.high_cut
            ));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.ecgfeed.yml`, then `<config_dir>/ecgfeed/ecgfeed.yml`,
    /// then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in implicit_locations() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load just the logging section
    ///
    /// Runs before the subscriber is installed, so it never logs and swallows
    /// every error; the full `load` reports them afterwards.
    pub fn load_logging(config_path: Option<&PathBuf>) -> LoggingConfig {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => implicit_locations(),
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| {
                let content = fs::read_to_string(p).ok()?;
                serde_yaml::from_str::<Config>(&content).ok()
            })
            .map(|c| c.logging)
            .unwrap_or_default()
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn implicit_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("ecgfeed").join("ecgfeed.yml"));
    }
    paths
}

/// Lowercase an extension filter and drop any leading dot
pub fn normalized_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: Option<String>,

    /// Write logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Source directory and field selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory scanned once at startup
    pub directory: PathBuf,

    /// File extension filter, matched case-insensitively
    pub extension: String,

    /// Zero-based column taken from each comma-delimited line
    #[serde(rename = "field-index")]
    pub field_index: usize,

    /// How the active source is picked from the catalog
    pub selection: SourceSelection,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./csv_files"),
            extension: "csv".to_string(),
            field_index: 0,
            selection: SourceSelection::default(),
        }
    }
}

/// Window geometry and read strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Lines per window beyond the first (S)
    pub size: u64,

    /// Lines the cursor advances per request (V)
    pub step: u64,

    /// Total addressable line count (M)
    pub modulus: u64,

    #[serde(rename = "read-strategy")]
    pub read_strategy: ReadStrategy,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: 1100,
            step: 60,
            modulus: 11_000,
            read_strategy: ReadStrategy::Scan,
        }
    }
}

impl WindowConfig {
    pub fn geometry(&self) -> WindowGeometry {
        WindowGeometry {
            size: self.size,
            step: self.step,
            modulus: self.modulus,
        }
    }
}

/// ECG analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sampling frequency in Hz
    #[serde(rename = "sample-rate")]
    pub sample_rate: f64,

    /// Lower pass-band edge in Hz
    #[serde(rename = "low-cut")]
    pub low_cut: f64,

    /// Upper pass-band edge in Hz
    #[serde(rename = "high-cut")]
    pub high_cut: f64,

    /// Peak threshold as a fraction of the normalized maximum
    #[serde(rename = "threshold-ratio")]
    pub threshold_ratio: f64,

    /// Minimum spacing between detected peaks, in seconds
    #[serde(rename = "min-peak-spacing")]
    pub min_peak_spacing: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 125.0,
            low_cut: 0.5,
            high_cut: 50.0,
            threshold_ratio: 0.6,
            min_peak_spacing: 0.2,
        }
    }
}

impl AnalysisConfig {
    /// Minimum peak spacing in samples
    pub fn min_peak_distance(&self) -> usize {
        let samples = (self.min_peak_spacing * self.sample_rate) as usize;
        debug!(samples, "min_peak_distance: computed");
        samples.max(1)
    }
}

/// Polling client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of a running feed server
    pub url: String,

    /// Delay between polls in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            interval_ms: 1000,
            timeout_ms: 2000,
        }
    }
}
