//! # Configuration Management Module
//!
//! Configurazione di una run di derivati.
//!
//! ## Responsabilità:
//! - Valori di default e validazione prima di qualsiasi traversal
//! - Caricamento e salvataggio su file JSON
//! - Lettura di `INPUT_DIR`, `OUTPUT_DIR`, `QUALITY`, `SP_IMAGE_WIDTH` (`RawConfig`)
//!
//! ## Parametri:
//! - `input_dir`: radice dell'albero sorgente
//! - `output_dir`: radice dei derivati (creata se manca)
//! - `quality`: qualità AVIF/WebP (1-100, default: 80)
//! - `sp_image_width`: soglia small-viewport (default: None = disabilitata)
//! - `workers`: conversioni concorrenti massime (default: 4)
//! - `excluded_dir_prefix`: directory con questo prefisso saltate (default: "_")
//! - `keep_going`: registra i fallimenti di conversione e continua (default: false)
//! - `avif_speed`: velocità encoder AVIF, 1 = lenta/migliore, 10 = veloce (default: 6)
//! - `json_output`: eventi NDJSON al posto della progress bar (default: false)
//!
//! ## Precedenza, dalla più bassa:
//! 1. `Config::default()`
//! 2. file JSON (`Config::from_file`)
//! 3. valori `RawConfig` da ambiente o command line, applicati con `Config::resolve`
//!
//! Un valore non valido è un `PipelineError::Config`, mai un fallimento per file.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_INPUT_DIR: &str = "INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";
pub const ENV_QUALITY: &str = "QUALITY";
pub const ENV_SP_IMAGE_WIDTH: &str = "SP_IMAGE_WIDTH";

/// Configuration for a derivative run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the source tree
    pub input_dir: PathBuf,
    /// Root of the output tree
    pub output_dir: PathBuf,
    /// Quality for the lossy re-encodes (1-100)
    pub quality: u8,
    /// Small-viewport width; sources wider than this get `index-sp.*` variants
    pub sp_image_width: Option<u32>,
    /// Number of files converted at the same time
    pub workers: usize,
    /// Directory name prefix excluded from traversal (empty = no exclusion)
    pub excluded_dir_prefix: String,
    /// Record conversion failures in the report instead of aborting
    pub keep_going: bool,
    /// AVIF encoder speed (1-10)
    pub avif_speed: u8,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            quality: 80,
            sp_image_width: None,
            workers: 4,
            excluded_dir_prefix: "_".to_string(),
            keep_going: false,
            avif_speed: 6,
            json_output: false,
        }
    }
}

/// Unparsed configuration values, as they come from the environment or the CLI
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub quality: Option<String>,
    pub sp_image_width: Option<String>,
}

impl RawConfig {
    /// Read `INPUT_DIR`, `OUTPUT_DIR`, `QUALITY` and `SP_IMAGE_WIDTH`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (used by `from_env`, handy in tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            input_dir: lookup(ENV_INPUT_DIR),
            output_dir: lookup(ENV_OUTPUT_DIR),
            quality: lookup(ENV_QUALITY),
            sp_image_width: lookup(ENV_SP_IMAGE_WIDTH),
        }
    }

    /// Fill the gaps in `self` with values from `fallback`
    pub fn or(self, fallback: RawConfig) -> Self {
        Self {
            input_dir: self.input_dir.or(fallback.input_dir),
            output_dir: self.output_dir.or(fallback.output_dir),
            quality: self.quality.or(fallback.quality),
            sp_image_width: self.sp_image_width.or(fallback.sp_image_width),
        }
    }
}

impl Config {
    /// Build a validated config from explicit values
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        quality: u8,
        sp_image_width: Option<u32>,
    ) -> Result<Self, PipelineError> {
        let config = Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            quality,
            sp_image_width: sp_image_width.filter(|width| *width > 0),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Environment-only configuration
    pub fn from_env() -> Result<Self, PipelineError> {
        let config = Self::resolve(RawConfig::from_env(), Self::default())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay raw string values on `base`, parsing and range-checking them
    pub fn resolve(raw: RawConfig, base: Config) -> Result<Self, PipelineError> {
        let mut config = base;

        if let Some(input) = non_empty(raw.input_dir) {
            config.input_dir = PathBuf::from(input);
        }
        if let Some(output) = non_empty(raw.output_dir) {
            config.output_dir = PathBuf::from(output);
        }
        if let Some(quality) = raw.quality {
            config.quality = parse_quality(&quality)?;
        }
        if let Some(width) = raw.sp_image_width {
            config.sp_image_width = parse_sp_width(&width)?;
        }

        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(config_error(format!("{} is not set", ENV_INPUT_DIR)));
        }
        if !self.input_dir.is_dir() {
            return Err(config_error(format!(
                "Input directory does not exist or is not a directory: {}",
                self.input_dir.display()
            )));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(config_error(format!("{} is not set", ENV_OUTPUT_DIR)));
        }
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(config_error(format!(
                "Output path is not a directory: {}",
                self.output_dir.display()
            )));
        }

        if self.quality == 0 || self.quality > 100 {
            return Err(config_error("Quality must be between 1 and 100"));
        }

        if self.workers == 0 {
            return Err(config_error("Number of workers must be greater than 0"));
        }

        if !(1..=10).contains(&self.avif_speed) {
            return Err(config_error("AVIF speed must be between 1 and 10"));
        }

        Ok(())
    }

    /// Whether small-viewport variants can be produced at all
    pub fn sp_enabled(&self) -> bool {
        matches!(self.sp_image_width, Some(width) if width > 0)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            config_error(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<(), PipelineError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| config_error(format!("Cannot serialize config: {}", e)))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| PipelineError::io(path, e))
    }
}

/// Parse a quality setting; must be an integer in 1..=100
pub fn parse_quality(value: &str) -> Result<u8, PipelineError> {
    let trimmed = value.trim();
    let quality: i64 = trimmed.parse().map_err(|_| {
        config_error(format!("{} must be a number, got {:?}", ENV_QUALITY, value))
    })?;

    if !(1..=100).contains(&quality) {
        return Err(config_error(format!(
            "{} must be between 1 and 100, got {}",
            ENV_QUALITY, quality
        )));
    }

    Ok(quality as u8)
}

/// Parse the small-viewport width; empty or zero disables the feature
pub fn parse_sp_width(value: &str) -> Result<Option<u32>, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let width: u32 = trimmed.parse().map_err(|_| {
        config_error(format!(
            "{} must be a positive integer, got {:?}",
            ENV_SP_IMAGE_WIDTH, value
        ))
    })?;

    Ok(Some(width).filter(|w| *w > 0))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn config_error(message: impl Into<String>) -> PipelineError {
    PipelineError::Config(message.into())
}
