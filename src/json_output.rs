//! # JSON Output Module
//!
//! Eventi JSON newline-delimited su stdout per uso programmatico (`--json`).
//!
//! ## Responsabilità:
//! - Un oggetto per riga, etichettato dal campo `type`
//! - Serializzazione con `serde_json`
//!
//! ## Eventi:
//! - `start`: radici, numero di file attesi, impostazioni
//! - `file_complete`: un file convertito con le dimensioni dei derivati
//! - `file_failed`: un file fallito (sorgente non decodificabile o `keep_going`)
//! - `complete`: riepilogo finale
//! - `error`: la run è fallita

use crate::config::Config;
use crate::report::{FileResult, ReportSummary};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One NDJSON event
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        input_dir: PathBuf,
        output_dir: PathBuf,
        total_files: usize,
        config: JsonConfig,
    },
    FileComplete {
        current: usize,
        total: usize,
        result: FileResult,
    },
    FileFailed {
        current: usize,
        total: usize,
        path: String,
        error: String,
    },
    Complete {
        summary: ReportSummary,
        duration_seconds: f64,
    },
    Error {
        message: String,
    },
}

/// Settings echoed in the `start` event
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonConfig {
    pub quality: u8,
    pub sp_image_width: Option<u32>,
    pub workers: usize,
    pub keep_going: bool,
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            quality: config.quality,
            sp_image_width: config.sp_image_width,
            workers: config.workers,
            keep_going: config.keep_going,
        }
    }
}

impl JsonMessage {
    /// Print the event as one JSON line on stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(config: &Config, total_files: usize) -> Self {
        Self::Start {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            total_files,
            config: JsonConfig::from(config),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
