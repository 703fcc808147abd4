//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore della pipeline di derivati.
//!
//! ## Responsabilità:
//! - `PipelineError` per tutto ciò che può interrompere o segnare una run
//! - `CodecError` per i fallimenti riportati da un `CodecAdapter`
//! - Messaggi che indicano sempre il path e, per le conversioni, il formato
//!
//! ## Categorie di errori:
//! - `Config`: configurazione mancante o non valida, prima di ogni traversal
//! - `Io`: directory non leggibile o directory di output non creabile
//! - `Conversion`: il codec non è riuscito a produrre un target di un file
//! - `UnsupportedSource`: nessun decoder per il formato della sorgente
//! - `OutputCollision`: due sorgenti nella stessa directory con lo stesso base name
//! - `Cancelled`: run fermata tramite `StopSignal`
//! - `Task`: un task worker è andato in panic o è stato abortito
//!
//! `CodecError` viene incapsulato in `PipelineError::Conversion` insieme al
//! path della sorgente e all'etichetta del formato.
//!
//! ## Esempio:
//! ```rust
//! use media_derivatives::PipelineError;
//!
//! let err = PipelineError::Config("QUALITY must be a number, got \"high\"".to_string());
//! assert!(err.to_string().starts_with("Configuration error"));
//! ```

use std::path::PathBuf;

/// Errors surfaced by the pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion failed for {} ({format}): {source}", path.display())]
    Conversion {
        path: PathBuf,
        format: String,
        #[source]
        source: CodecError,
    },

    #[error("No decoder for .{extension} sources: {}", path.display())]
    UnsupportedSource { path: PathBuf, extension: String },

    #[error(
        "Output collision in {}: {first} and {second} both map to {base}/",
        dir.display()
    )]
    OutputCollision {
        dir: PathBuf,
        base: String,
        first: String,
        second: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Wraps an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failures reported by a codec adapter
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("AVIF encoding error: {0}")]
    Avif(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    Unsupported(String),
}
