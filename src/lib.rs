//! # Media Derivatives Library
//!
//! Libreria per generare derivati web-ready da un albero di immagini sorgente.
//!
//! ## Responsabilità:
//! - Esporre la pipeline (`Pipeline`) e i tipi di configurazione e report
//! - Fornire gli entry point `run()` e `run_from_env()`
//! - Raccogliere i moduli sotto un'unica API pubblica
//!
//! ```text
//! input/blog/photo.jpg  ──▶  output/blog/photo/index.jpg
//!                                         photo/index.avif
//!                                         photo/index.webp
//!                                         photo/index-sp.*   (solo sorgenti larghe)
//! ```
//!
//! ## Moduli:
//! - `config`: sorgenti di configurazione e validazione
//! - `error`: errori della run e dei codec
//! - `codec`: il trait `CodecAdapter`
//! - `image_processor`: codec in-process (image, ravif, webp)
//! - `file_manager`: estensioni, esclusione, conteggio, formattazione dimensioni
//! - `pipeline`: traversal, pianificazione, conversione e avvio della run
//! - `report`: risultati per file e report finale
//! - `progress`, `json_output`: progresso per l'utente
//!
//! ## Esempio:
//! ```no_run
//! # async fn demo() -> Result<(), media_derivatives::PipelineError> {
//! let report = media_derivatives::run("content/images", "public/images", 80, Some(768)).await?;
//! println!("{} images converted", report.files.len());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use codec::{CodecAdapter, EncodeFormat, ImageMetadata};
pub use config::{Config, RawConfig};
pub use error::{CodecError, PipelineError};
pub use image_processor::ImageProcessor;
pub use pipeline::{Pipeline, StopSignal};
pub use report::{FileResult, FormatOutput, RunReport};

use std::path::PathBuf;

/// Convert `input_dir` into `output_dir` with default settings
pub async fn run(
    input_dir: impl Into<PathBuf>,
    output_dir: impl Into<PathBuf>,
    quality: u8,
    sp_image_width: Option<u32>,
) -> Result<RunReport, PipelineError> {
    let config = Config::new(input_dir, output_dir, quality, sp_image_width)?;
    Pipeline::new(config)?.run().await
}

/// Run configured from `INPUT_DIR`, `OUTPUT_DIR`, `QUALITY` and `SP_IMAGE_WIDTH`
pub async fn run_from_env() -> Result<RunReport, PipelineError> {
    let config = Config::from_env()?;
    Pipeline::new(config)?.run().await
}
