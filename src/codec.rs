//! # Codec Adapter
//!
//! Confine tra il motore di traversal e il lavoro sui pixel. Il motore non
//! decodifica né codifica nulla: chiede a un `CodecAdapter` e gestisce solo
//! percorsi e dimensioni in byte.
//!
//! ## Responsabilità:
//! - Definire il trait `CodecAdapter` (lettura dimensioni, apertura, resize, encode)
//! - Dichiarare quali estensioni l'adapter sa decodificare (`decodes`)
//! - Descrivere i formati di uscita (`EncodeFormat`) e l'altezza scalata
//! - Fornire `MockCodec` per i test, che registra ogni chiamata
//!
//! Tutte le chiamate sono bloccanti; il motore le esegue nel blocking pool di
//! tokio. Un `Handle` decodificato è condiviso (dietro un `Arc`) tra tutti gli
//! encode dello stesso file.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Intrinsic dimensions of a source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
}

/// Codecs the pipeline can write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
    Bmp,
}

impl EncodeFormat {
    /// Codec for a lowercased file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }
}

/// Decode/resize/encode capability the engine delegates to
pub trait CodecAdapter: Send + Sync + 'static {
    /// A decoded image, shared across the encodes of one file
    type Handle: Send + Sync + 'static;

    /// Whether sources with this lowercased extension can be decoded at all
    fn decodes(&self, _extension: &str) -> bool {
        true
    }

    /// Read the intrinsic size without a full decode
    fn metadata(&self, source: &Path) -> Result<ImageMetadata, CodecError>;

    /// Decode the source
    fn open(&self, source: &Path) -> Result<Self::Handle, CodecError>;

    /// Derive a copy exactly `width` pixels wide, keeping the aspect ratio
    fn resize(&self, handle: &Self::Handle, width: u32) -> Result<Self::Handle, CodecError>;

    /// Encode `handle` as `format` into `dest`, returning the bytes written
    fn encode(
        &self,
        handle: &Self::Handle,
        format: EncodeFormat,
        quality: u8,
        dest: &Path,
    ) -> Result<u64, CodecError>;
}

/// Height matching `target_width` for an image of `width` x `height`
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let scaled = (height as f64 * target_width as f64 / width as f64).round() as u32;
    scaled.max(1)
}
