//! # File Management Module
//!
//! Classificazione dei file e piccole utilità di file system condivise da
//! walker, converter e report.
//!
//! ## Responsabilità:
//! - Riconoscimento delle immagini sorgente per estensione
//! - Regola di esclusione delle directory con prefisso riservato
//! - Pre-conteggio delle immagini per la progress bar
//! - Formattazione human-readable delle dimensioni e calcolo delle riduzioni
//!
//! ## Formati supportati (case-insensitive):
//! JPG, JPEG, PNG, WebP, AVIF, TIFF, BMP. Tutto il resto viene ignorato.
//!
//! ## Operazioni:
//! - `image_extension()`: estensione minuscola se il file è un'immagine
//! - `is_excluded_dir()`: controllo del prefisso riservato
//! - `count_images()`: conteggio immagini con `walkdir`
//! - `format_size()`: converte byte in KB, MB, GB
//! - `calculate_reduction()`: percentuale risparmiata rispetto alla baseline

use std::path::Path;
use walkdir::WalkDir;

/// Extensions the walker converts
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "tiff", "bmp"];

/// File classification and formatting helpers
pub struct FileManager;

impl FileManager {
    /// Lowercased extension of a recognized image, None otherwise
    pub fn image_extension(path: &Path) -> Option<String> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
    }

    /// Check if a file is a recognized image
    pub fn is_image(path: &Path) -> bool {
        Self::image_extension(path).is_some()
    }

    /// Whether a directory name carries the reserved exclusion prefix
    pub fn is_excluded_dir(name: &str, prefix: &str) -> bool {
        !prefix.is_empty() && name.starts_with(prefix)
    }

    /// Count the recognized images the walker will visit under `root`
    pub fn count_images(root: &Path, excluded_prefix: &str, skip_dir: Option<&Path>) -> usize {
        WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                if skip_dir.is_some_and(|skip| entry.path() == skip) {
                    return false;
                }
                let name = entry.file_name().to_string_lossy();
                !Self::is_excluded_dir(&name, excluded_prefix)
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && Self::is_image(e.path()))
            .count()
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Size in KB with one decimal, as shown in the per-file report
    pub fn format_kb(size: u64) -> String {
        format!("{:.1} KB", size as f64 / 1024.0)
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
