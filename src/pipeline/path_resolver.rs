//! # Path Resolution Module
//!
//! Tutta la nomenclatura di output vive qui: il layout è una funzione pura di
//! (directory relativa, nome base, estensione, variante).
//!
//! ## Responsabilità:
//! - Cartella di output per file: `<out>/<rel>/<base>/`
//! - Nomi `index.<ext>` e `index-sp.<ext>`
//! - Percorsi relativi da mostrare nel report
//!
//! ## Esempio:
//! ```text
//! input/sub/photo.png  ->  output/sub/photo/index.png
//!                          output/sub/photo/index.avif
//!                          output/sub/photo/index.webp
//!                          output/sub/photo/index-sp.png   (small viewport)
//!                          output/sub/photo/index-sp.avif
//!                          output/sub/photo/index-sp.webp
//! ```

use crate::pipeline::planner::Variant;
use std::path::{Path, PathBuf};

/// Output path calculations
pub struct PathResolver;

impl PathResolver {
    /// Folder that receives every derivative of one source file
    pub fn file_output_dir(output_root: &Path, relative_dir: &Path, base_name: &str) -> PathBuf {
        output_root.join(relative_dir).join(base_name)
    }

    /// `index.<ext>` or `index-sp.<ext>`
    pub fn target_file_name(variant: Variant, extension: &str) -> String {
        match variant {
            Variant::Standard => format!("index.{}", extension),
            Variant::SmallViewport => format!("index-sp.{}", extension),
        }
    }

    /// Full path of one derivative
    pub fn target_path(file_output_dir: &Path, variant: Variant, extension: &str) -> PathBuf {
        file_output_dir.join(Self::target_file_name(variant, extension))
    }

    /// Mirror of an input directory under the output root
    pub fn mirror_dir(output_root: &Path, relative_dir: &Path) -> PathBuf {
        output_root.join(relative_dir)
    }

    /// Relative path rendered with `/` separators for display and JSON
    pub fn display_path(relative: &Path) -> String {
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
