//! # Format Plan Builder
//!
//! Decide, prima di qualsiasi I/O, quali derivati riceve un file sorgente.
//!
//! ## Responsabilità:
//! 1. `index.<ext>`: il sorgente copiato invariato (la baseline)
//! 2. `index.avif` e `index.webp` alla qualità configurata
//! 3. se la soglia small-viewport è configurata e il sorgente è strettamente
//!    più largo, gli stessi tre da una copia ridimensionata, come `index-sp.*`
//!
//! Una larghezza sconosciuta non produce mai target small-viewport.

use crate::codec::{EncodeFormat, ImageMetadata};
use crate::pipeline::path_resolver::PathResolver;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Native resolution or the resized small-viewport copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Standard,
    SmallViewport,
}

/// Which of the three encodings a target is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Same codec as the source
    Original,
    Avif,
    Webp,
}

/// A recognized image found by the walker
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path of the source
    pub path: PathBuf,
    /// Path relative to the traversal root, file name included
    pub relative_path: PathBuf,
    /// Lowercased extension, without the dot
    pub extension: String,
    /// File name without its extension; names the output folder
    pub base_name: String,
}

impl SourceFile {
    /// Build from a file path; None unless it has a recognized image extension
    pub fn new(path: PathBuf, relative_path: PathBuf) -> Option<Self> {
        let extension = crate::file_manager::FileManager::image_extension(&path)?;
        let base_name = path.file_stem()?.to_string_lossy().to_string();
        Some(Self {
            path,
            relative_path,
            extension,
            base_name,
        })
    }

    /// Directory of the source relative to the traversal root
    pub fn relative_dir(&self) -> &Path {
        self.relative_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Relative path as shown in logs and the report
    pub fn display_path(&self) -> String {
        PathResolver::display_path(&self.relative_path)
    }
}

/// One planned derivative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTarget {
    pub kind: TargetKind,
    pub variant: Variant,
    /// Codec used to write the file
    pub codec: EncodeFormat,
    /// Extension of the output file
    pub extension: String,
    /// None for the passthrough copy
    pub quality: Option<u8>,
    /// Set only for small-viewport targets
    pub width: Option<u32>,
    pub output_path: PathBuf,
}

impl FormatTarget {
    /// `png`, `avif`, `sp-png`, `sp-webp`, ...
    pub fn label(&self) -> String {
        match self.variant {
            Variant::Standard => self.extension.clone(),
            Variant::SmallViewport => format!("sp-{}", self.extension),
        }
    }

    /// Whether the target is a plain copy of the source bytes
    pub fn is_passthrough(&self) -> bool {
        self.kind == TargetKind::Original && self.variant == Variant::Standard
    }
}

/// Ordered derivatives of one source; index 0 is always the baseline
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    pub output_dir: PathBuf,
    pub targets: Vec<FormatTarget>,
}

impl ConversionPlan {
    /// Width the small-viewport copy is resized to, if any
    pub fn small_viewport_width(&self) -> Option<u32> {
        self.targets
            .iter()
            .find(|t| t.variant == Variant::SmallViewport)
            .and_then(|t| t.width)
    }

    /// Earlier target writing the same file, if any.
    ///
    /// A `.webp` or `.avif` source makes the original-format target and the
    /// matching re-encode share a path; only the first one is written.
    pub fn duplicate_of(&self, index: usize) -> Option<usize> {
        let path = &self.targets.get(index)?.output_path;
        self.targets[..index].iter().position(|t| &t.output_path == path)
    }
}

/// Builds conversion plans from the run settings
#[derive(Debug, Clone)]
pub struct FormatPlanner {
    output_root: PathBuf,
    quality: u8,
    sp_width: Option<u32>,
}

impl FormatPlanner {
    pub fn new(output_root: impl Into<PathBuf>, quality: u8, sp_width: Option<u32>) -> Self {
        Self {
            output_root: output_root.into(),
            quality,
            sp_width: sp_width.filter(|w| *w > 0),
        }
    }

    /// Whether planning needs the source's intrinsic width
    pub fn needs_metadata(&self) -> bool {
        self.sp_width.is_some()
    }

    /// Plan the derivatives of `source`; `metadata` is the source size, if it was read
    pub fn plan(&self, source: &SourceFile, metadata: Option<ImageMetadata>) -> ConversionPlan {
        let output_dir =
            PathResolver::file_output_dir(&self.output_root, source.relative_dir(), &source.base_name);

        let mut targets = self.variant_targets(source, &output_dir, Variant::Standard, None);

        if let Some(threshold) = self.sp_width {
            match metadata {
                Some(meta) if meta.width > threshold => {
                    targets.extend(self.variant_targets(
                        source,
                        &output_dir,
                        Variant::SmallViewport,
                        Some(threshold),
                    ));
                }
                _ => {}
            }
        }

        ConversionPlan { output_dir, targets }
    }

    fn variant_targets(
        &self,
        source: &SourceFile,
        output_dir: &Path,
        variant: Variant,
        width: Option<u32>,
    ) -> Vec<FormatTarget> {
        // Recognized extensions always map to a codec
        let original_codec = EncodeFormat::from_extension(&source.extension).unwrap_or(EncodeFormat::Png);
        let original_quality = match variant {
            Variant::Standard => None,
            Variant::SmallViewport => Some(self.quality),
        };

        [
            (TargetKind::Original, original_codec, source.extension.as_str(), original_quality),
            (TargetKind::Avif, EncodeFormat::Avif, "avif", Some(self.quality)),
            (TargetKind::Webp, EncodeFormat::Webp, "webp", Some(self.quality)),
        ]
        .into_iter()
        .map(|(kind, codec, extension, quality)| FormatTarget {
            kind,
            variant,
            codec,
            extension: extension.to_string(),
            quality,
            width,
            output_path: PathResolver::target_path(output_dir, variant, extension),
        })
        .collect()
    }
}
