//! # File Converter
//!
//! Worker per il singolo file: produce tutti i derivati pianificati.
//!
//! ## Responsabilità:
//! - Lettura dimensioni (solo se serve) e costruzione del piano
//! - Una sola decodifica e al massimo un resize per sorgente
//! - Encoding concorrenti sul blocking pool, copia diretta per il target originale
//!
//! La directory di output viene creata solo dopo una decodifica riuscita.
//! Il risultato mantiene l'ordine del piano: l'indice 0 è sempre la baseline.

use crate::{
    codec::{CodecAdapter, ImageMetadata},
    error::{CodecError, PipelineError},
    pipeline::planner::{ConversionPlan, FormatPlanner, FormatTarget, SourceFile, Variant},
    report::{FileResult, FormatOutput},
};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Worker for single-file conversions
pub struct FileConverter<A: CodecAdapter> {
    adapter: Arc<A>,
    planner: FormatPlanner,
}

impl<A: CodecAdapter> Clone for FileConverter<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            planner: self.planner.clone(),
        }
    }
}

impl<A: CodecAdapter> FileConverter<A> {
    pub fn new(adapter: Arc<A>, planner: FormatPlanner) -> Self {
        Self { adapter, planner }
    }

    /// Plan and convert one file
    pub async fn process(&self, source: &SourceFile) -> Result<FileResult, PipelineError> {
        if !self.adapter.decodes(&source.extension) {
            return Err(PipelineError::UnsupportedSource {
                path: source.path.clone(),
                extension: source.extension.clone(),
            });
        }
        let plan = self.plan(source).await?;
        self.convert(source, &plan).await
    }

    /// Read the source size if needed, then build its plan
    pub async fn plan(&self, source: &SourceFile) -> Result<ConversionPlan, PipelineError> {
        let metadata = if self.planner.needs_metadata() {
            self.read_metadata(source).await?
        } else {
            None
        };
        Ok(self.planner.plan(source, metadata))
    }

    /// Intrinsic size of the source; None when the codec cannot tell
    async fn read_metadata(&self, source: &SourceFile) -> Result<Option<ImageMetadata>, PipelineError> {
        let adapter = Arc::clone(&self.adapter);
        let path = source.path.clone();
        let metadata = tokio::task::spawn_blocking(move || adapter.metadata(&path)).await?;

        Ok(match metadata {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!("No width for {}, skipping small viewport: {}", source.display_path(), e);
                None
            }
        })
    }

    /// Write every target of `plan`
    pub async fn convert(
        &self,
        source: &SourceFile,
        plan: &ConversionPlan,
    ) -> Result<FileResult, PipelineError> {
        debug!("Converting {} ({} targets)", source.display_path(), plan.targets.len());

        let first_encode = plan
            .targets
            .iter()
            .enumerate()
            .find(|(index, target)| !target.is_passthrough() && plan.duplicate_of(*index).is_none())
            .map(|(_, target)| target);

        let standard = match first_encode {
            Some(target) => Some(self.decode(source, target).await?),
            None => None,
        };

        let small = match (&standard, plan.small_viewport_width()) {
            (Some(handle), Some(width)) => {
                let label = plan
                    .targets
                    .iter()
                    .find(|t| t.variant == Variant::SmallViewport)
                    .map(|t| t.label())
                    .unwrap_or_default();
                Some(self.resize(source, handle, width, label).await?)
            }
            _ => None,
        };

        tokio::fs::create_dir_all(&plan.output_dir)
            .await
            .map_err(|e| PipelineError::io(&plan.output_dir, e))?;

        let mut jobs: Vec<BoxFuture<'static, Result<(usize, u64), PipelineError>>> = Vec::new();
        for (index, target) in plan.targets.iter().enumerate() {
            if plan.duplicate_of(index).is_some() {
                continue;
            }

            if target.is_passthrough() {
                jobs.push(copy_original(index, source.path.clone(), target.clone()).boxed());
                continue;
            }

            let handle = match target.variant {
                Variant::Standard => standard.clone(),
                Variant::SmallViewport => small.clone(),
            };
            if let Some(handle) = handle {
                jobs.push(
                    encode_target(Arc::clone(&self.adapter), handle, index, source.path.clone(), target.clone())
                        .boxed(),
                );
            }
        }

        let mut sizes = vec![0u64; plan.targets.len()];
        for (index, size) in try_join_all(jobs).await? {
            sizes[index] = size;
        }

        let formats = plan
            .targets
            .iter()
            .enumerate()
            .map(|(index, target)| FormatOutput {
                format: target.label(),
                kind: target.kind,
                variant: target.variant,
                path: target.output_path.clone(),
                size: sizes[plan.duplicate_of(index).unwrap_or(index)],
            })
            .collect();

        Ok(FileResult {
            original_file: source.display_path(),
            output_dir: source.base_name.clone(),
            relative_dir: source.relative_dir().to_path_buf(),
            formats,
        })
    }

    async fn decode(
        &self,
        source: &SourceFile,
        target: &FormatTarget,
    ) -> Result<Arc<A::Handle>, PipelineError> {
        let adapter = Arc::clone(&self.adapter);
        let path = source.path.clone();
        let handle = tokio::task::spawn_blocking(move || adapter.open(&path))
            .await?
            .map_err(|e| conversion_error(source.path.clone(), target.label(), e))?;
        Ok(Arc::new(handle))
    }

    async fn resize(
        &self,
        source: &SourceFile,
        handle: &Arc<A::Handle>,
        width: u32,
        label: String,
    ) -> Result<Arc<A::Handle>, PipelineError> {
        let adapter = Arc::clone(&self.adapter);
        let handle = Arc::clone(handle);
        let resized = tokio::task::spawn_blocking(move || adapter.resize(&handle, width))
            .await?
            .map_err(|e| conversion_error(source.path.clone(), label, e))?;
        Ok(Arc::new(resized))
    }
}

async fn copy_original(
    index: usize,
    source: PathBuf,
    target: FormatTarget,
) -> Result<(usize, u64), PipelineError> {
    let size = tokio::fs::copy(&source, &target.output_path)
        .await
        .map_err(|e| conversion_error(source.clone(), target.label(), CodecError::Io(e)))?;
    Ok((index, size))
}

async fn encode_target<A: CodecAdapter>(
    adapter: Arc<A>,
    handle: Arc<A::Handle>,
    index: usize,
    source: PathBuf,
    target: FormatTarget,
) -> Result<(usize, u64), PipelineError> {
    let label = target.label();
    let quality = target.quality.unwrap_or(100);
    let size = tokio::task::spawn_blocking(move || {
        adapter.encode(&handle, target.codec, quality, &target.output_path)
    })
    .await?
    .map_err(|e| conversion_error(source, label, e))?;
    Ok((index, size))
}

fn conversion_error(path: PathBuf, format: String, source: CodecError) -> PipelineError {
    PipelineError::Conversion { path, format, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::mock::{MockCodec, RecordedOp};
    use crate::codec::EncodeFormat;
    use tempfile::TempDir;

    fn setup(file_name: &str) -> (TempDir, SourceFile) {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in");
        std::fs::create_dir_all(input.join("sub")).unwrap();
        let path = input.join("sub").join(file_name);
        std::fs::write(&path, b"original-bytes").unwrap();
        let source = SourceFile::new(path, PathBuf::from("sub").join(file_name)).unwrap();
        (temp_dir, source)
    }

    fn converter(codec: MockCodec, output: PathBuf, sp: Option<u32>) -> (Arc<MockCodec>, FileConverter<MockCodec>) {
        let codec = Arc::new(codec);
        let planner = FormatPlanner::new(output, 70, sp);
        (Arc::clone(&codec), FileConverter::new(codec, planner))
    }

    #[tokio::test]
    async fn test_standard_targets_written() {
        let (temp_dir, source) = setup("photo.png");
        let output = temp_dir.path().join("out");
        let (codec, converter) = converter(MockCodec::new(), output.clone(), None);

        let result = converter.process(&source).await.unwrap();

        let dir = output.join("sub/photo");
        for name in ["index.png", "index.avif", "index.webp"] {
            assert!(dir.join(name).exists(), "{} missing", name);
        }
        assert_eq!(std::fs::read(dir.join("index.png")).unwrap(), b"original-bytes");

        let labels: Vec<_> = result.formats.iter().map(|f| f.format.as_str()).collect();
        assert_eq!(labels, ["png", "avif", "webp"]);
        assert_eq!(result.formats[0].size, 14);
        assert_eq!(result.original_file, "sub/photo.png");
        assert_eq!(result.output_dir, "photo");
        assert_eq!(result.relative_dir, PathBuf::from("sub"));

        // no size lookup without a threshold
        assert!(!codec.operations().iter().any(|op| matches!(op, RecordedOp::Metadata(_))));
    }

    #[tokio::test]
    async fn test_small_viewport_resizes_once() {
        let (temp_dir, source) = setup("wide.jpg");
        let output = temp_dir.path().join("out");
        let (codec, converter) = converter(MockCodec::new(), output.clone(), Some(768));

        let result = converter.process(&source).await.unwrap();
        assert_eq!(result.formats.len(), 6);

        let dir = output.join("sub/wide");
        for name in ["index-sp.jpg", "index-sp.avif", "index-sp.webp"] {
            assert!(dir.join(name).exists(), "{} missing", name);
        }

        let ops = codec.operations();
        let opens = ops.iter().filter(|op| matches!(op, RecordedOp::Open(_))).count();
        let resizes: Vec<_> = ops.iter().filter(|op| matches!(op, RecordedOp::Resize { .. })).collect();
        assert_eq!(opens, 1);
        assert_eq!(resizes, vec![&RecordedOp::Resize { width: 768 }]);

        let sp_jpeg = std::fs::read_to_string(dir.join("index-sp.jpg")).unwrap();
        assert_eq!(sp_jpeg, "Jpeg 768x384 q70");
    }

    #[tokio::test]
    async fn test_narrow_source_has_no_small_viewport() {
        let (temp_dir, source) = setup("photo.png");
        let output = temp_dir.path().join("out");
        let (codec, converter) = converter(MockCodec::new(), output.clone(), Some(768));

        let result = converter.process(&source).await.unwrap();
        assert_eq!(result.formats.len(), 3);
        assert!(!output.join("sub/photo/index-sp.png").exists());
        assert!(codec.operations().iter().any(|op| matches!(op, RecordedOp::Metadata(_))));
    }

    #[tokio::test]
    async fn test_webp_source_writes_shared_path_once() {
        let (temp_dir, source) = setup("photo.webp");
        let output = temp_dir.path().join("out");
        let (codec, converter) = converter(MockCodec::new(), output.clone(), None);

        let result = converter.process(&source).await.unwrap();
        assert_eq!(result.formats.len(), 3);
        assert_eq!(result.formats[2].size, result.formats[0].size);
        assert_eq!(
            std::fs::read(output.join("sub/photo/index.webp")).unwrap(),
            b"original-bytes"
        );

        let webp_encodes = codec
            .operations()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Encode { format: EncodeFormat::Webp, .. }))
            .count();
        assert_eq!(webp_encodes, 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_attributed() {
        let (temp_dir, source) = setup("broken.png");
        let output = temp_dir.path().join("out");
        let (_, converter) = converter(MockCodec::new(), output.clone(), None);

        match converter.process(&source).await {
            Err(PipelineError::Conversion { path, format, .. }) => {
                assert_eq!(path, source.path);
                assert_eq!(format, "avif");
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
        assert!(!output.join("sub/broken").exists());
    }

    #[tokio::test]
    async fn test_undecodable_source_is_rejected_before_any_work() {
        let (temp_dir, source) = setup("hero.avif");
        let output = temp_dir.path().join("out");
        let (codec, converter) = converter(MockCodec::new().without_decoder("avif"), output.clone(), Some(768));

        match converter.process(&source).await {
            Err(PipelineError::UnsupportedSource { extension, .. }) => assert_eq!(extension, "avif"),
            other => panic!("expected unsupported source, got {:?}", other),
        }
        assert!(codec.operations().is_empty());
        assert!(!output.join("sub/hero").exists());
    }

    #[tokio::test]
    async fn test_configured_dimensions_drive_small_viewport() {
        let (temp_dir, source) = setup("wide.png");
        let codec = MockCodec::new().with_dimensions("wide.png", 2000, 1000);
        let (_, converter) = converter(codec, temp_dir.path().join("out"), Some(768));
        assert_eq!(converter.process(&source).await.unwrap().formats.len(), 6);
    }
}
