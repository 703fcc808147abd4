//! # Pipeline Runner
//!
//! Orchestratore principale di una run.
//!
//! ## Responsabilità:
//! - Validazione della configurazione prima di qualsiasi traversal
//! - Creazione della root di output e canonicalizzazione delle root
//! - Pre-conteggio delle immagini per la progress bar o l'evento JSON `start`
//! - Avvio del task aggregatore e consegna dell'albero al `TreeWalker`
//!
//! ```text
//! walk tasks ──ReportEvent──▶ aggregator task (ReportAggregator + ProgressTracker)
//!     │                                   │
//!     └─ all scopes drained ─▶ sender dropped ─▶ RunReport
//! ```

use crate::{
    codec::CodecAdapter,
    config::Config,
    error::PipelineError,
    file_manager::FileManager,
    image_processor::ImageProcessor,
    json_output::JsonMessage,
    pipeline::{
        converter::FileConverter,
        planner::FormatPlanner,
        progress_tracker::ProgressTracker,
        walker::{StopSignal, TreeWalker, WalkContext},
    },
    report::{ReportAggregator, ReportEvent, RunReport},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

/// A configured derivative run
pub struct Pipeline<A: CodecAdapter = ImageProcessor> {
    config: Config,
    adapter: Arc<A>,
    stop: StopSignal,
    show_progress: bool,
}

impl Pipeline<ImageProcessor> {
    /// Pipeline with the in-process image codecs
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        let adapter = ImageProcessor::new(config.avif_speed);
        Self::with_adapter(config, adapter)
    }
}

impl<A: CodecAdapter> Pipeline<A> {
    pub fn with_adapter(config: Config, adapter: A) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            adapter: Arc::new(adapter),
            stop: StopSignal::new(),
            show_progress: false,
        })
    }

    /// Use an externally owned stop signal (e.g. raised from a Ctrl-C handler)
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Draw a progress bar (or emit JSON events in JSON mode)
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Convert the whole input tree
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let start_time = Instant::now();
        self.log_configuration();

        let (input_root, output_root) = self.prepare_roots().await?;
        let skip_dir = if output_root.starts_with(&input_root) {
            info!("Output directory lies inside the input tree, it will not be traversed");
            Some(output_root.clone())
        } else {
            None
        };

        let tracker = if self.show_progress || self.config.json_output {
            let expected = self.count_images(&input_root, skip_dir.clone()).await?;
            info!("🔍 Found {} images to convert", expected);
            if self.config.json_output {
                JsonMessage::start(&self.config, expected).emit();
            }
            ProgressTracker::new(expected, self.config.json_output)
        } else {
            ProgressTracker::hidden()
        };

        let (events, receiver) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect(receiver, tracker));

        let planner = FormatPlanner::new(&output_root, self.config.quality, self.config.sp_image_width);
        let walker = TreeWalker::new(WalkContext {
            input_root,
            output_root,
            excluded_prefix: self.config.excluded_dir_prefix.clone(),
            skip_dir,
            converter: FileConverter::new(Arc::clone(&self.adapter), planner),
            permits: Arc::new(Semaphore::new(self.config.workers)),
            events,
            stop: self.stop.clone(),
            keep_going: self.config.keep_going,
        });

        let walked = walker.walk().await;
        // last sender goes away here, which ends the collector
        drop(walker);

        let (aggregator, tracker) = collector.await?;
        walked?;

        let report = aggregator.finish(start_time.elapsed());
        tracker.finish(&report);
        Ok(report)
    }

    /// Create the output root and canonicalize both roots
    async fn prepare_roots(&self) -> Result<(PathBuf, PathBuf), PipelineError> {
        let input = &self.config.input_dir;
        let output = &self.config.output_dir;

        tokio::fs::create_dir_all(output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;

        let input_root = tokio::fs::canonicalize(input)
            .await
            .map_err(|e| PipelineError::io(input, e))?;
        let output_root = tokio::fs::canonicalize(output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;

        if input_root == output_root {
            return Err(PipelineError::Config(format!(
                "Output directory must differ from the input directory: {}",
                input_root.display()
            )));
        }

        debug!("Input root: {}", input_root.display());
        debug!("Output root: {}", output_root.display());
        Ok((input_root, output_root))
    }

    async fn count_images(
        &self,
        input_root: &std::path::Path,
        skip_dir: Option<PathBuf>,
    ) -> Result<usize, PipelineError> {
        let root = input_root.to_path_buf();
        let prefix = self.config.excluded_dir_prefix.clone();
        let count = tokio::task::spawn_blocking(move || {
            FileManager::count_images(&root, &prefix, skip_dir.as_deref())
        })
        .await?;
        Ok(count)
    }

    fn log_configuration(&self) {
        info!("🚀 Starting derivative generation");
        info!("📂 Input: {}", self.config.input_dir.display());
        info!("📁 Output: {}", self.config.output_dir.display());
        info!("🎨 Quality: {}", self.config.quality);
        match self.config.sp_image_width {
            Some(width) if self.config.sp_enabled() => {
                info!("📱 Small viewport width: {}px", width)
            }
            _ => info!("📱 Small viewport variants: disabled"),
        }
        info!("👥 Workers: {}", self.config.workers);
        if self.config.keep_going {
            info!("⏭️  Keep going: conversion failures are recorded, not fatal");
        }
    }
}

/// Single consumer of report events
async fn collect(
    mut receiver: mpsc::UnboundedReceiver<ReportEvent>,
    mut tracker: ProgressTracker,
) -> (ReportAggregator, ProgressTracker) {
    let mut aggregator = ReportAggregator::new();
    while let Some(event) = receiver.recv().await {
        tracker.observe(&event);
        aggregator.apply(event);
    }
    (aggregator, tracker)
}
