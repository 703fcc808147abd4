//! # Report Aggregator
//!
//! Raccoglie i risultati per file mentre le conversioni terminano in ordine
//! qualsiasi e produce un `RunReport` ordinato per posizione nel traversal.
//!
//! ## Responsabilità:
//! - Chiave di ordinamento deterministica (`TraversalKey`)
//! - Aggregazione degli eventi `ReportEvent` in `ReportAggregator`
//! - Statistiche per formato e log del riepilogo finale
//!
//! ## Statistiche:
//! - per file: dimensione di ogni derivato e riduzione rispetto alla baseline
//!   (la copia passthrough, sempre all'indice 0)
//! - per formato: numero di file, byte totali, riduzione rispetto alla somma
//!   delle baseline di quei file

use crate::file_manager::FileManager;
use crate::pipeline::planner::{TargetKind, Variant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Position of a file in the traversal: depth-first, files before subdirectories
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraversalKey(Vec<u32>);

impl TraversalKey {
    pub fn root() -> Self {
        Self::default()
    }

    /// Key of the `index`-th file of this directory
    pub fn file(&self, index: usize) -> Self {
        self.child(0, index)
    }

    /// Key of the `index`-th subdirectory of this directory
    pub fn dir(&self, index: usize) -> Self {
        self.child(1, index)
    }

    fn child(&self, slot: u32, index: usize) -> Self {
        let mut parts = self.0.clone();
        parts.push(slot);
        parts.push(index as u32);
        Self(parts)
    }
}

/// One written derivative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOutput {
    /// `png`, `avif`, `sp-webp`, ...
    pub format: String,
    pub kind: TargetKind,
    pub variant: Variant,
    pub path: PathBuf,
    pub size: u64,
}

/// Everything produced for one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    /// Source path relative to the input root
    pub original_file: String,
    /// Name of the per-file output folder (the base name)
    pub output_dir: String,
    /// Directory of the source relative to the input root
    pub relative_dir: PathBuf,
    /// Derivatives in plan order; index 0 is the baseline
    pub formats: Vec<FormatOutput>,
}

impl FileResult {
    pub fn baseline(&self) -> Option<&FormatOutput> {
        self.formats.first()
    }

    /// `(baseline - size) / baseline` for the derivative at `index`
    pub fn reduction(&self, index: usize) -> Option<f64> {
        if index == 0 {
            return None;
        }
        let baseline = self.baseline()?.size;
        let target = self.formats.get(index)?.size;
        if baseline == 0 {
            return None;
        }
        Some((baseline as f64 - target as f64) / baseline as f64)
    }

    /// Output folder relative to the output root, as shown in logs
    pub fn output_display(&self) -> String {
        let dir = crate::pipeline::path_resolver::PathResolver::display_path(&self.relative_dir);
        if dir.is_empty() {
            format!("{}/", self.output_dir)
        } else {
            format!("{}/{}/", dir, self.output_dir)
        }
    }
}

/// A file whose conversion failed while `keep_going` was set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub original_file: String,
    pub error: String,
}

/// Result of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Recognized images discovered by the walk
    pub total_files: usize,
    pub files: Vec<FileResult>,
    pub failures: Vec<FileFailure>,
    pub duration_seconds: f64,
}

/// Per-format-label totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatSummary {
    pub files: usize,
    pub total_bytes: u64,
    pub baseline_bytes: u64,
}

impl FormatSummary {
    /// Percentage saved against the baselines of the same files
    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.baseline_bytes, self.total_bytes)
    }
}

/// Aggregate statistics of a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files: usize,
    pub converted_files: usize,
    pub failed_files: usize,
    pub bytes_written: u64,
    pub formats: BTreeMap<String, FormatSummary>,
}

impl RunReport {
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total_files: self.total_files,
            converted_files: self.files.len(),
            failed_files: self.failures.len(),
            ..Default::default()
        };

        for file in &self.files {
            let baseline = file.baseline().map(|b| b.size).unwrap_or(0);
            for output in &file.formats {
                summary.bytes_written += output.size;
                let entry = summary.formats.entry(output.format.clone()).or_default();
                entry.files += 1;
                entry.total_bytes += output.size;
                entry.baseline_bytes += baseline;
            }
        }

        summary
    }
}

/// Messages sent by the walker to the aggregating task
#[derive(Debug)]
pub enum ReportEvent {
    Discovered,
    Completed { key: TraversalKey, result: FileResult },
    Failed { key: TraversalKey, failure: FileFailure },
}

/// Accumulates results in arrival order and sorts them on `finish`
#[derive(Debug, Default)]
pub struct ReportAggregator {
    discovered: usize,
    files: Vec<(TraversalKey, FileResult)>,
    failures: Vec<(TraversalKey, FileFailure)>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ReportEvent) {
        match event {
            ReportEvent::Discovered => self.discovered += 1,
            ReportEvent::Completed { key, result } => self.files.push((key, result)),
            ReportEvent::Failed { key, failure } => self.failures.push((key, failure)),
        }
    }

    pub fn finish(mut self, duration: Duration) -> RunReport {
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
        self.failures.sort_by(|a, b| a.0.cmp(&b.0));

        RunReport {
            total_files: self.discovered,
            files: self.files.into_iter().map(|(_, r)| r).collect(),
            failures: self.failures.into_iter().map(|(_, f)| f).collect(),
            duration_seconds: duration.as_secs_f64(),
        }
    }
}

/// Build a report from keyed results, whatever order they arrive in
pub fn aggregate<I>(results: I) -> RunReport
where
    I: IntoIterator<Item = (TraversalKey, FileResult)>,
{
    let mut aggregator = ReportAggregator::new();
    for (key, result) in results {
        aggregator.apply(ReportEvent::Discovered);
        aggregator.apply(ReportEvent::Completed { key, result });
    }
    aggregator.finish(Duration::ZERO)
}

/// Log the per-file sizes and compression comparison
pub fn log_report(report: &RunReport) {
    info!("🎉 Conversion complete");
    info!("Files processed: {}", report.total_files);

    if !report.files.is_empty() {
        info!("📊 Results:");
        for file in &report.files {
            info!("📁 {} → {}", file.original_file, file.output_display());
            for output in &file.formats {
                info!("   {}: {}", output.format.to_uppercase(), FileManager::format_kb(output.size));
            }
        }

        info!("📈 Compression against the original:");
        for file in &report.files {
            info!("{}:", file.output_display());
            for (index, output) in file.formats.iter().enumerate().skip(1) {
                if let Some(ratio) = file.reduction(index) {
                    info!(
                        "   {}: -{:.1}% ({})",
                        output.format.to_uppercase(),
                        ratio * 100.0,
                        FileManager::format_kb(output.size)
                    );
                }
            }
        }
    }

    for failure in &report.failures {
        warn!("❌ {}: {}", failure.original_file, failure.error);
    }

    let summary = report.summary();
    info!("=== Summary ===");
    info!("Converted: {} of {} files", summary.converted_files, summary.total_files);
    if summary.failed_files > 0 {
        info!("Failed: {}", summary.failed_files);
    }
    info!("Bytes written: {}", FileManager::format_size(summary.bytes_written));
    for (label, stats) in &summary.formats {
        info!(
            "  • {}: {} files, {} ({:.1}% vs original)",
            label,
            stats.files,
            FileManager::format_size(stats.total_bytes),
            stats.reduction_percent()
        );
    }
    info!("Duration: {:.2}s", report.duration_seconds);
}
