//! # Progress Tracking Module
//!
//! Osservatore degli eventi di report.
//!
//! ## Responsabilità:
//! - Avanzare la progress bar
//! - Emettere gli eventi JSON quando la run è in modalità JSON
//!
//! Vive dentro il task aggregatore, quindi non ha bisogno di lock.

use crate::{
    json_output::JsonMessage,
    progress::ProgressManager,
    report::{ReportEvent, RunReport},
};
use tracing::info;

pub struct ProgressTracker {
    manager: ProgressManager,
    json_output: bool,
    discovered: usize,
    current: usize,
}

impl ProgressTracker {
    /// Bar sized for `expected_files`, or JSON events when `json_output` is set
    pub fn new(expected_files: usize, json_output: bool) -> Self {
        let manager = if json_output {
            ProgressManager::hidden()
        } else {
            ProgressManager::new(expected_files as u64)
        };

        Self {
            manager,
            json_output,
            discovered: 0,
            current: 0,
        }
    }

    /// No bar, no JSON
    pub fn hidden() -> Self {
        Self {
            manager: ProgressManager::hidden(),
            json_output: false,
            discovered: 0,
            current: 0,
        }
    }

    pub fn observe(&mut self, event: &ReportEvent) {
        match event {
            ReportEvent::Discovered => {
                self.discovered += 1;
                self.manager.ensure_length(self.discovered as u64);
            }
            ReportEvent::Completed { result, .. } => {
                self.current += 1;
                if self.json_output {
                    JsonMessage::FileComplete {
                        current: self.current,
                        total: self.discovered,
                        result: result.clone(),
                    }
                    .emit();
                }
                self.manager
                    .update(&format!("[OK] {} → {}", result.original_file, result.output_display()));
            }
            ReportEvent::Failed { failure, .. } => {
                self.current += 1;
                if self.json_output {
                    JsonMessage::FileFailed {
                        current: self.current,
                        total: self.discovered,
                        path: failure.original_file.clone(),
                        error: failure.error.clone(),
                    }
                    .emit();
                }
                self.manager.update(&format!("[ERROR] {}", failure.original_file));
            }
        }
    }

    /// Close the bar, or emit the `complete` event
    pub fn finish(&self, report: &RunReport) {
        let summary = report.summary();
        if self.json_output {
            JsonMessage::Complete {
                summary,
                duration_seconds: report.duration_seconds,
            }
            .emit();
        } else {
            self.manager.finish(&format!(
                "Converted {} of {} files",
                summary.converted_files, summary.total_files
            ));
            info!("Processed {} files in {:.2}s", report.total_files, report.duration_seconds);
        }
    }
}
