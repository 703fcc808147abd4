//! # Progress Bar Module
//!
//! Feedback visivo con `indicatif` durante la conversione.
//!
//! ## Responsabilità:
//! - Creazione della barra con il template del progetto
//! - Avanzamento e messaggio del file corrente
//! - Crescita della lunghezza se il walk trova più file del pre-conteggio
//!
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 42/70 (60%) ✅ sub/photo.png
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A manager that draws nothing (JSON mode, library use, tests)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Make sure the bar can hold at least `total` steps
    pub fn ensure_length(&self, total: u64) {
        if self.bar.length().unwrap_or(0) < total {
            self.bar.set_length(total);
        }
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
