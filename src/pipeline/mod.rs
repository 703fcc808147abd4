//! # Pipeline Module
//!
//! Motore della run, suddiviso per responsabilità.
//!
//! ## Responsabilità:
//! - `runner`: setup della run e task aggregatore
//! - `walker`: traversal concorrente e cancellazione
//! - `converter`: tutti i derivati di un file
//! - `planner`: quali target riceve un file
//! - `path_resolver`: regole dei percorsi di output
//! - `progress_tracker`: progress bar ed eventi JSON

pub mod converter;
pub mod path_resolver;
pub mod planner;
pub mod progress_tracker;
pub mod runner;
pub mod walker;

pub use converter::FileConverter;
pub use path_resolver::PathResolver;
pub use planner::{ConversionPlan, FormatPlanner, FormatTarget, SourceFile, TargetKind, Variant};
pub use progress_tracker::ProgressTracker;
pub use runner::Pipeline;
pub use walker::{StopSignal, TreeWalker};
