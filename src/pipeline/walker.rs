//! # Tree Walker
//!
//! Visita ricorsiva e concorrente dell'albero di input.
//!
//! ## Responsabilità:
//! - Listing di ogni directory (ordinato per nome) e classificazione dei figli
//! - Un task per sottodirectory e uno per immagine, in un `JoinSet` per scope
//! - Limite di conversioni simultanee tramite semaforo (`workers` permessi)
//! - Esclusione per prefisso, salto della directory di output e dei cicli di symlink
//! - Invio dei risultati al task aggregatore, etichettati con la `TraversalKey`
//!
//! Uno scope termina solo dopo aver drenato il proprio `JoinSet`, quindi una
//! directory è finita esattamente quando lo è tutto ciò che contiene. Le visite
//! di directory non prendono mai un permesso del semaforo.
//!
//! ## Gestione errori:
//! Il primo errore alza lo `StopSignal`: i file in attesa di un permesso non
//! partono, quelli in conversione terminano, e l'errore risale dopo il drain di
//! ogni scope. Con `keep_going` gli errori di conversione diventano
//! `ReportEvent::Failed`; le sorgenti senza decoder lo diventano sempre.

use crate::{
    codec::CodecAdapter,
    error::PipelineError,
    file_manager::FileManager,
    pipeline::{converter::FileConverter, path_resolver::PathResolver, planner::SourceFile},
    report::{FileFailure, ReportEvent, TraversalKey},
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Shared flag that stops new conversions from starting
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop; in-flight conversions still complete
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a directory entry is treated
#[derive(Debug)]
pub enum EntryKind {
    Directory { path: PathBuf, relative: PathBuf },
    Image(SourceFile),
    Ignored,
}

/// File-system type of an entry, symlinks resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Dir,
    File,
    Other,
}

/// Classify one child of a directory
pub fn classify_entry(
    path: PathBuf,
    relative: PathBuf,
    fs_kind: FsKind,
    excluded_prefix: &str,
) -> EntryKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match fs_kind {
        FsKind::Dir if FileManager::is_excluded_dir(&name, excluded_prefix) => {
            debug!("Skipping excluded directory: {}", path.display());
            EntryKind::Ignored
        }
        FsKind::Dir => EntryKind::Directory { path, relative },
        FsKind::File => SourceFile::new(path, relative)
            .map(EntryKind::Image)
            .unwrap_or(EntryKind::Ignored),
        FsKind::Other => EntryKind::Ignored,
    }
}

/// Everything the walk tasks share
pub struct WalkContext<A: CodecAdapter> {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub excluded_prefix: String,
    /// Directory never visited (the output root, when it lies inside the input)
    pub skip_dir: Option<PathBuf>,
    pub converter: FileConverter<A>,
    pub permits: Arc<Semaphore>,
    pub events: mpsc::UnboundedSender<ReportEvent>,
    pub stop: StopSignal,
    pub keep_going: bool,
}

/// Drives the recursive visit
pub struct TreeWalker<A: CodecAdapter> {
    ctx: Arc<WalkContext<A>>,
}

impl<A: CodecAdapter> TreeWalker<A> {
    pub fn new(ctx: WalkContext<A>) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Visit the whole tree; fails if any directory cannot be listed
    pub async fn walk(&self) -> Result<(), PipelineError> {
        let root = self.ctx.input_root.clone();
        visit_dir(
            Arc::clone(&self.ctx),
            root,
            PathBuf::new(),
            TraversalKey::root(),
            Arc::new(Vec::new()),
        )
        .await
    }
}

fn visit_dir<A: CodecAdapter>(
    ctx: Arc<WalkContext<A>>,
    dir: PathBuf,
    relative: PathBuf,
    key: TraversalKey,
    ancestors: Arc<Vec<PathBuf>>,
) -> BoxFuture<'static, Result<(), PipelineError>> {
    async move {
        let canonical = match tokio::fs::canonicalize(&dir).await {
            Ok(canonical) => canonical,
            Err(e) => {
                ctx.stop.raise();
                return Err(PipelineError::io(&dir, e));
            }
        };
        if ancestors.contains(&canonical) {
            warn!(
                "Skipping {}: symlink cycle back to {}",
                dir.display(),
                canonical.display()
            );
            return Ok(());
        }
        if ctx.skip_dir.as_ref() == Some(&canonical) {
            debug!("Skipping output directory inside input: {}", dir.display());
            return Ok(());
        }
        let mut chain = ancestors.as_ref().clone();
        chain.push(canonical);
        let chain = Arc::new(chain);

        if !relative.as_os_str().is_empty() {
            info!("📁 Processing directory: {}/", PathResolver::display_path(&relative));
            debug!(
                "Mirroring into {}",
                PathResolver::mirror_dir(&ctx.output_root, &relative).display()
            );
        }

        let entries = match list_dir(&ctx, &dir, &relative).await {
            Ok(entries) => entries,
            Err(e) => {
                ctx.stop.raise();
                return Err(e);
            }
        };

        if let Err(e) = check_collisions(&dir, &entries) {
            ctx.stop.raise();
            return Err(e);
        }

        let mut tasks = JoinSet::new();
        let (mut file_index, mut dir_index) = (0, 0);

        for entry in entries {
            match entry {
                EntryKind::Directory { path, relative } => {
                    let child_key = key.dir(dir_index);
                    dir_index += 1;
                    tasks.spawn(visit_dir(
                        Arc::clone(&ctx),
                        path,
                        relative,
                        child_key,
                        Arc::clone(&chain),
                    ));
                }
                EntryKind::Image(source) => {
                    let file_key = key.file(file_index);
                    file_index += 1;
                    let _ = ctx.events.send(ReportEvent::Discovered);
                    tasks.spawn(convert_file(Arc::clone(&ctx), source, file_key));
                }
                EntryKind::Ignored => {}
            }
        }

        drain(&mut tasks, &ctx.stop).await
    }
    .boxed()
}

/// List and classify the children of `dir`, sorted by name
async fn list_dir<A: CodecAdapter>(
    ctx: &WalkContext<A>,
    dir: &Path,
    relative: &Path,
) -> Result<Vec<EntryKind>, PipelineError> {
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PipelineError::io(dir, e))?;

    let mut children = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(dir, e))?
    {
        children.push((entry.file_name(), entry.path()));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    let mut entries = Vec::with_capacity(children.len());
    for (name, path) in children {
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| PipelineError::io(&path, e))?;

        let fs_kind = if metadata.is_dir() {
            FsKind::Dir
        } else if metadata.is_file() {
            FsKind::File
        } else {
            FsKind::Other
        };

        entries.push(classify_entry(path, relative.join(&name), fs_kind, &ctx.excluded_prefix));
    }

    Ok(entries)
}

/// Two images of one directory must not share an output folder
fn check_collisions(dir: &Path, entries: &[EntryKind]) -> Result<(), PipelineError> {
    let mut seen: HashMap<&str, &SourceFile> = HashMap::new();
    for entry in entries {
        if let EntryKind::Image(source) = entry {
            if let Some(first) = seen.insert(source.base_name.as_str(), source) {
                return Err(PipelineError::OutputCollision {
                    dir: dir.to_path_buf(),
                    base: source.base_name.clone(),
                    first: first.display_path(),
                    second: source.display_path(),
                });
            }
        }
    }
    Ok(())
}

async fn convert_file<A: CodecAdapter>(
    ctx: Arc<WalkContext<A>>,
    source: SourceFile,
    key: TraversalKey,
) -> Result<(), PipelineError> {
    let _permit = Arc::clone(&ctx.permits)
        .acquire_owned()
        .await
        .map_err(|_| PipelineError::Cancelled)?;

    if ctx.stop.is_raised() {
        debug!("Not starting {}: run is stopping", source.display_path());
        return Err(PipelineError::Cancelled);
    }

    info!("📸 Processing: {}", source.display_path());

    match ctx.converter.process(&source).await {
        Ok(result) => {
            info!("✅ Done: {} → {}", result.original_file, result.output_display());
            let _ = ctx.events.send(ReportEvent::Completed { key, result });
            Ok(())
        }
        Err(e @ PipelineError::UnsupportedSource { .. }) => {
            warn!("⏭️  {}", e);
            record_failure(&ctx, key, &source, &e);
            Ok(())
        }
        Err(e @ PipelineError::Conversion { .. }) if ctx.keep_going => {
            warn!("❌ {}", e);
            record_failure(&ctx, key, &source, &e);
            Ok(())
        }
        Err(e) => {
            error!("Failed to convert {}: {}", source.display_path(), e);
            ctx.stop.raise();
            Err(e)
        }
    }
}

fn record_failure<A: CodecAdapter>(
    ctx: &WalkContext<A>,
    key: TraversalKey,
    source: &SourceFile,
    error: &PipelineError,
) {
    let _ = ctx.events.send(ReportEvent::Failed {
        key,
        failure: FileFailure {
            original_file: source.display_path(),
            error: error.to_string(),
        },
    });
}

/// Await every task of a scope, keeping the most relevant error
async fn drain(
    tasks: &mut JoinSet<Result<(), PipelineError>>,
    stop: &StopSignal,
) -> Result<(), PipelineError> {
    let mut first_error: Option<PipelineError> = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(PipelineError::from).and_then(|r| r);
        if let Err(e) = outcome {
            stop.raise();
            keep_first_error(&mut first_error, e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Real failures win over the cancellations they caused
fn keep_first_error(slot: &mut Option<PipelineError>, err: PipelineError) {
    let replace = match slot {
        None => true,
        Some(existing) => existing.is_cancelled() && !err.is_cancelled(),
    };
    if replace {
        *slot = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::mock::MockCodec;
    use crate::pipeline::planner::FormatPlanner;
    use crate::report::{ReportAggregator, RunReport};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("in")).unwrap();
        fs::create_dir_all(temp.path().join("out")).unwrap();
        let input = temp.path().join("in").canonicalize().unwrap();
        let output = temp.path().join("out").canonicalize().unwrap();
        for file in files {
            let path = input.join(file);
            if file.ends_with('/') {
                fs::create_dir_all(&path).unwrap();
            } else {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, file.as_bytes()).unwrap();
            }
        }
        Fixture { _temp: temp, input, output }
    }

    async fn walk_with(
        fx: &Fixture,
        sp: Option<u32>,
        keep_going: bool,
        stop: StopSignal,
    ) -> (Result<(), PipelineError>, RunReport) {
        walk_codec(fx, MockCodec::new(), sp, keep_going, stop).await
    }

    async fn walk_codec(
        fx: &Fixture,
        codec: MockCodec,
        sp: Option<u32>,
        keep_going: bool,
        stop: StopSignal,
    ) -> (Result<(), PipelineError>, RunReport) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let converter = FileConverter::new(Arc::new(codec), FormatPlanner::new(&fx.output, 70, sp));
        let walker = TreeWalker::new(WalkContext {
            input_root: fx.input.clone(),
            output_root: fx.output.clone(),
            excluded_prefix: "_".to_string(),
            skip_dir: None,
            converter,
            permits: Arc::new(Semaphore::new(2)),
            events: tx,
            stop,
            keep_going,
        });

        let outcome = walker.walk().await;
        drop(walker);

        let mut aggregator = ReportAggregator::new();
        while let Some(event) = rx.recv().await {
            aggregator.apply(event);
        }
        (outcome, aggregator.finish(Duration::ZERO))
    }

    async fn walk(fx: &Fixture, sp: Option<u32>) -> (Result<(), PipelineError>, RunReport) {
        walk_with(fx, sp, false, StopSignal::new()).await
    }

    #[test]
    fn test_classify_entry() {
        let kind = classify_entry(PathBuf::from("/in/_drafts"), PathBuf::from("_drafts"), FsKind::Dir, "_");
        assert!(matches!(kind, EntryKind::Ignored));

        let kind = classify_entry(PathBuf::from("/in/a"), PathBuf::from("a"), FsKind::Dir, "_");
        assert!(matches!(kind, EntryKind::Directory { .. }));

        let kind = classify_entry(PathBuf::from("/in/a.JPG"), PathBuf::from("a.JPG"), FsKind::File, "_");
        assert!(matches!(kind, EntryKind::Image(ref s) if s.extension == "jpg"));

        let kind = classify_entry(PathBuf::from("/in/a.txt"), PathBuf::from("a.txt"), FsKind::File, "_");
        assert!(matches!(kind, EntryKind::Ignored));

        let kind = classify_entry(PathBuf::from("/in/_a.png"), PathBuf::from("_a.png"), FsKind::File, "_");
        assert!(matches!(kind, EntryKind::Image(_)));
    }

    #[test]
    fn test_keep_first_error_prefers_real_failures() {
        let mut slot = None;
        keep_first_error(&mut slot, PipelineError::Cancelled);
        keep_first_error(&mut slot, PipelineError::Config("real".to_string()));
        keep_first_error(&mut slot, PipelineError::Config("later".to_string()));
        assert!(matches!(slot, Some(PipelineError::Config(ref m)) if m == "real"));
    }

    #[tokio::test]
    async fn test_walk_mirrors_tree() {
        let fx = fixture(&["a.png", "notes.txt", "sub/b.JPG", "sub/deeper/c.webp", "empty/"]);
        let (outcome, report) = walk(&fx, None).await;
        outcome.unwrap();

        assert_eq!(report.total_files, 3);
        for dir in ["a", "sub/b", "sub/deeper/c"] {
            for name in ["index.avif", "index.webp"] {
                assert!(fx.output.join(dir).join(name).exists(), "{}/{} missing", dir, name);
            }
        }
        assert!(fx.output.join("a/index.png").exists());
        assert!(fx.output.join("sub/b/index.jpg").exists());
        assert!(!fx.output.join("notes").exists());
        assert!(!fx.output.join("empty").exists());
    }

    #[tokio::test]
    async fn test_report_order_is_depth_first_files_first() {
        let fx = fixture(&["z/one.png", "b.png", "a.png", "m/two.png", "m/inner/three.png", "m/k.png"]);
        let (outcome, report) = walk(&fx, None).await;
        outcome.unwrap();

        let order: Vec<_> = report.files.iter().map(|f| f.original_file.as_str()).collect();
        assert_eq!(
            order,
            ["a.png", "b.png", "m/k.png", "m/two.png", "m/inner/three.png", "z/one.png"]
        );
    }

    #[tokio::test]
    async fn test_reserved_prefix_directories_are_skipped() {
        let fx = fixture(&["keep.png", "_drafts/hidden.png", "_/x.png", "sub/_nested/y.png"]);
        let (outcome, report) = walk(&fx, None).await;
        outcome.unwrap();

        assert_eq!(report.total_files, 1);
        assert!(!fx.output.join("_drafts").exists());
        assert!(!fx.output.join("_").exists());
        assert!(!fx.output.join("sub").exists());
    }

    #[tokio::test]
    async fn test_small_viewport_only_for_wide_sources() {
        let fx = fixture(&["wide.png", "small.png"]);
        let (outcome, report) = walk(&fx, Some(768)).await;
        outcome.unwrap();

        assert!(fx.output.join("wide/index-sp.png").exists());
        assert!(fx.output.join("wide/index-sp.avif").exists());
        assert!(!fx.output.join("small/index-sp.png").exists());

        let counts: Vec<_> = report.files.iter().map(|f| f.formats.len()).collect();
        assert_eq!(counts, [3, 6]);
    }

    #[tokio::test]
    async fn test_unlistable_root_is_io_error() {
        let fx = fixture(&[]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let walker = TreeWalker::new(WalkContext {
            input_root: fx.input.join("missing"),
            output_root: fx.output.clone(),
            excluded_prefix: "_".to_string(),
            skip_dir: None,
            converter: FileConverter::new(Arc::new(MockCodec::new()), FormatPlanner::new(&fx.output, 70, None)),
            permits: Arc::new(Semaphore::new(1)),
            events: tx,
            stop: StopSignal::new(),
            keep_going: false,
        });
        assert!(matches!(walker.walk().await, Err(PipelineError::Io { .. })));
    }

    #[tokio::test]
    async fn test_base_name_collision_is_reported() {
        let fx = fixture(&["photo.jpg", "photo.png", "other/fine.png"]);
        let (outcome, _) = walk(&fx, None).await;
        match outcome {
            Err(PipelineError::OutputCollision { base, first, second, .. }) => {
                assert_eq!(base, "photo");
                assert_eq!(first, "photo.jpg");
                assert_eq!(second, "photo.png");
            }
            other => panic!("expected collision, got {:?}", other),
        }
        assert!(!fx.output.join("photo").exists());
    }

    #[tokio::test]
    async fn test_conversion_failure_aborts_run() {
        let fx = fixture(&["broken.png", "good.png"]);
        let (outcome, _) = walk(&fx, None).await;
        assert!(matches!(outcome, Err(PipelineError::Conversion { .. })));
    }

    #[tokio::test]
    async fn test_keep_going_records_failures() {
        let fx = fixture(&["broken.png", "good.png", "sub/broken-too.png"]);
        let (outcome, report) = walk_with(&fx, None, true, StopSignal::new()).await;
        outcome.unwrap();

        assert_eq!(report.total_files, 3);
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].original_file, "good.png");
        let failed: Vec<_> = report.failures.iter().map(|f| f.original_file.as_str()).collect();
        assert_eq!(failed, ["broken.png", "sub/broken-too.png"]);
    }

    #[tokio::test]
    async fn test_raised_stop_signal_cancels_pending_files() {
        let fx = fixture(&["a.png", "b.png"]);
        let stop = StopSignal::new();
        stop.raise();
        let (outcome, report) = walk_with(&fx, None, false, stop).await;

        assert!(matches!(outcome, Err(PipelineError::Cancelled)));
        assert!(report.files.is_empty());
        assert!(!fx.output.join("a").exists());
    }

    #[tokio::test]
    async fn test_output_inside_input_is_skipped() {
        let fx = fixture(&["a.png", "public/"]);
        let output = fx.input.join("public").canonicalize().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let walker = TreeWalker::new(WalkContext {
            input_root: fx.input.clone(),
            output_root: output.clone(),
            excluded_prefix: "_".to_string(),
            skip_dir: Some(output.clone()),
            converter: FileConverter::new(Arc::new(MockCodec::new()), FormatPlanner::new(&output, 70, None)),
            permits: Arc::new(Semaphore::new(1)),
            events: tx,
            stop: StopSignal::new(),
            keep_going: false,
        });
        walker.walk().await.unwrap();
        drop(walker);

        let mut discovered = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, ReportEvent::Discovered) {
                discovered += 1;
            }
        }
        assert_eq!(discovered, 1);
        assert!(output.join("a/index.avif").exists());
    }

    #[tokio::test]
    async fn test_undecodable_sources_do_not_stop_the_run() {
        let fx = fixture(&["hero.avif", "logo.png", "sub/banner.avif"]);
        let codec = MockCodec::new().without_decoder("avif");
        let (outcome, report) = walk_codec(&fx, codec, None, false, StopSignal::new()).await;
        outcome.unwrap();

        assert_eq!(report.total_files, 3);
        let converted: Vec<_> = report.files.iter().map(|f| f.original_file.as_str()).collect();
        assert_eq!(converted, ["logo.png"]);
        let failed: Vec<_> = report.failures.iter().map(|f| f.original_file.as_str()).collect();
        assert_eq!(failed, ["hero.avif", "sub/banner.avif"]);
        assert!(report.failures[0].error.contains("No decoder for .avif"));
        assert!(fx.output.join("logo/index.webp").exists());
        assert!(!fx.output.join("hero").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_is_not_followed() {
        let fx = fixture(&["a/p.png"]);
        std::os::unix::fs::symlink(&fx.input, fx.input.join("a/loop")).unwrap();

        let (outcome, report) = walk(&fx, None).await;
        outcome.unwrap();

        assert_eq!(report.total_files, 1);
        assert!(fx.output.join("a/p/index.png").exists());
        assert!(!fx.output.join("a/loop").exists());
        assert_eq!(
            FileManager::count_images(&fx.input, "_", None),
            report.total_files
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_to_sibling_is_followed() {
        let fx = fixture(&["shared/p.png", "site/"]);
        std::os::unix::fs::symlink(fx.input.join("shared"), fx.input.join("site/linked")).unwrap();

        let (outcome, report) = walk(&fx, None).await;
        outcome.unwrap();

        assert_eq!(report.total_files, 2);
        assert!(fx.output.join("site/linked/p/index.avif").exists());
    }
}
