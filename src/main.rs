//! # Media Derivatives - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (`RUST_LOG` o `--verbose`)
//! - Configurazione a strati: default, file JSON, variabili d'ambiente, flag CLI
//! - Avvio della pipeline e stampa del report
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-derivatives --input content/images --output public/images --quality 80 --sp-width 768
//! INPUT_DIR=content OUTPUT_DIR=public SP_IMAGE_WIDTH=768 media-derivatives
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use media_derivatives::{
    json_output::JsonMessage,
    report::log_report,
    Config, Pipeline, RawConfig, StopSignal,
};

#[derive(Parser)]
#[command(name = "media-derivatives")]
#[command(about = "Generate AVIF, WebP and small-viewport derivatives for a tree of images")]
struct Args {
    /// Source image tree [env: INPUT_DIR]
    #[arg(short, long)]
    input: Option<String>,

    /// Destination tree, created if missing [env: OUTPUT_DIR]
    #[arg(short, long)]
    output: Option<String>,

    /// Quality for AVIF/WebP and small-viewport re-encodes, 1-100 [env: QUALITY]
    #[arg(short, long)]
    quality: Option<String>,

    /// Sources wider than this also get index-sp.* variants, 0 disables [env: SP_IMAGE_WIDTH]
    #[arg(long)]
    sp_width: Option<String>,

    /// Number of files converted in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip directories whose name starts with this prefix ("" disables)
    #[arg(long)]
    exclude_prefix: Option<String>,

    /// Record conversion failures and continue with the other files
    #[arg(long)]
    keep_going: bool,

    /// AVIF encoder speed (1 = slowest/best, 10 = fastest)
    #[arg(long)]
    avif_speed: Option<u8>,

    /// JSON configuration file, overridden by flags and environment
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output progress and status as JSON for programmatic use
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn raw(&self) -> RawConfig {
        RawConfig {
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            quality: self.quality.clone(),
            sp_image_width: self.sp_width.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let json = args.json;
    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if json {
                JsonMessage::error(e.to_string()).emit();
            } else {
                error!("❌ {}", e);
            }
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let base = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    // flags win over the environment
    let raw = args.raw().or(RawConfig::from_env());
    let mut config = Config::resolve(raw, base)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(prefix) = args.exclude_prefix {
        config.excluded_dir_prefix = prefix;
    }
    if let Some(speed) = args.avif_speed {
        config.avif_speed = speed;
    }
    config.keep_going |= args.keep_going;
    config.json_output |= args.json;

    let json = config.json_output;
    let stop = StopSignal::new();
    let pipeline = Pipeline::new(config)?
        .with_stop_signal(stop.clone())
        .with_progress(true);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing files in progress...");
            stop.raise();
        }
    });

    let report = pipeline.run().await?;
    if !json {
        log_report(&report);
    }

    if !report.failures.is_empty() {
        return Err(anyhow::anyhow!(
            "{} of {} files failed to convert",
            report.failures.len(),
            report.total_files
        ));
    }

    Ok(())
}
