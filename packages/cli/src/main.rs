#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `titanic`: upload files and directory trees to an S3 bucket or a Glacier
//! vault, skipping what is already there and verifying what was sent.
//!
//! Uses `indicatif-log-bridge` (via [`titanic_cli_utils::init_logger`]) so
//! that log lines and transfer bars never fight for the terminal.

mod config;

use std::io::IsTerminal as _;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use titanic_cli_utils::IndicatifFactory;
use titanic_glacier::{DEFAULT_PARTS, GlacierStore};
use titanic_s3::{S3Store, TransferConfig};
use titanic_upload::{OverwriteMode, RemoteStore, UploadOptions, Uploader, Walker};

#[derive(Parser, Debug)]
#[command(name = "titanic", about = "Upload files to S3 or Glacier and verify them")]
struct Cli {
    /// TOML file with region, credentials and bucket
    #[arg(short, long, default_value = "titanic.toml")]
    config: PathBuf,

    /// When to replace an existing object: never, older, checksum, footgun
    #[arg(short, long, default_value_t = OverwriteMode::Older)]
    overwrite: OverwriteMode,

    /// Parts uploaded concurrently per file
    #[arg(short, long, default_value_t = default_threads())]
    threads: usize,

    /// Print what would be uploaded without touching the remote
    #[arg(short, long)]
    justprint: bool,

    /// Path to leave out of the walk (repeatable)
    #[arg(short, long = "skip", value_name = "PATH")]
    skip: Vec<PathBuf>,

    /// Upload into this Glacier vault instead of the configured bucket
    #[arg(short = 'V', long)]
    vault: Option<String>,

    /// Target part count for vault uploads
    #[arg(short, long, default_value_t = DEFAULT_PARTS)]
    parts: u64,

    /// Files or directories to upload
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get) * 5
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = titanic_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = config::load(&cli.config)?;
    log::debug!("Loaded {}: {config:?}", cli.config.display());

    let store: Arc<dyn RemoteStore> = match &cli.vault {
        Some(vault) => {
            if cli.overwrite.needs_lookup() {
                log::info!(
                    "Vaults have no per-key lookup; overwrite={} uploads every file",
                    cli.overwrite
                );
            }
            Arc::new(GlacierStore::new(&config, vault, cli.parts, cli.threads))
        }
        None => Arc::new(S3Store::new(
            &config,
            TransferConfig {
                concurrency: cli.threads,
                ..TransferConfig::default()
            },
        )),
    };

    let mut uploader = Uploader::new(
        store,
        UploadOptions {
            mode: cli.overwrite,
            dry_run: cli.justprint,
            prefix: config.prefix.clone(),
        },
    );
    if std::io::stderr().is_terminal() {
        uploader = uploader.with_progress(Arc::new(IndicatifFactory::new(multi)));
    }

    let stats = uploader.run(Walker::new(&cli.files, &cli.skip)).await?;
    log::info!("Done, {} files: {stats}", stats.total());

    Ok(())
}
