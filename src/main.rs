//! sketchset CLI: serve the drawing page and export sketch datasets.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use sketchset::artifacts::Artifact;
use sketchset::config::Config;
use sketchset::dataset::npy::{self, NpyHeader};
use sketchset::store::{self, Backend};

#[derive(Parser)]
#[command(name = "sketchset", version, about = "Hand-drawn sketch dataset collector")]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend (relational, bucket, filesystem).
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Data directory for the relational and filesystem backends.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory receiving X.npy and y.npy.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    #[cfg(feature = "server")]
    Serve {
        /// Interface to bind.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Build the dataset from stored samples and write the artifacts.
    Prepare,

    /// Show per-label sample counts.
    Stats,

    /// Show the shape of the last exported artifacts.
    Inspect,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config)?;
        }

        Commands::Prepare => {
            if config.backend == Backend::Bucket {
                tracing::warn!("the bucket backend is process-local; an offline export is always empty");
            }
            let store = store::open(config.backend, &config.data_dir)?;
            let artifacts = config.artifacts();
            let report = artifacts.export(store.as_ref(), &config.dataset_options())?;
            println!(
                "OK! {} samples ({} skipped), {}x{} px, written to {}",
                report.samples,
                report.skipped,
                report.height,
                report.width,
                artifacts.dir().display()
            );
            for (label, count) in &report.groups {
                println!("  {label}: {count}");
            }
        }

        Commands::Stats => {
            let store = store::open(config.backend, &config.data_dir)?;
            let index = store.index()?;
            if index.is_empty() {
                println!("No samples stored ({} backend).", config.backend);
            } else {
                println!("Samples ({}, {} backend):", index.sample_count(), config.backend);
                for group in index.groups() {
                    println!("  {}: {}", group.labels, group.samples.len());
                }
            }
        }

        Commands::Inspect => {
            let artifacts = config.artifacts();
            let images = artifacts.read(Artifact::Images)?;
            let labels = artifacts.read(Artifact::Labels)?;
            let (Some(images), Some(labels)) = (images, labels) else {
                miette::bail!(
                    "no artifacts in {}; run `sketchset prepare` first",
                    artifacts.dir().display()
                );
            };
            let (header, _) = NpyHeader::parse(&images)?;
            println!(
                "{}: dtype {} shape {:?}",
                Artifact::Images.file_name(),
                header.descr,
                header.shape
            );
            let labels = npy::read_unicode(&labels)?;
            println!("{}: {} labels", Artifact::Labels.file_name(), labels.len());
        }
    }

    Ok(())
}

#[cfg(feature = "server")]
fn serve(config: Config) -> Result<()> {
    use sketchset::server::{self, AppState};

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(async move {
        let store = store::open(config.backend, &config.data_dir)?;
        let state = AppState::new(store, config.artifacts(), config.dataset_options())
            .with_max_upload_bytes(config.max_upload_bytes);
        let app = server::router(state);

        let addr = config.addr();
        let listener = tokio::net::TcpListener::bind(&addr).await.into_diagnostic()?;
        tracing::info!(backend = %config.backend, "sketchset listening on {addr}");
        server::serve(listener, app).await.into_diagnostic()
    })
}
