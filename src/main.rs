//! Presign Uploadr - direct-to-storage uploads through presigned URLs
//!
//! `upload` sends one local file; `serve` runs the presign service.

use anyhow::Context;
use clap::{Parser, Subcommand};
use presign_uploadr::config::Config;
use presign_uploadr::metadata::HttpMetadataStore;
use presign_uploadr::presign::{PresignPolicy, PresignService, S3Presigner};
use presign_uploadr::server::PresignServer;
use presign_uploadr::signing::HttpUrlSigner;
use presign_uploadr::upload::{format_size, HttpTransfer, UploadClient, UploadRequest};
use presign_uploadr::UploadOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Presign Uploadr - upload files straight to object storage
#[derive(Parser, Debug)]
#[command(name = "presign-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file through a presigned URL
    Upload {
        /// File to upload
        file: PathBuf,

        /// Record the upload against this owner
        #[arg(short, long)]
        owner: Option<String>,

        /// Content type sent with the file
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// Run the presign service
    Serve,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting Presign Uploadr v{}", presign_uploadr::VERSION);

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    info!("Loaded configuration from {:?}", args.config);

    match args.command {
        Command::Upload {
            file,
            owner,
            content_type,
        } => {
            let succeeded = upload(&config, file, owner, &content_type).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Command::Serve => serve(&config).await?,
    }

    Ok(())
}

async fn upload(
    config: &Config,
    file: PathBuf,
    owner: Option<String>,
    content_type: &str,
) -> anyhow::Result<bool> {
    let (upload_config, signing_config) = config.client_settings()?;
    let signer = HttpUrlSigner::new(
        &signing_config.url,
        Duration::from_secs(signing_config.timeout_seconds),
    )?;

    let mut client = UploadClient::new(
        upload_config.clone(),
        Arc::new(signer),
        Arc::new(HttpTransfer::new()?),
    );
    if let Some(ref metadata) = config.metadata {
        let store = HttpMetadataStore::new(
            &metadata.url,
            Duration::from_secs(metadata.timeout_seconds),
        )?;
        client = client.with_metadata(Arc::new(store));
    }

    client.on_progress(|progress| eprint!("\r{:>3}%", progress.percent_complete));

    let mut request = UploadRequest::from_path(&file, content_type).await?;
    if let Some(owner) = owner {
        request = request.with_owner(owner);
    }
    println!("{} ({})", request.file_name, format_size(request.size_bytes));

    client.select(request);
    let outcome = client.upload_selected().await;
    eprintln!();

    if let Some(message) = client.state().message {
        println!("{}", message.text);
    }

    Ok(match outcome {
        UploadOutcome::Success { storage_url, .. } => {
            println!("{}", storage_url);
            true
        }
        UploadOutcome::Failure { .. } => false,
    })
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let server_config = config.presign_server.clone().unwrap_or_default();

    let presigner = S3Presigner::from_config(&server_config).await;
    let policy = PresignPolicy::new(
        &server_config.allowed_buckets,
        &server_config.allowed_key_prefixes,
    );
    let service = PresignService::new(policy, Arc::new(presigner));

    let server = PresignServer::bind(&server_config.address, service).await?;
    server.run().await?;

    Ok(())
}
