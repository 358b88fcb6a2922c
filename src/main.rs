//! vidup - upload a video file through the resumable upload protocol

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidup::account::{AccountStore, AccountTokens};
use vidup::config::{Config, ConfigOptions};
use vidup::output::Envelope;
use vidup::upload::metadata::{
    DEFAULT_CATEGORY, DEFAULT_DESCRIPTION, DEFAULT_PRIVACY_STATUS, DEFAULT_TITLE,
};
use vidup::upload::{
    build_client, parse_keywords, DriverError, Outcome, ResumableSession, UploadDriver,
    UploadRequest, VideoMetadata,
};

#[derive(Parser, Debug)]
#[command(name = "vidup")]
#[command(about = "Upload a video with resumable, retrying transfers")]
struct Args {
    /// Video file to upload
    #[arg(long)]
    file: PathBuf,

    /// Video title
    #[arg(long, default_value = DEFAULT_TITLE)]
    title: String,

    /// Video description
    #[arg(long, default_value = DEFAULT_DESCRIPTION)]
    description: String,

    /// Numeric video category
    #[arg(long, default_value = DEFAULT_CATEGORY)]
    category: String,

    /// Video keywords, comma separated
    #[arg(long, default_value = "")]
    keywords: String,

    /// Video privacy status: public, private or unlisted
    #[arg(
        long = "privacyStatus",
        default_value = DEFAULT_PRIVACY_STATUS,
        value_parser = ["public", "private", "unlisted"]
    )]
    privacy_status: String,

    /// Account login whose stored credential is used
    #[arg(long)]
    account: String,

    /// Directory holding `<login>.json` credential files
    #[arg(long)]
    accounts_dir: Option<PathBuf>,

    /// Resumable upload endpoint
    #[arg(long)]
    upload_url: Option<String>,

    /// Bytes per request (multiple of 256 KiB); whole file when omitted
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Retries allowed for the whole transfer
    #[arg(long)]
    max_retries: Option<u32>,

    /// MIME type announced for the file
    #[arg(long)]
    mime_type: Option<String>,
}

fn main() {
    // Logs go to stderr; stdout carries the JSON result
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(outcome) => Envelope::from(&outcome).print(),
        Err(e) => {
            if let Some(DriverError::RetriesExhausted { .. }) = e.downcast_ref::<DriverError>() {
                error!("{}", e);
                eprintln!("No longer attempting to retry.");
                std::process::exit(1);
            }
            error!("Upload failed: {:#}", e);
            Envelope::failure(format!("{:#}", e)).print();
        }
    }
}

fn run(args: &Args) -> Result<Outcome> {
    if !args.file.is_file() {
        return Err(anyhow!(
            "Please specify a valid file using the --file= parameter."
        ));
    }

    let cli = ConfigOptions {
        upload_url: args.upload_url.clone(),
        accounts_dir: args.accounts_dir.clone(),
        max_retries: args.max_retries,
        chunk_size: args.chunk_size,
        mime_type: args.mime_type.clone(),
    };
    let config = Config::new(cli.or(ConfigOptions::from_env()))?;

    let client = build_client().context("failed to build HTTP client")?;
    let store = AccountStore::new(&config.accounts_dir);
    let tokens = AccountTokens::open(store, client.clone(), &args.account)?;

    let metadata = VideoMetadata {
        title: args.title.clone(),
        description: args.description.clone(),
        category_id: args.category.clone(),
        tags: parse_keywords(&args.keywords),
        privacy_status: args.privacy_status.clone(),
    };

    let request = UploadRequest {
        endpoint: config.upload_url.clone(),
        metadata: metadata.to_json(),
        file: args.file.clone(),
        mime_type: config.mime_type.clone(),
        chunk_size: config.chunk_size,
    };

    info!(
        "Uploading {} as {:?} for {}",
        args.file.display(),
        metadata.title,
        tokens.account()
    );

    let mut session = ResumableSession::new(client, tokens, request)
        .with_context(|| format!("cannot stat {}", args.file.display()))?;
    let mut driver = UploadDriver::new(config.retry.clone());
    Ok(driver.run(&mut session)?)
}
