//! Product photo cleanup CLI
//!
//! Removes the background, trims to content and optionally publishes the
//! result to Supabase Storage.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    config::ProcessorConfig,
    error::BgTrimError,
    models::{lookup_catalogue, MODEL_CATALOGUE},
    processor::ProductImageProcessor,
    remover::{provision_model, BackendFactory, DefaultBackendFactory, ModelBackgroundRemover},
    settings::StorageSettings,
    storage::{check_connection, SupabaseStorage},
    tracing_config::{spans, TracingConfig, TracingFormat, TracingGuard},
    types::{CleanupReport, TrimOutcome, UploadOutcome},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Instrument};

/// Remove the background from a product photo and trim it to content
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgtrim")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file
    #[arg(
        value_name = "IMAGE",
        required_unless_present_any = ["check_supabase", "only_download", "list_models", "show_providers"]
    )]
    pub image: Option<PathBuf>,

    /// Output name, used for `<NAME>_clean.png` and the uploaded object. Without it nothing is uploaded
    #[arg(short, long)]
    pub name: Option<String>,

    /// Check the Supabase connection, list buckets and exit
    #[arg(long)]
    pub check_supabase: bool,

    /// Model name from the catalogue or path to an .onnx file
    #[arg(short, long, default_value = crate::models::DEFAULT_MODEL)]
    pub model: String,

    /// Expected SHA-256 of the model file
    #[arg(long, value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of threads (0 = let the runtime decide)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Alpha matting foreground threshold
    #[arg(long, default_value_t = 240)]
    pub fg_threshold: u8,

    /// Alpha matting background threshold
    #[arg(long, default_value_t = 10)]
    pub bg_threshold: u8,

    /// Alpha matting erosion size in pixels
    #[arg(long, default_value_t = 10)]
    pub erode_size: u32,

    /// Use the raw model mask without alpha matting
    #[arg(long)]
    pub no_alpha_matting: bool,

    /// Pixels kept around the detected foreground
    #[arg(long, default_value_t = crate::trim::DEFAULT_PADDING)]
    pub padding: u32,

    /// Do not write `_debug_mask.png` next to the input
    #[arg(long)]
    pub no_debug_mask: bool,

    /// Settings file to load instead of `.env`
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Download the model and exit
    #[arg(long)]
    pub only_download: bool,

    /// List catalogue models and their cache state, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Show compiled backends and execution providers, then exit
    #[arg(long)]
    pub show_providers: bool,

    /// Plain log output without colours
    #[arg(long)]
    pub plain_logs: bool,

    /// Also write logs to this file
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = uuid::Uuid::new_v4().to_string();
    let _tracing_guard = init_tracing(&cli, &session_id)?;

    load_env_file(&cli)?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    if cli.list_models {
        return list_models();
    }

    if cli.check_supabase {
        check_supabase(StorageSettings::from_env()).await;
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if cli.only_download {
        return download_model_only(&config).await;
    }

    let Some(image) = cli.image.as_ref() else {
        anyhow::bail!("An input image is required");
    };

    let session = spans::session(
        &session_id,
        &config.removal.model_spec.source.display_name(),
        &cli.execution_provider,
    );

    // Pipeline failures are reported, not turned into exit codes
    match run(&cli, config, image).instrument(session).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            error!(error = %e, "Processing failed");
            eprintln!("Error processing image: {e:#}");
        },
    }

    Ok(())
}

fn init_tracing(cli: &Cli, session_id: &str) -> Result<TracingGuard> {
    let format = if cli.plain_logs {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };

    #[allow(unused_mut)]
    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format)
        .with_session_id(session_id);

    if let Ok(filter) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(filter);
    }

    #[cfg(feature = "tracing-files")]
    if let Some(path) = &cli.log_file {
        config = config.with_output(crate::tracing_config::TracingOutput::ConsoleAndFile(
            path.clone(),
        ));
    }

    config.init().context("Failed to initialize tracing subscriber")
}

/// Load `--env-file`, or `.env` from the working directory when present
fn load_env_file(cli: &Cli) -> Result<()> {
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            info!(path = %path.display(), "Loaded settings file");
        },
        None => match dotenv::dotenv() {
            Ok(path) => info!(path = %path.display(), "Loaded settings file"),
            Err(e) if e.not_found() => {},
            Err(e) => warn!(error = %e, "Ignoring unreadable .env file"),
        },
    }
    Ok(())
}

async fn run(cli: &Cli, config: ProcessorConfig, image: &Path) -> Result<CleanupReport> {
    // A mistyped path must not be reported as a model download failure
    if !image.is_file() {
        return Err(BgTrimError::InputNotFound(image.to_path_buf()).into());
    }

    let removal = config.removal.clone();
    let model_name = removal.model_spec.source.display_name();
    let provider =
        ExecutionProviderManager::provider_to_string(removal.backend_type, removal.execution_provider);

    let remover = async {
        let manager = provision_model(&removal, true).await?;
        ModelBackgroundRemover::new(removal.clone(), manager)
    }
    .instrument(spans::model_loading(&model_name, &provider))
    .await
    .context("Failed to load background removal model")?;

    let storage = StorageSettings::from_env();
    if cli.name.is_some() && storage.is_none() {
        warn!("SUPABASE_URL or key missing, the result will only be saved locally");
    }

    let mut processor = ProductImageProcessor::new(config, Box::new(remover))?
        .with_supabase(storage)
        .context("Failed to create storage client")?;

    let report = processor.process_file(image, cli.name.as_deref()).await?;
    Ok(report)
}

fn print_report(report: &CleanupReport) {
    match &report.trim {
        TrimOutcome::Trimmed(bbox) => println!("Trimmed to {bbox}"),
        TrimOutcome::NoForeground => println!("Warning: no foreground found, image left untrimmed"),
        TrimOutcome::Failed(reason) => println!("Warning: trimming failed ({reason}), image left untrimmed"),
        TrimOutcome::NoAlpha => println!("Warning: no alpha channel in processed image, original kept"),
    }

    if let Some(path) = &report.debug_mask_path {
        println!("Debug mask: {}", path.display());
    }

    match &report.upload {
        UploadOutcome::Uploaded {
            strategy,
            public_url,
            ..
        } => {
            println!("Uploaded to Supabase ({strategy}) as: {}", report.output_name);
            println!("Public URL: {public_url}");
        },
        UploadOutcome::Failed {
            object_path,
            attempts,
        } => {
            println!("Failed to upload {object_path} to Supabase:");
            for attempt in attempts {
                println!("  {}: {}", attempt.strategy, attempt.error);
            }
        },
        UploadOutcome::Skipped(reason) => println!("Upload skipped: {reason}"),
    }

    let (width, height) = report.output_dimensions;
    println!(
        "Success! Processed image saved locally as: {} ({width}x{height}, {} ms)",
        report.output_path.display(),
        report.timings.total_ms
    );
}

async fn check_supabase(settings: Option<StorageSettings>) {
    let Some(settings) = settings else {
        println!("Supabase credentials not found.");
        println!("Set SUPABASE_URL and SUPABASE_SERVICE_KEY (or SUPABASE_KEY) in the environment or .env");
        return;
    };

    println!("Checking Supabase connection...");
    println!("URL: {}", settings.url);
    println!("Key: {}", settings.key_preview());

    let span = spans::storage_check(&settings.url, &settings.bucket);
    let result = async {
        let client = SupabaseStorage::new(settings.clone())?;
        check_connection(&client, &settings.bucket).await
    }
    .instrument(span)
    .await;

    match result {
        Ok(report) => {
            println!("Connection successful. Found {} buckets:", report.buckets.len());
            for bucket in &report.buckets {
                let visibility = if bucket.public { "public" } else { "private" };
                println!("  - {} ({visibility})", bucket.name);
            }
            if report.target_bucket_exists {
                println!("Target bucket '{}' exists", settings.bucket);
            } else {
                println!("Warning: target bucket '{}' not found", settings.bucket);
            }
        },
        Err(e) => {
            error!(error = %e, "Supabase connection check failed");
            println!("Error connecting to Supabase: {e}");
        },
    }
}

async fn download_model_only(config: &ProcessorConfig) -> Result<()> {
    let model_name = config.removal.model_spec.source.display_name();
    println!("Preparing model: {model_name}");

    let manager = provision_model(&config.removal, true)
        .await
        .with_context(|| format!("Failed to download model '{model_name}'"))?;

    let info = manager.get_info().context("Failed to read model info")?;
    println!("Model ready: {}", manager.get_model_path().display());
    println!("  Size: {}", format_size(info.size_bytes as u64));
    Ok(())
}

fn list_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    println!("Model cache: {}", cache.get_current_cache_dir().display());
    println!();
    for entry in MODEL_CATALOGUE {
        let status = if cache.is_model_cached(entry.name) {
            "cached"
        } else {
            "not downloaded"
        };
        let side = entry.input_size;
        println!(
            "  {:<20} {side}x{side}  {status:<15} {}",
            entry.name, entry.description
        );
    }

    let extra: Vec<_> = cache
        .scan_cached_models()
        .context("Failed to list cached models")?
        .into_iter()
        .filter(|m| lookup_catalogue(&m.model_id).is_none())
        .collect();
    if !extra.is_empty() {
        println!();
        println!("Other files in the cache:");
        for model in extra {
            println!("  {:<20} {}", model.model_id, format_size(model.size_bytes));
        }
    }

    Ok(())
}

fn show_provider_diagnostics() {
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!();
    println!("Compiled backends:");
    for backend in DefaultBackendFactory.available_backends() {
        let providers = match backend {
            crate::config::BackendType::Onnx => "auto, cpu, cuda, coreml",
            crate::config::BackendType::Tract => "cpu",
        };
        println!("  {backend}: {providers}");
    }

    println!();
    println!("Usage:");
    println!("  --execution-provider onnx:auto    # best available ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Apple CoreML");
    println!("  --execution-provider tract:cpu    # pure Rust backend");
}
