#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgtrim
//!
//! Background removal and edge trimming for product photos, with optional
//! publishing to Supabase Storage.
//!
//! A run is strictly sequential:
//!
//! 1. decode the input (extension first, content sniffing as fallback)
//! 2. remove the background with a U2-Net family model
//! 3. dilate the alpha mask and recombine it with the full-resolution colours
//! 4. crop to the largest foreground region plus padding
//! 5. write `<name>_clean.png` next to the input and optionally upload it
//!
//! Recoverable conditions never surface as errors. They are reported through
//! [`CleanupReport`], [`TrimOutcome`] and [`UploadOutcome`].
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `tract` (default): pure Rust backend
//! - `cli` (default): the `bgtrim` binary
//! - `webp-support` (default): WebP decoding
//! - `avif-support`: AVIF decoding through dav1d, used by the content-sniffing fallback
//! - `tracing-files`: mirror logs into a file
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use bgtrim::{
//!     provision_model, ModelBackgroundRemover, ProcessorConfig, ProductImageProcessor,
//!     StorageSettings,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProcessorConfig::default();
//! let model = provision_model(&config.removal, false).await?;
//! let remover = ModelBackgroundRemover::new(config.removal.clone(), model)?;
//!
//! let mut processor = ProductImageProcessor::new(config, Box::new(remover))?
//!     .with_supabase(StorageSettings::from_env())?;
//! let report = processor.process_file("photo.jpg", Some("blue-dream")).await?;
//! println!("{}", report.output_path.display());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod mask;
pub mod matting;
pub mod models;
pub mod processor;
pub mod remover;
pub mod services;
pub mod settings;
pub mod storage;
pub mod tracing_config;
pub mod trim;
pub mod types;
pub mod utils;

pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{
    AlphaMattingConfig, BackendType, ExecutionProvider, ProcessorConfig, ProcessorConfigBuilder,
    RemovalConfig, RemovalConfigBuilder,
};
pub use download::ModelDownloader;
pub use error::{BgTrimError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelManager, ModelSource, ModelSpec};
pub use processor::ProductImageProcessor;
pub use remover::{
    provision_model, BackendFactory, BackgroundRemover, DefaultBackendFactory,
    ModelBackgroundRemover,
};
pub use services::ImageIOService;
pub use settings::StorageSettings;
pub use storage::{
    check_connection, upload_with_fallback, BucketInfo, ConnectionReport, StorageClient,
    SupabaseStorage,
};
pub use tracing_config::{TracingConfig, TracingFormat, TracingOutput};
pub use trim::{trim_edges, TrimResult};
pub use types::{
    BoundingBox, CleanupReport, ProcessingTimings, SkipReason, TrimOutcome, UploadAttempt,
    UploadOutcome, UploadStrategy,
};
pub use utils::{ExecutionProviderManager, ModelSpecParser};
