//! Product image cleanup pipeline
//!
//! [`ProductImageProcessor`] drives one input file through every stage:
//! load, background removal, mask dilation, trimming, local write and the
//! optional upload. Only a missing or undecodable input aborts a run; every
//! later problem is recorded in the returned [`CleanupReport`].

use crate::{
    config::ProcessorConfig,
    error::{BgTrimError, Result},
    mask,
    remover::BackgroundRemover,
    services::{ImageIOService, OutputPaths, TempFileGuard},
    settings::StorageSettings,
    storage::{check_connection, upload_with_fallback, StorageClient, SupabaseStorage},
    trim::trim_edges,
    types::{CleanupReport, ProcessingTimings, SkipReason, TrimOutcome, UploadOutcome},
};
use image::DynamicImage;
use instant::Instant;
use std::path::Path;
use tracing::{info, instrument, span, warn, Level};

/// Storage client together with the settings it was built from
struct StorageTarget {
    client: Box<dyn StorageClient>,
    settings: StorageSettings,
}

/// Sequential cleanup pipeline for product photos
pub struct ProductImageProcessor {
    config: ProcessorConfig,
    remover: Box<dyn BackgroundRemover>,
    storage: Option<StorageTarget>,
}

impl std::fmt::Debug for ProductImageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductImageProcessor")
            .field("config", &self.config)
            .field("remover", &self.remover.name())
            .field("storage", &self.storage.as_ref().map(|s| &s.settings))
            .finish()
    }
}

impl ProductImageProcessor {
    /// Create a processor without remote storage
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: ProcessorConfig, remover: Box<dyn BackgroundRemover>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            remover,
            storage: None,
        })
    }

    /// Attach a storage client used for uploads
    #[must_use]
    pub fn with_storage(mut self, client: Box<dyn StorageClient>, settings: StorageSettings) -> Self {
        self.storage = Some(StorageTarget { client, settings });
        self
    }

    /// Attach Supabase storage when credentials are present
    ///
    /// # Errors
    /// - HTTP client construction failures
    pub fn with_supabase(self, settings: Option<StorageSettings>) -> Result<Self> {
        match settings {
            Some(settings) => {
                let client = SupabaseStorage::new(settings.clone())?;
                Ok(self.with_storage(Box::new(client), settings))
            },
            None => Ok(self),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run the full pipeline on one file
    ///
    /// `label` names both the local `<label>_clean.png` and the remote object.
    /// Without it the input's file stem is used locally and nothing is uploaded.
    ///
    /// # Errors
    /// - [`BgTrimError::InputNotFound`] for a missing input
    /// - [`BgTrimError::UnsupportedFormat`] when no decoder accepts the input
    /// - Background removal failures
    /// - Failure to write the clean output
    #[instrument(skip(self, input_path), fields(input = %input_path.as_ref().display()))]
    pub async fn process_file<P: AsRef<Path>>(
        &mut self,
        input_path: P,
        label: Option<&str>,
    ) -> Result<CleanupReport> {
        let input_path = input_path.as_ref();
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        if !input_path.is_file() {
            return Err(BgTrimError::InputNotFound(input_path.to_path_buf()));
        }

        let output_name = label.map_or_else(|| file_stem(input_path), str::to_string);
        let paths = OutputPaths::for_input(input_path, &output_name);

        if let Ok(metadata) = std::fs::metadata(input_path) {
            info!(
                size_mb = format!("{:.2}", metadata.len() as f64 / (1024.0 * 1024.0)),
                output_name = %output_name,
                "Processing image"
            );
        }
        if label.is_none() {
            info!("No name provided, the result will not be uploaded");
        }

        let decode_start = Instant::now();
        let input = ImageIOService::load_image(input_path)?;
        info!(
            width = input.width(),
            height = input.height(),
            color = ?input.color(),
            "Image decoded"
        );

        // Full-resolution colour source, read back through a lossless scratch copy
        let (color_source, _temp_guard) = Self::stage_color_source(&input, &paths);
        timings.image_decode_ms = decode_start.elapsed().as_millis() as u64;

        let removal_start = Instant::now();
        let removed = {
            let _span = span!(Level::INFO, "background_removal", remover = %self.remover.name())
                .entered();
            self.remover.remove(&input)?
        };
        timings.removal_ms = removal_start.elapsed().as_millis() as u64;

        let debug_mask_path = if self.config.keep_debug_mask {
            match ImageIOService::save_png(&removed, &paths.debug_mask) {
                Ok(()) => {
                    info!(path = %paths.debug_mask.display(), "Saved debug mask");
                    Some(paths.debug_mask.clone())
                },
                Err(e) => {
                    warn!(error = %e, "Could not save debug mask");
                    None
                },
            }
        } else {
            None
        };

        let (clean, trim) = match mask::extract_alpha(&removed) {
            Some(alpha) => {
                let post_start = Instant::now();
                let dilated = mask::dilate(&alpha, self.config.dilation_kernel);
                let composite =
                    DynamicImage::ImageRgba8(mask::composite(&color_source, &dilated));
                timings.postprocessing_ms = post_start.elapsed().as_millis() as u64;

                let trim_start = Instant::now();
                let trimmed = {
                    let _span = span!(Level::DEBUG, "trim", padding = self.config.trim_padding)
                        .entered();
                    trim_edges(composite, self.config.trim_padding)
                };
                timings.trim_ms = trim_start.elapsed().as_millis() as u64;
                (trimmed.image, trimmed.outcome)
            },
            None => {
                warn!("No alpha channel found in the processed image, using the original");
                (color_source, TrimOutcome::NoAlpha)
            },
        };

        let encode_start = Instant::now();
        ImageIOService::save_png(&clean, &paths.clean)?;
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;
        info!(
            path = %paths.clean.display(),
            width = clean.width(),
            height = clean.height(),
            "Saved clean image"
        );

        let upload_start = Instant::now();
        let upload = self.publish(&clean, label).await;
        timings.upload_ms = upload_start.elapsed().as_millis() as u64;

        timings.total_ms = total_start.elapsed().as_millis() as u64;

        Ok(CleanupReport {
            input_path: input_path.to_path_buf(),
            output_name,
            output_path: paths.clean,
            debug_mask_path,
            output_dimensions: (clean.width(), clean.height()),
            trim,
            upload,
            timings,
        })
    }

    /// Write the decoded input to the scratch PNG and read it back
    ///
    /// Any failure falls back to the in-memory image. The guard deletes the
    /// scratch file when the run ends.
    fn stage_color_source(
        input: &DynamicImage,
        paths: &OutputPaths,
    ) -> (DynamicImage, Option<TempFileGuard>) {
        let guard = TempFileGuard::new(paths.temp_original.clone());

        if let Err(e) = ImageIOService::save_png(input, guard.path()) {
            warn!(error = %e, "Could not write temporary copy, using decoded image directly");
            return (input.clone(), Some(guard));
        }

        match ImageIOService::load_image(guard.path()) {
            Ok(reloaded) => (reloaded, Some(guard)),
            Err(e) => {
                warn!(error = %e, "Could not reload temporary copy, using decoded image directly");
                (input.clone(), Some(guard))
            },
        }
    }

    /// Upload the clean image when a label and storage are available
    async fn publish(&self, clean: &DynamicImage, label: Option<&str>) -> UploadOutcome {
        let Some(name) = label else {
            return UploadOutcome::Skipped(SkipReason::NoLabel);
        };
        let Some(target) = &self.storage else {
            warn!("Storage credentials not configured, skipping upload");
            return UploadOutcome::Skipped(SkipReason::MissingCredentials);
        };

        match check_connection(target.client.as_ref(), &target.settings.bucket).await {
            Ok(report) if !report.target_bucket_exists => {
                warn!(bucket = %target.settings.bucket, "Target bucket not listed, trying anyway");
            },
            Ok(_) => {},
            Err(e) => {
                warn!(error = %e, "Skipping upload due to connection issues");
                return UploadOutcome::Skipped(SkipReason::ConnectionFailed(e.to_string()));
            },
        }

        let bytes = match ImageIOService::encode_png(clean) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Could not encode image for upload");
                return UploadOutcome::Failed {
                    object_path: target.settings.object_path(name),
                    attempts: Vec::new(),
                };
            },
        };

        upload_with_fallback(target.client.as_ref(), &target.settings, name, &bytes).await
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}
