//! Model downloading
//!
//! Catalogue models are fetched from their release URL on first use, streamed
//! into a temporary file inside the cache directory and renamed into place only
//! after the transfer (and the optional SHA-256 pin) succeeded. An interrupted
//! download therefore never leaves a truncated `<name>.onnx` behind.

use crate::cache::{format_size, ModelCache};
use crate::error::{BgTrimError, Result};
use crate::models::CatalogueEntry;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl ModelDownloader {
    /// Create a downloader writing into the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgTrimError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Make sure a catalogue model is in the cache and return its path
    ///
    /// A cached file is reused without touching the network. When
    /// `expected_sha256` is given, both cached and fresh files are checked
    /// against it.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors while writing the cache
    /// - Checksum mismatch
    pub async fn ensure_model(
        &self,
        entry: &CatalogueEntry,
        expected_sha256: Option<&str>,
        show_progress: bool,
    ) -> Result<PathBuf> {
        let final_path = self.cache.model_path(entry.name);

        if self.cache.is_model_cached(entry.name) {
            log::debug!("Model already cached: {}", final_path.display());
            if !Self::verify_file_integrity(&final_path, expected_sha256)? {
                return Err(BgTrimError::model(format!(
                    "Cached model {} does not match the expected SHA-256; delete it to re-download",
                    final_path.display()
                )));
            }
            return Ok(final_path);
        }

        let url = entry.url();
        log::info!("Downloading model '{}' from {}", entry.name, url);

        let progress = if show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };

        match self
            .download_to(&url, &final_path, expected_sha256, progress.as_ref())
            .await
        {
            Ok(size) => {
                if let Some(pb) = progress {
                    pb.finish_with_message(format!("Downloaded {}", entry.name));
                }
                log::info!(
                    "Cached model '{}' ({}) at {}",
                    entry.name,
                    format_size(size),
                    final_path.display()
                );
                Ok(final_path)
            },
            Err(e) => {
                if let Some(pb) = progress {
                    pb.finish_with_message("Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream `url` into a temporary sibling of `final_path`, then rename it into place
    async fn download_to(
        &self,
        url: &str,
        final_path: &Path,
        expected_sha256: Option<&str>,
        progress: Option<&ProgressIndicator>,
    ) -> Result<u64> {
        let dir = final_path
            .parent()
            .ok_or_else(|| BgTrimError::internal("Model path has no parent directory"))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgTrimError::network_error(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgTrimError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {status}"),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }

        // Removed automatically unless persisted
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| BgTrimError::file_io_error("create temporary model file", dir, &e))?;
        let std_file = temp
            .reopen()
            .map_err(|e| BgTrimError::file_io_error("open temporary model file", temp.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgTrimError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgTrimError::file_io_error("write model", temp.path(), &e))?;

            downloaded += bytes_read as u64;
            if let Some(pb) = progress {
                pb.set_position(downloaded);
            }
        }

        file.flush()
            .await
            .map_err(|e| BgTrimError::file_io_error("flush model", temp.path(), &e))?;
        drop(file);

        if let Some(total) = total_size {
            if downloaded != total {
                return Err(BgTrimError::network_error(
                    format!("Incomplete download of {url}"),
                    format!("received {downloaded} of {total} bytes"),
                ));
            }
        }

        let actual = format!("{:x}", hasher.finalize());
        if let Some(expected) = expected_sha256 {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(BgTrimError::model(format!(
                    "SHA-256 mismatch for {url}: expected {expected}, got {actual}"
                )));
            }
        }
        log::debug!("Downloaded {downloaded} bytes, sha256 {actual}");

        temp.persist(final_path).map_err(|e| {
            BgTrimError::file_io_error("move downloaded model into cache", final_path, &e.error)
        })?;

        Ok(downloaded)
    }

    /// Check a file against an optional SHA-256 pin
    ///
    /// Returns `true` when no pin is given.
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            BgTrimError::file_io_error("read file for verification", file_path, &e)
        })?;

        let actual_hash = format!("{:x}", Sha256::digest(&contents));

        if actual_hash.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual_hash
            );
            Ok(false)
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}
