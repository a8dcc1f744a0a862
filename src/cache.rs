//! Local cache for downloaded model files
//!
//! Models live as flat `<name>.onnx` files in `$U2NET_HOME`, or `~/.u2net`
//! when the variable is unset. The layout is shared with other U2-Net tooling
//! so an existing download is reused as is.

use crate::error::{BgTrimError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "U2NET_HOME";

/// A cached model file
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub model_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default cache, creating the directory if needed
    ///
    /// # Errors
    /// - Home directory cannot be determined and `U2NET_HOME` is unset
    /// - Failed to create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::resolve_cache_dir(|name| std::env::var(name).ok())?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Work out the cache directory from an environment lookup
    ///
    /// # Errors
    /// - Home directory cannot be determined and the override is unset
    pub fn resolve_cache_dir<F>(lookup: F) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        Ok(dirs::home_dir()
            .ok_or_else(|| {
                BgTrimError::invalid_config(format!(
                    "Failed to determine home directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join(".u2net"))
    }

    /// Use `cache_dir` directly, creating it if needed
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                BgTrimError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Path of a model file (may not exist)
    #[must_use]
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{model_id}.onnx"))
    }

    /// Whether a non-empty model file is present
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        fs::metadata(self.model_path(model_id)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// List every `.onnx` file in the cache, sorted by id
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgTrimError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        let mut models = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| BgTrimError::file_io_error("read cache entry", &self.cache_dir, &e))?
                .path();

            if path.extension().and_then(|ext| ext.to_str()) != Some("onnx") {
                continue;
            }

            let Some(model_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

            models.push(CachedModelInfo {
                model_id: model_id.to_string(),
                path: path.clone(),
                size_bytes,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    #[must_use]
    pub fn get_current_cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
