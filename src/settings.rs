//! Storage credentials and destination layout

use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_SERVICE_KEY: &str = "SUPABASE_SERVICE_KEY";
pub const ENV_KEY: &str = "SUPABASE_KEY";
pub const ENV_BUCKET: &str = "SUPABASE_BUCKET";
pub const ENV_PATH_PREFIX: &str = "SUPABASE_PATH_PREFIX";

pub const DEFAULT_BUCKET: &str = "assets";
pub const DEFAULT_PATH_PREFIX: &str = "assets/images/strains";

/// Where and how to publish cleaned images
///
/// Built once by the caller and handed to the pipeline; nothing below the CLI
/// reads the environment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub url: String,
    pub key: String,
    pub bucket: String,
    pub path_prefix: String,
}

impl StorageSettings {
    #[must_use]
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            bucket: DEFAULT_BUCKET.to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    #[must_use]
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Read settings from the process environment
    ///
    /// Returns `None` when the URL or both keys are missing.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    ///
    /// The service key wins over the general key. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let url = get(ENV_URL)?;
        let key = get(ENV_SERVICE_KEY).or_else(|| get(ENV_KEY))?;

        let mut settings = Self::new(url, key);
        if let Some(bucket) = get(ENV_BUCKET) {
            settings = settings.with_bucket(bucket);
        }
        if let Some(prefix) = get(ENV_PATH_PREFIX) {
            settings = settings.with_path_prefix(prefix);
        }
        Some(settings)
    }

    /// Remote object path for an output stem: `<prefix>/<name>.png`
    #[must_use]
    pub fn object_path(&self, name: &str) -> String {
        if self.path_prefix.is_empty() {
            format!("{name}.png")
        } else {
            format!("{}/{name}.png", self.path_prefix)
        }
    }

    /// Placeholder object that makes the destination directory exist
    #[must_use]
    pub fn placeholder_path(&self) -> String {
        if self.path_prefix.is_empty() {
            ".placeholder".to_string()
        } else {
            format!("{}/.placeholder", self.path_prefix)
        }
    }

    /// First ten characters of the key, safe to print
    #[must_use]
    pub fn key_preview(&self) -> String {
        let preview: String = self.key.chars().take(10).collect();
        format!("{preview}...")
    }
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("url", &self.url)
            .field("key", &self.key_preview())
            .field("bucket", &self.bucket)
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}
