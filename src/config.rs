//! Configuration types for background removal and cleanup runs

use crate::{
    error::{BgTrimError, Result},
    models::ModelSpec,
};
use serde::{Deserialize, Serialize};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime
    #[default]
    Onnx,
    /// Pure Rust Tract runtime (CPU only)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Trimap settings used to refine the model mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaMattingConfig {
    pub enabled: bool,
    /// Mask values above this (after erosion) become fully opaque
    pub foreground_threshold: u8,
    /// Mask values below this (after erosion) become fully transparent
    pub background_threshold: u8,
    /// Erosion window applied to both trimap regions
    pub erode_size: u32,
}

impl Default for AlphaMattingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
        }
    }
}

/// Configuration for the background remover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Model to run, by catalogue name or file path
    pub model_spec: ModelSpec,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    pub alpha_matting: AlphaMattingConfig,

    /// Expected SHA-256 of the model file, checked after download
    pub model_sha256: Option<String>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            alpha_matting: AlphaMattingConfig::default(),
            model_sha256: None,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgtrim::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .foreground_threshold(230)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.inter_threads, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Foreground threshold not above the background threshold
    /// - Zero erosion size while matting is enabled
    /// - Tract backend combined with a GPU execution provider
    /// - Model checksum that is not 64 hex characters
    pub fn validate(&self) -> Result<()> {
        let matting = &self.alpha_matting;

        if matting.enabled {
            if matting.foreground_threshold <= matting.background_threshold {
                return Err(BgTrimError::config_value_error(
                    "foreground threshold",
                    matting.foreground_threshold,
                    &format!("{}-255", u16::from(matting.background_threshold) + 1),
                    Some(240),
                ));
            }

            if matting.erode_size == 0 {
                return Err(BgTrimError::config_value_error(
                    "erode size",
                    matting.erode_size,
                    "1-255",
                    Some(10),
                ));
            }
        }

        if self.backend_type == BackendType::Tract
            && !matches!(
                self.execution_provider,
                ExecutionProvider::Cpu | ExecutionProvider::Auto
            )
        {
            return Err(BgTrimError::invalid_config(format!(
                "Tract backend only runs on CPU, got provider '{}'",
                self.execution_provider
            )));
        }

        if let Some(checksum) = &self.model_sha256 {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BgTrimError::invalid_config(format!(
                    "Model SHA-256 must be 64 hex characters, got '{checksum}'"
                )));
            }
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both thread pools: `threads` intra-op and half of that inter-op (minimum 1)
    ///
    /// Zero leaves both on auto-detection.
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.config.alpha_matting.enabled = enabled;
        self
    }

    #[must_use]
    pub fn foreground_threshold(mut self, threshold: u8) -> Self {
        self.config.alpha_matting.foreground_threshold = threshold;
        self
    }

    #[must_use]
    pub fn background_threshold(mut self, threshold: u8) -> Self {
        self.config.alpha_matting.background_threshold = threshold;
        self
    }

    #[must_use]
    pub fn erode_size(mut self, size: u32) -> Self {
        self.config.alpha_matting.erode_size = size;
        self
    }

    #[must_use]
    pub fn model_sha256(mut self, checksum: Option<String>) -> Self {
        self.config.model_sha256 = checksum.map(|c| c.to_ascii_lowercase());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for a complete cleanup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub removal: RemovalConfig,

    /// Side of the square window used to dilate the alpha mask
    pub dilation_kernel: u32,

    /// Pixels kept around the detected foreground when trimming
    pub trim_padding: u32,

    /// Keep the raw remover output next to the input as `_debug_mask.png`
    pub keep_debug_mask: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            removal: RemovalConfig::default(),
            dilation_kernel: 7,
            trim_padding: crate::trim::DEFAULT_PADDING,
            keep_debug_mask: true,
        }
    }
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Validate the run configuration and the nested removal configuration
    ///
    /// # Errors
    /// - Even or zero dilation kernel
    /// - Invalid removal configuration
    pub fn validate(&self) -> Result<()> {
        if self.dilation_kernel == 0 || self.dilation_kernel % 2 == 0 {
            return Err(BgTrimError::config_value_error(
                "dilation kernel",
                self.dilation_kernel,
                "odd values >= 1",
                Some(7),
            ));
        }

        self.removal.validate()
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn removal(mut self, removal: RemovalConfig) -> Self {
        self.config.removal = removal;
        self
    }

    #[must_use]
    pub fn dilation_kernel(mut self, size: u32) -> Self {
        self.config.dilation_kernel = size;
        self
    }

    #[must_use]
    pub fn trim_padding(mut self, padding: u32) -> Self {
        self.config.trim_padding = padding;
        self
    }

    #[must_use]
    pub fn keep_debug_mask(mut self, keep: bool) -> Self {
        self.config.keep_debug_mask = keep;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`ProcessorConfig::validate`]
    pub fn build(self) -> Result<ProcessorConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
