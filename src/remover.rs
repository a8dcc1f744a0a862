//! Background removal
//!
//! [`BackgroundRemover`] is the seam between the pipeline and whatever produces
//! the alpha mask. The production implementation, [`ModelBackgroundRemover`],
//! runs a U2-Net family model through an [`InferenceBackend`] and refines the
//! result with trimap matting.

use crate::{
    config::{BackendType, RemovalConfig},
    download::ModelDownloader,
    error::{BgTrimError, Result},
    inference::InferenceBackend,
    mask, matting,
    models::{lookup_catalogue, ModelManager, ModelSource},
    utils::ImagePreprocessor,
};
use image::DynamicImage;
use instant::Instant;
use tracing::{debug, info, instrument};

/// Produces an RGBA image whose alpha separates foreground from background
pub trait BackgroundRemover: Send {
    /// Remove the background of `image`
    ///
    /// Implementations may return any size; the pipeline resizes the original
    /// colour data to match.
    ///
    /// # Errors
    /// - Inference or mask generation failures
    fn remove(&mut self, image: &DynamicImage) -> Result<DynamicImage>;

    /// Short label for logs
    fn name(&self) -> String {
        "background-remover".to_string()
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends enabled through cargo features
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(BgTrimError::invalid_config(format!(
                    "Backend '{other}' is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Resolve the configured model, downloading catalogue models on first use
///
/// # Errors
/// - Unknown model name
/// - Download or checksum failure
/// - External model file missing
pub async fn provision_model(config: &RemovalConfig, show_progress: bool) -> Result<ModelManager> {
    match &config.model_spec.source {
        ModelSource::External(path) => {
            if let Some(expected) = config.model_sha256.as_deref() {
                if !ModelDownloader::verify_file_integrity(path, Some(expected))? {
                    return Err(BgTrimError::model(format!(
                        "Model {} does not match the expected SHA-256",
                        path.display()
                    )));
                }
            }
            ModelManager::with_external_model(path)
        },
        ModelSource::Downloaded(name) => {
            let entry = lookup_catalogue(name).ok_or_else(|| {
                BgTrimError::model(format!("Unknown model '{name}'"))
            })?;
            let downloader = ModelDownloader::new()?;
            downloader
                .ensure_model(entry, config.model_sha256.as_deref(), show_progress)
                .await?;
            ModelManager::from_spec(&config.model_spec, downloader.cache())
        },
    }
}

/// Model-backed remover
pub struct ModelBackgroundRemover {
    config: RemovalConfig,
    backend: Box<dyn InferenceBackend>,
    model_name: String,
}

impl std::fmt::Debug for ModelBackgroundRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackgroundRemover")
            .field("model", &self.model_name)
            .field("backend", &self.config.backend_type)
            .finish_non_exhaustive()
    }
}

impl ModelBackgroundRemover {
    /// Create a remover with the backends compiled into this build
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Backend creation or model loading failures
    pub fn new(config: RemovalConfig, model_manager: ModelManager) -> Result<Self> {
        Self::with_factory(config, model_manager, &DefaultBackendFactory)
    }

    /// Create a remover through a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Backend creation or model loading failures
    pub fn with_factory(
        config: RemovalConfig,
        model_manager: ModelManager,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        config.validate()?;
        let backend = factory.create_backend(config.backend_type, model_manager)?;
        Self::with_backend(config, backend)
    }

    /// Wrap an already constructed backend, initializing it if needed
    ///
    /// # Errors
    /// - Backend initialization failures
    pub fn with_backend(config: RemovalConfig, mut backend: Box<dyn InferenceBackend>) -> Result<Self> {
        if let Some(load_time) = backend.initialize(&config)? {
            debug!(load_ms = load_time.as_millis() as u64, "Backend initialized");
        }
        let model_name = backend.get_model_info()?.name;

        info!(
            model = %model_name,
            backend = %config.backend_type,
            provider = %config.execution_provider,
            alpha_matting = config.alpha_matting.enabled,
            "Background remover ready"
        );

        Ok(Self {
            config,
            backend,
            model_name,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }
}

impl BackgroundRemover for ModelBackgroundRemover {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    fn remove(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(BgTrimError::processing_stage_error(
                "remove background",
                "image has no pixels",
                Some(&format!("{width}x{height}")),
            ));
        }

        let start = Instant::now();
        let preprocessing = self.backend.get_preprocessing_config()?;
        let tensor = ImagePreprocessor::preprocess_for_inference(image, &preprocessing)?;
        let output = self.backend.infer(&tensor)?;
        let raw_mask = ImagePreprocessor::tensor_to_mask(&output, width, height)?;
        let alpha = matting::refine_alpha(&raw_mask, &self.config.alpha_matting);

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Mask generated"
        );

        Ok(DynamicImage::ImageRgba8(mask::composite(image, &alpha)))
    }

    fn name(&self) -> String {
        format!("{} ({})", self.model_name, self.config.backend_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{create_test_image, MockBackend, MockBackendFactory};
    use image::GenericImageView;
    use std::fs;
    use tempfile::TempDir;

    fn external_manager(dir: &TempDir) -> ModelManager {
        let path = dir.path().join("u2net.onnx");
        fs::write(&path, b"mock").unwrap();
        ModelManager::with_external_model(&path).unwrap()
    }

    #[test]
    fn test_remove_produces_rgba_at_input_size() {
        let mut remover =
            ModelBackgroundRemover::with_backend(RemovalConfig::default(), Box::new(MockBackend::new()))
                .unwrap();

        let image = create_test_image(120, 80);
        let result = remover.remove(&image).unwrap();

        assert!(result.color().has_alpha());
        assert_eq!(result.dimensions(), (120, 80));
        assert_eq!(result.get_pixel(60, 40)[3], 255);
        assert_eq!(result.get_pixel(0, 0)[3], 0);
        // Colour is passed through from the input
        assert_eq!(
            &result.get_pixel(60, 40).0[..3],
            &image.get_pixel(60, 40).0[..3]
        );
    }

    #[test]
    fn test_remove_without_matting_keeps_soft_edge() {
        let config = RemovalConfig::builder().alpha_matting(false).build().unwrap();
        let mut remover =
            ModelBackgroundRemover::with_backend(config, Box::new(MockBackend::new())).unwrap();

        let result = remover.remove(&create_test_image(320, 320)).unwrap();
        let alphas: Vec<u8> = (0..320).map(|x| result.get_pixel(x, 160)[3]).collect();
        assert!(alphas.iter().any(|&a| a > 0 && a < 255));
    }

    #[test]
    fn test_factory_path() {
        let dir = TempDir::new().unwrap();
        let remover = ModelBackgroundRemover::with_factory(
            RemovalConfig::default(),
            external_manager(&dir),
            &MockBackendFactory::new(),
        )
        .unwrap();
        assert!(remover.name().contains("mock-u2net"));

        let err = ModelBackgroundRemover::with_factory(
            RemovalConfig::default(),
            external_manager(&dir),
            &MockBackendFactory::new_creation_failing(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Mock factory"));
    }

    #[test]
    fn test_backend_failures_propagate() {
        let result = ModelBackgroundRemover::with_backend(
            RemovalConfig::default(),
            Box::new(MockBackend::new_failing_init()),
        );
        assert!(result.is_err());

        let mut remover = ModelBackgroundRemover::with_backend(
            RemovalConfig::default(),
            Box::new(MockBackend::new_failing_inference()),
        )
        .unwrap();
        assert!(remover.remove(&create_test_image(10, 10)).is_err());
    }

    #[test]
    fn test_default_factory_lists_enabled_backends() {
        let backends = DefaultBackendFactory.available_backends();
        assert_eq!(backends.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
        assert_eq!(backends.contains(&BackendType::Tract), cfg!(feature = "tract"));
    }

    #[tokio::test]
    async fn test_provision_external_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("silueta.onnx");
        fs::write(&path, b"hello").unwrap();

        let config = RemovalConfig::builder()
            .model_spec(crate::models::ModelSpec::new(ModelSource::External(path)))
            .model_sha256(Some(
                "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824".to_string(),
            ))
            .build()
            .unwrap();
        let manager = provision_model(&config, false).await.unwrap();
        assert_eq!(manager.name(), "silueta");

        let bad = RemovalConfig {
            model_sha256: Some("0".repeat(64)),
            ..config
        };
        assert!(provision_model(&bad, false).await.is_err());
    }
}
