//! Mock inference backend and helpers for unit tests
//!
//! The mock produces a soft circular mask so the remover, matting and trimming
//! stages can be exercised without model files or a native runtime.

use crate::{
    config::{BackendType, RemovalConfig},
    error::{BgTrimError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
    remover::BackendFactory,
};
use image::{DynamicImage, Rgb, RgbImage};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_input_size(320)
    }

    /// Mock with a square model input of `size` pixels
    #[must_use]
    pub fn with_input_size(size: usize) -> Self {
        Self {
            initialized: false,
            model_info: ModelInfo {
                name: "mock-u2net".to_string(),
                precision: "fp32".to_string(),
                size_bytes: 1024 * 1024,
                input_shape: (1, 3, size, size),
                output_shape: (1, 1, size, size),
            },
            preprocessing_config: PreprocessingConfig {
                target_size: [size as u32, size as u32],
                normalization_mean: [0.485, 0.456, 0.406],
                normalization_std: [0.229, 0.224, 0.225],
            },
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Shared handle to the call history, usable after the mock is boxed
    #[must_use]
    pub fn call_history_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// Circular mask with soft edges, 1.0 in the centre
    fn generate_mock_output(&self, input: &Array4<f32>) -> Array4<f32> {
        let batch_size = input.shape().first().copied().unwrap_or(1);
        let output_height = self.model_info.output_shape.2;
        let output_width = self.model_info.output_shape.3;

        let center_x = output_width as f32 / 2.0;
        let center_y = output_height as f32 / 2.0;
        let radius = (output_width.min(output_height) as f32 / 3.0).max(10.0);

        Array4::from_shape_fn(
            (batch_size, 1, output_height, output_width),
            |(_, _, y, x)| {
                let dx = x as f32 - center_x;
                let dy = y as f32 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                ((radius - distance) / radius * 2.0).clamp(0.0, 1.0)
            },
        )
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgTrimError::model("Mock backend initialization failed"));
        }

        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(150)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgTrimError::internal("Mock backend not initialized"));
        }

        if self.should_fail_inference {
            return Err(BgTrimError::inference("Mock backend inference failed"));
        }

        let (_, channels, height, width) = input.dim();
        if channels != 3
            || (height, width) != (self.model_info.input_shape.2, self.model_info.input_shape.3)
        {
            return Err(BgTrimError::inference(format!(
                "Mock backend got input {:?}, expected {:?}",
                input.dim(),
                self.model_info.input_shape
            )));
        }

        Ok(self.generate_mock_output(input))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.input_shape
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.output_shape
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing_config.clone())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out mock backends regardless of the requested type
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    should_fail_creation: bool,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_creation_failing() -> Self {
        Self {
            should_fail_creation: true,
        }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        if self.should_fail_creation {
            return Err(BgTrimError::invalid_config(format!(
                "Mock factory refused to create {backend_type} backend"
            )));
        }
        Ok(Box::new(MockBackend::new()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

/// Gradient image for pipeline tests
#[must_use]
pub fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255) / width.max(1)) as u8,
            ((y * 255) / height.max(1)) as u8,
            128,
        ])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_lifecycle() {
        let mut backend = MockBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 320, 320));

        assert!(backend.infer(&input).is_err());
        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_some());

        let output = backend.infer(&input).unwrap();
        assert_eq!(output.dim(), (1, 1, 320, 320));
        assert!((output[[0, 0, 160, 160]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);

        assert_eq!(
            backend.get_call_history(),
            vec!["infer", "initialize", "infer"]
        );
    }

    #[test]
    fn test_mock_backend_failures() {
        let mut backend = MockBackend::new_failing_init();
        assert!(backend.initialize(&RemovalConfig::default()).is_err());

        let mut backend = MockBackend::new_failing_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 320, 320))).is_err());
    }

    #[test]
    fn test_mock_backend_rejects_wrong_shape() {
        let mut backend = MockBackend::with_input_size(64);
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 32, 32))).is_err());
        assert!(backend.infer(&Array4::zeros((1, 3, 64, 64))).is_ok());
    }
}
