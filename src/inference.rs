//! Inference backend abstraction

use crate::{
    config::RemovalConfig,
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Load the model and prepare a session
    ///
    /// Returns the model load time on first call and `None` once initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Runtime session creation failures
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output that is not a 4D tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input shape (NCHW)
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Expected output shape (NCHW)
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// # Errors
    /// - Model manager not set
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// # Errors
    /// - Model manager not set
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    fn is_initialized(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;

    #[test]
    fn test_backend_trait_object() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockBackend::new());
        assert!(!backend.is_initialized());

        let load_time = backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(load_time.is_some());
        assert!(backend.is_initialized());

        // Second initialization is a no-op
        assert!(backend
            .initialize(&RemovalConfig::default())
            .unwrap()
            .is_none());

        let (n, c, h, w) = backend.input_shape();
        assert_eq!((n, c), (1, 3));
        assert_eq!(backend.output_shape(), (1, 1, h, w));

        let input = Array4::<f32>::zeros((n, c, h, w));
        let output = backend.infer(&input).unwrap();
        assert_eq!(output.dim(), (1, 1, h, w));
    }
}
