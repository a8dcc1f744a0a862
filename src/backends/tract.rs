//! Tract backend
//!
//! Pure Rust inference through Tract. CPU only, no native runtime to install,
//! noticeably slower than ONNX Runtime on the 1024px models.

use crate::config::RemovalConfig;
use crate::error::{BgTrimError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

use instant::{Duration, Instant};

#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: ModelManager,
    initialized: bool,
}

impl TractBackend {
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager,
            initialized: false,
        }
    }

    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_data = self.model_manager.load_model()?;
        let model_info = self.model_manager.get_info()?;
        let (_, channels, height, width) = model_info.input_shape;

        #[allow(clippy::cast_precision_loss)]
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!(
            "Initializing Tract backend: model {} ({size_mb:.2} MB), CPU",
            model_info.name
        );

        // U2-Net exports leave the spatial dims symbolic; pin them so the graph optimizes
        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgTrimError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, channels, height, width]).into())
            .map_err(|e| BgTrimError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgTrimError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BgTrimError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgTrimError::internal("Tract model not initialized"))?;

        log::debug!("Running Tract inference on input {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgTrimError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgTrimError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgTrimError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_data.shape().to_vec();
        let [n, c, h, w] = shape.as_slice() else {
            return Err(BgTrimError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let output_array = Array4::from_shape_vec(
            (*n, *c, *h, *w),
            output_data.iter().copied().collect(),
        )
        .map_err(|e| BgTrimError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );

        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .get_info()
            .map_or((1, 3, 320, 320), |info| info.input_shape)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .get_info()
            .map_or((1, 1, 320, 320), |info| info.output_shape)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager.get_preprocessing_config()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_manager.get_info()
    }
}
