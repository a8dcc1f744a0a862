//! ONNX Runtime backend
//!
//! Runs the segmentation model through ONNX Runtime with an optional hardware
//! execution provider (CUDA, `CoreML`). A requested provider that is not
//! available degrades to CPU with a warning rather than failing the run.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgTrimError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::{self, value::Value};

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: ModelManager,
    initialized: bool,
}

impl OnnxBackend {
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager,
            initialized: false,
        }
    }

    fn cuda_available() -> bool {
        OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
    }

    fn coreml_available() -> bool {
        OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
    }

    /// Providers to register for the requested option, best first
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();

        let want_cuda = matches!(requested, ExecutionProvider::Auto | ExecutionProvider::Cuda);
        let want_coreml = matches!(requested, ExecutionProvider::Auto | ExecutionProvider::CoreMl);

        if want_cuda {
            if Self::cuda_available() {
                log::info!("CUDA execution provider is available and will be used");
                providers.push(CUDAExecutionProvider::default().build());
            } else if requested == ExecutionProvider::Cuda {
                log::warn!("CUDA execution provider requested but not available, falling back to CPU");
            } else {
                log::debug!("CUDA execution provider is not available");
            }
        }

        if want_coreml {
            if Self::coreml_available() {
                log::info!("CoreML execution provider is available and will be used");
                providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
            } else if requested == ExecutionProvider::CoreMl {
                log::warn!(
                    "CoreML execution provider requested but not available, falling back to CPU"
                );
            } else {
                log::debug!("CoreML execution provider is not available");
            }
        }

        if requested == ExecutionProvider::Cpu {
            log::info!("Using CPU execution provider");
        } else if providers.is_empty() {
            log::warn!("No hardware acceleration available, running on CPU");
        }

        providers
    }

    fn thread_counts(config: &RemovalConfig) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);

        let intra = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }

    fn session_builder(config: &RemovalConfig) -> Result<SessionBuilder> {
        let mut builder = Session::builder()
            .map_err(|e| BgTrimError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgTrimError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                BgTrimError::inference(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let (intra_threads, inter_threads) = Self::thread_counts(config);
        log::debug!(
            "Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );

        builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgTrimError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgTrimError::inference(format!("Failed to set inter threads: {e}")))
    }

    fn load_model(&mut self, config: &RemovalConfig) -> Result<instant::Duration> {
        let model_load_start = instant::Instant::now();

        let model_data = self.model_manager.load_model()?;
        let session = Self::session_builder(config)?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgTrimError::model(format!("Failed to create session from model data: {e}"))
            })?;

        let model_info = self.model_manager.get_info()?;
        #[allow(clippy::cast_precision_loss)]
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::debug!(
            "ONNX Runtime session ready: model {} ({size_mb:.2} MB), provider {}",
            model_info.name,
            config.execution_provider
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<instant::Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgTrimError::internal("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgTrimError::internal("ONNX session not initialized"))?;

        let inference_start = instant::Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgTrimError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs: U2-Net exports disagree on tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgTrimError::inference(format!("ONNX inference failed: {e}")))?;

        // The first output is the fused side output d0
        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgTrimError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| BgTrimError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgTrimError::inference(format!("Failed to extract output tensor: {e}")))?;

        let output_shape = output_tensor.shape().to_vec();
        let [n, c, h, w] = output_shape.as_slice() else {
            return Err(BgTrimError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };

        let output = Array4::from_shape_vec(
            (*n, *c, *h, *w),
            output_tensor.view().to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgTrimError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::info!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(output)
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

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
