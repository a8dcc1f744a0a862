//! Segmentation model catalogue and loading

use crate::{
    cache::ModelCache,
    error::{BgTrimError, Result},
};
use std::fs;
use std::path::{Path, PathBuf};

/// Release page hosting the catalogue models
pub const MODEL_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// Model used when none is requested
pub const DEFAULT_MODEL: &str = "u2net";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Model source specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// ONNX file at a filesystem path
    External(PathBuf),
    /// Catalogue model resolved through the download cache
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => {
                format!("cached:{model_id}")
            },
        }
    }
}

/// Which model to run
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
}

impl ModelSpec {
    #[must_use]
    pub fn new(source: ModelSource) -> Self {
        Self { source }
    }

    /// Catalogue entry this spec resolves to, if any
    ///
    /// External files match by file stem so a renamed copy of `silueta.onnx`
    /// still gets silueta preprocessing.
    #[must_use]
    pub fn catalogue_entry(&self) -> Option<&'static CatalogueEntry> {
        match &self.source {
            ModelSource::Downloaded(name) => lookup_catalogue(name),
            ModelSource::External(path) => path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(lookup_catalogue),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Downloaded(DEFAULT_MODEL.to_string()),
        }
    }
}

/// Image preprocessing parameters for a model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Model input as `[width, height]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// A downloadable model and how to feed it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogueEntry {
    pub name: &'static str,
    pub description: &'static str,
    /// Square input side in pixels
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl CatalogueEntry {
    #[must_use]
    pub fn url(&self) -> String {
        format!("{MODEL_BASE_URL}/{}.onnx", self.name)
    }

    #[must_use]
    pub fn preprocessing(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [self.input_size, self.input_size],
            normalization_mean: self.mean,
            normalization_std: self.std,
        }
    }
}

pub const MODEL_CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        name: "u2net",
        description: "General purpose salient object segmentation",
        input_size: 320,
        mean: IMAGENET_MEAN,
        std: IMAGENET_STD,
    },
    CatalogueEntry {
        name: "u2netp",
        description: "Lightweight U2-Net",
        input_size: 320,
        mean: IMAGENET_MEAN,
        std: IMAGENET_STD,
    },
    CatalogueEntry {
        name: "silueta",
        description: "U2-Net pruned to 43MB",
        input_size: 320,
        mean: IMAGENET_MEAN,
        std: IMAGENET_STD,
    },
    CatalogueEntry {
        name: "isnet-general-use",
        description: "IS-Net dichotomous segmentation",
        input_size: 1024,
        mean: [0.5, 0.5, 0.5],
        std: [1.0, 1.0, 1.0],
    },
];

#[must_use]
pub fn lookup_catalogue(name: &str) -> Option<&'static CatalogueEntry> {
    MODEL_CATALOGUE.iter().find(|entry| entry.name == name)
}

#[must_use]
pub fn catalogue_names() -> Vec<&'static str> {
    MODEL_CATALOGUE.iter().map(|entry| entry.name).collect()
}

/// Resolved model file together with its preprocessing
#[derive(Debug, Clone)]
pub struct ModelManager {
    name: String,
    path: PathBuf,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model specification against the cache
    ///
    /// Catalogue models must already be present in `cache`; see
    /// [`crate::download::ModelDownloader::ensure_model`].
    ///
    /// # Errors
    /// - Unknown catalogue name
    /// - Model file missing from the cache or the given path
    pub fn from_spec(spec: &ModelSpec, cache: &ModelCache) -> Result<Self> {
        match &spec.source {
            ModelSource::External(path) => Self::with_external_model(path),
            ModelSource::Downloaded(name) => {
                let entry = lookup_catalogue(name).ok_or_else(|| unknown_model(name))?;
                let path = cache.model_path(entry.name);
                if !cache.is_model_cached(entry.name) {
                    return Err(BgTrimError::model(format!(
                        "Model '{}' is not cached at {}",
                        entry.name,
                        path.display()
                    )));
                }
                Ok(Self {
                    name: entry.name.to_string(),
                    path,
                    preprocessing: entry.preprocessing(),
                })
            },
        }
    }

    /// Use an ONNX file from disk
    ///
    /// Files not named after a catalogue entry are fed like U2-Net.
    ///
    /// # Errors
    /// - Path does not exist or is not a file
    pub fn with_external_model<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(BgTrimError::model(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let name = path
            .file_stem()
            .map_or_else(|| "external".to_string(), |s| s.to_string_lossy().into_owned());
        let preprocessing = lookup_catalogue(&name)
            .or_else(|| lookup_catalogue(DEFAULT_MODEL))
            .map(CatalogueEntry::preprocessing)
            .ok_or_else(|| unknown_model(DEFAULT_MODEL))?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            preprocessing,
        })
    }

    /// Load model data
    ///
    /// # Errors
    /// - File I/O errors when reading the model
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| BgTrimError::file_io_error("read model", &self.path, &e))
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.path)
            .map_err(|e| BgTrimError::file_io_error("inspect model", &self.path, &e))?
            .len();
        let [width, height] = self.preprocessing.target_size;

        Ok(ModelInfo {
            name: self.name.clone(),
            precision: "fp32".to_string(),
            size_bytes: usize::try_from(size_bytes).unwrap_or(usize::MAX),
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        })
    }

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// Never fails for resolved models; kept fallible for backend symmetry.
    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing.clone())
    }

    #[must_use]
    pub fn get_model_path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn unknown_model(name: &str) -> BgTrimError {
    BgTrimError::model(format!(
        "Unknown model '{name}'. Available: {}",
        catalogue_names().join(", ")
    ))
}
