//! Model argument parsing

use crate::{
    error::{BgTrimError, Result},
    models::{catalogue_names, lookup_catalogue, ModelSource, ModelSpec},
};
use std::path::{Path, PathBuf};

/// Utility for parsing and checking model specifications
pub struct ModelSpecParser;

impl ModelSpecParser {
    /// Parse a `--model` argument
    ///
    /// Existing files and anything ending in `.onnx` are external models;
    /// everything else is a catalogue name.
    ///
    /// # Examples
    /// ```rust
    /// use bgtrim::models::ModelSource;
    /// use bgtrim::utils::ModelSpecParser;
    ///
    /// let spec = ModelSpecParser::parse("u2netp");
    /// assert_eq!(spec.source, ModelSource::Downloaded("u2netp".to_string()));
    ///
    /// let spec = ModelSpecParser::parse("./models/custom.onnx");
    /// assert!(matches!(spec.source, ModelSource::External(_)));
    /// ```
    #[must_use]
    pub fn parse(model_arg: &str) -> ModelSpec {
        let path = Path::new(model_arg);
        let is_onnx_file = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));

        let source = if is_onnx_file || path.is_file() {
            ModelSource::External(PathBuf::from(model_arg))
        } else {
            ModelSource::Downloaded(model_arg.trim().to_lowercase())
        };

        ModelSpec::new(source)
    }

    /// Check that a spec can be resolved before any work starts
    ///
    /// # Errors
    /// - Unknown catalogue name
    /// - External model file does not exist
    pub fn validate(model_spec: &ModelSpec) -> Result<()> {
        match &model_spec.source {
            ModelSource::Downloaded(name) => {
                if lookup_catalogue(name).is_none() {
                    return Err(BgTrimError::invalid_config(format!(
                        "Unknown model '{name}'. Available: {}",
                        catalogue_names().join(", ")
                    )));
                }
            },
            ModelSource::External(path) => {
                if !path.is_file() {
                    return Err(BgTrimError::invalid_config(format!(
                        "Model file does not exist: {}",
                        path.display()
                    )));
                }
            },
        }
        Ok(())
    }
}
