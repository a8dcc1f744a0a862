//! Execution provider string parsing

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{BgTrimError, Result},
};

/// Utility for parsing and formatting `backend:provider` strings
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse execution provider string in format "backend:provider"
    ///
    /// A bare backend name picks that backend's default provider.
    ///
    /// # Examples
    /// ```rust
    /// use bgtrim::utils::ExecutionProviderManager;
    /// use bgtrim::{BackendType, ExecutionProvider};
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
    /// assert_eq!(backend, BackendType::Tract);
    /// assert_eq!(provider, ExecutionProvider::Cpu);
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider name
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let normalized = provider_str.trim().to_ascii_lowercase();

        if let Some((backend, provider)) = normalized.split_once(':') {
            match backend {
                "onnx" => {
                    let execution_provider = match provider {
                        "auto" => ExecutionProvider::Auto,
                        "cpu" => ExecutionProvider::Cpu,
                        "cuda" => ExecutionProvider::Cuda,
                        "coreml" => ExecutionProvider::CoreMl,
                        _ => {
                            return Err(BgTrimError::invalid_config(format!(
                                "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
                            )));
                        },
                    };
                    Ok((BackendType::Onnx, execution_provider))
                },
                "tract" => match provider {
                    "cpu" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                    _ => Err(BgTrimError::invalid_config(format!(
                        "Unknown Tract provider: {provider}. Tract only supports 'cpu'"
                    ))),
                },
                _ => Err(BgTrimError::invalid_config(format!(
                    "Unknown backend: {backend}. Supported backends: onnx, tract"
                ))),
            }
        } else {
            match normalized.as_str() {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(BgTrimError::invalid_config(
                    "Invalid provider format. Use backend:provider (e.g., onnx:auto, tract:cpu)",
                )),
            }
        }
    }

    /// Convert backend type and execution provider back to string
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        for (input, expected) in [
            ("onnx:auto", ExecutionProvider::Auto),
            ("onnx:cpu", ExecutionProvider::Cpu),
            ("onnx:cuda", ExecutionProvider::Cuda),
            ("ONNX:CoreML", ExecutionProvider::CoreMl),
        ] {
            let (backend, provider) =
                ExecutionProviderManager::parse_provider_string(input).unwrap();
            assert_eq!(backend, BackendType::Onnx);
            assert_eq!(provider, expected, "input {input}");
        }
    }

    #[test]
    fn test_parse_tract_and_bare_names() {
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("tract").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("onnx").unwrap(),
            (BackendType::Onnx, ExecutionProvider::Auto)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(ExecutionProviderManager::parse_provider_string("tract:cuda").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("onnx:tpu").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("mock:cpu").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("gpu").is_err());
    }

    #[test]
    fn test_round_trip_string() {
        let text =
            ExecutionProviderManager::provider_to_string(BackendType::Onnx, ExecutionProvider::CoreMl);
        assert_eq!(text, "onnx:coreml");
        assert_eq!(
            ExecutionProviderManager::parse_provider_string(&text).unwrap(),
            (BackendType::Onnx, ExecutionProvider::CoreMl)
        );
    }
}
