//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{ProcessorConfig, RemovalConfig},
    utils::{ExecutionProviderManager, ModelSpecParser},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to `ProcessorConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `ProcessorConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ProcessorConfig> {
        let model_spec = ModelSpecParser::parse(&cli.model);

        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let removal = RemovalConfig::builder()
            .model_spec(model_spec)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .num_threads(cli.threads)
            .alpha_matting(!cli.no_alpha_matting)
            .foreground_threshold(cli.fg_threshold)
            .background_threshold(cli.bg_threshold)
            .erode_size(cli.erode_size)
            .model_sha256(cli.model_sha256.clone())
            .build()
            .context("Invalid removal configuration")?;

        ProcessorConfig::builder()
            .removal(removal)
            .trim_padding(cli.padding)
            .keep_debug_mask(!cli.no_debug_mask)
            .build()
            .context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
            .context("Invalid execution provider format")?;

        let model_spec = ModelSpecParser::parse(&cli.model);
        ModelSpecParser::validate(&model_spec).context("Invalid model specification")?;

        if let Some(name) = &cli.name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                anyhow::bail!("--name must be a non-empty file stem without path separators");
            }
        }

        Ok(())
    }
}
