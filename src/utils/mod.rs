//! Helpers shared by the CLI and the pipeline

pub mod models;
pub mod preprocessing;
pub mod providers;

pub use models::ModelSpecParser;
pub use preprocessing::ImagePreprocessor;
pub use providers::ExecutionProviderManager;
