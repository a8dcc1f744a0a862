//! File-facing services used by the pipeline

pub mod io;

pub use io::{ImageIOService, OutputPaths, TempFileGuard};
