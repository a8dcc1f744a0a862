//! Tracing subscriber setup for the binary
//!
//! The library only emits events. The CLI builds a [`TracingConfig`] from its
//! flags and installs the subscriber once at startup.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Noisy dependencies are capped at `warn` unless the filter is set explicitly
const DEPENDENCY_DIRECTIVES: &str = "ort=warn,tract_onnx=warn,tract_core=warn,hyper=warn,reqwest=warn";

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Coloured, human-oriented output (default for CLI)
    Console,
    /// Plain output without ANSI colours, for CI logs
    Compact,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Console plus a non-rolling log file
    #[cfg(feature = "tracing-files")]
    ConsoleAndFile(std::path::PathBuf),
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

/// Keeps background log writers alive until dropped
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Level for this crate at the configured verbosity
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Full filter directive string
    pub fn filter_directives(&self) -> String {
        match &self.env_filter {
            Some(filter) => filter.clone(),
            None => format!("{},{DEPENDENCY_DIRECTIVES}", self.verbosity_to_filter()),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directives())?;
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(self.format == TracingFormat::Console)
            .with_target(false)
            .with_level(true)
            .compact();

        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match &self.output {
            TracingOutput::Console => {
                Registry::default()
                    .with(filter)
                    .with(console_layer)
                    .try_init()?;
            },
            #[cfg(feature = "tracing-files")]
            TracingOutput::ConsoleAndFile(path) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::never(
                    path.parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("bgtrim.log")),
                );
                let (file_writer, file_guard) = non_blocking(file_appender);
                guard._file = Some(file_guard);

                let file_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .compact();

                Registry::default()
                    .with(filter)
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Session started");
        }

        Ok(guard)
    }
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for the entire CLI invocation
    pub fn session(session_id: &str, model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            model_name = %model_name,
            provider = %provider
        )
    }

    pub fn model_loading(model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_name = %model_name,
            provider = %provider
        )
    }

    pub fn storage_check(url: &str, bucket: &str) -> Span {
        tracing::span!(Level::INFO, "storage_check", url = %url, bucket = %bucket)
    }
}
