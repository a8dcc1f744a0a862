//! Result types shared by the pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Grow the box by `padding` on every side without leaving a `width` x `height` canvas
    #[must_use]
    pub fn expand_clamped(&self, padding: u32, width: u32, height: u32) -> Self {
        let left = self.x.saturating_sub(padding);
        let top = self.y.saturating_sub(padding);
        let right = self.right().saturating_add(padding).min(width);
        let bottom = self.bottom().saturating_add(padding).min(height);

        Self {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }

    /// Whether the box spans the whole `width` x `height` canvas
    #[must_use]
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

/// What the edge trimmer did with its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimOutcome {
    /// Cropped to the padded bounding box of the largest foreground region
    Trimmed(BoundingBox),
    /// Nothing but background; the input was returned unchanged
    NoForeground,
    /// Mask or contour computation failed; the input was returned unchanged
    Failed(String),
    /// The remover returned no alpha channel, so the original was kept as is
    NoAlpha,
}

impl TrimOutcome {
    #[must_use]
    pub fn is_trimmed(&self) -> bool {
        matches!(self, Self::Trimmed(_))
    }
}

/// Ordered fallbacks used to publish an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStrategy {
    /// Create-or-replace upload
    DirectUpsert,
    /// Write a placeholder into the destination directory, then upload again
    EnsureDirectoryThenUpsert,
    /// Replace an existing object in place
    UpdateInPlace,
}

impl UploadStrategy {
    /// Strategies in the order they are attempted
    pub const ORDERED: [Self; 3] = [
        Self::DirectUpsert,
        Self::EnsureDirectoryThenUpsert,
        Self::UpdateInPlace,
    ];
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectUpsert => write!(f, "direct upload"),
            Self::EnsureDirectoryThenUpsert => write!(f, "directory placeholder + upload"),
            Self::UpdateInPlace => write!(f, "update in place"),
        }
    }
}

/// One failed upload strategy and why it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAttempt {
    pub strategy: UploadStrategy,
    pub error: String,
}

/// Why the upload step did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No output label was given, so there is no remote name
    NoLabel,
    /// `SUPABASE_URL` or a key is missing
    MissingCredentials,
    /// The connectivity check failed
    ConnectionFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLabel => write!(f, "no name provided"),
            Self::MissingCredentials => write!(f, "storage credentials not configured"),
            Self::ConnectionFailed(reason) => write!(f, "connection check failed: {reason}"),
        }
    }
}

/// What happened to the remote copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        strategy: UploadStrategy,
        object_path: String,
        public_url: String,
        /// Strategies that failed before the successful one
        failed_attempts: Vec<UploadAttempt>,
    },
    Failed {
        object_path: String,
        attempts: Vec<UploadAttempt>,
    },
    Skipped(SkipReason),
}

impl UploadOutcome {
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    #[must_use]
    pub fn public_url(&self) -> Option<&str> {
        match self {
            Self::Uploaded { public_url, .. } => Some(public_url),
            _ => None,
        }
    }
}

/// Timing breakdown for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub image_decode_ms: u64,
    pub removal_ms: u64,
    pub postprocessing_ms: u64,
    pub trim_ms: u64,
    pub encode_ms: u64,
    pub upload_ms: u64,
    pub total_ms: u64,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct CleanupReport {
    /// Input file that was processed
    pub input_path: PathBuf,
    /// Stem used for the local and remote names
    pub output_name: String,
    /// The `<name>_clean.png` file
    pub output_path: PathBuf,
    /// Raw remover output, when retained
    pub debug_mask_path: Option<PathBuf>,
    /// Dimensions of the written image
    pub output_dimensions: (u32, u32),
    pub trim: TrimOutcome,
    pub upload: UploadOutcome,
    pub timings: ProcessingTimings,
}
