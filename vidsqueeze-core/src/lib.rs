//! Core library for adaptive video conversion.
//!
//! This crate turns one conversion request into a bounded sequence of
//! encoder invocations with progressively cheaper settings: it probes the
//! selected file, plans concrete encode parameters from a target size or
//! quality preference, and drives an opaque encoder engine through an
//! attempt ladder until an output satisfies the request or the ladder is
//! exhausted.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use vidsqueeze_core::{
//!     ConversionController, ConversionOptions, FfprobeMetadataExtractor,
//!     SidecarEngineProvider, SourceFile,
//! };
//!
//! let controller = ConversionController::new(
//!     Box::new(SidecarEngineProvider),
//!     Box::new(FfprobeMetadataExtractor),
//! );
//!
//! let bytes = std::fs::read("clip.mp4").unwrap();
//! let metadata = controller
//!     .select_file(SourceFile::new("clip.mp4", bytes))
//!     .unwrap();
//! println!(
//!     "{}x{}, {:.1}s",
//!     metadata.width, metadata.height, metadata.duration_seconds
//! );
//!
//! let options = ConversionOptions {
//!     target_size_bytes: Some(10 * 1024 * 1024),
//!     ..Default::default()
//! };
//! controller.start_conversion(options).unwrap();
//! let output = controller.output().unwrap();
//! std::fs::write("clip-small.mp4", &output.bytes).unwrap();
//! ```

pub mod controller;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod options;
pub mod planning;
pub mod progress;
pub mod utils;

// Re-exports for the public API
pub use controller::{
    CancellationToken, ConversionController, ConversionRequest, ConversionState,
};
pub use engine::sidecar::{SidecarEngine, SidecarEngineProvider};
pub use engine::{Engine, EngineEvent, EngineProvider, EngineTerminator};
pub use error::{CoreError, CoreResult};
pub use metadata::{FfprobeMetadataExtractor, MediaMetadata, MetadataExtractor};
pub use options::{ConversionOptions, OutputFormat, Quality};
pub use planning::{AttemptPlan, PlanMode, RateControl};
pub use progress::{NullProgressCallback, ProgressCallback, ProgressSnapshot};
pub use utils::{format_bytes, format_duration, parse_ffmpeg_time};

/// Opaque byte-bearing handle to the user-selected input file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Lowercased input extension including the leading dot, defaulting to
    /// `.mp4` when the name carries none.
    #[must_use]
    pub fn extension(&self) -> String {
        self.name
            .rfind('.')
            .map(|i| self.name[i..].to_ascii_lowercase())
            .unwrap_or_else(|| ".mp4".to_string())
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Result of a successful conversion: the output bytes and their MIME
/// type. Produced exactly once per request and discarded on reset.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}
