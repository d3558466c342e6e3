//! Frame ingestion sources.
//!
//! Every source implements `VideoSource`: it declares frame count, rate and
//! dimensions when opened and then yields single-channel `ThermalFrame`s
//! until end of stream.
//!
//! - `stub://` synthetic scenes (testing, demos)
//! - Local `.y4m` files (built in)
//! - Other local video files (feature: ingest-file-ffmpeg)

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod normalize;
pub mod source;
pub mod synthetic;
mod y4m;

pub use file::{FileConfig, FileSource};
pub use source::{SourceInfo, VideoSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
