//! Local file frame source.
//!
//! `FileSource` picks a decoder from the path:
//! - `stub://name[?frames=N&fps=F]`: deterministic synthetic scene
//! - `*.y4m`: built-in YUV4MPEG2 reader
//! - anything else: FFmpeg (feature `ingest-file-ffmpeg`)
//!
//! Only local paths are accepted; URL schemes other than `stub://` are
//! rejected up front.

use anyhow::{anyhow, Result};
use image::GrayImage;
use std::path::Path;

use super::normalize::{inject_signatures, simulate_thermal};
use super::source::{SourceInfo, VideoSource};
use super::synthetic::{SyntheticConfig, SyntheticSource};
use super::y4m::Y4mReader;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::ThermalFrame;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/sentinel/flight.y4m") or `stub://` URI.
    pub path: String,
    /// Treat decoded luminance as ordinary video and convert it to a
    /// thermal-like frame. Disable for sources that already carry raw
    /// thermal intensity.
    pub simulate_thermal: bool,
    /// Randomly stamp hot discs into frames (demo footage only).
    pub inject_signatures: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            simulate_thermal: true,
            inject_signatures: false,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: FileBackend,
    frames_read: u64,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Y4m(Y4mReader),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let backend = if let Some(rest) = config.path.strip_prefix("stub://") {
            FileBackend::Synthetic(SyntheticSource::new(parse_stub(&config.path, rest)?))
        } else if has_extension(&config.path, "y4m") {
            FileBackend::Y4m(Y4mReader::new(&config.path))
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                FileBackend::Ffmpeg(FfmpegFileSource::new(&config.path))
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(anyhow!(
                    "{} requires the ingest-file-ffmpeg feature (only .y4m and stub:// are built in)",
                    config.path
                ));
            }
        };
        Ok(Self {
            config,
            backend,
            frames_read: 0,
        })
    }

    fn finish_frame(&self, luma: Vec<u8>, width: u32, height: u32) -> Result<ThermalFrame> {
        let luma = GrayImage::from_raw(width, height, luma)
            .ok_or_else(|| anyhow!("decoded plane does not fit {}x{}", width, height))?;
        let mut image = if self.config.simulate_thermal {
            simulate_thermal(&luma)
        } else {
            luma
        };
        if self.config.inject_signatures {
            inject_signatures(&mut image, &mut rand::thread_rng());
        }
        ThermalFrame::from_image(image)
    }
}

impl VideoSource for FileSource {
    fn source_id(&self) -> &str {
        &self.config.path
    }

    fn open(&mut self) -> Result<SourceInfo> {
        self.frames_read = 0;
        let info = match &mut self.backend {
            FileBackend::Synthetic(source) => source.open()?,
            FileBackend::Y4m(reader) => reader.open()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.open()?,
        };
        log::info!(
            "FileSource: opened {} ({}x{}, {} frames, {:.1} fps)",
            self.config.path,
            info.width,
            info.height,
            info.total_frames,
            info.fps
        );
        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<ThermalFrame>> {
        let decoded = match &mut self.backend {
            // Synthetic scenes are already thermal.
            FileBackend::Synthetic(source) => {
                let frame = source.next_frame()?;
                if frame.is_some() {
                    self.frames_read += 1;
                }
                return Ok(frame);
            }
            FileBackend::Y4m(reader) => reader.next_luma()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_luma()?,
        };
        let Some((luma, width, height)) = decoded else {
            return Ok(None);
        };
        self.frames_read += 1;
        self.finish_frame(luma, width, height).map(Some)
    }

    fn close(&mut self) {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.close(),
            FileBackend::Y4m(reader) => reader.close(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.close(),
        }
        log::debug!(
            "FileSource: closed {} after {} frames",
            self.config.path,
            self.frames_read
        );
    }
}

fn parse_stub(path: &str, rest: &str) -> Result<SyntheticConfig> {
    let mut config = SyntheticConfig {
        id: path.to_string(),
        ..SyntheticConfig::default()
    };
    let Some((_, query)) = rest.split_once('?') else {
        return Ok(config);
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid stub parameter '{}'", pair))?;
        match key {
            "frames" => {
                config.total_frames = value
                    .parse()
                    .map_err(|_| anyhow!("stub frames must be an integer"))?
            }
            "fps" => {
                config.fps = value
                    .parse()
                    .map_err(|_| anyhow!("stub fps must be a number"))?
            }
            "width" => {
                config.width = value
                    .parse()
                    .map_err(|_| anyhow!("stub width must be an integer"))?
            }
            "height" => {
                config.height = value
                    .parse()
                    .map_err(|_| anyhow!("stub height must be an integer"))?
            }
            other => return Err(anyhow!("unknown stub parameter '{}'", other)),
        }
    }
    if config.width == 0 || config.height == 0 {
        return Err(anyhow!("stub frame size must be non-zero"));
    }
    Ok(config)
}

fn has_extension(path: &str, ext: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
