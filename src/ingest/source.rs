use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::ThermalFrame;

/// Properties a source declares when opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Declared frame count; 0 when unknown.
    pub total_frames: u64,
    /// Declared frame rate; 0.0 when unknown.
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// Sequential frame source driven by the frame loop.
pub trait VideoSource {
    /// Identifier recorded in checkpoints and used for resume lookup.
    fn source_id(&self) -> &str;

    /// Open the underlying stream. Failure here is fatal for a run.
    fn open(&mut self) -> Result<SourceInfo>;

    /// Read the next frame. `Ok(None)` marks a normal end of stream.
    fn next_frame(&mut self) -> Result<Option<ThermalFrame>>;

    /// Release the underlying handle. Called once when a run ends.
    fn close(&mut self) {}
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    fn open(&mut self) -> Result<SourceInfo> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<Option<ThermalFrame>> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
