//! Frame containers and the bounded per-run history.
//!
//! - `ThermalFrame`: single-channel 8-bit intensity frame handed to detectors.
//! - `FrameResult`: immutable record of what one frame produced.
//! - `FrameHistory`: bounded ring of recent `FrameResult`s in frame order.

use anyhow::{anyhow, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::detect::{Detection, FramePerformance};

/// Default retained history window.
pub const DEFAULT_HISTORY_FRAMES: usize = 1000;

// ----------------------------------------------------------------------------
// ThermalFrame
// ----------------------------------------------------------------------------

/// Decoded frame. Detectors expect one channel; values are raw sensor levels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThermalFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl ThermalFrame {
    /// Build a validated single-channel frame.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let frame = Self::with_channels(data, width, height, 1);
        frame.validate()?;
        Ok(frame)
    }

    /// Build a frame without validation. Detectors reject anything that is
    /// not a non-empty single-channel buffer of the declared size.
    pub fn with_channels(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Wrap a decoded luminance image.
    pub fn from_image(image: GrayImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    /// Copy into an `image` buffer for filtering. Fails for malformed frames.
    pub fn to_image(&self) -> Result<GrayImage> {
        self.validate()?;
        GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            anyhow!(
                "frame buffer does not fit {}x{}",
                self.width,
                self.height
            )
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "frame has zero size ({}x{})",
                self.width,
                self.height
            ));
        }
        if self.channels != 1 {
            return Err(anyhow!(
                "expected single-channel intensity frame, got {} channels",
                self.channels
            ));
        }
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if self.data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {}, got {}",
                expected,
                self.data.len()
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// FrameResult
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_number: u64,
    /// Seconds into the source; 0 when the frame rate is unknown.
    pub timestamp: f64,
    pub detections: Vec<Detection>,
    pub performance: FramePerformance,
    /// Consecutive per-frame failures at the time this frame settled.
    pub consecutive_errors: u32,
}

// ----------------------------------------------------------------------------
// FrameHistory
// ----------------------------------------------------------------------------

/// Bounded history of frame results.
///
/// Entries are kept in frame order. Pushing beyond `max_frames` evicts the
/// oldest entries, trading historical detail for bounded memory.
#[derive(Clone, Debug)]
pub struct FrameHistory {
    buffer: VecDeque<FrameResult>,
    max_frames: usize,
}

impl FrameHistory {
    pub fn new(max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            buffer: VecDeque::with_capacity(max_frames.min(DEFAULT_HISTORY_FRAMES)),
            max_frames,
        }
    }

    pub fn push(&mut self, result: FrameResult) {
        while self.buffer.len() >= self.max_frames {
            self.buffer.pop_front();
        }
        self.buffer.push_back(result);
    }

    /// Keep only the most recent `keep` entries. Returns how many were dropped.
    pub fn trim_to(&mut self, keep: usize) -> usize {
        let excess = self.buffer.len().saturating_sub(keep);
        self.buffer.drain(..excess);
        excess
    }

    /// Release spare capacity back to the allocator.
    pub fn shrink_to_fit(&mut self) {
        self.buffer.shrink_to_fit();
    }

    pub fn get(&self, frame_number: u64) -> Option<&FrameResult> {
        self.buffer
            .binary_search_by_key(&frame_number, |r| r.frame_number)
            .ok()
            .and_then(|idx| self.buffer.get(idx))
    }

    pub fn latest(&self) -> Option<&FrameResult> {
        self.buffer.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameResult> {
        self.buffer.iter()
    }

    pub fn to_vec(&self) -> Vec<FrameResult> {
        self.buffer.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_FRAMES)
    }
}
