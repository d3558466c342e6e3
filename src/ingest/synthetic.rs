//! Synthetic thermal scenes (`stub://` sources and test fixtures).

use anyhow::Result;
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;

use super::source::{SourceInfo, VideoSource};
use crate::frame::ThermalFrame;

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
const BACKGROUND: u8 = 85;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub id: String,
    pub total_frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            id: "stub://synthetic".to_string(),
            total_frames: 300,
            fps: 30.0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Deterministic moving scene: a vehicle drifting right, a walking figure
/// and an aircraft with hot engines, on a uniform cool background.
pub struct SyntheticSource {
    config: SyntheticConfig,
    next_index: u64,
    opened: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            next_index: 0,
            opened: false,
        }
    }

    fn render(&self, index: u64) -> GrayImage {
        let (w, h) = (self.config.width as i32, self.config.height as i32);
        let mut canvas = Canvas::new(self.config.width, self.config.height);
        let shift = (index % 200) as i32;

        // Scene geometry is laid out for 640x480 and scaled to the frame.
        let sx = |x: i32| x * w / DEFAULT_WIDTH as i32;
        let sy = |y: i32| y * h / DEFAULT_HEIGHT as i32;

        canvas.fill_rect(sx(100 + shift), sy(200), sx(200 + shift), sy(260), 190);
        canvas.fill_rect(sx(110 + shift), sy(210), sx(140 + shift), sy(230), 240);
        canvas.fill_ellipse(sx(350), sy(250 - shift / 4), sx(15), sy(35), 215);
        canvas.fill_ellipse(sx(500 - shift / 2), sy(150), sx(60), sy(25), 200);
        canvas.fill_circle(sx(480 - shift / 2), sy(150), sx(12), 250);
        canvas.fill_circle(sx(520 - shift / 2), sy(150), sx(12), 250);
        canvas.image
    }
}

impl VideoSource for SyntheticSource {
    fn source_id(&self) -> &str {
        &self.config.id
    }

    fn open(&mut self) -> Result<SourceInfo> {
        self.next_index = 0;
        self.opened = true;
        log::info!(
            "SyntheticSource: opened {} ({} frames @ {:.1} fps)",
            self.config.id,
            self.config.total_frames,
            self.config.fps
        );
        Ok(SourceInfo {
            total_frames: self.config.total_frames,
            fps: self.config.fps,
            width: self.config.width,
            height: self.config.height,
        })
    }

    fn next_frame(&mut self) -> Result<Option<ThermalFrame>> {
        if !self.opened || self.next_index >= self.config.total_frames {
            return Ok(None);
        }
        let image = self.render(self.next_index);
        self.next_index += 1;
        ThermalFrame::from_image(image).map(Some)
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Static 640x480 reference scene with one of each target type.
pub fn test_frame() -> ThermalFrame {
    let mut canvas = Canvas::new(DEFAULT_WIDTH, DEFAULT_HEIGHT);
    // Vehicle body with a hot engine block.
    canvas.fill_rect(100, 200, 200, 260, 190);
    canvas.fill_rect(110, 210, 140, 230, 240);
    // Person: body and head.
    canvas.fill_ellipse(350, 250, 15, 35, 215);
    canvas.fill_circle(350, 220, 8, 210);
    // Aircraft fuselage and engines.
    canvas.fill_ellipse(500, 150, 60, 25, 200);
    canvas.fill_circle(480, 150, 12, 250);
    canvas.fill_circle(520, 150, 12, 250);
    ThermalFrame::with_channels(canvas.image.into_raw(), DEFAULT_WIDTH, DEFAULT_HEIGHT, 1)
}

/// Scene painter over a cool background. Shapes are clipped to the frame.
struct Canvas {
    image: GrayImage,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([BACKGROUND])),
        }
    }

    /// Inclusive corners.
    fn fill_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, value: u8) {
        let rect = Rect::at(x1.min(x2), y1.min(y2))
            .of_size(x1.abs_diff(x2) + 1, y1.abs_diff(y2) + 1);
        draw_filled_rect_mut(&mut self.image, rect, Luma([value]));
    }

    fn fill_ellipse(&mut self, cx: i32, cy: i32, ax: i32, ay: i32, value: u8) {
        draw_filled_ellipse_mut(&mut self.image, (cx, cy), ax.max(1), ay.max(1), Luma([value]));
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, value: u8) {
        self.fill_ellipse(cx, cy, radius, radius, value);
    }
}
