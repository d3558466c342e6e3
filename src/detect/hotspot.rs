//! Hotspot extraction: band thresholding, mask cleanup and region analysis.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::contour_area;
use imageproc::morphology::{grayscale_close, grayscale_open, Mask};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use super::result::BoundingBox;

/// Regions at or below this contour area are ignored.
pub const MIN_HOTSPOT_AREA: f64 = 100.0;

/// Fixed intensity band used to seed hotspot search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    High,
    Medium,
    Low,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::High, Band::Medium, Band::Low];

    /// Inclusive intensity range.
    pub fn range(self) -> (u8, u8) {
        match self {
            Band::High => (220, 255),
            Band::Medium => (180, 220),
            Band::Low => (150, 180),
        }
    }
}

/// Candidate region prior to classification.
#[derive(Clone, Debug, PartialEq)]
pub struct Hotspot {
    pub bbox: BoundingBox,
    /// Area enclosed by the region's outer contour.
    pub area: f64,
    pub mean_intensity: f64,
    pub max_intensity: u8,
    pub aspect_ratio: f64,
    pub band: Band,
}

/// Search every band of a preprocessed frame for hotspots.
pub fn find_hotspots(image: &GrayImage, morph_kernel: usize) -> Vec<Hotspot> {
    let element = structuring_element(morph_kernel);
    let mut hotspots = Vec::new();
    for band in Band::ALL {
        let mask = band_mask(image, band);
        let cleaned = grayscale_open(&grayscale_close(&mask, &element), &element);

        for region in external_regions(&cleaned) {
            if region.area <= MIN_HOTSPOT_AREA {
                continue;
            }
            let (mean_intensity, max_intensity) = roi_stats(image, &region.bbox);
            hotspots.push(Hotspot {
                bbox: region.bbox,
                area: region.area,
                mean_intensity,
                max_intensity,
                aspect_ratio: region.bbox.aspect_ratio(),
                band,
            });
        }
    }
    hotspots
}

/// Binary mask (0/255) of the pixels inside `band`.
fn band_mask(image: &GrayImage, band: Band) -> GrayImage {
    let (lo, hi) = band.range();
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y)[0];
        Luma([if (lo..=hi).contains(&p) { 255 } else { 0 }])
    })
}

/// Offsets `(dx, dy)` of an elliptical structuring element of side `size`.
pub(crate) fn ellipse_offsets(size: usize) -> Vec<(isize, isize)> {
    let size = size.clamp(1, 255);
    let r = (size / 2) as isize;
    let mut offsets = Vec::new();
    if r == 0 {
        offsets.push((0, 0));
        return offsets;
    }
    let rf = r as f64;
    for dy in -r..=r {
        let dyf = dy as f64;
        let dx = (rf * ((rf * rf - dyf * dyf) / (rf * rf)).sqrt()).round() as isize;
        for x in -dx..=dx {
            offsets.push((x, dy));
        }
    }
    offsets
}

/// Elliptical element as a morphology mask. Pixels outside the frame never
/// influence the result.
fn structuring_element(size: usize) -> Mask {
    let offsets = ellipse_offsets(size);
    let r = offsets.iter().map(|&(_, dy)| dy.unsigned_abs()).max().unwrap_or(0);
    let side = (2 * r + 1) as u32;
    let mut image = GrayImage::new(side, side);
    for &(dx, dy) in &offsets {
        let x = (dx + r as isize) as u32;
        let y = (dy + r as isize) as u32;
        image.put_pixel(x, y, Luma([255]));
    }
    Mask::from_image(&image, r as u8, r as u8)
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Region {
    pub bbox: BoundingBox,
    pub area: f64,
}

/// Outermost 8-connected regions of a mask. Holes, and anything nested
/// inside a hole, belong to the enclosing region.
pub(crate) fn external_regions(mask: &GrayImage) -> Vec<Region> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| {
            matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none()
        })
        .filter_map(|contour| region_of(&contour.points))
        .collect()
}

/// Bounding box and enclosed polygon area of one traced border.
fn region_of(points: &[Point<i32>]) -> Option<Region> {
    let first = points.first()?;
    let (mut min_x, mut min_y) = (first.x, first.y);
    let (mut max_x, mut max_y) = (first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Region {
        bbox: BoundingBox {
            x1: min_x.max(0) as u32,
            y1: min_y.max(0) as u32,
            x2: (max_x + 1).max(0) as u32,
            y2: (max_y + 1).max(0) as u32,
        },
        area: contour_area(points).abs(),
    })
}

fn roi_stats(image: &GrayImage, bbox: &BoundingBox) -> (f64, u8) {
    let mut sum = 0u64;
    let mut max = 0u8;
    let mut count = 0u64;
    for y in bbox.y1..bbox.y2.min(image.height()) {
        for x in bbox.x1..bbox.x2.min(image.width()) {
            let p = image.get_pixel(x, y)[0];
            sum += p as u64;
            max = max.max(p);
            count += 1;
        }
    }
    let mean = if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    };
    (mean, max)
}
