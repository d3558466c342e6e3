//! Frame conditioning ahead of hotspot search.
//!
//! The blur runs through `imageproc`'s separable filter (edge pixels are
//! replicated). `imageproc` has no contrast-limited equaliser, so CLAHE is
//! implemented here with reflect-101 padding (`dcb|abcd|cba`).

use image::{GrayImage, Luma};
use imageproc::filter::separable_filter_equal;

/// Local contrast enhancement grid (tiles per axis).
pub const CLAHE_GRID: usize = 8;
/// Histogram clip limit, relative to a uniform distribution.
pub const CLAHE_CLIP_LIMIT: f64 = 2.0;

/// Smooth then contrast-enhance a frame.
pub fn preprocess(image: &GrayImage, blur_kernel: usize) -> GrayImage {
    let blurred = gaussian_blur(image, blur_kernel);
    clahe(&blurred, CLAHE_CLIP_LIMIT, CLAHE_GRID)
}

pub(crate) fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let mut i = index;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * len - 2 - i;
        }
    }
    i as usize
}

/// 1-D Gaussian weights. Sizes up to 7 use fixed tables; larger sizes derive
/// sigma from the size.
pub(crate) fn gaussian_kernel(size: usize) -> Vec<f32> {
    match size {
        0 | 1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
        _ => {
            let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
            let center = (size / 2) as f64;
            let weights: Vec<f64> = (0..size)
                .map(|i| {
                    let d = i as f64 - center;
                    (-(d * d) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let sum: f64 = weights.iter().sum();
            weights.iter().map(|w| (w / sum) as f32).collect()
        }
    }
}

/// Separable Gaussian blur with a square kernel of side `kernel_size`.
pub fn gaussian_blur(image: &GrayImage, kernel_size: usize) -> GrayImage {
    if kernel_size <= 1 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    separable_filter_equal(image, &gaussian_kernel(kernel_size))
}

/// Contrast-limited adaptive histogram equalisation.
///
/// The frame is virtually padded (reflect-101) up to a multiple of `grid`
/// so every tile has the same size; per-tile lookup tables are blended
/// bilinearly between neighbouring tile centres.
pub fn clahe(image: &GrayImage, clip_limit: f64, grid: usize) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 || grid == 0 {
        return image.clone();
    }
    let pixels = image.as_raw();
    let padded_w = width.div_ceil(grid) * grid;
    let padded_h = height.div_ceil(grid) * grid;
    let tile_w = padded_w / grid;
    let tile_h = padded_h / grid;
    let tile_area = tile_w * tile_h;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f64 / 256.0) as usize).max(1)
    } else {
        usize::MAX
    };
    let lut_scale = 255.0 / tile_area as f64;

    let mut luts = vec![[0u8; 256]; grid * grid];
    for ty in 0..grid {
        for tx in 0..grid {
            let mut hist = [0usize; 256];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(y as isize, height);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x as isize, width);
                    hist[pixels[sy * width + sx] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);

            let lut = &mut luts[ty * grid + tx];
            let mut cumulative = 0usize;
            for (level, count) in hist.iter().enumerate() {
                cumulative += count;
                lut[level] = clamp_to_u8(cumulative as f64 * lut_scale);
            }
        }
    }

    let inv_tw = 1.0 / tile_w as f64;
    let inv_th = 1.0 / tile_h as f64;
    let last = grid as isize - 1;
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let tyf = y as f64 * inv_th - 0.5;
        let ty1 = tyf.floor() as isize;
        let ya = tyf - ty1 as f64;
        let ty2 = (ty1 + 1).min(last) as usize;
        let ty1 = ty1.max(0) as usize;

        let txf = x as f64 * inv_tw - 0.5;
        let tx1 = txf.floor() as isize;
        let xa = txf - tx1 as f64;
        let tx2 = (tx1 + 1).min(last) as usize;
        let tx1 = tx1.max(0) as usize;

        let v = image.get_pixel(x, y)[0] as usize;
        let top = luts[ty1 * grid + tx1][v] as f64 * (1.0 - xa)
            + luts[ty1 * grid + tx2][v] as f64 * xa;
        let bottom = luts[ty2 * grid + tx1][v] as f64 * (1.0 - xa)
            + luts[ty2 * grid + tx2][v] as f64 * xa;
        Luma([clamp_to_u8(top * (1.0 - ya) + bottom * ya)])
    })
}

fn clip_histogram(hist: &mut [usize; 256], clip: usize) {
    let mut excess = 0usize;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    if excess == 0 {
        return;
    }
    let batch = excess / 256;
    let mut residual = excess - batch * 256;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut level = 0;
        while level < 256 && residual > 0 {
            hist[level] += 1;
            residual -= 1;
            level += step;
        }
    }
}

fn clamp_to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_101_mirrors_without_repeating_edge() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn small_kernels_use_fixed_tables() {
        assert_eq!(gaussian_kernel(3), vec![0.25, 0.5, 0.25]);
        assert_eq!(gaussian_kernel(5), vec![0.0625, 0.25, 0.375, 0.25, 0.0625]);
        let seven = gaussian_kernel(7);
        assert_eq!(seven[3], 0.28125);
        assert_eq!(seven.iter().sum::<f32>(), 1.0);

        let nine = gaussian_kernel(9);
        assert_eq!(nine.len(), 9);
        assert!((nine.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(nine[4] > nine[3] && nine[0] < nine[1]);
    }

    #[test]
    fn three_tap_blur_spreads_a_single_spike() {
        let mut image = GrayImage::new(5, 5);
        image.put_pixel(2, 2, Luma([160]));
        let out = gaussian_blur(&image, 3);
        // Outer product of [1/4, 1/2, 1/4].
        assert_eq!(out.get_pixel(2, 2)[0], 40);
        assert_eq!(out.get_pixel(1, 2)[0], 20);
        assert_eq!(out.get_pixel(2, 1)[0], 20);
        assert_eq!(out.get_pixel(1, 1)[0], 10);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn blur_preserves_flat_frames() {
        let flat = GrayImage::from_pixel(32, 24, Luma([120]));
        assert_eq!(gaussian_blur(&flat, 5), flat);
    }

    #[test]
    fn blur_softens_a_step_edge() {
        let image = GrayImage::from_fn(16, 4, |x, _| Luma([if x >= 8 { 200 } else { 0 }]));
        let out = gaussian_blur(&image, 5);
        let left = out.get_pixel(7, 0)[0];
        let right = out.get_pixel(8, 0)[0];
        assert!(left > 0 && left < 200);
        assert!(right > 0 && right < 200);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(15, 0)[0], 200);
    }

    #[test]
    fn clahe_keeps_bright_regions_bright() {
        let image = GrayImage::from_fn(64, 64, |x, y| {
            let inside = (16..48).contains(&x) && (16..48).contains(&y);
            Luma([if inside { 240 } else { 85 }])
        });
        let out = clahe(&image, CLAHE_CLIP_LIMIT, CLAHE_GRID);
        assert_eq!(out.dimensions(), image.dimensions());
        let centre = out.get_pixel(32, 32)[0];
        let corner = out.get_pixel(0, 0)[0];
        assert!(centre > corner);
        assert!(centre >= 220, "centre mapped to {}", centre);
    }

    #[test]
    fn clahe_handles_frames_smaller_than_grid() {
        let image = GrayImage::from_raw(3, 2, vec![10u8, 200, 30, 90, 180, 60]).unwrap();
        let out = clahe(&image, CLAHE_CLIP_LIMIT, CLAHE_GRID);
        assert_eq!(out.dimensions(), (3, 2));
    }
}
