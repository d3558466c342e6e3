//! Conversion of decoded video into thermal-like intensity frames.
//!
//! Ordinary video is reduced to luminance, lightly smoothed and
//! histogram-equalised so bright regions behave like warm ones. Real thermal
//! sensors deliver the intensity plane directly and skip this step.

use image::{GrayImage, Luma};
use imageproc::contrast::equalize_histogram;
use imageproc::drawing::draw_filled_circle_mut;
use rand::Rng;

use crate::detect::preprocess::gaussian_blur;

/// Smooth (3x3) and equalise a luminance plane into a thermal-like frame.
pub fn simulate_thermal(luma: &GrayImage) -> GrayImage {
    equalize_histogram(&gaussian_blur(luma, 3))
}

/// With 30% probability, stamp one to three random hot discs into the frame.
/// Used only for demonstrations on footage without real heat sources.
pub fn inject_signatures<R: Rng>(image: &mut GrayImage, rng: &mut R) {
    let (width, height) = image.dimensions();
    if width <= 100 || height <= 100 || rng.gen::<f64>() <= 0.7 {
        return;
    }
    let (w, h) = (width as i32, height as i32);
    for _ in 0..rng.gen_range(1..4) {
        let x = rng.gen_range(50..w - 50);
        let y = rng.gen_range(50..h - 50);
        let size = rng.gen_range(10..30);
        let intensity = rng.gen_range(200..=255u8);
        draw_filled_circle_mut(image, (x, y), size, Luma([intensity]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn equalization_stretches_to_full_range() {
        let luma = GrayImage::from_raw(4, 1, vec![100, 100, 110, 120]).unwrap();
        let eq = equalize_histogram(&luma);
        let levels: Vec<u8> = eq.pixels().map(|p| p[0]).collect();
        assert_eq!(levels[0], levels[1]);
        assert!(levels[1] < levels[2] && levels[2] < levels[3]);
        assert_eq!(levels[3], 255);
    }

    #[test]
    fn simulated_frames_keep_their_size_and_ordering() {
        let luma = GrayImage::from_fn(64, 48, |x, _| Luma([(x * 2) as u8]));
        let thermal = simulate_thermal(&luma);
        assert_eq!(thermal.dimensions(), (64, 48));
        assert!(thermal.get_pixel(5, 10)[0] < thermal.get_pixel(60, 10)[0]);
        assert_eq!(thermal.get_pixel(63, 0)[0], 255);
    }

    #[test]
    fn injection_leaves_small_frames_alone() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut image = GrayImage::new(64, 64);
        for _ in 0..20 {
            inject_signatures(&mut image, &mut rng);
        }
        assert!(image.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn injection_stamps_hot_discs_on_large_frames() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut image = GrayImage::new(200, 200);
        for _ in 0..100 {
            inject_signatures(&mut image, &mut rng);
        }
        assert!(image.pixels().any(|p| p[0] >= 200));
        assert!(image.pixels().all(|p| p[0] == 0 || p[0] >= 200));
    }
}
