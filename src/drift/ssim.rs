//! Mean windowed structural similarity on grayscale images.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

const WINDOW: u32 = 8;
const STRIDE: usize = 4;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Grayscale pair at a common size: `generated` is resized to the
/// baseline's dimensions, then both are capped at `max_side`.
pub(crate) fn aligned_pair(
    generated: &DynamicImage,
    baseline: &DynamicImage,
    max_side: u32,
) -> (GrayImage, GrayImage) {
    let (mut w, mut h) = (baseline.width().max(1), baseline.height().max(1));
    let longest = w.max(h);
    if longest > max_side {
        w = ((w as u64 * max_side as u64) / longest as u64).max(1) as u32;
        h = ((h as u64 * max_side as u64) / longest as u64).max(1) as u32;
    }
    let fit = |img: &DynamicImage| {
        if img.width() == w && img.height() == h {
            img.to_luma8()
        } else {
            img.resize_exact(w, h, FilterType::Triangle).to_luma8()
        }
    };
    (fit(generated), fit(baseline))
}

/// SSIM averaged over 8x8 windows at stride 4, clamped to [0, 1].
///
/// Both images must share dimensions; images smaller than a window are
/// compared as a single window.
pub fn mean_ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = a.dimensions();
    let win_w = WINDOW.min(w);
    let win_h = WINDOW.min(h);
    if win_w == 0 || win_h == 0 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut count = 0usize;
    for y0 in (0..=h - win_h).step_by(STRIDE) {
        for x0 in (0..=w - win_w).step_by(STRIDE) {
            total += window_ssim(a, b, x0, y0, win_w, win_h);
            count += 1;
        }
    }
    (total / count.max(1) as f64).clamp(0.0, 1.0)
}

fn window_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32, w: u32, h: u32) -> f64 {
    let n = (w * h) as f64;
    let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let pa = a.get_pixel(x, y).0[0] as f64;
            let pb = b.get_pixel(x, y).0[0] as f64;
            sa += pa;
            sb += pb;
            saa += pa * pa;
            sbb += pb * pb;
            sab += pa * pb;
        }
    }
    let (ma, mb) = (sa / n, sb / n);
    let var_a = (saa / n - ma * ma).max(0.0);
    let var_b = (sbb / n - mb * mb).max(0.0);
    let cov = sab / n - ma * mb;

    ((2.0 * ma * mb + C1) * (2.0 * cov + C2)) / ((ma * ma + mb * mb + C1) * (var_a + var_b + C2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn stripes(period: u32) -> GrayImage {
        GrayImage::from_fn(32, 32, |x, _| Luma([if (x / period) % 2 == 0 { 20 } else { 230 }]))
    }

    #[test]
    fn test_identical_is_one() {
        let img = stripes(4);
        assert!((mean_ssim(&img, &img) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_different_structure_scores_lower() {
        let score = mean_ssim(&stripes(4), &stripes(2));
        assert!(score < 0.8, "score {score}");
        assert!(score >= 0.0);
    }

    #[test]
    fn test_aligned_pair_uses_baseline_size() {
        let generated = DynamicImage::ImageLuma8(GrayImage::new(64, 48));
        let baseline = DynamicImage::ImageLuma8(GrayImage::new(32, 24));
        let (g, b) = aligned_pair(&generated, &baseline, 256);
        assert_eq!(g.dimensions(), (32, 24));
        assert_eq!(b.dimensions(), (32, 24));

        let big = DynamicImage::ImageLuma8(GrayImage::new(1024, 768));
        let (g, _) = aligned_pair(&big, &big, 256);
        assert_eq!(g.dimensions(), (256, 192));
    }

    #[test]
    fn test_tiny_images() {
        let a = GrayImage::from_pixel(3, 3, Luma([100]));
        assert!((mean_ssim(&a, &a) - 1.0).abs() < 1e-9);
    }
}
