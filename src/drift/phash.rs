//! DCT perceptual hash
//!
//! 64-bit hash over the low-frequency block of a 32x32 grayscale DCT. Each
//! bit says whether a coefficient lies above the block median (DC excluded
//! from the median).

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

const SAMPLE: usize = 32;
const BLOCK: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    pub fn of(image: &DynamicImage) -> Self {
        let gray = image
            .resize_exact(SAMPLE as u32, SAMPLE as u32, FilterType::Triangle)
            .to_luma8();
        let pixels: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64).collect();
        let coeffs = dct_2d(&pixels, SAMPLE);

        let mut block = Vec::with_capacity(BLOCK * BLOCK);
        for y in 0..BLOCK {
            for x in 0..BLOCK {
                block.push(coeffs[y * SAMPLE + x]);
            }
        }
        let mut ac: Vec<f64> = block[1..].to_vec();
        ac.sort_by(|a, b| a.total_cmp(b));
        let median = (ac[ac.len() / 2 - 1] + ac[ac.len() / 2]) / 2.0;

        let bits = block
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, c)| if *c > median { acc | (1 << i) } else { acc });
        PerceptualHash(bits)
    }

    pub fn hamming(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// `1 - hamming / 64`, in [0, 1].
    pub fn similarity(&self, other: &PerceptualHash) -> f64 {
        1.0 - self.hamming(other) as f64 / 64.0
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Separable DCT-II over an `n x n` row-major matrix.
fn dct_2d(input: &[f64], n: usize) -> Vec<f64> {
    let table: Vec<f64> = (0..n * n)
        .map(|i| {
            let (k, x) = (i / n, i % n);
            ((2 * x + 1) as f64 * k as f64 * PI / (2 * n) as f64).cos()
        })
        .collect();

    let mut rows = vec![0.0; n * n];
    for y in 0..n {
        for k in 0..n {
            rows[y * n + k] = (0..n).map(|x| input[y * n + x] * table[k * n + x]).sum();
        }
    }
    let mut out = vec![0.0; n * n];
    for x in 0..n {
        for k in 0..n {
            out[k * n + x] = (0..n).map(|y| rows[y * n + x] * table[k * n + y]).sum();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, GrayImage};

    fn textured(flip: bool) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
            let v = ((x * 31 + y * 17) ^ (x * y)) as u8;
            Luma([if flip { 255 - v } else { v }])
        }))
    }

    #[test]
    fn test_identical_images_hash_equal() {
        let a = PerceptualHash::of(&textured(false));
        let b = PerceptualHash::of(&textured(false));
        assert_eq!(a, b);
        assert_eq!(a.similarity(&b), 1.0);
    }

    #[test]
    fn test_inverted_image_is_far() {
        let a = PerceptualHash::of(&textured(false));
        let b = PerceptualHash::of(&textured(true));
        assert!(a.similarity(&b) < 0.5, "similarity {}", a.similarity(&b));
    }

    #[test]
    fn test_display_is_fixed_width_hex() {
        assert_eq!(PerceptualHash(0xab).to_string(), "00000000000000ab");
    }
}
