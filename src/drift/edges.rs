//! Edge alignment
//!
//! Sobel edge maps of both images are compared with a pixel tolerance:
//! an edge counts as matched if the other map has an edge within
//! `tolerance_px` (square dilation). Returns precision, recall and F1.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Sobel gradient magnitude above which a pixel is an edge.
const EDGE_MAGNITUDE: f32 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeAlignment {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

pub fn edge_map(img: &GrayImage) -> Vec<bool> {
    let (w, h) = img.dimensions();
    let (w, h) = (w as i64, h as i64);
    let px = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, w - 1) as u32;
        let cy = y.clamp(0, h - 1) as u32;
        img.get_pixel(cx, cy).0[0] as f32
    };

    let mut edges = vec![false; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x, y - 1)
                - px(x + 1, y - 1);
            edges[(y * w + x) as usize] = (gx * gx + gy * gy).sqrt() > EDGE_MAGNITUDE;
        }
    }
    edges
}

fn dilate(map: &[bool], w: usize, h: usize, radius: usize) -> Vec<bool> {
    if radius == 0 {
        return map.to_vec();
    }
    // separable: rows then columns
    let mut rows = vec![false; map.len()];
    for y in 0..h {
        for x in 0..w {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(w - 1);
            rows[y * w + x] = (lo..=hi).any(|i| map[y * w + i]);
        }
    }
    let mut out = vec![false; map.len()];
    for y in 0..h {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(h - 1);
        for x in 0..w {
            out[y * w + x] = (lo..=hi).any(|j| rows[j * w + x]);
        }
    }
    out
}

fn matched(edges: &[bool], against: &[bool]) -> (usize, usize) {
    edges
        .iter()
        .zip(against)
        .fold((0, 0), |(hit, total), (e, a)| match (e, a) {
            (true, true) => (hit + 1, total + 1),
            (true, false) => (hit, total + 1),
            _ => (hit, total),
        })
}

/// Tolerant edge F1 of `generated` against `baseline` (same dimensions).
pub fn edge_alignment(generated: &GrayImage, baseline: &GrayImage, tolerance_px: u32) -> EdgeAlignment {
    let (w, h) = baseline.dimensions();
    let (w, h) = (w as usize, h as usize);
    if w == 0 || h == 0 {
        return EdgeAlignment { precision: 1.0, recall: 1.0, f1: 1.0 };
    }
    let gen_edges = edge_map(generated);
    let base_edges = edge_map(baseline);
    let radius = tolerance_px as usize;

    let (gen_hit, gen_total) = matched(&gen_edges, &dilate(&base_edges, w, h, radius));
    let (base_hit, base_total) = matched(&base_edges, &dilate(&gen_edges, w, h, radius));

    match (gen_total, base_total) {
        (0, 0) => EdgeAlignment { precision: 1.0, recall: 1.0, f1: 1.0 },
        (0, _) | (_, 0) => EdgeAlignment { precision: 0.0, recall: 0.0, f1: 0.0 },
        _ => {
            let precision = gen_hit as f64 / gen_total as f64;
            let recall = base_hit as f64 / base_total as f64;
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            EdgeAlignment { precision, recall, f1 }
        }
    }
}
