//! Template matching
//!
//! Scores are zero-mean normalized cross-correlation, so they live in
//! `[-1, 1]` and compare directly against the locator's confidence tiers.
//! Large templates are first searched on a downscaled copy of both images and
//! the best coarse candidates are refined at full resolution.

use crate::types::Region;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::trace;

/// Preferred minimum template side length, in pixels, after downscaling
const MIN_COARSE_SIDE: u32 = 12;
/// Smallest side still searched at half resolution. Templates below twice
/// this are scanned at full resolution.
const MIN_HALF_SCALE_SIDE: u32 = 4;
/// Coarse candidates carried into the full-resolution refinement
const COARSE_CANDIDATES: usize = 16;
const FLAT_EPSILON: f64 = 1e-3;

/// One entry of the locator's cascade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchTier {
    pub confidence: f32,
    pub grayscale: bool,
}

/// Finds a template inside a frame. Returned regions are frame-relative.
pub trait TemplateMatcher: Send {
    fn find(&self, frame: &RgbaImage, template: &RgbaImage, tier: MatchTier) -> Option<Region>;
}

/// Normalized cross-correlation matcher
#[derive(Debug, Default, Clone, Copy)]
pub struct NccMatcher;

impl NccMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Best match position and its score, regardless of any threshold
    pub fn best_match(
        &self,
        frame: &RgbaImage,
        template: &RgbaImage,
        grayscale: bool,
    ) -> Option<(u32, u32, f32)> {
        let (fw, fh) = frame.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > fw || th > fh {
            return None;
        }

        let scale = pyramid_scale(tw, th);
        let full = Prepared::new(frame, template, grayscale);

        if scale == 1 {
            return full.search(0..=fw - tw, 0..=fh - th);
        }

        let small_frame = imageops::resize(frame, fw / scale, fh / scale, FilterType::Triangle);
        let small_template =
            imageops::resize(template, tw / scale, th / scale, FilterType::Triangle);
        let coarse = Prepared::new(&small_frame, &small_template, grayscale);
        let candidates = coarse.top_candidates(COARSE_CANDIDATES);
        trace!(scale, candidates = candidates.len(), "coarse pass");

        candidates
            .into_iter()
            .filter_map(|(cx, cy)| {
                let x0 = (cx * scale).saturating_sub(scale);
                let y0 = (cy * scale).saturating_sub(scale);
                let x1 = (cx * scale + scale).min(fw - tw);
                let y1 = (cy * scale + scale).min(fh - th);
                full.search(x0..=x1, y0..=y1)
            })
            .max_by(|a, b| a.2.total_cmp(&b.2))
    }
}

impl TemplateMatcher for NccMatcher {
    fn find(&self, frame: &RgbaImage, template: &RgbaImage, tier: MatchTier) -> Option<Region> {
        let (x, y, score) = self.best_match(frame, template, tier.grayscale)?;
        trace!(x, y, score, confidence = tier.confidence, "best match");
        if score >= tier.confidence {
            Some(Region::new(x as i32, y as i32, template.width(), template.height()))
        } else {
            None
        }
    }
}

fn pyramid_scale(tw: u32, th: u32) -> u32 {
    let side = tw.min(th);
    [4, 2]
        .into_iter()
        .find(|s| side / s >= MIN_COARSE_SIDE)
        .unwrap_or(if side / 2 >= MIN_HALF_SCALE_SIDE { 2 } else { 1 })
}

fn channel_planes(image: &RgbaImage, grayscale: bool) -> Vec<Vec<f32>> {
    if grayscale {
        let gray = imageops::grayscale(image);
        vec![gray.pixels().map(|p| f32::from(p.0[0])).collect::<Vec<f32>>()]
    } else {
        (0..3)
            .map(|c| image.pixels().map(|p| f32::from(p.0[c])).collect::<Vec<f32>>())
            .collect()
    }
}

/// Summed-area tables of one channel, for O(1) window mean/variance
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &[f32], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let mut sum = vec![0.0; stride * (height + 1)];
        let mut sum_sq = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..width {
                let v = f64::from(plane[y * width + x]);
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sum_sq[i] = sum_sq[i - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let a = y * self.stride + x;
        let b = y * self.stride + x + w;
        let c = (y + h) * self.stride + x;
        let d = (y + h) * self.stride + x + w;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sum_sq[d] - self.sum_sq[b] - self.sum_sq[c] + self.sum_sq[a],
        )
    }
}

/// A frame/template pair converted to float channels with the template
/// already zero-meaned
struct Prepared {
    frame: Vec<Vec<f32>>,
    integrals: Vec<Integral>,
    frame_width: usize,
    template: Vec<Vec<f32>>,
    template_means: Vec<f64>,
    template_sum_sq: f64,
    tw: usize,
    th: usize,
    fw: usize,
    fh: usize,
}

impl Prepared {
    fn new(frame: &RgbaImage, template: &RgbaImage, grayscale: bool) -> Self {
        let (fw, fh) = (frame.width() as usize, frame.height() as usize);
        let (tw, th) = (template.width() as usize, template.height() as usize);
        let frame_planes = channel_planes(frame, grayscale);
        let integrals = frame_planes
            .iter()
            .map(|plane| Integral::new(plane, fw, fh))
            .collect();

        let n = (tw * th) as f64;
        let mut template_means = Vec::new();
        let mut template_sum_sq = 0.0;
        let zero_mean: Vec<Vec<f32>> = channel_planes(template, grayscale)
            .into_iter()
            .map(|plane| {
                let mean = plane.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
                template_means.push(mean);
                plane
                    .into_iter()
                    .map(|v| {
                        let centered = f64::from(v) - mean;
                        template_sum_sq += centered * centered;
                        centered as f32
                    })
                    .collect::<Vec<f32>>()
            })
            .collect();

        Self {
            frame: frame_planes,
            integrals,
            frame_width: fw,
            template: zero_mean,
            template_means,
            template_sum_sq,
            tw,
            th,
            fw,
            fh,
        }
    }

    fn score(&self, x: usize, y: usize) -> f32 {
        let n = (self.tw * self.th) as f64;
        let mut window_sum_sq = 0.0;
        let mut mean_diff = 0.0;
        let mut numerator = 0.0;

        for (c, plane) in self.frame.iter().enumerate() {
            let (sum, sum_sq) = self.integrals[c].window(x, y, self.tw, self.th);
            window_sum_sq += (sum_sq - sum * sum / n).max(0.0);
            mean_diff += (sum / n - self.template_means[c]).abs();

            let template = &self.template[c];
            for row in 0..self.th {
                let start = (y + row) * self.frame_width + x;
                let frame_row = &plane[start..start + self.tw];
                let template_row = &template[row * self.tw..(row + 1) * self.tw];
                let dot: f32 = frame_row
                    .iter()
                    .zip(template_row)
                    .map(|(a, b)| a * b)
                    .sum();
                numerator += f64::from(dot);
            }
        }

        if self.template_sum_sq < FLAT_EPSILON {
            // A flat template only matches an equally flat window of the same colour
            if window_sum_sq < FLAT_EPSILON {
                let channels = self.frame.len() as f64;
                return (1.0 - mean_diff / channels / 255.0) as f32;
            }
            return 0.0;
        }
        if window_sum_sq < FLAT_EPSILON {
            return 0.0;
        }
        (numerator / (window_sum_sq * self.template_sum_sq).sqrt()) as f32
    }

    fn search(
        &self,
        xs: std::ops::RangeInclusive<u32>,
        ys: std::ops::RangeInclusive<u32>,
    ) -> Option<(u32, u32, f32)> {
        let mut best: Option<(u32, u32, f32)> = None;
        for y in ys {
            for x in xs.clone() {
                let score = self.score(x as usize, y as usize);
                if best.map_or(true, |(_, _, b)| score > b) {
                    best = Some((x, y, score));
                }
            }
        }
        best
    }

    /// Highest scoring positions, at least half a template apart
    fn top_candidates(&self, limit: usize) -> Vec<(u32, u32)> {
        if self.tw > self.fw || self.th > self.fh {
            return Vec::new();
        }
        let mut scored = Vec::with_capacity((self.fw - self.tw + 1) * (self.fh - self.th + 1));
        for y in 0..=self.fh - self.th {
            for x in 0..=self.fw - self.tw {
                scored.push((self.score(x, y), x, y));
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let min_dx = (self.tw / 2).max(1);
        let min_dy = (self.th / 2).max(1);
        let mut kept: Vec<(u32, u32)> = Vec::with_capacity(limit);
        for (_, x, y) in scored {
            if kept.len() >= limit {
                break;
            }
            let close = kept.iter().any(|(kx, ky)| {
                (*kx as usize).abs_diff(x) < min_dx && (*ky as usize).abs_diff(y) < min_dy
            });
            if !close {
                kept.push((x as u32, y as u32));
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Deterministic blocky image: 8x8 cells of pseudo-random colours
    fn blocky(width: u32, height: u32, seed: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let cell = (x / 8).wrapping_mul(7919) ^ (y / 8).wrapping_mul(104_729) ^ seed;
            let h = cell.wrapping_mul(2_654_435_761);
            Rgba([(h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8, 255])
        })
    }

    #[test]
    fn test_finds_exact_patch_small_template() {
        let frame = blocky(160, 120, 1);
        let template = imageops::crop_imm(&frame, 53, 29, 20, 16).to_image();
        let tier = MatchTier {
            confidence: 0.8,
            grayscale: false,
        };
        let found = NccMatcher::new().find(&frame, &template, tier).unwrap();
        assert_eq!(found, Region::new(53, 29, 20, 16));
    }

    #[test]
    fn test_finds_exact_patch_through_pyramid() {
        let frame = blocky(320, 240, 7);
        let template = imageops::crop_imm(&frame, 37, 61, 100, 50).to_image();
        assert_eq!(pyramid_scale(100, 50), 4);

        for grayscale in [false, true] {
            let tier = MatchTier {
                confidence: 0.8,
                grayscale,
            };
            let found = NccMatcher::new().find(&frame, &template, tier).unwrap();
            assert_eq!(found, Region::new(37, 61, 100, 50), "grayscale={grayscale}");
            assert_eq!(found.center(), crate::Point::new(87, 86));
        }
    }

    #[test]
    fn test_small_templates_still_get_a_coarse_pass() {
        assert_eq!(pyramid_scale(20, 16), 2);
        assert_eq!(pyramid_scale(10, 30), 2);
        assert_eq!(pyramid_scale(8, 8), 2);
        assert_eq!(pyramid_scale(7, 40), 1);
        assert_eq!(pyramid_scale(48, 30), 2);

        let frame = blocky(200, 150, 3);
        let template = imageops::crop_imm(&frame, 96, 64, 16, 16).to_image();
        let tier = MatchTier {
            confidence: 0.8,
            grayscale: false,
        };
        let found = NccMatcher::new().find(&frame, &template, tier).unwrap();
        assert_eq!(found, Region::new(96, 64, 16, 16));
    }

    #[test]
    fn test_absent_template_is_rejected() {
        let frame = blocky(160, 120, 1);
        let template = blocky(24, 24, 99);
        let tier = MatchTier {
            confidence: 0.8,
            grayscale: false,
        };
        assert!(NccMatcher::new().find(&frame, &template, tier).is_none());
    }

    #[test]
    fn test_template_larger_than_frame() {
        let frame = blocky(20, 20, 1);
        let template = blocky(40, 10, 1);
        assert!(NccMatcher::new().best_match(&frame, &template, false).is_none());
    }

    #[test]
    fn test_flat_template_matches_same_colour_only() {
        let mut frame = RgbaImage::from_pixel(60, 40, Rgba([255, 255, 255, 255]));
        for y in 10..20 {
            for x in 30..45 {
                frame.put_pixel(x, y, Rgba([0, 90, 200, 255]));
            }
        }
        let template = RgbaImage::from_pixel(8, 6, Rgba([0, 90, 200, 255]));
        let (x, y, score) = NccMatcher::new().best_match(&frame, &template, false).unwrap();
        assert!((30..=37).contains(&x) && (10..=14).contains(&y));
        assert!(score > 0.99);
    }
}
