//! Per-channel histograms over 16-bit samples

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::RgbaBufferF32;

/// Bucket count; each bucket spans eight 16-bit levels.
pub const HISTOGRAM_BUCKETS: usize = 0x2000;

const BUCKET_SHIFT: u32 = 3;

/// Lowest bucket the white point search may settle on.
const WHITE_POINT_FLOOR: usize = 32;

/// Share of pixels allowed above the adaptive white point.
pub const WHITE_POINT_CLIP_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    channels: usize,
    counts: Vec<u32>,
}

impl Histogram {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            counts: vec![0; channels * HISTOGRAM_BUCKETS],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn add(&mut self, channel: usize, value: u16) {
        self.counts[channel * HISTOGRAM_BUCKETS + (value >> BUCKET_SHIFT) as usize] += 1;
    }

    pub fn channel(&self, channel: usize) -> &[u32] {
        &self.counts[channel * HISTOGRAM_BUCKETS..(channel + 1) * HISTOGRAM_BUCKETS]
    }

    /// Histogram of the colour channels of a normalised RGBA image; alpha is
    /// ignored and values are clipped to `[0, 1]` before quantising.
    pub fn of_rgba(image: &RgbaBufferF32) -> Self {
        image
            .pixels()
            .par_chunks(4096)
            .fold(
                || Histogram::new(3),
                |mut histogram, chunk| {
                    for px in chunk {
                        for (c, v) in px[..3].iter().enumerate() {
                            histogram.add(c, (v.clamp(0.0, 1.0) * 65535.0).round() as u16);
                        }
                    }
                    histogram
                },
            )
            .reduce(|| Histogram::new(3), Histogram::merged)
    }

    /// Sums two partial histograms.
    pub fn merged(mut self, other: Histogram) -> Histogram {
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a += b;
        }
        self
    }

    /// Total samples counted in `channel`.
    pub fn total(&self, channel: usize) -> u64 {
        self.channel(channel).iter().map(|&c| c as u64).sum()
    }

    /// Highest bucket, over all channels, with more than `clip_fraction` of
    /// `pixels` at or above it. Never lower than the floor bucket.
    pub fn white_bucket(&self, pixels: usize, clip_fraction: f64) -> usize {
        let limit = pixels as f64 * clip_fraction;
        let mut white = 0;
        for channel in 0..self.channels {
            let counts = self.channel(channel);
            let mut total = 0u64;
            let mut bucket = HISTOGRAM_BUCKETS - 1;
            while bucket > WHITE_POINT_FLOOR {
                total += counts[bucket] as u64;
                if total as f64 > limit {
                    break;
                }
                bucket -= 1;
            }
            white = white.max(bucket);
        }
        white
    }

    /// Adaptive white point in 16-bit levels, for [`GammaCurve::build`].
    ///
    /// [`GammaCurve::build`]: crate::image_pipeline::color::GammaCurve::build
    pub fn white_point(&self, pixels: usize) -> u32 {
        (self.white_bucket(pixels, WHITE_POINT_CLIP_FRACTION) as u32) << BUCKET_SHIFT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_cover_sixteen_bits() {
        let mut h = Histogram::new(3);
        h.add(0, 0);
        h.add(0, 7);
        h.add(1, 8);
        h.add(2, u16::MAX);
        assert_eq!(h.channel(0)[0], 2);
        assert_eq!(h.channel(1)[1], 1);
        assert_eq!(h.channel(2)[HISTOGRAM_BUCKETS - 1], 1);
        assert_eq!(h.total(0), 2);
    }

    #[test]
    fn rgba_histogram_ignores_alpha() {
        let image = RgbaBufferF32::from_pixels(
            2,
            1,
            vec![[0.0, 0.5, 1.0, 1.0], [2.0, -1.0, 0.5, 0.0]],
        )
        .unwrap();
        let h = Histogram::of_rgba(&image);
        assert_eq!(h.channels(), 3);
        assert_eq!(h.channel(0)[0], 1);
        assert_eq!(h.channel(0)[HISTOGRAM_BUCKETS - 1], 1);
        assert_eq!(h.channel(1)[0], 1);
        assert_eq!(h.channel(2)[32768 >> 3], 2);
        assert_eq!(h.total(2), 2);
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = Histogram::new(1);
        let mut b = Histogram::new(1);
        a.add(0, 100);
        b.add(0, 100);
        assert_eq!(a.merged(b).channel(0)[100 >> 3], 2);
    }

    #[test]
    fn white_point_ignores_top_percent() {
        let mut h = Histogram::new(3);
        // 1000 pixels at 20000, 5 hot pixels at full scale.
        for c in 0..3 {
            for _ in 0..995 {
                h.add(c, 20000);
            }
            for _ in 0..5 {
                h.add(c, u16::MAX);
            }
        }
        assert_eq!(h.white_point(1000), (20000 >> 3) << 3);
    }

    #[test]
    fn dark_image_stops_at_floor() {
        let mut h = Histogram::new(1);
        for _ in 0..100 {
            h.add(0, 10);
        }
        assert_eq!(h.white_bucket(100, WHITE_POINT_CLIP_FRACTION), 32);
        assert_eq!(h.white_point(100), 256);
    }
}
