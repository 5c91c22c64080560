//! Adaptive homogeneity-directed interpolation
//!
//! The frame is cut into `TILE`×`TILE` tiles that overlap by a 3 pixel halo
//! on each side. Every tile builds a horizontally and a vertically
//! interpolated estimate, converts both to Lab and keeps, per pixel, the
//! direction whose 3×3 neighbourhood is more homogeneous.
//!
//! Tiles only read the CFA sample of each site, which no tile ever writes,
//! so they run independently; each returns the pixels of its own disjoint
//! interior, copied back once all tiles are done.

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::image_pipeline::color::ColorMatrix;
use crate::image_pipeline::common::{CancellationToken, PipelineError, Result, SparseColorBuffer};
use crate::image_pipeline::debayer::border_interpolate;
use crate::image_pipeline::demosaic::Demosaicer;
use crate::image_pipeline::demosaic::lab::{camera_to_lab, xyz_from_camera};
use crate::image_pipeline::raw::CfaPattern;

const TILE: usize = 256;
/// Distance between tile origins; consecutive interiors meet exactly.
const STEP: usize = TILE - 7;
const BORDER: usize = 6;

/// Smallest frame side the tiled pass handles.
pub const MIN_SIDE: usize = 2 * BORDER + 4;

struct Scratch {
    rgb: [Vec<[u16; 3]>; 2],
    lab: [Vec<[i16; 3]>; 2],
    homo: [Vec<u8>; 2],
}

impl Scratch {
    fn new() -> Self {
        Self {
            rgb: [vec![[0; 3]; TILE * TILE], vec![[0; 3]; TILE * TILE]],
            lab: [vec![[0; 3]; TILE * TILE], vec![[0; 3]; TILE * TILE]],
            homo: [vec![0; TILE * TILE], vec![0; TILE * TILE]],
        }
    }
}

/// Finished interior of one tile.
struct TileOutput {
    top: usize,
    left: usize,
    cols: usize,
    pixels: Vec<[u16; 3]>,
}

#[inline]
fn in_range(v: i32) -> bool {
    (0..=65535).contains(&v)
}

struct Frame<'a> {
    src: &'a [[u16; 4]],
    width: usize,
    height: usize,
    cfa: &'a CfaPattern,
    xyz_cam: ColorMatrix,
}

impl Frame<'_> {
    #[inline]
    fn at(&self, row: usize, col: usize, c: usize) -> i32 {
        self.src[row * self.width + col][c] as i32
    }

    #[inline]
    fn fc(&self, row: usize, col: usize) -> usize {
        self.cfa.color(row, col)
    }

    fn green_pass(&self, s: &mut Scratch, top: usize, left: usize) {
        let w = self.width;
        let row_end = (top + TILE).min(self.height - 3);
        let col_end = (left + TILE).min(w - 3);
        for row in top..row_end {
            let mut col = left + (self.fc(row, left) & 1);
            let c = self.fc(row, col);
            while col < col_end {
                let g = |dr: isize, dc: isize| {
                    self.at(
                        (row as isize + dr) as usize,
                        (col as isize + dc) as usize,
                        1,
                    )
                };
                let x = |dr: isize, dc: isize| {
                    self.at(
                        (row as isize + dr) as usize,
                        (col as isize + dc) as usize,
                        c,
                    )
                };
                let ti = (row - top) * TILE + (col - left);

                let mut val = ((g(0, -1) + x(0, 0) + g(0, 1)) * 2 - x(0, -2) - x(0, 2) + 2) >> 2;
                if !in_range(val) {
                    val = (g(0, -3) + g(0, 3)
                        + 18 * (2 * x(0, 0) - x(0, -2) - x(0, 2))
                        + 63 * (g(0, -1) + g(0, 1))
                        + 64)
                        >> 7;
                    if !in_range(val) {
                        val = (4 * (g(0, -1) + g(0, 1)) + 2 * x(0, 0) - x(0, -2) - x(0, 2) + 4) >> 3;
                        if !in_range(val) {
                            val = (g(0, -1) + g(0, 1) + 1) >> 1;
                        }
                    }
                }
                s.rgb[0][ti][1] = val as u16;

                let mut val = ((g(-1, 0) + x(0, 0) + g(1, 0)) * 2 - x(-2, 0) - x(2, 0) + 2) >> 2;
                if !in_range(val) {
                    val = (g(-3, 0) + g(3, 0)
                        + 18 * (2 * x(0, 0) - x(-2, 0) - x(2, 0))
                        + 63 * (g(-1, 0) + g(1, 0))
                        + 64)
                        >> 7;
                    if !in_range(val) {
                        val = (4 * (g(-1, 0) + g(1, 0)) + 2 * x(0, 0) - x(-2, 0) - x(2, 0) + 4) >> 3;
                        if !in_range(val) {
                            val = (g(-1, 0) + g(1, 0) + 1) >> 1;
                        }
                    }
                }
                s.rgb[1][ti][1] = val as u16;

                col += 2;
            }
        }
    }

    fn red_blue_pass(&self, s: &mut Scratch, top: usize, left: usize) {
        let w = self.width;
        let row_end = (top + TILE - 1).min(self.height - 4);
        let col_end = (left + TILE - 1).min(w - 4);
        for d in 0..2 {
            let rgb = &mut s.rgb[d];
            let lab = &mut s.lab[d];
            for row in top + 1..row_end {
                for col in left + 1..col_end {
                    let ti = (row - top) * TILE + col - left;
                    let p = |dr: isize, dc: isize, c: usize| {
                        self.at(
                            (row as isize + dr) as usize,
                            (col as isize + dc) as usize,
                            c,
                        )
                    };
                    let own = self.fc(row, col);
                    let mut c = 2 - own;
                    let val;
                    if c == 1 {
                        c = self.fc(row + 1, col);
                        let o = 2 - c;
                        let mut v = p(0, 0, 1)
                            + ((p(0, -1, o) + p(0, 1, o) - rgb[ti - 1][1] as i32 - rgb[ti + 1][1] as i32 + 1)
                                >> 1);
                        if !in_range(v) {
                            v = (p(0, -1, o) + p(0, 1, o) + 1) >> 1;
                        }
                        rgb[ti][o] = v as u16;
                        let mut v = p(0, 0, 1)
                            + ((p(-1, 0, c) + p(1, 0, c)
                                - rgb[ti - TILE][1] as i32
                                - rgb[ti + TILE][1] as i32
                                + 1)
                                >> 1);
                        if !in_range(v) {
                            v = (p(-1, 0, c) + p(1, 0, c) + 1) >> 1;
                        }
                        val = v;
                    } else {
                        let diag = p(-1, -1, c) + p(-1, 1, c) + p(1, -1, c) + p(1, 1, c);
                        let greens = rgb[ti - TILE - 1][1] as i32
                            + rgb[ti - TILE + 1][1] as i32
                            + rgb[ti + TILE - 1][1] as i32
                            + rgb[ti + TILE + 1][1] as i32;
                        let mut v = rgb[ti][1] as i32 + ((diag - greens + 2) >> 2);
                        if !in_range(v) {
                            v = (diag + 2) >> 2;
                        }
                        val = v;
                    }
                    rgb[ti][c] = val as u16;
                    rgb[ti][own] = p(0, 0, own) as u16;
                    lab[ti] = camera_to_lab(rgb[ti], &self.xyz_cam);
                }
            }
        }
    }

    fn homogeneity_pass(&self, s: &mut Scratch, top: usize, left: usize) {
        const DIRS: [isize; 4] = [-1, 1, -(TILE as isize), TILE as isize];
        for h in s.homo.iter_mut() {
            h.fill(0);
        }
        let row_end = (top + TILE - 2).min(self.height - 5);
        let col_end = (left + TILE - 2).min(self.width - 5);
        let mut ldiff = [[0u32; 4]; 2];
        let mut abdiff = [[0u64; 4]; 2];
        for row in top + 2..row_end {
            for col in left + 2..col_end {
                let ti = (row - top) * TILE + col - left;
                for d in 0..2 {
                    let lab = &s.lab[d];
                    let centre = lab[ti];
                    for (i, dir) in DIRS.iter().enumerate() {
                        let n = lab[(ti as isize + dir) as usize];
                        ldiff[d][i] = (centre[0] as i32 - n[0] as i32).unsigned_abs();
                        let da = (centre[1] as i64 - n[1] as i64).pow(2);
                        let db = (centre[2] as i64 - n[2] as i64).pow(2);
                        abdiff[d][i] = (da + db) as u64;
                    }
                }
                let leps = ldiff[0][0].max(ldiff[0][1]).min(ldiff[1][2].max(ldiff[1][3]));
                let abeps = abdiff[0][0].max(abdiff[0][1]).min(abdiff[1][2].max(abdiff[1][3]));
                for d in 0..2 {
                    let votes = (0..4)
                        .filter(|&i| ldiff[d][i] <= leps && abdiff[d][i] <= abeps)
                        .count();
                    s.homo[d][ti] += votes as u8;
                }
            }
        }
    }

    fn combine(&self, s: &Scratch, top: usize, left: usize) -> TileOutput {
        let row_start = top + 3;
        let col_start = left + 3;
        let row_end = (row_start + STEP).min(self.height - BORDER);
        let col_end = (col_start + STEP).min(self.width - BORDER);
        let cols = col_end.saturating_sub(col_start);
        let mut pixels = Vec::with_capacity(cols * row_end.saturating_sub(row_start));

        for row in row_start..row_end {
            let tr = row - top;
            for col in col_start..col_end {
                let tc = col - left;
                let mut hm = [0u32; 2];
                for (d, score) in hm.iter_mut().enumerate() {
                    for i in tr - 1..=tr + 1 {
                        for j in tc - 1..=tc + 1 {
                            *score += s.homo[d][i * TILE + j] as u32;
                        }
                    }
                }
                let ti = tr * TILE + tc;
                let px = if hm[0] != hm[1] {
                    s.rgb[(hm[1] > hm[0]) as usize][ti]
                } else {
                    let (a, b) = (s.rgb[0][ti], s.rgb[1][ti]);
                    [0, 1, 2].map(|c| ((a[c] as u32 + b[c] as u32 + 1) >> 1) as u16)
                };
                pixels.push(px);
            }
        }

        TileOutput {
            top: row_start,
            left: col_start,
            cols,
            pixels,
        }
    }
}

pub struct AhdDemosaicer;

impl Demosaicer for AhdDemosaicer {
    fn name(&self) -> &'static str {
        "ahd"
    }

    #[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
    fn demosaic(
        &self,
        mut buffer: SparseColorBuffer,
        cfa: &CfaPattern,
        cam_to_xyz: &ColorMatrix,
        cancel: &CancellationToken,
    ) -> Result<SparseColorBuffer> {
        let width = buffer.width();
        let height = buffer.height();
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(PipelineError::InvalidDimensions(width, height));
        }

        border_interpolate(&mut buffer, cfa, BORDER);

        let origins: Vec<(usize, usize)> = (3..height - BORDER)
            .step_by(STEP)
            .flat_map(|top| (3..width - BORDER).step_by(STEP).map(move |left| (top, left)))
            .collect();
        debug!("AHD over {} tiles", origins.len());

        let frame = Frame {
            src: buffer.pixels.pixels(),
            width,
            height,
            cfa,
            xyz_cam: xyz_from_camera(cam_to_xyz),
        };

        let tiles = origins
            .par_iter()
            .map_init(Scratch::new, |scratch, &(top, left)| {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                frame.green_pass(scratch, top, left);
                frame.red_blue_pass(scratch, top, left);
                frame.homogeneity_pass(scratch, top, left);
                Ok(frame.combine(scratch, top, left))
            })
            .collect::<Result<Vec<_>>>()?;

        for tile in tiles {
            if tile.cols == 0 {
                continue;
            }
            for (i, line) in tile.pixels.chunks_exact(tile.cols).enumerate() {
                for (j, rgb) in line.iter().enumerate() {
                    let px = &mut buffer.pixels[(tile.top + i, tile.left + j)];
                    px[..3].copy_from_slice(rgb);
                }
            }
        }

        buffer.colors = 3;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::demosaic::tests::{assert_complete, flat_mosaic, ramp_mosaic};

    #[test]
    fn flat_field_is_reconstructed_exactly() {
        let cfa = CfaPattern::rggb().merge_greens();
        let input = flat_mosaic(40, 30, &cfa, [1000, 2000, 3000]);
        let out = AhdDemosaicer
            .demosaic(input, &cfa, &ColorMatrix::srgb_to_xyz(), &CancellationToken::new())
            .unwrap();
        for px in out.pixels.pixels() {
            assert_eq!(&px[..3], &[1000, 2000, 3000]);
        }
    }

    #[test]
    fn multi_tile_frame_is_fully_populated() {
        let cfa = CfaPattern::gbrg().merge_greens();
        let input = ramp_mosaic(300, 270, &cfa);
        let out = AhdDemosaicer
            .demosaic(input, &cfa, &ColorMatrix::srgb_to_xyz(), &CancellationToken::new())
            .unwrap();
        assert_complete(&out, 90, 2400);
    }

    #[test]
    fn cancelled_token_stops_between_tiles() {
        let cfa = CfaPattern::rggb().merge_greens();
        let input = flat_mosaic(32, 32, &cfa, [1, 1, 1]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = AhdDemosaicer.demosaic(input, &cfa, &ColorMatrix::identity(), &cancel);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn tiny_frame_is_rejected() {
        let cfa = CfaPattern::rggb().merge_greens();
        let input = flat_mosaic(8, 8, &cfa, [1, 1, 1]);
        let result = AhdDemosaicer.demosaic(input, &cfa, &ColorMatrix::identity(), &CancellationToken::new());
        assert!(matches!(result, Err(PipelineError::InvalidDimensions(8, 8))));
    }
}
