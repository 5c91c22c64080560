//! Typed pixel buffers
//!
//! Every buffer is row-major with a fixed stride of `width` pixels per row;
//! pixel `(row, col)` lives at index `row * width + col`. Access goes through
//! bounds-checked accessors rather than raw offsets.

use std::ops::{Index, IndexMut};

use rayon::prelude::*;

use crate::image_pipeline::common::error::{PipelineError, Result};

/// Allocates `len` copies of `value`, reporting allocation failure instead of aborting.
pub(crate) fn try_alloc<T: Clone>(len: usize, value: T, what: &'static str) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| PipelineError::BufferAllocationFailure {
            what,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    data.resize(len, value);
    Ok(data)
}

/// Interleaved buffer of `N`-component pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer<T, const N: usize> {
    width: usize,
    height: usize,
    data: Vec<[T; N]>,
}

impl<T: Copy + Default, const N: usize> PixelBuffer<T, N> {
    /// Allocates a zero (default) filled buffer.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let len = width
            .checked_mul(height)
            .ok_or(PipelineError::InvalidDimensions(width, height))?;
        Ok(Self {
            width,
            height,
            data: try_alloc(len, [T::default(); N], "pixel buffer")?,
        })
    }

    pub fn from_pixels(width: usize, height: usize, data: Vec<[T; N]>) -> Result<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(PipelineError::InvalidDimensions(width, height));
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&[T; N]> {
        if row < self.height && col < self.width {
            self.data.get(row * self.width + col)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut [T; N]> {
        if row < self.height && col < self.width {
            self.data.get_mut(row * self.width + col)
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> &[[T; N]] {
        &self.data[row * self.width..(row + 1) * self.width]
    }

    pub fn pixels(&self) -> &[[T; N]] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [[T; N]] {
        &mut self.data
    }

    pub fn into_pixels(self) -> Vec<[T; N]> {
        self.data
    }
}

impl<T: Copy + Default + Send + Sync, const N: usize> PixelBuffer<T, N> {
    /// Parallel iterator over `(row_index, row_slice)` pairs.
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = (usize, &mut [[T; N]])> {
        let width = self.width.max(1);
        self.data.par_chunks_mut(width).enumerate()
    }
}

impl<T, const N: usize> Index<(usize, usize)> for PixelBuffer<T, N> {
    type Output = [T; N];

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        assert!(
            row < self.height && col < self.width,
            "pixel ({row}, {col}) outside {}x{} buffer",
            self.width,
            self.height
        );
        &self.data[row * self.width + col]
    }
}

impl<T, const N: usize> IndexMut<(usize, usize)> for PixelBuffer<T, N> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        assert!(
            row < self.height && col < self.width,
            "pixel ({row}, {col}) outside {}x{} buffer",
            self.width,
            self.height
        );
        &mut self.data[row * self.width + col]
    }
}

/// Four-slot sensor buffer.
///
/// Before demosaicing exactly one slot per pixel holds a sample (the slot the
/// CFA pattern names for that site). `colors` is the number of logical
/// channels in use: 4 while the two green lattices are kept apart, 3 once
/// they have been merged.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseColorBuffer {
    pub pixels: PixelBuffer<u16, 4>,
    pub colors: usize,
}

impl SparseColorBuffer {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Ok(Self {
            pixels: PixelBuffer::new(width, height)?,
            colors: 4,
        })
    }

    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    /// Largest sample over every slot.
    pub fn max_sample(&self) -> u16 {
        self.pixels
            .pixels()
            .par_iter()
            .map(|px| px.iter().copied().max().unwrap_or(0))
            .max()
            .unwrap_or(0)
    }
}

/// 16-bit interleaved RGB, the output of the colour conversion stage.
pub type RgbBuffer16 = PixelBuffer<u16, 3>;

/// Interleaved floating point RGBA handed to the filter graph.
pub type RgbaBufferF32 = PixelBuffer<f32, 4>;

/// Three separate `f32` planes of equal size (red, green, blue).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarBuffer {
    width: usize,
    height: usize,
    planes: [Vec<f32>; 3],
}

impl PlanarBuffer {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let len = width
            .checked_mul(height)
            .ok_or(PipelineError::InvalidDimensions(width, height))?;
        Ok(Self {
            width,
            height,
            planes: [
                try_alloc(len, 0.0, "red plane")?,
                try_alloc(len, 0.0, "green plane")?,
                try_alloc(len, 0.0, "blue plane")?,
            ],
        })
    }

    pub fn from_planes(width: usize, height: usize, planes: [Vec<f32>; 3]) -> Result<Self> {
        let len = width.checked_mul(height);
        if planes.iter().any(|p| Some(p.len()) != len) {
            return Err(PipelineError::InvalidDimensions(width, height));
        }
        Ok(Self { width, height, planes })
    }

    /// Rebuilds planes from their concatenation `[R.., G.., B..]`.
    pub fn from_contiguous(width: usize, height: usize, data: &[f32]) -> Result<Self> {
        let len = width * height;
        if data.len() != 3 * len {
            return Err(PipelineError::InvalidDimensions(width, height));
        }
        Ok(Self {
            width,
            height,
            planes: [
                data[..len].to_vec(),
                data[len..2 * len].to_vec(),
                data[2 * len..].to_vec(),
            ],
        })
    }

    pub fn to_contiguous(&self) -> Vec<f32> {
        self.planes.concat()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn plane(&self, index: usize) -> &[f32] {
        &self.planes[index]
    }

    pub fn plane_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.planes[index]
    }

    pub fn planes_mut(&mut self) -> &mut [Vec<f32>; 3] {
        &mut self.planes
    }

    pub fn get(&self, plane: usize, row: usize, col: usize) -> Option<f32> {
        if row < self.height && col < self.width {
            self.planes.get(plane)?.get(row * self.width + col).copied()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_is_row_major() {
        let mut buf = PixelBuffer::<u16, 3>::new(4, 2).unwrap();
        buf[(1, 2)] = [1, 2, 3];
        assert_eq!(buf.pixels()[6], [1, 2, 3]);
        assert_eq!(buf.get(1, 2), Some(&[1, 2, 3]));
        assert_eq!(buf.get(2, 0), None);
        assert_eq!(buf.get(0, 4), None);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_index_panics() {
        let buf = PixelBuffer::<u16, 4>::new(2, 2).unwrap();
        let _ = buf[(0, 2)];
    }

    #[test]
    fn from_pixels_checks_length() {
        let result = PixelBuffer::<f32, 4>::from_pixels(3, 3, vec![[0.0; 4]; 8]);
        assert!(matches!(result, Err(PipelineError::InvalidDimensions(3, 3))));
    }

    #[test]
    fn planar_contiguous_layout() {
        let planes = [vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let buf = PlanarBuffer::from_planes(2, 1, planes).unwrap();
        let flat = buf.to_contiguous();
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(PlanarBuffer::from_contiguous(2, 1, &flat).unwrap(), buf);
    }
}
