use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::common::{PipelineError, PixelBuffer, PlanarBuffer, Result, RgbBuffer16, RgbaBufferF32};
use crate::image_pipeline::pixel_format::planar_ops;
use crate::image_pipeline::state::Stage;

/// Which representation the converter currently holds.
#[derive(Debug)]
enum Held {
    Empty,
    Integer(RgbBuffer16),
    Float(PixelBuffer<f32, 3>),
    Planar(PlanarBuffer),
    Interleaved(RgbaBufferF32),
}

impl Held {
    fn name(&self) -> &'static str {
        match self {
            Held::Empty => "empty",
            Held::Integer(_) => "rgb16",
            Held::Float(_) => "rgb float",
            Held::Planar(_) => "planar float",
            Held::Interleaved(_) => "rgbx float",
        }
    }
}

/// Owns every buffer of one image while it moves from 16-bit interleaved RGB
/// to interleaved RGBX floats.
///
/// Steps must run in order: [`rgb16_to_float`](Self::rgb16_to_float),
/// [`to_planar`](Self::to_planar), any planar operations, then
/// [`planar_to_rgbx`](Self::planar_to_rgbx). Every operation takes
/// `&mut self`; use one converter per thread.
#[derive(Debug)]
pub struct PixelFormatConverter {
    width: usize,
    height: usize,
    held: Held,
}

impl PixelFormatConverter {
    pub fn new(input: RgbBuffer16) -> Self {
        Self {
            width: input.width(),
            height: input.height(),
            held: Held::Integer(input),
        }
    }

    /// Starts from planes restored from a checkpoint.
    pub fn from_planar(planar: PlanarBuffer) -> Self {
        Self {
            width: planar.width(),
            height: planar.height(),
            held: Held::Planar(planar),
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Discards every buffer and allocates a zeroed input of the new size.
    /// Nothing is copied; callers fill it through [`input_mut`](Self::input_mut).
    pub fn resize(&mut self, width: usize, height: usize) -> Result<()> {
        self.held = Held::Empty;
        let input = RgbBuffer16::new(width, height)?;
        self.width = width;
        self.height = height;
        self.held = Held::Integer(input);
        Ok(())
    }

    pub fn set_input(&mut self, input: RgbBuffer16) -> Result<()> {
        if (input.width(), input.height()) != (self.width, self.height) {
            return Err(PipelineError::InvalidDimensions(input.width(), input.height()));
        }
        self.held = Held::Integer(input);
        Ok(())
    }

    pub fn input_mut(&mut self) -> Result<&mut RgbBuffer16> {
        match &mut self.held {
            Held::Integer(input) => Ok(input),
            other => Err(out_of_order("input", other)),
        }
    }

    /// Normalises to `f32` so that `max_value` maps to 1.0.
    pub fn rgb16_to_float(&mut self, max_value: u16) -> Result<()> {
        let Held::Integer(input) = &self.held else {
            return Err(out_of_order("rgb16_to_float", &self.held));
        };
        if max_value == 0 {
            return Err(PipelineError::stage(Stage::FormatConvert, "maximum value is zero"));
        }
        let scale = 1.0 / max_value as f32;
        let data: Vec<[f32; 3]> = input
            .pixels()
            .par_iter()
            .map(|px| px.map(|v| v as f32 * scale))
            .collect();
        self.held = Held::Float(PixelBuffer::from_pixels(self.width, self.height, data)?);
        Ok(())
    }

    pub fn to_planar(&mut self) -> Result<()> {
        let Held::Float(input) = &self.held else {
            return Err(out_of_order("to_planar", &self.held));
        };
        let mut planar = PlanarBuffer::new(self.width, self.height)?;
        for (c, plane) in planar.planes_mut().iter_mut().enumerate() {
            plane
                .par_iter_mut()
                .zip(input.pixels().par_iter())
                .for_each(|(v, px)| *v = px[c]);
        }
        self.held = Held::Planar(planar);
        Ok(())
    }

    pub fn planar(&self) -> Result<&PlanarBuffer> {
        match &self.held {
            Held::Planar(planar) => Ok(planar),
            other => Err(out_of_order("planar", other)),
        }
    }

    pub fn planar_mut(&mut self) -> Result<&mut PlanarBuffer> {
        match &mut self.held {
            Held::Planar(planar) => Ok(planar),
            other => Err(out_of_order("planar_mut", other)),
        }
    }

    /// Rotates the planes by `turns` × 90° counter-clockwise.
    pub fn rotate90(&mut self, turns: u8) -> Result<()> {
        let rotated = planar_ops::rotate_quarter_turns(self.planar()?, turns)?;
        debug!(
            "Rotated {}x{} by {} quarter turns",
            self.width,
            self.height,
            turns % 4
        );
        self.width = rotated.width();
        self.height = rotated.height();
        self.held = Held::Planar(rotated);
        Ok(())
    }

    pub fn contrast_stretch(&mut self, min: f32, max: f32) -> Result<()> {
        planar_ops::contrast_stretch(self.planar_mut()?, min, max)
    }

    /// Interleaves the planes into RGBX with X fixed at 1.0.
    pub fn planar_to_rgbx(&mut self) -> Result<()> {
        let Held::Planar(planar) = &self.held else {
            return Err(out_of_order("planar_to_rgbx", &self.held));
        };
        let (r, g, b) = (planar.plane(0), planar.plane(1), planar.plane(2));
        let data: Vec<[f32; 4]> = (0..self.width * self.height)
            .into_par_iter()
            .map(|i| [r[i], g[i], b[i], 1.0])
            .collect();
        self.held = Held::Interleaved(RgbaBufferF32::from_pixels(self.width, self.height, data)?);
        Ok(())
    }

    pub fn rgbx(&self) -> Result<&RgbaBufferF32> {
        match &self.held {
            Held::Interleaved(rgbx) => Ok(rgbx),
            other => Err(out_of_order("rgbx", other)),
        }
    }

    pub fn into_rgbx(self) -> Result<RgbaBufferF32> {
        match self.held {
            Held::Interleaved(rgbx) => Ok(rgbx),
            other => Err(out_of_order("into_rgbx", &other)),
        }
    }
}

fn out_of_order(op: &str, held: &Held) -> PipelineError {
    PipelineError::stage(
        Stage::FormatConvert,
        format!("{op} called while holding {} data", held.name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RgbBuffer16 {
        let data = vec![[0, 1024, 2048], [4096, 3072, 0]];
        RgbBuffer16::from_pixels(2, 1, data).unwrap()
    }

    #[test]
    fn full_chain_produces_rgbx() {
        let mut converter = PixelFormatConverter::new(input());
        converter.rgb16_to_float(4096).unwrap();
        converter.to_planar().unwrap();
        assert_eq!(converter.planar().unwrap().plane(1), &[0.25, 0.75]);
        converter.planar_to_rgbx().unwrap();
        let rgbx = converter.into_rgbx().unwrap();
        assert_eq!(rgbx.pixels(), &[[0.0, 0.25, 0.5, 1.0], [1.0, 0.75, 0.0, 1.0]]);
    }

    #[test]
    fn steps_out_of_order_fail() {
        let mut converter = PixelFormatConverter::new(input());
        assert!(matches!(
            converter.to_planar(),
            Err(PipelineError::StageComputeFailure { stage: Stage::FormatConvert, .. })
        ));
        assert!(converter.planar_to_rgbx().is_err());
        converter.rgb16_to_float(4096).unwrap();
        assert!(converter.rgb16_to_float(4096).is_err());
        assert!(converter.rotate90(1).is_err());
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let mut converter = PixelFormatConverter::new(input());
        converter.rgb16_to_float(u16::MAX).unwrap();
        converter.to_planar().unwrap();
        converter.rotate90(1).unwrap();
        assert_eq!(converter.size(), (1, 2));
        converter.planar_to_rgbx().unwrap();
        assert_eq!(converter.rgbx().unwrap().height(), 2);
    }

    #[test]
    fn resize_discards_data() {
        let mut converter = PixelFormatConverter::new(input());
        converter.rgb16_to_float(4096).unwrap();
        converter.resize(3, 3).unwrap();
        assert_eq!(converter.size(), (3, 3));
        assert!(converter.input_mut().unwrap().pixels().iter().all(|px| *px == [0; 3]));
        assert!(converter.set_input(input()).is_err());
    }
}
