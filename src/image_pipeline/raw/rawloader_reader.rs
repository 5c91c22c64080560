//! RAW decoder backed by the rawloader library.
//!
//! Supports any format rawloader can decode (ARW, CR2, NEF, DNG, ...) as long
//! as the sensor uses a 2×2 Bayer layout. The decoded image is turned into an
//! immutable [`RawFrame`] carrying the mosaic plus every piece of colour
//! metadata the later stages need.

use std::io::Cursor;

use rawloader::{Orientation, RawImageData as RawloaderImageData};
use tracing::{debug, warn};

use crate::image_pipeline::color::ColorMatrix;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::raw::cfa::CfaPattern;
use crate::image_pipeline::raw::reader::RawDecoder;
use crate::image_pipeline::raw::types::{BlackLevels, CameraIdentity, RawFrame};

pub struct RawLoaderDecoder;

impl RawLoaderDecoder {
    fn pattern(decoded: &rawloader::RawImage, top: usize, left: usize) -> Result<CfaPattern> {
        let cfa = &decoded.cfa;
        if decoded.cpp != 1 || cfa.width == 0 || cfa.height == 0 {
            return Err(PipelineError::UnsupportedSensorPattern(format!(
                "{} {}: image is not a CFA mosaic",
                decoded.clean_make, decoded.clean_model
            )));
        }
        if cfa.width == 6 && cfa.height == 6 {
            return Err(PipelineError::UnsupportedSensorPattern(format!(
                "{} {}: X-Trans layout",
                decoded.clean_make, decoded.clean_model
            )));
        }
        if cfa.width != 2 || cfa.height != 2 {
            warn!(
                "CFA '{}' is {}x{}, using its top-left 2x2 cell",
                cfa.name, cfa.width, cfa.height
            );
        }

        let mut cell = [
            cfa.color_at(top, left),
            cfa.color_at(top, left + 1),
            cfa.color_at(top + 1, left),
            cfa.color_at(top + 1, left + 1),
        ];
        if cell.iter().any(|&c| c > 3) {
            return Err(PipelineError::UnsupportedSensorPattern(format!(
                "CFA '{}' uses colours outside RGBE",
                cfa.name
            )));
        }

        // Label the green sharing a row with blue as the second green.
        if !cell.contains(&3) {
            let blue_row = cell.iter().position(|&c| c == 2).map(|i| i / 2);
            if let Some(row) = blue_row {
                for i in row * 2..row * 2 + 2 {
                    if cell[i] == 1 {
                        cell[i] = 3;
                    }
                }
            }
        }

        let pattern = CfaPattern::from_2x2(cell);
        CfaPattern::from_filters(pattern.id(), top, left)
    }

    fn quarter_turns(orientation: Orientation) -> u8 {
        match orientation {
            Orientation::Rotate90 => 3,
            Orientation::Rotate180 => 2,
            Orientation::Rotate270 => 1,
            _ => 0,
        }
    }
}

impl RawDecoder for RawLoaderDecoder {
    fn decode(&self, data: &[u8]) -> Result<RawFrame> {
        debug!("Decoding RAW image, {} bytes", data.len());

        let decoded = rawloader::decode(&mut Cursor::new(data))
            .map_err(|e| PipelineError::DecodeError(e.to_string()))?;

        let raw_width = decoded.width;
        let raw_height = decoded.height;
        let [crop_top, crop_right, crop_bottom, crop_left] = decoded.crops;
        let width = raw_width.saturating_sub(crop_left + crop_right);
        let height = raw_height.saturating_sub(crop_top + crop_bottom);

        debug!(
            "Decoded {} {}: sensor {}x{}, active {}x{} at ({}, {})",
            decoded.clean_make, decoded.clean_model, raw_width, raw_height, width, height, crop_left, crop_top
        );

        let cfa = Self::pattern(&decoded, crop_top, crop_left)?;
        let colors = if (0..2).any(|r| (0..2).any(|c| decoded.cfa.color_at(r, c) == 3)) {
            4
        } else {
            3
        };

        // Integer data is used as-is, float data (normalized 0.0-1.0) is scaled to u16 range
        let mosaic: Vec<u16> = match &decoded.data {
            RawloaderImageData::Integer(values) => values.clone(),
            RawloaderImageData::Float(values) => values
                .iter()
                .map(|&v| (v.clamp(0.0, 1.0) * u16::MAX as f32) as u16)
                .collect(),
        };

        let maximum = decoded
            .whitelevels
            .iter()
            .copied()
            .max()
            .filter(|&w| w > 0)
            .unwrap_or(u16::MAX) as u32;

        // rawloader reports levels and multipliers by colour (R, G, B, E);
        // slot 3 is the second green unless the sensor really has a fourth colour.
        let bl = decoded.blacklevels;
        let fourth = if colors == 4 { 3 } else { 1 };
        let black = BlackLevels::uniform([
            bl[0] as u32,
            bl[1] as u32,
            bl[2] as u32,
            bl[fourth] as u32,
        ]);

        let wb = decoded.wb_coeffs.map(|v| if v.is_finite() { v } else { 0.0 });
        let wb_multipliers = [wb[0], wb[1], wb[2], wb[fourth]];

        let cam_to_xyz = ColorMatrix::new(decoded.cam_to_xyz_normalized());

        let frame = RawFrame {
            raw_width,
            raw_height,
            top_margin: crop_top,
            left_margin: crop_left,
            width,
            height,
            data: mosaic,
            cfa,
            colors,
            black,
            cam_to_xyz,
            wb_multipliers,
            white_samples: None,
            maximum,
            quarter_turns: Self::quarter_turns(decoded.orientation),
            camera: CameraIdentity {
                make: decoded.clean_make.clone(),
                model: decoded.clean_model.clone(),
                lens: None,
            },
        };
        frame.validate()?;

        debug!(
            "CFA id {:#010x}, white level {}, black {:?}, wb {:?}",
            frame.cfa.id(),
            frame.maximum,
            frame.black.per_channel,
            frame.wb_multipliers
        );
        Ok(frame)
    }
}
