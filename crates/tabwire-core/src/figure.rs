//! Renderable figures.
//!
//! A figure is an RGBA raster. Drawing happens elsewhere; the worker only
//! stores figures and renders them to PNG for `get_image`.

use crate::{Result, WorkerError};
use std::fmt;

/// An RGBA canvas, 8 bits per channel, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Figure {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Figure {
    /// Build a figure from raw RGBA pixels.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 {
            return Err(WorkerError::Figure {
                message: format!("figure dimensions must be positive, got {}x{}", width, height),
            });
        }
        if pixels.len() != expected {
            return Err(WorkerError::Figure {
                message: format!(
                    "expected {} RGBA bytes for {}x{}, got {}",
                    expected,
                    width,
                    height,
                    pixels.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A fully opaque single-colour figure.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Encode the canvas as PNG.
    pub fn render_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().map_err(png_error)?;
            writer.write_image_data(&self.pixels).map_err(png_error)?;
            writer.finish().map_err(png_error)?;
        }
        Ok(out)
    }
}

fn png_error(err: png::EncodingError) -> WorkerError {
    WorkerError::Figure {
        message: err.to_string(),
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Figure({}x{})", self.width, self.height)
    }
}

impl fmt::Debug for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Figure")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn test_render_png_signature() {
        let figure = Figure::solid(8, 4, [255, 0, 0]);
        let png = figure.render_png().unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_from_rgba_validates_length() {
        assert!(Figure::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(Figure::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Figure::from_rgba(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Figure::solid(640, 480, [0, 0, 0]).to_string(), "Figure(640x480)");
    }
}
