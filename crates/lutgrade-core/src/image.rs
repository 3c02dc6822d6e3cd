//! RGBA8 pixel buffers exchanged between hosts and LUT backends.

use std::fmt;

use crate::error::ImageError;

/// An owned, tightly packed RGBA8 raster.
///
/// This is what a host reads back from an image resource, what both backends
/// consume, and what they hand back. Rows are top to bottom, no padding.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Pixel data, `width * height` entries, RGBA order.
    pub pixels: Vec<[u8; 4]>,
}

impl PixelBuffer {
    /// Build a buffer from per-pixel RGBA values.
    pub fn new(width: u32, height: u32, pixels: Vec<[u8; 4]>) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(ImageError::BufferSize {
                width,
                height,
                expected: expected * 4,
                actual: pixels.len() * 4,
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a buffer from a flat RGBA8 byte slice.
    pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(ImageError::BufferSize {
                width,
                height,
                expected,
                actual: bytes.len(),
            });
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A buffer of the given size filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![rgba; width as usize * height as usize],
        }
    }

    /// Pixel count.
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Whether the buffer has no pixels.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Flat RGBA8 view of the pixel data.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Pixel at `(x, y)`, if in bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Convert into an [`image::RgbaImage`].
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let width = self.width as usize;
        image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            image::Rgba(self.pixels[y as usize * width + x as usize])
        })
    }
}

impl From<image::RgbaImage> for PixelBuffer {
    fn from(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let pixels = img.pixels().map(|p| p.0).collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("[{} px]", self.pixels.len()))
            .finish()
    }
}
