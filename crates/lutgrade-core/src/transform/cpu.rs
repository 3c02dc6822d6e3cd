//! CPU LUT application over RGBA8 pixel buffers.

use crate::backend::LutApplier;
use crate::error::ApplyError;
use crate::image::PixelBuffer;
use crate::transform::lut::{LutHandle, LutTable};

/// Clamp a blend strength into `[0, 1]`; non-finite values disable the blend.
#[inline]
pub fn sanitize_strength(strength: f32) -> f32 {
    if strength.is_finite() {
        strength.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Apply `lut` to every pixel and blend with the source by `strength`.
///
/// Returns a new buffer; the input is untouched. Alpha passes through.
/// Each output channel is `original * (1 - strength) + lut * strength`,
/// computed in byte space, clamped and rounded.
pub fn apply_cpu(image: &PixelBuffer, lut: &LutTable, strength: f32) -> PixelBuffer {
    let strength = sanitize_strength(strength);
    let pixels = image
        .pixels
        .iter()
        .map(|&px| transform_pixel(px, lut, strength))
        .collect();
    PixelBuffer {
        width: image.width,
        height: image.height,
        pixels,
    }
}

#[inline]
fn transform_pixel(px: [u8; 4], lut: &LutTable, strength: f32) -> [u8; 4] {
    if strength == 0.0 {
        return px;
    }
    let input = [
        px[0] as f32 / 255.0,
        px[1] as f32 / 255.0,
        px[2] as f32 / 255.0,
    ];
    let graded = lut.evaluate(input);
    let mut out = px;
    for c in 0..3 {
        let original = px[c] as f32;
        let mapped = graded[c] * 255.0;
        let blended = original * (1.0 - strength) + mapped * strength;
        out[c] = blended.clamp(0.0, 255.0).round() as u8;
    }
    out
}

/// The CPU backend. Stateless; always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuLutApplier;

impl LutApplier for CpuLutApplier {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn apply_lut(
        &mut self,
        image: &PixelBuffer,
        lut: &LutHandle,
        strength: f32,
    ) -> Result<PixelBuffer, ApplyError> {
        Ok(apply_cpu(image, lut.table(), strength))
    }
}
