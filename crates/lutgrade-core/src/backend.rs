//! The capability interface shared by the CPU and GPU LUT backends.

use crate::error::ApplyError;
use crate::image::PixelBuffer;
use crate::transform::lut::LutHandle;

/// Something that can apply a 3D LUT to an RGBA8 image.
///
/// Implementations must follow the same math: domain remap, trilinear
/// lookup, byte-space blend by `strength`, alpha untouched. Outputs of
/// different backends may differ by a small per-channel tolerance but never
/// in layout or dimensions.
pub trait LutApplier {
    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Produce a transformed copy of `image`.
    fn apply_lut(
        &mut self,
        image: &PixelBuffer,
        lut: &LutHandle,
        strength: f32,
    ) -> Result<PixelBuffer, ApplyError>;

    /// Release backend resources. Later calls may fail.
    fn dispose(&mut self) {}
}

impl<T: LutApplier + ?Sized> LutApplier for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn apply_lut(
        &mut self,
        image: &PixelBuffer,
        lut: &LutHandle,
        strength: f32,
    ) -> Result<PixelBuffer, ApplyError> {
        (**self).apply_lut(image, lut, strength)
    }

    fn dispose(&mut self) {
        (**self).dispose()
    }
}
