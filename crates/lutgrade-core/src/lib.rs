//! lutgrade core: 3D LUT model, `.cube` parsing, and CPU application.
//!
//! This crate holds the LUT data model, the exact trilinear math, and the
//! CPU backend. No GPU or host dependencies; `lutgrade-gpu` and
//! `lutgrade-coordinator` build on the types defined here.

pub mod backend;
pub mod error;
pub mod image;
pub mod source;
pub mod transform;

// Re-exports for convenience.
pub use backend::LutApplier;
pub use error::{ApplyError, FetchError, ImageError, LutError};
pub use image::PixelBuffer;
pub use source::{FileLutSource, LutSource, load_lut};
pub use transform::cpu::{CpuLutApplier, apply_cpu, sanitize_strength};
pub use transform::cube::{parse_cube_strict, parse_lut};
pub use transform::lut::{DEFAULT_LUT_SIZE, LutHandle, LutTable, MAX_LUT_SIZE, MIN_LUT_SIZE};

/// Identity LUT of the given size. Sizes outside `[2, 256]` are rejected.
pub fn create_identity_lut(size: u32) -> Result<LutTable, LutError> {
    LutTable::identity(size)
}
