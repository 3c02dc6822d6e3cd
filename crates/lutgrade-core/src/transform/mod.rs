//! LUT model, `.cube` parsing, and the CPU interpolation backend.

pub mod cpu;
pub mod cube;
pub mod lut;
