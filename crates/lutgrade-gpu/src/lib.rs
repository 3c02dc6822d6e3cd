//! lutgrade GPU: wgpu render pipeline applying 3D LUTs to images.
//!
//! This crate owns all GPU resources. It exposes [`GpuLutEngine`], which
//! implements [`lutgrade_core::LutApplier`] so the coordinator can swap it
//! with the CPU backend.

pub mod buffers;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod readback;
pub mod tiling;

pub use engine::{GpuEngineOptions, GpuLutEngine, LutState};
pub use error::GpuError;
pub use pipeline::Tier;

/// Device features the engine needs. Both tiers run on baseline wgpu.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::empty()
}
