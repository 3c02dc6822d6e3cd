//! GPU engine errors.

use lutgrade_core::ApplyError;

/// Everything that can go wrong inside [`crate::GpuLutEngine`].
///
/// Context and shader failures are fatal to the engine; callers are expected
/// to fall back to the CPU backend.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("shader pipeline build failed: {0}")]
    ShaderBuild(String),

    #[error("GPU validation error during {operation}: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },

    #[error("GPU out of memory during {operation}")]
    OutOfMemory { operation: &'static str },

    #[error("no LUT loaded")]
    NoLutLoaded,

    #[error("LUT {0:?} is not cached on this engine")]
    UnknownLut(String),

    #[error("LUT size {size} exceeds device limit {limit} for this tier")]
    LutTooLarge { size: u32, limit: u32 },

    #[error("image {width}x{height} exceeds device texture limit {limit}")]
    ImageTooLarge { width: u32, height: u32, limit: u32 },

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("engine has been disposed")]
    Disposed,
}

impl GpuError {
    /// Classify a wgpu error captured from an error scope.
    pub(crate) fn from_scope(operation: &'static str, error: wgpu::Error) -> Self {
        match error {
            wgpu::Error::OutOfMemory { .. } => Self::OutOfMemory { operation },
            other => Self::Validation {
                operation,
                message: other.to_string(),
            },
        }
    }
}

impl From<GpuError> for ApplyError {
    fn from(err: GpuError) -> Self {
        ApplyError::Backend {
            backend: "gpu",
            message: err.to_string(),
        }
    }
}
