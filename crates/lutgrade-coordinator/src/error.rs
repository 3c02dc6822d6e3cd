//! Coordinator errors.

use lutgrade_core::ApplyError;

/// Why a processing pass ended without updating the image.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("image failed to load: {reason}")]
    ResourceLoad { reason: String },

    #[error("pixel read-back still blocked after cross-origin reload")]
    SecurityTaint,

    #[error(transparent)]
    Backend(#[from] ApplyError),

    #[error("no LUT backend available")]
    NoBackend,

    #[error("coordinator has been disposed")]
    Disposed,
}
