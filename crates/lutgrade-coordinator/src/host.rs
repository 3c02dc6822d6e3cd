//! Interfaces the host environment implements for the coordinator.
//!
//! The coordinator never polls. Every wait is a one-shot callback the host
//! fires when an image load settles.

use std::rc::Rc;
use std::sync::Arc;

use lutgrade_core::PixelBuffer;

/// Load state of an image resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
    Failed,
}

/// How a pending load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed { reason: String },
}

/// What an image currently displays.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// The host's own locator for the unprocessed content (URL, path, ...).
    Original(String),
    /// Pixels produced by a LUT pass.
    Processed(Arc<PixelBuffer>),
}

impl ImageSource {
    /// Whether this is the output of a previous pass.
    pub fn is_derived(&self) -> bool {
        matches!(self, ImageSource::Processed(_))
    }
}

/// Why pixels could not be read back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("pixel read-back blocked: cross-origin source without access permission")]
    Tainted,

    #[error("pixels unavailable: {0}")]
    Unavailable(String),
}

/// A raster image owned by the host.
///
/// All methods take `&self`; hosts use interior mutability. Implementations
/// may run `on_settled` callbacks synchronously when the load has already
/// settled.
pub trait ImageResource {
    fn readiness(&self) -> Readiness;

    fn source(&self) -> ImageSource;

    /// Display new content. Usually starts a new load.
    fn set_source(&self, source: ImageSource);

    /// Whether pixel read-back needs cross-origin access permission.
    fn requires_cross_origin(&self) -> bool;

    fn has_cross_origin_flag(&self) -> bool;

    /// Request cross-origin access on the next load.
    fn set_cross_origin_flag(&self);

    /// Re-fetch the current source.
    fn reload(&self);

    fn read_pixels(&self) -> Result<PixelBuffer, ReadError>;

    /// Register a callback for the end of the current load.
    fn on_settled(&self, callback: Box<dyn FnOnce(LoadOutcome)>);
}

/// Notifies about image resources that appear in the host.
///
/// How the host discovers them is its own business.
pub trait ImageFeed {
    fn subscribe(&self, callback: Box<dyn FnMut(Rc<dyn ImageResource>)>);
}
