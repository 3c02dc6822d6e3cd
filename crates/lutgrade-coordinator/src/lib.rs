//! lutgrade coordinator: runs LUT passes over host-owned images.
//!
//! The host implements [`ImageResource`] (and optionally [`ImageFeed`]);
//! [`ImageCoordinator`] waits for images to load, guards against
//! overlapping passes, recovers from cross-origin read-back failures, and
//! swaps each image's content for the processed result on the GPU or CPU
//! backend.

pub mod backends;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;

pub use backends::BackendSet;
pub use config::{BackendPreference, CoordinatorConfig};
pub use coordinator::{ApplyOutcome, ImageCoordinator, Phase};
pub use error::ProcessError;
pub use host::{ImageFeed, ImageResource, ImageSource, LoadOutcome, ReadError, Readiness};
