//! Error types shared by the LUT model, parser, and backends.

/// Reasons a LUT could not be built from its source description.
///
/// Parsing through [`crate::parse_lut`] never surfaces these to the caller;
/// they are logged and replaced by a generated LUT. The strict parser and
/// the [`crate::LutTable`] constructors return them directly.
#[derive(Debug, thiserror::Error)]
pub enum LutError {
    #[error("invalid LUT size {size}: must be between 2 and {max}")]
    InvalidSize { size: i64, max: u32 },

    #[error("LUT_3D_SIZE not specified")]
    MissingSize,

    #[error("expected {expected} data points for size {size}, got {found}")]
    PointCount {
        size: u32,
        expected: usize,
        found: usize,
    },

    #[error("1D LUTs are not supported")]
    UnsupportedDimensionality,

    #[error("invalid domain on channel {channel}: min {min} must be below max {max}")]
    InvalidDomain { channel: usize, min: f32, max: f32 },

    #[error("line {line}: invalid number {token:?}")]
    InvalidNumber { line: usize, token: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pixel buffer construction failures.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("pixel buffer holds {actual} bytes, {width}x{height} RGBA8 needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Failure reported by a LUT backend through [`crate::LutApplier`].
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("{backend} backend failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

/// Failure fetching raw LUT bytes from a [`crate::LutSource`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("LUT source {location:?} not found")]
    NotFound { location: String },

    #[error("failed to fetch LUT from {location:?}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}
