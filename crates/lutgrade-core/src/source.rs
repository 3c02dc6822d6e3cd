//! Fetching raw `.cube` bytes from wherever the host keeps them.

use std::path::PathBuf;

use crate::error::FetchError;
use crate::transform::cube::parse_lut;
use crate::transform::lut::LutTable;

/// A byte fetcher for LUT files.
///
/// Network and asset-bundle sources live in the host; this crate only ships
/// a filesystem implementation.
pub trait LutSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

/// Reads LUT files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileLutSource {
    root: PathBuf,
}

impl FileLutSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LutSource for FileLutSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.root.join(location);
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound {
                location: location.to_string(),
            },
            _ => FetchError::Io {
                location: location.to_string(),
                source,
            },
        })
    }
}

/// Fetch and parse a LUT.
///
/// Fetch failures are returned to the caller; content problems are not
/// (see [`parse_lut`]).
pub fn load_lut(source: &dyn LutSource, location: &str) -> Result<LutTable, FetchError> {
    let bytes = source.fetch(location)?;
    tracing::debug!("fetched {} bytes of LUT data from {location:?}", bytes.len());
    Ok(parse_lut(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(&'static str);

    impl LutSource for StaticSource {
        fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
            if location == "present.cube" {
                Ok(self.0.as_bytes().to_vec())
            } else {
                Err(FetchError::NotFound {
                    location: location.to_string(),
                })
            }
        }
    }

    #[test]
    fn test_load_lut_parses_fetched_bytes() {
        let source = StaticSource("LUT_3D_SIZE 2\n0 0 0\n1 0 0\n0 1 0\n1 1 0\n0 0 1\n1 0 1\n0 1 1\n1 1 1\n");
        let lut = load_lut(&source, "present.cube").expect("fetch succeeds");
        assert_eq!(lut.size(), 2);
        assert_eq!(lut.data()[5], [1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_load_lut_propagates_fetch_errors() {
        let source = StaticSource("");
        let err = load_lut(&source, "missing.cube").expect_err("fetch fails");
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_load_lut_falls_back_on_garbage() {
        let source = StaticSource("not a cube file at all");
        let lut = load_lut(&source, "present.cube").expect("fetch succeeds");
        assert_eq!(lut.size(), crate::DEFAULT_LUT_SIZE);
    }

    #[test]
    fn test_file_source_reports_missing_file() {
        let source = FileLutSource::new(std::env::temp_dir());
        let err = source
            .fetch("lutgrade-definitely-missing.cube")
            .expect_err("file does not exist");
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_file_source_reads_saved_cube() {
        let dir = std::env::temp_dir().join(format!("lutgrade-source-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let lut = LutTable::identity(3).expect("valid size");
        lut.save_cube(&dir.join("identity.cube")).expect("write cube");

        let loaded = load_lut(&FileLutSource::new(&dir), "identity.cube").expect("read cube");
        assert_eq!(loaded.size(), 3);
        assert_eq!(loaded.title(), Some("Identity"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
