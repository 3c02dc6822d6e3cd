//! 3D LUT model, trilinear evaluation, and `.cube` file I/O.

use std::path::Path;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::LutError;

/// Smallest grid a 3D LUT can have.
pub const MIN_LUT_SIZE: u32 = 2;
/// Largest grid accepted from files or constructors (256³ entries).
pub const MAX_LUT_SIZE: u32 = 256;
/// Grid size used when a malformed LUT declares none.
pub const DEFAULT_LUT_SIZE: u32 = 17;

/// A 3D lookup table mapping an RGB triplet to an RGB triplet.
///
/// The grid holds `size³` samples stored with R varying fastest, then G,
/// then B, i.e. the sample for grid point `(r, g, b)` lives at
/// `b * size² + g * size + r`. Tables are immutable once built; share them
/// through [`Arc`] (see [`LutHandle`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLutTable")]
pub struct LutTable {
    size: u32,
    data: Vec<[f32; 3]>,
    domain_min: [f32; 3],
    domain_max: [f32; 3],
    title: Option<String>,
}

impl LutTable {
    /// Build a table over the default `[0, 1]` domain.
    pub fn new(size: u32, data: Vec<[f32; 3]>) -> Result<Self, LutError> {
        validate_size(size as i64)?;
        let expected = entry_count(size);
        if data.len() != expected {
            return Err(LutError::PointCount {
                size,
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            size,
            data,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            title: None,
        })
    }

    /// The identity table of the given size.
    pub fn identity(size: u32) -> Result<Self, LutError> {
        Ok(Self::identity_unchecked(validate_size(size as i64)?).with_title("Identity"))
    }

    pub(crate) fn identity_unchecked(size: u32) -> Self {
        let scale = (size - 1) as f32;
        let mut data = Vec::with_capacity(entry_count(size));
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    data.push([r as f32 / scale, g as f32 / scale, b as f32 / scale]);
                }
            }
        }
        Self {
            size,
            data,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            title: None,
        }
    }

    /// Replace the input domain. Each channel's max must exceed its min.
    pub fn with_domain(mut self, min: [f32; 3], max: [f32; 3]) -> Result<Self, LutError> {
        validate_domain(min, max)?;
        self.domain_min = min;
        self.domain_max = max;
        Ok(self)
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Samples per axis.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Grid samples in R-fastest order.
    pub fn data(&self) -> &[[f32; 3]] {
        &self.data
    }

    /// Grid samples as a flat `[r, g, b, r, g, b, ...]` slice.
    pub fn as_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn domain_min(&self) -> [f32; 3] {
        self.domain_min
    }

    pub fn domain_max(&self) -> [f32; 3] {
        self.domain_max
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Whether the domain is the default `[0, 1]` cube.
    pub fn has_default_domain(&self) -> bool {
        self.domain_min == [0.0; 3] && self.domain_max == [1.0; 3]
    }

    /// Flat index of grid point `(r, g, b)`.
    #[inline]
    pub fn index(&self, r: u32, g: u32, b: u32) -> usize {
        let n = self.size as usize;
        b as usize * n * n + g as usize * n + r as usize
    }

    /// Grid sample at `(r, g, b)`, with coordinates clamped to the grid.
    #[inline]
    pub fn sample(&self, r: u32, g: u32, b: u32) -> [f32; 3] {
        let last = self.size - 1;
        self.data[self.index(r.min(last), g.min(last), b.min(last))]
    }

    /// Evaluate the table at an input color using trilinear interpolation.
    ///
    /// The input is remapped from `[domain_min, domain_max]` into `[0, 1]`
    /// and clamped before lookup. Exact grid points return their sample
    /// unmodified.
    pub fn evaluate(&self, rgb: [f32; 3]) -> [f32; 3] {
        let last = self.size - 1;
        let scale = last as f32;
        let min = Vec3::from(self.domain_min);
        let max = Vec3::from(self.domain_max);
        let normalized = ((Vec3::from(rgb) - min) / (max - min)).clamp(Vec3::ZERO, Vec3::ONE);
        let grid = normalized * scale;

        let lo = grid.floor();
        let hi = grid.ceil();
        let frac = grid - lo;
        let (r0, g0, b0) = (lo.x as u32, lo.y as u32, lo.z as u32);
        let (r1, g1, b1) = (
            (hi.x as u32).min(last),
            (hi.y as u32).min(last),
            (hi.z as u32).min(last),
        );

        let corner = |r, g, b| Vec3::from(self.sample(r, g, b));

        // Along R.
        let c00 = corner(r0, g0, b0).lerp(corner(r1, g0, b0), frac.x);
        let c10 = corner(r0, g1, b0).lerp(corner(r1, g1, b0), frac.x);
        let c01 = corner(r0, g0, b1).lerp(corner(r1, g0, b1), frac.x);
        let c11 = corner(r0, g1, b1).lerp(corner(r1, g1, b1), frac.x);
        // Along G.
        let c0 = c00.lerp(c10, frac.y);
        let c1 = c01.lerp(c11, frac.y);
        // Along B.
        c0.lerp(c1, frac.z).to_array()
    }

    /// Serialize to `.cube` text.
    pub fn to_cube_string(&self) -> String {
        use std::fmt::Write;

        let mut out = String::with_capacity(self.data.len() * 30 + 64);
        if let Some(title) = &self.title {
            let _ = writeln!(out, "TITLE \"{title}\"");
        }
        let _ = writeln!(out, "LUT_3D_SIZE {}", self.size);
        if !self.has_default_domain() {
            let [r, g, b] = self.domain_min;
            let _ = writeln!(out, "DOMAIN_MIN {r:.6} {g:.6} {b:.6}");
            let [r, g, b] = self.domain_max;
            let _ = writeln!(out, "DOMAIN_MAX {r:.6} {g:.6} {b:.6}");
        }
        out.push('\n');
        for [r, g, b] in &self.data {
            let _ = writeln!(out, "{r:.6} {g:.6} {b:.6}");
        }
        out
    }

    /// Load a 3D LUT from a `.cube` file.
    ///
    /// I/O failures are returned; malformed content falls back the same way
    /// [`crate::parse_lut`] does.
    pub fn load_cube(path: &Path) -> Result<Self, LutError> {
        let bytes = std::fs::read(path)?;
        Ok(crate::transform::cube::parse_lut(&bytes))
    }

    /// Save this 3D LUT to a `.cube` file.
    pub fn save_cube(&self, path: &Path) -> Result<(), LutError> {
        std::fs::write(path, self.to_cube_string())?;
        Ok(())
    }
}

/// Unchecked wire form of [`LutTable`]; deserialization goes through
/// the validating constructors.
#[derive(Deserialize)]
struct RawLutTable {
    size: u32,
    data: Vec<[f32; 3]>,
    #[serde(default)]
    domain_min: Option<[f32; 3]>,
    #[serde(default)]
    domain_max: Option<[f32; 3]>,
    #[serde(default)]
    title: Option<String>,
}

impl TryFrom<RawLutTable> for LutTable {
    type Error = LutError;

    fn try_from(raw: RawLutTable) -> Result<Self, Self::Error> {
        let mut lut = LutTable::new(raw.size, raw.data)?.with_domain(
            raw.domain_min.unwrap_or([0.0; 3]),
            raw.domain_max.unwrap_or([1.0; 3]),
        )?;
        lut.title = raw.title;
        Ok(lut)
    }
}

/// A LUT paired with the logical id backends cache it under.
///
/// Two handles with the same id are assumed to carry the same table; the
/// GPU engine will not re-upload on a repeated id.
#[derive(Debug, Clone)]
pub struct LutHandle {
    id: Arc<str>,
    table: Arc<LutTable>,
}

impl LutHandle {
    pub fn new(id: impl Into<Arc<str>>, table: impl Into<Arc<LutTable>>) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table(&self) -> &LutTable {
        &self.table
    }

    /// Shared pointer to the table.
    pub fn shared_table(&self) -> Arc<LutTable> {
        Arc::clone(&self.table)
    }
}

pub(crate) fn entry_count(size: u32) -> usize {
    let n = size as usize;
    n * n * n
}

pub(crate) fn validate_size(size: i64) -> Result<u32, LutError> {
    if size < MIN_LUT_SIZE as i64 || size > MAX_LUT_SIZE as i64 {
        return Err(LutError::InvalidSize {
            size,
            max: MAX_LUT_SIZE,
        });
    }
    Ok(size as u32)
}

pub(crate) fn validate_domain(min: [f32; 3], max: [f32; 3]) -> Result<(), LutError> {
    for channel in 0..3 {
        let (lo, hi) = (min[channel], max[channel]);
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(LutError::InvalidDomain {
                channel,
                min: lo,
                max: hi,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn assert_rgb_close(a: [f32; 3], b: [f32; 3], eps: f32) {
        for c in 0..3 {
            assert!(
                (a[c] - b[c]).abs() < eps,
                "channel {c}: {:.6} vs {:.6}",
                a[c],
                b[c]
            );
        }
    }

    #[test]
    fn test_identity_layout_is_r_fastest() {
        let lut = LutTable::identity(3).expect("valid size");
        assert_eq!(lut.data().len(), 27);
        assert_eq!(lut.as_flat().len(), 81);
        assert_rgb_close(lut.data()[1], [0.5, 0.0, 0.0], EPSILON);
        assert_rgb_close(lut.data()[3], [0.0, 0.5, 0.0], EPSILON);
        assert_rgb_close(lut.data()[9], [0.0, 0.0, 0.5], EPSILON);
        assert_rgb_close(lut.data()[26], [1.0, 1.0, 1.0], EPSILON);
        assert_eq!(lut.title(), Some("Identity"));
    }

    #[test]
    fn test_identity_rejects_out_of_range_sizes() {
        assert!(matches!(
            LutTable::identity(1),
            Err(LutError::InvalidSize { size: 1, .. })
        ));
        assert!(LutTable::identity(MAX_LUT_SIZE + 1).is_err());
    }

    #[test]
    fn test_new_rejects_wrong_point_count() {
        let err = LutTable::new(2, vec![[0.0; 3]; 7]).expect_err("7 points is not 2^3");
        assert!(matches!(
            err,
            LutError::PointCount {
                size: 2,
                expected: 8,
                found: 7
            }
        ));
    }

    #[test]
    fn test_with_domain_rejects_inverted_range() {
        let lut = LutTable::identity(2).expect("valid size");
        let err = lut
            .with_domain([0.0, 0.5, 0.0], [1.0, 0.5, 1.0])
            .expect_err("zero-width green domain");
        assert!(matches!(err, LutError::InvalidDomain { channel: 1, .. }));
    }

    #[test]
    fn test_evaluate_identity_is_passthrough() {
        for size in [2, 3, 17, 33] {
            let lut = LutTable::identity(size).expect("valid size");
            for rgb in [[0.0, 0.0, 0.0], [0.25, 0.5, 0.75], [0.1, 0.9, 0.33], [1.0, 1.0, 1.0]] {
                assert_rgb_close(lut.evaluate(rgb), rgb, 1e-5);
            }
        }
    }

    #[test]
    fn test_evaluate_corners_are_exact() {
        let corners = vec![
            [0.9, 0.1, 0.2],
            [0.3, 0.4, 0.5],
            [0.6, 0.7, 0.8],
            [0.05, 0.15, 0.25],
            [0.35, 0.45, 0.55],
            [0.65, 0.75, 0.85],
            [0.11, 0.22, 0.33],
            [0.44, 0.55, 0.66],
        ];
        let lut = LutTable::new(2, corners.clone()).expect("valid table");
        for b in 0..2u32 {
            for g in 0..2u32 {
                for r in 0..2u32 {
                    let input = [r as f32, g as f32, b as f32];
                    let expected = corners[lut.index(r, g, b)];
                    assert_eq!(lut.evaluate(input), expected, "corner ({r}, {g}, {b})");
                }
            }
        }
    }

    #[test]
    fn test_evaluate_cell_center_averages_corners() {
        let corners: Vec<[f32; 3]> = (0..8).map(|i| [i as f32 / 7.0, 0.0, 1.0]).collect();
        let lut = LutTable::new(2, corners.clone()).expect("valid table");
        let mean = corners.iter().map(|c| c[0]).sum::<f32>() / 8.0;
        assert_rgb_close(lut.evaluate([0.5, 0.5, 0.5]), [mean, 0.0, 1.0], 1e-5);
    }

    #[test]
    fn test_evaluate_clamps_outside_domain() {
        let lut = LutTable::identity(5).expect("valid size");
        assert_rgb_close(lut.evaluate([-0.5, 1.5, 2.0]), [0.0, 1.0, 1.0], EPSILON);
    }

    #[test]
    fn test_evaluate_remaps_domain() {
        let lut = LutTable::identity(3)
            .expect("valid size")
            .with_domain([0.0; 3], [2.0; 3])
            .expect("valid domain");
        assert_rgb_close(lut.evaluate([1.0, 0.5, 2.0]), [0.5, 0.25, 1.0], 1e-5);
    }

    #[test]
    fn test_deserialize_validates_table() {
        let lut = LutTable::identity(2)
            .expect("valid size")
            .with_domain([0.0; 3], [2.0; 3])
            .expect("valid domain");
        let json = serde_json::to_string(&lut).expect("serialize");
        let parsed: LutTable = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, lut);

        let short = r#"{"size":4,"data":[[0,0,0]],"domain_min":[0,0,0],"domain_max":[1,1,1],"title":null}"#;
        assert!(serde_json::from_str::<LutTable>(short).is_err());

        let zero = r#"{"size":0,"data":[],"domain_min":[0,0,0],"domain_max":[1,1,1],"title":null}"#;
        assert!(serde_json::from_str::<LutTable>(zero).is_err());

        let flat = r#"{"size":2,"data":[[0,0,0],[0,0,0],[0,0,0],[0,0,0],[0,0,0],[0,0,0],[0,0,0],[0,0,0]],"domain_min":[1,0,0],"domain_max":[1,1,1],"title":null}"#;
        let err = serde_json::from_str::<LutTable>(flat).expect_err("degenerate domain");
        assert!(err.to_string().contains("invalid domain"), "{err}");
    }

    #[test]
    fn test_cube_string_header() {
        let text = LutTable::identity(2).expect("valid size").to_cube_string();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("TITLE \"Identity\""));
        assert_eq!(lines.next(), Some("LUT_3D_SIZE 2"));
        assert!(!text.contains("DOMAIN_MIN"));
        assert_eq!(text.lines().filter(|l| !l.is_empty()).count(), 2 + 8);
    }

    #[test]
    fn test_handle_shares_table() {
        let handle = LutHandle::new("identity", LutTable::identity(2).expect("valid size"));
        let other = handle.clone();
        assert_eq!(other.id(), "identity");
        assert!(Arc::ptr_eq(&handle.shared_table(), &other.shared_table()));
    }
}
