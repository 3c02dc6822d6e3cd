//! Packing a 3D LUT into a 2D texture for devices without 3D sampling.
//!
//! The N×N×N grid becomes an N²×N image: each blue slice is one row band,
//! green slices sit side by side along X, red varies fastest within a slice.
//! Linear index `idx = r + g·N + b·N²` lands on pixel `(idx mod N², idx div N²)`.

/// Width and height of the tiled texture for a LUT of `size`.
pub fn tiled_extent(size: u32) -> (u32, u32) {
    (size * size, size)
}

/// Destination pixel of a flat LUT index.
#[inline]
pub fn tile_coord(index: usize, size: u32) -> (u32, u32) {
    let row = size as usize * size as usize;
    ((index % row) as u32, (index / row) as u32)
}

/// Re-tile flat RGBA texels into the legacy 2D layout, row-major.
///
/// `texels` is indexed by the flat LUT index; the result is indexed by
/// `y * N² + x`.
pub fn tile_texels<T: Copy + Default>(texels: &[T], size: u32) -> Vec<T> {
    let (width, height) = tiled_extent(size);
    let mut out = vec![T::default(); width as usize * height as usize];
    for (index, &texel) in texels.iter().enumerate() {
        let (x, y) = tile_coord(index, size);
        out[y as usize * width as usize + x as usize] = texel;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_coord_is_bijective() {
        for size in [2u32, 3, 5, 17, 33] {
            let (width, height) = tiled_extent(size);
            let total = (size * size * size) as usize;
            let mut seen = vec![false; width as usize * height as usize];
            assert_eq!(seen.len(), total);
            for index in 0..total {
                let (x, y) = tile_coord(index, size);
                assert!(x < width && y < height, "size {size}: index {index} out of bounds");
                let slot = y as usize * width as usize + x as usize;
                assert!(!seen[slot], "size {size}: collision at ({x}, {y})");
                seen[slot] = true;
            }
            assert!(seen.iter().all(|&hit| hit), "size {size}: uncovered pixel");
        }
    }

    #[test]
    fn test_tile_coord_matches_slice_layout() {
        let size = 4;
        // r = 1, g = 2, b = 3
        let index = 1 + 2 * 4 + 3 * 16;
        assert_eq!(tile_coord(index, size), (1 + 2 * 4, 3));
    }

    #[test]
    fn test_tile_texels_places_every_entry() {
        let size = 3u32;
        let flat: Vec<u32> = (0..27).collect();
        let tiled = tile_texels(&flat, size);
        // Row-major over an N²×N image is the same order as the flat index.
        assert_eq!(tiled, flat);
    }
}
