//! WMTS tile addressing for benchmark requests.

use serde::{Deserialize, Serialize};

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level (TileMatrix identifier)
    pub z: u32,
    /// Column (TileCol)
    pub x: u32,
    /// Row (TileRow)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether the coordinate lies inside a quad-tree matrix at its zoom.
    pub fn is_within_quadtree(&self) -> bool {
        if self.z >= 32 {
            return false;
        }
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }
}

impl Default for TileCoord {
    /// Tile over the Netherlands at zoom 8 in WebMercatorQuad.
    fn default() -> Self {
        Self { z: 8, x: 133, y: 84 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tile() {
        let tile = TileCoord::default();
        assert_eq!((tile.z, tile.x, tile.y), (8, 133, 84));
        assert!(tile.is_within_quadtree());
    }

    #[test]
    fn test_out_of_range() {
        assert!(!TileCoord::new(1, 2, 0).is_within_quadtree());
        assert!(TileCoord::new(0, 0, 0).is_within_quadtree());
        assert!(!TileCoord::new(40, 0, 0).is_within_quadtree());
    }
}
