/// Screen-tile binning of transformed occluder triangles
///
/// Key design points:
/// 1. The screen is split into fixed-size tiles; a triangle is appended to
///    every tile its screen-space bounding box overlaps.
/// 2. Each binning task owns a partition of the tables (task × tile × entry),
///    so the downstream rasterizer can walk one tile's entries task by task.
/// 3. `BinTables` assumes a single writer. `SharedBinTables` reserves entries
///    with an atomic per-bin counter so any number of workers can append.
pub mod bins;

pub use bins::{BinEntry, BinTables, SharedBinTables};

use crate::error::{OccluderError, OccluderResult};
use glam::Vec2;

/// Binning configuration
#[derive(Debug, Clone)]
pub struct BinConfig {
    /// Render target width in pixels
    pub screen_width: usize,
    /// Render target height in pixels
    pub screen_height: usize,
    /// Tile width in pixels
    pub tile_width: usize,
    /// Tile height in pixels
    pub tile_height: usize,
    /// Entries each (task, tile) bin can hold before further entries are dropped
    pub max_tris_per_bin: usize,
    /// Skip triangles with clockwise screen-space winding
    pub cull_backfaces: bool,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            screen_width: 1280,
            screen_height: 720,
            tile_width: 320,
            tile_height: 90,
            max_tris_per_bin: 1024 * 16,
            cull_backfaces: true,
        }
    }
}

/// Inclusive range of tiles touched by a screen-space rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

/// Validated tile layout derived from a `BinConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub screen_width: usize,
    pub screen_height: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    /// Number of tiles horizontally
    pub tiles_x: usize,
    /// Number of tiles vertically
    pub tiles_y: usize,
}

impl TileGrid {
    pub fn new(config: &BinConfig) -> OccluderResult<Self> {
        if config.screen_width == 0 || config.screen_height == 0 {
            return Err(OccluderError::InvalidBinConfig(format!(
                "screen size {}x{} is empty",
                config.screen_width, config.screen_height
            )));
        }
        if config.tile_width == 0 || config.tile_height == 0 {
            return Err(OccluderError::InvalidBinConfig(format!(
                "tile size {}x{} is empty",
                config.tile_width, config.tile_height
            )));
        }

        Ok(Self {
            screen_width: config.screen_width,
            screen_height: config.screen_height,
            tile_width: config.tile_width,
            tile_height: config.tile_height,
            tiles_x: (config.screen_width + config.tile_width - 1) / config.tile_width,
            tiles_y: (config.screen_height + config.tile_height - 1) / config.tile_height,
        })
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    #[inline]
    pub fn tile_index(&self, tile_x: usize, tile_y: usize) -> usize {
        tile_y * self.tiles_x + tile_x
    }

    /// Tiles overlapped by the screen-space box `[min, max]`, clamped to the
    /// screen. Returns `None` when the box lies entirely off-screen.
    pub fn tile_span(&self, min: Vec2, max: Vec2) -> Option<TileSpan> {
        let min_x = min.x.floor() as i64;
        let min_y = min.y.floor() as i64;
        let max_x = max.x.ceil() as i64;
        let max_y = max.y.ceil() as i64;

        let width = self.screen_width as i64;
        let height = self.screen_height as i64;
        if max_x < 0 || max_y < 0 || min_x >= width || min_y >= height {
            return None;
        }

        let min_x = min_x.max(0) as usize;
        let min_y = min_y.max(0) as usize;
        let max_x = max_x.min(width - 1) as usize;
        let max_y = max_y.min(height - 1) as usize;

        Some(TileSpan {
            x0: min_x / self.tile_width,
            y0: min_y / self.tile_height,
            x1: max_x / self.tile_width,
            y1: max_y / self.tile_height,
        })
    }
}
