/// Bin tables: per task, per tile lists of (triangle, model, mesh) entries
///
/// Layout mirrors the rasterizer's read order: entry `e` of tile `t` for task
/// `k` lives at `((k * tile_count) + t) * capacity + e`, and the matching
/// per-bin count at `(k * tile_count) + t`.
use super::{BinConfig, TileGrid};
use crate::error::{OccluderError, OccluderResult};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

/// One binned triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinEntry {
    /// Triangle index local to its mesh
    pub triangle: u32,
    /// Model index within the scene
    pub model: u16,
    /// Mesh index within the model
    pub mesh: u16,
}

/// Dimensions shared by both table flavours
#[derive(Debug, Clone, Copy)]
struct BinLayout {
    grid: TileGrid,
    task_count: usize,
    capacity: usize,
    cull_backfaces: bool,
}

impl BinLayout {
    fn new(config: &BinConfig, task_count: usize) -> OccluderResult<Self> {
        let grid = TileGrid::new(config)?;
        if task_count == 0 {
            return Err(OccluderError::InvalidBinConfig(
                "bin tables need at least one task".to_string(),
            ));
        }
        if config.max_tris_per_bin == 0 {
            return Err(OccluderError::InvalidBinConfig(
                "bins must hold at least one triangle".to_string(),
            ));
        }
        if config.max_tris_per_bin > u32::MAX as usize {
            return Err(OccluderError::InvalidBinConfig(format!(
                "bin capacity {} does not fit a 32-bit counter",
                config.max_tris_per_bin
            )));
        }

        Ok(Self {
            grid,
            task_count,
            capacity: config.max_tris_per_bin,
            cull_backfaces: config.cull_backfaces,
        })
    }

    #[inline]
    fn bin_count(&self) -> usize {
        self.task_count * self.grid.tile_count()
    }

    #[inline]
    fn bin_index(&self, task: usize, tile: usize) -> usize {
        debug_assert!(task < self.task_count, "task {} out of range", task);
        debug_assert!(tile < self.grid.tile_count(), "tile {} out of range", tile);
        task * self.grid.tile_count() + tile
    }

    fn check_task(&self, task: usize) -> OccluderResult<()> {
        if task < self.task_count {
            Ok(())
        } else {
            Err(OccluderError::TaskOutOfRange {
                task,
                task_count: self.task_count,
            })
        }
    }
}

/// Single-writer bin tables
pub struct BinTables {
    layout: BinLayout,
    triangles: Vec<u32>,
    models: Vec<u16>,
    meshes: Vec<u16>,
    counts: Vec<u32>,
}

impl BinTables {
    /// Allocate tables for `task_count` task partitions
    pub fn new(config: &BinConfig, task_count: usize) -> OccluderResult<Self> {
        let layout = BinLayout::new(config, task_count)?;
        let entries = layout.bin_count() * layout.capacity;

        Ok(Self {
            layout,
            triangles: vec![0; entries],
            models: vec![0; entries],
            meshes: vec![0; entries],
            counts: vec![0; layout.bin_count()],
        })
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        &self.layout.grid
    }

    #[inline]
    pub fn task_count(&self) -> usize {
        self.layout.task_count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    #[inline]
    pub fn cull_backfaces(&self) -> bool {
        self.layout.cull_backfaces
    }

    pub fn check_task(&self, task: usize) -> OccluderResult<()> {
        self.layout.check_task(task)
    }

    /// Append an entry to `(task, tile)`. Returns false when the bin is full.
    #[inline]
    pub fn push(&mut self, task: usize, tile: usize, entry: BinEntry) -> bool {
        let bin = self.layout.bin_index(task, tile);
        let count = self.counts[bin] as usize;
        if count >= self.layout.capacity {
            return false;
        }

        let at = bin * self.layout.capacity + count;
        self.triangles[at] = entry.triangle;
        self.models[at] = entry.model;
        self.meshes[at] = entry.mesh;
        self.counts[bin] += 1;
        true
    }

    /// Number of entries in `(task, tile)`
    #[inline]
    pub fn count(&self, task: usize, tile: usize) -> usize {
        self.counts[self.layout.bin_index(task, tile)] as usize
    }

    /// Entries of `(task, tile)` in append order
    pub fn entries(&self, task: usize, tile: usize) -> impl Iterator<Item = BinEntry> + '_ {
        let bin = self.layout.bin_index(task, tile);
        let base = bin * self.layout.capacity;
        (base..base + self.counts[bin] as usize).map(move |at| BinEntry {
            triangle: self.triangles[at],
            model: self.models[at],
            mesh: self.meshes[at],
        })
    }

    pub fn total_entries(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    /// Reset all counts (keeps allocations)
    pub fn clear(&mut self) {
        self.counts.fill(0);
    }
}

/// Bin tables safe to append to from many threads at once
///
/// A writer reserves a slot with `fetch_add` on the bin's counter and then
/// stores the entry into that slot. Reservations past capacity are released
/// again, so the counter never ends above capacity once writers are done.
/// Readers must run after all writers have been joined.
pub struct SharedBinTables {
    layout: BinLayout,
    triangles: Box<[AtomicU32]>,
    models: Box<[AtomicU16]>,
    meshes: Box<[AtomicU16]>,
    counts: Box<[AtomicU32]>,
}

impl SharedBinTables {
    pub fn new(config: &BinConfig, task_count: usize) -> OccluderResult<Self> {
        let layout = BinLayout::new(config, task_count)?;
        let entries = layout.bin_count() * layout.capacity;

        Ok(Self {
            layout,
            triangles: (0..entries).map(|_| AtomicU32::new(0)).collect(),
            models: (0..entries).map(|_| AtomicU16::new(0)).collect(),
            meshes: (0..entries).map(|_| AtomicU16::new(0)).collect(),
            counts: (0..layout.bin_count()).map(|_| AtomicU32::new(0)).collect(),
        })
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        &self.layout.grid
    }

    #[inline]
    pub fn task_count(&self) -> usize {
        self.layout.task_count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    #[inline]
    pub fn cull_backfaces(&self) -> bool {
        self.layout.cull_backfaces
    }

    pub fn check_task(&self, task: usize) -> OccluderResult<()> {
        self.layout.check_task(task)
    }

    /// Append an entry to `(task, tile)`. Returns false when the bin is full.
    #[inline]
    pub fn push(&self, task: usize, tile: usize, entry: BinEntry) -> bool {
        let bin = self.layout.bin_index(task, tile);
        let slot = self.counts[bin].fetch_add(1, Ordering::Relaxed) as usize;
        if slot >= self.layout.capacity {
            self.counts[bin].fetch_sub(1, Ordering::Relaxed);
            return false;
        }

        let at = bin * self.layout.capacity + slot;
        self.triangles[at].store(entry.triangle, Ordering::Relaxed);
        self.models[at].store(entry.model, Ordering::Relaxed);
        self.meshes[at].store(entry.mesh, Ordering::Relaxed);
        true
    }

    /// Number of entries in `(task, tile)`
    #[inline]
    pub fn count(&self, task: usize, tile: usize) -> usize {
        let count = self.counts[self.layout.bin_index(task, tile)].load(Ordering::Relaxed);
        (count as usize).min(self.layout.capacity)
    }

    /// Entries of `(task, tile)`. Order between concurrent writers is unspecified.
    pub fn entries(&self, task: usize, tile: usize) -> impl Iterator<Item = BinEntry> + '_ {
        let base = self.layout.bin_index(task, tile) * self.layout.capacity;
        (base..base + self.count(task, tile)).map(move |at| BinEntry {
            triangle: self.triangles[at].load(Ordering::Relaxed),
            model: self.models[at].load(Ordering::Relaxed),
            mesh: self.meshes[at].load(Ordering::Relaxed),
        })
    }

    pub fn total_entries(&self) -> usize {
        (0..self.layout.task_count)
            .flat_map(|task| (0..self.layout.grid.tile_count()).map(move |tile| (task, tile)))
            .map(|(task, tile)| self.count(task, tile))
            .sum()
    }

    /// Reset all counts (keeps allocations)
    pub fn clear(&mut self) {
        for count in self.counts.iter_mut() {
            *count.get_mut() = 0;
        }
    }
}
