/// Per-mesh transform/bin contract used by `TransformedModel`
use crate::binning::{BinTables, SharedBinTables};
use crate::error::OccluderResult;
use crate::scene::SourceMesh;
use glam::{Mat4, Vec4};
use std::ops::{Add, AddAssign, Range};

/// Where a mesh's vertices and triangles start in the model's concatenated
/// vertex and triangle streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshOffsets {
    pub mesh_index: usize,
    pub first_vertex: usize,
    pub first_triangle: usize,
}

/// Counters returned by a binning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinningStats {
    /// Triangles inside the requested range that were examined
    pub processed: usize,
    /// Rejected for winding, zero area or a vertex at/behind the eye plane
    pub culled: usize,
    /// Bounding box entirely off-screen
    pub offscreen: usize,
    /// Triangles that reached at least one tile
    pub binned: usize,
    /// Entries written across all tiles
    pub entries: usize,
    /// Entries lost because a bin was full
    pub dropped: usize,
}

impl Add for BinningStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for BinningStats {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.culled += rhs.culled;
        self.offscreen += rhs.offscreen;
        self.binned += rhs.binned;
        self.entries += rhs.entries;
        self.dropped += rhs.dropped;
    }
}

/// Per-mesh operations the model dispatcher delegates to.
///
/// Ranges passed to `transform_vertices` and the binning calls are global
/// half-open ranges over the model's concatenated streams. Implementations
/// clip them to their own local indices and treat an empty intersection as
/// zero work, never as an error.
///
/// Screen-space vertices live in per-slot buffers owned by the model, indexed
/// by global vertex id. Kernels only read their geometry, so disjoint ranges
/// and both slots can be transformed concurrently.
pub trait MeshKernel: Sized {
    /// Build the kernel's copy of a source mesh
    fn from_source(source: &dyn SourceMesh, offsets: MeshOffsets) -> OccluderResult<Self>;

    fn vertex_count(&self) -> usize;

    fn triangle_count(&self) -> usize;

    /// Transform the vertices of `[start, start + out.len())` that belong to
    /// this mesh. `out[0]` is global vertex `start`. Returns the number of
    /// vertices written.
    fn transform_vertices(&self, matrix: &Mat4, start: usize, out: &mut [Vec4]) -> usize;

    /// Bin triangles of `[start, end)` with exclusive access to the tables
    #[allow(clippy::too_many_arguments)]
    fn bin_triangles_st(
        &self,
        task: usize,
        model_id: u16,
        mesh_id: u16,
        start: usize,
        end: usize,
        screen: &[Vec4],
        bins: &mut BinTables,
    ) -> BinningStats;

    /// Bin triangles of `[start, end)` into tables shared with other workers
    #[allow(clippy::too_many_arguments)]
    fn bin_triangles_mt(
        &self,
        task: usize,
        model_id: u16,
        mesh_id: u16,
        start: usize,
        end: usize,
        screen: &[Vec4],
        bins: &SharedBinTables,
    ) -> BinningStats;

    /// Screen-space vertices of one local triangle
    fn fetch_triangle(&self, triangle: usize, screen: &[Vec4]) -> OccluderResult<[Vec4; 3]>;
}

/// Intersect the global range `[start, end)` with `[offset, offset + count)`
/// and return it in local indices.
#[inline]
pub fn local_range(start: usize, end: usize, offset: usize, count: usize) -> Option<Range<usize>> {
    let lo = start.max(offset);
    let hi = end.min(offset + count);
    (lo < hi).then(|| lo - offset..hi - offset)
}

/// Split `[0, total)` into `parts` contiguous ranges of near-equal length.
/// Trailing ranges are empty when `total < parts`.
pub fn partition_ranges(total: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }

    let per_part = total.div_ceil(parts);
    (0..parts)
        .map(|k| {
            let start = (k * per_part).min(total);
            let end = ((k + 1) * per_part).min(total);
            start..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_range_clips_to_mesh() {
        // Mesh covers global [100, 150)
        assert_eq!(local_range(80, 120, 100, 50), Some(0..20));
        assert_eq!(local_range(0, 1000, 100, 50), Some(0..50));
        assert_eq!(local_range(120, 130, 100, 50), Some(20..30));
    }

    #[test]
    fn local_range_empty_when_disjoint() {
        assert_eq!(local_range(0, 100, 100, 50), None);
        assert_eq!(local_range(150, 200, 100, 50), None);
        assert_eq!(local_range(120, 120, 100, 50), None);
        assert_eq!(local_range(130, 110, 100, 50), None);
    }

    #[test]
    fn partition_covers_range_without_overlap() {
        for (total, parts) in [(150, 4), (7, 3), (2, 5), (0, 3), (64, 8)] {
            let ranges = partition_ranges(total, parts);
            assert_eq!(ranges.len(), parts);

            let mut next = 0;
            for range in &ranges {
                assert_eq!(range.start, next, "gap or overlap in {:?}", ranges);
                next = range.end;
            }
            assert_eq!(next, total);
        }
        assert!(partition_ranges(10, 0).is_empty());
    }

    #[test]
    fn stats_accumulate() {
        let a = BinningStats {
            processed: 3,
            binned: 2,
            entries: 4,
            culled: 1,
            ..Default::default()
        };
        let mut total = BinningStats::default();
        total += a;
        total += a;
        assert_eq!(total.processed, 6);
        assert_eq!(total.entries, 8);
        assert_eq!(a + a, total);
    }
}
