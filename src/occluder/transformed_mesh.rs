/// Scalar per-mesh transform and tile-binning kernel
///
/// Keeps an object-space copy of the source mesh. Screen-space output goes to
/// per-slot buffers owned by the model, indexed by global vertex id.
/// Transformed vertices are stored as `(x / w, y / w, z / w, w)`; vertices at
/// or behind the eye plane keep their raw clip position and every triangle
/// touching one is rejected at binning.
use super::kernel::{local_range, BinningStats, MeshKernel, MeshOffsets};
use crate::binning::{BinEntry, BinTables, SharedBinTables, TileGrid};
use crate::error::{OccluderError, OccluderResult};
use crate::scene::SourceMesh;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Smallest clip-space w treated as in front of the eye
pub const NEAR_W_EPSILON: f32 = 1e-6;

pub struct TransformedMesh {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    offsets: MeshOffsets,
}

impl TransformedMesh {
    #[inline]
    pub fn offsets(&self) -> MeshOffsets {
        self.offsets
    }

    /// Walk the triangles of `[start, end)` owned by this mesh and hand every
    /// (tile, triangle) pair to `emit`. `emit` returns false when the entry
    /// could not be stored.
    fn bin_range(
        &self,
        start: usize,
        end: usize,
        screen: &[Vec4],
        grid: &TileGrid,
        cull_backfaces: bool,
        mut emit: impl FnMut(usize, u32) -> bool,
    ) -> BinningStats {
        let mut stats = BinningStats::default();
        let Some(range) = local_range(start, end, self.offsets.first_triangle, self.triangles.len())
        else {
            return stats;
        };

        let base = self.offsets.first_vertex;

        for tri in range {
            stats.processed += 1;

            let [v0, v1, v2] = self.triangles[tri].map(|i| screen[base + i as usize]);
            if v0.w <= NEAR_W_EPSILON || v1.w <= NEAR_W_EPSILON || v2.w <= NEAR_W_EPSILON {
                stats.culled += 1;
                continue;
            }

            let p0 = Vec2::new(v0.x, v0.y);
            let p1 = Vec2::new(v1.x, v1.y);
            let p2 = Vec2::new(v2.x, v2.y);

            // Front faces (counter-clockwise in NDC) have positive area
            let area = edge_function(p0, p1, p2);
            let keep = area > 0.0 || (!cull_backfaces && area < 0.0);
            if !keep {
                stats.culled += 1;
                continue;
            }

            let min = p0.min(p1).min(p2);
            let max = p0.max(p1).max(p2);
            let Some(span) = grid.tile_span(min, max) else {
                stats.offscreen += 1;
                continue;
            };

            stats.binned += 1;
            for ty in span.y0..=span.y1 {
                for tx in span.x0..=span.x1 {
                    if emit(grid.tile_index(tx, ty), tri as u32) {
                        stats.entries += 1;
                    } else {
                        stats.dropped += 1;
                    }
                }
            }
        }

        crate::count_add!(crate::perf::FUNCTION_COUNTERS.triangles_processed, stats.processed);
        crate::count_add!(crate::perf::FUNCTION_COUNTERS.triangles_culled, stats.culled);
        crate::count_add!(crate::perf::FUNCTION_COUNTERS.triangles_offscreen, stats.offscreen);
        crate::count_add!(crate::perf::FUNCTION_COUNTERS.bin_entries_written, stats.entries);
        crate::count_add!(crate::perf::FUNCTION_COUNTERS.bin_entries_dropped, stats.dropped);

        stats
    }
}

impl MeshKernel for TransformedMesh {
    fn from_source(source: &dyn SourceMesh, offsets: MeshOffsets) -> OccluderResult<Self> {
        let positions = source.positions().to_vec();
        let triangles = source.triangles().to_vec();

        // Bin entries store local triangle ids as u32
        if triangles.len() > u32::MAX as usize {
            return Err(OccluderError::InvalidSourceMesh {
                index: offsets.mesh_index,
            });
        }

        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v as usize >= positions.len()) {
                return Err(OccluderError::IndexOutOfBounds {
                    mesh: offsets.mesh_index,
                    triangle: t,
                    vertex,
                    vertex_count: positions.len(),
                });
            }
        }

        Ok(Self {
            positions,
            triangles,
            offsets,
        })
    }

    #[inline]
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn transform_vertices(&self, matrix: &Mat4, start: usize, out: &mut [Vec4]) -> usize {
        let first = self.offsets.first_vertex;
        let Some(range) = local_range(start, start + out.len(), first, self.positions.len()) else {
            return 0;
        };

        let dst_start = first + range.start - start;
        let dst = &mut out[dst_start..dst_start + range.len()];
        for (dst, &p) in dst.iter_mut().zip(&self.positions[range.clone()]) {
            *dst = to_screen(*matrix * p.extend(1.0));
        }

        crate::count_add!(crate::perf::FUNCTION_COUNTERS.vertices_transformed, range.len());
        range.len()
    }

    fn bin_triangles_st(
        &self,
        task: usize,
        model_id: u16,
        mesh_id: u16,
        start: usize,
        end: usize,
        screen: &[Vec4],
        bins: &mut BinTables,
    ) -> BinningStats {
        let grid = *bins.grid();
        let cull_backfaces = bins.cull_backfaces();
        self.bin_range(start, end, screen, &grid, cull_backfaces, |tile, triangle| {
            bins.push(
                task,
                tile,
                BinEntry {
                    triangle,
                    model: model_id,
                    mesh: mesh_id,
                },
            )
        })
    }

    fn bin_triangles_mt(
        &self,
        task: usize,
        model_id: u16,
        mesh_id: u16,
        start: usize,
        end: usize,
        screen: &[Vec4],
        bins: &SharedBinTables,
    ) -> BinningStats {
        self.bin_range(start, end, screen, bins.grid(), bins.cull_backfaces(), |tile, triangle| {
            bins.push(
                task,
                tile,
                BinEntry {
                    triangle,
                    model: model_id,
                    mesh: mesh_id,
                },
            )
        })
    }

    fn fetch_triangle(&self, triangle: usize, screen: &[Vec4]) -> OccluderResult<[Vec4; 3]> {
        let indices = self
            .triangles
            .get(triangle)
            .ok_or(OccluderError::TriangleOutOfRange {
                triangle,
                count: self.triangles.len(),
            })?;

        let base = self.offsets.first_vertex;
        Ok(indices.map(|i| screen[base + i as usize]))
    }
}

/// Perspective divide, keeping w for the near-plane check
#[inline]
fn to_screen(clip: Vec4) -> Vec4 {
    if clip.w > NEAR_W_EPSILON {
        let inv_w = 1.0 / clip.w;
        Vec4::new(clip.x * inv_w, clip.y * inv_w, clip.z * inv_w, clip.w)
    } else {
        clip
    }
}

/// Signed doubled area of (a, b, c), taking pixel coordinates (y down).
/// The viewport y flip makes it positive for triangles that are
/// counter-clockwise in NDC (y up).
#[inline]
fn edge_function(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (c.x - a.x) * (b.y - a.y) - (c.y - a.y) * (b.x - a.x)
}
