/// Splittable vertex transform work for one model and one view slot
///
/// A batch owns a mutable window of the slot's screen buffer, covering the
/// global vertex range `[start, start + len)`. Splitting hands out disjoint
/// windows, so ranges of one model (and both slots of one model) can be
/// transformed on different worker threads.
use super::kernel::{partition_ranges, MeshKernel};
use glam::{Mat4, Vec4};
use std::ops::Range;

pub struct VertexBatch<'a, M> {
    meshes: &'a [M],
    matrix: Mat4,
    start: usize,
    out: &'a mut [Vec4],
}

impl<'a, M: MeshKernel> VertexBatch<'a, M> {
    /// Batch over a whole slot buffer
    pub(crate) fn new(meshes: &'a [M], matrix: Mat4, screen: &'a mut [Vec4]) -> Self {
        Self {
            meshes,
            matrix,
            start: 0,
            out: screen,
        }
    }

    /// Global vertex range written by this batch
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.out.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Cumulative object-to-screen matrix of the slot
    #[inline]
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    /// Split at global vertex `mid`, clamped to the batch's range
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        let Self {
            meshes,
            matrix,
            start,
            out,
        } = self;

        let at = mid.clamp(start, start + out.len()) - start;
        let (head, tail) = out.split_at_mut(at);
        (
            Self {
                meshes,
                matrix,
                start,
                out: head,
            },
            Self {
                meshes,
                matrix,
                start: start + at,
                out: tail,
            },
        )
    }

    /// Narrow the batch to `[start, end)`
    pub fn restrict(self, start: usize, end: usize) -> Self {
        let (_, tail) = self.split_at(start);
        tail.split_at(end).0
    }

    /// Split into `parts` contiguous batches of near-equal length
    pub fn split(self, parts: usize) -> Vec<Self> {
        let base = self.start;
        let ranges = partition_ranges(self.len(), parts);

        let mut batches = Vec::with_capacity(ranges.len());
        let mut rest = self;
        for range in ranges.iter().skip(1) {
            let (head, tail) = rest.split_at(base + range.start);
            batches.push(head);
            rest = tail;
        }
        if !ranges.is_empty() {
            batches.push(rest);
        }
        batches
    }

    /// Transform the batch's vertices. Returns the number written.
    ///
    /// Meshes ending before the batch start are skipped; every mesh from the
    /// first one reaching it onwards is handed the window and clips it itself.
    pub fn run(self) -> usize {
        crate::count_call!(crate::perf::FUNCTION_COUNTERS.transform_calls);

        let Self {
            meshes,
            matrix,
            start,
            out,
        } = self;

        let mut seen = 0;
        let mut written = 0;
        for mesh in meshes {
            seen += mesh.vertex_count();
            if seen < start {
                continue;
            }
            written += mesh.transform_vertices(&matrix, start, out);
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occluder::{MeshOffsets, TransformedMesh};
    use crate::scene::MeshGeometry;
    use glam::Vec3;

    /// Two meshes of 4 and 6 vertices; vertex i sits at x = i
    fn meshes() -> Vec<TransformedMesh> {
        let mut first_vertex = 0;
        [4u32, 6]
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                let positions = (0..count)
                    .map(|i| Vec3::new((first_vertex + i as usize) as f32, 0.0, 0.0))
                    .collect();
                let mesh = MeshGeometry::new(positions, vec![[0, 1, 2]]);
                let offsets = MeshOffsets {
                    mesh_index: index,
                    first_vertex,
                    first_triangle: index,
                };
                first_vertex += count as usize;
                TransformedMesh::from_source(&mesh, offsets).unwrap()
            })
            .collect()
    }

    #[test]
    fn split_hands_out_disjoint_windows() {
        let meshes = meshes();
        let mut screen = vec![Vec4::ZERO; 10];
        let batch = VertexBatch::new(&meshes, Mat4::IDENTITY, &mut screen);

        let parts = batch.split(3);
        let ranges: Vec<_> = parts.iter().map(|b| b.range()).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);

        let written: usize = parts.into_iter().map(VertexBatch::run).sum();
        assert_eq!(written, 10);
        for (i, v) in screen.iter().enumerate() {
            assert_eq!(v.x, i as f32);
            assert_eq!(v.w, 1.0);
        }
    }

    #[test]
    fn restrict_clamps_to_the_buffer() {
        let meshes = meshes();
        let mut screen = vec![Vec4::ZERO; 10];
        let batch = VertexBatch::new(&meshes, Mat4::IDENTITY, &mut screen);

        let narrowed = batch.restrict(3, 40);
        assert_eq!(narrowed.range(), 3..10);
        assert_eq!(narrowed.run(), 7);
        assert_eq!(screen[2], Vec4::ZERO);
        assert_eq!(screen[3].x, 3.0);
    }

    #[test]
    fn inverted_range_is_empty() {
        let meshes = meshes();
        let mut screen = vec![Vec4::ZERO; 10];
        let batch = VertexBatch::new(&meshes, Mat4::IDENTITY, &mut screen).restrict(6, 2);

        assert!(batch.is_empty());
        assert_eq!(batch.run(), 0);
        assert!(screen.iter().all(|v| *v == Vec4::ZERO));
    }
}
