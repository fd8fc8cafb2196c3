/// Owned mesh and model data implementing the source traits
use super::{SourceMesh, SourceModel};
use glam::{Mat4, Vec3};

/// Triangle mesh in object space
#[derive(Clone, Debug, Default)]
pub struct MeshGeometry {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshGeometry {
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            triangles,
        }
    }

    /// Axis-aligned box with outward-facing, counter-clockwise triangles
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        // Corner i has x from bit 0, y from bit 1, z from bit 2
        let positions = (0..8)
            .map(|i| {
                let sign = Vec3::new(
                    if i & 1 != 0 { 1.0 } else { -1.0 },
                    if i & 2 != 0 { 1.0 } else { -1.0 },
                    if i & 4 != 0 { 1.0 } else { -1.0 },
                );
                center + half_extents * sign
            })
            .collect();

        let triangles = vec![
            [4, 5, 7], [4, 7, 6], // +Z
            [0, 2, 3], [0, 3, 1], // -Z
            [1, 3, 7], [1, 7, 5], // +X
            [0, 4, 6], [0, 6, 2], // -X
            [6, 7, 3], [6, 3, 2], // +Y
            [0, 1, 5], [0, 5, 4], // -Y
        ];

        Self {
            positions,
            triangles,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Object-space AABB as (min, max), or `None` for an empty mesh
    pub fn aabb(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), &p| (min.min(p), max.max(p))),
        )
    }
}

impl SourceMesh for MeshGeometry {
    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }
}

/// A placed model made of one or more meshes
#[derive(Clone, Debug)]
pub struct Model {
    meshes: Vec<MeshGeometry>,
    world_matrix: Mat4,
    object_center: Vec3,
    object_half: Vec3,
    world_center: Vec3,
    world_half: Vec3,
}

impl Model {
    pub fn new(meshes: Vec<MeshGeometry>, world_matrix: Mat4) -> Self {
        let (min, max) = meshes
            .iter()
            .filter_map(MeshGeometry::aabb)
            .reduce(|(amin, amax), (bmin, bmax)| (amin.min(bmin), amax.max(bmax)))
            .unwrap_or((Vec3::ZERO, Vec3::ZERO));

        let mut model = Self {
            meshes,
            world_matrix,
            object_center: (min + max) * 0.5,
            object_half: (max - min) * 0.5,
            world_center: Vec3::ZERO,
            world_half: Vec3::ZERO,
        };
        model.update_world_bounds();
        model
    }

    /// Single-mesh box model centered on the object-space origin
    pub fn cuboid(half_extents: Vec3, world_matrix: Mat4) -> Self {
        Self::new(
            vec![MeshGeometry::cuboid(Vec3::ZERO, half_extents)],
            world_matrix,
        )
    }

    pub fn meshes(&self) -> &[MeshGeometry] {
        &self.meshes
    }

    /// Move the model. World-space bounds follow immediately.
    pub fn set_world_matrix(&mut self, world_matrix: Mat4) {
        self.world_matrix = world_matrix;
        self.update_world_bounds();
    }

    /// World AABB enclosing the 8 transformed corners of the object box
    fn update_world_bounds(&mut self) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for i in 0..8 {
            let sign = Vec3::new(
                if i & 1 != 0 { 1.0 } else { -1.0 },
                if i & 2 != 0 { 1.0 } else { -1.0 },
                if i & 4 != 0 { 1.0 } else { -1.0 },
            );
            let corner = self
                .world_matrix
                .transform_point3(self.object_center + self.object_half * sign);
            min = min.min(corner);
            max = max.max(corner);
        }

        self.world_center = (min + max) * 0.5;
        self.world_half = (max - min) * 0.5;
    }
}

impl SourceModel for Model {
    fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn mesh(&self, index: usize) -> Option<&dyn SourceMesh> {
        self.meshes.get(index).map(|m| m as &dyn SourceMesh)
    }

    fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    fn bounds_object_space(&self) -> (Vec3, Vec3) {
        (self.object_center, self.object_half)
    }

    fn bounds_world_space(&self) -> (Vec3, Vec3) {
        (self.world_center, self.world_half)
    }
}
