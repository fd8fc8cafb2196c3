/// Host-side model representation consumed by occluder setup
///
/// The occluder core only needs read access to geometry, the world matrix and
/// the model bounds. `SourceModel` / `SourceMesh` describe that contract;
/// `Model` / `MeshGeometry` are the owned implementation used by the demo,
/// benches and tests.
pub mod model;

pub use model::{MeshGeometry, Model};

use glam::{Mat4, Vec3};

/// Read access to one mesh of a host model
pub trait SourceMesh {
    /// Object-space vertex positions
    fn positions(&self) -> &[Vec3];
    /// Index triples into `positions`
    fn triangles(&self) -> &[[u32; 3]];
}

/// Read access to a host model
pub trait SourceModel {
    fn mesh_count(&self) -> usize;

    /// Mesh handle for `index`; `None` marks a missing or invalid handle.
    fn mesh(&self, index: usize) -> Option<&dyn SourceMesh>;

    fn world_matrix(&self) -> Mat4;

    /// Object-space bounding box as (center, half extents)
    fn bounds_object_space(&self) -> (Vec3, Vec3);

    /// World-space bounding box as (center, half extents), reflecting the
    /// model's current placement
    fn bounds_world_space(&self) -> (Vec3, Vec3);
}
