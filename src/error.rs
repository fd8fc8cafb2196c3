//! Error types for occluder setup, classification and binning.

use thiserror::Error;

/// Result alias used throughout the crate
pub type OccluderResult<T> = Result<T, OccluderError>;

/// Errors raised by the occluder pipeline
///
/// Configuration errors (`InvalidSourceMesh`, `IndexOutOfBounds`,
/// `TooManyMeshes`, `TooManyModels`, `InvalidBinConfig`) are fatal for the
/// object being built: no partially initialized value is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OccluderError {
    #[error("source mesh {index} is missing or invalid")]
    InvalidSourceMesh { index: usize },

    #[error("source mesh {mesh} triangle {triangle} references vertex {vertex}, but the mesh has {vertex_count} vertices")]
    IndexOutOfBounds {
        mesh: usize,
        triangle: usize,
        vertex: u32,
        vertex_count: usize,
    },

    #[error("model has {count} meshes, a bin entry can address at most {max}")]
    TooManyMeshes { count: usize, max: usize },

    #[error("scene has {count} models, a bin entry can address at most {max}")]
    TooManyModels { count: usize, max: usize },

    #[error("view slot index {0} is out of range")]
    InvalidSlot(usize),

    #[error("view slot {0} has not been classified")]
    NotClassified(usize),

    #[error("model {model} is out of range (scene has {count} models)")]
    ModelOutOfRange { model: usize, count: usize },

    #[error("mesh {mesh} is out of range (model has {count} meshes)")]
    MeshOutOfRange { mesh: usize, count: usize },

    #[error("triangle {triangle} is out of range (mesh has {count} triangles)")]
    TriangleOutOfRange { triangle: usize, count: usize },

    #[error("task {task} is out of range (bin tables hold {task_count} tasks)")]
    TaskOutOfRange { task: usize, task_count: usize },

    #[error("invalid bin configuration: {0}")]
    InvalidBinConfig(String),

    #[error("expected {expected} source models, got {found}")]
    SourceCountMismatch { expected: usize, found: usize },
}
