/// Occluder Engine - per-model stage of a software occlusion-culling pipeline
///
/// For each occluder and each of two view slots: frustum test, screen-size
/// test, screen-space transform and tile binning for a downstream depth
/// rasterizer.
pub mod binning;
pub mod camera;
pub mod error;
pub mod occluder;
pub mod perf;
pub mod pipeline;
pub mod scene;

pub use binning::{BinConfig, BinEntry, BinTables, SharedBinTables, TileGrid};
pub use camera::{Camera, Frustum, FrustumTest};
pub use error::{OccluderError, OccluderResult};
pub use occluder::{
    BinningStats, Classification, MeshKernel, TransformedMesh, TransformedModel, VertexBatch,
    ViewSetup, ViewSlot,
};
pub use perf::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};
pub use pipeline::{ClassificationSummary, OccluderScene};
pub use scene::{MeshGeometry, Model, SourceMesh, SourceModel};
