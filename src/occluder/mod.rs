/// Per-model occluder stage: classification, transform and binning dispatch
pub mod kernel;
pub mod transformed_mesh;
pub mod transformed_model;
pub mod vertex_batch;
pub mod view;

pub use kernel::{local_range, partition_ranges, BinningStats, MeshKernel, MeshOffsets};
pub use transformed_mesh::{TransformedMesh, NEAR_W_EPSILON};
pub use transformed_model::{TransformedModel, MAX_MESHES_PER_MODEL};
pub use vertex_batch::VertexBatch;
pub use view::{clip_w, is_too_small, Classification, SlotState, ViewSetup, ViewSlot, SLOT_COUNT};
