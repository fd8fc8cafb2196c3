/// Per-occluder culling and transform state
///
/// One `TransformedModel` exists per occluder. Setup snapshots the source
/// model's geometry, world matrix and object-space bounds. Each frame, and
/// independently for each view slot, the model is classified (frustum, then
/// size), its vertices are transformed to screen space and its triangles are
/// binned into screen tiles.
///
/// Ordering contract: classification for a (model, slot) must complete before
/// any transform or binning call for that pair. Different models, and the two
/// slots of one model, carry no ordering requirement.
///
/// Each slot's screen-space vertices live in a buffer owned by the model.
/// Transform work is handed out as `VertexBatch` windows over those buffers,
/// so vertex ranges and slots can be processed on separate threads.
use super::kernel::{BinningStats, MeshKernel, MeshOffsets};
use super::transformed_mesh::TransformedMesh;
use super::vertex_batch::VertexBatch;
use super::view::{clip_w, is_too_small, Classification, SlotState, ViewSetup, ViewSlot, SLOT_COUNT};
use crate::binning::{BinTables, SharedBinTables};
use crate::error::{OccluderError, OccluderResult};
use crate::scene::SourceModel;
use glam::{Mat4, Vec3, Vec4};

/// Meshes addressable by the 16-bit mesh column of the bin tables
pub const MAX_MESHES_PER_MODEL: usize = u16::MAX as usize + 1;

pub struct TransformedModel<M: MeshKernel = TransformedMesh> {
    meshes: Vec<M>,
    total_vertices: usize,
    total_triangles: usize,
    world_matrix: Mat4,
    bounds_center_os: Vec3,
    radius_sq: f32,
    slots: [SlotState; SLOT_COUNT],
    /// Screen-space vertices per slot, indexed by global vertex id
    screen: [Vec<Vec4>; SLOT_COUNT],
}

impl<M: MeshKernel> TransformedModel<M> {
    /// Snapshot a source model.
    ///
    /// Fails if any mesh handle is missing or its geometry is inconsistent;
    /// nothing is returned in that case.
    pub fn from_source<S: SourceModel + ?Sized>(source: &S) -> OccluderResult<Self> {
        let mesh_count = source.mesh_count();
        if mesh_count > MAX_MESHES_PER_MODEL {
            return Err(OccluderError::TooManyMeshes {
                count: mesh_count,
                max: MAX_MESHES_PER_MODEL,
            });
        }

        let (center, half) = source.bounds_object_space();

        let mut meshes = Vec::with_capacity(mesh_count);
        let mut total_vertices = 0;
        let mut total_triangles = 0;

        for index in 0..mesh_count {
            let source_mesh = source
                .mesh(index)
                .ok_or(OccluderError::InvalidSourceMesh { index })?;

            let offsets = MeshOffsets {
                mesh_index: index,
                first_vertex: total_vertices,
                first_triangle: total_triangles,
            };
            let mesh = M::from_source(source_mesh, offsets)?;

            total_vertices += mesh.vertex_count();
            total_triangles += mesh.triangle_count();
            meshes.push(mesh);
        }

        log::debug!(
            "occluder setup: {} meshes, {} vertices, {} triangles",
            mesh_count,
            total_vertices,
            total_triangles
        );

        Ok(Self {
            meshes,
            total_vertices,
            total_triangles,
            world_matrix: source.world_matrix(),
            bounds_center_os: center,
            radius_sq: half.length_squared(),
            slots: [SlotState::default(); SLOT_COUNT],
            screen: std::array::from_fn(|_| vec![Vec4::ZERO; total_vertices]),
        })
    }

    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    #[inline]
    pub fn meshes(&self) -> &[M] {
        &self.meshes
    }

    #[inline]
    pub fn total_vertex_count(&self) -> usize {
        self.total_vertices
    }

    #[inline]
    pub fn total_triangle_count(&self) -> usize {
        self.total_triangles
    }

    /// World matrix captured at setup
    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    /// Squared radius of the object-space bounding sphere
    #[inline]
    pub fn bounds_radius_sq(&self) -> f32 {
        self.radius_sq
    }

    #[inline]
    pub fn bounds_center_object_space(&self) -> Vec3 {
        self.bounds_center_os
    }

    /// Screen-space vertices last written for `slot`
    #[inline]
    pub fn screen_positions(&self, slot: ViewSlot) -> &[Vec4] {
        &self.screen[slot.index()]
    }

    #[inline]
    pub fn slot_state(&self, slot: ViewSlot) -> &SlotState {
        &self.slots[slot.index()]
    }

    #[inline]
    pub fn classification(&self, slot: ViewSlot) -> Classification {
        self.slots[slot.index()].classification
    }

    #[inline]
    pub fn inside_frustum(&self, slot: ViewSlot) -> bool {
        self.classification(slot).inside_frustum()
    }

    #[inline]
    pub fn too_small(&self, slot: ViewSlot) -> bool {
        self.classification(slot).too_small()
    }

    /// Frustum test against the source model's current world bounds, followed
    /// by the size test when the model is visible.
    pub fn classify_visibility<S: SourceModel + ?Sized>(
        &mut self,
        source: &S,
        view: &ViewSetup<'_>,
        slot: ViewSlot,
    ) -> Classification {
        crate::count_call!(crate::perf::FUNCTION_COUNTERS.classify_calls);

        let (center_ws, half_ws) = source.bounds_world_space();
        let state = &mut self.slots[slot.index()];

        state.classification = if view.frustum.is_box_visible(center_ws, half_ws) {
            Self::size_classification(
                state,
                &self.world_matrix,
                self.bounds_center_os,
                self.radius_sq,
                view,
            )
        } else {
            crate::count_call!(crate::perf::FUNCTION_COUNTERS.frustum_rejected);
            Classification::NotVisible
        };

        log::trace!("slot {} classified {:?}", slot, state.classification);
        state.classification
    }

    /// Re-run only the size test for a slot already known to be inside the
    /// frustum. Any other state is left untouched.
    pub fn classify_size(&mut self, view: &ViewSetup<'_>, slot: ViewSlot) -> Classification {
        let state = &mut self.slots[slot.index()];
        if state.classification.inside_frustum() {
            state.classification = Self::size_classification(
                state,
                &self.world_matrix,
                self.bounds_center_os,
                self.radius_sq,
                view,
            );
        }
        state.classification
    }

    /// Updates the slot's cumulative matrix and returns the visible verdict
    fn size_classification(
        state: &mut SlotState,
        world_matrix: &Mat4,
        center_os: Vec3,
        radius_sq: f32,
        view: &ViewSetup<'_>,
    ) -> Classification {
        state.world_to_screen = view.view_proj_viewport * *world_matrix;
        let w = clip_w(&state.world_to_screen, center_os);

        if is_too_small(radius_sq, w, view.size_threshold) {
            crate::count_call!(crate::perf::FUNCTION_COUNTERS.size_rejected);
            Classification::VisibleTooSmall
        } else {
            Classification::VisibleSignificant
        }
    }

    /// Transform work for the whole of `slot`, `None` when the slot is a
    /// no-op. Fails when the slot was never classified.
    pub fn vertex_batch(&mut self, slot: ViewSlot) -> OccluderResult<Option<VertexBatch<'_, M>>> {
        batch_for(&self.meshes, &self.slots, slot, &mut self.screen[slot.index()])
    }

    /// Transform work for both slots at once, indexed by `ViewSlot::index`
    pub fn vertex_batches(&mut self) -> [OccluderResult<Option<VertexBatch<'_, M>>>; SLOT_COUNT] {
        let meshes = &self.meshes;
        let slots = &self.slots;
        let [primary, secondary] = &mut self.screen;
        [
            batch_for(meshes, slots, ViewSlot::Primary, primary),
            batch_for(meshes, slots, ViewSlot::Secondary, secondary),
        ]
    }

    /// Transform the global vertex range `[start, end)` to screen space on
    /// the calling thread. Returns the number of vertices written.
    pub fn transform_meshes(&mut self, start: usize, end: usize, slot: ViewSlot) -> OccluderResult<usize> {
        Ok(self
            .vertex_batch(slot)?
            .map_or(0, |batch| batch.restrict(start, end).run()))
    }

    /// Walk meshes for a global triangle range, calling `bin` for each mesh
    /// that reaches `start`
    fn dispatch_bins(
        &self,
        start: usize,
        slot: ViewSlot,
        mut bin: impl FnMut(u16, &M) -> BinningStats,
    ) -> OccluderResult<BinningStats> {
        let mut stats = BinningStats::default();
        if gate(&self.slots[slot.index()], slot)?.is_none() {
            return Ok(stats);
        }

        let mut seen = 0;
        for (mesh_id, mesh) in self.meshes.iter().enumerate() {
            seen += mesh.triangle_count();
            if seen < start {
                continue;
            }
            // Setup guarantees mesh ids fit in u16
            stats += bin(mesh_id as u16, mesh);
        }

        Ok(stats)
    }

    /// Bin the global triangle range `[start, end)` with exclusive table access
    pub fn bin_triangles_st(
        &self,
        task: usize,
        model_id: u16,
        start: usize,
        end: usize,
        bins: &mut BinTables,
        slot: ViewSlot,
    ) -> OccluderResult<BinningStats> {
        bins.check_task(task)?;
        let screen = self.screen_positions(slot);
        let stats = self.dispatch_bins(start, slot, |mesh_id, mesh| {
            mesh.bin_triangles_st(task, model_id, mesh_id, start, end, screen, bins)
        })?;
        warn_dropped(model_id, &stats);
        Ok(stats)
    }

    /// Bin the global triangle range `[start, end)` into tables shared with
    /// concurrently running tasks
    pub fn bin_triangles_mt(
        &self,
        task: usize,
        model_id: u16,
        start: usize,
        end: usize,
        bins: &SharedBinTables,
        slot: ViewSlot,
    ) -> OccluderResult<BinningStats> {
        bins.check_task(task)?;
        let screen = self.screen_positions(slot);
        let stats = self.dispatch_bins(start, slot, |mesh_id, mesh| {
            mesh.bin_triangles_mt(task, model_id, mesh_id, start, end, screen, bins)
        })?;
        warn_dropped(model_id, &stats);
        Ok(stats)
    }

    /// Copy one transformed triangle into `out`.
    ///
    /// Not gated on classification: callers ask only for triangles they
    /// binned for this slot.
    pub fn gather(
        &self,
        out: &mut [Vec4; 3],
        mesh_id: usize,
        triangle_id: usize,
        slot: ViewSlot,
    ) -> OccluderResult<()> {
        let mesh = self.meshes.get(mesh_id).ok_or(OccluderError::MeshOutOfRange {
            mesh: mesh_id,
            count: self.meshes.len(),
        })?;

        *out = mesh.fetch_triangle(triangle_id, self.screen_positions(slot))?;
        crate::count_call!(crate::perf::FUNCTION_COUNTERS.triangles_gathered);
        Ok(())
    }
}

/// Cumulative matrix when the slot may transform and bin, `None` when the
/// slot is a no-op, error when it was never classified.
fn gate(state: &SlotState, slot: ViewSlot) -> OccluderResult<Option<Mat4>> {
    match state.classification {
        Classification::Unclassified => Err(OccluderError::NotClassified(slot.index())),
        Classification::VisibleSignificant => Ok(Some(state.world_to_screen)),
        Classification::NotVisible | Classification::VisibleTooSmall => Ok(None),
    }
}

fn batch_for<'a, M: MeshKernel>(
    meshes: &'a [M],
    slots: &[SlotState; SLOT_COUNT],
    slot: ViewSlot,
    screen: &'a mut [Vec4],
) -> OccluderResult<Option<VertexBatch<'a, M>>> {
    Ok(gate(&slots[slot.index()], slot)?.map(|matrix| VertexBatch::new(meshes, matrix, screen)))
}

fn warn_dropped(model_id: u16, stats: &BinningStats) {
    if stats.dropped > 0 {
        log::warn!(
            "model {}: {} bin entries dropped, bins are full",
            model_id,
            stats.dropped
        );
    }
}
