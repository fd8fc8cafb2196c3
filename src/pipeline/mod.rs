/// Per-frame driver for the occluder stage of a scene
///
/// Phases for one view slot:
/// 1. CLASSIFY every model (parallel over models, must finish first)
/// 2. TRANSFORM significant models to screen space, split into vertex-range
///    tasks of at most `TRANSFORM_CHUNK` vertices (parallel within and
///    across models)
/// 3. BIN triangles into screen tiles, either as one task or split into
///    contiguous triangle ranges across `task_count` parallel tasks
///
/// The two slots are independent and may be driven in any interleaving.
use crate::binning::{BinEntry, BinTables, SharedBinTables};
use crate::error::{OccluderError, OccluderResult};
use crate::occluder::{
    local_range, BinningStats, Classification, TransformedMesh, TransformedModel, VertexBatch,
    ViewSetup, ViewSlot,
};
use crate::scene::SourceModel;
use glam::Vec4;
use rayon::prelude::*;
use std::ops::Range;

pub use crate::occluder::partition_ranges;

/// Models addressable by the 16-bit model column of the bin tables
pub const MAX_MODELS: usize = u16::MAX as usize + 1;

/// Most vertices a single transform task handles
pub const TRANSFORM_CHUNK: usize = 4096;

/// Outcome counts of a classification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub not_visible: usize,
    pub too_small: usize,
    pub significant: usize,
}

impl ClassificationSummary {
    fn record(&mut self, classification: Classification) {
        match classification {
            Classification::NotVisible => self.not_visible += 1,
            Classification::VisibleTooSmall => self.too_small += 1,
            Classification::VisibleSignificant => self.significant += 1,
            Classification::Unclassified => {}
        }
    }
}

/// All occluders of a scene, indexed by model id
pub struct OccluderScene {
    models: Vec<TransformedModel>,
}

impl OccluderScene {
    /// Set up one transformed model per source model. Model ids follow the
    /// order of `sources`.
    pub fn from_sources<S: SourceModel>(sources: &[S]) -> OccluderResult<Self> {
        if sources.len() > MAX_MODELS {
            return Err(OccluderError::TooManyModels {
                count: sources.len(),
                max: MAX_MODELS,
            });
        }

        let models = sources
            .iter()
            .map(TransformedModel::from_source)
            .collect::<OccluderResult<Vec<_>>>()?;

        log::debug!(
            "occluder scene: {} models, {} triangles",
            models.len(),
            models.iter().map(|m| m.total_triangle_count()).sum::<usize>()
        );

        Ok(Self { models })
    }

    #[inline]
    pub fn models(&self) -> &[TransformedModel] {
        &self.models
    }

    #[inline]
    pub fn model(&self, model_id: usize) -> Option<&TransformedModel> {
        self.models.get(model_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn total_triangle_count(&self) -> usize {
        self.models.iter().map(|m| m.total_triangle_count()).sum()
    }

    /// Classify every model for `slot`. `sources` must be the slice the scene
    /// was built from (same length and order).
    pub fn classify<S: SourceModel + Sync>(
        &mut self,
        sources: &[S],
        view: &ViewSetup<'_>,
        slot: ViewSlot,
    ) -> OccluderResult<ClassificationSummary> {
        crate::perf_scope!("occluder_classify");

        if sources.len() != self.models.len() {
            return Err(OccluderError::SourceCountMismatch {
                expected: self.models.len(),
                found: sources.len(),
            });
        }

        let verdicts: Vec<Classification> = self
            .models
            .par_iter_mut()
            .zip(sources.par_iter())
            .map(|(model, source)| model.classify_visibility(source, view, slot))
            .collect();

        let mut summary = ClassificationSummary::default();
        for verdict in verdicts {
            summary.record(verdict);
        }
        Ok(summary)
    }

    /// Re-run the size test for models already inside the frustum
    pub fn reclassify_size(&mut self, view: &ViewSetup<'_>, slot: ViewSlot) -> ClassificationSummary {
        let mut summary = ClassificationSummary::default();
        for model in &mut self.models {
            summary.record(model.classify_size(view, slot));
        }
        summary
    }

    /// Transform every significant model. Returns the vertices written.
    pub fn transform(&mut self, slot: ViewSlot) -> OccluderResult<usize> {
        crate::perf_scope!("occluder_transform");

        let mut batches = Vec::new();
        for model in &mut self.models {
            batches.extend(model.vertex_batch(slot)?);
        }
        Ok(run_batches(batches))
    }

    /// Transform both slots of every significant model in one parallel phase
    pub fn transform_all_slots(&mut self) -> OccluderResult<usize> {
        crate::perf_scope!("occluder_transform_all_slots");

        let mut batches = Vec::new();
        for model in &mut self.models {
            for batch in model.vertex_batches() {
                batches.extend(batch?);
            }
        }
        Ok(run_batches(batches))
    }

    /// Bin every model as task 0 of `bins`
    pub fn bin_single_threaded(&self, bins: &mut BinTables, slot: ViewSlot) -> OccluderResult<BinningStats> {
        crate::perf_scope!("occluder_bin_st");

        let mut stats = BinningStats::default();
        for (model_id, model) in self.models.iter().enumerate() {
            stats += model.bin_triangles_st(
                0,
                model_id as u16,
                0,
                model.total_triangle_count(),
                bins,
                slot,
            )?;
        }
        Ok(stats)
    }

    /// Split the triangles of all significant models into one contiguous
    /// range per task of `bins` and bin the tasks in parallel.
    pub fn bin_multi_threaded(&self, bins: &SharedBinTables, slot: ViewSlot) -> OccluderResult<BinningStats> {
        crate::perf_scope!("occluder_bin_mt");

        if self
            .models
            .iter()
            .any(|m| !m.classification(slot).is_classified())
        {
            return Err(OccluderError::NotClassified(slot.index()));
        }

        // Global triangle span of each significant model
        let mut spans: Vec<(u16, Range<usize>)> = Vec::new();
        let mut total = 0;
        for (model_id, model) in self.models.iter().enumerate() {
            if model.classification(slot).is_significant() {
                let count = model.total_triangle_count();
                spans.push((model_id as u16, total..total + count));
                total += count;
            }
        }

        partition_ranges(total, bins.task_count())
            .into_par_iter()
            .enumerate()
            .map(|(task, range)| -> OccluderResult<BinningStats> {
                let mut stats = BinningStats::default();
                for (model_id, span) in &spans {
                    let Some(local) = local_range(range.start, range.end, span.start, span.len())
                    else {
                        continue;
                    };
                    stats += self.models[*model_id as usize].bin_triangles_mt(
                        task,
                        *model_id,
                        local.start,
                        local.end,
                        bins,
                        slot,
                    )?;
                }
                Ok(stats)
            })
            .try_reduce(BinningStats::default, |a, b| Ok(a + b))
    }

    /// Transformed vertices of a binned triangle
    pub fn gather(&self, entry: BinEntry, slot: ViewSlot) -> OccluderResult<[Vec4; 3]> {
        let model = self
            .models
            .get(entry.model as usize)
            .ok_or(OccluderError::ModelOutOfRange {
                model: entry.model as usize,
                count: self.models.len(),
            })?;

        let mut out = [Vec4::ZERO; 3];
        model.gather(&mut out, entry.mesh as usize, entry.triangle as usize, slot)?;
        Ok(out)
    }
}

/// Split every batch into vertex-range tasks and run them on the pool
fn run_batches(batches: Vec<VertexBatch<'_, TransformedMesh>>) -> usize {
    let tasks: Vec<_> = batches
        .into_iter()
        .flat_map(|batch| {
            let parts = batch.len().div_ceil(TRANSFORM_CHUNK);
            batch.split(parts)
        })
        .collect();

    tasks.into_par_iter().map(VertexBatch::run).sum()
}
