/// Range dispatch from a model to its meshes, and the tables it fills.
///
/// A recording kernel checks which meshes are visited for a global range;
/// the real kernel checks the entries that land in the bin tables.
use glam::{Mat4, Vec3, Vec4};
use occluder_engine::occluder::{local_range, MeshOffsets};
use occluder_engine::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Mutex;

struct Verdict(bool);

impl FrustumTest for Verdict {
    fn is_box_visible(&self, _center: Vec3, _half_extents: Vec3) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Transform { mesh: usize, start: usize, end: usize },
    Bin { mesh: usize, start: usize, end: usize },
}

/// Kernel that records the global ranges it is handed and reports the
/// clipped work as processed
struct RecordingMesh {
    vertices: usize,
    triangles: usize,
    offsets: MeshOffsets,
    calls: Mutex<Vec<Call>>,
}

impl RecordingMesh {
    fn bin(&self, start: usize, end: usize) -> BinningStats {
        self.calls.lock().unwrap().push(Call::Bin {
            mesh: self.offsets.mesh_index,
            start,
            end,
        });
        let processed = local_range(start, end, self.offsets.first_triangle, self.triangles)
            .map_or(0, |r| r.len());
        BinningStats {
            processed,
            ..Default::default()
        }
    }
}

impl MeshKernel for RecordingMesh {
    fn from_source(source: &dyn SourceMesh, offsets: MeshOffsets) -> OccluderResult<Self> {
        Ok(Self {
            vertices: source.positions().len(),
            triangles: source.triangles().len(),
            offsets,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn vertex_count(&self) -> usize {
        self.vertices
    }

    fn triangle_count(&self) -> usize {
        self.triangles
    }

    fn transform_vertices(&self, _matrix: &Mat4, start: usize, out: &mut [Vec4]) -> usize {
        let end = start + out.len();
        self.calls.lock().unwrap().push(Call::Transform {
            mesh: self.offsets.mesh_index,
            start,
            end,
        });
        local_range(start, end, self.offsets.first_vertex, self.vertices).map_or(0, |r| r.len())
    }

    fn bin_triangles_st(
        &self,
        _task: usize,
        _model_id: u16,
        _mesh_id: u16,
        start: usize,
        end: usize,
        _screen: &[Vec4],
        _bins: &mut BinTables,
    ) -> BinningStats {
        self.bin(start, end)
    }

    fn bin_triangles_mt(
        &self,
        _task: usize,
        _model_id: u16,
        _mesh_id: u16,
        start: usize,
        end: usize,
        _screen: &[Vec4],
        _bins: &SharedBinTables,
    ) -> BinningStats {
        self.bin(start, end)
    }

    fn fetch_triangle(&self, _triangle: usize, _screen: &[Vec4]) -> OccluderResult<[Vec4; 3]> {
        Ok([Vec4::ZERO; 3])
    }
}

/// Mesh of `count` front-facing screen-space triangles packed inside the
/// first tile. Triangle `i` sits at a distinct position so entries differ.
fn tile_mesh(count: usize) -> MeshGeometry {
    let mut positions = Vec::with_capacity(count * 3);
    let mut triangles = Vec::with_capacity(count);
    for i in 0..count {
        let x = 10.0 + (i % 20) as f32 * 10.0;
        let y = 10.0 + (i / 20) as f32 * 10.0;
        let base = positions.len() as u32;
        positions.push(Vec3::new(x, y, 0.5));
        positions.push(Vec3::new(x, y + 5.0, 0.5));
        positions.push(Vec3::new(x + 5.0, y, 0.5));
        triangles.push([base, base + 1, base + 2]);
    }
    MeshGeometry::new(positions, triangles)
}

/// Model whose meshes have the given triangle counts
fn model_with_meshes(counts: &[usize]) -> Model {
    Model::new(counts.iter().map(|&c| tile_mesh(c)).collect(), Mat4::IDENTITY)
}

fn small_config() -> BinConfig {
    BinConfig {
        max_tris_per_bin: 512,
        ..BinConfig::default()
    }
}

/// Identity setup: positions are screen pixels and w = 1 keeps every model
fn classify_visible<M: MeshKernel>(model: &mut TransformedModel<M>, source: &Model, slot: ViewSlot) {
    let visible = Verdict(true);
    let view = ViewSetup::new(&visible, Mat4::IDENTITY, 1.0);
    assert_eq!(
        model.classify_visibility(source, &view, slot),
        Classification::VisibleSignificant
    );
}

fn recorded(model: &TransformedModel<RecordingMesh>) -> Vec<Call> {
    model
        .meshes()
        .iter()
        .flat_map(|m| m.calls.lock().unwrap().clone())
        .collect()
}

fn st_entries(bins: &BinTables) -> Vec<BinEntry> {
    let mut out = Vec::new();
    for task in 0..bins.task_count() {
        for tile in 0..bins.grid().tile_count() {
            out.extend(bins.entries(task, tile));
        }
    }
    out
}

fn mt_entries(bins: &SharedBinTables) -> Vec<BinEntry> {
    let mut out = Vec::new();
    for task in 0..bins.task_count() {
        for tile in 0..bins.grid().tile_count() {
            out.extend(bins.entries(task, tile));
        }
    }
    out
}

#[test]
fn dispatch_skips_meshes_before_start() {
    let source = model_with_meshes(&[10, 20, 30]);
    let mut model: TransformedModel<RecordingMesh> = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);

    let mut bins = BinTables::new(&small_config(), 1).unwrap();
    let stats = model
        .bin_triangles_st(0, 0, 15, 20, &mut bins, ViewSlot::Primary)
        .unwrap();

    // Mesh 0 ends at 10 < 15; mesh 1 contains the range; mesh 2 is still
    // visited and clips to nothing.
    assert_eq!(
        recorded(&model),
        vec![
            Call::Bin { mesh: 1, start: 15, end: 20 },
            Call::Bin { mesh: 2, start: 15, end: 20 },
        ]
    );
    assert_eq!(stats.processed, 5);
}

#[test]
fn dispatch_visits_mesh_ending_exactly_at_start() {
    let source = model_with_meshes(&[10, 20, 30]);
    let mut model: TransformedModel<RecordingMesh> = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);

    let bins = SharedBinTables::new(&small_config(), 1).unwrap();
    let stats = model
        .bin_triangles_mt(0, 0, 10, 12, &bins, ViewSlot::Primary)
        .unwrap();

    // Running total 10 is not below 10, so mesh 0 is handed the range too
    let meshes: Vec<_> = recorded(&model)
        .into_iter()
        .map(|c| match c {
            Call::Bin { mesh, .. } | Call::Transform { mesh, .. } => mesh,
        })
        .collect();
    assert_eq!(meshes, vec![0, 1, 2]);
    assert_eq!(stats.processed, 2);
}

#[test]
fn transform_dispatch_uses_vertex_counts() {
    // 3 vertices per triangle: meshes cover vertices [0, 6), [6, 15), [15, 27)
    let source = model_with_meshes(&[2, 3, 4]);
    let mut model: TransformedModel<RecordingMesh> = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Secondary);

    let written = model.transform_meshes(7, 16, ViewSlot::Secondary).unwrap();
    assert_eq!(written, 9);
    assert_eq!(
        recorded(&model),
        vec![
            Call::Transform { mesh: 1, start: 7, end: 16 },
            Call::Transform { mesh: 2, start: 7, end: 16 },
        ]
    );
}

#[test]
fn dispatched_work_matches_range_length() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for _ in 0..200 {
        let mesh_count = rng.gen_range(1..6);
        let counts: Vec<usize> = (0..mesh_count).map(|_| rng.gen_range(0..40)).collect();
        let source = model_with_meshes(&counts);
        let mut model: TransformedModel<RecordingMesh> =
            TransformedModel::from_source(&source).unwrap();
        classify_visible(&mut model, &source, ViewSlot::Primary);

        let total = model.total_triangle_count();
        let start = rng.gen_range(0..=total);
        let end = rng.gen_range(start..=total);

        let mut bins = BinTables::new(&small_config(), 1).unwrap();
        let stats = model
            .bin_triangles_st(0, 0, start, end, &mut bins, ViewSlot::Primary)
            .unwrap();
        assert_eq!(stats.processed, end - start, "counts {:?} range {}..{}", counts, start, end);

        // No mesh that ends before `start` is visited
        let mut running = 0;
        let first_visited = counts
            .iter()
            .position(|&c| {
                running += c;
                running >= start
            })
            .unwrap_or(counts.len());
        for call in recorded(&model) {
            if let Call::Bin { mesh, .. } = call {
                assert!(mesh >= first_visited);
            }
        }
    }
}

#[test]
fn range_spanning_two_meshes_bins_local_triangles() {
    let source = model_with_meshes(&[100, 50]);
    let mut model: TransformedModel = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);
    assert_eq!(model.transform_meshes(0, 450, ViewSlot::Primary).unwrap(), 450);

    let mut bins = BinTables::new(&small_config(), 1).unwrap();
    let stats = model
        .bin_triangles_st(0, 3, 80, 120, &mut bins, ViewSlot::Primary)
        .unwrap();

    assert_eq!(stats.processed, 40);
    assert_eq!(stats.binned, 40);
    assert_eq!(stats.entries, 40);
    assert_eq!(model.total_triangle_count(), 150);

    let mut seen: Vec<(u16, u32)> = st_entries(&bins)
        .into_iter()
        .inspect(|e| assert_eq!(e.model, 3))
        .map(|e| (e.mesh, e.triangle))
        .collect();
    seen.sort_unstable();

    let expected: Vec<(u16, u32)> = (80..100)
        .map(|t| (0, t))
        .chain((0..20).map(|t| (1, t)))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn hidden_slot_leaves_buffers_untouched() {
    let source = model_with_meshes(&[100, 50]);
    let mut model: TransformedModel = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);
    model.transform_meshes(0, 450, ViewSlot::Primary).unwrap();

    let hidden = Verdict(false);
    let view = ViewSetup::new(&hidden, Mat4::from_scale(Vec3::splat(2.0)), 1.0);
    model.classify_visibility(&source, &view, ViewSlot::Secondary);

    let before = model.screen_positions(ViewSlot::Secondary).to_vec();

    assert_eq!(model.transform_meshes(0, 450, ViewSlot::Secondary), Ok(0));

    let after = model.screen_positions(ViewSlot::Secondary).to_vec();
    assert_eq!(before, after);

    let mut bins = BinTables::new(&small_config(), 1).unwrap();
    let stats = model
        .bin_triangles_st(0, 0, 0, 150, &mut bins, ViewSlot::Secondary)
        .unwrap();
    assert_eq!(stats, BinningStats::default());
    assert_eq!(bins.total_entries(), 0);
}

#[test]
fn too_small_slot_never_reaches_kernels() {
    let source = model_with_meshes(&[10, 10]);
    let mut model: TransformedModel<RecordingMesh> = TransformedModel::from_source(&source).unwrap();

    // w = 50, huge threshold
    let visible = Verdict(true);
    let view = ViewSetup::new(&visible, Mat4::from_diagonal(Vec4::new(1.0, 1.0, 1.0, 50.0)), 1.0e6);
    assert_eq!(
        model.classify_visibility(&source, &view, ViewSlot::Primary),
        Classification::VisibleTooSmall
    );

    assert_eq!(model.transform_meshes(0, 60, ViewSlot::Primary), Ok(0));
    let bins = SharedBinTables::new(&small_config(), 1).unwrap();
    assert_eq!(
        model.bin_triangles_mt(0, 0, 0, 20, &bins, ViewSlot::Primary),
        Ok(BinningStats::default())
    );
    assert!(recorded(&model).is_empty());
}

#[test]
fn single_and_multi_threaded_binning_agree() {
    let source = model_with_meshes(&[100, 50, 7]);
    let mut model: TransformedModel = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);
    model
        .transform_meshes(0, model.total_vertex_count(), ViewSlot::Primary)
        .unwrap();

    let mut st = BinTables::new(&small_config(), 1).unwrap();
    let st_stats = model
        .bin_triangles_st(0, 1, 0, 157, &mut st, ViewSlot::Primary)
        .unwrap();

    let mt = SharedBinTables::new(&small_config(), 1).unwrap();
    let mt_stats = model
        .bin_triangles_mt(0, 1, 0, 157, &mt, ViewSlot::Primary)
        .unwrap();

    assert_eq!(st_stats, mt_stats);

    let st_set: HashSet<BinEntry> = st_entries(&st).into_iter().collect();
    let mt_set: HashSet<BinEntry> = mt_entries(&mt).into_iter().collect();
    assert_eq!(st_set.len(), 157);
    assert_eq!(st_set, mt_set);
}

#[test]
fn concurrent_tasks_share_tables_without_loss() {
    let sources: Vec<Model> = (0..8).map(|i| model_with_meshes(&[30 + i, 12])).collect();
    let mut models: Vec<TransformedModel> = sources
        .iter()
        .map(|s| TransformedModel::from_source(s).unwrap())
        .collect();
    for (model, source) in models.iter_mut().zip(&sources) {
        classify_visible(model, source, ViewSlot::Primary);
        let end = model.total_vertex_count();
        model.transform_meshes(0, end, ViewSlot::Primary).unwrap();
    }

    // Every model split into two halves, all pushed concurrently into task 0
    let bins = SharedBinTables::new(&small_config(), 1).unwrap();
    let total: usize = models
        .par_iter()
        .enumerate()
        .flat_map(|(id, model)| {
            let count = model.total_triangle_count();
            let mid = count / 2;
            vec![(id, model, 0, mid), (id, model, mid, count)]
        })
        .map(|(id, model, start, end)| {
            model
                .bin_triangles_mt(0, id as u16, start, end, &bins, ViewSlot::Primary)
                .unwrap()
                .entries
        })
        .sum();

    let expected: usize = models.iter().map(|m| m.total_triangle_count()).sum();
    assert_eq!(total, expected);
    assert_eq!(bins.total_entries(), expected);

    let unique: HashSet<BinEntry> = mt_entries(&bins).into_iter().collect();
    assert_eq!(unique.len(), expected);
}

#[test]
fn binning_rejects_unknown_task() {
    let source = model_with_meshes(&[4]);
    let mut model: TransformedModel = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);

    let mut bins = BinTables::new(&small_config(), 2).unwrap();
    assert_eq!(
        model.bin_triangles_st(2, 0, 0, 4, &mut bins, ViewSlot::Primary),
        Err(OccluderError::TaskOutOfRange {
            task: 2,
            task_count: 2
        })
    );
}

#[test]
fn full_bins_drop_entries_and_report_them() {
    let source = model_with_meshes(&[40]);
    let mut model: TransformedModel = TransformedModel::from_source(&source).unwrap();
    classify_visible(&mut model, &source, ViewSlot::Primary);
    model.transform_meshes(0, 120, ViewSlot::Primary).unwrap();

    let config = BinConfig {
        max_tris_per_bin: 16,
        ..BinConfig::default()
    };
    let mut bins = BinTables::new(&config, 1).unwrap();
    let stats = model
        .bin_triangles_st(0, 0, 0, 40, &mut bins, ViewSlot::Primary)
        .unwrap();

    assert_eq!(stats.binned, 40);
    assert_eq!(stats.entries, 16);
    assert_eq!(stats.dropped, 24);
    assert_eq!(bins.count(0, 0), 16);
}
