/// View slots, per-slot classification state and view setup
use crate::camera::{viewport_matrix, Camera, Frustum, FrustumTest};
use crate::error::OccluderError;
use glam::{Mat4, Vec3};
use std::fmt;

/// Number of view configurations tracked per model
pub const SLOT_COUNT: usize = 2;

/// One of the independently tracked view configurations
/// (e.g. current and previous camera, or the two eyes of a stereo pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewSlot {
    Primary,
    Secondary,
}

impl ViewSlot {
    pub const ALL: [ViewSlot; SLOT_COUNT] = [ViewSlot::Primary, ViewSlot::Secondary];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            ViewSlot::Primary => 0,
            ViewSlot::Secondary => 1,
        }
    }
}

impl TryFrom<usize> for ViewSlot {
    type Error = OccluderError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(ViewSlot::Primary),
            1 => Ok(ViewSlot::Secondary),
            _ => Err(OccluderError::InvalidSlot(index)),
        }
    }
}

impl fmt::Display for ViewSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Visibility and size verdict for one model in one view slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    /// No classification has run for this slot yet
    #[default]
    Unclassified,
    /// Bounds are outside the view frustum
    NotVisible,
    /// Inside the frustum but too small on screen to be worth rasterizing
    VisibleTooSmall,
    /// Inside the frustum and large enough to occlude
    VisibleSignificant,
}

impl Classification {
    #[inline]
    pub fn is_classified(self) -> bool {
        self != Classification::Unclassified
    }

    #[inline]
    pub fn inside_frustum(self) -> bool {
        matches!(
            self,
            Classification::VisibleTooSmall | Classification::VisibleSignificant
        )
    }

    /// Only ever true for visible models
    #[inline]
    pub fn too_small(self) -> bool {
        self == Classification::VisibleTooSmall
    }

    /// Visible and large enough: transform and binning proceed
    #[inline]
    pub fn is_significant(self) -> bool {
        self == Classification::VisibleSignificant
    }
}

/// Per-slot record held by each transformed model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotState {
    pub classification: Classification,
    /// Object to screen transform; only meaningful while inside the frustum
    pub(crate) world_to_screen: Mat4,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            classification: Classification::Unclassified,
            world_to_screen: Mat4::IDENTITY,
        }
    }
}

impl SlotState {
    /// Cumulative matrix, available only when the model is inside the frustum
    #[inline]
    pub fn world_to_screen(&self) -> Option<Mat4> {
        self.classification
            .inside_frustum()
            .then_some(self.world_to_screen)
    }
}

/// Per-frame inputs for classifying models against one view configuration
#[derive(Clone, Copy)]
pub struct ViewSetup<'a> {
    pub frustum: &'a dyn FrustumTest,
    /// viewport * projection * view
    pub view_proj_viewport: Mat4,
    /// Models with `radius² < w * size_threshold` are too small
    pub size_threshold: f32,
}

impl<'a> ViewSetup<'a> {
    pub fn new(frustum: &'a dyn FrustumTest, view_proj_viewport: Mat4, size_threshold: f32) -> Self {
        Self {
            frustum,
            view_proj_viewport,
            size_threshold,
        }
    }

    /// Setup for a camera rendering into a `width` × `height` target.
    ///
    /// `occluder_size` is the smallest screen-space extent worth rasterizing;
    /// the threshold is `occluder_size² · tan(fov / 2)`, which lets the size
    /// test compare against `w` without dividing.
    pub fn from_camera(
        camera: &Camera,
        frustum: &'a Frustum,
        width: usize,
        height: usize,
        occluder_size: f32,
    ) -> Self {
        let view_proj_viewport =
            viewport_matrix(width as f32, height as f32) * camera.view_projection_matrix();
        let tan_half_fov = (camera.fov * 0.5).tan();

        Self {
            frustum,
            view_proj_viewport,
            size_threshold: occluder_size * occluder_size * tan_half_fov,
        }
    }
}

/// Clip-space w of an object-space point under `cumulative`.
#[inline]
pub fn clip_w(cumulative: &Mat4, point: Vec3) -> f32 {
    cumulative.row(3).dot(point.extend(1.0))
}

/// Size rule for a model already known to be inside the frustum.
///
/// With `w > 1` the bounds center is safely in front of the near plane and the
/// model is too small when `radius_sq < w * size_threshold`. At or behind the
/// near plane the projected size is meaningless; the model is kept.
#[inline]
pub fn is_too_small(radius_sq: f32, w: f32, size_threshold: f32) -> bool {
    if w > 1.0 {
        radius_sq < w * size_threshold
    } else {
        false
    }
}
