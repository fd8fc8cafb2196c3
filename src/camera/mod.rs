/// Camera and view-volume primitives used to classify occluders
use glam::{Mat4, Quat, Vec3, Vec4};

/// Perspective camera; `yaw` and `pitch` are in radians
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect_ratio: f32,
}

impl Camera {
    pub fn new(position: Vec3, aspect_ratio: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov: 70.0f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            aspect_ratio,
        }
    }

    /// Update camera orientation to look at a specific target point.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let view_matrix = Mat4::look_at_rh(self.position, target, up);
        let rotation_quat = Quat::from_mat4(&view_matrix.inverse());
        let (yaw, pitch, _roll) = rotation_quat.to_euler(glam::EulerRot::YXZ);
        self.yaw = yaw;
        self.pitch = pitch;
    }

    /// Get view matrix
    pub fn view_matrix(&self) -> Mat4 {
        let rotation = self.rotation_quat();
        let forward = rotation * Vec3::NEG_Z;
        let target = self.position + forward;
        let up = rotation * Vec3::Y;

        Mat4::look_at_rh(self.position, target, up)
    }

    /// Get projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    fn rotation_quat(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Extract frustum planes from the view-projection matrix
    pub fn extract_frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }
}

/// Visibility verdict for a world-space bounding box.
///
/// Implementations must be shareable across worker threads because a single
/// view setup is used to classify many models in parallel.
pub trait FrustumTest: Send + Sync {
    /// Returns true if the box `center ± half_extents` is at least partially
    /// inside the view volume.
    fn is_box_visible(&self, center: Vec3, half_extents: Vec3) -> bool;
}

/// View frustum represented as 6 planes for AABB culling
/// Planes are stored in Hessian normal form: ax + by + cz + d = 0
/// where (a,b,c) is the inward-facing normal
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// 6 planes: left, right, bottom, top, near, far
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    /// (Gribb-Hartmann extraction)
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let row0 = vp.row(0);
        let row1 = vp.row(1);
        let row2 = vp.row(2);
        let row3 = vp.row(3);

        // glam uses a [0, 1] depth range, so the near plane is row2 alone.
        let planes = [
            Self::normalize_plane(row3 + row0),
            Self::normalize_plane(row3 - row0),
            Self::normalize_plane(row3 + row1),
            Self::normalize_plane(row3 - row1),
            Self::normalize_plane(row2),
            Self::normalize_plane(row3 - row2),
        ];

        Self { planes }
    }

    #[inline]
    fn normalize_plane(plane: Vec4) -> Vec4 {
        let normal_length = plane.truncate().length();
        if normal_length > 0.0001 {
            plane / normal_length
        } else {
            plane
        }
    }

    /// Test if an AABB intersects the frustum
    /// Returns true if the box is at least partially inside
    pub fn intersects_aabb(&self, min: Vec3, max: Vec3) -> bool {
        for plane in &self.planes {
            // The corner furthest along the plane normal
            let p_vertex = Vec3::new(
                if plane.x > 0.0 { max.x } else { min.x },
                if plane.y > 0.0 { max.y } else { min.y },
                if plane.z > 0.0 { max.z } else { min.z },
            );

            if plane.truncate().dot(p_vertex) + plane.w < 0.0 {
                return false;
            }
        }

        true
    }
}

impl FrustumTest for Frustum {
    #[inline]
    fn is_box_visible(&self, center: Vec3, half_extents: Vec3) -> bool {
        let half = half_extents.abs();
        self.intersects_aabb(center - half, center + half)
    }
}

/// Build the viewport matrix that follows a projection matrix.
///
/// After the perspective divide, x lands in `[0, width]` and y in
/// `[0, height]` with y pointing down. Depth and clip-space w pass through
/// unchanged, so the w row of `viewport * projection` equals the projection's.
pub fn viewport_matrix(width: f32, height: f32) -> Mat4 {
    let half_w = width * 0.5;
    let half_h = height * 0.5;
    Mat4::from_cols(
        Vec4::new(half_w, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -half_h, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(half_w, half_h, 0.0, 1.0),
    )
}
