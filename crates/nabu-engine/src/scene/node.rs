//! View setup for a frame: perspective for 3D primitives, pixels for 2D ones.

use glam::{Mat4, Vec3, Vec4};

/// Near clip plane distance in view units.
pub const NEAR_Z: f32 = 1.0;
/// Far clip plane distance in view units.
pub const FAR_Z: f32 = 65536.0;

/// Viewport size and horizontal field of view.
///
/// View space has x to the right, y down and z into the screen, the same
/// convention the scene traversal uses for facets and polygons.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SceneNode {
    pub width: u32,
    pub height: u32,
    /// Horizontal field of view in degrees.
    pub fov: f32,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fov: 90.0,
        }
    }
}

impl SceneNode {
    pub fn new(width: u32, height: u32, fov: f32) -> Self {
        Self { width, height, fov }
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    /// View space → clip space.
    pub fn projection(&self) -> Mat4 {
        let half_x = (self.fov.clamp(1.0, 179.0) * 0.5).to_radians();
        let fov_y = 2.0 * (half_x.tan() / self.aspect()).atan();
        Mat4::perspective_lh(fov_y, self.aspect(), NEAR_Z, FAR_Z) * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
    }

    /// Screen pixels (origin top-left) → clip space.
    pub fn screen(&self) -> Mat4 {
        Mat4::orthographic_lh(0.0, self.width.max(1) as f32, self.height.max(1) as f32, 0.0, 0.0, 1.0)
    }

    /// Depth-buffer value of a view-space distance, for 2D primitives drawn at
    /// a given depth.
    pub fn screen_depth(&self, z: f32) -> f32 {
        if z <= NEAR_Z {
            return 0.0;
        }
        let clip = self.projection() * Vec4::new(0.0, 0.0, z, 1.0);
        (clip.z / clip.w).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ndc(m: Mat4, p: Vec3) -> Vec3 {
        let c = m * p.extend(1.0);
        c.truncate() / c.w
    }

    #[test]
    fn projection_maps_view_axes() {
        let node = SceneNode::new(800, 600, 90.0);
        let p = node.projection();

        let center = ndc(p, Vec3::new(0.0, 0.0, 100.0));
        assert!(center.x.abs() < 1e-5 && center.y.abs() < 1e-5);

        // 90 degrees horizontally: x == z sits on the right edge.
        let right = ndc(p, Vec3::new(100.0, 0.0, 100.0));
        assert!((right.x - 1.0).abs() < 1e-4);

        // y grows downward in view space, upward in clip space.
        let below = ndc(p, Vec3::new(0.0, 10.0, 100.0));
        assert!(below.y < 0.0);
    }

    #[test]
    fn screen_matrix_spans_viewport() {
        let node = SceneNode::new(800, 600, 90.0);
        let s = node.screen();
        let tl = ndc(s, Vec3::ZERO);
        let br = ndc(s, Vec3::new(800.0, 600.0, 0.0));
        assert!((tl.x + 1.0).abs() < 1e-6 && (tl.y - 1.0).abs() < 1e-6);
        assert!((br.x - 1.0).abs() < 1e-6 && (br.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn screen_depth_is_monotonic() {
        let node = SceneNode::default();
        assert_eq!(node.screen_depth(0.5), 0.0);
        let near = node.screen_depth(10.0);
        let far = node.screen_depth(1000.0);
        assert!(near > 0.0 && near < far && far < 1.0);
    }
}
