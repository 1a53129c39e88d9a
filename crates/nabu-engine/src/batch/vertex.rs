//! Scene vertex and uniform layouts shared with `scene.wgsl`.

use bytemuck::{Pod, Zeroable};

// ── scene vertex ──────────────────────────────────────────────────────────

/// One scene vertex, written straight into the vertex ring.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct SceneVertex {
    /// `VERTEX_*` bits.
    pub flags: u32,
    pub pos: [f32; 3],
    /// Texture coordinates for the diffuse, lightmap, detail and fog slots.
    pub uv: [[f32; 2]; 4],
    /// Linear RGBA multiplied into the diffuse texel.
    pub color: [f32; 4],
}

/// Sample the lightmap slot.
pub const VERTEX_LIGHTMAP: u32 = 1 << 0;
/// Sample the detail slot.
pub const VERTEX_DETAIL: u32 = 1 << 1;
/// Add the fog slot.
pub const VERTEX_FOG: u32 = 1 << 2;
/// Position is in screen pixels and uses the orthographic projection.
pub const VERTEX_SCREEN: u32 = 1 << 3;

impl SceneVertex {
    const ATTRS: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        0 => Uint32,    // flags
        1 => Float32x3, // pos
        2 => Float32x2, // uv0
        3 => Float32x2, // uv1
        4 => Float32x2, // uv2
        5 => Float32x2, // uv3
        6 => Float32x4  // color
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SceneVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }

    /// Screen-space vertex with a single texture coordinate.
    pub fn screen(x: f32, y: f32, z: f32, uv: [f32; 2], color: [f32; 4]) -> Self {
        Self {
            flags: VERTEX_SCREEN,
            pos: [x, y, z],
            uv: [uv, [0.0; 2], [0.0; 2], [0.0; 2]],
            color,
        }
    }
}

// ── uniforms ──────────────────────────────────────────────────────────────

/// Per-pass scene uniforms.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    /// View space → clip space for 3D geometry.
    pub projection: [[f32; 4]; 4],
    /// Screen pixels → clip space for 2D geometry.
    pub screen: [[f32; 4]; 4],
    /// x: alpha-test threshold, yzw unused.
    pub params: [f32; 4],
}

impl Default for SceneUniforms {
    fn default() -> Self {
        Self {
            projection: glam::Mat4::IDENTITY.to_cols_array_2d(),
            screen: glam::Mat4::IDENTITY.to_cols_array_2d(),
            params: [0.5, 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_have_no_padding() {
        assert_eq!(std::mem::size_of::<SceneVertex>(), 64);
        assert_eq!(SceneVertex::layout().array_stride, 64);
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
    }
}
