//! Primitive descriptions handed in by the scene traversal, and their
//! conversion into scene vertices.

use glam::{Vec2, Vec3, Vec4};

use crate::batch::{SceneVertex, VERTEX_DETAIL, VERTEX_FOG, VERTEX_LIGHTMAP, VERTEX_SCREEN};
use crate::texture::TextureSource;

/// Texture plane of a surface: the texel coordinates of a point `p` are
/// `(p - origin)·x_axis` and `(p - origin)·y_axis`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MapCoords {
    pub origin: Vec3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
}

impl MapCoords {
    #[inline]
    pub fn texel(&self, p: Vec3) -> Vec2 {
        let d = p - self.origin;
        Vec2::new(d.dot(self.x_axis), d.dot(self.y_axis))
    }
}

/// One surface: convex view-space polygons sharing a texture plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    pub map: MapCoords,
    pub polys: Vec<Vec<Vec3>>,
}

/// Texture layers of a surface. Absent layers are not sampled.
#[derive(Debug, Default)]
pub struct SurfaceTextures<'a> {
    pub diffuse: Option<&'a mut TextureSource>,
    pub lightmap: Option<&'a mut TextureSource>,
    pub detail: Option<&'a mut TextureSource>,
    pub fog: Option<&'a mut TextureSource>,
}

/// Polygon corner in view space with texel coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScenePoint {
    pub pos: Vec3,
    pub uv: Vec2,
}

/// Polygon corner with its own light color.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GouraudVertex {
    pub pos: Vec3,
    pub uv: Vec2,
    /// Linear RGBA.
    pub light: Vec4,
}

/// Screen-aligned textured rectangle.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileRect {
    /// Top-left corner and size in pixels.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// View-space depth the tile is tested against.
    pub z: f32,
    /// Source rectangle in texels.
    pub u: f32,
    pub v: f32,
    pub ul: f32,
    pub vl: f32,
}

// ── texture mapping ───────────────────────────────────────────────────────

/// Texel coordinates → normalized texture coordinates for one layer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LayerMapping {
    pan: Vec2,
    mult: Vec2,
}

impl LayerMapping {
    pub const IDENTITY: Self = Self {
        pan: Vec2::ZERO,
        mult: Vec2::ONE,
    };

    /// Surface mapping: panned and scaled by the texture's own settings.
    pub fn surface(source: &TextureSource) -> Self {
        Self {
            pan: Vec2::new(source.u_pan, source.v_pan),
            mult: Self::mult(source),
        }
    }

    /// Lightmap and fog maps: like [`surface`](Self::surface), sampled at texel centers.
    pub fn lightmap(source: &TextureSource) -> Self {
        Self {
            pan: Vec2::new(source.u_pan - 0.5 * source.u_scale, source.v_pan - 0.5 * source.v_scale),
            mult: Self::mult(source),
        }
    }

    /// Plain texel coordinates (polygons and tiles), no panning.
    pub fn texels(source: &TextureSource) -> Self {
        Self {
            pan: Vec2::ZERO,
            mult: Self::mult(source),
        }
    }

    fn mult(source: &TextureSource) -> Vec2 {
        let recip = |scale: f32, size: u32| {
            let d = scale * size as f32;
            if d.is_normal() { 1.0 / d } else { 1.0 }
        };
        Vec2::new(
            recip(source.u_scale, source.width()),
            recip(source.v_scale, source.height()),
        )
    }

    #[inline]
    pub fn apply(self, texel: Vec2) -> [f32; 2] {
        ((texel - self.pan) * self.mult).to_array()
    }
}

/// Per-layer mappings of a surface and the vertex flags they enable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceMapping {
    pub layers: [LayerMapping; 4],
    pub flags: u32,
}

impl SurfaceMapping {
    pub fn new(textures: &SurfaceTextures<'_>) -> Self {
        let mut flags = 0;
        let mut layer = |source: &Option<&mut TextureSource>, flag: u32, map: fn(&TextureSource) -> LayerMapping| {
            source.as_deref().map_or(LayerMapping::IDENTITY, |s| {
                flags |= flag;
                map(s)
            })
        };
        let layers = [
            layer(&textures.diffuse, 0, LayerMapping::surface),
            layer(&textures.lightmap, VERTEX_LIGHTMAP, LayerMapping::lightmap),
            layer(&textures.detail, VERTEX_DETAIL, LayerMapping::surface),
            layer(&textures.fog, VERTEX_FOG, LayerMapping::lightmap),
        ];
        Self { layers, flags }
    }

    /// Scene vertex for one corner of a facet polygon.
    pub fn vertex(&self, map: &MapCoords, pos: Vec3) -> SceneVertex {
        let texel = map.texel(pos);
        SceneVertex {
            flags: self.flags,
            pos: pos.to_array(),
            uv: self.layers.map(|l| l.apply(texel)),
            color: [1.0; 4],
        }
    }
}

/// Scene vertex with only the diffuse layer.
pub fn textured_vertex(pos: Vec3, texel: Vec2, mapping: LayerMapping, color: Vec4) -> SceneVertex {
    SceneVertex {
        flags: 0,
        pos: pos.to_array(),
        uv: [mapping.apply(texel), [0.0; 2], [0.0; 2], [0.0; 2]],
        color: color.to_array(),
    }
}

// ── 2D geometry ───────────────────────────────────────────────────────────

/// Corners of a tile, clockwise from the top-left.
pub fn tile_vertices(rect: &TileRect, depth: f32, mapping: LayerMapping, color: Vec4) -> [SceneVertex; 4] {
    let (x0, y0) = (rect.x, rect.y);
    let (x1, y1) = (rect.x + rect.width, rect.y + rect.height);
    let (u0, v0) = (rect.u, rect.v);
    let (u1, v1) = (rect.u + rect.ul, rect.v + rect.vl);
    let color = color.to_array();
    [
        (x0, y0, u0, v0),
        (x1, y0, u1, v0),
        (x1, y1, u1, v1),
        (x0, y1, u0, v1),
    ]
    .map(|(x, y, u, v)| SceneVertex::screen(x, y, depth, mapping.apply(Vec2::new(u, v)), color))
}

/// One-pixel-wide quad along a line. A degenerate line becomes a one-pixel square.
pub fn line_quad(a: Vec2, b: Vec2) -> [Vec2; 4] {
    let dir = b - a;
    let Some(dir) = dir.try_normalize() else {
        return point_quad(a - Vec2::splat(0.5), a + Vec2::splat(0.5));
    };
    let n = dir.perp() * 0.5;
    [a + n, b + n, b - n, a - n]
}

/// Axis-aligned quad between two corners.
pub fn point_quad(min: Vec2, max: Vec2) -> [Vec2; 4] {
    [min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)]
}

/// Untextured screen vertices for a 2D quad.
pub fn flat_screen_vertices(corners: [Vec2; 4], depth: f32, color: Vec4) -> [SceneVertex; 4] {
    let color = color.to_array();
    corners.map(|c| SceneVertex {
        flags: VERTEX_SCREEN,
        pos: [c.x, c.y, depth],
        uv: [[0.0; 2]; 4],
        color,
    })
}

/// Triangle-fan index count for a convex polygon.
#[inline]
pub fn fan_indices(vertex_count: usize) -> usize {
    vertex_count.saturating_sub(2) * 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{MipSource, PixelFormat};

    fn source(w: u32, h: u32) -> TextureSource {
        TextureSource::new(5, PixelFormat::Rgba8, vec![MipSource::new(w, h, vec![0; (w * h * 4) as usize])])
    }

    #[test]
    fn surface_mapping_pans_and_scales() {
        let mut tex = source(64, 32);
        tex.u_pan = 16.0;
        tex.u_scale = 2.0;
        let m = LayerMapping::surface(&tex);
        assert_eq!(m.apply(Vec2::new(144.0, 16.0)), [1.0, 0.5]);
        assert_eq!(LayerMapping::texels(&tex).apply(Vec2::new(128.0, 32.0)), [1.0, 1.0]);
    }

    #[test]
    fn lightmap_samples_texel_centers() {
        let tex = source(8, 8);
        let m = LayerMapping::lightmap(&tex);
        assert_eq!(m.apply(Vec2::ZERO), [0.5 / 8.0, 0.5 / 8.0]);
    }

    #[test]
    fn surface_flags_follow_layers() {
        let mut lightmap = source(4, 4);
        let mut fog = source(4, 4);
        let textures = SurfaceTextures {
            lightmap: Some(&mut lightmap),
            fog: Some(&mut fog),
            ..Default::default()
        };
        let mapping = SurfaceMapping::new(&textures);
        assert_eq!(mapping.flags, VERTEX_LIGHTMAP | VERTEX_FOG);
        assert_eq!(mapping.layers[0], LayerMapping::IDENTITY);

        let map = MapCoords {
            origin: Vec3::new(10.0, 0.0, 0.0),
            x_axis: Vec3::X,
            y_axis: Vec3::Y,
        };
        let v = mapping.vertex(&map, Vec3::new(12.0, 3.0, 50.0));
        assert_eq!(v.uv[0], [2.0, 3.0]);
        assert_eq!(v.pos, [12.0, 3.0, 50.0]);
    }

    #[test]
    fn line_quad_is_one_pixel_wide() {
        let q = line_quad(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        assert_eq!((q[0] - q[3]).length(), 1.0);
        assert_eq!((q[1] - q[0]).length(), 10.0);

        let dot = line_quad(Vec2::new(4.0, 4.0), Vec2::new(4.0, 4.0));
        assert_eq!(dot, point_quad(Vec2::splat(3.5), Vec2::splat(4.5)));
    }

    #[test]
    fn tile_corners_cover_source_rect() {
        let tex = source(16, 16);
        let rect = TileRect {
            x: 10.0,
            y: 20.0,
            width: 32.0,
            height: 16.0,
            z: 1.0,
            u: 0.0,
            v: 8.0,
            ul: 16.0,
            vl: 8.0,
        };
        let v = tile_vertices(&rect, 0.25, LayerMapping::texels(&tex), Vec4::ONE);
        assert_eq!(v[0].pos, [10.0, 20.0, 0.25]);
        assert_eq!(v[2].pos, [42.0, 36.0, 0.25]);
        assert_eq!(v[0].uv[0], [0.0, 0.5]);
        assert_eq!(v[2].uv[0], [1.0, 1.0]);
        assert!(v.iter().all(|v| v.flags == VERTEX_SCREEN));
    }

    #[test]
    fn fan_index_counts() {
        assert_eq!(fan_indices(3), 3);
        assert_eq!(fan_indices(4), 6);
        assert_eq!(fan_indices(2), 0);
    }
}
