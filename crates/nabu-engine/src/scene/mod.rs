//! Scene interface.
//!
//! Responsibilities:
//! - describe the primitives the scene traversal hands in (surfaces, polygons, tiles)
//! - turn them into scene vertices and batch state
//! - expose the frame entry points of [`RenderDevice`]

mod device;
mod node;
mod primitives;

pub use device::{RenderDevice, HEADLESS_FORMAT};
pub use node::{SceneNode, FAR_Z, NEAR_Z};
pub use primitives::{
    fan_indices, flat_screen_vertices, line_quad, point_quad, textured_vertex, tile_vertices, Facet, GouraudVertex,
    LayerMapping, MapCoords, ScenePoint, SurfaceMapping, SurfaceTextures, TileRect,
};
