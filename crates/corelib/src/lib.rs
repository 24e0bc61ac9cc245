//! Core shared types for the mesh/effect layer (device-agnostic).
//! Colors, materials, vertex declarations and the common error enum.

pub mod color;
pub mod error;
pub mod material;
pub mod vertex;

pub use color::Color;
pub use error::{GfxError, GfxResult};
pub use material::Material;
pub use vertex::{DeclType, DeclUsage, VertexElement, VertexLayout};

/// One drawable sub-range of a mesh: a run of faces/vertices sharing a material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttributeRange {
    pub attrib_id: u32,
    pub face_start: u32,
    pub face_count: u32,
    pub vertex_start: u32,
    pub vertex_count: u32,
}
