//! Per-subset shading parameters produced by the mesh loaders.

use crate::color::Color;

/// Classic four-channel material with an optional owned texture path.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub emissive: Color,
    pub power: f32,
    pub texture: Option<String>,
}

impl Default for Material {
    /// Defaults substituted when a subset carries no material block:
    /// white ambient/diffuse/specular, black emissive, power 80.
    fn default() -> Self {
        Self {
            ambient: Color::WHITE,
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            emissive: Color::BLACK,
            power: 80.0,
            texture: None,
        }
    }
}
