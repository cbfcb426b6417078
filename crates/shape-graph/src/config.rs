//! Settings and the per-node drawing state snapshot.

use crate::color::Color;
use crate::style::{Lighting, StrokeCap, StrokeJoin};

/// Default number of segments used to flatten bezier curves
pub const DEFAULT_BEZIER_DETAIL: u32 = 20;

/// Default number of segments used to flatten Catmull-Rom curves
pub const DEFAULT_CURVE_DETAIL: u32 = 20;

/// Sphere resolution used when none (or a degenerate one) is set
pub const DEFAULT_SPHERE_DETAIL: u32 = 30;

/// Initial capacity of a node's input vertex store
pub const DEFAULT_INPUT_VERTICES: usize = 64;

/// Hard bound on the input vertex store of a single node
pub const MAX_INPUT_VERTICES: usize = 1 << 20;

/// Initial element capacity of an update cache
pub const DEFAULT_CACHE_ELEMENTS: usize = 256;

/// How the four parameters of a rect are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RectMode {
    /// x, y of the top-left corner, then width and height
    #[default]
    Corner,
    /// x, y of one corner, then x, y of the opposite corner
    Corners,
    /// x, y of the center, then width and height
    Center,
    /// x, y of the center, then half width and half height
    Radius,
}

/// How the four parameters of an ellipse or arc are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EllipseMode {
    Corner,
    Corners,
    #[default]
    Center,
    Radius,
}

/// Texture coordinate space of authored UVs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureMode {
    /// UVs are in texture pixels and get normalized at append time
    #[default]
    Image,
    /// UVs are already in [0, 1]
    Normal,
}

/// Detail levels and modes captured by a node at creation.
///
/// The engine never reads the surrounding settings again after a node copies
/// this snapshot; later edits to the node's own copy only affect vertices and
/// primitives authored afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawingState {
    pub bezier_detail: u32,
    pub curve_detail: u32,
    pub curve_tightness: f32,
    pub sphere_detail_u: u32,
    pub sphere_detail_v: u32,
    pub rect_mode: RectMode,
    pub ellipse_mode: EllipseMode,
    pub texture_mode: TextureMode,
}

impl Default for DrawingState {
    fn default() -> Self {
        Self {
            bezier_detail: DEFAULT_BEZIER_DETAIL,
            curve_detail: DEFAULT_CURVE_DETAIL,
            curve_tightness: 0.0,
            sphere_detail_u: DEFAULT_SPHERE_DETAIL,
            sphere_detail_v: DEFAULT_SPHERE_DETAIL,
            rect_mode: RectMode::default(),
            ellipse_mode: EllipseMode::default(),
            texture_mode: TextureMode::default(),
        }
    }
}

/// Scene-wide settings
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeSettings {
    /// Drawing state every new node starts from
    pub drawing: DrawingState,
    pub input_vertex_capacity: usize,
    pub max_input_vertices: usize,
    pub cache_capacity: usize,
    pub fill: Color,
    pub stroke: Color,
    pub stroke_weight: f32,
    pub stroke_cap: StrokeCap,
    pub stroke_join: StrokeJoin,
    pub lighting: Lighting,
}

impl Default for ShapeSettings {
    fn default() -> Self {
        Self {
            drawing: DrawingState::default(),
            input_vertex_capacity: DEFAULT_INPUT_VERTICES,
            max_input_vertices: MAX_INPUT_VERTICES,
            cache_capacity: DEFAULT_CACHE_ELEMENTS,
            fill: Color::WHITE,
            stroke: Color::BLACK,
            stroke_weight: 1.0,
            stroke_cap: StrokeCap::Round,
            stroke_join: StrokeJoin::Miter,
            lighting: Lighting::default(),
        }
    }
}

impl ShapeSettings {
    pub fn with_bezier_detail(mut self, detail: u32) -> Self {
        self.drawing.bezier_detail = detail;
        self
    }

    pub fn with_curve_detail(mut self, detail: u32) -> Self {
        self.drawing.curve_detail = detail;
        self
    }

    pub fn with_curve_tightness(mut self, tightness: f32) -> Self {
        self.drawing.curve_tightness = tightness;
        self
    }

    pub fn with_sphere_detail(mut self, u: u32, v: u32) -> Self {
        self.drawing.sphere_detail_u = u;
        self.drawing.sphere_detail_v = v;
        self
    }

    pub fn with_rect_mode(mut self, mode: RectMode) -> Self {
        self.drawing.rect_mode = mode;
        self
    }

    pub fn with_ellipse_mode(mut self, mode: EllipseMode) -> Self {
        self.drawing.ellipse_mode = mode;
        self
    }

    pub fn with_texture_mode(mut self, mode: TextureMode) -> Self {
        self.drawing.texture_mode = mode;
        self
    }

    /// Set the initial and maximum size of each node's input vertex store
    pub fn with_input_capacity(mut self, initial: usize, max: usize) -> Self {
        self.input_vertex_capacity = initial.max(1);
        self.max_input_vertices = max.max(self.input_vertex_capacity);
        self
    }

    pub fn with_cache_capacity(mut self, elements: usize) -> Self {
        self.cache_capacity = elements.max(1);
        self
    }

    pub fn with_fill(mut self, color: Color) -> Self {
        self.fill = color;
        self
    }

    pub fn with_stroke(mut self, color: Color) -> Self {
        self.stroke = color;
        self
    }

    pub fn with_stroke_weight(mut self, weight: f32) -> Self {
        self.stroke_weight = weight;
        self
    }

    pub fn with_stroke_cap(mut self, cap: StrokeCap) -> Self {
        self.stroke_cap = cap;
        self
    }

    pub fn with_lighting(mut self, lighting: Lighting) -> Self {
        self.lighting = lighting;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ShapeSettings::default();
        assert_eq!(settings.drawing.bezier_detail, 20);
        assert_eq!(settings.drawing.rect_mode, RectMode::Corner);
        assert_eq!(settings.drawing.ellipse_mode, EllipseMode::Center);
        assert_eq!(settings.fill, Color::WHITE);
        assert_eq!(settings.stroke, Color::BLACK);
        assert_eq!(settings.stroke_cap, StrokeCap::Round);
        assert_eq!(settings.lighting.emissive, Color::BLACK);
    }

    #[test]
    fn test_input_capacity_is_clamped() {
        let settings = ShapeSettings::default().with_input_capacity(0, 0);
        assert_eq!(settings.input_vertex_capacity, 1);
        assert_eq!(settings.max_input_vertices, 1);
    }
}
