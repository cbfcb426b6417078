use crate::color::Color;

/// How stroke ends and point sprites are shaped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrokeCap {
    #[default]
    Round,
    Square,
    Project,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrokeJoin {
    #[default]
    Miter,
    Bevel,
    Round,
}

/// Opaque reference to an image owned by the host.
///
/// The engine never looks at pixels. It only needs the size to normalize
/// image-space texture coordinates and the id to ask a resolver for a GPU
/// texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageRef {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

impl ImageRef {
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }
}

/// Where the normals of a leaf come from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NormalMode {
    /// Computed from the faces at tessellation time
    #[default]
    Auto,
    /// One explicit normal shared by the whole shape
    Shape,
    /// Explicit normal per vertex
    Vertex,
}

/// Material response of fill geometry to lights
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub ambient: Color,
    pub specular: Color,
    pub emissive: Color,
    /// Specular exponent
    pub shininess: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: Color::gray(0.8),
            specular: Color::gray(0.5),
            emissive: Color::BLACK,
            shininess: 1.0,
        }
    }
}

/// Fill, stroke, tint and texture state of a node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeStyle {
    pub fill: bool,
    pub fill_color: Color,

    pub stroke: bool,
    pub stroke_color: Color,
    pub stroke_weight: f32,
    pub stroke_cap: StrokeCap,
    pub stroke_join: StrokeJoin,

    pub tint: bool,
    pub tint_color: Color,

    pub texture: Option<ImageRef>,

    pub lighting: Lighting,

    /// Polygons use the non-zero winding rule when set, odd otherwise
    pub solid: bool,
    pub closed: bool,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill: true,
            fill_color: Color::WHITE,
            stroke: true,
            stroke_color: Color::BLACK,
            stroke_weight: 1.0,
            stroke_cap: StrokeCap::Round,
            stroke_join: StrokeJoin::Miter,
            tint: false,
            tint_color: Color::WHITE,
            texture: None,
            lighting: Lighting::default(),
            solid: true,
            closed: false,
        }
    }
}

impl ShapeStyle {
    /// Color written into the fill stream for a vertex authored now.
    ///
    /// Textured shapes modulate the texture by the tint (or plain white),
    /// untextured ones use the fill color or nothing at all.
    pub fn vertex_fill(&self) -> Color {
        if self.texture.is_some() {
            if self.tint {
                self.tint_color
            } else {
                Color::WHITE
            }
        } else if self.fill {
            self.fill_color
        } else {
            Color::TRANSPARENT
        }
    }

    pub fn vertex_stroke(&self) -> Color {
        if self.stroke {
            self.stroke_color
        } else {
            Color::TRANSPARENT
        }
    }

    pub fn vertex_stroke_weight(&self) -> f32 {
        if self.stroke {
            self.stroke_weight
        } else {
            0.0
        }
    }

    /// Whether fill geometry gets generated at all
    pub fn has_fill(&self) -> bool {
        self.fill || self.texture.is_some()
    }
}
