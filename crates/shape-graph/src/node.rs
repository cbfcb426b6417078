//! Scene graph nodes and the leaf-local half of the authoring API.
//!
//! A node never looks at its parent or children here; everything that needs
//! the tree (recursion into groups, invalidating the root, transforms) lives
//! in [`crate::scene`].

use crate::buffers::{ResolvedTexture, RootBuffers, TextureHandle};
use crate::color::Color;
use crate::config::{DrawingState, ShapeSettings, TextureMode};
use crate::curve::CurveStepper;
use crate::error::Result;
use crate::input::{InputGeometry, Material, VertexCode};
use crate::primitives::{
    generate_path, generate_primitive, prepare_geometry, FillLayout, Paint, PathData,
};
use crate::style::{ImageRef, Lighting, NormalMode, ShapeStyle, StrokeCap, StrokeJoin};
use crate::tess_geometry::{Attribute, StreamKind, TessGeometry};
use crate::tessellate::{TessParams, Tessellator};
use glam::{Mat4, Vec3};
use std::collections::BTreeSet;

/// Generational handle to a node in a [`crate::Scene`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ShapeId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Points,
    Lines,
    Triangles,
    TriangleFan,
    TriangleStrip,
    Quads,
    QuadStrip,
    Polygon,
    Rect,
    Ellipse,
    Arc,
    Box,
    Sphere,
    Line,
    Point,
    Triangle,
    Quad,
}

impl ShapeKind {
    /// Kinds generated from a parameter vector
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ShapeKind::Rect
                | ShapeKind::Ellipse
                | ShapeKind::Arc
                | ShapeKind::Box
                | ShapeKind::Sphere
                | ShapeKind::Line
                | ShapeKind::Point
                | ShapeKind::Triangle
                | ShapeKind::Quad
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShapeFamily {
    Group,
    /// Authored vertex by vertex
    Geometry(ShapeKind),
    Primitive(ShapeKind, Vec<f32>),
    Path(PathData),
}

impl ShapeFamily {
    pub fn is_group(&self) -> bool {
        matches!(self, ShapeFamily::Group)
    }

    pub fn kind(&self) -> Option<ShapeKind> {
        match self {
            ShapeFamily::Group => None,
            ShapeFamily::Geometry(kind) | ShapeFamily::Primitive(kind, _) => Some(*kind),
            ShapeFamily::Path(_) => Some(ShapeKind::Polygon),
        }
    }
}

/// Per-attribute dirty flags of a leaf, cleared once the data reached the GPU
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modified {
    attributes: [bool; Attribute::COUNT],
    indices: [bool; 3],
}

impl Modified {
    pub fn mark(&mut self, attribute: Attribute) {
        self.attributes[attribute.index()] = true;
    }

    /// Every attribute and the indices of every stream
    pub fn mark_all(&mut self) {
        self.attributes = [true; Attribute::COUNT];
        self.indices = [true; 3];
    }

    pub fn attribute(&self, attribute: Attribute) -> bool {
        self.attributes[attribute.index()]
    }

    pub fn indices(&self, stream: StreamKind) -> bool {
        self.indices[stream.index()]
    }

    pub fn any(&self) -> bool {
        self.attributes.iter().chain(&self.indices).any(|&m| m)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// What an edit did to a leaf, so the scene knows how far to invalidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Change {
    None,
    /// Only attribute arrays were rewritten in place
    Attributes,
    /// The leaf has to be tessellated again
    Geometry,
}

pub struct ShapeNode {
    pub(crate) family: ShapeFamily,
    pub(crate) parent: Option<ShapeId>,
    pub(crate) children: Vec<ShapeId>,
    pub(crate) matrix: Option<Mat4>,
    /// Some descendant carries a matrix
    pub(crate) child_has_matrix: bool,
    pub(crate) style: ShapeStyle,
    pub(crate) drawing: DrawingState,
    pub(crate) input: InputGeometry,
    pub(crate) tess: TessGeometry,
    pub(crate) normal_mode: NormalMode,
    normal_calls: u32,
    in_contour: bool,
    break_next: bool,
    pub(crate) shape_ended: bool,
    pub(crate) tessellated: bool,
    pub(crate) modified: Modified,
    /// Texture this leaf was tessellated with
    pub(crate) texture: Option<ResolvedTexture>,
    /// Textures bound by fill geometry in this subtree
    pub(crate) textures: BTreeSet<TextureHandle>,
    /// Some fill geometry in this subtree has no texture
    pub(crate) untextured_fill: bool,
    /// GPU buffers, only ever present on a root
    pub(crate) buffers: Option<RootBuffers>,
}

impl ShapeNode {
    pub(crate) fn new(family: ShapeFamily, settings: &ShapeSettings) -> Self {
        let style = ShapeStyle {
            fill_color: settings.fill,
            stroke_color: settings.stroke,
            stroke_weight: settings.stroke_weight,
            stroke_cap: settings.stroke_cap,
            stroke_join: settings.stroke_join,
            lighting: settings.lighting,
            ..Default::default()
        };
        let capacity = if family.is_group() {
            1
        } else {
            settings.input_vertex_capacity
        };
        // Primitives and paths are complete as soon as they exist
        let shape_ended = !matches!(family, ShapeFamily::Geometry(_));

        let mut node = Self {
            family,
            parent: None,
            children: Vec::new(),
            matrix: None,
            child_has_matrix: false,
            style,
            drawing: settings.drawing,
            input: InputGeometry::new(capacity, settings.max_input_vertices),
            tess: TessGeometry::new(),
            normal_mode: NormalMode::Auto,
            normal_calls: 0,
            in_contour: false,
            break_next: false,
            shape_ended,
            tessellated: false,
            modified: Modified::default(),
            texture: None,
            textures: BTreeSet::new(),
            untextured_fill: false,
            buffers: None,
        };
        node.sync_material();
        node
    }

    pub fn family(&self) -> &ShapeFamily {
        &self.family
    }

    pub fn is_group(&self) -> bool {
        self.family.is_group()
    }

    pub fn kind(&self) -> Option<ShapeKind> {
        self.family.kind()
    }

    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    pub fn children(&self) -> &[ShapeId] {
        &self.children
    }

    pub fn style(&self) -> &ShapeStyle {
        &self.style
    }

    pub fn drawing(&self) -> &DrawingState {
        &self.drawing
    }

    pub fn matrix(&self) -> Option<Mat4> {
        self.matrix
    }

    pub fn input(&self) -> &InputGeometry {
        &self.input
    }

    pub fn tess(&self) -> &TessGeometry {
        &self.tess
    }

    pub fn normal_mode(&self) -> NormalMode {
        self.normal_mode
    }

    pub fn is_ended(&self) -> bool {
        self.shape_ended
    }

    pub fn is_tessellated(&self) -> bool {
        self.tessellated
    }

    pub fn modified(&self) -> &Modified {
        &self.modified
    }

    /// Refresh the attributes future vertices are authored with
    fn sync_material(&mut self) {
        let normal = self.input.material.normal;
        self.input.material = Material {
            fill: self.style.vertex_fill(),
            stroke: self.style.vertex_stroke(),
            stroke_weight: self.style.vertex_stroke_weight(),
            normal,
            lighting: self.style.lighting,
        };
    }

    fn accepts_vertices(&self, what: &str) -> bool {
        if !matches!(self.family, ShapeFamily::Geometry(_)) {
            log::warn!("{what} is only allowed on authored geometry shapes");
            return false;
        }
        if self.shape_ended {
            log::warn!("{what} after end, start a new shape instead");
            return false;
        }
        true
    }

    fn next_code(&mut self) -> VertexCode {
        if std::mem::take(&mut self.break_next) {
            VertexCode::Break
        } else {
            VertexCode::Vertex
        }
    }

    fn texture_uv(&self, u: f32, v: f32) -> [f32; 2] {
        match (self.style.texture, self.drawing.texture_mode) {
            (Some(image), TextureMode::Image) if image.width > 0 && image.height > 0 => [
                (u / image.width as f32).min(1.0),
                (v / image.height as f32).min(1.0),
            ],
            _ => [u, v],
        }
    }

    // Vertex authoring

    pub(crate) fn vertex(&mut self, position: Vec3, uv: Option<[f32; 2]>) -> Result<()> {
        if !self.accepts_vertices("vertex") {
            return Ok(());
        }
        self.input.reserve(1)?;
        let uv = uv.map_or([0.0, 0.0], |[u, v]| self.texture_uv(u, v));
        let code = self.next_code();
        self.input.add_vertex(position, uv, code)?;
        Ok(())
    }

    pub(crate) fn bezier_vertex(&mut self, c1: Vec3, c2: Vec3, end: Vec3) -> Result<()> {
        if !self.accepts_vertices("bezier vertex") {
            return Ok(());
        }
        let stepper = CurveStepper::bezier(self.drawing.bezier_detail);
        let code = self.next_code();
        self.input.add_bezier_vertex(c1, c2, end, &stepper, code)
    }

    pub(crate) fn quadratic_vertex(&mut self, control: Vec3, end: Vec3) -> Result<()> {
        if !self.accepts_vertices("quadratic vertex") {
            return Ok(());
        }
        let stepper = CurveStepper::bezier(self.drawing.bezier_detail);
        let code = self.next_code();
        self.input.add_quadratic_vertex(control, end, &stepper, code)
    }

    pub(crate) fn curve_vertex(&mut self, point: Vec3) -> Result<()> {
        if !self.accepts_vertices("curve vertex") {
            return Ok(());
        }
        let stepper =
            CurveStepper::catmull_rom(self.drawing.curve_detail, self.drawing.curve_tightness);
        let code = if self.break_next {
            VertexCode::Break
        } else {
            VertexCode::Vertex
        };
        let before = self.input.len();
        self.input.add_curve_vertex(point, &stepper, code)?;
        // The break belongs to the first vertex the curve actually emits
        if self.input.len() > before {
            self.break_next = false;
        }
        Ok(())
    }

    pub(crate) fn normal(&mut self, normal: Vec3) {
        if !self.accepts_vertices("normal") {
            return;
        }
        self.input.set_normal(normal);
        self.normal_calls += 1;
        self.normal_mode = if self.normal_calls == 1 {
            NormalMode::Shape
        } else {
            NormalMode::Vertex
        };
    }

    pub(crate) fn begin_contour(&mut self) {
        if !self.accepts_vertices("begin contour") {
            return;
        }
        if self.in_contour {
            log::warn!("already inside a contour, call end contour first");
            return;
        }
        self.in_contour = true;
        self.break_next = true;
    }

    pub(crate) fn end_contour(&mut self) {
        if !self.accepts_vertices("end contour") {
            return;
        }
        if !self.in_contour {
            log::warn!("end contour without a matching begin contour");
            return;
        }
        self.in_contour = false;
    }

    pub(crate) fn end(&mut self, close: bool) -> Change {
        if !self.accepts_vertices("end") {
            return Change::None;
        }
        if self.in_contour {
            log::warn!("shape ended inside an open contour");
            self.in_contour = false;
        }
        self.style.closed = close;
        self.shape_ended = true;
        self.tessellated = false;
        Change::Geometry
    }

    pub(crate) fn set_params(&mut self, params: Vec<f32>) -> Change {
        match &mut self.family {
            ShapeFamily::Primitive(_, current) => {
                *current = params;
                self.tessellated = false;
                Change::Geometry
            }
            _ => {
                log::warn!("parameters can only be set on primitive shapes");
                Change::None
            }
        }
    }

    pub(crate) fn set_path(&mut self, path: PathData) -> Change {
        match &mut self.family {
            ShapeFamily::Path(current) => {
                *current = path;
                self.tessellated = false;
                Change::Geometry
            }
            _ => {
                log::warn!("path data can only be set on path shapes");
                Change::None
            }
        }
    }

    // Style, leaf level. Groups recurse in the scene.

    fn invalidate_if_ended(&mut self) -> Change {
        if self.shape_ended && !self.is_group() {
            self.tessellated = false;
            Change::Geometry
        } else {
            Change::None
        }
    }

    /// Colors can be patched in place only once output exists for them
    fn patchable(&self, stream: StreamKind) -> bool {
        self.shape_ended && self.tessellated && self.tess.vertex_count(stream) > 0
    }

    fn recolor_fill(&mut self, color: Color) -> Change {
        if !self.patchable(StreamKind::Fill) {
            return self.invalidate_if_ended();
        }
        self.input.set_all_fills(color);
        self.tess.fill_colors(color.to_array());
        self.modified.mark(Attribute::FillColor);
        Change::Attributes
    }

    fn recolor_stroke(&mut self, color: Color) -> Change {
        let lines = self.patchable(StreamKind::Line);
        let points = self.patchable(StreamKind::Point);
        if !lines && !points {
            return self.invalidate_if_ended();
        }
        self.input.set_all_strokes(color);
        if lines {
            self.tess.line_colors(color.to_array());
            self.modified.mark(Attribute::LineColor);
        }
        if points {
            self.tess.point_colors(color.to_array());
            self.modified.mark(Attribute::PointColor);
        }
        Change::Attributes
    }

    pub(crate) fn set_fill(&mut self, fill: Option<Color>) -> Change {
        self.style.fill = fill.is_some();
        if let Some(color) = fill {
            self.style.fill_color = color;
        }
        self.sync_material();
        if self.is_group() || self.style.texture.is_some() {
            return Change::None;
        }
        self.recolor_fill(fill.unwrap_or(Color::TRANSPARENT))
    }

    pub(crate) fn set_tint(&mut self, tint: Option<Color>) -> Change {
        self.style.tint = tint.is_some();
        if let Some(color) = tint {
            self.style.tint_color = color;
        }
        self.sync_material();
        if self.is_group() || self.style.texture.is_none() {
            return Change::None;
        }
        self.recolor_fill(tint.unwrap_or(Color::WHITE))
    }

    pub(crate) fn set_stroke(&mut self, stroke: Option<Color>) -> Change {
        let was_stroked = self.style.stroke;
        self.style.stroke = stroke.is_some();
        if let Some(color) = stroke {
            self.style.stroke_color = color;
        }
        self.sync_material();
        if self.is_group() {
            return Change::None;
        }
        if !was_stroked && self.style.stroke {
            // Edges were never generated
            return self.invalidate_if_ended();
        }
        self.recolor_stroke(stroke.unwrap_or(Color::TRANSPARENT))
    }

    pub(crate) fn set_stroke_weight(&mut self, weight: f32) -> Change {
        let old = self.style.stroke_weight;
        self.style.stroke_weight = weight;
        self.sync_material();
        if self.is_group() || old == weight {
            return Change::None;
        }
        if self.style.stroke {
            self.input.set_all_stroke_weights(weight);
        }

        let lines = self.patchable(StreamKind::Line);
        let points = self.patchable(StreamKind::Point);
        if (!lines && !points) || old <= 0.0 {
            return self.invalidate_if_ended();
        }
        self.tess.scale_stroke(weight / old);
        if lines {
            self.modified.mark(Attribute::LineDirection);
        }
        if points {
            self.modified.mark(Attribute::PointOffset);
        }
        Change::Attributes
    }

    /// Change one lighting property of the fill. Authored vertices take the
    /// new value and existing fill output is patched in place.
    fn relight(&mut self, attribute: Attribute, edit: impl Fn(&mut Lighting)) -> Change {
        edit(&mut self.style.lighting);
        self.sync_material();
        if self.is_group() {
            return Change::None;
        }
        self.input.update_all_lighting(&edit);
        if !self.patchable(StreamKind::Fill) {
            return Change::None;
        }
        self.tess.fill_lighting(attribute, &self.style.lighting);
        self.modified.mark(attribute);
        Change::Attributes
    }

    pub(crate) fn set_ambient(&mut self, color: Color) -> Change {
        self.relight(Attribute::FillAmbient, |l| l.ambient = color)
    }

    pub(crate) fn set_specular(&mut self, color: Color) -> Change {
        self.relight(Attribute::FillSpecular, |l| l.specular = color)
    }

    pub(crate) fn set_emissive(&mut self, color: Color) -> Change {
        self.relight(Attribute::FillEmissive, |l| l.emissive = color)
    }

    pub(crate) fn set_shininess(&mut self, shininess: f32) -> Change {
        self.relight(Attribute::FillShininess, |l| l.shininess = shininess)
    }

    pub(crate) fn set_stroke_cap(&mut self, cap: StrokeCap) -> Change {
        if self.style.stroke_cap == cap {
            return Change::None;
        }
        self.style.stroke_cap = cap;
        self.invalidate_if_ended()
    }

    pub(crate) fn set_stroke_join(&mut self, join: StrokeJoin) -> Change {
        if self.style.stroke_join == join {
            return Change::None;
        }
        self.style.stroke_join = join;
        self.invalidate_if_ended()
    }

    pub(crate) fn set_texture(&mut self, image: Option<ImageRef>) -> Change {
        if self.style.texture == image {
            return Change::None;
        }
        self.style.texture = image;
        self.sync_material();
        self.invalidate_if_ended()
    }

    pub(crate) fn set_solid(&mut self, solid: bool) -> Change {
        if self.style.solid == solid {
            return Change::None;
        }
        self.style.solid = solid;
        self.invalidate_if_ended()
    }

    pub(crate) fn set_texture_mode(&mut self, mode: TextureMode) {
        self.drawing.texture_mode = mode;
    }

    pub(crate) fn set_bezier_detail(&mut self, detail: u32) {
        self.drawing.bezier_detail = detail.max(1);
    }

    pub(crate) fn set_curve_detail(&mut self, detail: u32) {
        self.drawing.curve_detail = detail.max(1);
    }

    pub(crate) fn set_curve_tightness(&mut self, tightness: f32) {
        self.drawing.curve_tightness = tightness;
    }

    // Per-vertex access

    pub fn vertex_count(&self) -> usize {
        self.input.len()
    }

    pub fn get_vertex(&self, index: usize) -> Option<Vec3> {
        self.input.vertex(index).map(|v| v.position())
    }

    pub fn get_normal(&self, index: usize) -> Option<Vec3> {
        self.input.vertex(index).map(|v| Vec3::from_array(v.normal))
    }

    pub fn get_texture_uv(&self, index: usize) -> Option<[f32; 2]> {
        self.input.vertex(index).map(|v| v.uv)
    }

    pub fn get_fill(&self, index: usize) -> Option<Color> {
        self.input.vertex(index).map(|v| v.fill)
    }

    pub fn get_stroke(&self, index: usize) -> Option<Color> {
        self.input.vertex(index).map(|v| v.stroke)
    }

    pub fn get_stroke_weight(&self, index: usize) -> Option<f32> {
        self.input.vertex(index).map(|v| v.stroke_weight)
    }

    pub fn get_lighting(&self, index: usize) -> Option<Lighting> {
        self.input.vertex(index).map(|v| v.lighting)
    }

    /// Edit one authored vertex in place and schedule a re-tessellation
    pub(crate) fn edit_vertex(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut crate::input::InputVertex),
    ) -> Change {
        if !matches!(self.family, ShapeFamily::Geometry(_)) {
            log::warn!("only authored geometry can be edited per vertex");
            return Change::None;
        }
        let Some(vertex) = self.input.vertex_mut(index) else {
            log::warn!("vertex {index} out of range ({} vertices)", self.input.len());
            return Change::None;
        };
        edit(vertex);
        self.invalidate_if_ended()
    }

    // Tessellation

    /// Rebuild the tessellated streams of a leaf. Failures degrade the leaf
    /// to empty output; the node counts as tessellated either way.
    pub(crate) fn tessellate(
        &mut self,
        tessellator: &mut Tessellator,
        texture: Option<ResolvedTexture>,
    ) {
        self.texture = texture;
        self.tess.clear();
        self.tessellated = true;
        self.modified.mark_all();
        if self.is_group() || !self.shape_ended {
            return;
        }

        let paint = Paint {
            fill: self.style.has_fill(),
            stroke: self.style.stroke,
        };
        self.sync_material();
        let layout = match &self.family {
            ShapeFamily::Group => return,
            ShapeFamily::Geometry(kind) => Ok(prepare_geometry(
                *kind,
                &mut self.input,
                paint,
                self.normal_mode,
                self.style.solid,
                self.style.closed,
            )),
            ShapeFamily::Primitive(kind, params) => {
                generate_primitive(*kind, params, &self.drawing, paint, &mut self.input)
            }
            ShapeFamily::Path(path) => generate_path(path, &self.drawing, paint, &mut self.input),
        };
        let layout = layout.unwrap_or_else(|e| {
            log::warn!("could not generate {:?}: {e}", self.family.kind());
            FillLayout::Unsupported
        });

        let params = TessParams {
            fill: paint.fill,
            stroke: paint.stroke,
            stroke_weight: self.style.stroke_weight,
            stroke_cap: self.style.stroke_cap,
            flip_v: self.texture.is_some_and(|t| t.flipped),
        };
        tessellator.tessellate(&self.input, &layout, &params, &mut self.tess);
        log::debug!(
            "tessellated {:?}: {} fill, {} line, {} point vertices",
            self.family.kind(),
            self.tess.fill.vertex_count(),
            self.tess.line.vertex_count(),
            self.tess.point.vertex_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(kind: ShapeKind) -> ShapeNode {
        ShapeNode::new(ShapeFamily::Geometry(kind), &ShapeSettings::default())
    }

    fn tessellated_quad() -> ShapeNode {
        let mut node = geometry(ShapeKind::Quads);
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            node.vertex(Vec3::new(x, y, 0.0), None).unwrap();
        }
        node.end(true);
        node.tessellate(&mut Tessellator::new(), None);
        node.modified.clear();
        node
    }

    #[test]
    fn test_vertices_rejected_after_end() {
        let mut node = tessellated_quad();
        node.vertex(Vec3::ZERO, None).unwrap();
        assert_eq!(node.vertex_count(), 4);
    }

    #[test]
    fn test_style_captured_at_append() {
        let mut node = geometry(ShapeKind::Triangles);
        node.set_fill(Some(Color::rgb(1.0, 0.0, 0.0)));
        node.vertex(Vec3::ZERO, None).unwrap();
        node.set_fill(Some(Color::rgb(0.0, 0.0, 1.0)));
        node.vertex(Vec3::X, None).unwrap();
        assert_eq!(node.get_fill(0), Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(node.get_fill(1), Some(Color::rgb(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_contour_marks_break() {
        let mut node = geometry(ShapeKind::Polygon);
        node.vertex(Vec3::ZERO, None).unwrap();
        node.begin_contour();
        node.begin_contour();
        node.vertex(Vec3::X, None).unwrap();
        node.vertex(Vec3::Y, None).unwrap();
        node.end_contour();
        node.end_contour();
        assert!(!node.input.vertices()[0].is_break());
        assert!(node.input.vertices()[1].is_break());
        assert!(!node.input.vertices()[2].is_break());
    }

    #[test]
    fn test_image_texture_mode_normalizes_uv() {
        let mut node = geometry(ShapeKind::Quads);
        node.set_texture(Some(ImageRef::new(7, 200, 100)));
        node.vertex(Vec3::ZERO, Some([100.0, 100.0])).unwrap();
        node.vertex(Vec3::X, Some([400.0, 0.0])).unwrap();
        assert_eq!(node.get_texture_uv(0), Some([0.5, 1.0]));
        assert_eq!(node.get_texture_uv(1), Some([1.0, 0.0]));
    }

    #[test]
    fn test_normal_modes() {
        let mut node = geometry(ShapeKind::Triangles);
        assert_eq!(node.normal_mode(), NormalMode::Auto);
        node.normal(Vec3::Z);
        assert_eq!(node.normal_mode(), NormalMode::Shape);
        node.normal(Vec3::Y);
        assert_eq!(node.normal_mode(), NormalMode::Vertex);
    }

    #[test]
    fn test_fill_patches_colors_only() {
        let mut node = tessellated_quad();
        let positions = node.tess.fill.positions.clone();

        let change = node.set_fill(Some(Color::rgb(0.0, 1.0, 0.0)));
        assert_eq!(change, Change::Attributes);
        assert!(node.is_tessellated());
        assert_eq!(node.tess.fill.positions, positions);
        assert!(node.tess.fill.colors.iter().all(|c| *c == [0.0, 1.0, 0.0, 1.0]));
        assert!(node.modified().attribute(Attribute::FillColor));
        assert!(!node.modified().attribute(Attribute::FillPosition));
    }

    #[test]
    fn test_no_fill_goes_transparent() {
        let mut node = tessellated_quad();
        assert_eq!(node.set_fill(None), Change::Attributes);
        assert!(node.tess.fill.colors.iter().all(|c| *c == [0.0; 4]));
    }

    #[test]
    fn test_stroke_weight_rescales() {
        let mut node = tessellated_quad();
        let before = node.tess.line.directions[0][3];
        assert_eq!(node.set_stroke_weight(4.0), Change::Attributes);
        assert_eq!(node.tess.line.directions[0][3], before * 4.0);
        assert!(node.modified().attribute(Attribute::LineDirection));
        assert_eq!(node.get_stroke_weight(0), Some(4.0));
    }

    #[test]
    fn test_lighting_patches_its_own_array() {
        let mut node = tessellated_quad();
        let specular = node.tess.fill.specular.clone();

        assert_eq!(node.set_shininess(12.0), Change::Attributes);
        assert!(node.tess.fill.shininess.iter().all(|&s| s == 12.0));
        assert_eq!(node.tess.fill.specular, specular);
        assert!(node.modified().attribute(Attribute::FillShininess));
        assert!(!node.modified().attribute(Attribute::FillSpecular));
        assert_eq!(node.get_lighting(3).map(|l| l.shininess), Some(12.0));

        node.set_emissive(Color::rgb(0.2, 0.0, 0.0));
        assert!(node.tess.fill.emissive.iter().all(|e| *e == [0.2, 0.0, 0.0, 1.0]));
        assert_eq!(node.get_lighting(0).map(|l| l.shininess), Some(12.0));
    }

    #[test]
    fn test_lighting_before_tessellation_reaches_vertices() {
        let mut node = geometry(ShapeKind::Triangles);
        node.vertex(Vec3::ZERO, None).unwrap();
        assert_eq!(node.set_ambient(Color::gray(0.1)), Change::None);
        node.vertex(Vec3::X, None).unwrap();
        assert_eq!(node.get_lighting(0).map(|l| l.ambient), Some(Color::gray(0.1)));
        assert_eq!(node.get_lighting(1).map(|l| l.ambient), Some(Color::gray(0.1)));
    }

    #[test]
    fn test_enabling_stroke_needs_tessellation() {
        let mut node = geometry(ShapeKind::Quads);
        node.set_stroke(None);
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            node.vertex(Vec3::new(x, y, 0.0), None).unwrap();
        }
        node.end(true);
        node.tessellate(&mut Tessellator::new(), None);
        assert_eq!(node.tess.line.vertex_count(), 0);

        assert_eq!(node.set_stroke(Some(Color::BLACK)), Change::Geometry);
        assert!(!node.is_tessellated());
    }

    #[test]
    fn test_edit_vertex_invalidates() {
        let mut node = tessellated_quad();
        let change = node.edit_vertex(2, |v| v.position = [2.0, 2.0, 0.0]);
        assert_eq!(change, Change::Geometry);
        assert_eq!(node.get_vertex(2), Some(Vec3::new(2.0, 2.0, 0.0)));
        assert_eq!(node.edit_vertex(9, |_| {}), Change::None);
    }

    #[test]
    fn test_params_on_geometry_rejected() {
        let mut node = geometry(ShapeKind::Quads);
        assert_eq!(node.set_params(vec![1.0]), Change::None);
    }
}
