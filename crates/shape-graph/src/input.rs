use crate::color::Color;
use crate::curve::CurveStepper;
use crate::error::{Result, ShapeError};
use crate::style::Lighting;
use glam::Vec3;

/// Structural tag carried by every authored vertex
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VertexCode {
    #[default]
    Vertex,
    BezierVertex,
    QuadBezierVertex,
    CurveVertex,
    /// First vertex of a new contour
    Break,
}

/// One authored vertex with its attributes resolved at append time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputVertex {
    pub position: [f32; 3],
    pub fill: Color,
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub stroke: Color,
    pub stroke_weight: f32,
    pub lighting: Lighting,
    pub code: VertexCode,
}

impl InputVertex {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn is_break(&self) -> bool {
        self.code == VertexCode::Break
    }
}

/// Stroke segment between two input vertices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    /// First segment of a stroke run
    pub starts: bool,
    /// Last segment of a stroke run
    pub ends: bool,
}

/// Attributes applied to vertices as they are appended
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub fill: Color,
    pub stroke: Color,
    pub stroke_weight: f32,
    pub normal: [f32; 3],
    pub lighting: Lighting,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            fill: Color::WHITE,
            stroke: Color::BLACK,
            stroke_weight: 1.0,
            normal: [0.0, 0.0, 1.0],
            lighting: Lighting::default(),
        }
    }
}

/// Raw authored geometry of a leaf.
///
/// The store has a logical capacity separate from its length. Appending to a
/// full store fails; callers grow it first with [`InputGeometry::reserve`].
#[derive(Clone, Debug)]
pub struct InputGeometry {
    vertices: Vec<InputVertex>,
    capacity: usize,
    max_capacity: usize,
    edges: Vec<Edge>,
    pub material: Material,
    curve_points: Vec<Vec3>,
}

impl InputGeometry {
    pub fn new(capacity: usize, max_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            vertices: Vec::with_capacity(capacity),
            capacity,
            max_capacity: max_capacity.max(capacity),
            edges: Vec::new(),
            material: Material::default(),
            curve_points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.vertices.len() >= self.capacity
    }

    /// Make room for `additional` more vertices by doubling the capacity.
    ///
    /// Fails without touching the store if the hard bound would be crossed.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self.vertices.len() + additional;
        if required <= self.capacity {
            return Ok(());
        }
        if required > self.max_capacity {
            return Err(ShapeError::CapacityExceeded {
                capacity: self.max_capacity,
            });
        }

        let mut capacity = self.capacity;
        while capacity < required {
            capacity *= 2;
        }
        let capacity = capacity.min(self.max_capacity);
        self.vertices.reserve_exact(capacity - self.vertices.len());
        self.capacity = capacity;
        Ok(())
    }

    pub fn vertices(&self) -> &[InputVertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> Option<&InputVertex> {
        self.vertices.get(index)
    }

    pub fn vertex_mut(&mut self, index: usize) -> Option<&mut InputVertex> {
        self.vertices.get_mut(index)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn clear_edges(&mut self) {
        self.edges.clear();
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.curve_points.clear();
    }

    /// Append a vertex using the current material
    pub fn add_vertex(&mut self, position: Vec3, uv: [f32; 2], code: VertexCode) -> Result<usize> {
        self.curve_points.clear();
        self.push(position, uv, code)
    }

    fn push(&mut self, position: Vec3, uv: [f32; 2], code: VertexCode) -> Result<usize> {
        if self.is_full() {
            return Err(ShapeError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let m = self.material;
        self.vertices.push(InputVertex {
            position: position.to_array(),
            fill: m.fill,
            normal: m.normal,
            uv,
            stroke: m.stroke,
            stroke_weight: m.stroke_weight,
            lighting: m.lighting,
            code,
        });
        Ok(self.vertices.len() - 1)
    }

    fn last_position(&self) -> Option<Vec3> {
        self.vertices.last().map(InputVertex::position)
    }

    /// Flatten a cubic bezier from the last vertex through two control
    /// points to `end`.
    pub fn add_bezier_vertex(
        &mut self,
        c1: Vec3,
        c2: Vec3,
        end: Vec3,
        stepper: &CurveStepper,
        code: VertexCode,
    ) -> Result<()> {
        let Some(start) = self.last_position() else {
            log::warn!("bezier vertex needs a preceding vertex, ignoring");
            return Ok(());
        };
        self.reserve(stepper.detail() as usize)?;

        let points = stepper.flatten(start, c1, c2, end);
        for (j, p) in points.into_iter().enumerate() {
            let code = if j == 0 && code == VertexCode::Break {
                VertexCode::Break
            } else {
                VertexCode::Vertex
            };
            self.add_vertex(p, [0.0, 0.0], code)?;
        }
        Ok(())
    }

    /// Flatten a quadratic curve by raising it to a cubic
    pub fn add_quadratic_vertex(
        &mut self,
        control: Vec3,
        end: Vec3,
        stepper: &CurveStepper,
        code: VertexCode,
    ) -> Result<()> {
        let Some(start) = self.last_position() else {
            log::warn!("quadratic vertex needs a preceding vertex, ignoring");
            return Ok(());
        };
        let c1 = start + (control - start) * (2.0 / 3.0);
        let c2 = end + (control - end) * (2.0 / 3.0);
        self.add_bezier_vertex(c1, c2, end, stepper, code)
    }

    /// Feed one Catmull-Rom control point. Every point from the fourth on
    /// emits the span between the two middle points of the last four.
    pub fn add_curve_vertex(
        &mut self,
        point: Vec3,
        stepper: &CurveStepper,
        code: VertexCode,
    ) -> Result<()> {
        self.curve_points.push(point);
        let n = self.curve_points.len();
        if n < 4 {
            return Ok(());
        }

        if let Err(e) = self.reserve(stepper.detail() as usize + 1) {
            self.curve_points.pop();
            return Err(e);
        }

        let [p1, p2, p3, p4] = [
            self.curve_points[n - 4],
            self.curve_points[n - 3],
            self.curve_points[n - 2],
            self.curve_points[n - 1],
        ];
        let first = if code == VertexCode::Break {
            VertexCode::Break
        } else {
            VertexCode::Vertex
        };
        self.push(p2, [0.0, 0.0], first)?;
        for p in stepper.flatten(p1, p2, p3, p4) {
            self.push(p, [0.0, 0.0], VertexCode::Vertex)?;
        }
        Ok(())
    }

    pub fn set_normal(&mut self, normal: Vec3) {
        self.material.normal = normal.to_array();
    }

    pub fn set_all_fills(&mut self, color: Color) {
        for v in &mut self.vertices {
            v.fill = color;
        }
    }

    pub fn set_all_strokes(&mut self, color: Color) {
        for v in &mut self.vertices {
            v.stroke = color;
        }
    }

    pub fn set_all_stroke_weights(&mut self, weight: f32) {
        for v in &mut self.vertices {
            v.stroke_weight = weight;
        }
    }

    pub fn update_all_lighting(&mut self, edit: impl Fn(&mut Lighting)) {
        for v in &mut self.vertices {
            edit(&mut v.lighting);
        }
    }

    // Edges

    pub fn add_edge(&mut self, a: usize, b: usize, starts: bool, ends: bool) {
        self.edges.push(Edge { a, b, starts, ends });
    }

    fn add_triangle_edges(&mut self, i0: usize, i1: usize, i2: usize) {
        self.add_edge(i0, i1, true, false);
        self.add_edge(i1, i2, false, false);
        self.add_edge(i2, i0, false, true);
    }

    fn add_quad_edges(&mut self, i0: usize, i1: usize, i2: usize, i3: usize) {
        self.add_edge(i0, i1, true, false);
        self.add_edge(i1, i2, false, false);
        self.add_edge(i2, i3, false, false);
        self.add_edge(i3, i0, false, true);
    }

    pub fn add_triangles_edges(&mut self) {
        for t in 0..self.len() / 3 {
            self.add_triangle_edges(3 * t, 3 * t + 1, 3 * t + 2);
        }
    }

    pub fn add_triangle_fan_edges(&mut self) {
        for i in 1..self.len().saturating_sub(1) {
            self.add_triangle_edges(0, i, i + 1);
        }
    }

    pub fn add_triangle_strip_edges(&mut self) {
        for i in 1..self.len().saturating_sub(1) {
            if i % 2 == 0 {
                self.add_triangle_edges(i, i - 1, i + 1);
            } else {
                self.add_triangle_edges(i, i + 1, i - 1);
            }
        }
    }

    pub fn add_quads_edges(&mut self) {
        for q in 0..self.len() / 4 {
            self.add_quad_edges(4 * q, 4 * q + 1, 4 * q + 2, 4 * q + 3);
        }
    }

    pub fn add_quad_strip_edges(&mut self) {
        for q in 1..self.len() / 2 {
            let i0 = 2 * (q - 1);
            self.add_quad_edges(i0, i0 + 1, 2 * q + 1, 2 * q);
        }
    }

    /// Outline every contour. A closed polygon links the last vertex of each
    /// contour back to its first one.
    pub fn add_polygon_edges(&mut self, closed: bool) {
        let n = self.len();
        if n < 2 {
            return;
        }
        let breaks: Vec<bool> = self.vertices.iter().map(InputVertex::is_break).collect();
        let end = if closed { n } else { n - 1 };

        let mut begin = true;
        let mut contour0 = 0;
        for i0 in 0..end {
            let i1 = i0 + 1;
            if breaks[i0] {
                contour0 = i0;
            }
            if i1 == end || breaks[i1] {
                if closed {
                    self.add_edge(i0, contour0, begin, true);
                } else if !breaks[i1] {
                    self.add_edge(i0, i1, begin, true);
                }
                begin = true;
            } else {
                self.add_edge(i0, i1, begin, false);
                begin = false;
            }
        }
    }

    // Normals

    /// Assign the face normal of a counter-clockwise triangle to its corners
    pub fn calc_triangle_normal(&mut self, i0: usize, i1: usize, i2: usize) {
        let p0 = self.vertices[i0].position();
        let p1 = self.vertices[i1].position();
        let p2 = self.vertices[i2].position();

        let v12 = p2 - p1;
        let v10 = p0 - p1;
        let n = v12.cross(v10).normalize_or_zero().to_array();

        self.vertices[i0].normal = n;
        self.vertices[i1].normal = n;
        self.vertices[i2].normal = n;
    }

    pub fn calc_triangles_normals(&mut self) {
        for t in 0..self.len() / 3 {
            self.calc_triangle_normal(3 * t, 3 * t + 1, 3 * t + 2);
        }
    }

    pub fn calc_triangle_fan_normals(&mut self) {
        for i in 1..self.len().saturating_sub(1) {
            self.calc_triangle_normal(0, i, i + 1);
        }
    }

    pub fn calc_triangle_strip_normals(&mut self) {
        for i in 1..self.len().saturating_sub(1) {
            if i % 2 == 0 {
                self.calc_triangle_normal(i + 1, i, i - 1);
            } else {
                self.calc_triangle_normal(i - 1, i, i + 1);
            }
        }
    }

    pub fn calc_quads_normals(&mut self) {
        for q in 0..self.len() / 4 {
            let i0 = 4 * q;
            self.calc_triangle_normal(i0, i0 + 1, i0 + 2);
            self.calc_triangle_normal(i0 + 2, i0 + 3, i0);
        }
    }

    pub fn calc_quad_strip_normals(&mut self) {
        for q in 1..self.len() / 2 {
            let i0 = 2 * (q - 1);
            let i1 = i0 + 1;
            let i2 = 2 * q;
            let i3 = 2 * q + 1;
            self.calc_triangle_normal(i0, i3, i1);
            self.calc_triangle_normal(i0, i2, i3);
        }
    }
}
