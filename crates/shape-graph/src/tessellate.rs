use crate::color::Color;
use crate::input::{InputGeometry, InputVertex};
use crate::primitives::{cos_sin, FillLayout, MIN_ACCURACY, SINCOS_LENGTH};
use crate::style::{Lighting, StrokeCap};
use crate::tess_geometry::TessGeometry;
use glam::Vec3;
use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};
use std::f32::consts::TAU;

/// Corners of a square point, in fan order around the center
const QUAD_POINT_SIGNS: [[f32; 2]; 4] = [[-1.0, 1.0], [-1.0, -1.0], [1.0, -1.0], [1.0, 1.0]];

/// xyz, rgba, normal, uv and lighting carried through the polygon tessellator
const POLYGON_ATTRIBUTES: usize = 25;

/// Style values the tessellator reads
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TessParams {
    pub fill: bool,
    pub stroke: bool,
    pub stroke_weight: f32,
    pub stroke_cap: StrokeCap,
    /// Texture is stored upside down, flip v
    pub flip_v: bool,
}

#[derive(Clone, Copy, Debug)]
struct PolygonVertex {
    position: [f32; 3],
    color: [f32; 4],
    normal: [f32; 3],
    uv: [f32; 2],
    lighting: Lighting,
}

impl PolygonVertex {
    fn attributes(v: &InputVertex) -> [f32; POLYGON_ATTRIBUTES] {
        let mut a = [0.0; POLYGON_ATTRIBUTES];
        a[0..3].copy_from_slice(&v.position);
        a[3..7].copy_from_slice(&v.fill.to_array());
        a[7..10].copy_from_slice(&v.normal);
        a[10..12].copy_from_slice(&v.uv);
        a[12..16].copy_from_slice(&v.lighting.ambient.to_array());
        a[16..20].copy_from_slice(&v.lighting.specular.to_array());
        a[20..24].copy_from_slice(&v.lighting.emissive.to_array());
        a[24] = v.lighting.shininess;
        a
    }

    fn from_attributes(a: &[f32]) -> Self {
        let color = |i: usize| Color::new(a[i], a[i + 1], a[i + 2], a[i + 3]);
        Self {
            position: [a[0], a[1], a[2]],
            color: [a[3], a[4], a[5], a[6]],
            normal: [a[7], a[8], a[9]],
            uv: [a[10], a[11]],
            lighting: Lighting {
                ambient: color(12),
                specular: color(16),
                emissive: color(20),
                shininess: a[24],
            },
        }
    }
}

/// Coordinate axes a polygon is projected onto for triangulation: the two
/// that remain after dropping the dominant axis of its Newell normal
fn projection_axes(vertices: &[InputVertex]) -> (usize, usize) {
    let mut normal = Vec3::ZERO;
    let mut contour_start = 0;
    for i in 0..vertices.len() {
        let closes = i + 1 == vertices.len() || vertices[i + 1].is_break();
        let next = if closes { contour_start } else { i + 1 };
        let (a, b) = (vertices[i].position(), vertices[next].position());
        normal += Vec3::new(
            (a.y - b.y) * (a.z + b.z),
            (a.z - b.z) * (a.x + b.x),
            (a.x - b.x) * (a.y + b.y),
        );
        if closes {
            contour_start = i + 1;
        }
    }

    let n = normal.abs();
    if n.x > n.y && n.x > n.z {
        (1, 2)
    } else if n.y > n.z {
        (2, 0)
    } else {
        (0, 1)
    }
}

/// Number of perimeter vertices of a round point of the given weight
pub fn point_accuracy(weight: f32) -> usize {
    ((TAU * weight / 20.0) as usize).max(MIN_ACCURACY)
}

/// Tessellator converts input geometry into fill, line and point streams
pub struct Tessellator {
    polygon: FillTessellator,
}

impl Default for Tessellator {
    fn default() -> Self {
        Self::new()
    }
}

impl Tessellator {
    pub fn new() -> Self {
        Self {
            polygon: FillTessellator::new(),
        }
    }

    /// Replace the streams of `out` with the tessellation of `input`.
    /// Indices in the output are local to the node.
    pub fn tessellate(
        &mut self,
        input: &InputGeometry,
        layout: &FillLayout,
        params: &TessParams,
        out: &mut TessGeometry,
    ) {
        out.clear();
        let n = input.len();

        match layout {
            FillLayout::Points => {
                self.tessellate_points(input, params, out);
                return;
            }
            FillLayout::Lines => {
                self.tessellate_lines(input, params, out);
                return;
            }
            FillLayout::Triangles => {
                let raw: Vec<u32> = (0..(n / 3 * 3) as u32).collect();
                self.tessellate_raw(input, &raw, params, out);
            }
            FillLayout::IndexedTriangles(indices) => {
                self.tessellate_raw(input, indices, params, out);
            }
            FillLayout::TriangleFan => {
                let mut raw = Vec::with_capacity(3 * n.saturating_sub(2));
                for i in 1..n.saturating_sub(1) as u32 {
                    raw.extend([0, i, i + 1]);
                }
                self.tessellate_raw(input, &raw, params, out);
            }
            FillLayout::TriangleStrip => {
                let mut raw = Vec::with_capacity(3 * n.saturating_sub(2));
                for i in 1..n.saturating_sub(1) as u32 {
                    if i % 2 == 0 {
                        raw.extend([i, i - 1, i + 1]);
                    } else {
                        raw.extend([i, i + 1, i - 1]);
                    }
                }
                self.tessellate_raw(input, &raw, params, out);
            }
            FillLayout::Quads => {
                let mut raw = Vec::with_capacity(6 * (n / 4));
                for q in 0..(n / 4) as u32 {
                    let i0 = 4 * q;
                    raw.extend([i0, i0 + 1, i0 + 3, i0 + 1, i0 + 2, i0 + 3]);
                }
                self.tessellate_raw(input, &raw, params, out);
            }
            FillLayout::QuadStrip => {
                let mut raw = Vec::with_capacity(6 * (n / 2).saturating_sub(1));
                for q in 1..(n / 2) as u32 {
                    let i0 = 2 * (q - 1);
                    let i1 = i0 + 1;
                    let i2 = 2 * q + 1;
                    let i3 = 2 * q;
                    raw.extend([i0, i1, i3, i1, i2, i3]);
                }
                self.tessellate_raw(input, &raw, params, out);
            }
            FillLayout::Polygon {
                solid,
                calc_normals,
                ..
            } => {
                if params.fill && n >= 3 {
                    self.tessellate_polygon(input, *solid, *calc_normals, params, out);
                }
            }
            FillLayout::Unsupported => {
                log::warn!("unsupported geometry, producing no output");
                return;
            }
        }

        self.tessellate_edges(input, params, out);
    }

    fn push_fill_vertex(v: &InputVertex, params: &TessParams, out: &mut TessGeometry) {
        let mut uv = v.uv;
        if params.flip_v {
            uv[1] = 1.0 - uv[1];
        }
        out.fill
            .push(v.position, v.fill.to_array(), v.normal, uv, &v.lighting);
    }

    /// Copy every input vertex and use `raw` as the triangle list
    fn tessellate_raw(
        &mut self,
        input: &InputGeometry,
        raw: &[u32],
        params: &TessParams,
        out: &mut TessGeometry,
    ) {
        if !params.fill || raw.len() < 3 {
            return;
        }
        if let Some(bad) = raw.iter().find(|&&i| i as usize >= input.len()) {
            log::warn!("triangle index {bad} out of {} vertices, skipping fill", input.len());
            return;
        }

        for v in input.vertices() {
            Self::push_fill_vertex(v, params, out);
        }
        out.fill
            .indices
            .extend_from_slice(&raw[..raw.len() / 3 * 3]);
    }

    fn tessellate_polygon(
        &mut self,
        input: &InputGeometry,
        solid: bool,
        calc_normals: bool,
        params: &TessParams,
        out: &mut TessGeometry,
    ) {
        let (u, w) = projection_axes(input.vertices());
        let mut builder = Path::builder_with_attributes(POLYGON_ATTRIBUTES);
        let mut open = false;
        for v in input.vertices() {
            let at = point(v.position[u], v.position[w]);
            let attributes = PolygonVertex::attributes(v);

            if v.is_break() && open {
                builder.end(true);
                open = false;
            }
            if open {
                builder.line_to(at, &attributes);
            } else {
                builder.begin(at, &attributes);
                open = true;
            }
        }
        if open {
            builder.end(true);
        }
        let path = builder.build();

        let options = if solid {
            FillOptions::non_zero()
        } else {
            FillOptions::even_odd()
        };

        let mut buffers: VertexBuffers<PolygonVertex, u32> = VertexBuffers::new();
        let result = self.polygon.tessellate_path(
            &path,
            &options,
            &mut BuffersBuilder::new(&mut buffers, |mut vertex: FillVertex| {
                PolygonVertex::from_attributes(vertex.interpolated_attributes())
            }),
        );
        if let Err(e) = result {
            log::warn!("polygon tessellation failed: {e:?}");
            return;
        }
        if buffers.indices.is_empty() {
            log::debug!("polygon produced no triangles");
            return;
        }

        if calc_normals {
            for tri in buffers.indices.chunks_exact(3) {
                let [p0, p1, p2] = [tri[0], tri[1], tri[2]]
                    .map(|i| Vec3::from_array(buffers.vertices[i as usize].position));
                let n = (p2 - p1).cross(p0 - p1).normalize_or_zero().to_array();
                for &i in tri {
                    buffers.vertices[i as usize].normal = n;
                }
            }
        }

        for v in &buffers.vertices {
            let mut uv = v.uv;
            if params.flip_v {
                uv[1] = 1.0 - uv[1];
            }
            out.fill.push(v.position, v.color, v.normal, uv, &v.lighting);
        }
        out.fill.indices.extend_from_slice(&buffers.indices);
    }

    fn tessellate_points(&mut self, input: &InputGeometry, params: &TessParams, out: &mut TessGeometry) {
        if !params.stroke || input.is_empty() {
            return;
        }
        let weight = params.stroke_weight;

        for v in input.vertices() {
            let base = out.point.vertex_count() as u32;
            let color = v.stroke.to_array();

            let offsets: Vec<[f32; 2]> = match params.stroke_cap {
                StrokeCap::Round => {
                    let perim = point_accuracy(weight);
                    let inc = SINCOS_LENGTH as f32 / perim as f32;
                    let mut val = 0.0f32;
                    (0..perim)
                        .map(|_| {
                            let (cos, sin) = cos_sin(val as usize);
                            val = (val + inc) % SINCOS_LENGTH as f32;
                            [0.5 * cos * weight, 0.5 * sin * weight]
                        })
                        .collect()
                }
                StrokeCap::Square | StrokeCap::Project => QUAD_POINT_SIGNS
                    .iter()
                    .map(|s| [0.5 * s[0] * weight, 0.5 * s[1] * weight])
                    .collect(),
            };

            // Center followed by the perimeter, drawn as a closed fan
            let nvert = offsets.len() as u32 + 1;
            out.point.positions.push(v.position);
            out.point.colors.push(color);
            out.point.offsets.push([0.0, 0.0]);
            for offset in offsets {
                out.point.positions.push(v.position);
                out.point.colors.push(color);
                out.point.offsets.push(offset);
            }

            for k in 1..nvert - 1 {
                out.point.indices.extend([base, base + k, base + k + 1]);
            }
            out.point.indices.extend([base, base + 1, base + nvert - 1]);
        }
    }

    fn tessellate_lines(&mut self, input: &InputGeometry, params: &TessParams, out: &mut TessGeometry) {
        if !params.stroke || input.len() < 2 {
            return;
        }
        for k in 0..input.len() / 2 {
            self.add_line(input, 2 * k, 2 * k + 1, params, out);
        }
    }

    fn tessellate_edges(&mut self, input: &InputGeometry, params: &TessParams, out: &mut TessGeometry) {
        if !params.stroke {
            return;
        }
        for edge in input.edges() {
            if edge.a < input.len() && edge.b < input.len() {
                self.add_line(input, edge.a, edge.b, params, out);
            }
        }
    }

    /// Four vertices forming a quad that the line shader extrudes in screen space
    fn add_line(
        &mut self,
        input: &InputGeometry,
        i0: usize,
        i1: usize,
        params: &TessParams,
        out: &mut TessGeometry,
    ) {
        let base = out.line.vertex_count() as u32;
        let half = params.stroke_weight / 2.0;
        let v0 = &input.vertices()[i0];
        let v1 = &input.vertices()[i1];

        let [x0, y0, z0] = v0.position;
        let [x1, y1, z1] = v1.position;
        let corners = [
            (v0, [x1, y1, z1, half]),
            (v0, [x1, y1, z1, -half]),
            (v1, [x0, y0, z0, -half]),
            (v1, [x0, y0, z0, half]),
        ];
        for (v, direction) in corners {
            out.line.positions.push(v.position);
            out.line.colors.push(v.stroke.to_array());
            out.line.directions.push(direction);
        }
        out.line
            .indices
            .extend([base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::input::VertexCode;

    fn params(fill: bool, stroke: bool) -> TessParams {
        TessParams {
            fill,
            stroke,
            stroke_weight: 2.0,
            stroke_cap: StrokeCap::Square,
            flip_v: false,
        }
    }

    fn geometry(points: &[[f32; 2]]) -> InputGeometry {
        let mut input = InputGeometry::new(points.len().max(1), 1024);
        for p in points {
            input
                .add_vertex(Vec3::new(p[0], p[1], 0.0), [0.0, 0.0], VertexCode::Vertex)
                .unwrap();
        }
        input
    }

    #[test]
    fn test_quad_fill_without_stroke() {
        let input = geometry(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &FillLayout::Quads, &params(true, false), &mut tess);

        assert_eq!(tess.fill.vertex_count(), 4);
        assert_eq!(tess.fill.indices, vec![0, 1, 3, 1, 2, 3]);
        assert_eq!(tess.line.vertex_count(), 0);
    }

    #[test]
    fn test_edges_become_line_quads() {
        let mut input = geometry(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        input.add_triangles_edges();
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &FillLayout::Triangles, &params(true, true), &mut tess);

        assert_eq!(tess.fill.indices.len(), 3);
        assert_eq!(tess.line.vertex_count(), 12);
        assert_eq!(tess.line.indices.len(), 18);
        assert_eq!(tess.line.directions[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(tess.line.directions[1][3], -1.0);
        assert_eq!(&tess.line.indices[6..12], &[4, 5, 6, 6, 5, 7]);
    }

    #[test]
    fn test_square_points() {
        let input = geometry(&[[5.0, 5.0], [9.0, 9.0]]);
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &FillLayout::Points, &params(false, true), &mut tess);

        assert_eq!(tess.point.vertex_count(), 10);
        assert_eq!(tess.point.indices.len(), 24);
        assert_eq!(tess.point.offsets[1], [-1.0, 1.0]);
        assert_eq!(&tess.point.indices[12..15], &[5, 6, 7]);
    }

    #[test]
    fn test_round_points() {
        let input = geometry(&[[0.0, 0.0]]);
        let mut tess = TessGeometry::new();
        let mut p = params(false, true);
        p.stroke_cap = StrokeCap::Round;
        Tessellator::new().tessellate(&input, &FillLayout::Points, &p, &mut tess);

        assert_eq!(tess.point.vertex_count(), MIN_ACCURACY + 1);
        assert_eq!(tess.point.indices.len(), 3 * MIN_ACCURACY);
    }

    #[test]
    fn test_points_need_stroke() {
        let input = geometry(&[[0.0, 0.0]]);
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &FillLayout::Points, &params(true, false), &mut tess);
        assert_eq!(tess.point.vertex_count(), 0);
    }

    #[test]
    fn test_polygon_with_hole() {
        let mut input = geometry(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]);
        input.reserve(4).unwrap();
        for (i, p) in [[3.0, 3.0], [7.0, 3.0], [7.0, 7.0], [3.0, 7.0]].iter().enumerate() {
            let code = if i == 0 {
                VertexCode::Break
            } else {
                VertexCode::Vertex
            };
            input
                .add_vertex(Vec3::new(p[0], p[1], 0.0), [0.0, 0.0], code)
                .unwrap();
        }
        let layout = FillLayout::Polygon {
            solid: false,
            closed: true,
            calc_normals: false,
        };
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &layout, &params(true, false), &mut tess);

        assert_eq!(tess.fill.indices.len() % 3, 0);
        assert!(tess.fill.indices.len() >= 3 * 8);
        // No triangle lies inside the hole
        for tri in tess.fill.indices.chunks(3) {
            let c = tri
                .iter()
                .map(|&i| Vec3::from_array(tess.fill.positions[i as usize]))
                .sum::<Vec3>()
                / 3.0;
            assert!(!(c.x > 3.0 && c.x < 7.0 && c.y > 3.0 && c.y < 7.0));
        }
    }

    fn polygon_square(corners: [Vec3; 4]) -> TessGeometry {
        let mut input = InputGeometry::new(4, 4);
        for c in corners {
            input.add_vertex(c, [0.0, 0.0], VertexCode::Vertex).unwrap();
        }
        let layout = FillLayout::Polygon {
            solid: true,
            closed: true,
            calc_normals: true,
        };
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &layout, &params(true, false), &mut tess);
        tess
    }

    #[test]
    fn test_polygon_in_xz_plane() {
        let tess = polygon_square([
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(10.0, 5.0, 0.0),
            Vec3::new(10.0, 5.0, 10.0),
            Vec3::new(0.0, 5.0, 10.0),
        ]);
        assert_eq!(tess.fill.vertex_count(), 4);
        assert_eq!(tess.fill.indices.len(), 6);
        assert!(tess.fill.positions.iter().all(|p| p[1] == 5.0));
        assert!(tess.fill.positions.contains(&[10.0, 5.0, 10.0]));
        for n in &tess.fill.normals {
            assert_eq!(n[1].abs(), 1.0);
        }
    }

    #[test]
    fn test_polygon_in_yz_plane() {
        let tess = polygon_square([
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 10.0, 0.0),
            Vec3::new(2.0, 10.0, 10.0),
            Vec3::new(2.0, 0.0, 10.0),
        ]);
        assert_eq!(tess.fill.vertex_count(), 4);
        assert_eq!(tess.fill.indices.len(), 6);
        assert!(tess.fill.positions.iter().all(|p| p[0] == 2.0));
        for n in &tess.fill.normals {
            assert_eq!(n[0].abs(), 1.0);
        }
    }

    #[test]
    fn test_polygon_keeps_lighting() {
        let mut input = geometry(&[]);
        input.material.lighting.shininess = 8.0;
        input.reserve(3).unwrap();
        for p in [Vec3::ZERO, Vec3::X, Vec3::Y] {
            input.add_vertex(p, [0.0, 0.0], VertexCode::Vertex).unwrap();
        }
        let layout = FillLayout::Polygon {
            solid: true,
            closed: true,
            calc_normals: false,
        };
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &layout, &params(true, false), &mut tess);
        assert_eq!(tess.fill.shininess, vec![8.0; 3]);
    }

    #[test]
    fn test_collinear_polygon_pushes_nothing() {
        let input = geometry(&[[0.0, 0.0], [5.0, 0.0], [10.0, 0.0]]);
        let layout = FillLayout::Polygon {
            solid: true,
            closed: true,
            calc_normals: false,
        };
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &layout, &params(true, false), &mut tess);
        assert_eq!(tess.fill.vertex_count(), 0);
        assert!(tess.fill.indices.is_empty());
    }

    #[test]
    fn test_polygon_carries_colors() {
        let mut input = InputGeometry::new(3, 3);
        input.material.fill = Color::rgb(0.0, 1.0, 0.0);
        for p in [[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]] {
            input
                .add_vertex(Vec3::new(p[0], p[1], 1.5), [0.0, 0.0], VertexCode::Vertex)
                .unwrap();
        }
        let layout = FillLayout::Polygon {
            solid: true,
            closed: true,
            calc_normals: true,
        };
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &layout, &params(true, false), &mut tess);

        assert_eq!(tess.fill.vertex_count(), 3);
        assert!(tess.fill.colors.iter().all(|c| *c == [0.0, 1.0, 0.0, 1.0]));
        assert!(tess.fill.positions.iter().all(|p| p[2] == 1.5));
        assert!(tess.fill.normals.iter().all(|n| n[2].abs() == 1.0));
    }

    #[test]
    fn test_flipped_texture() {
        let mut input = InputGeometry::new(4, 4);
        for (p, uv) in [
            ([0.0, 0.0], [0.0, 0.0]),
            ([1.0, 0.0], [1.0, 0.0]),
            ([1.0, 1.0], [1.0, 1.0]),
            ([0.0, 1.0], [0.0, 1.0]),
        ] {
            input
                .add_vertex(Vec3::new(p[0], p[1], 0.0), uv, VertexCode::Vertex)
                .unwrap();
        }
        let mut p = params(true, false);
        p.flip_v = true;
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &FillLayout::Quads, &p, &mut tess);
        assert_eq!(tess.fill.texcoords[0], [0.0, 1.0]);
        assert_eq!(tess.fill.texcoords[2], [1.0, 0.0]);
    }

    #[test]
    fn test_unsupported_is_empty() {
        let input = geometry(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        let mut tess = TessGeometry::new();
        Tessellator::new().tessellate(&input, &FillLayout::Unsupported, &params(true, true), &mut tess);
        assert_eq!(tess.fill.vertex_count(), 0);
        assert_eq!(tess.line.vertex_count(), 0);
    }
}
