//! Procedural input geometry for primitive shapes, and the edge/normal setup
//! that precedes tessellation of authored geometry.
//!
//! Everything here is a deterministic function of its parameters: the same
//! kind, parameter vector and drawing state always produce the same vertices.

use crate::config::{DrawingState, EllipseMode, RectMode, DEFAULT_SPHERE_DETAIL};
use crate::curve::CurveStepper;
use crate::error::Result;
use crate::input::{InputGeometry, VertexCode};
use crate::node::ShapeKind;
use crate::style::NormalMode;
use glam::Vec3;
use std::f32::consts::TAU;

/// Angular resolution of the sine/cosine table, in degrees
const SINCOS_PRECISION: f32 = 0.5;
pub(crate) const SINCOS_LENGTH: usize = (360.0 / SINCOS_PRECISION) as usize;

/// Minimum number of perimeter vertices of an ellipse or round point
pub const MIN_ACCURACY: usize = 6;

pub(crate) fn cos_sin(index: usize) -> (f32, f32) {
    let angle = ((index % SINCOS_LENGTH) as f32 * SINCOS_PRECISION).to_radians();
    (angle.cos(), angle.sin())
}

/// How the tessellator turns the input vertices into fill triangles
#[derive(Clone, Debug, PartialEq)]
pub enum FillLayout {
    Points,
    Lines,
    Triangles,
    /// Triangles from an explicit index list into the input vertices
    IndexedTriangles(Vec<u32>),
    TriangleFan,
    TriangleStrip,
    Quads,
    QuadStrip,
    Polygon {
        solid: bool,
        closed: bool,
        calc_normals: bool,
    },
    /// Nothing to draw, the kind is not valid for the family
    Unsupported,
}

/// Vertex codes of a path; `Break` starts a new contour
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathData {
    pub coords: Vec<[f32; 3]>,
    pub codes: Vec<VertexCode>,
    pub closed: bool,
}

/// Whether fill and stroke are enabled when geometry gets generated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paint {
    pub fill: bool,
    pub stroke: bool,
}

fn put(input: &mut InputGeometry, p: Vec3, uv: [f32; 2]) -> Result<usize> {
    input.reserve(1)?;
    input.add_vertex(p, uv, VertexCode::Vertex)
}

fn xy(x: f32, y: f32) -> Vec3 {
    Vec3::new(x, y, 0.0)
}

/// Parameters padded with zeros when the count is not one of `accepted`
fn checked_params(kind: ShapeKind, params: &[f32], accepted: &[usize]) -> Vec<f32> {
    if accepted.contains(&params.len()) {
        params.to_vec()
    } else {
        log::warn!(
            "{kind:?} takes {accepted:?} parameters, got {}; using zeros",
            params.len()
        );
        vec![0.0; accepted[0]]
    }
}

/// Regenerate the input geometry of a primitive from its parameters
pub fn generate_primitive(
    kind: ShapeKind,
    params: &[f32],
    state: &DrawingState,
    paint: Paint,
    input: &mut InputGeometry,
) -> Result<FillLayout> {
    input.clear();

    let layout = match kind {
        ShapeKind::Point => {
            let p = checked_params(kind, params, &[2, 3]);
            let z = p.get(2).copied().unwrap_or(0.0);
            put(input, Vec3::new(p[0], p[1], z), [0.0, 0.0])?;
            FillLayout::Points
        }
        ShapeKind::Line => {
            let p = checked_params(kind, params, &[4, 6]);
            let (a, b) = if p.len() == 6 {
                (Vec3::new(p[0], p[1], p[2]), Vec3::new(p[3], p[4], p[5]))
            } else {
                (xy(p[0], p[1]), xy(p[2], p[3]))
            };
            put(input, a, [0.0, 0.0])?;
            put(input, b, [0.0, 0.0])?;
            FillLayout::Lines
        }
        ShapeKind::Triangle => {
            let p = checked_params(kind, params, &[6]);
            for k in 0..3 {
                put(input, xy(p[2 * k], p[2 * k + 1]), [0.0, 0.0])?;
            }
            if paint.stroke {
                input.add_triangles_edges();
            }
            FillLayout::Triangles
        }
        ShapeKind::Quad => {
            let p = checked_params(kind, params, &[8]);
            add_quad(
                input,
                [
                    xy(p[0], p[1]),
                    xy(p[2], p[3]),
                    xy(p[4], p[5]),
                    xy(p[6], p[7]),
                ],
                paint,
            )?;
            FillLayout::Quads
        }
        ShapeKind::Rect => {
            let p = checked_params(kind, params, &[4, 5, 8]);
            let (a, b, c, d) = rect_corners(p[0], p[1], p[2], p[3], state.rect_mode);
            match p.len() {
                5 => add_rounded_rect(input, (a, b, c, d), [p[4]; 4], state, paint)?,
                8 => add_rounded_rect(input, (a, b, c, d), [p[4], p[5], p[6], p[7]], state, paint)?,
                _ => {
                    add_quad(input, [xy(a, b), xy(c, b), xy(c, d), xy(a, d)], paint)?;
                    return Ok(FillLayout::Quads);
                }
            }
            FillLayout::Polygon {
                solid: false,
                closed: true,
                calc_normals: true,
            }
        }
        ShapeKind::Ellipse => {
            let p = checked_params(kind, params, &[4]);
            add_ellipse(input, p[0], p[1], p[2], p[3], state.ellipse_mode, paint)?;
            FillLayout::TriangleFan
        }
        ShapeKind::Arc => {
            let p = checked_params(kind, params, &[6]);
            add_arc(input, &p, state.ellipse_mode, paint)?;
            FillLayout::TriangleFan
        }
        ShapeKind::Box => {
            let p = checked_params(kind, params, &[1, 3]);
            let size = if p.len() == 3 {
                Vec3::new(p[0], p[1], p[2])
            } else {
                Vec3::splat(p[0])
            };
            add_box(input, size, paint)?;
            FillLayout::Quads
        }
        ShapeKind::Sphere => {
            let p = checked_params(kind, params, &[1]);
            let indices = add_sphere(input, p[0], state.sphere_detail_u, state.sphere_detail_v)?;
            if !paint.stroke {
                input.clear_edges();
            }
            FillLayout::IndexedTriangles(indices)
        }
        other => {
            log::warn!("{other:?} is not a primitive kind");
            FillLayout::Unsupported
        }
    };
    Ok(layout)
}

/// Synthesize stroke edges and automatic normals for authored geometry
pub fn prepare_geometry(
    kind: ShapeKind,
    input: &mut InputGeometry,
    paint: Paint,
    normal_mode: NormalMode,
    solid: bool,
    closed: bool,
) -> FillLayout {
    input.clear_edges();
    let auto = normal_mode == NormalMode::Auto;

    match kind {
        ShapeKind::Points | ShapeKind::Point => FillLayout::Points,
        ShapeKind::Lines | ShapeKind::Line => FillLayout::Lines,
        ShapeKind::Triangles | ShapeKind::Triangle => {
            if paint.stroke {
                input.add_triangles_edges();
            }
            if auto {
                input.calc_triangles_normals();
            }
            FillLayout::Triangles
        }
        ShapeKind::TriangleFan => {
            if paint.stroke {
                input.add_triangle_fan_edges();
            }
            if auto {
                input.calc_triangle_fan_normals();
            }
            FillLayout::TriangleFan
        }
        ShapeKind::TriangleStrip => {
            if paint.stroke {
                input.add_triangle_strip_edges();
            }
            if auto {
                input.calc_triangle_strip_normals();
            }
            FillLayout::TriangleStrip
        }
        ShapeKind::Quads | ShapeKind::Quad => {
            if paint.stroke {
                input.add_quads_edges();
            }
            if auto {
                input.calc_quads_normals();
            }
            FillLayout::Quads
        }
        ShapeKind::QuadStrip => {
            if paint.stroke {
                input.add_quad_strip_edges();
            }
            if auto {
                input.calc_quad_strip_normals();
            }
            FillLayout::QuadStrip
        }
        ShapeKind::Polygon => {
            if paint.stroke {
                input.add_polygon_edges(closed);
            }
            FillLayout::Polygon {
                solid,
                closed,
                calc_normals: auto,
            }
        }
        other => {
            log::warn!("{other:?} cannot be authored vertex by vertex");
            FillLayout::Unsupported
        }
    }
}

/// Rebuild the input geometry of a path shape
pub fn generate_path(
    path: &PathData,
    state: &DrawingState,
    paint: Paint,
    input: &mut InputGeometry,
) -> Result<FillLayout> {
    input.clear();
    let bezier = CurveStepper::bezier(state.bezier_detail);
    let curve = CurveStepper::catmull_rom(state.curve_detail, state.curve_tightness);
    let coord = |i: usize| path.coords.get(i).map(|c| Vec3::from_array(*c));

    if path.codes.is_empty() {
        input.reserve(path.coords.len())?;
        for c in &path.coords {
            input.add_vertex(Vec3::from_array(*c), [0.0, 0.0], VertexCode::Vertex)?;
        }
    } else {
        let mut index = 0;
        let mut code = VertexCode::Vertex;
        for &kind in &path.codes {
            match kind {
                VertexCode::Vertex => {
                    let Some(p) = coord(index) else { break };
                    input.reserve(1)?;
                    input.add_vertex(p, [0.0, 0.0], code)?;
                    index += 1;
                }
                VertexCode::QuadBezierVertex => {
                    let (Some(c), Some(p)) = (coord(index), coord(index + 1)) else {
                        break;
                    };
                    input.add_quadratic_vertex(c, p, &bezier, code)?;
                    index += 2;
                }
                VertexCode::BezierVertex => {
                    let (Some(c1), Some(c2), Some(p)) =
                        (coord(index), coord(index + 1), coord(index + 2))
                    else {
                        break;
                    };
                    input.add_bezier_vertex(c1, c2, p, &bezier, code)?;
                    index += 3;
                }
                VertexCode::CurveVertex => {
                    let Some(p) = coord(index) else { break };
                    input.add_curve_vertex(p, &curve, code)?;
                    index += 1;
                }
                VertexCode::Break => {
                    if !input.is_empty() {
                        code = VertexCode::Break;
                    }
                    continue;
                }
            }
            code = VertexCode::Vertex;
        }
        if index < path.coords.len() {
            log::warn!(
                "path codes consumed {index} of {} coordinates",
                path.coords.len()
            );
        }
    }

    if paint.stroke {
        input.add_polygon_edges(path.closed);
    }
    Ok(FillLayout::Polygon {
        solid: false,
        closed: path.closed,
        calc_normals: true,
    })
}

fn add_quad(input: &mut InputGeometry, corners: [Vec3; 4], paint: Paint) -> Result<()> {
    const UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    input.reserve(4)?;
    for (p, uv) in corners.into_iter().zip(UVS) {
        input.add_vertex(p, uv, VertexCode::Vertex)?;
    }
    if paint.stroke {
        input.add_quads_edges();
    }
    Ok(())
}

/// Normalize rect parameters to (left, top, right, bottom)
fn rect_corners(a: f32, b: f32, c: f32, d: f32, mode: RectMode) -> (f32, f32, f32, f32) {
    let (mut a, mut b, mut c, mut d) = match mode {
        RectMode::Corners => (a, b, c, d),
        RectMode::Corner => (a, b, a + c, b + d),
        RectMode::Radius => (a - c, b - d, a + c, b + d),
        RectMode::Center => (a - c / 2.0, b - d / 2.0, a + c / 2.0, b + d / 2.0),
    };
    if a > c {
        std::mem::swap(&mut a, &mut c);
    }
    if b > d {
        std::mem::swap(&mut b, &mut d);
    }
    (a, b, c, d)
}

/// Radii are top-left, top-right, bottom-right, bottom-left
fn add_rounded_rect(
    input: &mut InputGeometry,
    (a, b, c, d): (f32, f32, f32, f32),
    radii: [f32; 4],
    state: &DrawingState,
    paint: Paint,
) -> Result<()> {
    let max_rounding = ((c - a) / 2.0).min((d - b) / 2.0);
    let [tl, tr, br, bl] = radii.map(|r| r.min(max_rounding));
    let stepper = CurveStepper::bezier(state.bezier_detail);

    let corner = |input: &mut InputGeometry, r: f32, start: Vec3, control: Vec3, end: Vec3| {
        if r != 0.0 {
            put(input, start, [0.0, 0.0])?;
            input.add_quadratic_vertex(control, end, &stepper, VertexCode::Vertex)
        } else {
            put(input, control, [0.0, 0.0]).map(|_| ())
        }
    };

    corner(input, tr, xy(c - tr, b), xy(c, b), xy(c, b + tr))?;
    corner(input, br, xy(c, d - br), xy(c, d), xy(c - br, d))?;
    corner(input, bl, xy(a + bl, d), xy(a, d), xy(a, d - bl))?;
    corner(input, tl, xy(a, b + tl), xy(a, b), xy(a + tl, b))?;

    if paint.stroke {
        input.add_polygon_edges(true);
    }
    Ok(())
}

/// Perimeter resolution for an ellipse spanning `diagonal`
pub fn ellipse_accuracy(diagonal: f32) -> usize {
    ((TAU * diagonal / 20.0) as usize).max(MIN_ACCURACY)
}

fn ellipse_bounds(a: f32, b: f32, c: f32, d: f32, mode: EllipseMode) -> (f32, f32, f32, f32) {
    match mode {
        EllipseMode::Corner => (a, b, c, d),
        EllipseMode::Corners => (a, b, c - a, d - b),
        EllipseMode::Radius => (a - c, b - d, c * 2.0, d * 2.0),
        EllipseMode::Center => (a - c / 2.0, b - d / 2.0, c, d),
    }
}

fn add_ellipse(
    input: &mut InputGeometry,
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    mode: EllipseMode,
    paint: Paint,
) -> Result<()> {
    let (mut x, mut y, mut w, mut h) = ellipse_bounds(a, b, c, d, mode);
    if w < 0.0 {
        x += w;
        w = -w;
    }
    if h < 0.0 {
        y += h;
        h = -h;
    }

    let rh = w / 2.0;
    let rv = h / 2.0;
    let center = xy(x + rh, y + rv);
    let accuracy = ellipse_accuracy(Vec3::new(w, h, 0.0).length());
    let inc = SINCOS_LENGTH as f32 / accuracy as f32;

    input.reserve(accuracy + 2)?;
    if paint.fill {
        input.add_vertex(center, [0.0, 0.0], VertexCode::Vertex)?;
    }

    let mut first = 0;
    let mut prev = 0;
    let mut val = 0.0f32;
    for i in 0..accuracy {
        let (cos, sin) = cos_sin(val as usize);
        let idx = input.add_vertex(center + xy(cos * rh, sin * rv), [0.0, 0.0], VertexCode::Vertex)?;
        val = (val + inc) % SINCOS_LENGTH as f32;

        if i == 0 {
            first = idx;
        } else if paint.stroke {
            input.add_edge(prev, idx, i == 1, false);
        }
        prev = idx;
    }

    // Close the fan on the first perimeter point
    input.add_vertex(center + xy(rh, 0.0), [0.0, 0.0], VertexCode::Vertex)?;
    if paint.stroke {
        input.add_edge(prev, first, false, true);
    }
    Ok(())
}

fn add_arc(input: &mut InputGeometry, p: &[f32], mode: EllipseMode, paint: Paint) -> Result<()> {
    let (x, y, w, h) = ellipse_bounds(p[0], p[1], p[2], p[3], mode);
    let (mut start, mut stop) = (p[4], p[5]);

    if !start.is_finite() || !stop.is_finite() || stop < start {
        return Ok(());
    }
    while start < 0.0 {
        start += TAU;
        stop += TAU;
    }
    if stop - start > TAU {
        start = 0.0;
        stop = TAU;
    }

    let rh = w / 2.0;
    let rv = h / 2.0;
    let center = xy(x + rh, y + rv);

    let start_lut = (0.5 + (start / TAU) * SINCOS_LENGTH as f32) as usize;
    let stop_lut = (0.5 + (stop / TAU) * SINCOS_LENGTH as f32) as usize;

    input.reserve(stop_lut.saturating_sub(start_lut) + 2)?;
    if paint.fill {
        input.add_vertex(center, [0.0, 0.0], VertexCode::Vertex)?;
    }

    let mut prev = None;
    for i in start_lut..stop_lut {
        let (cos, sin) = cos_sin(i);
        let idx = input.add_vertex(center + xy(cos * rh, sin * rv), [0.0, 0.0], VertexCode::Vertex)?;
        if let (Some(p), true) = (prev, paint.stroke) {
            input.add_edge(p, idx, i == start_lut + 1, false);
        }
        prev = Some(idx);
    }

    // The end point is placed exactly, not rounded to the table
    let (cos, sin) = cos_sin(stop_lut);
    let idx = input.add_vertex(center + xy(cos * rh, sin * rv), [0.0, 0.0], VertexCode::Vertex)?;
    if let (Some(p), true) = (prev, paint.stroke) {
        input.add_edge(p, idx, false, true);
    }
    Ok(())
}

fn add_box(input: &mut InputGeometry, size: Vec3, paint: Paint) -> Result<()> {
    let half = size / 2.0;
    let (x2, y2, z2) = (half.x, half.y, half.z);
    let (x1, y1, z1) = (-x2, -y2, -z2);

    let faces: [(Vec3, [Vec3; 4]); 6] = [
        // front
        (
            Vec3::Z,
            [
                Vec3::new(x1, y1, z1),
                Vec3::new(x2, y1, z1),
                Vec3::new(x2, y2, z1),
                Vec3::new(x1, y2, z1),
            ],
        ),
        // right
        (
            Vec3::X,
            [
                Vec3::new(x2, y1, z1),
                Vec3::new(x2, y1, z2),
                Vec3::new(x2, y2, z2),
                Vec3::new(x2, y2, z1),
            ],
        ),
        // back
        (
            Vec3::NEG_Z,
            [
                Vec3::new(x2, y1, z2),
                Vec3::new(x1, y1, z2),
                Vec3::new(x1, y2, z2),
                Vec3::new(x2, y2, z2),
            ],
        ),
        // left
        (
            Vec3::NEG_X,
            [
                Vec3::new(x1, y1, z2),
                Vec3::new(x1, y1, z1),
                Vec3::new(x1, y2, z1),
                Vec3::new(x1, y2, z2),
            ],
        ),
        // top
        (
            Vec3::Y,
            [
                Vec3::new(x1, y1, z2),
                Vec3::new(x2, y1, z2),
                Vec3::new(x2, y1, z1),
                Vec3::new(x1, y1, z1),
            ],
        ),
        // bottom
        (
            Vec3::NEG_Y,
            [
                Vec3::new(x1, y2, z1),
                Vec3::new(x2, y2, z1),
                Vec3::new(x2, y2, z2),
                Vec3::new(x1, y2, z2),
            ],
        ),
    ];

    input.reserve(24)?;
    for (normal, corners) in faces {
        input.set_normal(normal);
        for (p, uv) in corners
            .into_iter()
            .zip([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
        {
            input.add_vertex(p, uv, VertexCode::Vertex)?;
        }
    }

    if paint.stroke {
        // Front and back outlines plus the four connecting edges
        input.add_edge(0, 1, true, false);
        input.add_edge(1, 2, false, false);
        input.add_edge(2, 3, false, false);
        input.add_edge(3, 0, false, false);

        input.add_edge(0, 9, false, false);
        input.add_edge(1, 8, false, false);
        input.add_edge(2, 11, false, false);
        input.add_edge(3, 10, false, false);

        input.add_edge(8, 9, false, false);
        input.add_edge(9, 10, false, false);
        input.add_edge(10, 11, false, false);
        input.add_edge(11, 8, false, true);
    }
    Ok(())
}

/// Unit sphere rings from the south pole up, `u` points per ring
fn sphere_rings(u: usize, v: usize) -> Vec<Vec3> {
    let delta = SINCOS_LENGTH as f32 / u as f32;
    let circle: Vec<(f32, f32)> = (0..u).map(|i| cos_sin((i as f32 * delta) as usize)).collect();

    let step = SINCOS_LENGTH as f32 * 0.5 / v as f32;
    let mut angle = step;
    let mut rings = Vec::with_capacity(u * (v - 1));
    for _ in 1..v {
        let (y, radius) = cos_sin(angle as usize);
        for &(cx, cz) in &circle {
            rings.push(Vec3::new(cx * radius, y, cz * radius));
        }
        angle += step;
    }
    rings
}

/// Emit the sphere vertices and return its triangle list.
///
/// The poles are duplicated once per column, and every ring repeats its first
/// vertex at the end, so texture coordinates wrap without seams.
fn add_sphere(
    input: &mut InputGeometry,
    r: f32,
    detail_u: u32,
    detail_v: u32,
) -> Result<Vec<u32>> {
    let (nu, nv) = if detail_u < 3 || detail_v < 2 {
        (DEFAULT_SPHERE_DETAIL as usize, DEFAULT_SPHERE_DETAIL as usize)
    } else {
        (detail_u as usize, detail_v as usize)
    };
    let rings = sphere_rings(nu, nv);

    let vertex_total = 2 * nu + (nv - 1) * (nu + 1);
    input.reserve(vertex_total)?;

    let du = 1.0 / nu as f32;
    let dv = 1.0 / nv as f32;
    let mut indices = Vec::with_capacity(3 * nu + (6 * nu + 3) * (nv - 2) + 3 * nu);

    let ring = |input: &mut InputGeometry, offset: usize, v: f32| -> Result<()> {
        let mut u = 1.0;
        for i in 0..nu {
            let n = rings[offset + i];
            input.set_normal(n);
            input.add_vertex(n * r, [u, v], VertexCode::Vertex)?;
            u -= du;
        }
        let n = rings[offset];
        input.set_normal(n);
        input.add_vertex(n * r, [u, v], VertexCode::Vertex)?;
        Ok(())
    };

    // South cap
    let mut u = 1.0;
    for _ in 0..nu {
        input.set_normal(Vec3::Y);
        input.add_vertex(Vec3::new(0.0, r, 0.0), [u, 1.0], VertexCode::Vertex)?;
        u -= du;
    }
    let mut v = 1.0 - dv;
    let mut vert0 = nu;
    ring(input, 0, v)?;
    for i in 0..nu {
        let i1 = vert0 + i;
        let i0 = i1 - nu;
        indices.extend([i1, i0, i1 + 1].map(|k| k as u32));
        input.add_edge(i0, i1, i == 0, false);
        input.add_edge(i1, i1 + 1, false, false);
    }

    // Middle rings
    let mut count = 2 * nu + 1;
    for j in 2..nv {
        let offset = (j - 1) * nu;
        vert0 = count;
        v -= dv;
        ring(input, offset, v)?;
        count += nu + 1;
        let vert1 = vert0 + nu;

        for i in 0..nu {
            let i1 = vert0 + i;
            let i0 = i1 - nu - 1;
            indices.extend([i1, i0, i0 + 1, i1, i0 + 1, i1 + 1].map(|k| k as u32));
            input.add_edge(i0, i1, false, false);
            input.add_edge(i1, i1 + 1, false, false);
            input.add_edge(i0 + 1, i1, false, false);
        }
        indices.extend([vert1, vert1 - nu, vert1 - 1].map(|k| k as u32));
        input.add_edge(vert1 - nu, vert1 - 1, false, false);
        input.add_edge(vert1 - 1, vert1, false, false);
    }

    // North cap
    let mut u = 1.0;
    for _ in 0..nu {
        input.set_normal(Vec3::NEG_Y);
        input.add_vertex(Vec3::new(0.0, -r, 0.0), [u, 0.0], VertexCode::Vertex)?;
        u -= du;
    }
    for i in 0..nu {
        let i0 = vert0 + i;
        let i1 = i0 + nu + 1;
        indices.extend([i0, i1, i0 + 1].map(|k| k as u32));
        input.add_edge(i0, i0 + 1, false, false);
        input.add_edge(i0, i1, false, i == nu - 1);
    }

    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: Paint = Paint {
        fill: true,
        stroke: true,
    };
    const FILL_ONLY: Paint = Paint {
        fill: true,
        stroke: false,
    };

    fn input() -> InputGeometry {
        InputGeometry::new(16, 1 << 16)
    }

    #[test]
    fn test_rect_corner_mode() {
        let mut input = input();
        let layout = generate_primitive(
            ShapeKind::Rect,
            &[10.0, 20.0, 30.0, 40.0],
            &DrawingState::default(),
            FILL_ONLY,
            &mut input,
        )
        .unwrap();
        assert_eq!(layout, FillLayout::Quads);
        let positions: Vec<_> = input.vertices().iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            vec![
                [10.0, 20.0, 0.0],
                [40.0, 20.0, 0.0],
                [40.0, 60.0, 0.0],
                [10.0, 60.0, 0.0]
            ]
        );
        assert_eq!(input.vertices()[2].uv, [1.0, 1.0]);
        assert!(input.edges().is_empty());
    }

    #[test]
    fn test_rect_center_mode_and_swap() {
        assert_eq!(
            rect_corners(0.0, 0.0, 10.0, 4.0, RectMode::Center),
            (-5.0, -2.0, 5.0, 2.0)
        );
        assert_eq!(
            rect_corners(10.0, 10.0, 0.0, 0.0, RectMode::Corners),
            (0.0, 0.0, 10.0, 10.0)
        );
    }

    #[test]
    fn test_rounded_rect_is_polygon() {
        let mut input = input();
        let state = DrawingState {
            bezier_detail: 4,
            ..Default::default()
        };
        let layout = generate_primitive(
            ShapeKind::Rect,
            &[0.0, 0.0, 100.0, 50.0, 10.0],
            &state,
            BOTH,
            &mut input,
        )
        .unwrap();
        assert!(matches!(layout, FillLayout::Polygon { closed: true, .. }));
        // Each corner: start point plus the flattened curve
        assert_eq!(input.len(), 4 * (1 + 4));
        assert_eq!(input.edges().len(), input.len());
    }

    #[test]
    fn test_rounding_is_clamped() {
        let mut input = input();
        let state = DrawingState {
            bezier_detail: 2,
            ..Default::default()
        };
        generate_primitive(
            ShapeKind::Rect,
            &[0.0, 0.0, 10.0, 10.0, 100.0],
            &state,
            FILL_ONLY,
            &mut input,
        )
        .unwrap();
        for v in input.vertices() {
            assert!(v.position[0] >= 0.0 && v.position[0] <= 10.0);
            assert!(v.position[1] >= 0.0 && v.position[1] <= 10.0);
        }
    }

    #[test]
    fn test_ellipse_vertex_count() {
        let mut input = input();
        // Small ellipse hits the minimum accuracy
        generate_primitive(
            ShapeKind::Ellipse,
            &[0.0, 0.0, 4.0, 4.0],
            &DrawingState::default(),
            BOTH,
            &mut input,
        )
        .unwrap();
        assert_eq!(input.len(), 1 + MIN_ACCURACY + 1);
        assert_eq!(input.edges().len(), MIN_ACCURACY);
        assert_eq!(input.vertices()[0].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ellipse_accuracy_grows_with_size() {
        assert_eq!(ellipse_accuracy(1.0), MIN_ACCURACY);
        assert_eq!(ellipse_accuracy(200.0), (TAU * 10.0) as usize);
    }

    #[test]
    fn test_arc_half_circle() {
        let mut input = input();
        generate_primitive(
            ShapeKind::Arc,
            &[0.0, 0.0, 2.0, 2.0, 0.0, std::f32::consts::PI],
            &DrawingState::default(),
            FILL_ONLY,
            &mut input,
        )
        .unwrap();
        // Center, 360 half-degree steps and the exact end point
        assert_eq!(input.len(), 1 + 360 + 1);
        let last = input.vertices().last().unwrap().position;
        assert!((last[0] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_arc_rejects_reversed_angles() {
        let mut input = input();
        generate_primitive(
            ShapeKind::Arc,
            &[0.0, 0.0, 2.0, 2.0, 1.0, 0.5],
            &DrawingState::default(),
            BOTH,
            &mut input,
        )
        .unwrap();
        assert!(input.is_empty());
    }

    #[test]
    fn test_box_faces() {
        let mut input = input();
        let layout = generate_primitive(
            ShapeKind::Box,
            &[2.0],
            &DrawingState::default(),
            BOTH,
            &mut input,
        )
        .unwrap();
        assert_eq!(layout, FillLayout::Quads);
        assert_eq!(input.len(), 24);
        assert_eq!(input.edges().len(), 12);
        assert_eq!(input.vertices()[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(input.vertices()[4].normal, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sphere_index_count() {
        let mut input = input();
        let state = DrawingState {
            sphere_detail_u: 8,
            sphere_detail_v: 6,
            ..Default::default()
        };
        let layout =
            generate_primitive(ShapeKind::Sphere, &[1.0], &state, FILL_ONLY, &mut input).unwrap();
        let FillLayout::IndexedTriangles(indices) = layout else {
            panic!("sphere should use an index list");
        };
        assert_eq!(indices.len(), 3 * 8 + (6 * 8 + 3) * 4 + 3 * 8);
        assert_eq!(input.len(), 2 * 8 + 5 * 9);
        assert!(indices.iter().all(|&i| (i as usize) < input.len()));
        assert!(input.edges().is_empty());
    }

    #[test]
    fn test_sphere_falls_back_to_default_detail() {
        let mut input = InputGeometry::new(16, 1 << 20);
        let state = DrawingState {
            sphere_detail_u: 2,
            sphere_detail_v: 1,
            ..Default::default()
        };
        generate_primitive(ShapeKind::Sphere, &[1.0], &state, FILL_ONLY, &mut input).unwrap();
        assert_eq!(input.len(), 2 * 30 + 29 * 31);
    }

    #[test]
    fn test_wrong_param_count_gives_degenerate_geometry() {
        let mut input = input();
        generate_primitive(
            ShapeKind::Triangle,
            &[1.0, 2.0],
            &DrawingState::default(),
            FILL_ONLY,
            &mut input,
        )
        .unwrap();
        assert_eq!(input.len(), 3);
        assert!(input.vertices().iter().all(|v| v.position == [0.0; 3]));
    }

    #[test]
    fn test_geometry_kind_is_not_a_primitive() {
        let mut input = input();
        let layout = generate_primitive(
            ShapeKind::QuadStrip,
            &[],
            &DrawingState::default(),
            BOTH,
            &mut input,
        )
        .unwrap();
        assert_eq!(layout, FillLayout::Unsupported);
    }

    #[test]
    fn test_path_with_break_and_bezier() {
        let mut input = input();
        let path = PathData {
            coords: vec![
                [0.0, 0.0, 0.0],
                [10.0, 0.0, 0.0],
                [10.0, 10.0, 0.0],
                [12.0, 0.0, 0.0],
                [12.0, 10.0, 0.0],
                [2.0, 10.0, 0.0],
                [2.0, 2.0, 0.0],
                [4.0, 2.0, 0.0],
                [4.0, 4.0, 0.0],
            ],
            codes: vec![
                VertexCode::Vertex,
                VertexCode::Vertex,
                VertexCode::BezierVertex,
                VertexCode::Vertex,
                VertexCode::Break,
                VertexCode::Vertex,
                VertexCode::Vertex,
                VertexCode::Vertex,
            ],
            closed: true,
        };
        let state = DrawingState {
            bezier_detail: 5,
            ..Default::default()
        };
        let layout = generate_path(&path, &state, BOTH, &mut input).unwrap();
        assert!(matches!(layout, FillLayout::Polygon { solid: false, .. }));
        // 2 + 5 flattened + 1, then a 3-vertex contour
        assert_eq!(input.len(), 2 + 5 + 1 + 3);
        assert!(input.vertices()[8].is_break());
        assert!(input.edges().iter().any(|e| e.a == 10 && e.b == 8));
    }
}
