//! Forward-difference flattening of bezier and Catmull-Rom segments.
//!
//! Curves are turned into plain polyline vertices at append time, so the
//! tessellator never sees a curve.

use glam::{Mat4, Vec3, Vec4};

/// Build a matrix from rows written the way they read on paper
fn from_rows(rows: [[f32; 4]; 4]) -> Mat4 {
    Mat4::from_cols_array_2d(&rows).transpose()
}

fn bezier_basis() -> Mat4 {
    from_rows([
        [-1.0, 3.0, -3.0, 1.0],
        [3.0, -6.0, 3.0, 0.0],
        [-3.0, 3.0, 0.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
    ])
}

fn curve_basis(tightness: f32) -> Mat4 {
    let s = tightness;
    from_rows([
        [(s - 1.0) / 2.0, (s + 3.0) / 2.0, (-3.0 - s) / 2.0, (1.0 - s) / 2.0],
        [1.0 - s, (-5.0 - s) / 2.0, s + 2.0, (s - 1.0) / 2.0],
        [(s - 1.0) / 2.0, 0.0, (1.0 - s) / 2.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
    ])
}

/// Forward-difference step matrix for `detail` segments
fn forward_step(detail: u32) -> Mat4 {
    let f = 1.0 / detail.max(1) as f32;
    let ff = f * f;
    let fff = ff * f;
    from_rows([
        [0.0, 0.0, 0.0, 1.0],
        [fff, ff, f, 0.0],
        [6.0 * fff, 2.0 * ff, 0.0, 0.0],
        [6.0 * fff, 0.0, 0.0, 0.0],
    ])
}

/// Precomputed draw matrix for one curve family at one detail level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveStepper {
    draw: Mat4,
    detail: u32,
}

impl CurveStepper {
    pub fn bezier(detail: u32) -> Self {
        let detail = detail.max(1);
        Self {
            draw: forward_step(detail) * bezier_basis(),
            detail,
        }
    }

    pub fn catmull_rom(detail: u32, tightness: f32) -> Self {
        let detail = detail.max(1);
        Self {
            draw: forward_step(detail) * curve_basis(tightness),
            detail,
        }
    }

    pub fn detail(&self) -> u32 {
        self.detail
    }

    /// Step `detail` times from the start of the segment. The start point is
    /// not emitted, so for a bezier the last emitted point is `p4`, and for
    /// Catmull-Rom it is `p3`.
    pub fn flatten(&self, p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) -> Vec<Vec3> {
        let row = |k: usize, a: f32, b: f32, c: f32, d: f32| {
            self.draw.row(k).dot(Vec4::new(a, b, c, d))
        };
        let plots = |k: usize| {
            Vec3::new(
                row(k, p1.x, p2.x, p3.x, p4.x),
                row(k, p1.y, p2.y, p3.y, p4.y),
                row(k, p1.z, p2.z, p3.z, p4.z),
            )
        };

        // Row 0 evaluates the curve at t = 0 (p1 for bezier, p2 for Catmull-Rom)
        let mut point = plots(0);
        let mut plot1 = plots(1);
        let mut plot2 = plots(2);
        let plot3 = plots(3);

        let mut out = Vec::with_capacity(self.detail as usize);
        for _ in 0..self.detail {
            point += plot1;
            plot1 += plot2;
            plot2 += plot3;
            out.push(point);
        }
        out
    }
}
