//! Per-node tessellated output: three independent vertex/index streams.

use crate::style::Lighting;

/// One of the three primitive categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Fill,
    Line,
    Point,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Fill, StreamKind::Line, StreamKind::Point];

    pub fn index(self) -> usize {
        match self {
            StreamKind::Fill => 0,
            StreamKind::Line => 1,
            StreamKind::Point => 2,
        }
    }

    pub fn attributes(self) -> &'static [Attribute] {
        match self {
            StreamKind::Fill => &[
                Attribute::FillPosition,
                Attribute::FillColor,
                Attribute::FillNormal,
                Attribute::FillTexCoord,
                Attribute::FillAmbient,
                Attribute::FillSpecular,
                Attribute::FillEmissive,
                Attribute::FillShininess,
            ],
            StreamKind::Line => &[
                Attribute::LinePosition,
                Attribute::LineColor,
                Attribute::LineDirection,
            ],
            StreamKind::Point => &[
                Attribute::PointPosition,
                Attribute::PointColor,
                Attribute::PointOffset,
            ],
        }
    }
}

/// Every per-vertex array that ends up in its own GPU buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    FillPosition,
    FillColor,
    FillNormal,
    FillTexCoord,
    FillAmbient,
    FillSpecular,
    FillEmissive,
    FillShininess,
    LinePosition,
    LineColor,
    /// xyz of the opposite end of the segment, w is the signed half width
    LineDirection,
    PointPosition,
    PointColor,
    /// Screen-space displacement from the point center
    PointOffset,
}

impl Attribute {
    pub const COUNT: usize = 14;

    pub const ALL: [Attribute; Attribute::COUNT] = [
        Attribute::FillPosition,
        Attribute::FillColor,
        Attribute::FillNormal,
        Attribute::FillTexCoord,
        Attribute::FillAmbient,
        Attribute::FillSpecular,
        Attribute::FillEmissive,
        Attribute::FillShininess,
        Attribute::LinePosition,
        Attribute::LineColor,
        Attribute::LineDirection,
        Attribute::PointPosition,
        Attribute::PointColor,
        Attribute::PointOffset,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn stream(self) -> StreamKind {
        match self {
            Attribute::FillPosition
            | Attribute::FillColor
            | Attribute::FillNormal
            | Attribute::FillTexCoord
            | Attribute::FillAmbient
            | Attribute::FillSpecular
            | Attribute::FillEmissive
            | Attribute::FillShininess => StreamKind::Fill,
            Attribute::LinePosition | Attribute::LineColor | Attribute::LineDirection => {
                StreamKind::Line
            }
            Attribute::PointPosition | Attribute::PointColor | Attribute::PointOffset => {
                StreamKind::Point
            }
        }
    }

    /// Number of f32 components per vertex
    pub fn components(self) -> usize {
        match self {
            Attribute::FillPosition
            | Attribute::FillNormal
            | Attribute::LinePosition
            | Attribute::PointPosition => 3,
            Attribute::FillColor
            | Attribute::FillAmbient
            | Attribute::FillSpecular
            | Attribute::FillEmissive
            | Attribute::LineColor
            | Attribute::LineDirection
            | Attribute::PointColor => 4,
            Attribute::FillTexCoord | Attribute::PointOffset => 2,
            Attribute::FillShininess => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Attribute::FillPosition => "fill positions",
            Attribute::FillColor => "fill colors",
            Attribute::FillNormal => "fill normals",
            Attribute::FillTexCoord => "fill texcoords",
            Attribute::FillAmbient => "fill ambient",
            Attribute::FillSpecular => "fill specular",
            Attribute::FillEmissive => "fill emissive",
            Attribute::FillShininess => "fill shininess",
            Attribute::LinePosition => "line positions",
            Attribute::LineColor => "line colors",
            Attribute::LineDirection => "line directions",
            Attribute::PointPosition => "point positions",
            Attribute::PointColor => "point colors",
            Attribute::PointOffset => "point offsets",
        }
    }
}

/// Draw range registered by a leaf and merged into its ancestors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexData {
    /// First vertex of the range inside the root buffers
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,
}

impl IndexData {
    /// Extend this range with one that immediately follows it
    pub fn try_merge(&mut self, next: &IndexData) -> bool {
        let follows_indices = self.index_offset + self.index_count == next.index_offset;
        let follows_vertices = self.first_vertex + self.vertex_count == next.first_vertex;
        if follows_indices && follows_vertices {
            self.index_count += next.index_count;
            self.vertex_count += next.vertex_count;
            true
        } else {
            false
        }
    }
}

/// Placement of a node's stream inside the root buffers.
///
/// `last_vertex` and `last_index` are inclusive and only meaningful when the
/// range is not empty; use [`StreamRange::vertices`] to read the span.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamRange {
    /// Totals for this node; sums over the subtree for groups
    pub vertex_count: usize,
    pub index_count: usize,
    pub first_vertex: usize,
    pub last_vertex: usize,
    pub first_index: usize,
    pub last_index: usize,
    pub index_data: Vec<IndexData>,
}

impl StreamRange {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0 || self.index_count == 0
    }

    /// Inclusive vertex range, `None` when empty
    pub fn vertices(&self) -> Option<std::ops::RangeInclusive<usize>> {
        (!self.is_empty()).then(|| self.first_vertex..=self.last_vertex)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FillStream {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub ambient: Vec<[f32; 4]>,
    pub specular: Vec<[f32; 4]>,
    pub emissive: Vec<[f32; 4]>,
    pub shininess: Vec<f32>,
    /// Local indices, rebased when uploaded
    pub indices: Vec<u32>,
}

impl FillStream {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn push(
        &mut self,
        position: [f32; 3],
        color: [f32; 4],
        normal: [f32; 3],
        uv: [f32; 2],
        lighting: &Lighting,
    ) {
        self.positions.push(position);
        self.colors.push(color);
        self.normals.push(normal);
        self.texcoords.push(uv);
        self.ambient.push(lighting.ambient.to_array());
        self.specular.push(lighting.specular.to_array());
        self.emissive.push(lighting.emissive.to_array());
        self.shininess.push(lighting.shininess);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineStream {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub directions: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
}

impl LineStream {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointStream {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub offsets: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl PointStream {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// Tessellated output of one leaf plus its placement in the root buffers.
/// Groups only use the ranges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TessGeometry {
    pub fill: FillStream,
    pub line: LineStream,
    pub point: PointStream,
    pub ranges: [StreamRange; 3],
}

impl TessGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.fill = FillStream::default();
        self.line = LineStream::default();
        self.point = PointStream::default();
    }

    pub fn range(&self, stream: StreamKind) -> &StreamRange {
        &self.ranges[stream.index()]
    }

    pub fn range_mut(&mut self, stream: StreamKind) -> &mut StreamRange {
        &mut self.ranges[stream.index()]
    }

    pub fn vertex_count(&self, stream: StreamKind) -> usize {
        match stream {
            StreamKind::Fill => self.fill.vertex_count(),
            StreamKind::Line => self.line.vertex_count(),
            StreamKind::Point => self.point.vertex_count(),
        }
    }

    pub fn indices(&self, stream: StreamKind) -> &[u32] {
        match stream {
            StreamKind::Fill => &self.fill.indices,
            StreamKind::Line => &self.line.indices,
            StreamKind::Point => &self.point.indices,
        }
    }

    pub fn index_count(&self, stream: StreamKind) -> usize {
        self.indices(stream).len()
    }

    /// Raw components of one attribute
    pub fn attribute(&self, attribute: Attribute) -> &[f32] {
        match attribute {
            Attribute::FillPosition => bytemuck::cast_slice(&self.fill.positions),
            Attribute::FillColor => bytemuck::cast_slice(&self.fill.colors),
            Attribute::FillNormal => bytemuck::cast_slice(&self.fill.normals),
            Attribute::FillTexCoord => bytemuck::cast_slice(&self.fill.texcoords),
            Attribute::FillAmbient => bytemuck::cast_slice(&self.fill.ambient),
            Attribute::FillSpecular => bytemuck::cast_slice(&self.fill.specular),
            Attribute::FillEmissive => bytemuck::cast_slice(&self.fill.emissive),
            Attribute::FillShininess => &self.fill.shininess,
            Attribute::LinePosition => bytemuck::cast_slice(&self.line.positions),
            Attribute::LineColor => bytemuck::cast_slice(&self.line.colors),
            Attribute::LineDirection => bytemuck::cast_slice(&self.line.directions),
            Attribute::PointPosition => bytemuck::cast_slice(&self.point.positions),
            Attribute::PointColor => bytemuck::cast_slice(&self.point.colors),
            Attribute::PointOffset => bytemuck::cast_slice(&self.point.offsets),
        }
    }

    pub fn fill_colors(&mut self, color: [f32; 4]) {
        self.fill.colors.fill(color);
    }

    /// Copy one lighting attribute of `lighting` onto every fill vertex
    pub fn fill_lighting(&mut self, attribute: Attribute, lighting: &Lighting) {
        match attribute {
            Attribute::FillAmbient => self.fill.ambient.fill(lighting.ambient.to_array()),
            Attribute::FillSpecular => self.fill.specular.fill(lighting.specular.to_array()),
            Attribute::FillEmissive => self.fill.emissive.fill(lighting.emissive.to_array()),
            Attribute::FillShininess => self.fill.shininess.fill(lighting.shininess),
            other => log::warn!("{} is not a lighting attribute", other.label()),
        }
    }

    pub fn line_colors(&mut self, color: [f32; 4]) {
        self.line.colors.fill(color);
    }

    pub fn point_colors(&mut self, color: [f32; 4]) {
        self.point.colors.fill(color);
    }

    /// Scale stroke widths in place without re-tessellating
    pub fn scale_stroke(&mut self, factor: f32) {
        for d in &mut self.line.directions {
            d[3] *= factor;
        }
        for o in &mut self.point.offsets {
            o[0] *= factor;
            o[1] *= factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn test_attribute_streams_and_components() {
        for stream in StreamKind::ALL {
            for attribute in stream.attributes() {
                assert_eq!(attribute.stream(), stream);
            }
        }
        let total: usize = Attribute::ALL.iter().map(|a| a.components()).sum();
        assert_eq!(total, 3 + 4 + 3 + 2 + 4 + 4 + 4 + 1 + 3 + 4 + 4 + 3 + 4 + 2);
        for (i, attribute) in Attribute::ALL.iter().enumerate() {
            assert_eq!(attribute.index(), i);
        }
    }

    #[test]
    fn test_attribute_views_are_flat() {
        let mut tess = TessGeometry::new();
        tess.fill.push(
            [1.0, 2.0, 3.0],
            [0.1, 0.2, 0.3, 0.4],
            [0.0, 0.0, 1.0],
            [0.5, 0.5],
            &Lighting::default(),
        );
        assert_eq!(tess.attribute(Attribute::FillPosition), &[1.0, 2.0, 3.0]);
        assert_eq!(tess.attribute(Attribute::FillColor).len(), 4);
        assert_eq!(tess.attribute(Attribute::FillTexCoord), &[0.5, 0.5]);
        assert_eq!(tess.attribute(Attribute::FillShininess), &[1.0]);
        assert_eq!(tess.attribute(Attribute::FillEmissive), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_fill_lighting_touches_one_array() {
        let mut tess = TessGeometry::new();
        let lighting = Lighting::default();
        for _ in 0..3 {
            tess.fill.push([0.0; 3], [1.0; 4], [0.0, 0.0, 1.0], [0.0; 2], &lighting);
        }
        let shiny = Lighting {
            shininess: 16.0,
            specular: Color::WHITE,
            ..lighting
        };
        tess.fill_lighting(Attribute::FillShininess, &shiny);
        assert_eq!(tess.fill.shininess, vec![16.0; 3]);
        assert_eq!(tess.fill.specular, vec![lighting.specular.to_array(); 3]);
    }

    #[test]
    fn test_empty_range_has_no_vertices() {
        let mut range = StreamRange {
            vertex_count: 4,
            index_count: 0,
            first_vertex: 8,
            last_vertex: 8,
            ..Default::default()
        };
        assert!(range.is_empty());
        assert_eq!(range.vertices(), None);

        range.index_count = 6;
        range.last_vertex = 11;
        assert_eq!(range.vertices(), Some(8..=11));
    }

    #[test]
    fn test_index_data_merge() {
        let mut a = IndexData {
            first_vertex: 0,
            vertex_count: 4,
            index_offset: 0,
            index_count: 6,
        };
        let b = IndexData {
            first_vertex: 4,
            vertex_count: 4,
            index_offset: 6,
            index_count: 6,
        };
        let gap = IndexData {
            first_vertex: 10,
            vertex_count: 4,
            index_offset: 12,
            index_count: 6,
        };
        assert!(a.try_merge(&b));
        assert_eq!(a.index_count, 12);
        assert_eq!(a.vertex_count, 8);
        assert!(!a.try_merge(&gap));
    }

    #[test]
    fn test_scale_stroke() {
        let mut tess = TessGeometry::new();
        tess.line.directions.push([1.0, 0.0, 0.0, 0.5]);
        tess.point.offsets.push([1.0, -1.0]);
        tess.scale_stroke(2.0);
        assert_eq!(tess.line.directions[0][3], 1.0);
        assert_eq!(tess.point.offsets[0], [2.0, -2.0]);
    }
}
