use shape_graph::{Attribute, StreamKind};

const fn attribute(shader_location: u32, format: wgpu::VertexFormat) -> [wgpu::VertexAttribute; 1] {
    [wgpu::VertexAttribute {
        offset: 0,
        shader_location,
        format,
    }]
}

/// Each attribute lives in its own buffer, so every layout holds a single
/// attribute at offset 0. Locations follow [`StreamKind::attributes`] order.
static ATTRIBUTES: [[wgpu::VertexAttribute; 1]; Attribute::COUNT] = [
    attribute(0, wgpu::VertexFormat::Float32x3), // fill position
    attribute(1, wgpu::VertexFormat::Float32x4), // fill color
    attribute(2, wgpu::VertexFormat::Float32x3), // fill normal
    attribute(3, wgpu::VertexFormat::Float32x2), // fill texcoord
    attribute(4, wgpu::VertexFormat::Float32x4), // fill ambient
    attribute(5, wgpu::VertexFormat::Float32x4), // fill specular
    attribute(6, wgpu::VertexFormat::Float32x4), // fill emissive
    attribute(7, wgpu::VertexFormat::Float32), // fill shininess
    attribute(0, wgpu::VertexFormat::Float32x3), // line position
    attribute(1, wgpu::VertexFormat::Float32x4), // line color
    attribute(2, wgpu::VertexFormat::Float32x4), // line direction
    attribute(0, wgpu::VertexFormat::Float32x3), // point position
    attribute(1, wgpu::VertexFormat::Float32x4), // point color
    attribute(2, wgpu::VertexFormat::Float32x2), // point offset
];

pub(crate) fn layout(attribute: Attribute) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: (attribute.components() * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES[attribute.index()],
    }
}

/// Vertex buffer layouts of a stream's pipeline, one per attribute buffer
pub(crate) fn stream_layouts(stream: StreamKind) -> Vec<wgpu::VertexBufferLayout<'static>> {
    stream.attributes().iter().map(|&a| layout(a)).collect()
}
