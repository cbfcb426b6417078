//! # shape-graph-wgpu
//!
//! WGPU rendering backend for shape-graph.
//!
//! [`ShapeRenderer`] implements [`GpuBackend`]: buffer writes go straight to
//! the queue, draw calls are queued and replayed into a render pass by
//! [`ShapeRenderer::render`].

mod texture;
mod uniform;
mod vertex;

use glam::Mat4;
use shape_graph::{
    BufferDesc, BufferHandle, BufferTarget, BufferUsage, DrawCall, GpuBackend, GpuError,
    StreamKind, TextureHandle,
};
use std::collections::HashMap;
use std::num::NonZeroU64;
use texture::TextureRegistry;
use uniform::{Globals, ModelUniform};

const INITIAL_MODEL_CAPACITY: usize = 64;

struct GpuBuffer {
    desc: BufferDesc,
    /// `None` until the first non-empty init
    buffer: Option<wgpu::Buffer>,
    /// Allocated elements
    len: usize,
}

/// A draw call waiting for the render pass
#[derive(Clone, Debug)]
struct QueuedDraw {
    stream: StreamKind,
    index_buffer: BufferHandle,
    vertex_buffers: Vec<BufferHandle>,
    first_index: u32,
    index_count: u32,
    model: Mat4,
    texture: Option<TextureHandle>,
}

/// WGPU renderer for shape-graph trees
pub struct ShapeRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,

    /// Fill, line and point pipelines in [`StreamKind::ALL`] order
    pipelines: [wgpu::RenderPipeline; 3],

    globals_buffer: wgpu::Buffer,
    globals_layout: wgpu::BindGroupLayout,
    model_buffer: wgpu::Buffer,
    model_capacity: usize,
    model_stride: u64,
    frame_bind_group: wgpu::BindGroup,

    textures: TextureRegistry,
    bound_texture: Option<TextureHandle>,

    buffers: HashMap<BufferHandle, GpuBuffer>,
    next_handle: u32,
    draws: Vec<QueuedDraw>,
}

impl ShapeRenderer {
    /// Create a renderer drawing into `surface_format` targets, depth-tested
    /// when `depth_format` is given
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shape Globals Buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shape Frame Bind Group Layout"),
            entries: &[
                // Globals - Binding 0
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Model (dynamic offset per draw) - Binding 1
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<ModelUniform>() as u64),
                    },
                    count: None,
                },
            ],
        });

        let model_stride =
            uniform::model_stride(device.limits().min_uniform_buffer_offset_alignment);
        let model_buffer = create_model_buffer(device, INITIAL_MODEL_CAPACITY, model_stride);
        let frame_bind_group =
            create_frame_bind_group(device, &globals_layout, &globals_buffer, &model_buffer);

        let textures = TextureRegistry::new(device, queue);

        let fill_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shape Fill Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, textures.layout()],
            push_constant_ranges: &[],
        });
        let stroke_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shape Stroke Pipeline Layout"),
            bind_group_layouts: &[&globals_layout],
            push_constant_ranges: &[],
        });

        let pipelines = StreamKind::ALL.map(|stream| {
            let (layout, source) = match stream {
                StreamKind::Fill => (
                    &fill_layout,
                    concat!(
                        include_str!("shaders/common.wgsl"),
                        include_str!("shaders/fill.wgsl")
                    ),
                ),
                StreamKind::Line => (
                    &stroke_layout,
                    concat!(
                        include_str!("shaders/common.wgsl"),
                        include_str!("shaders/line.wgsl")
                    ),
                ),
                StreamKind::Point => (
                    &stroke_layout,
                    concat!(
                        include_str!("shaders/common.wgsl"),
                        include_str!("shaders/point.wgsl")
                    ),
                ),
            };
            create_pipeline(device, layout, source, stream, surface_format, depth_format)
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            pipelines,
            globals_buffer,
            globals_layout,
            model_buffer,
            model_capacity: INITIAL_MODEL_CAPACITY,
            model_stride,
            frame_bind_group,
            textures,
            bound_texture: None,
            buffers: HashMap::new(),
            next_handle: 0,
            draws: Vec::new(),
        }
    }

    /// Start a frame: drop queued draws and set the camera. `viewport` is the
    /// target size in pixels.
    pub fn begin_frame(&mut self, view_proj: Mat4, viewport: [f32; 2]) {
        self.draws.clear();
        self.bound_texture = None;
        self.queue.write_buffer(
            &self.globals_buffer,
            0,
            bytemuck::bytes_of(&Globals::new(view_proj, viewport)),
        );
    }

    /// Upload an RGBA8 image. Returns `None` if the pixel data does not match
    /// the size.
    pub fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Option<TextureHandle> {
        self.textures
            .insert(&self.device, &self.queue, width, height, rgba)
    }

    pub fn remove_texture(&mut self, texture: TextureHandle) -> bool {
        self.textures.remove(texture)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Live buffer objects
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn queued_draws(&self) -> usize {
        self.draws.len()
    }

    /// Replay queued draws into `pass`, then clear the queue
    pub fn render(&mut self, pass: &mut wgpu::RenderPass<'_>) {
        let draws = std::mem::take(&mut self.draws);
        if draws.is_empty() {
            return;
        }
        self.upload_models(&draws);

        let mut current = None;
        for (slot, draw) in draws.iter().enumerate() {
            let Some(index_buffer) = self.allocated(draw.index_buffer) else {
                log::warn!("skipping draw, index buffer {:?} not allocated", draw.index_buffer);
                continue;
            };
            let vertex_buffers: Option<Vec<&wgpu::Buffer>> = draw
                .vertex_buffers
                .iter()
                .map(|&handle| self.allocated(handle))
                .collect();
            let Some(vertex_buffers) = vertex_buffers else {
                log::warn!("skipping {:?} draw, vertex buffers not allocated", draw.stream);
                continue;
            };

            if current != Some(draw.stream) {
                pass.set_pipeline(&self.pipelines[draw.stream.index()]);
                current = Some(draw.stream);
            }
            let offset = (slot as u64 * self.model_stride) as u32;
            pass.set_bind_group(0, &self.frame_bind_group, &[offset]);
            if draw.stream == StreamKind::Fill {
                pass.set_bind_group(1, self.textures.bind_group(draw.texture), &[]);
            }
            for (location, buffer) in vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(location as u32, buffer.slice(..));
            }
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(draw.first_index..draw.first_index + draw.index_count, 0, 0..1);
        }
    }

    fn allocated(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle).and_then(|b| b.buffer.as_ref())
    }

    fn upload_models(&mut self, draws: &[QueuedDraw]) {
        if draws.len() > self.model_capacity {
            self.model_capacity = draws.len().next_power_of_two();
            self.model_buffer =
                create_model_buffer(&self.device, self.model_capacity, self.model_stride);
            self.frame_bind_group = create_frame_bind_group(
                &self.device,
                &self.globals_layout,
                &self.globals_buffer,
                &self.model_buffer,
            );
            log::debug!("grew model uniform buffer to {} draws", self.model_capacity);
        }

        let models: Vec<Mat4> = draws.iter().map(|d| d.model).collect();
        let bytes = uniform::pack_models(&models, self.model_stride);
        self.queue.write_buffer(&self.model_buffer, 0, &bytes);
    }
}

impl GpuBackend for ShapeRenderer {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, GpuError> {
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(
            handle,
            GpuBuffer {
                desc: *desc,
                buffer: None,
                len: 0,
            },
        );
        Ok(handle)
    }

    fn init_buffer(
        &mut self,
        buffer: BufferHandle,
        count: usize,
        usage: BufferUsage,
    ) -> Result<(), GpuError> {
        let max_size = self.device.limits().max_buffer_size;
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?;

        let bytes = (count * entry.desc.element_size) as u64;
        if bytes > max_size {
            return Err(GpuError::Allocation {
                label: entry.desc.label.to_string(),
                bytes,
            });
        }

        entry.len = count;
        if count == 0 {
            entry.buffer = None;
            return Ok(());
        }

        let target = match entry.desc.target {
            BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
            BufferTarget::Index => wgpu::BufferUsages::INDEX,
        };
        entry.buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(entry.desc.label),
            size: bytes.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: target | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        log::debug!(
            "allocated {} ({count} elements, {bytes} bytes, {usage:?})",
            entry.desc.label
        );
        Ok(())
    }

    fn copy_sub_range(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        count: usize,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let entry = self
            .buffers
            .get(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?;

        let size = entry.desc.element_size;
        if offset + count > entry.len || data.len() < count * size {
            return Err(GpuError::OutOfBounds {
                offset,
                count,
                len: entry.len,
            });
        }
        let Some(target) = entry.buffer.as_ref() else {
            return Ok(());
        };
        if count > 0 {
            self.queue
                .write_buffer(target, (offset * size) as u64, &data[..count * size]);
        }
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.bound_texture = texture;
    }

    fn draw_indexed_range(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        if !self.buffers.contains_key(&call.index_buffer) {
            return Err(GpuError::UnknownBuffer(call.index_buffer));
        }
        if let Some(&missing) = call
            .vertex_buffers
            .iter()
            .find(|h| !self.buffers.contains_key(h))
        {
            return Err(GpuError::UnknownBuffer(missing));
        }
        self.draws.push(QueuedDraw {
            stream: call.stream,
            index_buffer: call.index_buffer,
            vertex_buffers: call.vertex_buffers.clone(),
            first_index: call.first_index,
            index_count: call.index_count,
            model: call.model,
            texture: self.bound_texture,
        });
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if let Some(entry) = self.buffers.remove(&buffer) {
            if let Some(buffer) = entry.buffer {
                buffer.destroy();
            }
        }
    }
}

fn create_model_buffer(device: &wgpu::Device, capacity: usize, stride: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Shape Model Buffer"),
        size: capacity as u64 * stride,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    globals: &wgpu::Buffer,
    models: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Shape Frame Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: globals.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: models,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<ModelUniform>() as u64),
                }),
            },
        ],
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    source: &'static str,
    stream: StreamKind,
    surface_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
) -> wgpu::RenderPipeline {
    let label = match stream {
        StreamKind::Fill => "Shape Fill",
        StreamKind::Line => "Shape Line",
        StreamKind::Point => "Shape Point",
    };
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let buffers = vertex::stream_layouts(stream);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        // Lines and points arrive as expanded triangles
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shape_graph::{Attribute, ImageRef, ResolvedTexture, Scene, ShapeKind, TextureMap};

    /// Headless device, `None` on machines without an adapter
    fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let _ = env_logger::builder().is_test(true).try_init();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .ok()?;
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()
    }

    fn renderer() -> Option<ShapeRenderer> {
        let (device, queue) = device()?;
        Some(ShapeRenderer::new(
            &device,
            &queue,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            None,
        ))
    }

    fn desc() -> BufferDesc {
        BufferDesc {
            label: "test",
            target: BufferTarget::Vertex,
            element_size: 12,
        }
    }

    #[test]
    fn test_init_and_copy_bounds() {
        let Some(mut renderer) = renderer() else {
            return;
        };
        let buffer = renderer.create_buffer(&desc()).unwrap();
        renderer.init_buffer(buffer, 4, BufferUsage::Dynamic).unwrap();
        assert!(renderer
            .copy_sub_range(buffer, 2, 2, &[0; 24])
            .is_ok());
        assert!(matches!(
            renderer.copy_sub_range(buffer, 3, 2, &[0; 24]),
            Err(GpuError::OutOfBounds { len: 4, .. })
        ));
        assert!(matches!(
            renderer.copy_sub_range(BufferHandle(99), 0, 0, &[]),
            Err(GpuError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_oversized_allocation_fails() {
        let Some(mut renderer) = renderer() else {
            return;
        };
        let buffer = renderer.create_buffer(&desc()).unwrap();
        let count = (renderer.device.limits().max_buffer_size / 12 + 1) as usize;
        assert!(matches!(
            renderer.init_buffer(buffer, count, BufferUsage::Static),
            Err(GpuError::Allocation { .. })
        ));
    }

    #[test]
    fn test_draws_queue_with_bound_texture() {
        let Some(mut renderer) = renderer() else {
            return;
        };
        let texture = renderer.create_texture(1, 1, &[255, 0, 0, 255]).unwrap();
        assert!(renderer.create_texture(2, 2, &[0; 4]).is_none());
        let mut textures = TextureMap::new();
        textures.insert(
            7,
            ResolvedTexture {
                handle: texture,
                flipped: false,
            },
        );

        let mut scene = Scene::default();
        let root = scene.create_group();
        let rect = scene.create_primitive(ShapeKind::Rect, &[0.0, 0.0, 10.0, 10.0]);
        scene.texture(rect, ImageRef::new(7, 1, 1)).unwrap();
        scene.add_child(root, rect).unwrap();

        renderer.begin_frame(Mat4::IDENTITY, [100.0, 100.0]);
        scene.render(root, &mut renderer, &mut textures).unwrap();
        assert_eq!(renderer.buffer_count(), Attribute::COUNT + 3);

        // fill and line streams of one rect
        assert_eq!(renderer.queued_draws(), 2);
        let fill = renderer.draws.iter().find(|d| d.stream == StreamKind::Fill).unwrap();
        assert_eq!(fill.texture, Some(texture));
        let line = renderer.draws.iter().find(|d| d.stream == StreamKind::Line).unwrap();
        assert_eq!(line.texture, None);

        renderer.begin_frame(Mat4::IDENTITY, [100.0, 100.0]);
        assert_eq!(renderer.queued_draws(), 0);
    }

    #[test]
    fn test_release_drops_buffer() {
        let Some(mut renderer) = renderer() else {
            return;
        };
        let buffer = renderer.create_buffer(&desc()).unwrap();
        renderer.init_buffer(buffer, 1, BufferUsage::Dynamic).unwrap();
        renderer.release_buffer(buffer);
        assert_eq!(renderer.buffer_count(), 0);
        assert!(matches!(
            renderer.init_buffer(buffer, 1, BufferUsage::Dynamic),
            Err(GpuError::UnknownBuffer(_))
        ));
    }
}
