//! The narrow GPU contract the engine renders through, and the per-root set
//! of buffers kept behind it.

use crate::error::{GpuError, Result};
use crate::style::ImageRef;
use crate::tess_geometry::{Attribute, StreamKind};
use crate::update_cache::UpdateCache;
use glam::Mat4;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Expected update frequency of a buffer's contents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferUsage {
    Static,
    #[default]
    Dynamic,
    Stream,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub target: BufferTarget,
    /// Bytes per element
    pub element_size: usize,
}

/// One indexed draw over a range of a root's buffers
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub stream: StreamKind,
    pub index_buffer: BufferHandle,
    /// Attribute buffers in [`StreamKind::attributes`] order
    pub vertex_buffers: Vec<BufferHandle>,
    pub first_index: u32,
    pub index_count: u32,
    /// Composed matrix of the node and its ancestors
    pub model: Mat4,
}

/// Buffer-object and draw-call contract of a rasterization backend.
///
/// Offsets and counts are in elements of the buffer's `element_size`.
pub trait GpuBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, GpuError>;

    /// Destructively (re)allocate storage for `count` elements
    fn init_buffer(
        &mut self,
        buffer: BufferHandle,
        count: usize,
        usage: BufferUsage,
    ) -> Result<(), GpuError>;

    fn copy_sub_range(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        count: usize,
        data: &[u8],
    ) -> Result<(), GpuError>;

    fn bind_texture(&mut self, texture: Option<TextureHandle>);

    fn draw_indexed_range(&mut self, call: &DrawCall) -> Result<(), GpuError>;

    fn release_buffer(&mut self, buffer: BufferHandle);
}

/// Texture a leaf is drawn with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedTexture {
    pub handle: TextureHandle,
    /// Stored bottom-up, texture coordinates get `v' = 1 - v`
    pub flipped: bool,
}

/// Maps host images to backend textures
pub trait TextureResolver {
    fn resolve(&mut self, image: &ImageRef) -> Option<ResolvedTexture>;
}

/// Resolver for scenes without textures
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTextures;

impl TextureResolver for NoTextures {
    fn resolve(&mut self, _image: &ImageRef) -> Option<ResolvedTexture> {
        None
    }
}

/// Resolver backed by a lookup table filled by the host
#[derive(Clone, Debug, Default)]
pub struct TextureMap {
    textures: HashMap<u64, ResolvedTexture>,
}

impl TextureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image_id: u64, texture: ResolvedTexture) {
        self.textures.insert(image_id, texture);
    }

    pub fn remove(&mut self, image_id: u64) -> Option<ResolvedTexture> {
        self.textures.remove(&image_id)
    }
}

impl TextureResolver for TextureMap {
    fn resolve(&mut self, image: &ImageRef) -> Option<ResolvedTexture> {
        self.textures.get(&image.id).copied()
    }
}

/// Buffers, allocation sizes and update caches owned by a root
#[derive(Debug)]
pub struct RootBuffers {
    attributes: [BufferHandle; Attribute::COUNT],
    indices: [BufferHandle; 3],
    /// Allocated vertex and index counts per stream, `None` before the first init
    allocated: [Option<(usize, usize)>; 3],
    pub(crate) attribute_caches: Vec<UpdateCache<f32>>,
    pub(crate) index_caches: Vec<UpdateCache<u32>>,
}

impl RootBuffers {
    pub fn create(backend: &mut dyn GpuBackend, cache_capacity: usize) -> Result<Self> {
        let mut attributes = [BufferHandle(0); Attribute::COUNT];
        for attribute in Attribute::ALL {
            attributes[attribute.index()] = backend.create_buffer(&BufferDesc {
                label: attribute.label(),
                target: BufferTarget::Vertex,
                element_size: attribute.components() * std::mem::size_of::<f32>(),
            })?;
        }

        let mut indices = [BufferHandle(0); 3];
        for stream in StreamKind::ALL {
            indices[stream.index()] = backend.create_buffer(&BufferDesc {
                label: index_label(stream),
                target: BufferTarget::Index,
                element_size: std::mem::size_of::<u32>(),
            })?;
        }

        Ok(Self {
            attributes,
            indices,
            allocated: [None; 3],
            attribute_caches: Attribute::ALL
                .iter()
                .map(|a| UpdateCache::new(a.components(), cache_capacity))
                .collect(),
            index_caches: StreamKind::ALL
                .iter()
                .map(|_| UpdateCache::new(1, cache_capacity))
                .collect(),
        })
    }

    pub fn attribute(&self, attribute: Attribute) -> BufferHandle {
        self.attributes[attribute.index()]
    }

    pub fn index_buffer(&self, stream: StreamKind) -> BufferHandle {
        self.indices[stream.index()]
    }

    pub fn vertex_buffers(&self, stream: StreamKind) -> Vec<BufferHandle> {
        stream
            .attributes()
            .iter()
            .map(|&a| self.attribute(a))
            .collect()
    }

    pub fn allocated(&self, stream: StreamKind) -> Option<(usize, usize)> {
        self.allocated[stream.index()]
    }

    /// Size a stream's buffers to the aggregated totals. Reallocates only
    /// when the totals differ from the current allocation.
    pub fn init_stream(
        &mut self,
        backend: &mut dyn GpuBackend,
        stream: StreamKind,
        vertices: usize,
        indices: usize,
    ) -> Result<bool> {
        if self.allocated[stream.index()] == Some((vertices, indices)) {
            return Ok(false);
        }
        for &attribute in stream.attributes() {
            backend.init_buffer(self.attribute(attribute), vertices, BufferUsage::Dynamic)?;
        }
        backend.init_buffer(self.index_buffer(stream), indices, BufferUsage::Static)?;
        self.allocated[stream.index()] = Some((vertices, indices));
        log::debug!("allocated {stream:?} buffers: {vertices} vertices, {indices} indices");
        Ok(true)
    }

    pub fn release(self, backend: &mut dyn GpuBackend) {
        for handle in self.attributes.into_iter().chain(self.indices) {
            backend.release_buffer(handle);
        }
    }
}

fn index_label(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::Fill => "fill indices",
        StreamKind::Line => "line indices",
        StreamKind::Point => "point indices",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Call, RecordingBackend};

    #[test]
    fn test_create_allocates_every_handle() {
        let mut backend = RecordingBackend::new();
        let buffers = RootBuffers::create(&mut backend, 16).unwrap();
        assert_eq!(backend.buffer_count(), Attribute::COUNT + 3);
        assert_eq!(buffers.vertex_buffers(StreamKind::Fill).len(), 4);
        assert_eq!(buffers.attribute_caches.len(), Attribute::COUNT);
    }

    #[test]
    fn test_init_only_when_totals_change() {
        let mut backend = RecordingBackend::new();
        let mut buffers = RootBuffers::create(&mut backend, 16).unwrap();

        assert!(buffers.init_stream(&mut backend, StreamKind::Line, 8, 12).unwrap());
        assert!(!buffers.init_stream(&mut backend, StreamKind::Line, 8, 12).unwrap());
        assert!(buffers.init_stream(&mut backend, StreamKind::Line, 12, 18).unwrap());

        let inits = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Init { .. }))
            .count();
        assert_eq!(inits, 2 * 4);
        assert_eq!(buffers.allocated(StreamKind::Line), Some((12, 18)));
        assert_eq!(buffers.allocated(StreamKind::Fill), None);
    }
}
