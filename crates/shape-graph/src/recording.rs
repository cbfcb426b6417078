//! In-memory backend that keeps buffer contents and logs every call.

use crate::buffers::{BufferDesc, BufferHandle, BufferUsage, DrawCall, GpuBackend, TextureHandle};
use crate::error::GpuError;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create {
        buffer: BufferHandle,
        label: &'static str,
    },
    Init {
        buffer: BufferHandle,
        count: usize,
    },
    Copy {
        buffer: BufferHandle,
        offset: usize,
        count: usize,
    },
    BindTexture(Option<TextureHandle>),
    Draw(DrawCall),
    Release(BufferHandle),
}

#[derive(Clone, Debug)]
struct RecordedBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

impl RecordedBuffer {
    fn len(&self) -> usize {
        self.data.len() / self.desc.element_size.max(1)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    buffers: BTreeMap<BufferHandle, RecordedBuffer>,
    next_handle: u32,
    calls: Vec<Call>,
    /// Allocations above this many bytes fail
    allocation_limit: Option<u64>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocation_limit(mut self, bytes: u64) -> Self {
        self.allocation_limit = Some(bytes);
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn bytes(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn floats(&self, buffer: BufferHandle) -> Vec<f32> {
        self.bytes(buffer)
            .map(|b| b.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect())
            .unwrap_or_default()
    }

    pub fn indices(&self, buffer: BufferHandle) -> Vec<u32> {
        self.bytes(buffer)
            .map(|b| b.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect())
            .unwrap_or_default()
    }

    pub fn copies(&self) -> usize {
        self.count(|c| matches!(c, Call::Copy { .. }))
    }

    pub fn inits(&self) -> usize {
        self.count(|c| matches!(c, Call::Init { .. }))
    }

    pub fn binds(&self) -> usize {
        self.count(|c| matches!(c, Call::BindTexture(_)))
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    /// Copies that targeted `buffer`
    pub fn copies_to(&self, buffer: BufferHandle) -> usize {
        self.count(|c| matches!(c, Call::Copy { buffer: b, .. } if *b == buffer))
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn buffer_mut(&mut self, buffer: BufferHandle) -> Result<&mut RecordedBuffer, GpuError> {
        self.buffers
            .get_mut(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))
    }
}

impl GpuBackend for RecordingBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, GpuError> {
        let buffer = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(
            buffer,
            RecordedBuffer {
                desc: *desc,
                data: Vec::new(),
            },
        );
        self.calls.push(Call::Create {
            buffer,
            label: desc.label,
        });
        Ok(buffer)
    }

    fn init_buffer(
        &mut self,
        buffer: BufferHandle,
        count: usize,
        _usage: BufferUsage,
    ) -> Result<(), GpuError> {
        let limit = self.allocation_limit;
        let recorded = self.buffer_mut(buffer)?;
        let bytes = (count * recorded.desc.element_size) as u64;
        if limit.is_some_and(|limit| bytes > limit) {
            return Err(GpuError::Allocation {
                label: recorded.desc.label.to_string(),
                bytes,
            });
        }
        recorded.data = vec![0; bytes as usize];
        self.calls.push(Call::Init { buffer, count });
        Ok(())
    }

    fn copy_sub_range(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        count: usize,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let recorded = self.buffer_mut(buffer)?;
        let len = recorded.len();
        if offset + count > len {
            return Err(GpuError::OutOfBounds { offset, count, len });
        }
        let size = recorded.desc.element_size;
        if data.len() < count * size {
            return Err(GpuError::OutOfBounds {
                offset,
                count,
                len: data.len() / size.max(1),
            });
        }
        let start = offset * size;
        recorded.data[start..start + count * size].copy_from_slice(&data[..count * size]);
        self.calls.push(Call::Copy {
            buffer,
            offset,
            count,
        });
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.calls.push(Call::BindTexture(texture));
    }

    fn draw_indexed_range(&mut self, call: &DrawCall) -> Result<(), GpuError> {
        if !self.buffers.contains_key(&call.index_buffer) {
            return Err(GpuError::UnknownBuffer(call.index_buffer));
        }
        self.calls.push(Call::Draw(call.clone()));
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.calls.push(Call::Release(buffer));
    }
}
