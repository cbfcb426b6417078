//! Coalescing of dirty sub-ranges into single buffer writes.

use crate::buffers::{BufferHandle, GpuBackend};
use crate::error::Result;
use bytemuck::Pod;

/// Scratch array for one attribute (or index) stream of a root.
///
/// Regions are expected in ascending offset order. Whatever arrives is
/// appended after the current content, so the cache always describes the
/// single range `offset..offset + size`.
#[derive(Clone, Debug)]
pub struct UpdateCache<T> {
    data: Vec<T>,
    /// Values per element
    stride: usize,
    /// Capacity in elements
    capacity: usize,
    offset: usize,
    size: usize,
    reallocations: usize,
}

impl<T: Pod> UpdateCache<T> {
    pub fn new(stride: usize, capacity: usize) -> Self {
        let stride = stride.max(1);
        let capacity = capacity.max(1);
        Self {
            data: vec![T::zeroed(); capacity * stride],
            stride,
            capacity,
            offset: 0,
            size: 0,
            reallocations: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Elements currently held
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of times the scratch array had to grow
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    pub fn data(&self) -> &[T] {
        &self.data[..self.size * self.stride]
    }

    /// Append `count` elements destined for `offset`
    pub fn add(&mut self, offset: usize, count: usize, values: &[T]) {
        debug_assert_eq!(values.len(), count * self.stride);
        if self.size == 0 {
            self.offset = offset;
        } else if self.offset + self.size != offset {
            log::warn!(
                "update cache region at {offset} does not follow {}..{}",
                self.offset,
                self.offset + self.size
            );
        }

        self.ensure_capacity(self.size + count);
        let start = self.size * self.stride;
        self.data[start..start + values.len()].copy_from_slice(values);
        self.size += count;
    }

    /// Same as [`UpdateCache::add`], shifting every value by `delta` first
    pub fn add_shifted(&mut self, offset: usize, count: usize, values: &[T], delta: T)
    where
        T: std::ops::Add<Output = T>,
    {
        if self.size == 0 {
            self.offset = offset;
        }
        self.ensure_capacity(self.size + count);
        let start = self.size * self.stride;
        for (dst, &src) in self.data[start..start + values.len()].iter_mut().zip(values) {
            *dst = src + delta;
        }
        self.size += count;
    }

    fn ensure_capacity(&mut self, required: usize) {
        if required <= self.capacity {
            return;
        }
        let capacity = required.next_power_of_two();
        let mut data = vec![T::zeroed(); capacity * self.stride];
        let used = self.size * self.stride;
        data[..used].copy_from_slice(&self.data[..used]);
        self.data = data;
        self.capacity = capacity;
        self.reallocations += 1;
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.size = 0;
    }

    /// Write the held region with one sub-range copy and reset.
    /// Returns whether anything was written.
    pub fn flush(&mut self, backend: &mut dyn GpuBackend, buffer: BufferHandle) -> Result<bool> {
        if self.size == 0 {
            return Ok(false);
        }
        let (offset, size) = (self.offset, self.size);
        self.reset();
        backend.copy_sub_range(
            buffer,
            offset,
            size,
            bytemuck::cast_slice(&self.data[..size * self.stride]),
        )?;
        Ok(true)
    }
}
