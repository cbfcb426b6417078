use crate::buffers::BufferHandle;
use crate::node::ShapeId;

/// Errors raised by a GPU backend
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to allocate {bytes} bytes for buffer {label}")]
    Allocation { label: String, bytes: u64 },

    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    #[error("write of {count} elements at offset {offset} exceeds buffer of {len} elements")]
    OutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// The input vertex store of a leaf reached its hard bound
    #[error("input geometry is full ({capacity} vertices)")]
    CapacityExceeded { capacity: usize },

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("stale or unknown shape handle {0:?}")]
    InvalidHandle(ShapeId),
}

pub type Result<T, E = ShapeError> = std::result::Result<T, E>;
