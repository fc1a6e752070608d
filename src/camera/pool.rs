use std::sync::Arc;

use crate::camera::error::{CameraError, Result};
use crate::camera::types::{StreamSpec, TargetPixelFormat, UsageFlags};
use crate::convert;

/// Row stride alignment applied to pool buffers. Converters take explicit
/// strides, so padding never leaks into plane maths.
const STRIDE_ALIGN: u32 = 16;

/// Callback used by a [`FrameLease`] to hand its buffer back to the pool.
/// Arguments: (pool epoch, slot index, buffer).
pub type ReturnFn = Arc<dyn Fn(u64, usize, OutputBuffer) + Send + Sync>;

/// A CPU-writable output buffer owned by the pool.
pub struct OutputBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Row stride of the luma plane in bytes; chroma strides derive from it
    /// per format.
    pub stride: u32,
    pub format: TargetPixelFormat,
    pub usage: UsageFlags,
}

impl OutputBuffer {
    fn allocate(spec: &StreamSpec, usage: UsageFlags) -> Result<Self> {
        let stride = aligned_stride(spec.width);
        let len = match spec.format {
            TargetPixelFormat::I420 => {
                convert::i420_buffer_len(stride as usize, spec.height as usize)
            }
            TargetPixelFormat::Nv12 => {
                convert::nv12_buffer_len(stride as usize, spec.height as usize)
            }
        };

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| {
            CameraError::OutOfMemory(format!(
                "{len} byte output buffer at {}x{}",
                spec.width, spec.height
            ))
        })?;
        data.resize(len, 0);

        Ok(Self {
            data,
            width: spec.width,
            height: spec.height,
            stride,
            format: spec.format,
            usage,
        })
    }
}

/// Fixed-size set of pre-allocated output buffers handed out round-robin.
///
/// A slot is `None` while its buffer is checked out. Hand-out is strictly
/// in slot order: `acquire` only succeeds when the next slot in rotation is
/// free, which keeps the original round-robin discipline while making reuse
/// of a still-leased buffer impossible.
pub struct BufferPool {
    slots: Vec<Option<OutputBuffer>>,
    next_idx: usize,
}

impl BufferPool {
    /// Allocate `spec.buffer_count` buffers at the negotiated dimensions.
    ///
    /// If allocation of buffer *k* fails, buffers 0..k-1 are released and
    /// the error is returned — no partial pool is ever retained.
    pub fn allocate(spec: &StreamSpec, usage: UsageFlags) -> Result<Self> {
        let mut slots = Vec::with_capacity(spec.buffer_count);
        for _ in 0..spec.buffer_count {
            slots.push(Some(OutputBuffer::allocate(spec, usage)?));
        }
        Ok(Self { slots, next_idx: 0 })
    }

    /// Claim the next buffer in rotation, or `None` if it is still leased.
    pub fn acquire(&mut self) -> Option<(usize, OutputBuffer)> {
        let idx = self.next_idx;
        let buffer = self.slots.get_mut(idx)?.take()?;
        self.next_idx = (idx + 1) % self.slots.len();
        Some((idx, buffer))
    }

    /// Return a previously acquired buffer to its slot.
    pub fn release(&mut self, idx: usize, buffer: OutputBuffer) {
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = Some(buffer);
        }
    }

    /// Whether the next slot in rotation holds a free buffer.
    pub fn has_free(&self) -> bool {
        self.slots
            .get(self.next_idx)
            .is_some_and(|slot| slot.is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive lease on a delivered output buffer.
///
/// Dropping the lease returns the buffer to the pool and wakes the worker,
/// so a buffer can never be overwritten while the consumer still reads it.
/// Leases from a torn-down pool generation are silently discarded.
pub struct FrameLease {
    buffer: Option<OutputBuffer>,
    epoch: u64,
    slot: usize,
    return_fn: ReturnFn,
}

impl FrameLease {
    pub(crate) fn new(buffer: OutputBuffer, epoch: u64, slot: usize, return_fn: ReturnFn) -> Self {
        Self {
            buffer: Some(buffer),
            epoch,
            slot,
            return_fn,
        }
    }

    /// The leased buffer.
    pub fn buffer(&self) -> &OutputBuffer {
        self.buffer
            .as_ref()
            .expect("lease buffer only vacated on drop")
    }

    /// Explicitly release the lease. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            (self.return_fn)(self.epoch, self.slot, buffer);
        }
    }
}

/// Round `width` up to the pool stride alignment.
pub fn aligned_stride(width: u32) -> u32 {
    width.div_ceil(STRIDE_ALIGN) * STRIDE_ALIGN
}
