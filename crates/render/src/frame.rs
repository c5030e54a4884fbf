//! Per-frame resources and deferred resource release.

use std::sync::Arc;

use ash::vk;

use abrogue_rhi::buffer::{Buffer, BufferUsage};
use abrogue_rhi::command::{CommandBuffer, CommandPool};
use abrogue_rhi::device::Device;
use abrogue_rhi::sync::{Fence, Semaphore, MAX_FRAMES_IN_FLIGHT};
use abrogue_rhi::RhiResult;

use crate::quad::QuadData;

/// Instance capacity of each per-frame quad buffer.
pub const INSTANCE_CAPACITY: usize = 2048;

/// Everything one frame in flight owns.
///
/// Each of the [`MAX_FRAMES_IN_FLIGHT`] slots has its own command buffer,
/// semaphore pair, fence, instance buffer and descriptor set, so the CPU
/// can fill slot N+1 while the GPU still reads slot N. The fence is the
/// reuse gate: waiting on it means everything in this slot is free again.
pub struct FrameSlot {
    /// Command buffer re-recorded every time this slot comes around.
    pub command_buffer: CommandBuffer,
    /// Signaled when the acquired swapchain image is ready.
    pub image_available: Semaphore,
    /// Signaled when this slot's rendering finishes; present waits on it.
    pub render_finished: Semaphore,
    /// Signaled when this slot's submission completes on the GPU.
    pub in_flight: Fence,
    /// Persistently mapped quad instance buffer the shader reads.
    pub instance_buffer: Buffer<QuadData>,
    /// Sampler descriptor set for this slot.
    pub descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    /// Creates one frame slot.
    ///
    /// The fence starts signaled so the slot's first wait doesn't block.
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        descriptor_set: vk::DescriptorSet,
    ) -> RhiResult<Self> {
        Ok(Self {
            command_buffer: CommandBuffer::new(device.clone(), pool)?,
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
            instance_buffer: Buffer::new(
                device,
                memory_properties,
                BufferUsage::Instance,
                INSTANCE_CAPACITY,
            )?,
            descriptor_set,
        })
    }
}

/// Advances a frame-slot index, wrapping at [`MAX_FRAMES_IN_FLIGHT`].
#[inline]
pub fn next_frame(index: usize) -> usize {
    (index + 1) % MAX_FRAMES_IN_FLIGHT
}

/// Holds a retired resource for a fixed number of frames before dropping it.
///
/// A replaced swapchain generation may still be referenced by frames the
/// GPU hasn't presented yet, so it is parked here armed with its
/// framebuffer count and dropped only once that many subsequent frames
/// have gone through. Arming while a value is still parked drops the older
/// one immediately.
pub struct DeferredRelease<T> {
    slot: Option<(T, usize)>,
}

impl<T> DeferredRelease<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Parks `value`, to be released after `frames` calls to
    /// [`DeferredRelease::tick`].
    pub fn arm(&mut self, value: T, frames: usize) {
        self.slot = Some((value, frames));
    }

    /// Counts one completed frame; returns the parked value once its
    /// countdown hits zero.
    pub fn tick(&mut self) -> Option<T> {
        match self.slot.take() {
            Some((value, remaining)) if remaining <= 1 => Some(value),
            Some((value, remaining)) => {
                self.slot = Some((value, remaining - 1));
                None
            }
            None => None,
        }
    }

    /// Whether a value is currently parked.
    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }
}

impl<T> Default for DeferredRelease<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_cycles_through_all_slots() {
        let mut index = 0;
        let mut visited = Vec::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT * 2 {
            visited.push(index);
            index = next_frame(index);
        }
        // Two full cycles through 0..N-1.
        for (i, &slot) in visited.iter().enumerate() {
            assert_eq!(slot, i % MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(index, 0);
    }

    #[test]
    fn deferred_release_waits_exactly_the_armed_count() {
        let mut release = DeferredRelease::new();
        release.arm("old swapchain", 3);

        assert_eq!(release.tick(), None);
        assert_eq!(release.tick(), None);
        assert_eq!(release.tick(), Some("old swapchain"));
        assert!(!release.is_armed());
        assert_eq!(release.tick(), None);
    }

    #[test]
    fn rearming_replaces_the_parked_value() {
        let mut release = DeferredRelease::new();
        release.arm(1, 5);
        release.arm(2, 1);
        assert_eq!(release.tick(), Some(2));
    }

    #[test]
    fn empty_slot_ticks_are_noops() {
        let mut release: DeferredRelease<u32> = DeferredRelease::new();
        assert_eq!(release.tick(), None);
        assert!(!release.is_armed());
    }
}
