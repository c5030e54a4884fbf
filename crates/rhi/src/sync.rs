//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU completion signal the host can wait on
//!
//! The engine keeps [`MAX_FRAMES_IN_FLIGHT`] independent sets of these so
//! the CPU can prepare one frame while the GPU renders another; the
//! per-frame fence wait is the only point where the CPU blocks on the GPU.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Maximum number of frames processed concurrently.
///
/// Bounds how far the CPU can race ahead of the GPU; also the number of
/// per-frame resource sets (command buffer, semaphores, fence, instance
/// buffer, descriptor set).
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
///
/// Used pairwise per frame: one signaled by swapchain image acquisition,
/// one signaled by the render submission and waited on by present.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a semaphore in the unsignaled state.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        // SAFETY: create_info is valid for the duration of the call.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: the engine waits for device idle before dropping frames.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// A frame slot's fence is signaled when that frame's command buffer
/// finishes on the GPU; waiting on it makes the slot's resources safe to
/// reuse.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence.
    ///
    /// `signaled` creates it pre-signaled, which frame slots need so their
    /// first wait doesn't block forever.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: create_info is valid for the duration of the call.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` (nanoseconds)
    /// expires. `u64::MAX` waits forever.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: the fence handle is live.
        unsafe {
            self.device.handle().wait_for_fences(&fences, true, timeout)?;
        }
        Ok(())
    }

    /// Resets the fence to unsignaled.
    ///
    /// Must not be called while the fence is in use by a queue submission.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: the caller waited on the fence first.
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: the engine waits for device idle before dropping frames.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_in_flight_is_double_or_triple_buffered() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 2);
        assert!(MAX_FRAMES_IN_FLIGHT <= 3);
    }
}
