//! Command pool and command buffer management.
//!
//! [`CommandPool`] allocates primary command buffers for the graphics
//! family; [`CommandBuffer`] is a thin recording wrapper. [`OneShotCommands`]
//! records a single submission and blocks until the GPU finishes it — the
//! synchronous contract the texture upload relies on, made explicit through
//! [`OneShotCommands::submit_and_wait`] rather than hidden in a destructor.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so per-frame buffers can be reset
/// individually without resetting the whole pool.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Creates a command pool on the graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_family())
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        // SAFETY: create_info is valid for the duration of the call.
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            device.graphics_family()
        );

        Ok(Self { device, pool })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates one primary command buffer from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate(&self) -> RhiResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // SAFETY: the pool handle is live.
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&allocate_info)? };
        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: destroying the pool frees every buffer allocated from it;
        // the engine waits for device idle before teardown.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed");
    }
}

/// Thin wrapper over a primary command buffer.
///
/// The buffer is freed with its pool; this wrapper only drives recording.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a command buffer from `pool`.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate()?;
        Ok(Self { device, buffer })
    }

    /// Returns the Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default();
        // SAFETY: the buffer is not pending execution (caller waited on the
        // frame fence).
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Ends recording.
    pub fn end(&self) -> RhiResult<()> {
        // SAFETY: the buffer is in the recording state.
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Resets the buffer for re-recording.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: the pool was created with RESET_COMMAND_BUFFER and the
        // buffer is not pending execution.
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }
}

/// A single-use command buffer with an explicit synchronous submit.
///
/// Allocation and `begin` happen on construction; recording goes through
/// [`OneShotCommands::handle`]; [`OneShotCommands::submit_and_wait`]
/// consumes the value, submits, and blocks until the queue drains. Used for
/// startup uploads where overlap buys nothing.
pub struct OneShotCommands {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl OneShotCommands {
    /// Allocates and begins a one-time-submit command buffer.
    pub fn begin(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate()?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the buffer was just allocated.
        unsafe { device.handle().begin_command_buffer(buffer, &begin_info)? };

        Ok(Self { device, buffer })
    }

    /// Returns the command buffer handle for recording.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Ends recording, submits to `queue`, and waits for completion.
    ///
    /// Returns only after the GPU has finished the commands, so anything
    /// they produced is safe to use immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if ending, submission, or the wait fails.
    pub fn submit_and_wait(self, queue: vk::Queue) -> RhiResult<()> {
        // SAFETY: the buffer is in the recording state; the queue belongs
        // to this device.
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;

            let command_buffers = [self.buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            self.device
                .handle()
                .queue_submit(queue, &[submit_info], vk::Fence::null())?;
            self.device.handle().queue_wait_idle(queue)?;
        }
        Ok(())
    }
}
