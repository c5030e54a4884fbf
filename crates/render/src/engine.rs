//! The render engine.
//!
//! One instance of [`RenderEngine`] owns the whole Vulkan object graph and
//! drives the per-frame state machine: wait for the slot's fence, acquire,
//! record, copy instance data, submit, present, advance. Out-of-date or
//! suboptimal results from acquire/present short-circuit into swapchain
//! recreation; any other failure latches the engine into a failed state
//! that refuses further frames.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use abrogue_platform::{Surface, Window};
use abrogue_rhi::command::CommandPool;
use abrogue_rhi::descriptor::{self, DescriptorPool, DescriptorSetLayout};
use abrogue_rhi::device::Device;
use abrogue_rhi::instance::Instance;
use abrogue_rhi::physical_device::{select_physical_device, PhysicalDeviceInfo};
use abrogue_rhi::pipeline::{Pipeline, PipelineLayout};
use abrogue_rhi::shader::Shader;
use abrogue_rhi::swapchain::{surface_minimized, SwapchainResources};
use abrogue_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use abrogue_rhi::texture::Texture;
use abrogue_rhi::{RhiError, RhiResult};

use crate::frame::{next_frame, DeferredRelease, FrameSlot, INSTANCE_CAPACITY};
use crate::quad::{PushConstants, QuadData};

/// Greyscale tile atlas sampled by the fragment shader.
const TEXTURE_PATH: &str = "assets/textures/tiles.png";
/// Precompiled SPIR-V for the quad pipeline.
const VERTEX_SHADER_PATH: &str = "assets/shaders/quad.vert.spv";
const FRAGMENT_SHADER_PATH: &str = "assets/shaders/quad.frag.spv";

/// Clear color for every frame.
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// The Vulkan render engine.
///
/// Field order doubles as teardown order: frames and swapchain generations
/// drop before the pipeline and pools, the device's last `Arc` reference
/// releases after every resource holding one, and the surface drops before
/// the instance. [`Drop`] waits for the GPU to go idle first.
pub struct RenderEngine {
    frames: Vec<FrameSlot>,
    retired_swapchain: DeferredRelease<SwapchainResources>,
    swapchain: SwapchainResources,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    /// Kept alive for the per-frame sets allocated from it.
    #[allow(dead_code)]
    descriptor_pool: DescriptorPool,
    /// Kept alive for the pipeline layout referencing it.
    #[allow(dead_code)]
    descriptor_set_layout: DescriptorSetLayout,
    /// Kept alive for the descriptor sets sampling it.
    #[allow(dead_code)]
    texture: Texture,
    /// Kept alive for the frame command buffers allocated from it.
    #[allow(dead_code)]
    command_pool: CommandPool,
    device_info: PhysicalDeviceInfo,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,

    framebuffer_size: (u32, u32),
    current_frame: usize,
    errored: bool,
}

impl RenderEngine {
    /// Builds the engine against an existing window.
    ///
    /// Construction is strictly ordered: instance, surface, device
    /// selection, logical device, swapchain generation, command pool,
    /// texture upload, descriptors, shaders, pipeline, per-frame slots.
    /// Any failure unwinds the partially built graph through the wrappers'
    /// `Drop` impls.
    ///
    /// # Errors
    ///
    /// Returns an error when any Vulkan object fails to build, when no
    /// suitable GPU exists, or when an asset is missing.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(&extensions, cfg!(debug_assertions))?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(instance.handle(), &device_info)?;

        let framebuffer_size = window.framebuffer_size();
        let swapchain = SwapchainResources::new(
            instance.handle(),
            device.clone(),
            &device_info,
            surface.handle(),
            framebuffer_size,
            vk::SwapchainKHR::null(),
        )?;

        let command_pool = CommandPool::new(device.clone())?;

        let texture = Texture::load(
            device.clone(),
            &device_info,
            &command_pool,
            Path::new(TEXTURE_PATH),
        )?;

        let descriptor_set_layout = DescriptorSetLayout::new(device.clone())?;
        let descriptor_pool = DescriptorPool::new(device.clone(), MAX_FRAMES_IN_FLIGHT as u32)?;
        let descriptor_sets =
            descriptor_pool.allocate(&descriptor_set_layout, MAX_FRAMES_IN_FLIGHT)?;
        for &set in &descriptor_sets {
            descriptor::write_texture(&device, set, texture.view(), texture.sampler());
        }

        let vertex_shader = Shader::from_spirv_file(device.clone(), Path::new(VERTEX_SHADER_PATH))?;
        let fragment_shader =
            Shader::from_spirv_file(device.clone(), Path::new(FRAGMENT_SHADER_PATH))?;

        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            descriptor_set_layout.handle(),
            std::mem::size_of::<PushConstants>() as u32,
        )?;
        let pipeline = Pipeline::new(
            device.clone(),
            &pipeline_layout,
            swapchain.render_pass(),
            &vertex_shader,
            &fragment_shader,
        )?;

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for &set in &descriptor_sets {
            frames.push(FrameSlot::new(
                device.clone(),
                &command_pool,
                &device_info.memory_properties,
                set,
            )?);
        }

        info!(
            "Render engine ready on '{}' with {} frames in flight",
            device_info.device_name(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            frames,
            retired_swapchain: DeferredRelease::new(),
            swapchain,
            pipeline,
            pipeline_layout,
            descriptor_pool,
            descriptor_set_layout,
            texture,
            command_pool,
            device_info,
            device,
            surface,
            instance,
            framebuffer_size,
            current_frame: 0,
            errored: false,
        })
    }

    /// Records the window's new framebuffer size.
    ///
    /// The actual rebuild happens lazily when acquire or present report the
    /// swapchain stale; this only keeps the fallback extent current.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        self.framebuffer_size = (width, height);
    }

    /// Renders one frame from the given quad instances.
    ///
    /// A stale swapchain (window resize, minimize) is handled internally by
    /// rebuilding and skipping the frame. Any other failure is fatal: the
    /// engine latches into a failed state and every further call returns
    /// [`RhiError::EngineFailed`].
    pub fn draw_frame(&mut self, quads: &[QuadData]) -> RhiResult<()> {
        if self.errored {
            return Err(RhiError::EngineFailed);
        }

        match self.draw_frame_inner(quads) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.errored = true;
                error!("draw_frame failed: {e}");
                Err(e)
            }
        }
    }

    fn draw_frame_inner(&mut self, quads: &[QuadData]) -> RhiResult<()> {
        self.frames[self.current_frame].in_flight.wait(u64::MAX)?;

        let image_available = self.frames[self.current_frame].image_available.handle();
        let image_index = match self.swapchain.acquire_next_image(image_available) {
            Ok((index, false)) => index,
            Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                return self.recreate_swapchain();
            }
            Err(e) => return Err(e.into()),
        };

        {
            let frame = &self.frames[self.current_frame];
            frame.in_flight.reset()?;
            frame.command_buffer.reset()?;
        }

        let instance_count = quads.len().min(INSTANCE_CAPACITY) as u32;
        self.record_commands(image_index, instance_count)?;

        // Write through the persistent mapping; host-coherent memory needs
        // no flush, and the fence wait above guarantees the GPU is done
        // with this slot's buffer.
        self.frames[self.current_frame].instance_buffer.write(quads);

        let frame = &self.frames[self.current_frame];
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer.handle()];
        let signal_semaphores = [frame.render_finished.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer is recorded, the semaphores belong to
        // this slot, and the fence was reset above.
        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                frame.in_flight.handle(),
            )?;
        }

        match self.swapchain.present(
            self.device.present_queue(),
            image_index,
            frame.render_finished.handle(),
        ) {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                return self.recreate_swapchain();
            }
            Err(e) => return Err(e.into()),
        }

        self.current_frame = next_frame(self.current_frame);
        if let Some(old) = self.retired_swapchain.tick() {
            drop(old);
            info!("Released retired swapchain generation");
        }

        Ok(())
    }

    /// Records this frame's command buffer.
    fn record_commands(&self, image_index: u32, instance_count: u32) -> RhiResult<()> {
        let frame = &self.frames[self.current_frame];
        let cmd = frame.command_buffer.handle();
        let extent = self.swapchain.extent();
        let device = self.device.handle();

        frame.command_buffer.begin()?;

        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        };
        let clear_values = [clear_value];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(self.swapchain.framebuffer(image_index as usize))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        // SAFETY: the command buffer is recording; every bound handle is
        // live for the duration of the submission.
        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(cmd, 0, &[scissor]);

            let push_constants = PushConstants {
                instance_buffer: frame.instance_buffer.device_address(),
            };
            device.cmd_push_constants(
                cmd,
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push_constants),
            );

            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout.handle(),
                0,
                &[frame.descriptor_set],
                &[],
            );

            // Four strip vertices per quad, one instance per record.
            device.cmd_draw(cmd, 4, instance_count, 0, 0);

            device.cmd_end_render_pass(cmd);
        }

        frame.command_buffer.end()?;
        Ok(())
    }

    /// Rebuilds the swapchain after an out-of-date or suboptimal result.
    ///
    /// Surface capabilities, formats and present modes are re-queried first
    /// (they may all have changed). A minimized surface (0x0) is a
    /// success-no-op: the caller keeps polling and a later acquire retries.
    /// The replaced generation is parked for as many frames as it has
    /// framebuffers before being dropped, so no in-flight frame loses its
    /// attachments.
    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        self.device_info
            .refresh_surface_info(self.surface.handle(), self.surface.loader())?;

        if surface_minimized(&self.device_info.surface_capabilities) {
            return Ok(());
        }

        let new_swapchain = SwapchainResources::new(
            self.instance.handle(),
            self.device.clone(),
            &self.device_info,
            self.surface.handle(),
            self.framebuffer_size,
            self.swapchain.handle(),
        )?;

        let old = std::mem::replace(&mut self.swapchain, new_swapchain);
        let lifetime = old.framebuffer_count();
        self.retired_swapchain.arm(old, lifetime);

        info!(
            "Swapchain recreated; previous generation retired for {} frames",
            lifetime
        );
        Ok(())
    }

    /// Whether the engine has latched into its failed state.
    pub fn has_error(&self) -> bool {
        self.errored
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        // Block until all submitted work completes, then let the fields
        // release in declaration order (reverse dependency order).
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during engine teardown: {e}");
        }
        info!("Render engine shut down");
    }
}
