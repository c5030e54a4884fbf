//! Swapchain management.
//!
//! [`SwapchainResources`] owns one *generation* of presentables: the
//! swapchain, its images, one view per image, the render pass describing
//! how the quad pipeline draws into them, and one framebuffer per view.
//! The whole generation is created together and replaced wholesale when the
//! surface changes; the engine parks the previous generation until every
//! frame that might still reference it has presented.
//!
//! The build algorithm runs identically at startup and on every
//! recreation:
//!
//! 1. format: prefer `B8G8R8A8_SRGB` + `SRGB_NONLINEAR`, else the first
//!    format the surface reports
//! 2. present mode: prefer `MAILBOX`, else the always-available `FIFO`
//! 3. extent: the surface's current extent, unless it is the
//!    "match the framebuffer" sentinel, in which case the window
//!    framebuffer size clamped to the surface bounds
//! 4. image count: `min_image_count + 1`, clamped to `max_image_count`
//!    when that bound is nonzero
//! 5. sharing: exclusive when one family does graphics and present,
//!    concurrent across both families otherwise

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;
use crate::physical_device::PhysicalDeviceInfo;

/// Whether the surface currently has no drawable area (minimized window).
///
/// Swapchain recreation is skipped while this holds; the caller keeps
/// polling and retries once the surface has pixels again.
#[inline]
pub fn surface_minimized(capabilities: &vk::SurfaceCapabilitiesKHR) -> bool {
    capabilities.current_extent.width == 0 || capabilities.current_extent.height == 0
}

/// One generation of presentable images and everything rendered into them.
pub struct SwapchainResources {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl SwapchainResources {
    /// Builds a complete swapchain generation.
    ///
    /// # Arguments
    ///
    /// * `instance` - the Vulkan instance handle
    /// * `device` - the logical device
    /// * `info` - capability snapshot of the selected GPU (the caller
    ///   refreshes the surface fields before recreation)
    /// * `surface` - the window surface
    /// * `framebuffer_size` - current window framebuffer size in pixels,
    ///   used when the surface reports the sentinel extent
    /// * `old_swapchain` - the previous generation's handle (or null), so
    ///   the driver can reuse its resources
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object creation fails; partially
    /// created objects are destroyed before returning.
    pub fn new(
        instance: &ash::Instance,
        device: Arc<Device>,
        info: &PhysicalDeviceInfo,
        surface: vk::SurfaceKHR,
        framebuffer_size: (u32, u32),
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device.handle());

        let surface_format = choose_surface_format(&info.surface_formats);
        let present_mode = choose_present_mode(&info.present_modes);
        let extent = choose_extent(&info.surface_capabilities, framebuffer_size);
        let image_count = determine_image_count(&info.surface_capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let family_indices = [info.graphics_family, info.present_family];
        let (sharing_mode, family_indices_slice) = if info.unified_queue() {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        } else {
            debug!(
                "Concurrent sharing between graphics ({}) and present ({}) families",
                info.graphics_family, info.present_family
            );
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices_slice)
            .pre_transform(info.surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // SAFETY: create_info references live within this scope.
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        // Build incrementally into Self so Drop unwinds whatever exists if
        // a later step fails (destroying a null render pass is a no-op).
        let mut resources = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            format: surface_format.format,
            extent,
        };

        // SAFETY: the swapchain handle is live.
        resources.images =
            unsafe { resources.swapchain_loader.get_swapchain_images(swapchain)? };
        resources.image_views =
            create_image_views(&resources.device, &resources.images, surface_format.format)?;
        resources.render_pass = create_render_pass(&resources.device, surface_format.format)?;
        resources.framebuffers = create_framebuffers(
            &resources.device,
            resources.render_pass,
            &resources.image_views,
            extent,
        )?;

        info!("Swapchain created with {} images", resources.images.len());
        Ok(resources)
    }

    /// Acquires the next presentable image.
    ///
    /// `semaphore` is signaled once the image is actually available.
    /// Returns `(image_index, suboptimal)`; `ERROR_OUT_OF_DATE_KHR` and the
    /// suboptimal flag both mean the caller should rebuild.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> std::result::Result<(u32, bool), vk::Result> {
        // SAFETY: swapchain and semaphore are live handles.
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents `image_index`, waiting on `wait_semaphore` first.
    ///
    /// Returns the suboptimal flag; `ERROR_OUT_OF_DATE_KHR` surfaces as an
    /// error for the caller's recreation path.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> std::result::Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: all handles are live; the image index came from acquire.
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the swapchain handle (for chaining into a new generation).
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the image format of this generation.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the extent of this generation.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the render pass compatible with this generation's images.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the framebuffer for a given image index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    /// Number of framebuffers (== number of swapchain images).
    ///
    /// Also the number of presented frames a retired generation is kept
    /// alive for.
    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        // SAFETY: the engine waits for the frames referencing this
        // generation before dropping it; destruction is reverse creation
        // order, and the images themselves belong to the swapchain.
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
            self.device.handle().destroy_render_pass(self.render_pass, None);
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        debug!(
            "Swapchain generation destroyed ({}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Chooses the surface format: `B8G8R8A8_SRGB` with `SRGB_NONLINEAR` when
/// available, otherwise the first format the surface reports.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0])
}

/// Chooses the present mode: `MAILBOX` (low latency, no tearing) when
/// available, else `FIFO`, which every driver must support.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Chooses the swapchain extent.
///
/// The surface's current extent wins unless it is the `u32::MAX` sentinel
/// asking us to match the framebuffer, in which case the framebuffer size
/// is clamped to the surface bounds.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer_size.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer_size.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Determines the image count: one more than the minimum, clamped to the
/// maximum when the surface reports one (0 means unbounded).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Creates one color image view per swapchain image.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: the image belongs to a live swapchain. On failure the
        // views created so far are destroyed before returning.
        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for &view in &image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(e.into());
            }
        }
    }

    Ok(image_views)
}

/// Creates the single-subpass render pass for the quad pipeline.
///
/// One color attachment: cleared on load, stored, transitioned from
/// UNDEFINED to PRESENT_SRC. The external dependency orders our color
/// writes after whatever previously touched the attachment.
fn create_render_pass(device: &Device, format: vk::Format) -> RhiResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_reference = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let color_references = [color_reference];
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_references);

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];
    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    // SAFETY: create_info references live within this scope.
    let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
    Ok(render_pass)
}

/// Creates one framebuffer per image view.
fn create_framebuffers(
    device: &Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> RhiResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &view in image_views {
        let attachments = [view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        // SAFETY: render pass and view are live. On failure the
        // framebuffers created so far are destroyed before returning.
        match unsafe { device.handle().create_framebuffer(&create_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                for &framebuffer in &framebuffers {
                    unsafe { device.handle().destroy_framebuffer(framebuffer, None) };
                }
                return Err(e.into());
            }
        }
    }

    debug!("Created {} framebuffers", framebuffers.len());
    Ok(framebuffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_bgra_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_first_reported_format() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn prefers_mailbox_over_fifo() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_surface_report_when_defined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, (800, 600));
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn sentinel_extent_clamps_framebuffer_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        assert_eq!(
            choose_extent(&capabilities, (3000, 50)),
            vk::Extent2D {
                width: 2000,
                height: 100
            }
        );
        assert_eq!(
            choose_extent(&capabilities, (800, 600)),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        // max_image_count == 0 means unbounded.
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 4);
        assert!(determine_image_count(&capabilities) > 0);
    }

    #[test]
    fn minimized_surface_is_degenerate() {
        let minimized = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..Default::default()
        };
        assert!(surface_minimized(&minimized));

        let half_minimized = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 640,
                height: 0,
            },
            ..Default::default()
        };
        assert!(surface_minimized(&half_minimized));

        let visible = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            ..Default::default()
        };
        assert!(!surface_minimized(&visible));
    }
}
