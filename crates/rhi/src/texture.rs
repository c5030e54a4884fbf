//! Texture loading and upload.
//!
//! The game samples a single greyscale atlas. Loading decodes the asset to
//! 8-bit luma, writes it into a host-visible staging buffer, then runs
//! three synchronous one-shot submissions: transition the device-local
//! `R8_UNORM` image to TRANSFER_DST, copy the staging buffer in, and
//! transition to SHADER_READ_ONLY. This happens once at startup, so the
//! blocking uploads cost nothing that matters.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandPool, OneShotCommands};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::find_memory_type;
use crate::physical_device::PhysicalDeviceInfo;

/// A sampled greyscale texture: image + memory + view + sampler.
pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    /// Loads `path`, uploads it, and builds the view and sampler.
    ///
    /// The staging buffer exists only for the duration of the upload.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding, any allocation, or any of the upload
    /// submissions fail.
    pub fn load(
        device: Arc<Device>,
        info: &PhysicalDeviceInfo,
        pool: &CommandPool,
        path: &Path,
    ) -> RhiResult<Self> {
        let decoded = image::open(path)
            .map_err(|e| RhiError::TextureError(format!("couldn't load {}: {e}", path.display())))?
            .to_luma8();
        let (width, height) = decoded.dimensions();
        let pixels = decoded.into_raw();

        info!("Loaded texture {} ({}x{})", path.display(), width, height);

        let mut staging = Buffer::<u8>::new(
            device.clone(),
            &info.memory_properties,
            BufferUsage::Staging,
            pixels.len(),
        )?;
        staging.write(&pixels);

        let (image, memory) = create_device_image(&device, info, width, height)?;

        // Failures past this point must release the half-built image.
        let upload = || -> RhiResult<(vk::ImageView, vk::Sampler)> {
            transition_layout(
                &device,
                pool,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            copy_staging_to_image(&device, pool, staging.handle(), image, width, height)?;
            transition_layout(
                &device,
                pool,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;

            let view = create_view(&device, image)?;
            let sampler = match create_sampler(&device, info) {
                Ok(sampler) => sampler,
                Err(e) => {
                    // SAFETY: nothing references the view yet.
                    unsafe { device.handle().destroy_image_view(view, None) };
                    return Err(e);
                }
            };
            Ok((view, sampler))
        };

        match upload() {
            Ok((view, sampler)) => {
                info!("Texture uploaded and sampler created");
                Ok(Self {
                    device,
                    image,
                    memory,
                    view,
                    sampler,
                })
            }
            Err(e) => {
                // SAFETY: the upload queue was drained by the one-shot
                // submissions (or never touched the image).
                unsafe {
                    device.handle().destroy_image(image, None);
                    device.handle().free_memory(memory, None);
                }
                Err(e)
            }
        }
    }

    /// Returns the image view for descriptor writes.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the sampler for descriptor writes.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // SAFETY: the engine waits for device idle before teardown.
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
            self.device.handle().free_memory(self.memory, None);
        }
        tracing::debug!("Texture destroyed");
    }
}

/// Creates the device-local `R8_UNORM` image and binds its memory.
fn create_device_image(
    device: &Arc<Device>,
    info: &PhysicalDeviceInfo,
    width: u32,
    height: u32,
) -> RhiResult<(vk::Image, vk::DeviceMemory)> {
    let queue_families = [device.graphics_family()];
    let create_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk::Format::R8_UNORM)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .queue_family_indices(&queue_families)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    // SAFETY: create_info references live within this scope.
    let image = unsafe { device.handle().create_image(&create_info, None)? };

    // SAFETY: the image handle is live.
    let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

    let memory_type = match find_memory_type(
        &info.memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) {
        Some(index) => index,
        None => {
            // SAFETY: nothing else references the image yet.
            unsafe { device.handle().destroy_image(image, None) };
            return Err(RhiError::NoSuitableMemoryType("texture"));
        }
    };

    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type);

    // SAFETY: allocate_info is valid; on bind failure both objects are
    // released before returning.
    unsafe {
        let memory = device.handle().allocate_memory(&allocate_info, None)?;
        if let Err(e) = device.handle().bind_image_memory(image, memory, 0) {
            device.handle().free_memory(memory, None);
            device.handle().destroy_image(image, None);
            return Err(e.into());
        }
        Ok((image, memory))
    }
}

/// Records and synchronously submits one layout transition.
fn transition_layout(
    device: &Arc<Device>,
    pool: &CommandPool,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<()> {
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => {
            return Err(RhiError::TextureError(format!(
                "unsupported layout transition {old_layout:?} -> {new_layout:?}"
            )))
        }
    };

    let commands = OneShotCommands::begin(device.clone(), pool)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range());

    // SAFETY: the command buffer is recording and the image is live.
    unsafe {
        device.handle().cmd_pipeline_barrier(
            commands.handle(),
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    commands.submit_and_wait(device.graphics_queue())
}

/// Records and synchronously submits the staging-to-image copy.
fn copy_staging_to_image(
    device: &Arc<Device>,
    pool: &CommandPool,
    staging: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> RhiResult<()> {
    let commands = OneShotCommands::begin(device.clone(), pool)?;

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });

    // SAFETY: the image is in TRANSFER_DST_OPTIMAL (previous transition)
    // and the staging buffer outlives the synchronous submission.
    unsafe {
        device.handle().cmd_copy_buffer_to_image(
            commands.handle(),
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    commands.submit_and_wait(device.graphics_queue())
}

fn create_view(device: &Arc<Device>, image: vk::Image) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(vk::Format::R8_UNORM)
        .subresource_range(color_subresource_range());

    // SAFETY: the image is live.
    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

/// Creates the atlas sampler: linear filtering, repeat addressing, and
/// anisotropy at the device's reported maximum.
fn create_sampler(device: &Arc<Device>, info: &PhysicalDeviceInfo) -> RhiResult<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(info.properties.limits.max_sampler_anisotropy)
        .compare_op(vk::CompareOp::ALWAYS)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

    // SAFETY: create_info is valid for the duration of the call.
    let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
    Ok(sampler)
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}
