//! Descriptor set management.
//!
//! The quad pipeline binds exactly one shader-visible resource: the atlas
//! texture as a combined image sampler in the fragment stage. Each frame in
//! flight gets its own set so descriptor updates never race GPU reads.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout: binding 0 = combined image sampler, fragment
/// stage.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates the single-binding layout the quad pipeline uses.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT);

        let bindings = [binding];
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        // SAFETY: create_info references live within this scope.
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Descriptor set layout created");
        Ok(Self { device, layout })
    }

    /// Returns the Vulkan layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: sets referencing the layout are freed with their pool.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Descriptor set layout destroyed");
    }
}

/// Descriptor pool sized for the per-frame sampler sets.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a pool holding `set_count` combined-image-sampler sets.
    pub fn new(device: Arc<Device>, set_count: u32) -> RhiResult<Self> {
        let pool_size = vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(set_count);

        let pool_sizes = [pool_size];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(set_count)
            .pool_sizes(&pool_sizes);

        // SAFETY: create_info references live within this scope.
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        info!("Descriptor pool created for {} sets", set_count);
        Ok(Self { device, pool })
    }

    /// Allocates one set per copy of `layout`.
    ///
    /// The sets are freed implicitly when the pool is destroyed.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        // SAFETY: the pool was sized for at least `count` sets.
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&allocate_info)? };
        Ok(sets)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: the engine waits for device idle before teardown.
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
        debug!("Descriptor pool destroyed");
    }
}

/// Points `set`'s binding 0 at the given texture view and sampler.
pub fn write_texture(
    device: &Device,
    set: vk::DescriptorSet,
    view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let image_infos = [image_info];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_infos);

    // SAFETY: the set is not in use by any pending command buffer (writes
    // happen before the first frame).
    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}
