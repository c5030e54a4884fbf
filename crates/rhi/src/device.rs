//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation and queue retrieval. The device is
//! created with exactly the feature set the selector verified: 64-bit
//! shader integers and sampler anisotropy from the base features, scalar
//! block layout and buffer device address from Vulkan 1.2.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiResult;
use crate::physical_device::{PhysicalDeviceInfo, DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
///
/// Shared across the engine's resources via `Arc` so each wrapper can
/// destroy its handle in its own `Drop`.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle the logical device was created from.
    physical_device: vk::PhysicalDevice,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle (may equal the graphics queue).
    present_queue: vk::Queue,
    /// Graphics queue family index.
    graphics_family: u32,
    /// Presentation queue family index.
    present_family: u32,
}

impl Device {
    /// Creates the logical device and retrieves its queues.
    ///
    /// One queue is created per unique queue family; graphics and
    /// presentation may share a family, in which case they share a queue.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn new(
        instance: &ash::Instance,
        info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let mut unique_families = vec![info.graphics_family];
        if info.present_family != info.graphics_family {
            unique_families.push(info.present_family);
        }

        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();
        debug!("Creating queue(s) for families {:?}", unique_families);

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .scalar_block_layout(true)
            .buffer_device_address(true);

        let features = vk::PhysicalDeviceFeatures::default()
            .shader_int64(true)
            .sampler_anisotropy(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_2);

        // SAFETY: the physical device was enumerated from this instance and
        // the selector verified every requested feature and extension.
        let device = unsafe { instance.create_device(info.device, &create_info, None)? };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        // SAFETY: both families were verified to exist on this device.
        let graphics_queue = unsafe { device.get_device_queue(info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(info.present_family, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device: info.device,
            graphics_queue,
            present_queue,
            graphics_family: info.graphics_family,
            present_family: info.present_family,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the graphics queue family index.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Returns the presentation queue family index.
    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Blocks until all outstanding operations on all queues complete.
    ///
    /// Used before destroying resources and during engine teardown.
    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: the device handle is live.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: every resource holding an Arc<Device> has been dropped by
        // the time the last reference releases, so nothing is in flight.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync and the queue/family fields are plain
// handles.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_extension_is_required() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
