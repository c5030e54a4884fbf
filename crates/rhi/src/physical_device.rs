//! Physical device (GPU) selection.
//!
//! This module enumerates the available GPUs, filters out every device that
//! cannot run the quad pipeline, scores the survivors and picks the best
//! one. A device is skipped when it lacks:
//!
//! - a graphics-capable queue family
//! - a queue family that can present to the surface
//! - the required device extensions (`VK_KHR_swapchain`)
//! - at least one surface format and one present mode
//! - any of the required features (64-bit shader integers, sampler
//!   anisotropy, scalar block layout, buffer device address)
//!
//! Scoring is deliberately simple: discrete GPUs get one point, everything
//! else gets zero, and ties keep the first device the driver enumerated.

use std::collections::HashSet;
use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};

/// Device extensions every candidate must support.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Snapshot of the device features the engine requires.
///
/// Queried through the `PhysicalDeviceFeatures2` chain so the Vulkan 1.2
/// members are visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    /// 64-bit integers in shaders (the push-constant buffer address).
    pub shader_int64: bool,
    /// Anisotropic filtering for the atlas sampler.
    pub sampler_anisotropy: bool,
    /// Scalar block layout for the instance storage buffer.
    pub scalar_block_layout: bool,
    /// Buffer device address for shader-indexed instance fetch.
    pub buffer_device_address: bool,
}

impl DeviceFeatures {
    /// Returns the name of the first missing feature, or `None` when the
    /// full set is supported.
    pub fn missing(&self) -> Option<&'static str> {
        if !self.shader_int64 {
            Some("shaderInt64")
        } else if !self.sampler_anisotropy {
            Some("samplerAnisotropy")
        } else if !self.scalar_block_layout {
            Some("scalarBlockLayout")
        } else if !self.buffer_device_address {
            Some("bufferDeviceAddress")
        } else {
            None
        }
    }
}

/// Capability snapshot of the selected GPU.
///
/// Immutable after selection except for the surface-dependent fields
/// (`surface_capabilities`, `surface_formats`, `present_modes`), which are
/// refreshed by [`PhysicalDeviceInfo::refresh_surface_info`] whenever the
/// swapchain has to be rebuilt.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, device type).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory properties used for memory-type resolution.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Supported surface formats; the first entry is the fallback default.
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Surface capabilities (image count bounds, extent bounds, transform).
    pub surface_capabilities: vk::SurfaceCapabilitiesKHR,
    /// Queue family with graphics support.
    pub graphics_family: u32,
    /// Queue family with presentation support (may equal `graphics_family`).
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Device".to_owned())
    }

    /// Whether one queue family serves both graphics and presentation.
    ///
    /// Decides the swapchain image sharing mode.
    #[inline]
    pub fn unified_queue(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Re-queries the surface-dependent capability fields.
    ///
    /// Called before every swapchain rebuild: formats, present modes and
    /// extent bounds may all change when the window moves between outputs.
    pub fn refresh_surface_info(
        &mut self,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<()> {
        // SAFETY: device and surface are live handles from the same instance.
        unsafe {
            self.surface_capabilities = surface_loader
                .get_physical_device_surface_capabilities(self.device, surface)?;
            self.surface_formats =
                surface_loader.get_physical_device_surface_formats(self.device, surface)?;
            self.present_modes = surface_loader
                .get_physical_device_surface_present_modes(self.device, surface)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("graphics_family", &self.graphics_family)
            .field("present_family", &self.present_family)
            .field("formats", &self.surface_formats.len())
            .field("present_modes", &self.present_modes.len())
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// Enumerates all GPUs, skips unsuitable ones, and keeps the highest-scored
/// candidate; ties keep the first one encountered.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device passes filtering.
/// This is fatal and never retried: it means the machine cannot run the
/// game.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    // SAFETY: the instance handle is live.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        return Err(RhiError::NoSuitableGpu);
    }
    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(u32, PhysicalDeviceInfo)> = None;
    for device in devices {
        let Some((score, info)) = suitability(instance, device, surface, surface_loader)? else {
            continue;
        };
        debug!("GPU '{}' - score {}", info.device_name(), score);

        // Strict comparison keeps the first device on ties.
        if best.as_ref().map_or(true, |(max, _)| score > *max) {
            best = Some((score, info));
        }
    }

    match best {
        Some((score, info)) => {
            info!("Selected GPU '{}' (score {})", info.device_name(), score);
            Ok(info)
        }
        None => Err(RhiError::NoSuitableGpu),
    }
}

/// Computes the suitability score and capability snapshot for one device.
///
/// Returns `Ok(None)` when the device is unsuitable, with the reason logged
/// at debug level. The score is [`score_device_type`] of the device type.
fn suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Option<(u32, PhysicalDeviceInfo)>> {
    // SAFETY: device is a handle enumerated from this instance.
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let device_name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_owned());

    // The feature set below lives in Vulkan 1.2 core.
    if vk::api_version_major(properties.api_version) < 1
        || (vk::api_version_major(properties.api_version) == 1
            && vk::api_version_minor(properties.api_version) < 2)
    {
        debug!(
            "GPU '{}' skipped: Vulkan 1.2 not supported (version {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return Ok(None);
    }

    let Some((graphics_family, present_family)) =
        find_queue_families(instance, device, surface, surface_loader)?
    else {
        debug!("GPU '{}' skipped: missing graphics or present queue family", device_name);
        return Ok(None);
    };

    if let Some(extension) = missing_device_extension(instance, device)? {
        debug!("GPU '{}' skipped: extension {} not supported", device_name, extension);
        return Ok(None);
    }

    // SAFETY: device and surface are live handles.
    let surface_formats =
        unsafe { surface_loader.get_physical_device_surface_formats(device, surface)? };
    let present_modes =
        unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface)? };
    if surface_formats.is_empty() || present_modes.is_empty() {
        debug!("GPU '{}' skipped: no surface formats or present modes", device_name);
        return Ok(None);
    }
    let surface_capabilities =
        unsafe { surface_loader.get_physical_device_surface_capabilities(device, surface)? };

    let features = query_device_features(instance, device);
    if let Some(feature) = features.missing() {
        debug!("GPU '{}' skipped: feature {} not supported", device_name, feature);
        return Ok(None);
    }

    // SAFETY: device is a live handle.
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let score = score_device_type(properties.device_type);
    Ok(Some((
        score,
        PhysicalDeviceInfo {
            device,
            properties,
            memory_properties,
            surface_formats,
            present_modes,
            surface_capabilities,
            graphics_family,
            present_family,
        },
    )))
}

/// Scores a device by its type: discrete GPUs beat everything else.
pub fn score_device_type(device_type: vk::PhysicalDeviceType) -> u32 {
    if device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        1
    } else {
        0
    }
}

/// Finds the graphics and presentation queue family indices.
///
/// Returns `None` unless both are available. The two indices may coincide;
/// the first matching family wins for each role.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Option<(u32, u32)>> {
    // SAFETY: device is a live handle.
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut graphics = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(i);
        }

        if present.is_none() {
            // SAFETY: i is a valid queue family index for this device.
            let support = unsafe {
                surface_loader.get_physical_device_surface_support(device, i, surface)?
            };
            if support {
                present = Some(i);
            }
        }

        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    Ok(graphics.zip(present))
}

/// Returns the name of the first required device extension the device does
/// not advertise, or `None` when everything is supported.
fn missing_device_extension(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> RhiResult<Option<String>> {
    // SAFETY: device is a live handle.
    let available = unsafe { instance.enumerate_device_extension_properties(device)? };

    let mut required: HashSet<String> = DEVICE_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string_lossy().into_owned())
        .collect();

    for property in &available {
        if let Ok(name) = property.extension_name_as_c_str() {
            required.remove(&name.to_string_lossy().into_owned());
        }
    }

    Ok(required.into_iter().next())
}

/// Queries the required feature set through the features2 chain.
fn query_device_features(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> DeviceFeatures {
    let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features_1_2);

    // SAFETY: device is a live handle and the chain outlives the call.
    unsafe {
        instance.get_physical_device_features2(device, &mut features2);
    }

    // Copy the base features out before touching the chained struct again;
    // features2 holds a mutable borrow of features_1_2.
    let base = features2.features;

    DeviceFeatures {
        shader_int64: base.shader_int64 == vk::TRUE,
        sampler_anisotropy: base.sampler_anisotropy == vk::TRUE,
        scalar_block_layout: features_1_2.scalar_block_layout == vk::TRUE,
        buffer_device_address: features_1_2.buffer_device_address == vk::TRUE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_feature_set_has_nothing_missing() {
        let features = DeviceFeatures {
            shader_int64: true,
            sampler_anisotropy: true,
            scalar_block_layout: true,
            buffer_device_address: true,
        };
        assert_eq!(features.missing(), None);
    }

    #[test]
    fn missing_reports_each_absent_feature() {
        let mut features = DeviceFeatures {
            shader_int64: true,
            sampler_anisotropy: true,
            scalar_block_layout: true,
            buffer_device_address: false,
        };
        assert_eq!(features.missing(), Some("bufferDeviceAddress"));

        features.scalar_block_layout = false;
        assert_eq!(features.missing(), Some("scalarBlockLayout"));

        features.sampler_anisotropy = false;
        assert_eq!(features.missing(), Some("samplerAnisotropy"));

        features.shader_int64 = false;
        assert_eq!(features.missing(), Some("shaderInt64"));
    }

    #[test]
    fn discrete_gpus_outscore_everything_else() {
        assert_eq!(score_device_type(vk::PhysicalDeviceType::DISCRETE_GPU), 1);
        assert_eq!(score_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU), 0);
        assert_eq!(score_device_type(vk::PhysicalDeviceType::VIRTUAL_GPU), 0);
        assert_eq!(score_device_type(vk::PhysicalDeviceType::CPU), 0);
        assert_eq!(score_device_type(vk::PhysicalDeviceType::OTHER), 0);
    }

    #[test]
    fn strict_max_keeps_first_on_ties() {
        // Mirrors the selection loop: strict `>` comparison.
        let scores = [0u32, 1, 1, 0];
        let mut best: Option<(usize, u32)> = None;
        for (i, &score) in scores.iter().enumerate() {
            if best.map_or(true, |(_, max)| score > max) {
                best = Some((i, score));
            }
        }
        assert_eq!(best, Some((1, 1)));
    }
}
