//! GPU buffer management.
//!
//! Buffers here are host-writable by construction: the whole allocation is
//! mapped once at creation and the CPU writes straight through the pointer.
//! Host-coherent memory makes explicit flushes unnecessary. Two usage
//! policies exist:
//!
//! - [`BufferUsage::Instance`]: per-frame instance storage the shader
//!   indexes via its device address. Lives in memory that is both
//!   device-local and host-visible so writes need no staging hop.
//! - [`BufferUsage::Staging`]: transfer source for one-time uploads.

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::find_memory_type;

/// Buffer usage policy.
///
/// Selects the Vulkan usage flags, the memory properties, and whether a
/// device address is retrieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Shader-indexed instance storage, addressed via push constant.
    Instance,
    /// CPU-written transfer source for one-shot uploads.
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Instance => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// The memory properties this usage requires.
    ///
    /// Instance buffers additionally demand device-local memory so shader
    /// reads stay fast; both are host-visible and coherent for direct
    /// writes through the mapping.
    pub fn memory_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Instance => {
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            BufferUsage::Staging => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Whether this usage retrieves a buffer device address.
    pub fn needs_device_address(self) -> bool {
        matches!(self, BufferUsage::Instance)
    }

    /// Human-readable name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Instance => "instance",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A typed, persistently mapped GPU buffer of `capacity` elements.
///
/// Exclusively owned by whatever resource set holds it (one instance buffer
/// per frame in flight, one staging buffer per upload).
pub struct Buffer<T: Pod> {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Backing memory allocation.
    memory: vk::DeviceMemory,
    /// Persistently mapped base pointer.
    mapped: *mut T,
    /// Element capacity.
    capacity: usize,
    /// Device address (only for [`BufferUsage::Instance`] buffers).
    device_address: vk::DeviceAddress,
    usage: BufferUsage,
    _marker: PhantomData<T>,
}

impl<T: Pod> Buffer<T> {
    /// Creates a buffer of `capacity` elements and maps it.
    ///
    /// The buffer uses exclusive sharing on the graphics queue family. The
    /// memory type is resolved with [`find_memory_type`] against the policy
    /// flags of `usage`; no matching type is fatal. For instance buffers
    /// the device address is retrieved and a null address is fatal too.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation, memory allocation, binding,
    /// address retrieval or mapping fails.
    pub fn new(
        device: Arc<Device>,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        usage: BufferUsage,
        capacity: usize,
    ) -> RhiResult<Self> {
        let size = (std::mem::size_of::<T>() * capacity) as vk::DeviceSize;
        let queue_families = [device.graphics_family()];

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families);

        // SAFETY: buffer_info references live within this scope.
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        // SAFETY: buffer is a live handle.
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let memory_type = match find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            usage.memory_flags(),
        ) {
            Some(index) => index,
            None => {
                // SAFETY: nothing else references the buffer yet.
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(RhiError::NoSuitableMemoryType(usage.name()));
            }
        };

        let mut allocate_flags =
            vk::MemoryAllocateFlagsInfo::default().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        if usage.needs_device_address() {
            allocate_info = allocate_info.push_next(&mut allocate_flags);
        }

        // SAFETY: allocate_info is valid; every failure path below releases
        // the objects created so far.
        unsafe {
            let memory = match device.handle().allocate_memory(&allocate_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    device.handle().destroy_buffer(buffer, None);
                    return Err(e.into());
                }
            };

            let bind_and_map = || -> RhiResult<(vk::DeviceAddress, *mut T)> {
                device.handle().bind_buffer_memory(buffer, memory, 0)?;

                let device_address = if usage.needs_device_address() {
                    let address_info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
                    let address = device.handle().get_buffer_device_address(&address_info);
                    if address == 0 {
                        return Err(RhiError::NullDeviceAddress);
                    }
                    address
                } else {
                    0
                };

                let mapped = device
                    .handle()
                    .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?
                    .cast::<T>();

                Ok((device_address, mapped))
            };

            let (device_address, mapped) = match bind_and_map() {
                Ok(bound) => bound,
                Err(e) => {
                    device.handle().free_memory(memory, None);
                    device.handle().destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            debug!(
                "Created {} buffer: {} x {} bytes",
                usage.name(),
                capacity,
                std::mem::size_of::<T>()
            );

            Ok(Self {
                device,
                buffer,
                memory,
                mapped,
                capacity,
                device_address,
                usage,
                _marker: PhantomData,
            })
        }
    }

    /// Copies `data` into the buffer through the persistent mapping.
    ///
    /// The memory is host-coherent, so no flush is needed; the fence chain
    /// guarantees the GPU is not reading this buffer while we write it.
    /// Writes beyond the capacity are truncated.
    ///
    /// Returns the number of elements written.
    pub fn write(&mut self, data: &[T]) -> usize {
        let count = data.len().min(self.capacity);
        if count < data.len() {
            warn!(
                "{} buffer full: writing {} of {} elements",
                self.usage.name(),
                count,
                data.len()
            );
        }

        // SAFETY: mapped covers `capacity` elements and the GPU is not
        // accessing the range (enforced by the caller's fence wait).
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped, count);
        }
        count
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer's device address.
    ///
    /// Zero for buffers created without [`BufferUsage::Instance`].
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    /// Returns the element capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Pod> Drop for Buffer<T> {
    fn drop(&mut self) {
        // SAFETY: handles are live and the caller guarantees no GPU work
        // references them (engine teardown waits for idle first).
        unsafe {
            self.device.handle().unmap_memory(self.memory);
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_buffers_are_addressable_storage() {
        let flags = BufferUsage::Instance.to_vk_usage();
        assert!(flags.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(flags.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS));
        assert!(BufferUsage::Instance.needs_device_address());
    }

    #[test]
    fn staging_buffers_are_transfer_sources() {
        let flags = BufferUsage::Staging.to_vk_usage();
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(!BufferUsage::Staging.needs_device_address());
    }

    #[test]
    fn memory_policy_matches_usage() {
        let instance = BufferUsage::Instance.memory_flags();
        assert!(instance.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
        assert!(instance.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(instance.contains(vk::MemoryPropertyFlags::HOST_COHERENT));

        let staging = BufferUsage::Staging.memory_flags();
        assert!(!staging.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
        assert!(staging.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(staging.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
    }
}
