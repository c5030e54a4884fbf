//! GPU memory-type resolution.
//!
//! Vulkan reports which memory types a resource may live in as a bitmask in
//! its memory requirements; the caller picks one whose property flags cover
//! what the CPU side needs. Resolution is a first-fit linear scan, the way
//! the Vulkan samples do it.

use ash::vk;

/// Finds the first memory type index compatible with `type_bits` whose
/// property flags are a superset of `required`.
///
/// Returns `None` when no memory type qualifies; callers treat that as
/// fatal ([`crate::RhiError::NoSuitableMemoryType`]) since the engine
/// cannot allocate the resource at all.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let supported = type_bits & (1 << i) != 0;
        let flags = memory_properties.memory_types[i as usize].property_flags;
        supported && flags.contains(required)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn picks_first_compatible_type() {
        let properties = make_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // All types eligible: the scan stops at the first match.
        let index = find_memory_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn respects_the_eligibility_bitmask() {
        // Types 1 and 3 eligible, but only type 3 carries the wanted flags.
        let properties = make_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &properties,
            0b1010,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Some(3));
    }

    #[test]
    fn no_match_is_none() {
        let properties = make_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let index = find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(index, None);

        // Flags exist but the bitmask excludes the type.
        let properties = make_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let index = find_memory_type(&properties, 0b0, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(index, None);
    }
}
