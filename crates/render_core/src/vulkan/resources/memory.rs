//! Memory-type selection

use ash::vk;

use crate::vulkan::{VulkanError, VulkanResult};

/// Find the lowest memory type index allowed by `type_filter` that has all `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = (memory_properties.memory_type_count as usize).min(memory_properties.memory_types.len());

    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, memory_type)| {
            (type_filter & (1 << i)) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
        .ok_or(VulkanError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}
