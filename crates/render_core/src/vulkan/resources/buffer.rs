//! Buffer allocation
//!
//! Buffers own their memory. Creation is all-or-nothing: if any step fails,
//! whatever was already created is released before the error is returned.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::commands::submit_single_time;
use crate::vulkan::resources::memory::find_memory_type;
use crate::vulkan::{VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct BufferResource {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl BufferResource {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = ctx.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .map_err(VulkanError::api("vkCreateBuffer"))?;

        let memory = match Self::allocate_and_bind(ctx, &device, buffer, properties) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            usage,
        })
    }

    fn allocate_and_bind(
        ctx: &DeviceContext,
        device: &Device,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            find_memory_type(&ctx.adapter().memory_properties, requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }
            .map_err(VulkanError::api("vkAllocateMemory"))?;

        if let Err(result) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(VulkanError::api("vkBindBufferMemory")(result));
        }

        Ok(memory)
    }

    /// Host-visible transfer source filled with `data`
    pub fn staging_with<T: Pod>(ctx: &DeviceContext, data: &[T]) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let staging = Self::new(
            ctx,
            bytes.len().max(1) as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write(data)?;
        Ok(staging)
    }

    /// Device-local buffer with `data` uploaded through a scoped staging buffer
    pub fn device_local_with<T: Pod>(
        ctx: &DeviceContext,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let staging = Self::staging_with(ctx, data)?;
        let buffer = Self::new(
            ctx,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        copy_buffer(ctx, &staging, &buffer, staging.size)?;
        Ok(buffer)
    }

    /// Copy `data` into host-visible memory
    pub fn write<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Writing {} bytes into a {}-byte buffer", bytes.len(), self.size),
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::api("vkMapMemory"))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Copy `size` bytes between buffers with a single-use command buffer
pub fn copy_buffer(
    ctx: &DeviceContext,
    src: &BufferResource,
    dst: &BufferResource,
    size: vk::DeviceSize,
) -> VulkanResult<()> {
    if size > src.size || size > dst.size {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "Copy of {size} bytes exceeds source ({}) or destination ({})",
                src.size, dst.size
            ),
        });
    }

    submit_single_time(ctx, |cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            ctx.device().cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
        }
        Ok(())
    })
}
