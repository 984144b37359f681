//! Command buffer management
//!
//! The graphics command pool and the single-use command buffer path every
//! upload, copy and one-off layout transition goes through.

use ash::{vk, Device};

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }
            .map_err(VulkanError::api("vkCreateCommandPool"))?;

        Ok(Self { device, command_pool })
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees every buffer allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Allocate primary command buffers from the context's pool
pub fn allocate_command_buffers(ctx: &DeviceContext, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(ctx.command_pool())
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { ctx.device().allocate_command_buffers(&alloc_info) }
        .map_err(VulkanError::api("vkAllocateCommandBuffers"))
}

/// Return command buffers to the context's pool
pub fn free_command_buffers(ctx: &DeviceContext, command_buffers: &[vk::CommandBuffer]) {
    if command_buffers.is_empty() {
        return;
    }
    unsafe {
        ctx.device().free_command_buffers(ctx.command_pool(), command_buffers);
    }
}

/// Frees its command buffer however the submission ends
struct SingleUseBuffer<'a> {
    ctx: &'a DeviceContext,
    command_buffer: vk::CommandBuffer,
}

impl Drop for SingleUseBuffer<'_> {
    fn drop(&mut self) {
        free_command_buffers(self.ctx, &[self.command_buffer]);
    }
}

/// Record and execute a one-off command buffer on the graphics queue
///
/// Allocates a primary buffer, begins it for one-time submission, lets `record`
/// fill it, submits, and blocks until the queue is idle. The buffer is freed
/// on every path, including errors from `record`.
pub fn submit_single_time<R>(
    ctx: &DeviceContext,
    record: impl FnOnce(vk::CommandBuffer) -> VulkanResult<R>,
) -> VulkanResult<R> {
    let command_buffer = allocate_command_buffers(ctx, 1)?
        .into_iter()
        .next()
        .ok_or_else(|| VulkanError::InitializationFailed("Driver returned no command buffer".to_string()))?;
    let guard = SingleUseBuffer { ctx, command_buffer };
    let device = ctx.device();

    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(guard.command_buffer, &begin_info) }
        .map_err(VulkanError::api("vkBeginCommandBuffer"))?;

    let output = record(guard.command_buffer)?;

    unsafe { device.end_command_buffer(guard.command_buffer) }
        .map_err(VulkanError::api("vkEndCommandBuffer"))?;

    let command_buffers = [guard.command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

    unsafe {
        device
            .queue_submit(ctx.graphics_queue(), &[submit_info.build()], vk::Fence::null())
            .map_err(VulkanError::api("vkQueueSubmit"))?;
        device
            .queue_wait_idle(ctx.graphics_queue())
            .map_err(VulkanError::api("vkQueueWaitIdle"))?;
    }

    Ok(output)
}
