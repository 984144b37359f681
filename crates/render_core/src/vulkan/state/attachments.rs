//! Shared color and depth targets for a set of framebuffers

use ash::vk;

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::framebuffer::framebuffer_attachments;
use crate::vulkan::rendering::layout::transition_image_layout;
use crate::vulkan::resources::image::{ImageResource, ImageSpec};
use crate::vulkan::VulkanResult;

/// Multisampled color target (only when MSAA is on) and depth target
///
/// One set is shared by every framebuffer of a swapchain.
pub struct RenderAttachments {
    color: Option<ImageResource>,
    depth: ImageResource,
    samples: vk::SampleCountFlags,
}

impl RenderAttachments {
    /// Create targets of `extent` for color `format` at the device sample count
    pub fn new(ctx: &DeviceContext, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<Self> {
        let samples = ctx.sample_count();

        let color = if samples == vk::SampleCountFlags::TYPE_1 {
            None
        } else {
            Some(ImageResource::new(ctx, &ImageSpec::color_attachment(extent, format, samples))?)
        };

        let mut depth = ImageResource::new(ctx, &ImageSpec::depth_attachment(extent, ctx.depth_format(), samples))?;
        transition_image_layout(ctx, &mut depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?;

        Ok(Self { color, depth, samples })
    }

    /// Multisampled color view, if any
    pub fn color_view(&self) -> Option<vk::ImageView> {
        self.color.as_ref().map(ImageResource::view)
    }

    /// Depth view
    pub fn depth_view(&self) -> vk::ImageView {
        self.depth.view()
    }

    /// Attachment list for a framebuffer presenting `view`
    pub fn attachments_for(&self, view: vk::ImageView) -> Vec<vk::ImageView> {
        framebuffer_attachments(self.color_view(), self.depth_view(), view, self.samples)
    }
}
