//! Framebuffer management

use ash::{vk, Device};

use crate::vulkan::{VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }
            .map_err(VulkanError::api("vkCreateFramebuffer"))?;

        Ok(Self {
            device: device.clone(),
            framebuffer,
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Image views for one framebuffer, in render pass attachment order
///
/// `color` is the shared multisampled target and is ignored at one sample,
/// where the per-image `view` is rendered to directly.
pub fn framebuffer_attachments(
    color: Option<vk::ImageView>,
    depth: vk::ImageView,
    view: vk::ImageView,
    samples: vk::SampleCountFlags,
) -> Vec<vk::ImageView> {
    match color {
        Some(color) if samples != vk::SampleCountFlags::TYPE_1 => vec![color, depth, view],
        _ => vec![view, depth],
    }
}

/// Clear values matching [`framebuffer_attachments`] order
///
/// The resolve target's entry is never read since it is not cleared.
pub fn clear_values(color: [f32; 4], samples: vk::SampleCountFlags) -> Vec<vk::ClearValue> {
    let color = vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    };
    let depth = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
    };

    if samples == vk::SampleCountFlags::TYPE_1 {
        vec![color, depth]
    } else {
        vec![color, depth, color]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_multisampled_order_is_color_depth_view() {
        let attachments = framebuffer_attachments(Some(view(1)), view(2), view(3), vk::SampleCountFlags::TYPE_8);
        assert_eq!(attachments, vec![view(1), view(2), view(3)]);
    }

    #[test]
    fn test_single_sample_renders_into_view() {
        let attachments = framebuffer_attachments(None, view(2), view(3), vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments, vec![view(3), view(2)]);

        let ignored = framebuffer_attachments(Some(view(1)), view(2), view(3), vk::SampleCountFlags::TYPE_1);
        assert_eq!(ignored, vec![view(3), view(2)]);
    }

    #[test]
    fn test_clear_values_match_attachment_count() {
        assert_eq!(clear_values([0.0; 4], vk::SampleCountFlags::TYPE_1).len(), 2);
        assert_eq!(clear_values([0.0; 4], vk::SampleCountFlags::TYPE_4).len(), 3);

        let values = clear_values([0.0; 4], vk::SampleCountFlags::TYPE_1);
        let depth = unsafe { values[1].depth_stencil };
        assert!((depth.depth - 1.0).abs() < f32::EPSILON);
    }
}
