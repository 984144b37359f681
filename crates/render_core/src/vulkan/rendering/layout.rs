//! Image layout transitions
//!
//! The set of authorized transitions is closed. Anything outside the table is a
//! programming error reported before a barrier is recorded.

use ash::{vk, Device};

use crate::vulkan::initialization::capabilities::has_stencil_component;
use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::commands::submit_single_time;
use crate::vulkan::resources::image::ImageResource;
use crate::vulkan::{VulkanError, VulkanResult};

/// A resolved transition: barrier masks and aspect for one (old, new) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout the image is leaving
    pub old_layout: vk::ImageLayout,
    /// Layout the image is entering
    pub new_layout: vk::ImageLayout,
    /// Stage that must complete first
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits
    pub dst_stage: vk::PipelineStageFlags,
    /// Accesses made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
    /// Aspect the barrier covers
    pub aspect: vk::ImageAspectFlags,
}

impl LayoutTransition {
    /// Look up `(old, new)` in the transition table
    pub fn resolve(old: vk::ImageLayout, new: vk::ImageLayout, format: vk::Format) -> VulkanResult<Self> {
        let (src_stage, dst_stage, src_access, dst_access) = match (old, new) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            ),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::empty(),
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            _ => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
        };

        Ok(Self {
            old_layout: old,
            new_layout: new,
            src_stage,
            dst_stage,
            src_access,
            dst_access,
            aspect: aspect_for(new, format),
        })
    }
}

/// Aspect mask for an image entering `new_layout`
pub fn aspect_for(new_layout: vk::ImageLayout, format: vk::Format) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Record the pipeline barrier for `transition` over the first `mip_levels` levels
pub fn record_transition(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    transition: &LayoutTransition,
    mip_levels: u32,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(transition.old_layout)
        .new_layout(transition.new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: transition.aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
}

/// Move `image` into `new_layout` with a single-use command buffer
///
/// The recorded layout only advances once the submission has completed.
pub fn transition_image_layout(
    ctx: &DeviceContext,
    image: &mut ImageResource,
    new_layout: vk::ImageLayout,
) -> VulkanResult<()> {
    let transition = LayoutTransition::resolve(image.current_layout(), new_layout, image.format())?;
    let (handle, mip_levels) = (image.handle(), image.mip_levels());

    submit_single_time(ctx, |cmd| {
        record_transition(ctx.device(), cmd, handle, &transition, mip_levels);
        Ok(())
    })?;

    image.set_layout(new_layout);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUTS: [vk::ImageLayout; 7] = [
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ];

    #[test]
    fn test_upload_transitions() {
        let to_dst = LayoutTransition::resolve(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::Format::R8G8B8A8_SRGB,
        )
        .unwrap();
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.aspect, vk::ImageAspectFlags::COLOR);

        let to_read = LayoutTransition::resolve(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::Format::R8G8B8A8_SRGB,
        )
        .unwrap();
        assert_eq!(to_read.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_depth_transition_aspects() {
        let depth_only = LayoutTransition::resolve(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::Format::D32_SFLOAT,
        )
        .unwrap();
        assert_eq!(depth_only.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth_only.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
        assert_eq!(
            depth_only.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );

        let with_stencil = LayoutTransition::resolve(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::Format::D24_UNORM_S8_UINT,
        )
        .unwrap();
        assert_eq!(with_stencil.aspect, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
    }

    #[test]
    fn test_table_is_closed() {
        let authorized = [
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        for old in LAYOUTS {
            for new in LAYOUTS {
                let result = LayoutTransition::resolve(old, new, vk::Format::R8G8B8A8_UNORM);
                if authorized.contains(&(old, new)) {
                    assert!(result.is_ok(), "{old:?} -> {new:?} should be allowed");
                } else {
                    assert!(
                        matches!(result, Err(VulkanError::UnsupportedLayoutTransition { .. })),
                        "{old:?} -> {new:?} should be rejected"
                    );
                }
            }
        }
    }
}
