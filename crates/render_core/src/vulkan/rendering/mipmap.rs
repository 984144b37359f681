//! Mipmap generation by successive linear blits

use ash::{vk, Device};

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::commands::submit_single_time;
use crate::vulkan::resources::image::ImageResource;
use crate::vulkan::{VulkanError, VulkanResult};

/// Number of levels in a full chain down to 1x1: `floor(log2(max(w, h))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// Size of mip level `level` for a base size, never below 1x1
pub fn mip_extent(base: vk::Extent2D, level: u32) -> vk::Extent2D {
    let shrink = |dim: u32| dim.checked_shr(level).unwrap_or(0).max(1);
    vk::Extent2D {
        width: shrink(base.width),
        height: shrink(base.height),
    }
}

/// One blit of the chain: `src_level` downsampled into `dst_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    /// Level read from
    pub src_level: u32,
    /// Level written to
    pub dst_level: u32,
    /// Size of the source level
    pub src_extent: vk::Extent2D,
    /// Size of the destination level
    pub dst_extent: vk::Extent2D,
}

/// Blits needed to fill levels `1..levels` from level 0
pub fn plan_mip_blits(extent: vk::Extent2D, levels: u32) -> Vec<MipBlit> {
    (1..levels)
        .map(|level| MipBlit {
            src_level: level - 1,
            dst_level: level,
            src_extent: mip_extent(extent, level - 1),
            dst_extent: mip_extent(extent, level),
        })
        .collect()
}

/// Whether `format` can be linearly filtered when sampled with `tiling`
pub fn supports_linear_blit(properties: &vk::FormatProperties, tiling: vk::ImageTiling) -> bool {
    let features = match tiling {
        vk::ImageTiling::LINEAR => properties.linear_tiling_features,
        _ => properties.optimal_tiling_features,
    };
    features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
}

/// Fail with `UnsupportedFormat` unless `format` supports linear blitting
///
/// Callers that build a mip chain check this before creating the image.
pub fn require_linear_blit(
    properties: &vk::FormatProperties,
    format: vk::Format,
    tiling: vk::ImageTiling,
) -> VulkanResult<()> {
    if supports_linear_blit(properties, tiling) {
        Ok(())
    } else {
        Err(VulkanError::UnsupportedFormat {
            format,
            reason: "texture format does not support linear blitting",
        })
    }
}

/// Fill every mip level of `image` from level 0 and leave it shader-readable
///
/// Level 0 must be populated and the whole image in `TRANSFER_DST_OPTIMAL`.
pub fn generate_mipmaps(ctx: &DeviceContext, image: &mut ImageResource) -> VulkanResult<()> {
    require_linear_blit(&ctx.format_properties(image.format()), image.format(), image.tiling())?;

    if image.current_layout() != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "Mipmap generation needs TRANSFER_DST_OPTIMAL, image is in {:?}",
                image.current_layout()
            ),
        });
    }

    let handle = image.handle();
    let blits = plan_mip_blits(image.extent(), image.mip_levels());
    let last_level = image.mip_levels() - 1;
    let device = ctx.device();

    submit_single_time(ctx, |cmd| {
        for blit in &blits {
            level_barrier(
                device,
                cmd,
                handle,
                blit.src_level,
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ),
                (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
            );

            record_blit(device, cmd, handle, blit);

            level_barrier(
                device,
                cmd,
                handle,
                blit.src_level,
                (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ),
                (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
            );
        }

        // The last level was only ever written to
        level_barrier(
            device,
            cmd,
            handle,
            last_level,
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        );
        Ok(())
    })?;

    image.set_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    ctx.diagnostics()
        .debug(format!("Generated {} mip levels for {:?}", image.mip_levels(), image.extent()));
    Ok(())
}

fn level_barrier(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    level: u32,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
    (src_access, dst_access): (vk::AccessFlags, vk::AccessFlags),
    (src_stage, dst_stage): (vk::PipelineStageFlags, vk::PipelineStageFlags),
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
}

fn record_blit(device: &Device, cmd: vk::CommandBuffer, image: vk::Image, blit: &MipBlit) {
    let corner = |extent: vk::Extent2D| vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    };
    let layers = |mip_level| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    };

    let region = vk::ImageBlit::builder()
        .src_offsets([vk::Offset3D::default(), corner(blit.src_extent)])
        .src_subresource(layers(blit.src_level))
        .dst_offsets([vk::Offset3D::default(), corner(blit.dst_extent)])
        .dst_subresource(layers(blit.dst_level));

    unsafe {
        device.cmd_blit_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region.build()],
            vk::Filter::LINEAR,
        );
    }
}
