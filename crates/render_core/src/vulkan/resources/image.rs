//! Image allocation
//!
//! [`ImageResource`] owns an image, its memory and a view over all of its mip
//! levels, and remembers the layout the image is currently in. Only the layout
//! transition engine and the mipmap generator advance that layout.

use ash::{vk, Device};

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::commands::submit_single_time;
use crate::vulkan::rendering::mipmap::mip_level_count;
use crate::vulkan::resources::buffer::BufferResource;
use crate::vulkan::resources::memory::find_memory_type;
use crate::vulkan::{VulkanError, VulkanResult};

/// Parameters for [`ImageResource::new`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    /// Size of mip level 0
    pub extent: vk::Extent2D,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Samples per texel
    pub samples: vk::SampleCountFlags,
    /// Texel format
    pub format: vk::Format,
    /// Image tiling
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Aspect covered by the view
    pub aspect: vk::ImageAspectFlags,
}

impl ImageSpec {
    /// Sampled texture with room for a full mip chain
    pub fn texture(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            mip_levels: mip_level_count(extent.width, extent.height),
            samples: vk::SampleCountFlags::TYPE_1,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// Multisampled transient color target
    pub fn color_attachment(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            extent,
            mip_levels: 1,
            samples,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// Depth target
    pub fn depth_attachment(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            extent,
            mip_levels: 1,
            samples,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Reject specs the device would refuse or that make no sense
    pub fn validate(&self) -> VulkanResult<()> {
        let invalid = |reason: String| Err(VulkanError::InvalidOperation { reason });

        if self.extent.width == 0 || self.extent.height == 0 {
            return invalid(format!("Image extent {}x{} is empty", self.extent.width, self.extent.height));
        }
        let max_levels = mip_level_count(self.extent.width, self.extent.height);
        if self.mip_levels == 0 || self.mip_levels > max_levels {
            return invalid(format!(
                "{} mip levels requested, {}x{} allows 1..={max_levels}",
                self.mip_levels, self.extent.width, self.extent.height
            ));
        }
        if self.samples != vk::SampleCountFlags::TYPE_1 && self.mip_levels != 1 {
            return invalid("Multisampled images cannot have mip levels".to_string());
        }
        Ok(())
    }
}

/// Create a 2D view over `mip_levels` levels of `image`
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.map_err(VulkanError::api("vkCreateImageView"))
}

/// View over an image owned by someone else (swapchain or headset runtime)
pub struct ImageView {
    device: Device,
    view: vk::ImageView,
}

impl ImageView {
    /// Create a single-level color view
    pub fn color(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<Self> {
        let view = create_image_view(device, image, format, vk::ImageAspectFlags::COLOR, 1)?;
        Ok(Self {
            device: device.clone(),
            view,
        })
    }

    /// Get the view handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

/// Image with bound memory and a view
pub struct ImageResource {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
    samples: vk::SampleCountFlags,
    tiling: vk::ImageTiling,
    aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,
}

impl ImageResource {
    /// Create image, allocate and bind memory, create the view
    ///
    /// Either every handle is created or none survive.
    pub fn new(ctx: &DeviceContext, spec: &ImageSpec) -> VulkanResult<Self> {
        spec.validate()?;
        let device = ctx.device().clone();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: spec.extent.width,
                height: spec.extent.height,
                depth: 1,
            })
            .mip_levels(spec.mip_levels)
            .array_layers(1)
            .format(spec.format)
            .tiling(spec.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(spec.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(spec.samples);

        let image = unsafe { device.create_image(&image_info, None) }.map_err(VulkanError::api("vkCreateImage"))?;

        let memory = match Self::allocate_and_bind(ctx, &device, image, spec.memory_properties) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let view = match create_image_view(&device, image, spec.format, spec.aspect, spec.mip_levels) {
            Ok(view) => view,
            Err(err) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(err);
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            format: spec.format,
            extent: spec.extent,
            mip_levels: spec.mip_levels,
            samples: spec.samples,
            tiling: spec.tiling,
            aspect: spec.aspect,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    fn allocate_and_bind(
        ctx: &DeviceContext,
        device: &Device,
        image: vk::Image,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index =
            find_memory_type(&ctx.adapter().memory_properties, requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }
            .map_err(VulkanError::api("vkAllocateMemory"))?;

        if let Err(result) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(VulkanError::api("vkBindImageMemory")(result));
        }

        Ok(memory)
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size of mip level 0
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Samples per texel
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Image tiling
    pub fn tiling(&self) -> vk::ImageTiling {
        self.tiling
    }

    /// Aspect covered by the view
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Layout the image is in once all submitted work has completed
    pub fn current_layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Copy a tightly packed buffer into mip level 0 of `image`
///
/// The image must already be in `TRANSFER_DST_OPTIMAL`.
pub fn copy_buffer_to_image(ctx: &DeviceContext, buffer: &BufferResource, image: &ImageResource) -> VulkanResult<()> {
    if image.current_layout() != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "Buffer copy needs TRANSFER_DST_OPTIMAL, image is in {:?}",
                image.current_layout()
            ),
        });
    }

    let extent = image.extent();
    submit_single_time(ctx, |cmd| {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: image.aspect(),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            ctx.device().cmd_copy_buffer_to_image(
                cmd,
                buffer.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
            );
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_texture_spec_has_full_chain() {
        let spec = ImageSpec::texture(extent(256, 64), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(spec.mip_levels, 9);
        assert!(spec.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::SAMPLED));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_attachment_specs() {
        let color = ImageSpec::color_attachment(extent(800, 600), vk::Format::B8G8R8A8_SRGB, vk::SampleCountFlags::TYPE_4);
        assert!(color.usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT));
        assert!(color.validate().is_ok());

        let depth = ImageSpec::depth_attachment(extent(800, 600), vk::Format::D32_SFLOAT, vk::SampleCountFlags::TYPE_4);
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(depth.validate().is_ok());
    }

    #[test]
    fn test_invalid_specs_rejected() {
        let mut spec = ImageSpec::texture(extent(16, 16), vk::Format::R8G8B8A8_UNORM);
        spec.mip_levels = 6;
        assert!(spec.validate().is_err());

        spec.mip_levels = 0;
        assert!(spec.validate().is_err());

        let empty = ImageSpec::texture(extent(0, 16), vk::Format::R8G8B8A8_UNORM);
        assert!(empty.validate().is_err());

        let mut msaa = ImageSpec::texture(extent(16, 16), vk::Format::R8G8B8A8_UNORM);
        msaa.samples = vk::SampleCountFlags::TYPE_2;
        assert!(msaa.validate().is_err());
    }
}
