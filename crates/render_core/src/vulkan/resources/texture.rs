//! Sampled textures and the name-keyed texture registry
//!
//! Pixel decoding happens elsewhere; this module only takes tightly packed
//! RGBA8 bytes, uploads them through a scoped staging buffer and builds the
//! full mip chain.

use std::collections::HashMap;

use ash::{vk, Device};
use slotmap::{new_key_type, SlotMap};

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::layout::transition_image_layout;
use crate::vulkan::rendering::mipmap::{generate_mipmaps, require_linear_blit};
use crate::vulkan::resources::buffer::BufferResource;
use crate::vulkan::resources::image::{copy_buffer_to_image, ImageResource, ImageSpec};
use crate::vulkan::{VulkanError, VulkanResult};

/// Format every texture is created with
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelData {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelData {
    /// Wrap decoded pixels, checking that the byte count matches the size
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Pixel data must not be empty ({width}x{height})"),
            });
        }

        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{width}x{height} RGBA8 needs {expected} bytes, got {}",
                    rgba.len()
                ),
            });
        }

        Ok(Self { width, height, rgba })
    }

    /// Single pixel of `color`
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: color.to_vec(),
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGBA8 bytes, row-major
    pub fn bytes(&self) -> &[u8] {
        &self.rgba
    }
}

impl From<image::RgbaImage> for PixelData {
    fn from(image: image::RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        }
    }
}

/// Mipmapped, sampled texture
pub struct Texture {
    device: Device,
    sampler: vk::Sampler,
    image: ImageResource,
}

impl Texture {
    /// Upload `pixels`, generate mipmaps and create a sampler
    pub fn from_pixels(ctx: &DeviceContext, pixels: &PixelData) -> VulkanResult<Self> {
        let extent = vk::Extent2D {
            width: pixels.width(),
            height: pixels.height(),
        };
        let spec = ImageSpec::texture(extent, TEXTURE_FORMAT);
        require_linear_blit(&ctx.format_properties(spec.format), spec.format, spec.tiling)?;
        let mut image = ImageResource::new(ctx, &spec)?;

        {
            let staging = BufferResource::staging_with(ctx, pixels.bytes())?;
            transition_image_layout(ctx, &mut image, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            copy_buffer_to_image(ctx, &staging, &image)?;
        }

        generate_mipmaps(ctx, &mut image)?;

        let sampler = create_sampler(ctx, image.mip_levels())?;
        ctx.diagnostics().debug(format!(
            "Created {}x{} texture with {} mip levels",
            extent.width,
            extent.height,
            image.mip_levels()
        ));

        Ok(Self {
            device: ctx.device().clone(),
            sampler,
            image,
        })
    }

    /// 1x1 placeholder texture
    pub fn solid_color(ctx: &DeviceContext, color: [u8; 4]) -> VulkanResult<Self> {
        Self::from_pixels(ctx, &PixelData::solid(color))
    }

    /// Underlying image
    pub fn image(&self) -> &ImageResource {
        &self.image
    }

    /// View over all mip levels
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Descriptor info for binding as a combined image sampler
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view(),
            image_layout: self.image.current_layout(),
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

fn create_sampler(ctx: &DeviceContext, mip_levels: u32) -> VulkanResult<vk::Sampler> {
    let max_anisotropy = ctx.adapter().properties.limits.max_sampler_anisotropy;

    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .min_lod(0.0)
        .max_lod(mip_levels as f32)
        .mip_lod_bias(0.0);

    unsafe { ctx.device().create_sampler(&create_info, None) }.map_err(VulkanError::api("vkCreateSampler"))
}

new_key_type! {
    /// Stable handle to a registered texture
    pub struct TextureKey;
}

/// Textures addressed by name or by stable key
///
/// Both swapchain backends keep their textures here.
pub struct TextureRegistry<T = Texture> {
    textures: SlotMap<TextureKey, T>,
    names: HashMap<String, TextureKey>,
}

impl<T> TextureRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }

    /// Register `texture` under `name`
    ///
    /// Re-registering a name keeps its key and hands back the previous texture
    /// so the caller decides when it is safe to destroy.
    pub fn insert(&mut self, name: impl Into<String>, texture: T) -> (TextureKey, Option<T>) {
        let name = name.into();
        if let Some(&key) = self.names.get(&name) {
            if let Some(slot) = self.textures.get_mut(key) {
                return (key, Some(std::mem::replace(slot, texture)));
            }
        }

        let key = self.textures.insert(texture);
        self.names.insert(name, key);
        (key, None)
    }

    /// Look up by key
    pub fn get(&self, key: TextureKey) -> Option<&T> {
        self.textures.get(key)
    }

    /// Look up by name
    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.names.get(name).and_then(|&key| self.textures.get(key))
    }

    /// Key registered for `name`
    pub fn key(&self, name: &str) -> Option<TextureKey> {
        self.names.get(name).copied()
    }

    /// Remove by name
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let key = self.names.remove(name)?;
        self.textures.remove(key)
    }

    /// Number of registered textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Iterate over `(name, texture)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.names
            .iter()
            .filter_map(|(name, &key)| self.textures.get(key).map(|texture| (name.as_str(), texture)))
    }

    /// Drop every texture
    pub fn clear(&mut self) {
        self.names.clear();
        self.textures.clear();
    }
}

impl<T> Default for TextureRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_data_size_validation() {
        assert!(PixelData::new(2, 2, vec![0; 16]).is_ok());
        assert!(PixelData::new(2, 2, vec![0; 15]).is_err());
        assert!(PixelData::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn test_pixel_data_from_image() {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let pixels = PixelData::from(image);
        assert_eq!((pixels.width(), pixels.height()), (3, 2));
        assert_eq!(pixels.bytes().len(), 24);
        assert_eq!(&pixels.bytes()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_registry_lookup_by_name_and_key() {
        let mut registry = TextureRegistry::new();
        let (albedo, replaced) = registry.insert("albedo", 1_u32);
        assert!(replaced.is_none());
        registry.insert("normal", 2);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(albedo), Some(&1));
        assert_eq!(registry.get_by_name("normal"), Some(&2));
        assert_eq!(registry.key("albedo"), Some(albedo));
        assert!(registry.get_by_name("missing").is_none());
    }

    #[test]
    fn test_registry_replace_keeps_key() {
        let mut registry = TextureRegistry::new();
        let (first, _) = registry.insert("albedo", "old");
        let (second, replaced) = registry.insert("albedo", "new");

        assert_eq!(first, second);
        assert_eq!(replaced, Some("old"));
        assert_eq!(registry.get(first), Some(&"new"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_remove_invalidates_key() {
        let mut registry = TextureRegistry::new();
        let (key, _) = registry.insert("albedo", 7_u8);

        assert_eq!(registry.remove("albedo"), Some(7));
        assert!(registry.get(key).is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.remove("albedo"), None);
    }
}
