//! Swapchain management for both presentation backends
//!
//! [`SwapchainBackend`] is what the frame loop talks to. The windowed backend
//! presents through a window surface; the headset backend renders one image
//! array per stereo view and hands them back to the HMD runtime.
//!
//! The selection helpers here are shared policy. They return [`Choice`] so a
//! caller can tell a fallback happened without it being treated as an error.

pub mod headset;
pub mod windowed;

use ash::vk;

use crate::vulkan::initialization::capabilities::BackendKind;
use crate::vulkan::resources::texture::TextureRegistry;
use crate::vulkan::{VulkanError, VulkanResult};

pub use headset::{HeadsetSession, HeadsetSwapchain};
pub use windowed::WindowedSwapchain;

/// Outcome of a policy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice<T> {
    /// The preferred option was available
    Preferred(T),
    /// The documented fallback was substituted
    Fallback(T),
}

impl<T> Choice<T> {
    /// The chosen value either way
    pub fn into_inner(self) -> T {
        match self {
            Self::Preferred(value) | Self::Fallback(value) => value,
        }
    }

    /// Borrow the chosen value
    pub const fn value(&self) -> &T {
        match self {
            Self::Preferred(value) | Self::Fallback(value) => value,
        }
    }

    /// Whether the fallback was used
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Image indices acquired for one frame, one per view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImages {
    /// Acquired image index for each view, in view order
    pub image_indices: Vec<u32>,
    /// Whether acquire signalled the image-available semaphore and present must
    /// wait on render-finished
    pub uses_semaphores: bool,
    /// The surface no longer matches exactly; recreate after presenting
    pub suboptimal: bool,
}

/// Result of [`SwapchainBackend::acquire`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Images are ready to render into
    Acquired(FrameImages),
    /// The swapchain no longer matches the surface and must be recreated
    OutOfDate,
}

/// Result of [`SwapchainBackend::present`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the swapchain should be recreated
    Suboptimal,
    /// Not presented; the swapchain must be recreated
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the caller should call [`SwapchainBackend::recreate`]
    pub const fn needs_recreate(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// What the frame loop needs from a presentation backend
pub trait SwapchainBackend {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Color format of the presented images
    fn surface_format(&self) -> vk::Format;

    /// Render pass every framebuffer is compatible with
    fn render_pass(&self) -> vk::RenderPass;

    /// Number of views rendered per frame (1 windowed, 2 for stereo)
    fn view_count(&self) -> usize;

    /// Image size of `view`
    fn view_extent(&self, view: usize) -> vk::Extent2D;

    /// Number of images backing `view`
    fn image_count(&self, view: usize) -> usize;

    /// Framebuffer for `image_index` of `view`
    fn framebuffer(&self, view: usize, image_index: u32) -> Option<vk::Framebuffer>;

    /// Acquire the next image of every view
    fn acquire(&mut self, image_available: vk::Semaphore) -> VulkanResult<AcquireOutcome>;

    /// Hand the rendered images back for display
    fn present(
        &mut self,
        queue: vk::Queue,
        images: &FrameImages,
        render_finished: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome>;

    /// Drain the device and rebuild every swapchain-sized resource
    fn recreate(&mut self) -> VulkanResult<()>;

    /// Textures owned alongside the swapchain
    fn textures(&self) -> &TextureRegistry;

    /// Mutable access to the textures
    fn textures_mut(&mut self) -> &mut TextureRegistry;
}

/// Preferred surface format
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the sRGB BGRA format if offered, else the first one
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> VulkanResult<Choice<vk::SurfaceFormatKHR>> {
    if available.contains(&PREFERRED_SURFACE_FORMAT) {
        return Ok(Choice::Preferred(PREFERRED_SURFACE_FORMAT));
    }
    available
        .first()
        .copied()
        .map(Choice::Fallback)
        .ok_or(VulkanError::NoSurfaceFormats)
}

/// Mailbox when allowed and offered, else FIFO (always available)
pub fn choose_present_mode(available: &[vk::PresentModeKHR], prefer_mailbox: bool) -> Choice<vk::PresentModeKHR> {
    if !prefer_mailbox {
        return Choice::Preferred(vk::PresentModeKHR::FIFO);
    }
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        Choice::Preferred(vk::PresentModeKHR::MAILBOX)
    } else {
        Choice::Fallback(vk::PresentModeKHR::FIFO)
    }
}

/// The surface's current extent, or the framebuffer size clamped to its limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> Choice<vk::Extent2D> {
    if capabilities.current_extent.width != u32::MAX {
        return Choice::Preferred(capabilities.current_extent);
    }

    let (width, height) = framebuffer_size;
    Choice::Fallback(vk::Extent2D {
        width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    })
}

/// One more than the minimum, bounded by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Map a raw acquire result into an outcome
pub(crate) fn acquire_result(
    result: Result<(u32, bool), vk::Result>,
    operation: &'static str,
) -> VulkanResult<Option<(u32, bool)>> {
    match result {
        Ok(acquired) => Ok(Some(acquired)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
        Err(err) => Err(VulkanError::api(operation)(err)),
    }
}

/// Map a raw present result into an outcome
pub(crate) fn present_result(result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(err) => Err(VulkanError::api("vkQueuePresentKHR")(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_undefined_extent_uses_framebuffer() {
        let choice = choose_extent(&capabilities(2, 0), (1920, 1080));
        assert_eq!(
            choice,
            Choice::Fallback(vk::Extent2D {
                width: 1920,
                height: 1080
            })
        );
    }

    #[test]
    fn test_framebuffer_clamped_to_surface_limits() {
        let extent = choose_extent(&capabilities(2, 0), (8000, 0)).into_inner();
        assert_eq!(extent, vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn test_defined_extent_wins() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        let choice = choose_extent(&caps, (1920, 1080));
        assert!(!choice.is_fallback());
        assert_eq!(*choice.value(), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_format_falls_back_to_sole_entry() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let choice = choose_surface_format(&[unorm]).unwrap();
        assert_eq!(choice, Choice::Fallback(unorm));
    }

    #[test]
    fn test_preferred_format_found_anywhere() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let choice = choose_surface_format(&[unorm, PREFERRED_SURFACE_FORMAT]).unwrap();
        assert_eq!(choice, Choice::Preferred(PREFERRED_SURFACE_FORMAT));
    }

    #[test]
    fn test_empty_format_list_is_fatal() {
        let err = choose_surface_format(&[]).unwrap_err();
        assert!(matches!(err, VulkanError::NoSurfaceFormats));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_present_mode_policy() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&both, true), Choice::Preferred(vk::PresentModeKHR::MAILBOX));
        assert_eq!(choose_present_mode(&both, false), Choice::Preferred(vk::PresentModeKHR::FIFO));
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], true),
            Choice::Fallback(vk::PresentModeKHR::FIFO)
        );
    }

    #[test]
    fn test_image_count_planning() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(1, 2)), 2);
    }

    #[test]
    fn test_resize_races_are_outcomes() {
        assert_eq!(acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), "acquire").unwrap(), None);
        assert_eq!(acquire_result(Ok((2, true)), "acquire").unwrap(), Some((2, true)));
        assert!(acquire_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR), "acquire").is_err());

        assert_eq!(present_result(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert!(present_result(Ok(true)).unwrap().needs_recreate());
        assert_eq!(
            present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(matches!(
            present_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VulkanError::DeviceLost { .. })
        ));
    }
}
