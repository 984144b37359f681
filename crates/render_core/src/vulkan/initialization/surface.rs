//! Vulkan surface management
//!
//! Handles window surface creation and the per-adapter support queries the
//! capability resolver and the windowed swapchain need.

use ash::{extensions::khr, vk};

use crate::vulkan::initialization::capabilities::SwapchainSupportDetails;
use crate::vulkan::initialization::instance::VulkanInstance;
use crate::vulkan::initialization::window::PresentationWindow;
use crate::vulkan::{VulkanError, VulkanResult};

/// Presentation surface bound to the window it was created from
///
/// The surface is destroyed before the window is dropped.
pub struct WindowSurface<W: PresentationWindow> {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    window: W,
}

impl<W: PresentationWindow> WindowSurface<W> {
    /// Create a new surface for `window`, taking ownership of it
    pub fn new(instance: &VulkanInstance, mut window: W) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(instance.entry(), instance.instance());
        let surface = window.create_surface(instance.handle())?;

        Ok(Self {
            surface_loader,
            surface,
            window,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    /// The window this surface presents to
    pub fn window(&self) -> &W {
        &self.window
    }

    /// Mutable access to the window (event polling)
    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceSupportKHR"))
        }
    }

    /// Query capabilities, formats and present modes for a physical device
    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupportDetails> {
        query_swapchain_support(&self.surface_loader, self.surface, physical_device)
    }
}

impl<W: PresentationWindow> Drop for WindowSurface<W> {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Query everything the swapchain needs to know about a surface on one adapter
pub fn query_swapchain_support(
    loader: &khr::Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> VulkanResult<SwapchainSupportDetails> {
    unsafe {
        let capabilities = loader
            .get_physical_device_surface_capabilities(physical_device, surface)
            .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
        let formats = loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
        let present_modes = loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .map_err(VulkanError::api("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;

        Ok(SwapchainSupportDetails {
            capabilities,
            formats,
            present_modes,
        })
    }
}
