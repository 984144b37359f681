//! Rendering context
//!
//! [`RenderingContext`] owns the instance, the logical device and the graphics
//! command pool. Everything downstream receives a [`DeviceContext`]: a cheap
//! bundle of cloned handles with read-only accessors.

use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};

use crate::config::RendererConfig;
use crate::foundation::Diagnostics;
use crate::vulkan::initialization::capabilities::{
    cap_sample_count, find_depth_format, max_usable_sample_count, require_adapter, select_adapter,
    AdapterDescriptor, BackendKind, PresentTarget, QueueFamilyIndices, SelectedAdapter,
};
use crate::vulkan::initialization::instance::VulkanInstance;
use crate::vulkan::initialization::surface::WindowSurface;
use crate::vulkan::initialization::window::PresentationWindow;
use crate::vulkan::rendering::commands::CommandPool;
use crate::vulkan::state::swapchain::headset::{DeviceBinding, HeadsetSession};
use crate::vulkan::{VulkanError, VulkanResult};

/// Logical device and its queues
pub struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl LogicalDevice {
    /// Create a logical device with one queue per unique family
    pub fn new(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        indices: QueueFamilyIndices,
        extensions: &[&CStr],
    ) -> VulkanResult<Self> {
        let graphics_family = indices
            .graphics
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family".to_string()))?;
        let present_family = indices.present.unwrap_or(graphics_family);

        let unique_families: HashSet<u32> = [graphics_family, present_family].into_iter().collect();
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<_> = extensions.iter().map(|ext| ext.as_ptr()).collect();
        let device_features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(VulkanError::api("vkCreateDevice"))?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Read-only bundle of device handles handed to every GPU component
///
/// Cloning is cheap; the handles stay owned by the [`RenderingContext`], which
/// must outlive every clone.
#[derive(Clone)]
pub struct DeviceContext {
    instance: Instance,
    device: Device,
    adapter: Arc<AdapterDescriptor>,
    indices: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pool: vk::CommandPool,
    sample_count: vk::SampleCountFlags,
    depth_format: vk::Format,
    swapchain_loader: Option<SwapchainLoader>,
    diagnostics: Diagnostics,
}

impl DeviceContext {
    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Selected physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.adapter.physical_device
    }

    /// Everything queried about the selected adapter
    pub fn adapter(&self) -> &AdapterDescriptor {
        &self.adapter
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Present queue (the graphics queue for the headset backend)
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.indices.graphics.unwrap_or_default()
    }

    /// Resolved queue families
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.indices
    }

    /// Graphics command pool
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// MSAA sample count used for every render target
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        self.sample_count
    }

    /// Depth attachment format
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Swapchain extension loader (windowed backend only)
    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.swapchain_loader.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Swapchain extension not enabled on this device".to_string(),
        })
    }

    /// Diagnostics sink
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Format properties of `format` on the selected adapter
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.adapter.physical_device, format)
        }
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::api("vkDeviceWaitIdle"))
    }
}

/// Owner of the instance, logical device and command pool
///
/// Field order is destruction order. Swapchains, surfaces and resources built
/// from the [`DeviceContext`] must be dropped before this.
pub struct RenderingContext {
    context: DeviceContext,
    command_pool: CommandPool,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl RenderingContext {
    /// Stand up the layer for a desktop window
    ///
    /// Takes ownership of `window` and hands back the surface bound to it. The
    /// surface must be dropped before the context.
    pub fn windowed<W: PresentationWindow>(
        config: &RendererConfig,
        window: W,
        diagnostics: Diagnostics,
    ) -> VulkanResult<(Self, WindowSurface<W>)> {
        let instance_extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(config, &instance_extensions, &diagnostics)?;
        let surface = WindowSurface::new(&instance, window)?;

        let device_extensions = [SwapchainLoader::name()];
        let selected = select_adapter(
            instance.instance(),
            Some(&surface as &dyn PresentTarget),
            &device_extensions,
            BackendKind::Windowed,
            &diagnostics,
        )?;

        // The surface still borrows the instance, so device creation must not consume it
        let (context, command_pool, device) =
            Self::create_device(config, &instance, selected, &device_extensions, true, diagnostics)?;
        Ok((
            Self {
                context,
                command_pool,
                device,
                instance,
            },
            surface,
        ))
    }

    /// Stand up the layer for a head-mounted display
    ///
    /// The runtime dictates the instance extensions, device extensions and the
    /// physical device; it is told about the created device before returning.
    pub fn headset<S: HeadsetSession>(
        config: &RendererConfig,
        session: &mut S,
        diagnostics: Diagnostics,
    ) -> VulkanResult<Self> {
        let instance_extensions = session.required_instance_extensions()?;
        let instance = VulkanInstance::new(config, &instance_extensions, &diagnostics)?;

        let device_extensions = session
            .required_device_extensions()?
            .into_iter()
            .map(|ext| {
                CString::new(ext)
                    .map_err(|e| VulkanError::Headset(format!("Invalid device extension name: {e}")))
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        let device_extensions: Vec<&CStr> = device_extensions.iter().map(CString::as_c_str).collect();

        let physical_device = session.physical_device(instance.handle())?;
        let selected = require_adapter(
            instance.instance(),
            physical_device,
            &device_extensions,
            BackendKind::Headset,
            &diagnostics,
        )?;

        let (context, command_pool, device) =
            Self::create_device(config, &instance, selected, &device_extensions, false, diagnostics)?;
        let context = Self {
            context,
            command_pool,
            device,
            instance,
        };
        session.bind_device(&DeviceBinding {
            instance: context.instance.handle(),
            physical_device: context.context.physical_device(),
            device: context.context.device.handle(),
            queue_family_index: context.context.graphics_family(),
            queue_index: 0,
        })?;
        Ok(context)
    }

    fn create_device(
        config: &RendererConfig,
        instance: &VulkanInstance,
        selected: SelectedAdapter,
        device_extensions: &[&CStr],
        with_swapchain: bool,
        diagnostics: Diagnostics,
    ) -> VulkanResult<(DeviceContext, CommandPool, LogicalDevice)> {
        let SelectedAdapter { adapter, indices } = selected;
        let physical_device = adapter.physical_device;

        let device_max = max_usable_sample_count(&adapter.properties.limits);
        let sample_count = cap_sample_count(device_max, config.max_msaa_samples);
        diagnostics.debug(format!("MSAA: device maximum {device_max:?}, using {sample_count:?}"));

        let depth_format = find_depth_format(|format| unsafe {
            instance
                .instance()
                .get_physical_device_format_properties(physical_device, format)
        })?;

        let device = LogicalDevice::new(instance.instance(), physical_device, indices, device_extensions)?;
        let graphics_family = indices.graphics.unwrap_or_default();
        let command_pool = CommandPool::new(device.device.clone(), graphics_family)?;

        let swapchain_loader =
            with_swapchain.then(|| SwapchainLoader::new(instance.instance(), &device.device));

        let context = DeviceContext {
            instance: instance.instance().clone(),
            device: device.device.clone(),
            adapter: Arc::new(adapter),
            indices,
            graphics_queue: device.graphics_queue,
            present_queue: device.present_queue,
            command_pool: command_pool.handle(),
            sample_count,
            depth_format,
            swapchain_loader,
            diagnostics,
        };

        Ok((context, command_pool, device))
    }

    /// Handles for downstream components
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// The instance wrapper
    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            self.context.diagnostics.error(format!("Device wait before teardown failed: {err}"));
        }
    }
}
