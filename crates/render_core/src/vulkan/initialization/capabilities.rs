//! Device capability resolver
//!
//! Queries a graphics adapter once for everything the rest of the layer needs:
//! queue families, device extensions, features, limits and the memory-type
//! table. The decision logic (queue-family selection, suitability, sample
//! count, format probing) works on that plain data so it can be reasoned about
//! without a GPU.

use std::ffi::{CStr, CString};

use ash::{vk, Instance};

use crate::foundation::Diagnostics;
use crate::vulkan::{VulkanError, VulkanResult};

/// Which presentation backend a device is being chosen for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Desktop window presented through a surface
    Windowed,
    /// Head-mounted display; the runtime presents, there is no present queue
    Headset,
}

/// Struct to hold queue family indices
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family advertising graphics support
    pub graphics: Option<u32>,
    /// First family able to present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Whether every family the backend needs was found
    pub const fn is_complete(&self, backend: BackendKind) -> bool {
        match backend {
            BackendKind::Windowed => self.graphics.is_some() && self.present.is_some(),
            BackendKind::Headset => self.graphics.is_some(),
        }
    }
}

/// Surface support details for one adapter
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extents, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// At least one format and one present mode exist
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Presentation target an adapter is checked against
pub trait PresentTarget {
    /// Whether `queue_family` on `physical_device` can present to this target
    fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> VulkanResult<bool>;

    /// Formats, present modes and capabilities for `physical_device`
    fn query_support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupportDetails>;
}

impl<W: crate::vulkan::initialization::window::PresentationWindow> PresentTarget
    for crate::vulkan::initialization::surface::WindowSurface<W>
{
    fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> VulkanResult<bool> {
        Self::supports_present(self, physical_device, queue_family)
    }

    fn query_support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupportDetails> {
        Self::query_support(self, physical_device)
    }
}

/// Everything queried from a physical device, immutable once built
#[derive(Debug, Clone)]
pub struct AdapterDescriptor {
    /// Vulkan physical device handle
    pub physical_device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Memory-type and heap table
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Names of supported device extensions
    pub extensions: Vec<CString>,
}

impl AdapterDescriptor {
    /// Query a physical device
    pub fn query(instance: &Instance, physical_device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let (properties, features, queue_families, memory_properties) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_features(physical_device),
                instance.get_physical_device_queue_family_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(VulkanError::api("vkEnumerateDeviceExtensionProperties"))?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect();

        Ok(Self {
            physical_device,
            properties,
            features,
            queue_families,
            memory_properties,
            extensions,
        })
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Required extensions this adapter does not offer
    pub fn missing_extensions<'a>(&self, required: &[&'a CStr]) -> Vec<&'a CStr> {
        required
            .iter()
            .copied()
            .filter(|required| !self.extensions.iter().any(|available| available.as_c_str() == *required))
            .collect()
    }

    /// Whether the device can do anisotropic sampling
    pub const fn supports_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }
}

/// Find the graphics and present queue families in a single pass
///
/// `present_support` is only consulted when presenting to a surface. The scan
/// stops as soon as both families are known.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut present_support: Option<&mut dyn FnMut(u32) -> VulkanResult<bool>>,
) -> VulkanResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }

        if let Some(query) = present_support.as_deref_mut() {
            if indices.present.is_none() && query(index)? {
                indices.present = Some(index);
            }
            if indices.graphics.is_some() && indices.present.is_some() {
                break;
            }
        } else if indices.graphics.is_some() {
            break;
        }
    }

    Ok(indices)
}

/// Why an adapter was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsuitable {
    /// The backend's queue families are not all available
    IncompleteQueueFamilies,
    /// Required device extensions are missing
    MissingExtensions(Vec<String>),
    /// The surface offers no formats or no present modes
    InadequateSwapchain,
    /// Anisotropic sampling is not supported
    NoAnisotropy,
}

/// Check an adapter against the suitability rules, reporting the first failure
pub fn check_suitability(
    adapter: &AdapterDescriptor,
    indices: &QueueFamilyIndices,
    support: Option<&SwapchainSupportDetails>,
    required_extensions: &[&CStr],
    backend: BackendKind,
) -> Result<(), Unsuitable> {
    if !indices.is_complete(backend) {
        return Err(Unsuitable::IncompleteQueueFamilies);
    }

    let missing = adapter.missing_extensions(required_extensions);
    if !missing.is_empty() {
        return Err(Unsuitable::MissingExtensions(
            missing.iter().map(|ext| ext.to_string_lossy().into_owned()).collect(),
        ));
    }

    if let Some(support) = support {
        if !support.is_adequate() {
            return Err(Unsuitable::InadequateSwapchain);
        }
    }

    if !adapter.supports_anisotropy() {
        return Err(Unsuitable::NoAnisotropy);
    }

    Ok(())
}

/// Whether the adapter satisfies every suitability rule
pub fn is_device_suitable(
    adapter: &AdapterDescriptor,
    indices: &QueueFamilyIndices,
    support: Option<&SwapchainSupportDetails>,
    required_extensions: &[&CStr],
    backend: BackendKind,
) -> bool {
    check_suitability(adapter, indices, support, required_extensions, backend).is_ok()
}

/// Highest sample count supported for both color and depth framebuffers
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;

    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Lower a device sample count to at most `max_samples`
pub fn cap_sample_count(count: vk::SampleCountFlags, max_samples: u32) -> vk::SampleCountFlags {
    let capped = count.as_raw().min(max_samples.max(1));
    // Round down to a power of two so the result is a single valid flag
    vk::SampleCountFlags::from_raw(1 << (31 - capped.leading_zeros()))
}

/// First candidate whose properties carry `features` for `tiling`
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    query: impl Fn(vk::Format) -> vk::FormatProperties,
) -> VulkanResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = query(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| VulkanError::NoSupportedFormat {
            candidates: candidates.to_vec(),
            features,
        })
}

/// Depth formats in preference order
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Best depth attachment format for optimal tiling
pub fn find_depth_format(query: impl Fn(vk::Format) -> vk::FormatProperties) -> VulkanResult<vk::Format> {
    find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        query,
    )
}

/// Whether a depth format carries a stencil component
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(format, vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT)
}

/// A chosen adapter and its queue families
#[derive(Debug, Clone)]
pub struct SelectedAdapter {
    /// Queried adapter description
    pub adapter: AdapterDescriptor,
    /// Resolved queue families (complete for the backend)
    pub indices: QueueFamilyIndices,
}

/// Enumerate adapters and pick the first suitable one
pub fn select_adapter(
    instance: &Instance,
    target: Option<&dyn PresentTarget>,
    required_extensions: &[&CStr],
    backend: BackendKind,
    diagnostics: &Diagnostics,
) -> VulkanResult<SelectedAdapter> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(VulkanError::api("vkEnumeratePhysicalDevices"))?;

    if devices.is_empty() {
        diagnostics.error("No Vulkan-capable GPU found");
        return Err(VulkanError::NoSuitableDevice);
    }

    for device in devices {
        let adapter = AdapterDescriptor::query(instance, device)?;
        match evaluate_adapter(adapter, target, required_extensions, backend)? {
            Ok(selected) => {
                diagnostics.info(format!("Selected GPU: {}", selected.adapter.name()));
                return Ok(selected);
            }
            Err((name, reason)) => diagnostics.debug(format!("Skipping GPU {name}: {reason:?}")),
        }
    }

    diagnostics.error("No suitable GPU found");
    Err(VulkanError::NoSuitableDevice)
}

/// Check a specific adapter (e.g. the one mandated by a headset runtime)
pub fn require_adapter(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    required_extensions: &[&CStr],
    backend: BackendKind,
    diagnostics: &Diagnostics,
) -> VulkanResult<SelectedAdapter> {
    let adapter = AdapterDescriptor::query(instance, physical_device)?;
    match evaluate_adapter(adapter, None, required_extensions, backend)? {
        Ok(selected) => {
            diagnostics.info(format!("Using runtime GPU: {}", selected.adapter.name()));
            Ok(selected)
        }
        Err((name, reason)) => {
            diagnostics.error(format!("Runtime GPU {name} is unsuitable: {reason:?}"));
            Err(VulkanError::NoSuitableDevice)
        }
    }
}

fn evaluate_adapter(
    adapter: AdapterDescriptor,
    target: Option<&dyn PresentTarget>,
    required_extensions: &[&CStr],
    backend: BackendKind,
) -> VulkanResult<Result<SelectedAdapter, (String, Unsuitable)>> {
    let physical_device = adapter.physical_device;
    let indices = match target {
        Some(target) => {
            let mut present = |family| target.supports_present(physical_device, family);
            find_queue_families(&adapter.queue_families, Some(&mut present))?
        }
        None => find_queue_families(&adapter.queue_families, None)?,
    };

    // Only query surface support when the extension that makes it meaningful exists
    let support = match target {
        Some(target) if adapter.missing_extensions(required_extensions).is_empty() => {
            Some(target.query_support(physical_device)?)
        }
        _ => None,
    };

    Ok(
        match check_suitability(&adapter, &indices, support.as_ref(), required_extensions, backend) {
            Ok(()) => Ok(SelectedAdapter { adapter, indices }),
            Err(reason) => Err((adapter.name(), reason)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn swapchain_ext() -> &'static CStr {
        ash::extensions::khr::Swapchain::name()
    }

    fn adapter(anisotropy: bool, extensions: &[&CStr]) -> AdapterDescriptor {
        AdapterDescriptor {
            physical_device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties::default(),
            features: vk::PhysicalDeviceFeatures {
                sampler_anisotropy: if anisotropy { vk::TRUE } else { vk::FALSE },
                ..Default::default()
            },
            queue_families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)],
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            extensions: extensions.iter().map(|ext| (*ext).to_owned()).collect(),
        }
    }

    fn adequate_support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn test_queue_families_first_match_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut present = |index: u32| Ok(index >= 1);
        let indices = find_queue_families(&families, Some(&mut present)).unwrap();
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
        assert!(indices.is_complete(BackendKind::Windowed));
    }

    #[test]
    fn test_queue_families_short_circuit() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let mut present = |index: u32| {
            queried.push(index);
            Ok(true)
        };
        find_queue_families(&families, Some(&mut present)).unwrap();
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn test_present_query_error_propagates() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let mut present = |_: u32| Err(VulkanError::api("vkGetPhysicalDeviceSurfaceSupportKHR")(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert!(find_queue_families(&families, Some(&mut present)).is_err());
    }

    #[test]
    fn test_headset_needs_only_graphics() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, None).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: None });
        assert!(indices.is_complete(BackendKind::Headset));
        assert!(!indices.is_complete(BackendKind::Windowed));
    }

    #[test]
    fn test_suitable_device_has_complete_indices_and_support() {
        let adapter = adapter(true, &[swapchain_ext()]);
        let mut present = |_: u32| Ok(true);
        let indices = find_queue_families(&adapter.queue_families, Some(&mut present)).unwrap();
        let support = adequate_support();

        assert!(is_device_suitable(&adapter, &indices, Some(&support), &[swapchain_ext()], BackendKind::Windowed));
        assert!(indices.is_complete(BackendKind::Windowed));
        assert!(!support.formats.is_empty() && !support.present_modes.is_empty());
    }

    #[test]
    fn test_unsuitable_reasons() {
        let indices = QueueFamilyIndices { graphics: Some(0), present: Some(0) };
        let support = adequate_support();

        let no_ext = adapter(true, &[]);
        assert_eq!(
            check_suitability(&no_ext, &indices, Some(&support), &[swapchain_ext()], BackendKind::Windowed),
            Err(Unsuitable::MissingExtensions(vec!["VK_KHR_swapchain".to_string()]))
        );

        let no_aniso = adapter(false, &[swapchain_ext()]);
        assert_eq!(
            check_suitability(&no_aniso, &indices, Some(&support), &[swapchain_ext()], BackendKind::Windowed),
            Err(Unsuitable::NoAnisotropy)
        );

        let empty = SwapchainSupportDetails {
            present_modes: Vec::new(),
            ..adequate_support()
        };
        let good = adapter(true, &[swapchain_ext()]);
        assert_eq!(
            check_suitability(&good, &indices, Some(&empty), &[swapchain_ext()], BackendKind::Windowed),
            Err(Unsuitable::InadequateSwapchain)
        );

        let no_present = QueueFamilyIndices { graphics: Some(0), present: None };
        assert_eq!(
            check_suitability(&good, &no_present, Some(&support), &[swapchain_ext()], BackendKind::Windowed),
            Err(Unsuitable::IncompleteQueueFamilies)
        );
        assert!(check_suitability(&good, &no_present, None, &[], BackendKind::Headset).is_ok());
    }

    #[test]
    fn test_max_usable_sample_count_intersects() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_max_usable_sample_count_falls_back_to_one() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_1);

        let all = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::from_raw(0x7f),
            framebuffer_depth_sample_counts: vk::SampleCountFlags::from_raw(0x7f),
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&all), vk::SampleCountFlags::TYPE_64);
    }

    #[test]
    fn test_cap_sample_count() {
        assert_eq!(cap_sample_count(vk::SampleCountFlags::TYPE_8, 4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(cap_sample_count(vk::SampleCountFlags::TYPE_2, 64), vk::SampleCountFlags::TYPE_2);
        assert_eq!(cap_sample_count(vk::SampleCountFlags::TYPE_16, 1), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_depth_format_scenario() {
        let query = |format: vk::Format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatProperties {
                    optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            } else {
                vk::FormatProperties::default()
            }
        };
        let format = find_depth_format(query).unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);
        assert!(has_stencil_component(format));
    }

    #[test]
    fn test_linear_tiling_checks_linear_features() {
        let query = |_: vk::Format| vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        let result = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            query,
        );
        assert!(matches!(result, Err(VulkanError::NoSupportedFormat { .. })));
    }

    #[test]
    fn test_stencil_table_is_closed() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(!has_stencil_component(vk::Format::D16_UNORM));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
    }
}
