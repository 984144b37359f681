//! Vulkan instance creation
//!
//! Loads the Vulkan entry points and creates the instance with the extension
//! set requested by the presentation backend, plus validation in debug builds.

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};

use crate::config::RendererConfig;
use crate::foundation::Diagnostics;
use crate::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance
    ///
    /// `required_extensions` come from the window system or the headset runtime.
    pub fn new(
        config: &RendererConfig,
        required_extensions: &[String],
        diagnostics: &Diagnostics,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name = to_cstring(&config.application_name)?;
        let engine_name = to_cstring("render_core")?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let validation = config.validation_enabled() && Self::layer_available(&entry, VALIDATION_LAYER);
        if config.validation_enabled() && !validation {
            diagnostics.warn(format!("{VALIDATION_LAYER} requested but not installed; continuing without it"));
        }

        let mut extension_names = required_extensions
            .iter()
            .map(|ext| to_cstring(ext))
            .collect::<VulkanResult<Vec<_>>>()?;
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names = if validation {
            vec![to_cstring(VALIDATION_LAYER)?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VulkanError::api("vkCreateInstance"))?;

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        diagnostics.debug(format!(
            "Vulkan instance created ({} extensions, validation {})",
            extension_names.len(),
            if validation { "on" } else { "off" }
        ));

        Ok(Self { entry, instance, debug })
    }

    fn layer_available(entry: &Entry, layer: &str) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|props| {
                    let name = unsafe { CStr::from_ptr(props.layer_name.as_ptr()) };
                    name.to_str().map_or(false, |name| name == layer)
                })
            })
            .unwrap_or(false)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(VulkanError::api("vkCreateDebugUtilsMessengerEXT"))
    }

    /// Vulkan entry points
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Raw instance handle
    pub fn handle(&self) -> vk::Instance {
        self.instance.handle()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn to_cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value)
        .map_err(|_| VulkanError::InitializationFailed(format!("String contains interior NUL: {value:?}")))
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
