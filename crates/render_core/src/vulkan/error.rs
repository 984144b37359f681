//! Vulkan error taxonomy
//!
//! Every failure that leaves this layer is a [`VulkanError`]. Errors come in two
//! kinds: fatal setup failures that abort the initializing call chain, and
//! programming errors (precondition violations such as an unsupported layout
//! transition). Policy fallbacks and resize races are never errors; see
//! [`Choice`](crate::vulkan::state::swapchain::Choice) and the acquire/present outcomes.

use ash::vk;
use thiserror::Error;

use crate::vulkan::initialization::window::WindowError;

/// Broad classification of a [`VulkanError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unrecoverable without changing inputs (hardware, driver, missing feature)
    Fatal,
    /// Caller violated a precondition of the layer
    Programming,
}

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan API call returned an error code
    #[error("{operation} failed: {result:?}")]
    Api {
        /// Name of the failing operation
        operation: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// The device was lost while waiting on or submitting GPU work
    #[error("GPU device lost during {operation}")]
    DeviceLost {
        /// Name of the operation that observed the loss
        operation: &'static str,
    },

    /// Generic initialization failure with a descriptive message
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No adapter satisfied the suitability rules
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type matched the filter and property request
    #[error("No suitable memory type found (type filter {type_filter:#034b}, properties {properties:?})")]
    NoSuitableMemoryType {
        /// Bitmask of acceptable memory type indices
        type_filter: u32,
        /// Property flags every accepted type must carry
        properties: vk::MemoryPropertyFlags,
    },

    /// None of the candidate formats support the requested tiling and features
    #[error("No supported format among {candidates:?} for {features:?}")]
    NoSupportedFormat {
        /// Candidate formats in preference order
        candidates: Vec<vk::Format>,
        /// Features that were required
        features: vk::FormatFeatureFlags,
    },

    /// The surface (or headset runtime) reported no usable formats
    #[error("No surface formats available")]
    NoSurfaceFormats,

    /// A format lacks a feature required by a mandatory operation
    #[error("Format {format:?} unsupported: {reason}")]
    UnsupportedFormat {
        /// The offending format
        format: vk::Format,
        /// What the format was needed for
        reason: &'static str,
    },

    /// The requested (old, new) layout pair is not an authorized transition
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Layout the image is in
        old: vk::ImageLayout,
        /// Layout that was requested
        new: vk::ImageLayout,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// The head-mounted-display runtime reported a failure
    #[error("Headset runtime error: {0}")]
    Headset(String),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

impl VulkanError {
    /// Build a closure mapping a raw result into an error tagged with the operation name
    ///
    /// `ERROR_DEVICE_LOST` is always surfaced as [`VulkanError::DeviceLost`].
    pub fn api(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| {
            if result == vk::Result::ERROR_DEVICE_LOST {
                Self::DeviceLost { operation }
            } else {
                Self::Api { operation, result }
            }
        }
    }

    /// Classify the error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedLayoutTransition { .. } | Self::InvalidOperation { .. } => {
                ErrorKind::Programming
            }
            _ => ErrorKind::Fatal,
        }
    }

    /// Whether the error is an unrecoverable setup or runtime failure
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_is_mapped() {
        let err = VulkanError::api("queue_submit")(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(err, VulkanError::DeviceLost { operation: "queue_submit" }));
    }

    #[test]
    fn test_api_error_keeps_operation_name() {
        let err = VulkanError::api("create_image")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(err.to_string().starts_with("create_image failed"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_layout_transition_is_programming_error() {
        let err = VulkanError::UnsupportedLayoutTransition {
            old: vk::ImageLayout::GENERAL,
            new: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        assert_eq!(err.kind(), ErrorKind::Programming);
        assert!(err.to_string().contains("Unsupported layout transition"));
    }
}
