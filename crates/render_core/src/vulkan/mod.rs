//! Vulkan resource and swapchain lifecycle
//!
//! Organized the way the layer is brought up:
//!
//! - [`initialization`]: instance, window and surface, adapter selection, device context
//! - [`resources`]: memory-type selection, buffers, images, textures
//! - [`rendering`]: single-use commands, layout transitions, mipmaps, render passes, framebuffers
//! - [`state`]: swapchain backends, render attachments, frame synchronization

pub mod error;
pub mod initialization;
pub mod rendering;
pub mod resources;
pub mod state;

pub use error::{ErrorKind, VulkanError, VulkanResult};
pub use initialization::{DeviceContext, RenderingContext};
pub use state::swapchain::{HeadsetSession, HeadsetSwapchain, WindowedSwapchain};
pub use state::{SwapchainBackend, FrameSynchronizer};
