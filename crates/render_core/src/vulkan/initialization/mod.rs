//! Device bring-up: instance, window, surface, adapter selection and the
//! rendering context that owns the logical device

pub mod capabilities;
pub mod context;
pub mod instance;
pub mod surface;
pub mod window;

pub use capabilities::{AdapterDescriptor, BackendKind, QueueFamilyIndices, SwapchainSupportDetails};
pub use context::{DeviceContext, RenderingContext};
pub use instance::VulkanInstance;
pub use surface::WindowSurface;
pub use window::{PresentationWindow, Window, WindowError};
