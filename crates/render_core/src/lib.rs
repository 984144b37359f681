//! # render_core
//!
//! GPU resource and swapchain lifecycle layer for Vulkan.
//!
//! ## Features
//!
//! - **Adapter selection**: capability probing, MSAA and depth format resolution
//! - **Resources**: buffers, images and mipmapped textures with RAII cleanup
//! - **Layout transitions**: a fixed table of supported transitions with the
//!   matching access masks and pipeline stages
//! - **Two presentation backends**: a desktop window surface and a stereo
//!   head-mounted display driven through [`HeadsetSession`](vulkan::HeadsetSession)
//! - **Frame pacing**: N frames in flight with per-slot fences and semaphores
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let window = Window::new(&config.window)?;
//!     let (rendering, surface) = RenderingContext::windowed(&config, window, Diagnostics::default())?;
//!     let mut swapchain = WindowedSwapchain::new(rendering.context(), surface, config.prefer_mailbox)?;
//!     let mut frames = FrameSynchronizer::new(rendering.context(), config.frames_in_flight)?;
//!
//!     if let FrameStart::Ready(ticket) = frames.begin_frame(&mut swapchain)? {
//!         // record command buffers for ticket.images() here
//!         frames.submit_and_present(&mut swapchain, ticket, &[])?;
//!     }
//!
//!     // Locals drop in reverse order: sync objects, swapchain, then the context
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod foundation;
pub mod vulkan;

/// Common imports for applications driving the layer
pub mod prelude {
    pub use crate::config::{Config, ConfigError, RendererConfig, WindowConfig};
    pub use crate::foundation::{Diagnostics, DiagnosticsSink, LogSink, MemorySink};
    pub use crate::vulkan::initialization::{PresentationWindow, Window};
    pub use crate::vulkan::resources::{PixelData, Texture, TextureKey, TextureRegistry};
    pub use crate::vulkan::state::{
        FrameStart, FrameSynchronizer, FrameTicket, PresentOutcome, SwapchainBackend,
    };
    pub use crate::vulkan::{
        DeviceContext, ErrorKind, HeadsetSession, HeadsetSwapchain, RenderingContext, VulkanError,
        VulkanResult, WindowedSwapchain,
    };
}
