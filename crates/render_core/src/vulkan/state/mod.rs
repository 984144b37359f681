//! Per-frame state: swapchains, their render targets and frame synchronization

pub mod attachments;
pub mod swapchain;
pub mod sync;

pub use attachments::RenderAttachments;
pub use swapchain::{AcquireOutcome, Choice, FrameImages, PresentOutcome, SwapchainBackend};
pub use sync::{
    DeviceFrameQueue, FrameCursor, FrameQueue, FrameStart, FrameSync, FrameSyncSet, FrameSynchronizer, FrameTicket,
};
