//! Command recording helpers, layout transitions, mip generation and render targets

pub mod commands;
pub mod framebuffer;
pub mod layout;
pub mod mipmap;
pub mod render_pass;

pub use commands::{allocate_command_buffers, free_command_buffers, submit_single_time, CommandPool};
pub use framebuffer::{clear_values, framebuffer_attachments, Framebuffer};
pub use layout::{transition_image_layout, LayoutTransition};
pub use mipmap::{generate_mipmaps, mip_extent, mip_level_count, require_linear_blit};
pub use render_pass::RenderPass;
