//! Viewer application
//!
//! Opens a window, brings up the render layer and clears the swapchain every
//! frame, recreating it on resize. Pass a `.toml` or `.ron` renderer config as
//! the first argument to override the defaults.

use std::process::ExitCode;
use std::time::Instant;

use ash::vk;
use glfw::{Action, Key, WindowEvent};
use render_core::foundation::logging;
use render_core::prelude::*;
use render_core::vulkan::initialization::WindowError;
use render_core::vulkan::rendering::{allocate_command_buffers, clear_values};
use thiserror::Error;

/// Errors that end the viewer
#[derive(Error, Debug)]
enum ViewerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),
}

type ViewerResult<T> = Result<T, ViewerError>;

/// Everything the frame loop owns
///
/// Field order is drop order: sync objects and the swapchain go before the
/// context they were created from.
struct Viewer {
    frames: FrameSynchronizer,
    command_buffers: Vec<vk::CommandBuffer>,
    swapchain: WindowedSwapchain<Window>,
    rendering: RenderingContext,
    start: Instant,
}

impl Viewer {
    fn new(config: &RendererConfig) -> ViewerResult<Self> {
        let window = Window::new(&config.window)?;
        let (rendering, surface) = RenderingContext::windowed(config, window, Diagnostics::log())?;
        let ctx = rendering.context();

        let mut swapchain = WindowedSwapchain::new(ctx, surface, config.prefer_mailbox)?;
        let frames = FrameSynchronizer::new(ctx, config.frames_in_flight)?;
        let command_buffers = allocate_command_buffers(ctx, frames.frames_in_flight() as u32)?;

        let white = Texture::solid_color(ctx, [255, 255, 255, 255])?;
        swapchain.textures_mut().insert("white", white);

        log::info!(
            "Viewer ready on {} ({:?}, {} frames in flight)",
            ctx.adapter().name(),
            ctx.sample_count(),
            frames.frames_in_flight()
        );

        Ok(Self {
            frames,
            command_buffers,
            swapchain,
            rendering,
            start: Instant::now(),
        })
    }

    fn run(&mut self) -> ViewerResult<()> {
        let mut frame_count: u64 = 0;

        while !self.swapchain.window().should_close() {
            for event in self.swapchain.window_mut().poll_events() {
                if let WindowEvent::Key(Key::Escape, _, Action::Press, _) = event {
                    self.swapchain.window_mut().set_should_close(true);
                }
            }

            if self.swapchain.window_mut().take_resized() {
                self.swapchain.recreate()?;
            }

            if self.render_frame()? {
                frame_count += 1;
            }
        }

        let seconds = self.start.elapsed().as_secs_f64();
        log::info!("Presented {frame_count} frames in {seconds:.1}s");
        Ok(())
    }

    /// Returns whether a frame was presented
    fn render_frame(&mut self) -> ViewerResult<bool> {
        let ticket = match self.frames.begin_frame(&mut self.swapchain)? {
            FrameStart::Ready(ticket) => ticket,
            FrameStart::OutOfDate => {
                self.swapchain.recreate()?;
                return Ok(false);
            }
        };

        let command_buffer = self.command_buffers[ticket.slot()];
        self.record(command_buffer, &ticket)?;

        let outcome = self
            .frames
            .submit_and_present(&mut self.swapchain, ticket, &[command_buffer])?;
        if outcome.needs_recreate() {
            self.swapchain.recreate()?;
        }
        Ok(outcome != PresentOutcome::OutOfDate)
    }

    fn record(&self, command_buffer: vk::CommandBuffer, ticket: &FrameTicket) -> VulkanResult<()> {
        let ctx = self.rendering.context();
        let device = ctx.device();
        let clears = clear_values(self.clear_color(), ctx.sample_count());

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::api("vkResetCommandBuffer"))?;

            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::api("vkBeginCommandBuffer"))?;

            for (view, &image_index) in ticket.images().image_indices.iter().enumerate() {
                let Some(framebuffer) = self.swapchain.framebuffer(view, image_index) else {
                    return Err(VulkanError::InvalidOperation {
                        reason: format!("No framebuffer for view {view} image {image_index}"),
                    });
                };

                let render_pass_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(self.swapchain.render_pass())
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D::default(),
                        extent: self.swapchain.view_extent(view),
                    })
                    .clear_values(&clears);

                device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_end_render_pass(command_buffer);
            }

            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::api("vkEndCommandBuffer"))?;
        }

        Ok(())
    }

    /// Slow cycle through hues so dropped or stale frames are visible
    fn clear_color(&self) -> [f32; 4] {
        let t = self.start.elapsed().as_secs_f32() * 0.5;
        let third = std::f32::consts::TAU / 3.0;
        [
            0.5 + 0.5 * t.sin(),
            0.5 + 0.5 * (t + third).sin(),
            0.5 + 0.5 * (t + 2.0 * third).sin(),
            1.0,
        ]
    }
}

fn load_config() -> ViewerResult<RendererConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading renderer config from {path}");
            RendererConfig::load_from_file(&path)?
        }
        None => RendererConfig::new("viewer").with_window("Viewer", 1280, 720),
    };
    config.validate()?;
    Ok(config)
}

fn run() -> ViewerResult<()> {
    let config = load_config()?;
    let mut viewer = Viewer::new(&config)?;
    viewer.run()
}

fn main() -> ExitCode {
    logging::init_with_level("info");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
