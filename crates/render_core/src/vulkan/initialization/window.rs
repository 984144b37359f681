//! Window management using GLFW
//!
//! Provides window creation and event handling for the windowed backend, plus
//! the [`PresentationWindow`] seam the swapchain uses to talk to any window system.

use ash::vk;
use thiserror::Error;

use crate::config::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Vulkan is not available through the window system
    #[error("Vulkan is not supported by the window system")]
    VulkanUnsupported,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// What the windowed swapchain needs from a native window
pub trait PresentationWindow {
    /// Current framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Block until at least one window-system event arrives, then process it
    fn wait_events(&mut self);

    /// Instance extensions needed to present to this window
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>>;

    /// Create a presentation surface for this window
    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR>;

    /// Return and clear the pending resize flag
    fn take_resized(&mut self) -> bool;
}

/// Block until the window reports a non-zero framebuffer
///
/// A minimized window has a zero-sized framebuffer; there is nothing to present
/// to until it comes back, so this spins on window events. The returned size
/// supersedes any resize still pending, so the flag is cleared.
pub fn wait_for_nonzero_framebuffer<W: PresentationWindow + ?Sized>(window: &mut W) -> (u32, u32) {
    let mut size = window.framebuffer_size();
    while size.0 == 0 || size.1 == 0 {
        window.wait_events();
        size = window.framebuffer_size();
    }
    window.take_resized();
    size
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resized: bool,
}

impl Window {
    /// Create a resizable window without a client API context
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        // Configure for Vulkan (no OpenGL context)
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
            resized: false,
        })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Poll pending events, returning them after noting framebuffer resizes
    pub fn poll_events(&mut self) -> Vec<glfw::WindowEvent> {
        self.glfw.poll_events();
        let events: Vec<_> = glfw::flush_messages(&self.events).map(|(_, event)| event).collect();
        if events
            .iter()
            .any(|event| matches!(event, glfw::WindowEvent::FramebufferSize(..)))
        {
            self.resized = true;
        }
        events
    }
}

impl PresentationWindow for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
        // Drain so the receiver does not grow while minimized
        for _ in glfw::flush_messages(&self.events) {}
    }

    fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {result:?}")))
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}
