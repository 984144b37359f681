//! Head-mounted display swapchains
//!
//! The HMD runtime owns the presentable images and the display timing. This
//! backend asks it for one swapchain per stereo view, wraps each image array
//! with views and framebuffers, and hands images back after rendering.

use ash::vk;

use crate::foundation::Diagnostics;
use crate::vulkan::initialization::capabilities::BackendKind;
use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::rendering::framebuffer::Framebuffer;
use crate::vulkan::rendering::render_pass::RenderPass;
use crate::vulkan::resources::image::ImageView;
use crate::vulkan::resources::texture::TextureRegistry;
use crate::vulkan::state::attachments::RenderAttachments;
use crate::vulkan::state::swapchain::{AcquireOutcome, Choice, FrameImages, PresentOutcome, SwapchainBackend};
use crate::vulkan::{VulkanError, VulkanResult};

/// Color formats tried first, in order
pub const PREFERRED_HEADSET_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB];

/// Runtime-recommended parameters for one stereo view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfiguration {
    /// Recommended image width
    pub recommended_width: u32,
    /// Recommended image height
    pub recommended_height: u32,
    /// Recommended sample count
    pub recommended_sample_count: u32,
    /// Largest image the runtime accepts
    pub max_image_rect: vk::Extent2D,
    /// Largest sample count the runtime accepts
    pub max_sample_count: u32,
}

impl ViewConfiguration {
    /// Recommended size, bounded by the runtime maximum and never zero
    pub fn image_extent(&self) -> vk::Extent2D {
        let bound = |recommended: u32, max: u32| {
            let max = if max == 0 { recommended } else { max };
            recommended.min(max).max(1)
        };
        vk::Extent2D {
            width: bound(self.recommended_width, self.max_image_rect.width),
            height: bound(self.recommended_height, self.max_image_rect.height),
        }
    }
}

/// Opaque runtime swapchain handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadsetSwapchainHandle(pub u64);

/// Parameters for a runtime swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadsetSwapchainRequest {
    /// Color format
    pub format: vk::Format,
    /// Image size
    pub extent: vk::Extent2D,
    /// Samples per texel of the presentable images
    pub sample_count: u32,
    /// How the images will be used
    pub usage: vk::ImageUsageFlags,
}

/// Device details the runtime needs to bind its session to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBinding {
    /// Instance handle
    pub instance: vk::Instance,
    /// Physical device handle
    pub physical_device: vk::PhysicalDevice,
    /// Logical device handle
    pub device: vk::Device,
    /// Queue family submissions go to
    pub queue_family_index: u32,
    /// Queue index within the family
    pub queue_index: u32,
}

/// What this layer needs from an HMD runtime session
pub trait HeadsetSession {
    /// Instance extensions the runtime requires
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Device extensions the runtime requires
    fn required_device_extensions(&self) -> VulkanResult<Vec<String>>;

    /// The physical device the runtime is attached to
    fn physical_device(&mut self, instance: vk::Instance) -> VulkanResult<vk::PhysicalDevice>;

    /// Tell the runtime which device and queue will render
    fn bind_device(&mut self, binding: &DeviceBinding) -> VulkanResult<()>;

    /// Color formats the runtime can present
    fn supported_formats(&self) -> VulkanResult<Vec<vk::Format>>;

    /// One configuration per stereo view
    fn view_configurations(&self) -> VulkanResult<Vec<ViewConfiguration>>;

    /// Create a runtime swapchain
    fn create_swapchain(&mut self, request: &HeadsetSwapchainRequest) -> VulkanResult<HeadsetSwapchainHandle>;

    /// Images backing a runtime swapchain
    fn enumerate_images(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<Vec<vk::Image>>;

    /// Acquire the next image index
    fn acquire_image(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<u32>;

    /// Block until the acquired image may be written
    fn wait_image(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<()>;

    /// Return the acquired image to the runtime
    fn release_image(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<()>;

    /// Destroy a runtime swapchain
    fn destroy_swapchain(&mut self, swapchain: HeadsetSwapchainHandle);
}

/// First preferred format the runtime supports, else its first format
///
/// Falling back is reported as a warning. An empty supported list is fatal.
pub fn select_headset_format(
    preferred: &[vk::Format],
    supported: &[vk::Format],
    diagnostics: &Diagnostics,
) -> VulkanResult<Choice<vk::Format>> {
    if let Some(&format) = preferred.iter().find(|format| supported.contains(format)) {
        return Ok(Choice::Preferred(format));
    }

    let fallback = *supported.first().ok_or(VulkanError::NoSurfaceFormats)?;
    diagnostics.warn(format!(
        "No preferred headset format among {supported:?}; falling back to {fallback:?}"
    ));
    Ok(Choice::Fallback(fallback))
}

/// Render targets for one stereo view
///
/// Field order is destruction order; the runtime swapchain itself is destroyed
/// through the session afterwards.
struct ViewTargets {
    framebuffers: Vec<Framebuffer>,
    attachments: RenderAttachments,
    views: Vec<ImageView>,
    images: Vec<vk::Image>,
    extent: vk::Extent2D,
    handle: HeadsetSwapchainHandle,
}

/// Acquire and wait on the next image of every view, in order
///
/// If any view fails, the images already acquired are released before the
/// error is returned so the runtime is not left holding them.
pub fn acquire_views<S: HeadsetSession + ?Sized>(
    session: &mut S,
    handles: &[HeadsetSwapchainHandle],
    diagnostics: &Diagnostics,
) -> VulkanResult<Vec<u32>> {
    let mut image_indices = Vec::with_capacity(handles.len());
    for &handle in handles {
        let result = session.acquire_image(handle).and_then(|index| {
            image_indices.push(index);
            session.wait_image(handle)
        });

        if let Err(err) = result {
            // Includes the view whose wait failed, since its acquire succeeded
            for &acquired in &handles[..image_indices.len()] {
                if let Err(release_err) = session.release_image(acquired) {
                    diagnostics.warn(format!("Failed to release headset image after acquire error: {release_err}"));
                }
            }
            return Err(err);
        }
    }
    Ok(image_indices)
}

/// Per-view swapchains provided by an HMD runtime
pub struct HeadsetSwapchain<S: HeadsetSession> {
    textures: TextureRegistry,
    views: Vec<ViewTargets>,
    render_pass: Option<RenderPass>,
    format: vk::Format,
    session: S,
    ctx: DeviceContext,
}

impl<S: HeadsetSession> HeadsetSwapchain<S> {
    /// Create one swapchain per view reported by `session`
    pub fn new(ctx: &DeviceContext, session: S) -> VulkanResult<Self> {
        let mut swapchain = Self {
            textures: TextureRegistry::new(),
            views: Vec::new(),
            render_pass: None,
            format: vk::Format::UNDEFINED,
            session,
            ctx: ctx.clone(),
        };
        swapchain.build()?;
        Ok(swapchain)
    }

    /// The runtime session
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Mutable access to the runtime session
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Images of `view`
    pub fn images(&self, view: usize) -> &[vk::Image] {
        self.views.get(view).map_or(&[], |targets| targets.images.as_slice())
    }

    fn build(&mut self) -> VulkanResult<()> {
        let result = self.try_build();
        if result.is_err() {
            self.teardown();
        }
        result
    }

    fn try_build(&mut self) -> VulkanResult<()> {
        let ctx = self.ctx.clone();
        let supported = self.session.supported_formats()?;
        let format = select_headset_format(&PREFERRED_HEADSET_FORMATS, &supported, ctx.diagnostics())?.into_inner();
        let configurations = self.session.view_configurations()?;
        if configurations.is_empty() {
            return Err(VulkanError::Headset("Runtime reported no views".to_string()));
        }

        let render_pass = RenderPass::new(
            ctx.device(),
            format,
            ctx.depth_format(),
            ctx.sample_count(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        let render_pass_handle = render_pass.handle();
        self.render_pass = Some(render_pass);
        self.format = format;

        for (index, config) in configurations.iter().enumerate() {
            let extent = config.image_extent();
            let handle = self.session.create_swapchain(&HeadsetSwapchainRequest {
                format,
                extent,
                sample_count: 1,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            })?;

            let targets = match Self::build_view(&ctx, &mut self.session, handle, format, extent, render_pass_handle) {
                Ok(targets) => targets,
                Err(err) => {
                    self.session.destroy_swapchain(handle);
                    return Err(err);
                }
            };

            ctx.diagnostics().debug(format!(
                "Headset view {index}: {}x{}, {} images",
                extent.width,
                extent.height,
                targets.images.len()
            ));
            self.views.push(targets);
        }

        ctx.diagnostics()
            .info(format!("Headset swapchains ready: {} views, {format:?}", self.views.len()));
        Ok(())
    }

    fn build_view(
        ctx: &DeviceContext,
        session: &mut S,
        handle: HeadsetSwapchainHandle,
        format: vk::Format,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<ViewTargets> {
        let images = session.enumerate_images(handle)?;
        let views = images
            .iter()
            .map(|&image| ImageView::color(ctx.device(), image, format))
            .collect::<VulkanResult<Vec<_>>>()?;
        let attachments = RenderAttachments::new(ctx, format, extent)?;
        let framebuffers = views
            .iter()
            .map(|view| Framebuffer::new(ctx.device(), render_pass, &attachments.attachments_for(view.handle()), extent))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(ViewTargets {
            framebuffers,
            attachments,
            views,
            images,
            extent,
            handle,
        })
    }

    fn teardown(&mut self) {
        for targets in std::mem::take(&mut self.views) {
            let handle = targets.handle;
            drop(targets);
            self.session.destroy_swapchain(handle);
        }
        self.render_pass = None;
    }
}

impl<S: HeadsetSession> SwapchainBackend for HeadsetSwapchain<S> {
    fn kind(&self) -> BackendKind {
        BackendKind::Headset
    }

    fn surface_format(&self) -> vk::Format {
        self.format
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.as_ref().map_or(vk::RenderPass::null(), RenderPass::handle)
    }

    fn view_count(&self) -> usize {
        self.views.len()
    }

    fn view_extent(&self, view: usize) -> vk::Extent2D {
        self.views.get(view).map(|targets| targets.extent).unwrap_or_default()
    }

    fn image_count(&self, view: usize) -> usize {
        self.images(view).len()
    }

    fn framebuffer(&self, view: usize, image_index: u32) -> Option<vk::Framebuffer> {
        self.views
            .get(view)?
            .framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
    }

    fn acquire(&mut self, _image_available: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        if self.views.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Headset swapchain is not built".to_string(),
            });
        }

        let handles: Vec<_> = self.views.iter().map(|targets| targets.handle).collect();
        let image_indices = acquire_views(&mut self.session, &handles, self.ctx.diagnostics())?;

        Ok(AcquireOutcome::Acquired(FrameImages {
            image_indices,
            uses_semaphores: false,
            suboptimal: false,
        }))
    }

    fn present(
        &mut self,
        _queue: vk::Queue,
        _images: &FrameImages,
        _render_finished: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        for targets in &self.views {
            self.session.release_image(targets.handle)?;
        }
        Ok(PresentOutcome::Presented)
    }

    fn recreate(&mut self) -> VulkanResult<()> {
        self.ctx.wait_idle()?;
        self.teardown();
        self.build()
    }

    fn textures(&self) -> &TextureRegistry {
        &self.textures
    }

    fn textures_mut(&mut self) -> &mut TextureRegistry {
        &mut self.textures
    }
}

impl<S: HeadsetSession> Drop for HeadsetSwapchain<S> {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.wait_idle() {
            self.ctx
                .diagnostics()
                .error(format!("Device wait before headset teardown failed: {err}"));
        }
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::MemorySink;
    use std::sync::Arc;

    fn diagnostics() -> (Arc<MemorySink>, Diagnostics) {
        let sink = Arc::new(MemorySink::new());
        (sink.clone(), Diagnostics::new(sink))
    }

    #[test]
    fn test_first_preferred_supported_format_wins() {
        let (sink, diagnostics) = diagnostics();
        let supported = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];
        let choice = select_headset_format(&PREFERRED_HEADSET_FORMATS, &supported, &diagnostics).unwrap();
        assert_eq!(choice, Choice::Preferred(vk::Format::R8G8B8A8_SRGB));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_fallback_format_warns() {
        let (sink, diagnostics) = diagnostics();
        let supported = [vk::Format::R16G16B16A16_SFLOAT, vk::Format::R8G8B8A8_UNORM];
        let choice = select_headset_format(&PREFERRED_HEADSET_FORMATS, &supported, &diagnostics).unwrap();
        assert_eq!(choice, Choice::Fallback(vk::Format::R16G16B16A16_SFLOAT));
        assert_eq!(sink.at_level(log::Level::Warn).len(), 1);
    }

    #[test]
    fn test_no_supported_formats_is_fatal() {
        let (_, diagnostics) = diagnostics();
        let result = select_headset_format(&PREFERRED_HEADSET_FORMATS, &[], &diagnostics);
        assert!(matches!(result, Err(VulkanError::NoSurfaceFormats)));
    }

    #[test]
    fn test_view_extent_bounded_by_runtime() {
        let config = ViewConfiguration {
            recommended_width: 2064,
            recommended_height: 2208,
            recommended_sample_count: 1,
            max_image_rect: vk::Extent2D {
                width: 2048,
                height: 4096,
            },
            max_sample_count: 4,
        };
        assert_eq!(
            config.image_extent(),
            vk::Extent2D {
                width: 2048,
                height: 2208
            }
        );

        let unbounded = ViewConfiguration {
            max_image_rect: vk::Extent2D::default(),
            ..config
        };
        assert_eq!(unbounded.image_extent().width, 2064);
    }

    /// Runtime whose acquire or wait fails for one swapchain
    #[derive(Default)]
    struct FlakySession {
        fail_acquire: Option<HeadsetSwapchainHandle>,
        fail_wait: Option<HeadsetSwapchainHandle>,
        acquired: Vec<HeadsetSwapchainHandle>,
        released: Vec<HeadsetSwapchainHandle>,
    }

    impl HeadsetSession for FlakySession {
        fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn required_device_extensions(&self) -> VulkanResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn physical_device(&mut self, _instance: vk::Instance) -> VulkanResult<vk::PhysicalDevice> {
            Ok(vk::PhysicalDevice::null())
        }

        fn bind_device(&mut self, _binding: &DeviceBinding) -> VulkanResult<()> {
            Ok(())
        }

        fn supported_formats(&self) -> VulkanResult<Vec<vk::Format>> {
            Ok(vec![vk::Format::R8G8B8A8_SRGB])
        }

        fn view_configurations(&self) -> VulkanResult<Vec<ViewConfiguration>> {
            Ok(Vec::new())
        }

        fn create_swapchain(&mut self, _request: &HeadsetSwapchainRequest) -> VulkanResult<HeadsetSwapchainHandle> {
            Err(VulkanError::Headset("not supported".to_string()))
        }

        fn enumerate_images(&mut self, _swapchain: HeadsetSwapchainHandle) -> VulkanResult<Vec<vk::Image>> {
            Ok(Vec::new())
        }

        fn acquire_image(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<u32> {
            if self.fail_acquire == Some(swapchain) {
                return Err(VulkanError::Headset("acquire failed".to_string()));
            }
            self.acquired.push(swapchain);
            Ok(swapchain.0 as u32 + 10)
        }

        fn wait_image(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<()> {
            if self.fail_wait == Some(swapchain) {
                return Err(VulkanError::Headset("wait failed".to_string()));
            }
            Ok(())
        }

        fn release_image(&mut self, swapchain: HeadsetSwapchainHandle) -> VulkanResult<()> {
            self.released.push(swapchain);
            Ok(())
        }

        fn destroy_swapchain(&mut self, _swapchain: HeadsetSwapchainHandle) {}
    }

    const LEFT: HeadsetSwapchainHandle = HeadsetSwapchainHandle(1);
    const RIGHT: HeadsetSwapchainHandle = HeadsetSwapchainHandle(2);

    #[test]
    fn test_acquire_views_returns_indices_in_view_order() {
        let (_, diagnostics) = diagnostics();
        let mut session = FlakySession::default();
        let indices = acquire_views(&mut session, &[LEFT, RIGHT], &diagnostics).unwrap();
        assert_eq!(indices, vec![11, 12]);
        assert!(session.released.is_empty());
    }

    #[test]
    fn test_failed_acquire_releases_earlier_views() {
        let (_, diagnostics) = diagnostics();
        let mut session = FlakySession {
            fail_acquire: Some(RIGHT),
            ..FlakySession::default()
        };
        let result = acquire_views(&mut session, &[LEFT, RIGHT], &diagnostics);
        assert!(matches!(result, Err(VulkanError::Headset(_))));
        assert_eq!(session.released, vec![LEFT]);
    }

    #[test]
    fn test_failed_wait_releases_that_view_too() {
        let (_, diagnostics) = diagnostics();
        let mut session = FlakySession {
            fail_wait: Some(RIGHT),
            ..FlakySession::default()
        };
        assert!(acquire_views(&mut session, &[LEFT, RIGHT], &diagnostics).is_err());
        assert_eq!(session.acquired, vec![LEFT, RIGHT]);
        assert_eq!(session.released, vec![LEFT, RIGHT]);

        let mut session = FlakySession {
            fail_acquire: Some(LEFT),
            ..FlakySession::default()
        };
        assert!(acquire_views(&mut session, &[LEFT, RIGHT], &diagnostics).is_err());
        assert!(session.released.is_empty());
    }
}
