//! Windowed swapchain
//!
//! Presents to a window surface. Everything sized by the surface (images,
//! views, render pass, attachments, framebuffers) is built as one unit and
//! rebuilt wholesale by [`WindowedSwapchain::recreate`].

use ash::extensions::khr;
use ash::vk;

use crate::vulkan::initialization::capabilities::BackendKind;
use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::initialization::surface::WindowSurface;
use crate::vulkan::initialization::window::{wait_for_nonzero_framebuffer, PresentationWindow};
use crate::vulkan::rendering::framebuffer::Framebuffer;
use crate::vulkan::rendering::render_pass::RenderPass;
use crate::vulkan::resources::image::ImageView;
use crate::vulkan::resources::texture::TextureRegistry;
use crate::vulkan::state::attachments::RenderAttachments;
use crate::vulkan::state::swapchain::{
    acquire_result, choose_extent, choose_image_count, choose_present_mode, choose_surface_format, present_result,
    AcquireOutcome, FrameImages, PresentOutcome, SwapchainBackend,
};
use crate::vulkan::{VulkanError, VulkanResult};

/// Swapchain handle with RAII cleanup
struct SwapchainHandle {
    loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Everything built from one surface configuration
///
/// Field order is destruction order: the reverse of creation.
struct SwapchainResources {
    framebuffers: Vec<Framebuffer>,
    attachments: RenderAttachments,
    render_pass: RenderPass,
    views: Vec<ImageView>,
    swapchain: SwapchainHandle,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    requested_images: u32,
}

/// Swapchain bound to a desktop window
pub struct WindowedSwapchain<W: PresentationWindow> {
    textures: TextureRegistry,
    resources: Option<SwapchainResources>,
    surface: WindowSurface<W>,
    ctx: DeviceContext,
    prefer_mailbox: bool,
}

impl<W: PresentationWindow> WindowedSwapchain<W> {
    /// Build the swapchain and its render targets for `surface`
    pub fn new(ctx: &DeviceContext, surface: WindowSurface<W>, prefer_mailbox: bool) -> VulkanResult<Self> {
        let resources = build_resources(ctx, &surface, prefer_mailbox)?;
        Ok(Self {
            textures: TextureRegistry::new(),
            resources: Some(resources),
            surface,
            ctx: ctx.clone(),
            prefer_mailbox,
        })
    }

    fn resources(&self) -> VulkanResult<&SwapchainResources> {
        self.resources.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Swapchain is not built; a previous recreate failed".to_string(),
        })
    }

    /// The window being presented to
    pub fn window(&self) -> &W {
        self.surface.window()
    }

    /// Mutable access to the window (event polling)
    pub fn window_mut(&mut self) -> &mut W {
        self.surface.window_mut()
    }

    /// Current surface extent
    pub fn extent(&self) -> vk::Extent2D {
        self.resources.as_ref().map(|r| r.extent).unwrap_or_default()
    }

    /// Present mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.resources.as_ref().map_or(vk::PresentModeKHR::FIFO, |r| r.present_mode)
    }

    /// Raw swapchain images
    pub fn images(&self) -> &[vk::Image] {
        self.resources.as_ref().map_or(&[], |r| r.images.as_slice())
    }

    /// Number of images the surface policy asked for
    pub fn requested_image_count(&self) -> u32 {
        self.resources.as_ref().map_or(0, |r| r.requested_images)
    }

    /// Images, views and framebuffers all line up one to one
    pub fn is_consistent(&self) -> bool {
        self.resources
            .as_ref()
            .is_some_and(|r| r.images.len() == r.views.len() && r.views.len() == r.framebuffers.len())
    }
}

fn build_resources<W: PresentationWindow>(
    ctx: &DeviceContext,
    surface: &WindowSurface<W>,
    prefer_mailbox: bool,
) -> VulkanResult<SwapchainResources> {
    let diagnostics = ctx.diagnostics();
    let support = surface.query_support(ctx.physical_device())?;
    let caps = support.capabilities;

    let format = choose_surface_format(&support.formats)?;
    if format.is_fallback() {
        diagnostics.debug(format!("Preferred surface format unavailable, using {:?}", format.value()));
    }
    let format = format.into_inner();

    let present_mode = choose_present_mode(&support.present_modes, prefer_mailbox);
    if present_mode.is_fallback() {
        diagnostics.debug("Mailbox present mode unavailable, using FIFO");
    }
    let present_mode = present_mode.into_inner();

    let extent = choose_extent(&caps, surface.window().framebuffer_size()).into_inner();
    let requested_images = choose_image_count(&caps);

    let indices = ctx.queue_families();
    let families: Vec<u32> = [indices.graphics, indices.present].into_iter().flatten().collect();
    let concurrent = families.len() == 2 && families[0] != families[1];

    let mut create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface.handle())
        .min_image_count(requested_images)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());
    create_info = if concurrent {
        create_info
            .image_sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(&families)
    } else {
        create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
    };

    let loader = ctx.swapchain_loader()?.clone();
    let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
        .map_err(VulkanError::api("vkCreateSwapchainKHR"))?;
    let swapchain = SwapchainHandle { loader, swapchain };

    let images = unsafe { swapchain.loader.get_swapchain_images(swapchain.swapchain) }
        .map_err(VulkanError::api("vkGetSwapchainImagesKHR"))?;
    if images.len() != requested_images as usize {
        diagnostics.debug(format!(
            "Driver created {} swapchain images, {} requested",
            images.len(),
            requested_images
        ));
    }

    let views = images
        .iter()
        .map(|&image| ImageView::color(ctx.device(), image, format.format))
        .collect::<VulkanResult<Vec<_>>>()?;

    let render_pass = RenderPass::new(
        ctx.device(),
        format.format,
        ctx.depth_format(),
        ctx.sample_count(),
        vk::ImageLayout::PRESENT_SRC_KHR,
    )?;

    let attachments = RenderAttachments::new(ctx, format.format, extent)?;

    let framebuffers = views
        .iter()
        .map(|view| Framebuffer::new(ctx.device(), render_pass.handle(), &attachments.attachments_for(view.handle()), extent))
        .collect::<VulkanResult<Vec<_>>>()?;

    diagnostics.info(format!(
        "Swapchain ready: {}x{}, {:?}, {:?}, {} images",
        extent.width,
        extent.height,
        format.format,
        present_mode,
        images.len()
    ));

    Ok(SwapchainResources {
        framebuffers,
        attachments,
        render_pass,
        views,
        swapchain,
        images,
        format,
        present_mode,
        extent,
        requested_images,
    })
}

impl<W: PresentationWindow> SwapchainBackend for WindowedSwapchain<W> {
    fn kind(&self) -> BackendKind {
        BackendKind::Windowed
    }

    fn surface_format(&self) -> vk::Format {
        self.resources.as_ref().map_or(vk::Format::UNDEFINED, |r| r.format.format)
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.resources.as_ref().map_or(vk::RenderPass::null(), |r| r.render_pass.handle())
    }

    fn view_count(&self) -> usize {
        1
    }

    fn view_extent(&self, _view: usize) -> vk::Extent2D {
        self.extent()
    }

    fn image_count(&self, _view: usize) -> usize {
        self.images().len()
    }

    fn framebuffer(&self, view: usize, image_index: u32) -> Option<vk::Framebuffer> {
        if view != 0 {
            return None;
        }
        self.resources
            .as_ref()?
            .framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
    }

    fn acquire(&mut self, image_available: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        let resources = self.resources()?;
        let result = unsafe {
            resources.swapchain.loader.acquire_next_image(
                resources.swapchain.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };

        Ok(match acquire_result(result, "vkAcquireNextImageKHR")? {
            Some((index, suboptimal)) => AcquireOutcome::Acquired(FrameImages {
                image_indices: vec![index],
                uses_semaphores: true,
                suboptimal,
            }),
            None => AcquireOutcome::OutOfDate,
        })
    }

    fn present(
        &mut self,
        queue: vk::Queue,
        images: &FrameImages,
        render_finished: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let resources = self.resources()?;
        let image_index = images.image_indices.first().copied().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Present called without an acquired image".to_string(),
        })?;
        let wait_semaphores = [render_finished];
        let swapchains = [resources.swapchain.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { resources.swapchain.loader.queue_present(queue, &present_info) };
        let outcome = present_result(result)?;

        Ok(if images.suboptimal && outcome == PresentOutcome::Presented {
            PresentOutcome::Suboptimal
        } else {
            outcome
        })
    }

    fn recreate(&mut self) -> VulkanResult<()> {
        let (width, height) = wait_for_nonzero_framebuffer(self.surface.window_mut());
        self.ctx.wait_idle()?;

        self.resources = None;
        self.resources = Some(build_resources(&self.ctx, &self.surface, self.prefer_mailbox)?);

        self.ctx
            .diagnostics()
            .debug(format!("Swapchain recreated for {width}x{height} framebuffer"));
        Ok(())
    }

    fn textures(&self) -> &TextureRegistry {
        &self.textures
    }

    fn textures_mut(&mut self) -> &mut TextureRegistry {
        &mut self.textures
    }
}

impl<W: PresentationWindow> Drop for WindowedSwapchain<W> {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.wait_idle() {
            self.ctx
                .diagnostics()
                .error(format!("Device wait before swapchain teardown failed: {err}"));
        }
    }
}
