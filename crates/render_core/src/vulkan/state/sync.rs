//! Frame synchronization
//!
//! Each frame slot owns an image-available semaphore, a render-finished
//! semaphore and an in-flight fence. The fence is created signaled so the
//! first wait on a slot returns immediately. A slot is only reused after its
//! fence has been waited on, which bounds the CPU to `frames_in_flight` frames
//! ahead of the GPU.

use ash::{vk, Device};

use crate::vulkan::initialization::context::DeviceContext;
use crate::vulkan::state::swapchain::{AcquireOutcome, FrameImages, PresentOutcome, SwapchainBackend};
use crate::vulkan::{VulkanError, VulkanResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }
            .map_err(VulkanError::api("vkCreateSemaphore"))?;

        Ok(Self {
            device: device.clone(),
            semaphore,
        })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: &Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::api("vkCreateFence"))?;

        Ok(Self {
            device: device.clone(),
            fence,
        })
    }

    /// Wait for the fence to be signaled
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) }
            .map_err(VulkanError::api("vkWaitForFences"))
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::api("vkResetFences"))
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects for one frame slot
pub struct FrameSync {
    /// Signaled when the acquired image can be rendered to
    pub image_available: Semaphore,
    /// Signaled when rendering is complete and the image can be presented
    pub render_finished: Semaphore,
    /// Signaled when the slot's GPU work has finished
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects, the fence already signaled
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
        })
    }
}

/// One [`FrameSync`] per frame in flight
pub struct FrameSyncSet {
    frames: Vec<FrameSync>,
}

impl FrameSyncSet {
    /// Create `frames_in_flight` slots
    pub fn new(device: &Device, frames_in_flight: usize) -> VulkanResult<Self> {
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "At least one frame in flight is required".to_string(),
            });
        }

        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(device))
            .collect::<VulkanResult<Vec<_>>>()?;
        Ok(Self { frames })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; a set has at least one slot
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Slot `index`
    pub fn get(&self, index: usize) -> Option<&FrameSync> {
        self.frames.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Idle,
    Recording,
}

/// Current frame slot and whether a frame is in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCursor {
    frames: usize,
    current: usize,
    state: CursorState,
}

impl FrameCursor {
    /// Start at slot 0 of `frames` slots
    pub fn new(frames: usize) -> Self {
        Self {
            frames: frames.max(1),
            current: 0,
            state: CursorState::Idle,
        }
    }

    /// Slot the next (or current) frame uses
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots cycled through
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Whether a frame has begun and not yet ended
    pub fn in_frame(&self) -> bool {
        self.state == CursorState::Recording
    }

    /// Start a frame, returning its slot
    pub fn begin(&mut self) -> VulkanResult<usize> {
        if self.state == CursorState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Frame {} already begun", self.current),
            });
        }
        self.state = CursorState::Recording;
        Ok(self.current)
    }

    /// Finish the frame and move to the next slot
    pub fn end(&mut self) -> VulkanResult<()> {
        if self.state != CursorState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Frame ended without being begun".to_string(),
            });
        }
        self.state = CursorState::Idle;
        self.current = (self.current + 1) % self.frames;
        Ok(())
    }

    /// Abandon the frame without advancing; the slot is reused next time
    pub fn abort(&mut self) {
        self.state = CursorState::Idle;
    }
}

/// A frame that has waited on its slot and acquired its images
#[derive(Debug)]
pub struct FrameTicket {
    slot: usize,
    images: FrameImages,
}

impl FrameTicket {
    /// Frame slot
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Acquired images, one index per view
    pub fn images(&self) -> &FrameImages {
        &self.images
    }
}

/// Result of [`FrameSynchronizer::begin_frame`]
#[derive(Debug)]
pub enum FrameStart {
    /// Record into the acquired images and submit the ticket
    Ready(FrameTicket),
    /// The swapchain is out of date; recreate it and try again
    OutOfDate,
}

/// GPU side of the frame protocol: per-slot fences and semaphores, and the queues
pub trait FrameQueue {
    /// Number of frame slots
    fn frames(&self) -> usize;

    /// Block until slot `index`'s fence is signaled
    fn wait(&self, index: usize) -> VulkanResult<()>;

    /// Unsignal slot `index`'s fence
    fn reset(&self, index: usize) -> VulkanResult<()>;

    /// Semaphore acquire signals for slot `index`
    fn image_available(&self, index: usize) -> vk::Semaphore;

    /// Semaphore present waits on for slot `index`
    fn render_finished(&self, index: usize) -> vk::Semaphore;

    /// Submit `command_buffers`, signaling slot `index`'s fence when they complete
    ///
    /// With `uses_semaphores` the submit waits on image-available and signals
    /// render-finished. On failure the slot's fence must be signaled again.
    fn submit(&mut self, index: usize, command_buffers: &[vk::CommandBuffer], uses_semaphores: bool) -> VulkanResult<()>;

    /// Queue presents go to
    fn present_queue(&self) -> vk::Queue;
}

/// [`FrameQueue`] over real fences and the context's queues
pub struct DeviceFrameQueue {
    frames: FrameSyncSet,
    ctx: DeviceContext,
}

impl DeviceFrameQueue {
    /// Create the sync objects for `frames_in_flight` slots
    pub fn new(ctx: &DeviceContext, frames_in_flight: usize) -> VulkanResult<Self> {
        let frames = FrameSyncSet::new(ctx.device(), frames_in_flight)?;
        ctx.diagnostics()
            .debug(format!("Created sync objects for {frames_in_flight} frames in flight"));

        Ok(Self {
            frames,
            ctx: ctx.clone(),
        })
    }

    fn slot(&self, index: usize) -> VulkanResult<&FrameSync> {
        self.frames.get(index).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Frame slot {index} out of range"),
        })
    }

    /// Replace the fence of a slot whose submit never reached the queue
    fn rearm(&mut self, index: usize) {
        match Fence::new(self.ctx.device(), true) {
            Ok(fence) => {
                if let Some(slot) = self.frames.frames.get_mut(index) {
                    slot.in_flight = fence;
                }
            }
            Err(err) => self
                .ctx
                .diagnostics()
                .error(format!("Failed to re-arm fence for frame slot {index}: {err}")),
        }
    }
}

impl FrameQueue for DeviceFrameQueue {
    fn frames(&self) -> usize {
        self.frames.len()
    }

    fn wait(&self, index: usize) -> VulkanResult<()> {
        self.slot(index)?.in_flight.wait(u64::MAX)
    }

    fn reset(&self, index: usize) -> VulkanResult<()> {
        self.slot(index)?.in_flight.reset()
    }

    fn image_available(&self, index: usize) -> vk::Semaphore {
        self.frames
            .get(index)
            .map_or(vk::Semaphore::null(), |slot| slot.image_available.handle())
    }

    fn render_finished(&self, index: usize) -> vk::Semaphore {
        self.frames
            .get(index)
            .map_or(vk::Semaphore::null(), |slot| slot.render_finished.handle())
    }

    fn submit(&mut self, index: usize, command_buffers: &[vk::CommandBuffer], uses_semaphores: bool) -> VulkanResult<()> {
        let slot = self.slot(index)?;
        let fence = slot.in_flight.handle();
        let wait_semaphores = [slot.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished.handle()];

        let mut submit_info = vk::SubmitInfo::builder().command_buffers(command_buffers);
        if uses_semaphores {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal_semaphores);
        }

        let result = unsafe {
            self.ctx
                .device()
                .queue_submit(self.ctx.graphics_queue(), &[submit_info.build()], fence)
        }
        .map_err(VulkanError::api("vkQueueSubmit"));

        if result.is_err() {
            self.rearm(index);
        }
        result
    }

    fn present_queue(&self) -> vk::Queue {
        self.ctx.present_queue()
    }
}

impl Drop for DeviceFrameQueue {
    fn drop(&mut self) {
        // Fences and semaphores may still be referenced by queued work
        if let Err(err) = self.ctx.wait_idle() {
            self.ctx
                .diagnostics()
                .error(format!("Device wait before frame sync teardown failed: {err}"));
        }
    }
}

/// Drives the per-frame wait, acquire, submit and present protocol
pub struct FrameSynchronizer<Q: FrameQueue = DeviceFrameQueue> {
    queue: Q,
    cursor: FrameCursor,
}

impl FrameSynchronizer<DeviceFrameQueue> {
    /// Create the sync objects for `frames_in_flight` slots
    pub fn new(ctx: &DeviceContext, frames_in_flight: usize) -> VulkanResult<Self> {
        Self::with_queue(DeviceFrameQueue::new(ctx, frames_in_flight)?)
    }
}

impl<Q: FrameQueue> FrameSynchronizer<Q> {
    /// Drive frames over `queue`
    pub fn with_queue(queue: Q) -> VulkanResult<Self> {
        if queue.frames() == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "At least one frame in flight is required".to_string(),
            });
        }

        Ok(Self {
            cursor: FrameCursor::new(queue.frames()),
            queue,
        })
    }

    /// Slot the next frame will use
    pub fn current_frame(&self) -> usize {
        self.cursor.current()
    }

    /// Number of frames in flight
    pub fn frames_in_flight(&self) -> usize {
        self.cursor.frames()
    }

    /// Whether a frame has begun and not been submitted
    pub fn in_frame(&self) -> bool {
        self.cursor.in_frame()
    }

    /// The underlying queue
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Wait for the current slot and acquire the next images
    ///
    /// On [`FrameStart::OutOfDate`] the slot's fence is left signaled and the
    /// cursor does not advance.
    pub fn begin_frame(&mut self, backend: &mut dyn SwapchainBackend) -> VulkanResult<FrameStart> {
        let index = self.cursor.begin()?;
        let result = self.wait_and_acquire(index, backend);
        match result {
            Ok(FrameStart::Ready(_)) => {}
            Ok(FrameStart::OutOfDate) | Err(_) => self.cursor.abort(),
        }
        result
    }

    fn wait_and_acquire(&self, index: usize, backend: &mut dyn SwapchainBackend) -> VulkanResult<FrameStart> {
        self.queue.wait(index)?;

        match backend.acquire(self.queue.image_available(index))? {
            AcquireOutcome::OutOfDate => Ok(FrameStart::OutOfDate),
            AcquireOutcome::Acquired(images) => {
                // Only reset once work is certain to be submitted with this fence
                self.queue.reset(index)?;
                Ok(FrameStart::Ready(FrameTicket { slot: index, images }))
            }
        }
    }

    /// Submit `command_buffers` for the ticket's frame, present, and advance
    ///
    /// A failed submit abandons the frame without advancing. The acquired
    /// images are not handed back, so recreate the swapchain before retrying.
    pub fn submit_and_present(
        &mut self,
        backend: &mut dyn SwapchainBackend,
        ticket: FrameTicket,
        command_buffers: &[vk::CommandBuffer],
    ) -> VulkanResult<PresentOutcome> {
        if !self.cursor.in_frame() || ticket.slot != self.cursor.current() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Ticket for slot {} does not match the frame in progress", ticket.slot),
            });
        }

        let index = ticket.slot;
        if let Err(err) = self
            .queue
            .submit(index, command_buffers, ticket.images.uses_semaphores)
        {
            self.cursor.abort();
            return Err(err);
        }

        let outcome = backend.present(self.queue.present_queue(), &ticket.images, self.queue.render_finished(index));
        self.cursor.end()?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::initialization::capabilities::BackendKind;
    use crate::vulkan::resources::texture::TextureRegistry;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Reset(usize),
        Acquire,
        Submit(usize, bool),
        Present(Vec<u32>),
    }

    type EventLog = Rc<RefCell<Vec<Event>>>;

    /// Fences as flags; waiting on an unsignaled fence retires its work
    struct ScriptedQueue {
        log: EventLog,
        signaled: Vec<Cell<bool>>,
        fail_submit: bool,
    }

    impl ScriptedQueue {
        fn new(log: &EventLog, frames: usize) -> Self {
            Self {
                log: log.clone(),
                signaled: (0..frames).map(|_| Cell::new(true)).collect(),
                fail_submit: false,
            }
        }

        fn is_signaled(&self, index: usize) -> bool {
            self.signaled[index].get()
        }
    }

    impl FrameQueue for ScriptedQueue {
        fn frames(&self) -> usize {
            self.signaled.len()
        }

        fn wait(&self, index: usize) -> VulkanResult<()> {
            self.log.borrow_mut().push(Event::Wait(index));
            self.signaled[index].set(true);
            Ok(())
        }

        fn reset(&self, index: usize) -> VulkanResult<()> {
            self.log.borrow_mut().push(Event::Reset(index));
            self.signaled[index].set(false);
            Ok(())
        }

        fn image_available(&self, _index: usize) -> vk::Semaphore {
            vk::Semaphore::null()
        }

        fn render_finished(&self, _index: usize) -> vk::Semaphore {
            vk::Semaphore::null()
        }

        fn submit(&mut self, index: usize, _command_buffers: &[vk::CommandBuffer], uses_semaphores: bool) -> VulkanResult<()> {
            if self.fail_submit {
                self.signaled[index].set(true);
                return Err(VulkanError::api("vkQueueSubmit")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            self.log.borrow_mut().push(Event::Submit(index, uses_semaphores));
            Ok(())
        }

        fn present_queue(&self) -> vk::Queue {
            vk::Queue::null()
        }
    }

    /// Acquires follow the script, then hand out image 0
    struct ScriptedBackend {
        log: EventLog,
        script: VecDeque<AcquireOutcome>,
        uses_semaphores: bool,
        textures: TextureRegistry,
    }

    impl ScriptedBackend {
        fn new(log: &EventLog) -> Self {
            Self {
                log: log.clone(),
                script: VecDeque::new(),
                uses_semaphores: true,
                textures: TextureRegistry::new(),
            }
        }

        fn acquired(&self, index: u32) -> AcquireOutcome {
            AcquireOutcome::Acquired(FrameImages {
                image_indices: vec![index],
                uses_semaphores: self.uses_semaphores,
                suboptimal: false,
            })
        }
    }

    impl SwapchainBackend for ScriptedBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Windowed
        }

        fn surface_format(&self) -> vk::Format {
            vk::Format::B8G8R8A8_SRGB
        }

        fn render_pass(&self) -> vk::RenderPass {
            vk::RenderPass::null()
        }

        fn view_count(&self) -> usize {
            1
        }

        fn view_extent(&self, _view: usize) -> vk::Extent2D {
            vk::Extent2D { width: 64, height: 64 }
        }

        fn image_count(&self, _view: usize) -> usize {
            3
        }

        fn framebuffer(&self, _view: usize, _image_index: u32) -> Option<vk::Framebuffer> {
            None
        }

        fn acquire(&mut self, _image_available: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
            self.log.borrow_mut().push(Event::Acquire);
            let next = self.acquired(0);
            Ok(self.script.pop_front().unwrap_or(next))
        }

        fn present(
            &mut self,
            _queue: vk::Queue,
            images: &FrameImages,
            _render_finished: vk::Semaphore,
        ) -> VulkanResult<PresentOutcome> {
            self.log.borrow_mut().push(Event::Present(images.image_indices.clone()));
            Ok(PresentOutcome::Presented)
        }

        fn recreate(&mut self) -> VulkanResult<()> {
            Ok(())
        }

        fn textures(&self) -> &TextureRegistry {
            &self.textures
        }

        fn textures_mut(&mut self) -> &mut TextureRegistry {
            &mut self.textures
        }
    }

    fn setup(frames: usize) -> (EventLog, FrameSynchronizer<ScriptedQueue>, ScriptedBackend) {
        let log = EventLog::default();
        let sync = FrameSynchronizer::with_queue(ScriptedQueue::new(&log, frames)).unwrap();
        let backend = ScriptedBackend::new(&log);
        (log, sync, backend)
    }

    fn ready(start: FrameStart) -> FrameTicket {
        match start {
            FrameStart::Ready(ticket) => ticket,
            FrameStart::OutOfDate => panic!("expected an acquired frame"),
        }
    }

    #[test]
    fn test_cursor_cycles_through_all_slots() {
        let mut cursor = FrameCursor::new(3);
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(cursor.begin().unwrap());
            cursor.end().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(seen.iter().all(|&slot| slot < 3));
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut cursor = FrameCursor::new(2);
        cursor.begin().unwrap();
        let err = cursor.begin().unwrap_err();
        assert_eq!(err.kind(), crate::vulkan::ErrorKind::Programming);
    }

    #[test]
    fn test_end_without_begin_is_rejected() {
        let mut cursor = FrameCursor::new(2);
        assert!(matches!(cursor.end(), Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(cursor.current(), 0);
    }

    #[test]
    fn test_abort_reuses_slot() {
        let mut cursor = FrameCursor::new(2);
        assert_eq!(cursor.begin().unwrap(), 0);
        cursor.abort();
        assert!(!cursor.in_frame());
        assert_eq!(cursor.begin().unwrap(), 0);
        cursor.end().unwrap();
        assert_eq!(cursor.current(), 1);
    }

    #[test]
    fn test_single_frame_in_flight() {
        let mut cursor = FrameCursor::new(1);
        for _ in 0..3 {
            assert_eq!(cursor.begin().unwrap(), 0);
            cursor.end().unwrap();
        }
    }

    #[test]
    fn test_zero_frames_in_flight_is_rejected() {
        let log = EventLog::default();
        let result = FrameSynchronizer::with_queue(ScriptedQueue::new(&log, 0));
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_fence_waited_before_acquire_and_reset_after() {
        let (log, mut sync, mut backend) = setup(2);

        let ticket = ready(sync.begin_frame(&mut backend).unwrap());
        assert_eq!(ticket.slot(), 0);
        assert_eq!(*log.borrow(), vec![Event::Wait(0), Event::Acquire, Event::Reset(0)]);
        assert!(!sync.queue().is_signaled(0));
        assert!(sync.in_frame());
    }

    #[test]
    fn test_out_of_date_keeps_fence_signaled_and_slot() {
        let (log, mut sync, mut backend) = setup(2);
        backend.script.push_back(AcquireOutcome::OutOfDate);

        assert!(matches!(sync.begin_frame(&mut backend).unwrap(), FrameStart::OutOfDate));
        assert_eq!(*log.borrow(), vec![Event::Wait(0), Event::Acquire]);
        assert!(sync.queue().is_signaled(0));
        assert!(!sync.in_frame());
        assert_eq!(sync.current_frame(), 0);

        let ticket = ready(sync.begin_frame(&mut backend).unwrap());
        assert_eq!(ticket.slot(), 0);
    }

    #[test]
    fn test_frame_submits_presents_and_advances() {
        let (log, mut sync, mut backend) = setup(2);

        let ticket = ready(sync.begin_frame(&mut backend).unwrap());
        let outcome = sync.submit_and_present(&mut backend, ticket, &[]).unwrap();

        assert_eq!(outcome, PresentOutcome::Presented);
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Wait(0),
                Event::Acquire,
                Event::Reset(0),
                Event::Submit(0, true),
                Event::Present(vec![0]),
            ]
        );
        assert_eq!(sync.current_frame(), 1);
        assert!(!sync.in_frame());
    }

    #[test]
    fn test_runtime_managed_images_submit_without_semaphores() {
        let (log, mut sync, mut backend) = setup(1);
        backend.uses_semaphores = false;

        let ticket = ready(sync.begin_frame(&mut backend).unwrap());
        sync.submit_and_present(&mut backend, ticket, &[]).unwrap();
        assert!(log.borrow().contains(&Event::Submit(0, false)));
    }

    #[test]
    fn test_slot_reuse_waits_for_its_fence() {
        let (log, mut sync, mut backend) = setup(2);

        for _ in 0..5 {
            let ticket = ready(sync.begin_frame(&mut backend).unwrap());
            sync.submit_and_present(&mut backend, ticket, &[]).unwrap();
        }

        let log = log.borrow();
        let submits: Vec<usize> = log
            .iter()
            .filter_map(|event| match event {
                Event::Submit(slot, _) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![0, 1, 0, 1, 0]);

        // Every submit into a slot is preceded by a wait on that slot's fence
        // since its previous submit
        for (position, event) in log.iter().enumerate() {
            if let Event::Submit(slot, _) = event {
                let previous_submit = log[..position]
                    .iter()
                    .rposition(|e| matches!(e, Event::Submit(s, _) if s == slot))
                    .unwrap_or(0);
                assert!(log[previous_submit..position].contains(&Event::Wait(*slot)));
            }
        }
    }

    #[test]
    fn test_mismatched_ticket_is_rejected() {
        let (_, mut sync, mut backend) = setup(2);

        let first = ready(sync.begin_frame(&mut backend).unwrap());
        let stale = FrameTicket {
            slot: first.slot(),
            images: first.images().clone(),
        };
        sync.submit_and_present(&mut backend, first, &[]).unwrap();

        let err = sync.submit_and_present(&mut backend, stale, &[]).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));

        let _current = ready(sync.begin_frame(&mut backend).unwrap());
        let wrong_slot = FrameTicket {
            slot: 0,
            images: FrameImages {
                image_indices: vec![0],
                uses_semaphores: true,
                suboptimal: false,
            },
        };
        let err = sync.submit_and_present(&mut backend, wrong_slot, &[]).unwrap_err();
        assert_eq!(err.kind(), crate::vulkan::ErrorKind::Programming);
        assert!(sync.in_frame());
    }

    #[test]
    fn test_failed_submit_abandons_frame() {
        let (log, mut sync, mut backend) = setup(2);
        let ticket = ready(sync.begin_frame(&mut backend).unwrap());

        sync.queue.fail_submit = true;
        assert!(sync.submit_and_present(&mut backend, ticket, &[]).is_err());
        assert!(!sync.in_frame());
        assert_eq!(sync.current_frame(), 0);
        assert!(sync.queue().is_signaled(0));
        assert!(!log.borrow().iter().any(|event| matches!(event, Event::Present(_))));

        sync.queue.fail_submit = false;
        let ticket = ready(sync.begin_frame(&mut backend).unwrap());
        assert_eq!(ticket.slot(), 0);
    }
}
