//! The frame driver
//!
//! [`VulkanRenderer`] owns the whole Vulkan stack — instance, surface,
//! device context, swapchain, main render pass, per-slot command buffers and
//! sync objects, and the deletion queue — and walks each frame through
//! acquire → record → submit → present. The in-flight fence wait at the top
//! of [`VulkanRenderer::prepare_frame`] is the backpressure that keeps the
//! CPU at most [`MAX_FRAMES_IN_FLIGHT`] frames ahead of the GPU.
//!
//! [`MAX_FRAMES_IN_FLIGHT`]: crate::render::vulkan::double_buffered::MAX_FRAMES_IN_FLIGHT

pub mod frame_pacer;

pub use frame_pacer::{FramePacer, RecreationDecision, SurfaceStatus};

use ash::vk;
use std::sync::Arc;

use crate::render::window::Window;

use super::commands::CommandBuffer;
use super::context::{
    DeviceContext, PhysicalDeviceInfo, Surface, VulkanError, VulkanInstance, VulkanResult,
};
use super::deletion_queue::{DeletionQueue, Timeline};
use super::double_buffered::FrameDoubleBuffered;
use super::render_pass::RenderPass;
use super::swapchain::Swapchain;
use super::sync::{Fence, Semaphore};

/// Bounded wait for fences and image acquisition. Expiry is fatal: a frame
/// that takes this long signals a hung or lost device, not contention.
const FRAME_TIMEOUT_NS: u64 = 1_000_000_000;

/// Describes how to initialize the renderer.
pub struct RendererCreateInfo {
    /// Application name reported to the driver
    pub app_name: String,
    /// Preferred physical-device name; first suitable device when absent
    /// or not found
    pub preferred_device: Option<String>,
    /// Start with vertical synchronization enabled
    pub vsync: bool,
    /// Number of inline subpasses in the main render pass
    pub subpass_count: u32,
}

impl Default for RendererCreateInfo {
    fn default() -> Self {
        Self {
            app_name: "render_engine application".to_string(),
            preferred_device: None,
            vsync: true,
            subpass_count: 1,
        }
    }
}

/// Top-level frame driver; see the module documentation.
///
/// Callers issue exactly this sequence once per rendered frame:
/// [`prepare_frame`](Self::prepare_frame),
/// [`main_render_pass_begin`](Self::main_render_pass_begin), any drawing
/// with [`main_render_pass_next_subpass`](Self::main_render_pass_next_subpass)
/// between subpasses, [`main_render_pass_end`](Self::main_render_pass_end),
/// [`finish_frame`](Self::finish_frame).
pub struct VulkanRenderer {
    pacer: FramePacer,
    image_index: u32,
    vsync: bool,

    // Field order is drop order: everything allocated from the device goes
    // before `ctx`, and the surface before the instance.
    cmd_bufs: FrameDoubleBuffered<CommandBuffer>,
    one_time_submit_cmd_buf: CommandBuffer,
    image_available_sems: FrameDoubleBuffered<Semaphore>,
    rendering_finished_sems: FrameDoubleBuffered<Semaphore>,
    in_flight_fences: FrameDoubleBuffered<Fence>,
    deletion_queue: DeletionQueue,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    ctx: Arc<DeviceContext>,
    physical_device: PhysicalDeviceInfo,
    surface: Surface,
    instance: VulkanInstance,
}

impl VulkanRenderer {
    /// Brings up the full Vulkan stack for the given window.
    ///
    /// Fails with a human-readable message when the environment cannot
    /// support the pipeline (no suitable device, missing extension); there
    /// is no degraded-mode fallback.
    pub fn new(window: &mut Window, create_info: &RendererCreateInfo) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, &create_info.app_name)?;
        let surface = Surface::new(&instance, window)?;
        let physical_device = PhysicalDeviceInfo::select(
            &instance,
            &surface,
            create_info.preferred_device.as_deref(),
        )?;
        let ctx = DeviceContext::new(&instance, &physical_device)?;

        let window_extent = window.framebuffer_size();
        let swapchain = Swapchain::new(
            &ctx,
            &surface,
            &physical_device,
            window_extent,
            create_info.vsync,
            vk::SwapchainKHR::null(),
        )?;
        let render_pass = RenderPass::new_present_pass(
            &ctx,
            swapchain.format().format,
            create_info.subpass_count,
        )?;
        let framebuffers =
            render_pass.create_framebuffers(swapchain.image_views(), swapchain.extent())?;

        let cmd_bufs = FrameDoubleBuffered::new(
            CommandBuffer::new(&ctx, vk::CommandBufferLevel::PRIMARY)?,
            CommandBuffer::new(&ctx, vk::CommandBufferLevel::PRIMARY)?,
        );
        let one_time_submit_cmd_buf = CommandBuffer::new(&ctx, vk::CommandBufferLevel::PRIMARY)?;

        let image_available_sems = FrameDoubleBuffered::new(
            Semaphore::new(Arc::clone(&ctx))?,
            Semaphore::new(Arc::clone(&ctx))?,
        );
        let rendering_finished_sems = FrameDoubleBuffered::new(
            Semaphore::new(Arc::clone(&ctx))?,
            Semaphore::new(Arc::clone(&ctx))?,
        );
        // Created signaled so the first frame's wait passes through.
        let in_flight_fences = FrameDoubleBuffered::new(
            Fence::new(Arc::clone(&ctx), true)?,
            Fence::new(Arc::clone(&ctx), true)?,
        );

        let deletion_queue = DeletionQueue::new(Arc::clone(&ctx));
        let pacer = FramePacer::new(window_extent);

        log::info!(
            "Renderer initialized on '{}' ({}x{})",
            physical_device.name(),
            window_extent.0,
            window_extent.1
        );

        Ok(Self {
            pacer,
            image_index: 0,
            vsync: create_info.vsync,
            cmd_bufs,
            one_time_submit_cmd_buf,
            image_available_sems,
            rendering_finished_sems,
            in_flight_fences,
            deletion_queue,
            framebuffers,
            render_pass,
            swapchain,
            ctx,
            physical_device,
            surface,
            instance,
        })
    }

    /// Starts a new frame: waits out this slot's previous GPU work,
    /// recreates the swapchain when flagged, acquires an image and opens the
    /// slot's command buffer for recording.
    ///
    /// Returns `Ok(false)` when no frame can be produced right now (surface
    /// out of date or window minimized); the caller skips rendering and
    /// retries next frame. On `Ok(true)` the command buffer is recording and
    /// accessible through [`command_buffer`](Self::command_buffer).
    pub fn prepare_frame(&mut self) -> VulkanResult<bool> {
        let frame_state = *self.pacer.frame_state();

        // Primary backpressure: this slot's fence is the proof that the
        // command buffer and sync objects about to be reused are free.
        self.in_flight_fences.write(&frame_state).wait(FRAME_TIMEOUT_NS)?;

        match self.pacer.recreation_decision() {
            RecreationDecision::Deferred => return Ok(false),
            RecreationDecision::Recreate => {
                self.recreate_swapchain()?;
                self.pacer.clear_recreation_request();
            }
            RecreationDecision::NotNeeded => {}
        }

        // Acquire before resetting the fence: if the surface turns out to be
        // out of date the slot must stay signaled for the next attempt.
        let acquire_result = unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                self.swapchain.handle(),
                FRAME_TIMEOUT_NS,
                self.image_available_sems.write(&frame_state).handle(),
                vk::Fence::null(),
            )
        };
        match acquire_result {
            Ok((image_index, suboptimal)) => {
                self.image_index = image_index;
                if suboptimal {
                    self.pacer.handle_acquire_status(SurfaceStatus::Suboptimal);
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date during acquire, skipping frame");
                self.pacer.handle_acquire_status(SurfaceStatus::OutOfDate);
                return Ok(false);
            }
            Err(vk::Result::TIMEOUT) => return Err(VulkanError::Timeout),
            Err(e) => return Err(VulkanError::Api(e)),
        }

        self.in_flight_fences.write(&frame_state).reset()?;

        let cmd_buf = self.cmd_bufs.write(&frame_state);
        cmd_buf.reset()?;
        cmd_buf.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        Ok(true)
    }

    /// The command buffer being recorded for the current frame.
    pub fn command_buffer(&self) -> &CommandBuffer {
        self.cmd_bufs.write(self.pacer.frame_state())
    }

    /// Begins the main render pass on the acquired swapchain image and sets
    /// the default full-surface viewport and scissor.
    ///
    /// The viewport is flipped so that world space keeps Y pointing up.
    pub fn main_render_pass_begin(&self, clear_values: &[vk::ClearValue]) {
        let cmd_buf = self.command_buffer();
        let extent = self.swapchain.extent();

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[self.image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);
        let subpass_begin_info =
            vk::SubpassBeginInfo::builder().contents(vk::SubpassContents::INLINE);

        unsafe {
            self.ctx.device().cmd_begin_render_pass2(
                cmd_buf.handle(),
                &begin_info,
                &subpass_begin_info,
            );

            self.ctx.device().cmd_set_viewport(
                cmd_buf.handle(),
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: extent.height as f32,
                    width: extent.width as f32,
                    height: -(extent.height as f32),
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            self.ctx.device().cmd_set_scissor(
                cmd_buf.handle(),
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );
        }
    }

    /// Steps to the next inline subpass of the main render pass.
    pub fn main_render_pass_next_subpass(&self) {
        let subpass_begin_info =
            vk::SubpassBeginInfo::builder().contents(vk::SubpassContents::INLINE);
        let subpass_end_info = vk::SubpassEndInfo::builder();
        unsafe {
            self.ctx.device().cmd_next_subpass2(
                self.command_buffer().handle(),
                &subpass_begin_info,
                &subpass_end_info,
            );
        }
    }

    /// Ends the main render pass.
    pub fn main_render_pass_end(&self) {
        let subpass_end_info = vk::SubpassEndInfo::builder();
        unsafe {
            self.ctx
                .device()
                .cmd_end_render_pass2(self.command_buffer().handle(), &subpass_end_info);
        }
    }

    /// Closes the frame: submits the recorded commands, presents the image
    /// and advances the frame timeline.
    ///
    /// The submit waits on "image available" before color output, signals
    /// "rendering finished" for presentation and this slot's in-flight
    /// fence for the CPU. A stale surface reported by presentation only
    /// schedules recreation; it is not an error.
    pub fn finish_frame(&mut self) -> VulkanResult<()> {
        let frame_state = *self.pacer.frame_state();
        let cmd_buf = self.cmd_bufs.write(&frame_state);
        cmd_buf.end()?;

        let wait_info = vk::SemaphoreSubmitInfo::builder()
            .semaphore(self.image_available_sems.write(&frame_state).handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .build();
        let signal_info = vk::SemaphoreSubmitInfo::builder()
            .semaphore(self.rendering_finished_sems.write(&frame_state).handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .build();
        let cmd_buf_info = vk::CommandBufferSubmitInfo::builder()
            .command_buffer(cmd_buf.handle())
            .build();
        let submit = vk::SubmitInfo2::builder()
            .wait_semaphore_infos(std::slice::from_ref(&wait_info))
            .command_buffer_infos(std::slice::from_ref(&cmd_buf_info))
            .signal_semaphore_infos(std::slice::from_ref(&signal_info))
            .build();

        cmd_buf.submit_to_graphics_queue(
            &[submit],
            self.in_flight_fences.write(&frame_state).handle(),
        )?;

        let wait_semaphores = [self.rendering_finished_sems.write(&frame_state).handle()];
        let swapchains = [self.swapchain.handle()];
        let image_indices = [self.image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.present_queue(), &present_info)
        };
        match present_result {
            Ok(false) => {}
            Ok(true) => {
                log::debug!("Swapchain suboptimal during present");
                self.pacer.handle_present_status(SurfaceStatus::Suboptimal);
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date during present");
                self.pacer.handle_present_status(SurfaceStatus::OutOfDate);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        }

        self.pacer.advance_frame();
        self.deletion_queue.start_next_iteration(Timeline::Render);

        Ok(())
    }

    /// Advances the simulation-step timeline: step-scoped double buffers
    /// flip and one Step deletion iteration starts. Called once per
    /// simulation tick by the outer loop.
    pub fn finish_step(&mut self) {
        self.pacer.advance_step();
        self.deletion_queue.start_next_iteration(Timeline::Step);
    }

    /// Switches vertical synchronization; takes effect through swapchain
    /// recreation before the next acquired frame.
    pub fn change_presentation(&mut self, vsync: bool) {
        if self.vsync != vsync {
            self.vsync = vsync;
            self.pacer.request_recreation();
        }
    }

    /// Reports a new drawable size from the windowing layer. A zero extent
    /// (minimized window) defers recreation until a valid size arrives.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        self.pacer.notify_resize(width, height);
    }

    /// Records and synchronously executes setup/teardown work on the
    /// dedicated one-time-submit command buffer. Blocks on device idle;
    /// never call this in the render loop.
    pub fn do_one_time_submit(
        &self,
        record: impl FnOnce(&CommandBuffer) -> VulkanResult<()>,
    ) -> VulkanResult<()> {
        self.one_time_submit_cmd_buf.do_one_time_submit(record)
    }

    /// Shared device context for creating engine objects.
    pub fn device_context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    /// Deletion queue for retiring GPU objects.
    pub fn deletion_queue_mut(&mut self) -> &mut DeletionQueue {
        &mut self.deletion_queue
    }

    /// Current swapchain extent
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Number of frames finished since startup
    pub fn frame_number(&self) -> u64 {
        self.pacer.frame_number()
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        // Nothing may reference the old swapchain objects past this wait.
        self.ctx.wait_idle()?;

        let new_swapchain = Swapchain::new(
            &self.ctx,
            &self.surface,
            &self.physical_device,
            self.pacer.window_extent(),
            self.vsync,
            self.swapchain.handle(),
        )?;
        let old_swapchain = std::mem::replace(&mut self.swapchain, new_swapchain);

        for framebuffer in self.framebuffers.drain(..) {
            self.deletion_queue.enqueue_deletion(framebuffer);
        }
        old_swapchain.retire(&mut self.deletion_queue);

        self.framebuffers = self
            .render_pass
            .create_framebuffers(self.swapchain.image_views(), self.swapchain.extent())?;

        log::debug!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // All in-flight work must settle before the field drops below
        // destroy the objects it references.
        let _ = self.ctx.wait_idle();
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.ctx.device().destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
