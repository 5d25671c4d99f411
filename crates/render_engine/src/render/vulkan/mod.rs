//! Vulkan frame pipeline and resource lifetime
//!
//! The modules here implement the per-frame cycle — acquire a presentable
//! image, record commands, submit to the asynchronous queues, present — and
//! the bookkeeping that makes destroying GPU objects safe while up to
//! [`double_buffered::MAX_FRAMES_IN_FLIGHT`] frames are still executing.

/// GPU buffers and uploads
pub mod buffer;
/// Command buffer ownership and submission
pub mod commands;
/// Instance, device selection and the shared device context
pub mod context;
/// Deferred destruction of GPU objects
pub mod deletion_queue;
/// Double buffering of CPU-written, GPU-read resources
pub mod double_buffered;
/// Main render pass and framebuffers
pub mod render_pass;
/// The frame driver
pub mod renderer;
/// Swapchain state and recreation
pub mod swapchain;
/// Semaphore and fence wrappers
pub mod sync;

pub use buffer::Buffer;
pub use commands::CommandBuffer;
pub use context::{
    DeviceContext, PhysicalDeviceInfo, Surface, VulkanError, VulkanInstance, VulkanResult,
};
pub use deletion_queue::{DeletionQueue, Timeline};
pub use double_buffered::{
    DoubleBuffered, DoubleBufferingState, FrameDoubleBuffered, FrameDoubleBufferingState,
    StepDoubleBuffered, StepDoubleBufferingState, MAX_FRAMES_IN_FLIGHT,
};
pub use render_pass::RenderPass;
pub use renderer::{RendererCreateInfo, VulkanRenderer};
pub use swapchain::{choose_present_mode, Swapchain};
pub use sync::{Fence, Semaphore};
