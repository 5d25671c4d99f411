//! Synchronization primitives for CPU/GPU coordination
//!
//! Semaphores order GPU work against other GPU work (image acquisition
//! before rendering, rendering before presentation); fences let the CPU
//! observe that a submitted frame has completed. Both are created once at
//! renderer startup and reused every [`MAX_FRAMES_IN_FLIGHT`] frames.
//!
//! [`MAX_FRAMES_IN_FLIGHT`]: super::double_buffered::MAX_FRAMES_IN_FLIGHT

use ash::vk;
use std::sync::Arc;

use super::context::{DeviceContext, VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic cleanup
pub struct Semaphore {
    ctx: Arc<DeviceContext>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(ctx: Arc<DeviceContext>) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            ctx.device()
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { ctx, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// CPU-GPU synchronization primitive with automatic cleanup
pub struct Fence {
    ctx: Arc<DeviceContext>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(ctx: Arc<DeviceContext>, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            ctx.device()
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { ctx, fence })
    }

    /// Blocks until the fence is signaled or the timeout expires.
    ///
    /// An expired timeout is a fatal condition, distinct from the
    /// recoverable presentation-staleness results.
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        unsafe {
            self.ctx
                .device()
                .wait_for_fences(&[self.fence], true, timeout_ns)
                .map_err(|result| match result {
                    vk::Result::TIMEOUT => VulkanError::Timeout,
                    other => VulkanError::Api(other),
                })
        }
    }

    /// Returns the fence to the unsignaled state.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.ctx
                .device()
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_fence(self.fence, None);
        }
    }
}
