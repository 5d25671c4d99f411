//! Command buffer ownership and queue submission
//!
//! A [`CommandBuffer`] exclusively owns one native handle allocated from the
//! shared command pool and frees it through the pool when dropped. The
//! steady-state frame loop submits asynchronously via
//! [`CommandBuffer::submit_to_graphics_queue`]; setup and teardown paths may
//! use the synchronous [`CommandBuffer::do_one_time_submit`] escape hatch.

use ash::vk;
use std::sync::Arc;

use super::context::{DeviceContext, VulkanError, VulkanResult};

/// Records commands to be executed by the device.
///
/// Null-constructible through [`Default`] so it can live as a struct member
/// before real allocation; every recording or submission call on a null
/// buffer is rejected as an invalid operation. Movable, not copyable.
#[derive(Default)]
pub struct CommandBuffer {
    ctx: Option<Arc<DeviceContext>>,
    handle: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates one command buffer of the given level from the shared pool.
    pub fn new(ctx: &Arc<DeviceContext>, level: vk::CommandBufferLevel) -> VulkanResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(ctx.command_pool())
            .level(level)
            .command_buffer_count(1);

        let handles = unsafe {
            ctx.device()
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            ctx: Some(Arc::clone(ctx)),
            handle: handles[0],
        })
    }

    /// Get the native command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// True for a default-constructed buffer with no backing handle.
    pub fn is_null(&self) -> bool {
        self.ctx.is_none()
    }

    fn context(&self) -> VulkanResult<&Arc<DeviceContext>> {
        self.ctx.as_ref().ok_or(VulkanError::InvalidOperation {
            reason: "Command buffer has no backing allocation".to_string(),
        })
    }

    /// Returns the buffer to the initial state for re-recording.
    pub fn reset(&self) -> VulkanResult<()> {
        let ctx = self.context()?;
        unsafe {
            ctx.device()
                .reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    /// Begins recording with the given usage.
    pub fn begin(&self, usage: vk::CommandBufferUsageFlags) -> VulkanResult<()> {
        let ctx = self.context()?;
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(usage);
        unsafe {
            ctx.device()
                .begin_command_buffer(self.handle, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Ends recording.
    pub fn end(&self) -> VulkanResult<()> {
        let ctx = self.context()?;
        unsafe {
            ctx.device()
                .end_command_buffer(self.handle)
                .map_err(VulkanError::Api)
        }
    }

    /// Records commands through `record` and executes them synchronously on
    /// the graphics queue.
    ///
    /// Waits for the whole device to become idle, which is very expensive.
    /// Reserved for setup and teardown paths (e.g. one-shot buffer copies
    /// during resource creation), never the per-frame render loop.
    pub fn do_one_time_submit(
        &self,
        record: impl FnOnce(&Self) -> VulkanResult<()>,
    ) -> VulkanResult<()> {
        let ctx = self.context()?;

        self.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(self)?;
        self.end()?;

        let cmd_buf_info = vk::CommandBufferSubmitInfo::builder()
            .command_buffer(self.handle)
            .build();
        let submit = vk::SubmitInfo2::builder()
            .command_buffer_infos(std::slice::from_ref(&cmd_buf_info))
            .build();
        unsafe {
            ctx.device()
                .queue_submit2(ctx.graphics_queue(), &[submit], vk::Fence::null())
                .map_err(VulkanError::Api)?;
        }
        ctx.wait_idle()
    }

    /// Submits the given batches to the graphics queue without blocking,
    /// optionally signaling `signal_fence` on completion.
    pub fn submit_to_graphics_queue(
        &self,
        submits: &[vk::SubmitInfo2],
        signal_fence: vk::Fence,
    ) -> VulkanResult<()> {
        let ctx = self.context()?;
        unsafe {
            ctx.device()
                .queue_submit2(ctx.graphics_queue(), submits, signal_fence)
                .map_err(VulkanError::Api)
        }
    }

    /// Submits the given batches to the compute queue without blocking,
    /// optionally signaling `signal_fence` on completion.
    pub fn submit_to_compute_queue(
        &self,
        submits: &[vk::SubmitInfo2],
        signal_fence: vk::Fence,
    ) -> VulkanResult<()> {
        let ctx = self.context()?;
        unsafe {
            ctx.device()
                .queue_submit2(ctx.compute_queue(), submits, signal_fence)
                .map_err(VulkanError::Api)
        }
    }

    /// Begins a labeled debug region in the command buffer.
    ///
    /// Does nothing in release builds.
    pub fn begin_debug_region(&self, label: &str) {
        #[cfg(debug_assertions)]
        self.with_debug_utils(label, |debug_utils, label_info, handle| unsafe {
            debug_utils.cmd_begin_debug_utils_label(handle, label_info);
        });
        #[cfg(not(debug_assertions))]
        let _ = label;
    }

    /// Ends the innermost labeled debug region.
    ///
    /// Does nothing in release builds.
    pub fn end_debug_region(&self) {
        #[cfg(debug_assertions)]
        if let Some(ctx) = &self.ctx {
            if let Some(debug_utils) = ctx.debug_utils() {
                unsafe { debug_utils.cmd_end_debug_utils_label(self.handle) };
            }
        }
    }

    /// Inserts a single debug label in the command buffer.
    ///
    /// Does nothing in release builds.
    pub fn insert_debug_label(&self, label: &str) {
        #[cfg(debug_assertions)]
        self.with_debug_utils(label, |debug_utils, label_info, handle| unsafe {
            debug_utils.cmd_insert_debug_utils_label(handle, label_info);
        });
        #[cfg(not(debug_assertions))]
        let _ = label;
    }

    #[cfg(debug_assertions)]
    fn with_debug_utils(
        &self,
        label: &str,
        f: impl FnOnce(&ash::extensions::ext::DebugUtils, &vk::DebugUtilsLabelEXT, vk::CommandBuffer),
    ) {
        let Some(ctx) = &self.ctx else { return };
        let Some(debug_utils) = ctx.debug_utils() else {
            return;
        };
        let Ok(name) = std::ffi::CString::new(label) else {
            return;
        };
        let label_info = vk::DebugUtilsLabelEXT::builder().label_name(&name);
        f(debug_utils, &label_info, self.handle);
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if let Some(ctx) = &self.ctx {
            unsafe {
                ctx.device()
                    .free_command_buffers(ctx.command_pool(), &[self.handle]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_command_buffer_rejects_recording() {
        let cmd_buf = CommandBuffer::default();
        assert!(cmd_buf.is_null());
        assert!(matches!(
            cmd_buf.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(matches!(
            cmd_buf.submit_to_graphics_queue(&[], vk::Fence::null()),
            Err(VulkanError::InvalidOperation { .. })
        ));
        // Dropping a null buffer must not try to free anything.
    }
}
