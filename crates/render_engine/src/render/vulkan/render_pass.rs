//! Main render pass and swapchain framebuffers
//!
//! The default pass renders into the swapchain color attachment and hands
//! it over in present layout. Callers that interleave several passes of
//! drawing (e.g. world and overlay) request more than one subpass and step
//! through them with the renderer's next-subpass call.

use ash::vk;
use std::sync::Arc;

use super::context::{DeviceContext, VulkanError, VulkanResult};

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    ctx: Arc<DeviceContext>,
    handle: vk::RenderPass,
    subpass_count: u32,
}

impl RenderPass {
    /// Creates the main presentation pass with `subpass_count` inline
    /// subpasses over a single color attachment.
    pub fn new_present_pass(
        ctx: &Arc<DeviceContext>,
        color_format: vk::Format,
        subpass_count: u32,
    ) -> VulkanResult<Self> {
        let subpass_count = subpass_count.max(1);

        let attachment = vk::AttachmentDescription2::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();
        let attachments = [attachment];

        let color_ref = vk::AttachmentReference2::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .build();
        let color_refs = [color_ref];

        let subpasses: Vec<vk::SubpassDescription2> = (0..subpass_count)
            .map(|_| {
                vk::SubpassDescription2::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&color_refs)
                    .build()
            })
            .collect();

        // External dependency covers the semaphore wait at submit time; the
        // chained dependencies order the color writes of consecutive
        // subpasses.
        let mut dependencies = vec![vk::SubpassDependency2::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build()];
        for subpass in 1..subpass_count {
            dependencies.push(
                vk::SubpassDependency2::builder()
                    .src_subpass(subpass - 1)
                    .dst_subpass(subpass)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .dst_access_mask(
                        vk::AccessFlags::COLOR_ATTACHMENT_READ
                            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    )
                    .build(),
            );
        }

        let create_info = vk::RenderPassCreateInfo2::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe {
            ctx.device()
                .create_render_pass2(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            ctx: Arc::clone(ctx),
            handle,
            subpass_count,
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    /// Number of subpasses in the pass
    pub fn subpass_count(&self) -> u32 {
        self.subpass_count
    }

    /// Creates one framebuffer per swapchain image view.
    ///
    /// The returned handles are owned by the caller, which retires them
    /// through the deletion queue on swapchain recreation.
    pub fn create_framebuffers(
        &self,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<vk::Framebuffer>> {
        image_views
            .iter()
            .map(|view| {
                let attachments = [*view];
                let create_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(self.handle)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);

                unsafe {
                    self.ctx
                        .device()
                        .create_framebuffer(&create_info, None)
                        .map_err(VulkanError::Api)
                }
            })
            .collect()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_render_pass(self.handle, None);
        }
    }
}
