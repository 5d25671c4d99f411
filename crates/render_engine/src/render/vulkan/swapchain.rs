//! Swapchain state and recreation
//!
//! Owns the presentable images negotiated with the display compositor.
//! Recreation chains the old swapchain into the new one's create info;
//! retired image views are routed through the deletion queue while the
//! swapchain handle itself is destroyed directly, since the caller has
//! already waited out all in-flight work at that point.

use ash::vk;
use std::sync::Arc;

use super::context::{DeviceContext, PhysicalDeviceInfo, Surface, VulkanError, VulkanResult};
use super::deletion_queue::DeletionQueue;

/// Maps the vSync flag to the closest available present mode.
///
/// FIFO when vSync is on; mailbox, then immediate when off, falling back
/// to FIFO which every conforming device provides.
pub fn choose_present_mode(vsync: bool, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolves the swapchain extent from the surface capabilities, clamping the
/// drawable size only when the compositor leaves the extent undefined.
fn choose_extent(
    window_extent: (u32, u32),
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.0.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.1.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

fn choose_min_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max = if capabilities.max_image_count == 0 {
        8
    } else {
        capabilities.max_image_count
    };
    (capabilities.min_image_count + 1).clamp(capabilities.min_image_count, max)
}

/// Swapchain wrapper owning images, views and presentation parameters.
pub struct Swapchain {
    ctx: Arc<DeviceContext>,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    min_image_count: u32,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for the surface.
    ///
    /// Pass the previous swapchain's handle as `old_swapchain` when
    /// recreating so the driver can carry resources over, or a null handle
    /// at startup.
    pub fn new(
        ctx: &Arc<DeviceContext>,
        surface: &Surface,
        physical: &PhysicalDeviceInfo,
        window_extent: (u32, u32),
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let capabilities = unsafe {
            surface
                .loader()
                .get_physical_device_surface_capabilities(physical.device, surface.handle())
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface
                .loader()
                .get_physical_device_surface_formats(physical.device, surface.handle())
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface
                .loader()
                .get_physical_device_surface_present_modes(physical.device, surface.handle())
                .map_err(VulkanError::Api)?
        };

        let format = formats
            .iter()
            .find(|sf| {
                sf.format == vk::Format::B8G8R8A8_SRGB
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .unwrap_or(formats[0]);

        let present_mode = choose_present_mode(vsync, &present_modes);
        let extent = choose_extent(window_extent, &capabilities);
        let min_image_count = choose_min_image_count(&capabilities);

        let one_queue_family = ctx.graphics_family() == ctx.present_family();
        let queue_family_indices = [ctx.graphics_family(), ctx.present_family()];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if one_queue_family {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        };

        let handle = unsafe {
            ctx.swapchain_loader()
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            ctx.swapchain_loader()
                .get_swapchain_images(handle)
                .map_err(VulkanError::Api)?
        };

        let image_views = Self::create_image_views(ctx, &images, format.format)?;

        log::debug!(
            "Swapchain created: {}x{}, {} images, present mode {:?}",
            extent.width,
            extent.height,
            images.len(),
            present_mode
        );

        Ok(Self {
            ctx: Arc::clone(ctx),
            handle,
            images,
            image_views,
            format,
            extent,
            min_image_count,
            present_mode,
        })
    }

    fn create_image_views(
        ctx: &Arc<DeviceContext>,
        images: &[vk::Image],
        format: vk::Format,
    ) -> VulkanResult<Vec<vk::ImageView>> {
        images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe {
                    ctx.device()
                        .create_image_view(&create_info, None)
                        .map_err(VulkanError::Api)
                }
            })
            .collect()
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Get the swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the surface format in use
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the swapchain image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images in the swapchain
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Minimum image count the swapchain was created with
    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    /// Present mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Retires this swapchain after recreation.
    ///
    /// Image views are enqueued on the deletion queue; the swapchain handle
    /// is destroyed immediately. Callers must have waited for device idle.
    pub fn retire(mut self, deletion_queue: &mut DeletionQueue) {
        for view in self.image_views.drain(..) {
            deletion_queue.enqueue_deletion(view);
        }
        // Drop destroys the handle; the view list is already empty.
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.ctx.device().destroy_image_view(view, None);
            }
            self.ctx.swapchain_loader().destroy_swapchain(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_always_selects_fifo() {
        let available = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(
            choose_present_mode(true, &available),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn uncapped_prefers_mailbox_then_immediate_then_fifo() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(false, &all), vk::PresentModeKHR::MAILBOX);

        let no_mailbox = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(false, &no_mailbox),
            vk::PresentModeKHR::IMMEDIATE
        );

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(false, &fifo_only),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_compositor_when_defined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent((640, 480), &capabilities);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn undefined_extent_clamps_the_drawable_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 1000,
            },
            ..Default::default()
        };
        let extent = choose_extent((5000, 50), &capabilities);
        assert_eq!((extent.width, extent.height), (1000, 100));
    }

    #[test]
    fn min_image_count_respects_device_limits() {
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_min_image_count(&unbounded), 3);

        let tight = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_min_image_count(&tight), 2);
    }
}
