//! # Render Engine
//!
//! A Vulkan frame-pipeline and GPU resource-lifetime engine: bounded
//! frames-in-flight, swapchain recreation, and deferred destruction of GPU
//! objects that in-flight command buffers may still reference.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut window = Window::new("demo", 1280, 720)?;
//!     let mut renderer = VulkanRenderer::new(&mut window, &RendererCreateInfo::default())?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if renderer.prepare_frame()? {
//!             renderer.main_render_pass_begin(&[ash::vk::ClearValue::default()]);
//!             // record draw commands on renderer.command_buffer()
//!             renderer.main_render_pass_end();
//!             renderer.finish_frame()?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Persisted configuration
pub mod config;
/// Rendering subsystem
pub mod render;

/// Commonly used types for applications driving the engine.
pub mod prelude {
    pub use crate::config::{Config, RendererSettings};
    pub use crate::render::vulkan::{
        CommandBuffer, RendererCreateInfo, Timeline, VulkanError, VulkanRenderer, VulkanResult,
    };
    pub use crate::render::window::{DisplayInfo, Window, WindowError};
}
