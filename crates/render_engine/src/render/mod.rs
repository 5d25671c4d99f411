//! Rendering subsystem
//!
//! The Vulkan backend and the window boundary it presents into.

/// Vulkan frame pipeline and resource lifetime
pub mod vulkan;
/// Window and display boundary
pub mod window;

pub use vulkan::{RendererCreateInfo, VulkanError, VulkanRenderer, VulkanResult};
pub use window::{DisplayInfo, Window, WindowError};
