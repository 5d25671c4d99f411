//! Window and display boundary
//!
//! Wraps the GLFW window the engine presents into. The renderer only
//! consumes this interface: required instance extensions, a Vulkan surface,
//! the drawable size, and display enumeration. Everything else about the
//! windowing system stays on the application's side.

use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other error reported by GLFW
    #[error("GLFW error: {0}")]
    Glfw(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Properties of one connected display.
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    /// Monitor name reported by the OS
    pub name: String,
    /// Virtual-desktop position of the top-left corner
    pub position: (i32, i32),
    /// Current resolution in screen coordinates
    pub size: (u32, u32),
    /// Current refresh rate in Hz
    pub refresh_rate: u32,
    /// Channel bit depths of the current video mode
    pub pixel_format: String,
}

/// GLFW window wrapper with Vulkan surface support
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Opens a resizable window without a client API context, ready for a
    /// Vulkan surface.
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw =
            glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_size_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    /// True once the user or the application requested closing.
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Marks the window for closing.
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pumps the OS event queue.
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drains the events gathered since the last poll.
    pub fn flush_events(&self) -> Vec<(f64, glfw::WindowEvent)> {
        glfw::flush_messages(&self.events).collect()
    }

    /// Drawable size in pixels; zero while the window is minimized.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width as u32, height as u32)
    }

    /// Instance extensions the windowing system needs for surface creation.
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::Glfw("Failed to get required extensions".to_string()))
    }

    /// Creates the Vulkan presentation surface for this window.
    pub fn create_vulkan_surface(
        &mut self,
        instance: ash::vk::Instance,
    ) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result =
            self.window
                .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::Glfw(format!(
                "Failed to create Vulkan surface: {result:?}"
            )))
        }
    }

    /// Enumerates the connected displays with their current video modes.
    pub fn displays(&mut self) -> Vec<DisplayInfo> {
        self.glfw.with_connected_monitors(|_, monitors| {
            monitors
                .iter()
                .map(|monitor| {
                    let position = monitor.get_pos();
                    let mode = monitor.get_video_mode();
                    DisplayInfo {
                        name: monitor.get_name().unwrap_or_else(|| "unknown".to_string()),
                        position,
                        size: mode.map_or((0, 0), |m| (m.width, m.height)),
                        refresh_rate: mode.map_or(0, |m| m.refresh_rate),
                        pixel_format: mode.map_or_else(String::new, |m| {
                            format!("R{}G{}B{}", m.red_bits, m.green_bits, m.blue_bits)
                        }),
                    }
                })
                .collect()
        })
    }
}
