//! Clear-screen demo application
//!
//! Drives the full frame interface of the engine: prepares a frame, opens
//! the main render pass with an animated clear color, finishes the frame
//! and advances the simulation step. Exercises window resizing, minimizing
//! and runtime vSync switching.

use ash::vk;
use glfw::{Action, Key, WindowEvent};
use render_engine::prelude::*;

const SETTINGS_PATH: &str = "settings.toml";

struct ClearApp {
    window: Window,
    renderer: VulkanRenderer,
    settings: RendererSettings,
}

impl ClearApp {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let settings = RendererSettings::load_or_default(SETTINGS_PATH);

        let mut window = Window::new(
            "render_engine - clear demo",
            settings.window_width,
            settings.window_height,
        )?;

        for display in window.displays() {
            log::info!(
                "Display '{}' {}x{} @ {} Hz ({})",
                display.name,
                display.size.0,
                display.size.1,
                display.refresh_rate,
                display.pixel_format
            );
        }

        let create_info = RendererCreateInfo {
            app_name: "clear_demo".to_string(),
            preferred_device: settings.preferred_device.clone(),
            vsync: settings.vsync,
            subpass_count: 1,
        };
        let renderer = VulkanRenderer::new(&mut window, &create_info)?;

        Ok(Self {
            window,
            renderer,
            settings,
        })
    }

    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();

            if self.renderer.prepare_frame()? {
                let clear_values = [vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.clear_color(),
                    },
                }];
                self.renderer.main_render_pass_begin(&clear_values);
                self.renderer.main_render_pass_end();
                self.renderer.finish_frame()?;
            }

            // One simulation step per rendered frame is enough for a demo.
            self.renderer.finish_step();
        }
        Ok(())
    }

    fn handle_events(&mut self) {
        for (_, event) in self.window.flush_events() {
            match event {
                WindowEvent::FramebufferSize(width, height) => {
                    self.renderer.notify_resize(width as u32, height as u32);
                    if width > 0 && height > 0 {
                        self.settings.window_width = width as u32;
                        self.settings.window_height = height as u32;
                    }
                }
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                    self.window.set_should_close(true);
                }
                WindowEvent::Key(Key::V, _, Action::Press, _) => {
                    self.settings.vsync = !self.settings.vsync;
                    log::info!("vSync {}", if self.settings.vsync { "on" } else { "off" });
                    self.renderer.change_presentation(self.settings.vsync);
                }
                _ => {}
            }
        }
    }

    fn clear_color(&self) -> [f32; 4] {
        // Slow pulse so frame pacing is visible with the naked eye.
        let t = (self.renderer.frame_number() % 512) as f32 / 512.0;
        let pulse = (t * std::f32::consts::TAU).sin() * 0.5 + 0.5;
        [0.1, 0.1 + 0.2 * pulse, 0.25, 1.0]
    }
}

impl Drop for ClearApp {
    fn drop(&mut self) {
        if let Err(e) = self.settings.save_to_file(SETTINGS_PATH) {
            log::warn!("Could not save settings: {e}");
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut app = ClearApp::new()?;
    app.run()
}
