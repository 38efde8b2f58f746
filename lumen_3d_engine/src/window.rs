//! Window collaborator interface
//!
//! The renderer never drives the window. It only asks for the current
//! framebuffer size and, while the window is minimized, calls back into the
//! windowing layer to let it pump events.

use std::time::Duration;

/// Interval between size checks while a winit window is minimized
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Framebuffer size source and event pump provided by the windowing layer
pub trait WindowSurface: Send + Sync {
    /// Current drawable size in pixels (0 in either axis when minimized)
    fn framebuffer_size(&self) -> (u32, u32);

    /// Block briefly so the windowing layer can process events
    fn wait_events(&self);
}

impl WindowSurface for winit::window::Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn wait_events(&self) {
        // winit owns its event loop; the size is re-queried from the OS after the pause
        std::thread::sleep(MINIMIZED_POLL_INTERVAL);
    }
}

/// Block until the window reports a non-zero drawable size
///
/// Deliberately not cancellable: a minimized window stalls swapchain
/// recreation until it is restored.
pub fn wait_for_drawable_size(window: &dyn WindowSurface) -> (u32, u32) {
    let (mut width, mut height) = window.framebuffer_size();
    if width == 0 || height == 0 {
        crate::engine_debug!("lumen3d::Window", "Window minimized, waiting for a drawable size");
    }
    while width == 0 || height == 0 {
        window.wait_events();
        (width, height) = window.framebuffer_size();
    }
    (width, height)
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
