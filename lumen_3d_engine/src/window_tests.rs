//! Unit tests for window.rs

use crate::window::{wait_for_drawable_size, WindowSurface};
use std::sync::Mutex;

/// Window whose size follows a scripted sequence, advancing on each wait_events
struct ScriptedWindow {
    sizes: Vec<(u32, u32)>,
    cursor: Mutex<usize>,
    waits: Mutex<u32>,
}

impl ScriptedWindow {
    fn new(sizes: Vec<(u32, u32)>) -> Self {
        Self {
            sizes,
            cursor: Mutex::new(0),
            waits: Mutex::new(0),
        }
    }
}

impl WindowSurface for ScriptedWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let cursor = *self.cursor.lock().unwrap();
        self.sizes[cursor.min(self.sizes.len() - 1)]
    }

    fn wait_events(&self) {
        *self.waits.lock().unwrap() += 1;
        *self.cursor.lock().unwrap() += 1;
    }
}

// ============================================================================
// MINIMIZED WINDOW POLLING
// ============================================================================

#[test]
fn test_visible_window_returns_immediately() {
    let window = ScriptedWindow::new(vec![(800, 600)]);
    assert_eq!(wait_for_drawable_size(&window), (800, 600));
    assert_eq!(*window.waits.lock().unwrap(), 0);
}

#[test]
fn test_minimized_window_polls_until_restored() {
    let window = ScriptedWindow::new(vec![(0, 0), (0, 0), (1024, 768)]);
    assert_eq!(wait_for_drawable_size(&window), (1024, 768));
    assert_eq!(*window.waits.lock().unwrap(), 2);
}

#[test]
fn test_zero_in_one_axis_counts_as_minimized() {
    let window = ScriptedWindow::new(vec![(1280, 0), (0, 720), (1280, 720)]);
    assert_eq!(wait_for_drawable_size(&window), (1280, 720));
    assert_eq!(*window.waits.lock().unwrap(), 2);
}
