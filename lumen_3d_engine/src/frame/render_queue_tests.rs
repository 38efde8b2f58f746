//! Unit tests for render_queue.rs

use crate::frame::render_queue::{FrameInfo, RenderCommand, RenderQueue};

fn frame() -> FrameInfo {
    FrameInfo {
        frame_slot: 1,
        image_index: 2,
        width: 800,
        height: 600,
        frame_number: 7,
    }
}

/// Struct-based command, to check the trait works without closures
struct DrawMesh {
    id: u32,
}

impl RenderCommand<Vec<String>> for DrawMesh {
    fn record(self: Box<Self>, commands: &mut Vec<String>, _frame: &FrameInfo) {
        commands.push(format!("mesh {}", self.id));
    }
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_render_commands_run_in_insertion_order() {
    let mut queue: RenderQueue<Vec<String>> = RenderQueue::new();
    for i in 0..3 {
        queue.push(move |log: &mut Vec<String>, _: &FrameInfo| log.push(format!("draw {}", i)));
    }

    let mut log = Vec::new();
    queue.execute_render(&mut log, &frame());

    assert_eq!(log, vec!["draw 0", "draw 1", "draw 2"]);
}

#[test]
fn test_ui_commands_are_separate_list() {
    let mut queue: RenderQueue<Vec<String>> = RenderQueue::new();
    queue.push_ui(|log: &mut Vec<String>, _: &FrameInfo| log.push("ui".to_string()));
    queue.push(|log: &mut Vec<String>, _: &FrameInfo| log.push("scene".to_string()));

    assert_eq!(queue.render_len(), 1);
    assert_eq!(queue.ui_len(), 1);

    let mut log = Vec::new();
    queue.execute_render(&mut log, &frame());
    queue.execute_ui(&mut log, &frame());

    assert_eq!(log, vec!["scene", "ui"]);
}

#[test]
fn test_boxed_commands_mix_with_closures() {
    let mut queue: RenderQueue<Vec<String>> = RenderQueue::new();
    queue.push_command(Box::new(DrawMesh { id: 4 }));
    queue.push(|log: &mut Vec<String>, _: &FrameInfo| log.push("closure".to_string()));
    queue.push_ui_command(Box::new(DrawMesh { id: 9 }));

    let mut log = Vec::new();
    queue.execute_render(&mut log, &frame());
    queue.execute_ui(&mut log, &frame());

    assert_eq!(log, vec!["mesh 4", "closure", "mesh 9"]);
}

// ============================================================================
// CONSUMPTION
// ============================================================================

#[test]
fn test_execute_consumes_commands() {
    let mut queue: RenderQueue<Vec<String>> = RenderQueue::new();
    queue.push(|log: &mut Vec<String>, _: &FrameInfo| log.push("once".to_string()));

    let mut log = Vec::new();
    queue.execute_render(&mut log, &frame());
    queue.execute_render(&mut log, &frame());

    assert_eq!(log, vec!["once"]);
    assert!(queue.is_empty());
}

#[test]
fn test_clear_drops_pending_commands() {
    let mut queue: RenderQueue<Vec<String>> = RenderQueue::new();
    queue.push(|log: &mut Vec<String>, _: &FrameInfo| log.push("stale".to_string()));
    queue.push_ui(|log: &mut Vec<String>, _: &FrameInfo| log.push("stale ui".to_string()));

    queue.clear();
    assert!(queue.is_empty());

    let mut log = Vec::new();
    queue.execute_render(&mut log, &frame());
    queue.execute_ui(&mut log, &frame());
    assert!(log.is_empty());
}

#[test]
fn test_commands_see_frame_info() {
    let mut queue: RenderQueue<Vec<String>> = RenderQueue::new();
    queue.push(|log: &mut Vec<String>, info: &FrameInfo| {
        log.push(format!("{}:{}:{}x{}", info.frame_slot, info.image_index, info.width, info.height));
    });

    let mut log = Vec::new();
    queue.execute_render(&mut log, &frame());
    assert_eq!(log, vec!["1:2:800x600"]);
}
