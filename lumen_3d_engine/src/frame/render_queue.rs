/// RenderQueue - deferred draw commands executed once inside the current frame
///
/// Drawing code pushes commands during update/render; the frame scheduler
/// drains them into the frame's single command buffer. A command is consumed
/// when it runs, and whatever is left at the end of a frame is dropped.

/// Per-frame information handed to every command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame-in-flight slot being recorded (0..K)
    pub frame_slot: usize,
    /// Swapchain image the frame renders into
    pub image_index: u32,
    /// Swapchain extent width
    pub width: u32,
    /// Swapchain extent height
    pub height: u32,
    /// Number of frames presented before this one
    pub frame_number: u64,
}

/// A deferred recording operation
///
/// `C` is the backend's recording context (a command buffer wrapper for
/// Vulkan, an event log for tests). Any `FnOnce(&mut C, &FrameInfo)`
/// closure is a `RenderCommand`.
pub trait RenderCommand<C>: Send {
    /// Record into the frame's command buffer
    fn record(self: Box<Self>, commands: &mut C, frame: &FrameInfo);
}

impl<C, F> RenderCommand<C> for F
where
    F: FnOnce(&mut C, &FrameInfo) + Send,
{
    fn record(self: Box<Self>, commands: &mut C, frame: &FrameInfo) {
        (*self)(commands, frame)
    }
}

/// FIFO lists of render and UI commands for the current frame
pub struct RenderQueue<C> {
    render: Vec<Box<dyn RenderCommand<C>>>,
    ui: Vec<Box<dyn RenderCommand<C>>>,
}

impl<C> Default for RenderQueue<C> {
    fn default() -> Self {
        Self {
            render: Vec::new(),
            ui: Vec::new(),
        }
    }
}

impl<C> RenderQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scene draw closure
    pub fn push<F>(&mut self, command: F)
    where
        F: FnOnce(&mut C, &FrameInfo) + Send + 'static,
    {
        self.render.push(Box::new(command));
    }

    /// Queue a UI draw closure (runs after every render command)
    pub fn push_ui<F>(&mut self, command: F)
    where
        F: FnOnce(&mut C, &FrameInfo) + Send + 'static,
    {
        self.ui.push(Box::new(command));
    }

    /// Queue a boxed scene command
    pub fn push_command(&mut self, command: Box<dyn RenderCommand<C>>) {
        self.render.push(command);
    }

    /// Queue a boxed UI command
    pub fn push_ui_command(&mut self, command: Box<dyn RenderCommand<C>>) {
        self.ui.push(command);
    }

    pub fn render_len(&self) -> usize {
        self.render.len()
    }

    pub fn ui_len(&self) -> usize {
        self.ui.len()
    }

    pub fn is_empty(&self) -> bool {
        self.render.is_empty() && self.ui.is_empty()
    }

    /// Run and consume all render commands in insertion order
    pub fn execute_render(&mut self, commands: &mut C, frame: &FrameInfo) {
        for command in self.render.drain(..) {
            command.record(commands, frame);
        }
    }

    /// Run and consume all UI commands in insertion order
    pub fn execute_ui(&mut self, commands: &mut C, frame: &FrameInfo) {
        for command in self.ui.drain(..) {
            command.record(commands, frame);
        }
    }

    /// Drop every pending command
    pub fn clear(&mut self) {
        self.render.clear();
        self.ui.clear();
    }
}

#[cfg(test)]
#[path = "render_queue_tests.rs"]
mod tests;
