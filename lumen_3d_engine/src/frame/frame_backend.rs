/// FrameBackend trait - the device operations the frame scheduler sequences
///
/// A backend owns the per-slot synchronization objects (fence, "image
/// available" and "render finished" semaphores), the per-slot command
/// buffers and the swapchain. The scheduler decides the order of calls;
/// the backend only performs them.

use crate::error::Result;
use crate::frame::render_queue::{FrameInfo, RenderQueue};

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available; `suboptimal` images are still rendered
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface
    OutOfDate,
}

/// Result of presenting a rendered image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal: the swapchain should be rebuilt
    Stale,
}

/// Device operations used by the frame scheduler
pub trait FrameBackend {
    /// Recording context handed to render commands
    type Commands;

    /// Number of frame slots (K)
    fn frames_in_flight(&self) -> usize;

    /// Block until the slot's in-flight fence is signaled
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next swapchain image, signaling the slot's "image available" semaphore
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Reset the slot's fence and command buffer
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Current swapchain extent (width, height)
    fn extent(&self) -> (u32, u32);

    /// Begin the slot's command buffer and render pass, set viewport and scissor
    fn begin_recording(&mut self, slot: usize, image_index: u32) -> Result<Self::Commands>;

    /// End the render pass and the command buffer
    fn end_recording(&mut self, slot: usize, commands: Self::Commands) -> Result<()>;

    /// Submit the slot's command buffer: wait "image available" at color output,
    /// signal "render finished" and the slot fence
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present `image_index` after "render finished"
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Rebuild the swapchain and everything sized from it
    fn recreate_swapchain(&mut self) -> Result<()>;

    /// Restore a slot after a failure between `reset_slot` and a successful `submit`
    ///
    /// Afterwards the slot's fence is signaled and its "image available"
    /// semaphore is unsignaled, as if the slot had never been used.
    fn recover_slot(&mut self, slot: usize) -> Result<()>;
}

/// Begin/end hook pair for an overlay (GUI) that draws into the same command buffer
pub trait FrameOverlay<C>: Send {
    /// Called after the command buffer is begun, before scene commands run
    fn begin_frame(&mut self, frame: &FrameInfo);

    /// Called after scene commands ran; may queue UI commands for this frame
    fn end_frame(&mut self, frame: &FrameInfo, queue: &mut RenderQueue<C>);
}
