/// FrameScheduler - drives one iteration of the render loop per call
///
/// Per frame:
/// 1. wait on the current slot's fence
/// 2. acquire an image; if the swapchain is out of date, rebuild it and skip
///    the frame (the fence is left signaled, nothing is submitted)
/// 3. reset the fence, record scene commands then UI commands
/// 4. submit; if anything from the reset up to here fails, the backend
///    restores the slot's fence and semaphore and the swapchain is rebuilt,
///    so the next wait on the slot cannot block forever
/// 5. present; a stale swapchain is rebuilt after presenting
/// 6. advance the slot modulo K
///
/// The queues are cleared on every exit path, so no command outlives the
/// frame it was queued for.

use crate::error::{Error, Result};
use crate::frame::frame_backend::{AcquireOutcome, FrameBackend, FrameOverlay, PresentOutcome};
use crate::frame::render_queue::{FrameInfo, RenderQueue};
use crate::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};

/// What happened to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Recorded, submitted and presented
    Presented,
    /// Dropped because the swapchain had to be rebuilt first
    Skipped,
}

pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    queue: RenderQueue<B::Commands>,
    overlay: Option<Box<dyn FrameOverlay<B::Commands>>>,
    current_frame: usize,
    frames_in_flight: usize,
    frame_count: u64,
    skipped_frames: u64,
}

impl<B: FrameBackend> FrameScheduler<B> {
    pub fn new(backend: B) -> Result<Self> {
        let frames_in_flight = backend.frames_in_flight();
        if frames_in_flight == 0 {
            return Err(Error::InvalidResource(
                "Frame backend reports zero frames in flight".to_string(),
            ));
        }

        engine_info!("lumen3d::FrameScheduler", "Frame scheduler ready with {} frames in flight", frames_in_flight);

        Ok(Self {
            backend,
            queue: RenderQueue::new(),
            overlay: None,
            current_frame: 0,
            frames_in_flight,
            frame_count: 0,
            skipped_frames: 0,
        })
    }

    /// Queue a scene command for the next frame
    pub fn submit<F>(&mut self, command: F)
    where
        F: FnOnce(&mut B::Commands, &FrameInfo) + Send + 'static,
    {
        self.queue.push(command);
    }

    /// Queue a UI command for the next frame
    pub fn submit_ui<F>(&mut self, command: F)
    where
        F: FnOnce(&mut B::Commands, &FrameInfo) + Send + 'static,
    {
        self.queue.push_ui(command);
    }

    pub fn queue_mut(&mut self) -> &mut RenderQueue<B::Commands> {
        &mut self.queue
    }

    /// Install the overlay hook pair (replaces any previous one)
    pub fn set_overlay(&mut self, overlay: Box<dyn FrameOverlay<B::Commands>>) {
        self.overlay = Some(overlay);
    }

    pub fn clear_overlay(&mut self) {
        self.overlay = None;
    }

    /// Run one frame
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        let slot = self.current_frame;
        let status = self.run_frame(slot);
        self.queue.clear();
        status
    }

    /// Handle a window resize notification by rebuilding the swapchain now
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        engine_debug!("lumen3d::FrameScheduler", "Resize to {}x{}, recreating swapchain", width, height);
        self.backend.recreate_swapchain()
    }

    fn run_frame(&mut self, slot: usize) -> Result<FrameStatus> {
        self.backend.wait_for_slot(slot)?;

        let image_index = match self.backend.acquire_image(slot)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    engine_trace!("lumen3d::FrameScheduler", "Acquired suboptimal image {}", image_index);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                engine_debug!("lumen3d::FrameScheduler", "Swapchain out of date on acquire, skipping frame");
                self.skipped_frames += 1;
                self.backend.recreate_swapchain()?;
                return Ok(FrameStatus::Skipped);
            }
        };

        if let Err(err) = self.record_and_submit(slot, image_index) {
            self.abandon_slot(slot);
            return Err(err);
        }

        if self.backend.present(slot, image_index)? == PresentOutcome::Stale {
            engine_debug!("lumen3d::FrameScheduler", "Swapchain stale after present, recreating");
            self.backend.recreate_swapchain()?;
        }

        self.current_frame = (slot + 1) % self.frames_in_flight;
        self.frame_count += 1;
        Ok(FrameStatus::Presented)
    }

    /// Reset the slot, record the queued commands and submit them
    fn record_and_submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        // Only reset once an image is held and work is about to be submitted
        self.backend.reset_slot(slot)?;

        let (width, height) = self.backend.extent();
        let frame = FrameInfo {
            frame_slot: slot,
            image_index,
            width,
            height,
            frame_number: self.frame_count,
        };

        let mut commands = self.backend.begin_recording(slot, image_index)?;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.begin_frame(&frame);
        }
        self.queue.execute_render(&mut commands, &frame);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.end_frame(&frame, &mut self.queue);
        }
        self.queue.execute_ui(&mut commands, &frame);
        self.backend.end_recording(slot, commands)?;

        self.backend.submit(slot)
    }

    /// Return a slot whose frame failed after acquire to a waitable state
    ///
    /// The slot's fence may be unsignaled with nothing pending, and the
    /// acquired image is never presented. The backend restores the slot and
    /// the swapchain is rebuilt to release the image.
    fn abandon_slot(&mut self, slot: usize) {
        engine_warn!("lumen3d::FrameScheduler", "Frame on slot {} failed after acquire, recovering slot", slot);
        if let Err(err) = self.backend.recover_slot(slot) {
            engine_error!("lumen3d::FrameScheduler", "Failed to recover frame slot {}: {}", slot, err);
            return;
        }
        if let Err(err) = self.backend.recreate_swapchain() {
            engine_error!("lumen3d::FrameScheduler", "Failed to recreate swapchain after frame failure: {}", err);
        }
    }

    /// Slot that the next draw_frame records into
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Frames presented so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames dropped because of an out-of-date swapchain
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
#[path = "frame_scheduler_tests.rs"]
mod tests;
