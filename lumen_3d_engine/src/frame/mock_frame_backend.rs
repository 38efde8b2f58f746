/// Mock frame backend for testing the scheduler without a GPU
///
/// Every call is appended to an event log. Acquire and present outcomes can
/// be scripted; when the script is empty the backend acquires image
/// `frame % image_count` and presents normally. Recorded commands are a
/// `Vec<String>` that is folded into the event log on `end_recording`.
///
/// Fences and "image available" semaphores follow Vulkan rules: a wait on an
/// unsignaled fence with no submission pending is an error (on a device it
/// blocks forever), and acquiring into a semaphore that is still signaled is
/// an error.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::frame::frame_backend::{AcquireOutcome, FrameBackend, PresentOutcome};

pub struct MockFrameBackend {
    pub events: Vec<String>,
    pub acquire_script: VecDeque<AcquireOutcome>,
    pub present_script: VecDeque<PresentOutcome>,
    /// Per-slot fence state: true when signaled
    pub fences: Vec<bool>,
    /// Per-slot submission that will signal the fence
    pub pending: Vec<bool>,
    /// Per-slot "image available" semaphore state: true when signaled
    pub image_available: Vec<bool>,
    pub extent: (u32, u32),
    pub recreate_count: u32,
    pub fail_begin: bool,
    pub fail_submit: bool,
    frames_in_flight: usize,
    image_count: u32,
    next_image: u32,
}

impl MockFrameBackend {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            events: Vec::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            // Fences are created signaled so the first wait returns
            fences: vec![true; frames_in_flight],
            pending: vec![false; frames_in_flight],
            image_available: vec![false; frames_in_flight],
            extent: (800, 600),
            recreate_count: 0,
            fail_begin: false,
            fail_submit: false,
            frames_in_flight,
            image_count: 3,
            next_image: 0,
        }
    }

    /// Events that match `prefix`
    pub fn events_starting_with(&self, prefix: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.starts_with(prefix))
            .map(|e| e.as_str())
            .collect()
    }
}

impl FrameBackend for MockFrameBackend {
    type Commands = Vec<String>;

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.events.push(format!("wait {}", slot));
        if !self.fences[slot] {
            if !self.pending[slot] {
                return Err(Error::BackendError(format!(
                    "Wait on unsignaled fence {} with no pending submission",
                    slot
                )));
            }
            // The "GPU" finishes instantly once waited on
            self.fences[slot] = true;
            self.pending[slot] = false;
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.events.push(format!("acquire {}", slot));
        let outcome = match self.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Acquired { image_index, suboptimal: false }
            }
        };
        if let AcquireOutcome::Acquired { .. } = outcome {
            if self.image_available[slot] {
                return Err(Error::BackendError(format!(
                    "Acquire into semaphore {} that is still signaled",
                    slot
                )));
            }
            self.image_available[slot] = true;
        }
        Ok(outcome)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.events.push(format!("reset {}", slot));
        self.fences[slot] = false;
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn begin_recording(&mut self, slot: usize, image_index: u32) -> Result<Vec<String>> {
        if self.fail_begin {
            return Err(Error::BackendError("Mock begin failure".to_string()));
        }
        self.events.push(format!("begin {} {}", slot, image_index));
        Ok(Vec::new())
    }

    fn end_recording(&mut self, slot: usize, commands: Vec<String>) -> Result<()> {
        self.events.extend(commands.into_iter().map(|c| format!("cmd {}", c)));
        self.events.push(format!("end {}", slot));
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        if self.fail_submit {
            return Err(Error::BackendError("Mock submit failure".to_string()));
        }
        self.events.push(format!("submit {}", slot));
        self.image_available[slot] = false;
        self.pending[slot] = true;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        self.events.push(format!("present {} {}", slot, image_index));
        Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        self.events.push("recreate".to_string());
        self.recreate_count += 1;
        self.next_image = 0;
        Ok(())
    }

    fn recover_slot(&mut self, slot: usize) -> Result<()> {
        self.events.push(format!("recover {}", slot));
        self.fences[slot] = true;
        self.pending[slot] = false;
        self.image_available[slot] = false;
        Ok(())
    }
}
