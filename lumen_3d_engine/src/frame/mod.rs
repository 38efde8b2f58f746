/// Frame module - per-frame command queue and the frame scheduling state machine

pub mod render_queue;
pub mod frame_backend;
pub mod frame_scheduler;
#[cfg(test)]
pub mod mock_frame_backend;

pub use render_queue::*;
pub use frame_backend::*;
pub use frame_scheduler::*;
