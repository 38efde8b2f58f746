/*!
# Lumen 3D Engine

Backend-agnostic core of the Lumen 3D rendering stack.

This crate holds everything that does not talk to the GPU directly: the
error type, the engine logger, renderer configuration, the window seam and
the frame scheduler. The Vulkan backend lives in `lumen_3d_engine_renderer_vulkan`
and plugs into the scheduler through the `FrameBackend` trait.

## Architecture

- **FrameScheduler**: fence wait, acquire, record, submit, present, advance
- **FrameBackend**: device operations the scheduler sequences
- **RenderQueue**: deferred render and UI commands for the current frame
- **WindowSurface**: framebuffer size query and event polling
- **RendererConfig**: frames in flight, validation, surface preferences
*/

// Internal modules
mod error;
pub mod log;
pub mod config;
pub mod window;
pub mod frame;

// Main lumen3d namespace module
pub mod lumen3d {
    // Error types
    pub use crate::error::{Error, ErrorKind, Result};

    // Configuration
    pub use crate::config::{
        DebugMessageFilter, DebugOutput, DebugSeverity, PresentModePreference,
        RendererConfig, ValidationStats,
    };

    // Window seam
    pub use crate::window::{wait_for_drawable_size, WindowSurface};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
        pub use crate::log::{reset_logger, set_logger};
    }

    // Frame scheduling sub-module
    pub mod frame {
        pub use crate::frame::*;
    }
}
