//! Renderer configuration
//!
//! Plain data read once at renderer creation. `RendererConfig::default()`
//! gives a double-buffered, mailbox-preferring, sRGB setup with validation
//! following `debug_assertions`.

use crate::error::{Error, Result};

/// Which validation messages reach the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything including info and verbose
    All,
}

/// Where validation messages are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    /// Engine logger only
    Console,
    /// Append to a file only
    File(String),
    /// Engine logger and file
    Both(String),
}

/// Validation message categories to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Counters collected by the validation callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Preferred presentation mode. FIFO is the fallback because it is always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Low latency triple buffering without tearing
    Mailbox,
    /// Vsync
    Fifo,
    /// Vsync that tears when late
    FifoRelaxed,
    /// No vsync, may tear
    Immediate,
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Number of frames the CPU may record ahead of the GPU (K)
    pub frames_in_flight: usize,

    /// Enable validation layers (requires the backend's validation feature)
    pub enable_validation: bool,
    /// Validation message severity filter
    pub debug_severity: DebugSeverity,
    /// Validation message destination
    pub debug_output: DebugOutput,
    /// Validation message category filter
    pub debug_message_filter: DebugMessageFilter,
    /// Count validation messages by severity
    pub enable_validation_stats: bool,

    /// Preferred present mode
    pub preferred_present_mode: PresentModePreference,
    /// Prefer an sRGB swapchain format over UNORM
    pub srgb_surface: bool,
    /// Give the presentation render pass a depth attachment
    pub enable_depth: bool,
    /// Color attachment clear value (RGBA)
    pub clear_color: [f32; 4],
    /// Depth attachment clear value
    pub clear_depth: f32,

    /// Descriptors per type (and set count) of the GUI overlay pool
    pub gui_descriptor_pool_size: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Lumen3D Application".to_string(),
            app_version: (1, 0, 0),
            frames_in_flight: 2,
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            enable_validation_stats: true,
            preferred_present_mode: PresentModePreference::Mailbox,
            srgb_surface: true,
            enable_depth: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            gui_descriptor_pool_size: 1000,
        }
    }
}

impl RendererConfig {
    /// Reject configurations the renderer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::InvalidResource(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.clear_depth) {
            return Err(Error::InvalidResource(format!(
                "clear_depth {} is outside [0, 1]",
                self.clear_depth
            )));
        }
        if self.gui_descriptor_pool_size == 0 {
            return Err(Error::InvalidResource(
                "gui_descriptor_pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
