//! Unit tests for config.rs

use crate::config::*;
use crate::error::Error;

// ============================================================================
// DEFAULTS
// ============================================================================

#[test]
fn test_default_config_is_valid() {
    let config = RendererConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.frames_in_flight, 2);
    assert_eq!(config.preferred_present_mode, PresentModePreference::Mailbox);
    assert!(config.srgb_surface);
    assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(config.debug_output, DebugOutput::Console);
}

#[test]
fn test_default_validation_follows_debug_assertions() {
    assert_eq!(RendererConfig::default().enable_validation, cfg!(debug_assertions));
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_zero_frames_in_flight_rejected() {
    let config = RendererConfig {
        frames_in_flight: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(Error::InvalidResource(_))));
}

#[test]
fn test_single_frame_in_flight_allowed() {
    let config = RendererConfig {
        frames_in_flight: 1,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_clear_depth_out_of_range_rejected() {
    let config = RendererConfig {
        clear_depth: 1.5,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_gui_pool_rejected() {
    let config = RendererConfig {
        gui_descriptor_pool_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

// ============================================================================
// VALIDATION STATS
// ============================================================================

#[test]
fn test_validation_stats_total() {
    let stats = ValidationStats {
        errors: 1,
        warnings: 2,
        info: 3,
        verbose: 4,
    };
    assert_eq!(stats.total(), 10);
    assert_eq!(ValidationStats::default().total(), 0);
}
