//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry, the logger sink and the engine_* macros.
//! Tests that swap the global logger are #[serial].

use crate::log::{self, DefaultLogger, LogEntry, LogSeverity, Logger};
use crate::error::Error;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Logger that keeps this file's entries for inspection
///
/// Entries from other sources are dropped: tests in other modules may log
/// concurrently while the global logger is swapped.
#[derive(Clone, Default)]
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.source == "lumen3d::Test" {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

fn entry(severity: LogSeverity) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "lumen3d::Test".to_string(),
        message: "message".to_string(),
        file: None,
        line: None,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        logger.log(&entry(severity));
    }
}

#[test]
fn test_default_logger_detailed_entry() {
    let mut detailed = entry(LogSeverity::Error);
    detailed.file = Some("vulkan_device.rs");
    detailed.line = Some(42);
    DefaultLogger.log(&detailed);
}

// ============================================================================
// SINK + MACRO TESTS
// ============================================================================

#[test]
#[serial]
fn test_macros_route_to_custom_logger() {
    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());

    crate::engine_trace!("lumen3d::Test", "trace {}", 1);
    crate::engine_info!("lumen3d::Test", "info {}", 2);
    crate::engine_warn!("lumen3d::Test", "warn {}", 3);

    log::reset_logger();

    let entries = capture.entries.lock().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].severity, LogSeverity::Trace);
    assert_eq!(entries[0].message, "trace 1");
    assert_eq!(entries[1].severity, LogSeverity::Info);
    assert_eq!(entries[2].message, "warn 3");
    assert!(entries.iter().all(|e| e.file.is_none()));
}

#[test]
#[serial]
fn test_engine_error_carries_file_and_line() {
    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());

    crate::engine_error!("lumen3d::Test", "boom");

    log::reset_logger();

    let entries = capture.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert!(entries[0].file.unwrap().ends_with("log_tests.rs"));
    assert!(entries[0].line.is_some());
}

#[test]
#[serial]
fn test_engine_err_logs_and_builds_backend_error() {
    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());

    let err = crate::engine_err!("lumen3d::Test", "Failed to submit: {}", -4);

    log::reset_logger();

    match err {
        Error::BackendError(msg) => assert_eq!(msg, "Failed to submit: -4"),
        other => panic!("unexpected variant: {:?}", other),
    }
    assert_eq!(capture.entries.lock().unwrap().len(), 1);
}

#[test]
#[serial]
fn test_engine_bail_warn_returns_invalid_resource() {
    fn check(size: usize) -> crate::error::Result<()> {
        if size == 0 {
            crate::engine_bail_warn!("lumen3d::Test", "Empty upload");
        }
        Ok(())
    }

    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());

    let result = check(0);
    let ok = check(4);

    log::reset_logger();

    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert!(ok.is_ok());
    let entries = capture.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Warn);
}
