//! Integration tests for the engine logging system
//!
//! These tests go through the public `lumen3d::log` API and the exported
//! macros. No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use lumen_3d_engine::lumen3d::log::{reset_logger, set_logger, LogEntry, LogSeverity, Logger};
use lumen_3d_engine::lumen3d::{Error, ErrorKind, Result};
use lumen_3d_engine::{engine_bail, engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    set_logger(test_logger);

    engine_info!("lumen3d::vulkan", "Selected device {}", "test-gpu");
    engine_warn!("lumen3d::vulkan", "Present mode {} unavailable", "MAILBOX");
    engine_error!("lumen3d::vulkan", "Failed to create fence");

    let captured = entries.lock().unwrap();
    assert_eq!(captured.len(), 3);

    assert_eq!(captured[0].severity, LogSeverity::Info);
    assert_eq!(captured[0].source, "lumen3d::vulkan");
    assert_eq!(captured[0].message, "Selected device test-gpu");

    assert_eq!(captured[1].severity, LogSeverity::Warn);
    assert_eq!(captured[1].message, "Present mode MAILBOX unavailable");

    assert_eq!(captured[2].severity, LogSeverity::Error);
    assert_eq!(captured[2].message, "Failed to create fence");
    assert!(captured[2].file.is_some());
    assert!(captured[2].line.is_some());

    drop(captured);
    reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let (test_logger, entries) = TestLogger::new();
    set_logger(test_logger);

    engine_info!("test", "Message 1");
    assert_eq!(entries.lock().unwrap().len(), 1);

    // Goes to the default logger, not captured
    reset_logger();
    engine_info!("test", "Message 2");

    assert_eq!(entries.lock().unwrap().len(), 1);
}

#[test]
#[serial]
fn test_integration_logging_different_severities() {
    let (test_logger, entries) = TestLogger::new();
    set_logger(test_logger);

    engine_trace!("test", "Trace message");
    engine_debug!("test", "Debug message");
    engine_info!("test", "Info message");
    engine_warn!("test", "Warn message");
    engine_error!("test", "Error message");

    let severities: Vec<LogSeverity> = entries
        .lock()
        .unwrap()
        .iter()
        .map(|entry| entry.severity)
        .collect();
    assert_eq!(
        severities,
        vec![
            LogSeverity::Trace,
            LogSeverity::Debug,
            LogSeverity::Info,
            LogSeverity::Warn,
            LogSeverity::Error,
        ]
    );

    reset_logger();
}

#[test]
#[serial]
fn test_integration_bail_logs_before_returning() {
    fn submit(queue_lost: bool) -> Result<u32> {
        if queue_lost {
            engine_bail!("lumen3d::vulkan", "Queue submit failed: {}", "ERROR_UNKNOWN");
        }
        Ok(1)
    }

    let (test_logger, entries) = TestLogger::new();
    set_logger(test_logger);

    assert_eq!(submit(false).unwrap(), 1);
    assert!(entries.lock().unwrap().is_empty());

    let err = submit(true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recoverable);
    assert!(matches!(&err, Error::BackendError(msg) if msg == "Queue submit failed: ERROR_UNKNOWN"));

    let captured = entries.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].severity, LogSeverity::Error);
    assert_eq!(captured[0].message, "Queue submit failed: ERROR_UNKNOWN");

    drop(captured);
    reset_logger();
}
