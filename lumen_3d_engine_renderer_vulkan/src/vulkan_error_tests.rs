//! Unit tests for vulkan_error.rs

use ash::vk;
use lumen_3d_engine::lumen3d::{Error, ErrorKind};

use crate::vulkan_error::{vk_error, vk_init_error};

// ============================================================================
// RUNTIME MAPPING
// ============================================================================

#[test]
fn test_out_of_memory_codes() {
    assert!(matches!(vk_error("allocate", vk::Result::ERROR_OUT_OF_HOST_MEMORY), Error::OutOfMemory));
    assert!(matches!(vk_error("allocate", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY), Error::OutOfMemory));
}

#[test]
fn test_device_lost_is_fatal() {
    let err = vk_error("wait for fence", vk::Result::ERROR_DEVICE_LOST);
    assert!(matches!(err, Error::DeviceLost));
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

#[test]
fn test_out_of_date_is_recoverable() {
    let err = vk_error("present", vk::Result::ERROR_OUT_OF_DATE_KHR);
    assert!(matches!(err, Error::SwapchainOutOfDate));
    assert!(!err.is_fatal());
}

#[test]
fn test_format_not_supported() {
    let err = vk_error("create image", vk::Result::ERROR_FORMAT_NOT_SUPPORTED);
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[test]
fn test_other_codes_keep_context() {
    match vk_error("create fence", vk::Result::ERROR_INITIALIZATION_FAILED) {
        Error::BackendError(msg) => {
            assert!(msg.contains("create fence"));
            assert!(msg.contains("ERROR_INITIALIZATION_FAILED"));
        }
        other => panic!("unexpected variant: {:?}", other),
    }
}

// ============================================================================
// SETUP MAPPING
// ============================================================================

#[test]
fn test_init_errors_are_fatal() {
    let err = vk_init_error("create instance", vk::Result::ERROR_LAYER_NOT_PRESENT);
    assert!(matches!(err, Error::InitializationFailed(_)));
    assert!(err.is_fatal());

    let err = vk_init_error("create device", vk::Result::ERROR_OUT_OF_HOST_MEMORY);
    assert!(err.is_fatal());
}
