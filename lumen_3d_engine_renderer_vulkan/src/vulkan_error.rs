/// Conversion of raw `vk::Result` codes into engine errors

use ash::vk;
use lumen_3d_engine::engine_error;
use lumen_3d_engine::lumen3d::Error;

/// Log a failed Vulkan call and map its result code to an engine error
///
/// `what` names the failed operation ("create fence", "queue submit").
pub(crate) fn vk_error(what: &str, result: vk::Result) -> Error {
    engine_error!("lumen3d::vulkan", "Failed to {}: {:?}", what, result);
    map_vk_result(what, result)
}

/// Same as `vk_error` for failures during renderer setup (always fatal)
pub(crate) fn vk_init_error(what: &str, result: vk::Result) -> Error {
    engine_error!("lumen3d::vulkan", "Failed to {}: {:?}", what, result);
    match result {
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
        other => Error::InitializationFailed(format!("Failed to {}: {:?}", what, other)),
    }
}

fn map_vk_result(what: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            Error::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
        vk::Result::ERROR_OUT_OF_DATE_KHR => Error::SwapchainOutOfDate,
        vk::Result::ERROR_FORMAT_NOT_SUPPORTED => {
            Error::UnsupportedFormat(format!("Failed to {}: {:?}", what, result))
        }
        other => Error::BackendError(format!("Failed to {}: {:?}", what, other)),
    }
}

#[cfg(test)]
#[path = "vulkan_error_tests.rs"]
mod tests;
