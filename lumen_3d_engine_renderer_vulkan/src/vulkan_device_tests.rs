//! Unit tests for vulkan_device.rs
//!
//! Pure selection logic only; device creation is covered by the ignored
//! GPU tests in tests/.

use ash::vk;

use crate::vulkan_device::{
    find_queue_families, missing_names, QueueFamilies, QueueFamilyIndices, SwapchainSupport,
    REQUIRED_DEVICE_EXTENSIONS,
};

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

// ============================================================================
// QUEUE FAMILY SEARCH
// ============================================================================

#[test]
fn test_single_family_does_everything() {
    let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
    let indices = find_queue_families(&families, |_| true);

    assert_eq!(indices.graphics, Some(0));
    assert_eq!(indices.present, Some(0));
    assert!(indices.complete().unwrap().is_shared());
}

#[test]
fn test_separate_graphics_and_present_families() {
    let families = [
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::TRANSFER),
    ];
    let indices = find_queue_families(&families, |index| index == 1);

    let resolved = indices.complete().unwrap();
    assert_eq!(resolved, QueueFamilies { graphics: 0, present: 1 });
    assert!(!resolved.is_shared());
    assert_eq!(resolved.unique(), vec![0, 1]);
}

#[test]
fn test_search_stops_once_complete() {
    let families = [
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::GRAPHICS),
    ];
    let probed = std::cell::RefCell::new(Vec::new());
    let indices = find_queue_families(&families, |index| {
        probed.borrow_mut().push(index);
        true
    });

    assert_eq!(indices.graphics, Some(0));
    assert_eq!(*probed.borrow(), vec![0]);
}

#[test]
fn test_first_graphics_family_wins() {
    let families = [
        family(vk::QueueFlags::COMPUTE),
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
    ];
    let indices = find_queue_families(&families, |_| false);

    assert_eq!(indices.graphics, Some(1));
    assert_eq!(indices.present, None);
    assert!(!indices.is_complete());
    assert!(indices.complete().is_none());
}

#[test]
fn test_empty_family_ignored_for_graphics() {
    let mut empty = family(vk::QueueFlags::GRAPHICS);
    empty.queue_count = 0;
    let families = [empty, family(vk::QueueFlags::GRAPHICS)];

    let indices = find_queue_families(&families, |_| true);
    assert_eq!(indices.graphics, Some(1));
    assert_eq!(indices.present, Some(0));
}

#[test]
fn test_no_families() {
    let indices = find_queue_families(&[], |_| true);
    assert_eq!(indices, QueueFamilyIndices::default());
}

// ============================================================================
// EXTENSIONS / LAYERS
// ============================================================================

#[test]
fn test_swapchain_extension_required() {
    let missing = missing_names([c"VK_KHR_maintenance1"], &REQUIRED_DEVICE_EXTENSIONS);
    assert_eq!(missing, vec!["VK_KHR_swapchain".to_string()]);
}

#[test]
fn test_all_required_present() {
    let missing = missing_names(
        [c"VK_KHR_maintenance1", c"VK_KHR_swapchain"],
        &REQUIRED_DEVICE_EXTENSIONS,
    );
    assert!(missing.is_empty());
}

#[test]
fn test_missing_layer_reported() {
    let missing = missing_names(Vec::<&std::ffi::CStr>::new(), &[c"VK_LAYER_KHRONOS_validation"]);
    assert_eq!(missing, vec!["VK_LAYER_KHRONOS_validation".to_string()]);
}

// ============================================================================
// SWAPCHAIN SUPPORT
// ============================================================================

#[test]
fn test_swapchain_support_adequacy() {
    let mut support = SwapchainSupport::default();
    assert!(!support.is_adequate());

    support.formats.push(vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    });
    assert!(!support.is_adequate());

    support.present_modes.push(vk::PresentModeKHR::FIFO);
    assert!(support.is_adequate());
}
