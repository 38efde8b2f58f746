//! Unit tests for vulkan_buffer.rs
//!
//! Memory type selection, write bounds and the layout transition table. Actual uploads are
//! exercised by the ignored GPU tests in tests/.

use ash::vk;
use lumen_3d_engine::lumen3d::Error;

use crate::vulkan_buffer::{
    find_memory_type, range_fits, transition_aspect_mask, transition_barrier_masks,
};

type Mem = vk::MemoryPropertyFlags;

/// Memory properties with one type per entry of `flags`
fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
    let mut properties = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: flags.len() as u32,
        ..Default::default()
    };
    for (index, &property_flags) in flags.iter().enumerate() {
        properties.memory_types[index] = vk::MemoryType {
            property_flags,
            heap_index: 0,
        };
    }
    properties
}

// ============================================================================
// MEMORY TYPE SELECTION
// ============================================================================

#[test]
fn test_first_matching_type_wins() {
    let properties = memory_properties(&[
        Mem::DEVICE_LOCAL,
        Mem::HOST_VISIBLE | Mem::HOST_COHERENT,
        Mem::HOST_VISIBLE | Mem::HOST_COHERENT | Mem::HOST_CACHED,
    ]);

    let index = find_memory_type(&properties, 0b111, Mem::HOST_VISIBLE | Mem::HOST_COHERENT);
    assert_eq!(index, Some(1));
}

#[test]
fn test_type_bits_filter_candidates() {
    let properties = memory_properties(&[
        Mem::DEVICE_LOCAL,
        Mem::HOST_VISIBLE | Mem::HOST_COHERENT,
        Mem::HOST_VISIBLE | Mem::HOST_COHERENT | Mem::HOST_CACHED,
    ]);

    // Type 1 is not allowed by the resource
    let index = find_memory_type(&properties, 0b101, Mem::HOST_VISIBLE);
    assert_eq!(index, Some(2));
}

#[test]
fn test_flags_must_be_superset() {
    let properties = memory_properties(&[Mem::HOST_VISIBLE, Mem::DEVICE_LOCAL | Mem::HOST_VISIBLE]);

    let index = find_memory_type(&properties, 0b11, Mem::DEVICE_LOCAL | Mem::HOST_VISIBLE);
    assert_eq!(index, Some(1));
}

#[test]
fn test_no_matching_type() {
    let properties = memory_properties(&[Mem::DEVICE_LOCAL]);
    assert_eq!(find_memory_type(&properties, 0b1, Mem::HOST_VISIBLE), None);
    assert_eq!(find_memory_type(&properties, 0b0, Mem::DEVICE_LOCAL), None);
}

#[test]
fn test_types_past_count_ignored() {
    let mut properties = memory_properties(&[Mem::DEVICE_LOCAL]);
    properties.memory_types[1].property_flags = Mem::HOST_VISIBLE;

    assert_eq!(find_memory_type(&properties, 0b11, Mem::HOST_VISIBLE), None);
}

// ============================================================================
// LAYOUT TRANSITIONS
// ============================================================================

#[test]
fn test_undefined_to_transfer_dst() {
    let masks = transition_barrier_masks(
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )
    .unwrap();

    assert_eq!(masks.src_access, vk::AccessFlags::empty());
    assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
}

#[test]
fn test_transfer_dst_to_shader_read() {
    let masks = transition_barrier_masks(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )
    .unwrap();

    assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
    assert_eq!(masks.src_stage, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
}

#[test]
fn test_undefined_to_depth_attachment() {
    let masks = transition_barrier_masks(
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    )
    .unwrap();

    assert!(masks.dst_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
}

#[test]
fn test_unsupported_transition_rejected() {
    let result = transition_barrier_masks(
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_transition_aspect_masks() {
    assert_eq!(
        transition_aspect_mask(vk::Format::R8G8B8A8_SRGB, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
        vk::ImageAspectFlags::COLOR
    );
    assert_eq!(
        transition_aspect_mask(vk::Format::D32_SFLOAT, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        vk::ImageAspectFlags::DEPTH
    );
    assert_eq!(
        transition_aspect_mask(vk::Format::D24_UNORM_S8_UINT, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
}

// ============================================================================
// WRITE BOUNDS
// ============================================================================

#[test]
fn test_range_up_to_end_fits() {
    assert!(range_fits(0, 64, 64));
    assert!(range_fits(48, 16, 64));
    assert!(range_fits(64, 0, 64));
}

#[test]
fn test_range_past_end_rejected() {
    assert!(!range_fits(49, 16, 64));
    assert!(!range_fits(0, 65, 64));
    assert!(!range_fits(65, 0, 64));
}

#[test]
fn test_overflowing_range_rejected() {
    assert!(!range_fits(u64::MAX, 2, 64));
    assert!(!range_fits(2, u64::MAX, u64::MAX));
    assert!(!range_fits(u64::MAX, 1, u64::MAX));
}
