//! Unit tests for vulkan_pipeline.rs
//!
//! Descriptor pool sizing and pipeline descriptions. Pipeline creation runs
//! in the ignored GPU tests.

use ash::vk;
use lumen_3d_engine::lumen3d::Error;

use crate::vulkan_pipeline::{
    descriptor_pool_sizes, descriptor_set_count, gui_max_sets, gui_pool_sizes, missing_bindings, DescriptorBinding,
    DescriptorSetLayoutDesc, PipelineInfo, GUI_DESCRIPTOR_TYPES, MAX_DESCRIPTOR_SETS,
};
use crate::vulkan_shader::ReflectedBinding;
use crate::vulkan_vertex::MeshVertex;

const VS: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;
const FS: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;

fn uniform_layout(bindings: &[u32]) -> DescriptorSetLayoutDesc {
    DescriptorSetLayoutDesc::new(
        bindings
            .iter()
            .map(|&b| DescriptorBinding::uniform_buffer(b, VS))
            .collect(),
    )
}

fn info() -> PipelineInfo {
    PipelineInfo::new(vec![0x0723_0203], vec![0x0723_0203])
}

// ============================================================================
// POOL SIZING
// ============================================================================

#[test]
fn test_pool_sized_for_every_frame() {
    // Two sets of two uniform buffers each, two frames in flight
    let layouts = [uniform_layout(&[0, 1]), uniform_layout(&[0, 1])];

    let sizes = descriptor_pool_sizes(&layouts, 2).unwrap();
    assert_eq!(sizes.len(), 1);
    assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(sizes[0].descriptor_count, 8);

    assert_eq!(descriptor_set_count(&layouts, 2).unwrap(), 4);
}

#[test]
fn test_pool_sizes_grouped_by_type() {
    let layouts = [
        DescriptorSetLayoutDesc::default()
            .with(DescriptorBinding::uniform_buffer(0, VS))
            .with(DescriptorBinding::combined_image_sampler(1, FS)),
        DescriptorSetLayoutDesc::default()
            .with(DescriptorBinding::new(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4, FS)),
    ];

    let sizes = descriptor_pool_sizes(&layouts, 3).unwrap();
    assert_eq!(sizes.len(), 2);
    assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(sizes[0].descriptor_count, 3);
    assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    assert_eq!(sizes[1].descriptor_count, 15);
    assert_eq!(descriptor_set_count(&layouts, 3).unwrap(), 6);
}

#[test]
fn test_no_layouts_no_pool() {
    assert!(descriptor_pool_sizes(&[], 2).unwrap().is_empty());
    assert_eq!(descriptor_set_count(&[], 2).unwrap(), 0);
}

#[test]
fn test_pool_size_overflow_rejected() {
    let layouts = [DescriptorSetLayoutDesc::default()
        .with(DescriptorBinding::new(0, vk::DescriptorType::STORAGE_BUFFER, u32::MAX, VS))];

    assert!(matches!(descriptor_pool_sizes(&layouts, 2), Err(Error::InvalidResource(_))));
    assert_eq!(descriptor_pool_sizes(&layouts, 1).unwrap()[0].descriptor_count, u32::MAX);
}

#[test]
fn test_pool_size_sum_overflow_rejected() {
    let half = u32::MAX / 2 + 1;
    let layouts = [
        DescriptorSetLayoutDesc::default().with(DescriptorBinding::new(0, vk::DescriptorType::STORAGE_BUFFER, half, VS)),
        DescriptorSetLayoutDesc::default().with(DescriptorBinding::new(0, vk::DescriptorType::STORAGE_BUFFER, half, VS)),
    ];

    assert!(matches!(descriptor_pool_sizes(&layouts, 1), Err(Error::InvalidResource(_))));
}

#[test]
fn test_gui_pool_sizes() {
    let sizes = gui_pool_sizes(1000);
    assert_eq!(sizes.len(), GUI_DESCRIPTOR_TYPES.len());
    assert!(sizes.iter().all(|s| s.descriptor_count == 1000));
    assert!(sizes.iter().any(|s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
}

#[test]
fn test_gui_max_sets() {
    assert_eq!(gui_max_sets(1000).unwrap(), 1000 * GUI_DESCRIPTOR_TYPES.len() as u32);
    assert!(matches!(gui_max_sets(u32::MAX), Err(Error::InvalidResource(_))));
}

// ============================================================================
// PIPELINE INFO
// ============================================================================

#[test]
fn test_pipeline_info_defaults() {
    let info = info();
    assert!(!info.depth_test);
    assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);
    assert_eq!(info.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
    assert!(info.vertex_input.bindings.is_empty());
    assert!(info.validate().is_ok());
}

#[test]
fn test_pipeline_info_builder() {
    let info = info()
        .vertex_layout::<MeshVertex>()
        .set_layout(uniform_layout(&[0]))
        .push_constant_range(VS, 0, 64)
        .depth_test(true)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE);

    assert_eq!(info.vertex_input.attributes.len(), 2);
    assert_eq!(info.set_layouts.len(), 1);
    assert_eq!(info.push_constant_ranges[0].size, 64);
    assert!(info.depth_test);
    assert_eq!(info.cull_mode, vk::CullModeFlags::NONE);
    assert_eq!(info.front_face, vk::FrontFace::CLOCKWISE);
}

#[test]
fn test_too_many_set_layouts() {
    let mut info = info();
    for _ in 0..=MAX_DESCRIPTOR_SETS {
        info = info.set_layout(uniform_layout(&[0]));
    }
    assert!(matches!(info.validate(), Err(Error::InvalidResource(_))));
}

#[test]
fn test_four_set_layouts_allowed() {
    let mut info = info();
    for _ in 0..MAX_DESCRIPTOR_SETS {
        info = info.set_layout(uniform_layout(&[0]));
    }
    assert!(info.validate().is_ok());
}

#[test]
fn test_invalid_layouts_rejected() {
    let empty = info().set_layout(DescriptorSetLayoutDesc::default());
    assert!(empty.validate().is_err());

    let duplicate = info().set_layout(uniform_layout(&[0, 0]));
    assert!(duplicate.validate().is_err());

    let zero_count = info().set_layout(DescriptorSetLayoutDesc::default().with(
        DescriptorBinding::new(0, vk::DescriptorType::UNIFORM_BUFFER, 0, VS),
    ));
    assert!(zero_count.validate().is_err());

    let no_fragment = PipelineInfo::new(vec![0x0723_0203], Vec::new());
    assert!(no_fragment.validate().is_err());
}

// ============================================================================
// REFLECTION CHECK
// ============================================================================

#[test]
fn test_missing_bindings_reported() {
    let layouts = [uniform_layout(&[0])];
    let reflected = vec![
        ReflectedBinding {
            name: "ubo".to_string(),
            set: 0,
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            stage_flags: VS,
        },
        ReflectedBinding {
            name: "albedo".to_string(),
            set: 0,
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags: FS,
        },
        ReflectedBinding {
            name: "material".to_string(),
            set: 2,
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            stage_flags: FS,
        },
    ];

    let missing = missing_bindings(&reflected, &layouts);
    let names: Vec<&str> = missing.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["albedo", "material"]);
}
