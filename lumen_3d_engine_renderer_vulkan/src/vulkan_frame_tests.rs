use crate::vulkan_frame::clear_values;

#[test]
fn test_color_only_clear_values() {
    let values = clear_values([0.1, 0.2, 0.3, 1.0], None);
    assert_eq!(values.len(), 1);
    unsafe {
        assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
    }
}

#[test]
fn test_depth_clear_value_follows_color() {
    let values = clear_values([0.0, 0.0, 0.0, 1.0], Some(1.0));
    assert_eq!(values.len(), 2);
    unsafe {
        assert_eq!(values[1].depth_stencil.depth, 1.0);
        assert_eq!(values[1].depth_stencil.stencil, 0);
    }
}
