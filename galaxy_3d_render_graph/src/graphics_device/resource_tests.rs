/// Tests for resource descriptors and resource states

use super::*;

// ============================================================================
// ResourceDesc Tests
// ============================================================================

#[test]
fn test_buffer_has_single_subresource() {
    let desc = ResourceDesc::buffer(4096);
    assert_eq!(desc.subresource_count(), 1);
    assert_eq!(desc.array_size(), 1);
    assert_eq!(desc.plane_count(), 1);
}

#[test]
fn test_texture_subresource_count() {
    let desc = ResourceDesc::texture_2d(256, 256, Format::R8G8B8A8_UNORM)
        .with_mip_levels(4)
        .with_array_size(3);
    assert_eq!(desc.subresource_count(), 12);
}

#[test]
fn test_depth_stencil_has_two_planes() {
    let desc = ResourceDesc::texture_2d(64, 64, Format::D24_UNORM_S8_UINT).with_mip_levels(2);
    assert_eq!(desc.plane_count(), 2);
    assert_eq!(desc.subresource_count(), 4);
    assert_eq!(desc.subresource_index(1, 0, 1), 3);
}

#[test]
fn test_subresource_index_layout() {
    let desc = ResourceDesc::texture_2d(16, 16, Format::R32_FLOAT)
        .with_mip_levels(3)
        .with_array_size(2);
    assert_eq!(desc.subresource_index(0, 0, 0), 0);
    assert_eq!(desc.subresource_index(2, 0, 0), 2);
    assert_eq!(desc.subresource_index(0, 1, 0), 3);
    assert_eq!(desc.subresource_index(2, 1, 0), 5);
}

#[test]
fn test_texture_3d_slices_are_not_subresources() {
    let desc = ResourceDesc::texture_3d(32, 32, 8, Format::R16G16B16A16_FLOAT)
        .with_array_size(4);
    assert_eq!(desc.depth(), 8);
    assert_eq!(desc.array_size(), 1);
    assert_eq!(desc.subresource_count(), 1);
}

// ============================================================================
// ResourceStates Tests
// ============================================================================

#[test]
fn test_write_states() {
    assert!(ResourceStates::RENDER_TARGET.is_write());
    assert!(ResourceStates::UNORDERED_ACCESS.is_write());
    assert!(ResourceStates::COPY_DEST.is_write());
    assert!(!ResourceStates::PIXEL_SHADER_RESOURCE.is_write());
    assert!(!ResourceStates::GENERIC_READ.is_write());
    assert!(!ResourceStates::COMMON.is_write());
}

#[test]
fn test_invalid_combination() {
    assert!((ResourceStates::RENDER_TARGET | ResourceStates::PIXEL_SHADER_RESOURCE).is_invalid_combination());
    assert!(!ResourceStates::RENDER_TARGET.is_invalid_combination());
    assert!(!ResourceStates::ALL_SHADER_RESOURCE.is_invalid_combination());
}
