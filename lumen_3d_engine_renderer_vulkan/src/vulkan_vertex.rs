/// Vertex formats and their input descriptions

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

/// A vertex type the pipeline can describe to the input assembler
pub trait VertexLayout: Pod {
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

/// Binding and attribute descriptions for a pipeline's vertex input
#[derive(Debug, Clone, Default)]
pub struct VertexInput {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInput {
    /// Single interleaved binding of `V`
    pub fn of<V: VertexLayout>() -> Self {
        Self {
            bindings: vec![V::binding_description()],
            attributes: V::attribute_descriptions(),
        }
    }

    /// No vertex buffers (vertices generated in the shader)
    pub fn empty() -> Self {
        Self::default()
    }
}

/// 2D position with a per-vertex colour
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: Vec2,
    pub colour: Vec3,
}

impl ColorVertex {
    pub fn new(position: Vec2, colour: Vec3) -> Self {
        Self { position, colour }
    }
}

impl VertexLayout for ColorVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(ColorVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(ColorVertex, colour) as u32,
            },
        ]
    }
}

/// 3D position with texture coordinates
///
/// Texture coordinates sit at location 2 so shaders can share location 1
/// with `ColorVertex` layouts for a colour input.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: Vec3,
    pub tex_coord: Vec2,
}

impl MeshVertex {
    pub fn new(position: Vec3, tex_coord: Vec2) -> Self {
        Self { position, tex_coord }
    }
}

impl VertexLayout for MeshVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(MeshVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(MeshVertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
#[path = "vulkan_vertex_tests.rs"]
mod tests;
