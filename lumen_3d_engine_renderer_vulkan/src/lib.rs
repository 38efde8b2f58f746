/*!
# Lumen 3D Engine - Vulkan Renderer Backend

Vulkan rendering core built on Ash and gpu-allocator:

- `DeviceManager`: instance, surface, physical and logical device, queues
- `PresentationManager`: swapchain, depth buffer, render pass and framebuffers
- `PipelineManager`: named graphics pipelines with their descriptor sets
- `BufferManager`: buffers, images, textures and staging uploads
- `VulkanFrameBackend`: the per-slot fences, semaphores and command buffers
  driven by the engine's `FrameScheduler`

`VulkanRenderer` wires them together in the right order.

```no_run
use std::sync::Arc;
use lumen_3d_engine::lumen3d::RendererConfig;
use lumen_3d_engine_renderer_vulkan::VulkanRenderer;
# fn run(window: Arc<winit::window::Window>) -> lumen_3d_engine::lumen3d::Result<()> {
let mut renderer = VulkanRenderer::new(window, RendererConfig::default())?;
renderer.submit(|ctx, _frame| ctx.draw(3, 1));
renderer.draw_frame()?;
# Ok(()) }
```

Validation layers and the debug messenger are only compiled in with the
`vulkan-validation` feature.
*/

mod vulkan_error;
#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;

mod vulkan_device;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_swapchain;
mod vulkan_shader;
mod vulkan_vertex;
mod vulkan_pipeline;
mod vulkan_frame;
mod vulkan_renderer;

pub use vulkan_device::{
    DeviceManager, QueueFamilies, QueueFamilyIndices, SwapchainSupport, REQUIRED_DEVICE_EXTENSIONS,
};
pub use vulkan_buffer::{find_memory_type, Buffer, BufferManager, Image, UniformBuffers};
pub use vulkan_texture::{Texture, TEXTURE_FORMAT};
pub use vulkan_swapchain::{
    choose_extent, choose_present_mode, choose_surface_format, clamp_image_count,
    find_supported_format, has_stencil_component, PresentationManager, DEPTH_FORMAT_CANDIDATES,
};
pub use vulkan_shader::{load_spirv, read_shader_file, spirv_words, ReflectedBinding, ShaderModule};
pub use vulkan_vertex::{ColorVertex, MeshVertex, VertexInput, VertexLayout};
pub use vulkan_pipeline::{
    descriptor_pool_sizes, descriptor_set_count, DescriptorBinding, DescriptorSetLayoutDesc,
    Pipeline, PipelineBinding, PipelineInfo, PipelineKey, PipelineManager, MAX_DESCRIPTOR_SETS,
};
pub use vulkan_frame::{RecordContext, VulkanFrameBackend};
pub use vulkan_renderer::{GuiInitInfo, VulkanRenderer};

#[cfg(feature = "vulkan-validation")]
pub use vulkan_debug::{print_validation_stats_report, validation_stats};
