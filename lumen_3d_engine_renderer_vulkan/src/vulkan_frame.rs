/// VulkanFrameBackend - per-slot synchronization, command buffers and presentation
///
/// Each frame slot owns a fence (created signaled), an "image available"
/// semaphore, a "render finished" semaphore and a resettable primary command
/// buffer. The FrameScheduler decides the order of operations; this type
/// only performs them.

use ash::vk;
use bytemuck::Pod;
use lumen_3d_engine::lumen3d::frame::{AcquireOutcome, FrameBackend, PresentOutcome};
use lumen_3d_engine::lumen3d::{wait_for_drawable_size, Error, RendererConfig, Result, WindowSurface};
use lumen_3d_engine::{engine_bail, engine_debug, engine_trace};
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_device::DeviceManager;
use crate::vulkan_error::vk_error;
use crate::vulkan_pipeline::PipelineBinding;
use crate::vulkan_swapchain::PresentationManager;

/// Recording context handed to render commands
///
/// The render pass is already begun and the viewport and scissor cover the
/// whole swapchain extent.
pub struct RecordContext {
    device: ash::Device,
    command_buffer: vk::CommandBuffer,
    extent: vk::Extent2D,
    image_index: u32,
    frame_slot: usize,
}

impl RecordContext {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    /// Bind a pipeline with this slot's descriptor sets
    pub fn bind_pipeline(&self, binding: &PipelineBinding) {
        binding.record(&self.device, self.command_buffer, self.frame_slot);
    }

    pub fn bind_vertex_buffer(&self, buffer: &Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer.handle()], &[0]);
        }
    }

    pub fn bind_index_buffer(&self, buffer: &Buffer, index_type: vk::IndexType) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer.handle(), 0, index_type);
        }
    }

    pub fn push_constants<T: Pod>(&self, layout: vk::PipelineLayout, stage_flags: vk::ShaderStageFlags, offset: u32, value: &T) {
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                layout,
                stage_flags,
                offset,
                bytemuck::bytes_of(value),
            );
        }
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .cmd_draw(self.command_buffer, vertex_count, instance_count, 0, 0);
        }
    }

    pub fn draw_indexed(&self, index_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.command_buffer, index_count, instance_count, 0, 0, 0);
        }
    }
}

struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

/// Clear values for the color attachment and, when present, the depth attachment
pub fn clear_values(color: [f32; 4], depth: Option<f32>) -> Vec<vk::ClearValue> {
    let mut values = vec![vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }];
    if let Some(depth) = depth {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
        });
    }
    values
}

pub struct VulkanFrameBackend {
    device: Arc<DeviceManager>,
    presentation: PresentationManager,
    window: Arc<dyn WindowSurface>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    sync: Vec<FrameSync>,
    clear_color: [f32; 4],
    clear_depth: f32,
}

impl VulkanFrameBackend {
    pub fn new(
        device: Arc<DeviceManager>,
        presentation: PresentationManager,
        window: Arc<dyn WindowSurface>,
        config: &RendererConfig,
    ) -> Result<Self> {
        let frames = config.frames_in_flight;
        let vk_device = device.device();

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_families().graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe {
            vk_device
                .create_command_pool(&pool_info, None)
                .map_err(|e| vk_error("create frame command pool", e))?
        };

        let mut backend = Self {
            device: Arc::clone(&device),
            presentation,
            window,
            command_pool,
            command_buffers: Vec::new(),
            sync: Vec::with_capacity(frames),
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
        };

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames as u32);

        backend.command_buffers = unsafe {
            vk_device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_error("allocate frame command buffers", e))?
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        for _ in 0..frames {
            unsafe {
                let image_available = vk_device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| vk_error("create semaphore", e))?;
                let render_finished = match vk_device.create_semaphore(&semaphore_info, None) {
                    Ok(semaphore) => semaphore,
                    Err(e) => {
                        vk_device.destroy_semaphore(image_available, None);
                        return Err(vk_error("create semaphore", e));
                    }
                };
                let in_flight = match vk_device.create_fence(&fence_info, None) {
                    Ok(fence) => fence,
                    Err(e) => {
                        vk_device.destroy_semaphore(image_available, None);
                        vk_device.destroy_semaphore(render_finished, None);
                        return Err(vk_error("create fence", e));
                    }
                };
                backend.sync.push(FrameSync {
                    image_available,
                    render_finished,
                    in_flight,
                });
            }
        }

        engine_debug!("lumen3d::vulkan", "Frame backend ready ({} frames in flight)", frames);
        Ok(backend)
    }

    pub fn presentation(&self) -> &PresentationManager {
        &self.presentation
    }

    fn slot(&self, slot: usize) -> Result<&FrameSync> {
        self.sync
            .get(slot)
            .ok_or_else(|| Error::InvalidResource(format!("No frame slot {}", slot)))
    }

    fn command_buffer(&self, slot: usize) -> Result<vk::CommandBuffer> {
        self.command_buffers
            .get(slot)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("No command buffer for frame slot {}", slot)))
    }
}

impl FrameBackend for VulkanFrameBackend {
    type Commands = RecordContext;

    fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.slot(slot)?.in_flight;
        unsafe {
            self.device
                .device()
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| vk_error("wait for in-flight fence", e))
        }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_available;
        self.presentation.acquire_next_image(semaphore)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.slot(slot)?.in_flight;
        let command_buffer = self.command_buffer(slot)?;
        let device = self.device.device();
        unsafe {
            device
                .reset_fences(&[fence])
                .map_err(|e| vk_error("reset in-flight fence", e))?;
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error("reset frame command buffer", e))
        }
    }

    fn extent(&self) -> (u32, u32) {
        let extent = self.presentation.extent();
        (extent.width, extent.height)
    }

    fn begin_recording(&mut self, slot: usize, image_index: u32) -> Result<RecordContext> {
        let command_buffer = self.command_buffer(slot)?;
        let Some(framebuffer) = self.presentation.framebuffer(image_index) else {
            engine_bail!("lumen3d::vulkan", "No framebuffer for swapchain image {}", image_index);
        };
        let extent = self.presentation.extent();
        let device = self.device.device();

        let depth = self.presentation.depth_format().map(|_| self.clear_depth);
        let clear_values = clear_values(self.clear_color, depth);

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default();
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| vk_error("begin frame command buffer", e))?;

            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.presentation.render_pass())
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }

        engine_trace!("lumen3d::vulkan", "Recording slot {} into image {}", slot, image_index);
        Ok(RecordContext {
            device: device.clone(),
            command_buffer,
            extent,
            image_index,
            frame_slot: slot,
        })
    }

    fn end_recording(&mut self, _slot: usize, commands: RecordContext) -> Result<()> {
        unsafe {
            commands.device.cmd_end_render_pass(commands.command_buffer);
            commands
                .device
                .end_command_buffer(commands.command_buffer)
                .map_err(|e| vk_error("end frame command buffer", e))
        }
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let sync = self.slot(slot)?;
        let command_buffers = [self.command_buffer(slot)?];
        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device()
                .queue_submit(self.device.graphics_queue(), &[submit_info], sync.in_flight)
                .map_err(|e| vk_error("submit frame command buffer", e))
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let render_finished = self.slot(slot)?.render_finished;
        self.presentation
            .present(self.device.present_queue(), render_finished, image_index)
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        let size = wait_for_drawable_size(self.window.as_ref());
        self.presentation.recreate(size)
    }

    /// Replace the slot's fence and "image available" semaphore
    ///
    /// A failed frame can leave the fence unsignaled with nothing pending and
    /// the semaphore signaled by acquire with no wait queued on it. Neither
    /// can be returned to the initial state in place, so both are recreated
    /// once the device is idle.
    fn recover_slot(&mut self, slot: usize) -> Result<()> {
        let old = self.slot(slot)?;
        let (old_fence, old_semaphore) = (old.in_flight, old.image_available);
        let command_buffer = self.command_buffer(slot)?;
        let device = self.device.device();

        self.device.wait_idle()?;

        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        unsafe {
            let in_flight = device
                .create_fence(&fence_info, None)
                .map_err(|e| vk_error("recreate in-flight fence", e))?;
            let image_available = match device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_fence(in_flight, None);
                    return Err(vk_error("recreate image available semaphore", e));
                }
            };

            device.destroy_fence(old_fence, None);
            device.destroy_semaphore(old_semaphore, None);
            let sync = &mut self.sync[slot];
            sync.in_flight = in_flight;
            sync.image_available = image_available;

            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error("reset frame command buffer", e))?;
        }

        engine_debug!("lumen3d::vulkan", "Recovered frame slot {}", slot);
        Ok(())
    }
}

impl Drop for VulkanFrameBackend {
    fn drop(&mut self) {
        let device = self.device.device();
        unsafe {
            device.device_wait_idle().ok();
            for sync in self.sync.drain(..) {
                device.destroy_semaphore(sync.image_available, None);
                device.destroy_semaphore(sync.render_finished, None);
                device.destroy_fence(sync.in_flight, None);
            }
            // Frees the command buffers
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_frame_tests.rs"]
mod tests;
