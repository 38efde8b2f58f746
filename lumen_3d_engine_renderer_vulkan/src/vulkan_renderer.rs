/// VulkanRenderer - owns the device, resource, pipeline and frame managers
///
/// Construction order: device, buffer manager, presentation, pipelines,
/// frame backend and scheduler. Fields are declared so that they drop in
/// reverse dependency order, with the device last.

use ash::vk;
use lumen_3d_engine::lumen3d::frame::{FrameInfo, FrameOverlay, FrameScheduler, FrameStatus, RenderQueue};
use lumen_3d_engine::lumen3d::{wait_for_drawable_size, RendererConfig, Result, WindowSurface};
use lumen_3d_engine::engine_info;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use crate::vulkan_buffer::BufferManager;
use crate::vulkan_device::DeviceManager;
use crate::vulkan_frame::{RecordContext, VulkanFrameBackend};
use crate::vulkan_pipeline::PipelineManager;
use crate::vulkan_swapchain::PresentationManager;

/// Handles a GUI library needs to initialize its Vulkan backend
#[derive(Debug, Clone, Copy)]
pub struct GuiInitInfo {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue_family: u32,
    pub queue: vk::Queue,
    pub descriptor_pool: vk::DescriptorPool,
    pub render_pass: vk::RenderPass,
    pub min_image_count: u32,
    pub image_count: u32,
}

pub struct VulkanRenderer {
    pipelines: PipelineManager,
    scheduler: FrameScheduler<VulkanFrameBackend>,
    buffers: Arc<BufferManager>,
    device: Arc<DeviceManager>,
    config: RendererConfig,
}

impl VulkanRenderer {
    /// Create a renderer drawing into `window`
    ///
    /// Blocks while the window is minimized. Failures before the swapchain
    /// exists are `InitializationFailed`.
    pub fn new<W>(window: Arc<W>, config: RendererConfig) -> Result<Self>
    where
        W: WindowSurface + HasDisplayHandle + HasWindowHandle + 'static,
    {
        config.validate()?;

        let device = Arc::new(DeviceManager::new(window.as_ref(), &config)?);
        let buffers = Arc::new(BufferManager::new(Arc::clone(&device))?);

        let size = wait_for_drawable_size(window.as_ref());
        let presentation = PresentationManager::new(Arc::clone(&device), Arc::clone(&buffers), &config, size)?;

        let pipelines = PipelineManager::new(
            Arc::clone(&device),
            presentation.render_pass(),
            config.frames_in_flight,
            config.gui_descriptor_pool_size,
        )?;

        let window: Arc<dyn WindowSurface> = window;
        let backend = VulkanFrameBackend::new(Arc::clone(&device), presentation, window, &config)?;
        let scheduler = FrameScheduler::new(backend)?;

        engine_info!("lumen3d::vulkan",
            "Renderer ready on {} ({} frames in flight)", device.device_name(), config.frames_in_flight);

        Ok(Self {
            pipelines,
            scheduler,
            buffers,
            device,
            config,
        })
    }

    /// Queue a scene command for the next frame
    pub fn submit<F>(&mut self, command: F)
    where
        F: FnOnce(&mut RecordContext, &FrameInfo) + Send + 'static,
    {
        self.scheduler.submit(command);
    }

    /// Queue a UI command, recorded after every scene command
    pub fn submit_ui<F>(&mut self, command: F)
    where
        F: FnOnce(&mut RecordContext, &FrameInfo) + Send + 'static,
    {
        self.scheduler.submit_ui(command);
    }

    pub fn queue_mut(&mut self) -> &mut RenderQueue<RecordContext> {
        self.scheduler.queue_mut()
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn FrameOverlay<RecordContext>>) {
        self.scheduler.set_overlay(overlay);
    }

    pub fn clear_overlay(&mut self) {
        self.scheduler.clear_overlay();
    }

    /// Record, submit and present one frame
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        self.scheduler.draw_frame()
    }

    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.scheduler.on_resize(width, height)
    }

    pub fn current_frame(&self) -> usize {
        self.scheduler.current_frame()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.scheduler.frames_in_flight()
    }

    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_count()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.presentation().extent()
    }

    pub fn presentation(&self) -> &PresentationManager {
        self.scheduler.backend().presentation()
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut PipelineManager {
        &mut self.pipelines
    }

    pub fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    pub fn device(&self) -> &Arc<DeviceManager> {
        &self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    pub fn gui_init_info(&self) -> GuiInitInfo {
        let presentation = self.presentation();
        GuiInitInfo {
            instance: self.device.instance().handle(),
            physical_device: self.device.physical_device(),
            device: self.device.device().handle(),
            queue_family: self.device.queue_families().graphics,
            queue: self.device.graphics_queue(),
            descriptor_pool: self.pipelines.gui_descriptor_pool(),
            render_pass: presentation.render_pass(),
            min_image_count: presentation.min_image_count(),
            image_count: presentation.image_count() as u32,
        }
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        self.device.wait_idle().ok();
    }
}
