/// PresentationManager - swapchain, image views, depth buffer, render pass and framebuffers
///
/// The render pass is created once and survives recreation, so pipelines
/// built against it stay valid. Everything sized from the surface (swapchain,
/// views, depth image, framebuffers) is destroyed and built again on
/// `recreate`; the old swapchain is never passed as `old_swapchain`.

use ash::vk;
use lumen_3d_engine::lumen3d::frame::{AcquireOutcome, PresentOutcome};
use lumen_3d_engine::lumen3d::{Error, PresentModePreference, RendererConfig, Result};
use lumen_3d_engine::{engine_debug, engine_error, engine_info};
use std::sync::Arc;

use crate::vulkan_buffer::{BufferManager, Image};
use crate::vulkan_device::{DeviceManager, QueueFamilies};
use crate::vulkan_error::vk_error;

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

// ===== PURE CHOOSERS =====

/// Preferred (format, color space) pair, else the first reported one
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR], srgb: bool) -> Result<vk::SurfaceFormatKHR> {
    let preferred = if srgb {
        vk::Format::B8G8R8A8_SRGB
    } else {
        vk::Format::B8G8R8A8_UNORM
    };

    formats
        .iter()
        .find(|f| f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| Error::UnsupportedFormat("Surface reports no formats".to_string()))
}

/// Preferred present mode if available, else FIFO (always supported)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], preference: PresentModePreference) -> vk::PresentModeKHR {
    let preferred = match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };

    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the framebuffer size clamped to the capability bounds
/// when the surface leaves the extent undefined (`u32::MAX`)
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more image than the minimum, capped by the maximum (0 means unbounded)
pub fn clamp_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// First candidate whose tiling features contain `features`
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| {
            engine_error!("lumen3d::vulkan", "Failed to find supported format among {:?}", candidates);
            Error::UnsupportedFormat(format!("None of {:?} supports {:?}", candidates, features))
        })
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Image sharing mode and the queue families that share the images
pub fn image_sharing(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![families.graphics, families.present])
    }
}

/// Attachments of the presentation render pass: color, then optional depth
pub fn render_pass_attachments(
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
) -> Vec<vk::AttachmentDescription> {
    let mut attachments = vec![vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    if let Some(depth_format) = depth_format {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    attachments
}

/// Dependency making the subpass wait for the acquired image
pub fn render_pass_dependency(with_depth: bool) -> vk::SubpassDependency {
    let (stage, access) = if with_depth {
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
    } else {
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
    };

    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stage)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stage)
        .dst_access_mask(access)
}

// ===== PRESENTATION MANAGER =====

struct DepthResource {
    image: Image,
    view: vk::ImageView,
}

pub struct PresentationManager {
    device: Arc<DeviceManager>,
    buffers: Arc<BufferManager>,
    swapchain_loader: ash::khr::swapchain::Device,

    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Option<DepthResource>,
    framebuffers: Vec<vk::Framebuffer>,

    /// Kept across recreation
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: Option<vk::Format>,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    min_image_count: u32,

    present_preference: PresentModePreference,
    generation: u64,
}

impl PresentationManager {
    /// Build the swapchain for `framebuffer_size` and the render pass used with it
    pub fn new(
        device: Arc<DeviceManager>,
        buffers: Arc<BufferManager>,
        config: &RendererConfig,
        framebuffer_size: (u32, u32),
    ) -> Result<Self> {
        let support = device.query_swapchain_support()?;
        let surface_format = choose_surface_format(&support.formats, config.srgb_surface)?;

        let depth_format = if config.enable_depth {
            Some(find_supported_format(
                &DEPTH_FORMAT_CANDIDATES,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                |format| device.format_properties(format),
            )?)
        } else {
            None
        };

        let render_pass = create_render_pass(device.device(), surface_format.format, depth_format)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(device.instance(), device.device());

        let mut manager = Self {
            device,
            buffers,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            depth: None,
            framebuffers: Vec::new(),
            render_pass,
            surface_format,
            depth_format,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            min_image_count: 0,
            present_preference: config.preferred_present_mode,
            generation: 0,
        };

        // On failure Drop releases whatever was built so far
        manager.create_swapchain_resources(framebuffer_size)?;
        Ok(manager)
    }

    /// Wait for the device, destroy every size-dependent object and build them again
    ///
    /// `framebuffer_size` must be non-zero; callers wait for a drawable size first.
    pub fn recreate(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        self.device.wait_idle()?;
        self.destroy_swapchain_resources();
        self.create_swapchain_resources(framebuffer_size)?;
        self.generation += 1;
        engine_debug!("lumen3d::vulkan", "Swapchain recreated (generation {})", self.generation);
        Ok(())
    }

    fn create_swapchain_resources(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        let support = self.device.query_swapchain_support()?;
        let capabilities = support.capabilities;

        let present_mode = choose_present_mode(&support.present_modes, self.present_preference);
        let extent = choose_extent(&capabilities, framebuffer_size);
        let image_count = clamp_image_count(&capabilities);
        let (sharing_mode, family_indices) = image_sharing(self.device.queue_families());

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.device.surface())
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let device = self.device.device();
        unsafe {
            self.swapchain = self
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| vk_error("create swapchain", e))?;

            self.images = self
                .swapchain_loader
                .get_swapchain_images(self.swapchain)
                .map_err(|e| vk_error("get swapchain images", e))?;
        }

        self.present_mode = present_mode;
        self.extent = extent;
        self.min_image_count = image_count;

        for &image in &self.images {
            let view = self.buffers.create_image_view(
                image,
                self.surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            self.image_views.push(view);
        }

        if let Some(depth_format) = self.depth_format {
            let image = self.buffers.create_image(
                extent.width,
                extent.height,
                depth_format,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            let handle = image.handle();
            let view = self.buffers.create_image_view(
                handle,
                depth_format,
                vk::ImageAspectFlags::DEPTH,
            )?;
            self.depth = Some(DepthResource { image, view });
            self.buffers.transition_image_layout(
                handle,
                depth_format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )?;
        }

        let depth_view = self.depth.as_ref().map(|d| d.view);
        for &view in &self.image_views {
            let attachments: Vec<vk::ImageView> = std::iter::once(view).chain(depth_view).collect();
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .create_framebuffer(&framebuffer_info, None)
                    .map_err(|e| vk_error("create framebuffer", e))?
            };
            self.framebuffers.push(framebuffer);
        }

        engine_info!("lumen3d::vulkan",
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width, extent.height, self.images.len(), self.surface_format.format, present_mode);
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        let device = self.device.device();
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            if let Some(depth) = self.depth.take() {
                device.destroy_image_view(depth.view, None);
                // Image memory is released when `depth.image` drops
            }
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }

    /// Acquire the next image, signaling `semaphore`
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        unsafe {
            match self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            ) {
                Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
                Err(e) => Err(vk_error("acquire swapchain image", e)),
            }
        }
    }

    /// Present `image_index` once `wait_semaphore` is signaled
    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, image_index: u32) -> Result<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            match self.swapchain_loader.queue_present(queue, &present_info) {
                Ok(false) => Ok(PresentOutcome::Presented),
                Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
                Err(e) => Err(vk_error("present swapchain image", e)),
            }
        }
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.surface_format.color_space
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image count requested at creation
    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index as usize).copied()
    }

    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth_format
    }

    /// Incremented by every `recreate`
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PresentationManager {
    fn drop(&mut self) {
        self.device.wait_idle().ok();
        self.destroy_swapchain_resources();
        unsafe {
            self.device.device().destroy_render_pass(self.render_pass, None);
        }
    }
}

fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
) -> Result<vk::RenderPass> {
    let attachments = render_pass_attachments(color_format, depth_format);

    let color_ref = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref);
    if depth_format.is_some() {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }

    let dependency = render_pass_dependency(depth_format.is_some());

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| vk_error("create render pass", e))
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
