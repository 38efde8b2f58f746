/// BufferManager - device memory backed buffers and images, staging uploads
///
/// Memory type selection is first-match: the first type allowed by the
/// resource's requirements whose flags contain the requested flags. The
/// chosen index is handed to gpu-allocator as the only permitted type, so the
/// allocator sub-allocates from exactly that type.
///
/// Uploads go through a host-visible staging buffer and a one-shot command
/// buffer that is submitted and waited on before returning.

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use lumen_3d_engine::lumen3d::{Error, Result};
use lumen_3d_engine::{engine_bail_warn, engine_error, engine_trace};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::vulkan_device::DeviceManager;
use crate::vulkan_error::vk_error;
use crate::vulkan_swapchain::has_stencil_component;

/// Index of the first memory type allowed by `type_bits` that has all of `flags`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = memory_properties.memory_type_count as usize;
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(index, _)| index as u32)
}

/// Whether `len` bytes starting at `offset` lie inside a buffer of `size` bytes
pub fn range_fits(offset: vk::DeviceSize, len: vk::DeviceSize, size: vk::DeviceSize) -> bool {
    offset.checked_add(len).is_some_and(|end| end <= size)
}

/// Access and stage masks of an image layout transition barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the supported layout transitions
pub fn transition_barrier_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<BarrierMasks> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(BarrierMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(BarrierMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Ok(BarrierMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            })
        }
        (old, new) => Err(Error::InvalidResource(format!(
            "Unsupported layout transition: {:?} -> {:?}",
            old, new
        ))),
    }
}

/// Aspect mask touched by a transition into `new_layout`
pub fn transition_aspect_mask(format: vk::Format, new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Allocate memory of the first matching type for `requirements`
fn allocate(
    device: &DeviceManager,
    name: &str,
    mut requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    linear: bool,
) -> Result<Allocation> {
    let Some(type_index) =
        find_memory_type(device.memory_properties(), requirements.memory_type_bits, properties)
    else {
        engine_error!("lumen3d::vulkan", "Failed to find suitable memory type for {} ({:?})", name, properties);
        return Err(Error::InvalidResource(format!(
            "No memory type for {} with {:?}",
            name, properties
        )));
    };
    requirements.memory_type_bits = 1 << type_index;

    let mut allocator = device
        .allocator()
        .lock()
        .map_err(|_| Error::BackendError("GPU allocator lock poisoned".to_string()))?;
    allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            // The memory type is already fixed by memory_type_bits
            location: MemoryLocation::Unknown,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| {
            let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
            engine_error!("lumen3d::vulkan", "Out of GPU memory for {} ({:.2} MB): {:?}", name, size_mb, e);
            Error::OutOfMemory
        })
}

fn free(device: &DeviceManager, allocation: Allocation) {
    // Don't panic if the lock is poisoned, the handle still has to be destroyed
    if let Ok(mut allocator) = device.allocator().lock() {
        allocator.free(allocation).ok();
    }
}

/// A buffer and its memory; host-visible buffers stay mapped for their lifetime
pub struct Buffer {
    device: Arc<DeviceManager>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
}

impl Buffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .is_some()
    }

    /// Copy `data` into the mapped memory at `offset`
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        if !range_fits(offset, data.len() as vk::DeviceSize, self.size) {
            engine_bail_warn!("lumen3d::vulkan",
                "Buffer write of {} bytes at offset {} exceeds buffer size {}", data.len(), offset, self.size);
        }
        let mapped = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| Error::InvalidResource("Buffer is not host-visible".to_string()))?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped.as_ptr() as *mut u8).add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    /// Copy the mapped memory out
    pub fn read(&self) -> Result<Vec<u8>> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("Buffer has no allocation".to_string()))?;
        let slice = allocation
            .mapped_slice()
            .ok_or_else(|| Error::InvalidResource("Buffer is not host-visible".to_string()))?;
        Ok(slice[..self.size as usize].to_vec())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            free(&self.device, allocation);
        }
        unsafe {
            self.device.device().destroy_buffer(self.buffer, None);
        }
    }
}

/// An image and its memory
pub struct Image {
    device: Arc<DeviceManager>,
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            free(&self.device, allocation);
        }
        unsafe {
            self.device.device().destroy_image(self.image, None);
        }
    }
}

/// One persistently mapped uniform buffer per frame slot
pub struct UniformBuffers<T: Pod> {
    buffers: Vec<Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffers<T> {
    /// Overwrite the uniform block of `frame`
    pub fn write(&self, frame: usize, value: &T) -> Result<()> {
        let buffer = self.buffers.get(frame).ok_or_else(|| {
            Error::InvalidResource(format!(
                "Uniform buffer frame {} out of range (count: {})",
                frame,
                self.buffers.len()
            ))
        })?;
        buffer.write(0, bytemuck::bytes_of(value))
    }

    pub fn buffer(&self, frame: usize) -> Option<&Buffer> {
        self.buffers.get(frame)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Size of one uniform block
    pub fn block_size(&self) -> vk::DeviceSize {
        std::mem::size_of::<T>() as vk::DeviceSize
    }
}

/// Creates buffers and images and performs synchronous transfers
pub struct BufferManager {
    device: Arc<DeviceManager>,
    /// TRANSIENT pool for one-shot transfer command buffers
    upload_pool: Mutex<vk::CommandPool>,
}

impl BufferManager {
    pub fn new(device: Arc<DeviceManager>) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_families().graphics)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let upload_pool = unsafe {
            device
                .device()
                .create_command_pool(&create_info, None)
                .map_err(|e| vk_error("create upload command pool", e))?
        };

        Ok(Self {
            device,
            upload_pool: Mutex::new(upload_pool),
        })
    }

    pub fn device(&self) -> &Arc<DeviceManager> {
        &self.device
    }

    /// Allocate a primary command buffer and begin it for one submission
    pub fn begin_single_time_commands(&self) -> Result<vk::CommandBuffer> {
        let pool = self
            .upload_pool
            .lock()
            .map_err(|_| Error::BackendError("Upload command pool lock poisoned".to_string()))?;
        let device = self.device.device();

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        unsafe {
            let command_buffer = device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_error("allocate upload command buffer", e))?[0];

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            if let Err(e) = device.begin_command_buffer(command_buffer, &begin_info) {
                device.free_command_buffers(*pool, &[command_buffer]);
                return Err(vk_error("begin upload command buffer", e));
            }

            Ok(command_buffer)
        }
    }

    /// End, submit, wait for the graphics queue to idle and free the command buffer
    pub fn end_single_time_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let pool = self
            .upload_pool
            .lock()
            .map_err(|_| Error::BackendError("Upload command pool lock poisoned".to_string()))?;
        let device = self.device.device();
        let queue = self.device.graphics_queue();

        let result = unsafe {
            device
                .end_command_buffer(command_buffer)
                .map_err(|e| vk_error("end upload command buffer", e))
                .and_then(|_| {
                    let command_buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                    device
                        .queue_submit(queue, &[submit_info], vk::Fence::null())
                        .map_err(|e| vk_error("submit upload command buffer", e))
                })
                .and_then(|_| {
                    device
                        .queue_wait_idle(queue)
                        .map_err(|e| vk_error("wait for upload queue idle", e))
                })
        };

        unsafe {
            device.free_command_buffers(*pool, &[command_buffer]);
        }
        result
    }

    /// Record with `record`, then submit and wait
    fn one_shot(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let command_buffer = self.begin_single_time_commands()?;
        record(self.device.device(), command_buffer);
        self.end_single_time_commands(command_buffer)
    }

    /// Create a buffer whose memory has at least `properties`
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Buffer> {
        if size == 0 {
            engine_bail_warn!("lumen3d::vulkan", "Cannot create a zero-sized buffer");
        }
        let device = self.device.device();

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let buffer = device
                .create_buffer(&create_info, None)
                .map_err(|e| vk_error("create buffer", e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocation = match allocate(&self.device, "buffer", requirements, properties, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                free(&self.device, allocation);
                device.destroy_buffer(buffer, None);
                return Err(vk_error("bind buffer memory", e));
            }

            Ok(Buffer {
                device: Arc::clone(&self.device),
                buffer,
                allocation: Some(allocation),
                size,
            })
        }
    }

    /// Host-visible, coherent buffer holding a copy of `data`
    pub fn create_staging_buffer(&self, data: &[u8]) -> Result<Buffer> {
        let staging = self.create_buffer(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write(0, data)?;
        Ok(staging)
    }

    /// Device-local buffer filled through a staging copy
    pub fn create_device_local_buffer(&self, data: &[u8], usage: vk::BufferUsageFlags) -> Result<Buffer> {
        let staging = self.create_staging_buffer(data)?;
        let buffer = self.create_buffer(
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.copy_buffer(&staging, &buffer, data.len() as vk::DeviceSize)?;
        engine_trace!("lumen3d::vulkan", "Uploaded {} bytes to device-local buffer", data.len());
        Ok(buffer)
    }

    pub fn create_vertex_buffer<V: Pod>(&self, vertices: &[V]) -> Result<Buffer> {
        self.create_device_local_buffer(
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )
    }

    /// Index buffer from `u16` or `u32` indices
    pub fn create_index_buffer<I: Pod>(&self, indices: &[I]) -> Result<Buffer> {
        self.create_device_local_buffer(
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )
    }

    /// `count` mapped uniform buffers sized for `T` (one per frame slot)
    pub fn create_uniform_buffers<T: Pod>(&self, count: usize) -> Result<UniformBuffers<T>> {
        let size = std::mem::size_of::<T>() as vk::DeviceSize;
        let buffers = (0..count)
            .map(|_| {
                self.create_buffer(
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(UniformBuffers {
            buffers,
            _marker: PhantomData,
        })
    }

    /// Copy `size` bytes from `src` to `dst` and wait for completion
    pub fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> Result<()> {
        if size > src.size() || size > dst.size() {
            engine_bail_warn!("lumen3d::vulkan",
                "Copy of {} bytes exceeds buffer sizes (src: {}, dst: {})", size, src.size(), dst.size());
        }
        self.one_shot(|device, command_buffer| unsafe {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            device.cmd_copy_buffer(command_buffer, src.handle(), dst.handle(), &[region]);
        })
    }

    /// Read a buffer back through a host-visible copy
    pub fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>> {
        if buffer.is_mapped() {
            return buffer.read();
        }
        let readback = self.create_buffer(
            buffer.size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        self.copy_buffer(buffer, &readback, buffer.size())?;
        readback.read()
    }

    /// Create a 2D image whose memory has at least `properties`
    pub fn create_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Image> {
        if width == 0 || height == 0 {
            engine_bail_warn!("lumen3d::vulkan", "Cannot create a {}x{} image", width, height);
        }
        let device = self.device.device();

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let image = device
                .create_image(&create_info, None)
                .map_err(|e| vk_error("create image", e))?;

            let requirements = device.get_image_memory_requirements(image);
            let linear = tiling == vk::ImageTiling::LINEAR;
            let allocation = match allocate(&self.device, "image", requirements, properties, linear) {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                free(&self.device, allocation);
                device.destroy_image(image, None);
                return Err(vk_error("bind image memory", e));
            }

            Ok(Image {
                device: Arc::clone(&self.device),
                image,
                allocation: Some(allocation),
                format,
                extent: vk::Extent2D { width, height },
            })
        }
    }

    /// 2D view over the whole image; the caller destroys it
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        create_image_view(self.device.device(), image, format, aspect_mask)
    }

    /// Record and submit a layout transition barrier
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        let masks = transition_barrier_masks(old_layout, new_layout)?;

        self.one_shot(|device, command_buffer| unsafe {
            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: transition_aspect_mask(format, new_layout),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_access_mask(masks.src_access)
                .dst_access_mask(masks.dst_access);

            device.cmd_pipeline_barrier(
                command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }

    /// Copy tightly packed pixels from `buffer` into a TRANSFER_DST image
    pub fn copy_buffer_to_image(&self, buffer: &Buffer, image: vk::Image, width: u32, height: u32) -> Result<()> {
        self.one_shot(|device, command_buffer| unsafe {
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 });

            device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        if let Ok(pool) = self.upload_pool.get_mut() {
            unsafe {
                self.device.device().destroy_command_pool(*pool, None);
            }
        }
    }
}

/// 2D view over a single-level image
pub(crate) fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .create_image_view(&create_info, None)
            .map_err(|e| vk_error("create image view", e))
    }
}

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;
