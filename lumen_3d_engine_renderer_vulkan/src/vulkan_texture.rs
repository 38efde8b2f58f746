/// Sampled RGBA textures uploaded through a staging buffer

use ash::vk;
use lumen_3d_engine::lumen3d::Result;
use lumen_3d_engine::{engine_bail_warn, engine_debug};
use std::sync::Arc;

use crate::vulkan_buffer::{BufferManager, Image};
use crate::vulkan_device::DeviceManager;
use crate::vulkan_error::vk_error;

/// Texel format of every texture created by `create_texture`
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Bytes needed for a tightly packed RGBA8 image
pub fn rgba_size(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

/// Check `len` bytes against a `width`x`height` RGBA8 image
pub fn validate_rgba(width: u32, height: u32, len: usize) -> Result<()> {
    if width == 0 || height == 0 {
        engine_bail_warn!("lumen3d::vulkan", "Cannot create a {}x{} texture", width, height);
    }
    match rgba_size(width, height) {
        Some(expected) if expected == len => Ok(()),
        Some(expected) => {
            engine_bail_warn!("lumen3d::vulkan",
                "Texture data is {} bytes, a {}x{} RGBA texture needs {}",
                len, width, height, expected);
        }
        None => {
            engine_bail_warn!("lumen3d::vulkan", "Texture size {}x{} overflows", width, height);
        }
    }
}

/// Image, view and linear sampler; all released on drop
pub struct Texture {
    device: Arc<DeviceManager>,
    image: Image,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.device();
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
        }
        // Image memory goes with `self.image`
    }
}

impl BufferManager {
    /// Upload tightly packed RGBA8 pixels into a sampled texture
    ///
    /// UNDEFINED -> TRANSFER_DST -> copy -> SHADER_READ_ONLY, then the staging
    /// buffer is freed.
    pub fn create_texture(&self, width: u32, height: u32, rgba: &[u8]) -> Result<Texture> {
        validate_rgba(width, height, rgba.len())?;

        let staging = self.create_staging_buffer(rgba)?;
        let image = self.create_image(
            width,
            height,
            TEXTURE_FORMAT,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        self.transition_image_layout(
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        self.copy_buffer_to_image(&staging, image.handle(), width, height)?;
        self.transition_image_layout(
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        drop(staging);

        let view = self.create_image_view(image.handle(), TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?;
        let sampler = match create_linear_sampler(self.device().device()) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe {
                    self.device().device().destroy_image_view(view, None);
                }
                return Err(e);
            }
        };

        engine_debug!("lumen3d::vulkan", "Texture created ({}x{})", width, height);
        Ok(Texture {
            device: Arc::clone(self.device()),
            image,
            view,
            sampler,
        })
    }
}

fn create_linear_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .anisotropy_enable(false)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .unnormalized_coordinates(false);

    unsafe {
        device
            .create_sampler(&create_info, None)
            .map_err(|e| vk_error("create texture sampler", e))
    }
}

#[cfg(test)]
#[path = "vulkan_texture_tests.rs"]
mod tests;
