/// Shader loading: SPIR-V files, shader modules and descriptor reflection

use ash::vk;
use lumen_3d_engine::lumen3d::{Error, Result};
use lumen_3d_engine::{
    engine_bail, engine_bail_warn, engine_err, engine_error, engine_trace, engine_warn_err,
};
use std::io::Cursor;
use std::path::Path;

use crate::vulkan_error::vk_error;

/// Read a compiled shader from disk
pub fn read_shader_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| {
        engine_error!("lumen3d::vulkan", "Failed to read shader file '{}': {}", path.display(), e);
        Error::Io(format!("{}: {}", path.display(), e))
    })
}

/// Convert raw bytes to SPIR-V words, checking size and magic number
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| engine_warn_err!("lumen3d::vulkan", "Invalid SPIR-V bytecode: {}", e))
}

/// `read_shader_file` followed by `spirv_words`
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    spirv_words(&read_shader_file(path)?)
}

/// A compiled shader module, destroyed on drop
pub struct ShaderModule {
    device: ash::Device,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    pub fn new(device: &ash::Device, code: &[u32], stage: vk::ShaderStageFlags) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(|e| vk_error("create shader module", e))?
        };
        engine_trace!("lumen3d::vulkan", "Shader module created ({:?}, {} words)", stage, code.len());

        Ok(Self {
            device: device.clone(),
            module,
            stage,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

// ===== REFLECTION =====

/// A descriptor a shader actually uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
}

/// Descriptors referenced by the entry points of `code`
pub fn reflect_descriptor_bindings(code: &[u32], stage: vk::ShaderStageFlags) -> Result<Vec<ReflectedBinding>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!("lumen3d::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    let mut bindings: Vec<ReflectedBinding> = Vec::new();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            if let spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, .. } = var {
                let descriptor_type = spirq_descriptor_type(desc_ty.clone())?;
                let (set, binding) = (desc_bind.set(), desc_bind.bind());
                // Several entry points may reference the same resource
                if bindings.iter().any(|b| b.set == set && b.binding == binding) {
                    continue;
                }
                bindings.push(ReflectedBinding {
                    name: name.clone().unwrap_or_default(),
                    set,
                    binding,
                    descriptor_type,
                    stage_flags: stage,
                });
            }
        }
    }

    Ok(bindings)
}

fn spirq_descriptor_type(desc_ty: spirq::ty::DescriptorType) -> Result<vk::DescriptorType> {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => Ok(vk::DescriptorType::UNIFORM_BUFFER),
        DescriptorType::StorageBuffer(..) => Ok(vk::DescriptorType::STORAGE_BUFFER),
        DescriptorType::CombinedImageSampler() => Ok(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        DescriptorType::SampledImage() => Ok(vk::DescriptorType::SAMPLED_IMAGE),
        DescriptorType::Sampler() => Ok(vk::DescriptorType::SAMPLER),
        other => {
            engine_bail!("lumen3d::vulkan", "Unsupported SPIR-V descriptor type: {:?}", other);
        }
    }
}

/// Merge per-stage reflections; a slot used by both stages must agree on its type
pub fn merge_reflections(stages: &[Vec<ReflectedBinding>]) -> Result<Vec<ReflectedBinding>> {
    let mut merged: Vec<ReflectedBinding> = Vec::new();

    for binding in stages.iter().flatten() {
        match merged
            .iter_mut()
            .find(|b| b.set == binding.set && b.binding == binding.binding)
        {
            Some(existing) => {
                if existing.descriptor_type != binding.descriptor_type {
                    engine_bail_warn!("lumen3d::vulkan",
                        "Binding '{}' (set={}, binding={}) is {:?} in one stage and {:?} in another",
                        existing.name, existing.set, existing.binding,
                        existing.descriptor_type, binding.descriptor_type);
                }
                existing.stage_flags |= binding.stage_flags;
            }
            None => merged.push(binding.clone()),
        }
    }

    Ok(merged)
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
