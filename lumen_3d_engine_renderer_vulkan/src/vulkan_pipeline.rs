/// PipelineManager - named graphics pipelines with their descriptor layouts, pools and sets
///
/// Building a pipeline:
/// 1. Descriptor set layouts from the declared bindings
/// 2. Shader modules linked into one graphics pipeline against the presentation render pass
/// 3. A descriptor pool sized for every frame slot
/// 4. One descriptor set per layout per frame slot
///
/// A separate descriptor pool is kept for the GUI overlay, outside the named pipelines.

use ash::vk;
use bytemuck::Pod;
use lumen_3d_engine::lumen3d::{Error, Result};
use lumen_3d_engine::{engine_bail_warn, engine_debug, engine_info, engine_warn, engine_warn_err};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use crate::vulkan_buffer::{Buffer, UniformBuffers};
use crate::vulkan_device::DeviceManager;
use crate::vulkan_error::vk_error;
use crate::vulkan_shader::{load_spirv, merge_reflections, reflect_descriptor_bindings, ReflectedBinding, ShaderModule};
use crate::vulkan_texture::Texture;
use crate::vulkan_vertex::{VertexInput, VertexLayout};

/// Maximum number of descriptor set layouts per pipeline
pub const MAX_DESCRIPTOR_SETS: usize = 4;

const ENTRY_POINT: &CStr = c"main";

/// Descriptor types reserved in the GUI pool
pub const GUI_DESCRIPTOR_TYPES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

new_key_type! {
    /// Stable key of a pipeline inside a PipelineManager
    pub struct PipelineKey;
}

// ===== DESCRIPTIONS =====

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn new(binding: u32, descriptor_type: vk::DescriptorType, count: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            descriptor_type,
            count,
            stage_flags,
        }
    }

    pub fn uniform_buffer(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    pub fn combined_image_sampler(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1, stage_flags)
    }
}

/// Bindings of one descriptor set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutDesc {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutDesc {
    pub fn new(bindings: Vec<DescriptorBinding>) -> Self {
        Self { bindings }
    }

    pub fn with(mut self, binding: DescriptorBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn get(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

/// Everything needed to build a graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_input: VertexInput,
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub depth_test: bool,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl PipelineInfo {
    /// Triangle list, back-face culling, counter-clockwise front faces, no depth test
    pub fn new(vertex_shader: Vec<u32>, fragment_shader: Vec<u32>) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            vertex_input: VertexInput::empty(),
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            depth_test: false,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }

    /// Load both stages from compiled SPIR-V files
    pub fn from_files(vertex_path: impl AsRef<Path>, fragment_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_spirv(vertex_path)?, load_spirv(fragment_path)?))
    }

    pub fn vertex_layout<V: VertexLayout>(mut self) -> Self {
        self.vertex_input = VertexInput::of::<V>();
        self
    }

    pub fn vertex_input(mut self, vertex_input: VertexInput) -> Self {
        self.vertex_input = vertex_input;
        self
    }

    /// Append a descriptor set layout; its set index is its position
    pub fn set_layout(mut self, layout: DescriptorSetLayoutDesc) -> Self {
        self.set_layouts.push(layout);
        self
    }

    pub fn push_constant_range(mut self, stage_flags: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags,
            offset,
            size,
        });
        self
    }

    pub fn depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.vertex_shader.is_empty() || self.fragment_shader.is_empty() {
            engine_bail_warn!("lumen3d::vulkan", "Pipeline needs both a vertex and a fragment shader");
        }
        if self.set_layouts.len() > MAX_DESCRIPTOR_SETS {
            engine_bail_warn!("lumen3d::vulkan",
                "Pipeline declares {} descriptor set layouts, at most {} are supported",
                self.set_layouts.len(), MAX_DESCRIPTOR_SETS);
        }
        for (set, layout) in self.set_layouts.iter().enumerate() {
            if layout.bindings.is_empty() {
                engine_bail_warn!("lumen3d::vulkan", "Descriptor set {} has no bindings", set);
            }
            for (i, binding) in layout.bindings.iter().enumerate() {
                if binding.count == 0 {
                    engine_bail_warn!("lumen3d::vulkan",
                        "Binding {} of set {} has a descriptor count of 0", binding.binding, set);
                }
                if layout.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                    engine_bail_warn!("lumen3d::vulkan",
                        "Binding {} is declared twice in set {}", binding.binding, set);
                }
            }
        }
        Ok(())
    }
}

// ===== POOL SIZING =====

/// `a * b` as a descriptor count, or `InvalidResource` when it does not fit in `u32`
fn checked_count(a: usize, b: usize, what: &str) -> Result<u32> {
    a.checked_mul(b)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| engine_warn_err!("lumen3d::vulkan", "{} overflows: {} x {}", what, a, b))
}

/// Per descriptor type: sum of counts over all layouts, times the frame count
pub fn descriptor_pool_sizes(layouts: &[DescriptorSetLayoutDesc], frames_in_flight: usize) -> Result<Vec<vk::DescriptorPoolSize>> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();

    for binding in layouts.iter().flat_map(|l| l.bindings.iter()) {
        let count = checked_count(binding.count as usize, frames_in_flight, "Descriptor count")?;
        match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            Some(size) => {
                size.descriptor_count = size.descriptor_count.checked_add(count).ok_or_else(|| {
                    engine_warn_err!("lumen3d::vulkan",
                        "Descriptor count for {:?} overflows", binding.descriptor_type)
                })?;
            }
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            }),
        }
    }

    Ok(sizes)
}

/// One set per layout per frame slot
pub fn descriptor_set_count(layouts: &[DescriptorSetLayoutDesc], frames_in_flight: usize) -> Result<u32> {
    checked_count(layouts.len(), frames_in_flight, "Descriptor set count")
}

/// `pool_size` descriptors of each GUI type
pub fn gui_pool_sizes(pool_size: u32) -> Vec<vk::DescriptorPoolSize> {
    GUI_DESCRIPTOR_TYPES
        .iter()
        .map(|&ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: pool_size,
        })
        .collect()
}

/// Max sets of the GUI pool: one per descriptor of every GUI type
pub fn gui_max_sets(pool_size: u32) -> Result<u32> {
    checked_count(pool_size as usize, GUI_DESCRIPTOR_TYPES.len(), "GUI descriptor pool size")
}

/// Shader bindings that no declared layout provides
pub fn missing_bindings<'a>(
    reflected: &'a [ReflectedBinding],
    layouts: &[DescriptorSetLayoutDesc],
) -> Vec<&'a ReflectedBinding> {
    reflected
        .iter()
        .filter(|r| {
            layouts
                .get(r.set as usize)
                .and_then(|layout| layout.get(r.binding))
                .is_none()
        })
        .collect()
}

// ===== PIPELINE =====

/// A compiled graphics pipeline and its descriptor resources
///
/// Fields start out null and are filled in order during creation, so a
/// partially built pipeline releases what it owns when dropped.
pub struct Pipeline {
    device: ash::Device,
    name: String,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    descriptor_pool: vk::DescriptorPool,
    /// Indexed [set][frame]
    descriptor_sets: Vec<Vec<vk::DescriptorSet>>,
    frames_in_flight: usize,
}

impl Pipeline {
    fn build(
        device: &ash::Device,
        name: &str,
        info: &PipelineInfo,
        render_pass: vk::RenderPass,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let mut pipeline = Self {
            device: device.clone(),
            name: name.to_string(),
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            set_layouts: Vec::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
            frames_in_flight,
        };

        pipeline.create_set_layouts(&info.set_layouts)?;
        pipeline.create_pipeline(info, render_pass)?;
        pipeline.create_descriptor_pool(&info.set_layouts)?;
        pipeline.allocate_descriptor_sets()?;

        Ok(pipeline)
    }

    fn create_set_layouts(&mut self, layouts: &[DescriptorSetLayoutDesc]) -> Result<()> {
        for desc in layouts {
            let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
                .bindings
                .iter()
                .map(|b| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(b.binding)
                        .descriptor_type(b.descriptor_type)
                        .descriptor_count(b.count)
                        .stage_flags(b.stage_flags)
                })
                .collect();

            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let layout = unsafe {
                self.device
                    .create_descriptor_set_layout(&create_info, None)
                    .map_err(|e| vk_error("create descriptor set layout", e))?
            };
            self.set_layouts.push(layout);
        }
        Ok(())
    }

    fn create_pipeline(&mut self, info: &PipelineInfo, render_pass: vk::RenderPass) -> Result<()> {
        let vertex = ShaderModule::new(&self.device, &info.vertex_shader, vk::ShaderStageFlags::VERTEX)?;
        let fragment = ShaderModule::new(&self.device, &info.fragment_shader, vk::ShaderStageFlags::FRAGMENT)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vertex.stage())
                .module(vertex.handle())
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(fragment.stage())
                .module(fragment.handle())
                .name(ENTRY_POINT),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&info.vertex_input.bindings)
            .vertex_attribute_descriptions(&info.vertex_input.attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic, only the counts matter here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .depth_bias_enable(false);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test)
            .depth_write_enable(info.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&info.push_constant_ranges);

        unsafe {
            self.layout = self
                .device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| vk_error("create pipeline layout", e))?;

            let create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .depth_stencil_state(&depth_stencil_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(self.layout)
                .render_pass(render_pass)
                .subpass(0);

            let pipelines = self
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| vk_error("create graphics pipeline", e))?;
            self.pipeline = pipelines[0];
        }

        // Shader modules are only needed until the pipeline is linked
        Ok(())
    }

    fn create_descriptor_pool(&mut self, layouts: &[DescriptorSetLayoutDesc]) -> Result<()> {
        if layouts.is_empty() {
            return Ok(());
        }

        let pool_sizes = descriptor_pool_sizes(layouts, self.frames_in_flight)?;
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(descriptor_set_count(layouts, self.frames_in_flight)?);

        self.descriptor_pool = unsafe {
            self.device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| vk_error("create descriptor pool", e))?
        };
        Ok(())
    }

    fn allocate_descriptor_sets(&mut self) -> Result<()> {
        for &set_layout in &self.set_layouts {
            let layouts = vec![set_layout; self.frames_in_flight];
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.descriptor_pool)
                .set_layouts(&layouts);

            let sets = unsafe {
                self.device
                    .allocate_descriptor_sets(&allocate_info)
                    .map_err(|e| vk_error("allocate descriptor sets", e))?
            };
            self.descriptor_sets.push(sets);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn set_count(&self) -> usize {
        self.set_layouts.len()
    }

    pub fn descriptor_set(&self, set: usize, frame: usize) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(set)?.get(frame).copied()
    }

    fn checked_set(&self, set: usize, frame: usize) -> Result<vk::DescriptorSet> {
        self.descriptor_set(set, frame).ok_or_else(|| {
            Error::InvalidResource(format!(
                "Pipeline '{}' has no descriptor set {} for frame {}",
                self.name, set, frame
            ))
        })
    }

    /// Handles needed to bind this pipeline from inside a render command
    pub fn binding(&self) -> PipelineBinding {
        PipelineBinding {
            pipeline: self.pipeline,
            layout: self.layout,
            descriptor_sets: self.descriptor_sets.clone(),
        }
    }

    /// Bind the pipeline and all of `frame`'s descriptor sets
    pub fn bind(&self, command_buffer: vk::CommandBuffer, frame: usize) {
        self.binding().record(&self.device, command_buffer, frame);
    }

    pub fn push_constants<T: Pod>(&self, command_buffer: vk::CommandBuffer, stage_flags: vk::ShaderStageFlags, offset: u32, value: &T) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                self.layout,
                stage_flags,
                offset,
                bytemuck::bytes_of(value),
            );
        }
    }

    /// Point (set, binding) of `frame` at the whole of `buffer`
    pub fn write_uniform_buffer(&self, set: usize, binding: u32, frame: usize, buffer: &Buffer) -> Result<()> {
        let descriptor_set = self.checked_set(set, frame)?;
        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer.handle())
            .offset(0)
            .range(vk::WHOLE_SIZE)];

        let write = vk::WriteDescriptorSet::default()
            .dst_set(descriptor_set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);

        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    /// Write each frame's uniform buffer into that frame's set
    pub fn write_uniform_buffers<T: Pod>(&self, set: usize, binding: u32, buffers: &UniformBuffers<T>) -> Result<()> {
        for frame in 0..self.frames_in_flight {
            let buffer = buffers.buffer(frame).ok_or_else(|| {
                Error::InvalidResource(format!("No uniform buffer for frame {}", frame))
            })?;
            self.write_uniform_buffer(set, binding, frame, buffer)?;
        }
        Ok(())
    }

    pub fn write_combined_image_sampler(
        &self,
        set: usize,
        binding: u32,
        frame: usize,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<()> {
        let descriptor_set = self.checked_set(set, frame)?;
        let image_info = [vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(view)
            .sampler(sampler)];

        let write = vk::WriteDescriptorSet::default()
            .dst_set(descriptor_set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);

        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    /// Write `texture` into (set, binding) of every frame slot
    pub fn write_texture(&self, set: usize, binding: u32, texture: &Texture) -> Result<()> {
        for frame in 0..self.frames_in_flight {
            self.write_combined_image_sampler(set, binding, frame, texture.view(), texture.sampler())?;
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            // Frees the sets with it
            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            for layout in self.set_layouts.drain(..) {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

/// Copyable snapshot of a pipeline's handles, safe to move into a render command
///
/// Valid until the pipeline is destroyed.
#[derive(Debug, Clone)]
pub struct PipelineBinding {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    /// Indexed [set][frame]
    descriptor_sets: Vec<Vec<vk::DescriptorSet>>,
}

impl PipelineBinding {
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub(crate) fn record(&self, device: &ash::Device, command_buffer: vk::CommandBuffer, frame: usize) {
        let sets: Vec<vk::DescriptorSet> = self
            .descriptor_sets
            .iter()
            .filter_map(|per_frame| per_frame.get(frame).copied())
            .collect();

        unsafe {
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            if !sets.is_empty() {
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.layout,
                    0,
                    &sets,
                    &[],
                );
            }
        }
    }
}

// ===== PIPELINE MANAGER =====

pub struct PipelineManager {
    device: Arc<DeviceManager>,
    render_pass: vk::RenderPass,
    frames_in_flight: usize,
    pipelines: SlotMap<PipelineKey, Pipeline>,
    names: FxHashMap<String, PipelineKey>,
    gui_pool: vk::DescriptorPool,
}

impl PipelineManager {
    /// `render_pass` must outlive every pipeline created here
    pub fn new(
        device: Arc<DeviceManager>,
        render_pass: vk::RenderPass,
        frames_in_flight: usize,
        gui_pool_size: u32,
    ) -> Result<Self> {
        let pool_sizes = gui_pool_sizes(gui_pool_size);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(gui_max_sets(gui_pool_size)?);

        let gui_pool = unsafe {
            device
                .device()
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| vk_error("create GUI descriptor pool", e))?
        };

        Ok(Self {
            device,
            render_pass,
            frames_in_flight,
            pipelines: SlotMap::with_key(),
            names: FxHashMap::default(),
            gui_pool,
        })
    }

    /// Build and register a pipeline under `name`
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, `info` is invalid, or a Vulkan call fails.
    pub fn create_pipeline(&mut self, name: &str, info: &PipelineInfo) -> Result<PipelineKey> {
        if self.names.contains_key(name) {
            engine_bail_warn!("lumen3d::vulkan", "Pipeline '{}' already exists", name);
        }
        info.validate()?;

        let reflected = merge_reflections(&[
            reflect_descriptor_bindings(&info.vertex_shader, vk::ShaderStageFlags::VERTEX)?,
            reflect_descriptor_bindings(&info.fragment_shader, vk::ShaderStageFlags::FRAGMENT)?,
        ])?;
        for binding in missing_bindings(&reflected, &info.set_layouts) {
            engine_warn!("lumen3d::vulkan",
                "Pipeline '{}': shader uses '{}' (set={}, binding={}, {:?}) which no layout declares",
                name, binding.name, binding.set, binding.binding, binding.descriptor_type);
        }

        let pipeline = Pipeline::build(
            self.device.device(),
            name,
            info,
            self.render_pass,
            self.frames_in_flight,
        )?;

        let key = self.pipelines.insert(pipeline);
        self.names.insert(name.to_string(), key);
        engine_info!("lumen3d::vulkan",
            "Pipeline '{}' created ({} descriptor sets x {} frames)",
            name, info.set_layouts.len(), self.frames_in_flight);
        Ok(key)
    }

    /// Wait for the device, then release `name` and only `name`
    pub fn destroy_pipeline(&mut self, name: &str) -> Result<()> {
        let Some(key) = self.key(name) else {
            engine_bail_warn!("lumen3d::vulkan", "Cannot destroy unknown pipeline '{}'", name);
        };
        // Still registered if the wait fails
        self.device.wait_idle()?;
        self.names.remove(name);
        self.pipelines.remove(key);
        engine_debug!("lumen3d::vulkan", "Pipeline '{}' destroyed", name);
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.names.get(name).and_then(|&key| self.pipelines.get(key))
    }

    pub fn pipeline_by_key(&self, key: PipelineKey) -> Option<&Pipeline> {
        self.pipelines.get(key)
    }

    pub fn key(&self, name: &str) -> Option<PipelineKey> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Pool reserved for the GUI overlay's own descriptor sets
    pub fn gui_descriptor_pool(&self) -> vk::DescriptorPool {
        self.gui_pool
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.device.wait_idle().ok();
        self.pipelines.clear();
        self.names.clear();
        unsafe {
            self.device.device().destroy_descriptor_pool(self.gui_pool, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
