//! Graphics pipeline construction.

use std::sync::{Arc, Weak};

use ash::vk;
use graphics_types::Vertex;

use crate::context::GraphicsContext;
use crate::shader::Shader;

/// `{primitive_topology, polygon_mode, cull_mode, line_width,
/// enable_depth_test, enable_depth_write, depth_compare_op, enable_blending,
/// use_vertex_input, color_formats, depth_format, stencil_format,
/// push_constant_ranges, additional_descriptor_set_layouts,
/// global_descriptor_set_layout, material_descriptor_set_layout}`."
#[derive(Clone)]
pub struct PipelineConfig {
    pub primitive_topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub line_width: f32,
    pub enable_depth_test: bool,
    pub enable_depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub enable_blending: bool,
    pub use_vertex_input: bool,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub stencil_format: Option<vk::Format>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub additional_descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    pub global_descriptor_set_layout: Option<vk::DescriptorSetLayout>,
    pub material_descriptor_set_layout: Option<vk::DescriptorSetLayout>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            line_width: 1.0,
            enable_depth_test: true,
            enable_depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            enable_blending: false,
            use_vertex_input: true,
            color_formats: Vec::new(),
            depth_format: None,
            stencil_format: None,
            push_constant_ranges: Vec::new(),
            additional_descriptor_set_layouts: Vec::new(),
            global_descriptor_set_layout: None,
            material_descriptor_set_layout: None,
        }
    }
}

pub struct GraphicsPipeline {
    ctx: Arc<GraphicsContext>,
    vertex_shader: Weak<Shader>,
    fragment_shader: Weak<Shader>,
    config: PipelineConfig,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    pub fn new(
        ctx: Arc<GraphicsContext>,
        vertex_shader: Weak<Shader>,
        fragment_shader: Weak<Shader>,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        let (pipeline, pipeline_layout) = Self::build_pipeline(&ctx, &vertex_shader, &fragment_shader, &config)?;
        Ok(Self {
            ctx,
            vertex_shader,
            fragment_shader,
            config,
            pipeline,
            pipeline_layout,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    /// Releases the old pipeline + shader
    /// modules, re-run `build_pipeline()`. Used by hot-reload to observe new
    /// SPIR-V after `ShaderLibrary::reload_changed`.
    pub fn rebuild(&mut self) -> bool {
        match Self::build_pipeline(&self.ctx, &self.vertex_shader, &self.fragment_shader, &self.config) {
            Ok((pipeline, layout)) => {
                self.destroy_pipeline_objects();
                self.pipeline = pipeline;
                self.pipeline_layout = layout;
                true
            }
            Err(err) => {
                log::error!("pipeline rebuild failed, keeping previous pipeline: {err}");
                false
            }
        }
    }

    fn destroy_pipeline_objects(&self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }

    fn build_pipeline(
        ctx: &Arc<GraphicsContext>,
        vertex_shader: &Weak<Shader>,
        fragment_shader: &Weak<Shader>,
        config: &PipelineConfig,
    ) -> anyhow::Result<(vk::Pipeline, vk::PipelineLayout)> {
        // Step 1: upgrade both weak shader references.
        let vertex_shader = vertex_shader
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("build_pipeline: vertex shader expired"))?;
        let fragment_shader = fragment_shader
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("build_pipeline: fragment shader expired"))?;

        // Step 2: create shader modules from SPIR-V.
        let vertex_spirv = vertex_shader.spirv();
        let fragment_spirv = fragment_shader.spirv();
        let vertex_module = create_shader_module(ctx, &vertex_spirv)?;
        let fragment_module = create_shader_module(ctx, &fragment_spirv)?;

        let result = (|| -> anyhow::Result<(vk::Pipeline, vk::PipelineLayout)> {
            let entry_point_vert = std::ffi::CString::new(vertex_shader.entry_point.clone())?;
            let entry_point_frag = std::ffi::CString::new(fragment_shader.entry_point.clone())?;
            let stages = [
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::VERTEX)
                    .module(vertex_module)
                    .name(&entry_point_vert),
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment_module)
                    .name(&entry_point_frag),
            ];

            // Step 3: ordered descriptor set layout list, skipping nulls.
            let mut set_layouts = Vec::new();
            if let Some(global) = config.global_descriptor_set_layout {
                set_layouts.push(global);
            }
            if let Some(material) = config.material_descriptor_set_layout {
                set_layouts.push(material);
            }
            set_layouts.extend(config.additional_descriptor_set_layouts.iter().copied());

            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&config.push_constant_ranges);
            let pipeline_layout = unsafe { ctx.device.create_pipeline_layout(&layout_create_info, None) }?;

            // Step 4: vertex input from the fixed Vertex layout iff use_vertex_input.
            let bindings = [Vertex::binding_description()];
            let attributes = Vertex::attribute_descriptions();
            let vertex_input_state = if config.use_vertex_input {
                vk::PipelineVertexInputStateCreateInfo::default()
                    .vertex_binding_descriptions(&bindings)
                    .vertex_attribute_descriptions(&attributes)
            } else {
                vk::PipelineVertexInputStateCreateInfo::default()
            };

            // Step 5: standard pipeline state.
            let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(config.primitive_topology)
                .primitive_restart_enable(false);

            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1);

            let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(config.polygon_mode)
                .line_width(config.line_width)
                .cull_mode(config.cull_mode)
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false);

            let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
                .rasterization_samples(vk::SampleCountFlags::TYPE_1)
                .sample_shading_enable(false);

            let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(config.enable_depth_test)
                .depth_write_enable(config.enable_depth_write)
                .depth_compare_op(config.depth_compare_op)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false);

            let color_blend_attachment = if config.enable_blending {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .blend_enable(true)
                    .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                    .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                    .color_blend_op(vk::BlendOp::ADD)
                    .src_alpha_blend_factor(vk::BlendFactor::ONE)
                    .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                    .alpha_blend_op(vk::BlendOp::ADD)
            } else {
                vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA)
            };
            let attachments = vec![color_blend_attachment; config.color_formats.len().max(1)];
            let color_blending = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

            // Step 6: PipelineRenderingCreateInfo (dynamic rendering).
            let mut rendering_info =
                vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&config.color_formats);
            if let Some(depth_format) = config.depth_format {
                rendering_info = rendering_info.depth_attachment_format(depth_format);
            }
            if let Some(stencil_format) = config.stencil_format {
                rendering_info = rendering_info.stencil_attachment_format(stencil_format);
            }

            // Step 7: create the graphics pipeline.
            let create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterizer)
                .multisample_state(&multisampling)
                .depth_stencil_state(&depth_stencil)
                .color_blend_state(&color_blending)
                .dynamic_state(&dynamic_state)
                .layout(pipeline_layout)
                .push_next(&mut rendering_info);

            let pipeline = unsafe {
                ctx.device
                    .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            }
            .map_err(|(_, err)| anyhow::anyhow!("vkCreateGraphicsPipelines failed: {err}"))?[0];

            Ok((pipeline, pipeline_layout))
        })();

        unsafe {
            ctx.device.destroy_shader_module(vertex_module, None);
            ctx.device.destroy_shader_module(fragment_module, None);
        }

        result
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.destroy_pipeline_objects();
    }
}

pub(crate) fn create_shader_module(ctx: &GraphicsContext, spirv: &[u32]) -> anyhow::Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
    unsafe { ctx.device.create_shader_module(&create_info, None) }
        .map_err(|err| anyhow::anyhow!("vkCreateShaderModule failed: {err}"))
}
