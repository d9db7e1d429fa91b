//! Compute pipeline construction: mirrors the graphics pipeline build with a
//! single compute shader and a simpler layout — no formats, no vertex input,
//! no render state.

use std::sync::{Arc, Weak};

use ash::vk;

use crate::context::GraphicsContext;
use crate::shader::Shader;

use super::graphics::create_shader_module;

pub struct ComputePipeline {
    ctx: Arc<GraphicsContext>,
    shader: Weak<Shader>,
    descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
}

impl ComputePipeline {
    pub fn new(
        ctx: Arc<GraphicsContext>,
        shader: Weak<Shader>,
        descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
        push_constant_ranges: Vec<vk::PushConstantRange>,
    ) -> anyhow::Result<Self> {
        let (pipeline, pipeline_layout) =
            Self::build_pipeline(&ctx, &shader, &descriptor_set_layouts, &push_constant_ranges)?;
        Ok(Self {
            ctx,
            shader,
            descriptor_set_layouts,
            push_constant_ranges,
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

    pub fn rebuild(&mut self) -> bool {
        match Self::build_pipeline(&self.ctx, &self.shader, &self.descriptor_set_layouts, &self.push_constant_ranges)
        {
            Ok((pipeline, layout)) => {
                self.destroy_pipeline_objects();
                self.pipeline = pipeline;
                self.pipeline_layout = layout;
                true
            }
            Err(err) => {
                log::error!("compute pipeline rebuild failed, keeping previous pipeline: {err}");
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
        shader: &Weak<Shader>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> anyhow::Result<(vk::Pipeline, vk::PipelineLayout)> {
        let shader = shader
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("build_pipeline: compute shader expired"))?;

        let spirv = shader.spirv();
        let module = create_shader_module(ctx, &spirv)?;

        let result = (|| -> anyhow::Result<(vk::Pipeline, vk::PipelineLayout)> {
            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(descriptor_set_layouts)
                .push_constant_ranges(push_constant_ranges);
            let pipeline_layout = unsafe { ctx.device.create_pipeline_layout(&layout_create_info, None) }?;

            let entry_point = std::ffi::CString::new(shader.entry_point.clone())?;
            let stage = vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(module)
                .name(&entry_point);

            let create_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(pipeline_layout);

            let pipeline = unsafe {
                ctx.device
                    .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
            }
            .map_err(|(_, err)| anyhow::anyhow!("vkCreateComputePipelines failed: {err}"))?[0];

            Ok((pipeline, pipeline_layout))
        })();

        unsafe {
            ctx.device.destroy_shader_module(module, None);
        }

        result
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        self.destroy_pipeline_objects();
    }
}
