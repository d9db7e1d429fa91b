//! PostProcess/tonemap pass: full-screen triangle sampling the
//! HDR color (and optionally depth), exposure scaling, a selectable tonemap
//! operator, and gamma correction.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::descriptor::{DescriptorManager, NamedDescriptor};
use crate::material::Material;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TonemapOperator {
    AcesFitted = 0,
    AcesNarkowicz = 1,
    Uncharted2 = 2,
    Reinhard = 3,
    None = 4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TonemapPushConstants {
    ev100: f32,
    gamma: f32,
    tonemap_mode: u32,
    _padding: u32,
}

pub struct TonemapSettings {
    pub operator: TonemapOperator,
    pub gamma: f32,
    /// Used only when auto-exposure is disabled (otherwise driven from
    /// a UI-controlled value).
    pub manual_ev100: f32,
}

impl Default for TonemapSettings {
    fn default() -> Self {
        Self {
            operator: TonemapOperator::AcesFitted,
            gamma: 2.2,
            manual_ev100: 0.0,
        }
    }
}

/// Records the PostProcess pass body: bind pipeline, bind
/// its descriptor set, push `{ev100, gamma, tonemap_mode}`, draw 3 vertices.
pub fn record(
    device: &ash::Device,
    descriptors: &DescriptorManager,
    cmd: vk::CommandBuffer,
    material: &Material,
    post_process_set: vk::DescriptorSet,
    settings: &TonemapSettings,
    ev100: f32,
) {
    unsafe {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, material.pipeline.handle());
    }

    descriptors.bind_descriptors(
        cmd,
        material.pipeline_layout_cache_handle,
        material.pipeline.layout(),
        vk::PipelineBindPoint::GRAPHICS,
        &[NamedDescriptor {
            name: "PostProcess".into(),
            set: Some(post_process_set),
            dynamic_offset: None,
        }],
    );

    let push = TonemapPushConstants {
        ev100,
        gamma: settings.gamma,
        tonemap_mode: settings.operator as u32,
        _padding: 0,
    };
    unsafe {
        device.cmd_push_constants(
            cmd,
            material.pipeline.layout(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(&push),
        );
        device.cmd_draw(cmd, 3, 1, 0, 0);
    }
}
