//! A material: a concrete pipeline plus the descriptor-layout identity that
//! instances bind against.

use crate::descriptor::{LayoutHandle, PipelineLayoutCacheHandle};
use crate::pipeline::GraphicsPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialType {
    Pbr,
    Unlit,
    PostProcess,
    Skybox,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    Opaque,
    Mask,
    Blend,
}

pub struct Material {
    pub name: Option<String>,
    pub pipeline: GraphicsPipeline,
    pub pipeline_layout_cache_handle: PipelineLayoutCacheHandle,
    pub declared_layout_handles: Vec<LayoutHandle>,
    pub material_type: MaterialType,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}
