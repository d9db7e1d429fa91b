//! `MaterialManager`: creates materials, owns instances in a
//! sparse slot array, and maps scene-level global material ids onto them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Result};
use ash::vk;

use crate::context::GraphicsContext;
use crate::descriptor::{DescriptorManager, LayoutHandle, PushConstantDesc, ShaderLayoutInfo};
use crate::pipeline::{GraphicsPipeline, PipelineConfig};
use crate::shader::Shader;

use super::material::{AlphaMode, Material, MaterialType};

/// Description passed to `create_material`.
pub struct MaterialCreateDesc {
    pub vertex_shader: Weak<Shader>,
    pub fragment_shader: Weak<Shader>,
    /// Names resolved against `MaterialManager`'s named-layout registry, in
    /// declaration order (set 0 = first name, ...).
    pub descriptor_set_layouts: Vec<String>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub pipeline_config: PipelineConfig,
    pub name: String,
    pub material_type: MaterialType,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}

pub struct MaterialManager {
    ctx: Arc<GraphicsContext>,
    named_layouts: HashMap<String, LayoutHandle>,
    materials: Vec<Option<Material>>,
    materials_by_name: HashMap<String, u32>,
    instances: Vec<Option<Box<dyn super::instance::MaterialInstance>>>,
    free_instance_ids: VecDeque<u32>,
    global_materials: HashMap<u64, u32>,
}

impl MaterialManager {
    pub fn new(ctx: Arc<GraphicsContext>) -> Self {
        Self {
            ctx,
            named_layouts: HashMap::new(),
            materials: vec![None],
            materials_by_name: HashMap::new(),
            instances: vec![None],
            free_instance_ids: VecDeque::new(),
            global_materials: HashMap::new(),
        }
    }

    /// Registers a named layout (e.g. "Global", "Bindless", "MaterialData",
    /// "PostProcess") so recipes and `create_material` can resolve it by
    /// name. Call once per well-known layout at renderer init.
    pub fn register_named_layout(&mut self, name: &str, handle: LayoutHandle) {
        self.named_layouts.insert(name.to_string(), handle);
    }

    pub fn resolve_layout_name(&self, name: &str) -> Option<LayoutHandle> {
        self.named_layouts.get(name).copied()
    }

    /// Creates a `Material` from a `MaterialDesc`.
    pub fn create_material(&mut self, descriptors: &mut DescriptorManager, desc: MaterialCreateDesc) -> Result<u32> {
        // Step 1: resolve each layout name.
        let mut declared_layout_handles = Vec::with_capacity(desc.descriptor_set_layouts.len());
        for name in &desc.descriptor_set_layouts {
            let handle = self
                .named_layouts
                .get(name)
                .copied()
                .ok_or_else(|| anyhow!("create_material: unknown descriptor set layout name '{name}'"))?;
            declared_layout_handles.push(handle);
        }

        // Step 2: copy pipeline_config, clear descriptor-set fields, then
        // append resolved Vulkan layouts as additional_descriptor_sets in
        // declaration order.
        let mut pipeline_config = desc.pipeline_config.clone();
        pipeline_config.global_descriptor_set_layout = None;
        pipeline_config.material_descriptor_set_layout = None;
        pipeline_config.additional_descriptor_set_layouts = declared_layout_handles
            .iter()
            .filter_map(|h| descriptors.vk_layout(*h))
            .collect();
        pipeline_config.push_constant_ranges = desc.push_constant_ranges.clone();

        // Step 3: color_formats must be non-empty.
        if pipeline_config.color_formats.is_empty() {
            return Err(anyhow!("create_material: pipeline_config.color_formats must be non-empty"));
        }

        let push_constant_handle = descriptors.register_push_constants(PushConstantDesc {
            ranges: desc.push_constant_ranges.clone(),
        });
        let layout_info = ShaderLayoutInfo {
            layout_handles: declared_layout_handles.clone(),
            push_constant_handle,
            resource_names: desc
                .descriptor_set_layouts
                .iter()
                .enumerate()
                .map(|(index, name)| (name.clone(), index as u32))
                .collect(),
        };
        let pipeline_layout_cache_handle = descriptors.get_or_create_pipeline_layout_cache(&layout_info, None);

        // Step 4: build the pipeline; store in a stable slot array.
        let pipeline = GraphicsPipeline::new(self.ctx.clone(), desc.vertex_shader, desc.fragment_shader, pipeline_config)?;
        let material = Material {
            name: if desc.name.is_empty() { None } else { Some(desc.name.clone()) },
            pipeline,
            pipeline_layout_cache_handle,
            declared_layout_handles,
            material_type: desc.material_type,
            alpha_mode: desc.alpha_mode,
            double_sided: desc.double_sided,
        };
        let index = self.materials.len() as u32;
        self.materials.push(Some(material));

        // Step 5: name -> *Material map.
        if !desc.name.is_empty() {
            self.materials_by_name.insert(desc.name, index);
        }
        Ok(index)
    }

    pub fn get_material(&self, index: u32) -> Option<&Material> {
        self.materials.get(index as usize).and_then(|m| m.as_ref())
    }

    pub fn get_material_by_name(&self, name: &str) -> Option<&Material> {
        self.materials_by_name.get(name).and_then(|&idx| self.get_material(idx))
    }

    /// PBR -> `[Global, Bindless, MaterialData]`, 80B push
    /// constant vertex+fragment.
    pub fn create_pbr_bindless_material(
        &mut self,
        descriptors: &mut DescriptorManager,
        vertex_shader: Weak<Shader>,
        fragment_shader: Weak<Shader>,
        mut pipeline_config: PipelineConfig,
        name: &str,
    ) -> Result<u32> {
        pipeline_config.use_vertex_input = true;
        self.create_material(
            descriptors,
            MaterialCreateDesc {
                vertex_shader,
                fragment_shader,
                descriptor_set_layouts: vec!["Global".into(), "Bindless".into(), "MaterialData".into()],
                push_constant_ranges: vec![vk::PushConstantRange::default()
                    .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                    .offset(0)
                    .size(80)],
                pipeline_config,
                name: name.to_string(),
                material_type: MaterialType::Pbr,
                alpha_mode: AlphaMode::Opaque,
                double_sided: false,
            },
        )
    }

    /// PostProcess -> `[PostProcess]` (set 0 only), 16B push
    /// constant vertex+fragment (the unused stage flag is included to
    /// satisfy validation).
    pub fn create_post_process_material(
        &mut self,
        descriptors: &mut DescriptorManager,
        vertex_shader: Weak<Shader>,
        fragment_shader: Weak<Shader>,
        mut pipeline_config: PipelineConfig,
        name: &str,
    ) -> Result<u32> {
        pipeline_config.use_vertex_input = false;
        pipeline_config.enable_depth_test = false;
        pipeline_config.enable_depth_write = false;
        pipeline_config.cull_mode = vk::CullModeFlags::NONE;
        self.create_material(
            descriptors,
            MaterialCreateDesc {
                vertex_shader,
                fragment_shader,
                descriptor_set_layouts: vec!["PostProcess".into()],
                push_constant_ranges: vec![vk::PushConstantRange::default()
                    .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                    .offset(0)
                    .size(16)],
                pipeline_config,
                name: name.to_string(),
                material_type: MaterialType::PostProcess,
                alpha_mode: AlphaMode::Opaque,
                double_sided: true,
            },
        )
    }

    /// Skybox -> `[Global, Bindless]`, `depth_compare_op =
    /// LessOrEqual`, no depth write, no culling.
    pub fn create_skybox_material(
        &mut self,
        descriptors: &mut DescriptorManager,
        vertex_shader: Weak<Shader>,
        fragment_shader: Weak<Shader>,
        mut pipeline_config: PipelineConfig,
        name: &str,
    ) -> Result<u32> {
        pipeline_config.depth_compare_op = vk::CompareOp::LESS_OR_EQUAL;
        pipeline_config.enable_depth_write = false;
        pipeline_config.cull_mode = vk::CullModeFlags::NONE;
        self.create_material(
            descriptors,
            MaterialCreateDesc {
                vertex_shader,
                fragment_shader,
                descriptor_set_layouts: vec!["Global".into(), "Bindless".into()],
                push_constant_ranges: Vec::new(),
                pipeline_config,
                name: name.to_string(),
                material_type: MaterialType::Skybox,
                alpha_mode: AlphaMode::Opaque,
                double_sided: true,
            },
        )
    }

    /// Allocates a slot id (reuse from
    /// the free-id ring buffer, otherwise incrementing), construct a
    /// type-specific instance, and reserve its material-data row.
    pub fn create_material_instance(
        &mut self,
        descriptors: &mut DescriptorManager,
        material_index: u32,
        mut instance: Box<dyn super::instance::MaterialInstance>,
    ) -> u32 {
        let Some(Some(material)) = self.materials.get(material_index as usize) else {
            log::error!("create_material_instance: unknown material index {material_index}");
            return 0;
        };

        if !instance.create(&self.ctx, material, descriptors) {
            log::error!("create_material_instance: instance creation failed (SSBO row exhausted?)");
            return 0;
        }

        let id = if let Some(id) = self.free_instance_ids.pop_front() {
            self.instances[id as usize] = Some(instance);
            id
        } else {
            let id = self.instances.len() as u32;
            self.instances.push(Some(instance));
            id
        };
        id
    }

    /// Frees bindless textures, then
    /// the SSBO row, then return the slot id to the free list.
    pub fn destroy_material_instance(&mut self, descriptors: &mut DescriptorManager, id: u32) {
        if id == 0 {
            return;
        }
        let Some(slot) = self.instances.get_mut(id as usize) else {
            return;
        };
        if let Some(mut instance) = slot.take() {
            instance.cleanup(descriptors);
            self.free_instance_ids.push_back(id);
        }
    }

    pub fn get_instance(&self, id: u32) -> Option<&dyn super::instance::MaterialInstance> {
        self.instances.get(id as usize)?.as_deref()
    }

    pub fn get_instance_mut(&mut self, id: u32) -> Option<&mut Box<dyn super::instance::MaterialInstance>> {
        self.instances.get_mut(id as usize)?.as_mut()
    }

    /// Maps `fileId << 16 |
    /// glTF_material_index` to engine instance ids.
    pub fn register_global_material(&mut self, global_id: u64, instance_id: u32) {
        self.global_materials.insert(global_id, instance_id);
    }

    pub fn get_global_material(&self, global_id: u64) -> Option<u32> {
        self.global_materials.get(&global_id).copied()
    }
}
