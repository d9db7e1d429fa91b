//! Material instances: per-draw state over a shared `Material`,
//! backed by a row in the bindless material SSBO.

use std::sync::Arc;

use crate::context::GraphicsContext;
use crate::descriptor::{BindlessSlotTexture, DescriptorManager, MaterialData};
use crate::texture::{Texture, TextureHandle};

use super::material::Material;

/// Common surface every concrete instance type exposes to `MaterialManager`.
pub trait MaterialInstance: Send + Sync {
    /// Reserves a row in the material SSBO. Returns `false` (logged) if the
    /// row pool is exhausted.
    fn create(&mut self, ctx: &Arc<GraphicsContext>, material: &Material, descriptors: &mut DescriptorManager) -> bool;

    /// Returned in push constants so the shader
    /// reads `materials[material_id]`.
    fn material_id(&self) -> u32;

    /// Frees every bindless texture index this instance allocated, then its
    /// SSBO row.
    fn cleanup(&mut self, descriptors: &mut DescriptorManager);
}

fn bindless_tex_of(texture: &Texture) -> BindlessSlotTexture {
    BindlessSlotTexture {
        view: texture.image.view,
        sampler: texture.sampler,
    }
}

/// Runs the 4-step texture-setter protocol against a single
/// `MaterialData` slot field, returning the newly allocated bindless index.
fn set_texture_slot(
    descriptors: &mut DescriptorManager,
    current_index: u32,
    texture: Option<&Texture>,
) -> u32 {
    if current_index != 0 {
        descriptors.free_bindless_texture(current_index);
    }
    match texture {
        Some(texture) => descriptors.allocate_bindless_texture(bindless_tex_of(texture)),
        None => 0,
    }
}

pub struct PBRMaterialInstance {
    material_id: u32,
    base_color_texture: Option<TextureHandle>,
    mr_texture: Option<TextureHandle>,
    normal_texture: Option<TextureHandle>,
    occlusion_texture: Option<TextureHandle>,
    emissive_texture: Option<TextureHandle>,
    data: MaterialData,
}

impl PBRMaterialInstance {
    pub fn new() -> Self {
        Self {
            material_id: 0,
            base_color_texture: None,
            mr_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            data: MaterialData::default(),
        }
    }

    pub fn set_base_color_texture(&mut self, descriptors: &mut DescriptorManager, handle: Option<TextureHandle>, texture: Option<&Texture>) {
        let previous = self.data.base_color_tex_index;
        let new_index = set_texture_slot(descriptors, previous, texture);
        self.data.base_color_tex_index = new_index;
        self.base_color_texture = handle;
        descriptors.update_material_data(self.material_id, self.data);
    }

    pub fn set_metallic_roughness_texture(
        &mut self,
        descriptors: &mut DescriptorManager,
        handle: Option<TextureHandle>,
        texture: Option<&Texture>,
    ) {
        let previous = self.data.mr_tex_index;
        let new_index = set_texture_slot(descriptors, previous, texture);
        self.data.mr_tex_index = new_index;
        self.mr_texture = handle;
        descriptors.update_material_data(self.material_id, self.data);
    }

    pub fn set_normal_texture(&mut self, descriptors: &mut DescriptorManager, handle: Option<TextureHandle>, texture: Option<&Texture>) {
        let previous = self.data.normal_tex_index;
        let new_index = set_texture_slot(descriptors, previous, texture);
        self.data.normal_tex_index = new_index;
        self.normal_texture = handle;
        descriptors.update_material_data(self.material_id, self.data);
    }

    pub fn set_occlusion_texture(&mut self, descriptors: &mut DescriptorManager, handle: Option<TextureHandle>, texture: Option<&Texture>) {
        let previous = self.data.occlusion_tex_index;
        let new_index = set_texture_slot(descriptors, previous, texture);
        self.data.occlusion_tex_index = new_index;
        self.occlusion_texture = handle;
        descriptors.update_material_data(self.material_id, self.data);
    }

    pub fn set_emissive_texture(&mut self, descriptors: &mut DescriptorManager, handle: Option<TextureHandle>, texture: Option<&Texture>) {
        let previous = self.data.emissive_tex_index;
        let new_index = set_texture_slot(descriptors, previous, texture);
        self.data.emissive_tex_index = new_index;
        self.emissive_texture = handle;
        descriptors.update_material_data(self.material_id, self.data);
    }

    /// Copies the CPU `PBRMaterialData` into
    /// the SSBO row, preserving texture indices.
    pub fn update_material_data(&mut self, descriptors: &mut DescriptorManager, factors: MaterialData) {
        self.data.base_color_factor = factors.base_color_factor;
        self.data.metallic = factors.metallic;
        self.data.roughness = factors.roughness;
        self.data.normal_scale = factors.normal_scale;
        self.data.occlusion_strength = factors.occlusion_strength;
        self.data.emissive_factor = factors.emissive_factor;
        self.data.alpha_cutoff = factors.alpha_cutoff;
        descriptors.update_material_data(self.material_id, self.data);
    }
}

impl Default for PBRMaterialInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialInstance for PBRMaterialInstance {
    fn create(&mut self, _ctx: &Arc<GraphicsContext>, _material: &Material, descriptors: &mut DescriptorManager) -> bool {
        let id = descriptors.allocate_material_data(self.data);
        self.material_id = id;
        id != 0
    }

    fn material_id(&self) -> u32 {
        self.material_id
    }

    fn cleanup(&mut self, descriptors: &mut DescriptorManager) {
        for index in [
            self.data.base_color_tex_index,
            self.data.mr_tex_index,
            self.data.normal_tex_index,
            self.data.occlusion_tex_index,
            self.data.emissive_tex_index,
        ] {
            if index != 0 {
                descriptors.free_bindless_texture(index);
            }
        }
        descriptors.free_material_data(self.material_id);
        self.material_id = 0;
    }
}

/// Unlit analogue: a single base-color texture + factor, the
/// remaining `MaterialData` fields left at their defaults.
pub struct UnlitMaterialInstance {
    material_id: u32,
    base_color_texture: Option<TextureHandle>,
    data: MaterialData,
}

impl UnlitMaterialInstance {
    pub fn new() -> Self {
        Self {
            material_id: 0,
            base_color_texture: None,
            data: MaterialData::default(),
        }
    }

    pub fn set_base_color_texture(&mut self, descriptors: &mut DescriptorManager, handle: Option<TextureHandle>, texture: Option<&Texture>) {
        let previous = self.data.base_color_tex_index;
        let new_index = set_texture_slot(descriptors, previous, texture);
        self.data.base_color_tex_index = new_index;
        self.base_color_texture = handle;
        descriptors.update_material_data(self.material_id, self.data);
    }

    pub fn update_material_data(&mut self, descriptors: &mut DescriptorManager, base_color_factor: glam::Vec4) {
        self.data.base_color_factor = base_color_factor;
        descriptors.update_material_data(self.material_id, self.data);
    }
}

impl Default for UnlitMaterialInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialInstance for UnlitMaterialInstance {
    fn create(&mut self, _ctx: &Arc<GraphicsContext>, _material: &Material, descriptors: &mut DescriptorManager) -> bool {
        let id = descriptors.allocate_material_data(self.data);
        self.material_id = id;
        id != 0
    }

    fn material_id(&self) -> u32 {
        self.material_id
    }

    fn cleanup(&mut self, descriptors: &mut DescriptorManager) {
        if self.data.base_color_tex_index != 0 {
            descriptors.free_bindless_texture(self.data.base_color_tex_index);
        }
        descriptors.free_material_data(self.material_id);
        self.material_id = 0;
    }
}
