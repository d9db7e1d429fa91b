//! PerFrame `GlobalUBO`, managed through
//! `DescriptorManager`'s dynamic-offset uniform path.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::descriptor::{DescriptorManager, UboField, UboLayout, UniformHandle, UpdateFrequency};

pub const MAX_LIGHTS: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUniformsData {
    pub view: Mat4,
    pub proj: Mat4,
    pub camera_pos: Vec3,
    pub num_lights: u32,
    pub light_positions: [Vec4; MAX_LIGHTS],
    pub light_colors: [Vec4; MAX_LIGHTS],
    pub ambient: Vec4,
    pub skybox_exposure: f32,
    pub skybox_rotation: f32,
    pub skybox_enabled: u32,
    pub ibl_intensity: f32,
    pub environment_map_index: u32,
    pub irradiance_map_index: u32,
    pub prefiltered_map_index: u32,
    pub brdf_lut_index: u32,
}

impl Default for GlobalUniformsData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            camera_pos: Vec3::ZERO,
            num_lights: 0,
            light_positions: [Vec4::ZERO; MAX_LIGHTS],
            light_colors: [Vec4::ZERO; MAX_LIGHTS],
            ambient: Vec4::ZERO,
            skybox_exposure: 1.0,
            skybox_rotation: 0.0,
            skybox_enabled: 0,
            ibl_intensity: 1.0,
            environment_map_index: 0,
            irradiance_map_index: 0,
            prefiltered_map_index: 0,
            brdf_lut_index: 0,
        }
    }
}

/// A single point/directional light as handed over by the scene graph.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
    pub intensity: f32,
}

/// Owns the PerFrame `GlobalUBO` managed uniform and the CPU-side staging
/// copy written into it once per frame.
pub struct GlobalUniforms {
    handle: UniformHandle,
    data: GlobalUniformsData,
}

impl GlobalUniforms {
    /// The whole struct is written as one field rather than per-member,
    /// since it is authored on the Rust side rather than reflected out of a
    /// shader (`create_uniform` accepts any `UboLayout`, reflected
    /// or hand-declared).
    pub fn new(descriptors: &mut DescriptorManager) -> Self {
        let layout = UboLayout {
            total_size: std::mem::size_of::<GlobalUniformsData>() as u32,
            fields: vec![UboField {
                name: "data".into(),
                offset: 0,
                size: std::mem::size_of::<GlobalUniformsData>() as u32,
            }],
        };
        let handle = descriptors.create_uniform("global_ubo", layout, UpdateFrequency::PerFrame);
        Self {
            handle,
            data: GlobalUniformsData::default(),
        }
    }

    pub fn handle(&self) -> UniformHandle {
        self.handle
    }

    /// Populates view/proj/camera, up to
    /// `MAX_LIGHTS` lights (extras are dropped and logged once), ambient and
    /// skybox/IBL parameters, then push the row to the current frame's slot.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        descriptors: &mut DescriptorManager,
        view: Mat4,
        proj: Mat4,
        camera_pos: Vec3,
        lights: &[Light],
        ambient: Vec4,
        skybox_exposure: f32,
        skybox_rotation: f32,
        skybox_enabled: bool,
        ibl_intensity: f32,
        environment_map_index: u32,
        irradiance_map_index: u32,
        prefiltered_map_index: u32,
        brdf_lut_index: u32,
    ) {
        if lights.len() > MAX_LIGHTS {
            log::warn!("update_global_uniforms: {} lights supplied, truncating to {MAX_LIGHTS}", lights.len());
        }
        self.data.view = view;
        self.data.proj = proj;
        self.data.camera_pos = camera_pos;
        self.data.num_lights = lights.len().min(MAX_LIGHTS) as u32;
        for (slot, light) in self.data.light_positions.iter_mut().zip(lights.iter()) {
            *slot = light.position.extend(light.radius);
        }
        for (slot, light) in self.data.light_colors.iter_mut().zip(lights.iter()) {
            *slot = (light.color * light.intensity).extend(1.0);
        }
        self.data.ambient = ambient;
        self.data.skybox_exposure = skybox_exposure;
        self.data.skybox_rotation = skybox_rotation;
        self.data.skybox_enabled = skybox_enabled as u32;
        self.data.ibl_intensity = ibl_intensity;
        self.data.environment_map_index = environment_map_index;
        self.data.irradiance_map_index = irradiance_map_index;
        self.data.prefiltered_map_index = prefiltered_map_index;
        self.data.brdf_lut_index = brdf_lut_index;

        if let Some(mut writer) = descriptors.uniform_writer(self.handle) {
            writer.set("data", self.data);
        }
    }
}
