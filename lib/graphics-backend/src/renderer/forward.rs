//! Frame orchestration: render-list collection, frustum
//! culling against a lazily-rebuilt scene BVH, and the three-pass
//! Main/Luminance/PostProcess frame body driven through the `RenderGraph`.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use graphics_backend_traits::{LightKind, RenderWorld};

use crate::bvh::{Aabb, Bvh};
use crate::context::GraphicsContext;
use crate::descriptor::{
    BindingDesc, DescriptorLayoutDesc, DescriptorManager, NamedDescriptor, ResourceBinding, SamplerType,
    UpdateFrequency,
};
use crate::material::MaterialManager;
use crate::mesh::{build_scene_bvh, transform_aabb, MeshHandle, MeshManager, RenderablePrimitive};
use crate::rendergraph::{PassAccess, PassDecl, RenderGraph, ResourceState};
use crate::resource::{ImageResource, ResourceFactory};

use super::auto_exposure::AutoExposure;
use super::global_uniforms::{GlobalUniforms, Light, MAX_LIGHTS};
use super::tonemap::{self, TonemapSettings};

/// Environment/IBL state the ECS doesn't model (`GlobalUBO`'s
/// skybox/IBL fields have no counterpart in `RenderWorld`'s components) —
/// owned by the renderer and set by whatever drives the frame loop.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentSettings {
    pub ambient: Vec4,
    pub skybox_exposure: f32,
    pub skybox_rotation: f32,
    pub skybox_enabled: bool,
    pub ibl_intensity: f32,
    pub environment_map_index: u32,
    pub irradiance_map_index: u32,
    pub prefiltered_map_index: u32,
    pub brdf_lut_index: u32,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            ambient: Vec4::ZERO,
            skybox_exposure: 1.0,
            skybox_rotation: 0.0,
            skybox_enabled: false,
            ibl_intensity: 1.0,
            environment_map_index: 0,
            irradiance_map_index: 0,
            prefiltered_map_index: 0,
            brdf_lut_index: 0,
        }
    }
}

pub const HDR_COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

// --------------------------------------------------------------- frustum

#[derive(Debug, Clone, Copy)]
struct Plane {
    normal: Vec3,
    d: f32,
}

impl Plane {
    fn from_vec4(v: Vec4) -> Self {
        let normal = Vec3::new(v.x, v.y, v.z);
        let len = normal.length();
        if len > 1e-8 {
            Plane {
                normal: normal / len,
                d: v.w / len,
            }
        } else {
            Plane { normal, d: v.w }
        }
    }

    fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// The six half-spaces of the active camera's clip volume, extracted from a
/// combined view-projection matrix (Gribb/Hartmann plane extraction).
#[derive(Clone, Copy)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    pub fn from_view_proj(view_proj: Mat4) -> Self {
        let mt = view_proj.transpose();
        let (row0, row1, row2, row3) = (mt.x_axis, mt.y_axis, mt.z_axis, mt.w_axis);
        Self {
            planes: [
                Plane::from_vec4(row3 + row0),
                Plane::from_vec4(row3 - row0),
                Plane::from_vec4(row3 + row1),
                Plane::from_vec4(row3 - row1),
                Plane::from_vec4(row3 + row2),
                Plane::from_vec4(row3 - row2),
            ],
        }
    }

    /// Conservative AABB test via each plane's positive vertex: correctness
    /// requires only `AABB ∈ frustum ⇒ true`.
    pub fn test_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.signed_distance(positive) < 0.0 {
                return false;
            }
        }
        true
    }

    pub fn test_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|p| p.signed_distance(center) >= -radius)
    }
}

// --------------------------------------------------------------- scene input

/// One drawable submesh with its resolved world transform and material
/// instance.
#[derive(Clone, Copy)]
pub struct Renderable {
    pub entity_id: u64,
    pub mesh: MeshHandle,
    pub material_instance: u32,
    pub world_transform: Mat4,
    pub submesh_index: u32,
    pub world_aabb: Aabb,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RenderStats {
    pub draw_calls: u32,
    pub visible_renderables: u32,
    pub culled_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectPushConstants {
    model: Mat4,
    material_id: u32,
    padding: [u32; 3],
}

// --------------------------------------------------------------- offscreen targets

struct OffscreenTargets {
    hdr_color: ImageResource,
    depth: ImageResource,
    extent: vk::Extent2D,
    post_process_set: vk::DescriptorSet,
}

// --------------------------------------------------------------- renderer

pub struct ForwardRenderer {
    ctx: Arc<GraphicsContext>,
    factory: ResourceFactory,
    graph: RenderGraph,
    global_uniforms: GlobalUniforms,
    auto_exposure: Option<AutoExposure>,
    tonemap_settings: TonemapSettings,
    targets: OffscreenTargets,
    post_process_layout_set_index: crate::descriptor::LayoutHandle,
    post_process_sampler: vk::Sampler,

    pbr_material: u32,
    skybox_material: Option<u32>,
    post_process_material: u32,

    bvh: Bvh,
    bvh_built: bool,
    scene_dirty: bool,
    renderables: Vec<Renderable>,
    visible_indices: Vec<u32>,
    current_bound_mesh: Option<MeshHandle>,

    last_frame_instant: Option<Instant>,
    stats: RenderStats,
}

impl ForwardRenderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<GraphicsContext>,
        descriptors: &mut DescriptorManager,
        materials: &mut MaterialManager,
        extent: vk::Extent2D,
        pbr_material: u32,
        skybox_material: Option<u32>,
        post_process_material: u32,
        auto_exposure: Option<AutoExposure>,
    ) -> anyhow::Result<Self> {
        let factory = ResourceFactory::new(ctx.clone());

        let post_process_layout = descriptors.register_layout(DescriptorLayoutDesc {
            name: "PostProcess".into(),
            bindings: vec![
                BindingDesc {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                    count: 1,
                    flags: vk::DescriptorBindingFlags::empty(),
                },
                BindingDesc {
                    binding: 1,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                    count: 1,
                    flags: vk::DescriptorBindingFlags::empty(),
                },
            ],
            frequency: UpdateFrequency::PerPass,
            create_flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            is_bindless: false,
        });
        materials.register_named_layout("PostProcess", post_process_layout);
        let post_process_sampler = descriptors.get_sampler(SamplerType::ClampToEdge);

        let global_uniforms = GlobalUniforms::new(descriptors);

        let targets = Self::build_targets(&ctx, &factory, descriptors, post_process_layout, post_process_sampler, extent)?;

        let mut graph = RenderGraph::new();
        if let Some(auto_exposure) = &auto_exposure {
            graph.import_buffer(
                "luminance_readback",
                auto_exposure.readback_buffer().buffer,
                ResourceState::buffer(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
                ResourceState::buffer(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ),
            );
        }
        Self::import_offscreen_targets(&mut graph, &targets);

        Ok(Self {
            ctx,
            factory,
            graph,
            global_uniforms,
            auto_exposure,
            tonemap_settings: TonemapSettings::default(),
            targets,
            post_process_layout_set_index: post_process_layout,
            post_process_sampler,
            pbr_material,
            skybox_material,
            post_process_material,
            bvh: Bvh::empty(),
            bvh_built: false,
            scene_dirty: true,
            renderables: Vec::new(),
            visible_indices: Vec::new(),
            current_bound_mesh: None,
            last_frame_instant: None,
            stats: RenderStats::default(),
        })
    }

    fn build_targets(
        ctx: &Arc<GraphicsContext>,
        factory: &ResourceFactory,
        descriptors: &mut DescriptorManager,
        post_process_layout: crate::descriptor::LayoutHandle,
        sampler: vk::Sampler,
        extent: vk::Extent2D,
    ) -> anyhow::Result<OffscreenTargets> {
        let vk_extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        };
        let hdr_color = factory.create_image(
            vk_extent,
            HDR_COLOR_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            1,
            1,
            false,
            "hdr-color",
        )?;
        let depth = factory.create_image(
            vk_extent,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            1,
            1,
            false,
            "hdr-depth",
        )?;

        let post_process_set = descriptors.allocate_set(post_process_layout, 0);
        descriptors.update_set(
            post_process_set,
            &[
                ResourceBinding::CombinedImageSampler {
                    binding: 0,
                    view: hdr_color.view,
                    sampler,
                },
                ResourceBinding::CombinedImageSampler {
                    binding: 1,
                    view: depth.view,
                    sampler,
                },
            ],
        );

        let _ = ctx;
        Ok(OffscreenTargets {
            hdr_color,
            depth,
            extent,
            post_process_set,
        })
    }

    /// Registers the persistent HDR color/depth targets with the graph so
    /// their tracked state carries over frame to frame, unlike the
    /// once-per-frame swapchain image (imported resources are
    /// not limited to external/foreign images).
    fn import_offscreen_targets(graph: &mut RenderGraph, targets: &OffscreenTargets) {
        graph.import_image(
            "hdr_color",
            targets.hdr_color.image,
            ResourceState {
                stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            },
            ResourceState {
                stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                access: vk::AccessFlags2::SHADER_READ,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        );
        graph.import_image(
            "depth",
            targets.depth.image,
            ResourceState {
                stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            },
            ResourceState {
                stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                access: vk::AccessFlags2::SHADER_READ,
                layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            },
        );
    }

    /// Recreates the offscreen HDR/depth targets and their PostProcess
    /// descriptor set, e.g. after a swapchain resize.
    pub fn resize(&mut self, descriptors: &mut DescriptorManager, extent: vk::Extent2D) -> anyhow::Result<()> {
        let old = std::mem::replace(
            &mut self.targets,
            Self::build_targets(
                &self.ctx,
                &self.factory,
                descriptors,
                self.post_process_layout_set_index,
                self.post_process_sampler,
                extent,
            )?,
        );
        Self::import_offscreen_targets(&mut self.graph, &self.targets);
        self.factory.destroy_image(old.hdr_color);
        self.factory.destroy_image(old.depth);
        Ok(())
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    // ----------------------------------------------------------- begin_frame

    /// Returns `false` (and renders nothing this
    /// frame) when the `RenderWorld` has no active camera.
    pub fn begin_frame(
        &mut self,
        descriptors: &mut DescriptorManager,
        meshes: &MeshManager,
        world: &mut dyn RenderWorld,
        environment: &EnvironmentSettings,
        frame_index: u32,
    ) -> bool {
        descriptors.set_current_frame(frame_index);

        let now = Instant::now();
        let dt = self
            .last_frame_instant
            .map(|last| (now - last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame_instant = Some(now);

        if let Some(auto_exposure) = &mut self.auto_exposure {
            auto_exposure.update(dt);
        }

        if world.take_dirty() {
            self.scene_dirty = true;
        }

        let Some(camera) = world.active_camera() else {
            self.renderables.clear();
            return false;
        };

        let lights: Vec<Light> = world
            .iter_lights()
            .take(MAX_LIGHTS)
            .map(|light| Light {
                position: light.position,
                // Directional lights have no meaningful falloff radius;
                // `f32::MAX` keeps the inverse-square term in the shader
                // from attenuating them.
                radius: match light.kind {
                    LightKind::Point => light.range,
                    LightKind::Directional => f32::MAX,
                },
                color: light.color,
                intensity: light.intensity,
            })
            .collect();

        self.global_uniforms.update(
            descriptors,
            camera.view,
            camera.proj,
            camera.position,
            &lights,
            environment.ambient,
            environment.skybox_exposure,
            environment.skybox_rotation,
            environment.skybox_enabled,
            environment.ibl_intensity,
            environment.environment_map_index,
            environment.irradiance_map_index,
            environment.prefiltered_map_index,
            environment.brdf_lut_index,
        );

        self.collect_renderables(meshes, world);
        true
    }

    /// Builds one `Renderable` per valid submesh.
    fn collect_renderables(&mut self, meshes: &MeshManager, world: &dyn RenderWorld) {
        self.renderables.clear();
        for renderable in world.iter_renderables() {
            let mesh_handle = renderable.mesh.mesh.0;
            let Some(mesh) = meshes.get(mesh_handle) else {
                continue;
            };
            let world_transform = renderable.transform.world_matrix;
            let entity_material_instance = renderable.material.map(|m| m.material_instance).unwrap_or(0);
            for (submesh_index, submesh) in mesh.sub_meshes.iter().enumerate() {
                if submesh.index_count == 0 {
                    continue;
                }
                let world_aabb = transform_aabb(&submesh.local_aabb, &world_transform);
                let material_instance = if entity_material_instance != 0 {
                    entity_material_instance
                } else {
                    submesh.material_index
                };
                self.renderables.push(Renderable {
                    entity_id: renderable.entity.0,
                    mesh: mesh_handle,
                    material_instance,
                    world_transform,
                    submesh_index: submesh_index as u32,
                    world_aabb,
                });
            }
        }
    }

    // ----------------------------------------------------------- render_frame

    /// Main -> (optional Luminance) -> PostProcess,
    /// with the graph inserting the barriers each pass requires.
    #[allow(clippy::too_many_arguments)]
    pub fn render_frame(
        &mut self,
        descriptors: &DescriptorManager,
        materials: &MaterialManager,
        meshes: &MeshManager,
        cmd: vk::CommandBuffer,
        swapchain_image: vk::Image,
        swapchain_view: vk::ImageView,
        frustum: Frustum,
    ) {
        self.stats = RenderStats::default();
        let extent = self.targets.extent;

        self.graph.clear_passes();
        self.graph.import_image(
            "swapchain",
            swapchain_image,
            ResourceState {
                stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            },
            ResourceState {
                stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::PRESENT_SRC_KHR,
            },
        );
        self.graph.add_pass(PassDecl {
            name: "Main".into(),
            reads: Vec::new(),
            writes: vec![
                (
                    "hdr_color".into(),
                    PassAccess {
                        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                        access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                        layout: Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                        is_write: true,
                    },
                ),
                (
                    "depth".into(),
                    PassAccess {
                        stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                        layout: Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                        is_write: true,
                    },
                ),
            ],
        });
        let luminance_pass_index = if self.auto_exposure.is_some() {
            self.graph.add_pass(PassDecl {
                name: "Luminance".into(),
                reads: vec![(
                    "hdr_color".into(),
                    PassAccess {
                        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                        access: vk::AccessFlags2::SHADER_READ,
                        layout: Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                        is_write: false,
                    },
                )],
                writes: vec![(
                    "luminance_readback".into(),
                    PassAccess {
                        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                        access: vk::AccessFlags2::SHADER_WRITE,
                        layout: None,
                        is_write: true,
                    },
                )],
            });
            Some(1usize)
        } else {
            None
        };
        let post_process_pass_index = if luminance_pass_index.is_some() { 2 } else { 1 };
        self.graph.add_pass(PassDecl {
            name: "PostProcess".into(),
            reads: vec![
                (
                    "hdr_color".into(),
                    PassAccess {
                        stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                        access: vk::AccessFlags2::SHADER_READ,
                        layout: Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                        is_write: false,
                    },
                ),
                (
                    "depth".into(),
                    PassAccess {
                        stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                        access: vk::AccessFlags2::SHADER_READ,
                        layout: Some(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL),
                        is_write: false,
                    },
                ),
            ],
            writes: vec![(
                "swapchain".into(),
                PassAccess {
                    stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                    layout: Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                    is_write: true,
                },
            )],
        });

        self.graph.apply_pass_barriers(&self.ctx.device, cmd, 0);
        self.record_main_pass(descriptors, materials, meshes, cmd, extent, frustum);

        if let Some(index) = luminance_pass_index {
            self.graph.apply_pass_barriers(&self.ctx.device, cmd, index);
            if let Some(auto_exposure) = &mut self.auto_exposure {
                auto_exposure.record_dispatch(&self.ctx, cmd, extent);
            }
        }

        self.graph.apply_pass_barriers(&self.ctx.device, cmd, post_process_pass_index);
        self.record_post_process_pass(descriptors, materials, cmd, swapchain_view, extent);

        self.graph.finalize(&self.ctx.device, cmd);
    }

    fn record_main_pass(
        &mut self,
        descriptors: &DescriptorManager,
        materials: &MaterialManager,
        meshes: &MeshManager,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        frustum: Frustum,
    ) {
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.hdr_color.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] },
            });
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.depth.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        unsafe {
            self.ctx.dynamic_rendering_loader.cmd_begin_rendering(cmd, &rendering_info);
            self.ctx.device.cmd_set_viewport(
                cmd,
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            self.ctx.device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D { offset: vk::Offset2D::default(), extent }],
            );
        }

        if let Some(skybox_material) = self.skybox_material {
            if let Some(material) = materials.get_material(skybox_material) {
                unsafe {
                    self.ctx.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, material.pipeline.handle());
                }
                descriptors.bind_descriptors(
                    cmd,
                    material.pipeline_layout_cache_handle,
                    material.pipeline.layout(),
                    vk::PipelineBindPoint::GRAPHICS,
                    &self.global_bindless_descriptors(descriptors),
                );
                unsafe { self.ctx.device.cmd_draw(cmd, 3, 1, 0, 0) };
                self.stats.draw_calls += 1;
            }
        }

        self.render_scene(descriptors, materials, meshes, cmd, frustum);

        unsafe { self.ctx.dynamic_rendering_loader.cmd_end_rendering(cmd) };
    }

    fn global_bindless_descriptors(&self, descriptors: &DescriptorManager) -> Vec<NamedDescriptor> {
        let global_info = descriptors.uniform_info(self.global_uniforms.handle());
        let (set, dynamic_offset) = match global_info {
            Some(info) => (Some(info.descriptor_set), Some(info.dynamic_offset(descriptors.current_frame()))),
            None => (None, None),
        };
        vec![
            NamedDescriptor {
                name: "Global".into(),
                set,
                dynamic_offset,
            },
            NamedDescriptor {
                name: "Bindless".into(),
                set: None,
                dynamic_offset: None,
            },
        ]
    }

    /// Culls and draws the visible renderable set.
    fn render_scene(
        &mut self,
        descriptors: &DescriptorManager,
        materials: &MaterialManager,
        meshes: &MeshManager,
        cmd: vk::CommandBuffer,
        frustum: Frustum,
    ) {
        if !self.bvh_built || self.scene_dirty {
            let primitives: Vec<RenderablePrimitive> = self
                .renderables
                .iter()
                .enumerate()
                .map(|(index, r)| RenderablePrimitive {
                    renderable_index: index as u32,
                    world_aabb: r.world_aabb,
                })
                .collect();
            self.bvh = build_scene_bvh(&primitives);
            self.bvh_built = true;
            self.scene_dirty = false;
        }

        self.visible_indices.clear();
        let visible_indices = &mut self.visible_indices;
        self.bvh.traverse(
            |aabb| frustum.test_aabb(aabb),
            |index| visible_indices.push(index),
        );
        self.stats.visible_renderables = self.visible_indices.len() as u32;
        self.stats.culled_count = self.renderables.len() as u32 - self.stats.visible_renderables;

        let Some(material) = materials.get_material(self.pbr_material) else {
            return;
        };
        unsafe {
            self.ctx.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, material.pipeline.handle());
        }

        let material_set = descriptors.material_set();
        let mut named = self.global_bindless_descriptors(descriptors);
        named.push(NamedDescriptor {
            name: "MaterialData".into(),
            set: material_set,
            dynamic_offset: None,
        });
        descriptors.bind_descriptors(
            cmd,
            material.pipeline_layout_cache_handle,
            material.pipeline.layout(),
            vk::PipelineBindPoint::GRAPHICS,
            &named,
        );

        self.current_bound_mesh = None;
        for &index in &self.visible_indices {
            let Some(renderable) = self.renderables.get(index as usize) else {
                continue;
            };
            let Some(mesh) = meshes.get(renderable.mesh) else {
                continue;
            };
            if self.current_bound_mesh != Some(renderable.mesh) {
                unsafe {
                    self.ctx
                        .device
                        .cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer.buffer], &[0]);
                    self.ctx
                        .device
                        .cmd_bind_index_buffer(cmd, mesh.index_buffer.buffer, 0, vk::IndexType::UINT32);
                }
                self.current_bound_mesh = Some(renderable.mesh);
            }

            let Some(submesh) = mesh.sub_meshes.get(renderable.submesh_index as usize) else {
                continue;
            };
            let material_id = materials
                .get_instance(renderable.material_instance)
                .map(|i| i.material_id())
                .unwrap_or(0);
            let push = ObjectPushConstants {
                model: renderable.world_transform,
                material_id,
                padding: [0; 3],
            };
            unsafe {
                self.ctx.device.cmd_push_constants(
                    cmd,
                    material.pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                self.ctx
                    .device
                    .cmd_draw_indexed(cmd, submesh.index_count, 1, submesh.first_index, 0, 0);
            }
            self.stats.draw_calls += 1;
        }
    }

    /// Explicit teardown of the owned offscreen targets, called before the
    /// `GraphicsContext` itself is torn down.
    pub fn shutdown(self) {
        self.factory.destroy_image(self.targets.hdr_color);
        self.factory.destroy_image(self.targets.depth);
    }

    fn record_post_process_pass(
        &self,
        descriptors: &DescriptorManager,
        materials: &MaterialManager,
        cmd: vk::CommandBuffer,
        swapchain_view: vk::ImageView,
        extent: vk::Extent2D,
    ) {
        let Some(material) = materials.get_material(self.post_process_material) else {
            return;
        };

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(swapchain_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] },
            });
        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent })
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe {
            self.ctx.dynamic_rendering_loader.cmd_begin_rendering(cmd, &rendering_info);
            self.ctx.device.cmd_set_viewport(
                cmd,
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            self.ctx.device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D { offset: vk::Offset2D::default(), extent }],
            );
        }

        let ev100 = match &self.auto_exposure {
            Some(auto_exposure) if auto_exposure.is_enabled() => auto_exposure.current_ev100(),
            _ => self.tonemap_settings.manual_ev100,
        };
        tonemap::record(
            &self.ctx.device,
            descriptors,
            cmd,
            material,
            self.targets.post_process_set,
            &self.tonemap_settings,
            ev100,
        );

        unsafe { self.ctx.dynamic_rendering_loader.cmd_end_rendering(cmd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frustum_accepts_aabb_at_origin_facing_camera() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let frustum = Frustum::from_view_proj(proj * view);
        let aabb = Aabb {
            min: Vec3::splat(-0.5),
            max: Vec3::splat(0.5),
        };
        assert!(frustum.test_aabb(&aabb));
    }

    #[test]
    fn frustum_rejects_aabb_far_outside_fov() {
        // entities at x=+-100, camera at origin looking
        // down +z with a 60 degree fov.
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 1000.0);
        let frustum = Frustum::from_view_proj(proj * view);
        let far_right = Aabb {
            min: Vec3::new(99.5, -0.5, 5.0),
            max: Vec3::new(100.5, 0.5, 6.0),
        };
        let far_left = Aabb {
            min: Vec3::new(-100.5, -0.5, 5.0),
            max: Vec3::new(-99.5, 0.5, 6.0),
        };
        assert!(!frustum.test_aabb(&far_right));
        assert!(!frustum.test_aabb(&far_left));
    }
}
