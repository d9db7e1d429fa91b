//! Texture storage and default-texture install. Owns every
//! `Texture` behind a generation-checked handle table and pre-installs the
//! four default textures at their reserved bindless slots so shaders can
//! treat bindless index `0` as "no texture".

use std::sync::Arc;

use ash::vk;
use graphics_types::Handle;

use crate::context::GraphicsContext;
use crate::descriptor::{BindlessSlotTexture, DescriptorManager, SamplerType};
use crate::resource::{ImageResource, ResourceFactory};

pub type TextureHandle = Handle;

/// Reserved bindless indices for the default textures (white/black/normal/
/// metallic-roughness, registered at slots 1..4).
pub const WHITE_INDEX: u32 = 1;
pub const BLACK_INDEX: u32 = 2;
pub const NORMAL_INDEX: u32 = 3;
pub const METALLIC_ROUGHNESS_INDEX: u32 = 4;

pub struct Texture {
    pub image: ImageResource,
    pub sampler: vk::Sampler,
    pub bindless_index: u32,
}

struct Slot {
    texture: Option<Texture>,
    generation: u32,
}

pub struct TextureManager {
    ctx: Arc<GraphicsContext>,
    factory: ResourceFactory,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    pub white: TextureHandle,
    pub black: TextureHandle,
    pub normal: TextureHandle,
    pub metallic_roughness: TextureHandle,
}

impl TextureManager {
    /// Creates the manager and installs the four default textures at their
    /// reserved bindless slots. Failure to create a default is treated as
    /// silent degradation: the handle falls back to `Handle::INVALID`
    /// and bindless index `0`, so shaders sample "no texture" instead.
    pub fn new(ctx: Arc<GraphicsContext>, descriptors: &mut DescriptorManager) -> Self {
        let factory = ResourceFactory::new(ctx.clone());
        let mut manager = Self {
            ctx,
            factory,
            slots: vec![Slot {
                texture: None,
                generation: 0,
            }],
            free_list: Vec::new(),
            white: Handle::INVALID,
            black: Handle::INVALID,
            normal: Handle::INVALID,
            metallic_roughness: Handle::INVALID,
        };

        let sampler = descriptors.get_sampler(SamplerType::Default);
        manager.white = manager.install_default(descriptors, sampler, [255, 255, 255, 255], WHITE_INDEX);
        manager.black = manager.install_default(descriptors, sampler, [0, 0, 0, 255], BLACK_INDEX);
        manager.normal =
            manager.install_default(descriptors, sampler, [128, 128, 255, 255], NORMAL_INDEX);
        manager.metallic_roughness = manager.install_default(
            descriptors,
            sampler,
            [255, 128, 0, 255],
            METALLIC_ROUGHNESS_INDEX,
        );

        let sentinel = manager
            .get(manager.white)
            .map(|tex| BindlessSlotTexture {
                view: tex.image.view,
                sampler: tex.sampler,
            });
        if let Some(sentinel) = sentinel {
            descriptors.set_default_sentinel(sentinel);
        }

        manager
    }

    fn install_default(
        &mut self,
        descriptors: &mut DescriptorManager,
        sampler: vk::Sampler,
        rgba8: [u8; 4],
        bindless_index: u32,
    ) -> TextureHandle {
        match self.create_1x1(sampler, rgba8, bindless_index) {
            Ok(handle) => {
                descriptors.allocate_bindless_texture_at(
                    BindlessSlotTexture {
                        view: self.get(handle).unwrap().image.view,
                        sampler,
                    },
                    bindless_index,
                );
                handle
            }
            Err(err) => {
                log::error!("failed creating default texture at index {bindless_index}: {err}");
                Handle::INVALID
            }
        }
    }

    fn create_1x1(
        &mut self,
        sampler: vk::Sampler,
        rgba8: [u8; 4],
        bindless_index: u32,
    ) -> anyhow::Result<TextureHandle> {
        let extent = vk::Extent3D {
            width: 1,
            height: 1,
            depth: 1,
        };
        let image = self.factory.create_image(
            extent,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            1,
            1,
            false,
            &format!("default-texture-{bindless_index}"),
        )?;
        self.upload_and_transition(&image, &rgba8)?;
        Ok(self.insert(Texture {
            image,
            sampler,
            bindless_index,
        }))
    }

    fn upload_and_transition(&self, image: &ImageResource, rgba8: &[u8; 4]) -> anyhow::Result<()> {
        self.factory.submit_single_time(|cmd| unsafe {
            let to_transfer_dst = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image(image.image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            self.ctx.device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&to_transfer_dst)),
            );

            self.ctx.device.cmd_clear_color_image(
                cmd,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue {
                    float32: [
                        rgba8[0] as f32 / 255.0,
                        rgba8[1] as f32 / 255.0,
                        rgba8[2] as f32 / 255.0,
                        rgba8[3] as f32 / 255.0,
                    ],
                },
                &[vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1)],
            );

            let to_shader_read = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags2::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image(image.image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            self.ctx.device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&to_shader_read)),
            );
        })
    }

    /// Uploads decoded pixels into a newly allocated sampled texture.
    /// `pixels` must be tightly packed RGBA8 at `extent`.
    pub fn create_from_pixels(
        &mut self,
        extent: vk::Extent3D,
        pixels: &[u8],
        sampler: vk::Sampler,
        name: &str,
    ) -> anyhow::Result<TextureHandle> {
        let image = self.factory.create_image(
            extent,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            1,
            1,
            false,
            name,
        )?;

        let staging = self.factory.create_buffer(
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            gpu_allocator::MemoryLocation::CpuToGpu,
            "texture-upload-staging",
        )?;
        staging.write_bytes(0, pixels);

        self.factory.submit_single_time(|cmd| unsafe {
            let to_transfer_dst = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image(image.image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            self.ctx.device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&to_transfer_dst)),
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .layer_count(1),
                )
                .image_extent(extent);
            self.ctx.device.cmd_copy_buffer_to_image(
                cmd,
                staging.buffer,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_shader_read = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags2::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image(image.image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            self.ctx.device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&to_shader_read)),
            );
        })?;
        self.factory.destroy_buffer(staging);

        Ok(self.insert(Texture {
            image,
            sampler,
            bindless_index: 0,
        }))
    }

    fn insert(&mut self, texture: Texture) -> TextureHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.texture = Some(texture);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                texture: Some(texture),
                generation: 0,
            });
            Handle::new(index, 0)
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.texture.as_ref()
    }

    /// Frees the texture's GPU resources and its bindless slot (if any),
    /// bumping the slot's generation so stale handles fail `get`.
    pub fn destroy(&mut self, handle: TextureHandle, descriptors: &mut DescriptorManager) {
        let Some(slot) = self.slots.get_mut(handle.index() as usize) else {
            return;
        };
        if slot.generation != handle.generation() {
            return;
        }
        if let Some(texture) = slot.texture.take() {
            if texture.bindless_index != 0 {
                descriptors.free_bindless_texture(texture.bindless_index);
            }
            self.factory.destroy_image(texture.image);
        }
        self.free_list.push(handle.index());
    }
}
