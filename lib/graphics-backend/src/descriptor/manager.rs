use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use super::bindless::{BindlessRegistry, BindlessSlotTexture, RESERVED_SLOTS};
use super::layout::{
    BindingDesc, DescriptorLayoutDesc, LayoutHandle, PipelineLayoutCacheHandle, PushConstantDesc,
    PushConstantHandle, UpdateFrequency,
};
use super::material_data::{MaterialData, MaterialDataSlots, MATERIAL_DATA_SIZE};
use super::sampler::{SamplerConfig, SamplerType};
use super::uniform::{UboLayout, UniformHandle, UniformSetInfo, UniformWriter};
use crate::context::GraphicsContext;
use crate::resource::{BufferResource, ResourceFactory};
use gpu_allocator::MemoryLocation;

/// One descriptor write, resolved to a concrete resource, passed to
/// `update_set`. Batched and submitted with a single `vkUpdateDescriptorSets`
/// call.
pub enum ResourceBinding {
    UniformBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    StorageBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    StorageImage {
        binding: u32,
        view: vk::ImageView,
    },
    CombinedImageSampler {
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

/// One resolved binding slot for `bind_descriptors`.
pub struct NamedDescriptor {
    pub name: String,
    pub set: Option<vk::DescriptorSet>,
    pub dynamic_offset: Option<u32>,
}

/// The per-shader data `get_or_create_pipeline_layout_cache` needs: the
/// ordered set layouts it uses, its push-constant handle, and the
/// resource-name-to-set-index map from its reflection.
pub struct ShaderLayoutInfo {
    pub layout_handles: Vec<LayoutHandle>,
    pub push_constant_handle: PushConstantHandle,
    pub resource_names: Vec<(String, u32)>,
}

struct LayoutRecord {
    vk_layout: vk::DescriptorSetLayout,
    frequency: UpdateFrequency,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    update_after_bind: bool,
    is_bindless: bool,
}

struct PoolEntry {
    pool: vk::DescriptorPool,
    remaining: u32,
}

struct PipelineLayoutCacheEntry {
    handle: PipelineLayoutCacheHandle,
    pipeline_layout: vk::PipelineLayout,
    resource_name_to_set: HashMap<String, u32>,
    bindless_set_indices: Vec<u32>,
}

/// Single source of truth for descriptor set layouts, pools, pipeline
/// layouts, bindless tables, and the material SSBO.
pub struct DescriptorManager {
    ctx: Arc<GraphicsContext>,
    factory: ResourceFactory,
    frames_in_flight: u32,
    current_frame: u32,

    layouts: HashMap<LayoutHandle, LayoutRecord>,
    push_constants: HashMap<PushConstantHandle, PushConstantDesc>,
    pools: HashMap<UpdateFrequency, Vec<PoolEntry>>,

    bindless_registry: BindlessRegistry,
    bindless_set_layout: vk::DescriptorSetLayout,
    bindless_pool: vk::DescriptorPool,
    bindless_set: vk::DescriptorSet,
    default_sentinel: Option<BindlessSlotTexture>,

    material_layout: Option<LayoutHandle>,
    material_slots: Option<MaterialDataSlots>,
    material_buffer: Option<BufferResource>,
    material_set: Option<vk::DescriptorSet>,

    samplers: HashMap<u64, vk::Sampler>,

    pipeline_layout_cache: HashMap<u64, PipelineLayoutCacheEntry>,
    next_pipeline_layout_id: u32,

    uniforms: Vec<UniformSetInfo>,
}

impl DescriptorManager {
    pub fn new(ctx: Arc<GraphicsContext>, frames_in_flight: u32) -> Self {
        Self {
            factory: ResourceFactory::new(ctx.clone()),
            ctx,
            frames_in_flight,
            current_frame: 0,
            layouts: HashMap::new(),
            push_constants: HashMap::new(),
            pools: HashMap::new(),
            bindless_registry: BindlessRegistry::new(0, 0),
            bindless_set_layout: vk::DescriptorSetLayout::null(),
            bindless_pool: vk::DescriptorPool::null(),
            bindless_set: vk::DescriptorSet::null(),
            default_sentinel: None,
            material_layout: None,
            material_slots: None,
            material_buffer: None,
            material_set: None,
            samplers: HashMap::new(),
            pipeline_layout_cache: HashMap::new(),
            next_pipeline_layout_id: 1,
            uniforms: Vec::new(),
        }
    }

    pub fn set_current_frame(&mut self, frame_index: u32) {
        self.current_frame = frame_index;
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    // ---------------------------------------------------------------- layouts

    pub fn register_layout(&mut self, desc: DescriptorLayoutDesc) -> LayoutHandle {
        if desc
            .bindings
            .iter()
            .any(|b| b.count == 0 && !desc.is_bindless)
        {
            log::error!("register_layout: binding with count 0 on a non-bindless layout");
            return LayoutHandle::INVALID;
        }

        let handle = desc.hash();
        if self.layouts.contains_key(&handle) {
            return handle;
        }

        let update_after_bind = desc
            .bindings
            .iter()
            .any(|b| b.flags.contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND));

        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();
        let binding_flags: Vec<vk::DescriptorBindingFlags> =
            desc.bindings.iter().map(|b| b.flags).collect();

        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let create_flags = if update_after_bind {
            desc.create_flags | vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
        } else {
            desc.create_flags
        };
        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&vk_bindings)
            .flags(create_flags)
            .push_next(&mut flags_info);

        let vk_layout = match unsafe { self.ctx.device.create_descriptor_set_layout(&create_info, None) }
        {
            Ok(layout) => layout,
            Err(err) => {
                log::error!("vkCreateDescriptorSetLayout failed: {err}");
                return LayoutHandle::INVALID;
            }
        };

        let pool_sizes = Self::pool_sizes_for(&desc.bindings);

        self.layouts.insert(
            handle,
            LayoutRecord {
                vk_layout,
                frequency: desc.frequency,
                pool_sizes,
                update_after_bind,
                is_bindless: desc.is_bindless,
            },
        );
        handle
    }

    fn pool_sizes_for(bindings: &[BindingDesc]) -> Vec<vk::DescriptorPoolSize> {
        let mut by_type: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for binding in bindings {
            *by_type.entry(binding.descriptor_type).or_insert(0) += binding.count.max(1);
        }
        by_type
            .into_iter()
            .map(|(ty, count)| vk::DescriptorPoolSize::default().ty(ty).descriptor_count(count))
            .collect()
    }

    pub fn register_push_constants(&mut self, desc: PushConstantDesc) -> PushConstantHandle {
        let handle = desc.hash();
        self.push_constants.entry(handle).or_insert(desc);
        handle
    }

    pub fn allocate_set(&mut self, layout_handle: LayoutHandle, _frame_index: u32) -> vk::DescriptorSet {
        let Some(record) = self.layouts.get(&layout_handle) else {
            log::error!("allocate_set: unknown layout handle {layout_handle:?}");
            return vk::DescriptorSet::null();
        };
        let frequency = record.frequency;
        let vk_layout = record.vk_layout;
        let pool_sizes = record.pool_sizes.clone();
        let update_after_bind = record.update_after_bind;

        let pools = self.pools.entry(frequency).or_default();
        for entry in pools.iter_mut() {
            if entry.remaining > 0 {
                if let Some(set) = Self::try_allocate(&self.ctx.device, entry.pool, vk_layout) {
                    entry.remaining -= 1;
                    return set;
                }
            }
        }

        let multiplier = frequency.pool_multiplier() * self.frames_in_flight;
        let scaled_sizes: Vec<vk::DescriptorPoolSize> = pool_sizes
            .iter()
            .map(|s| {
                vk::DescriptorPoolSize::default()
                    .ty(s.ty)
                    .descriptor_count(s.descriptor_count * multiplier)
            })
            .collect();
        let flags = if update_after_bind {
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND_POOL
        } else {
            vk::DescriptorPoolCreateFlags::empty()
        };
        let pool_create_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&scaled_sizes)
            .max_sets(multiplier)
            .flags(flags);
        let pool = match unsafe { self.ctx.device.create_descriptor_pool(&pool_create_info, None) } {
            Ok(pool) => pool,
            Err(err) => {
                log::error!("vkCreateDescriptorPool failed: {err}");
                return vk::DescriptorSet::null();
            }
        };

        let set = Self::try_allocate(&self.ctx.device, pool, vk_layout).unwrap_or_else(|| {
            log::error!("freshly created descriptor pool failed its first allocation");
            vk::DescriptorSet::null()
        });
        self.pools
            .get_mut(&frequency)
            .unwrap()
            .push(PoolEntry { pool, remaining: multiplier - 1 });
        set
    }

    fn try_allocate(
        device: &ash::Device,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Option<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        unsafe { device.allocate_descriptor_sets(&alloc_info) }
            .ok()
            .and_then(|sets| sets.first().copied())
    }

    pub fn update_set(&self, set: vk::DescriptorSet, bindings: &[ResourceBinding]) {
        let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::with_capacity(bindings.len());
        let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::with_capacity(bindings.len());
        // Record (binding index, kind, info slot) so the write pass below
        // can hand each `WriteDescriptorSet` a single-element slice into a
        // vector that does not reallocate afterward.
        enum Slot {
            Buffer(usize, vk::DescriptorType),
            Image(usize, vk::DescriptorType),
        }
        let mut entries: Vec<(u32, Slot)> = Vec::with_capacity(bindings.len());

        for binding in bindings {
            match binding {
                ResourceBinding::UniformBuffer { binding, buffer, offset, range } => {
                    let idx = buffer_infos.len();
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(*buffer)
                            .offset(*offset)
                            .range(*range),
                    );
                    entries.push((*binding, Slot::Buffer(idx, vk::DescriptorType::UNIFORM_BUFFER)));
                }
                ResourceBinding::StorageBuffer { binding, buffer, offset, range } => {
                    let idx = buffer_infos.len();
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(*buffer)
                            .offset(*offset)
                            .range(*range),
                    );
                    entries.push((*binding, Slot::Buffer(idx, vk::DescriptorType::STORAGE_BUFFER)));
                }
                ResourceBinding::StorageImage { binding, view } => {
                    let idx = image_infos.len();
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(*view)
                            .image_layout(vk::ImageLayout::GENERAL),
                    );
                    entries.push((*binding, Slot::Image(idx, vk::DescriptorType::STORAGE_IMAGE)));
                }
                ResourceBinding::CombinedImageSampler { binding, view, sampler } => {
                    let idx = image_infos.len();
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(*view)
                            .sampler(*sampler)
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                    );
                    entries.push((
                        *binding,
                        Slot::Image(idx, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                    ));
                }
            }
        }

        let writes: Vec<vk::WriteDescriptorSet> = entries
            .iter()
            .map(|(binding, slot)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .dst_array_element(0);
                match slot {
                    Slot::Buffer(idx, ty) => base
                        .descriptor_type(*ty)
                        .buffer_info(std::slice::from_ref(&buffer_infos[*idx])),
                    Slot::Image(idx, ty) => base
                        .descriptor_type(*ty)
                        .image_info(std::slice::from_ref(&image_infos[*idx])),
                }
            })
            .collect();

        if writes.is_empty() {
            return;
        }
        unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };
    }

    // --------------------------------------------------------------- bindless

    pub fn init_bindless(&mut self, max_2d: u32, max_cube: u32) {
        self.bindless_registry = BindlessRegistry::new(max_2d, max_cube);

        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_2d)
                .stage_flags(vk::ShaderStageFlags::ALL),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_cube)
                .stage_flags(vk::ShaderStageFlags::ALL),
        ];
        let per_binding_flags = [
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING,
        ];

        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&per_binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);

        self.bindless_set_layout = match unsafe {
            self.ctx.device.create_descriptor_set_layout(&layout_info, None)
        } {
            Ok(layout) => layout,
            Err(err) => {
                log::error!("failed creating bindless descriptor set layout: {err}");
                return;
            }
        };

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_2d),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_cube),
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(1)
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND_POOL);
        self.bindless_pool = match unsafe { self.ctx.device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(err) => {
                log::error!("failed creating bindless descriptor pool: {err}");
                return;
            }
        };

        let counts = [max_2d, max_cube];
        let mut variable_count =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default().descriptor_counts(&counts);
        let layouts = [self.bindless_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.bindless_pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_count);
        self.bindless_set = match unsafe { self.ctx.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets[0],
            Err(err) => {
                log::error!("failed allocating bindless descriptor set: {err}");
                vk::DescriptorSet::null()
            }
        };

        log::info!("bindless registry initialized: {max_2d} 2D slots, {max_cube} cubemap slots");
    }

    fn write_bindless_slot(&self, array_binding: u32, index: u32, tex: BindlessSlotTexture) {
        if self.bindless_set == vk::DescriptorSet::null() {
            return;
        }
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(tex.view)
            .sampler(tex.sampler)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.bindless_set)
            .dst_binding(array_binding)
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
    }

    pub fn set_default_sentinel(&mut self, tex: BindlessSlotTexture) {
        self.default_sentinel = Some(tex);
    }

    pub fn allocate_bindless_texture(&mut self, tex: BindlessSlotTexture) -> u32 {
        let index = self.bindless_registry.allocate_2d(tex);
        if index != 0 {
            self.write_bindless_slot(0, index, tex);
        }
        index
    }

    pub fn allocate_bindless_cubemap(&mut self, tex: BindlessSlotTexture) -> u32 {
        let index = self.bindless_registry.allocate_cubemap(tex);
        if index != 0 {
            self.write_bindless_slot(1, index, tex);
        }
        index
    }

    pub fn allocate_bindless_texture_at(&mut self, tex: BindlessSlotTexture, index: u32) {
        self.bindless_registry.set_2d_at(index, tex);
        self.write_bindless_slot(0, index, tex);
    }

    /// Rewrites the freed slot to the default sentinel texture so a stale
    /// handle into a since-destroyed image can't be sampled before the slot
    /// is reallocated.
    pub fn free_bindless_texture(&mut self, index: u32) {
        self.bindless_registry.free_2d(index);
        if let Some(sentinel) = self.default_sentinel {
            self.write_bindless_slot(0, index, sentinel);
        }
    }

    pub fn free_bindless_cubemap(&mut self, index: u32) {
        self.bindless_registry.free_cubemap(index);
        if let Some(sentinel) = self.default_sentinel {
            self.write_bindless_slot(1, index, sentinel);
        }
    }

    pub fn bindless_set(&self) -> vk::DescriptorSet {
        self.bindless_set
    }

    pub fn max_bindless_2d(&self) -> u32 {
        self.bindless_registry.max_2d()
    }

    // ---------------------------------------------------------- material data

    pub fn init_material_data_buffer(&mut self, max_materials: u32) -> anyhow::Result<()> {
        let size = max_materials as vk::DeviceSize * MATERIAL_DATA_SIZE as vk::DeviceSize;
        let buffer = self.factory.create_buffer(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            "material-data-ssbo",
        )?;

        let layout_handle = self.register_layout(DescriptorLayoutDesc {
            name: "material-data".into(),
            bindings: vec![BindingDesc {
                binding: 0,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                stages: vk::ShaderStageFlags::FRAGMENT,
                count: 1,
                flags: vk::DescriptorBindingFlags::empty(),
            }],
            frequency: UpdateFrequency::Static,
            create_flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            is_bindless: false,
        });
        let set = self.allocate_set(layout_handle, 0);
        self.update_set(
            set,
            &[ResourceBinding::StorageBuffer {
                binding: 0,
                buffer: buffer.buffer,
                offset: 0,
                range: size,
            }],
        );

        self.material_layout = Some(layout_handle);
        self.material_slots = Some(MaterialDataSlots::new(max_materials));
        self.material_buffer = Some(buffer);
        self.material_set = Some(set);
        Ok(())
    }

    pub fn material_set(&self) -> Option<vk::DescriptorSet> {
        self.material_set
    }

    pub fn allocate_material_data(&mut self, row: MaterialData) -> u32 {
        let Some(slots) = self.material_slots.as_mut() else {
            log::error!("allocate_material_data: material SSBO not initialized");
            return 0;
        };
        let id = slots.allocate();
        if id != 0 {
            self.write_material_row(id, &row);
        }
        id
    }

    pub fn update_material_data(&mut self, id: u32, row: MaterialData) -> bool {
        if id == 0 {
            return false;
        }
        self.write_material_row(id, &row);
        true
    }

    pub fn free_material_data(&mut self, id: u32) -> bool {
        if id == 0 {
            return false;
        }
        let Some(slots) = self.material_slots.as_mut() else {
            return false;
        };
        slots.free(id);
        true
    }

    fn write_material_row(&self, id: u32, row: &MaterialData) {
        let Some(buffer) = self.material_buffer.as_ref() else {
            return;
        };
        buffer.write(id as vk::DeviceSize * MATERIAL_DATA_SIZE as vk::DeviceSize, row);
    }

    // -------------------------------------------------------------- samplers

    pub fn get_or_create_sampler(&mut self, config: SamplerConfig) -> vk::Sampler {
        let key = config.hash();
        if let Some(sampler) = self.samplers.get(&key) {
            return *sampler;
        }
        let sampler = match unsafe {
            self.ctx.device.create_sampler(&config.to_vk_create_info(), None)
        } {
            Ok(sampler) => sampler,
            Err(err) => {
                log::error!("vkCreateSampler failed: {err}");
                return vk::Sampler::null();
            }
        };
        self.samplers.insert(key, sampler);
        sampler
    }

    pub fn get_sampler(&mut self, ty: SamplerType) -> vk::Sampler {
        let config = SamplerConfig::for_type(ty, self.ctx.limits.max_sampler_anisotropy as f32);
        self.get_or_create_sampler(config)
    }

    // ----------------------------------------------------- pipeline layouts

    pub fn get_or_create_pipeline_layout_cache(
        &mut self,
        vert: &ShaderLayoutInfo,
        frag: Option<&ShaderLayoutInfo>,
    ) -> PipelineLayoutCacheHandle {
        let mut hasher = FxHasher::default();
        for handle in &vert.layout_handles {
            handle.0.hash(&mut hasher);
        }
        vert.push_constant_handle.0.hash(&mut hasher);
        if let Some(frag) = frag {
            for handle in &frag.layout_handles {
                handle.0.hash(&mut hasher);
            }
            frag.push_constant_handle.0.hash(&mut hasher);
        }
        let key = hasher.finish();
        if let Some(entry) = self.pipeline_layout_cache.get(&key) {
            return entry.handle;
        }

        let all_layout_handles: Vec<LayoutHandle> = vert
            .layout_handles
            .iter()
            .chain(frag.map(|f| f.layout_handles.iter()).into_iter().flatten())
            .copied()
            .collect();
        let vk_layouts: Vec<vk::DescriptorSetLayout> = all_layout_handles
            .iter()
            .filter_map(|h| self.layouts.get(h).map(|r| r.vk_layout))
            .collect();
        let bindless_set_indices: Vec<u32> = all_layout_handles
            .iter()
            .enumerate()
            .filter_map(|(i, h)| self.layouts.get(h).filter(|r| r.is_bindless).map(|_| i as u32))
            .collect();

        let mut push_ranges: Vec<vk::PushConstantRange> = Vec::new();
        if let Some(desc) = self.push_constants.get(&vert.push_constant_handle) {
            push_ranges.extend(desc.ranges.iter().copied());
        }
        if let Some(frag) = frag {
            if frag.push_constant_handle != vert.push_constant_handle {
                if let Some(desc) = self.push_constants.get(&frag.push_constant_handle) {
                    push_ranges.extend(desc.ranges.iter().copied());
                }
            }
        }

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&vk_layouts)
            .push_constant_ranges(&push_ranges);
        let pipeline_layout = match unsafe { self.ctx.device.create_pipeline_layout(&create_info, None) }
        {
            Ok(layout) => layout,
            Err(err) => {
                log::error!("vkCreatePipelineLayout failed: {err}");
                vk::PipelineLayout::null()
            }
        };

        let mut resource_name_to_set: HashMap<String, u32> = HashMap::new();
        for (name, set_index) in vert.resource_names.iter().chain(
            frag.map(|f| f.resource_names.iter()).into_iter().flatten(),
        ) {
            resource_name_to_set.insert(name.clone(), *set_index);
        }

        let handle = PipelineLayoutCacheHandle(self.next_pipeline_layout_id);
        self.next_pipeline_layout_id += 1;
        self.pipeline_layout_cache.insert(
            key,
            PipelineLayoutCacheEntry {
                handle,
                pipeline_layout,
                resource_name_to_set,
                bindless_set_indices,
            },
        );
        handle
    }

    /// The raw Vulkan layout behind a `LayoutHandle`, needed by callers that
    /// assemble a `PipelineConfig`'s descriptor-set-layout list directly.
    pub fn vk_layout(&self, handle: LayoutHandle) -> Option<vk::DescriptorSetLayout> {
        self.layouts.get(&handle).map(|r| r.vk_layout)
    }

    pub fn pipeline_layout(&self, handle: PipelineLayoutCacheHandle) -> Option<vk::PipelineLayout> {
        self.pipeline_layout_cache
            .values()
            .find(|e| e.handle == handle)
            .map(|e| e.pipeline_layout)
    }

    // ------------------------------------------------------------- uniforms

    pub fn create_uniform(
        &mut self,
        name: &str,
        layout: UboLayout,
        frequency: UpdateFrequency,
    ) -> UniformHandle {
        let buffer_size = layout.total_size;
        let aligned_stride = match frequency {
            UpdateFrequency::PerFrame => self.ctx.limits.align_uniform(buffer_size as u64) as u32,
            _ => buffer_size,
        };
        let total_size = match frequency {
            UpdateFrequency::PerFrame => aligned_stride as vk::DeviceSize * self.frames_in_flight as vk::DeviceSize,
            _ => buffer_size as vk::DeviceSize,
        };

        let buffer = match self.factory.create_buffer(
            total_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            name,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                log::error!("create_uniform({name}): failed allocating buffer: {err}");
                return UniformHandle::INVALID;
            }
        };

        let descriptor_type = match frequency {
            UpdateFrequency::PerFrame => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            _ => vk::DescriptorType::UNIFORM_BUFFER,
        };
        // `register_layout` already dedups on content hash, so two managed
        // uniforms with the same shape and frequency collapse onto one
        // `vk::DescriptorSetLayout` regardless of name.
        let layout_handle = self.register_layout(DescriptorLayoutDesc {
            name: format!("uniform-{name}"),
            bindings: vec![BindingDesc {
                binding: 0,
                descriptor_type,
                stages: vk::ShaderStageFlags::ALL,
                count: 1,
                flags: vk::DescriptorBindingFlags::empty(),
            }],
            frequency,
            create_flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            is_bindless: false,
        });

        let set = self.allocate_set(layout_handle, self.current_frame);
        let range = match frequency {
            UpdateFrequency::PerFrame => aligned_stride as vk::DeviceSize,
            _ => buffer_size as vk::DeviceSize,
        };
        self.update_set(
            set,
            &[ResourceBinding::UniformBuffer {
                binding: 0,
                buffer: buffer.buffer,
                offset: 0,
                range,
            }],
        );

        let info = UniformSetInfo::new(
            buffer,
            set,
            layout_handle,
            frequency,
            buffer_size,
            aligned_stride,
            layout
                .fields
                .into_iter()
                .map(|f| super::uniform::UboField {
                    name: f.name,
                    offset: f.offset,
                    size: f.size,
                })
                .collect(),
        );
        self.uniforms.push(info);
        UniformHandle(self.uniforms.len() as u32)
    }

    pub fn uniform_writer(&mut self, handle: UniformHandle) -> Option<UniformWriter<'_>> {
        if handle == UniformHandle::INVALID {
            return None;
        }
        let frame_index = self.current_frame;
        self.uniforms
            .get_mut((handle.0 - 1) as usize)
            .map(|info| UniformWriter { info, frame_index })
    }

    pub fn uniform_info(&self, handle: UniformHandle) -> Option<&UniformSetInfo> {
        if handle == UniformHandle::INVALID {
            return None;
        }
        self.uniforms.get((handle.0 - 1) as usize)
    }

    // --------------------------------------------------------------- binding

    pub fn bind_descriptors(
        &self,
        cmd: vk::CommandBuffer,
        plc_handle: PipelineLayoutCacheHandle,
        pipeline_layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
        named: &[NamedDescriptor],
    ) {
        let Some(entry) = self.pipeline_layout_cache.values().find(|e| e.handle == plc_handle) else {
            log::error!("bind_descriptors: unknown pipeline layout cache handle");
            return;
        };

        for descriptor in named {
            let Some(&set_index) = entry.resource_name_to_set.get(&descriptor.name) else {
                log::warn!("bind_descriptors: unresolved resource name '{}'", descriptor.name);
                continue;
            };
            let set = if entry.bindless_set_indices.contains(&set_index) {
                self.bindless_set
            } else {
                descriptor.set.unwrap_or(vk::DescriptorSet::null())
            };
            if set == vk::DescriptorSet::null() {
                continue;
            }
            let sets = [set];
            let offsets: Vec<u32> = descriptor.dynamic_offset.into_iter().collect();
            unsafe {
                self.ctx.device.cmd_bind_descriptor_sets(
                    cmd,
                    bind_point,
                    pipeline_layout,
                    set_index,
                    &sets,
                    &offsets,
                );
            }
        }
    }
}
