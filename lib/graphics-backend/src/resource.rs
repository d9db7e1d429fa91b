//! GPU allocation primitives (`BufferResource` / `ImageResource`) and
//! the factory that creates them, including staging-buffer uploads driven
//! through single-time command submission: these block on `queueWaitIdle`
//! before returning, and a failure is fatal.

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use crate::context::GraphicsContext;

pub struct BufferResource {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
    /// Non-null iff the allocation was created with a CPU-visible memory
    /// location.
    pub mapped_ptr: Option<*mut u8>,
}

unsafe impl Send for BufferResource {}
unsafe impl Sync for BufferResource {}

impl BufferResource {
    /// Safety: caller must ensure `offset + std::mem::size_of::<T>() <= size`
    /// and that `T` has no padding that must stay zeroed in a way the shader
    /// cares about.
    pub fn write<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, value: &T) {
        let Some(ptr) = self.mapped_ptr else {
            log::error!("write() called on a non-mapped BufferResource");
            return;
        };
        let bytes = bytemuck::bytes_of(value);
        debug_assert!(offset + bytes.len() as vk::DeviceSize <= self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(offset as usize), bytes.len());
        }
    }

    pub fn write_bytes(&self, offset: vk::DeviceSize, bytes: &[u8]) {
        let Some(ptr) = self.mapped_ptr else {
            log::error!("write_bytes() called on a non-mapped BufferResource");
            return;
        };
        debug_assert!(offset + bytes.len() as vk::DeviceSize <= self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(offset as usize), bytes.len());
        }
    }
}

pub struct ImageResource {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub view: vk::ImageView,
    pub view_type: vk::ImageViewType,
    /// `true` when `image` is not owned by this allocation (e.g. swapchain
    /// images imported via `from_external`) — `Drop`/explicit destroy must
    /// not free it.
    pub external: bool,
}

pub struct ResourceFactory {
    ctx: Arc<GraphicsContext>,
}

impl ResourceFactory {
    pub fn new(ctx: Arc<GraphicsContext>) -> Self {
        Self { ctx }
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> anyhow::Result<BufferResource> {
        let buffer = unsafe {
            self.ctx.device.create_buffer(
                &vk::BufferCreateInfo::default()
                    .size(size)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                None,
            )
        }
        .context("vkCreateBuffer")?;

        let requirements = unsafe { self.ctx.device.get_buffer_memory_requirements(buffer) };
        let mut allocation = self
            .ctx
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .context("allocating buffer memory")?;

        unsafe {
            self.ctx
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }
        .context("vkBindBufferMemory")?;

        let mapped_ptr = allocation.mapped_ptr().map(|p| p.as_ptr() as *mut u8);
        let mapped_ptr = mapped_ptr.or_else(|| {
            // `gpu-allocator` leaves `mapped_ptr` populated only for
            // persistently-mapped allocations created with a CPU-visible
            // location; re-check here so CPU_TO_GPU buffers (the
            // MaterialData SSBO, PerFrame UBO) are always host-writable.
            if matches!(
                location,
                MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu
            ) {
                allocation.mapped_slice_mut().map(|s| s.as_mut_ptr())
            } else {
                None
            }
        });

        Ok(BufferResource {
            buffer,
            allocation: Some(allocation),
            size,
            mapped_ptr,
        })
    }

    pub fn create_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mip_levels: u32,
        array_layers: u32,
        cubemap: bool,
        name: &str,
    ) -> anyhow::Result<ImageResource> {
        let image = unsafe {
            self.ctx.device.create_image(
                &vk::ImageCreateInfo::default()
                    .image_type(vk::ImageType::TYPE_2D)
                    .format(format)
                    .extent(extent)
                    .mip_levels(mip_levels)
                    .array_layers(array_layers)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .tiling(vk::ImageTiling::OPTIMAL)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .flags(if cubemap {
                        vk::ImageCreateFlags::CUBE_COMPATIBLE
                    } else {
                        vk::ImageCreateFlags::empty()
                    }),
                None,
            )
        }
        .context("vkCreateImage")?;

        let requirements = unsafe { self.ctx.device.get_image_memory_requirements(image) };
        let allocation = self
            .ctx
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .context("allocating image memory")?;

        unsafe {
            self.ctx
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        }
        .context("vkBindImageMemory")?;

        let view_type = if cubemap {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view = self.create_view(
            image,
            format,
            view_type,
            0,
            mip_levels,
            0,
            array_layers,
            Self::aspect_for_format(format),
        )?;

        Ok(ImageResource {
            image,
            allocation: Some(allocation),
            extent,
            format,
            mip_levels,
            array_layers,
            view,
            view_type,
            external: false,
        })
    }

    /// Imports a swapchain-owned image: the factory never allocates or frees
    /// its memory, only creates the view it's asked for.
    pub fn from_external_image(
        &self,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent3D,
    ) -> anyhow::Result<ImageResource> {
        let view = self.create_view(
            image,
            format,
            vk::ImageViewType::TYPE_2D,
            0,
            1,
            0,
            1,
            vk::ImageAspectFlags::COLOR,
        )?;
        Ok(ImageResource {
            image,
            allocation: None,
            extent,
            format,
            mip_levels: 1,
            array_layers: 1,
            view,
            view_type: vk::ImageViewType::TYPE_2D,
            external: true,
        })
    }

    /// Additional view for one mip or one cubemap face, created on demand
    /// for cubemaps and mip chains.
    pub fn create_mip_view(&self, image: &ImageResource, mip: u32) -> anyhow::Result<vk::ImageView> {
        self.create_view(
            image.image,
            image.format,
            vk::ImageViewType::TYPE_2D,
            mip,
            1,
            0,
            1,
            Self::aspect_for_format(image.format),
        )
    }

    pub fn create_face_view(
        &self,
        image: &ImageResource,
        face: u32,
    ) -> anyhow::Result<vk::ImageView> {
        self.create_view(
            image.image,
            image.format,
            vk::ImageViewType::TYPE_2D,
            0,
            image.mip_levels,
            face,
            1,
            Self::aspect_for_format(image.format),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        view_type: vk::ImageViewType,
        base_mip: u32,
        mip_count: u32,
        base_layer: u32,
        layer_count: u32,
        aspect: vk::ImageAspectFlags,
    ) -> anyhow::Result<vk::ImageView> {
        unsafe {
            self.ctx.device.create_image_view(
                &vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(view_type)
                    .format(format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(aspect)
                            .base_mip_level(base_mip)
                            .level_count(mip_count)
                            .base_array_layer(base_layer)
                            .layer_count(layer_count),
                    ),
                None,
            )
        }
        .context("vkCreateImageView")
    }

    fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
            vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    /// Single-time command submission: allocate, record via `record`,
    /// submit, and block on `queueWaitIdle`. This is fatal on
    /// failure — the caller cannot proceed without the resource it was
    /// uploading.
    pub fn submit_single_time<F>(&self, record: F) -> anyhow::Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.ctx.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.ctx.device.allocate_command_buffers(&alloc_info) }
            .context("allocating single-time command buffer")?[0];

        unsafe {
            self.ctx.device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
        }
        .context("vkBeginCommandBuffer")?;

        record(cmd);

        unsafe { self.ctx.device.end_command_buffer(cmd) }.context("vkEndCommandBuffer")?;

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, &[submit], vk::Fence::null())
        }
        .context("vkQueueSubmit")?;
        unsafe { self.ctx.device.queue_wait_idle(self.ctx.graphics_queue) }
            .map_err(|err| anyhow!("single-time command submission failed to complete: {err}"))?;

        unsafe {
            self.ctx
                .device
                .free_command_buffers(self.ctx.command_pool, &cmds)
        };
        Ok(())
    }

    /// Uploads `data` into `dst` through a transient host-visible staging
    /// buffer, via a single-time copy.
    pub fn upload_buffer(&self, dst: &BufferResource, data: &[u8]) -> anyhow::Result<()> {
        let staging = self.create_buffer(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "staging-buffer-upload",
        )?;
        staging.write_bytes(0, data);

        self.submit_single_time(|cmd| unsafe {
            self.ctx.device.cmd_copy_buffer(
                cmd,
                staging.buffer,
                dst.buffer,
                &[vk::BufferCopy::default().size(data.len() as vk::DeviceSize)],
            );
        })?;

        self.destroy_buffer(staging);
        Ok(())
    }

    pub fn destroy_buffer(&self, mut buffer: BufferResource) {
        unsafe { self.ctx.device.destroy_buffer(buffer.buffer, None) };
        if let Some(allocation) = buffer.allocation.take() {
            let _ = self.ctx.allocator.lock().free(allocation);
        }
    }

    pub fn destroy_image(&self, mut image: ImageResource) {
        unsafe { self.ctx.device.destroy_image_view(image.view, None) };
        if !image.external {
            unsafe { self.ctx.device.destroy_image(image.image, None) };
            if let Some(allocation) = image.allocation.take() {
                let _ = self.ctx.allocator.lock().free(allocation);
            }
        }
    }
}
