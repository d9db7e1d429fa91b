//! Process-wide Vulkan state. Window/surface
//! creation is an external collaborator's job; this module is
//! handed an already-created `vk::SurfaceKHR` and takes it from there:
//! physical device selection, logical device + queues, the allocator, and
//! the primary command pool.

use std::ffi::CStr;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use graphics_types::Limits;
use parking_lot::Mutex;

use crate::error::RendererError;

/// Extensions/features the window layer negotiated before handing us the
/// surface.
pub struct DisplayRequirements {
    pub validation_enabled: bool,
    pub instance_extensions: Vec<&'static CStr>,
}

pub struct GraphicsContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,

    pub graphics_queue_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub compute_queue: vk::Queue,
    pub transfer_queue: vk::Queue,

    pub allocator: Mutex<Allocator>,
    pub command_pool: vk::CommandPool,
    pub limits: Limits,

    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub dynamic_rendering_loader: ash::khr::dynamic_rendering::Device,
}

impl GraphicsContext {
    const REQUIRED_DEVICE_EXTENSIONS: &'static [&'static CStr] = &[
        ash::khr::swapchain::NAME,
        ash::khr::dynamic_rendering::NAME,
        ash::khr::synchronization2::NAME,
        ash::khr::timeline_semaphore::NAME,
    ];

    pub fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
    ) -> anyhow::Result<Arc<Self>> {
        let physical_device = Self::select_physical_device(&instance, &surface_loader, surface)?;
        let limits = Self::query_limits(&instance, physical_device);
        Self::verify_required_features(&instance, physical_device)?;

        let graphics_queue_family =
            Self::find_graphics_queue_family(&instance, physical_device, &surface_loader, surface)?;

        let device = Self::create_logical_device(&instance, physical_device, graphics_queue_family)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        // A single general-purpose queue family serves graphics/present/compute/transfer;
        // engines that need dedicated compute/transfer queues select additional families here.
        let present_queue = graphics_queue;
        let compute_queue = graphics_queue;
        let transfer_queue = graphics_queue;

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(graphics_queue_family)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }
        .context("creating primary command pool")?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("creating gpu-allocator instance")?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let dynamic_rendering_loader = ash::khr::dynamic_rendering::Device::new(&instance, &device);

        log::info!(
            "vulkan device selected, graphics queue family {graphics_queue_family}, \
             min_uniform_align={}",
            limits.min_uniform_align
        );

        Ok(Arc::new(Self {
            entry,
            instance,
            physical_device,
            device,
            graphics_queue_family,
            graphics_queue,
            present_queue,
            compute_queue,
            transfer_queue,
            allocator: Mutex::new(allocator),
            command_pool,
            limits,
            surface_loader,
            swapchain_loader,
            dynamic_rendering_loader,
        }))
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> anyhow::Result<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("enumerating physical devices")?;
        devices
            .into_iter()
            .find(|&pd| Self::find_graphics_queue_family(instance, pd, surface_loader, surface).is_ok())
            .ok_or_else(|| anyhow!("no Vulkan 1.3-class device with a graphics+present queue found"))
    }

    fn find_graphics_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> anyhow::Result<u32> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        for (index, family) in families.iter().enumerate() {
            let supports_present = unsafe {
                surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index as u32,
                    surface,
                )
            }
            .unwrap_or(false);
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_present {
                return Ok(index as u32);
            }
        }
        Err(anyhow!("no combined graphics+present queue family"))
    }

    fn verify_required_features(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> anyhow::Result<()> {
        let mut descriptor_indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default();
        let mut timeline_semaphore = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
        let mut sync2 = vk::PhysicalDeviceSynchronization2Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut descriptor_indexing)
            .push_next(&mut dynamic_rendering)
            .push_next(&mut timeline_semaphore)
            .push_next(&mut sync2);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };

        if features2.features.sampler_anisotropy == vk::FALSE {
            return Err(RendererError::MissingDeviceFeature("samplerAnisotropy").into());
        }
        if dynamic_rendering.dynamic_rendering == vk::FALSE {
            return Err(RendererError::MissingDeviceFeature("dynamicRendering").into());
        }
        if descriptor_indexing.runtime_descriptor_array == vk::FALSE
            || descriptor_indexing.descriptor_binding_partially_bound == vk::FALSE
            || descriptor_indexing.descriptor_binding_update_unused_while_pending == vk::FALSE
        {
            return Err(RendererError::MissingDeviceFeature("descriptorIndexing").into());
        }
        if timeline_semaphore.timeline_semaphore == vk::FALSE {
            return Err(RendererError::MissingDeviceFeature("timelineSemaphore").into());
        }
        if sync2.synchronization2 == vk::FALSE {
            return Err(RendererError::MissingDeviceFeature("synchronization2").into());
        }
        Ok(())
    }

    fn query_limits(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Limits {
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        Limits {
            non_coherent_mem_alignment: props.limits.non_coherent_atom_size,
            optimal_image_copy_mem_alignment: props.limits.optimal_buffer_copy_offset_alignment,
            max_texture_size: props.limits.max_image_dimension2_d,
            max_sampler_anisotropy: props.limits.max_sampler_anisotropy as u32,
            min_uniform_align: props.limits.min_uniform_buffer_offset_alignment as u32,
            max_multi_sample: props.limits.framebuffer_color_sample_counts,
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> anyhow::Result<ash::Device> {
        let queue_priorities = [1.0f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities);

        let mut descriptor_indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default()
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_update_unused_while_pending(true)
            .descriptor_binding_variable_descriptor_count(true)
            .shader_sampled_image_array_non_uniform_indexing(true);
        let mut dynamic_rendering =
            vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut timeline_semaphore =
            vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true);
        let mut sync2 = vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const i8> = Self::REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let queue_create_infos = [queue_create_info];
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut descriptor_indexing)
            .push_next(&mut dynamic_rendering)
            .push_next(&mut timeline_semaphore)
            .push_next(&mut sync2);

        unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .context("creating logical device")
    }

    /// Call after submitting the last frame, before tearing anything down —
    /// the context is always torn down last.
    pub fn wait_idle(&self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        self.wait_idle();
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("graphics_queue_family", &self.graphics_queue_family)
            .finish()
    }
}
