//! Presentation surface and swapchain lifecycle. Window/surface creation is
//! still an external collaborator's job (mirroring `GraphicsContext`); this
//! module is handed an already-created `vk::SurfaceKHR` and owns everything
//! downstream of it: image count/format/present-mode negotiation, the
//! `VkSwapchainKHR` itself, acquire, present, and recreate-on-resize or
//! out-of-date.

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use ash::vk;

use crate::context::GraphicsContext;
use crate::error::RendererError;
use crate::resource::{ImageResource, ResourceFactory};

pub struct SwapchainCreateOptions {
    pub vsync: bool,
}

struct SwapchainImage {
    image: ImageResource,
}

/// Owns the `VkSwapchainKHR` and its images. Acquired images are imported
/// through `ResourceFactory::from_external_image` since their memory belongs
/// to the presentation engine, not this crate's allocator.
pub struct Swapchain {
    ctx: Arc<GraphicsContext>,
    factory: ResourceFactory,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<SwapchainImage>,
}

impl Swapchain {
    pub fn new(
        ctx: Arc<GraphicsContext>,
        surface: vk::SurfaceKHR,
        window_size: (u32, u32),
        options: &SwapchainCreateOptions,
    ) -> anyhow::Result<Self> {
        let factory = ResourceFactory::new(ctx.clone());
        let mut swapchain = Self {
            ctx,
            factory,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            images: Vec::new(),
        };
        swapchain.create(window_size, options, vk::SwapchainKHR::null())?;
        Ok(swapchain)
    }

    fn surface_capabilities(&self) -> anyhow::Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    fn presentation_mode(&self, options: &SwapchainCreateOptions) -> anyhow::Result<vk::PresentModeKHR> {
        let modes = unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_present_modes(self.ctx.physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let preferred = if options.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            vk::PresentModeKHR::IMMEDIATE
        };
        if modes.contains(&preferred) {
            return Ok(preferred);
        }

        let fallback = if options.vsync {
            vk::PresentModeKHR::FIFO_RELAXED
        } else {
            vk::PresentModeKHR::MAILBOX
        };
        if modes.contains(&fallback) {
            log::warn!("requested present mode unavailable, falling back to {fallback:?}");
            return Ok(fallback);
        }

        log::warn!("neither requested nor fallback present mode is available, using the first reported mode");
        modes
            .first()
            .copied()
            .ok_or_else(|| anyhow!("device reported no present modes"))
    }

    fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
        let wanted = caps.min_image_count + 1;
        let max = if caps.max_image_count == 0 {
            u32::MAX
        } else {
            caps.max_image_count
        };
        wanted.clamp(caps.min_image_count, max)
    }

    fn image_extent(window_size: (u32, u32), caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
        if caps.current_extent.width != u32::MAX {
            return caps.current_extent;
        }
        vk::Extent2D {
            width: window_size
                .0
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_size
                .1
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    fn image_usage(caps: &vk::SurfaceCapabilitiesKHR) -> anyhow::Result<vk::ImageUsageFlags> {
        let wanted = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        if caps.supported_usage_flags & wanted != wanted {
            return Err(anyhow!(
                "surface does not support the required image usages (supported: {:?})",
                caps.supported_usage_flags
            ));
        }
        Ok(wanted)
    }

    fn transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
        if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        }
    }

    fn surface_format(&self) -> anyhow::Result<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_formats(self.ctx.physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

        if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
            log::warn!("surface reported an undefined format, defaulting to B8G8R8A8_UNORM/SRGB_NONLINEAR");
            return Ok(vk::SurfaceFormatKHR::default()
                .format(vk::Format::B8G8R8A8_UNORM)
                .color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR));
        }

        let srgb: Vec<vk::SurfaceFormatKHR> = formats
            .iter()
            .copied()
            .filter(|f| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .collect();
        srgb.iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
            .or_else(|| srgb.iter().find(|f| f.format == vk::Format::R8G8B8A8_UNORM))
            .or_else(|| srgb.first())
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| anyhow!("device reported no surface formats"))
    }

    fn create(
        &mut self,
        window_size: (u32, u32),
        options: &SwapchainCreateOptions,
        old: vk::SwapchainKHR,
    ) -> anyhow::Result<()> {
        let caps = self.surface_capabilities()?;
        let present_mode = self.presentation_mode(options)?;
        let image_count = Self::image_count(&caps);
        let extent = Self::image_extent(window_size, &caps);
        let usage = Self::image_usage(&caps)?;
        let transform = Self::transform(&caps);
        let format = self.surface_format()?;

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let swapchain = unsafe { self.ctx.swapchain_loader.create_swapchain(&create_info, None) }
            .context("vkCreateSwapchainKHR")?;

        if old != vk::SwapchainKHR::null() {
            unsafe { self.ctx.swapchain_loader.destroy_swapchain(old, None) };
        }

        let raw_images = unsafe { self.ctx.swapchain_loader.get_swapchain_images(swapchain) }
            .context("vkGetSwapchainImagesKHR")?;
        let vk_extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        };
        let mut images = Vec::with_capacity(raw_images.len());
        for image in raw_images {
            let image = self.factory.from_external_image(image, format.format, vk_extent)?;
            images.push(SwapchainImage { image });
        }

        log::info!(
            "swapchain created: {}x{}, {} images, format {:?}, present mode {present_mode:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
        );

        self.swapchain = swapchain;
        self.format = format;
        self.extent = extent;
        self.images = images;
        Ok(())
    }

    /// Call after the window resizes or `acquire_next_image`/`present`
    /// reports `SwapchainOutOfDate`. Waits for the device to go idle before
    /// tearing down the old image views.
    pub fn recreate(&mut self, window_size: (u32, u32), options: &SwapchainCreateOptions) -> anyhow::Result<()> {
        self.ctx.wait_idle();
        self.destroy_views();
        let old = self.swapchain;
        self.create(window_size, options, old)
    }

    fn destroy_views(&mut self) {
        for img in self.images.drain(..) {
            unsafe { self.ctx.device.destroy_image_view(img.image.view, None) };
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Acquires the next presentable image, signaling `semaphore` once it's
    /// ready to be written. Both outcomes a per-frame caller must treat as
    /// recoverable rather than fatal — `SwapchainOutOfDate` (the image is
    /// unusable) and `SwapchainSuboptimal` (usable, but the surface no
    /// longer matches it) — are returned as `Err` so `handle_frame_result`
    /// can route either one to `recreate` without the caller special-casing
    /// them; see `RendererError::is_recoverable_per_frame`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<u32, RendererError> {
        let result = unsafe {
            self.ctx
                .swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(index),
            Ok((_, true)) => {
                log::warn!("vkAcquireNextImageKHR returned a suboptimal image");
                Err(RendererError::SwapchainSuboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RendererError::SwapchainOutOfDate),
            Err(err) => {
                log::error!("vkAcquireNextImageKHR failed: {err}");
                Err(RendererError::SwapchainOutOfDate)
            }
        }
    }

    /// The `(vk::Image, vk::ImageView)` pair for an acquired index, ready to
    /// hand to `ForwardRenderer::render_frame`.
    pub fn image(&self, index: u32) -> Option<(vk::Image, vk::ImageView)> {
        self.images.get(index as usize).map(|img| (img.image.image, img.image.view))
    }

    /// Presents `index` on `queue` after waiting on `wait_semaphore`. The
    /// frame has already been submitted and shown by the time a suboptimal
    /// result comes back, so it surfaces the same way `acquire_next_image`'s
    /// does: as a recoverable `Err` the caller routes through
    /// `handle_frame_result`.
    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, index: u32) -> Result<(), RendererError> {
        let swapchains = [self.swapchain];
        let indices = [index];
        let waits = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.ctx.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                log::warn!("vkQueuePresentKHR reported a suboptimal swapchain");
                Err(RendererError::SwapchainSuboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RendererError::SwapchainOutOfDate),
            Err(err) => {
                log::error!("vkQueuePresentKHR failed: {err}");
                Err(RendererError::SwapchainOutOfDate)
            }
        }
    }

    /// Routes an acquire/present outcome through `recreate` when it's
    /// per-frame recoverable, and propagates anything else as fatal. Callers
    /// drive their frame loop as `swapchain.handle_frame_result(swapchain.present(...), ...)`.
    pub fn handle_frame_result(
        &mut self,
        result: Result<(), RendererError>,
        window_size: (u32, u32),
        options: &SwapchainCreateOptions,
    ) -> anyhow::Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_recoverable_per_frame() => self.recreate(window_size, options),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.ctx.swapchain_loader.destroy_swapchain(self.swapchain, None) };
        }
    }
}
