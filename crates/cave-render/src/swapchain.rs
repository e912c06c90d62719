// SPDX-License-Identifier: CEPL-1.0
//! Swapchain negotiation and the per-image objects hanging off it.

use ash::vk;
use tracing::info;

use crate::backend::GpuBackend;
use crate::config::{FramebufferConfig, ImageViewConfig, PresentPreference, SwapchainConfig};
use crate::context::DeviceContext;
use crate::error::RenderResult;
use crate::select::{choose_extent, choose_present_mode, choose_surface_format};
use crate::teardown::{Owned, Teardown};
use crate::RenderSize;

/// The image belongs to the swapchain and is never destroyed on its own.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub command_buffer: vk::CommandBuffer,
}

#[derive(Debug)]
pub struct PresentationSurface {
    pub surface: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<SwapchainImage>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl PresentationSurface {
    /// Negotiates format, extent, image count and present mode, then creates the
    /// swapchain and one view + command buffer per image.
    ///
    /// `old`, when given, must no longer be tracked by `teardown`; it is destroyed once
    /// the replacement exists.
    pub fn new<B: GpuBackend>(
        gpu: &mut B,
        teardown: &mut Teardown,
        context: &DeviceContext,
        pool: vk::CommandPool,
        requested: RenderSize,
        preference: PresentPreference,
        old: Option<vk::SwapchainKHR>,
    ) -> RenderResult<Self> {
        let phys = context.physical_device;
        let surface = context.surface;
        let caps = gpu.surface_capabilities(phys, surface)?;
        let format = choose_surface_format(&gpu.surface_formats(phys, surface)?)?;
        let present_mode =
            choose_present_mode(&gpu.surface_present_modes(phys, surface)?, preference);
        let extent = choose_extent(&caps, requested);

        let config = SwapchainConfig::new(
            surface,
            &caps,
            format,
            extent,
            present_mode,
            context.families,
            old,
        )?;
        let swapchain = create_swapchain(gpu, &config, old)?;
        teardown.push(Owned::Swapchain(swapchain));

        let mut images = Vec::new();
        for image in gpu.swapchain_images(swapchain)? {
            let command_buffer = gpu.allocate_command_buffer(pool)?;
            teardown.push(Owned::CommandBuffer {
                pool,
                cmd: command_buffer,
            });
            let view = gpu.create_image_view(&ImageViewConfig::new(
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
            ))?;
            teardown.push(Owned::ImageView(view));
            images.push(SwapchainImage {
                image,
                view,
                command_buffer,
            });
        }

        info!(
            "swapchain: {:?}/{:?}, {:?}, {}x{}, {} images",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            images.len()
        );

        Ok(Self {
            surface,
            format,
            present_mode,
            extent,
            swapchain,
            images,
            framebuffers: Vec::new(),
        })
    }

    /// One framebuffer per image: that image's view, then the shared depth view.
    pub fn create_framebuffers<B: GpuBackend>(
        &mut self,
        gpu: &mut B,
        teardown: &mut Teardown,
        render_pass: vk::RenderPass,
        depth_view: vk::ImageView,
    ) -> RenderResult<()> {
        for image in &self.images {
            let config = FramebufferConfig::new(render_pass, image.view, depth_view, self.extent);
            let framebuffer = gpu.create_framebuffer(&config)?;
            teardown.push(Owned::Framebuffer(framebuffer));
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// Creates the new swapchain first, then retires `old`.
pub fn create_swapchain<B: GpuBackend>(
    gpu: &mut B,
    config: &SwapchainConfig,
    old: Option<vk::SwapchainKHR>,
) -> RenderResult<vk::SwapchainKHR> {
    let swapchain = gpu.create_swapchain(config)?;
    if let Some(old) = old {
        gpu.destroy_swapchain(old);
    }
    Ok(swapchain)
}
