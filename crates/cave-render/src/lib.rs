// SPDX-License-Identifier: CEPL-1.0
//! GPU resource lifecycle and frame submission for a single textured mesh.
//!
//! Everything talks to the driver through [`GpuBackend`]; the Vulkan implementation lives
//! in `cave-render-vk`, and [`mock::MockBackend`] records calls in memory for tests.

mod backend;
mod config;
mod context;
mod error;
mod factory;
mod frame;
mod renderer;
mod resources;
mod select;
mod shader;
mod swapchain;
mod teardown;
mod transfer;

pub mod mock;

pub use ash::vk;

pub use backend::GpuBackend;
pub use config::{
    BufferBarrier, BufferConfig, DescriptorPoolConfig, DescriptorSetLayoutConfig, DescriptorWrite,
    DeviceConfig, FramebufferConfig, GraphicsPipelineConfig, ImageConfig, ImageViewConfig,
    InstanceConfig, LayoutBinding, LayoutTransition, PipelineLayoutConfig, PresentConfig,
    PresentPreference, RenderPassBegin, RenderPassConfig, RendererConfig, SamplerConfig, Sharing,
    SubmitConfig, SwapchainConfig, VALIDATION_LAYER,
};
pub use context::{select_physical_device, AdapterSelection, DeviceContext, DEVICE_EXTENSIONS};
pub use error::{RenderError, RenderResult, VkResultExt};
pub use factory::{ResourceFactory, TEXTURE_FORMAT};
pub use frame::{record_draw_commands, Camera, FrameLoop, FrameState};
pub use renderer::Renderer;
pub use resources::{
    AssetPaths, AssetSource, CameraUbo, GpuBuffer, GpuImage, Mesh, MeshData, PipelineBundle,
    TextureData, UniformBuffers, Vertex,
};
pub use select::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    find_memory_type, QueueFamilyIndices, DEPTH_FORMAT_CANDIDATES,
};
pub use shader::{load_spirv, SPIRV_MAGIC};
pub use swapchain::{create_swapchain, PresentationSurface, SwapchainImage};
pub use teardown::{Owned, Teardown};
pub use transfer::{TransferEngine, HOST_VISIBLE};

/// Drawable size in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}
