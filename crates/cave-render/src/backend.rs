// SPDX-License-Identifier: CEPL-1.0
//! The seam every component is written against.
//!
//! Handles and enums are `ash::vk` types so a real driver and the in-memory
//! [`crate::mock::MockBackend`] speak the same vocabulary. Queries borrow the backend;
//! anything that creates, destroys, records or submits takes it mutably.
//!
//! Destroy calls never fail. Recording calls (`cmd_*`) write into a command buffer that
//! is between [`GpuBackend::begin_command_buffer`] and [`GpuBackend::end_command_buffer`].

use std::ffi::CString;

use ash::vk;

use crate::config::{
    BufferBarrier, BufferConfig, DescriptorPoolConfig, DescriptorSetLayoutConfig, DescriptorWrite,
    DeviceConfig, FramebufferConfig, GraphicsPipelineConfig, ImageConfig, ImageViewConfig,
    InstanceConfig, LayoutTransition, PipelineLayoutConfig, PresentConfig, RenderPassBegin,
    RenderPassConfig, SamplerConfig, SubmitConfig, SwapchainConfig,
};
use crate::error::RenderResult;

pub trait GpuBackend {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    // ---- instance ---------------------------------------------------------------------

    fn create_instance(&mut self, config: &InstanceConfig) -> RenderResult<vk::Instance>;
    fn destroy_instance(&mut self, instance: vk::Instance);

    /// Whether a diagnostic messenger can be installed on the current instance.
    fn debug_messenger_supported(&self) -> bool;
    fn create_debug_messenger(&mut self) -> RenderResult<vk::DebugUtilsMessengerEXT>;
    fn destroy_debug_messenger(&mut self, messenger: vk::DebugUtilsMessengerEXT);

    /// Surface for the window this backend was opened against.
    fn create_surface(&mut self) -> RenderResult<vk::SurfaceKHR>;
    fn destroy_surface(&mut self, surface: vk::SurfaceKHR);

    // ---- adapter queries --------------------------------------------------------------

    fn enumerate_physical_devices(&self) -> RenderResult<Vec<vk::PhysicalDevice>>;
    fn device_extensions(&self, phys: vk::PhysicalDevice) -> RenderResult<Vec<CString>>;
    fn queue_families(
        &self,
        phys: vk::PhysicalDevice,
    ) -> RenderResult<Vec<vk::QueueFamilyProperties>>;
    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<bool>;
    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Vec<vk::PresentModeKHR>>;
    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR>;
    fn memory_properties(
        &self,
        phys: vk::PhysicalDevice,
    ) -> RenderResult<vk::PhysicalDeviceMemoryProperties>;
    fn format_properties(
        &self,
        phys: vk::PhysicalDevice,
        format: vk::Format,
    ) -> RenderResult<vk::FormatProperties>;

    // ---- device -----------------------------------------------------------------------

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        config: &DeviceConfig,
    ) -> RenderResult<vk::Device>;
    fn destroy_device(&mut self, device: vk::Device);
    fn device_queue(&self, family: u32) -> RenderResult<vk::Queue>;
    fn device_wait_idle(&mut self) -> RenderResult<()>;
    fn queue_wait_idle(&mut self, queue: vk::Queue) -> RenderResult<()>;

    // ---- swapchain --------------------------------------------------------------------

    fn create_swapchain(&mut self, config: &SwapchainConfig) -> RenderResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>>;
    /// Blocks without a timeout until an image is available.
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<u32>;
    fn queue_present(&mut self, queue: vk::Queue, config: &PresentConfig) -> RenderResult<()>;

    // ---- buffers, images, memory ------------------------------------------------------

    fn create_buffer(&mut self, config: &BufferConfig) -> RenderResult<vk::Buffer>;
    fn destroy_buffer(&mut self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer)
        -> RenderResult<vk::MemoryRequirements>;
    fn bind_buffer_memory(
        &mut self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()>;

    fn create_image(&mut self, config: &ImageConfig) -> RenderResult<vk::Image>;
    fn destroy_image(&mut self, image: vk::Image);
    fn image_memory_requirements(&self, image: vk::Image) -> RenderResult<vk::MemoryRequirements>;
    fn bind_image_memory(&mut self, image: vk::Image, memory: vk::DeviceMemory)
        -> RenderResult<()>;

    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type: u32,
    ) -> RenderResult<vk::DeviceMemory>;
    fn free_memory(&mut self, memory: vk::DeviceMemory);
    /// Map, copy `data` at `offset`, unmap. Memory must be host visible.
    fn write_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()>;
    /// Map, copy `len` bytes out, unmap. Memory must be host visible.
    fn read_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        len: usize,
    ) -> RenderResult<Vec<u8>>;

    fn create_image_view(&mut self, config: &ImageViewConfig) -> RenderResult<vk::ImageView>;
    fn destroy_image_view(&mut self, view: vk::ImageView);
    fn create_sampler(&mut self, config: &SamplerConfig) -> RenderResult<vk::Sampler>;
    fn destroy_sampler(&mut self, sampler: vk::Sampler);

    // ---- command buffers --------------------------------------------------------------

    /// Pool with `RESET_COMMAND_BUFFER` on the given family.
    fn create_command_pool(&mut self, family: u32) -> RenderResult<vk::CommandPool>;
    fn destroy_command_pool(&mut self, pool: vk::CommandPool);
    fn allocate_command_buffer(&mut self, pool: vk::CommandPool)
        -> RenderResult<vk::CommandBuffer>;
    fn free_command_buffer(&mut self, pool: vk::CommandPool, cmd: vk::CommandBuffer);
    fn begin_command_buffer(&mut self, cmd: vk::CommandBuffer, one_time: bool)
        -> RenderResult<()>;
    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> RenderResult<()>;

    fn cmd_copy_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    );
    /// Tightly packed copy into mip 0, layer 0. The image must be `TRANSFER_DST_OPTIMAL`.
    fn cmd_copy_buffer_to_image(
        &mut self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    );
    fn cmd_image_barrier(&mut self, cmd: vk::CommandBuffer, transition: &LayoutTransition);
    fn cmd_buffer_barrier(&mut self, cmd: vk::CommandBuffer, barrier: &BufferBarrier);
    /// Clears color to `begin.clear_color` and depth to 1.0.
    fn cmd_begin_render_pass(&mut self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer);
    fn cmd_bind_pipeline(&mut self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_set(
        &mut self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_bind_vertex_buffer(&mut self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    /// Indices are `u32`.
    fn cmd_bind_index_buffer(&mut self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_draw_indexed(&mut self, cmd: vk::CommandBuffer, index_count: u32);

    fn queue_submit(&mut self, queue: vk::Queue, submit: &SubmitConfig) -> RenderResult<()>;

    // ---- render pass, descriptors, pipeline -------------------------------------------

    fn create_render_pass(&mut self, config: &RenderPassConfig) -> RenderResult<vk::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn create_framebuffer(&mut self, config: &FramebufferConfig)
        -> RenderResult<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    fn create_descriptor_pool(
        &mut self,
        config: &DescriptorPoolConfig,
    ) -> RenderResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool);
    fn create_descriptor_set_layout(
        &mut self,
        config: &DescriptorSetLayoutConfig,
    ) -> RenderResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout);
    /// Sets are returned to the pool when the pool is destroyed.
    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> RenderResult<vk::DescriptorSet>;
    fn update_descriptor_set(&mut self, write: &DescriptorWrite);

    fn create_shader_module(&mut self, code: &[u32]) -> RenderResult<vk::ShaderModule>;
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);
    fn create_pipeline_layout(
        &mut self,
        config: &PipelineLayoutConfig,
    ) -> RenderResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(
        &mut self,
        config: &GraphicsPipelineConfig,
    ) -> RenderResult<vk::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);

    // ---- synchronisation --------------------------------------------------------------

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence>;
    fn destroy_fence(&mut self, fence: vk::Fence);
    /// Waits without a timeout.
    fn wait_for_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;
}
