// SPDX-License-Identifier: CEPL-1.0
//! Builds the fixed set of GPU objects the single mesh needs.

use ash::vk;
use tracing::{debug, info};

use crate::backend::GpuBackend;
use crate::config::{
    BufferConfig, DescriptorPoolConfig, DescriptorSetLayoutConfig, DescriptorWrite,
    GraphicsPipelineConfig, ImageConfig, PipelineLayoutConfig, RenderPassConfig, SamplerConfig,
};
use crate::context::DeviceContext;
use crate::error::{RenderError, RenderResult};
use crate::resources::{
    AssetPaths, CameraUbo, GpuImage, Mesh, MeshData, PipelineBundle, TextureData, UniformBuffers,
    Vertex,
};
use crate::select::{depth_aspect, DEPTH_FORMAT_CANDIDATES};
use crate::shader::load_spirv;
use crate::teardown::{Owned, Teardown};
use crate::transfer::{TransferEngine, HOST_VISIBLE};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

#[derive(Clone, Copy)]
pub struct ResourceFactory<'a> {
    context: &'a DeviceContext,
    transfer: &'a TransferEngine,
}

impl<'a> ResourceFactory<'a> {
    pub fn new(context: &'a DeviceContext, transfer: &'a TransferEngine) -> Self {
        Self { context, transfer }
    }

    /// First candidate usable as an optimal-tiling depth/stencil attachment.
    pub fn pick_depth_format<B: GpuBackend>(&self, gpu: &B) -> RenderResult<vk::Format> {
        for format in DEPTH_FORMAT_CANDIDATES {
            let props = gpu.format_properties(self.context.physical_device, format)?;
            if props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            {
                return Ok(format);
            }
        }
        Err(RenderError::NoDepthFormat)
    }

    /// Depth attachment sized to the swapchain, already in
    /// `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
    pub fn depth_image<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        extent: vk::Extent2D,
    ) -> RenderResult<GpuImage> {
        let format = self.pick_depth_format(&*gpu)?;
        let aspect = depth_aspect(format);
        let config = ImageConfig::new(
            extent.width,
            extent.height,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageLayout::UNDEFINED,
        )?;
        let depth = self.transfer.create_image(gpu, teardown, &config, aspect)?;
        self.transfer.transition_image_layout(
            gpu,
            depth.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            aspect,
        )?;
        debug!("depth buffer {:?} {}x{}", format, extent.width, extent.height);
        Ok(depth)
    }

    pub fn render_pass<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RenderResult<vk::RenderPass> {
        let render_pass =
            gpu.create_render_pass(&RenderPassConfig::new(color_format, depth_format))?;
        teardown.push(Owned::RenderPass(render_pass));
        Ok(render_pass)
    }

    /// Device-local uniform buffer and its persistent staging twin. The device side is
    /// also a transfer source so it can be read back.
    pub fn uniform_buffers<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
    ) -> RenderResult<UniformBuffers> {
        let device_cfg = BufferConfig::new(
            CameraUbo::SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let device = self.transfer.create_buffer(
            gpu,
            teardown,
            &device_cfg,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let staging_cfg = BufferConfig::new(CameraUbo::SIZE, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let staging = self
            .transfer
            .create_buffer(gpu, teardown, &staging_cfg, HOST_VISIBLE)?;
        Ok(UniformBuffers { device, staging })
    }

    pub fn descriptor_pool<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
    ) -> RenderResult<vk::DescriptorPool> {
        let pool = gpu.create_descriptor_pool(&DescriptorPoolConfig::single_mesh())?;
        teardown.push(Owned::DescriptorPool(pool));
        Ok(pool)
    }

    pub fn descriptor_set_layout<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let layout =
            gpu.create_descriptor_set_layout(&DescriptorSetLayoutConfig::uniform_and_sampler())?;
        teardown.push(Owned::DescriptorSetLayout(layout));
        Ok(layout)
    }

    /// Pipeline layout plus the graphics pipeline. Shader modules live only for the
    /// duration of this call.
    pub fn pipeline<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        set_layout: vk::DescriptorSetLayout,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        paths: &AssetPaths,
    ) -> RenderResult<PipelineBundle> {
        let vert_code = load_spirv(&paths.vertex_shader)?;
        let frag_code = load_spirv(&paths.fragment_shader)?;

        let layout = gpu.create_pipeline_layout(&PipelineLayoutConfig::new(set_layout))?;
        teardown.push(Owned::PipelineLayout(layout));

        let mut modules = Teardown::default();
        let result = (|| -> RenderResult<vk::Pipeline> {
            let vertex_module = gpu.create_shader_module(&vert_code)?;
            modules.push(Owned::ShaderModule(vertex_module));
            let fragment_module = gpu.create_shader_module(&frag_code)?;
            modules.push(Owned::ShaderModule(fragment_module));

            let config = GraphicsPipelineConfig::opaque_mesh(
                vertex_module,
                fragment_module,
                layout,
                render_pass,
                extent,
                Vertex::STRIDE,
                &Vertex::attributes(),
            )?;
            gpu.create_graphics_pipeline(&config)
        })();
        modules.release_all(gpu);

        let pipeline = result?;
        teardown.push(Owned::Pipeline(pipeline));
        info!("graphics pipeline ready");
        Ok(PipelineBundle {
            set_layout,
            layout,
            pipeline,
        })
    }

    /// Texture, vertex and index buffers, and the descriptor set tying them to the
    /// camera uniforms.
    #[allow(clippy::too_many_arguments)]
    pub fn mesh<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        pool: vk::DescriptorPool,
        set_layout: vk::DescriptorSetLayout,
        uniforms: &UniformBuffers,
        data: &MeshData,
        texture: &TextureData,
    ) -> RenderResult<Mesh> {
        data.validate()?;

        let mut image = self
            .transfer
            .upload_image(gpu, teardown, texture, TEXTURE_FORMAT)?;
        let sampler = gpu.create_sampler(&SamplerConfig::linear_repeat())?;
        teardown.push(Owned::Sampler(sampler));
        image.sampler = Some(sampler);

        let vertex_buffer = self.transfer.upload_buffer(
            gpu,
            teardown,
            bytemuck::cast_slice(&data.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = self.transfer.upload_buffer(
            gpu,
            teardown,
            bytemuck::cast_slice(&data.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        let descriptor_set = gpu.allocate_descriptor_set(pool, set_layout)?;
        gpu.update_descriptor_set(&DescriptorWrite {
            set: descriptor_set,
            uniform_buffer: uniforms.device.buffer,
            uniform_range: uniforms.device.size,
            image_view: image.view,
            sampler,
        });

        info!(
            "mesh: {} vertices, {} indices, texture {}x{}",
            data.vertices.len(),
            data.indices.len(),
            texture.width,
            texture.height
        );
        Ok(Mesh {
            vertex_buffer,
            vertex_count: data.vertices.len() as u32,
            index_buffer,
            index_count: data.indices.len() as u32,
            texture: image,
            descriptor_set,
        })
    }
}
