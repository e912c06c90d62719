// SPDX-License-Identifier: CEPL-1.0
//! Owns the backend, the release stack and every component.

use ash::vk;
use tracing::{error, info};

use crate::backend::GpuBackend;
use crate::config::{InstanceConfig, RendererConfig};
use crate::context::DeviceContext;
use crate::error::RenderResult;
use crate::factory::ResourceFactory;
use crate::frame::{record_draw_commands, FrameLoop, FrameState};
use crate::resources::{
    AssetPaths, AssetSource, GpuBuffer, GpuImage, Mesh, PipelineBundle, UniformBuffers,
};
use crate::swapchain::PresentationSurface;
use crate::teardown::Teardown;
use crate::transfer::TransferEngine;

struct Resources {
    context: DeviceContext,
    transfer: TransferEngine,
    surface: PresentationSurface,
    depth: GpuImage,
    render_pass: vk::RenderPass,
    uniforms: UniformBuffers,
    descriptor_pool: vk::DescriptorPool,
    pipeline: PipelineBundle,
    mesh: Mesh,
    frames: FrameLoop,
}

pub struct Renderer<B: GpuBackend> {
    gpu: B,
    teardown: Teardown,
    res: Resources,
}

impl<B: GpuBackend> Renderer<B> {
    /// Builds everything in dependency order. On failure, whatever was already created
    /// is released newest first before the error is returned.
    pub fn new(
        mut gpu: B,
        config: &RendererConfig,
        paths: &AssetPaths,
        assets: &dyn AssetSource,
    ) -> RenderResult<Self> {
        config.validate()?;
        let mut teardown = Teardown::default();
        match build(&mut gpu, &mut teardown, config, paths, assets) {
            Ok(res) => {
                info!(
                    "{}: renderer ready, {} objects tracked",
                    gpu.name(),
                    teardown.len()
                );
                Ok(Self { gpu, teardown, res })
            }
            Err(e) => {
                error!("renderer construction failed: {e}");
                teardown.unwind(&mut gpu);
                Err(e)
            }
        }
    }

    pub fn render_frame(&mut self) -> RenderResult<()> {
        let res = &mut self.res;
        res.frames.render(
            &mut self.gpu,
            &res.context,
            &res.transfer,
            &res.surface,
            &res.uniforms,
        )?;
        Ok(())
    }

    pub fn frame_state(&self) -> FrameState {
        self.res.frames.state()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.res.frames.frames_rendered()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.res.surface.extent
    }

    pub fn surface(&self) -> &PresentationSurface {
        &self.res.surface
    }

    pub fn context(&self) -> &DeviceContext {
        &self.res.context
    }

    pub fn mesh(&self) -> &Mesh {
        &self.res.mesh
    }

    pub fn depth(&self) -> &GpuImage {
        &self.res.depth
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.res.render_pass
    }

    pub fn pipeline(&self) -> &PipelineBundle {
        &self.res.pipeline
    }

    pub fn descriptor_pool(&self) -> vk::DescriptorPool {
        self.res.descriptor_pool
    }

    pub fn uniforms(&self) -> &UniformBuffers {
        &self.res.uniforms
    }

    pub fn backend(&self) -> &B {
        &self.gpu
    }

    /// Copies a device buffer back to the host. Blocks on the graphics queue.
    pub fn read_back(&mut self, buffer: &GpuBuffer) -> RenderResult<Vec<u8>> {
        self.res.transfer.read_back(&mut self.gpu, buffer)
    }

    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.gpu.device_wait_idle()
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle first, nothing may still be executing
// - then every tracked object, newest first (children before parents,
//   framebuffers before views, views before the swapchain, device before surface,
//   messenger before instance)
impl<B: GpuBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.teardown.unwind(&mut self.gpu);
        info!("{}: renderer destroyed", self.gpu.name());
    }
}

fn build<B: GpuBackend>(
    gpu: &mut B,
    teardown: &mut Teardown,
    config: &RendererConfig,
    paths: &AssetPaths,
    assets: &dyn AssetSource,
) -> RenderResult<Resources> {
    let instance_config = InstanceConfig::new(&config.app_name, config.validation)?;
    let context = DeviceContext::new(gpu, teardown, &instance_config)?;
    let transfer = TransferEngine::new(gpu, teardown, &context)?;

    let mut surface = PresentationSurface::new(
        gpu,
        teardown,
        &context,
        transfer.pool(),
        config.size,
        config.present_mode,
        None,
    )?;

    let factory = ResourceFactory::new(&context, &transfer);
    let depth = factory.depth_image(gpu, teardown, surface.extent)?;
    let render_pass = factory.render_pass(gpu, teardown, surface.format.format, depth.format)?;
    surface.create_framebuffers(gpu, teardown, render_pass, depth.view)?;

    let uniforms = factory.uniform_buffers(gpu, teardown)?;
    let descriptor_pool = factory.descriptor_pool(gpu, teardown)?;
    let set_layout = factory.descriptor_set_layout(gpu, teardown)?;
    let pipeline = factory.pipeline(
        gpu,
        teardown,
        set_layout,
        render_pass,
        surface.extent,
        paths,
    )?;

    let texture = assets.load_texture(&paths.texture)?;
    let model = assets.load_model(&paths.model)?;
    let mesh = factory.mesh(
        gpu,
        teardown,
        descriptor_pool,
        set_layout,
        &uniforms,
        &model,
        &texture,
    )?;

    record_draw_commands(
        gpu,
        &surface,
        render_pass,
        &pipeline,
        &mesh,
        config.clear_color,
    )?;

    let frames = FrameLoop::new(gpu, teardown, config.frames_in_flight, surface.image_count())?;

    Ok(Resources {
        context,
        transfer,
        surface,
        depth,
        render_pass,
        uniforms,
        descriptor_pool,
        pipeline,
        mesh,
        frames,
    })
}
