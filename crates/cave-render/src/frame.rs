// SPDX-License-Identifier: CEPL-1.0
//! Per-frame submission: uniforms, acquire, submit, present.

use ash::vk;
use cave_math::{look_at, perspective, Vec3};
use tracing::trace;

use crate::backend::GpuBackend;
use crate::config::{PresentConfig, RenderPassBegin, SubmitConfig};
use crate::context::DeviceContext;
use crate::error::{RenderError, RenderResult};
use crate::resources::{CameraUbo, Mesh, PipelineBundle, UniformBuffers};
use crate::swapchain::PresentationSurface;
use crate::teardown::{Owned, Teardown};
use crate::transfer::TransferEngine;

/// Fixed viewpoint orbiting nothing: the scene is static.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(2.0, 2.0, 2.0),
            center: Vec3::ZERO,
            up: Vec3::Z,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

impl Camera {
    pub fn uniforms(&self, extent: vk::Extent2D) -> CameraUbo {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        CameraUbo {
            view: look_at(self.eye, self.center, self.up).to_cols_array_2d(),
            proj: perspective(self.fov_y_degrees.to_radians(), aspect, self.near, self.far)
                .to_cols_array_2d(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    UniformsUpdated,
    ImageAcquired,
    Submitted,
    Presented,
}

#[derive(Clone, Copy, Debug)]
struct AcquireSlot {
    image_available: vk::Semaphore,
    in_flight: vk::Fence,
}

#[derive(Debug)]
pub struct FrameLoop {
    slots: Vec<AcquireSlot>,
    render_finished: Vec<vk::Semaphore>,
    slot: usize,
    state: FrameState,
    frames_rendered: u64,
    camera: Camera,
}

impl FrameLoop {
    /// `frames_in_flight` acquire slots (semaphore + signaled fence) and one
    /// render-finished semaphore per swapchain image.
    pub fn new<B: GpuBackend>(
        gpu: &mut B,
        teardown: &mut Teardown,
        frames_in_flight: u32,
        image_count: usize,
    ) -> RenderResult<Self> {
        if frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        let mut slots = Vec::with_capacity(frames_in_flight as usize);
        for _ in 0..frames_in_flight {
            let image_available = gpu.create_semaphore()?;
            teardown.push(Owned::Semaphore(image_available));
            let in_flight = gpu.create_fence(true)?;
            teardown.push(Owned::Fence(in_flight));
            slots.push(AcquireSlot {
                image_available,
                in_flight,
            });
        }
        let mut render_finished = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            let sem = gpu.create_semaphore()?;
            teardown.push(Owned::Semaphore(sem));
            render_finished.push(sem);
        }
        Ok(Self {
            slots,
            render_finished,
            slot: 0,
            state: FrameState::Idle,
            frames_rendered: 0,
            camera: Camera::default(),
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    // STRICT PER-FRAME ORDER:
    // 1) wait + reset the slot fence (the slot's previous submit is done)
    // 2) refresh uniforms through the blocking transfer path
    // 3) acquire, signaling the slot's image-available semaphore
    // 4) submit the image's command buffer, signaling its render-finished semaphore
    // 5) present, waiting on render-finished
    /// Renders one frame and returns the swapchain image index it used.
    ///
    /// A failure leaves the loop out of `Idle`, so every later call reports
    /// [`RenderError::InvalidState`].
    pub fn render<B: GpuBackend>(
        &mut self,
        gpu: &mut B,
        context: &DeviceContext,
        transfer: &TransferEngine,
        surface: &PresentationSurface,
        uniforms: &UniformBuffers,
    ) -> RenderResult<u32> {
        if self.state != FrameState::Idle {
            return Err(RenderError::InvalidState(format!(
                "render_frame called while frame is {:?}",
                self.state
            )));
        }
        let slot = self.slots[self.slot];

        gpu.wait_for_fence(slot.in_flight)?;
        gpu.reset_fence(slot.in_flight)?;

        let ubo = self.camera.uniforms(surface.extent);
        transfer.write_host(gpu, &uniforms.staging, bytemuck::bytes_of(&ubo))?;
        transfer.copy_buffer(gpu, &uniforms.staging, &uniforms.device, CameraUbo::SIZE)?;
        self.advance(FrameState::UniformsUpdated);

        let image_index = gpu.acquire_next_image(surface.swapchain, slot.image_available)?;
        let image = surface
            .images
            .get(image_index as usize)
            .ok_or_else(|| {
                RenderError::InvalidState(format!("acquired unknown image {image_index}"))
            })?;
        let render_finished = self.render_finished[image_index as usize];
        self.advance(FrameState::ImageAcquired);

        gpu.queue_submit(
            context.graphics_queue,
            &SubmitConfig::frame(
                image.command_buffer,
                slot.image_available,
                render_finished,
                slot.in_flight,
            ),
        )?;
        self.advance(FrameState::Submitted);

        gpu.queue_present(
            context.present_queue,
            &PresentConfig {
                swapchain: surface.swapchain,
                image_index,
                wait_semaphore: render_finished,
            },
        )?;
        self.advance(FrameState::Presented);

        self.slot = (self.slot + 1) % self.slots.len();
        self.frames_rendered += 1;
        self.advance(FrameState::Idle);
        Ok(image_index)
    }

    fn advance(&mut self, next: FrameState) {
        trace!("frame {}: {:?} -> {:?}", self.frames_rendered, self.state, next);
        self.state = next;
    }
}

/// Records every per-image command buffer once. They are replayed unchanged each frame.
pub fn record_draw_commands<B: GpuBackend>(
    gpu: &mut B,
    surface: &PresentationSurface,
    render_pass: vk::RenderPass,
    pipeline: &PipelineBundle,
    mesh: &Mesh,
    clear_color: [f32; 4],
) -> RenderResult<()> {
    for (image, &framebuffer) in surface.images.iter().zip(&surface.framebuffers) {
        let cmd = image.command_buffer;
        gpu.begin_command_buffer(cmd, false)?;
        gpu.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass,
                framebuffer,
                extent: surface.extent,
                clear_color,
            },
        );
        gpu.cmd_bind_pipeline(cmd, pipeline.pipeline);
        gpu.cmd_bind_descriptor_set(cmd, pipeline.layout, mesh.descriptor_set);
        gpu.cmd_bind_vertex_buffer(cmd, mesh.vertex_buffer.buffer);
        gpu.cmd_bind_index_buffer(cmd, mesh.index_buffer.buffer);
        gpu.cmd_draw_indexed(cmd, mesh.index_count);
        gpu.cmd_end_render_pass(cmd);
        gpu.end_command_buffer(cmd)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_projection_flips_y() {
        let ubo = Camera::default().uniforms(vk::Extent2D {
            width: 640,
            height: 480,
        });
        // Column 1, row 1 of the projection carries the flipped Y scale.
        assert!(ubo.proj[1][1] < 0.0);
        // Aspect 4:3 shows up as x scale = y scale / aspect.
        let ratio = -ubo.proj[1][1] / ubo.proj[0][0];
        assert!((ratio - 640.0 / 480.0).abs() < 1e-4);
    }

    #[test]
    fn camera_defaults_match_the_fixed_viewpoint() {
        let cam = Camera::default();
        assert_eq!(cam.eye, Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(cam.up, Vec3::Z);
        assert_eq!(cam.far, 10.0);
    }
}
