// SPDX-License-Identifier: CEPL-1.0
//! Staging uploads and one-shot command submission.
//!
//! Every helper here records into a throwaway command buffer, submits it to the graphics
//! queue and blocks until the queue is idle. Simple and slow; fine for load time and for
//! the single per-frame uniform refresh.

use ash::vk;
use tracing::debug;

use crate::backend::GpuBackend;
use crate::config::{
    BufferBarrier, BufferConfig, ImageConfig, ImageViewConfig, LayoutTransition, SubmitConfig,
};
use crate::context::DeviceContext;
use crate::error::RenderResult;
use crate::resources::{GpuBuffer, GpuImage, TextureData};
use crate::select::find_memory_type;
use crate::teardown::{Owned, Teardown};

pub const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

#[derive(Clone, Copy, Debug)]
pub struct TransferEngine {
    pool: vk::CommandPool,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl TransferEngine {
    pub fn new<B: GpuBackend>(
        gpu: &mut B,
        teardown: &mut Teardown,
        context: &DeviceContext,
    ) -> RenderResult<Self> {
        let pool = gpu.create_command_pool(context.families.graphics)?;
        teardown.push(Owned::CommandPool(pool));
        Ok(Self {
            pool,
            queue: context.graphics_queue,
            memory_properties: context.memory_properties,
        })
    }

    /// Shared pool; per-image command buffers are allocated from it too.
    pub fn pool(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> RenderResult<u32> {
        find_memory_type(&self.memory_properties, type_bits, required)
    }

    /// Buffer + memory with the requested properties, bound and pushed for release.
    pub fn create_buffer<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        config: &BufferConfig,
        properties: vk::MemoryPropertyFlags,
    ) -> RenderResult<GpuBuffer> {
        let buffer = gpu.create_buffer(config)?;
        teardown.push(Owned::Buffer(buffer));
        let req = gpu.buffer_memory_requirements(buffer)?;
        let memory_type = self.memory_type(req.memory_type_bits, properties)?;
        let memory = gpu.allocate_memory(req.size, memory_type)?;
        teardown.push(Owned::Memory(memory));
        gpu.bind_buffer_memory(buffer, memory)?;
        Ok(GpuBuffer {
            buffer,
            memory,
            size: config.size,
        })
    }

    /// Device-local image with memory and a view. No sampler.
    pub fn create_image<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        config: &ImageConfig,
        aspect: vk::ImageAspectFlags,
    ) -> RenderResult<GpuImage> {
        let image = gpu.create_image(config)?;
        teardown.push(Owned::Image(image));
        let req = gpu.image_memory_requirements(image)?;
        let memory_type =
            self.memory_type(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let memory = gpu.allocate_memory(req.size, memory_type)?;
        teardown.push(Owned::Memory(memory));
        gpu.bind_image_memory(image, memory)?;
        let view = gpu.create_image_view(&ImageViewConfig::new(image, config.format, aspect))?;
        teardown.push(Owned::ImageView(view));
        Ok(GpuImage {
            image,
            view,
            memory,
            size: req.size,
            sampler: None,
            width: config.width,
            height: config.height,
            format: config.format,
        })
    }

    /// Host-visible transfer source holding `data`.
    fn create_staging<B: GpuBackend>(
        &self,
        gpu: &mut B,
        scratch: &mut Teardown,
        data: &[u8],
    ) -> RenderResult<GpuBuffer> {
        let config = BufferConfig::new(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let staging = self.create_buffer(gpu, scratch, &config, HOST_VISIBLE)?;
        gpu.write_memory(staging.memory, 0, data)?;
        Ok(staging)
    }

    /// Copies `data` into a new device-local buffer.
    ///
    /// The destination also gets `TRANSFER_SRC` so [`Self::read_back`] can copy out of it.
    pub fn upload_buffer<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> RenderResult<GpuBuffer> {
        let mut scratch = Teardown::default();
        let result = (|| -> RenderResult<GpuBuffer> {
            let staging = self.create_staging(gpu, &mut scratch, data)?;
            let config = BufferConfig::new(
                staging.size,
                usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            )?;
            let dst =
                self.create_buffer(gpu, teardown, &config, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
            self.one_shot(gpu, &mut scratch, |gpu, cmd| {
                gpu.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, staging.size);
            })?;
            Ok(dst)
        })();
        scratch.release_all(gpu);
        if let Ok(buf) = &result {
            debug!("uploaded {} bytes into buffer {:?}", buf.size, buf.buffer);
        }
        result
    }

    /// Creates a sampled device image from RGBA8 pixels.
    ///
    /// The image starts `PREINITIALIZED`, goes to `TRANSFER_DST_OPTIMAL` for the copy and
    /// ends in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image<B: GpuBackend>(
        &self,
        gpu: &mut B,
        teardown: &mut Teardown,
        texture: &TextureData,
        format: vk::Format,
    ) -> RenderResult<GpuImage> {
        let mut scratch = Teardown::default();
        let result = (|| -> RenderResult<GpuImage> {
            let staging = self.create_staging(gpu, &mut scratch, &texture.pixels)?;
            let config = ImageConfig::new(
                texture.width,
                texture.height,
                format,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::ImageLayout::PREINITIALIZED,
            )?;
            let image = self.create_image(gpu, teardown, &config, vk::ImageAspectFlags::COLOR)?;
            let to_dst = LayoutTransition::new(
                image.image,
                vk::ImageLayout::PREINITIALIZED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            )?;
            let to_read = LayoutTransition::new(
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            )?;
            self.one_shot(gpu, &mut scratch, |gpu, cmd| {
                gpu.cmd_image_barrier(cmd, &to_dst);
                gpu.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image.image,
                    texture.width,
                    texture.height,
                );
                gpu.cmd_image_barrier(cmd, &to_read);
            })?;
            Ok(image)
        })();
        scratch.release_all(gpu);
        result
    }

    /// Device-side copy of `size` bytes, fenced by buffer barriers on `dst` so it lands
    /// after earlier reads and before later vertex-stage reads.
    pub fn copy_buffer<B: GpuBackend>(
        &self,
        gpu: &mut B,
        src: &GpuBuffer,
        dst: &GpuBuffer,
        size: vk::DeviceSize,
    ) -> RenderResult<()> {
        let before = BufferBarrier::before_transfer_write(dst.buffer, size);
        let after = BufferBarrier::after_transfer_write(dst.buffer, size);
        self.submit_one_shot(gpu, |gpu, cmd| {
            gpu.cmd_buffer_barrier(cmd, &before);
            gpu.cmd_copy_buffer(cmd, src.buffer, dst.buffer, size);
            gpu.cmd_buffer_barrier(cmd, &after);
        })
    }

    pub fn transition_image_layout<B: GpuBackend>(
        &self,
        gpu: &mut B,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) -> RenderResult<()> {
        let transition = LayoutTransition::new(image, old_layout, new_layout, aspect)?;
        self.submit_one_shot(gpu, |gpu, cmd| gpu.cmd_image_barrier(cmd, &transition))
    }

    /// Debug readback: copies a device buffer into a host-visible one and returns its bytes.
    pub fn read_back<B: GpuBackend>(
        &self,
        gpu: &mut B,
        src: &GpuBuffer,
    ) -> RenderResult<Vec<u8>> {
        let mut scratch = Teardown::default();
        let result = (|| -> RenderResult<Vec<u8>> {
            let config = BufferConfig::new(src.size, vk::BufferUsageFlags::TRANSFER_DST)?;
            let host = self.create_buffer(gpu, &mut scratch, &config, HOST_VISIBLE)?;
            self.one_shot(gpu, &mut scratch, |gpu, cmd| {
                gpu.cmd_copy_buffer(cmd, src.buffer, host.buffer, src.size);
            })?;
            gpu.read_memory(host.memory, 0, src.size as usize)
        })();
        scratch.release_all(gpu);
        result
    }

    /// Writes host bytes into a host-visible buffer.
    pub fn write_host<B: GpuBackend>(
        &self,
        gpu: &mut B,
        dst: &GpuBuffer,
        data: &[u8],
    ) -> RenderResult<()> {
        gpu.write_memory(dst.memory, 0, data)
    }

    fn submit_one_shot<B: GpuBackend>(
        &self,
        gpu: &mut B,
        record: impl FnOnce(&mut B, vk::CommandBuffer),
    ) -> RenderResult<()> {
        let mut scratch = Teardown::default();
        let result = self.one_shot(gpu, &mut scratch, record);
        scratch.release_all(gpu);
        result
    }

    /// The command buffer goes into `scratch`; the caller releases it.
    fn one_shot<B: GpuBackend>(
        &self,
        gpu: &mut B,
        scratch: &mut Teardown,
        record: impl FnOnce(&mut B, vk::CommandBuffer),
    ) -> RenderResult<()> {
        let cmd = gpu.allocate_command_buffer(self.pool)?;
        scratch.push(Owned::CommandBuffer {
            pool: self.pool,
            cmd,
        });
        gpu.begin_command_buffer(cmd, true)?;
        record(gpu, cmd);
        gpu.end_command_buffer(cmd)?;
        gpu.queue_submit(self.queue, &SubmitConfig::one_shot(cmd))?;
        gpu.queue_wait_idle(self.queue)
    }
}
