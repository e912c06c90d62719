// SPDX-License-Identifier: CEPL-1.0
//! LIFO release stack.
//!
//! Every successful create pushes its handle here. Releasing pops, so objects are
//! destroyed in the exact reverse of the order they were created in. A child is always
//! created after its parent, which makes this also a dependency-correct order.

use ash::vk;
use tracing::trace;

use crate::backend::GpuBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owned {
    Instance(vk::Instance),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Surface(vk::SurfaceKHR),
    Device(vk::Device),
    CommandPool(vk::CommandPool),
    CommandBuffer {
        pool: vk::CommandPool,
        cmd: vk::CommandBuffer,
    },
    Swapchain(vk::SwapchainKHR),
    Buffer(vk::Buffer),
    Image(vk::Image),
    Memory(vk::DeviceMemory),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    RenderPass(vk::RenderPass),
    Framebuffer(vk::Framebuffer),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    ShaderModule(vk::ShaderModule),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
}

impl Owned {
    fn release<B: GpuBackend + ?Sized>(self, gpu: &mut B) {
        match self {
            Owned::Instance(h) => gpu.destroy_instance(h),
            Owned::DebugMessenger(h) => gpu.destroy_debug_messenger(h),
            Owned::Surface(h) => gpu.destroy_surface(h),
            Owned::Device(h) => gpu.destroy_device(h),
            Owned::CommandPool(h) => gpu.destroy_command_pool(h),
            Owned::CommandBuffer { pool, cmd } => gpu.free_command_buffer(pool, cmd),
            Owned::Swapchain(h) => gpu.destroy_swapchain(h),
            Owned::Buffer(h) => gpu.destroy_buffer(h),
            Owned::Image(h) => gpu.destroy_image(h),
            Owned::Memory(h) => gpu.free_memory(h),
            Owned::ImageView(h) => gpu.destroy_image_view(h),
            Owned::Sampler(h) => gpu.destroy_sampler(h),
            Owned::RenderPass(h) => gpu.destroy_render_pass(h),
            Owned::Framebuffer(h) => gpu.destroy_framebuffer(h),
            Owned::DescriptorPool(h) => gpu.destroy_descriptor_pool(h),
            Owned::DescriptorSetLayout(h) => gpu.destroy_descriptor_set_layout(h),
            Owned::PipelineLayout(h) => gpu.destroy_pipeline_layout(h),
            Owned::Pipeline(h) => gpu.destroy_pipeline(h),
            Owned::ShaderModule(h) => gpu.destroy_shader_module(h),
            Owned::Semaphore(h) => gpu.destroy_semaphore(h),
            Owned::Fence(h) => gpu.destroy_fence(h),
        }
    }
}

#[derive(Debug, Default)]
pub struct Teardown {
    stack: Vec<Owned>,
}

impl Teardown {
    pub fn push(&mut self, owned: Owned) {
        self.stack.push(owned);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn holds_device(&self) -> bool {
        self.stack.iter().any(|o| matches!(o, Owned::Device(_)))
    }

    /// Removes an entry whose lifetime has been handed over elsewhere.
    pub fn forget(&mut self, owned: Owned) -> bool {
        match self.stack.iter().rposition(|o| *o == owned) {
            Some(at) => {
                self.stack.remove(at);
                true
            }
            None => false,
        }
    }

    /// Destroys everything, newest first.
    pub fn release_all<B: GpuBackend + ?Sized>(&mut self, gpu: &mut B) {
        while let Some(owned) = self.stack.pop() {
            trace!(?owned, "release");
            owned.release(gpu);
        }
    }

    /// Waits for the device to go idle (when one exists), then releases everything.
    pub fn unwind<B: GpuBackend + ?Sized>(&mut self, gpu: &mut B) {
        if self.is_empty() {
            return;
        }
        if self.holds_device() {
            if let Err(e) = gpu.device_wait_idle() {
                tracing::warn!("device_wait_idle before teardown failed: {e}");
            }
        }
        self.release_all(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::mock::{Call, MockBackend, ObjectKind};

    #[test]
    fn releases_newest_first() {
        let mut gpu = MockBackend::new();
        let rec = gpu.recorder();
        let mut teardown = Teardown::default();
        let config = InstanceConfig::new("teardown", false).unwrap();
        let instance = gpu.create_instance(&config).unwrap();
        teardown.push(Owned::Instance(instance));
        let surface = gpu.create_surface().unwrap();
        teardown.push(Owned::Surface(surface));

        teardown.release_all(&mut gpu);

        assert!(teardown.is_empty());
        let destroyed: Vec<ObjectKind> = rec
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Destroy { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, [ObjectKind::Surface, ObjectKind::Instance]);
        assert!(rec.violations().is_empty());
    }

    #[test]
    fn unwind_without_device_skips_wait_idle() {
        let mut gpu = MockBackend::new();
        let rec = gpu.recorder();
        let mut teardown = Teardown::default();
        let instance = gpu
            .create_instance(&InstanceConfig::new("teardown", false).unwrap())
            .unwrap();
        teardown.push(Owned::Instance(instance));

        teardown.unwind(&mut gpu);

        assert!(!rec.calls().contains(&Call::DeviceWaitIdle));
        assert_eq!(rec.live_objects(), 0);
    }

    #[test]
    fn forget_hands_ownership_away() {
        let mut gpu = MockBackend::new();
        let rec = gpu.recorder();
        let mut teardown = Teardown::default();
        let instance = gpu
            .create_instance(&InstanceConfig::new("teardown", false).unwrap())
            .unwrap();
        let surface = gpu.create_surface().unwrap();
        teardown.push(Owned::Instance(instance));
        teardown.push(Owned::Surface(surface));

        assert!(teardown.forget(Owned::Surface(surface)));
        assert!(!teardown.forget(Owned::Surface(surface)));
        assert_eq!(teardown.len(), 1);

        gpu.destroy_surface(surface);
        teardown.release_all(&mut gpu);
        assert!(rec.violations().is_empty());
    }
}
