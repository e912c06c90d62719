// SPDX-License-Identifier: CEPL-1.0
//! Recording, in-memory backend.
//!
//! Handles come from a counter. Every create and destroy lands in a call log; memory is
//! simulated as byte vectors so copies recorded into command buffers actually move data
//! when the buffer is submitted. Misuse (double destroy, destroying a parent while
//! children are alive, waiting on a semaphore nothing signaled, writing device-local
//! memory from the host) is collected as a violation instead of crashing.
//!
//! State lives behind `Rc<RefCell<..>>` so a [`MockRecorder`] can still read the log after
//! the backend has been moved into, and dropped with, a renderer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::rc::Rc;

use ash::vk::{self, Handle};
use tracing::warn;

use crate::backend::GpuBackend;
use crate::config::{
    BufferBarrier, BufferConfig, DescriptorPoolConfig, DescriptorSetLayoutConfig, DescriptorWrite,
    DeviceConfig, FramebufferConfig, GraphicsPipelineConfig, ImageConfig, ImageViewConfig,
    InstanceConfig, LayoutTransition, PipelineLayoutConfig, PresentConfig, RenderPassBegin,
    RenderPassConfig, SamplerConfig, SubmitConfig, SwapchainConfig, VALIDATION_LAYER,
};
use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    CommandPool,
    CommandBuffer,
    Swapchain,
    Buffer,
    Image,
    Memory,
    ImageView,
    Sampler,
    RenderPass,
    Framebuffer,
    DescriptorPool,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    ShaderModule,
    Semaphore,
    Fence,
}

impl ObjectKind {
    fn instance_level(self) -> bool {
        matches!(
            self,
            ObjectKind::Instance
                | ObjectKind::DebugMessenger
                | ObjectKind::Surface
                | ObjectKind::Device
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create {
        kind: ObjectKind,
        handle: u64,
    },
    Destroy {
        kind: ObjectKind,
        handle: u64,
    },
    Submit {
        command_buffers: Vec<u64>,
        wait_semaphores: Vec<u64>,
        signal_semaphores: Vec<u64>,
        fence: u64,
    },
    Acquire {
        image_index: u32,
    },
    Present {
        image_index: u32,
    },
    QueueWaitIdle,
    DeviceWaitIdle,
}

#[derive(Clone, Debug)]
pub struct MockQueueFamily {
    pub flags: vk::QueueFlags,
    pub count: u32,
    pub present: bool,
}

/// One simulated physical device.
#[derive(Clone, Debug)]
pub struct MockAdapter {
    pub extensions: Vec<CString>,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub queue_families: Vec<MockQueueFamily>,
    pub memory_types: Vec<vk::MemoryPropertyFlags>,
    pub depth_formats: Vec<vk::Format>,
}

impl MockAdapter {
    /// Passes every selection check with a single graphics + present family.
    pub fn suitable() -> Self {
        Self {
            extensions: vec![ash::khr::swapchain::NAME.to_owned()],
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ..Default::default()
            },
            queue_families: vec![MockQueueFamily {
                flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
                count: 1,
                present: true,
            }],
            memory_types: vec![
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            depth_formats: vec![vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT],
        }
    }

    /// Graphics on family 0, presentation only on family 1.
    pub fn split_queues() -> Self {
        Self {
            queue_families: vec![
                MockQueueFamily {
                    flags: vk::QueueFlags::GRAPHICS,
                    count: 1,
                    present: false,
                },
                MockQueueFamily {
                    flags: vk::QueueFlags::COMPUTE,
                    count: 1,
                    present: true,
                },
                MockQueueFamily {
                    flags: vk::QueueFlags::GRAPHICS,
                    count: 1,
                    present: true,
                },
            ],
            ..Self::suitable()
        }
    }
}

const PHYS_BASE: u64 = 0x1_0000_0000;
const QUEUE_BASE: u64 = 0x2_0000_0000;

#[derive(Debug)]
struct MemoryState {
    bytes: Vec<u8>,
    host_visible: bool,
}

#[derive(Debug)]
struct BufferState {
    size: vk::DeviceSize,
    memory: Option<u64>,
}

#[derive(Debug)]
struct ImageState {
    width: u32,
    height: u32,
    format: vk::Format,
    layout: vk::ImageLayout,
    memory: Option<u64>,
    swapchain: Option<u64>,
}

#[derive(Clone, Debug)]
enum Recorded {
    CopyBuffer {
        src: u64,
        dst: u64,
        size: vk::DeviceSize,
    },
    CopyBufferToImage {
        src: u64,
        image: u64,
        width: u32,
        height: u32,
    },
    ImageBarrier {
        image: u64,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    BeginRenderPass {
        framebuffer: u64,
    },
    Draw {
        index_count: u32,
    },
    Other,
}

#[derive(Debug, Default)]
struct CommandState {
    pool: u64,
    recording: bool,
    executable: bool,
    commands: Vec<Recorded>,
}

#[derive(Debug, Default)]
struct MockState {
    adapters: Vec<MockAdapter>,
    debug_utils: bool,
    validation_layer: bool,
    loader_missing: bool,
    adapter: Option<usize>,

    next_handle: u64,
    live: HashMap<u64, ObjectKind>,
    calls: Vec<Call>,
    violations: Vec<String>,
    failures: Vec<(&'static str, usize)>,
    call_counts: HashMap<&'static str, usize>,

    device_queue_families: Vec<u32>,
    swapchain_configs: Vec<SwapchainConfig>,
    validation_enabled: bool,

    memories: HashMap<u64, MemoryState>,
    buffers: HashMap<u64, BufferState>,
    images: HashMap<u64, ImageState>,
    views: HashMap<u64, u64>,
    framebuffers: HashMap<u64, Vec<u64>>,
    swapchains: HashMap<u64, Vec<u64>>,
    acquire_cursor: HashMap<u64, u32>,
    commands: HashMap<u64, CommandState>,
    semaphores: HashMap<u64, bool>,
    fences: HashMap<u64, bool>,
}

impl MockState {
    fn enter(&mut self, call: &'static str) -> RenderResult<()> {
        let n = self.call_counts.entry(call).or_default();
        *n += 1;
        let n = *n;
        if self.failures.iter().any(|&(c, nth)| c == call && nth == n) {
            return Err(RenderError::Vulkan {
                call,
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        Ok(())
    }

    fn fresh(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn create(&mut self, kind: ObjectKind) -> u64 {
        let handle = self.fresh();
        self.live.insert(handle, kind);
        self.calls.push(Call::Create { kind, handle });
        handle
    }

    fn violation(&mut self, msg: String) {
        warn!("mock: {msg}");
        self.violations.push(msg);
    }

    /// Returns false when the handle was not a live object of `kind`.
    fn destroy(&mut self, kind: ObjectKind, handle: u64) -> bool {
        if handle == 0 {
            self.violation(format!("destroying a null {kind:?}"));
            return false;
        }
        match self.live.get(&handle).copied() {
            Some(k) if k == kind => {
                self.live.remove(&handle);
                self.calls.push(Call::Destroy { kind, handle });
                true
            }
            Some(k) => {
                self.violation(format!("destroying {k:?} {handle} as a {kind:?}"));
                false
            }
            None => {
                self.violation(format!("double destroy of {kind:?} {handle}"));
                false
            }
        }
    }

    fn is_live(&self, kind: ObjectKind, handle: u64) -> bool {
        self.live.get(&handle) == Some(&kind)
    }

    fn require_live(&mut self, kind: ObjectKind, handle: u64, what: &str) {
        if !self.is_live(kind, handle) {
            self.violation(format!("{what}: {kind:?} {handle} is not alive"));
        }
    }

    fn adapter(&self, phys: vk::PhysicalDevice) -> RenderResult<&MockAdapter> {
        phys.as_raw()
            .checked_sub(PHYS_BASE)
            .and_then(|i| self.adapters.get(i as usize))
            .ok_or(RenderError::Vulkan {
                call: "vkGetPhysicalDeviceProperties",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            })
    }

    fn current_adapter(&self) -> Option<&MockAdapter> {
        self.adapter.and_then(|i| self.adapters.get(i))
    }

    fn buffer_memory(&mut self, buffer: u64, what: &str) -> Option<u64> {
        match self.buffers.get(&buffer).and_then(|b| b.memory) {
            Some(mem) => Some(mem),
            None => {
                self.violation(format!("{what}: buffer {buffer} has no bound memory"));
                None
            }
        }
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: Recorded) {
        let raw = cmd.as_raw();
        match self.commands.get_mut(&raw) {
            Some(state) if state.recording => state.commands.push(command),
            _ => self.violation(format!("recording into command buffer {raw} outside begin/end")),
        }
    }

    fn execute(&mut self, cmd: u64) {
        let commands = match self.commands.get(&cmd) {
            Some(state) if state.executable => state.commands.clone(),
            _ => {
                self.violation(format!("submitting command buffer {cmd} that is not executable"));
                return;
            }
        };
        for command in commands {
            match command {
                Recorded::CopyBuffer { src, dst, size } => self.copy_buffer(src, dst, size),
                Recorded::CopyBufferToImage {
                    src,
                    image,
                    width,
                    height,
                } => self.copy_buffer_to_image(src, image, width, height),
                Recorded::ImageBarrier { image, old, new } => {
                    let Some(state) = self.images.get_mut(&image) else {
                        self.violation(format!("barrier on unknown image {image}"));
                        continue;
                    };
                    let current = state.layout;
                    state.layout = new;
                    if old != vk::ImageLayout::UNDEFINED && old != current {
                        self.violation(format!(
                            "image {image} transitioned from {old:?} but is in {current:?}"
                        ));
                    }
                }
                Recorded::BeginRenderPass { framebuffer } => {
                    self.require_live(ObjectKind::Framebuffer, framebuffer, "render pass");
                }
                Recorded::Draw { index_count } => {
                    if index_count == 0 {
                        self.violation("draw with zero indices".into());
                    }
                }
                Recorded::Other => {}
            }
        }
    }

    fn copy_buffer(&mut self, src: u64, dst: u64, size: vk::DeviceSize) {
        let (Some(src_mem), Some(dst_mem)) = (
            self.buffer_memory(src, "copy source"),
            self.buffer_memory(dst, "copy destination"),
        ) else {
            return;
        };
        let size = size as usize;
        let Some(bytes) = self
            .memories
            .get(&src_mem)
            .and_then(|m| m.bytes.get(..size))
            .map(<[u8]>::to_vec)
        else {
            self.violation(format!("copy of {size} bytes overruns source {src}"));
            return;
        };
        match self.memories.get_mut(&dst_mem) {
            Some(m) if m.bytes.len() >= size => m.bytes[..size].copy_from_slice(&bytes),
            _ => self.violation(format!("copy of {size} bytes overruns destination {dst}")),
        }
    }

    fn copy_buffer_to_image(&mut self, src: u64, image: u64, width: u32, height: u32) {
        let Some(src_mem) = self.buffer_memory(src, "image upload source") else {
            return;
        };
        let Some((layout, dst_mem)) = self.images.get(&image).map(|i| (i.layout, i.memory)) else {
            self.violation(format!("copy into unknown image {image}"));
            return;
        };
        if layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            self.violation(format!("copy into image {image} while in {layout:?}"));
        }
        let Some(dst_mem) = dst_mem else {
            self.violation(format!("image {image} has no bound memory"));
            return;
        };
        let size = width as usize * height as usize * 4;
        let bytes = self
            .memories
            .get(&src_mem)
            .and_then(|m| m.bytes.get(..size))
            .map(<[u8]>::to_vec);
        let written = match (bytes, self.memories.get_mut(&dst_mem)) {
            (Some(bytes), Some(m)) if m.bytes.len() >= size => {
                m.bytes[..size].copy_from_slice(&bytes);
                true
            }
            _ => false,
        };
        if !written {
            self.violation(format!("image copy of {size} bytes out of range"));
        }
    }
}

fn bytes_per_pixel(format: vk::Format) -> u64 {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT => 8,
        _ => 4,
    }
}

/// In-memory [`GpuBackend`].
#[derive(Debug)]
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// One suitable adapter, debug utils and the validation layer available.
    pub fn new() -> Self {
        let state = MockState {
            adapters: vec![MockAdapter::suitable()],
            debug_utils: true,
            validation_layer: true,
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn with_adapters(self, adapters: Vec<MockAdapter>) -> Self {
        self.state.borrow_mut().adapters = adapters;
        self
    }

    pub fn with_debug_utils(self, available: bool) -> Self {
        self.state.borrow_mut().debug_utils = available;
        self
    }

    pub fn with_validation_layer(self, installed: bool) -> Self {
        self.state.borrow_mut().validation_layer = installed;
        self
    }

    /// Behave like a machine with no Vulkan loader.
    pub fn without_loader(self) -> Self {
        self.state.borrow_mut().loader_missing = true;
        self
    }

    /// Makes the `nth` (1-based) invocation of `call` fail with
    /// `ERROR_OUT_OF_DEVICE_MEMORY`. `call` is the Vulkan entry point name, for example
    /// `"vkCreateImage"`.
    pub fn fail_on(self, call: &'static str, nth: usize) -> Self {
        self.state.borrow_mut().failures.push((call, nth));
        self
    }

    pub fn recorder(&self) -> MockRecorder {
        MockRecorder {
            state: Rc::clone(&self.state),
        }
    }

    fn st(&self) -> std::cell::RefMut<'_, MockState> {
        self.state.borrow_mut()
    }
}

/// Read access to a [`MockBackend`]'s log that outlives the backend.
#[derive(Clone, Debug)]
pub struct MockRecorder {
    state: Rc<RefCell<MockState>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockSummary {
    pub creates: usize,
    pub destroys: usize,
    pub submits: usize,
    pub presents: usize,
    pub live: usize,
    pub violations: usize,
}

impl MockRecorder {
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    pub fn live_objects(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn live_of(&self, kind: ObjectKind) -> usize {
        self.state
            .borrow()
            .live
            .values()
            .filter(|&&k| k == kind)
            .count()
    }

    /// Queue families of the queue-create entries handed to the last `create_device`.
    pub fn device_queue_families(&self) -> Vec<u32> {
        self.state.borrow().device_queue_families.clone()
    }

    pub fn swapchain_configs(&self) -> Vec<SwapchainConfig> {
        self.state.borrow().swapchain_configs.clone()
    }

    /// Whether the last instance was created with the validation layer enabled.
    pub fn validation_enabled(&self) -> bool {
        self.state.borrow().validation_enabled
    }

    /// Simulated contents of the memory bound to `buffer`.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        let st = self.state.borrow();
        let buf = st.buffers.get(&buffer.as_raw())?;
        let mem = st.memories.get(&buf.memory?)?;
        mem.bytes.get(..buf.size as usize).map(<[u8]>::to_vec)
    }

    /// Simulated contents of the memory bound to `image`, tightly packed.
    pub fn image_contents(&self, image: vk::Image) -> Option<Vec<u8>> {
        let st = self.state.borrow();
        let img = st.images.get(&image.as_raw())?;
        let mem = st.memories.get(&img.memory?)?;
        let size = img.width as u64 * img.height as u64 * bytes_per_pixel(img.format);
        mem.bytes.get(..size as usize).map(<[u8]>::to_vec)
    }

    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.state
            .borrow()
            .images
            .get(&image.as_raw())
            .map(|i| i.layout)
    }

    pub fn summary(&self) -> MockSummary {
        let st = self.state.borrow();
        let mut summary = MockSummary {
            live: st.live.len(),
            violations: st.violations.len(),
            ..Default::default()
        };
        for call in &st.calls {
            match call {
                Call::Create { .. } => summary.creates += 1,
                Call::Destroy { .. } => summary.destroys += 1,
                Call::Submit { .. } => summary.submits += 1,
                Call::Present { .. } => summary.presents += 1,
                _ => {}
            }
        }
        summary
    }
}

impl GpuBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_instance(&mut self, config: &InstanceConfig) -> RenderResult<vk::Instance> {
        let mut st = self.st();
        if st.loader_missing {
            return Err(RenderError::BackendUnavailable(
                "mock backend configured without a loader".into(),
            ));
        }
        st.enter("vkCreateInstance")?;
        if config.validation && !st.validation_layer {
            return Err(RenderError::LayerMissing(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }
        st.validation_enabled = config.validation;
        Ok(vk::Instance::from_raw(st.create(ObjectKind::Instance)))
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        let mut st = self.st();
        let others: Vec<ObjectKind> = st
            .live
            .iter()
            .filter(|&(&h, _)| h != instance.as_raw())
            .map(|(_, &k)| k)
            .collect();
        if !others.is_empty() {
            st.violation(format!("instance destroyed with live objects {others:?}"));
        }
        st.destroy(ObjectKind::Instance, instance.as_raw());
    }

    fn debug_messenger_supported(&self) -> bool {
        self.state.borrow().debug_utils
    }

    fn create_debug_messenger(&mut self) -> RenderResult<vk::DebugUtilsMessengerEXT> {
        let mut st = self.st();
        st.enter("vkCreateDebugUtilsMessengerEXT")?;
        if !st.debug_utils {
            return Err(RenderError::Vulkan {
                call: "vkCreateDebugUtilsMessengerEXT",
                result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            });
        }
        Ok(vk::DebugUtilsMessengerEXT::from_raw(
            st.create(ObjectKind::DebugMessenger),
        ))
    }

    fn destroy_debug_messenger(&mut self, messenger: vk::DebugUtilsMessengerEXT) {
        self.st()
            .destroy(ObjectKind::DebugMessenger, messenger.as_raw());
    }

    fn create_surface(&mut self) -> RenderResult<vk::SurfaceKHR> {
        let mut st = self.st();
        st.enter("vkCreateSurfaceKHR")?;
        Ok(vk::SurfaceKHR::from_raw(st.create(ObjectKind::Surface)))
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        let mut st = self.st();
        if st.live.values().any(|&k| k == ObjectKind::Swapchain) {
            st.violation("surface destroyed while a swapchain is alive".into());
        }
        st.destroy(ObjectKind::Surface, surface.as_raw());
    }

    fn enumerate_physical_devices(&self) -> RenderResult<Vec<vk::PhysicalDevice>> {
        let mut st = self.st();
        st.enter("vkEnumeratePhysicalDevices")?;
        Ok((0..st.adapters.len() as u64)
            .map(|i| vk::PhysicalDevice::from_raw(PHYS_BASE + i))
            .collect())
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> RenderResult<Vec<CString>> {
        Ok(self.st().adapter(phys)?.extensions.clone())
    }

    fn queue_families(
        &self,
        phys: vk::PhysicalDevice,
    ) -> RenderResult<Vec<vk::QueueFamilyProperties>> {
        Ok(self
            .st()
            .adapter(phys)?
            .queue_families
            .iter()
            .map(|f| vk::QueueFamilyProperties {
                queue_flags: f.flags,
                queue_count: f.count,
                ..Default::default()
            })
            .collect())
    }

    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        _surface: vk::SurfaceKHR,
    ) -> RenderResult<bool> {
        Ok(self
            .st()
            .adapter(phys)?
            .queue_families
            .get(family as usize)
            .is_some_and(|f| f.present))
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.st().adapter(phys)?.formats.clone())
    }

    fn surface_present_modes(
        &self,
        phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> RenderResult<Vec<vk::PresentModeKHR>> {
        Ok(self.st().adapter(phys)?.present_modes.clone())
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.st().adapter(phys)?.capabilities)
    }

    fn memory_properties(
        &self,
        phys: vk::PhysicalDevice,
    ) -> RenderResult<vk::PhysicalDeviceMemoryProperties> {
        let st = self.st();
        let adapter = st.adapter(phys)?;
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: adapter.memory_types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(&adapter.memory_types) {
            slot.property_flags = *flags;
            slot.heap_index = 0;
        }
        Ok(props)
    }

    fn format_properties(
        &self,
        phys: vk::PhysicalDevice,
        format: vk::Format,
    ) -> RenderResult<vk::FormatProperties> {
        let st = self.st();
        let adapter = st.adapter(phys)?;
        let mut props = vk::FormatProperties::default();
        if adapter.depth_formats.contains(&format) {
            props.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        Ok(props)
    }

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        config: &DeviceConfig,
    ) -> RenderResult<vk::Device> {
        let mut st = self.st();
        st.enter("vkCreateDevice")?;
        let (missing, family_count) = {
            let adapter = st.adapter(phys)?;
            let missing = config
                .extensions
                .iter()
                .find(|e| !adapter.extensions.contains(*e))
                .cloned();
            (missing, adapter.queue_families.len() as u32)
        };
        if let Some(missing) = missing {
            st.violation(format!("device extension {missing:?} not supported"));
            return Err(RenderError::Vulkan {
                call: "vkCreateDevice",
                result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            });
        }
        if config.queue_families.iter().any(|&f| f >= family_count) {
            st.violation("queue create info names a missing family".into());
        }
        st.adapter = Some((phys.as_raw() - PHYS_BASE) as usize);
        st.device_queue_families = config.queue_families.clone();
        Ok(vk::Device::from_raw(st.create(ObjectKind::Device)))
    }

    fn destroy_device(&mut self, device: vk::Device) {
        let mut st = self.st();
        let children: Vec<ObjectKind> = st
            .live
            .values()
            .copied()
            .filter(|k| !k.instance_level())
            .collect();
        if !children.is_empty() {
            st.violation(format!("device destroyed with live children {children:?}"));
        }
        st.destroy(ObjectKind::Device, device.as_raw());
    }

    fn device_queue(&self, family: u32) -> RenderResult<vk::Queue> {
        let st = self.state.borrow();
        if !st.device_queue_families.contains(&family) {
            return Err(RenderError::InvalidState(format!(
                "no queue requested on family {family}"
            )));
        }
        Ok(vk::Queue::from_raw(QUEUE_BASE + family as u64))
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkDeviceWaitIdle")?;
        st.calls.push(Call::DeviceWaitIdle);
        Ok(())
    }

    fn queue_wait_idle(&mut self, _queue: vk::Queue) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkQueueWaitIdle")?;
        st.calls.push(Call::QueueWaitIdle);
        Ok(())
    }

    fn create_swapchain(&mut self, config: &SwapchainConfig) -> RenderResult<vk::SwapchainKHR> {
        let mut st = self.st();
        st.enter("vkCreateSwapchainKHR")?;
        st.require_live(ObjectKind::Surface, config.surface.as_raw(), "swapchain");
        let swapchain = st.create(ObjectKind::Swapchain);
        let mut images = Vec::with_capacity(config.image_count as usize);
        for _ in 0..config.image_count {
            let image = st.fresh();
            st.images.insert(
                image,
                ImageState {
                    width: config.extent.width,
                    height: config.extent.height,
                    format: config.format.format,
                    layout: vk::ImageLayout::UNDEFINED,
                    memory: None,
                    swapchain: Some(swapchain),
                },
            );
            images.push(image);
        }
        st.swapchains.insert(swapchain, images);
        st.swapchain_configs.push(config.clone());
        Ok(vk::SwapchainKHR::from_raw(swapchain))
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        let mut st = self.st();
        let raw = swapchain.as_raw();
        let images = st.swapchains.remove(&raw).unwrap_or_default();
        let live_views = st
            .views
            .iter()
            .filter(|&(&v, &img)| images.contains(&img) && st.is_live(ObjectKind::ImageView, v))
            .count();
        if live_views > 0 {
            st.violation(format!(
                "swapchain {raw} destroyed with {live_views} live image views"
            ));
        }
        for image in images {
            st.images.remove(&image);
        }
        st.destroy(ObjectKind::Swapchain, raw);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        let st = self.state.borrow();
        st.swapchains
            .get(&swapchain.as_raw())
            .map(|images| images.iter().map(|&i| vk::Image::from_raw(i)).collect())
            .ok_or(RenderError::Vulkan {
                call: "vkGetSwapchainImagesKHR",
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            })
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<u32> {
        let mut st = self.st();
        st.enter("vkAcquireNextImageKHR")?;
        let raw = swapchain.as_raw();
        let count = st.swapchains.get(&raw).map_or(0, |i| i.len() as u32);
        if count == 0 {
            return Err(RenderError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
            });
        }
        let cursor = st.acquire_cursor.entry(raw).or_default();
        let image_index = *cursor % count;
        *cursor += 1;

        let sem = signal.as_raw();
        match st.semaphores.get(&sem).copied() {
            Some(false) => {
                st.semaphores.insert(sem, true);
            }
            Some(true) => st.violation(format!("acquire signals semaphore {sem} twice")),
            None => st.violation(format!("acquire signals unknown semaphore {sem}")),
        }
        st.calls.push(Call::Acquire { image_index });
        Ok(image_index)
    }

    fn queue_present(&mut self, _queue: vk::Queue, config: &PresentConfig) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkQueuePresentKHR")?;
        st.require_live(ObjectKind::Swapchain, config.swapchain.as_raw(), "present");
        let sem = config.wait_semaphore.as_raw();
        if st.semaphores.get(&sem) != Some(&true) {
            st.violation(format!("present waits on unsignaled semaphore {sem}"));
        }
        st.semaphores.insert(sem, false);
        st.calls.push(Call::Present {
            image_index: config.image_index,
        });
        Ok(())
    }

    fn create_buffer(&mut self, config: &BufferConfig) -> RenderResult<vk::Buffer> {
        let mut st = self.st();
        st.enter("vkCreateBuffer")?;
        let buffer = st.create(ObjectKind::Buffer);
        st.buffers.insert(
            buffer,
            BufferState {
                size: config.size,
                memory: None,
            },
        );
        Ok(vk::Buffer::from_raw(buffer))
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        let mut st = self.st();
        if st.destroy(ObjectKind::Buffer, buffer.as_raw()) {
            st.buffers.remove(&buffer.as_raw());
        }
    }

    fn buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> RenderResult<vk::MemoryRequirements> {
        let st = self.state.borrow();
        let size = st
            .buffers
            .get(&buffer.as_raw())
            .map(|b| b.size)
            .ok_or(RenderError::InvalidState(format!(
                "memory requirements of unknown buffer {}",
                buffer.as_raw()
            )))?;
        let types = st.current_adapter().map_or(0, |a| a.memory_types.len());
        Ok(vk::MemoryRequirements {
            size,
            alignment: 16,
            memory_type_bits: (1u32 << types) - 1,
        })
    }

    fn bind_buffer_memory(
        &mut self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkBindBufferMemory")?;
        let mem = memory.as_raw();
        let available = st.memories.get(&mem).map_or(0, |m| m.bytes.len() as u64);
        match st.buffers.get_mut(&buffer.as_raw()) {
            Some(b) if b.size <= available => b.memory = Some(mem),
            _ => st.violation(format!(
                "binding memory {mem} to buffer {}",
                buffer.as_raw()
            )),
        }
        Ok(())
    }

    fn create_image(&mut self, config: &ImageConfig) -> RenderResult<vk::Image> {
        let mut st = self.st();
        st.enter("vkCreateImage")?;
        let image = st.create(ObjectKind::Image);
        st.images.insert(
            image,
            ImageState {
                width: config.width,
                height: config.height,
                format: config.format,
                layout: config.initial_layout,
                memory: None,
                swapchain: None,
            },
        );
        Ok(vk::Image::from_raw(image))
    }

    fn destroy_image(&mut self, image: vk::Image) {
        let mut st = self.st();
        if st.images.get(&image.as_raw()).is_some_and(|i| i.swapchain.is_some()) {
            st.violation("swapchain images are owned by the swapchain".into());
            return;
        }
        if st.destroy(ObjectKind::Image, image.as_raw()) {
            st.images.remove(&image.as_raw());
        }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> RenderResult<vk::MemoryRequirements> {
        let st = self.state.borrow();
        let img = st
            .images
            .get(&image.as_raw())
            .ok_or(RenderError::InvalidState(format!(
                "memory requirements of unknown image {}",
                image.as_raw()
            )))?;
        let types = st.current_adapter().map_or(0, |a| a.memory_types.len());
        Ok(vk::MemoryRequirements {
            size: img.width as u64 * img.height as u64 * bytes_per_pixel(img.format),
            alignment: 256,
            memory_type_bits: (1u32 << types) - 1,
        })
    }

    fn bind_image_memory(
        &mut self,
        image: vk::Image,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkBindImageMemory")?;
        let mem = memory.as_raw();
        if !st.memories.contains_key(&mem) {
            st.violation(format!("binding unknown memory {mem}"));
        }
        match st.images.get_mut(&image.as_raw()) {
            Some(i) => i.memory = Some(mem),
            None => st.violation(format!("binding memory to unknown image {}", image.as_raw())),
        }
        Ok(())
    }

    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type: u32,
    ) -> RenderResult<vk::DeviceMemory> {
        let mut st = self.st();
        st.enter("vkAllocateMemory")?;
        let host_visible = st
            .current_adapter()
            .and_then(|a| a.memory_types.get(memory_type as usize))
            .is_some_and(|f| f.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        let memory = st.create(ObjectKind::Memory);
        st.memories.insert(
            memory,
            MemoryState {
                bytes: vec![0; size as usize],
                host_visible,
            },
        );
        Ok(vk::DeviceMemory::from_raw(memory))
    }

    fn free_memory(&mut self, memory: vk::DeviceMemory) {
        let mut st = self.st();
        if st.destroy(ObjectKind::Memory, memory.as_raw()) {
            st.memories.remove(&memory.as_raw());
        }
    }

    fn write_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkMapMemory")?;
        let mem = memory.as_raw();
        let map_failed = RenderError::Vulkan {
            call: "vkMapMemory",
            result: vk::Result::ERROR_MEMORY_MAP_FAILED,
        };
        let start = offset as usize;
        let outcome = match st.memories.get_mut(&mem) {
            None => Err(format!("mapping unknown memory {mem}")),
            Some(m) if !m.host_visible => {
                Err(format!("host write into device-local memory {mem}"))
            }
            Some(m) => match m.bytes.get_mut(start..start + data.len()) {
                Some(dst) => {
                    dst.copy_from_slice(data);
                    Ok(())
                }
                None => Err(format!(
                    "write of {} bytes overruns memory {mem}",
                    data.len()
                )),
            },
        };
        outcome.map_err(|msg| {
            st.violation(msg);
            map_failed
        })
    }

    fn read_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        len: usize,
    ) -> RenderResult<Vec<u8>> {
        let mut st = self.st();
        st.enter("vkMapMemory")?;
        let mem = memory.as_raw();
        let map_failed = RenderError::Vulkan {
            call: "vkMapMemory",
            result: vk::Result::ERROR_MEMORY_MAP_FAILED,
        };
        let start = offset as usize;
        let bytes = st
            .memories
            .get(&mem)
            .filter(|m| m.host_visible)
            .and_then(|m| m.bytes.get(start..start + len))
            .map(<[u8]>::to_vec);
        match bytes {
            Some(bytes) => Ok(bytes),
            None => {
                st.violation(format!("host read of {len} bytes from memory {mem} refused"));
                Err(map_failed)
            }
        }
    }

    fn create_image_view(&mut self, config: &ImageViewConfig) -> RenderResult<vk::ImageView> {
        let mut st = self.st();
        st.enter("vkCreateImageView")?;
        let image = config.image.as_raw();
        if !st.images.contains_key(&image) {
            st.violation(format!("view of unknown image {image}"));
        }
        let view = st.create(ObjectKind::ImageView);
        st.views.insert(view, image);
        Ok(vk::ImageView::from_raw(view))
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        let mut st = self.st();
        let raw = view.as_raw();
        let referenced = st
            .framebuffers
            .iter()
            .any(|(fb, views)| views.contains(&raw) && st.is_live(ObjectKind::Framebuffer, *fb));
        if referenced {
            st.violation(format!("image view {raw} destroyed while a framebuffer uses it"));
        }
        if st.destroy(ObjectKind::ImageView, raw) {
            st.views.remove(&raw);
        }
    }

    fn create_sampler(&mut self, _config: &SamplerConfig) -> RenderResult<vk::Sampler> {
        let mut st = self.st();
        st.enter("vkCreateSampler")?;
        Ok(vk::Sampler::from_raw(st.create(ObjectKind::Sampler)))
    }

    fn destroy_sampler(&mut self, sampler: vk::Sampler) {
        self.st().destroy(ObjectKind::Sampler, sampler.as_raw());
    }

    fn create_command_pool(&mut self, _family: u32) -> RenderResult<vk::CommandPool> {
        let mut st = self.st();
        st.enter("vkCreateCommandPool")?;
        Ok(vk::CommandPool::from_raw(st.create(ObjectKind::CommandPool)))
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        let mut st = self.st();
        let raw = pool.as_raw();
        let outstanding = st.commands.values().filter(|c| c.pool == raw).count();
        if outstanding > 0 {
            st.violation(format!(
                "command pool {raw} destroyed with {outstanding} command buffers outstanding"
            ));
        }
        st.destroy(ObjectKind::CommandPool, raw);
    }

    fn allocate_command_buffer(
        &mut self,
        pool: vk::CommandPool,
    ) -> RenderResult<vk::CommandBuffer> {
        let mut st = self.st();
        st.enter("vkAllocateCommandBuffers")?;
        st.require_live(ObjectKind::CommandPool, pool.as_raw(), "allocate command buffer");
        let cmd = st.create(ObjectKind::CommandBuffer);
        st.commands.insert(
            cmd,
            CommandState {
                pool: pool.as_raw(),
                ..Default::default()
            },
        );
        Ok(vk::CommandBuffer::from_raw(cmd))
    }

    fn free_command_buffer(&mut self, _pool: vk::CommandPool, cmd: vk::CommandBuffer) {
        let mut st = self.st();
        if st.destroy(ObjectKind::CommandBuffer, cmd.as_raw()) {
            st.commands.remove(&cmd.as_raw());
        }
    }

    fn begin_command_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        _one_time: bool,
    ) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkBeginCommandBuffer")?;
        let raw = cmd.as_raw();
        match st.commands.get_mut(&raw) {
            Some(state) => {
                state.recording = true;
                state.executable = false;
                state.commands.clear();
            }
            None => st.violation(format!("begin on unknown command buffer {raw}")),
        }
        Ok(())
    }

    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkEndCommandBuffer")?;
        let raw = cmd.as_raw();
        match st.commands.get_mut(&raw) {
            Some(state) if state.recording => {
                state.recording = false;
                state.executable = true;
            }
            _ => st.violation(format!("end on command buffer {raw} that is not recording")),
        }
        Ok(())
    }

    fn cmd_copy_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        self.st().record(
            cmd,
            Recorded::CopyBuffer {
                src: src.as_raw(),
                dst: dst.as_raw(),
                size,
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) {
        self.st().record(
            cmd,
            Recorded::CopyBufferToImage {
                src: src.as_raw(),
                image: image.as_raw(),
                width,
                height,
            },
        );
    }

    fn cmd_image_barrier(&mut self, cmd: vk::CommandBuffer, transition: &LayoutTransition) {
        self.st().record(
            cmd,
            Recorded::ImageBarrier {
                image: transition.image.as_raw(),
                old: transition.old_layout,
                new: transition.new_layout,
            },
        );
    }

    fn cmd_buffer_barrier(&mut self, cmd: vk::CommandBuffer, _barrier: &BufferBarrier) {
        self.st().record(cmd, Recorded::Other);
    }

    fn cmd_begin_render_pass(&mut self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.st().record(
            cmd,
            Recorded::BeginRenderPass {
                framebuffer: begin.framebuffer.as_raw(),
            },
        );
    }

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        self.st().record(cmd, Recorded::Other);
    }

    fn cmd_bind_pipeline(&mut self, cmd: vk::CommandBuffer, _pipeline: vk::Pipeline) {
        self.st().record(cmd, Recorded::Other);
    }

    fn cmd_bind_descriptor_set(
        &mut self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _set: vk::DescriptorSet,
    ) {
        self.st().record(cmd, Recorded::Other);
    }

    fn cmd_bind_vertex_buffer(&mut self, cmd: vk::CommandBuffer, _buffer: vk::Buffer) {
        self.st().record(cmd, Recorded::Other);
    }

    fn cmd_bind_index_buffer(&mut self, cmd: vk::CommandBuffer, _buffer: vk::Buffer) {
        self.st().record(cmd, Recorded::Other);
    }

    fn cmd_draw_indexed(&mut self, cmd: vk::CommandBuffer, index_count: u32) {
        self.st().record(cmd, Recorded::Draw { index_count });
    }

    fn queue_submit(&mut self, _queue: vk::Queue, submit: &SubmitConfig) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkQueueSubmit")?;
        for &(sem, _) in &submit.wait_semaphores {
            let raw = sem.as_raw();
            if st.semaphores.get(&raw) != Some(&true) {
                st.violation(format!("submit waits on unsignaled semaphore {raw}"));
            }
            st.semaphores.insert(raw, false);
        }
        for cmd in &submit.command_buffers {
            st.execute(cmd.as_raw());
        }
        for sem in &submit.signal_semaphores {
            let raw = sem.as_raw();
            if st.semaphores.get(&raw) == Some(&true) {
                st.violation(format!("submit signals semaphore {raw} that is already signaled"));
            }
            st.semaphores.insert(raw, true);
        }
        let fence = submit.fence.as_raw();
        if fence != 0 {
            if st.fences.get(&fence) != Some(&false) {
                st.violation(format!("submit signals fence {fence} that was not reset"));
            }
            st.fences.insert(fence, true);
        }
        st.calls.push(Call::Submit {
            command_buffers: submit.command_buffers.iter().map(|c| c.as_raw()).collect(),
            wait_semaphores: submit.wait_semaphores.iter().map(|(s, _)| s.as_raw()).collect(),
            signal_semaphores: submit.signal_semaphores.iter().map(|s| s.as_raw()).collect(),
            fence,
        });
        Ok(())
    }

    fn create_render_pass(&mut self, _config: &RenderPassConfig) -> RenderResult<vk::RenderPass> {
        let mut st = self.st();
        st.enter("vkCreateRenderPass")?;
        Ok(vk::RenderPass::from_raw(st.create(ObjectKind::RenderPass)))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.st().destroy(ObjectKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(&mut self, config: &FramebufferConfig) -> RenderResult<vk::Framebuffer> {
        let mut st = self.st();
        st.enter("vkCreateFramebuffer")?;
        st.require_live(ObjectKind::RenderPass, config.render_pass.as_raw(), "framebuffer");
        let views: Vec<u64> = config.attachments.iter().map(|v| v.as_raw()).collect();
        for &view in &views {
            st.require_live(ObjectKind::ImageView, view, "framebuffer attachment");
        }
        let framebuffer = st.create(ObjectKind::Framebuffer);
        st.framebuffers.insert(framebuffer, views);
        Ok(vk::Framebuffer::from_raw(framebuffer))
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        let mut st = self.st();
        if st.destroy(ObjectKind::Framebuffer, framebuffer.as_raw()) {
            st.framebuffers.remove(&framebuffer.as_raw());
        }
    }

    fn create_descriptor_pool(
        &mut self,
        _config: &DescriptorPoolConfig,
    ) -> RenderResult<vk::DescriptorPool> {
        let mut st = self.st();
        st.enter("vkCreateDescriptorPool")?;
        Ok(vk::DescriptorPool::from_raw(
            st.create(ObjectKind::DescriptorPool),
        ))
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        self.st().destroy(ObjectKind::DescriptorPool, pool.as_raw());
    }

    fn create_descriptor_set_layout(
        &mut self,
        _config: &DescriptorSetLayoutConfig,
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let mut st = self.st();
        st.enter("vkCreateDescriptorSetLayout")?;
        Ok(vk::DescriptorSetLayout::from_raw(
            st.create(ObjectKind::DescriptorSetLayout),
        ))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        self.st()
            .destroy(ObjectKind::DescriptorSetLayout, layout.as_raw());
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> RenderResult<vk::DescriptorSet> {
        let mut st = self.st();
        st.enter("vkAllocateDescriptorSets")?;
        st.require_live(ObjectKind::DescriptorPool, pool.as_raw(), "descriptor set");
        st.require_live(
            ObjectKind::DescriptorSetLayout,
            layout.as_raw(),
            "descriptor set",
        );
        Ok(vk::DescriptorSet::from_raw(st.fresh()))
    }

    fn update_descriptor_set(&mut self, write: &DescriptorWrite) {
        let mut st = self.st();
        st.require_live(ObjectKind::Buffer, write.uniform_buffer.as_raw(), "descriptor write");
        st.require_live(ObjectKind::ImageView, write.image_view.as_raw(), "descriptor write");
        st.require_live(ObjectKind::Sampler, write.sampler.as_raw(), "descriptor write");
    }

    fn create_shader_module(&mut self, code: &[u32]) -> RenderResult<vk::ShaderModule> {
        let mut st = self.st();
        st.enter("vkCreateShaderModule")?;
        if code.is_empty() {
            return Err(RenderError::Vulkan {
                call: "vkCreateShaderModule",
                result: vk::Result::ERROR_INVALID_SHADER_NV,
            });
        }
        Ok(vk::ShaderModule::from_raw(
            st.create(ObjectKind::ShaderModule),
        ))
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.st().destroy(ObjectKind::ShaderModule, module.as_raw());
    }

    fn create_pipeline_layout(
        &mut self,
        config: &PipelineLayoutConfig,
    ) -> RenderResult<vk::PipelineLayout> {
        let mut st = self.st();
        st.enter("vkCreatePipelineLayout")?;
        for layout in &config.set_layouts {
            st.require_live(
                ObjectKind::DescriptorSetLayout,
                layout.as_raw(),
                "pipeline layout",
            );
        }
        Ok(vk::PipelineLayout::from_raw(
            st.create(ObjectKind::PipelineLayout),
        ))
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.st().destroy(ObjectKind::PipelineLayout, layout.as_raw());
    }

    fn create_graphics_pipeline(
        &mut self,
        config: &GraphicsPipelineConfig,
    ) -> RenderResult<vk::Pipeline> {
        let mut st = self.st();
        st.enter("vkCreateGraphicsPipelines")?;
        st.require_live(ObjectKind::ShaderModule, config.vertex_module.as_raw(), "pipeline");
        st.require_live(ObjectKind::ShaderModule, config.fragment_module.as_raw(), "pipeline");
        st.require_live(ObjectKind::PipelineLayout, config.layout.as_raw(), "pipeline");
        st.require_live(ObjectKind::RenderPass, config.render_pass.as_raw(), "pipeline");
        Ok(vk::Pipeline::from_raw(st.create(ObjectKind::Pipeline)))
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.st().destroy(ObjectKind::Pipeline, pipeline.as_raw());
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        let mut st = self.st();
        st.enter("vkCreateSemaphore")?;
        let sem = st.create(ObjectKind::Semaphore);
        st.semaphores.insert(sem, false);
        Ok(vk::Semaphore::from_raw(sem))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        let mut st = self.st();
        if st.destroy(ObjectKind::Semaphore, semaphore.as_raw()) {
            st.semaphores.remove(&semaphore.as_raw());
        }
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let mut st = self.st();
        st.enter("vkCreateFence")?;
        let fence = st.create(ObjectKind::Fence);
        st.fences.insert(fence, signaled);
        Ok(vk::Fence::from_raw(fence))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        let mut st = self.st();
        if st.destroy(ObjectKind::Fence, fence.as_raw()) {
            st.fences.remove(&fence.as_raw());
        }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkWaitForFences")?;
        let raw = fence.as_raw();
        if st.fences.get(&raw) != Some(&true) {
            // Nothing pending could ever signal it: on a real device this hangs.
            st.violation(format!("waiting on fence {raw} that can never signal"));
            return Err(RenderError::Vulkan {
                call: "vkWaitForFences",
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let mut st = self.st();
        st.enter("vkResetFences")?;
        match st.fences.get_mut(&fence.as_raw()) {
            Some(signaled) => *signaled = false,
            None => st.violation(format!("reset of unknown fence {}", fence.as_raw())),
        }
        Ok(())
    }
}
