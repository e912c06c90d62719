// SPDX-License-Identifier: CEPL-1.0
//! Vulkan implementation of [`GpuBackend`] on top of `ash`.
//!
//! The backend owns the function tables (entry, instance, device and the KHR/EXT
//! extension loaders) but none of the objects it creates: every handle goes back to the
//! caller, which tracks it and hands it back for destruction. Each trait method turns a
//! `cave_render` config into the matching `vk::*CreateInfo` just before the call.
#![deny(unsafe_op_in_unsafe_fn)]

use std::ffi::{c_char, c_void, CStr};

use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use cave_render::{
    BufferBarrier, BufferConfig, DescriptorPoolConfig, DescriptorSetLayoutConfig, DescriptorWrite,
    DeviceConfig, FramebufferConfig, GpuBackend, GraphicsPipelineConfig, ImageConfig,
    ImageViewConfig, InstanceConfig, LayoutTransition, PipelineLayoutConfig, PresentConfig,
    RenderError, RenderPassBegin, RenderPassConfig, RenderResult, SamplerConfig, Sharing,
    SubmitConfig, SwapchainConfig, VkResultExt, VALIDATION_LAYER,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, trace, warn};

const SHADER_ENTRY: &CStr = c"main";

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback struct for the duration of the call.
    let message = unsafe { (*data).p_message };
    if message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else {
        trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}

struct InstanceFns {
    instance: ash::Instance,
    surface: surface::Instance,
    debug: Option<ext_debug::Instance>,
}

struct DeviceFns {
    device: ash::Device,
    swapchain: swapchain::Device,
}

/// Drives a real Vulkan driver through the system loader.
pub struct AshBackend {
    entry: Entry,
    display: RawDisplayHandle,
    window: RawWindowHandle,
    instance: Option<InstanceFns>,
    device: Option<DeviceFns>,
}

impl AshBackend {
    /// Opens the Vulkan loader. Nothing is created until [`GpuBackend::create_instance`].
    ///
    /// # Safety
    /// `display` and `window` must stay valid for as long as the backend, or any surface
    /// created from it, is alive.
    pub unsafe fn new(display: RawDisplayHandle, window: RawWindowHandle) -> RenderResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| RenderError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            entry,
            display,
            window,
            instance: None,
            device: None,
        })
    }

    fn instance_fns(&self) -> RenderResult<&InstanceFns> {
        self.instance
            .as_ref()
            .ok_or_else(|| RenderError::InvalidState("no Vulkan instance".into()))
    }

    fn device_fns(&self) -> RenderResult<&DeviceFns> {
        self.device
            .as_ref()
            .ok_or_else(|| RenderError::InvalidState("no logical device".into()))
    }

    fn device(&self) -> RenderResult<&ash::Device> {
        self.device_fns().map(|d| &d.device)
    }

    /// Runs an infallible device call; logs instead when the device is already gone.
    fn with_device(&self, what: &str, f: impl FnOnce(&ash::Device)) {
        match &self.device {
            Some(fns) => f(&fns.device),
            None => error!("{what} issued without a logical device"),
        }
    }

    fn layer_available(&self, name: &CStr) -> RenderResult<bool> {
        let layers = unsafe { self.entry.enumerate_instance_layer_properties() }
            .vk_call("vkEnumerateInstanceLayerProperties")?;
        Ok(layers
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name))
    }

    fn instance_extension_available(&self, name: &CStr) -> RenderResult<bool> {
        let exts = unsafe { self.entry.enumerate_instance_extension_properties(None) }
            .vk_call("vkEnumerateInstanceExtensionProperties")?;
        Ok(exts
            .iter()
            .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == name))
    }
}

fn sharing_mode(sharing: &Sharing) -> (vk::SharingMode, &[u32]) {
    match sharing {
        Sharing::Exclusive => (vk::SharingMode::EXCLUSIVE, &[]),
        Sharing::Concurrent(families) => (vk::SharingMode::CONCURRENT, families.as_slice()),
    }
}

fn single_level(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl GpuBackend for AshBackend {
    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn create_instance(&mut self, config: &InstanceConfig) -> RenderResult<vk::Instance> {
        if self.instance.is_some() {
            return Err(RenderError::InvalidState("instance already created".into()));
        }
        if config.validation && !self.layer_available(VALIDATION_LAYER)? {
            return Err(RenderError::LayerMissing(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(self.display)
                .vk_call("vkEnumerateInstanceExtensionProperties")?
                .to_vec();
        // Validation without debug utils still runs; messages just go to the loader's output.
        let debug_utils = config.validation && self.instance_extension_available(ext_debug::NAME)?;
        if debug_utils {
            extensions.push(ext_debug::NAME.as_ptr());
        }
        let layers: Vec<*const c_char> = if config.validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(&config.app_name)
            .engine_name(&config.app_name)
            .api_version(vk::API_VERSION_1_0);
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .vk_call("vkCreateInstance")?;
        info!(
            validation = config.validation,
            debug_utils,
            extensions = extensions.len(),
            "Vulkan instance created"
        );

        let handle = instance.handle();
        self.instance = Some(InstanceFns {
            surface: surface::Instance::new(&self.entry, &instance),
            debug: debug_utils.then(|| ext_debug::Instance::new(&self.entry, &instance)),
            instance,
        });
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        match self.instance.take() {
            Some(fns) if fns.instance.handle() == instance => unsafe {
                fns.instance.destroy_instance(None)
            },
            other => {
                error!(?instance, "destroy of an instance this backend does not own");
                self.instance = other;
            }
        }
    }

    fn debug_messenger_supported(&self) -> bool {
        self.instance.as_ref().is_some_and(|i| i.debug.is_some())
    }

    fn create_debug_messenger(&mut self) -> RenderResult<vk::DebugUtilsMessengerEXT> {
        let loader = self
            .instance_fns()?
            .debug
            .as_ref()
            .ok_or_else(|| RenderError::InvalidState("debug utils not enabled".into()))?;
        let ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));
        unsafe { loader.create_debug_utils_messenger(&ci, None) }
            .vk_call("vkCreateDebugUtilsMessengerEXT")
    }

    fn destroy_debug_messenger(&mut self, messenger: vk::DebugUtilsMessengerEXT) {
        if let Some(loader) = self.instance.as_ref().and_then(|i| i.debug.as_ref()) {
            unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
        }
    }

    fn create_surface(&mut self) -> RenderResult<vk::SurfaceKHR> {
        let fns = self.instance_fns()?;
        unsafe {
            ash_window::create_surface(&self.entry, &fns.instance, self.display, self.window, None)
        }
        .vk_call("vkCreateSurfaceKHR")
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        if let Some(fns) = &self.instance {
            unsafe { fns.surface.destroy_surface(surface, None) };
        }
    }

    fn enumerate_physical_devices(&self) -> RenderResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance_fns()?.instance.enumerate_physical_devices() }
            .vk_call("vkEnumeratePhysicalDevices")
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> RenderResult<Vec<std::ffi::CString>> {
        let props = unsafe {
            self.instance_fns()?
                .instance
                .enumerate_device_extension_properties(phys)
        }
        .vk_call("vkEnumerateDeviceExtensionProperties")?;
        Ok(props
            .iter()
            .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn queue_families(
        &self,
        phys: vk::PhysicalDevice,
    ) -> RenderResult<Vec<vk::QueueFamilyProperties>> {
        Ok(unsafe {
            self.instance_fns()?
                .instance
                .get_physical_device_queue_family_properties(phys)
        })
    }

    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<bool> {
        unsafe {
            self.instance_fns()?
                .surface
                .get_physical_device_surface_support(phys, family, surface)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.instance_fns()?
                .surface
                .get_physical_device_surface_formats(phys, surface)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    fn surface_present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.instance_fns()?
                .surface
                .get_physical_device_surface_present_modes(phys, surface)
        }
        .vk_call("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.instance_fns()?
                .surface
                .get_physical_device_surface_capabilities(phys, surface)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    fn memory_properties(
        &self,
        phys: vk::PhysicalDevice,
    ) -> RenderResult<vk::PhysicalDeviceMemoryProperties> {
        Ok(unsafe {
            self.instance_fns()?
                .instance
                .get_physical_device_memory_properties(phys)
        })
    }

    fn format_properties(
        &self,
        phys: vk::PhysicalDevice,
        format: vk::Format,
    ) -> RenderResult<vk::FormatProperties> {
        Ok(unsafe {
            self.instance_fns()?
                .instance
                .get_physical_device_format_properties(phys, format)
        })
    }

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        config: &DeviceConfig,
    ) -> RenderResult<vk::Device> {
        if self.device.is_some() {
            return Err(RenderError::InvalidState("device already created".into()));
        }
        let fns = self.instance_fns()?;

        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = config
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();
        let extensions: Vec<*const c_char> =
            config.extensions.iter().map(|e| e.as_ptr()).collect();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&config.features);

        let device = unsafe { fns.instance.create_device(phys, &create_info, None) }
            .vk_call("vkCreateDevice")?;
        let props = unsafe { fns.instance.get_physical_device_properties(phys) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
        info!(gpu = %name.to_string_lossy(), families = ?config.queue_families, "logical device created");

        let swapchain = swapchain::Device::new(&fns.instance, &device);
        let handle = device.handle();
        self.device = Some(DeviceFns { device, swapchain });
        Ok(handle)
    }

    fn destroy_device(&mut self, device: vk::Device) {
        match self.device.take() {
            Some(fns) if fns.device.handle() == device => unsafe {
                fns.device.destroy_device(None)
            },
            other => {
                error!(?device, "destroy of a device this backend does not own");
                self.device = other;
            }
        }
    }

    fn device_queue(&self, family: u32) -> RenderResult<vk::Queue> {
        Ok(unsafe { self.device()?.get_device_queue(family, 0) })
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        unsafe { self.device()?.device_wait_idle() }.vk_call("vkDeviceWaitIdle")
    }

    fn queue_wait_idle(&mut self, queue: vk::Queue) -> RenderResult<()> {
        unsafe { self.device()?.queue_wait_idle(queue) }.vk_call("vkQueueWaitIdle")
    }

    fn create_swapchain(&mut self, config: &SwapchainConfig) -> RenderResult<vk::SwapchainKHR> {
        let fns = self.device_fns()?;
        let (mode, families) = sharing_mode(&config.sharing);
        let ci = vk::SwapchainCreateInfoKHR::default()
            .surface(config.surface)
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(mode)
            .queue_family_indices(families)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(config.old_swapchain);
        unsafe { fns.swapchain.create_swapchain(&ci, None) }.vk_call("vkCreateSwapchainKHR")
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        if let Some(fns) = &self.device {
            unsafe { fns.swapchain.destroy_swapchain(swapchain, None) };
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        unsafe { self.device_fns()?.swapchain.get_swapchain_images(swapchain) }
            .vk_call("vkGetSwapchainImagesKHR")
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<u32> {
        let (index, suboptimal) = unsafe {
            self.device_fns()?.swapchain.acquire_next_image(
                swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        }
        .vk_call("vkAcquireNextImageKHR")?;
        if suboptimal {
            debug!(index, "swapchain suboptimal on acquire");
        }
        Ok(index)
    }

    fn queue_present(&mut self, queue: vk::Queue, config: &PresentConfig) -> RenderResult<()> {
        let waits = [config.wait_semaphore];
        let swapchains = [config.swapchain];
        let indices = [config.image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let suboptimal = unsafe { self.device_fns()?.swapchain.queue_present(queue, &info) }
            .vk_call("vkQueuePresentKHR")?;
        if suboptimal {
            debug!(index = config.image_index, "swapchain suboptimal on present");
        }
        Ok(())
    }

    fn create_buffer(&mut self, config: &BufferConfig) -> RenderResult<vk::Buffer> {
        let ci = vk::BufferCreateInfo {
            size: config.size,
            usage: config.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe { self.device()?.create_buffer(&ci, None) }.vk_call("vkCreateBuffer")
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.with_device("vkDestroyBuffer", |d| unsafe { d.destroy_buffer(buffer, None) });
    }

    fn buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> RenderResult<vk::MemoryRequirements> {
        Ok(unsafe { self.device()?.get_buffer_memory_requirements(buffer) })
    }

    fn bind_buffer_memory(
        &mut self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()> {
        unsafe { self.device()?.bind_buffer_memory(buffer, memory, 0) }
            .vk_call("vkBindBufferMemory")
    }

    fn create_image(&mut self, config: &ImageConfig) -> RenderResult<vk::Image> {
        let ci = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: config.format,
            extent: vk::Extent3D {
                width: config.width,
                height: config.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: config.tiling,
            usage: config.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: config.initial_layout,
            ..Default::default()
        };
        unsafe { self.device()?.create_image(&ci, None) }.vk_call("vkCreateImage")
    }

    fn destroy_image(&mut self, image: vk::Image) {
        self.with_device("vkDestroyImage", |d| unsafe { d.destroy_image(image, None) });
    }

    fn image_memory_requirements(&self, image: vk::Image) -> RenderResult<vk::MemoryRequirements> {
        Ok(unsafe { self.device()?.get_image_memory_requirements(image) })
    }

    fn bind_image_memory(
        &mut self,
        image: vk::Image,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()> {
        unsafe { self.device()?.bind_image_memory(image, memory, 0) }
            .vk_call("vkBindImageMemory")
    }

    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type: u32,
    ) -> RenderResult<vk::DeviceMemory> {
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type);
        unsafe { self.device()?.allocate_memory(&info, None) }.vk_call("vkAllocateMemory")
    }

    fn free_memory(&mut self, memory: vk::DeviceMemory) {
        self.with_device("vkFreeMemory", |d| unsafe { d.free_memory(memory, None) });
    }

    fn write_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()> {
        let device = self.device()?;
        unsafe {
            let ptr = device
                .map_memory(
                    memory,
                    offset,
                    data.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .vk_call("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            device.unmap_memory(memory);
        }
        Ok(())
    }

    fn read_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        len: usize,
    ) -> RenderResult<Vec<u8>> {
        let device = self.device()?;
        unsafe {
            let ptr = device
                .map_memory(
                    memory,
                    offset,
                    len as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .vk_call("vkMapMemory")?;
            let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec();
            device.unmap_memory(memory);
            Ok(bytes)
        }
    }

    fn create_image_view(&mut self, config: &ImageViewConfig) -> RenderResult<vk::ImageView> {
        let ci = vk::ImageViewCreateInfo {
            image: config.image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: config.format,
            components: vk::ComponentMapping::default(),
            subresource_range: single_level(config.aspect),
            ..Default::default()
        };
        unsafe { self.device()?.create_image_view(&ci, None) }.vk_call("vkCreateImageView")
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.with_device("vkDestroyImageView", |d| unsafe {
            d.destroy_image_view(view, None)
        });
    }

    fn create_sampler(&mut self, config: &SamplerConfig) -> RenderResult<vk::Sampler> {
        let ci = vk::SamplerCreateInfo {
            mag_filter: config.filter,
            min_filter: config.filter,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: config.address_mode,
            address_mode_v: config.address_mode,
            address_mode_w: config.address_mode,
            anisotropy_enable: vk::FALSE,
            max_anisotropy: 1.0,
            compare_enable: vk::FALSE,
            compare_op: vk::CompareOp::ALWAYS,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: vk::FALSE,
            ..Default::default()
        };
        unsafe { self.device()?.create_sampler(&ci, None) }.vk_call("vkCreateSampler")
    }

    fn destroy_sampler(&mut self, sampler: vk::Sampler) {
        self.with_device("vkDestroySampler", |d| unsafe {
            d.destroy_sampler(sampler, None)
        });
    }

    fn create_command_pool(&mut self, family: u32) -> RenderResult<vk::CommandPool> {
        let ci = vk::CommandPoolCreateInfo {
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        unsafe { self.device()?.create_command_pool(&ci, None) }.vk_call("vkCreateCommandPool")
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.with_device("vkDestroyCommandPool", |d| unsafe {
            d.destroy_command_pool(pool, None)
        });
    }

    fn allocate_command_buffer(
        &mut self,
        pool: vk::CommandPool,
    ) -> RenderResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device()?.allocate_command_buffers(&info) }
            .vk_call("vkAllocateCommandBuffers")?;
        buffers
            .first()
            .copied()
            .ok_or(RenderError::Vulkan {
                call: "vkAllocateCommandBuffers",
                result: vk::Result::ERROR_UNKNOWN,
            })
    }

    fn free_command_buffer(&mut self, pool: vk::CommandPool, cmd: vk::CommandBuffer) {
        self.with_device("vkFreeCommandBuffers", |d| unsafe {
            d.free_command_buffers(pool, &[cmd])
        });
    }

    fn begin_command_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        one_time: bool,
    ) -> RenderResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device()?.begin_command_buffer(cmd, &info) }
            .vk_call("vkBeginCommandBuffer")
    }

    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.device()?.end_command_buffer(cmd) }.vk_call("vkEndCommandBuffer")
    }

    fn cmd_copy_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.with_device("vkCmdCopyBuffer", |d| unsafe {
            d.cmd_copy_buffer(cmd, src, dst, &[region])
        });
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        self.with_device("vkCmdCopyBufferToImage", |d| unsafe {
            d.cmd_copy_buffer_to_image(
                cmd,
                src,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        });
    }

    fn cmd_image_barrier(&mut self, cmd: vk::CommandBuffer, transition: &LayoutTransition) {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(transition.old_layout)
            .new_layout(transition.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(transition.image)
            .subresource_range(single_level(transition.aspect))
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access);
        self.with_device("vkCmdPipelineBarrier", |d| unsafe {
            d.cmd_pipeline_barrier(
                cmd,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            )
        });
    }

    fn cmd_buffer_barrier(&mut self, cmd: vk::CommandBuffer, barrier: &BufferBarrier) {
        let vk_barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(barrier.src_access)
            .dst_access_mask(barrier.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(barrier.buffer)
            .offset(0)
            .size(barrier.size);
        self.with_device("vkCmdPipelineBarrier", |d| unsafe {
            d.cmd_pipeline_barrier(
                cmd,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[vk_barrier],
                &[],
            )
        });
    }

    fn cmd_begin_render_pass(&mut self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: begin.extent,
            })
            .clear_values(&clears);
        self.with_device("vkCmdBeginRenderPass", |d| unsafe {
            d.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        });
    }

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        self.with_device("vkCmdEndRenderPass", |d| unsafe {
            d.cmd_end_render_pass(cmd)
        });
    }

    fn cmd_bind_pipeline(&mut self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.with_device("vkCmdBindPipeline", |d| unsafe {
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        });
    }

    fn cmd_bind_descriptor_set(
        &mut self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.with_device("vkCmdBindDescriptorSets", |d| unsafe {
            d.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, layout, 0, &[set], &[])
        });
    }

    fn cmd_bind_vertex_buffer(&mut self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.with_device("vkCmdBindVertexBuffers", |d| unsafe {
            d.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0])
        });
    }

    fn cmd_bind_index_buffer(&mut self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.with_device("vkCmdBindIndexBuffer", |d| unsafe {
            d.cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32)
        });
    }

    fn cmd_draw_indexed(&mut self, cmd: vk::CommandBuffer, index_count: u32) {
        self.with_device("vkCmdDrawIndexed", |d| unsafe {
            d.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0)
        });
    }

    fn queue_submit(&mut self, queue: vk::Queue, submit: &SubmitConfig) -> RenderResult<()> {
        let (waits, stages): (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) =
            submit.wait_semaphores.iter().copied().unzip();
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&submit.command_buffers)
            .signal_semaphores(&submit.signal_semaphores);
        unsafe { self.device()?.queue_submit(queue, &[info], submit.fence) }
            .vk_call("vkQueueSubmit")
    }

    fn create_render_pass(&mut self, config: &RenderPassConfig) -> RenderResult<vk::RenderPass> {
        let attachments = [
            vk::AttachmentDescription {
                format: config.color_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: config.depth_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];
        // The acquire semaphore is waited at color output; hold attachment writes until then.
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            dst_stage_mask: stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];
        let ci = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.device()?.create_render_pass(&ci, None) }.vk_call("vkCreateRenderPass")
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.with_device("vkDestroyRenderPass", |d| unsafe {
            d.destroy_render_pass(render_pass, None)
        });
    }

    fn create_framebuffer(
        &mut self,
        config: &FramebufferConfig,
    ) -> RenderResult<vk::Framebuffer> {
        let ci = vk::FramebufferCreateInfo::default()
            .render_pass(config.render_pass)
            .attachments(&config.attachments)
            .width(config.extent.width)
            .height(config.extent.height)
            .layers(1);
        unsafe { self.device()?.create_framebuffer(&ci, None) }.vk_call("vkCreateFramebuffer")
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.with_device("vkDestroyFramebuffer", |d| unsafe {
            d.destroy_framebuffer(framebuffer, None)
        });
    }

    fn create_descriptor_pool(
        &mut self,
        config: &DescriptorPoolConfig,
    ) -> RenderResult<vk::DescriptorPool> {
        let ci = vk::DescriptorPoolCreateInfo::default()
            .max_sets(config.max_sets)
            .pool_sizes(&config.pool_sizes);
        unsafe { self.device()?.create_descriptor_pool(&ci, None) }
            .vk_call("vkCreateDescriptorPool")
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        self.with_device("vkDestroyDescriptorPool", |d| unsafe {
            d.destroy_descriptor_pool(pool, None)
        });
    }

    fn create_descriptor_set_layout(
        &mut self,
        config: &DescriptorSetLayoutConfig,
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = config
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty)
                    .descriptor_count(1)
                    .stage_flags(b.stages)
            })
            .collect();
        let ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        unsafe { self.device()?.create_descriptor_set_layout(&ci, None) }
            .vk_call("vkCreateDescriptorSetLayout")
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        self.with_device("vkDestroyDescriptorSetLayout", |d| unsafe {
            d.destroy_descriptor_set_layout(layout, None)
        });
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> RenderResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device()?.allocate_descriptor_sets(&info) }
            .vk_call("vkAllocateDescriptorSets")?;
        sets.first().copied().ok_or(RenderError::Vulkan {
            call: "vkAllocateDescriptorSets",
            result: vk::Result::ERROR_UNKNOWN,
        })
    }

    fn update_descriptor_set(&mut self, write: &DescriptorWrite) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: write.uniform_buffer,
            offset: 0,
            range: write.uniform_range,
        }];
        let image_info = [vk::DescriptorImageInfo {
            sampler: write.sampler,
            image_view: write.image_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(write.set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info),
            vk::WriteDescriptorSet::default()
                .dst_set(write.set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info),
        ];
        self.with_device("vkUpdateDescriptorSets", |d| unsafe {
            d.update_descriptor_sets(&writes, &[])
        });
    }

    fn create_shader_module(&mut self, code: &[u32]) -> RenderResult<vk::ShaderModule> {
        let ci = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { self.device()?.create_shader_module(&ci, None) }
            .vk_call("vkCreateShaderModule")
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.with_device("vkDestroyShaderModule", |d| unsafe {
            d.destroy_shader_module(module, None)
        });
    }

    fn create_pipeline_layout(
        &mut self,
        config: &PipelineLayoutConfig,
    ) -> RenderResult<vk::PipelineLayout> {
        let ci = vk::PipelineLayoutCreateInfo::default().set_layouts(&config.set_layouts);
        unsafe { self.device()?.create_pipeline_layout(&ci, None) }
            .vk_call("vkCreatePipelineLayout")
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.with_device("vkDestroyPipelineLayout", |d| unsafe {
            d.destroy_pipeline_layout(layout, None)
        });
    }

    fn create_graphics_pipeline(
        &mut self,
        config: &GraphicsPipelineConfig,
    ) -> RenderResult<vk::Pipeline> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(config.vertex_module)
                .name(SHADER_ENTRY),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(config.fragment_module)
                .name(SHADER_ENTRY),
        ];
        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: config.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&config.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Fixed viewport and scissor: the window is not resizable.
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: config.extent.width as f32,
            height: config.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: config.extent,
        }];
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let raster = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(config.depth_compare);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth)
            .color_blend_state(&blend)
            .layout(config.layout)
            .render_pass(config.render_pass)
            .subpass(0);

        let pipelines = unsafe {
            self.device()?
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, result)| result)
        .vk_call("vkCreateGraphicsPipelines")?;
        pipelines.first().copied().ok_or(RenderError::Vulkan {
            call: "vkCreateGraphicsPipelines",
            result: vk::Result::ERROR_UNKNOWN,
        })
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.with_device("vkDestroyPipeline", |d| unsafe {
            d.destroy_pipeline(pipeline, None)
        });
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        unsafe {
            self.device()?
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
        .vk_call("vkCreateSemaphore")
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.with_device("vkDestroySemaphore", |d| unsafe {
            d.destroy_semaphore(semaphore, None)
        });
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let ci = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device()?.create_fence(&ci, None) }.vk_call("vkCreateFence")
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.with_device("vkDestroyFence", |d| unsafe { d.destroy_fence(fence, None) });
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device()?.wait_for_fences(&[fence], true, u64::MAX) }
            .vk_call("vkWaitForFences")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device()?.reset_fences(&[fence]) }.vk_call("vkResetFences")
    }
}

impl Drop for AshBackend {
    fn drop(&mut self) {
        // Objects are owned by the caller's teardown; anything still here was leaked.
        if self.device.is_some() || self.instance.is_some() {
            warn!(
                device = self.device.is_some(),
                instance = self.instance.is_some(),
                "Vulkan backend dropped with live device or instance"
            );
        }
    }
}
