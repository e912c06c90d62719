// SPDX-License-Identifier: CEPL-1.0
//! Instance, diagnostics, surface, adapter and logical device.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::backend::GpuBackend;
use crate::config::{DeviceConfig, InstanceConfig};
use crate::error::{RenderError, RenderResult};
use crate::select::QueueFamilyIndices;
use crate::teardown::{Owned, Teardown};

pub const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

#[derive(Clone, Copy, Debug)]
pub struct AdapterSelection {
    pub physical_device: vk::PhysicalDevice,
    pub families: QueueFamilyIndices,
}

#[derive(Clone, Copy, Debug)]
pub struct DeviceContext {
    pub instance: vk::Instance,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    pub fn new<B: GpuBackend>(
        gpu: &mut B,
        teardown: &mut Teardown,
        config: &InstanceConfig,
    ) -> RenderResult<Self> {
        let instance = gpu.create_instance(config)?;
        teardown.push(Owned::Instance(instance));

        let debug_messenger = install_diagnostics(gpu, teardown, config.validation);

        let surface = gpu.create_surface()?;
        teardown.push(Owned::Surface(surface));

        let selection = select_physical_device(&*gpu, surface, &DEVICE_EXTENSIONS)?;
        let families = selection.families;

        let device_config = DeviceConfig::new(
            families,
            &DEVICE_EXTENSIONS,
            vk::PhysicalDeviceFeatures::default(),
        );
        let device = gpu.create_device(selection.physical_device, &device_config)?;
        teardown.push(Owned::Device(device));

        let graphics_queue = gpu.device_queue(families.graphics)?;
        let present_queue = gpu.device_queue(families.present)?;
        let memory_properties = gpu.memory_properties(selection.physical_device)?;

        info!(
            "{}: device ready, graphics family {}, present family {}",
            gpu.name(),
            families.graphics,
            families.present
        );

        Ok(Self {
            instance,
            debug_messenger,
            surface,
            physical_device: selection.physical_device,
            device,
            families,
            graphics_queue,
            present_queue,
            memory_properties,
        })
    }
}

/// Fails closed: any problem leaves diagnostics off and is only logged.
fn install_diagnostics<B: GpuBackend>(
    gpu: &mut B,
    teardown: &mut Teardown,
    validation: bool,
) -> Option<vk::DebugUtilsMessengerEXT> {
    if !validation {
        return None;
    }
    if !gpu.debug_messenger_supported() {
        warn!("debug utils unavailable; validation diagnostics disabled");
        return None;
    }
    match gpu.create_debug_messenger() {
        Ok(messenger) => {
            teardown.push(Owned::DebugMessenger(messenger));
            debug!("debug messenger installed");
            Some(messenger)
        }
        Err(e) => {
            warn!("debug messenger creation failed ({e}); diagnostics disabled");
            None
        }
    }
}

/// First device in enumeration order that passes every check. No scoring.
pub fn select_physical_device<B: GpuBackend>(
    gpu: &B,
    surface: vk::SurfaceKHR,
    required_extensions: &[&CStr],
) -> RenderResult<AdapterSelection> {
    for phys in gpu.enumerate_physical_devices()? {
        match check_adapter(gpu, phys, surface, required_extensions)? {
            Ok(families) => {
                info!("selected physical device {:?}", phys);
                return Ok(AdapterSelection {
                    physical_device: phys,
                    families,
                });
            }
            Err(reason) => debug!("skipping physical device {:?}: {reason}", phys),
        }
    }
    Err(RenderError::NoSuitableDevice)
}

/// Outer error: a query failed. Inner error: the adapter is unsuitable, and why.
fn check_adapter<B: GpuBackend>(
    gpu: &B,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    required_extensions: &[&CStr],
) -> RenderResult<Result<QueueFamilyIndices, String>> {
    let available = gpu.device_extensions(phys)?;
    if let Some(missing) = required_extensions
        .iter()
        .find(|req| !available.iter().any(|have| have.as_c_str() == **req))
    {
        return Ok(Err(format!("missing extension {}", missing.to_string_lossy())));
    }
    if gpu.surface_formats(phys, surface)?.is_empty() {
        return Ok(Err("no surface formats".into()));
    }
    if gpu.surface_present_modes(phys, surface)?.is_empty() {
        return Ok(Err("no present modes".into()));
    }

    let mut graphics = None;
    let mut present = None;
    let mut combined = false;
    for (index, family) in gpu.queue_families(phys)?.iter().enumerate() {
        let index = index as u32;
        let has_graphics =
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = gpu.surface_support(phys, index, surface)?;
        if has_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if has_present && present.is_none() {
            present = Some(index);
        }
        combined |= has_graphics && has_present;
    }
    match (graphics, present) {
        (Some(graphics), Some(present)) if combined => {
            Ok(Ok(QueueFamilyIndices { graphics, present }))
        }
        _ => Ok(Err("no queue family with graphics and present support".into())),
    }
}
