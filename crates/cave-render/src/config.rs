// SPDX-License-Identifier: CEPL-1.0
//! Immutable descriptions of every object the renderer asks a backend to create.
//!
//! Each config has one constructor that validates its inputs. Backends turn them into
//! `vk::*CreateInfo` structures at the last moment, so the components never touch raw
//! create-info pointers.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::error::{RenderError, RenderResult};
use crate::select::{choose_image_count, QueueFamilyIndices};
use crate::RenderSize;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct InstanceConfig {
    pub app_name: CString,
    pub validation: bool,
}

impl InstanceConfig {
    pub fn new(app_name: &str, validation: bool) -> RenderResult<Self> {
        let app_name = CString::new(app_name)
            .map_err(|_| RenderError::InvalidConfig("application name contains NUL".into()))?;
        Ok(Self {
            app_name,
            validation,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// One queue is requested per entry; entries are distinct.
    pub queue_families: Vec<u32>,
    pub extensions: Vec<CString>,
    pub features: vk::PhysicalDeviceFeatures,
}

impl DeviceConfig {
    pub fn new(
        families: QueueFamilyIndices,
        extensions: &[&CStr],
        features: vk::PhysicalDeviceFeatures,
    ) -> Self {
        Self {
            queue_families: families.distinct(),
            extensions: extensions.iter().map(|e| (*e).to_owned()).collect(),
            features,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sharing {
    Exclusive,
    Concurrent(Vec<u32>),
}

#[derive(Clone, Debug)]
pub struct SwapchainConfig {
    pub surface: vk::SurfaceKHR,
    pub image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: Sharing,
    pub old_swapchain: vk::SwapchainKHR,
}

impl SwapchainConfig {
    pub fn new(
        surface: vk::SurfaceKHR,
        caps: &vk::SurfaceCapabilitiesKHR,
        format: vk::SurfaceFormatKHR,
        extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
        families: QueueFamilyIndices,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> RenderResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "swapchain extent {}x{} is empty",
                extent.width, extent.height
            )));
        }
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };
        let sharing = if families.is_shared() {
            Sharing::Exclusive
        } else {
            Sharing::Concurrent(families.distinct())
        };
        Ok(Self {
            surface,
            image_count: choose_image_count(caps),
            format,
            extent,
            present_mode,
            pre_transform,
            sharing,
            old_swapchain: old_swapchain.unwrap_or_default(),
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferConfig {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl BufferConfig {
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> RenderResult<Self> {
        if size == 0 {
            return Err(RenderError::InvalidConfig("buffer size must be non-zero".into()));
        }
        Ok(Self { size, usage })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub initial_layout: vk::ImageLayout,
}

impl ImageConfig {
    pub fn new(
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        initial_layout: vk::ImageLayout,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "image extent {width}x{height} is empty"
            )));
        }
        if initial_layout != vk::ImageLayout::UNDEFINED
            && initial_layout != vk::ImageLayout::PREINITIALIZED
        {
            return Err(RenderError::InvalidConfig(format!(
                "image cannot start in {initial_layout:?}"
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            initial_layout,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageViewConfig {
    pub image: vk::Image,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageViewConfig {
    /// 2D view, identity swizzle, one mip level, one layer.
    pub fn new(image: vk::Image, format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            image,
            format,
            aspect,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerConfig {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
}

impl SamplerConfig {
    pub fn linear_repeat() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassConfig {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

impl RenderPassConfig {
    /// Color cleared and stored then handed to presentation; depth cleared and discarded.
    pub fn new(color_format: vk::Format, depth_format: vk::Format) -> Self {
        Self {
            color_format,
            depth_format,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FramebufferConfig {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
}

impl FramebufferConfig {
    pub fn new(
        render_pass: vk::RenderPass,
        color_view: vk::ImageView,
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            render_pass,
            attachments: vec![color_view, depth_view],
            extent,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DescriptorPoolConfig {
    pub max_sets: u32,
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
}

impl DescriptorPoolConfig {
    /// Room for exactly one set holding one uniform buffer and one combined sampler.
    pub fn single_mesh() -> Self {
        Self {
            max_sets: 1,
            pool_sizes: vec![
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 1,
                },
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
}

#[derive(Clone, Debug)]
pub struct DescriptorSetLayoutConfig {
    pub bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayoutConfig {
    /// Binding 0: camera uniforms (vertex). Binding 1: mesh texture (fragment).
    pub fn uniform_and_sampler() -> Self {
        Self {
            bindings: vec![
                LayoutBinding {
                    binding: 0,
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    stages: vk::ShaderStageFlags::VERTEX,
                },
                LayoutBinding {
                    binding: 1,
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                },
            ],
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub uniform_buffer: vk::Buffer,
    pub uniform_range: vk::DeviceSize,
    pub image_view: vk::ImageView,
    pub sampler: vk::Sampler,
}

#[derive(Clone, Debug)]
pub struct PipelineLayoutConfig {
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
}

impl PipelineLayoutConfig {
    pub fn new(set_layout: vk::DescriptorSetLayout) -> Self {
        Self {
            set_layouts: vec![set_layout],
        }
    }
}

#[derive(Clone, Debug)]
pub struct GraphicsPipelineConfig {
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub vertex_stride: u32,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_compare: vk::CompareOp,
}

impl GraphicsPipelineConfig {
    /// Opaque triangle list, back-face culled, depth tested with `LESS`.
    pub fn opaque_mesh(
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        vertex_stride: u32,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> RenderResult<Self> {
        if vertex_stride == 0 || attributes.is_empty() {
            return Err(RenderError::InvalidConfig(
                "pipeline needs a vertex stride and at least one attribute".into(),
            ));
        }
        Ok(Self {
            vertex_module,
            fragment_module,
            layout,
            render_pass,
            extent,
            vertex_stride,
            attributes: attributes.to_vec(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_compare: vk::CompareOp::LESS,
        })
    }
}

/// An image layout change with the access masks and stages it implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    pub fn new(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) -> RenderResult<Self> {
        use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};

        let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
                (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
            }
            (L::PREINITIALIZED, L::TRANSFER_DST_OPTIMAL) => {
                (A::HOST_WRITE, A::TRANSFER_WRITE, S::HOST, S::TRANSFER)
            }
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
                A::TRANSFER_WRITE,
                A::SHADER_READ,
                S::TRANSFER,
                S::FRAGMENT_SHADER,
            ),
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
                A::empty(),
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                S::TOP_OF_PIPE,
                S::EARLY_FRAGMENT_TESTS,
            ),
            (old, new) => {
                return Err(RenderError::InvalidConfig(format!(
                    "unsupported layout transition {old:?} -> {new:?}"
                )))
            }
        };
        Ok(Self {
            image,
            old_layout,
            new_layout,
            aspect,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl BufferBarrier {
    /// Orders a transfer write after every earlier shader or vertex-input read.
    pub fn before_transfer_write(buffer: vk::Buffer, size: vk::DeviceSize) -> Self {
        Self {
            buffer,
            size,
            src_access: vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::UNIFORM_READ
                | vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                | vk::AccessFlags::INDEX_READ,
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }
    }

    /// Makes a transfer write visible to later vertex-stage reads.
    pub fn after_transfer_write(buffer: vk::Buffer, size: vk::DeviceSize) -> Self {
        Self {
            buffer,
            size,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::UNIFORM_READ
                | vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                | vk::AccessFlags::INDEX_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::VERTEX_SHADER,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

#[derive(Clone, Debug, Default)]
pub struct SubmitConfig {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait_semaphores: Vec<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

impl SubmitConfig {
    /// No semaphores, no fence; the caller waits for the queue to drain.
    pub fn one_shot(cmd: vk::CommandBuffer) -> Self {
        Self {
            command_buffers: vec![cmd],
            ..Default::default()
        }
    }

    pub fn frame(
        cmd: vk::CommandBuffer,
        image_available: vk::Semaphore,
        render_finished: vk::Semaphore,
        in_flight: vk::Fence,
    ) -> Self {
        Self {
            command_buffers: vec![cmd],
            wait_semaphores: vec![(
                image_available,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )],
            signal_semaphores: vec![render_finished],
            fence: in_flight,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PresentConfig {
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait_semaphore: vk::Semaphore,
}

/// Which present mode the swapchain should ask for first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    /// Low-latency triple buffering when available, FIFO otherwise.
    #[default]
    Mailbox,
    /// Always FIFO (vsync).
    Fifo,
}

/// Knobs the application hands to [`crate::Renderer::new`].
#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub app_name: String,
    pub size: RenderSize,
    pub validation: bool,
    pub present_mode: PresentPreference,
    pub frames_in_flight: u32,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Cave Explorer".into(),
            size: RenderSize {
                width: 640,
                height: 480,
            },
            validation: cfg!(debug_assertions),
            present_mode: PresentPreference::Mailbox,
            frames_in_flight: 2,
            clear_color: [0.02, 0.02, 0.04, 1.0],
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        if self.size.width == 0 || self.size.height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "render size {}x{} is empty",
                self.size.width, self.size.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_rejects_interior_nul() {
        assert!(matches!(
            InstanceConfig::new("cave\0explorer", false),
            Err(RenderError::InvalidConfig(_))
        ));
        let ok = InstanceConfig::new("Cave Explorer", true).unwrap();
        assert_eq!(ok.app_name.to_str().unwrap(), "Cave Explorer");
    }

    #[test]
    fn zero_sized_objects_are_rejected() {
        assert!(BufferConfig::new(0, vk::BufferUsageFlags::VERTEX_BUFFER).is_err());
        assert!(ImageConfig::new(
            0,
            4,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::UNDEFINED
        )
        .is_err());
    }

    #[test]
    fn images_only_start_undefined_or_preinitialized() {
        let err = ImageConfig::new(
            4,
            4,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(err.is_err());
    }

    #[test]
    fn swapchain_sharing_follows_queue_families() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        let format = vk::SurfaceFormatKHR::default();
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let shared = QueueFamilyIndices {
            graphics: 0,
            present: 0,
        };
        let split = QueueFamilyIndices {
            graphics: 0,
            present: 2,
        };

        let cfg = SwapchainConfig::new(
            vk::SurfaceKHR::null(),
            &caps,
            format,
            extent,
            vk::PresentModeKHR::FIFO,
            shared,
            None,
        )
        .unwrap();
        assert_eq!(cfg.sharing, Sharing::Exclusive);
        assert_eq!(cfg.image_count, 3);
        assert_eq!(cfg.old_swapchain, vk::SwapchainKHR::null());

        let cfg = SwapchainConfig::new(
            vk::SurfaceKHR::null(),
            &caps,
            format,
            extent,
            vk::PresentModeKHR::FIFO,
            split,
            None,
        )
        .unwrap();
        assert_eq!(cfg.sharing, Sharing::Concurrent(vec![0, 2]));
    }

    #[test]
    fn pre_transform_falls_back_to_current() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };
        let cfg = SwapchainConfig::new(
            vk::SurfaceKHR::null(),
            &caps,
            vk::SurfaceFormatKHR::default(),
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            vk::PresentModeKHR::FIFO,
            QueueFamilyIndices {
                graphics: 0,
                present: 0,
            },
            None,
        )
        .unwrap();
        assert_eq!(cfg.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn transitions_carry_matching_masks() {
        let t = LayoutTransition::new(
            vk::Image::null(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let unsupported = LayoutTransition::new(
            vk::Image::null(),
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
            vk::ImageAspectFlags::COLOR,
        );
        assert!(matches!(unsupported, Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn renderer_config_rejects_zero_frames_in_flight() {
        let cfg = RendererConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(RendererConfig::default().validate().is_ok());
    }
}
