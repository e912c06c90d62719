// SPDX-License-Identifier: CEPL-1.0
//! CPU-side payloads and the GPU objects built from them.

use std::path::{Path, PathBuf};

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::error::{RenderError, RenderResult};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    pub fn attributes() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 12,
            },
        ]
    }
}

/// Camera block bound at descriptor binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUbo {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl CameraUbo {
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<CameraUbo>() as vk::DeviceSize;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn validate(&self) -> RenderResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(RenderError::InvalidConfig("mesh has no geometry".into()));
        }
        let count = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= count) {
            return Err(RenderError::InvalidConfig(format!(
                "index {bad} out of range for {count} vertices"
            )));
        }
        Ok(())
    }
}

/// Tightly packed RGBA8 pixels, row major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> RenderResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(RenderError::InvalidConfig(format!(
                "texture {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }
}

/// Where the renderer looks for its fixed assets, relative to the working directory.
#[derive(Clone, Debug)]
pub struct AssetPaths {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
    pub model: PathBuf,
}

impl AssetPaths {
    /// The fixed layout below an `assets` directory.
    pub fn under(root: &Path) -> Self {
        Self {
            vertex_shader: root.join("shaders/vert.spv"),
            fragment_shader: root.join("shaders/frag.spv"),
            texture: root.join("textures/robot-texture.png"),
            model: root.join("models/robot.obj"),
        }
    }
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self::under(Path::new("assets"))
    }
}

/// Decoders for the mesh and its texture. Implemented by `cave-assets`.
pub trait AssetSource {
    fn load_texture(&self, path: &Path) -> RenderResult<TextureData>;
    fn load_model(&self, path: &Path) -> RenderResult<MeshData>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub sampler: Option<vk::Sampler>,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
}

/// Device uniform buffer plus the host-visible twin rewritten every frame.
#[derive(Clone, Copy, Debug)]
pub struct UniformBuffers {
    pub device: GpuBuffer,
    pub staging: GpuBuffer,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineBundle {
    pub set_layout: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

#[derive(Clone, Copy, Debug)]
pub struct Mesh {
    pub vertex_buffer: GpuBuffer,
    pub vertex_count: u32,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
    pub texture: GpuImage,
    pub descriptor_set: vk::DescriptorSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_five_floats() {
        assert_eq!(Vertex::STRIDE, 20);
        let [pos, uv] = Vertex::attributes();
        assert_eq!(pos.offset, 0);
        assert_eq!(uv.offset, 12);
        assert_eq!(uv.format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn camera_block_is_two_matrices() {
        assert_eq!(CameraUbo::SIZE, 128);
    }

    #[test]
    fn texture_size_must_match_pixels() {
        assert!(TextureData::new(vec![0; 16], 2, 2).is_ok());
        assert!(TextureData::new(vec![0; 15], 2, 2).is_err());
        assert!(TextureData::new(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn mesh_indices_stay_in_range() {
        let mut mesh = MeshData {
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
        };
        assert!(mesh.validate().is_ok());
        mesh.indices.push(3);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn default_paths_sit_under_assets() {
        let paths = AssetPaths::default();
        assert_eq!(paths.vertex_shader, Path::new("assets/shaders/vert.spv"));
        assert_eq!(paths.fragment_shader, Path::new("assets/shaders/frag.spv"));
        let moved = AssetPaths::under(Path::new("/opt/cave"));
        assert_eq!(moved.model, Path::new("/opt/cave/models/robot.obj"));
    }
}
