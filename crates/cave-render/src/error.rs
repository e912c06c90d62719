// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    /// No Vulkan loader or driver could be opened.
    #[error("graphics backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("required instance layer {0} is not installed")]
    LayerMissing(String),

    #[error("no physical device satisfies the renderer's requirements")]
    NoSuitableDevice,

    #[error("no memory type in mask {type_bits:#b} with properties {required:?}")]
    NoMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("no depth format usable as an optimal-tiling attachment")]
    NoDepthFormat,

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("shader {}: {}", .path.display(), .reason)]
    Shader { path: PathBuf, reason: String },

    #[error("asset {}: {}", .path.display(), .reason)]
    Asset { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Tags a raw `vk::Result` with the entry point that produced it.
pub trait VkResultExt<T> {
    fn vk_call(self, call: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk_call(self, call: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Vulkan { call, result })
    }
}
