// SPDX-License-Identifier: CEPL-1.0
//! Shared fixtures for the mock-backed integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use cave_render::mock::{Call, MockBackend, MockRecorder, ObjectKind};
use cave_render::{
    AssetPaths, AssetSource, MeshData, PresentPreference, RenderError, RenderResult, RenderSize,
    Renderer, RendererConfig, TextureData, Vertex, SPIRV_MAGIC,
};
use tempfile::TempDir;

/// A triangle and a 2x2 checker; paths are ignored.
#[derive(Clone, Debug)]
pub struct SyntheticAssets {
    pub mesh: MeshData,
    pub texture: TextureData,
}

impl Default for SyntheticAssets {
    fn default() -> Self {
        let mesh = MeshData {
            vertices: vec![
                Vertex {
                    pos: [-0.5, -0.5, 0.0],
                    uv: [0.0, 1.0],
                },
                Vertex {
                    pos: [0.5, -0.5, 0.0],
                    uv: [1.0, 1.0],
                },
                Vertex {
                    pos: [0.0, 0.5, 0.0],
                    uv: [0.5, 0.0],
                },
            ],
            indices: vec![0, 1, 2],
        };
        #[rustfmt::skip]
        let pixels = vec![
            255, 0, 0, 255,    0, 255, 0, 255,
            0, 0, 255, 255,    255, 255, 255, 255,
        ];
        Self {
            mesh,
            texture: TextureData {
                pixels,
                width: 2,
                height: 2,
            },
        }
    }
}

impl AssetSource for SyntheticAssets {
    fn load_texture(&self, _path: &Path) -> RenderResult<TextureData> {
        Ok(self.texture.clone())
    }

    fn load_model(&self, _path: &Path) -> RenderResult<MeshData> {
        Ok(self.mesh.clone())
    }
}

/// Shader binaries on disk for the lifetime of the value.
pub struct Shaders {
    _dir: TempDir,
    pub paths: AssetPaths,
}

pub fn shaders() -> Shaders {
    let dir = tempfile::tempdir().unwrap();
    // Header only: magic, version 1.0, generator, bound, schema.
    let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let vertex = dir.path().join("vert.spv");
    let fragment = dir.path().join("frag.spv");
    fs::write(&vertex, &bytes).unwrap();
    fs::write(&fragment, &bytes).unwrap();
    Shaders {
        paths: AssetPaths {
            vertex_shader: vertex,
            fragment_shader: fragment,
            texture: dir.path().join("texture.png"),
            model: dir.path().join("model.obj"),
        },
        _dir: dir,
    }
}

pub fn config() -> RendererConfig {
    RendererConfig {
        app_name: "cave tests".into(),
        size: RenderSize {
            width: 640,
            height: 480,
        },
        validation: true,
        present_mode: PresentPreference::Mailbox,
        frames_in_flight: 2,
        clear_color: [0.0, 0.0, 0.0, 1.0],
    }
}

pub fn build(gpu: MockBackend) -> (RenderResult<Renderer<MockBackend>>, MockRecorder) {
    build_with(gpu, &config())
}

pub fn build_with(
    gpu: MockBackend,
    config: &RendererConfig,
) -> (RenderResult<Renderer<MockBackend>>, MockRecorder) {
    let rec = gpu.recorder();
    let shaders = shaders();
    let renderer = Renderer::new(gpu, config, &shaders.paths, &SyntheticAssets::default());
    (renderer, rec)
}

/// Submissions that waited on a semaphore, i.e. frame submits rather than transfers.
pub fn frame_submits(calls: &[Call]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, Call::Submit { wait_semaphores, .. } if !wait_semaphores.is_empty()))
        .count()
}

pub fn presents(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Present { image_index } => Some(*image_index),
            _ => None,
        })
        .collect()
}

pub fn destroyed_kinds(calls: &[Call]) -> Vec<ObjectKind> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Destroy { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

pub fn assert_vulkan_failure(err: &RenderError, expected: &str) {
    match err {
        RenderError::Vulkan { call, .. } => assert_eq!(*call, expected),
        other => panic!("expected a failure in {expected}, got {other:?}"),
    }
}

/// `Result::unwrap_err` needs `T: Debug`, which the renderer does not implement.
pub fn expect_err<T>(result: RenderResult<T>) -> RenderError {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}
