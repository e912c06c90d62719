// SPDX-License-Identifier: CEPL-1.0
//! Disk-backed [`AssetSource`]: PNG textures through `image`, OBJ models through `tobj`.

use std::collections::HashMap;
use std::path::Path;

use cave_render::{AssetSource, MeshData, RenderError, RenderResult, TextureData, Vertex};
use tracing::debug;

/// Loads assets straight from the filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileAssets;

fn asset_error(path: &Path, reason: impl ToString) -> RenderError {
    RenderError::Asset {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl AssetSource for FileAssets {
    /// Decodes any supported image and forces four 8-bit channels.
    fn load_texture(&self, path: &Path) -> RenderResult<TextureData> {
        let img = image::open(path).map_err(|e| asset_error(path, e))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!(path = %path.display(), width, height, "texture decoded");
        TextureData::new(rgba.into_raw(), width, height)
    }

    /// Every model in the file is merged into one indexed mesh.
    fn load_model(&self, path: &Path) -> RenderResult<MeshData> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, _materials) =
            tobj::load_obj(path, &options).map_err(|e| asset_error(path, e))?;

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut unique: HashMap<[u32; 5], u32> = HashMap::new();

        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                let pos = mesh
                    .positions
                    .get(3 * i..3 * i + 3)
                    .ok_or_else(|| asset_error(path, format!("position index {i} out of range")))?;
                // Missing texture coordinates sample the texture origin.
                let uv = match mesh.texcoords.get(2 * i..2 * i + 2) {
                    Some(t) => [t[0], 1.0 - t[1]],
                    None => [0.0, 0.0],
                };
                let vertex = Vertex {
                    pos: [pos[0], pos[1], pos[2]],
                    uv,
                };

                let key = [
                    vertex.pos[0].to_bits(),
                    vertex.pos[1].to_bits(),
                    vertex.pos[2].to_bits(),
                    vertex.uv[0].to_bits(),
                    vertex.uv[1].to_bits(),
                ];
                let next = vertices.len() as u32;
                let slot = *unique.entry(key).or_insert_with(|| {
                    vertices.push(vertex);
                    next
                });
                indices.push(slot);
            }
        }

        let data = MeshData { vertices, indices };
        data.validate().map_err(|e| asset_error(path, e))?;
        debug!(
            path = %path.display(),
            vertices = data.vertices.len(),
            indices = data.indices.len(),
            "model loaded"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const QUAD: &str = "\
v -1.0 -1.0 0.0
v 1.0 -1.0 0.0
v 1.0 1.0 0.0
v -1.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn quad_is_triangulated_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(&path, QUAD).unwrap();

        let mesh = FileAssets.load_model(&path).unwrap();
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn texture_v_is_flipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(&path, QUAD).unwrap();

        let mesh = FileAssets.load_model(&path).unwrap();
        let first = mesh
            .vertices
            .iter()
            .find(|v| v.pos == [-1.0, -1.0, 0.0])
            .unwrap();
        assert_eq!(first.uv, [0.0, 1.0]);
    }

    #[test]
    fn missing_model_is_an_asset_error() {
        let err = FileAssets
            .load_model(Path::new("does/not/exist.obj"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }), "{err:?}");
    }

    #[test]
    fn png_decodes_to_rgba8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let img = image::RgbImage::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        img.save(&path).unwrap();

        let tex = FileAssets.load_texture(&path).unwrap();
        assert_eq!((tex.width, tex.height), (2, 2));
        assert_eq!(tex.pixels.len(), 16);
        assert_eq!(&tex.pixels[..4], &[255, 255, 255, 255]);
        assert_eq!(&tex.pixels[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn garbage_texture_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not a png").unwrap();

        let err = FileAssets.load_texture(&path).unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }), "{err:?}");
    }
}
