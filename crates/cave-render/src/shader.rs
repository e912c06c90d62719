// SPDX-License-Identifier: CEPL-1.0
use std::fs::File;
use std::path::Path;

use ash::util::read_spv;

use crate::error::{RenderError, RenderResult};

/// Reads a precompiled SPIR-V binary as 32-bit words.
///
/// `read_spv` checks the length is a whole number of words and fixes up endianness.
pub fn load_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let shader_err = |reason: String| RenderError::Shader {
        path: path.to_path_buf(),
        reason,
    };
    let mut file = File::open(path).map_err(|e| shader_err(e.to_string()))?;
    let words = read_spv(&mut file).map_err(|e| shader_err(e.to_string()))?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(shader_err("missing SPIR-V magic number".into()));
    }
    Ok(words)
}

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spirv_file(words: &[u32]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for w in words {
            file.write_all(&w.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_word_aligned_binary() {
        let file = spirv_file(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = load_spirv(file.path()).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_truncated_binary() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x03, 0x02, 0x23]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            load_spirv(file.path()),
            Err(RenderError::Shader { .. })
        ));
    }

    #[test]
    fn rejects_foreign_bytes() {
        let file = spirv_file(&[0xdead_beef, 0]);
        assert!(load_spirv(file.path()).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_spirv(Path::new("does/not/exist.spv")).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.spv"));
    }
}
