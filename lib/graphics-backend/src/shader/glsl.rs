//! GLSL compiler: attempts to locate a pre-compiled SPIR-V binary at
//! `build/shaders/<filename>.spv`; if absent, reports a
//! runtime-compilation-unavailable error. Runtime glslc invocation is
//! optional future work.

use std::path::PathBuf;

use super::compiler::{compute_source_hash, CompileOutput, CreateInfo, ShaderCompiler};

pub struct GlslCompiler {
    pub shader_build_dir: PathBuf,
}

impl GlslCompiler {
    pub fn new(shader_build_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_build_dir: shader_build_dir.into(),
        }
    }

    fn spirv_path(&self, info: &CreateInfo) -> PathBuf {
        let filename = info
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&info.name));
        self.shader_build_dir
            .join(filename)
            .with_extension(format!(
                "{}.spv",
                info.path.extension().and_then(|e| e.to_str()).unwrap_or("glsl")
            ))
    }
}

impl ShaderCompiler for GlslCompiler {
    fn compile(&self, info: &CreateInfo) -> Result<CompileOutput, String> {
        let spv_path = self.spirv_path(info);
        let bytes = std::fs::read(&spv_path).map_err(|err| {
            format!(
                "runtime GLSL compilation is unavailable; no pre-compiled SPIR-V at {}: {err}",
                spv_path.display()
            )
        })?;
        if bytes.len() % 4 != 0 {
            return Err(format!("{} is not a valid SPIR-V binary (length not a multiple of 4)", spv_path.display()));
        }
        let spirv = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(CompileOutput {
            spirv,
            source_hash: compute_source_hash(&info.path),
            reflection: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::compiler::{ShaderLanguage, ShaderStage};

    #[test]
    fn missing_spirv_reports_unavailable_error() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = GlslCompiler::new(dir.path());
        let info = CreateInfo {
            name: "triangle".into(),
            path: PathBuf::from("shaders/triangle.vert"),
            entry_point: "main".into(),
            stage: ShaderStage::Vertex,
            language: ShaderLanguage::Glsl,
            include_paths: vec![],
            defines: vec![],
        };
        let err = compiler.compile(&info).unwrap_err();
        assert!(err.contains("runtime GLSL compilation is unavailable"));
    }

    #[test]
    fn precompiled_spirv_is_loaded_as_u32_words() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("triangle.vert.spv"), [0u8, 0, 0, 0, 1, 0, 0, 0]).unwrap();
        let compiler = GlslCompiler::new(dir.path());
        let info = CreateInfo {
            name: "triangle".into(),
            path: PathBuf::from("shaders/triangle.vert"),
            entry_point: "main".into(),
            stage: ShaderStage::Vertex,
            language: ShaderLanguage::Glsl,
            include_paths: vec![],
            defines: vec![],
        };
        let output = compiler.compile(&info).unwrap();
        assert_eq!(output.spirv, vec![0, 1]);
    }
}
