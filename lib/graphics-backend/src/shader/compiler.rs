//! Compiler-agnostic shader compilation interface: a single trait GLSL and
//! Slang backends implement behind.

use std::path::{Path, PathBuf};

use ash::vk;

use super::reflection::ShaderReflection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderLanguage {
    Glsl,
    Slang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Geometry,
    TessCtrl,
    TessEval,
}

impl ShaderStage {
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::TessCtrl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEval => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateInfo {
    pub name: String,
    pub path: PathBuf,
    pub entry_point: String,
    pub stage: ShaderStage,
    pub language: ShaderLanguage,
    pub include_paths: Vec<PathBuf>,
    pub defines: Vec<(String, String)>,
}

pub struct CompileOutput {
    pub spirv: Vec<u32>,
    pub source_hash: u64,
    pub reflection: Option<ShaderReflection>,
}

pub trait ShaderCompiler {
    fn compile(&self, info: &CreateInfo) -> Result<CompileOutput, String>;
    fn has_source_changed(&self, path: &Path, last_hash: u64) -> bool {
        compute_source_hash(path) != last_hash
    }
}

/// Cheap: `(st_size ^ st_mtime)`.
pub fn compute_source_hash(path: &Path) -> u64 {
    let Ok(meta) = std::fs::metadata(path) else {
        return 0;
    };
    let size = meta.len();
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    size ^ mtime
}
