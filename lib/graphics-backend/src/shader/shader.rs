//! A single compiled shader stage.

use std::path::PathBuf;

use super::compiler::{ShaderLanguage, ShaderStage};
use super::reflection::ShaderReflection;

/// Owned by `ShaderLibrary` behind an `Arc`; pipelines only ever hold a
/// `Weak` so a hot-reload can replace the SPIR-V without invalidating
/// whichever pipeline last built against it (hot reload).
pub struct Shader {
    pub name: String,
    pub source_path: PathBuf,
    pub entry_point: String,
    pub stage: ShaderStage,
    pub language: ShaderLanguage,
    spirv: parking_lot::RwLock<Vec<u32>>,
    source_hash: std::sync::atomic::AtomicU64,
    reflection: parking_lot::RwLock<Option<ShaderReflection>>,
    version: std::sync::atomic::AtomicU32,
}

impl Shader {
    pub fn new(
        name: String,
        source_path: PathBuf,
        entry_point: String,
        stage: ShaderStage,
        language: ShaderLanguage,
        spirv: Vec<u32>,
        source_hash: u64,
        reflection: Option<ShaderReflection>,
    ) -> Self {
        Self {
            name,
            source_path,
            entry_point,
            stage,
            language,
            spirv: parking_lot::RwLock::new(spirv),
            source_hash: std::sync::atomic::AtomicU64::new(source_hash),
            reflection: parking_lot::RwLock::new(reflection),
            version: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn spirv(&self) -> Vec<u32> {
        self.spirv.read().clone()
    }

    pub fn source_hash(&self) -> u64 {
        self.source_hash.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn version(&self) -> u32 {
        self.version.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn with_reflection<R>(&self, f: impl FnOnce(Option<&ShaderReflection>) -> R) -> R {
        f(self.reflection.read().as_ref())
    }

    /// Swaps in a freshly recompiled stage, bumping the version counter so
    /// callers polling `version()` can detect the change.
    pub(super) fn replace(&self, spirv: Vec<u32>, source_hash: u64, reflection: Option<ShaderReflection>) {
        *self.spirv.write() = spirv;
        *self.reflection.write() = reflection;
        self.source_hash.store(source_hash, std::sync::atomic::Ordering::Release);
        self.version.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }
}
