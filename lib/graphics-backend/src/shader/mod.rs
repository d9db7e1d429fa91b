//! Shader compilation, reflection, and the hot-reload-aware shader library.

mod compiler;
mod glsl;
mod library;
mod reflection;
mod shader;
mod slang;

pub use compiler::{CompileOutput, CreateInfo, ShaderCompiler, ShaderLanguage, ShaderStage, compute_source_hash};
pub use glsl::GlslCompiler;
pub use library::{register_reflected_layouts, ShaderLibrary};
pub use reflection::{
    FieldType, ReflectedBuffer, ReflectedDescriptor, ReflectedField, ReflectedPushConstant, ShaderReflection,
};
pub use shader::Shader;
pub use slang::SlangCompiler;
