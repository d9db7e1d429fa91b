//! Shader compilation cache and hot-reload driver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use ash::vk;

use crate::descriptor::{BindingDesc, DescriptorLayoutDesc, DescriptorManager, PushConstantDesc, UpdateFrequency};

use super::compiler::{CreateInfo, ShaderCompiler, ShaderLanguage};
use super::glsl::GlslCompiler;
use super::reflection::ShaderReflection;
use super::shader::Shader;
use super::slang::SlangCompiler;

/// Holds both compiler backends concretely rather than as trait objects:
/// only `SlangCompiler` exposes module-wide entry-point enumeration, and a
/// `dyn ShaderCompiler` can't be downcast back to it.
pub struct ShaderLibrary {
    glsl: GlslCompiler,
    slang: SlangCompiler,
    shaders: HashMap<String, Arc<Shader>>,
    default_include_paths: Vec<PathBuf>,
    global_defines: Vec<(String, String)>,
}

impl ShaderLibrary {
    pub fn new(
        glsl: GlslCompiler,
        slang: SlangCompiler,
        default_include_paths: Vec<PathBuf>,
        global_defines: Vec<(String, String)>,
    ) -> Self {
        Self {
            glsl,
            slang,
            shaders: HashMap::new(),
            default_include_paths,
            global_defines,
        }
    }

    fn compile(&self, info: &CreateInfo) -> Result<super::compiler::CompileOutput, String> {
        match info.language {
            ShaderLanguage::Glsl => self.glsl.compile(info),
            ShaderLanguage::Slang => self.slang.compile(info),
        }
    }

    fn has_source_changed(&self, language: ShaderLanguage, path: &Path, last_hash: u64) -> bool {
        match language {
            ShaderLanguage::Glsl => self.glsl.has_source_changed(path, last_hash),
            ShaderLanguage::Slang => self.slang.has_source_changed(path, last_hash),
        }
    }

    /// Compiles and caches on name, recompiling only if the entry is
    /// missing. A Slang shader's reflected descriptor layouts and push
    /// constants are registered into `descriptors` as soon as it compiles;
    /// GLSL shaders carry no reflection and register nothing here.
    pub fn load(
        &mut self,
        descriptors: &mut DescriptorManager,
        name: &str,
        mut info: CreateInfo,
    ) -> Result<Weak<Shader>, String> {
        if let Some(existing) = self.shaders.get(name) {
            return Ok(Arc::downgrade(existing));
        }

        info.include_paths.extend(self.default_include_paths.iter().cloned());
        let mut defines = self.global_defines.clone();
        defines.extend(info.defines.iter().cloned());
        info.defines = defines;

        let output = self.compile(&info)?;
        let shader = Arc::new(Shader::new(
            info.name.clone(),
            info.path.clone(),
            info.entry_point.clone(),
            info.stage,
            info.language,
            output.spirv,
            output.source_hash,
            output.reflection,
        ));
        register_reflected_layouts(descriptors, &shader);
        let weak = Arc::downgrade(&shader);
        self.shaders.insert(name.to_string(), shader);
        Ok(weak)
    }

    /// Enumerates every entry point in a Slang module and loads each one,
    /// deriving its stage from reflection and naming it `<basename>_<entry>`.
    pub fn load_slang_shader(
        &mut self,
        descriptors: &mut DescriptorManager,
        path: &Path,
    ) -> Result<Vec<Weak<Shader>>, String> {
        let entry_points = self.slang.get_module_entry_points(&path.to_path_buf())?;
        let basename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let mut shaders = Vec::with_capacity(entry_points.len());
        for (entry_name, stage) in entry_points {
            let shader_name = format!("{basename}_{entry_name}");
            let info = CreateInfo {
                name: shader_name.clone(),
                path: path.to_path_buf(),
                entry_point: entry_name,
                stage,
                language: ShaderLanguage::Slang,
                include_paths: Vec::new(),
                defines: Vec::new(),
            };
            shaders.push(self.load(descriptors, &shader_name, info)?);
        }
        Ok(shaders)
    }

    /// Recompiles iff the cheap source hash changed, swapping the SPIR-V
    /// (and reflection) in place so existing `Weak` handles observe the
    /// update without needing to re-resolve.
    pub fn reload(&mut self, name: &str) -> Result<bool, String> {
        let Some(shader) = self.shaders.get(name) else {
            return Ok(false);
        };
        let language = shader.language;
        if !self.has_source_changed(language, &shader.source_path, shader.source_hash()) {
            return Ok(false);
        }

        let info = CreateInfo {
            name: shader.name.clone(),
            path: shader.source_path.clone(),
            entry_point: shader.entry_point.clone(),
            stage: shader.stage,
            language,
            include_paths: self.default_include_paths.clone(),
            defines: self.global_defines.clone(),
        };
        let output = self.compile(&info)?;
        shader.replace(output.spirv, output.source_hash, output.reflection);
        Ok(true)
    }

    /// Per-frame hot-reload driver: reloads every tracked shader
    /// whose source changed, returning how many were recompiled.
    pub fn reload_changed(&mut self) -> u32 {
        let names: Vec<String> = self.shaders.keys().cloned().collect();
        let mut reloaded = 0;
        for name in names {
            match self.reload(&name) {
                Ok(true) => reloaded += 1,
                Ok(false) => {}
                Err(err) => log::error!("hot reload of '{name}' failed: {err}"),
            }
        }
        reloaded
    }

    pub fn get(&self, name: &str) -> Option<Weak<Shader>> {
        self.shaders.get(name).map(Arc::downgrade)
    }
}

/// Auto-registers a Slang shader's reflected descriptors and push constants
/// into a `DescriptorManager`. Slang-compiled shaders register their own
/// descriptor layouts and push constants from reflection; GLSL shaders
/// require manual registration since no reflection is available.
///
/// Returns the resolved `{set, descriptor_type, binding}` triples (for
/// building a `resource_names` table) and the per-set layout handles in set
/// order, ready to feed `DescriptorManager::get_or_create_pipeline_layout_cache`
/// via `ShaderLayoutInfo`.
pub fn register_reflected_layouts(
    descriptors: &mut DescriptorManager,
    shader: &Shader,
) -> (Vec<(u32, vk::DescriptorType, u32)>, Vec<crate::descriptor::LayoutHandle>) {
    shader.with_reflection(|reflection| {
        let Some(reflection) = reflection else {
            return (Vec::new(), Vec::new());
        };
        register_reflection(descriptors, reflection, shader.stage.to_vk())
    })
}

fn register_reflection(
    descriptors: &mut DescriptorManager,
    reflection: &ShaderReflection,
    stage_flags: vk::ShaderStageFlags,
) -> (Vec<(u32, vk::DescriptorType, u32)>, Vec<crate::descriptor::LayoutHandle>) {
    let mut resource_names = Vec::new();
    let mut layout_handles = Vec::new();

    let max_set = reflection.max_set().unwrap_or(0);
    for set in 0..=max_set {
        let set_descriptors: Vec<_> = reflection.descriptors_in_set(set).collect();
        if set_descriptors.is_empty() {
            continue;
        }

        let frequency = infer_update_frequency(&set_descriptors);
        let is_bindless = set_descriptors.iter().any(|d| d.is_bindless);
        let bindings: Vec<BindingDesc> = set_descriptors
            .iter()
            .map(|d| BindingDesc {
                binding: d.binding,
                descriptor_type: d.descriptor_type,
                stages: stage_flags,
                count: if d.is_bindless { d.count } else { d.count.max(1) },
                flags: if d.is_bindless {
                    vk::DescriptorBindingFlags::PARTIALLY_BOUND
                        | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                        | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
                } else {
                    vk::DescriptorBindingFlags::empty()
                },
            })
            .collect();

        let handle = descriptors.register_layout(DescriptorLayoutDesc {
            name: format!("reflected-set-{set}"),
            bindings,
            frequency,
            create_flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            is_bindless,
        });
        layout_handles.push(handle);
        for descriptor in &set_descriptors {
            resource_names.push((set, descriptor.descriptor_type, descriptor.binding));
        }
    }

    if !reflection.push_constants.is_empty() {
        let ranges = reflection
            .push_constants
            .iter()
            .map(|pc| {
                vk::PushConstantRange::default()
                    .stage_flags(pc.stage_flags)
                    .offset(pc.offset)
                    .size(pc.size)
            })
            .collect();
        descriptors.register_push_constants(PushConstantDesc { ranges });
    }

    (resource_names, layout_handles)
}

/// Per-set `UpdateFrequency` is inferred from what it contains: more than
/// 100 slots -> Static, storage images -> PerPass, uniform buffers ->
/// PerFrame, otherwise PerMaterial.
fn infer_update_frequency(descriptors: &[&super::reflection::ReflectedDescriptor]) -> UpdateFrequency {
    if descriptors.iter().any(|d| d.count > 100) {
        UpdateFrequency::Static
    } else if descriptors.iter().any(|d| d.descriptor_type == vk::DescriptorType::STORAGE_IMAGE) {
        UpdateFrequency::PerPass
    } else if descriptors.iter().any(|d| d.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER) {
        UpdateFrequency::PerFrame
    } else {
        UpdateFrequency::PerMaterial
    }
}
