//! Slang compiler and reflection extraction.
//! This is the one place in the crate that touches the raw `shader-slang`
//! bindings directly — everything else goes through `ShaderCompiler` /
//! `ShaderReflection`, so a binding-surface mismatch stays contained here.

use std::path::PathBuf;

use ash::vk;
use shader_slang as slang;

use super::compiler::{CompileOutput, CreateInfo, ShaderCompiler, ShaderStage};
use super::reflection::{
    FieldType, ReflectedBuffer, ReflectedDescriptor, ReflectedField, ReflectedPushConstant,
    ShaderReflection,
};

/// Slang's `[[bindless]]`-or-oversized-array convention: a zero or
/// over-10000 element count triggers the bindless path, sized to 1024.
const BINDLESS_ARRAY_THRESHOLD: u32 = 10_000;
const BINDLESS_ARRAY_SIZE: u32 = 1024;

pub struct SlangCompiler {
    global_session: slang::GlobalSession,
}

impl SlangCompiler {
    pub fn new() -> Result<Self, String> {
        let global_session =
            slang::GlobalSession::new().map_err(|err| format!("slang::GlobalSession::new failed: {err:?}"))?;
        Ok(Self { global_session })
    }

    /// Provides `get_module_entry_points(path)` which returns
    /// every `{name, stage}` defined in a module".
    pub fn get_module_entry_points(&self, path: &PathBuf) -> Result<Vec<(String, ShaderStage)>, String> {
        let session = self.create_session(&[])?;
        let module = session
            .load_module(&path.to_string_lossy())
            .map_err(|err| format!("loading slang module {}: {err:?}", path.display()))?;

        let mut entry_points = Vec::new();
        for index in 0..module.entry_point_count() {
            let entry_point = module
                .entry_point_by_index(index)
                .ok_or_else(|| format!("entry point {index} missing from module reflection"))?;
            let name = entry_point.function_reflection().name().to_string();
            let stage = map_stage(entry_point.stage());
            entry_points.push((name, stage));
        }
        Ok(entry_points)
    }

    fn create_session(&self, include_paths: &[PathBuf]) -> Result<slang::Session, String> {
        let search_paths: Vec<String> = include_paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let target = slang::TargetDesc::default().format(slang::CompileTarget::Spirv);
        let search_path_refs: Vec<&str> = search_paths.iter().map(String::as_str).collect();
        let desc = slang::SessionDesc::default()
            .targets(&[target])
            .search_paths(&search_path_refs);
        self.global_session
            .create_session(&desc)
            .map_err(|err| format!("slang::Session creation failed: {err:?}"))
    }
}

impl ShaderCompiler for SlangCompiler {
    fn compile(&self, info: &CreateInfo) -> Result<CompileOutput, String> {
        let session = self.create_session(&info.include_paths)?;
        let module = session
            .load_module(&info.path.to_string_lossy())
            .map_err(|err| format!("loading slang module {}: {err:?}", info.path.display()))?;

        let entry_point = module
            .find_entry_point_by_name(&info.entry_point)
            .ok_or_else(|| format!("entry point '{}' not found in {}", info.entry_point, info.path.display()))?;

        let program = session
            .create_composite_component_type(&[module.as_component(), entry_point.as_component()])
            .map_err(|err| format!("linking {}::{}: {err:?}", info.path.display(), info.entry_point))?;
        let linked = program
            .link()
            .map_err(|err| format!("link() failed for {}::{}: {err:?}", info.path.display(), info.entry_point))?;

        let code = linked
            .entry_point_code(0, 0)
            .map_err(|err| format!("entry point code extraction failed: {err:?}"))?;
        let bytes = code.as_slice();
        if bytes.len() % 4 != 0 {
            return Err("slang produced a SPIR-V blob not aligned to 4 bytes".into());
        }
        let spirv: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let layout = linked
            .layout(0)
            .map_err(|err| format!("program layout extraction failed: {err:?}"))?;
        let reflection = extract_reflection(&layout, info.stage.to_vk());

        Ok(CompileOutput {
            spirv,
            source_hash: super::compiler::compute_source_hash(&info.path),
            reflection: Some(reflection),
        })
    }
}

fn map_stage(stage: slang::Stage) -> ShaderStage {
    match stage {
        slang::Stage::Vertex => ShaderStage::Vertex,
        slang::Stage::Fragment => ShaderStage::Fragment,
        slang::Stage::Compute => ShaderStage::Compute,
        slang::Stage::Geometry => ShaderStage::Geometry,
        slang::Stage::Hull => ShaderStage::TessCtrl,
        slang::Stage::Domain => ShaderStage::TessEval,
        _ => ShaderStage::Vertex,
    }
}

/// Implements reflection extraction against a
/// linked program's `ProgramLayout`.
fn extract_reflection(layout: &slang::reflection::Shader, stage_flags: vk::ShaderStageFlags) -> ShaderReflection {
    let mut descriptors = Vec::new();
    let mut push_constants = Vec::new();

    for index in 0..layout.parameter_count() {
        let Some(param) = layout.parameter_by_index(index) else {
            continue;
        };
        let set = param.binding_space() as u32;
        let binding = param.binding_index() as u32;
        let type_layout = param.type_layout();

        if type_layout.is_push_constant_buffer() {
            push_constants.push(ReflectedPushConstant {
                offset: 0,
                size: type_layout.size() as u32,
                stage_flags,
            });
            continue;
        }

        let (descriptor_type, array_size, is_bindless) = classify(&type_layout);
        let buffer_layout = reflect_buffer_fields(param.name(), set, binding, &type_layout);

        descriptors.push(ReflectedDescriptor {
            set,
            binding,
            descriptor_type,
            count: if is_bindless { BINDLESS_ARRAY_SIZE } else { array_size.max(1) },
            stage_flags,
            is_bindless,
            array_size,
            buffer_layout,
        });
    }

    ShaderReflection {
        descriptors,
        push_constants,
    }
}

fn classify(type_layout: &slang::reflection::TypeLayout) -> (vk::DescriptorType, u32, bool) {
    let element_count = type_layout.element_count() as u32;
    let has_bindless_attribute = type_layout.has_attribute("bindless");
    let is_bindless = has_bindless_attribute || element_count == 0 || element_count > BINDLESS_ARRAY_THRESHOLD;

    let descriptor_type = match type_layout.kind() {
        slang::TypeKind::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        slang::TypeKind::Resource if type_layout.is_read_write() => vk::DescriptorType::STORAGE_IMAGE,
        slang::TypeKind::Resource => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        slang::TypeKind::StructuredBuffer => vk::DescriptorType::STORAGE_BUFFER,
        slang::TypeKind::SamplerState => vk::DescriptorType::SAMPLER,
        _ => vk::DescriptorType::UNIFORM_BUFFER,
    };

    (descriptor_type, element_count, is_bindless)
}

fn reflect_buffer_fields(
    name: &str,
    set: u32,
    binding: u32,
    type_layout: &slang::reflection::TypeLayout,
) -> Option<ReflectedBuffer> {
    if !matches!(
        type_layout.kind(),
        slang::TypeKind::ConstantBuffer | slang::TypeKind::StructuredBuffer
    ) {
        return None;
    }
    let element_layout = type_layout.element_type_layout();
    let mut fields = Vec::new();
    for index in 0..element_layout.field_count() {
        let Some(field) = element_layout.field_by_index(index) else {
            continue;
        };
        fields.push(ReflectedField {
            name: field.name().to_string(),
            offset: field.offset() as u32,
            size: field.type_layout().size() as u32,
            field_type: map_field_type(&field.type_layout()),
        });
    }
    Some(ReflectedBuffer {
        name: name.to_string(),
        set,
        binding,
        total_size: element_layout.size() as u32,
        fields,
    })
}

fn map_field_type(type_layout: &slang::reflection::TypeLayout) -> FieldType {
    match type_layout.scalar_kind() {
        slang::ScalarKind::Float32 => match type_layout.element_count() {
            1 => FieldType::Float,
            2 => FieldType::Vec2,
            3 => FieldType::Vec3,
            4 => FieldType::Vec4,
            16 => FieldType::Mat4,
            _ => FieldType::Unknown,
        },
        slang::ScalarKind::Int32 => match type_layout.element_count() {
            1 => FieldType::Int,
            2 => FieldType::IntVec2,
            3 => FieldType::IntVec3,
            4 => FieldType::IntVec4,
            _ => FieldType::Unknown,
        },
        slang::ScalarKind::UInt32 => match type_layout.element_count() {
            1 => FieldType::UInt,
            2 => FieldType::UIntVec2,
            3 => FieldType::UIntVec3,
            4 => FieldType::UIntVec4,
            _ => FieldType::Unknown,
        },
        _ => FieldType::Unknown,
    }
}
