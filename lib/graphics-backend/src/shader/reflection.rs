//! Reflected shader metadata, the common
//! currency between the Slang compiler and the descriptor auto-registration
//! path in `ShaderLibrary`.

use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IntVec2,
    IntVec3,
    IntVec4,
    UInt,
    UIntVec2,
    UIntVec3,
    UIntVec4,
    Mat4,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ReflectedField {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub field_type: FieldType,
}

/// One reflected UBO or SSBO: `{name, set, binding, total_size, fields}`.
#[derive(Debug, Clone)]
pub struct ReflectedBuffer {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub total_size: u32,
    pub fields: Vec<ReflectedField>,
}

/// One reflected descriptor binding: `{set, binding, type, count,
/// stage_flags, is_bindless, array_size, optional buffer_layout}`.
#[derive(Debug, Clone)]
pub struct ReflectedDescriptor {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
    pub is_bindless: bool,
    pub array_size: u32,
    pub buffer_layout: Option<ReflectedBuffer>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReflectedPushConstant {
    pub offset: u32,
    pub size: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub descriptors: Vec<ReflectedDescriptor>,
    pub push_constants: Vec<ReflectedPushConstant>,
}

impl ShaderReflection {
    pub fn descriptors_in_set(&self, set: u32) -> impl Iterator<Item = &ReflectedDescriptor> {
        self.descriptors.iter().filter(move |d| d.set == set)
    }

    pub fn max_set(&self) -> Option<u32> {
        self.descriptors.iter().map(|d| d.set).max()
    }

    /// The first UBO in this reflection, feeding `DescriptorManager::create_uniform`
    /// Size comes from the first UBO in the layout's reflection.
    pub fn first_ubo(&self) -> Option<&ReflectedBuffer> {
        self.descriptors
            .iter()
            .filter(|d| d.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER)
            .find_map(|d| d.buffer_layout.as_ref())
    }
}
