use ash::vk;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Content hash of a `DescriptorLayoutDesc`. Two shaders needing identical
/// layouts collapse to the same handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutHandle(pub u32);

impl LayoutHandle {
    pub const INVALID: LayoutHandle = LayoutHandle(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantHandle(pub u32);

impl PushConstantHandle {
    /// Reserved for "no push constants".
    pub const NONE: PushConstantHandle = PushConstantHandle(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutCacheHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateFrequency {
    PerFrame,
    PerPass,
    PerMaterial,
    Static,
}

impl UpdateFrequency {
    /// Pool-growth multiplier, applied per frame-in-flight by `allocate_set`.
    pub fn pool_multiplier(&self) -> u32 {
        match self {
            UpdateFrequency::PerFrame => 10,
            UpdateFrequency::PerPass => 20,
            UpdateFrequency::PerMaterial => 100,
            UpdateFrequency::Static => 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingDesc {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
    pub flags: vk::DescriptorBindingFlags,
}

fn hash_descriptor_type(ty: vk::DescriptorType) -> u32 {
    ty.as_raw() as u32
}

#[derive(Debug, Clone)]
pub struct DescriptorLayoutDesc {
    /// Debug-only; excluded from the content hash.
    pub name: String,
    pub bindings: Vec<BindingDesc>,
    pub frequency: UpdateFrequency,
    pub create_flags: vk::DescriptorSetLayoutCreateFlags,
    pub is_bindless: bool,
}

impl DescriptorLayoutDesc {
    pub fn hash(&self) -> LayoutHandle {
        let mut hasher = FxHasher::default();
        self.bindings.len().hash(&mut hasher);
        for binding in &self.bindings {
            binding.binding.hash(&mut hasher);
            hash_descriptor_type(binding.descriptor_type).hash(&mut hasher);
            binding.stages.as_raw().hash(&mut hasher);
            binding.count.hash(&mut hasher);
            binding.flags.as_raw().hash(&mut hasher);
        }
        std::mem::discriminant(&self.frequency).hash(&mut hasher);
        self.create_flags.as_raw().hash(&mut hasher);
        self.is_bindless.hash(&mut hasher);

        // Never collide with the reserved "invalid" handle 0.
        let raw = hasher.finish() as u32;
        LayoutHandle(if raw == 0 { 1 } else { raw })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PushConstantDesc {
    pub ranges: Vec<vk::PushConstantRange>,
}

impl PushConstantDesc {
    pub fn hash(&self) -> PushConstantHandle {
        if self.ranges.is_empty() {
            return PushConstantHandle::NONE;
        }
        let mut hasher = FxHasher::default();
        for range in &self.ranges {
            range.stage_flags.as_raw().hash(&mut hasher);
            range.offset.hash(&mut hasher);
            range.size.hash(&mut hasher);
        }
        let raw = hasher.finish() as u32;
        PushConstantHandle(if raw == 0 { 1 } else { raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_desc(binding_count: u32) -> DescriptorLayoutDesc {
        DescriptorLayoutDesc {
            name: "ignored".into(),
            bindings: vec![BindingDesc {
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                stages: vk::ShaderStageFlags::VERTEX,
                count: binding_count,
                flags: vk::DescriptorBindingFlags::empty(),
            }],
            frequency: UpdateFrequency::PerFrame,
            create_flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            is_bindless: false,
        }
    }

    #[test]
    fn identical_content_hashes_equal() {
        let a = sample_desc(1);
        let mut b = sample_desc(1);
        b.name = "totally different debug name".into();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn different_content_hashes_differ() {
        assert_ne!(sample_desc(1).hash(), sample_desc(2).hash());
    }

    #[test]
    fn no_push_constants_is_reserved_zero() {
        assert_eq!(PushConstantDesc::default().hash(), PushConstantHandle::NONE);
    }
}
