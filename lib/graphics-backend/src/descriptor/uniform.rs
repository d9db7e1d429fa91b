use ash::vk;
use std::collections::HashMap;

use super::layout::LayoutHandle;
use super::UpdateFrequency;
use crate::resource::BufferResource;

/// Opaque handle into `DescriptorManager`'s managed-uniform table, returned
/// by `create_uniform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle(pub u32);

impl UniformHandle {
    pub const INVALID: UniformHandle = UniformHandle(0);
}

/// One field of a reflected UBO/SSBO, trimmed to what field-proxy writes
/// need. Produced from `ShaderReflection`'s per-buffer field list.
#[derive(Debug, Clone)]
pub struct UboField {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// The reflected shape of the first UBO in a shader's descriptor layout —
/// the input to `create_uniform` (size comes from the first UBO in the
/// layout's reflection).
#[derive(Debug, Clone)]
pub struct UboLayout {
    pub total_size: u32,
    pub fields: Vec<UboField>,
}

/// Bookkeeping for one managed uniform.
pub struct UniformSetInfo {
    pub buffer: BufferResource,
    pub descriptor_set: vk::DescriptorSet,
    pub layout_handle: LayoutHandle,
    pub frequency: UpdateFrequency,
    pub buffer_size: u32,
    pub aligned_stride: u32,
    fields: HashMap<String, UboField>,
}

impl UniformSetInfo {
    pub fn new(
        buffer: BufferResource,
        descriptor_set: vk::DescriptorSet,
        layout_handle: LayoutHandle,
        frequency: UpdateFrequency,
        buffer_size: u32,
        aligned_stride: u32,
        fields: Vec<UboField>,
    ) -> Self {
        Self {
            buffer,
            descriptor_set,
            layout_handle,
            frequency,
            buffer_size,
            aligned_stride,
            fields: fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    /// Range used when binding this set: `aligned_stride` for PerFrame
    /// (dynamic offset), `buffer_size` otherwise.
    pub fn bind_range(&self) -> u32 {
        match self.frequency {
            UpdateFrequency::PerFrame => self.aligned_stride,
            _ => self.buffer_size,
        }
    }

    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self.frequency {
            UpdateFrequency::PerFrame => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            _ => vk::DescriptorType::UNIFORM_BUFFER,
        }
    }

    pub fn dynamic_offset(&self, frame_index: u32) -> u32 {
        match self.frequency {
            UpdateFrequency::PerFrame => frame_index * self.aligned_stride,
            _ => 0,
        }
    }

    /// Sized memcpy into the mapped buffer at `{offset, size}` from the
    /// reflection, rejecting a write whose size does not equal the field's
    /// size.
    pub fn write_field(&mut self, field_name: &str, frame_index: u32, bytes: &[u8]) -> bool {
        let Some(field) = self.fields.get(field_name) else {
            log::error!("uniform has no field named '{field_name}'");
            return false;
        };
        if bytes.len() as u32 != field.size {
            log::error!(
                "field '{field_name}' is {} bytes, write supplied {}",
                field.size,
                bytes.len()
            );
            return false;
        }
        let base = match self.frequency {
            UpdateFrequency::PerFrame => frame_index * self.aligned_stride,
            _ => 0,
        };
        self.buffer.write_bytes((base + field.offset) as u64, bytes);
        true
    }
}

/// Ergonomic wrapper so callers can write `uniform.set("viewProj", mat)`
/// instead of hand-rolling `bytemuck::bytes_of`.
pub struct UniformWriter<'a> {
    pub(super) info: &'a mut UniformSetInfo,
    pub(super) frame_index: u32,
}

impl<'a> UniformWriter<'a> {
    pub fn set<T: bytemuck::Pod>(&mut self, field_name: &str, value: T) -> bool {
        self.info
            .write_field(field_name, self.frame_index, bytemuck::bytes_of(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_frame_dynamic_offset_matches_frame_times_stride() {
        let fields = vec![UboField {
            name: "viewProj".into(),
            offset: 0,
            size: 64,
        }];
        let buffer = crate::resource::BufferResource {
            buffer: vk::Buffer::null(),
            allocation: None,
            size: 192,
            mapped_ptr: None,
        };
        let info = UniformSetInfo::new(
            buffer,
            vk::DescriptorSet::null(),
            LayoutHandle(1),
            UpdateFrequency::PerFrame,
            192,
            256,
            fields,
        );
        assert_eq!(info.dynamic_offset(0), 0);
        assert_eq!(info.dynamic_offset(1), 256);
        assert_eq!(info.bind_range(), 256);
    }
}
