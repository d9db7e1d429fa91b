//! The descriptor & resource binding system: layout
//! registration, pool allocation, bindless tables, the material SSBO, the
//! pipeline-layout cache, and reflection-driven managed uniforms.

mod bindless;
mod layout;
mod manager;
mod material_data;
mod sampler;
mod uniform;

pub use bindless::BindlessRegistry;
pub use layout::{
    BindingDesc, DescriptorLayoutDesc, LayoutHandle, PipelineLayoutCacheHandle, PushConstantDesc,
    PushConstantHandle, UpdateFrequency,
};
pub use manager::{DescriptorManager, NamedDescriptor, ResourceBinding, ShaderLayoutInfo};
pub use material_data::{MaterialData, MaterialDataSlots, MATERIAL_DATA_SIZE};
pub use sampler::{SamplerConfig, SamplerType};
pub use uniform::{UboField, UboLayout, UniformHandle, UniformSetInfo, UniformWriter};
pub use bindless::BindlessSlotTexture;
