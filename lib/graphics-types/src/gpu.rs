use ash::vk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GpuType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gpu {
    pub name: String,
    pub ty: GpuType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurGpu {
    pub name: String,
    pub msaa_sampling_count: u32,
    pub ty: GpuType,
}

#[derive(Debug, Clone)]
pub struct Gpus {
    pub gpus: Vec<Gpu>,
    pub auto: Gpu,
    pub cur: CurGpu,
}

/// Device limits queried once at physical-device selection and consulted
/// throughout the descriptor/uniform path (e.g. `minUniformBufferOffsetAlignment`
/// for the PerFrame dynamic-offset stride).
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub non_coherent_mem_alignment: u64,
    pub optimal_image_copy_mem_alignment: u64,
    pub max_texture_size: u32,
    pub max_sampler_anisotropy: u32,
    pub min_uniform_align: u32,
    pub max_multi_sample: vk::SampleCountFlags,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            non_coherent_mem_alignment: 1,
            optimal_image_copy_mem_alignment: 1,
            max_texture_size: 4096,
            max_sampler_anisotropy: 1,
            min_uniform_align: 16,
            max_multi_sample: vk::SampleCountFlags::TYPE_1,
        }
    }
}

impl Limits {
    /// Round `size` up to the next multiple of `min_uniform_align`.
    pub fn align_uniform(&self, size: u64) -> u64 {
        align_up(size, self.min_uniform_align as u64)
    }
}

pub fn align_up(size: u64, align: u64) -> u64 {
    if align == 0 {
        return size;
    }
    (size + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(200, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }
}
