use ash::vk;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    Default,
    ClampToEdge,
    Nearest,
    Shadow,
    Cubemap,
    NearestClamp,
}

/// Declarative sampler configuration, content-hashed for dedup by
/// `get_or_create_sampler`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub border_color: vk::BorderColor,
    pub compare_enable: bool,
    pub compare_op: vk::CompareOp,
}

impl SamplerConfig {
    pub fn hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.mag_filter.as_raw().hash(&mut hasher);
        self.min_filter.as_raw().hash(&mut hasher);
        self.address_mode_u.as_raw().hash(&mut hasher);
        self.address_mode_v.as_raw().hash(&mut hasher);
        self.address_mode_w.as_raw().hash(&mut hasher);
        self.mipmap_mode.as_raw().hash(&mut hasher);
        self.min_lod.to_bits().hash(&mut hasher);
        self.max_lod.to_bits().hash(&mut hasher);
        self.mip_lod_bias.to_bits().hash(&mut hasher);
        self.anisotropy_enable.hash(&mut hasher);
        self.max_anisotropy.to_bits().hash(&mut hasher);
        self.border_color.as_raw().hash(&mut hasher);
        self.compare_enable.hash(&mut hasher);
        self.compare_op.as_raw().hash(&mut hasher);
        hasher.finish()
    }

    pub fn default_aniso(max_anisotropy: f32) -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            mip_lod_bias: 0.0,
            anisotropy_enable: true,
            max_anisotropy,
            border_color: vk::BorderColor::FLOAT_OPAQUE_BLACK,
            compare_enable: false,
            compare_op: vk::CompareOp::NEVER,
        }
    }

    pub fn clamp_to_edge() -> Self {
        Self {
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            ..Self::default_aniso(1.0)
        }
    }

    pub fn nearest() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            ..Self::default_aniso(1.0)
        }
    }

    pub fn shadow() -> Self {
        Self {
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            compare_enable: true,
            compare_op: vk::CompareOp::LESS_OR_EQUAL,
            ..Self::default_aniso(1.0)
        }
    }

    pub fn cubemap() -> Self {
        Self {
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            ..Self::default_aniso(1.0)
        }
    }

    pub fn nearest_clamp() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            ..Self::default_aniso(1.0)
        }
    }

    pub fn for_type(ty: SamplerType, device_max_anisotropy: f32) -> Self {
        match ty {
            SamplerType::Default => Self::default_aniso(device_max_anisotropy),
            SamplerType::ClampToEdge => Self::clamp_to_edge(),
            SamplerType::Nearest => Self::nearest(),
            SamplerType::Shadow => Self::shadow(),
            SamplerType::Cubemap => Self::cubemap(),
            SamplerType::NearestClamp => Self::nearest_clamp(),
        }
    }

    pub fn to_vk_create_info(&self) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .address_mode_u(self.address_mode_u)
            .address_mode_v(self.address_mode_v)
            .address_mode_w(self.address_mode_w)
            .mipmap_mode(self.mipmap_mode)
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
            .mip_lod_bias(self.mip_lod_bias)
            .anisotropy_enable(self.anisotropy_enable)
            .max_anisotropy(self.max_anisotropy)
            .border_color(self.border_color)
            .compare_enable(self.compare_enable)
            .compare_op(self.compare_op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_configs_hash_equal() {
        let a = SamplerConfig::default_aniso(16.0);
        let b = SamplerConfig::default_aniso(16.0);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn different_configs_hash_differently() {
        let a = SamplerConfig::default_aniso(16.0);
        let b = SamplerConfig::nearest();
        assert_ne!(a, b);
        assert_ne!(a.hash(), b.hash());
    }
}
