use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// GPU row written into the material SSBO. The
/// named fields pack to 80 bytes; the row is padded out to the declared
/// 128-byte stride to leave room for fields a future material model adds
/// without shifting every existing row's offset.
pub const MATERIAL_DATA_SIZE: usize = 128;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialData {
    pub base_color_factor: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub emissive_factor: Vec3,
    pub alpha_cutoff: f32,
    pub base_color_tex_index: u32,
    pub mr_tex_index: u32,
    pub normal_tex_index: u32,
    pub occlusion_tex_index: u32,
    pub emissive_tex_index: u32,
    pub padding: [u32; 3],
    _reserved: [u32; 12],
}

const _: () = assert!(std::mem::size_of::<MaterialData>() == MATERIAL_DATA_SIZE);

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            emissive_factor: Vec3::ZERO,
            alpha_cutoff: 0.5,
            base_color_tex_index: 1,
            mr_tex_index: 4,
            normal_tex_index: 3,
            occlusion_tex_index: 4,
            emissive_tex_index: 2,
            padding: [0; 3],
            _reserved: [0; 12],
        }
    }
}

/// Slot allocator over the material SSBO's `MAX_MATERIALS` rows. Index `0`
/// is never handed out — it denotes allocation failure to callers. The free
/// list is initialized with indices 1..max.
pub struct MaterialDataSlots {
    free: Vec<u32>,
    max_materials: u32,
}

impl MaterialDataSlots {
    pub fn new(max_materials: u32) -> Self {
        let mut free: Vec<u32> = (1..max_materials).collect();
        free.reverse();
        Self { free, max_materials }
    }

    pub fn max_materials(&self) -> u32 {
        self.max_materials
    }

    pub fn allocate(&mut self) -> u32 {
        self.free.pop().unwrap_or_else(|| {
            log::warn!("material SSBO free list exhausted (max {})", self.max_materials);
            0
        })
    }

    pub fn free(&mut self, id: u32) {
        if id == 0 || id >= self.max_materials {
            return;
        }
        self.free.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_is_exactly_one_twenty_eight_bytes() {
        assert_eq!(std::mem::size_of::<MaterialData>(), 128);
        assert_eq!(std::mem::align_of::<MaterialData>(), 16);
    }

    #[test]
    fn allocate_then_free_then_reallocate_reuses_slot() {
        let mut slots = MaterialDataSlots::new(64);
        let id = slots.allocate();
        assert_ne!(id, 0);
        slots.free(id);
        assert_eq!(slots.allocate(), id);
    }

    #[test]
    fn exhausted_slots_return_zero() {
        let mut slots = MaterialDataSlots::new(2);
        let first = slots.allocate();
        assert_ne!(first, 0);
        assert_eq!(slots.allocate(), 0);
    }
}
