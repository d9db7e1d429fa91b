use ash::vk;

/// Indices `0..RESERVED_SLOTS` are never handed out by `allocate_*`: index
/// `0` is the null sentinel ("no texture" in the fragment shader), and
/// `1..RESERVED_SLOTS` hold the default textures installed by
/// `TextureManager` (white, black, normal-up, metallic-roughness-default).
pub const RESERVED_SLOTS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct BindlessSlotTexture {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Two parallel slot tables backing the bindless 2D/cubemap arrays. Pure
/// bookkeeping — actual descriptor writes are issued by `DescriptorManager`,
/// which owns the Vulkan device handle.
pub struct BindlessRegistry {
    tex2d_slots: Vec<Option<BindlessSlotTexture>>,
    cubemap_slots: Vec<Option<BindlessSlotTexture>>,
    tex2d_free: Vec<u32>,
    cubemap_free: Vec<u32>,
    max_2d: u32,
    max_cube: u32,
}

impl BindlessRegistry {
    pub fn new(max_2d: u32, max_cube: u32) -> Self {
        let mut tex2d_free: Vec<u32> = (RESERVED_SLOTS..max_2d).collect();
        tex2d_free.reverse(); // pop() hands out the lowest free index first
        let mut cubemap_free: Vec<u32> = (RESERVED_SLOTS..max_cube).collect();
        cubemap_free.reverse();

        Self {
            tex2d_slots: vec![None; max_2d as usize],
            cubemap_slots: vec![None; max_cube as usize],
            tex2d_free,
            cubemap_free,
            max_2d,
            max_cube,
        }
    }

    pub fn max_2d(&self) -> u32 {
        self.max_2d
    }

    pub fn max_cube(&self) -> u32 {
        self.max_cube
    }

    /// Returns `0` iff the free list is empty. Never overwrites a live slot.
    pub fn allocate_2d(&mut self, tex: BindlessSlotTexture) -> u32 {
        let Some(index) = self.tex2d_free.pop() else {
            log::warn!("bindless 2D texture free list exhausted (max {})", self.max_2d);
            return 0;
        };
        self.tex2d_slots[index as usize] = Some(tex);
        index
    }

    pub fn allocate_cubemap(&mut self, tex: BindlessSlotTexture) -> u32 {
        let Some(index) = self.cubemap_free.pop() else {
            log::warn!("bindless cubemap free list exhausted (max {})", self.max_cube);
            return 0;
        };
        self.cubemap_slots[index as usize] = Some(tex);
        index
    }

    /// Installs at a caller-specified index (used to pre-install default
    /// textures at their reserved slots). Does not touch the free list.
    pub fn set_2d_at(&mut self, index: u32, tex: BindlessSlotTexture) {
        self.tex2d_slots[index as usize] = Some(tex);
    }

    pub fn free_2d(&mut self, index: u32) {
        if index == 0 || index as usize >= self.tex2d_slots.len() {
            return;
        }
        self.tex2d_slots[index as usize] = None;
        self.tex2d_free.push(index);
    }

    pub fn free_cubemap(&mut self, index: u32) {
        if index == 0 || index as usize >= self.cubemap_slots.len() {
            return;
        }
        self.cubemap_slots[index as usize] = None;
        self.cubemap_free.push(index);
    }

    pub fn get_2d(&self, index: u32) -> Option<BindlessSlotTexture> {
        self.tex2d_slots.get(index as usize).copied().flatten()
    }

    pub fn get_cubemap(&self, index: u32) -> Option<BindlessSlotTexture> {
        self.cubemap_slots.get(index as usize).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex() -> BindlessSlotTexture {
        BindlessSlotTexture {
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
        }
    }

    #[test]
    fn allocated_indices_skip_reserved_range() {
        let mut reg = BindlessRegistry::new(16, 4);
        let i = reg.allocate_2d(tex());
        assert!(i >= RESERVED_SLOTS && i < 16);
    }

    #[test]
    fn bindless_lifecycle_reuses_freed_index() {
        // allocate 10, free index 9, next alloc returns 9.
        let mut reg = BindlessRegistry::new(64, 4);
        let mut indices = Vec::new();
        for _ in 0..10 {
            indices.push(reg.allocate_2d(tex()));
        }
        assert_eq!(indices, (5..15).collect::<Vec<_>>());
        reg.free_2d(9);
        let next = reg.allocate_2d(tex());
        assert_eq!(next, 9);
    }

    #[test]
    fn exhausted_free_list_returns_zero() {
        let mut reg = BindlessRegistry::new(RESERVED_SLOTS + 1, 4);
        let only = reg.allocate_2d(tex());
        assert_ne!(only, 0);
        assert_eq!(reg.allocate_2d(tex()), 0);
    }
}
