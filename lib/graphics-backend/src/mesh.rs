//! Mesh storage and the lazily-rebuilt BVH over
//! world-space submesh AABBs.

use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use graphics_backend_traits::MeshSource;
use graphics_types::{Handle, Vertex};

use crate::bvh::{Aabb, Bvh};
use crate::context::GraphicsContext;
use crate::resource::{BufferResource, ResourceFactory};

pub type MeshHandle = Handle;

#[derive(Debug, Clone, Copy)]
pub struct SubMesh {
    pub first_index: u32,
    pub index_count: u32,
    pub material_index: u32,
    pub local_aabb: Aabb,
}

pub struct Mesh {
    pub vertex_buffer: BufferResource,
    pub index_buffer: BufferResource,
    pub sub_meshes: Vec<SubMesh>,
}

impl Mesh {
    /// Valid iff `index_count > 0`.
    pub fn is_valid(&self) -> bool {
        self.sub_meshes.iter().any(|s| s.index_count > 0)
    }
}

struct Slot {
    mesh: Option<Mesh>,
    generation: u32,
}

pub struct MeshManager {
    factory: ResourceFactory,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl MeshManager {
    pub fn new(ctx: Arc<GraphicsContext>) -> Self {
        Self {
            factory: ResourceFactory::new(ctx),
            slots: vec![Slot {
                mesh: None,
                generation: 0,
            }],
            free_list: Vec::new(),
        }
    }

    /// Uploads vertex/index arrays into GPU-local buffers through a staging
    /// buffer (the core consumes pre-baked vertex/index arrays).
    pub fn create_mesh(
        &mut self,
        vertices: &[Vertex],
        indices: &[u32],
        sub_meshes: Vec<SubMesh>,
        name: &str,
    ) -> anyhow::Result<MeshHandle> {
        let vertex_bytes = bytemuck::cast_slice(vertices);
        let vertex_buffer = self.factory.create_buffer(
            vertex_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            gpu_allocator::MemoryLocation::GpuOnly,
            &format!("{name}-vertices"),
        )?;
        self.factory.upload_buffer(&vertex_buffer, vertex_bytes)?;

        let index_bytes = bytemuck::cast_slice(indices);
        let index_buffer = self.factory.create_buffer(
            index_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            gpu_allocator::MemoryLocation::GpuOnly,
            &format!("{name}-indices"),
        )?;
        self.factory.upload_buffer(&index_buffer, index_bytes)?;

        Ok(self.insert(Mesh {
            vertex_buffer,
            index_buffer,
            sub_meshes,
        }))
    }

    /// Same upload path as `create_mesh`, but takes a `MeshSource` and
    /// computes each submesh's `local_aabb` from its index range's vertex
    /// positions rather than requiring the caller to have baked one.
    pub fn create_mesh_from_source(
        &mut self,
        source: &dyn MeshSource,
        name: &str,
    ) -> anyhow::Result<MeshHandle> {
        let vertices = source.vertices();
        let indices = source.indices();
        let sub_meshes = source
            .sub_meshes()
            .iter()
            .map(|s| SubMesh {
                first_index: s.first_index,
                index_count: s.index_count,
                material_index: s.material_index,
                local_aabb: local_aabb_for_range(vertices, indices, s.first_index, s.index_count),
            })
            .collect();
        self.create_mesh(vertices, indices, sub_meshes, name)
    }

    fn insert(&mut self, mesh: Mesh) -> MeshHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.mesh = Some(mesh);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                mesh: Some(mesh),
                generation: 0,
            });
            Handle::new(index, 0)
        }
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&Mesh> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.mesh.as_ref()
    }

    pub fn destroy(&mut self, handle: MeshHandle) {
        let Some(slot) = self.slots.get_mut(handle.index() as usize) else {
            return;
        };
        if slot.generation != handle.generation() {
            return;
        }
        if let Some(mesh) = slot.mesh.take() {
            self.factory.destroy_buffer(mesh.vertex_buffer);
            self.factory.destroy_buffer(mesh.index_buffer);
        }
        self.free_list.push(handle.index());
    }
}

fn local_aabb_for_range(vertices: &[Vertex], indices: &[u32], first_index: u32, index_count: u32) -> Aabb {
    let range = first_index as usize..(first_index + index_count) as usize;
    indices
        .get(range)
        .into_iter()
        .flatten()
        .filter_map(|&i| vertices.get(i as usize))
        .fold(Aabb::EMPTY, |acc, v| Aabb {
            min: acc.min.min(v.position),
            max: acc.max.max(v.position),
        })
}

pub fn transform_aabb(local: &Aabb, world_matrix: &Mat4) -> Aabb {
    let corners = [
        Vec3::new(local.min.x, local.min.y, local.min.z),
        Vec3::new(local.max.x, local.min.y, local.min.z),
        Vec3::new(local.min.x, local.max.y, local.min.z),
        Vec3::new(local.max.x, local.max.y, local.min.z),
        Vec3::new(local.min.x, local.min.y, local.max.z),
        Vec3::new(local.max.x, local.min.y, local.max.z),
        Vec3::new(local.min.x, local.max.y, local.max.z),
        Vec3::new(local.max.x, local.max.y, local.max.z),
    ];
    corners
        .into_iter()
        .map(|corner| world_matrix.transform_point3(corner))
        .fold(Aabb::EMPTY, |acc, point| Aabb {
            min: acc.min.min(point),
            max: acc.max.max(point),
        })
}

/// One entry in the renderable list feeding `build_scene_bvh`: a world-space
/// AABB tagged with its index into the renderable list.
#[derive(Clone, Copy)]
pub struct RenderablePrimitive {
    pub renderable_index: u32,
    pub world_aabb: Aabb,
}

pub fn build_scene_bvh(primitives: &[RenderablePrimitive]) -> Bvh {
    let entries: Vec<(u32, Aabb)> = primitives
        .iter()
        .map(|p| (p.renderable_index, p.world_aabb))
        .collect();
    Bvh::build(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_leaves_aabb_unchanged() {
        let local = Aabb {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        };
        let world = transform_aabb(&local, &Mat4::IDENTITY);
        assert!((world.min - local.min).length() < 1e-5);
        assert!((world.max - local.max).length() < 1e-5);
    }

    #[test]
    fn translation_shifts_aabb() {
        let local = Aabb {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        };
        let world = transform_aabb(&local, &Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert!((world.min.x - 9.0).abs() < 1e-5);
        assert!((world.max.x - 11.0).abs() < 1e-5);
    }

    fn vertex_at(x: f32, y: f32, z: f32) -> Vertex {
        Vertex {
            position: Vec3::new(x, y, z),
            normal: Vec3::Y,
            uv: glam::Vec2::ZERO,
            tangent: glam::Vec4::ZERO,
        }
    }

    #[test]
    fn local_aabb_for_range_covers_only_its_own_indices() {
        let vertices = [
            vertex_at(-1.0, 0.0, 0.0),
            vertex_at(1.0, 0.0, 0.0),
            vertex_at(0.0, 5.0, 0.0),
        ];
        let indices = [0u32, 1, 1, 2, 2, 0];
        // Second submesh (indices 1,2,0) should see the full range.
        let aabb = local_aabb_for_range(&vertices, &indices, 3, 3);
        assert!((aabb.min.x + 1.0).abs() < 1e-5);
        assert!((aabb.max.y - 5.0).abs() < 1e-5);

        // First submesh (indices 0,1) excludes the third vertex entirely.
        let aabb = local_aabb_for_range(&vertices, &indices, 0, 2);
        assert!(aabb.max.y < 1e-5);
    }
}
