//! The only interface the rendering core has onto the scene graph / ECS:
//! iterate entities with `{transform, mesh, material, camera, light}`
//! components.
//!
//! The core never reaches into whatever ECS the rest of the engine uses; it
//! asks a `RenderWorld` for iterators over these four component kinds and
//! builds its own render list from them each frame.

use glam::{Mat4, Vec3};
use graphics_types::Vertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy)]
pub struct TransformComponent {
    pub world_matrix: Mat4,
}

/// Opaque references into the backend's mesh/material tables. The ECS never
/// constructs these itself — it only stores what asset loading or material
/// authoring handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshRef(pub graphics_types::Handle);

#[derive(Debug, Clone, Copy)]
pub struct MeshComponent {
    pub mesh: MeshRef,
}

/// `material_instance` is `0` when unset, meaning "no material assigned" —
/// the renderer skips such renderables rather than drawing with a sentinel
/// material, since sentinel material row `0` is never allocated.
#[derive(Debug, Clone, Copy)]
pub struct MaterialComponent {
    pub material_instance: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CameraComponent {
    pub view: Mat4,
    pub proj: Mat4,
    pub position: Vec3,
    pub fov_y_radians: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
}

#[derive(Debug, Clone, Copy)]
pub struct LightComponent {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
}

/// One renderable entity as the core sees it: a mesh, an optional material,
/// and the world transform that places it. The core never holds entities
/// across frames — `collect_renderables` walks this every frame.
pub struct RenderableEntity<'a> {
    pub entity: EntityId,
    pub transform: &'a TransformComponent,
    pub mesh: &'a MeshComponent,
    pub material: Option<&'a MaterialComponent>,
}

/// One contiguous index range belonging to a single material, as the asset
/// loader sees it. The core derives the submesh's world/local AABB itself
/// from `vertices`; `MeshSource` carries no baked bounds.
#[derive(Debug, Clone, Copy)]
pub struct SubMeshSource {
    pub first_index: u32,
    pub index_count: u32,
    pub material_index: u32,
}

/// The asset-loading side of mesh import: a decoded mesh handed to the core
/// as flat vertex/index arrays plus per-material index ranges. Parsing
/// glTF/OBJ/whatever the source format is lives entirely on the other side
/// of this interface — the core never reaches past it.
pub trait MeshSource {
    fn vertices(&self) -> &[Vertex];
    fn indices(&self) -> &[u32];
    fn sub_meshes(&self) -> &[SubMeshSource];
}

pub trait RenderWorld {
    /// Every entity carrying at least `{transform, mesh}`. Entities without
    /// a mesh are not renderables and must not be yielded here.
    fn iter_renderables<'a>(&'a self) -> Box<dyn Iterator<Item = RenderableEntity<'a>> + 'a>;

    /// The active camera, if any. The core renders nothing when absent.
    fn active_camera(&self) -> Option<&CameraComponent>;

    fn iter_lights<'a>(&'a self) -> Box<dyn Iterator<Item = &'a LightComponent> + 'a>;

    /// `true` iff any renderable's `TransformComponent` changed since the
    /// last call that returned `true` — drives `ForwardRenderer`'s
    /// scene-dirty flag and the lazy BVH rebuild.
    fn take_dirty(&mut self) -> bool;
}
