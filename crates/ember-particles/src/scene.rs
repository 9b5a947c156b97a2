//! External collaborators the simulation queries but does not own.
//!
//! Meshes and transforms are referenced through plain handles and resolved
//! through these traits on every use; the particle core never holds a shared
//! pointer into the scene or resource system.

use ember_core::{Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Non-owning reference to a mesh in the host's resource system
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshHandle(pub u64);

/// Non-owning reference to a scene object's transform
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformHandle(pub u64);

/// Triangle mesh geometry used for mesh-shape emission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    /// Per-vertex normals; empty when the mesh has none
    #[serde(default)]
    pub normals: Vec<Vec3>,
    /// Triangle list, three indices per triangle
    #[serde(default)]
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex indices of triangle `i`
    pub fn triangle(&self, i: usize) -> [usize; 3] {
        [
            self.indices[i * 3] as usize,
            self.indices[i * 3 + 1] as usize,
            self.indices[i * 3 + 2] as usize,
        ]
    }

    pub fn vertex_normal(&self, i: usize) -> Option<Vec3> {
        self.normals.get(i).copied()
    }

    /// Corner positions of triangle `i`, `None` if an index points past the vertices
    pub fn triangle_vertices(&self, i: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = self.triangle(i);
        Some([
            *self.vertices.get(a)?,
            *self.vertices.get(b)?,
            *self.vertices.get(c)?,
        ])
    }

    /// Area of triangle `i`; zero when its indices are out of range
    pub fn triangle_area(&self, i: usize) -> f32 {
        match self.triangle_vertices(i) {
            Some([a, b, c]) => (b - a).cross(&(c - a)).length() * 0.5,
            None => 0.0,
        }
    }

    /// Face normal of triangle `i` (counter-clockwise winding), `+Z` if degenerate
    pub fn face_normal(&self, i: usize) -> Vec3 {
        let Some([a, b, c]) = self.triangle_vertices(i) else {
            return Vec3::Z;
        };
        let n = (b - a).cross(&(c - a)).normalized();
        if n == Vec3::ZERO {
            Vec3::Z
        } else {
            n
        }
    }
}

/// Answers "where is this scene object now"
pub trait TransformSource {
    fn transform(&self, handle: TransformHandle) -> Option<Transform>;
}

/// Answers "what does this mesh look like now" (skinned meshes change every frame)
pub trait MeshSource {
    fn mesh(&self, handle: MeshHandle) -> Option<&MeshData>;
}

/// Result of a swept-sphere query against the physics world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Contact point on the surface
    pub point: Vec3,
    /// Surface normal at the contact, pointing toward the sphere
    pub normal: Vec3,
    /// Distance the sphere center travelled before touching
    pub distance: f32,
}

/// Physics world query used by world-mode collisions
pub trait PhysicsQuery {
    /// Sweep a sphere of `radius` from `origin` along unit `direction` up to `max_distance`.
    fn sweep_sphere(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
    ) -> Option<SweepHit>;
}

/// A scene with nothing in it, for systems that reference no meshes or transforms
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScene;

impl TransformSource for NoScene {
    fn transform(&self, _handle: TransformHandle) -> Option<Transform> {
        None
    }
}

impl MeshSource for NoScene {
    fn mesh(&self, _handle: MeshHandle) -> Option<&MeshData> {
        None
    }
}

/// In-memory scene: a fixed set of transforms and meshes keyed by handle
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    transforms: HashMap<TransformHandle, Transform>,
    meshes: HashMap<MeshHandle, MeshData>,
}

impl SceneSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_transform(&mut self, handle: TransformHandle, transform: Transform) {
        self.transforms.insert(handle, transform);
    }

    pub fn insert_mesh(&mut self, handle: MeshHandle, mesh: MeshData) {
        self.meshes.insert(handle, mesh);
    }

    pub fn mesh_mut(&mut self, handle: MeshHandle) -> Option<&mut MeshData> {
        self.meshes.get_mut(&handle)
    }
}

impl TransformSource for SceneSnapshot {
    fn transform(&self, handle: TransformHandle) -> Option<Transform> {
        self.transforms.get(&handle).copied()
    }
}

impl MeshSource for SceneSnapshot {
    fn mesh(&self, handle: MeshHandle) -> Option<&MeshData> {
        self.meshes.get(&handle)
    }
}
