//! Spawn-point selection on static and skinned meshes

use crate::rand::ParticleRng;
use crate::scene::{MeshData, MeshHandle, MeshSource};
use crate::shape::ShapeSample;
use ember_core::{EmberError, Result, Vec3};
use serde::{Deserialize, Serialize};

/// Which mesh element a spawn point is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshEmitFrom {
    Vertex,
    /// Edge midpoints; every triangle contributes its three edges in winding order
    Edge,
    /// Uniform point inside a triangle, triangles weighted by area
    #[default]
    Triangle,
}

/// Options shared by the static and skinned mesh shapes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshShape {
    pub mesh: Option<MeshHandle>,
    pub emit_from: MeshEmitFrom,
    /// Walk elements in source order instead of picking them at random
    pub sequential: bool,
}

/// Runtime sampler for one mesh shape: cached area table and sequential cursor
#[derive(Debug, Clone)]
pub struct MeshSampler {
    handle: MeshHandle,
    emit_from: MeshEmitFrom,
    sequential: bool,
    /// Running sum of triangle areas, for area-weighted picks
    cumulative_area: Vec<f32>,
    next_index: usize,
    missing_reported: bool,
    invalid_reported: bool,
}

impl MeshSampler {
    /// Resolve and check the mesh. Fails if no mesh is assigned, the handle does
    /// not resolve, or the mesh has no element of the requested kind.
    pub fn activate(shape: &MeshShape, meshes: &dyn MeshSource) -> Result<Self> {
        let handle = shape.mesh.ok_or_else(|| {
            EmberError::ConfigurationError("mesh shape has no mesh assigned".into())
        })?;
        let mesh = meshes
            .mesh(handle)
            .ok_or(EmberError::MissingMesh(handle.0))?;
        validate_mesh(handle, mesh, shape.emit_from)?;

        let mut sampler = Self {
            handle,
            emit_from: shape.emit_from,
            sequential: shape.sequential,
            cumulative_area: Vec::new(),
            next_index: 0,
            missing_reported: false,
            invalid_reported: false,
        };
        sampler.rebuild_areas(mesh);
        Ok(sampler)
    }

    pub fn handle(&self) -> MeshHandle {
        self.handle
    }

    /// Recompute area weights from the current geometry (skinned meshes deform).
    /// Geometry that fails the activation checks keeps the previous weights.
    pub fn refresh(&mut self, meshes: &dyn MeshSource) {
        let Some(mesh) = meshes.mesh(self.handle) else {
            return;
        };
        match validate_mesh(self.handle, mesh, self.emit_from) {
            Ok(()) => self.rebuild_areas(mesh),
            Err(err) => self.report_invalid(&err.to_string()),
        }
    }

    fn report_invalid(&mut self, reason: &str) {
        if !self.invalid_reported {
            log::warn!("mesh {} is inconsistent: {reason}", self.handle.0);
            self.invalid_reported = true;
        }
    }

    pub fn reset(&mut self) {
        self.next_index = 0;
    }

    fn rebuild_areas(&mut self, mesh: &MeshData) {
        self.cumulative_area.clear();
        if self.emit_from != MeshEmitFrom::Triangle {
            return;
        }
        let mut total = 0.0;
        for i in 0..mesh.triangle_count() {
            total += mesh.triangle_area(i);
            self.cumulative_area.push(total);
        }
    }

    fn element_count(&self, mesh: &MeshData) -> usize {
        match self.emit_from {
            MeshEmitFrom::Vertex => mesh.vertices.len(),
            MeshEmitFrom::Edge => mesh.triangle_count() * 3,
            MeshEmitFrom::Triangle => mesh.triangle_count(),
        }
    }

    fn pick(&mut self, mesh: &MeshData, rng: &mut ParticleRng) -> usize {
        let count = self.element_count(mesh);
        if self.sequential {
            let index = self.next_index % count;
            self.next_index = (index + 1) % count;
            return index;
        }
        if self.emit_from == MeshEmitFrom::Triangle {
            let total = self.cumulative_area.last().copied().unwrap_or(0.0);
            if total > 0.0 && self.cumulative_area.len() == count {
                let target = rng.next_f32() * total;
                let i = self.cumulative_area.partition_point(|&a| a <= target);
                return i.min(count - 1);
            }
        }
        rng.index(count)
    }

    /// Spawn point in mesh space. A mesh that vanished after activation yields
    /// the origin so the step can still complete.
    pub fn sample(&mut self, meshes: &dyn MeshSource, rng: &mut ParticleRng) -> ShapeSample {
        let Some(mesh) = meshes.mesh(self.handle) else {
            if !self.missing_reported {
                log::warn!("mesh {} disappeared; emitting from origin", self.handle.0);
                self.missing_reported = true;
            }
            return ShapeSample::at_origin();
        };
        if self.element_count(mesh) == 0 {
            return ShapeSample::at_origin();
        }

        let index = self.pick(mesh, rng);
        match self.element_sample(mesh, index, rng) {
            Some(sample) => sample,
            None => {
                self.report_invalid("element references a missing vertex; emitting from origin");
                ShapeSample::at_origin()
            }
        }
    }

    fn element_sample(
        &self,
        mesh: &MeshData,
        index: usize,
        rng: &mut ParticleRng,
    ) -> Option<ShapeSample> {
        match self.emit_from {
            MeshEmitFrom::Vertex => Some(ShapeSample {
                position: *mesh.vertices.get(index)?,
                normal: mesh.vertex_normal(index).unwrap_or(Vec3::Z),
            }),
            MeshEmitFrom::Edge => {
                let tri = index / 3;
                let corners = mesh.triangle(tri);
                let a = corners[index % 3];
                let b = corners[(index + 1) % 3];
                let (pa, pb) = (*mesh.vertices.get(a)?, *mesh.vertices.get(b)?);
                let normal = match (mesh.vertex_normal(a), mesh.vertex_normal(b)) {
                    (Some(na), Some(nb)) => (na + nb).normalized(),
                    _ => mesh.face_normal(tri),
                };
                Some(ShapeSample {
                    position: (pa + pb) * 0.5,
                    normal,
                })
            }
            MeshEmitFrom::Triangle => {
                let [pa, pb, pc] = mesh.triangle_vertices(index)?;
                let [a, b, c] = mesh.triangle(index);
                let mut u = rng.next_f32();
                let mut v = rng.next_f32();
                if u + v > 1.0 {
                    u = 1.0 - u;
                    v = 1.0 - v;
                }
                let position = pa + (pb - pa) * u + (pc - pa) * v;
                let normal = match (
                    mesh.vertex_normal(a),
                    mesh.vertex_normal(b),
                    mesh.vertex_normal(c),
                ) {
                    (Some(na), Some(nb), Some(nc)) => {
                        (na * (1.0 - u - v) + nb * u + nc * v).normalized()
                    }
                    _ => mesh.face_normal(index),
                };
                Some(ShapeSample { position, normal })
            }
        }
    }
}

fn validate_mesh(handle: MeshHandle, mesh: &MeshData, emit_from: MeshEmitFrom) -> Result<()> {
    if mesh.vertices.is_empty() {
        return Err(EmberError::EmptyMesh(handle.0));
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(EmberError::ConfigurationError(format!(
            "mesh {} index count {} is not a multiple of 3",
            handle.0,
            mesh.indices.len()
        )));
    }
    if let Some(bad) = mesh
        .indices
        .iter()
        .find(|&&i| i as usize >= mesh.vertices.len())
    {
        return Err(EmberError::ConfigurationError(format!(
            "mesh {} references vertex {} but has {} vertices",
            handle.0,
            bad,
            mesh.vertices.len()
        )));
    }
    if !mesh.normals.is_empty() && mesh.normals.len() != mesh.vertices.len() {
        return Err(EmberError::ConfigurationError(format!(
            "mesh {} has {} normals for {} vertices",
            handle.0,
            mesh.normals.len(),
            mesh.vertices.len()
        )));
    }
    if emit_from != MeshEmitFrom::Vertex && mesh.triangle_count() == 0 {
        return Err(EmberError::EmptyMesh(handle.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NoScene, SceneSnapshot};

    /// Two triangles: a big one (area 2) and a small one (area 0.5), both in z = 0
    fn scene() -> SceneSnapshot {
        let mut scene = SceneSnapshot::new();
        scene.insert_mesh(
            MeshHandle(1),
            MeshData {
                vertices: vec![
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(2.0, 0.0, 0.0),
                    Vec3::new(0.0, 2.0, 0.0),
                    Vec3::new(10.0, 0.0, 0.0),
                    Vec3::new(11.0, 0.0, 0.0),
                    Vec3::new(10.0, 1.0, 0.0),
                ],
                normals: Vec::new(),
                indices: vec![0, 1, 2, 3, 4, 5],
            },
        );
        scene
    }

    fn shape(emit_from: MeshEmitFrom, sequential: bool) -> MeshShape {
        MeshShape {
            mesh: Some(MeshHandle(1)),
            emit_from,
            sequential,
        }
    }

    #[test]
    fn unassigned_mesh_fails_at_activation() {
        let err = MeshSampler::activate(&MeshShape::default(), &NoScene).unwrap_err();
        assert!(matches!(err, EmberError::ConfigurationError(_)));
    }

    #[test]
    fn unknown_mesh_fails_at_activation() {
        let err = MeshSampler::activate(&shape(MeshEmitFrom::Vertex, false), &NoScene).unwrap_err();
        assert!(matches!(err, EmberError::MissingMesh(1)));
    }

    #[test]
    fn empty_mesh_fails_at_activation() {
        let mut scene = SceneSnapshot::new();
        scene.insert_mesh(MeshHandle(1), MeshData::default());
        let err = MeshSampler::activate(&shape(MeshEmitFrom::Triangle, false), &scene).unwrap_err();
        assert!(matches!(err, EmberError::EmptyMesh(1)));
    }

    #[test]
    fn sequential_vertices_wrap() {
        let scene = scene();
        let mut sampler =
            MeshSampler::activate(&shape(MeshEmitFrom::Vertex, true), &scene).unwrap();
        let mut rng = ParticleRng::new(1);
        let xs: Vec<f32> = (0..8)
            .map(|_| sampler.sample(&scene, &mut rng).position.x)
            .collect();
        assert_eq!(xs, vec![0.0, 2.0, 0.0, 10.0, 11.0, 10.0, 0.0, 2.0]);
    }

    #[test]
    fn sequential_edges_use_midpoints() {
        let scene = scene();
        let mut sampler = MeshSampler::activate(&shape(MeshEmitFrom::Edge, true), &scene).unwrap();
        let mut rng = ParticleRng::new(1);
        let first = sampler.sample(&scene, &mut rng).position;
        let second = sampler.sample(&scene, &mut rng).position;
        assert_eq!(first, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(second, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn triangles_are_weighted_by_area() {
        let scene = scene();
        let mut sampler =
            MeshSampler::activate(&shape(MeshEmitFrom::Triangle, false), &scene).unwrap();
        let mut rng = ParticleRng::new(17);
        let mut big = 0;
        for _ in 0..2000 {
            let s = sampler.sample(&scene, &mut rng);
            assert_eq!(s.normal, Vec3::Z);
            if s.position.x < 5.0 {
                assert!(s.position.x + s.position.y <= 2.0 + 1e-4);
                big += 1;
            }
        }
        // Expected share 2 / 2.5 = 0.8
        let share = big as f32 / 2000.0;
        assert!((share - 0.8).abs() < 0.05, "share {share}");
    }

    #[test]
    fn vanished_mesh_falls_back_to_origin() {
        let scene = scene();
        let mut sampler =
            MeshSampler::activate(&shape(MeshEmitFrom::Vertex, false), &scene).unwrap();
        let mut rng = ParticleRng::new(1);
        let s = sampler.sample(&NoScene, &mut rng);
        assert_eq!(s.position, Vec3::ZERO);
    }

    #[test]
    fn refresh_follows_deforming_geometry() {
        let scene = scene();
        let mut sampler =
            MeshSampler::activate(&shape(MeshEmitFrom::Triangle, false), &scene).unwrap();

        // Second triangle grows from area 0.5 to area 8
        let mut deformed = SceneSnapshot::new();
        let mut data = scene.mesh(MeshHandle(1)).unwrap().clone();
        data.vertices[4] = Vec3::new(14.0, 0.0, 0.0);
        data.vertices[5] = Vec3::new(10.0, 4.0, 0.0);
        deformed.insert_mesh(MeshHandle(1), data);
        sampler.refresh(&deformed);

        let mut rng = ParticleRng::new(5);
        let big = (0..2000)
            .filter(|_| sampler.sample(&deformed, &mut rng).position.x < 5.0)
            .count();
        // Expected share 2 / 10 = 0.2
        let share = big as f32 / 2000.0;
        assert!((share - 0.2).abs() < 0.05, "share {share}");
    }

    #[test]
    fn inconsistent_refresh_keeps_emitting() {
        let scene = scene();
        let mut sampler =
            MeshSampler::activate(&shape(MeshEmitFrom::Triangle, false), &scene).unwrap();

        let mut broken = SceneSnapshot::new();
        broken.insert_mesh(
            MeshHandle(1),
            MeshData {
                vertices: vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
                normals: Vec::new(),
                indices: vec![0, 1, 2],
            },
        );
        sampler.refresh(&broken);
        let mut rng = ParticleRng::new(3);
        for _ in 0..10 {
            assert_eq!(sampler.sample(&broken, &mut rng).position, Vec3::ZERO);
        }

        // The previous weights survive, so the good mesh still samples normally
        let mut big = 0;
        for _ in 0..2000 {
            if sampler.sample(&scene, &mut rng).position.x < 5.0 {
                big += 1;
            }
        }
        let share = big as f32 / 2000.0;
        assert!((share - 0.8).abs() < 0.05, "share {share}");
    }

    #[test]
    fn inconsistent_edges_fall_back_to_origin() {
        let scene = scene();
        let mut sampler = MeshSampler::activate(&shape(MeshEmitFrom::Edge, true), &scene).unwrap();
        let mut broken = SceneSnapshot::new();
        broken.insert_mesh(
            MeshHandle(1),
            MeshData {
                vertices: vec![Vec3::new(1.0, 1.0, 1.0)],
                normals: Vec::new(),
                indices: vec![0, 5, 9],
            },
        );
        let mut rng = ParticleRng::new(1);
        assert_eq!(sampler.sample(&broken, &mut rng).position, Vec3::ZERO);
    }
}
