//! Particle system configuration (parsed from TOML) and scene description files

use crate::collision::{Plane, PlaneWorld};
use crate::distribution::Distribution;
use crate::emission::Burst;
use crate::evolver::{Evolver, ForceOverLifetime};
use crate::particle::{OverflowPolicy, RotationDistribution, SizeDistribution};
use crate::scene::{MeshData, MeshHandle, SceneSnapshot, TransformHandle};
use crate::shape::EmitterShapeOptions;
use ember_core::{Color, EmberError, Result, Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Largest pool a single system may request
pub const MAX_CAPACITY: usize = 100_000;

/// Seed used when a configuration does not pick one
pub const DEFAULT_SEED: u32 = 0xDEAD_BEEF;

/// Coordinate space live particles are simulated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationSpace {
    /// Particles move with the emitter
    Local,
    /// Particles are placed in world space at spawn and ignore later emitter motion
    #[default]
    World,
}

/// Blend mode for particle rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Alpha,
    Additive,
}

/// How the renderer draws each particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderMode {
    /// Camera-facing quads
    #[default]
    Billboard,
    /// One instance of a mesh per particle
    Mesh { mesh: MeshHandle },
}

/// Everything the renderer needs besides the particles themselves
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub blend: BlendMode,
    pub texture: String,
}

/// Full description of one particle system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSystemConfig {
    pub seed: u32,
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub simulation_space: SimulationSpace,
    /// Initial emitter transform
    pub transform: Transform,

    /// Length of one emission cycle in seconds; 0 emits forever
    pub duration: f32,
    pub looping: bool,
    pub start_delay: f32,
    pub autoplay: bool,

    /// Particles per second, evaluated over the emission cycle
    pub rate: Distribution<f32>,
    pub bursts: Vec<Burst>,
    pub shape: EmitterShapeOptions,

    pub start_lifetime: Distribution<f32>,
    pub start_speed: Distribution<f32>,
    pub start_size: SizeDistribution,
    pub start_rotation: RotationDistribution,
    pub start_color: Distribution<Color>,
    /// Blend from the shape normal (0) to a uniformly random direction (1)
    pub randomize_direction: f32,

    /// Applied every step in this order
    pub evolvers: Vec<Evolver>,
    pub render: RenderConfig,
}

impl Default for ParticleSystemConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            capacity: 256,
            overflow: OverflowPolicy::DropNewest,
            simulation_space: SimulationSpace::World,
            transform: Transform::IDENTITY,
            duration: 0.0,
            looping: true,
            start_delay: 0.0,
            autoplay: true,
            rate: Distribution::constant(10.0),
            bursts: Vec::new(),
            shape: EmitterShapeOptions::Point,
            start_lifetime: Distribution::random_range(1.0, 2.0),
            start_speed: Distribution::random_range(1.0, 3.0),
            start_size: SizeDistribution::Uniform {
                value: Distribution::constant(0.1),
            },
            start_rotation: RotationDistribution::Planar {
                degrees: Distribution::constant(0.0),
            },
            start_color: Distribution::constant(Color::WHITE),
            randomize_direction: 0.0,
            evolvers: vec![Evolver::Force(ForceOverLifetime {
                force: Distribution::constant(Vec3::new(0.0, -9.81, 0.0)),
            })],
            render: RenderConfig::default(),
        }
    }
}

impl ParticleSystemConfig {
    /// Parse and validate a configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field that could make a running simulation misbehave
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(EmberError::out_of_range(
                "capacity",
                1.0,
                MAX_CAPACITY as f64,
                self.capacity as f64,
            ));
        }
        non_negative("duration", self.duration)?;
        non_negative("start_delay", self.start_delay)?;
        if !(0.0..=1.0).contains(&self.randomize_direction) {
            return Err(EmberError::out_of_range(
                "randomize_direction",
                0.0,
                1.0,
                self.randomize_direction as f64,
            ));
        }

        self.rate.validate("rate")?;
        if self.rate.bounds().0 < 0.0 {
            return Err(EmberError::ConfigurationError(
                "rate can go negative".into(),
            ));
        }
        for (i, burst) in self.bursts.iter().enumerate() {
            burst.validate(i)?;
        }
        self.shape.validate()?;

        self.start_lifetime.validate("start_lifetime")?;
        if self.start_lifetime.bounds().0 <= 0.0 {
            return Err(EmberError::ConfigurationError(
                "start_lifetime must stay above zero".into(),
            ));
        }
        self.start_speed.validate("start_speed")?;
        self.start_size.validate("start_size")?;
        self.start_rotation.validate("start_rotation")?;
        self.start_color.validate("start_color")?;

        for (i, evolver) in self.evolvers.iter().enumerate() {
            evolver.validate(i)?;
        }
        Ok(())
    }
}

fn non_negative(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EmberError::out_of_range(
            field,
            0.0,
            f64::INFINITY,
            value as f64,
        ))
    }
}

/// Inline mesh in a scene description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub handle: MeshHandle,
    pub vertices: Vec<Vec3>,
    #[serde(default)]
    pub normals: Vec<Vec3>,
    #[serde(default)]
    pub indices: Vec<u32>,
}

/// Named scene-object transform in a scene description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformEntry {
    pub handle: TransformHandle,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

/// Static plane in the headless physics world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColliderPlane {
    pub point: Vec3,
    pub normal: Vec3,
}

/// A file holding several named systems plus the scene data they reference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub systems: BTreeMap<String, ParticleSystemConfig>,
    pub meshes: Vec<MeshEntry>,
    pub transforms: Vec<TransformEntry>,
    /// Planes answering world-mode collision queries
    pub colliders: Vec<ColliderPlane>,
}

impl SceneDescription {
    /// Load a scene description from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse without validating the systems; activation reports their errors by name
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let description: Self = toml::from_str(s)?;
        for (i, collider) in description.colliders.iter().enumerate() {
            if !collider.normal.is_finite() || collider.normal.length_squared() == 0.0 {
                return Err(EmberError::ConfigurationError(format!(
                    "colliders[{i}] needs a non-zero normal"
                )));
            }
        }
        Ok(description)
    }

    /// In-memory scene holding the described meshes and transforms
    pub fn scene(&self) -> SceneSnapshot {
        let mut scene = SceneSnapshot::new();
        for mesh in &self.meshes {
            scene.insert_mesh(
                mesh.handle,
                MeshData {
                    vertices: mesh.vertices.clone(),
                    normals: mesh.normals.clone(),
                    indices: mesh.indices.clone(),
                },
            );
        }
        for entry in &self.transforms {
            scene.insert_transform(
                entry.handle,
                Transform::from_position(entry.position)
                    .with_rotation(entry.rotation)
                    .with_scale(entry.scale),
            );
        }
        scene
    }

    /// Physics world made of the described collider planes
    pub fn physics(&self) -> PlaneWorld {
        PlaneWorld::new(
            self.colliders
                .iter()
                .map(|c| Plane::new(c.point, c.normal))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ParticleSize;

    #[test]
    fn default_config_is_sane() {
        let config = ParticleSystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity, 256);
        assert_eq!(config.evolvers.len(), 1);
        let (lo, hi) = config.start_lifetime.bounds();
        assert!(hi >= lo && lo > 0.0);
    }

    #[test]
    fn parse_from_toml() {
        let config = ParticleSystemConfig::from_toml_str(
            r#"
capacity = 500
overflow = "evict_oldest"
simulation_space = "local"
duration = 2
rate = { mode = "constant", value = 50 }
start_color = { mode = "constant", value = [1.0, 0.5, 0.0, 1.0] }

[shape]
type = "cone"
angle = 45.0

[render]
blend = "additive"
mode = { type = "mesh", mesh = 3 }

[[bursts]]
time = 0.5
count = { mode = "random_range", min = 10, max = 20 }

[[evolvers]]
type = "force"
force = { mode = "constant", value = [0, 0, 0] }
"#,
        )
        .unwrap();
        assert_eq!(config.capacity, 500);
        assert_eq!(config.overflow, OverflowPolicy::EvictOldest);
        assert_eq!(config.simulation_space, SimulationSpace::Local);
        assert!((config.duration - 2.0).abs() < 0.01);
        assert_eq!(config.render.blend, BlendMode::Additive);
        assert_eq!(
            config.render.mode,
            RenderMode::Mesh {
                mesh: MeshHandle(3)
            }
        );
        assert_eq!(config.bursts.len(), 1);
        match &config.shape {
            EmitterShapeOptions::Cone(c) => assert!((c.angle - 45.0).abs() < 0.01),
            other => panic!("expected cone, got {other:?}"),
        }
        // Unspecified fields keep their defaults
        assert!(config.looping);
        assert_eq!(
            config.start_size.evaluate_seeded(0.0, 1, 1),
            ParticleSize::Uniform(0.1)
        );
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let cases = [
            "capacity = 0",
            "randomize_direction = 2.0",
            "start_lifetime = { mode = \"constant\", value = 0.0 }",
            "rate = { mode = \"random_range\", min = -1.0, max = 1.0 }",
            "[shape]\ntype = \"box\"\nextents = [0, 1, 1]",
            "[shape]\ntype = \"static_mesh\"",
        ];
        for case in cases {
            let err = ParticleSystemConfig::from_toml_str(case).unwrap_err();
            assert!(err.is_configuration(), "{case}: {err}");
        }
    }

    #[test]
    fn empty_curve_fails_to_parse() {
        let err = ParticleSystemConfig::from_toml_str(
            "rate = { mode = \"curve\", curve = [] }",
        )
        .unwrap_err();
        assert!(matches!(err, EmberError::TomlParseError(_)));
    }

    #[test]
    fn toml_round_trip() {
        let config = ParticleSystemConfig::default();
        let text = config.to_toml_string().unwrap();
        let back = ParticleSystemConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn scene_description_builds_scene() {
        let description = SceneDescription::from_toml_str(
            r#"
[systems.sparks]
capacity = 64

[systems.smoke]
rate = { mode = "constant", value = 2 }

[[meshes]]
handle = 1
vertices = [[0, 0, 0], [1, 0, 0], [0, 1, 0]]
indices = [0, 1, 2]

[[transforms]]
handle = 5
position = [0, 2, 0]

[[colliders]]
point = [0, 0, 0]
normal = [0, 1, 0]
"#,
        )
        .unwrap();
        let names: Vec<_> = description.systems.keys().cloned().collect();
        assert_eq!(names, vec!["smoke".to_string(), "sparks".to_string()]);

        use crate::scene::{MeshSource, PhysicsQuery, TransformSource};
        let scene = description.scene();
        assert!(scene.mesh(MeshHandle(1)).is_some());
        assert_eq!(
            scene.transform(TransformHandle(5)).map(|t| t.position),
            Some(Vec3::new(0.0, 2.0, 0.0))
        );
        let hit = description
            .physics()
            .sweep_sphere(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 2.0, 0.0)
            .unwrap();
        assert!((hit.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn collider_without_normal_is_rejected() {
        let err = SceneDescription::from_toml_str(
            "[[colliders]]\npoint = [0, 0, 0]\nnormal = [0, 0, 0]",
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
