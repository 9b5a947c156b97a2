//! Ember Particles - CPU particle simulation core
//!
//! Provides deterministic, pooled particle simulation with:
//! - Property distributions (constant, random range, curve, random curve range)
//! - Emitter shapes with thickness, arc and sequential emission modes
//! - Continuous emission with a fractional accumulator plus timed bursts
//! - Swap-remove particle pool with a configurable overflow policy
//! - An ordered evolver pipeline ending in plane or world collisions
//! - GPU instance packing for instanced draw calls

pub mod collision;
pub mod config;
pub mod distribution;
pub mod emission;
pub mod evolver;
pub mod mesh;
pub mod particle;
pub mod rand;
pub mod registry;
pub mod scene;
pub mod shape;
pub mod system;

pub use collision::{CollisionMode, CollisionResolver, Plane, PlaneSource, PlaneWorld};
pub use config::{
    BlendMode, ParticleSystemConfig, RenderConfig, RenderMode, SceneDescription, SimulationSpace,
};
pub use distribution::{Curve, Distribution, Keyframe};
pub use emission::{Burst, EmissionScheduler};
pub use evolver::{EvolveContext, Evolver};
pub use particle::{
    OverflowPolicy, Particle, ParticleInstance, ParticlePool, ParticleRotation, ParticleSize,
    ParticleView, RotationDistribution, SizeDistribution,
};
pub use registry::{ParticleDrawData, ParticleRegistry};
pub use scene::{
    MeshData, MeshHandle, MeshSource, NoScene, PhysicsQuery, SceneSnapshot, SweepHit,
    TransformHandle, TransformSource,
};
pub use shape::{EmitterShape, EmitterShapeOptions, ShapeSample};
pub use system::{ParticleSystem, StepContext, StepReport};
