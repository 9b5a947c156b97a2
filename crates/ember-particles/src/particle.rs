//! Particle records, the fixed-capacity pool, and the render-facing views

use crate::distribution::Distribution;
use crate::rand::ParticleRng;
use bytemuck::{Pod, Zeroable};
use ember_core::{Color, Result, Vec3};
use serde::{Deserialize, Serialize};

/// Particle size: one scalar or a per-axis vector, never both
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleSize {
    Uniform(f32),
    NonUniform(Vec3),
}

impl ParticleSize {
    pub fn as_vec3(&self) -> Vec3 {
        match *self {
            ParticleSize::Uniform(s) => Vec3::splat(s),
            ParticleSize::NonUniform(v) => v,
        }
    }

    /// Scale by a uniform factor, keeping the variant
    pub fn scaled(&self, factor: f32) -> Self {
        match *self {
            ParticleSize::Uniform(s) => ParticleSize::Uniform(s * factor),
            ParticleSize::NonUniform(v) => ParticleSize::NonUniform(v * factor),
        }
    }

    /// Scale per axis; a uniform size becomes non-uniform
    pub fn scaled_per_axis(&self, factor: Vec3) -> Self {
        ParticleSize::NonUniform(self.as_vec3().scale(&factor))
    }
}

/// Particle rotation in degrees: around local Z, or full Euler angles
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleRotation {
    Planar(f32),
    Euler(Vec3),
}

impl ParticleRotation {
    pub fn as_euler(&self) -> Vec3 {
        match *self {
            ParticleRotation::Planar(z) => Vec3::new(0.0, 0.0, z),
            ParticleRotation::Euler(v) => v,
        }
    }

    /// Add an angular step; a planar rotation stays planar only under a planar step
    pub fn advanced(&self, step: ParticleRotation) -> Self {
        match (*self, step) {
            (ParticleRotation::Planar(a), ParticleRotation::Planar(b)) => {
                ParticleRotation::Planar(a + b)
            }
            (ParticleRotation::Euler(a), ParticleRotation::Planar(b)) => {
                ParticleRotation::Euler(Vec3::new(a.x, a.y, a.z + b))
            }
            (current, ParticleRotation::Euler(b)) => {
                ParticleRotation::Euler(current.as_euler() + b)
            }
        }
    }
}

/// Size source: one scalar distribution or one per axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeDistribution {
    Uniform { value: Distribution<f32> },
    NonUniform { value: Distribution<Vec3> },
}

impl SizeDistribution {
    pub fn evaluate(&self, t: f32, rng: &mut ParticleRng) -> ParticleSize {
        match self {
            SizeDistribution::Uniform { value } => ParticleSize::Uniform(value.evaluate(t, rng)),
            SizeDistribution::NonUniform { value } => {
                ParticleSize::NonUniform(value.evaluate(t, rng))
            }
        }
    }

    pub fn evaluate_seeded(&self, t: f32, seed: u32, salt: u32) -> ParticleSize {
        self.evaluate(t, &mut ParticleRng::for_property(seed, salt))
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        match self {
            SizeDistribution::Uniform { value } => value.validate(field),
            SizeDistribution::NonUniform { value } => value.validate(field),
        }
    }
}

/// Rotation source in degrees: around Z only, or full Euler angles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RotationDistribution {
    Planar { degrees: Distribution<f32> },
    Euler { degrees: Distribution<Vec3> },
}

impl RotationDistribution {
    pub fn evaluate(&self, t: f32, rng: &mut ParticleRng) -> ParticleRotation {
        match self {
            RotationDistribution::Planar { degrees } => {
                ParticleRotation::Planar(degrees.evaluate(t, rng))
            }
            RotationDistribution::Euler { degrees } => {
                ParticleRotation::Euler(degrees.evaluate(t, rng))
            }
        }
    }

    pub fn evaluate_seeded(&self, t: f32, seed: u32, salt: u32) -> ParticleRotation {
        self.evaluate(t, &mut ParticleRng::for_property(seed, salt))
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        match self {
            RotationDistribution::Planar { degrees } => degrees.validate(field),
            RotationDistribution::Euler { degrees } => degrees.validate(field),
        }
    }
}

/// CPU-side particle state
#[derive(Debug, Clone)]
pub struct Particle {
    pub position: Vec3,
    /// Position at the start of the current step, the origin of the collision segment
    pub previous_position: Vec3,
    pub velocity: Vec3,
    pub rotation: ParticleRotation,
    pub size: ParticleSize,
    /// Size drawn at spawn; size-over-lifetime scales this
    pub start_size: ParticleSize,
    pub color: Color,
    /// Color drawn at spawn; color-over-lifetime tints this
    pub start_color: Color,
    pub age: f32,
    pub lifetime: f32,
    /// Seed for every random value this particle re-derives
    pub seed: u32,
    pub frame: u32,
}

impl Particle {
    pub fn dead() -> Self {
        Self {
            position: Vec3::ZERO,
            previous_position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            rotation: ParticleRotation::Planar(0.0),
            size: ParticleSize::Uniform(0.0),
            start_size: ParticleSize::Uniform(0.0),
            color: Color::TRANSPARENT,
            start_color: Color::TRANSPARENT,
            age: 0.0,
            lifetime: 0.0,
            seed: 0,
            frame: 0,
        }
    }

    /// Normalized age in [0, 1]
    pub fn age_ratio(&self) -> f32 {
        if self.lifetime <= 0.0 {
            1.0
        } else {
            (self.age / self.lifetime).min(1.0)
        }
    }

    pub fn is_expired(&self) -> bool {
        self.age >= self.lifetime
    }

    /// Mark for removal at the next compaction
    pub fn kill(&mut self) {
        self.age = self.lifetime;
    }

    pub fn view(&self) -> ParticleView {
        ParticleView {
            position: self.position,
            size: self.size.as_vec3(),
            rotation: self.rotation.as_euler(),
            color: self.color,
            age_fraction: self.age_ratio(),
            frame: self.frame,
        }
    }
}

/// What the renderer sees of a live particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleView {
    pub position: Vec3,
    pub size: Vec3,
    /// Euler degrees; billboards use only `z`
    pub rotation: Vec3,
    pub color: Color,
    pub age_fraction: f32,
    pub frame: u32,
}

/// GPU instance data, four vec4 rows (64 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ParticleInstance {
    /// xyz = position, w = age fraction
    pub position_age: [f32; 4],
    /// xyz = size, w = sprite frame
    pub size_frame: [f32; 4],
    /// xyz = Euler rotation in degrees, w = unused
    pub rotation: [f32; 4],
    pub color: [f32; 4],
}

impl ParticleInstance {
    pub fn from_particle(p: &Particle) -> Self {
        let view = p.view();
        Self {
            position_age: [
                view.position.x,
                view.position.y,
                view.position.z,
                view.age_fraction,
            ],
            size_frame: [view.size.x, view.size.y, view.size.z, view.frame as f32],
            rotation: [view.rotation.x, view.rotation.y, view.rotation.z, 0.0],
            color: view.color.to_array(),
        }
    }
}

/// What to do when a spawn finds the pool full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the new particle
    #[default]
    DropNewest,
    /// Recycle the slot of the oldest live particle
    EvictOldest,
}

/// Swap-remove pool for O(1) particle kill and contiguous alive iteration.
///
/// Slot indices are only stable until the next release or compaction.
pub struct ParticlePool {
    particles: Vec<Particle>,
    alive_count: usize,
    overflow_count: u64,
}

impl ParticlePool {
    pub fn new(capacity: usize) -> Self {
        let mut particles = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            particles.push(Particle::dead());
        }
        Self {
            particles,
            alive_count: 0,
            overflow_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn is_full(&self) -> bool {
        self.alive_count >= self.particles.len()
    }

    /// Spawns that did not fit, dropped or evicting, since the pool was created
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Count spawns rejected without attempting an allocation
    pub fn record_overflow(&mut self, count: u64) {
        self.overflow_count = self.overflow_count.saturating_add(count);
    }

    /// Claim a free slot. Returns None (and counts the overflow) when full.
    pub fn allocate(&mut self) -> Option<usize> {
        if self.is_full() {
            self.overflow_count += 1;
            return None;
        }
        let idx = self.alive_count;
        self.alive_count += 1;
        Some(idx)
    }

    /// Claim a slot according to `policy`, returning it for initialization.
    pub fn spawn(&mut self, policy: OverflowPolicy) -> Option<&mut Particle> {
        let idx = match (self.allocate(), policy) {
            (Some(idx), _) => idx,
            (None, OverflowPolicy::DropNewest) => return None,
            (None, OverflowPolicy::EvictOldest) => self.oldest()?,
        };
        Some(&mut self.particles[idx])
    }

    fn oldest(&self) -> Option<usize> {
        self.alive_slice()
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.age.total_cmp(&b.age))
            .map(|(i, _)| i)
    }

    /// Free a slot. The last live particle moves into it.
    pub fn release(&mut self, idx: usize) {
        if idx >= self.alive_count {
            return;
        }
        self.alive_count -= 1;
        self.particles.swap(idx, self.alive_count);
    }

    /// Remove expired particles via swap-remove. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.alive_count;
        let mut i = 0;
        while i < self.alive_count {
            if self.particles[i].is_expired() {
                self.release(i);
                // Keep i: the swapped-in particle still needs checking
            } else {
                i += 1;
            }
        }
        before - self.alive_count
    }

    pub fn clear(&mut self) {
        self.alive_count = 0;
    }

    /// Visit live particles in slot order (not stable across steps)
    pub fn for_each_live(&self, mut f: impl FnMut(&Particle)) {
        for p in self.alive_slice() {
            if !p.is_expired() {
                f(p);
            }
        }
    }

    /// Access alive particles slice for reading (first `alive_count` elements)
    pub fn alive_slice(&self) -> &[Particle] {
        &self.particles[..self.alive_count]
    }

    /// Access alive particles mutably
    pub fn alive_slice_mut(&mut self) -> &mut [Particle] {
        &mut self.particles[..self.alive_count]
    }
}
