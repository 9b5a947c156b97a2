//! One running particle system: emission, spawning, evolution and playback

use crate::config::{ParticleSystemConfig, RenderConfig, SimulationSpace};
use crate::emission::EmissionScheduler;
use crate::evolver::{integrate, EvolveContext, Evolver};
use crate::particle::{OverflowPolicy, Particle, ParticleInstance, ParticlePool, ParticleView};
use crate::rand::{mix_seed, salt, ParticleRng};
use crate::scene::{MeshSource, NoScene, PhysicsQuery, SceneSnapshot, TransformSource};
use crate::shape::EmitterShape;
use ember_core::{Result, SystemId, Transform, Vec3};
use serde::Serialize;

/// Cycle-end slack, so float round-off in the clock cannot stall a loop restart
const CYCLE_EPSILON: f32 = 1e-6;

/// External state a step may read. Taken as an immutable snapshot for the whole step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub dt: f32,
    pub transforms: &'a dyn TransformSource,
    pub meshes: &'a dyn MeshSource,
    pub physics: Option<&'a dyn PhysicsQuery>,
}

impl StepContext<'static> {
    /// A step with no scene behind it
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            transforms: &NoScene,
            meshes: &NoScene,
            physics: None,
        }
    }
}

impl<'a> StepContext<'a> {
    pub fn with_scene(dt: f32, scene: &'a SceneSnapshot) -> Self {
        Self {
            dt,
            transforms: scene,
            meshes: scene,
            physics: None,
        }
    }

    pub fn with_physics(mut self, physics: &'a dyn PhysicsQuery) -> Self {
        self.physics = Some(physics);
        self
    }
}

/// What happened during one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub spawned: u32,
    /// Spawns discarded because the pool was full
    pub dropped: u32,
    /// Live particles recycled to make room
    pub evicted: u32,
    pub expired: u32,
    pub collisions: u32,
    pub live: usize,
}

impl StepReport {
    /// Fold another report into a running total; `live` keeps the latest value
    pub fn accumulate(&mut self, other: &StepReport) {
        self.spawned = self.spawned.saturating_add(other.spawned);
        self.dropped = self.dropped.saturating_add(other.dropped);
        self.evicted = self.evicted.saturating_add(other.evicted);
        self.expired = self.expired.saturating_add(other.expired);
        self.collisions = self.collisions.saturating_add(other.collisions);
        self.live = other.live;
    }
}

/// A configured emitter with its particle pool.
///
/// Every random value is derived from the configuration seed, so two systems
/// built from the same configuration and stepped with the same `dt` sequence
/// produce the same particles.
pub struct ParticleSystem {
    id: SystemId,
    config: ParticleSystemConfig,
    shape: EmitterShape,
    scheduler: EmissionScheduler,
    evolvers: Vec<Evolver>,
    pool: ParticlePool,
    /// Emitter-level randomness: shape sampling and rate draws
    rng: ParticleRng,
    transform: Transform,
    playing: bool,
    /// Start delay still to wait before the first cycle
    delay_remaining: f32,
    /// Emitter time within the current cycle
    cycle_time: f32,
    /// Particles requested by `queue_burst`, spawned on the next step
    pending_burst: u32,
    spawn_index: u32,
    overflow_warned: bool,
}

impl ParticleSystem {
    /// Validate the configuration and resolve its mesh references
    pub fn new(config: ParticleSystemConfig, meshes: &dyn MeshSource) -> Result<Self> {
        config.validate()?;
        let shape = EmitterShape::activate(config.shape.clone(), meshes)?;
        let id = SystemId::new();
        log::debug!(
            "activated particle system {id}: {} slots, {} evolver(s)",
            config.capacity,
            config.evolvers.len()
        );
        Ok(Self {
            id,
            shape,
            scheduler: EmissionScheduler::new(&config.bursts),
            evolvers: config.evolvers.clone(),
            pool: ParticlePool::new(config.capacity),
            rng: ParticleRng::new(config.seed),
            transform: config.transform,
            playing: config.autoplay,
            delay_remaining: config.start_delay,
            cycle_time: 0.0,
            pending_burst: 0,
            spawn_index: 0,
            overflow_warned: false,
            config,
        })
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    pub fn config(&self) -> &ParticleSystemConfig {
        &self.config
    }

    pub fn render(&self) -> &RenderConfig {
        &self.config.render
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Resume emission; a finished non-looping system starts a new cycle
    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        if self.config.duration > 0.0 && self.cycle_time >= self.config.duration - CYCLE_EPSILON {
            self.restart_cycle();
            self.delay_remaining = self.config.start_delay;
        }
        self.playing = true;
    }

    /// Stop emitting. Live particles keep evolving until they expire.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Remove every live particle
    pub fn clear(&mut self) {
        self.pool.clear();
        self.pending_burst = 0;
    }

    /// Spawn `count` extra particles on the next step, playing or not
    pub fn queue_burst(&mut self, count: u32) {
        self.pending_burst = self.pending_burst.saturating_add(count);
    }

    /// Move the emitter. In world space only particles spawned afterwards are affected.
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn live_count(&self) -> usize {
        self.pool.alive_count()
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Spawns that did not fit since the system was created
    pub fn overflow_count(&self) -> u64 {
        self.pool.overflow_count()
    }

    /// Read-only view of every live particle, in unspecified order
    pub fn particles(&self) -> impl Iterator<Item = ParticleView> + '_ {
        self.pool
            .alive_slice()
            .iter()
            .filter(|p| !p.is_expired())
            .map(Particle::view)
    }

    /// Append GPU instances for every live particle
    pub fn pack_instances(&self, out: &mut Vec<ParticleInstance>) {
        self.pool
            .for_each_live(|p| out.push(ParticleInstance::from_particle(p)));
    }

    fn restart_cycle(&mut self) {
        self.cycle_time = 0.0;
        self.scheduler.reset(&self.config.bursts);
        self.shape.reset();
        self.overflow_warned = false;
    }

    fn normalized_time(&self) -> f32 {
        if self.config.duration > 0.0 {
            (self.cycle_time / self.config.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Advance the emitter clock and collect the particles owed for this step.
    fn emit(&mut self, dt: f32) -> u32 {
        if !self.playing {
            return 0;
        }
        let mut remaining = dt;
        if self.delay_remaining > 0.0 {
            let waited = remaining.min(self.delay_remaining);
            self.delay_remaining -= waited;
            remaining -= waited;
            if self.delay_remaining > 0.0 {
                return 0;
            }
        }

        let duration = self.config.duration;
        let mut count: u32 = 0;
        loop {
            let slice = if duration > 0.0 {
                remaining.min(duration - self.cycle_time).max(0.0)
            } else {
                remaining
            };
            self.cycle_time += slice;
            remaining -= slice;
            let t = self.normalized_time();
            let owed = self.scheduler.step(
                slice,
                &self.config.rate,
                &self.config.bursts,
                self.cycle_time,
                t,
                &mut self.rng,
            );
            count = count.saturating_add(owed);

            if duration > 0.0 && self.cycle_time >= duration - CYCLE_EPSILON {
                if !self.config.looping {
                    log::debug!("particle system {} finished its cycle", self.id);
                    self.playing = false;
                    break;
                }
                log::debug!("particle system {} restarting its loop", self.id);
                self.restart_cycle();
            }
            if remaining <= 0.0 {
                break;
            }
        }
        count
    }

    /// Reject `count` spawns at once; the pool is full and keeps its particles.
    fn drop_spawns(&mut self, count: u32, report: &mut StepReport) {
        self.spawn_index = self.spawn_index.wrapping_add(count);
        self.pool.record_overflow(count as u64);
        report.dropped = report.dropped.saturating_add(count);
        Self::warn_overflow(self.id, self.config.capacity, &mut self.overflow_warned);
    }

    fn warn_overflow(id: SystemId, capacity: usize, warned: &mut bool) {
        if !*warned {
            log::warn!("particle system {id} is full ({capacity} slots); dropping spawns");
            *warned = true;
        }
    }

    fn spawn_one(&mut self, delta: f32, meshes: &dyn MeshSource, report: &mut StepReport) {
        let full = self.pool.is_full();
        let policy = self.config.overflow;
        let seed = mix_seed(self.config.seed, self.spawn_index);
        self.spawn_index = self.spawn_index.wrapping_add(1);

        let sample = self.shape.spawn(&mut self.rng, delta, meshes);
        let t = self.normalized_time();
        let cfg = &self.config;

        let Some(p) = self.pool.spawn(policy) else {
            report.dropped = report.dropped.saturating_add(1);
            Self::warn_overflow(self.id, cfg.capacity, &mut self.overflow_warned);
            return;
        };
        if full {
            report.evicted += 1;
        }

        let mut direction = sample.normal;
        if cfg.randomize_direction > 0.0 {
            let random = ParticleRng::for_property(seed, salt::DIRECTION).random_direction();
            direction = direction.lerp(&random, cfg.randomize_direction).normalized();
            if direction == Vec3::ZERO {
                direction = random;
            }
        }
        let mut position = sample.position;
        if cfg.simulation_space == SimulationSpace::World {
            position = self.transform.transform_point(position);
            direction = self.transform.rotate_vector(direction).normalized();
        }

        let speed = cfg.start_speed.evaluate_seeded(t, seed, salt::SPEED);
        let size = cfg.start_size.evaluate_seeded(t, seed, salt::SIZE);
        let color = cfg.start_color.evaluate_seeded(t, seed, salt::COLOR);

        *p = Particle {
            position,
            previous_position: position,
            velocity: direction * speed,
            rotation: cfg.start_rotation.evaluate_seeded(t, seed, salt::ROTATION),
            size,
            start_size: size,
            color,
            start_color: color,
            age: 0.0,
            lifetime: cfg
                .start_lifetime
                .evaluate_seeded(t, seed, salt::LIFETIME)
                .max(0.0),
            seed,
            frame: 0,
        };
        report.spawned += 1;
    }

    /// Run one simulation step. Never fails: every configuration problem was
    /// rejected when the system was built.
    pub fn step(&mut self, ctx: &StepContext<'_>) -> StepReport {
        let dt = if ctx.dt.is_finite() { ctx.dt.max(0.0) } else { 0.0 };
        let mut report = StepReport::default();

        // Snapshot external state before anything moves
        self.shape.prepare(ctx.meshes);
        for evolver in &mut self.evolvers {
            evolver.prepare(ctx.transforms);
        }

        let owed = self
            .emit(dt)
            .saturating_add(std::mem::take(&mut self.pending_burst));
        if owed > 0 {
            let delta = dt / owed as f32;
            for spawned in 0..owed {
                if self.config.overflow == OverflowPolicy::DropNewest && self.pool.is_full() {
                    self.drop_spawns(owed - spawned, &mut report);
                    break;
                }
                self.spawn_one(delta, ctx.meshes, &mut report);
            }
        }

        let particles = self.pool.alive_slice_mut();
        integrate(particles, dt);
        let evolve = EvolveContext {
            dt,
            physics: ctx.physics,
        };
        for evolver in &self.evolvers {
            report.collisions += evolver.apply(particles, &evolve);
        }

        report.expired = self.pool.compact() as u32;
        report.live = self.pool.alive_count();
        log::trace!(
            "particle system {}: +{} -{} live {} (dropped {}, collisions {})",
            self.id,
            report.spawned,
            report.expired,
            report.live,
            report.dropped,
            report.collisions
        );
        report
    }
}
