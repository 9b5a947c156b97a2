//! Per-step transformation stages applied to every live particle.
//!
//! Each step first ages and integrates particles (`position += velocity * dt`),
//! then runs the evolvers strictly in declaration order. Over-lifetime
//! distributions are re-evaluated every step with the particle's seed, so a
//! random range picks one value per particle and keeps it.

use crate::collision::CollisionResolver;
use crate::distribution::Distribution;
use crate::particle::{
    Particle, ParticleRotation, ParticleSize, RotationDistribution, SizeDistribution,
};
use crate::rand::salt;
use crate::scene::{PhysicsQuery, TransformSource};
use ember_core::math::rotate_around_axis;
use ember_core::{Color, EmberError, Result, Vec3};
use serde::{Deserialize, Serialize};

/// Per-step inputs shared by every evolver
#[derive(Clone, Copy)]
pub struct EvolveContext<'a> {
    pub dt: f32,
    /// Physics world for world-mode collisions
    pub physics: Option<&'a dyn PhysicsQuery>,
}

/// Extra velocity, damping and a speed cap
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityOverLifetime {
    /// Velocity added to the particle's motion without changing its stored velocity
    pub linear: Option<Distribution<Vec3>>,
    /// Fraction of velocity removed per second
    pub damping: f32,
    pub speed_limit: Option<Distribution<f32>>,
}

/// Constant acceleration such as gravity or wind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceOverLifetime {
    pub force: Distribution<Vec3>,
}

/// Rotation of particle positions around a center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitOverLifetime {
    /// Degrees per second around each axis
    pub angular_velocity: Distribution<Vec3>,
    #[serde(default)]
    pub center: Vec3,
    /// Units per second away from the center
    #[serde(default)]
    pub radial: Option<Distribution<f32>>,
}

/// Multiplier on the size drawn at spawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeOverLifetime {
    pub size: SizeDistribution,
}

/// Angular velocity in degrees per second
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationOverLifetime {
    pub angular_velocity: RotationDistribution,
}

/// Tint applied on top of the color drawn at spawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorOverLifetime {
    pub color: Distribution<Color>,
}

/// Sprite-sheet frame selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSheetAnimation {
    pub frames_x: u32,
    pub frames_y: u32,
    /// Times the sheet plays over one lifetime
    pub cycles: f32,
    /// Normalized frame (0 = first, 1 = last) over lifetime; overrides `cycles`
    pub frame_over_time: Option<Distribution<f32>>,
    pub start_frame: u32,
}

impl Default for TextureSheetAnimation {
    fn default() -> Self {
        Self {
            frames_x: 1,
            frames_y: 1,
            cycles: 1.0,
            frame_over_time: None,
            start_frame: 0,
        }
    }
}

impl TextureSheetAnimation {
    pub fn frame_count(&self) -> u32 {
        self.frames_x.max(1) * self.frames_y.max(1)
    }

    fn frame_at(&self, t: f32, seed: u32) -> u32 {
        let total = self.frame_count();
        let progress = match &self.frame_over_time {
            Some(curve) => curve.evaluate_seeded(t, seed, salt::FRAME).clamp(0.0, 1.0),
            None => (t * self.cycles).fract(),
        };
        let index = ((progress * total as f32) as u32).min(total - 1);
        (self.start_frame + index) % total
    }
}

/// One stage of the per-step pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evolver {
    Velocity(VelocityOverLifetime),
    Force(ForceOverLifetime),
    Orbit(OrbitOverLifetime),
    Size(SizeOverLifetime),
    Rotation(RotationOverLifetime),
    Color(ColorOverLifetime),
    TextureAnimation(TextureSheetAnimation),
    Collisions(CollisionResolver),
}

impl Evolver {
    pub fn name(&self) -> &'static str {
        match self {
            Evolver::Velocity(_) => "velocity",
            Evolver::Force(_) => "force",
            Evolver::Orbit(_) => "orbit",
            Evolver::Size(_) => "size",
            Evolver::Rotation(_) => "rotation",
            Evolver::Color(_) => "color",
            Evolver::TextureAnimation(_) => "texture_animation",
            Evolver::Collisions(_) => "collisions",
        }
    }

    pub fn validate(&self, index: usize) -> Result<()> {
        let field = format!("evolvers[{index}]");
        match self {
            Evolver::Velocity(v) => {
                if let Some(linear) = &v.linear {
                    linear.validate(&format!("{field}.linear"))?;
                }
                if !v.damping.is_finite() || v.damping < 0.0 {
                    return Err(EmberError::out_of_range(
                        format!("{field}.damping"),
                        0.0,
                        f64::INFINITY,
                        v.damping as f64,
                    ));
                }
                if let Some(limit) = &v.speed_limit {
                    limit.validate(&format!("{field}.speed_limit"))?;
                    if limit.bounds().0 < 0.0 {
                        return Err(EmberError::ConfigurationError(format!(
                            "{field}.speed_limit can go negative"
                        )));
                    }
                }
                Ok(())
            }
            Evolver::Force(f) => f.force.validate(&format!("{field}.force")),
            Evolver::Orbit(o) => {
                o.angular_velocity
                    .validate(&format!("{field}.angular_velocity"))?;
                if !o.center.is_finite() {
                    return Err(EmberError::ConfigurationError(format!(
                        "{field}.center is not finite"
                    )));
                }
                match &o.radial {
                    Some(radial) => radial.validate(&format!("{field}.radial")),
                    None => Ok(()),
                }
            }
            Evolver::Size(s) => s.size.validate(&format!("{field}.size")),
            Evolver::Rotation(r) => r
                .angular_velocity
                .validate(&format!("{field}.angular_velocity")),
            Evolver::Color(c) => c.color.validate(&format!("{field}.color")),
            Evolver::TextureAnimation(a) => {
                if a.frames_x == 0 || a.frames_y == 0 {
                    return Err(EmberError::ConfigurationError(format!(
                        "{field} needs at least one frame in each direction"
                    )));
                }
                if !(a.cycles > 0.0 && a.cycles.is_finite()) {
                    return Err(EmberError::out_of_range(
                        format!("{field}.cycles"),
                        0.0,
                        f64::INFINITY,
                        a.cycles as f64,
                    ));
                }
                if a.start_frame >= a.frame_count() {
                    return Err(EmberError::out_of_range(
                        format!("{field}.start_frame"),
                        0.0,
                        (a.frame_count() - 1) as f64,
                        a.start_frame as f64,
                    ));
                }
                match &a.frame_over_time {
                    Some(curve) => curve.validate(&format!("{field}.frame_over_time")),
                    None => Ok(()),
                }
            }
            Evolver::Collisions(c) => c.validate(&field),
        }
    }

    /// Capture per-step external state. Only collisions read the scene.
    pub fn prepare(&mut self, transforms: &dyn TransformSource) {
        if let Evolver::Collisions(resolver) = self {
            resolver.prepare(transforms);
        }
    }

    /// Apply to every live particle. Returns the number of collisions resolved.
    pub fn apply(&self, particles: &mut [Particle], ctx: &EvolveContext<'_>) -> u32 {
        if let Evolver::Collisions(c) = self {
            return c.apply(particles, ctx.physics);
        }
        let dt = ctx.dt;
        let live = particles.iter_mut().filter(|p| !p.is_expired());
        match self {
            Evolver::Velocity(v) => {
                let damping = (1.0 - v.damping * dt).max(0.0);
                for p in live {
                    let t = p.age_ratio();
                    if let Some(linear) = &v.linear {
                        p.position += linear.evaluate_seeded(t, p.seed, salt::VELOCITY) * dt;
                    }
                    if v.damping > 0.0 {
                        p.velocity *= damping;
                    }
                    if let Some(limit) = &v.speed_limit {
                        let limit = limit.evaluate_seeded(t, p.seed, salt::SPEED_LIMIT);
                        if p.velocity.length() > limit {
                            p.velocity = p.velocity.normalized() * limit;
                        }
                    }
                }
                0
            }
            Evolver::Force(f) => {
                for p in live {
                    let force = f.force.evaluate_seeded(p.age_ratio(), p.seed, salt::FORCE);
                    p.velocity += force * dt;
                }
                0
            }
            Evolver::Orbit(o) => {
                for p in live {
                    let t = p.age_ratio();
                    let omega = o.angular_velocity.evaluate_seeded(t, p.seed, salt::ORBIT);
                    let mut offset = p.position - o.center;
                    let speed = omega.length();
                    if speed > 0.0 {
                        offset = rotate_around_axis(
                            offset,
                            omega / speed,
                            (speed * dt).to_radians(),
                        );
                    }
                    if let Some(radial) = &o.radial {
                        let radial = radial.evaluate_seeded(t, p.seed, salt::ORBIT_RADIAL);
                        offset += offset.normalized() * (radial * dt);
                    }
                    p.position = o.center + offset;
                }
                0
            }
            Evolver::Size(s) => {
                for p in live {
                    let factor = s
                        .size
                        .evaluate_seeded(p.age_ratio(), p.seed, salt::SIZE_OVER_LIFETIME);
                    p.size = match factor {
                        ParticleSize::Uniform(f) => p.start_size.scaled(f),
                        ParticleSize::NonUniform(v) => p.start_size.scaled_per_axis(v),
                    };
                }
                0
            }
            Evolver::Rotation(r) => {
                for p in live {
                    let rate = r.angular_velocity.evaluate_seeded(
                        p.age_ratio(),
                        p.seed,
                        salt::ROTATION_RATE,
                    );
                    let step = match rate {
                        ParticleRotation::Planar(z) => ParticleRotation::Planar(z * dt),
                        ParticleRotation::Euler(v) => ParticleRotation::Euler(v * dt),
                    };
                    p.rotation = p.rotation.advanced(step);
                }
                0
            }
            Evolver::Color(c) => {
                for p in live {
                    let tint =
                        c.color
                            .evaluate_seeded(p.age_ratio(), p.seed, salt::COLOR_OVER_LIFETIME);
                    p.color = p.start_color.modulate(&tint);
                }
                0
            }
            Evolver::TextureAnimation(a) => {
                for p in live {
                    p.frame = a.frame_at(p.age_ratio(), p.seed);
                }
                0
            }
            Evolver::Collisions(_) => 0,
        }
    }
}

/// Age and move every live particle by one step, recording where it started.
/// Particles that reach their lifetime stop here and are not evolved further.
pub fn integrate(particles: &mut [Particle], dt: f32) {
    for p in particles.iter_mut() {
        p.previous_position = p.position;
        p.age = (p.age + dt).min(p.lifetime);
        if !p.is_expired() {
            p.position += p.velocity * dt;
        }
    }
}
