//! Plane and world collision response for live particles

use crate::particle::Particle;
use crate::scene::{PhysicsQuery, SweepHit, TransformHandle, TransformSource};
use ember_core::{EmberError, Result, Vec3};
use serde::{Deserialize, Serialize};

/// Distance a resolved particle is pushed off the surface along the contact normal
pub const COLLISION_EPSILON: f32 = 1e-4;

/// Where a collision plane comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaneSource {
    /// Fixed plane in simulation space
    Explicit { point: Vec3, normal: Vec3 },
    /// Plane through a scene object's position, facing along its -Z axis.
    /// Re-read at the start of every step.
    Transform { handle: TransformHandle },
}

/// What particles collide against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollisionMode {
    Planes { planes: Vec<PlaneSource> },
    /// Swept-sphere queries against the host's physics world
    World,
}

/// A resolved plane with a unit normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub point: Vec3,
    pub normal: Vec3,
}

impl Plane {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalized(),
        }
    }

    pub fn signed_distance(&self, p: Vec3) -> f32 {
        (p - self.point).dot(&self.normal)
    }

    /// Fraction along `from -> to` where a sphere of `radius` first touches the
    /// front face. None when the segment does not cross from the front.
    pub fn segment_hit(&self, from: Vec3, to: Vec3, radius: f32) -> Option<f32> {
        let d0 = self.signed_distance(from) - radius;
        let d1 = self.signed_distance(to) - radius;
        if d0 < 0.0 || d1 >= 0.0 {
            return None;
        }
        Some(d0 / (d0 - d1))
    }
}

/// Collision evolver: tests each particle's motion this step and bounces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionResolver {
    pub mode: CollisionMode,
    /// Collision proxy radius, independent of render size
    #[serde(default)]
    pub radius: f32,
    /// Fraction of the normal velocity kept after a bounce
    #[serde(default = "one")]
    pub restitution: f32,
    /// Fraction of total speed lost per collision
    #[serde(default)]
    pub dampening: f32,
    /// Fraction of the particle's lifetime consumed per collision
    #[serde(default)]
    pub lifetime_loss: f32,
    /// Particles slower than this after a collision die
    #[serde(default)]
    pub kill_speed: f32,
    /// Plane set for the current step
    #[serde(skip)]
    active: Vec<Plane>,
}

fn one() -> f32 {
    1.0
}

/// Where and how a particle touched a surface
#[derive(Debug, Clone, Copy)]
struct Contact {
    /// Particle center at first touch
    center: Vec3,
    normal: Vec3,
}

impl CollisionResolver {
    pub fn planes(planes: Vec<PlaneSource>) -> Self {
        Self::with_mode(CollisionMode::Planes { planes })
    }

    pub fn world() -> Self {
        Self::with_mode(CollisionMode::World)
    }

    fn with_mode(mode: CollisionMode) -> Self {
        Self {
            mode,
            radius: 0.0,
            restitution: 1.0,
            dampening: 0.0,
            lifetime_loss: 0.0,
            kill_speed: 0.0,
            active: Vec::new(),
        }
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        let unit = [
            ("dampening", self.dampening),
            ("lifetime_loss", self.lifetime_loss),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(EmberError::out_of_range(
                    format!("{field}.{name}"),
                    0.0,
                    1.0,
                    value as f64,
                ));
            }
        }
        let non_negative = [
            ("radius", self.radius),
            ("restitution", self.restitution),
            ("kill_speed", self.kill_speed),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(EmberError::out_of_range(
                    format!("{field}.{name}"),
                    0.0,
                    f64::INFINITY,
                    value as f64,
                ));
            }
        }
        if let CollisionMode::Planes { planes } = &self.mode {
            for (i, plane) in planes.iter().enumerate() {
                if let PlaneSource::Explicit { point, normal } = plane {
                    if !point.is_finite() || !normal.is_finite() || normal.length_squared() == 0.0
                    {
                        return Err(EmberError::ConfigurationError(format!(
                            "{field}.planes[{i}] needs a finite point and a non-zero normal"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Snapshot the plane set for this step. Planes bound to transforms that
    /// no longer resolve are skipped.
    pub fn prepare(&mut self, transforms: &dyn TransformSource) {
        self.active.clear();
        let CollisionMode::Planes { planes } = &self.mode else {
            return;
        };
        for source in planes {
            match source {
                PlaneSource::Explicit { point, normal } => {
                    self.active.push(Plane::new(*point, *normal));
                }
                PlaneSource::Transform { handle } => match transforms.transform(*handle) {
                    Some(t) => {
                        let normal = t.forward();
                        if normal != Vec3::ZERO {
                            self.active.push(Plane::new(t.position, normal));
                        }
                    }
                    None => log::trace!("collision plane transform {} not found", handle.0),
                },
            }
        }
    }

    /// Planes captured by the last `prepare`
    pub fn active_planes(&self) -> &[Plane] {
        &self.active
    }

    /// Resolve at most one collision per particle. Returns the number of collisions.
    pub fn apply(&self, particles: &mut [Particle], physics: Option<&dyn PhysicsQuery>) -> u32 {
        let mut collisions = 0;
        for p in particles.iter_mut() {
            if p.is_expired() {
                continue;
            }
            let contact = match self.mode {
                CollisionMode::Planes { .. } => self.first_plane_hit(p),
                CollisionMode::World => physics.and_then(|world| self.world_hit(world, p)),
            };
            if let Some(contact) = contact {
                self.respond(p, contact);
                collisions += 1;
            }
        }
        collisions
    }

    fn first_plane_hit(&self, p: &Particle) -> Option<Contact> {
        let mut best: Option<(f32, &Plane)> = None;
        for plane in &self.active {
            if let Some(t) = plane.segment_hit(p.previous_position, p.position, self.radius) {
                // Strict comparison keeps the earlier plane on ties
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, plane));
                }
            }
        }
        best.map(|(t, plane)| Contact {
            center: p.previous_position.lerp(&p.position, t),
            normal: plane.normal,
        })
    }

    fn world_hit(&self, world: &dyn PhysicsQuery, p: &Particle) -> Option<Contact> {
        let motion = p.position - p.previous_position;
        let distance = motion.length();
        if distance <= 0.0 {
            return None;
        }
        let dir = motion / distance;
        let hit = world.sweep_sphere(p.previous_position, dir, distance, self.radius)?;
        Some(Contact {
            center: p.previous_position + dir * hit.distance,
            normal: hit.normal.normalized(),
        })
    }

    fn respond(&self, p: &mut Particle, contact: Contact) {
        let n = contact.normal;
        let vn = p.velocity.dot(&n);
        if vn < 0.0 {
            let normal_part = n * vn;
            let tangent = p.velocity - normal_part;
            p.velocity = tangent - normal_part * self.restitution;
        }
        p.velocity *= 1.0 - self.dampening;
        p.position = contact.center + n * COLLISION_EPSILON;

        p.age = (p.age + self.lifetime_loss * p.lifetime).min(p.lifetime);
        if self.kill_speed > 0.0 && p.velocity.length() < self.kill_speed {
            p.kill();
        }
    }
}

/// A physics world made only of planes, for hosts without a physics engine
#[derive(Debug, Clone, Default)]
pub struct PlaneWorld {
    planes: Vec<Plane>,
}

impl PlaneWorld {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }
}

impl PhysicsQuery for PlaneWorld {
    fn sweep_sphere(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
    ) -> Option<SweepHit> {
        let end = origin + direction * max_distance;
        let mut best: Option<SweepHit> = None;
        for plane in &self.planes {
            if let Some(t) = plane.segment_hit(origin, end, radius) {
                let distance = t * max_distance;
                if best.map_or(true, |b| distance < b.distance) {
                    let center = origin + direction * distance;
                    best = Some(SweepHit {
                        point: center - plane.normal * radius,
                        normal: plane.normal,
                        distance,
                    });
                }
            }
        }
        best
    }
}
