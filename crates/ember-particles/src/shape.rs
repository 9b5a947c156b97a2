//! Emission shapes: where a new particle appears and which way it faces.
//!
//! Every shape produces a position and a normal in shape-local space. The
//! owning system transforms them into particle space and uses the normal as
//! the initial direction of travel.

use crate::mesh::{MeshSampler, MeshShape};
use crate::rand::ParticleRng;
use crate::scene::MeshSource;
use ember_core::{EmberError, Result, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Candidate draws before a random spawn gives up on honoring `interval`
const MAX_INTERVAL_RETRIES: usize = 8;

/// Spawn location produced by a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSample {
    pub position: Vec3,
    pub normal: Vec3,
}

impl ShapeSample {
    pub fn at_origin() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::Z,
        }
    }
}

/// How the selection parameter (angle along the arc, or position along a
/// line) moves between consecutive spawns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMode {
    /// Independent draw per spawn
    #[default]
    Random,
    /// Sweep forward, wrapping at the end
    Loop,
    /// Sweep forward and back, reflecting at both ends
    PingPong,
}

/// Sequencing options for arc and line shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeEmission {
    pub mode: EmissionMode,
    /// Full sweeps per second for `Loop` and `PingPong`
    pub speed: f32,
    /// Minimum parametric distance (fraction of the arc or line) between
    /// consecutive spawns
    pub interval: f32,
}

impl Default for ShapeEmission {
    fn default() -> Self {
        Self {
            mode: EmissionMode::Random,
            speed: 1.0,
            interval: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxShape {
    /// Half extents along each axis
    pub extents: Vec3,
    pub thickness: f32,
}

impl Default for BoxShape {
    fn default() -> Self {
        Self {
            extents: Vec3::splat(0.5),
            thickness: 1.0,
        }
    }
}

/// Sphere and hemisphere options. Hemispheres open toward local +Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereShape {
    pub radius: f32,
    pub thickness: f32,
    /// Degrees of azimuth around local Z that may emit
    pub arc: f32,
    pub emission: ShapeEmission,
}

impl Default for SphereShape {
    fn default() -> Self {
        Self {
            radius: 0.5,
            thickness: 1.0,
            arc: 360.0,
            emission: ShapeEmission::default(),
        }
    }
}

/// Where in a cone particles start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConeEmitFrom {
    #[default]
    Base,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConeShape {
    /// Half-angle in degrees between the cone axis (+Z) and its surface
    pub angle: f32,
    pub radius: f32,
    /// Height of the volume used by `ConeEmitFrom::Volume`
    pub length: f32,
    pub thickness: f32,
    pub arc: f32,
    pub emit_from: ConeEmitFrom,
    pub emission: ShapeEmission,
}

impl Default for ConeShape {
    fn default() -> Self {
        Self {
            angle: 25.0,
            radius: 0.5,
            length: 1.0,
            thickness: 1.0,
            arc: 360.0,
            emit_from: ConeEmitFrom::Base,
            emission: ShapeEmission::default(),
        }
    }
}

/// Disc in the local XY plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleShape {
    pub radius: f32,
    pub thickness: f32,
    pub arc: f32,
    pub emission: ShapeEmission,
}

impl Default for CircleShape {
    fn default() -> Self {
        Self {
            radius: 0.5,
            thickness: 1.0,
            arc: 360.0,
            emission: ShapeEmission::default(),
        }
    }
}

/// Rectangle in the local XY plane, centered on the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectangleShape {
    /// Full width and height
    pub size: Vec2,
}

impl Default for RectangleShape {
    fn default() -> Self {
        Self { size: Vec2::ONE }
    }
}

/// Segment along local X, centered on the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineShape {
    pub length: f32,
    pub emission: ShapeEmission,
}

impl Default for LineShape {
    fn default() -> Self {
        Self {
            length: 1.0,
            emission: ShapeEmission::default(),
        }
    }
}

/// Emission geometry, one variant per shape kind
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmitterShapeOptions {
    #[default]
    Point,
    Box(BoxShape),
    Sphere(SphereShape),
    Hemisphere(SphereShape),
    Cone(ConeShape),
    Circle(CircleShape),
    Rectangle(RectangleShape),
    Line(LineShape),
    StaticMesh(MeshShape),
    SkinnedMesh(MeshShape),
}

impl EmitterShapeOptions {
    /// Check numeric options. Whether the mesh resolves is checked at activation.
    pub fn validate(&self) -> Result<()> {
        match self {
            EmitterShapeOptions::Point => Ok(()),
            EmitterShapeOptions::StaticMesh(m) | EmitterShapeOptions::SkinnedMesh(m) => {
                if m.mesh.is_none() {
                    return Err(EmberError::ConfigurationError(
                        "mesh shape has no mesh assigned".into(),
                    ));
                }
                Ok(())
            }
            EmitterShapeOptions::Box(b) => {
                for (axis, extent) in [("x", b.extents.x), ("y", b.extents.y), ("z", b.extents.z)] {
                    positive(&format!("box.extents.{axis}"), extent)?;
                }
                unit_range("box.thickness", b.thickness)
            }
            EmitterShapeOptions::Sphere(s) | EmitterShapeOptions::Hemisphere(s) => {
                positive("sphere.radius", s.radius)?;
                unit_range("sphere.thickness", s.thickness)?;
                arc_range("sphere.arc", s.arc)?;
                validate_emission("sphere.emission", &s.emission)
            }
            EmitterShapeOptions::Cone(c) => {
                if !(0.0..90.0).contains(&c.angle) {
                    return Err(EmberError::out_of_range("cone.angle", 0.0, 90.0, c.angle as f64));
                }
                positive("cone.radius", c.radius)?;
                if !(c.length >= 0.0 && c.length.is_finite()) {
                    return Err(EmberError::out_of_range(
                        "cone.length",
                        0.0,
                        f64::MAX,
                        c.length as f64,
                    ));
                }
                unit_range("cone.thickness", c.thickness)?;
                arc_range("cone.arc", c.arc)?;
                validate_emission("cone.emission", &c.emission)
            }
            EmitterShapeOptions::Circle(c) => {
                positive("circle.radius", c.radius)?;
                unit_range("circle.thickness", c.thickness)?;
                arc_range("circle.arc", c.arc)?;
                validate_emission("circle.emission", &c.emission)
            }
            EmitterShapeOptions::Rectangle(r) => {
                positive("rectangle.size.x", r.size.x)?;
                positive("rectangle.size.y", r.size.y)
            }
            EmitterShapeOptions::Line(l) => {
                positive("line.length", l.length)?;
                validate_emission("line.emission", &l.emission)
            }
        }
    }

    /// Sequencing options, and whether the parameter wraps around a full circle
    fn emission(&self) -> Option<(&ShapeEmission, bool)> {
        match self {
            EmitterShapeOptions::Sphere(s) | EmitterShapeOptions::Hemisphere(s) => {
                Some((&s.emission, s.arc >= 360.0))
            }
            EmitterShapeOptions::Cone(c) => Some((&c.emission, c.arc >= 360.0)),
            EmitterShapeOptions::Circle(c) => Some((&c.emission, c.arc >= 360.0)),
            EmitterShapeOptions::Line(l) => Some((&l.emission, false)),
            _ => None,
        }
    }
}

fn positive(field: &str, value: f32) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(EmberError::ConfigurationError(format!(
            "{field} must be positive, got {value}"
        )))
    }
}

fn unit_range(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EmberError::out_of_range(field, 0.0, 1.0, value as f64))
    }
}

fn arc_range(field: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 360.0 {
        Ok(())
    } else {
        Err(EmberError::out_of_range(field, 0.0, 360.0, value as f64))
    }
}

fn validate_emission(field: &str, emission: &ShapeEmission) -> Result<()> {
    if !(emission.speed >= 0.0 && emission.speed.is_finite()) {
        return Err(EmberError::ConfigurationError(format!(
            "{field}.speed must be non-negative, got {}",
            emission.speed
        )));
    }
    if !(0.0..1.0).contains(&emission.interval) {
        return Err(EmberError::out_of_range(
            &format!("{field}.interval"),
            0.0,
            1.0,
            emission.interval as f64,
        ));
    }
    Ok(())
}

/// Selection-parameter state for one shape instance, advanced once per spawn
#[derive(Debug, Clone, Default)]
struct ShapeCursor {
    /// Unbounded sweep phase; Loop wraps it into [0,1), PingPong folds it
    phase: f32,
    last: Option<f32>,
}

impl ShapeCursor {
    fn next(
        &mut self,
        emission: &ShapeEmission,
        delta: f32,
        wraps: bool,
        rng: &mut ParticleRng,
    ) -> f32 {
        let param = match emission.mode {
            EmissionMode::Random => {
                let mut candidate = rng.next_f32();
                if let (Some(last), true) = (self.last, emission.interval > 0.0) {
                    for _ in 0..MAX_INTERVAL_RETRIES {
                        if parametric_distance(candidate, last, wraps) >= emission.interval {
                            break;
                        }
                        candidate = rng.next_f32();
                    }
                }
                candidate
            }
            EmissionMode::Loop | EmissionMode::PingPong => {
                let mut step = emission.speed * delta.max(0.0);
                if self.last.is_some() {
                    step = step.max(emission.interval);
                }
                self.phase = (self.phase + step).rem_euclid(2.0);
                if emission.mode == EmissionMode::Loop {
                    self.phase.rem_euclid(1.0)
                } else {
                    1.0 - (self.phase - 1.0).abs()
                }
            }
        };
        self.last = Some(param);
        param
    }
}

/// Distance between two selection parameters in [0, 1); on a closed arc 0.99 and 0.01 are neighbors
fn parametric_distance(a: f32, b: f32, wraps: bool) -> f32 {
    let d = (a - b).abs();
    if wraps {
        d.min(1.0 - d)
    } else {
        d
    }
}

/// A shape instance with its mutable emission state.
///
/// The cursor and mesh sampler are advanced only by the owning system while
/// it spawns, never while particles are being evolved.
#[derive(Debug, Clone)]
pub struct EmitterShape {
    options: EmitterShapeOptions,
    cursor: ShapeCursor,
    mesh: Option<MeshSampler>,
}

impl EmitterShape {
    /// Validate options and resolve mesh references.
    pub fn activate(options: EmitterShapeOptions, meshes: &dyn MeshSource) -> Result<Self> {
        options.validate()?;
        let mesh = match &options {
            EmitterShapeOptions::StaticMesh(m) | EmitterShapeOptions::SkinnedMesh(m) => {
                Some(MeshSampler::activate(m, meshes)?)
            }
            _ => None,
        };
        Ok(Self {
            options,
            cursor: ShapeCursor::default(),
            mesh,
        })
    }

    pub fn options(&self) -> &EmitterShapeOptions {
        &self.options
    }

    /// Per-step refresh before any spawn: skinned meshes rebuild their area table.
    pub fn prepare(&mut self, meshes: &dyn MeshSource) {
        if let (EmitterShapeOptions::SkinnedMesh(_), Some(sampler)) =
            (&self.options, &mut self.mesh)
        {
            sampler.refresh(meshes);
        }
    }

    /// Rewind sequential state (loop restart)
    pub fn reset(&mut self) {
        self.cursor = ShapeCursor::default();
        if let Some(sampler) = &mut self.mesh {
            sampler.reset();
        }
    }

    /// Produce one spawn point. `delta` is the emitter time since the previous spawn.
    pub fn spawn(
        &mut self,
        rng: &mut ParticleRng,
        delta: f32,
        meshes: &dyn MeshSource,
    ) -> ShapeSample {
        let param = match self.options.emission() {
            Some((emission, wraps)) => self.cursor.next(emission, delta, wraps, rng),
            None => 0.0,
        };

        match &self.options {
            EmitterShapeOptions::Point => ShapeSample::at_origin(),
            EmitterShapeOptions::Box(b) => sample_box(b, rng),
            EmitterShapeOptions::Sphere(s) => sample_sphere(s, param, false, rng),
            EmitterShapeOptions::Hemisphere(s) => sample_sphere(s, param, true, rng),
            EmitterShapeOptions::Cone(c) => sample_cone(c, param, rng),
            EmitterShapeOptions::Circle(c) => {
                let (x, y, _) = disc_point(c.radius, c.thickness, c.arc, param, rng);
                ShapeSample {
                    position: Vec3::new(x, y, 0.0),
                    normal: Vec3::Z,
                }
            }
            EmitterShapeOptions::Rectangle(r) => ShapeSample {
                position: Vec3::new(
                    (rng.next_f32() - 0.5) * r.size.x,
                    (rng.next_f32() - 0.5) * r.size.y,
                    0.0,
                ),
                normal: Vec3::Z,
            },
            // A line has no meaningful normal; +Z keeps the direction deterministic
            EmitterShapeOptions::Line(l) => ShapeSample {
                position: Vec3::new((param - 0.5) * l.length, 0.0, 0.0),
                normal: Vec3::Z,
            },
            EmitterShapeOptions::StaticMesh(_) | EmitterShapeOptions::SkinnedMesh(_) => {
                match &mut self.mesh {
                    Some(sampler) => sampler.sample(meshes, rng),
                    None => ShapeSample::at_origin(),
                }
            }
        }
    }
}

/// Fraction of the radius for a point drawn uniformly between the inner and
/// outer radius of a shell. `dims` is 2 for discs and 3 for balls.
fn shell_radius(thickness: f32, dims: i32, rng: &mut ParticleRng) -> f32 {
    let inner = (1.0 - thickness).powi(dims);
    let u = inner + (1.0 - inner) * rng.next_f32();
    u.powf(1.0 / dims as f32)
}

/// Point on a disc restricted to `arc` degrees: (x, y, radial fraction)
fn disc_point(
    radius: f32,
    thickness: f32,
    arc: f32,
    param: f32,
    rng: &mut ParticleRng,
) -> (f32, f32, f32) {
    let fraction = shell_radius(thickness, 2, rng);
    let angle = param * arc.to_radians();
    let r = radius * fraction;
    (r * angle.cos(), r * angle.sin(), fraction)
}

fn sample_box(b: &BoxShape, rng: &mut ParticleRng) -> ShapeSample {
    let e = b.extents;
    if b.thickness >= 1.0 {
        return ShapeSample {
            position: Vec3::new(
                rng.range(-e.x, e.x),
                rng.range(-e.y, e.y),
                rng.range(-e.z, e.z),
            ),
            normal: Vec3::Z,
        };
    }

    // Pick a face weighted by its area, then sink inward by up to `thickness`
    let areas = [e.y * e.z, e.x * e.z, e.x * e.y];
    let total = 2.0 * (areas[0] + areas[1] + areas[2]);
    let mut target = rng.next_f32() * total;
    let mut face = 5;
    for i in 0..6 {
        let area = areas[i / 2];
        if target < area {
            face = i;
            break;
        }
        target -= area;
    }
    let axis = face / 2;
    let sign = if face % 2 == 0 { 1.0 } else { -1.0 };

    let mut p = [
        rng.range(-e.x, e.x),
        rng.range(-e.y, e.y),
        rng.range(-e.z, e.z),
    ];
    let extent = e.to_array()[axis];
    p[axis] = sign * extent * (1.0 - b.thickness * rng.next_f32());

    ShapeSample {
        position: Vec3::from_array(p),
        normal: Vec3::Z,
    }
}

fn sample_sphere(
    s: &SphereShape,
    param: f32,
    hemisphere: bool,
    rng: &mut ParticleRng,
) -> ShapeSample {
    // Uniform z with uniform azimuth is uniform on the sphere surface
    let z = if hemisphere {
        rng.next_f32()
    } else {
        rng.range(-1.0, 1.0)
    };
    let ring = (1.0 - z * z).max(0.0).sqrt();
    let azimuth = if s.arc >= 360.0 && s.emission.mode == EmissionMode::Random {
        rng.next_f32() * TAU
    } else {
        param * s.arc.to_radians()
    };
    let dir = Vec3::new(ring * azimuth.cos(), ring * azimuth.sin(), z);
    let r = s.radius * shell_radius(s.thickness, 3, rng);
    ShapeSample {
        position: dir * r,
        normal: dir,
    }
}

fn sample_cone(c: &ConeShape, param: f32, rng: &mut ParticleRng) -> ShapeSample {
    let (x, y, fraction) = disc_point(c.radius, c.thickness, c.arc, param, rng);
    let azimuth = param * c.arc.to_radians();
    // Direction tilts outward in proportion to the distance from the axis
    let tilt = c.angle.to_radians() * fraction;
    let dir = Vec3::new(
        tilt.sin() * azimuth.cos(),
        tilt.sin() * azimuth.sin(),
        tilt.cos(),
    );
    let mut position = Vec3::new(x, y, 0.0);
    if c.emit_from == ConeEmitFrom::Volume {
        position += dir * (c.length * rng.next_f32());
    }
    ShapeSample {
        position,
        normal: dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NoScene;

    fn activate(options: EmitterShapeOptions) -> EmitterShape {
        EmitterShape::activate(options, &NoScene).unwrap()
    }

    #[test]
    fn box_volume_stays_inside() {
        let mut shape = activate(EmitterShapeOptions::Box(BoxShape {
            extents: Vec3::new(1.0, 2.0, 3.0),
            thickness: 1.0,
        }));
        let mut rng = ParticleRng::new(1);
        for _ in 0..500 {
            let s = shape.spawn(&mut rng, 0.0, &NoScene);
            assert!(
                s.position.x.abs() <= 1.0 && s.position.y.abs() <= 2.0 && s.position.z.abs() <= 3.0
            );
            assert_eq!(s.normal, Vec3::Z);
        }
    }

    #[test]
    fn box_surface_lies_on_a_face() {
        let e = Vec3::new(1.0, 2.0, 3.0);
        let mut shape = activate(EmitterShapeOptions::Box(BoxShape {
            extents: e,
            thickness: 0.0,
        }));
        let mut rng = ParticleRng::new(2);
        for _ in 0..500 {
            let p = shape.spawn(&mut rng, 0.0, &NoScene).position;
            let on_face = (p.x.abs() - e.x).abs() < 1e-5
                || (p.y.abs() - e.y).abs() < 1e-5
                || (p.z.abs() - e.z).abs() < 1e-5;
            assert!(on_face, "{p:?} not on surface");
        }
    }

    #[test]
    fn sphere_surface_and_volume() {
        let mut surface = activate(EmitterShapeOptions::Sphere(SphereShape {
            radius: 2.0,
            thickness: 0.0,
            ..Default::default()
        }));
        let mut volume = activate(EmitterShapeOptions::Sphere(SphereShape {
            radius: 2.0,
            thickness: 1.0,
            ..Default::default()
        }));
        let mut rng = ParticleRng::new(3);
        let mut inside = 0;
        for _ in 0..500 {
            let s = surface.spawn(&mut rng, 0.0, &NoScene);
            assert!((s.position.length() - 2.0).abs() < 1e-4);
            assert!((s.normal - s.position.normalized()).length() < 1e-4);
            let v = volume.spawn(&mut rng, 0.0, &NoScene);
            assert!(v.position.length() <= 2.0 + 1e-4);
            if v.position.length() < 1.0 {
                inside += 1;
            }
        }
        // Inner half-radius ball holds 1/8 of the volume
        assert!(inside > 20 && inside < 110, "inside {inside}");
    }

    #[test]
    fn hemisphere_points_up_z() {
        let mut shape = activate(EmitterShapeOptions::Hemisphere(SphereShape::default()));
        let mut rng = ParticleRng::new(4);
        for _ in 0..500 {
            let s = shape.spawn(&mut rng, 0.0, &NoScene);
            assert!(s.position.z >= 0.0);
            assert!(s.normal.z >= 0.0);
        }
    }

    #[test]
    fn circle_respects_arc() {
        let mut shape = activate(EmitterShapeOptions::Circle(CircleShape {
            radius: 1.0,
            thickness: 0.0,
            arc: 90.0,
            emission: ShapeEmission::default(),
        }));
        let mut rng = ParticleRng::new(5);
        for _ in 0..500 {
            let s = shape.spawn(&mut rng, 0.0, &NoScene);
            assert!(s.position.x >= -1e-5 && s.position.y >= -1e-5);
            assert!((s.position.length() - 1.0).abs() < 1e-4);
            assert_eq!(s.normal, Vec3::Z);
        }
    }

    #[test]
    fn loop_mode_sweeps_and_wraps() {
        let mut shape = activate(EmitterShapeOptions::Line(LineShape {
            length: 4.0,
            emission: ShapeEmission {
                mode: EmissionMode::Loop,
                speed: 1.0,
                interval: 0.0,
            },
        }));
        let mut rng = ParticleRng::new(6);
        let xs: Vec<f32> = (0..5)
            .map(|_| shape.spawn(&mut rng, 0.25, &NoScene).position.x)
            .collect();
        let expected = [-1.0, 0.0, 1.0, -2.0, -1.0];
        for (x, e) in xs.iter().zip(expected) {
            assert!((x - e).abs() < 1e-4, "{xs:?}");
        }
    }

    #[test]
    fn ping_pong_reflects() {
        let mut shape = activate(EmitterShapeOptions::Line(LineShape {
            length: 1.0,
            emission: ShapeEmission {
                mode: EmissionMode::PingPong,
                speed: 1.0,
                interval: 0.0,
            },
        }));
        let mut rng = ParticleRng::new(7);
        let params: Vec<f32> = (0..6)
            .map(|_| shape.spawn(&mut rng, 0.4, &NoScene).position.x + 0.5)
            .collect();
        let expected = [0.4, 0.8, 0.8, 0.4, 0.0, 0.4];
        for (p, e) in params.iter().zip(expected) {
            assert!((p - e).abs() < 1e-4, "{params:?}");
        }
    }

    #[test]
    fn interval_forces_minimum_spacing_in_loop() {
        let mut shape = activate(EmitterShapeOptions::Line(LineShape {
            length: 1.0,
            emission: ShapeEmission {
                mode: EmissionMode::Loop,
                speed: 0.0,
                interval: 0.25,
            },
        }));
        let mut rng = ParticleRng::new(8);
        let first = shape.spawn(&mut rng, 0.1, &NoScene).position.x;
        let second = shape.spawn(&mut rng, 0.1, &NoScene).position.x;
        assert!((second - first - 0.25).abs() < 1e-5);
    }

    #[test]
    fn interval_rejects_close_random_candidates() {
        let mut shape = activate(EmitterShapeOptions::Line(LineShape {
            length: 1.0,
            emission: ShapeEmission {
                mode: EmissionMode::Random,
                speed: 1.0,
                interval: 0.1,
            },
        }));
        let mut rng = ParticleRng::new(9);
        let mut prev = shape.spawn(&mut rng, 0.0, &NoScene).position.x;
        let mut close = 0;
        for _ in 0..500 {
            let x = shape.spawn(&mut rng, 0.0, &NoScene).position.x;
            if (x - prev).abs() < 0.1 {
                close += 1;
            }
            prev = x;
        }
        // Without rejection about a fifth would be close; retries make it rare
        assert!(close < 5, "close {close}");
    }

    #[test]
    fn closed_arc_interval_measures_across_the_seam() {
        assert!((parametric_distance(0.99, 0.01, true) - 0.02).abs() < 1e-6);
        assert!((parametric_distance(0.99, 0.01, false) - 0.98).abs() < 1e-6);

        let emission = ShapeEmission {
            mode: EmissionMode::Random,
            speed: 1.0,
            interval: 0.1,
        };
        let mut cursor = ShapeCursor::default();
        let mut rng = ParticleRng::new(21);
        let mut prev = cursor.next(&emission, 0.0, true, &mut rng);
        let mut close = 0;
        for _ in 0..500 {
            let p = cursor.next(&emission, 0.0, true, &mut rng);
            if parametric_distance(p, prev, true) < 0.1 {
                close += 1;
            }
            prev = p;
        }
        assert!(close < 5, "close {close}");
    }

    #[test]
    fn cone_base_directions_within_angle() {
        let mut shape = activate(EmitterShapeOptions::Cone(ConeShape {
            angle: 30.0,
            ..Default::default()
        }));
        let mut rng = ParticleRng::new(10);
        let cos_limit = 30f32.to_radians().cos();
        for _ in 0..500 {
            let s = shape.spawn(&mut rng, 0.0, &NoScene);
            assert_eq!(s.position.z, 0.0);
            assert!(s.position.length() <= 0.5 + 1e-4);
            assert!(s.normal.z >= cos_limit - 1e-4);
            assert!((s.normal.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn cone_volume_rises_along_axis() {
        let mut shape = activate(EmitterShapeOptions::Cone(ConeShape {
            angle: 0.0,
            length: 2.0,
            emit_from: ConeEmitFrom::Volume,
            ..Default::default()
        }));
        let mut rng = ParticleRng::new(11);
        for _ in 0..200 {
            let s = shape.spawn(&mut rng, 0.0, &NoScene);
            assert!((0.0..=2.0).contains(&s.position.z));
        }
    }

    #[test]
    fn invalid_options_fail_validation() {
        let bad = [
            EmitterShapeOptions::Box(BoxShape {
                extents: Vec3::new(1.0, 0.0, 1.0),
                thickness: 1.0,
            }),
            EmitterShapeOptions::Sphere(SphereShape {
                radius: -1.0,
                ..Default::default()
            }),
            EmitterShapeOptions::Circle(CircleShape {
                thickness: 1.5,
                ..Default::default()
            }),
            EmitterShapeOptions::Cone(ConeShape {
                angle: 95.0,
                ..Default::default()
            }),
            EmitterShapeOptions::Line(LineShape {
                length: 1.0,
                emission: ShapeEmission {
                    interval: 1.0,
                    ..Default::default()
                },
            }),
        ];
        for options in bad {
            let err = EmitterShape::activate(options.clone(), &NoScene).unwrap_err();
            assert!(err.is_configuration(), "{options:?}");
        }
    }

    #[test]
    fn mesh_shape_without_mesh_fails_fast() {
        let err = EmitterShape::activate(
            EmitterShapeOptions::StaticMesh(MeshShape::default()),
            &NoScene,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn parse_shape_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            shape: EmitterShapeOptions,
        }
        let h: Holder = toml::from_str(
            r#"
[shape]
type = "circle"
radius = 2
arc = 180
emission = { mode = "ping_pong", speed = 0.5 }
"#,
        )
        .unwrap();
        match h.shape {
            EmitterShapeOptions::Circle(c) => {
                assert_eq!(c.radius, 2.0);
                assert_eq!(c.arc, 180.0);
                assert_eq!(c.thickness, 1.0);
                assert_eq!(c.emission.mode, EmissionMode::PingPong);
                assert_eq!(c.emission.interval, 0.0);
            }
            other => panic!("expected circle, got {other:?}"),
        }
    }
}
