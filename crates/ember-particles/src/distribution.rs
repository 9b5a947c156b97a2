//! Property distributions: constant, random range, curve and random curve range.
//!
//! A distribution maps normalized lifetime progress `t` (0 at spawn, 1 at death)
//! to a value. Whether a property is *evaluated at spawn* (sampled once and held)
//! or *evaluated over lifetime* (recomputed every step) is decided by the call
//! site; the per-particle seed keeps random draws stable in both cases.

use crate::rand::ParticleRng;
use ember_core::math::{cubic_hermite, lerp_f32};
use ember_core::{Color, EmberError, Result, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value type that distributions and curves can produce.
pub trait Animatable: Copy + PartialEq + fmt::Debug {
    const ZERO: Self;

    fn lerp(a: Self, b: Self, t: f32) -> Self;

    /// `to - from`, used to build linear tangents
    fn delta(from: Self, to: Self) -> Self;

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, span: f32, t: f32) -> Self;

    /// Independent uniform draw per component between `a` and `b`
    fn random_between(a: Self, b: Self, rng: &mut ParticleRng) -> Self;

    fn is_finite(&self) -> bool;
}

impl Animatable for f32 {
    const ZERO: Self = 0.0;

    fn lerp(a: Self, b: Self, t: f32) -> Self {
        lerp_f32(a, b, t)
    }

    fn delta(from: Self, to: Self) -> Self {
        to - from
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, span: f32, t: f32) -> Self {
        cubic_hermite(p0, m0, p1, m1, span, t)
    }

    fn random_between(a: Self, b: Self, rng: &mut ParticleRng) -> Self {
        rng.range(a, b)
    }

    fn is_finite(&self) -> bool {
        f32::is_finite(*self)
    }
}

impl Animatable for Vec2 {
    const ZERO: Self = Vec2::ZERO;

    fn lerp(a: Self, b: Self, t: f32) -> Self {
        Vec2::new(lerp_f32(a.x, b.x, t), lerp_f32(a.y, b.y, t))
    }

    fn delta(from: Self, to: Self) -> Self {
        Vec2::new(to.x - from.x, to.y - from.y)
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, span: f32, t: f32) -> Self {
        Vec2::new(
            cubic_hermite(p0.x, m0.x, p1.x, m1.x, span, t),
            cubic_hermite(p0.y, m0.y, p1.y, m1.y, span, t),
        )
    }

    fn random_between(a: Self, b: Self, rng: &mut ParticleRng) -> Self {
        Vec2::new(rng.range(a.x, b.x), rng.range(a.y, b.y))
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Animatable for Vec3 {
    const ZERO: Self = Vec3::ZERO;

    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a.lerp(&b, t)
    }

    fn delta(from: Self, to: Self) -> Self {
        to - from
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, span: f32, t: f32) -> Self {
        Vec3::new(
            cubic_hermite(p0.x, m0.x, p1.x, m1.x, span, t),
            cubic_hermite(p0.y, m0.y, p1.y, m1.y, span, t),
            cubic_hermite(p0.z, m0.z, p1.z, m1.z, span, t),
        )
    }

    fn random_between(a: Self, b: Self, rng: &mut ParticleRng) -> Self {
        Vec3::new(
            rng.range(a.x, b.x),
            rng.range(a.y, b.y),
            rng.range(a.z, b.z),
        )
    }

    fn is_finite(&self) -> bool {
        Vec3::is_finite(self)
    }
}

impl Animatable for Color {
    const ZERO: Self = Color::TRANSPARENT;

    fn lerp(a: Self, b: Self, t: f32) -> Self {
        Color::new(
            lerp_f32(a.r, b.r, t),
            lerp_f32(a.g, b.g, t),
            lerp_f32(a.b, b.b, t),
            lerp_f32(a.a, b.a, t),
        )
    }

    fn delta(from: Self, to: Self) -> Self {
        Color::new(to.r - from.r, to.g - from.g, to.b - from.b, to.a - from.a)
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, span: f32, t: f32) -> Self {
        Color::new(
            cubic_hermite(p0.r, m0.r, p1.r, m1.r, span, t),
            cubic_hermite(p0.g, m0.g, p1.g, m1.g, span, t),
            cubic_hermite(p0.b, m0.b, p1.b, m1.b, span, t),
            cubic_hermite(p0.a, m0.a, p1.a, m1.a, span, t),
        )
    }

    fn random_between(a: Self, b: Self, rng: &mut ParticleRng) -> Self {
        Color::new(
            rng.range(a.r, b.r),
            rng.range(a.g, b.g),
            rng.range(a.b, b.b),
            rng.range(a.a, b.a),
        )
    }

    fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

fn zero_tangent<T: Animatable>() -> T {
    T::ZERO
}

/// A value at a point in normalized lifetime, with Hermite tangents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Animatable + Deserialize<'de>"
))]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
    /// Incoming tangent (value change per unit time)
    #[serde(default = "zero_tangent")]
    pub in_tangent: T,
    /// Outgoing tangent (value change per unit time)
    #[serde(default = "zero_tangent")]
    pub out_tangent: T,
}

impl<T: Animatable> Keyframe<T> {
    /// Keyframe with flat tangents
    pub fn new(time: f32, value: T) -> Self {
        Self {
            time,
            value,
            in_tangent: T::ZERO,
            out_tangent: T::ZERO,
        }
    }

    pub fn with_tangents(time: f32, value: T, in_tangent: T, out_tangent: T) -> Self {
        Self {
            time,
            value,
            in_tangent,
            out_tangent,
        }
    }
}

/// A non-empty, time-sorted keyframe sequence.
///
/// Construction is the only place keyframes are checked; a `Curve` that exists
/// is always valid, including one deserialized from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<Keyframe<T>>",
    into = "Vec<Keyframe<T>>",
    bound(
        serialize = "T: Animatable + Serialize",
        deserialize = "T: Animatable + Deserialize<'de>"
    )
)]
pub struct Curve<T> {
    keyframes: Vec<Keyframe<T>>,
}

impl<T: Animatable> Curve<T> {
    pub fn new(keyframes: Vec<Keyframe<T>>) -> Result<Self> {
        if keyframes.is_empty() {
            return Err(EmberError::EmptyCurve("curve".into()));
        }
        for (index, kf) in keyframes.iter().enumerate() {
            if !kf.time.is_finite()
                || !kf.value.is_finite()
                || !kf.in_tangent.is_finite()
                || !kf.out_tangent.is_finite()
            {
                return Err(EmberError::ConfigurationError(format!(
                    "curve keyframe {index} has a non-finite component"
                )));
            }
            if index > 0 && kf.time < keyframes[index - 1].time {
                return Err(EmberError::UnsortedKeyframes {
                    curve: "curve".into(),
                    index,
                });
            }
        }
        Ok(Self { keyframes })
    }

    /// Straight line from `from` at t=0 to `to` at t=1
    pub fn linear(from: T, to: T) -> Self {
        let slope = T::delta(from, to);
        Self {
            keyframes: vec![
                Keyframe::with_tangents(0.0, from, slope, slope),
                Keyframe::with_tangents(1.0, to, slope, slope),
            ],
        }
    }

    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    /// Sample the curve, clamping outside the keyframe range.
    pub fn evaluate(&self, t: f32) -> T {
        let keyframes = &self.keyframes;
        let first = &keyframes[0];
        if t <= first.time {
            return first.value;
        }
        let last = &keyframes[keyframes.len() - 1];
        if t >= last.time {
            return last.value;
        }

        // First keyframe strictly after t; t > first.time guarantees idx >= 1
        let idx = keyframes.partition_point(|kf| kf.time <= t);
        let prev = &keyframes[idx - 1];
        let next = &keyframes[idx];

        let span = next.time - prev.time;
        if span <= 0.0 {
            return prev.value;
        }
        let local = (t - prev.time) / span;
        T::hermite(
            prev.value,
            prev.out_tangent,
            next.value,
            next.in_tangent,
            span,
            local,
        )
    }
}

impl<T: Animatable> TryFrom<Vec<Keyframe<T>>> for Curve<T> {
    type Error = EmberError;

    fn try_from(keyframes: Vec<Keyframe<T>>) -> Result<Self> {
        Curve::new(keyframes)
    }
}

impl<T> From<Curve<T>> for Vec<Keyframe<T>> {
    fn from(curve: Curve<T>) -> Self {
        curve.keyframes
    }
}

/// How a property value is produced from lifetime progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "mode",
    rename_all = "snake_case",
    bound(
        serialize = "T: Animatable + Serialize",
        deserialize = "T: Animatable + Deserialize<'de>"
    )
)]
pub enum Distribution<T> {
    Constant { value: T },
    RandomRange { min: T, max: T },
    Curve { curve: Curve<T> },
    RandomCurveRange { min: Curve<T>, max: Curve<T> },
}

impl<T: Animatable> Distribution<T> {
    pub fn constant(value: T) -> Self {
        Distribution::Constant { value }
    }

    pub fn random_range(min: T, max: T) -> Self {
        Distribution::RandomRange { min, max }
    }

    pub fn curve(keyframes: Vec<Keyframe<T>>) -> Result<Self> {
        Ok(Distribution::Curve {
            curve: Curve::new(keyframes)?,
        })
    }

    pub fn random_curve_range(min: Vec<Keyframe<T>>, max: Vec<Keyframe<T>>) -> Result<Self> {
        Ok(Distribution::RandomCurveRange {
            min: Curve::new(min)?,
            max: Curve::new(max)?,
        })
    }

    /// Evaluate at lifetime progress `t`, drawing any randomness from `rng`.
    ///
    /// `t` is clamped to [0, 1]; a NaN `t` evaluates as 0.
    pub fn evaluate(&self, t: f32, rng: &mut ParticleRng) -> T {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Distribution::Constant { value } => *value,
            Distribution::RandomRange { min, max } => T::random_between(*min, *max, rng),
            Distribution::Curve { curve } => curve.evaluate(t),
            Distribution::RandomCurveRange { min, max } => {
                T::lerp(min.evaluate(t), max.evaluate(t), rng.next_f32())
            }
        }
    }

    /// Evaluate with randomness fixed by a particle seed and a property salt.
    ///
    /// Calling this every step re-evaluates curves at the new `t` while the random
    /// factor stays the same for the particle's whole life.
    pub fn evaluate_seeded(&self, t: f32, particle_seed: u32, salt: u32) -> T {
        match self {
            Distribution::Constant { value } => *value,
            Distribution::Curve { curve } => {
                curve.evaluate(if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) })
            }
            _ => self.evaluate(t, &mut ParticleRng::for_property(particle_seed, salt)),
        }
    }

    /// Reject non-finite constants and ranges. Curves were checked when built.
    pub fn validate(&self, field: &str) -> Result<()> {
        let finite = match self {
            Distribution::Constant { value } => value.is_finite(),
            Distribution::RandomRange { min, max } => min.is_finite() && max.is_finite(),
            Distribution::Curve { .. } | Distribution::RandomCurveRange { .. } => true,
        };
        if finite {
            Ok(())
        } else {
            Err(EmberError::ConfigurationError(format!(
                "{field} contains a non-finite value"
            )))
        }
    }
}

impl Distribution<f32> {
    /// Lower and upper bounds of every value this distribution can produce
    pub fn bounds(&self) -> (f32, f32) {
        fn curve_bounds(curve: &Curve<f32>) -> (f32, f32) {
            // Keyframe values bound a curve unless tangents overshoot; good enough for validation
            curve
                .keyframes()
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), kf| {
                    (lo.min(kf.value), hi.max(kf.value))
                })
        }
        match self {
            Distribution::Constant { value } => (*value, *value),
            Distribution::RandomRange { min, max } => (min.min(*max), min.max(*max)),
            Distribution::Curve { curve } => curve_bounds(curve),
            Distribution::RandomCurveRange { min, max } => {
                let (a, b) = curve_bounds(min);
                let (c, d) = curve_bounds(max);
                (a.min(c), b.max(d))
            }
        }
    }
}
