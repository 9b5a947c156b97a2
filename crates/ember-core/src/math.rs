//! Pure interpolation math shared by curves and evolvers

use crate::Vec3;

/// Linear interpolation between two floats
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Cubic Hermite spline interpolation for a scalar.
///
/// `p0`, `m0`: start value and outgoing tangent (per unit time)
/// `p1`, `m1`: end value and incoming tangent (per unit time)
/// `span`: time span of the interval, used to scale the tangents
/// `t`: normalized [0..1] parameter
pub fn cubic_hermite(p0: f32, m0: f32, p1: f32, m1: f32, span: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    // Hermite basis functions
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    h00 * p0 + h10 * (m0 * span) + h01 * p1 + h11 * (m1 * span)
}

/// Rotate a vector around a unit axis by an angle in radians (Rodrigues' formula).
pub fn rotate_around_axis(v: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    let cos_a = angle.cos();
    let sin_a = angle.sin();
    let dot = v.dot(&axis);
    let cross = axis.cross(&v);
    Vec3::new(
        v.x * cos_a + cross.x * sin_a + axis.x * dot * (1.0 - cos_a),
        v.y * cos_a + cross.y * sin_a + axis.y * dot * (1.0 - cos_a),
        v.z * cos_a + cross.z * sin_a + axis.z * dot * (1.0 - cos_a),
    )
}
