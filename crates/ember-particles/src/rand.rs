//! Lightweight xorshift32 PRNG with per-particle seeding

use ember_core::Vec3;

/// Deterministic random source used by shapes, distributions and emission.
///
/// Particles never share a generator: each one carries a 32-bit seed and
/// rebuilds its own `ParticleRng` whenever a random value must be re-derived,
/// so the same particle always draws the same numbers.
#[derive(Debug, Clone)]
pub struct ParticleRng {
    state: u32,
}

impl ParticleRng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Generator for one property of one particle: `salt` separates properties
    /// so size and color randomness are not correlated.
    pub fn for_property(particle_seed: u32, salt: u32) -> Self {
        Self::new(mix_seed(particle_seed, salt))
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns a float in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        // Top 24 bits fit the f32 mantissa exactly
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Returns a float in [min, max)
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Returns an index in [0, len). `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        ((self.next_f32() * len as f32) as usize).min(len - 1)
    }

    /// Returns a random unit direction vector (uniformly on sphere surface)
    pub fn random_direction(&mut self) -> Vec3 {
        // Marsaglia method for uniform sphere sampling
        loop {
            let x = self.range(-1.0, 1.0);
            let y = self.range(-1.0, 1.0);
            let s = x * x + y * y;
            if s < 1.0 {
                let factor = 2.0 * (1.0 - s).sqrt();
                return Vec3::new(x * factor, y * factor, 1.0 - 2.0 * s);
            }
        }
    }
}

/// Derive a well-spread seed from a base seed and an index (splitmix-style finalizer).
pub fn mix_seed(seed: u32, index: u32) -> u32 {
    let mut z = (seed as u64) << 32 | index as u64;
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z ^ (z >> 32)) as u32
}

/// Salts separating the random streams of one particle's properties
pub mod salt {
    pub const LIFETIME: u32 = 1;
    pub const SPEED: u32 = 2;
    pub const SIZE: u32 = 3;
    pub const ROTATION: u32 = 4;
    pub const COLOR: u32 = 5;
    pub const DIRECTION: u32 = 6;

    pub const VELOCITY: u32 = 16;
    pub const SPEED_LIMIT: u32 = 17;
    pub const FORCE: u32 = 18;
    pub const ORBIT: u32 = 19;
    pub const ORBIT_RADIAL: u32 = 20;
    pub const SIZE_OVER_LIFETIME: u32 = 21;
    pub const ROTATION_RATE: u32 = 22;
    pub const COLOR_OVER_LIFETIME: u32 = 23;
    pub const FRAME: u32 = 24;
}
