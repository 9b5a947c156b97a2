//! Continuous emission and timed bursts

use crate::distribution::Distribution;
use crate::rand::ParticleRng;
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

/// Slack when comparing a burst time against the accumulated clock
pub const BURST_TIME_TOLERANCE: f32 = 1e-4;

/// A one-off or repeating extra emission at a point on the emitter clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Burst {
    /// Emitter time of the first cycle, in seconds
    pub time: f32,
    /// Particles per cycle, evaluated at the emitter's normalized time
    pub count: Distribution<f32>,
    /// Number of cycles; 0 repeats forever
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    /// Seconds between cycles
    #[serde(default)]
    pub interval: f32,
}

fn default_cycles() -> u32 {
    1
}

impl Burst {
    pub fn new(time: f32, count: Distribution<f32>, cycles: u32, interval: f32) -> Self {
        Self {
            time,
            count,
            cycles,
            interval,
        }
    }

    pub fn validate(&self, index: usize) -> Result<()> {
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(EmberError::out_of_range(
                format!("bursts[{index}].time"),
                0.0,
                f64::INFINITY,
                self.time as f64,
            ));
        }
        self.count.validate(&format!("bursts[{index}].count"))?;
        if self.count.bounds().0 < 0.0 {
            return Err(EmberError::ConfigurationError(format!(
                "bursts[{index}].count can go negative"
            )));
        }
        if self.cycles != 1 && (self.interval.is_nan() || self.interval <= 0.0) {
            return Err(EmberError::ConfigurationError(format!(
                "bursts[{index}] repeats but has interval {}",
                self.interval
            )));
        }
        Ok(())
    }
}

/// Runtime progress of one configured burst
#[derive(Debug, Clone, Copy, PartialEq)]
struct BurstState {
    cycles_fired: u32,
    next_time: f32,
}

impl BurstState {
    fn start(burst: &Burst) -> Self {
        Self {
            cycles_fired: 0,
            next_time: burst.time,
        }
    }

    fn exhausted(&self, burst: &Burst) -> bool {
        burst.cycles != 0 && self.cycles_fired >= burst.cycles
    }
}

/// Decides how many particles to spawn each step.
///
/// Continuous emission carries its fractional remainder between steps, so a
/// rate of 2.5/s emits exactly 5 particles over 2 seconds regardless of `dt`.
#[derive(Debug, Clone, Default)]
pub struct EmissionScheduler {
    accumulator: f32,
    bursts: Vec<BurstState>,
}

impl EmissionScheduler {
    pub fn new(bursts: &[Burst]) -> Self {
        Self {
            accumulator: 0.0,
            bursts: bursts.iter().map(BurstState::start).collect(),
        }
    }

    /// Rewind to the start of a play cycle
    pub fn reset(&mut self, bursts: &[Burst]) {
        self.accumulator = 0.0;
        self.bursts = bursts.iter().map(BurstState::start).collect();
    }

    /// Particles owed for a step of `dt` ending at emitter time `elapsed`.
    ///
    /// `t_normalized` is the emitter's progress through its duration, used to
    /// evaluate the rate and burst counts.
    pub fn step(
        &mut self,
        dt: f32,
        rate: &Distribution<f32>,
        bursts: &[Burst],
        elapsed: f32,
        t_normalized: f32,
        rng: &mut ParticleRng,
    ) -> u32 {
        let continuous = self.continuous(dt, rate, t_normalized, rng);
        continuous.saturating_add(self.fire_bursts(bursts, elapsed, t_normalized, rng))
    }

    fn continuous(
        &mut self,
        dt: f32,
        rate: &Distribution<f32>,
        t_normalized: f32,
        rng: &mut ParticleRng,
    ) -> u32 {
        if dt <= 0.0 {
            return 0;
        }
        let rate = rate.evaluate(t_normalized, rng).max(0.0);
        self.accumulator += rate * dt;
        let whole = self.accumulator.floor();
        self.accumulator -= whole;
        whole as u32
    }

    fn fire_bursts(
        &mut self,
        bursts: &[Burst],
        elapsed: f32,
        t_normalized: f32,
        rng: &mut ParticleRng,
    ) -> u32 {
        if self.bursts.len() != bursts.len() {
            self.bursts = bursts.iter().map(BurstState::start).collect();
        }
        let mut total: u32 = 0;
        for (burst, state) in bursts.iter().zip(self.bursts.iter_mut()) {
            while !state.exhausted(burst) && state.next_time <= elapsed + BURST_TIME_TOLERANCE {
                let count = burst.count.evaluate(t_normalized, rng).max(0.0).round() as u32;
                total = total.saturating_add(count);
                state.cycles_fired += 1;
                if burst.interval > 0.0 {
                    state.next_time += burst.interval;
                } else {
                    // An unbounded zero-interval burst fires once per step
                    if burst.cycles == 0 {
                        break;
                    }
                }
            }
        }
        total
    }

    /// Cycles fired so far, per configured burst
    pub fn burst_cycles(&self) -> Vec<u32> {
        self.bursts.iter().map(|s| s.cycles_fired).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_rate_has_no_fractional_loss() {
        let mut scheduler = EmissionScheduler::new(&[]);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(10.0f32);
        let mut total: u32 = 0;
        let mut elapsed = 0.0f32;
        for _ in 0..100 {
            elapsed += 0.1;
            total += scheduler.step(0.1, &rate, &[], elapsed, 0.0, &mut rng);
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn non_integer_rate_converges() {
        let mut scheduler = EmissionScheduler::new(&[]);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(2.5f32);
        let mut total: u32 = 0;
        for _ in 0..600 {
            total += scheduler.step(1.0 / 60.0, &rate, &[], 0.0, 0.0, &mut rng);
        }
        // 10 seconds at 2.5/s
        assert!((total as i32 - 25).abs() <= 1, "total {total}");
    }

    #[test]
    fn burst_fires_each_cycle_then_stops() {
        let bursts = vec![Burst::new(1.0, Distribution::constant(5.0), 3, 2.0)];
        let mut scheduler = EmissionScheduler::new(&bursts);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(0.0f32);

        let mut total: u32 = 0;
        let mut fired_at = Vec::new();
        let mut elapsed = 0.0f32;
        for step in 1..=100 {
            elapsed += 0.1;
            let n = scheduler.step(0.1, &rate, &bursts, elapsed, 0.0, &mut rng);
            if n > 0 {
                assert_eq!(n, 5);
                fired_at.push(step);
            }
            total += n;
        }
        assert_eq!(total, 15);
        // Steps 10, 30 and 50 end at 1.0 s, 3.0 s and 5.0 s
        assert_eq!(fired_at, vec![10, 30, 50]);
        assert_eq!(scheduler.burst_cycles(), vec![3]);
    }

    #[test]
    fn huge_counts_saturate() {
        let bursts = vec![
            Burst::new(0.0, Distribution::constant(4.0e9), 1, 0.0),
            Burst::new(0.0, Distribution::constant(4.0e9), 1, 0.0),
        ];
        let mut scheduler = EmissionScheduler::new(&bursts);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(1.0e9f32);
        let n = scheduler.step(1.0, &rate, &bursts, 1.0, 0.0, &mut rng);
        assert_eq!(n, u32::MAX);
    }

    #[test]
    fn infinite_burst_keeps_firing() {
        let bursts = vec![Burst::new(0.0, Distribution::constant(1.0), 0, 1.0)];
        let mut scheduler = EmissionScheduler::new(&bursts);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(0.0f32);
        let mut total: u32 = 0;
        let mut elapsed = 0.0f32;
        for _ in 0..20 {
            elapsed += 0.5;
            total += scheduler.step(0.5, &rate, &bursts, elapsed, 0.0, &mut rng);
        }
        // Fires at 0, 1, .., 10
        assert_eq!(total, 11);
    }

    #[test]
    fn large_step_catches_up_missed_cycles() {
        let bursts = vec![Burst::new(0.5, Distribution::constant(2.0), 4, 0.5)];
        let mut scheduler = EmissionScheduler::new(&bursts);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(0.0f32);
        let n = scheduler.step(3.0, &rate, &bursts, 3.0, 0.0, &mut rng);
        assert_eq!(n, 8);
    }

    #[test]
    fn reset_rearms_bursts() {
        let bursts = vec![Burst::new(0.0, Distribution::constant(3.0), 1, 0.0)];
        let mut scheduler = EmissionScheduler::new(&bursts);
        let mut rng = ParticleRng::new(1);
        let rate = Distribution::constant(0.0f32);
        assert_eq!(scheduler.step(0.1, &rate, &bursts, 0.1, 0.0, &mut rng), 3);
        assert_eq!(scheduler.step(0.1, &rate, &bursts, 0.2, 0.0, &mut rng), 0);
        scheduler.reset(&bursts);
        assert_eq!(scheduler.step(0.1, &rate, &bursts, 0.1, 0.0, &mut rng), 3);
    }

    #[test]
    fn burst_validation() {
        assert!(Burst::new(0.0, Distribution::constant(1.0), 0, 0.0)
            .validate(0)
            .is_err());
        assert!(Burst::new(-1.0, Distribution::constant(1.0), 1, 0.0)
            .validate(0)
            .is_err());
        assert!(Burst::new(0.0, Distribution::random_range(-1.0, 2.0), 1, 0.0)
            .validate(0)
            .is_err());
        assert!(Burst::new(1.0, Distribution::constant(1.0), 3, 0.5)
            .validate(0)
            .is_ok());
    }

    #[test]
    fn parse_burst_from_toml() {
        let burst: Burst = toml::from_str(
            r#"
time = 1
cycles = 3
interval = 2.0
count = { mode = "constant", value = 5 }
"#,
        )
        .unwrap();
        assert_eq!(burst, Burst::new(1.0, Distribution::constant(5.0), 3, 2.0));
    }
}
