use anyhow::{Context, Result};
use ember_core::SystemId;
use ember_particles::{ParticleRegistry, SceneDescription, StepContext, StepReport};
use serde::Serialize;
use std::path::Path;

pub struct SimulateArgs {
    pub file: String,
    pub steps: u32,
    pub dt: f32,
    pub format: String,
    pub every: u32,
}

/// Counts for one printed step, summed over every system
#[derive(Debug, Clone, Serialize)]
pub struct StepRow {
    pub step: u32,
    pub time: f32,
    #[serde(flatten)]
    pub report: StepReport,
}

/// Totals for one named system over the whole run
#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    pub name: String,
    pub live: usize,
    pub capacity: usize,
    pub overflow: u64,
    #[serde(flatten)]
    pub totals: StepReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutput {
    pub steps: u32,
    pub dt: f32,
    pub rows: Vec<StepRow>,
    pub systems: Vec<SystemSummary>,
    pub totals: StepReport,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let description = SceneDescription::load(Path::new(&args.file))
        .with_context(|| format!("Failed to load description: {}", args.file))?;

    let output = simulate(&description, args.steps, args.dt, args.every)?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(())
}

/// Step every system in the description `steps` times, recording a row every `every` steps
pub fn simulate(
    description: &SceneDescription,
    steps: u32,
    dt: f32,
    every: u32,
) -> Result<SimulationOutput> {
    let scene = description.scene();
    let physics = description.physics();

    let mut registry = ParticleRegistry::new();
    let mut named: Vec<(String, SystemId)> = Vec::with_capacity(description.systems.len());
    for (name, config) in &description.systems {
        let id = registry
            .spawn(config.clone(), &scene)
            .with_context(|| format!("System '{}' failed to activate", name))?;
        named.push((name.clone(), id));
    }
    log::debug!("simulating {} system(s) for {} step(s)", named.len(), steps);

    let mut rows = Vec::new();
    let mut per_system = vec![StepReport::default(); named.len()];
    let mut totals = StepReport::default();

    for step in 1..=steps {
        let ctx = StepContext::with_scene(dt, &scene).with_physics(&physics);
        let mut combined = StepReport::default();
        for ((_, id), running) in named.iter().zip(per_system.iter_mut()) {
            if let Some(system) = registry.get_mut(*id) {
                let report = system.step(&ctx);
                running.accumulate(&report);
                combined.accumulate(&report);
            }
        }
        combined.live = registry.total_alive();
        totals.accumulate(&combined);

        if every > 0 && step % every == 0 {
            rows.push(StepRow {
                step,
                time: step as f32 * dt,
                report: combined,
            });
        }
    }

    let systems = named
        .iter()
        .zip(per_system)
        .filter_map(|((name, id), running)| {
            let system = registry.get(*id)?;
            Some(SystemSummary {
                name: name.clone(),
                live: system.live_count(),
                capacity: system.capacity(),
                overflow: system.overflow_count(),
                totals: running,
            })
        })
        .collect();

    Ok(SimulationOutput {
        steps,
        dt,
        rows,
        systems,
        totals,
    })
}

fn print_text(output: &SimulationOutput) {
    if !output.rows.is_empty() {
        println!(
            "{:>6} {:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>10}",
            "step", "time", "live", "spawned", "dropped", "evicted", "expired", "collisions"
        );
        for row in &output.rows {
            let r = &row.report;
            println!(
                "{:>6} {:>9.3} {:>7} {:>7} {:>7} {:>7} {:>7} {:>10}",
                row.step, row.time, r.live, r.spawned, r.dropped, r.evicted, r.expired, r.collisions
            );
        }
        println!();
    }

    println!(
        "Ran {} step(s) of {:.4}s across {} system(s).",
        output.steps,
        output.dt,
        output.systems.len()
    );
    for s in &output.systems {
        println!(
            "  {}: {} live / {} capacity, {} spawned, {} expired, {} collisions, {} overflow",
            s.name,
            s.live,
            s.capacity,
            s.totals.spawned,
            s.totals.expired,
            s.totals.collisions,
            s.overflow
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOUNTAIN: &str = r#"
[systems.fountain]
rate = { mode = "constant", value = 10.0 }
start_lifetime = { mode = "constant", value = 100.0 }
capacity = 1000
evolvers = []
"#;

    #[test]
    fn counts_match_the_emission_rate() {
        let description = SceneDescription::from_toml_str(FOUNTAIN).unwrap();
        let output = simulate(&description, 100, 0.1, 10).unwrap();

        assert_eq!(output.rows.len(), 10);
        assert_eq!(output.totals.spawned, 100);
        assert_eq!(output.totals.live, 100);
        assert_eq!(output.rows[0].step, 10);
        assert_eq!(output.rows[0].report.live, 10);

        let fountain = &output.systems[0];
        assert_eq!(fountain.name, "fountain");
        assert_eq!(fountain.live, 100);
        assert_eq!(fountain.overflow, 0);
    }

    #[test]
    fn every_zero_prints_only_the_summary() {
        let description = SceneDescription::from_toml_str(FOUNTAIN).unwrap();
        let output = simulate(&description, 20, 0.1, 0).unwrap();
        assert!(output.rows.is_empty());
        assert_eq!(output.totals.spawned, 20);
    }

    #[test]
    fn bouncing_against_a_collider() {
        let description = SceneDescription::from_toml_str(
            r#"
[systems.rain]
rate = { mode = "constant", value = 0.0 }
bursts = [{ time = 0.0, count = { mode = "constant", value = 20.0 } }]
start_lifetime = { mode = "constant", value = 10.0 }
start_speed = { mode = "constant", value = 0.0 }

[systems.rain.transform]
position = [0.0, 1.0, 0.0]

[[systems.rain.evolvers]]
type = "force"
force = { mode = "constant", value = [0.0, -9.81, 0.0] }

[[systems.rain.evolvers]]
type = "collisions"
mode = { kind = "world" }

[[colliders]]
point = [0.0, 0.0, 0.0]
normal = [0.0, 1.0, 0.0]
"#,
        )
        .unwrap();

        let output = simulate(&description, 120, 1.0 / 60.0, 1).unwrap();
        assert_eq!(output.totals.spawned, 20);
        assert!(output.totals.collisions >= 20);
    }

    #[test]
    fn activation_error_names_the_system() {
        let description = SceneDescription::from_toml_str("[systems.bad]\ncapacity = 0\n").unwrap();
        let err = simulate(&description, 1, 0.1, 1).unwrap_err();
        assert!(format!("{:#}", err).contains("bad"));
    }

    #[test]
    fn json_rows_flatten_the_report() {
        let description = SceneDescription::from_toml_str(FOUNTAIN).unwrap();
        let output = simulate(&description, 1, 0.1, 1).unwrap();
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["rows"][0]["spawned"], 1);
        assert_eq!(value["systems"][0]["name"], "fountain");
    }
}
