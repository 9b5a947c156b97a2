use anyhow::{Context, Result};
use ember_particles::{ParticleSystem, SceneDescription};
use std::path::Path;

pub struct ValidateArgs {
    pub file: String,
    pub format: String,
}

/// Outcome of activating one named system
pub struct SystemCheck {
    pub name: String,
    pub error: Option<String>,
}

impl SystemCheck {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let description = SceneDescription::load(Path::new(&args.file))
        .with_context(|| format!("Failed to load description: {}", args.file))?;

    let checks = check(&description);

    if args.format == "json" {
        print_checks_json(&checks)?;
    } else {
        print_checks_text(&checks);
    }

    let failed = checks.iter().filter(|c| !c.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} system(s) failed validation", failed, checks.len());
    }
    Ok(())
}

/// Build every system against the description's scene, in name order
pub fn check(description: &SceneDescription) -> Vec<SystemCheck> {
    let scene = description.scene();
    description
        .systems
        .iter()
        .map(|(name, config)| SystemCheck {
            name: name.clone(),
            error: ParticleSystem::new(config.clone(), &scene)
                .err()
                .map(|e| e.to_string()),
        })
        .collect()
}

fn print_checks_text(checks: &[SystemCheck]) {
    if checks.is_empty() {
        println!("No particle systems found.");
        return;
    }
    for c in checks {
        match &c.error {
            None => println!("  [OK]    {}", c.name),
            Some(message) => println!("  [ERROR] {}: {}", c.name, message),
        }
    }
}

fn print_checks_json(checks: &[SystemCheck]) -> Result<()> {
    let systems: Vec<serde_json::Value> = checks
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "valid": c.is_ok(),
                "error": c.error,
            })
        })
        .collect();

    let output = serde_json::json!({
        "valid": checks.iter().all(SystemCheck::is_ok),
        "systems": systems,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
