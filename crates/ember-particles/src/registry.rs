//! Owns several particle systems and packs their particles for the renderer

use crate::config::{BlendMode, ParticleSystemConfig, RenderMode};
use crate::particle::ParticleInstance;
use crate::scene::MeshSource;
use crate::system::{ParticleSystem, StepContext, StepReport};
use ember_core::{Result, SystemId};
use std::collections::BTreeMap;

/// Draw data for one system, consumed by the renderer
pub struct ParticleDrawData<'a> {
    pub system: SystemId,
    pub instances: &'a [ParticleInstance],
    pub mode: RenderMode,
    pub blend: BlendMode,
    pub texture: &'a str,
}

/// One system's slice of the shared instance buffer
struct InstanceRange {
    system: SystemId,
    start: usize,
    count: usize,
}

/// Manages a set of particle systems keyed by id
pub struct ParticleRegistry {
    systems: BTreeMap<SystemId, ParticleSystem>,
    /// Pre-allocated instance buffer for packing alive particles
    instance_buffer: Vec<ParticleInstance>,
    instance_ranges: Vec<InstanceRange>,
}

impl ParticleRegistry {
    pub fn new() -> Self {
        Self {
            systems: BTreeMap::new(),
            instance_buffer: Vec::new(),
            instance_ranges: Vec::new(),
        }
    }

    /// Build and register a system. A configuration error leaves the registry unchanged.
    pub fn spawn(
        &mut self,
        config: ParticleSystemConfig,
        meshes: &dyn MeshSource,
    ) -> Result<SystemId> {
        let system = ParticleSystem::new(config, meshes)?;
        let id = system.id();
        self.systems.insert(id, system);
        Ok(id)
    }

    pub fn insert(&mut self, system: ParticleSystem) -> SystemId {
        let id = system.id();
        self.systems.insert(id, system);
        id
    }

    pub fn remove(&mut self, id: SystemId) -> Option<ParticleSystem> {
        self.systems.remove(&id)
    }

    pub fn get(&self, id: SystemId) -> Option<&ParticleSystem> {
        self.systems.get(&id)
    }

    pub fn get_mut(&mut self, id: SystemId) -> Option<&mut ParticleSystem> {
        self.systems.get_mut(&id)
    }

    /// Clear all systems and instance buffers for a scene transition.
    pub fn clear(&mut self) {
        self.systems.clear();
        self.instance_buffer.clear();
        self.instance_ranges.clear();
    }

    /// Step every system with the same context. Returns the combined report.
    pub fn step(&mut self, ctx: &StepContext<'_>) -> StepReport {
        let mut total = StepReport::default();
        for system in self.systems.values_mut() {
            total.accumulate(&system.step(ctx));
        }
        total.live = self.total_alive();
        total
    }

    /// Pack alive particles into the instance buffer for GPU upload.
    /// Call this after `step()`.
    pub fn pack_instances(&mut self) {
        self.instance_buffer.clear();
        self.instance_ranges.clear();

        for (&id, system) in &self.systems {
            let start = self.instance_buffer.len();
            system.pack_instances(&mut self.instance_buffer);
            let count = self.instance_buffer.len() - start;
            if count > 0 {
                self.instance_ranges.push(InstanceRange {
                    system: id,
                    start,
                    count,
                });
            }
        }
    }

    /// Get the packed instance data
    pub fn instance_data(&self) -> &[ParticleInstance] {
        &self.instance_buffer
    }

    /// Draw data for each system that has alive particles
    pub fn draw_data(&self) -> Vec<ParticleDrawData<'_>> {
        self.instance_ranges
            .iter()
            .filter_map(|range| {
                let system = self.systems.get(&range.system)?;
                let render = system.render();
                Some(ParticleDrawData {
                    system: range.system,
                    instances: &self.instance_buffer[range.start..range.start + range.count],
                    mode: render.mode,
                    blend: render.blend,
                    texture: &render.texture,
                })
            })
            .collect()
    }

    /// Queue a burst of particles on a specific system (from script command)
    pub fn queue_burst(&mut self, id: SystemId, count: u32) -> bool {
        match self.systems.get_mut(&id) {
            Some(system) => {
                system.queue_burst(count);
                true
            }
            None => false,
        }
    }

    /// Number of registered systems
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Total alive particles across all systems
    pub fn total_alive(&self) -> usize {
        self.systems.values().map(|s| s.live_count()).sum()
    }
}

impl Default for ParticleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
