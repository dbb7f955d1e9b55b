pub mod algo;
mod diagnostics;
pub mod grid;
pub mod models;
mod parameters;
mod particles;

pub use diagnostics::StepDiagnostics;
pub use grid::{BoundaryCondition, MpmGrid, ScatterMode};
pub use models::{
    ConstitutiveModel, FixedCorotated, IsotropicParameters, Material, NeoHookean, NewtonianFluid,
    Snow,
};
pub use parameters::{MpmParameters, PlasticityBounds};
pub use particles::{MpmParticles, ParticleGroup};

use crate::error::ConfigError;
use crate::math::{T, TV};
use crate::sink::Frame;
use crate::statistics::{SimulationStatistics, StatisticsSummary};
use algo::ParticleLimits;
use grid::ScatterBuffers;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace_span, warn};

/// Contains all of the state for the Material Point Method Simulation
pub struct MpmSimulation {
    pub particles: MpmParticles,
    pub grid: MpmGrid,
    pub params: MpmParameters,
    scatter: ScatterBuffers,
    limits: ParticleLimits,
    /// Simulated time elapsed so far.
    pub time: T,
    /// Number of completed frames.
    pub frame: usize,
    /// Number of substeps run, including those of unfinished frames.
    pub substeps_run: usize,
}

/// What happened during one call to `advance` or `advance_while`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    pub substeps: usize,
    /// False if the frame was cut short by the host.
    pub completed: bool,
    pub diagnostics: StepDiagnostics,
}

impl MpmSimulation {
    /// Validates `params`, then seeds the particle groups and allocates the grid and scatter
    /// buffers. Nothing is allocated after this.
    pub fn initialize(params: MpmParameters) -> Result<MpmSimulation, ConfigError> {
        params.validate()?;

        let mass = params.particle_mass();
        let volume = params.particle_volume();
        let mut particles = MpmParticles::default();
        for group in &params.groups {
            group.seed_into(&mut particles, mass, volume);
        }

        let grid = MpmGrid::new(&params);
        let scatter = ScatterBuffers::new(
            params.scatter,
            params.partitions,
            particles.len(),
            grid.data.num_cells,
        );
        let limits = ParticleLimits {
            max_velocity: params.max_velocity,
            plasticity: params.plasticity.clone(),
            domain: grid.data.inside_walls(params.boundary_thickness),
        };

        info!(
            particles = particles.len(),
            groups = particles.groups.len(),
            grid_nodes = grid.data.num_cells,
            substep_dt = params.substep_dt(),
            scatter = ?params.scatter,
            "Initialized MPM simulation"
        );

        Ok(MpmSimulation {
            particles,
            grid,
            params,
            scatter,
            limits,
            time: 0.,
            frame: 0,
            substeps_run: 0,
        })
    }

    /// Runs one substep: Clear, P2G, GridUpdate, G2P. Each phase finishes before the next starts.
    pub fn substep(&mut self) -> StepDiagnostics {
        let dt = self.params.substep_dt();

        trace_span!("clear_grid").in_scope(|| self.grid.clear_grid());

        trace_span!("particle_to_grid").in_scope(|| {
            algo::particle_to_grid(
                &self.particles,
                &mut self.grid,
                &mut self.scatter,
                &self.params.material,
                dt,
            )
        });

        trace_span!("update_grid").in_scope(|| {
            self.grid.update_velocities(
                self.params.gravity,
                dt,
                self.params.boundary,
                self.params.boundary_thickness,
            )
        });

        let diagnostics = trace_span!("grid_to_particle").in_scope(|| {
            algo::grid_to_particle(
                &mut self.particles,
                &self.grid,
                &self.params.material,
                &self.limits,
                dt,
            )
        });

        self.time += dt;
        self.substeps_run += 1;
        diagnostics
    }

    /// Advances the simulation by one frame, `params.substeps` substeps.
    pub fn advance(&mut self) -> FrameReport {
        self.advance_while(|| true)
    }

    /// Like `advance`, but asks `keep_running` before every substep and stops early once it
    /// returns false. A substep that has started always finishes.
    pub fn advance_while(&mut self, mut keep_running: impl FnMut() -> bool) -> FrameReport {
        let mut report = FrameReport::default();

        while report.substeps < self.params.substeps {
            if !keep_running() {
                debug!(
                    frame = self.frame,
                    substeps = report.substeps,
                    "Frame cancelled"
                );
                break;
            }
            report.diagnostics += self.substep();
            report.substeps += 1;
        }

        report.completed = report.substeps == self.params.substeps;
        if report.completed {
            self.frame += 1;
        }

        if self.is_unstable(&report.diagnostics) {
            warn!(
                frame = self.frame,
                deformation_clamps = report.diagnostics.deformation_clamps,
                velocity_clamps = report.diagnostics.velocity_clamps,
                "Numerical instability: {:.3} clamps per particle this frame, consider a smaller time step",
                self.clamps_per_particle(&report.diagnostics)
            );
        }

        debug!(
            frame = self.frame,
            time = self.time,
            kinetic_energy = self.total_energy(),
            "Finished frame"
        );

        report
    }

    /// Clamp events summed over every substep, divided by the particle count. A particle clamped
    /// in every substep of a frame counts once per substep.
    pub fn clamps_per_particle(&self, diagnostics: &StepDiagnostics) -> T {
        diagnostics.total() as T / self.particles.len().max(1) as T
    }

    fn is_unstable(&self, diagnostics: &StepDiagnostics) -> bool {
        self.clamps_per_particle(diagnostics) > self.params.instability_warn_fraction
    }

    pub fn positions(&self) -> &[TV] {
        &self.particles.position
    }

    /// The group index of every particle, parallel to `positions`.
    pub fn group_ids(&self) -> &[usize] {
        &self.particles.group
    }

    pub fn groups(&self) -> &[ParticleGroup] {
        &self.particles.groups
    }

    pub fn snapshot(&self) -> Frame {
        Frame {
            index: self.frame,
            time: self.time,
            positions: self.particles.position.clone(),
            group_ids: self.particles.group.clone(),
        }
    }

    /// Ends the simulation, releasing its storage. Returns the final statistics.
    pub fn shutdown(self) -> StatisticsSummary {
        let summary = self.summary();
        info!(
            frames = self.frame,
            substeps = self.substeps_run,
            time = self.time,
            "Simulation finished"
        );
        summary
    }
}
