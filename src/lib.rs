//! A 2D Moving-Least-Squares Material Point Method (MLS-MPM) simulator.
//!
//! Particles carry mass, velocity and deformation state. Every substep their momentum is scattered
//! onto a background grid, the grid velocities are updated (gravity, walls), and the particles
//! gather the new velocity field back, updating their deformation gradients along the way.
//!
//! The host only needs [`MpmSimulation::initialize`], [`MpmSimulation::advance`] and
//! [`MpmSimulation::positions`]; everything else is exposed for diagnostics and tests.

extern crate nalgebra as na;

pub mod error;
pub mod initial_condition;
pub mod mpm;
pub mod sink;
pub mod statistics;
pub mod util;

pub use error::ConfigError;
pub use initial_condition::{Disk, InitialCondition, ParticleGroupConfig, Region, Square};
pub use mpm::{
    BoundaryCondition, FrameReport, Material, MpmParameters, MpmSimulation, PlasticityBounds,
    ScatterMode, StepDiagnostics,
};
pub use sink::Frame;
pub use statistics::{SimulationStatistics, StatisticsSummary};

pub mod math {
    pub const DIM: usize = 2;

    pub type T = f64;
    pub type TV = na::SVector<T, DIM>;
    pub type UV = na::SVector<usize, DIM>;

    pub type Mat = na::SMatrix<T, DIM, DIM>;

    /// The outer product `a ⊗ b = a bᵀ`.
    pub fn outer(a: &TV, b: &TV) -> Mat {
        a * b.transpose()
    }

    /// The 2D cross product, i.e. the z component of `a × b`.
    pub fn cross(a: &TV, b: &TV) -> T {
        a.x * b.y - a.y * b.x
    }
}
