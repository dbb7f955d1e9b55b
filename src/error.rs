use crate::math::T;
use std::fmt;

/// An invalid simulation configuration, reported by [`crate::MpmSimulation::initialize`] before
/// any simulation state is allocated.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    GridResolution(usize),
    CellSize(T),
    TimeStep(T),
    Substeps(usize),
    BoundaryThickness { thickness: usize, resolution: usize },
    ParticleDensity(T),
    MaxVelocity(T),
    WarnFraction(T),
    Partitions(usize),
    NoParticles,
    EmptyGroup { group: String },
    RegionSize { group: String, size: T },
    RegionOutsideDomain { group: String },
    Material(String),
    PlasticBounds { min: T, max: T },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConfigError::*;
        match self {
            GridResolution(res) => write!(
                f,
                "grid resolution must be at least 3 nodes per axis, got {}",
                res
            ),
            CellSize(h) => write!(f, "cell size must be positive and finite, got {}", h),
            TimeStep(dt) => write!(f, "time step must be positive and finite, got {}", dt),
            Substeps(n) => write!(f, "substep count must be positive, got {}", n),
            BoundaryThickness {
                thickness,
                resolution,
            } => write!(
                f,
                "boundary thickness of {} nodes leaves no interior in a grid of {} nodes",
                thickness, resolution
            ),
            ParticleDensity(rho) => write!(f, "particle density must be positive, got {}", rho),
            MaxVelocity(v) => write!(f, "velocity bound must be positive, got {}", v),
            WarnFraction(x) => write!(
                f,
                "instability warning threshold must be non-negative and finite, got {}",
                x
            ),
            Partitions(n) => write!(f, "scatter partition count must be positive, got {}", n),
            NoParticles => write!(f, "no particle groups configured"),
            EmptyGroup { group } => write!(f, "particle group {:?} has no particles", group),
            RegionSize { group, size } => write!(
                f,
                "seed region of group {:?} must have a positive size, got {}",
                group, size
            ),
            RegionOutsideDomain { group } => write!(
                f,
                "seed region of group {:?} is not inside the simulation domain",
                group
            ),
            Material(reason) => write!(f, "invalid material: {}", reason),
            PlasticBounds { min, max } => write!(
                f,
                "plastic volume bounds must satisfy 0 < min <= 1 <= max, got [{}, {}]",
                min, max
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
