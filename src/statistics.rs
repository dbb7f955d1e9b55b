use crate::math::{cross, T, TV};
use crate::MpmSimulation;
use itertools::izip;
use serde::{Deserialize, Serialize};

pub trait SimulationStatistics {
    fn total_time(&self) -> T;
    fn total_mass(&self) -> T;
    fn total_linear_momentum(&self) -> TV;
    /// Angular momentum about the origin. In 2D this is a scalar.
    fn total_angular_momentum(&self) -> T;
    fn total_energy(&self) -> T;
    fn total_volume(&self) -> T;

    fn summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            time: self.total_time(),
            mass: self.total_mass(),
            linear_momentum: self.total_linear_momentum(),
            angular_momentum: self.total_angular_momentum(),
            kinetic_energy: self.total_energy(),
            volume: self.total_volume(),
        }
    }
}

/// A snapshot of every statistic, e.g. for logging or returning from `shutdown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub time: T,
    pub mass: T,
    pub linear_momentum: TV,
    pub angular_momentum: T,
    pub kinetic_energy: T,
    pub volume: T,
}

impl SimulationStatistics for MpmSimulation {
    fn total_time(&self) -> T {
        self.time
    }

    fn total_mass(&self) -> T {
        self.particles.total_mass()
    }

    fn total_linear_momentum(&self) -> TV {
        self.particles.total_momentum()
    }

    fn total_angular_momentum(&self) -> T {
        izip!(
            &self.particles.mass,
            &self.particles.velocity,
            &self.particles.position
        )
        .map(|(&m, v, x)| m * cross(x, v))
        .sum()
    }

    /// Kinetic energy only.
    fn total_energy(&self) -> T {
        self.particles
            .mass
            .iter()
            .zip(&self.particles.velocity)
            .map(|(&m, v)| 0.5 * m * v.dot(v))
            .sum()
    }

    fn total_volume(&self) -> T {
        #![allow(non_snake_case)]
        self.particles
            .deformation_gradient
            .iter()
            .zip(&self.particles.initial_volume)
            .map(|(F, &init_volume)| F.determinant() * init_volume)
            .sum()
    }
}
