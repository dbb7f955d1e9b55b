use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Counts of particles whose state G2P had to repair to keep the simulation finite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDiagnostics {
    /// Deformation gradients with a non-finite or too small determinant.
    pub deformation_clamps: usize,
    /// Velocities that were non-finite or faster than `max_velocity`.
    pub velocity_clamps: usize,
}

impl StepDiagnostics {
    pub fn merge(self, other: StepDiagnostics) -> StepDiagnostics {
        StepDiagnostics {
            deformation_clamps: self.deformation_clamps + other.deformation_clamps,
            velocity_clamps: self.velocity_clamps + other.velocity_clamps,
        }
    }

    pub fn total(&self) -> usize {
        self.deformation_clamps + self.velocity_clamps
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for StepDiagnostics {
    fn add_assign(&mut self, other: StepDiagnostics) {
        *self = self.merge(other);
    }
}
