use crate::math::{Mat, T, TV};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A named set of particles seeded together. Its particles occupy `range` in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleGroup {
    pub name: String,
    /// RGBA, for display sinks.
    pub color: [f32; 4],
    pub range: Range<usize>,
}

/// Contains all of the particle data: position, velocity, deformation, etc.
#[derive(Debug, Clone, Default)]
pub struct MpmParticles {
    pub mass: Vec<T>,
    pub initial_volume: Vec<T>,
    pub position: Vec<TV>,
    pub velocity: Vec<TV>,
    pub deformation_gradient: Vec<Mat>,
    /// The APIC affine matrix `C`. Overwritten by every G2P.
    pub affine_matrix: Vec<Mat>,
    /// `Jp`, the volume change absorbed by plastic flow.
    pub plastic_volume_ratio: Vec<T>,
    /// Index into `groups` for every particle.
    pub group: Vec<usize>,
    pub groups: Vec<ParticleGroup>,
}

impl MpmParticles {
    /// Adds a new particle at rest in the undeformed state.
    pub(crate) fn add_particle(
        &mut self,
        mass: T,
        initial_volume: T,
        position: TV,
        velocity: TV,
        group: usize,
    ) {
        self.mass.push(mass);
        self.initial_volume.push(initial_volume);
        self.position.push(position);
        self.velocity.push(velocity);
        self.deformation_gradient.push(Mat::identity());
        self.affine_matrix.push(Mat::zeros());
        self.plastic_volume_ratio.push(1.);
        self.group.push(group);
    }

    /// Starts a new group. Particles added until the next call belong to it.
    pub(crate) fn begin_group(&mut self, name: String, color: [f32; 4]) -> usize {
        let start = self.len();
        self.groups.push(ParticleGroup {
            name,
            color,
            range: start..start,
        });
        self.groups.len() - 1
    }

    pub(crate) fn end_group(&mut self, group: usize) {
        let end = self.len();
        if let Some(g) = self.groups.get_mut(group) {
            g.range.end = end;
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn total_mass(&self) -> T {
        self.mass.iter().sum()
    }

    pub fn total_momentum(&self) -> TV {
        self.mass
            .iter()
            .zip(&self.velocity)
            .map(|(&m, v)| m * v)
            .sum()
    }

    /// Mass-weighted mean position of a group, `None` if the group is empty or unknown.
    pub fn centroid(&self, group: usize) -> Option<TV> {
        let range = self.groups.get(group)?.range.clone();
        let mass: T = self.mass[range.clone()].iter().sum();
        if range.is_empty() || mass <= 0. {
            return None;
        }

        let weighted: TV = self.mass[range.clone()]
            .iter()
            .zip(&self.position[range])
            .map(|(&m, x)| m * x)
            .sum();
        Some(weighted / mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_and_totals() {
        let mut particles = MpmParticles::default();
        assert!(particles.is_empty());

        let a = particles.begin_group("a".into(), [1.; 4]);
        particles.add_particle(1., 0.1, TV::new(0., 0.), TV::new(1., 0.), a);
        particles.add_particle(3., 0.1, TV::new(4., 0.), TV::new(0., 1.), a);
        particles.end_group(a);

        let b = particles.begin_group("b".into(), [0.; 4]);
        particles.end_group(b);

        assert_eq!(particles.len(), 2);
        assert_eq!(particles.groups[a].range, 0..2);
        assert!(particles.groups[b].range.is_empty());
        assert_eq!(particles.total_mass(), 4.);
        assert_eq!(particles.total_momentum(), TV::new(1., 3.));
        assert_eq!(particles.centroid(a), Some(TV::new(3., 0.)));
        assert_eq!(particles.centroid(b), None);
        assert_eq!(particles.centroid(7), None);

        assert_eq!(particles.deformation_gradient[1], Mat::identity());
        assert_eq!(particles.plastic_volume_ratio, vec![1., 1.]);
    }
}
