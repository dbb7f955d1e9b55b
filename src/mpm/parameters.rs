use super::grid::{BoundaryCondition, GridData, ScatterMode};
use super::models::Material;
use crate::error::ConfigError;
use crate::initial_condition::{InitialCondition, ParticleGroupConfig};
use crate::math::{T, TV, UV};
use serde::{Deserialize, Serialize};

/// Bounds the plastic volume ratio `Jp` is clamped into after every G2P.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlasticityBounds {
    pub jp_min: T,
    pub jp_max: T,
}

impl Default for PlasticityBounds {
    fn default() -> Self {
        PlasticityBounds {
            jp_min: 0.85,
            jp_max: 5.,
        }
    }
}

impl PlasticityBounds {
    pub fn clamp(&self, plastic_volume_ratio: T) -> T {
        plastic_volume_ratio.max(self.jp_min).min(self.jp_max)
    }
}

/// Everything needed to set up a simulation. Every field has a default, so a config file only
/// has to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpmParameters {
    /// The number of grid nodes along each axis.
    pub grid_resolution: usize,
    /// The grid spacing
    #[serde(alias = "cell_size")]
    pub h: T,
    /// World position of grid node (0, 0).
    pub domain_origin: TV,
    /// Simulated time covered by one call to `advance`. Each substep advances
    /// `delta_time / substeps`.
    pub delta_time: T,
    pub substeps: usize,
    pub gravity: TV,
    /// Number of nodes next to each wall on which the boundary condition is enforced.
    pub boundary_thickness: usize,
    pub boundary: BoundaryCondition,
    /// Rest density; particle mass is `particle_density * particle_volume()`.
    pub particle_density: T,
    pub material: Material,
    pub plasticity: PlasticityBounds,
    /// Particle speeds above this are scaled back down in G2P.
    pub max_velocity: T,
    /// A warning is logged when a frame has more clamp events per particle than this, counting
    /// every substep.
    pub instability_warn_fraction: T,
    pub scatter: ScatterMode,
    /// Number of particle partitions for `ScatterMode::Partitioned`.
    pub partitions: usize,
    pub groups: Vec<ParticleGroupConfig>,
}

impl Default for MpmParameters {
    fn default() -> Self {
        MpmParameters {
            grid_resolution: 80,
            h: 0.125,
            domain_origin: TV::from_element(-5.),
            delta_time: 1. / 120.,
            substeps: 10,
            gravity: TV::new(0., -9.8),
            boundary_thickness: 3,
            boundary: BoundaryCondition::default(),
            particle_density: 10.,
            material: Material::default(),
            plasticity: PlasticityBounds::default(),
            max_velocity: 50.,
            instability_warn_fraction: 0.01,
            scatter: ScatterMode::default(),
            partitions: 16,
            groups: vec![
                ParticleGroupConfig::square(
                    "red",
                    [0.93, 0.33, 0.23, 0.8],
                    TV::new(0.5, 0.25),
                    0.75,
                    0,
                ),
                ParticleGroupConfig::square(
                    "orange",
                    [0.95, 0.69, 0.20, 0.8],
                    TV::new(0., 2.),
                    0.75,
                    1,
                ),
                ParticleGroupConfig::square(
                    "teal",
                    [0.09, 0.52, 0.53, 0.8],
                    TV::new(0.5, 3.75),
                    0.75,
                    2,
                ),
            ],
        }
    }
}

impl MpmParameters {
    /// Checks every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_resolution < 3 {
            return Err(ConfigError::GridResolution(self.grid_resolution));
        }
        if !(self.h > 0.) || !self.h.is_finite() {
            return Err(ConfigError::CellSize(self.h));
        }
        if !(self.delta_time > 0.) || !self.delta_time.is_finite() {
            return Err(ConfigError::TimeStep(self.delta_time));
        }
        if self.substeps == 0 {
            return Err(ConfigError::Substeps(self.substeps));
        }
        // The wall bands must leave room for particles.
        if 2 * self.boundary_thickness + 1 > self.grid_resolution {
            return Err(ConfigError::BoundaryThickness {
                thickness: self.boundary_thickness,
                resolution: self.grid_resolution,
            });
        }
        if !(self.particle_density > 0.) || !self.particle_density.is_finite() {
            return Err(ConfigError::ParticleDensity(self.particle_density));
        }
        if !(self.max_velocity > 0.) {
            return Err(ConfigError::MaxVelocity(self.max_velocity));
        }
        if !(self.instability_warn_fraction >= 0.) || !self.instability_warn_fraction.is_finite() {
            return Err(ConfigError::WarnFraction(self.instability_warn_fraction));
        }
        if self.partitions == 0 {
            return Err(ConfigError::Partitions(self.partitions));
        }

        self.material.validate()?;

        let PlasticityBounds { jp_min, jp_max } = self.plasticity;
        if !(jp_min > 0. && jp_min <= 1. && 1. <= jp_max && jp_max.is_finite()) {
            return Err(ConfigError::PlasticBounds {
                min: jp_min,
                max: jp_max,
            });
        }

        if self.groups.is_empty() {
            return Err(ConfigError::NoParticles);
        }
        let domain = self.grid_data().inside_walls(self.boundary_thickness);
        for group in &self.groups {
            group.validate(&domain)?;
        }

        Ok(())
    }

    pub(crate) fn grid_data(&self) -> GridData {
        GridData::new(
            self.h,
            self.domain_origin,
            UV::from_element(self.grid_resolution),
        )
    }

    /// The time step of a single substep.
    pub fn substep_dt(&self) -> T {
        self.delta_time / self.substeps as T
    }

    /// Rest volume of a particle, a quarter of a cell.
    pub fn particle_volume(&self) -> T {
        (self.h * 0.5).powi(2)
    }

    pub fn particle_mass(&self) -> T {
        self.particle_density * self.particle_volume()
    }

    pub fn num_particles(&self) -> usize {
        self.groups.iter().map(|g| g.region.num_particles()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initial_condition::{Disk, Region};
    use crate::mpm::models::{IsotropicParameters, NeoHookean};

    #[test]
    fn test_defaults_are_valid() {
        let params = MpmParameters::default();
        assert_eq!(params.validate(), Ok(()));
        assert_eq!(params.num_particles(), 3 * 1024);
        assert!((params.substep_dt() - 1. / 1200.).abs() < 1e-15);
        assert_eq!(params.particle_volume(), 0.0625 * 0.0625);
        assert_eq!(params.particle_mass(), 10. * 0.0625 * 0.0625);
    }

    fn rejects(change: impl FnOnce(&mut MpmParameters)) -> ConfigError {
        let mut params = MpmParameters::default();
        change(&mut params);
        match params.validate() {
            Err(e) => e,
            Ok(()) => panic!("invalid parameters accepted: {:?}", params),
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(
            rejects(|p| p.grid_resolution = 2),
            ConfigError::GridResolution(2)
        );
        assert_eq!(rejects(|p| p.h = 0.), ConfigError::CellSize(0.));
        assert_eq!(rejects(|p| p.h = -0.1), ConfigError::CellSize(-0.1));
        assert_eq!(rejects(|p| p.delta_time = 0.), ConfigError::TimeStep(0.));
        assert!(matches!(
            rejects(|p| p.delta_time = T::NAN),
            ConfigError::TimeStep(_)
        ));
        assert_eq!(rejects(|p| p.substeps = 0), ConfigError::Substeps(0));
        assert_eq!(
            rejects(|p| p.boundary_thickness = 40),
            ConfigError::BoundaryThickness {
                thickness: 40,
                resolution: 80
            }
        );
        assert_eq!(
            rejects(|p| p.particle_density = 0.),
            ConfigError::ParticleDensity(0.)
        );
        assert_eq!(rejects(|p| p.max_velocity = 0.), ConfigError::MaxVelocity(0.));
        assert_eq!(
            rejects(|p| p.instability_warn_fraction = -0.5),
            ConfigError::WarnFraction(-0.5)
        );
        assert!(matches!(
            rejects(|p| p.instability_warn_fraction = T::NAN),
            ConfigError::WarnFraction(_)
        ));
        assert!(matches!(
            rejects(|p| p.instability_warn_fraction = T::INFINITY),
            ConfigError::WarnFraction(_)
        ));
        assert_eq!(rejects(|p| p.partitions = 0), ConfigError::Partitions(0));
        assert_eq!(rejects(|p| p.groups.clear()), ConfigError::NoParticles);
        assert!(matches!(
            rejects(|p| p.material = Material::NeoHookean(NeoHookean(IsotropicParameters::new(
                1000., 0.5
            )))),
            ConfigError::Material(_)
        ));
    }

    #[test]
    fn test_invalid_plasticity_bounds() {
        for &(jp_min, jp_max) in &[(0., 5.), (-1., 5.), (1.2, 5.), (0.5, 0.9), (0.9, T::INFINITY)] {
            assert_eq!(
                rejects(|p| p.plasticity = PlasticityBounds { jp_min, jp_max }),
                ConfigError::PlasticBounds {
                    min: jp_min,
                    max: jp_max
                }
            );
        }
    }

    #[test]
    fn test_invalid_groups() {
        assert!(matches!(
            rejects(|p| p.groups[1].region = Region::Disk(Disk {
                center: TV::new(10., 0.),
                ..Default::default()
            })),
            ConfigError::RegionOutsideDomain { .. }
        ));
        // shrinking the domain pushes the default squares out of it
        assert!(matches!(
            rejects(|p| p.h = 0.05),
            ConfigError::RegionOutsideDomain { .. }
        ));
        assert!(matches!(
            rejects(|p| p.groups[2].region = Region::Disk(Disk {
                num_particles: 0,
                ..Default::default()
            })),
            ConfigError::EmptyGroup { .. }
        ));
    }

    #[test]
    fn test_plasticity_clamp() {
        let bounds = PlasticityBounds::default();
        assert_eq!(bounds.clamp(0.1), 0.85);
        assert_eq!(bounds.clamp(1.), 1.);
        assert_eq!(bounds.clamp(100.), 5.);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "cell_size": 0.1,
            "substeps": 4,
            "boundary": "sticky",
            "material": { "model": "fluid", "bulk_modulus": 400 },
            "groups": [{ "name": "ball", "region": { "shape": "disk", "radius": 0.5 } }]
        }"#;
        let params: MpmParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.h, 0.1);
        assert_eq!(params.substeps, 4);
        assert_eq!(params.boundary, BoundaryCondition::Sticky);
        assert_eq!(params.grid_resolution, 80);
        assert_eq!(params.groups.len(), 1);
        assert_eq!(params.num_particles(), 1024);
        assert_eq!(params.validate(), Ok(()));

        let empty: MpmParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, MpmParameters::default());

        let roundtrip: MpmParameters =
            serde_json::from_str(&serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(roundtrip, params);
    }
}
