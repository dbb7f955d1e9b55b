use crate::error::ConfigError;
use crate::math::{T, TV};
use crate::mpm::MpmParticles;
use crate::util::RangeExt;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A region that particles can be seeded into.
pub trait InitialCondition {
    fn num_particles(&self) -> usize;

    /// The smallest axis-aligned box containing the region.
    fn bounds(&self) -> Range<TV>;

    /// Draws one position uniformly from the region.
    fn sample_position<R: Rng>(&self, rng: &mut R) -> TV;

    fn add_particles<R: Rng>(&self, rng: &mut R, mut add_particle: impl FnMut(TV)) {
        for _ in 0..self.num_particles() {
            add_particle(self.sample_position(rng));
        }
    }
}

/// An axis-aligned square, `center ± half_size` along each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Square {
    pub center: TV,
    pub half_size: T,
    pub num_particles: usize,
}

impl Default for Square {
    fn default() -> Self {
        Square {
            center: TV::zeros(),
            half_size: 0.75,
            num_particles: 1024,
        }
    }
}

impl InitialCondition for Square {
    fn num_particles(&self) -> usize {
        self.num_particles
    }

    fn bounds(&self) -> Range<TV> {
        let half = TV::from_element(self.half_size);
        self.center - half..self.center + half
    }

    fn sample_position<R: Rng>(&self, rng: &mut R) -> TV {
        let rand: TV = rng.gen::<[T; 2]>().into();
        self.center + (rand * 2. - TV::from_element(1.)) * self.half_size
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Disk {
    pub center: TV,
    pub radius: T,
    pub num_particles: usize,
}

impl Default for Disk {
    fn default() -> Self {
        Disk {
            center: TV::zeros(),
            radius: 0.75,
            num_particles: 1024,
        }
    }
}

impl InitialCondition for Disk {
    fn num_particles(&self) -> usize {
        self.num_particles
    }

    fn bounds(&self) -> Range<TV> {
        let r = TV::from_element(self.radius);
        self.center - r..self.center + r
    }

    fn sample_position<R: Rng>(&self, rng: &mut R) -> TV {
        loop {
            let rand: TV = rng.gen::<[T; 2]>().into();
            let pos = rand * 2. - TV::from_element(1.);

            if pos.magnitude_squared() < 1. {
                break self.center + pos * self.radius;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Region {
    Square(Square),
    Disk(Disk),
}

impl Default for Region {
    fn default() -> Self {
        Region::Square(Square::default())
    }
}

impl Region {
    /// The half-size or radius.
    fn extent(&self) -> T {
        match self {
            Region::Square(s) => s.half_size,
            Region::Disk(d) => d.radius,
        }
    }
}

impl InitialCondition for Region {
    fn num_particles(&self) -> usize {
        match self {
            Region::Square(s) => s.num_particles(),
            Region::Disk(d) => d.num_particles(),
        }
    }

    fn bounds(&self) -> Range<TV> {
        match self {
            Region::Square(s) => s.bounds(),
            Region::Disk(d) => d.bounds(),
        }
    }

    fn sample_position<R: Rng>(&self, rng: &mut R) -> TV {
        match self {
            Region::Square(s) => s.sample_position(rng),
            Region::Disk(d) => d.sample_position(rng),
        }
    }
}

/// One group of particles in the initial scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleGroupConfig {
    pub name: String,
    /// RGBA
    pub color: [f32; 4],
    pub region: Region,
    /// Seed of the random number generator used to place this group's particles.
    pub seed: u64,
    /// Initial velocity of every particle in the group.
    pub velocity: TV,
}

impl Default for ParticleGroupConfig {
    fn default() -> Self {
        ParticleGroupConfig {
            name: "particles".into(),
            color: [1.; 4],
            region: Region::default(),
            seed: 0,
            velocity: TV::zeros(),
        }
    }
}

impl ParticleGroupConfig {
    pub fn square(name: &str, color: [f32; 4], center: TV, half_size: T, seed: u64) -> Self {
        ParticleGroupConfig {
            name: name.into(),
            color,
            region: Region::Square(Square {
                center,
                half_size,
                ..Default::default()
            }),
            seed,
            velocity: TV::zeros(),
        }
    }

    /// Checks the group is non-empty and fits in `domain`.
    pub fn validate(&self, domain: &Range<TV>) -> Result<(), ConfigError> {
        if self.region.num_particles() == 0 {
            return Err(ConfigError::EmptyGroup {
                group: self.name.clone(),
            });
        }

        let size = self.region.extent();
        if !(size > 0.) || !size.is_finite() {
            return Err(ConfigError::RegionSize {
                group: self.name.clone(),
                size,
            });
        }

        if !domain.contains_range(&self.region.bounds()) {
            return Err(ConfigError::RegionOutsideDomain {
                group: self.name.clone(),
            });
        }

        Ok(())
    }

    /// Seeds this group into `particles`. Every particle starts undeformed with the group velocity.
    pub(crate) fn seed_into(&self, particles: &mut MpmParticles, mass: T, volume: T) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let group = particles.begin_group(self.name.clone(), self.color);

        let velocity = self.velocity;
        self.region.add_particles(&mut rng, |pos| {
            particles.add_particle(mass, volume, pos, velocity, group)
        });

        particles.end_group(group);
    }
}
