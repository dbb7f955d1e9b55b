mod data;
mod particle_grid_weights;
mod scatter;

pub use data::GridData;
pub use particle_grid_weights::{kernel, Stencil, STENCIL_SIZE};
pub use scatter::{atomic_add, AtomicGrid, Deposit, PartialGrid, ScatterBuffers, ScatterMode};

use super::MpmParameters;
use crate::math::{DIM, T, TV, UV};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// What the grid `velocity` array currently holds. Only `update_velocities` turns momentum into
/// velocity, so G2P can check it is reading the right thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridContents {
    Momentum,
    Velocity,
}

/// How grid nodes within `boundary_thickness` of a wall treat velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// Only the velocity component pointing into the wall is zeroed.
    Slip,
    /// The whole velocity is zeroed.
    Sticky,
}

impl Default for BoundaryCondition {
    fn default() -> Self {
        BoundaryCondition::Slip
    }
}

impl BoundaryCondition {
    fn apply(self, coord: UV, size: UV, thickness: usize, v: &mut TV) {
        for axis in 0..DIM {
            let near_low = coord[axis] < thickness;
            let near_high = coord[axis] + thickness >= size[axis];
            match self {
                BoundaryCondition::Slip => {
                    if (near_low && v[axis] < 0.) || (near_high && v[axis] > 0.) {
                        v[axis] = 0.;
                    }
                }
                BoundaryCondition::Sticky => {
                    if near_low || near_high {
                        *v = TV::zeros();
                        return;
                    }
                }
            }
        }
    }
}

/// Stores the grid data for the Mpm Simulation
pub struct MpmGrid {
    pub mass: Vec<T>,
    /// Momentum after P2G, velocity after `update_velocities`. See `contents`.
    pub velocity: Vec<TV>,
    pub contents: GridContents,
    pub data: GridData,
}

impl MpmGrid {
    pub fn new(params: &MpmParameters) -> Self {
        let data = GridData::new(
            params.h,
            params.domain_origin,
            UV::from_element(params.grid_resolution),
        );

        Self {
            mass: vec![0.; data.num_cells],
            velocity: vec![TV::zeros(); data.num_cells],
            contents: GridContents::Momentum,
            data,
        }
    }

    /// Fills each of the arrays in the grid with zeros.
    pub fn clear_grid(&mut self) {
        self.mass.par_iter_mut().for_each(|m| *m = 0.);
        self.velocity.par_iter_mut().for_each(|v| *v = TV::zeros());
        self.contents = GridContents::Momentum;
    }

    pub fn total_mass(&self) -> T {
        self.mass.iter().sum()
    }

    pub fn total_momentum(&self) -> TV {
        match self.contents {
            GridContents::Momentum => self.velocity.iter().sum(),
            GridContents::Velocity => self
                .mass
                .iter()
                .zip(self.velocity.iter())
                .map(|(m, v)| *m * *v)
                .sum(),
        }
    }

    /// Turns the accumulated momentum into velocity, applies gravity, and enforces the boundary
    /// condition on the nodes near the walls. Nodes without mass end up with zero velocity.
    pub fn update_velocities(
        &mut self,
        gravity: TV,
        delta_time: T,
        boundary: BoundaryCondition,
        thickness: usize,
    ) {
        debug_assert_eq!(self.contents, GridContents::Momentum);

        let data = &self.data;
        self.mass
            .par_iter()
            .zip(self.velocity.par_iter_mut())
            .enumerate()
            .for_each(|(i, (&mass, v))| {
                if mass <= 0. {
                    *v = TV::zeros();
                    return;
                }

                *v = *v / mass + gravity * delta_time;
                boundary.apply(data.index_to_coord(i), data.size, thickness, v);
            });

        self.contents = GridContents::Velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> MpmGrid {
        let params = MpmParameters {
            grid_resolution: 16,
            ..Default::default()
        };
        MpmGrid::new(&params)
    }

    fn set(grid: &mut MpmGrid, coord: UV, mass: T, momentum: TV) {
        let i = grid.data.coord_to_index(coord);
        grid.mass[i] = mass;
        grid.velocity[i] = momentum;
    }

    fn velocity_at(grid: &MpmGrid, coord: UV) -> TV {
        grid.velocity[grid.data.coord_to_index(coord)]
    }

    #[test]
    fn test_update_velocities() {
        let mut grid = grid();
        let center = UV::new(8, 8);
        set(&mut grid, center, 2., TV::new(4., 2.));
        assert_eq!(grid.total_momentum(), TV::new(4., 2.));

        grid.update_velocities(TV::new(0., -10.), 0.1, BoundaryCondition::Slip, 3);
        assert_eq!(grid.contents, GridContents::Velocity);
        assert!((velocity_at(&grid, center) - TV::new(2., 0.)).norm() < 1e-12);
        assert!((grid.total_momentum() - TV::new(4., 0.)).norm() < 1e-12);
        assert!(velocity_at(&grid, UV::new(1, 1)).norm() == 0.);

        grid.clear_grid();
        assert_eq!(grid.total_mass(), 0.);
        assert_eq!(grid.contents, GridContents::Momentum);
    }

    #[test]
    fn test_slip_boundary() {
        let mut grid = grid();
        let wall = UV::new(2, 8);
        let far_wall = UV::new(13, 8);
        for &coord in &[wall, far_wall] {
            set(&mut grid, coord, 1., TV::new(-1., 3.));
        }

        grid.update_velocities(TV::zeros(), 0.1, BoundaryCondition::Slip, 3);

        // moving into the left wall, away from the right one
        assert_eq!(velocity_at(&grid, wall), TV::new(0., 3.));
        assert_eq!(velocity_at(&grid, far_wall), TV::new(-1., 3.));
    }

    #[test]
    fn test_sticky_boundary() {
        let mut grid = grid();
        let wall = UV::new(8, 15);
        let inside = UV::new(8, 12);
        for &coord in &[wall, inside] {
            set(&mut grid, coord, 1., TV::new(1., -1.));
        }

        grid.update_velocities(TV::zeros(), 0.1, BoundaryCondition::Sticky, 3);
        assert_eq!(velocity_at(&grid, wall), TV::zeros());
        assert_eq!(velocity_at(&grid, inside), TV::new(1., -1.));
    }
}
