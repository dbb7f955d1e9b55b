use crate::math::{DIM, T, TV};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// How concurrent particle contributions to a shared grid node are combined during P2G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterMode {
    /// Particles are split into a fixed number of contiguous partitions, each scattered into a
    /// private grid, and the private grids are summed in partition order. Results do not depend
    /// on the thread count or scheduling.
    Partitioned,
    /// All threads add into one grid of atomics. Uses less memory, but the floating point sums
    /// depend on the order threads reach each node.
    Atomic,
}

impl Default for ScatterMode {
    fn default() -> Self {
        ScatterMode::Partitioned
    }
}

/// Something a single particle can deposit mass and momentum into.
pub trait Deposit {
    fn deposit(&mut self, index: usize, mass: T, momentum: TV);
}

/// A private accumulation grid, owned by one partition of the particles.
#[derive(Debug, Clone)]
pub struct PartialGrid {
    pub mass: Vec<T>,
    pub momentum: Vec<TV>,
}

impl PartialGrid {
    fn new(num_cells: usize) -> Self {
        PartialGrid {
            mass: vec![0.; num_cells],
            momentum: vec![TV::zeros(); num_cells],
        }
    }

    fn clear(&mut self) {
        self.mass.iter_mut().for_each(|m| *m = 0.);
        self.momentum.iter_mut().for_each(|p| *p = TV::zeros());
    }
}

impl Deposit for PartialGrid {
    fn deposit(&mut self, index: usize, mass: T, momentum: TV) {
        self.mass[index] += mass;
        self.momentum[index] += momentum;
    }
}

/// Adds `value` to the `f64` stored bitwise in `cell`.
pub fn atomic_add(cell: &AtomicU64, value: T) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let new = (T::from_bits(current) + value).to_bits();
        match cell.compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

/// A grid whose nodes may be accumulated into from many threads at once.
#[derive(Debug)]
pub struct AtomicGrid {
    mass: Vec<AtomicU64>,
    momentum: Vec<[AtomicU64; DIM]>,
}

impl AtomicGrid {
    fn new(num_cells: usize) -> Self {
        let zero = 0f64.to_bits();
        AtomicGrid {
            mass: (0..num_cells).map(|_| AtomicU64::new(zero)).collect(),
            momentum: (0..num_cells)
                .map(|_| [AtomicU64::new(zero), AtomicU64::new(zero)])
                .collect(),
        }
    }

    fn clear(&mut self) {
        let zero = 0f64.to_bits();
        self.mass
            .par_iter_mut()
            .zip(self.momentum.par_iter_mut())
            .for_each(|(m, p)| {
                *m.get_mut() = zero;
                p.iter_mut().for_each(|c| *c.get_mut() = zero);
            });
    }

    pub fn add(&self, index: usize, mass: T, momentum: TV) {
        atomic_add(&self.mass[index], mass);
        for (cell, value) in self.momentum[index].iter().zip(momentum.iter()) {
            atomic_add(cell, *value);
        }
    }

    pub fn load(&self, index: usize) -> (T, TV) {
        let mass = T::from_bits(self.mass[index].load(Ordering::Relaxed));
        let [px, py] = &self.momentum[index];
        let momentum = TV::new(
            T::from_bits(px.load(Ordering::Relaxed)),
            T::from_bits(py.load(Ordering::Relaxed)),
        );
        (mass, momentum)
    }
}

impl Deposit for &AtomicGrid {
    fn deposit(&mut self, index: usize, mass: T, momentum: TV) {
        self.add(index, mass, momentum);
    }
}

/// Accumulation buffers for P2G, allocated once at initialization and reused every substep.
#[derive(Debug)]
pub enum ScatterBuffers {
    Partitioned {
        partition_size: usize,
        partials: Vec<PartialGrid>,
    },
    Atomic(AtomicGrid),
}

impl ScatterBuffers {
    pub fn new(
        mode: ScatterMode,
        partitions: usize,
        num_particles: usize,
        num_cells: usize,
    ) -> Self {
        match mode {
            ScatterMode::Partitioned => {
                let partitions = partitions.max(1).min(num_particles.max(1));
                let partition_size = (num_particles + partitions - 1) / partitions;
                tracing::debug!(
                    "Scattering with {} partitions of {} particles",
                    partitions,
                    partition_size
                );
                ScatterBuffers::Partitioned {
                    partition_size: partition_size.max(1),
                    partials: (0..partitions).map(|_| PartialGrid::new(num_cells)).collect(),
                }
            }
            ScatterMode::Atomic => ScatterBuffers::Atomic(AtomicGrid::new(num_cells)),
        }
    }

    pub fn mode(&self) -> ScatterMode {
        match self {
            ScatterBuffers::Partitioned { .. } => ScatterMode::Partitioned,
            ScatterBuffers::Atomic(_) => ScatterMode::Atomic,
        }
    }

    pub fn clear(&mut self) {
        match self {
            ScatterBuffers::Partitioned { partials, .. } => {
                partials.par_iter_mut().for_each(PartialGrid::clear)
            }
            ScatterBuffers::Atomic(grid) => grid.clear(),
        }
    }

    /// Runs `scatter_particle` for every particle in `0..num_particles`, then adds the
    /// accumulated totals into `mass` and `momentum`.
    pub fn scatter<F>(
        &mut self,
        num_particles: usize,
        mass: &mut [T],
        momentum: &mut [TV],
        scatter_particle: F,
    ) where
        F: Fn(usize, &mut dyn Deposit) + Sync,
    {
        self.clear();
        match self {
            ScatterBuffers::Partitioned {
                partition_size,
                partials,
            } => {
                let partition_size = *partition_size;
                partials
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(k, partial)| {
                        let start = (k * partition_size).min(num_particles);
                        let end = (start + partition_size).min(num_particles);
                        for p in start..end {
                            scatter_particle(p, partial);
                        }
                    });

                let partials: &[PartialGrid] = partials;
                mass.par_iter_mut()
                    .zip(momentum.par_iter_mut())
                    .enumerate()
                    .for_each(|(i, (m, mom))| {
                        for partial in partials {
                            *m += partial.mass[i];
                            *mom += partial.momentum[i];
                        }
                    });
            }
            ScatterBuffers::Atomic(grid) => {
                let grid: &AtomicGrid = grid;
                (0..num_particles).into_par_iter().for_each(|p| {
                    let mut target = grid;
                    scatter_particle(p, &mut target);
                });

                mass.par_iter_mut()
                    .zip(momentum.par_iter_mut())
                    .enumerate()
                    .for_each(|(i, (m, mom))| {
                        let (node_mass, node_momentum) = grid.load(i);
                        *m += node_mass;
                        *mom += node_momentum;
                    });
            }
        }
    }
}
