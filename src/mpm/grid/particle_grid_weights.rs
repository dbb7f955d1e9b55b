use super::data::GridData;
use crate::math::{T, TV, UV};
use itertools::iproduct;

/// Number of nodes per axis a particle interacts with.
pub const STENCIL_SIZE: usize = 3;

/// The quadratic B-spline kernel N(x)
///
/// N(x) = 3/4 - |x|^2              0 <= |x| < 1/2
///        1/2 (3/2 - |x|)^2        1/2 <= |x| < 3/2
///        0                        3/2 <= |x|
pub fn kernel(x: T) -> T {
    let x = x.abs();
    if x < 0.5 {
        0.75 - x * x
    } else if x < 1.5 {
        let a = 1.5 - x;
        0.5 * a * a
    } else {
        0.
    }
}

/// The 3x3 block of grid nodes a particle scatters to and gathers from, with the per-axis
/// interpolation weights. P2G and G2P must build this the same way, otherwise momentum leaks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil {
    /// The lower-left node of the stencil.
    pub base: UV,
    /// The particle position relative to `base`, in grid units. Lies in `[0.5, 1.5)` away from
    /// the grid edges.
    pub fx: TV,
    /// `weights[i]` holds the x and y weights of the nodes `i` steps from `base`.
    pub weights: [TV; STENCIL_SIZE],
}

impl Stencil {
    /// Iterates over `(node, weight, node position - particle position)` for all 9 nodes.
    pub fn nodes(self, h: T) -> impl Iterator<Item = (UV, T, TV)> {
        iproduct!(0..STENCIL_SIZE, 0..STENCIL_SIZE).map(move |(i, j)| {
            let node = self.base + UV::new(i, j);
            let weight = self.weights[i].x * self.weights[j].y;
            let dpos = (TV::new(i as T, j as T) - self.fx) * h;
            (node, weight, dpos)
        })
    }
}

impl GridData {
    /// Builds the stencil of the particle at `p`. The base node is clamped so the stencil never
    /// leaves the grid, even for a particle sitting outside `interior()`.
    pub fn stencil(&self, p: &TV) -> Stencil {
        let x = self.pos_to_grid_space(p);

        let max_base = (self.size - UV::from_element(STENCIL_SIZE)).cast::<T>();
        let base = (x - TV::from_element(0.5))
            .map(|b| b.floor())
            .zip_map(&max_base, |b, hi| b.max(0.).min(hi));

        let fx = x - base;
        let weights = [0, 1, 2].map(|i| fx.map(|f| kernel(f - i as T)));

        Stencil {
            base: base.map(|b| b as usize),
            fx,
            weights,
        }
    }
}
