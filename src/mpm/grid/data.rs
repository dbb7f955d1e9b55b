use crate::math::{T, TV, UV};
use std::ops::Range;

/// Stores the metadata associated with the `MpmGrid`
#[derive(Debug, Clone)]
pub struct GridData {
    /// The total number of nodes in the grid
    pub num_cells: usize,
    /// The number of nodes in each direction
    pub size: UV,
    /// The grid spacing
    pub h: T,
    /// Reciprocal of the grid spacing, for efficient computation
    pub one_over_h: T,
    /// The bounds of the domain spanned by the grid.
    pub bounds: Range<TV>,
}

impl GridData {
    /// Creates a new `GridData` with `size` nodes per axis, the first one sitting at `origin`.
    pub fn new(h: T, origin: TV, size: UV) -> GridData {
        let num_cells = size.iter().product();

        tracing::debug!(
            "Using Grid w/ Size: [{}, {}] and {} cells",
            size.x,
            size.y,
            num_cells
        );

        GridData {
            num_cells,
            size,
            h,
            one_over_h: 1. / h,
            bounds: origin..origin + h * size.cast::<T>(),
        }
    }

    pub fn coord_to_pos(&self, coord: UV) -> TV {
        coord.cast::<T>() * self.h + self.bounds.start
    }

    /// Converts a world space position into (fractional) grid coordinates.
    pub fn pos_to_grid_space(&self, pos: &TV) -> TV {
        (pos - self.bounds.start) * self.one_over_h
    }

    pub fn coord_to_index(&self, i: UV) -> usize {
        i.x + self.size.x * i.y
    }

    pub fn index_to_coord(&self, i: usize) -> UV {
        UV::new(i % self.size.x, i / self.size.x)
    }

    pub fn coord_in_grid(&self, coord: UV) -> bool {
        coord.x < self.size.x && coord.y < self.size.y
    }

    /// The region particles are kept inside, so that their whole 3x3 stencil lies in the grid.
    pub fn interior(&self) -> Range<TV> {
        let start = self.bounds.start + TV::from_element(self.h);
        let end = self.bounds.start + (self.size.cast::<T>() - TV::from_element(2.)) * self.h;
        start..end
    }

    /// The region particles may occupy: `thickness` nodes away from every wall, and never
    /// outside `interior()`.
    pub fn inside_walls(&self, thickness: usize) -> Range<TV> {
        let interior = self.interior();
        let band = TV::from_element(thickness as T * self.h);
        let start = (self.bounds.start + band).sup(&interior.start);
        let end = (self.bounds.end - band).inf(&interior.end);
        start..end
    }
}
