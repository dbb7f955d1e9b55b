use crate::math::TV;
#[cfg(test)]
use crate::math::T;
use std::ops::Range;

/// `num` evenly spaced samples from `start` to `end`, both inclusive.
#[cfg(test)]
pub fn linspace(start: T, end: T, num: usize) -> impl Iterator<Item = T> {
    let step = if num > 1 {
        (end - start) / (num - 1) as T
    } else {
        0.
    };
    (0..num).map(move |i| start + step * i as T)
}

pub trait RangeExt {
    fn contains_point(&self, x: &TV) -> bool;

    fn contains_range(&self, other: &Self) -> bool;

    fn clamp_point(&self, x: &TV) -> TV;
}

impl RangeExt for Range<TV> {
    /// Inclusive on both ends.
    fn contains_point(&self, x: &TV) -> bool {
        self.start.all_le(x) && self.end.all_ge(x)
    }

    fn contains_range(&self, other: &Self) -> bool {
        self.contains_point(&other.start) && self.contains_point(&other.end)
    }

    fn clamp_point(&self, x: &TV) -> TV {
        x.zip_zip_map(&self.start, &self.end, |x, lo, hi| x.max(lo).min(hi))
    }
}

pub trait VecExt {
    fn all_le(&self, other: &Self) -> bool;

    fn all_ge(&self, other: &Self) -> bool;

    fn is_finite(&self) -> bool;
}

impl VecExt for TV {
    fn all_le(&self, other: &Self) -> bool {
        self.x <= other.x && self.y <= other.y
    }

    fn all_ge(&self, other: &Self) -> bool {
        self.x >= other.x && self.y >= other.y
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
