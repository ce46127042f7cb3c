// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use kurbo::{Point, Rect, Vec2};
use smallvec::SmallVec;

/// An area made of rects.
///
/// The rects are kept disjoint, so the area of the region is the sum of their areas.
/// Rects with zero area are never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// An empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// A region covering `rect`.
    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.unite(rect);
        region
    }

    /// Returns `true` if the region covers no area.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The disjoint rects making up the region.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// The smallest rect containing the region.
    pub fn bounds(&self) -> Rect {
        self.rects
            .iter()
            .copied()
            .reduce(|bounds, rect| bounds.union(rect))
            .unwrap_or(Rect::ZERO)
    }

    /// Adds `rect` to the region.
    pub fn unite(&mut self, rect: Rect) {
        let rect = rect.abs();
        if rect.is_zero_area() {
            return;
        }
        let mut pieces: SmallVec<[Rect; 4]> = smallvec::smallvec![rect];
        for existing in &self.rects {
            pieces = pieces
                .into_iter()
                .flat_map(|piece| subtract(piece, *existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    /// Adds every rect of `other` to the region.
    pub fn unite_region(&mut self, other: &Self) {
        for rect in &other.rects {
            self.unite(*rect);
        }
    }

    /// Returns `true` if `point` is inside the region.
    pub fn contains_point(&self, point: Point) -> bool {
        self.rects.iter().any(|rect| rect.contains(point))
    }

    /// Returns `true` if every point of `rect` is inside the region.
    pub fn contains_rect(&self, rect: Rect) -> bool {
        let mut remaining: SmallVec<[Rect; 4]> = smallvec::smallvec![rect.abs()];
        for existing in &self.rects {
            remaining = remaining
                .into_iter()
                .flat_map(|piece| subtract(piece, *existing))
                .collect();
        }
        remaining.is_empty()
    }

    /// Moves the region by `offset`.
    pub fn translate(&mut self, offset: Vec2) {
        for rect in &mut self.rects {
            *rect = *rect + offset;
        }
    }
}

/// The parts of `rect` outside of `hole`, as at most four disjoint rects.
fn subtract(rect: Rect, hole: Rect) -> SmallVec<[Rect; 4]> {
    let overlap = rect.intersect(hole);
    if overlap.is_zero_area() {
        return smallvec::smallvec![rect];
    }
    let candidates = [
        // Full-width bands above and below the hole.
        Rect::new(rect.x0, rect.y0, rect.x1, overlap.y0),
        Rect::new(rect.x0, overlap.y1, rect.x1, rect.y1),
        // Left and right of the hole, within its band.
        Rect::new(rect.x0, overlap.y0, overlap.x0, overlap.y1),
        Rect::new(overlap.x1, overlap.y0, rect.x1, overlap.y1),
    ];
    candidates
        .into_iter()
        .filter(|piece| !piece.is_zero_area())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(region: &Region) -> f64 {
        region.rects().iter().map(Rect::area).sum()
    }

    #[test]
    fn overlapping_rects_are_split() {
        let mut region = Region::from_rect(Rect::new(0., 0., 100., 100.));
        region.unite(Rect::new(50., 50., 150., 150.));
        assert_eq!(area(&region), 100. * 100. * 2. - 50. * 50.);
        assert_eq!(region.bounds(), Rect::new(0., 0., 150., 150.));
        assert!(region.contains_point(Point::new(120., 120.)));
        assert!(!region.contains_point(Point::new(120., 20.)));
    }

    #[test]
    fn covered_rects_are_dropped() {
        let mut region = Region::from_rect(Rect::new(0., 0., 100., 100.));
        region.unite(Rect::new(10., 10., 50., 50.));
        assert_eq!(region.rects(), &[Rect::new(0., 0., 100., 100.)]);
        assert!(region.contains_rect(Rect::new(10., 10., 50., 50.)));
    }

    #[test]
    fn rect_spanning_two_rects_is_contained() {
        let mut region = Region::from_rect(Rect::new(0., 0., 50., 100.));
        region.unite(Rect::new(50., 0., 100., 100.));
        assert!(region.contains_rect(Rect::new(25., 25., 75., 75.)));
        assert!(!region.contains_rect(Rect::new(25., 25., 125., 75.)));
    }

    #[test]
    fn empty_rects_are_ignored() {
        let mut region = Region::new();
        region.unite(Rect::new(10., 10., 10., 50.));
        assert!(region.is_empty());
        assert_eq!(region.bounds(), Rect::ZERO);
    }
}
