// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A closed geometry representation for flattening.
//!
//! The flattener needs only a narrow set of geometric operations: bounds,
//! transform, intersection, difference and containment. Axis-aligned
//! rectangles (the overwhelmingly common case in print content) get exact
//! boolean results. Operations that would require a general path clipper
//! return `None` — "no analytic result" — and the caller degrades to
//! rasterization, never to an approximate answer that could change pixels.
//!
//! Results whose area drops below a tolerance collapse to empty so that
//! downstream stages can cull them instead of emitting degenerate slivers.

use crate::math::{self, GEOMETRY_EPSILON};
use log::warn;
use peniko::Fill;
use peniko::kurbo::{Affine, BezPath, Point, Rect, Shape, Stroke, StrokeOpts};

/// Minimum area a geometry result must have to stay alive.
const COLLAPSE_AREA: f64 = GEOMETRY_EPSILON * GEOMETRY_EPSILON;

/// Tolerance used when flattening curves for coverage tests and stroking.
pub const PATH_TOLERANCE: f64 = 0.1;

/// A drawable region.
#[derive(Debug, Clone)]
pub enum Geometry {
    /// An axis-aligned rectangle.
    Rect(Rect),
    /// An arbitrary filled path.
    Path {
        /// The outline.
        path: BezPath,
        /// The fill rule used to interpret the outline.
        fill: Fill,
    },
}

impl Geometry {
    /// The empty geometry.
    pub const EMPTY: Self = Self::Rect(Rect::ZERO);

    /// Create a path geometry, normalizing to a rectangle when the path's
    /// sole subpath is one.
    pub fn from_path(path: BezPath, fill: Fill) -> Self {
        Self::Path { path, fill }
    }

    /// Tight axis-aligned bounding rectangle.
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Rect(r) => *r,
            Self::Path { path, .. } => path.bounding_box(),
        }
    }

    /// Whether the geometry encloses no visible area.
    pub fn is_empty(&self) -> bool {
        let b = self.bounds();
        !b.width().is_finite()
            || !b.height().is_finite()
            || b.width() <= 0.0
            || b.height() <= 0.0
            || b.area() < COLLAPSE_AREA
    }

    /// Apply an affine transform in place.
    ///
    /// A rectangle stays a rectangle under scale/translate; any other
    /// transform converts it to a path.
    pub fn apply_transform(&mut self, transform: &Affine) {
        if transform == &Affine::IDENTITY {
            return;
        }
        match self {
            Self::Rect(r) => {
                if math::is_scale_translate(transform) {
                    let p0 = *transform * Point::new(r.x0, r.y0);
                    let p1 = *transform * Point::new(r.x1, r.y1);
                    *r = Rect::from_points(p0, p1);
                } else {
                    let mut path = r.to_path(PATH_TOLERANCE);
                    path.apply_affine(*transform);
                    *self = Self::Path {
                        path,
                        fill: Fill::NonZero,
                    };
                }
            }
            Self::Path { path, .. } => path.apply_affine(*transform),
        }
    }

    /// Returns a transformed copy.
    pub fn transformed(&self, transform: &Affine) -> Self {
        let mut out = self.clone();
        out.apply_transform(transform);
        out
    }

    /// Whether this geometry certainly contains the whole rectangle.
    ///
    /// Conservative: `false` never lies, `true` is exact. Path geometries
    /// answer `false` because proving containment would need a clipper.
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        match self {
            Self::Rect(r) => {
                r.x0 <= rect.x0 + GEOMETRY_EPSILON
                    && r.y0 <= rect.y0 + GEOMETRY_EPSILON
                    && r.x1 >= rect.x1 - GEOMETRY_EPSILON
                    && r.y1 >= rect.y1 - GEOMETRY_EPSILON
            }
            Self::Path { .. } => false,
        }
    }

    /// Whether this geometry certainly contains the other geometry.
    pub fn contains(&self, other: &Self) -> bool {
        self.contains_rect(&other.bounds())
    }

    /// Whether the two geometries may touch.
    ///
    /// Conservative in the other direction: `true` may be a false positive
    /// (bounding boxes touch but outlines don't), `false` is exact.
    pub fn may_intersect(&self, other: &Self) -> bool {
        let isect = self.bounds().intersect(other.bounds());
        isect.width() > 0.0 && isect.height() > 0.0 && isect.area() >= COLLAPSE_AREA
    }

    /// Exact intersection, or `None` when no analytic result exists.
    ///
    /// An empty intersection is `Some(empty)`, which is distinct from
    /// `None` ("could not compute").
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if !self.may_intersect(other) {
            return Some(Self::EMPTY);
        }
        match (self, other) {
            (Self::Rect(a), Self::Rect(b)) => Some(collapse_rect(a.intersect(*b))),
            // A rectangle wholly containing the path clips it to itself.
            (Self::Rect(_), Self::Path { .. }) if self.contains(other) => Some(other.clone()),
            (Self::Path { .. }, Self::Rect(_)) if other.contains(self) => Some(self.clone()),
            _ => None,
        }
    }

    /// Exact difference `self - other`, or `None` when no analytic result
    /// exists.
    pub fn difference(&self, other: &Self) -> Option<Self> {
        if !self.may_intersect(other) {
            return Some(self.clone());
        }
        match (self, other) {
            (Self::Rect(a), Self::Rect(b)) => Some(rect_difference(a, b)),
            (Self::Path { .. }, Self::Rect(_)) if other.contains(self) => Some(Self::EMPTY),
            _ => None,
        }
    }

    /// Whether a point lies inside the geometry.
    pub fn hit_test(&self, point: Point) -> bool {
        match self {
            Self::Rect(r) => r.contains(point),
            Self::Path { path, fill } => match fill {
                Fill::NonZero => path.winding(point) != 0,
                Fill::EvenOdd => path.winding(point) % 2 != 0,
            },
        }
    }

    /// Rough complexity measure used by the rasterize-vs-analytic cost model.
    ///
    /// Rectangles count as 4 points; paths count their elements.
    pub fn point_count(&self) -> usize {
        match self {
            Self::Rect(_) => 4,
            Self::Path { path, .. } => path.elements().len(),
        }
    }

    /// Convert to a path, for device sinks that only accept outlines.
    pub fn to_bez_path(&self) -> BezPath {
        match self {
            Self::Rect(r) => r.to_path(PATH_TOLERANCE),
            Self::Path { path, .. } => path.clone(),
        }
    }
}

fn collapse_rect(rect: Rect) -> Geometry {
    if rect.width() <= 0.0 || rect.height() <= 0.0 || rect.area() < COLLAPSE_AREA {
        Geometry::EMPTY
    } else {
        Geometry::Rect(rect)
    }
}

/// `a - b` for rectangles: zero to four disjoint rectangles.
fn rect_difference(a: &Rect, b: &Rect) -> Geometry {
    let isect = a.intersect(*b);
    if isect.width() <= 0.0 || isect.height() <= 0.0 {
        return Geometry::Rect(*a);
    }
    let mut pieces: Vec<Rect> = Vec::with_capacity(4);
    // Band above and below the intersection, full width of `a`.
    push_nonempty(&mut pieces, Rect::new(a.x0, a.y0, a.x1, isect.y0));
    push_nonempty(&mut pieces, Rect::new(a.x0, isect.y1, a.x1, a.y1));
    // Bands left and right, limited to the intersection's vertical span.
    push_nonempty(&mut pieces, Rect::new(a.x0, isect.y0, isect.x0, isect.y1));
    push_nonempty(&mut pieces, Rect::new(isect.x1, isect.y0, a.x1, isect.y1));

    match pieces.len() {
        0 => Geometry::EMPTY,
        1 => Geometry::Rect(pieces[0]),
        _ => {
            let mut path = BezPath::new();
            for r in &pieces {
                path.extend(r.to_path(PATH_TOLERANCE));
            }
            Geometry::Path {
                path,
                fill: Fill::NonZero,
            }
        }
    }
}

fn push_nonempty(pieces: &mut Vec<Rect>, rect: Rect) {
    if rect.width() > 0.0 && rect.height() > 0.0 && rect.area() >= COLLAPSE_AREA {
        pieces.push(rect);
    }
}

/// Expand a stroked outline into its fill geometry.
pub fn widen_stroke(geometry: &Geometry, stroke: &Stroke) -> Geometry {
    if !stroke.width.is_finite() || stroke.width <= 0.0 {
        warn!("Invalid stroke width {}, ignoring the stroke.", stroke.width);
        return Geometry::EMPTY;
    }
    let path = geometry.to_bez_path();
    let widened = peniko::kurbo::stroke(
        path.elements().iter().copied(),
        stroke,
        &StrokeOpts::default(),
        PATH_TOLERANCE,
    );
    Geometry::Path {
        path: widened,
        fill: Fill::NonZero,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::kurbo::{Affine, Circle, Rect, Shape, Stroke};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Rect(Rect::new(x0, y0, x1, y1))
    }

    #[test]
    fn rect_intersection_is_exact() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 5.0, 15.0, 15.0);
        match a.intersect(&b) {
            Some(Geometry::Rect(r)) => assert_eq!(r, Rect::new(5.0, 5.0, 10.0, 10.0)),
            other => panic!("expected rect, got {other:?}"),
        }
    }

    #[test]
    fn disjoint_intersection_is_empty_not_unknown() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(5.0, 5.0, 6.0, 6.0);
        let isect = a.intersect(&b).unwrap();
        assert!(isect.is_empty());
    }

    #[test]
    fn rect_difference_produces_frame() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let inner = rect(2.0, 2.0, 8.0, 8.0);
        let diff = outer.difference(&inner).unwrap();
        assert!(!diff.is_empty());
        assert!(diff.hit_test(Point::new(1.0, 1.0)));
        assert!(!diff.hit_test(Point::new(5.0, 5.0)));
        assert!(diff.hit_test(Point::new(9.0, 5.0)));
    }

    #[test]
    fn difference_with_full_cover_is_empty() {
        let small = rect(2.0, 2.0, 4.0, 4.0);
        let big = rect(0.0, 0.0, 10.0, 10.0);
        assert!(small.difference(&big).unwrap().is_empty());
    }

    #[test]
    fn half_overlap_difference_is_single_rect() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 0.0, 15.0, 10.0);
        match a.difference(&b).unwrap() {
            Geometry::Rect(r) => assert_eq!(r, Rect::new(0.0, 0.0, 5.0, 10.0)),
            other => panic!("expected rect, got {other:?}"),
        }
    }

    #[test]
    fn path_boolean_reports_no_analytic_result() {
        let circle = Geometry::from_path(Circle::new((5.0, 5.0), 5.0).to_path(0.1), Fill::NonZero);
        let r = rect(0.0, 0.0, 6.0, 6.0);
        assert!(circle.intersect(&r).is_none());
        assert!(r.difference(&circle).is_none());
    }

    #[test]
    fn rect_containing_path_clips_exactly() {
        let circle = Geometry::from_path(Circle::new((5.0, 5.0), 2.0).to_path(0.1), Fill::NonZero);
        let r = rect(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(&circle));
        assert!(matches!(
            r.intersect(&circle),
            Some(Geometry::Path { .. })
        ));
    }

    #[test]
    fn rotation_turns_rect_into_path() {
        let mut g = rect(0.0, 0.0, 4.0, 2.0);
        g.apply_transform(&Affine::rotate(0.5));
        assert!(matches!(g, Geometry::Path { .. }));
        let mut g = rect(0.0, 0.0, 4.0, 2.0);
        g.apply_transform(&(Affine::scale(2.0) * Affine::translate((1.0, 1.0))));
        match g {
            Geometry::Rect(r) => assert_eq!(r, Rect::new(2.0, 2.0, 10.0, 6.0)),
            other => panic!("expected rect, got {other:?}"),
        }
    }

    #[test]
    fn widened_stroke_covers_the_outline() {
        let line = rect(0.0, 0.0, 10.0, 10.0);
        let widened = widen_stroke(&line, &Stroke::new(2.0));
        assert!(widened.hit_test(Point::new(0.0, 5.0)));
        assert!(!widened.hit_test(Point::new(5.0, 5.0)));
    }
}
