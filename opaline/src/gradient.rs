// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Gradient paints: stop algebra, point sampling, and decomposition into
//! solid-color bands when no closed-form blend exists.
//!
//! Stops are held as resolved sRGB colors (rather than dynamic colors) so
//! the blend algebra can recolor them without repeated conversions.

use opaline_common::blend::{
    ColorInterpolation, blend_colors, color_distance, lerp_stop_colors, scale_alpha,
};
use opaline_common::config::FlattenerConfig;
use opaline_common::geometry::{Geometry, PATH_TOLERANCE};
use opaline_common::math::{FloatExt, is_almost_opaque, is_almost_transparent};
use peniko::color::{AlphaColor, DynamicColor, Srgb};
use peniko::kurbo::{Affine, Circle, Point, Rect, Shape, Vec2};
use peniko::{ColorStop, ColorStops, Extend, Gradient, GradientKind};
use smallvec::SmallVec;

/// Hard cap on decomposition bands; beyond this, rasterize instead.
pub const MAX_GRADIENT_STEPS: usize = 4096;

/// Bands per inch of gradient span at density 1.0.
const BANDS_PER_INCH: f64 = 20.0;

/// Band-count floor for well-formed gradients.
const MIN_BANDS: usize = 5;

/// Band-count floor and cap for degenerate gradients (zero color travel or
/// fully transparent stops).
const DEGENERATE_MIN_BANDS: usize = 3;
const DEGENERATE_MAX_BANDS: usize = 24;

/// A resolved gradient stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Offset along the gradient axis, in `[0, 1]`, sorted ascending.
    pub offset: f32,
    /// Straight-alpha color at the offset.
    pub color: AlphaColor<Srgb>,
}

/// A gradient with resolved stops.
#[derive(Debug, Clone)]
pub struct GradientPaint {
    /// Geometric mapping: linear axis or radial focus/center/radii, in
    /// absolute user-space coordinates.
    pub kind: GradientKind,
    /// Behavior outside the `[0, 1]` offset range.
    pub extend: Extend,
    /// Color space stops are interpolated in.
    pub interpolation: ColorInterpolation,
    /// The stops, sorted by offset.
    pub stops: Vec<GradientStop>,
}

/// What a gradient reduces to after validation.
pub enum ReducedGradient {
    /// A well-formed gradient.
    Gradient(GradientPaint),
    /// Collapses to a single solid color.
    Solid(AlphaColor<Srgb>),
    /// Paints nothing at all.
    Empty,
}

impl GradientPaint {
    /// Resolve a host gradient, collapsing degenerate ones.
    ///
    /// No stops means nothing to paint; a single stop (or coincident
    /// endpoints under pad extend) is a solid fill.
    pub fn reduce(gradient: &Gradient, interpolation: ColorInterpolation) -> ReducedGradient {
        let mut stops: Vec<GradientStop> = gradient
            .stops
            .iter()
            .map(|s| GradientStop {
                offset: s.offset.clamp(0.0, 1.0),
                color: s.color.to_alpha_color::<Srgb>(),
            })
            .collect();
        stops.sort_by(|a, b| a.offset.total_cmp(&b.offset));

        match stops.len() {
            0 => return ReducedGradient::Empty,
            1 => return ReducedGradient::Solid(stops[0].color),
            _ => {}
        }

        let degenerate_axis = match gradient.kind {
            GradientKind::Linear { start, end } => (end - start).length().is_nearly_zero(),
            GradientKind::Radial {
                start_radius,
                end_radius,
                ..
            } => f64::from(end_radius.max(start_radius)).is_nearly_zero(),
            // Sweep gradients are not in the closed paint set; the caller
            // maps them to a drawing-brush approximation before this point.
            GradientKind::Sweep { .. } => true,
        };
        if degenerate_axis {
            // Everything lands on the final stop.
            return ReducedGradient::Solid(stops[stops.len() - 1].color);
        }

        ReducedGradient::Gradient(Self {
            kind: gradient.kind,
            extend: gradient.extend,
            interpolation,
            stops,
        })
    }

    /// Convert back to a host gradient for device emission.
    pub fn to_peniko(&self) -> Gradient {
        let stops: SmallVec<[ColorStop; 4]> = self
            .stops
            .iter()
            .map(|s| ColorStop {
                offset: s.offset,
                color: DynamicColor::from_alpha_color(s.color),
            })
            .collect();
        Gradient {
            kind: self.kind,
            extend: self.extend,
            stops: ColorStops(stops),
            ..Default::default()
        }
    }

    /// Whether the gradient paints full coverage everywhere it is defined
    /// and is defined everywhere.
    pub fn is_opaque(&self) -> bool {
        let stops_opaque = self
            .stops
            .iter()
            .all(|s| is_almost_opaque(s.color.components[3]));
        stops_opaque && !self.has_undefined_region()
    }

    /// Whether the gradient is invisible.
    pub fn is_transparent(&self) -> bool {
        self.stops
            .iter()
            .all(|s| is_almost_transparent(s.color.components[3]))
    }

    /// Radial gradients whose focus lies outside the end circle have
    /// positions with no gradient value at all; those render transparent,
    /// so the gradient can't be treated as opaque.
    fn has_undefined_region(&self) -> bool {
        match self.kind {
            GradientKind::Linear { .. } => false,
            GradientKind::Radial {
                start_center,
                end_center,
                end_radius,
                ..
            } => (end_center - start_center).length() >= f64::from(end_radius),
            GradientKind::Sweep { .. } => false,
        }
    }

    /// Scale every stop's alpha.
    pub fn scale_alpha(&mut self, opacity: f32) {
        for stop in &mut self.stops {
            stop.color = scale_alpha(stop.color, opacity);
        }
    }

    /// Apply an affine transform to the gradient's geometric mapping.
    pub fn apply_transform(&mut self, transform: &Affine) {
        match &mut self.kind {
            GradientKind::Linear { start, end } => {
                *start = *transform * *start;
                *end = *transform * *end;
            }
            GradientKind::Radial {
                start_center,
                start_radius,
                end_center,
                end_radius,
            } => {
                *start_center = *transform * *start_center;
                *end_center = *transform * *end_center;
                let scale = opaline_common::math::max_scale(transform) as f32;
                *start_radius *= scale;
                *end_radius *= scale;
            }
            GradientKind::Sweep { center, .. } => {
                *center = *transform * *center;
            }
        }
    }

    /// Recolor every stop by compositing a solid color over it.
    ///
    /// Linear interpolation of blended stops only matches blending the
    /// interpolated color when either the overlay is opaque or a stop
    /// interval varies in only one of (alpha, color); offending intervals
    /// get exact intermediate stops inserted.
    pub fn blend_solid_over(&mut self, over: AlphaColor<Srgb>) {
        self.recolor(|under| blend_colors(under, over), over.components[3] < 1.0);
    }

    /// Recolor every stop by compositing it over a solid underlay.
    pub fn blend_over_solid(&mut self, under: AlphaColor<Srgb>) {
        self.recolor(|over| blend_colors(under, over), true);
    }

    fn recolor(&mut self, blend: impl Fn(AlphaColor<Srgb>) -> AlphaColor<Srgb>, fix_up: bool) {
        let mut out: Vec<GradientStop> = Vec::with_capacity(self.stops.len());
        for i in 0..self.stops.len() {
            if fix_up && i > 0 {
                let prev = self.stops[i - 1];
                let cur = self.stops[i];
                if interval_needs_subdivision(prev.color, cur.color) {
                    // Insert exact blends at interior offsets; three points
                    // bound the interpolation error well below a color step.
                    for k in 1..4 {
                        let t = k as f32 / 4.0;
                        let offset = prev.offset + (cur.offset - prev.offset) * t;
                        let exact =
                            lerp_stop_colors(prev.color, cur.color, t, self.interpolation);
                        out.push(GradientStop {
                            offset,
                            color: blend(exact),
                        });
                    }
                }
            }
            out.push(GradientStop {
                offset: self.stops[i].offset,
                color: blend(self.stops[i].color),
            });
        }
        self.stops = out;
    }

    /// The color at a gradient offset, honoring the extend mode.
    pub fn color_at(&self, t: f32) -> AlphaColor<Srgb> {
        let t = apply_extend(t, self.extend);
        let stops = &self.stops;
        if t <= stops[0].offset {
            return stops[0].color;
        }
        for pair in stops.windows(2) {
            if t <= pair[1].offset {
                let span = pair[1].offset - pair[0].offset;
                let local = if span.is_nearly_zero() {
                    1.0
                } else {
                    (t - pair[0].offset) / span
                };
                return lerp_stop_colors(pair[0].color, pair[1].color, local, self.interpolation);
            }
        }
        stops[stops.len() - 1].color
    }

    /// Gradient parameter at a user-space point, or `None` where the
    /// gradient is undefined.
    pub fn project(&self, point: Point) -> Option<f32> {
        match self.kind {
            GradientKind::Linear { start, end } => {
                let axis = end - start;
                let len2 = axis.hypot2();
                if len2 <= 0.0 {
                    return None;
                }
                Some(((point - start).dot(axis) / len2) as f32)
            }
            GradientKind::Radial {
                start_center,
                start_radius,
                end_center,
                end_radius,
            } => radial_project(
                point,
                start_center,
                f64::from(start_radius),
                end_center,
                f64::from(end_radius),
            ),
            GradientKind::Sweep {
                center,
                start_angle,
                end_angle,
            } => {
                let angle = (point - center).atan2() as f32;
                let span = end_angle - start_angle;
                if span.is_nearly_zero() {
                    return None;
                }
                Some((angle.to_degrees() - start_angle) / span)
            }
        }
    }

    /// The color a point would be painted, transparent where undefined.
    pub fn sample(&self, point: Point) -> AlphaColor<Srgb> {
        match self.project(point) {
            Some(t) => self.color_at(t),
            None => AlphaColor::new([0.0, 0.0, 0.0, 0.0]),
        }
    }

    /// How many solid bands a decomposition should use for the given span
    /// (in device-independent units), or `None` when the count exceeds
    /// [`MAX_GRADIENT_STEPS`] and rasterization is the better fallback.
    pub fn band_count(&self, span: f64, config: &FlattenerConfig) -> Option<usize> {
        let mut travel = 0.0_f32;
        for pair in self.stops.windows(2) {
            travel += color_distance(pair[0].color, pair[1].color);
        }
        let degenerate = travel.is_nearly_zero() || self.is_transparent();
        if degenerate {
            return Some(DEGENERATE_MIN_BANDS.max(
                (span / 96.0 * BANDS_PER_INCH * f64::from(config.gradient_decomposition_density))
                    .ceil()
                    .min(DEGENERATE_MAX_BANDS as f64) as usize,
            ));
        }
        let raw = span / 96.0
            * BANDS_PER_INCH
            * f64::from(config.gradient_decomposition_density)
            * f64::from(1.0 + travel);
        let count = raw.ceil().max(MIN_BANDS as f64) as usize;
        (count <= MAX_GRADIENT_STEPS).then_some(count)
    }

    /// Approximate the gradient over `bounds` as painter's-order solid
    /// pieces: strips along the axis for linear gradients, disks from
    /// outermost to innermost for radial ones.
    ///
    /// Returns `None` when the band count would exceed the hard cap; the
    /// caller then rasterizes instead.
    pub fn decompose(
        &self,
        bounds: Rect,
        config: &FlattenerConfig,
    ) -> Option<Vec<(Geometry, AlphaColor<Srgb>)>> {
        match self.kind {
            GradientKind::Linear { start, end } => {
                self.decompose_linear(bounds, start, end, config)
            }
            GradientKind::Radial {
                start_center,
                start_radius,
                end_center,
                end_radius,
            } => self.decompose_radial(
                bounds,
                start_center,
                f64::from(start_radius),
                end_center,
                f64::from(end_radius),
                config,
            ),
            // No banded form for sweeps; rasterize.
            GradientKind::Sweep { .. } => None,
        }
    }

    fn decompose_linear(
        &self,
        bounds: Rect,
        start: Point,
        end: Point,
        config: &FlattenerConfig,
    ) -> Option<Vec<(Geometry, AlphaColor<Srgb>)>> {
        let axis = end - start;
        let axis_len = axis.length();
        if axis_len <= 0.0 {
            return None;
        }

        // Parameter range of the visible region.
        let (mut t0, mut t1) = (f32::MAX, f32::MIN);
        for corner in corners(bounds) {
            if let Some(t) = self.project(corner) {
                t0 = t0.min(t);
                t1 = t1.max(t);
            }
        }
        if t0 > t1 {
            return None;
        }
        if self.extend == Extend::Pad {
            // Outside [0, 1] the color is constant; no bands needed there.
            t0 = t0.clamp(0.0, 1.0);
            t1 = t1.clamp(0.0, 1.0);
        }

        let span = f64::from(t1 - t0) * axis_len;
        let bands = self.band_count(span, config)?;

        // Frame mapping gradient space (t along x, unit 1 = full axis) to
        // user space. Bands are rects in that frame, wide enough across the
        // perpendicular to cover the whole target region.
        let perp = Vec2::new(-axis.y, axis.x);
        let frame = Affine::new([axis.x, axis.y, perp.x, perp.y, start.x, start.y]);
        let half_width = bounds.width().hypot(bounds.height()) / axis_len + 1.0;

        let step = (t1 - t0) / bands as f32;
        let mut pieces = Vec::with_capacity(bands);
        for i in 0..bands {
            let lo = t0 + step * i as f32;
            let hi = if i + 1 == bands { t1 } else { lo + step };
            let mid = (lo + hi) * 0.5;
            let band = Rect::new(
                f64::from(lo),
                -half_width,
                f64::from(hi),
                half_width,
            );
            let geometry = Geometry::Rect(band).transformed(&frame);
            pieces.push((geometry, self.color_at(mid)));
        }
        Some(pieces)
    }

    fn decompose_radial(
        &self,
        bounds: Rect,
        focus: Point,
        r0: f64,
        center: Point,
        r1: f64,
        config: &FlattenerConfig,
    ) -> Option<Vec<(Geometry, AlphaColor<Srgb>)>> {
        if r1 <= 0.0 {
            return None;
        }
        // Furthest gradient parameter visible in the target region.
        let mut t_max = 1.0_f32;
        for corner in corners(bounds) {
            if let Some(t) = radial_project(corner, focus, r0, center, r1) {
                t_max = t_max.max(t);
            }
        }
        if self.extend == Extend::Pad {
            // One outermost disk at the pad color covers everything beyond
            // t = 1, so banding [0, 1] suffices.
            t_max = t_max.max(1.0);
        }

        let span = f64::from(t_max) * r1;
        let bands = self.band_count(span, config)?;

        // Disks from outermost to innermost; painter's order makes each
        // inner disk overwrite the outer one where they overlap.
        let step = t_max / bands as f32;
        let mut pieces = Vec::with_capacity(bands);
        for i in (1..=bands).rev() {
            let t = step * i as f32;
            let t_inner = step * (i as f32 - 0.5);
            let ft = f64::from(t);
            let disk_center = focus.lerp(center, ft);
            let radius = r0 + (r1 - r0) * ft;
            if radius <= 0.0 {
                continue;
            }
            let disk = Circle::new(disk_center, radius).to_path(PATH_TOLERANCE);
            pieces.push((
                Geometry::from_path(disk, peniko::Fill::NonZero),
                self.color_at(t_inner),
            ));
        }
        Some(pieces)
    }

    /// Whether two gradients share a stop layout and geometric mapping, so
    /// a stop-wise blend of the pair is a faithful closed form.
    ///
    /// Repeating linear gradients also match when one period is an exact
    /// integer multiple of the other along the same axis; reflection
    /// doubles the period, and pad has no period to line up, so those
    /// demand identical mappings.
    pub fn layout_compatible(&self, other: &Self) -> bool {
        self.layout_relation(other).is_some()
    }

    /// How two gradient mappings line up, if they do at all.
    ///
    /// `Identical` allows a direct stop-wise blend; `PeriodMultiple(k)`
    /// means `other`'s repeat period is `k` (or `1/k`) times this one's
    /// along the same axis, which a merged stop set can express exactly.
    fn layout_relation(&self, other: &Self) -> Option<LayoutRelation> {
        if self.extend != other.extend || self.interpolation != other.interpolation {
            return None;
        }
        match (self.kind, other.kind) {
            (
                GradientKind::Linear { start: a0, end: a1 },
                GradientKind::Linear { start: b0, end: b1 },
            ) => {
                if points_near(a0, b0) && points_near(a1, b1) {
                    return Some(LayoutRelation::Identical);
                }
                // Reflection doubles the effective period and pad has no
                // period at all; only true repeats can line up at a
                // multiple.
                if self.extend != Extend::Repeat || !points_near(a0, b0) {
                    return None;
                }
                let va = a1 - a0;
                let vb = b1 - b0;
                if !va.cross(vb).is_nearly_zero() || va.dot(vb) <= 0.0 {
                    return None;
                }
                let ratio = va.length() / vb.length();
                let normalized = if ratio >= 1.0 { ratio } else { 1.0 / ratio };
                if (normalized - normalized.round()).abs() >= 1e-3 {
                    return None;
                }
                Some(LayoutRelation::PeriodMultiple(ratio))
            }
            (
                GradientKind::Radial {
                    start_center: af,
                    start_radius: ar0,
                    end_center: ac,
                    end_radius: ar1,
                },
                GradientKind::Radial {
                    start_center: bf,
                    start_radius: br0,
                    end_center: bc,
                    end_radius: br1,
                },
            ) => (points_near(af, bf)
                && points_near(ac, bc)
                && (ar0 - br0).is_nearly_zero()
                && (ar1 - br1).is_nearly_zero())
            .then_some(LayoutRelation::Identical),
            _ => None,
        }
    }

    /// Closed-form blend of `over` on top of `self`, when their layouts
    /// line up. Returns `None` when no closed form exists.
    pub fn blend_compatible_over(&self, over: &Self) -> Option<Self> {
        match self.layout_relation(over)? {
            LayoutRelation::Identical => {
                // Merge the two offset sets and blend pointwise.
                let mut offsets: Vec<f32> = self
                    .stops
                    .iter()
                    .chain(&over.stops)
                    .map(|s| s.offset)
                    .collect();
                offsets.sort_by(f32::total_cmp);
                offsets.dedup_by(|a, b| (*a - *b).is_nearly_zero());
                let stops = offsets
                    .into_iter()
                    .map(|offset| GradientStop {
                        offset,
                        color: blend_colors(self.color_at(offset), over.color_at(offset)),
                    })
                    .collect();
                Some(Self {
                    stops,
                    ..self.clone()
                })
            }
            LayoutRelation::PeriodMultiple(ratio) => {
                // Express both on the longer period; the result's offsets
                // are the union of the longer gradient's stops and every
                // repetition of the shorter one's.
                let (long, short, short_scale) = if ratio >= 1.0 {
                    (self, over, ratio)
                } else {
                    (over, self, 1.0 / ratio)
                };
                let reps = short_scale.round() as usize;
                let mut offsets: Vec<f32> = long.stops.iter().map(|s| s.offset).collect();
                for rep in 0..reps {
                    for stop in &short.stops {
                        offsets.push((rep as f32 + stop.offset) / reps as f32);
                    }
                }
                offsets.sort_by(f32::total_cmp);
                offsets.dedup_by(|a, b| (*a - *b).is_nearly_zero());

                // Sample each side at its own parameterization of the
                // merged offset, keeping under/over roles straight.
                let scale_for = |g: &Self, offset: f32| {
                    if std::ptr::eq(g, short) {
                        offset * reps as f32
                    } else {
                        offset
                    }
                };
                let stops = offsets
                    .into_iter()
                    .map(|offset| GradientStop {
                        offset,
                        color: blend_colors(
                            self.color_at(scale_for(self, offset)),
                            over.color_at(scale_for(over, offset)),
                        ),
                    })
                    .collect();
                Some(Self {
                    kind: long.kind,
                    extend: long.extend,
                    interpolation: long.interpolation,
                    stops,
                })
            }
        }
    }
}

/// See [`GradientPaint::layout_relation`].
enum LayoutRelation {
    Identical,
    /// `self`'s period divided by `other`'s, always a near-integer or its
    /// reciprocal.
    PeriodMultiple(f64),
}

/// Solve for the gradient parameter of a point in a radial gradient:
/// the `t` with `|p - lerp(focus, center, t)| = r0 + (r1 - r0) * t`.
fn radial_project(point: Point, focus: Point, r0: f64, center: Point, r1: f64) -> Option<f32> {
    let d = point - focus;
    let e = center - focus;
    let dr = r1 - r0;

    let a = e.hypot2() - dr * dr;
    let b = d.dot(e) + r0 * dr;
    let c = d.hypot2() - r0 * r0;

    let t = if a.abs() < 1e-12 {
        if b.abs() < 1e-12 {
            return None;
        }
        c / (2.0 * b)
    } else {
        let disc = b * b - a * c;
        if disc < 0.0 {
            return None;
        }
        let sqrt = disc.sqrt();
        let t1 = (b + sqrt) / a;
        let t2 = (b - sqrt) / a;
        // The larger root is the geometrically meaningful one; fall back to
        // the other if it is behind the focus.
        let hi = t1.max(t2);
        let lo = t1.min(t2);
        if hi >= 0.0 { hi } else { lo }
    };
    (t.is_finite() && t >= 0.0).then_some(t as f32)
}

fn apply_extend(t: f32, extend: Extend) -> f32 {
    match extend {
        Extend::Pad => t.clamp(0.0, 1.0),
        Extend::Repeat => t.rem_euclid(1.0),
        Extend::Reflect => {
            let t = t.rem_euclid(2.0);
            if t > 1.0 { 2.0 - t } else { t }
        }
    }
}

fn corners(rect: Rect) -> [Point; 4] {
    [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ]
}

fn points_near(a: Point, b: Point) -> bool {
    (a - b).length().is_nearly_zero()
}

/// Whether blended stop interpolation needs intermediate stops: the
/// interval varies in both alpha and color.
fn interval_needs_subdivision(a: AlphaColor<Srgb>, b: AlphaColor<Srgb>) -> bool {
    let alpha_delta = !(a.components[3] - b.components[3]).is_nearly_zero();
    let color_delta = (0..3).any(|i| !(a.components[i] - b.components[i]).is_nearly_zero());
    alpha_delta && color_delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{BLUE, RED, WHITE};

    fn linear(start: Point, end: Point, stops: &[(f32, AlphaColor<Srgb>)]) -> GradientPaint {
        GradientPaint {
            kind: GradientKind::Linear { start, end },
            extend: Extend::Pad,
            interpolation: ColorInterpolation::Srgb,
            stops: stops
                .iter()
                .map(|&(offset, color)| GradientStop { offset, color })
                .collect(),
        }
    }

    fn red_blue(start: Point, end: Point) -> GradientPaint {
        linear(start, end, &[(0.0, RED), (1.0, BLUE)])
    }

    #[test]
    fn reduce_collapses_degenerates() {
        let empty = Gradient {
            kind: GradientKind::Linear {
                start: Point::ZERO,
                end: Point::new(10.0, 0.0),
            },
            ..Default::default()
        };
        assert!(matches!(
            GradientPaint::reduce(&empty, ColorInterpolation::Srgb),
            ReducedGradient::Empty
        ));

        let collapsed = Gradient {
            kind: GradientKind::Linear {
                start: Point::new(5.0, 5.0),
                end: Point::new(5.0, 5.0),
            },
            stops: ColorStops(smallvec::smallvec![
                ColorStop {
                    offset: 0.0,
                    color: DynamicColor::from_alpha_color(RED),
                },
                ColorStop {
                    offset: 1.0,
                    color: DynamicColor::from_alpha_color(BLUE),
                },
            ]),
            ..Default::default()
        };
        match GradientPaint::reduce(&collapsed, ColorInterpolation::Srgb) {
            ReducedGradient::Solid(c) => assert_eq!(c.components, BLUE.components),
            _ => panic!("expected solid"),
        }
    }

    #[test]
    fn linear_projection_and_sampling() {
        let g = red_blue(Point::ZERO, Point::new(10.0, 0.0));
        assert_eq!(g.project(Point::new(5.0, 3.0)), Some(0.5));
        let mid = g.sample(Point::new(5.0, 0.0));
        assert!((mid.components[0] - 0.5).abs() < 1e-4);
        assert!((mid.components[2] - 0.5).abs() < 1e-4);
        // Pad extend clamps.
        assert_eq!(
            g.sample(Point::new(20.0, 0.0)).components,
            BLUE.components
        );
    }

    #[test]
    fn radial_projection_concentric() {
        let g = GradientPaint {
            kind: GradientKind::Radial {
                start_center: Point::new(5.0, 5.0),
                start_radius: 0.0,
                end_center: Point::new(5.0, 5.0),
                end_radius: 10.0,
            },
            extend: Extend::Pad,
            interpolation: ColorInterpolation::Srgb,
            stops: vec![
                GradientStop {
                    offset: 0.0,
                    color: RED,
                },
                GradientStop {
                    offset: 1.0,
                    color: BLUE,
                },
            ],
        };
        let t = g.project(Point::new(10.0, 5.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-4);
    }

    #[test]
    fn band_count_bounds() {
        let config = FlattenerConfig::default();
        let g = red_blue(Point::ZERO, Point::new(10.0, 0.0));
        // Tiny span still gets the floor.
        assert_eq!(g.band_count(0.01, &config), Some(MIN_BANDS));
        // Huge spans abort.
        assert_eq!(g.band_count(1e9, &config), None);
        // Zero color travel is degenerate: between 3 and 24 bands.
        let flat = linear(Point::ZERO, Point::new(10.0, 0.0), &[(0.0, RED), (1.0, RED)]);
        let n = flat.band_count(1e9, &config).unwrap();
        assert!((DEGENERATE_MIN_BANDS..=DEGENERATE_MAX_BANDS).contains(&n));
    }

    #[test]
    fn linear_decomposition_covers_bounds() {
        let config = FlattenerConfig::default();
        let g = red_blue(Point::ZERO, Point::new(96.0, 0.0));
        let bounds = Rect::new(0.0, 0.0, 96.0, 48.0);
        let pieces = g.decompose(bounds, &config).unwrap();
        assert!(pieces.len() >= MIN_BANDS);
        // First band is reddish, last is blueish.
        let first = pieces.first().unwrap().1;
        let last = pieces.last().unwrap().1;
        assert!(first.components[0] > first.components[2]);
        assert!(last.components[2] > last.components[0]);
        // Bands jointly cover the target region.
        let mut union = Rect::ZERO;
        for (geometry, _) in &pieces {
            union = union.union(geometry.bounds());
        }
        assert!(union.contains(Point::new(48.0, 24.0)));
    }

    #[test]
    fn radial_decomposition_is_outermost_first() {
        let config = FlattenerConfig::default();
        let g = GradientPaint {
            kind: GradientKind::Radial {
                start_center: Point::new(50.0, 50.0),
                start_radius: 0.0,
                end_center: Point::new(50.0, 50.0),
                end_radius: 50.0,
            },
            extend: Extend::Pad,
            interpolation: ColorInterpolation::Srgb,
            stops: vec![
                GradientStop {
                    offset: 0.0,
                    color: RED,
                },
                GradientStop {
                    offset: 1.0,
                    color: BLUE,
                },
            ],
        };
        let pieces = g
            .decompose(Rect::new(0.0, 0.0, 100.0, 100.0), &config)
            .unwrap();
        let radii: Vec<f64> = pieces.iter().map(|(g, _)| g.bounds().width()).collect();
        assert!(radii.windows(2).all(|w| w[0] >= w[1]), "disks must shrink");
    }

    #[test]
    fn decomposition_converges() {
        // Doubling the density must not move band colors further apart
        // from the true gradient than the coarser decomposition.
        let coarse_config = FlattenerConfig::default();
        let fine_config = FlattenerConfig {
            gradient_decomposition_density: 4.0,
            ..Default::default()
        };
        let g = red_blue(Point::ZERO, Point::new(96.0, 0.0));
        let bounds = Rect::new(0.0, 0.0, 96.0, 10.0);
        let err = |config: &FlattenerConfig| {
            let pieces = g.decompose(bounds, config).unwrap();
            let mut worst = 0.0_f32;
            for (geometry, color) in &pieces {
                let center = geometry.bounds().center();
                worst = worst.max(color_distance(*color, g.sample(center)));
            }
            worst
        };
        assert!(err(&fine_config) <= err(&coarse_config) + 1e-6);
    }

    #[test]
    fn solid_over_gradient_recolors_stops() {
        let mut g = red_blue(Point::ZERO, Point::new(10.0, 0.0));
        g.blend_solid_over(scale_alpha(WHITE, 0.5));
        // Red stop pulled halfway to white.
        let first = g.stops[0].color;
        assert!((first.components[0] - 1.0).abs() < 1e-4);
        assert!((first.components[1] - 0.5).abs() < 1e-4);
        assert!(g.is_opaque());
    }

    #[test]
    fn translucent_blend_inserts_stops() {
        // Alpha and color both vary across the interval, and the overlay is
        // translucent: exact intermediate stops must appear.
        let mut g = linear(
            Point::ZERO,
            Point::new(10.0, 0.0),
            &[(0.0, scale_alpha(RED, 0.2)), (1.0, BLUE)],
        );
        let before = g.stops.len();
        g.blend_solid_over(scale_alpha(WHITE, 0.5));
        assert!(g.stops.len() > before);
        // Offsets stay sorted.
        assert!(g.stops.windows(2).all(|w| w[0].offset <= w[1].offset));
    }

    #[test]
    fn period_compatibility() {
        let mut a = red_blue(Point::ZERO, Point::new(10.0, 0.0));
        let mut b = red_blue(Point::ZERO, Point::new(20.0, 0.0));
        a.extend = Extend::Repeat;
        b.extend = Extend::Repeat;
        assert!(a.layout_compatible(&b));

        b.kind = GradientKind::Linear {
            start: Point::ZERO,
            end: Point::new(15.0, 0.0),
        };
        assert!(!a.layout_compatible(&b));

        // Pad demands identical mappings.
        let a = red_blue(Point::ZERO, Point::new(10.0, 0.0));
        let b = red_blue(Point::ZERO, Point::new(20.0, 0.0));
        assert!(!a.layout_compatible(&b));
        let c = red_blue(Point::ZERO, Point::new(10.0, 0.0));
        assert!(a.layout_compatible(&c));
    }
}
