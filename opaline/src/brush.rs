// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The brush model and its blend algebra.
//!
//! A [`BrushProxy`] wraps one paint source (or an ordered layer stack) plus
//! the opacity state accumulated while flattening. The central operation is
//! [`BrushProxy::blend`]: produce a single brush whose effect equals
//! painting `under` then `over`, falling back to a layer stack when no
//! closed form exists — the renderer treats a layer stack as "rasterize
//! this region".
//!
//! Blend operations return new values; nothing here mutates a shared brush.

use crate::gradient::{GradientPaint, ReducedGradient};
use crate::image::ImageProxy;
use crate::primitive::Primitive;
use opaline_common::blend::{ColorInterpolation, blend_colors, scale_alpha};
use opaline_common::math::{
    self, FloatExt, is_almost_opaque, is_almost_transparent, normalize_opacity,
};
use peniko::Gradient;
use peniko::color::{AlphaColor, Srgb};
use peniko::kurbo::{Affine, Point, Rect};

const TRANSPARENT: AlphaColor<Srgb> = AlphaColor::new([0.0, 0.0, 0.0, 0.0]);

/// One paint source.
#[derive(Debug, Clone)]
pub enum Paint {
    /// A solid color.
    Solid(AlphaColor<Srgb>),
    /// A linear or radial gradient with resolved stops.
    Gradient(GradientPaint),
    /// A decoded image stretched across the brush bounds.
    Image(ImageProxy),
    /// A drawing (sub-scene) brush, optionally tiled.
    Drawing(DrawingPaint),
}

/// A pattern defined by a primitive subtree.
#[derive(Debug, Clone)]
pub struct DrawingPaint {
    /// Content of one tile, in viewport coordinates.
    pub root: Box<Primitive>,
    /// The tile rectangle in user space.
    pub viewport: Rect,
    /// Whether the viewport repeats to fill the brush bounds.
    pub tiled: bool,
}

/// A paint source plus accumulated opacity state.
#[derive(Debug, Clone)]
pub struct BrushProxy {
    /// The single paint source; `None` iff `layers` is non-empty.
    paint: Option<Paint>,
    /// Ordered layer stack, painted bottom to top. Regular layer stacks
    /// composite with source-over; opacity-only stacks multiply alphas.
    layers: Vec<BrushProxy>,
    /// Scalar opacity applied on top of the paint's own alpha.
    opacity: f32,
    /// Secondary brush whose alpha modulates this one.
    opacity_mask: Option<Box<BrushProxy>>,
    /// This proxy carries only an alpha contribution, not color.
    opacity_only: bool,
    /// Color painted across the bounds before the paint content.
    /// Only meaningful for drawing paints, whose content may not cover.
    before_fill: Option<AlphaColor<Srgb>>,
    /// Color painted across the bounds after the paint content.
    after_fill: Option<AlphaColor<Srgb>>,
    /// Absolute fill-region bounds. Required for any non-solid paint.
    bounds: Rect,
}

impl BrushProxy {
    fn from_paint(paint: Paint, bounds: Rect) -> Self {
        Self {
            paint: Some(paint),
            layers: Vec::new(),
            opacity: 1.0,
            opacity_mask: None,
            opacity_only: false,
            before_fill: None,
            after_fill: None,
            bounds,
        }
    }

    /// A solid-color brush, or `None` when the color paints nothing.
    pub fn solid(color: AlphaColor<Srgb>) -> Option<Self> {
        if is_almost_transparent(color.components[3]) {
            return None;
        }
        Some(Self::from_paint(Paint::Solid(color), Rect::ZERO))
    }

    /// A gradient brush in absolute coordinates, reduced to a solid (or
    /// nothing) when degenerate.
    pub fn gradient(
        gradient: &Gradient,
        interpolation: ColorInterpolation,
        bounds: Rect,
    ) -> Option<Self> {
        match GradientPaint::reduce(gradient, interpolation) {
            ReducedGradient::Empty => None,
            ReducedGradient::Solid(color) => Self::solid(color),
            ReducedGradient::Gradient(paint) => {
                Some(Self::from_paint(Paint::Gradient(paint), bounds))
            }
        }
    }

    /// A gradient brush whose coordinates are relative to the fill bounds
    /// (unit square mapping), made absolute immediately.
    pub fn gradient_relative(
        gradient: &Gradient,
        interpolation: ColorInterpolation,
        bounds: Rect,
    ) -> Option<Self> {
        let mut brush = Self::gradient(gradient, interpolation, bounds)?;
        let map = Affine::translate((bounds.x0, bounds.y0))
            * Affine::scale_non_uniform(bounds.width(), bounds.height());
        if let Some(Paint::Gradient(g)) = &mut brush.paint {
            g.apply_transform(&map);
        }
        Some(brush)
    }

    /// An image brush, or `None` when the image is fully transparent.
    pub fn image(image: ImageProxy, bounds: Rect) -> Option<Self> {
        if image.is_transparent() {
            return None;
        }
        Some(Self::from_paint(Paint::Image(image), bounds))
    }

    /// A drawing (pattern) brush.
    pub fn drawing(root: Primitive, viewport: Rect, tiled: bool, bounds: Rect) -> Option<Self> {
        if viewport.width() <= 0.0 || viewport.height() <= 0.0 {
            return None;
        }
        Some(Self::from_paint(
            Paint::Drawing(DrawingPaint {
                root: Box::new(root),
                viewport,
                tiled,
            }),
            bounds,
        ))
    }

    /// An opacity-only mask brush built from any proxy.
    pub fn into_opacity_mask(mut self) -> Self {
        self.opacity_only = true;
        self
    }

    /// The single paint source, if this is not a layer stack.
    pub fn paint(&self) -> Option<&Paint> {
        self.paint.as_ref()
    }

    /// The layer stack, empty for single-paint brushes.
    pub fn layers(&self) -> &[Self] {
        &self.layers
    }

    /// Absolute fill-region bounds.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Set the absolute fill-region bounds.
    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    /// Accumulated scalar opacity.
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Whether this proxy contributes only alpha.
    pub fn is_opacity_only(&self) -> bool {
        self.opacity_only
    }

    /// Whether an opacity mask is attached.
    pub fn has_opacity_mask(&self) -> bool {
        self.opacity_mask.is_some()
    }

    /// Color painted before the paint content, if any.
    pub fn before_fill(&self) -> Option<AlphaColor<Srgb>> {
        self.before_fill
    }

    /// Color painted after the paint content, if any.
    pub fn after_fill(&self) -> Option<AlphaColor<Srgb>> {
        self.after_fill
    }

    /// Whether painting this brush hides everything beneath it.
    pub fn is_opaque(&self) -> bool {
        if !is_almost_opaque(self.opacity) || self.opacity_mask.is_some() {
            return false;
        }
        if let Some(after) = self.after_fill {
            if is_almost_opaque(after.components[3]) {
                return true;
            }
        }
        match &self.paint {
            Some(Paint::Solid(c)) => is_almost_opaque(c.components[3]),
            Some(Paint::Gradient(g)) => g.is_opaque(),
            Some(Paint::Image(i)) => i.is_opaque(),
            // A drawing's own coverage is unknown; only its fills prove
            // opacity.
            Some(Paint::Drawing(_)) => self
                .before_fill
                .is_some_and(|c| is_almost_opaque(c.components[3])),
            // Any opaque layer makes the whole stack cover.
            None => self.layers.iter().any(Self::is_opaque),
        }
    }

    /// Whether painting this brush changes nothing.
    pub fn is_transparent(&self) -> bool {
        if is_almost_transparent(self.opacity) {
            return true;
        }
        if self.before_fill.is_some() || self.after_fill.is_some() {
            return false;
        }
        match &self.paint {
            Some(Paint::Solid(c)) => is_almost_transparent(c.components[3]),
            Some(Paint::Gradient(g)) => g.is_transparent(),
            Some(Paint::Image(i)) => i.is_transparent(),
            Some(Paint::Drawing(_)) => false,
            None => self.layers.iter().all(Self::is_transparent),
        }
    }

    /// Multiply in a scalar opacity.
    pub fn push_opacity(&mut self, opacity: f32) {
        self.opacity = normalize_opacity(self.opacity * normalize_opacity(opacity));
    }

    /// Attach an opacity mask, folding masks that reduce to a scalar.
    pub fn push_opacity_mask(&mut self, mask: Self) {
        // A mask that is a plain solid is just a number.
        if mask.opacity_mask.is_none() && mask.layers.is_empty() {
            if let Some(Paint::Solid(c)) = &mask.paint {
                self.push_opacity(c.components[3] * mask.opacity);
                return;
            }
        }
        let mask = mask.into_opacity_mask();
        self.opacity_mask = Some(Box::new(match self.opacity_mask.take() {
            None => mask,
            // Two masks multiply; an opacity-only layer stack has exactly
            // that sampling semantics.
            Some(existing) => Self {
                paint: None,
                layers: vec![*existing, mask],
                opacity: 1.0,
                opacity_mask: None,
                opacity_only: true,
                before_fill: None,
                after_fill: None,
                bounds: self.bounds,
            },
        }));
    }

    /// Apply an affine transform to the brush's coordinate mapping.
    pub fn apply_transform(&mut self, transform: &Affine) {
        if transform == &Affine::IDENTITY {
            return;
        }
        self.bounds = transform.transform_rect_bbox(self.bounds);
        match &mut self.paint {
            Some(Paint::Gradient(g)) => g.apply_transform(transform),
            Some(Paint::Drawing(d)) => {
                d.viewport = transform.transform_rect_bbox(d.viewport);
                d.root.common_mut().transform = *transform * d.root.common().transform;
            }
            // Images map through the bounds rect; solids are positionless.
            Some(Paint::Image(_)) | Some(Paint::Solid(_)) | None => {}
        }
        for layer in &mut self.layers {
            layer.apply_transform(transform);
        }
        if let Some(mask) = &mut self.opacity_mask {
            mask.apply_transform(transform);
        }
    }

    /// Reduce to a plain solid color, when the brush is exactly that.
    pub fn as_solid(&self) -> Option<AlphaColor<Srgb>> {
        if self.opacity_mask.is_some()
            || self.before_fill.is_some()
            || self.after_fill.is_some()
        {
            return None;
        }
        match &self.paint {
            Some(Paint::Solid(c)) => Some(scale_alpha(*c, self.opacity)),
            _ => None,
        }
    }

    /// The color of the brush at a user-space point, for rasterization.
    ///
    /// Opacity-only layer stacks multiply their layers' alphas; regular
    /// stacks composite with source-over.
    pub fn sample(&self, point: Point) -> AlphaColor<Srgb> {
        let mut color = if let Some(paint) = &self.paint {
            let base = match paint {
                Paint::Solid(c) => *c,
                Paint::Gradient(g) => g.sample(point),
                Paint::Image(i) => {
                    if self.bounds.width() <= 0.0 || self.bounds.height() <= 0.0 {
                        TRANSPARENT
                    } else {
                        let u = (point.x - self.bounds.x0) / self.bounds.width();
                        let v = (point.y - self.bounds.y0) / self.bounds.height();
                        if (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v) {
                            i.sample(u, v)
                        } else {
                            TRANSPARENT
                        }
                    }
                }
                Paint::Drawing(d) => sample_drawing(d, point),
            };
            let mut color = match self.before_fill {
                Some(before) => blend_colors(before, base),
                None => base,
            };
            if let Some(after) = self.after_fill {
                color = blend_colors(color, after);
            }
            color
        } else if self.opacity_only {
            let mut alpha = 1.0;
            for layer in &self.layers {
                alpha *= layer.sample(point).components[3];
            }
            AlphaColor::new([0.0, 0.0, 0.0, alpha])
        } else {
            let mut color = TRANSPARENT;
            for layer in &self.layers {
                color = blend_colors(color, layer.sample(point));
            }
            color
        };

        color = scale_alpha(color, self.opacity);
        if let Some(mask) = &self.opacity_mask {
            color = scale_alpha(color, mask.sample(point).components[3]);
        }
        color
    }

    /// Fold the scalar opacity into the paint itself, leaving `opacity` at
    /// one. Layer stacks and masked brushes are left alone.
    fn normalized(&self) -> Self {
        let mut out = self.clone();
        if out.opacity.is_nearly_one() || out.opacity_mask.is_some() || out.paint.is_none() {
            return out;
        }
        let opacity = out.opacity;
        match &mut out.paint {
            Some(Paint::Solid(c)) => *c = scale_alpha(*c, opacity),
            Some(Paint::Gradient(g)) => g.scale_alpha(opacity),
            Some(Paint::Image(i)) => i.push_opacity(opacity),
            Some(Paint::Drawing(_)) | None => return out,
        }
        out.before_fill = out.before_fill.map(|c| scale_alpha(c, opacity));
        out.after_fill = out.after_fill.map(|c| scale_alpha(c, opacity));
        out.opacity = 1.0;
        out
    }

    /// Blend two brushes: the result painted once equals painting `under`
    /// then `over` across the region both cover.
    ///
    /// When no closed form exists the result is an ordered layer stack,
    /// which downstream code must rasterize.
    pub fn blend(under: &Self, over: &Self) -> Self {
        // An opaque overlay hides the underlay outright.
        if over.is_opaque() && !over.opacity_only {
            return over.clone();
        }

        if under.opacity_mask.is_none()
            && over.opacity_mask.is_none()
            && under.paint.is_some()
            && over.paint.is_some()
        {
            if let Some(result) = Self::blend_closed_form(&under.normalized(), &over.normalized())
            {
                return result;
            }
        }

        Self::layer_stack(under, over)
    }

    /// The per-paint-kind closed forms. Inputs have opacity folded in, no
    /// masks, single paints.
    fn blend_closed_form(under: &Self, over: &Self) -> Option<Self> {
        debug_assert!(under.opacity_mask.is_none() && over.opacity_mask.is_none());
        let under_paint = under.paint.as_ref()?;
        let over_paint = over.paint.as_ref()?;

        // Solid overlays fold into any paint kind.
        if let Paint::Solid(s) = over_paint {
            let s = *s;
            if over.opacity_only || !over.layers.is_empty() {
                return None;
            }
            let mut out = under.clone();
            match out.paint.as_mut()? {
                Paint::Solid(u) => *u = blend_colors(*u, s),
                Paint::Gradient(g) => g.blend_solid_over(s),
                Paint::Image(i) => i.blend_over_color(s),
                Paint::Drawing(_) => {
                    // The after-fill paints across the whole region after
                    // the drawing, which is exactly where the overlay goes.
                    // A residual drawing opacity would wrongly scale the
                    // overlay too, so bail out to a layer stack then.
                    if !out.opacity.is_nearly_one() {
                        return None;
                    }
                    out.after_fill = Some(match out.after_fill {
                        Some(after) => blend_colors(after, s),
                        None => s,
                    });
                }
            }
            return Some(out);
        }

        // Solid underlays fold into any paint kind.
        if let Paint::Solid(u) = under_paint {
            let u = *u;
            let mut out = over.clone();
            match out.paint.as_mut()? {
                Paint::Solid(_) => unreachable!("solid-over-solid handled above"),
                Paint::Gradient(g) => g.blend_over_solid(u),
                Paint::Image(i) => i.blend_under_color(u),
                Paint::Drawing(_) => {
                    if !out.opacity.is_nearly_one() {
                        return None;
                    }
                    out.before_fill = Some(match out.before_fill {
                        Some(before) => blend_colors(u, before),
                        None => u,
                    });
                }
            }
            return Some(out);
        }

        match (under_paint, over_paint) {
            (Paint::Gradient(a), Paint::Gradient(b)) => {
                if under.before_fill.is_some() || under.after_fill.is_some() {
                    return None;
                }
                let blended = a.blend_compatible_over(b)?;
                let mut out = under.clone();
                out.paint = Some(Paint::Gradient(blended));
                out.after_fill = over.after_fill;
                Some(out)
            }
            (Paint::Image(a), Paint::Image(b)) => {
                // Same placement and resolution: blend pixels directly.
                if !rects_near(under.bounds, over.bounds) {
                    return None;
                }
                let mut top = b.clone();
                if !top.blend_under_image(a) {
                    return None;
                }
                let mut out = over.clone();
                out.paint = Some(Paint::Image(top));
                Some(out)
            }
            _ => None,
        }
    }

    /// The ordered fallback: paint `under`, then `over`.
    fn layer_stack(under: &Self, over: &Self) -> Self {
        // Alpha contributions and real color never share a stack.
        debug_assert!(
            !under.opacity_only && !over.opacity_only,
            "opacity-only masks must not be mixed into paint layer stacks"
        );
        let mut layers = Vec::new();
        let mut push = |brush: &Self| {
            // Flatten nested unmasked stacks to keep the list shallow.
            if brush.paint.is_none()
                && brush.opacity_mask.is_none()
                && brush.opacity.is_nearly_one()
            {
                layers.extend(brush.layers.iter().cloned());
            } else {
                layers.push(brush.clone());
            }
        };
        push(under);
        push(over);
        Self {
            paint: None,
            layers,
            opacity: 1.0,
            opacity_mask: None,
            opacity_only: false,
            before_fill: None,
            after_fill: None,
            bounds: rect_union_nonempty(under.bounds, over.bounds),
        }
    }
}

/// Pen shape plus the brush its stroke is painted with.
#[derive(Debug, Clone)]
pub struct PenProxy {
    /// Stroke width, caps, joins and dashes.
    pub stroke: peniko::kurbo::Stroke,
    /// Paint for the stroke.
    pub brush: BrushProxy,
}

impl PenProxy {
    /// Create a pen; zero-width pens are the distinguished "no visible
    /// stroke" case and yield `None`.
    pub fn new(stroke: peniko::kurbo::Stroke, brush: BrushProxy) -> Option<Self> {
        if stroke.width.is_nearly_zero() || stroke.width < 0.0 {
            return None;
        }
        Some(Self { stroke, brush })
    }

    /// Whether the stroke would show at all.
    pub fn is_visible(&self) -> bool {
        !self.brush.is_transparent()
    }
}

fn sample_drawing(drawing: &DrawingPaint, point: Point) -> AlphaColor<Srgb> {
    let local = if drawing.tiled {
        let w = drawing.viewport.width();
        let h = drawing.viewport.height();
        if w <= 0.0 || h <= 0.0 {
            return TRANSPARENT;
        }
        Point::new(
            drawing.viewport.x0 + (point.x - drawing.viewport.x0).rem_euclid(w),
            drawing.viewport.y0 + (point.y - drawing.viewport.y0).rem_euclid(h),
        )
    } else {
        point
    };
    drawing.root.sample(local)
}

fn rects_near(a: Rect, b: Rect) -> bool {
    (a.x0 - b.x0).abs() < math::GEOMETRY_EPSILON
        && (a.y0 - b.y0).abs() < math::GEOMETRY_EPSILON
        && (a.x1 - b.x1).abs() < math::GEOMETRY_EPSILON
        && (a.y1 - b.y1).abs() < math::GEOMETRY_EPSILON
}

fn rect_union_nonempty(a: Rect, b: Rect) -> Rect {
    if a.width() <= 0.0 || a.height() <= 0.0 {
        b
    } else if b.width() <= 0.0 || b.height() <= 0.0 {
        a
    } else {
        a.union(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::GradientStop;
    use peniko::color::palette::css::{BLUE, RED, WHITE};
    use peniko::kurbo::Point;
    use peniko::{Extend, GradientKind};

    fn half(color: AlphaColor<Srgb>) -> AlphaColor<Srgb> {
        scale_alpha(color, 0.5)
    }

    fn gradient_brush(stops: &[(f32, AlphaColor<Srgb>)]) -> BrushProxy {
        let paint = GradientPaint {
            kind: GradientKind::Linear {
                start: Point::ZERO,
                end: Point::new(10.0, 0.0),
            },
            extend: Extend::Pad,
            interpolation: ColorInterpolation::Srgb,
            stops: stops
                .iter()
                .map(|&(offset, color)| GradientStop { offset, color })
                .collect(),
        };
        BrushProxy::from_paint(Paint::Gradient(paint), Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn transparent_solid_is_nothing() {
        assert!(BrushProxy::solid(AlphaColor::new([1.0, 0.0, 0.0, 0.0])).is_none());
        assert!(BrushProxy::solid(RED).is_some());
    }

    #[test]
    fn opaque_overlay_wins() {
        let under = BrushProxy::solid(half(RED)).unwrap();
        let over = BrushProxy::solid(BLUE).unwrap();
        let blended = BrushProxy::blend(&under, &over);
        assert_eq!(blended.as_solid().unwrap().components, BLUE.components);
    }

    #[test]
    fn solid_over_solid_matches_formula() {
        let under = BrushProxy::solid(WHITE).unwrap();
        let over = BrushProxy::solid(half(BLUE)).unwrap();
        let blended = BrushProxy::blend(&under, &over);
        let color = blended.as_solid().unwrap();
        for (got, want) in color.components.iter().zip([0.5, 0.5, 1.0, 1.0]) {
            assert!((got - want).abs() < 1e-4, "{:?}", color.components);
        }
        assert!(blended.is_opaque());
    }

    #[test]
    fn proxy_opacity_participates_in_blend() {
        // A fully opaque color with 0.5 proxy opacity behaves like a
        // 50%-alpha color.
        let under = BrushProxy::solid(WHITE).unwrap();
        let mut over = BrushProxy::solid(BLUE).unwrap();
        over.push_opacity(0.5);
        let color = BrushProxy::blend(&under, &over).as_solid().unwrap();
        assert!((color.components[0] - 0.5).abs() < 1e-4);
        assert!((color.components[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn opacity_pushes_multiply() {
        let mut brush = BrushProxy::solid(RED).unwrap();
        brush.push_opacity(0.5);
        brush.push_opacity(0.5);
        let mut other = BrushProxy::solid(RED).unwrap();
        other.push_opacity(0.25);
        assert!((brush.opacity() - other.opacity()).abs() < 1e-6);
    }

    #[test]
    fn solid_mask_folds_to_scalar() {
        let mut brush = BrushProxy::solid(RED).unwrap();
        brush.push_opacity_mask(BrushProxy::solid(half(WHITE)).unwrap());
        assert!(brush.opacity_mask.is_none());
        assert!((brush.opacity() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn gradient_mask_stays_a_mask() {
        let mut brush = BrushProxy::solid(RED).unwrap();
        brush.push_opacity_mask(gradient_brush(&[(0.0, WHITE), (1.0, half(WHITE))]));
        assert!(brush.opacity_mask.is_some());
        assert!(!brush.is_opaque());
        // Mask alpha modulates samples along the gradient.
        let left = brush.sample(Point::new(0.0, 5.0)).components[3];
        let right = brush.sample(Point::new(10.0, 5.0)).components[3];
        assert!(left > right);
    }

    #[test]
    fn solid_over_gradient_stays_gradient() {
        let under = gradient_brush(&[(0.0, RED), (1.0, BLUE)]);
        let over = BrushProxy::solid(half(WHITE)).unwrap();
        let blended = BrushProxy::blend(&under, &over);
        assert!(matches!(blended.paint(), Some(Paint::Gradient(_))));
        assert!(blended.is_opaque());
        assert!(blended.layers().is_empty());
    }

    #[test]
    fn incompatible_gradients_become_layers() {
        let under = gradient_brush(&[(0.0, half(RED)), (1.0, half(BLUE))]);
        let mut over = gradient_brush(&[(0.0, half(BLUE)), (1.0, half(RED))]);
        if let Some(Paint::Gradient(g)) = &mut over.paint {
            g.kind = GradientKind::Linear {
                start: Point::new(0.0, 3.0),
                end: Point::new(7.0, 0.0),
            };
        }
        let blended = BrushProxy::blend(&under, &over);
        assert!(blended.paint().is_none());
        assert_eq!(blended.layers().len(), 2);
    }

    #[test]
    fn compatible_gradients_blend_closed_form() {
        let under = gradient_brush(&[(0.0, RED), (1.0, BLUE)]);
        let over = gradient_brush(&[(0.0, half(BLUE)), (1.0, half(RED))]);
        let blended = BrushProxy::blend(&under, &over);
        assert!(matches!(blended.paint(), Some(Paint::Gradient(_))));
        assert!(blended.is_opaque());
    }

    #[test]
    fn blend_matches_independent_painting() {
        // Sampling the blended brush equals sampling both and compositing,
        // for a point grid over the bounds.
        let under = gradient_brush(&[(0.0, RED), (1.0, half(BLUE))]);
        let over = BrushProxy::solid(half(WHITE)).unwrap();
        let blended = BrushProxy::blend(&under, &over);
        for i in 0..=10 {
            let p = Point::new(f64::from(i), 5.0);
            let expect = blend_colors(under.sample(p), over.sample(p));
            let got = blended.sample(p);
            for k in 0..4 {
                assert!(
                    (expect.components[k] - got.components[k]).abs() < 1e-3,
                    "mismatch at {p:?}: {:?} vs {:?}",
                    expect.components,
                    got.components
                );
            }
        }
    }

    #[test]
    fn transform_moves_gradient_axis() {
        let mut brush = gradient_brush(&[(0.0, RED), (1.0, BLUE)]);
        brush.apply_transform(&Affine::translate((5.0, 0.0)));
        match brush.paint() {
            Some(Paint::Gradient(g)) => match g.kind {
                GradientKind::Linear { start, .. } => assert_eq!(start, Point::new(5.0, 0.0)),
                _ => panic!("expected linear"),
            },
            _ => panic!("expected gradient"),
        }
        assert_eq!(brush.bounds(), Rect::new(5.0, 0.0, 15.0, 10.0));
    }
}
