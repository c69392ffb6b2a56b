// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The drawing-command tree.
//!
//! A [`Primitive`] is one drawable unit: a filled/stroked geometry, an
//! image, a glyph run, or a canvas grouping children with shared
//! transform/clip/opacity state. The tree is built by the host, then
//! consumed destructively by the flattening pass; [`Clone`] is a deep copy
//! throughout, so clones are always safe to mutate.

use crate::brush::{BrushProxy, Paint, PenProxy};
use crate::image::{ImageOpacity, ImageProxy};
use opaline_common::blend::{blend_colors, scale_alpha};
use opaline_common::config::FlattenerConfig;
use opaline_common::geometry::{Geometry, widen_stroke};
use opaline_common::glyph::GlyphRun;
use opaline_common::math::{
    self, is_almost_opaque, is_almost_transparent, normalize_opacity, safe_inverse,
};
use peniko::color::{AlphaColor, Srgb};
use peniko::kurbo::{Affine, Point, Rect};
use std::cell::OnceCell;

/// Geometric point count beyond which a primitive forces its cluster to
/// rasterize rather than decompose analytically.
pub const COMPLEXITY_LIMIT: usize = 5000;

/// State every primitive carries.
#[derive(Debug, Clone)]
pub struct PrimitiveCommon {
    /// Clip region in the primitive's outer coordinate space.
    pub clip: Option<Geometry>,
    /// Accumulated opacity, always normalized to `[0, 1]`.
    pub opacity: f32,
    /// Accumulated opacity mask.
    pub opacity_mask: Option<BrushProxy>,
    /// Transform from content coordinates to the outer space.
    pub transform: Affine,
}

impl Default for PrimitiveCommon {
    fn default() -> Self {
        Self {
            clip: None,
            opacity: 1.0,
            opacity_mask: None,
            transform: Affine::IDENTITY,
        }
    }
}

/// A filled and/or stroked shape.
#[derive(Debug, Clone)]
pub struct GeometryPrimitive {
    /// Shared state.
    pub common: PrimitiveCommon,
    /// The outline; `None` marks a primitive that `optimize` emptied and
    /// the owner must drop.
    pub geometry: Option<Geometry>,
    /// Fill brush.
    pub brush: Option<BrushProxy>,
    /// Stroke pen.
    pub pen: Option<PenProxy>,
    widened: OnceCell<Geometry>,
}

/// A glyph run filled with a brush.
#[derive(Debug, Clone)]
pub struct GlyphPrimitive {
    /// Shared state.
    pub common: PrimitiveCommon,
    /// The glyphs.
    pub run: GlyphRun,
    /// Foreground brush.
    pub brush: BrushProxy,
    fill: OnceCell<Geometry>,
}

/// A decoded image stretched into a rectangle.
#[derive(Debug, Clone)]
pub struct ImagePrimitive {
    /// Shared state.
    pub common: PrimitiveCommon,
    /// The pixels.
    pub image: ImageProxy,
    /// Destination rectangle in content coordinates.
    pub dest: Rect,
}

/// An ordered group of children; later children paint over earlier ones.
#[derive(Debug, Clone)]
pub struct CanvasPrimitive {
    /// Shared state.
    pub common: PrimitiveCommon,
    /// Children in paint order.
    pub children: Vec<Primitive>,
}

/// One drawable unit in the intermediate tree.
#[derive(Debug, Clone)]
pub enum Primitive {
    /// Filled/stroked shape.
    Geometry(GeometryPrimitive),
    /// Glyph run.
    Glyph(GlyphPrimitive),
    /// Image.
    Image(ImagePrimitive),
    /// Grouping node.
    Canvas(CanvasPrimitive),
}

impl Primitive {
    /// A geometry primitive. At least one of `brush`/`pen` should be
    /// present; a bare outline paints nothing and is culled by `optimize`.
    pub fn geometry(
        geometry: Geometry,
        brush: Option<BrushProxy>,
        pen: Option<PenProxy>,
    ) -> Self {
        Self::Geometry(GeometryPrimitive {
            common: PrimitiveCommon::default(),
            geometry: Some(geometry),
            brush,
            pen,
            widened: OnceCell::new(),
        })
    }

    /// A glyph-run primitive.
    pub fn glyphs(run: GlyphRun, brush: BrushProxy) -> Self {
        Self::Glyph(GlyphPrimitive {
            common: PrimitiveCommon::default(),
            run,
            brush,
            fill: OnceCell::new(),
        })
    }

    /// An image primitive.
    pub fn image(image: ImageProxy, dest: Rect) -> Self {
        Self::Image(ImagePrimitive {
            common: PrimitiveCommon::default(),
            image,
            dest,
        })
    }

    /// A canvas grouping `children`.
    pub fn canvas(children: Vec<Primitive>) -> Self {
        Self::Canvas(CanvasPrimitive {
            common: PrimitiveCommon::default(),
            children,
        })
    }

    /// Set the primitive's own opacity.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.common_mut().opacity = normalize_opacity(opacity);
        self
    }

    /// Set the primitive's clip.
    pub fn with_clip(mut self, clip: Geometry) -> Self {
        self.common_mut().clip = Some(clip);
        self
    }

    /// Set the primitive's transform.
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.common_mut().transform = transform;
        self
    }

    /// Set the primitive's opacity mask.
    pub fn with_opacity_mask(mut self, mask: BrushProxy) -> Self {
        self.common_mut().opacity_mask = Some(mask);
        self
    }

    /// Shared state.
    pub fn common(&self) -> &PrimitiveCommon {
        match self {
            Self::Geometry(p) => &p.common,
            Self::Glyph(p) => &p.common,
            Self::Image(p) => &p.common,
            Self::Canvas(p) => &p.common,
        }
    }

    /// Shared state, mutably.
    pub fn common_mut(&mut self) -> &mut PrimitiveCommon {
        match self {
            Self::Geometry(p) => &mut p.common,
            Self::Glyph(p) => &mut p.common,
            Self::Image(p) => &mut p.common,
            Self::Canvas(p) => &mut p.common,
        }
    }

    /// Content bounds in content coordinates, before transform and clip.
    fn content_bounds(&self) -> Rect {
        match self {
            Self::Geometry(p) => {
                let fill = p.geometry.as_ref().map(Geometry::bounds);
                let stroke = p.stroke_shape().map(|g| g.bounds());
                match (fill, stroke) {
                    (Some(f), Some(s)) => f.union(s),
                    (Some(f), None) => {
                        if p.brush.is_some() {
                            f
                        } else {
                            Rect::ZERO
                        }
                    }
                    _ => Rect::ZERO,
                }
            }
            Self::Glyph(p) => p.run.bounds(),
            Self::Image(p) => p.dest,
            Self::Canvas(p) => {
                let mut bounds: Option<Rect> = None;
                for child in &p.children {
                    let b = child.bounds();
                    if b.width() > 0.0 && b.height() > 0.0 {
                        bounds = Some(bounds.map_or(b, |acc| acc.union(b)));
                    }
                }
                bounds.unwrap_or(Rect::ZERO)
            }
        }
    }

    /// Painted bounds in outer coordinates: content bounds through the
    /// transform, cut down by the clip.
    pub fn bounds(&self) -> Rect {
        let common = self.common();
        let mut bounds = common.transform.transform_rect_bbox(self.content_bounds());
        if let Some(clip) = &common.clip {
            bounds = bounds.intersect(clip.bounds());
        }
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            Rect::ZERO
        } else {
            bounds
        }
    }

    /// A shape guaranteed to be covered by this primitive's paint, for
    /// occlusion tests. `EMPTY` when no exact subset is known.
    pub fn covering_shape(&self) -> Geometry {
        let common = self.common();
        let shape = match self {
            Self::Geometry(p) => match (&p.geometry, &p.brush) {
                (Some(g), Some(_)) => g.transformed(&common.transform),
                // A stroke alone never covers its bounds.
                _ => return Geometry::EMPTY,
            },
            Self::Image(p) => Geometry::Rect(p.dest).transformed(&common.transform),
            // Glyph ink and canvas content never prove coverage.
            Self::Glyph(_) | Self::Canvas(_) => return Geometry::EMPTY,
        };
        match &common.clip {
            None => shape,
            Some(clip) => shape.intersect(clip).unwrap_or(Geometry::EMPTY),
        }
    }

    /// The primitive's painted shape in outer coordinates, used for
    /// overlap decomposition. Falls back to the bounds rectangle when the
    /// clip can't be intersected analytically (a superset, which is safe
    /// for overlap but not for coverage — see [`covering_shape`]).
    ///
    /// [`covering_shape`]: Self::covering_shape
    pub fn painted_shape(&self) -> Geometry {
        let common = self.common();
        let shape = match self {
            Self::Geometry(p) => {
                let fill = p
                    .brush
                    .as_ref()
                    .and_then(|_| p.geometry.clone());
                match (fill, p.stroke_shape()) {
                    (Some(f), None) => f.transformed(&common.transform),
                    (None, Some(s)) => s.transformed(&common.transform),
                    _ => Geometry::Rect(self.bounds()),
                }
            }
            Self::Glyph(p) => p.fill_shape().transformed(&common.transform),
            Self::Image(p) => Geometry::Rect(p.dest).transformed(&common.transform),
            Self::Canvas(_) => Geometry::Rect(self.bounds()),
        };
        match &common.clip {
            None => shape,
            Some(clip) => shape
                .intersect(clip)
                .unwrap_or_else(|| Geometry::Rect(self.bounds())),
        }
    }

    /// Multiply in opacity (and optionally a mask), normalizing so that
    /// siblings always observe opacity in `[0, 1]`.
    ///
    /// Where possible the opacity is absorbed into the brush; otherwise it
    /// stays on the primitive for the renderer to resolve.
    pub fn push_opacity(&mut self, opacity: f32, mask: Option<&BrushProxy>) {
        let opacity = normalize_opacity(opacity);
        match self {
            Self::Geometry(p) => {
                let both = p.brush.is_some() && p.pen.is_some();
                if both {
                    // Fill and stroke would double-blend where they overlap;
                    // the flattener splits such primitives before pushing
                    // real transparency. Opaque pushes are still absorbed.
                    debug_assert!(
                        is_almost_opaque(opacity) && mask.is_none(),
                        "translucent push onto fill+stroke primitive"
                    );
                }
                if let Some(brush) = &mut p.brush {
                    brush.push_opacity(opacity);
                    if let Some(mask) = mask {
                        brush.push_opacity_mask(mask.clone());
                    }
                }
                if let Some(pen) = &mut p.pen {
                    pen.brush.push_opacity(opacity);
                    if let Some(mask) = mask {
                        pen.brush.push_opacity_mask(mask.clone());
                    }
                }
            }
            Self::Glyph(p) => {
                p.brush.push_opacity(opacity);
                if let Some(mask) = mask {
                    p.brush.push_opacity_mask(mask.clone());
                }
            }
            Self::Image(p) => {
                p.image.push_opacity(opacity);
                if let Some(mask) = mask {
                    // No pixel-level fold without rasterizing the mask;
                    // keep it on the primitive.
                    match &mut p.common.opacity_mask {
                        Some(existing) => existing.push_opacity_mask(mask.clone()),
                        None => p.common.opacity_mask = Some(mask.clone()),
                    }
                }
            }
            Self::Canvas(p) => {
                p.common.opacity = normalize_opacity(p.common.opacity * opacity);
                if let Some(mask) = mask {
                    match &mut p.common.opacity_mask {
                        Some(existing) => existing.push_opacity_mask(mask.clone()),
                        None => p.common.opacity_mask = Some(mask.clone()),
                    }
                }
            }
        }
    }

    /// Whether the primitive paints nothing visible.
    pub fn is_transparent(&self) -> bool {
        let common = self.common();
        if is_almost_transparent(common.opacity) {
            return true;
        }
        if common
            .clip
            .as_ref()
            .is_some_and(|clip| clip.is_empty())
        {
            return true;
        }
        if math::is_degenerate(&common.transform) {
            return true;
        }
        match self {
            Self::Geometry(p) => {
                let fill_visible = p.geometry.is_some()
                    && p.brush.as_ref().is_some_and(|b| !b.is_transparent());
                let stroke_visible = p.geometry.is_some()
                    && p.pen.as_ref().is_some_and(PenProxy::is_visible);
                !fill_visible && !stroke_visible
            }
            Self::Glyph(p) => p.brush.is_transparent() || p.run.glyphs.is_empty(),
            Self::Image(p) => p.image.is_transparent(),
            Self::Canvas(p) => p.children.iter().all(Self::is_transparent),
        }
    }

    /// Whether the primitive carries alpha a non-compositing device can't
    /// express: partial opacity, a mask, or translucent paint content.
    /// Fully transparent primitives don't count; they are culled instead.
    pub fn has_translucency(&self) -> bool {
        let common = self.common();
        if !is_almost_opaque(common.opacity) || common.opacity_mask.is_some() {
            return true;
        }
        let translucent = |b: &BrushProxy| !b.is_opaque() && !b.is_transparent();
        match self {
            Self::Geometry(p) => {
                p.brush.as_ref().is_some_and(translucent)
                    || p.pen.as_ref().is_some_and(|pen| translucent(&pen.brush))
            }
            Self::Glyph(p) => translucent(&p.brush),
            Self::Image(p) => p.image.opacity() == ImageOpacity::Translucent,
            Self::Canvas(p) => p.children.iter().any(Self::has_translucency),
        }
    }

    /// The primitive's painted shape in outer coordinates, ignoring the
    /// clip, or `None` when no exact shape exists. A glyph run's shape is
    /// exact only when the host attached a real outline.
    pub fn exact_shape(&self) -> Option<Geometry> {
        let transform = self.common().transform;
        let shape = match self {
            Self::Geometry(p) => match (&p.geometry, &p.brush) {
                (Some(g), Some(_)) => g.clone(),
                (Some(_), None) => p.stroke_shape()?.clone(),
                (None, _) => Geometry::EMPTY,
            },
            Self::Glyph(p) => {
                if !p.run.has_outline() {
                    return None;
                }
                p.fill_shape().clone()
            }
            Self::Image(p) => Geometry::Rect(p.dest),
            Self::Canvas(_) => return None,
        };
        Some(shape.transformed(&transform))
    }

    /// Whether the primitive fully hides everything beneath its shape.
    pub fn is_opaque(&self) -> bool {
        let common = self.common();
        if !is_almost_opaque(common.opacity) || common.opacity_mask.is_some() {
            return false;
        }
        match self {
            Self::Geometry(p) => p
                .brush
                .as_ref()
                .is_some_and(BrushProxy::is_opaque),
            Self::Image(p) => p.image.is_opaque(),
            // Glyph ink never covers its box; canvas coverage is unknown.
            Self::Glyph(_) | Self::Canvas(_) => false,
        }
    }

    /// Fold the carried transform into the content, leaving the transform
    /// at identity. The clip is already in outer coordinates and is
    /// untouched.
    pub fn apply_transform(&mut self) {
        let transform = self.common().transform;
        if transform == Affine::IDENTITY {
            return;
        }
        match self {
            Self::Geometry(p) => {
                if let Some(geometry) = &mut p.geometry {
                    geometry.apply_transform(&transform);
                }
                if let Some(brush) = &mut p.brush {
                    brush.apply_transform(&transform);
                }
                if let Some(pen) = &mut p.pen {
                    pen.brush.apply_transform(&transform);
                    pen.stroke.width *= math::max_scale(&transform);
                }
                p.widened = OnceCell::new();
                p.common.transform = Affine::IDENTITY;
            }
            Self::Glyph(p) => {
                // Glyph geometry stays in run coordinates; only uniform
                // scale-translate folds cleanly into positions. Anything
                // else remains on the primitive for the device transform
                // stack.
                if math::is_uniform_scale_translate(&transform) {
                    let scale = transform.as_coeffs()[0];
                    let outline = p
                        .run
                        .has_outline()
                        .then(|| p.fill_shape().transformed(&transform).to_bez_path());
                    let bounds = transform.transform_rect_bbox(p.run.bounds());
                    let mut glyphs = std::mem::take(&mut p.run.glyphs);
                    for glyph in &mut glyphs {
                        let mapped = transform * Point::new(glyph.x, glyph.y);
                        glyph.x = mapped.x;
                        glyph.y = mapped.y;
                    }
                    let mut run = GlyphRun::new(glyphs, p.run.font_size * scale, bounds);
                    if let Some(outline) = outline {
                        run = run.with_outline(outline);
                    }
                    p.run = run;
                    p.brush.apply_transform(&transform);
                    p.fill = OnceCell::new();
                    p.common.transform = Affine::IDENTITY;
                }
            }
            Self::Image(p) => {
                if math::is_scale_translate(&transform) {
                    p.dest = transform.transform_rect_bbox(p.dest);
                    p.common.transform = Affine::IDENTITY;
                }
            }
            Self::Canvas(_) => {
                // Canvases are dissolved by the flattener before this is
                // ever called on one.
                debug_assert!(false, "apply_transform on a canvas");
            }
        }
    }

    /// Last-chance cleanup before a primitive enters the display list.
    /// Returns `false` when the primitive turned out to paint nothing and
    /// must be dropped.
    pub fn optimize(&mut self) -> bool {
        match self {
            Self::Geometry(p) => {
                if let Some(geometry) = &p.geometry {
                    if geometry.is_empty() {
                        p.geometry = None;
                    }
                }
                if p.brush.as_ref().is_some_and(BrushProxy::is_transparent) {
                    p.brush = None;
                }
                if p.pen.as_ref().is_some_and(|pen| !pen.is_visible()) {
                    p.pen = None;
                }
                p.geometry.is_some() && (p.brush.is_some() || p.pen.is_some())
            }
            Self::Glyph(p) => !p.run.glyphs.is_empty() && !p.brush.is_transparent(),
            Self::Image(p) => {
                !p.image.is_transparent() && p.dest.width() > 0.0 && p.dest.height() > 0.0
            }
            Self::Canvas(p) => !p.children.is_empty(),
        }
    }

    /// Estimated cost of emitting this primitive analytically, compared
    /// against [`FlattenerConfig::rasterization_cost`] when deciding a
    /// cluster's fate.
    pub fn drawing_cost(&self, config: &FlattenerConfig) -> f64 {
        let shape_cost = |geometry: Option<&Geometry>| {
            geometry.map_or(4.0, |g| g.point_count() as f64)
        };
        let brush_cost = |brush: Option<&BrushProxy>| match brush.and_then(BrushProxy::paint) {
            None | Some(Paint::Solid(_)) => 1.0,
            // A gradient multiplies the shape by its likely band count.
            Some(Paint::Gradient(_)) => 32.0,
            Some(Paint::Image(_)) | Some(Paint::Drawing(_)) => {
                let b = self.bounds();
                config.rasterization_cost(b.width(), b.height())
            }
        };
        match self {
            Self::Geometry(p) => {
                shape_cost(p.geometry.as_ref()) * brush_cost(p.brush.as_ref())
                    + p.pen
                        .as_ref()
                        .map_or(0.0, |pen| {
                            shape_cost(p.geometry.as_ref()) * brush_cost(Some(&pen.brush))
                        })
            }
            Self::Glyph(p) => {
                (p.run.glyphs.len() as f64 * 8.0).max(4.0) * brush_cost(Some(&p.brush))
            }
            Self::Image(p) => config.rasterization_cost(p.dest.width(), p.dest.height()),
            Self::Canvas(p) => p.children.iter().map(|c| c.drawing_cost(config)).sum(),
        }
    }

    /// Geometric complexity, for the hard rasterization trigger.
    pub fn point_count(&self) -> usize {
        match self {
            Self::Geometry(p) => p.geometry.as_ref().map_or(0, Geometry::point_count),
            Self::Glyph(p) => p.run.glyphs.len() * 8,
            Self::Image(_) => 4,
            Self::Canvas(p) => p.children.iter().map(Self::point_count).sum(),
        }
    }

    /// The color this primitive contributes at a point, for rasterization
    /// and drawing-brush sampling. Transparent where the primitive does
    /// not paint.
    pub fn sample(&self, point: Point) -> AlphaColor<Srgb> {
        const NONE: AlphaColor<Srgb> = AlphaColor::new([0.0, 0.0, 0.0, 0.0]);
        let common = self.common();
        if let Some(clip) = &common.clip {
            if !clip.hit_test(point) {
                return NONE;
            }
        }
        let local = match safe_inverse(&common.transform) {
            Some(inverse) => inverse * point,
            None => return NONE,
        };
        let mut color = match self {
            Self::Geometry(p) => {
                let fill_hit = p
                    .geometry
                    .as_ref()
                    .is_some_and(|g| g.hit_test(local))
                    && p.brush.is_some();
                if fill_hit {
                    p.brush.as_ref().map_or(NONE, |b| b.sample(local))
                } else if p
                    .stroke_shape()
                    .is_some_and(|s| s.hit_test(local))
                {
                    p.pen.as_ref().map_or(NONE, |pen| pen.brush.sample(local))
                } else {
                    NONE
                }
            }
            Self::Glyph(p) => {
                if p.fill_shape().hit_test(local) {
                    p.brush.sample(local)
                } else {
                    NONE
                }
            }
            Self::Image(p) => {
                if p.dest.contains(local) && p.dest.width() > 0.0 && p.dest.height() > 0.0 {
                    p.image.sample(
                        (local.x - p.dest.x0) / p.dest.width(),
                        (local.y - p.dest.y0) / p.dest.height(),
                    )
                } else {
                    NONE
                }
            }
            Self::Canvas(p) => {
                let mut acc = NONE;
                for child in &p.children {
                    acc = blend_colors(acc, child.sample(local));
                }
                acc
            }
        };
        color = scale_alpha(color, common.opacity);
        if let Some(mask) = &common.opacity_mask {
            color = scale_alpha(color, mask.sample(point).components[3]);
        }
        color
    }

    /// Subtract a region (in outer coordinates) from the primitive's
    /// shape, so already-emitted area is not painted again. Returns
    /// `false` when the subtraction has no analytic result; the caller
    /// must then handle the overlap differently.
    pub fn exclude(&mut self, region: &Geometry) -> bool {
        if matches!(self, Self::Geometry(_)) {
            // Difference operates in outer coordinates; fold the transform
            // in first so the brush stays in step with the geometry.
            self.apply_transform();
        }
        match self {
            Self::Geometry(p) => {
                // Stroked shapes can't shed area without losing the pen.
                if p.pen.is_some() {
                    return false;
                }
                let Some(geometry) = &p.geometry else {
                    return true;
                };
                match geometry.difference(region) {
                    Some(reduced) => {
                        p.geometry = if reduced.is_empty() {
                            None
                        } else {
                            Some(reduced)
                        };
                        p.widened = OnceCell::new();
                        true
                    }
                    None => false,
                }
            }
            // Glyphs, images and canvases keep their shape; callers fall
            // back to clip-based emission or rasterization.
            _ => false,
        }
    }
}

impl GeometryPrimitive {
    /// The widened stroke outline, in content coordinates, computed once.
    pub fn stroke_shape(&self) -> Option<&Geometry> {
        let pen = self.pen.as_ref()?;
        let geometry = self.geometry.as_ref()?;
        Some(
            self.widened
                .get_or_init(|| widen_stroke(geometry, &pen.stroke)),
        )
    }
}

impl GlyphPrimitive {
    /// The run's fill geometry in content coordinates, computed once.
    pub fn fill_shape(&self) -> &Geometry {
        self.fill.get_or_init(|| self.run.fill_geometry())
    }
}
