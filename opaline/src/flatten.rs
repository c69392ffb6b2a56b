// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree flattening: pushing inherited transform, clip, opacity and opacity
//! mask from grouping nodes down onto leaf primitives.
//!
//! The output is a [`DisplayList`] of leaves in paint order, each with its
//! transform folded into its geometry and its opacity absorbed into its
//! brush where possible. Semi-transparent groups with more than one child
//! cannot be flattened child-by-child (opacity applies to the composited
//! group, not to each sibling), so such subtrees are flattened in isolation,
//! resolved by the full pipeline, and replayed into the outer list through a
//! [`DisplayListDrawingContext`].

use crate::brush::{BrushProxy, Paint, PenProxy};
use crate::image::ImageProxy;
use crate::primitive::{CanvasPrimitive, Primitive};
use crate::render::{self, RenderMode};
use log::trace;
use opaline_common::blend::ColorInterpolation;
use opaline_common::config::FlattenerConfig;
use opaline_common::device::{DeviceBrush, DevicePen, LegacyDevice};
use opaline_common::geometry::Geometry;
use opaline_common::glyph::GlyphRun;
use opaline_common::math::{is_almost_opaque, is_almost_transparent, normalize_opacity};
use opaline_common::pixmap::Pixmap;
use peniko::kurbo::{Affine, Rect};

/// Inherited state accumulated while walking down the tree.
#[derive(Debug, Clone)]
pub struct FlattenState {
    /// Transform from the current node's coordinates to world space.
    pub transform: Affine,
    /// Accumulated clip, in world space.
    pub clip: Option<Geometry>,
    /// Accumulated opacity, normalized to `[0, 1]`.
    pub opacity: f32,
    /// Accumulated opacity mask, in world space.
    pub opacity_mask: Option<BrushProxy>,
}

impl FlattenState {
    /// State for the start of a page: a device transform and the page clip.
    pub fn new(transform: Affine, clip: Option<Geometry>) -> Self {
        Self {
            transform,
            clip,
            opacity: 1.0,
            opacity_mask: None,
        }
    }
}

impl Default for FlattenState {
    fn default() -> Self {
        Self::new(Affine::IDENTITY, None)
    }
}

/// The flat, paint-ordered list of resolved leaf primitives.
#[derive(Debug, Default)]
pub struct DisplayList {
    primitives: Vec<Primitive>,
    has_transparency: bool,
}

impl DisplayList {
    /// The surviving primitives, in paint order.
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Consume the list.
    pub fn into_primitives(self) -> Vec<Primitive> {
        self.primitives
    }

    /// Whether any recorded primitive carries genuine transparency.
    pub fn has_transparency(&self) -> bool {
        self.has_transparency
    }

    /// Record a resolved leaf: drop it if invisible, fold its transform
    /// into its geometry, give it a last `optimize` chance, and convert
    /// pattern-brush strokes into widened fills (the downstream device
    /// cannot stroke with a pattern).
    pub fn add_primitive(&mut self, mut primitive: Primitive, _config: &FlattenerConfig) {
        if primitive.is_transparent() {
            trace!("dropping invisible primitive");
            return;
        }
        primitive.apply_transform();
        if let Primitive::Geometry(p) = &mut primitive {
            let pattern_stroke = p.pen.as_ref().is_some_and(|pen| {
                matches!(pen.brush.paint(), Some(Paint::Drawing(_)))
            });
            if pattern_stroke {
                let widened = p.stroke_shape().cloned();
                if let (Some(widened), Some(pen)) = (widened, p.pen.take()) {
                    debug_assert!(p.brush.is_none(), "fill+stroke leaves are split first");
                    p.geometry = Some(widened);
                    p.brush = Some(pen.brush);
                }
            }
        }
        if !primitive.optimize() {
            trace!("dropping optimized-away primitive");
            return;
        }
        if primitive.has_translucency() {
            self.has_transparency = true;
        }
        self.primitives.push(primitive);
    }
}

/// Walks a primitive tree and fills a [`DisplayList`].
pub struct Flattener<'a> {
    config: &'a FlattenerConfig,
    list: DisplayList,
}

impl<'a> Flattener<'a> {
    /// A flattener for one pass.
    pub fn new(config: &'a FlattenerConfig) -> Self {
        Self {
            config,
            list: DisplayList::default(),
        }
    }

    /// Finish the pass.
    pub fn into_display_list(self) -> DisplayList {
        self.list
    }

    /// Flatten one subtree under the given inherited state.
    pub fn flatten(&mut self, primitive: Primitive, state: FlattenState) {
        let mut primitive = primitive;
        let mut state = state;
        loop {
            match primitive {
                Primitive::Canvas(canvas) => {
                    let Some((mut canvas, inner)) = self.enter_canvas(canvas, state) else {
                        return;
                    };
                    state = inner;
                    match canvas.children.len() {
                        0 => return,
                        // Single children collapse into their parent's state
                        // without recursing.
                        1 => {
                            primitive = canvas.children.pop().unwrap_or_else(|| unreachable!());
                        }
                        _ => {
                            self.flatten_children(canvas, state);
                            return;
                        }
                    }
                }
                leaf => {
                    self.flatten_leaf(leaf, state);
                    return;
                }
            }
        }
    }

    /// Fold a canvas's own state into the inherited state, culling the
    /// subtree when the combination is invisible.
    fn enter_canvas(
        &self,
        mut canvas: CanvasPrimitive,
        state: FlattenState,
    ) -> Option<(CanvasPrimitive, FlattenState)> {
        let opacity = normalize_opacity(state.opacity * canvas.common.opacity);
        if is_almost_transparent(opacity) {
            trace!("culling fully transparent canvas");
            return None;
        }

        let transform = state.transform * canvas.common.transform;

        let clip = match canvas.common.clip.take() {
            None => state.clip,
            Some(own) => {
                let own = own.transformed(&state.transform);
                if own.is_empty() {
                    trace!("culling canvas with empty clip");
                    return None;
                }
                Some(combine_clips(state.clip, own)?)
            }
        };
        if clip.as_ref().is_some_and(Geometry::is_empty) {
            trace!("culling canvas clipped to nothing");
            return None;
        }

        let opacity_mask = match canvas.common.opacity_mask.take() {
            None => state.opacity_mask,
            Some(mut own) => {
                own.apply_transform(&state.transform);
                match state.opacity_mask {
                    None => Some(own),
                    Some(mut inherited) => {
                        inherited.push_opacity_mask(own);
                        Some(inherited)
                    }
                }
            }
        };

        Some((
            canvas,
            FlattenState {
                transform,
                clip,
                opacity,
                opacity_mask,
            },
        ))
    }

    /// Flatten a multi-child canvas whose own state has already been folded
    /// into `state`.
    fn flatten_children(&mut self, canvas: CanvasPrimitive, state: FlattenState) {
        let compositing_free = self.config.force_opaque
            || (is_almost_opaque(state.opacity) && state.opacity_mask.is_none());
        if compositing_free {
            for child in canvas.children {
                self.flatten(child, state.clone());
            }
            return;
        }

        // A genuinely semi-transparent group: opacity applies to the
        // composited result of the children, not to each child. Painting two
        // overlapping half-opaque siblings independently would darken their
        // intersection twice. Resolve the subtree in isolation first, then
        // push the group opacity onto the (now non-overlapping) output.
        let mut nested = Flattener::new(self.config);
        let inner = FlattenState {
            transform: state.transform,
            clip: state.clip.clone(),
            opacity: 1.0,
            opacity_mask: None,
        };
        for child in canvas.children {
            nested.flatten(child, inner.clone());
        }

        let mut replay = DisplayListDrawingContext::default();
        render::render_display_list(
            nested.into_display_list(),
            self.config,
            &mut replay,
            RenderMode::Subtree,
        );
        for mut primitive in replay.into_primitives() {
            primitive.push_opacity(state.opacity, state.opacity_mask.as_ref());
            self.list.add_primitive(primitive, self.config);
        }
    }

    /// Resolve a leaf: split fill+stroke, unfold cheap tiled patterns, fold
    /// the inherited state in, and record it.
    fn flatten_leaf(&mut self, leaf: Primitive, state: FlattenState) {
        if let Primitive::Geometry(p) = &leaf {
            if p.brush.is_some() && p.pen.is_some() {
                // Fill and stroke overlap along the outline; composited as
                // one unit they would double-blend there. Split into a
                // two-child canvas and let the canvas rules decide whether
                // isolation is needed.
                let Primitive::Geometry(mut p) = leaf else {
                    unreachable!()
                };
                // The shared opacity and mask move onto the wrapper so the
                // canvas rules apply them to the composited pair, not to
                // fill and stroke independently (which would double-blend
                // where they overlap).
                let opacity = std::mem::replace(&mut p.common.opacity, 1.0);
                let mask = p.common.opacity_mask.take();
                let mut fill = p.clone();
                fill.pen = None;
                let mut stroke = p;
                stroke.brush = None;
                let mut canvas = Primitive::canvas(vec![
                    Primitive::Geometry(fill),
                    Primitive::Geometry(stroke),
                ])
                .with_opacity(opacity);
                canvas.common_mut().opacity_mask = mask;
                self.flatten(canvas, state);
                return;
            }
        }

        if let Some(unfolded) = self.unfold_pattern(&leaf) {
            self.flatten(unfolded, state);
            return;
        }

        let mut leaf = leaf;
        let common = leaf.common_mut();
        common.transform = state.transform * common.transform;
        let own_clip = common.clip.take().map(|c| c.transformed(&state.transform));
        let combined = match (state.clip, own_clip) {
            (None, c) | (c, None) => c,
            (Some(a), Some(b)) => match combine_clips(Some(a), b) {
                Some(c) => Some(c),
                None => return,
            },
        };
        if combined.as_ref().is_some_and(Geometry::is_empty) {
            trace!("culling leaf clipped to nothing");
            return;
        }
        leaf.common_mut().clip = combined;
        leaf.push_opacity(state.opacity, state.opacity_mask.as_ref());
        self.list.add_primitive(leaf, self.config);
    }

    /// Expand a tiled pattern fill into literal repeated sub-primitives when
    /// that is cheaper than rasterizing a tile. Returns the replacement
    /// canvas, or `None` to leave the leaf alone.
    fn unfold_pattern(&self, leaf: &Primitive) -> Option<Primitive> {
        let Primitive::Geometry(p) = leaf else {
            return None;
        };
        if p.pen.is_some() {
            return None;
        }
        let geometry = p.geometry.as_ref()?;
        let brush = p.brush.as_ref()?;
        // Only plain pattern brushes unfold; accumulated opacity or masks
        // would have to be re-applied per tile.
        if !is_almost_opaque(brush.opacity())
            || brush.before_fill().is_some()
            || brush.after_fill().is_some()
        {
            return None;
        }
        let Some(Paint::Drawing(drawing)) = brush.paint() else {
            return None;
        };
        if !drawing.tiled {
            return None;
        }

        let bounds = brush.bounds();
        let tile_w = drawing.viewport.width();
        let tile_h = drawing.viewport.height();
        if tile_w <= 0.0 || tile_h <= 0.0 {
            return None;
        }
        let cols = (bounds.width() / tile_w).ceil().max(1.0) as usize;
        let rows = (bounds.height() / tile_h).ceil().max(1.0) as usize;
        let count = cols.checked_mul(rows)?;
        if count > self.config.pattern_unfold_limit {
            return None;
        }
        let tile_cost = drawing.root.drawing_cost(self.config);
        if tile_cost * count as f64 > self.config.rasterization_cost(tile_w, tile_h) {
            return None;
        }

        let mut tiles = Vec::with_capacity(count);
        for row in 0..rows {
            for col in 0..cols {
                let mut tile = (*drawing.root).clone();
                let offset = Affine::translate((
                    bounds.x0 - drawing.viewport.x0 + col as f64 * tile_w,
                    bounds.y0 - drawing.viewport.y0 + row as f64 * tile_h,
                ));
                let common = tile.common_mut();
                common.transform = offset * common.transform;
                tiles.push(tile);
            }
        }
        trace!("unfolded pattern brush into {count} tiles");

        // The tiles are clipped to the fill shape; the leaf's own state
        // moves onto the replacement canvas.
        let inner = Primitive::canvas(tiles).with_clip(geometry.clone());
        let mut outer = Primitive::canvas(vec![inner]);
        outer.common_mut().clip = p.common.clip.clone();
        outer.common_mut().transform = p.common.transform;
        outer.common_mut().opacity = p.common.opacity;
        outer.common_mut().opacity_mask = p.common.opacity_mask.clone();
        Some(outer)
    }
}

/// Intersect two world-space clips analytically. `None` means the
/// combination has no analytic form; the caller culls rather than paint
/// outside either clip. Rectangle clips (the overwhelmingly common case)
/// always combine.
fn combine_clips(inherited: Option<Geometry>, own: Geometry) -> Option<Geometry> {
    match inherited {
        None => Some(own),
        Some(inherited) => inherited.intersect(&own),
    }
}

/// A [`LegacyDevice`] that turns finished draw calls back into primitives.
///
/// Used to replay the output of an isolated subtree flatten into an outer
/// display list, where the outer opacity and mask are then pushed onto each
/// replayed primitive.
#[derive(Debug, Default)]
pub struct DisplayListDrawingContext {
    primitives: Vec<Primitive>,
    clip_stack: Vec<Geometry>,
    transform_stack: Vec<Affine>,
}

impl DisplayListDrawingContext {
    /// The replayed primitives, in paint order.
    pub fn into_primitives(self) -> Vec<Primitive> {
        debug_assert!(self.clip_stack.is_empty() && self.transform_stack.is_empty());
        self.primitives
    }

    fn current_transform(&self) -> Affine {
        self.transform_stack
            .iter()
            .fold(Affine::IDENTITY, |acc, t| acc * *t)
    }

    /// The combined clip currently in force. The renderer pushes at most
    /// one clip level around a draw, so the fold never fails in practice;
    /// if it ever did, the innermost (tightest) clip is kept.
    fn current_clip(&self) -> Option<Geometry> {
        let mut combined: Option<Geometry> = None;
        for clip in &self.clip_stack {
            combined = Some(match combined {
                None => clip.clone(),
                Some(acc) => acc.intersect(clip).unwrap_or_else(|| clip.clone()),
            });
        }
        combined
    }

    fn convert_brush(&self, brush: &DeviceBrush, target: Rect) -> Option<BrushProxy> {
        match brush {
            DeviceBrush::Solid(color) => BrushProxy::solid(*color),
            DeviceBrush::Gradient(gradient) => {
                BrushProxy::gradient(gradient, ColorInterpolation::Srgb, target)
            }
            DeviceBrush::Image { pixmap, dest } => {
                BrushProxy::image(ImageProxy::new((**pixmap).clone()), *dest)
            }
        }
    }

    fn record(&mut self, primitive: Primitive) {
        let mut primitive = primitive;
        {
            let common = primitive.common_mut();
            common.clip = self.current_clip();
            common.transform = self.current_transform();
        }
        self.primitives.push(primitive);
    }
}

impl LegacyDevice for DisplayListDrawingContext {
    fn push_clip(&mut self, clip: &Geometry) {
        self.clip_stack.push(clip.clone());
    }

    fn pop_clip(&mut self) {
        self.clip_stack.pop();
    }

    fn push_transform(&mut self, transform: Affine) {
        self.transform_stack.push(transform);
    }

    fn pop_transform(&mut self) {
        self.transform_stack.pop();
    }

    fn draw_geometry(
        &mut self,
        brush: Option<&DeviceBrush>,
        pen: Option<&DevicePen>,
        geometry: &Geometry,
    ) {
        let target = geometry.bounds();
        let fill = brush.and_then(|b| self.convert_brush(b, target));
        let stroke = pen.and_then(|p| {
            let brush = self.convert_brush(&p.brush, target)?;
            PenProxy::new(p.stroke.clone(), brush)
        });
        if fill.is_none() && stroke.is_none() {
            return;
        }
        self.record(Primitive::geometry(geometry.clone(), fill, stroke));
    }

    fn draw_image(&mut self, image: &Pixmap, dest: Rect) {
        self.record(Primitive::image(ImageProxy::new(image.clone()), dest));
    }

    fn draw_glyph_run(&mut self, run: &GlyphRun, brush: &DeviceBrush) {
        let Some(brush) = self.convert_brush(brush, run.bounds()) else {
            return;
        };
        self.record(Primitive::glyphs(run.clone(), brush));
    }
}
