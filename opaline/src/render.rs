// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The rendering stage: emit an analyzed display list as fully opaque
//! device calls.
//!
//! Transparent clusters are tried analytically first: each member's shape
//! is split along the exact shapes of the primitives overlapping it, the
//! brushes for each region are blended bottom-up, and already-composited
//! area is excluded from the overlapping primitives so it is not painted
//! twice. The attempt runs against recording devices on cloned state; any
//! step without a closed form rolls the state back and the whole cluster
//! is rasterized into a single bitmap instead.

use crate::brush::{BrushProxy, Paint};
use crate::flatten::DisplayList;
use crate::overlap::{self, Analysis, Cluster, PrimitiveInfo, rects_touch};
use crate::primitive::Primitive;
use log::{debug, trace};
use opaline_common::blend::blend_colors;
use opaline_common::config::FlattenerConfig;
use opaline_common::device::{DeviceBrush, DeviceCall, DevicePen, LegacyDevice, RecordingDevice};
use opaline_common::geometry::Geometry;
use opaline_common::math::is_almost_opaque;
use opaline_common::pixmap::Pixmap;
use peniko::color::palette::css::WHITE;
use peniko::color::{AlphaColor, Srgb};
use peniko::kurbo::{Affine, Point, Rect};
use std::collections::HashMap;
use std::sync::Arc;

const TRANSPARENT: AlphaColor<Srgb> = AlphaColor::new([0.0, 0.0, 0.0, 0.0]);

/// Largest bitmap edge a cluster or brush rasterization may produce;
/// bigger regions are sampled at a proportionally lower resolution.
const RASTER_DIM_LIMIT: usize = 4096;

/// How the emitted stream is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Output goes to the real device: every brush must be opaque, and
    /// residual transparency resolves against the white page.
    TopLevel,
    /// Output is replayed back into an enclosing display list: translucent
    /// brushes pass through, and the background is transparent.
    Subtree,
}

/// Flatten a display list's transparency and emit it to the device.
pub fn render_display_list(
    list: DisplayList,
    config: &FlattenerConfig,
    device: &mut dyn LegacyDevice,
    mode: RenderMode,
) {
    let mut analysis = overlap::analyze(list, config, mode == RenderMode::Subtree);
    if !analysis.needs_flattening {
        for info in analysis.infos.into_iter().flatten() {
            emit_primitive(&info.primitive, config, device, mode);
        }
        return;
    }

    let recordings = resolve_clusters(&mut analysis, config, mode);

    for i in 0..analysis.infos.len() {
        if let Some(info) = &analysis.infos[i] {
            match info.cluster {
                // Rasterized clusters paint as one bitmap at their last
                // member's slot.
                Some(c) if analysis.clusters[c].rasterize => {}
                Some(_) => {
                    if let Some(calls) = recordings.get(&i) {
                        replay(calls, device);
                    }
                }
                None => emit_primitive(&info.primitive, config, device, mode),
            }
        }
        for cluster in &analysis.clusters {
            if cluster.rasterize && cluster.emit_at == i {
                if let Some((pixmap, dest)) =
                    rasterize_cluster(&analysis.infos, cluster, config, mode)
                {
                    device.draw_image(&pixmap, dest);
                }
            }
        }
    }
}

/// Run the analytic attempt for every cluster not already marked for
/// rasterization, flipping the ones that fail.
fn resolve_clusters(
    analysis: &mut Analysis,
    config: &FlattenerConfig,
    mode: RenderMode,
) -> HashMap<usize, Vec<DeviceCall>> {
    let mut recordings = HashMap::new();
    for c in 0..analysis.clusters.len() {
        if analysis.clusters[c].rasterize {
            continue;
        }
        match render_cluster_analytic(&mut analysis.infos, &analysis.clusters[c], config, mode) {
            Some(rec) => recordings.extend(rec),
            None => {
                debug!("cluster {c}: no analytic form, rasterizing");
                analysis.clusters[c].rasterize = true;
            }
        }
    }
    recordings
}

/// Render every cluster member into a recording, mutating shared exclusion
/// state as it goes. On failure the touched state is rolled back and `None`
/// is returned.
fn render_cluster_analytic(
    infos: &mut [Option<PrimitiveInfo>],
    cluster: &Cluster,
    config: &FlattenerConfig,
    mode: RenderMode,
) -> Option<HashMap<usize, Vec<DeviceCall>>> {
    let mut touched: Vec<usize> = cluster.members.clone();
    for &i in &cluster.members {
        if let Some(info) = &infos[i] {
            touched.extend(info.overlap.iter().copied());
        }
    }
    touched.sort_unstable();
    touched.dedup();
    let snapshot: Vec<(usize, Option<PrimitiveInfo>)> =
        touched.iter().map(|&i| (i, infos[i].clone())).collect();

    let mut recordings = HashMap::new();
    for &i in &cluster.members {
        let mut recorder = RecordingDevice::new();
        if render_member(infos, i, config, mode, &mut recorder).is_none() {
            trace!("analytic rendering of primitive {i} failed");
            for (k, saved) in snapshot {
                infos[k] = saved;
            }
            return None;
        }
        recordings.insert(i, recorder.calls);
    }
    Some(recordings)
}

/// Emit one cluster member, decomposed along its overlapping primitives.
fn render_member(
    infos: &mut [Option<PrimitiveInfo>],
    i: usize,
    config: &FlattenerConfig,
    mode: RenderMode,
    device: &mut dyn LegacyDevice,
) -> Option<()> {
    let info = infos[i].as_ref()?;
    let common = info.primitive.common();

    // Glyph runs can't be split by region: with only opaque shapes above,
    // the run paints as a whole and whatever covers it simply repaints on
    // top; anything transparent above glyph ink has no analytic answer.
    if let Primitive::Glyph(_) = &info.primitive {
        let translucent_above = info.overlap.iter().any(|&j| {
            infos[j]
                .as_ref()
                .is_some_and(|above| above.primitive.has_translucency())
        });
        if translucent_above {
            return None;
        }
        // A translucent run resolves against the page only when nothing
        // lies beneath it; runs over content can't be split along it.
        let background =
            (mode == RenderMode::TopLevel && info.underlay.is_empty()).then_some(WHITE);
        return emit_glyph_member(&info.primitive, background, config, mode, device);
    }

    if common.opacity_mask.is_some() {
        return None;
    }
    // Image destinations only track scale/translate; anything fancier has
    // no brush representation.
    if matches!(info.primitive, Primitive::Image(_)) && common.transform != Affine::IDENTITY {
        return None;
    }
    let shape = analytic_shape(&info.primitive)?;
    let mut brush = overlap::primitive_brush(&info.primitive)?;
    if !is_almost_opaque(common.opacity) {
        brush.push_opacity(common.opacity);
    }
    let overlaps = info.overlap.clone();
    // Underlays nearest-first: the topmost opaque shape below a region
    // decides its backdrop.
    let unders: Vec<usize> = info.underlay.iter().rev().copied().collect();
    render_region(infos, shape, brush, &overlaps, &unders, config, mode, device)
}

/// Recursive region decomposition along the member's overlap chain, in
/// paint order from the bottom up. Fully-composited regions then resolve
/// their backdrop through [`resolve_backdrop`].
#[allow(clippy::too_many_arguments)]
fn render_region(
    infos: &mut [Option<PrimitiveInfo>],
    shape: Geometry,
    brush: BrushProxy,
    overlaps: &[usize],
    unders: &[usize],
    config: &FlattenerConfig,
    mode: RenderMode,
    device: &mut dyn LegacyDevice,
) -> Option<()> {
    if shape.is_empty() {
        return Some(());
    }
    let Some((&j, rest)) = overlaps.split_first() else {
        return resolve_backdrop(infos, &shape, &brush, unders, config, mode, device);
    };
    let Some(above) = infos[j].as_ref() else {
        return render_region(infos, shape, brush, rest, unders, config, mode, device);
    };
    let above_shape = match analytic_shape(&above.primitive) {
        Some(s) => s,
        None => {
            // An overlap without an exact shape is only harmless when it is
            // opaque: it repaints over whatever we emit here.
            if above.primitive.has_translucency() {
                return None;
            }
            return render_region(infos, shape, brush, rest, unders, config, mode, device);
        }
    };
    let inter = shape.intersect(&above_shape)?;
    let diff = shape.difference(&above_shape)?;
    if inter.is_empty() {
        return render_region(infos, shape, brush, rest, unders, config, mode, device);
    }
    let above_brush = overlap::primitive_brush(&above.primitive)?;
    render_region(infos, diff, brush.clone(), rest, unders, config, mode, device)?;

    let blended = BrushProxy::blend(&brush, &above_brush);
    render_region(
        infos,
        inter.clone(),
        blended,
        rest,
        unders,
        config,
        mode,
        device,
    )?;

    // The composited region must not be repainted by the overlap — unless
    // it is opaque, in which case repainting writes identical pixels.
    let above = infos[j].as_mut()?;
    if !above.primitive.exclude(&inter) && above.primitive.has_translucency() {
        return None;
    }
    Some(())
}

/// Resolve a fully-composited region against what lies beneath it: the
/// nearest opaque shape below each sub-region, or the white page where
/// nothing is. Underlays are not excluded; they paint first and the
/// blended region paints over them in order.
#[allow(clippy::too_many_arguments)]
fn resolve_backdrop(
    infos: &[Option<PrimitiveInfo>],
    shape: &Geometry,
    brush: &BrushProxy,
    unders: &[usize],
    config: &FlattenerConfig,
    mode: RenderMode,
    device: &mut dyn LegacyDevice,
) -> Option<()> {
    if shape.is_empty() {
        return Some(());
    }
    // Opaque regions don't care what is beneath them; subtree output keeps
    // its alpha and composites later.
    if mode == RenderMode::Subtree || brush.is_opaque() {
        return emit_brush_fill(shape, brush, config, mode, device);
    }
    let Some((&k, rest)) = unders.split_first() else {
        let under = BrushProxy::solid(WHITE)?;
        let resolved = BrushProxy::blend(&under, brush);
        if !resolved.is_opaque() {
            return None;
        }
        return emit_brush_fill(shape, &resolved, config, mode, device);
    };
    let Some(below) = infos[k].as_ref() else {
        return resolve_backdrop(infos, shape, brush, rest, config, mode, device);
    };
    // Translucent underlays were already composited and excluded from this
    // shape when they rendered; their leftover adjacency contributes
    // nothing here.
    if below.primitive.has_translucency() {
        return resolve_backdrop(infos, shape, brush, rest, config, mode, device);
    }
    let below_shape = analytic_shape(&below.primitive)?;
    let inter = shape.intersect(&below_shape)?;
    let diff = shape.difference(&below_shape)?;
    resolve_backdrop(infos, &diff, brush, rest, config, mode, device)?;
    if inter.is_empty() {
        return Some(());
    }
    let below_brush = overlap::primitive_brush(&below.primitive)?;
    let resolved = BrushProxy::blend(&below_brush, brush);
    if !resolved.is_opaque() {
        return None;
    }
    emit_brush_fill(&inter, &resolved, config, mode, device)
}

/// Fill a shape with a brush, decomposing layer stacks into bands when
/// needed.
fn emit_brush_fill(
    shape: &Geometry,
    brush: &BrushProxy,
    config: &FlattenerConfig,
    mode: RenderMode,
    device: &mut dyn LegacyDevice,
) -> Option<()> {
    if brush.paint().is_none() {
        return emit_layer_stack(shape, brush, config, mode, device);
    }
    let device_brush = to_device_brush(brush, config, mode)?;
    device.draw_geometry(Some(&device_brush), None, shape);
    Some(())
}

/// Emit a layer stack by folding closed forms greedily, then slicing the
/// accumulated gradient into near-constant bands and pushing each band's
/// solid color through the layers that refused to blend.
fn emit_layer_stack(
    shape: &Geometry,
    brush: &BrushProxy,
    config: &FlattenerConfig,
    mode: RenderMode,
    device: &mut dyn LegacyDevice,
) -> Option<()> {
    if !is_almost_opaque(brush.opacity()) || brush.has_opacity_mask() {
        return None;
    }
    let mut layers = brush.layers().iter();
    let mut acc = layers.next()?.clone();
    let mut remaining: Vec<&BrushProxy> = Vec::new();
    for layer in layers {
        if remaining.is_empty() {
            let blended = BrushProxy::blend(&acc, layer);
            if blended.paint().is_some() {
                acc = blended;
                continue;
            }
        }
        remaining.push(layer);
    }
    if remaining.is_empty() {
        return emit_brush_fill(shape, &acc, config, mode, device);
    }

    let Some(Paint::Gradient(gradient)) = acc.paint() else {
        return None;
    };
    if !is_almost_opaque(acc.opacity()) || acc.has_opacity_mask() {
        return None;
    }
    let bands = gradient.decompose(acc.bounds(), config)?;
    trace!("decomposed gradient into {} bands", bands.len());
    for (band_geometry, color) in bands {
        let band_shape = shape.intersect(&band_geometry)?;
        if band_shape.is_empty() {
            continue;
        }
        let mut band = BrushProxy::solid(color);
        for layer in &remaining {
            band = Some(match band {
                Some(under) => {
                    let blended = BrushProxy::blend(&under, layer);
                    if blended.paint().is_none() {
                        return None;
                    }
                    blended
                }
                None => (*layer).clone(),
            });
        }
        match band {
            Some(band) => emit_brush_fill(&band_shape, &band, config, mode, device)?,
            // A fully transparent band paints nothing.
            None => {}
        }
    }
    Some(())
}

/// A glyph-run cluster member: emitted whole, with its brush resolved.
fn emit_glyph_member(
    primitive: &Primitive,
    background: Option<AlphaColor<Srgb>>,
    config: &FlattenerConfig,
    mode: RenderMode,
    device: &mut dyn LegacyDevice,
) -> Option<()> {
    let Primitive::Glyph(p) = primitive else {
        return None;
    };
    if p.common.opacity_mask.is_some() {
        return None;
    }
    let mut brush = p.brush.clone();
    if !is_almost_opaque(p.common.opacity) {
        brush.push_opacity(p.common.opacity);
    }
    if mode == RenderMode::TopLevel && !brush.is_opaque() {
        let under = BrushProxy::solid(background?)?;
        brush = BrushProxy::blend(&under, &brush);
        if !brush.is_opaque() {
            return None;
        }
    }
    let device_brush = to_device_brush(&brush, config, mode)?;

    if let Some(clip) = &p.common.clip {
        device.push_clip(clip);
    }
    let pushed = p.common.transform != Affine::IDENTITY;
    if pushed {
        device.push_transform(p.common.transform);
    }
    device.draw_glyph_run(&p.run, &device_brush);
    if pushed {
        device.pop_transform();
    }
    if p.common.clip.is_some() {
        device.pop_clip();
    }
    Some(())
}

/// The primitive's exact painted shape in world coordinates, clip applied.
fn analytic_shape(primitive: &Primitive) -> Option<Geometry> {
    let shape = primitive.exact_shape()?;
    match &primitive.common().clip {
        None => Some(shape),
        Some(clip) => shape.intersect(clip),
    }
}

/// Convert a brush to something the device paints directly. At top level
/// the brush must be opaque.
fn to_device_brush(
    brush: &BrushProxy,
    config: &FlattenerConfig,
    mode: RenderMode,
) -> Option<DeviceBrush> {
    if mode == RenderMode::TopLevel && !brush.is_opaque() {
        return None;
    }
    match brush.paint()? {
        Paint::Solid(_) => brush.as_solid().map(DeviceBrush::Solid),
        Paint::Gradient(gradient) => {
            if brush.has_opacity_mask()
                || brush.before_fill().is_some()
                || brush.after_fill().is_some()
            {
                return None;
            }
            let mut gradient = gradient.clone();
            if !is_almost_opaque(brush.opacity()) {
                gradient.scale_alpha(brush.opacity());
            }
            Some(DeviceBrush::Gradient(Box::new(gradient.to_peniko())))
        }
        Paint::Image(image) => {
            if brush.has_opacity_mask()
                || brush.before_fill().is_some()
                || brush.after_fill().is_some()
            {
                return None;
            }
            let mut pixmap = image.pixmap().clone();
            if !is_almost_opaque(brush.opacity()) {
                pixmap.multiply_alpha((brush.opacity() * 255.0 + 0.5) as u8);
            }
            Some(DeviceBrush::Image {
                pixmap: Arc::new(pixmap),
                dest: brush.bounds(),
            })
        }
        // Pattern content has no device equivalent; bake the brush itself.
        Paint::Drawing(_) => brush_to_pixmap(brush, config).map(|pixmap| DeviceBrush::Image {
            pixmap: Arc::new(pixmap),
            dest: brush.bounds(),
        }),
    }
}

/// Emit a primitive outside any cluster, preserving its clip, transform
/// and pen exactly. Falls back to region rasterization when a brush has no
/// device form.
fn emit_primitive(
    primitive: &Primitive,
    config: &FlattenerConfig,
    device: &mut dyn LegacyDevice,
    mode: RenderMode,
) {
    if try_emit_direct(primitive, config, device, mode).is_none() {
        rasterize_primitive(primitive, config, device, mode);
    }
}

enum DirectDraw {
    Geometry {
        brush: Option<DeviceBrush>,
        pen: Option<DevicePen>,
        geometry: Geometry,
    },
    Glyphs(DeviceBrush),
    Image(Pixmap, Rect),
}

fn try_emit_direct(
    primitive: &Primitive,
    config: &FlattenerConfig,
    device: &mut dyn LegacyDevice,
    mode: RenderMode,
) -> Option<()> {
    let common = primitive.common();
    if common.opacity_mask.is_some() {
        return None;
    }
    // All conversions happen before the first device call so a failure
    // leaves the device stacks untouched.
    let draw = match primitive {
        Primitive::Geometry(p) => {
            let geometry = p.geometry.clone()?;
            let brush = match &p.brush {
                Some(brush) => Some(to_device_brush(brush, config, mode)?),
                None => None,
            };
            let pen = match &p.pen {
                Some(pen) => Some(DevicePen {
                    stroke: pen.stroke.clone(),
                    brush: to_device_brush(&pen.brush, config, mode)?,
                }),
                None => None,
            };
            if brush.is_none() && pen.is_none() {
                return Some(());
            }
            DirectDraw::Geometry {
                brush,
                pen,
                geometry,
            }
        }
        Primitive::Glyph(p) => DirectDraw::Glyphs(to_device_brush(&p.brush, config, mode)?),
        Primitive::Image(p) => {
            let mut pixmap = p.image.pixmap().clone();
            if mode == RenderMode::TopLevel && !p.image.is_opaque() {
                // Pass-through emission only sees translucent images under
                // `force_opaque`; draft quality resolves them on white.
                pixmap.blend_under_color(WHITE);
            }
            DirectDraw::Image(pixmap, p.dest)
        }
        Primitive::Canvas(_) => {
            debug_assert!(false, "canvas in a flattened display list");
            return Some(());
        }
    };

    if let Some(clip) = &common.clip {
        device.push_clip(clip);
    }
    let pushed = common.transform != Affine::IDENTITY;
    if pushed {
        device.push_transform(common.transform);
    }
    match &draw {
        DirectDraw::Geometry {
            brush,
            pen,
            geometry,
        } => device.draw_geometry(brush.as_ref(), pen.as_ref(), geometry),
        DirectDraw::Glyphs(brush) => {
            if let Primitive::Glyph(p) = primitive {
                device.draw_glyph_run(&p.run, brush);
            }
        }
        DirectDraw::Image(pixmap, dest) => device.draw_image(pixmap, *dest),
    }
    if pushed {
        device.pop_transform();
    }
    if common.clip.is_some() {
        device.pop_clip();
    }
    Some(())
}

/// Last-resort emission: sample the primitive over its bounds and draw the
/// result as a bitmap, clipped to the painted shape.
fn rasterize_primitive(
    primitive: &Primitive,
    config: &FlattenerConfig,
    device: &mut dyn LegacyDevice,
    mode: RenderMode,
) {
    let bounds = primitive.bounds();
    let Some((width, height)) = raster_size(bounds, config) else {
        return;
    };
    let background = match mode {
        RenderMode::TopLevel => WHITE,
        RenderMode::Subtree => TRANSPARENT,
    };
    let mut pixmap = Pixmap::new(width, height);
    sample_into(&mut pixmap, bounds, |point| {
        blend_colors(background, primitive.sample(point))
    });
    let clip = primitive.painted_shape();
    device.push_clip(&clip);
    device.draw_image(&pixmap, bounds);
    device.pop_clip();
}

/// Rasterize a brush over its own bounds, alpha included.
fn brush_to_pixmap(brush: &BrushProxy, config: &FlattenerConfig) -> Option<Pixmap> {
    let bounds = brush.bounds();
    let (width, height) = raster_size(bounds, config)?;
    let mut pixmap = Pixmap::new(width, height);
    sample_into(&mut pixmap, bounds, |point| brush.sample(point));
    Some(pixmap)
}

/// Rasterize a whole cluster: every surviving primitive at or before the
/// emission slot whose bounds touch the cluster, composited over the
/// mode's background.
fn rasterize_cluster(
    infos: &[Option<PrimitiveInfo>],
    cluster: &Cluster,
    config: &FlattenerConfig,
    mode: RenderMode,
) -> Option<(Pixmap, Rect)> {
    let bounds = cluster.bounds;
    let (width, height) = raster_size(bounds, config)?;
    let contributors: Vec<&PrimitiveInfo> = infos
        .iter()
        .take(cluster.emit_at + 1)
        .flatten()
        .filter(|info| rects_touch(info.bounds, bounds))
        .collect();
    let background = match mode {
        RenderMode::TopLevel => WHITE,
        RenderMode::Subtree => TRANSPARENT,
    };
    let mut pixmap = Pixmap::new(width, height);
    sample_into(&mut pixmap, bounds, |point| {
        let mut color = background;
        for info in &contributors {
            color = blend_colors(color, info.primitive.sample(point));
        }
        color
    });
    Some((pixmap, bounds))
}

/// Pixel dimensions for rasterizing a region, capped so pathological
/// bounds can't allocate unbounded bitmaps.
fn raster_size(bounds: Rect, config: &FlattenerConfig) -> Option<(u16, u16)> {
    let mut width = config.to_pixels(bounds.width());
    let mut height = config.to_pixels(bounds.height());
    if width == 0 || height == 0 {
        return None;
    }
    let longest = width.max(height);
    if longest > RASTER_DIM_LIMIT {
        let scale = RASTER_DIM_LIMIT as f64 / longest as f64;
        width = ((width as f64 * scale) as usize).max(1);
        height = ((height as f64 * scale) as usize).max(1);
    }
    Some((width as u16, height as u16))
}

/// Fill a pixmap by sampling a color function at each pixel center mapped
/// into `bounds`.
fn sample_into(
    pixmap: &mut Pixmap,
    bounds: Rect,
    sample: impl Fn(Point) -> AlphaColor<Srgb>,
) {
    let width = pixmap.width();
    let height = pixmap.height();
    let step_x = bounds.width() / f64::from(width);
    let step_y = bounds.height() / f64::from(height);
    for y in 0..height {
        let py = bounds.y0 + (f64::from(y) + 0.5) * step_y;
        for x in 0..width {
            let px = bounds.x0 + (f64::from(x) + 0.5) * step_x;
            let color = sample(Point::new(px, py));
            pixmap.set_pixel(x, y, color.premultiply().to_rgba8());
        }
    }
}

/// Feed recorded calls to a live device.
fn replay(calls: &[DeviceCall], device: &mut dyn LegacyDevice) {
    for call in calls {
        match call {
            DeviceCall::StartDocument => device.start_document(),
            DeviceCall::EndDocument => device.end_document(),
            DeviceCall::StartPage(w, h) => device.start_page(*w, *h),
            DeviceCall::EndPage => device.end_page(),
            DeviceCall::PushClip(clip) => device.push_clip(clip),
            DeviceCall::PopClip => device.pop_clip(),
            DeviceCall::PushTransform(t) => device.push_transform(*t),
            DeviceCall::PopTransform => device.pop_transform(),
            DeviceCall::DrawGeometry {
                brush,
                pen,
                geometry,
            } => device.draw_geometry(brush.as_ref(), pen.as_ref(), geometry),
            DeviceCall::DrawImage { image, dest } => device.draw_image(image, *dest),
            DeviceCall::DrawGlyphRun { run, brush } => device.draw_glyph_run(run, brush),
            DeviceCall::Comment(text) => device.comment(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{FlattenState, Flattener};
    use peniko::color::palette::css::{BLUE, GREEN, RED};

    fn solid_rect(
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        color: AlphaColor<Srgb>,
    ) -> Primitive {
        Primitive::geometry(
            Geometry::Rect(Rect::new(x0, y0, x1, y1)),
            BrushProxy::solid(color),
            None,
        )
    }

    fn render(primitives: Vec<Primitive>, config: &FlattenerConfig) -> RecordingDevice {
        let mut flattener = Flattener::new(config);
        for p in primitives {
            flattener.flatten(p, FlattenState::default());
        }
        let mut device = RecordingDevice::new();
        render_display_list(
            flattener.into_display_list(),
            config,
            &mut device,
            RenderMode::TopLevel,
        );
        device
    }

    fn solid_calls(device: &RecordingDevice) -> Vec<(AlphaColor<Srgb>, Rect)> {
        device
            .draw_calls()
            .filter_map(|call| match call {
                DeviceCall::DrawGeometry {
                    brush: Some(DeviceBrush::Solid(color)),
                    geometry,
                    ..
                } => Some((*color, geometry.bounds())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn opaque_list_passes_through_in_order() {
        let config = FlattenerConfig::default();
        let device = render(
            vec![
                solid_rect(0.0, 0.0, 10.0, 10.0, RED),
                solid_rect(5.0, 5.0, 15.0, 15.0, GREEN),
            ],
            &config,
        );
        let calls = solid_calls(&device);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.components, RED.components);
        assert_eq!(calls[1].0.components, GREEN.components);
    }

    #[test]
    fn translucent_over_page_becomes_one_opaque_call() {
        let config = FlattenerConfig::default();
        let device = render(
            vec![solid_rect(0.0, 0.0, 10.0, 10.0, BLUE).with_opacity(0.5)],
            &config,
        );
        let calls = solid_calls(&device);
        assert_eq!(calls.len(), 1);
        let c = calls[0].0.components;
        assert!((c[0] - 0.5).abs() < 1e-4 && (c[1] - 0.5).abs() < 1e-4);
        assert!((c[2] - 1.0).abs() < 1e-4 && (c[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn covered_primitive_emits_nothing() {
        let config = FlattenerConfig::default();
        let device = render(
            vec![
                solid_rect(0.0, 0.0, 10.0, 10.0, RED),
                solid_rect(0.0, 0.0, 10.0, 10.0, GREEN),
                // Transparency elsewhere keeps the analysis active.
                solid_rect(50.0, 50.0, 60.0, 60.0, BLUE).with_opacity(0.5),
            ],
            &config,
        );
        let calls = solid_calls(&device);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.components, GREEN.components);
    }

    #[test]
    fn partial_overlap_splits_into_regions() {
        // A 50% blue wash over the corner of an opaque red square must
        // yield: red remainder, blue-over-white remainder, and the blended
        // corner, all opaque.
        let config = FlattenerConfig {
            enable_blend_and_swap: false,
            enable_push_transparency_down: false,
            ..Default::default()
        };
        let device = render(
            vec![
                solid_rect(0.0, 0.0, 10.0, 10.0, RED),
                solid_rect(5.0, 5.0, 15.0, 15.0, BLUE).with_opacity(0.5),
            ],
            &config,
        );
        let calls = solid_calls(&device);
        assert_eq!(calls.len(), 3, "{calls:?}");
        // Everything emitted is opaque.
        for (color, _) in &calls {
            assert!((color.components[3] - 1.0).abs() < 1e-4);
        }
        // The red base paints first and keeps its color.
        assert_eq!(calls[0].0.components, RED.components);
        // One of the wash regions is blue over white, the other blue over
        // red; both are half blue.
        let over_white = AlphaColor::<Srgb>::new([0.5, 0.5, 1.0, 1.0]);
        let over_red = AlphaColor::<Srgb>::new([0.5, 0.0, 0.5, 1.0]);
        let mut rest: Vec<[f32; 4]> = calls[1..].iter().map(|(c, _)| c.components).collect();
        rest.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut want = vec![over_white.components, over_red.components];
        want.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (got, want) in rest.iter().zip(&want) {
            for k in 0..4 {
                assert!((got[k] - want[k]).abs() < 1e-4, "{rest:?}");
            }
        }
    }

    #[test]
    fn deep_stack_rasterizes_to_one_image() {
        let config = FlattenerConfig {
            max_transparency_layers: 2,
            enable_blend_and_swap: false,
            enable_push_transparency_down: false,
            ..Default::default()
        };
        // The partially-covering base keeps all four washes translucent
        // through the rewrite rules.
        let mut prims = vec![solid_rect(0.0, 0.0, 12.0, 12.0, RED)];
        for k in 0..4 {
            let o = f64::from(k) * 2.0;
            prims.push(solid_rect(o, o, o + 20.0, o + 20.0, BLUE).with_opacity(0.5));
        }
        let device = render(prims, &config);
        let images: Vec<_> = device
            .draw_calls()
            .filter(|c| matches!(c, DeviceCall::DrawImage { .. }))
            .collect();
        assert_eq!(images.len(), 1, "four washes exceed the layer cap");
        // Only the opaque base paints analytically.
        assert_eq!(solid_calls(&device).len(), 1);
    }

    #[test]
    fn cluster_bitmap_is_opaque_over_the_page() {
        let config = FlattenerConfig {
            max_transparency_layers: 1,
            enable_blend_and_swap: false,
            enable_push_transparency_down: false,
            rasterization_dpi: 96.0,
            ..Default::default()
        };
        let device = render(
            vec![
                solid_rect(0.0, 0.0, 6.0, 6.0, RED),
                solid_rect(2.0, 2.0, 10.0, 10.0, BLUE).with_opacity(0.5),
                solid_rect(6.0, 6.0, 14.0, 14.0, GREEN).with_opacity(0.5),
            ],
            &config,
        );
        let call = device.draw_calls().find_map(|c| match c {
            DeviceCall::DrawImage { image, dest } => Some((image, dest)),
            _ => None,
        });
        let (image, dest) = call.expect("cluster must rasterize");
        assert_eq!(*dest, Rect::new(2.0, 2.0, 14.0, 14.0));
        assert!(image.is_opaque(), "page background must be baked in");
        // A pixel covered only by the blue wash reads half blue on white.
        let pixel = image.pixel(1, 6);
        assert!(pixel.b > pixel.r);
    }

    #[test]
    fn raster_size_caps_dimensions() {
        let config = FlattenerConfig {
            rasterization_dpi: 96.0,
            ..Default::default()
        };
        let (w, h) = raster_size(Rect::new(0.0, 0.0, 100000.0, 50.0), &config).unwrap();
        assert!(usize::from(w) <= RASTER_DIM_LIMIT);
        assert!(h >= 1);
        assert!(raster_size(Rect::new(0.0, 0.0, 0.0, 10.0), &config).is_none());
    }
}
