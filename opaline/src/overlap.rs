// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlap analysis over the flat display list.
//!
//! Builds the pairwise overlap/underlay adjacency between primitives, then
//! shrinks the problem with a sequence of list-local rewrites (deleting
//! covered primitives, folding transparency into neighbors) before grouping
//! the remaining transparent primitives into clusters and deciding, per
//! cluster, between analytic composition and rasterization.

use crate::brush::BrushProxy;
use crate::flatten::DisplayList;
use crate::primitive::{COMPLEXITY_LIMIT, Primitive};
use log::trace;
use opaline_common::config::FlattenerConfig;
use opaline_common::math::FloatExt as _;
use peniko::color::palette::css::WHITE;
use peniko::kurbo::Rect;

/// Per-primitive bookkeeping for one flattening pass.
#[derive(Debug, Clone)]
pub struct PrimitiveInfo {
    /// The primitive itself; mutated in place by rewrites and rendering.
    pub primitive: Primitive,
    /// Clip-applied painted bounds, in world space.
    pub bounds: Rect,
    /// Indices of primitives painted after this one whose bounds intersect
    /// it, ascending.
    pub overlap: Vec<usize>,
    /// Indices of primitives painted before this one whose bounds intersect
    /// it, ascending.
    pub underlay: Vec<usize>,
    /// How many primitives in `overlap` carry genuine transparency.
    pub overlap_has_transparency: usize,
    /// The cluster this primitive was assigned to, if any.
    pub cluster: Option<usize>,
}

/// A maximal set of mutually-overlapping transparent primitives, decided
/// as a unit.
#[derive(Debug)]
pub struct Cluster {
    /// Member indices, ascending.
    pub members: Vec<usize>,
    /// Union of member bounds.
    pub bounds: Rect,
    /// Whether the whole cluster renders as one bitmap.
    pub rasterize: bool,
    /// List position at which the cluster's output is emitted: the last
    /// member's slot, so everything the bitmap bakes in has already painted.
    pub emit_at: usize,
}

/// The analyzed display list, ready for rendering.
#[derive(Debug)]
pub struct Analysis {
    /// One slot per original primitive; `None` marks a deleted entry.
    pub infos: Vec<Option<PrimitiveInfo>>,
    /// Clusters over the surviving transparent primitives.
    pub clusters: Vec<Cluster>,
    /// `false` means nothing carries transparency and rendering is a plain
    /// pass-through in paint order.
    pub needs_flattening: bool,
}

/// Analyze a display list. In subtree mode (an isolated semi-transparent
/// group) every primitive joins a single cluster and the page-background
/// rewrites are disabled, since the background is unknown.
pub fn analyze(list: DisplayList, config: &FlattenerConfig, subtree: bool) -> Analysis {
    let needs_flattening = !config.force_opaque && (subtree || list.has_transparency());
    let mut infos: Vec<Option<PrimitiveInfo>> = list
        .into_primitives()
        .into_iter()
        .map(|primitive| {
            let bounds = primitive.bounds();
            Some(PrimitiveInfo {
                primitive,
                bounds,
                overlap: Vec::new(),
                underlay: Vec::new(),
                overlap_has_transparency: 0,
                cluster: None,
            })
        })
        .collect();

    if !needs_flattening {
        return Analysis {
            infos,
            clusters: Vec::new(),
            needs_flattening,
        };
    }

    build_adjacency(&mut infos);
    rewrite(&mut infos, config, subtree);
    let clusters = build_clusters(&mut infos, config, subtree);

    Analysis {
        infos,
        clusters,
        needs_flattening,
    }
}

pub(crate) fn rects_touch(a: Rect, b: Rect) -> bool {
    let isect = a.intersect(b);
    isect.width() > 0.0 && isect.height() > 0.0
}

fn build_adjacency(infos: &mut [Option<PrimitiveInfo>]) {
    let n = infos.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (bounds_i, bounds_j, j_translucent) = {
                let (Some(a), Some(b)) = (&infos[i], &infos[j]) else {
                    continue;
                };
                (a.bounds, b.bounds, b.primitive.has_translucency())
            };
            if rects_touch(bounds_i, bounds_j) {
                if let Some(info_i) = infos[i].as_mut() {
                    info_i.overlap.push(j);
                    if j_translucent {
                        info_i.overlap_has_transparency += 1;
                    }
                }
                if let Some(info_j) = infos[j].as_mut() {
                    info_j.underlay.push(i);
                }
            }
        }
    }
}

/// Remove primitive `i` from the list and from every adjacency list.
fn delete(infos: &mut [Option<PrimitiveInfo>], i: usize) {
    let Some(info) = infos[i].take() else {
        return;
    };
    let translucent = info.primitive.has_translucency();
    for j in info.overlap {
        if let Some(above) = infos[j].as_mut() {
            above.underlay.retain(|&k| k != i);
        }
    }
    for j in info.underlay {
        if let Some(below) = infos[j].as_mut() {
            below.overlap.retain(|&k| k != i);
            if translucent {
                below.overlap_has_transparency -= 1;
            }
        }
    }
}

/// Bookkeeping after primitive `i` stopped being translucent.
fn mark_became_opaque(infos: &mut [Option<PrimitiveInfo>], i: usize) {
    let underlay = match &infos[i] {
        Some(info) => info.underlay.clone(),
        None => return,
    };
    for k in underlay {
        if let Some(below) = infos[k].as_mut() {
            below.overlap_has_transparency = below.overlap_has_transparency.saturating_sub(1);
        }
    }
}

/// The brush a primitive paints with, for analytic blending. `None` for
/// primitives whose paint can't be captured as one brush.
pub fn primitive_brush(primitive: &Primitive) -> Option<BrushProxy> {
    match primitive {
        Primitive::Geometry(p) => match (&p.brush, &p.pen) {
            (Some(brush), None) => Some(brush.clone()),
            (None, Some(pen)) => Some(pen.brush.clone()),
            _ => None,
        },
        Primitive::Glyph(p) => Some(p.brush.clone()),
        Primitive::Image(p) => {
            if p.common.opacity_mask.is_some() {
                return None;
            }
            BrushProxy::image(p.image.clone(), p.dest)
        }
        Primitive::Canvas(_) => None,
    }
}

/// Replace a primitive's paint brush in place. Must only be called with a
/// brush derived from [`primitive_brush`] of the same primitive kind.
fn set_primitive_brush(primitive: &mut Primitive, brush: BrushProxy) {
    match primitive {
        Primitive::Geometry(p) => {
            if p.brush.is_some() {
                p.brush = Some(brush);
            } else if let Some(pen) = &mut p.pen {
                pen.brush = brush;
            }
        }
        Primitive::Glyph(p) => p.brush = brush,
        Primitive::Image(_) | Primitive::Canvas(_) => {
            debug_assert!(false, "no single brush slot to assign");
        }
    }
}

/// Blend the page background (opaque white) under a primitive's paint.
/// Returns `false` when no closed form exists.
fn blend_white_under(primitive: &mut Primitive) -> bool {
    if let Primitive::Image(p) = primitive {
        if p.common.opacity_mask.is_some() || !p.common.opacity.is_nearly_one() {
            return false;
        }
        p.image.blend_under_color(WHITE);
        return true;
    }
    let Some(white) = BrushProxy::solid(WHITE) else {
        return false;
    };
    let Some(brush) = primitive_brush(primitive) else {
        return false;
    };
    let blended = BrushProxy::blend(&white, &brush);
    if blended.paint().is_none() || !blended.is_opaque() {
        return false;
    }
    set_primitive_brush(primitive, blended);
    true
}

fn rewrite(infos: &mut Vec<Option<PrimitiveInfo>>, config: &FlattenerConfig, subtree: bool) {
    let n = infos.len();
    for i in 0..n {
        // Per-primitive fixpoint: each rule can enable another.
        loop {
            if infos[i].is_none() {
                break;
            }
            let changed = cover_delete(infos, i)
                || (!subtree && white_strip(infos, i))
                || (config.enable_blend_and_swap && blend_and_swap(infos, i))
                || absorb_transparency(infos, i, config, subtree)
                || tie_reduction(infos, i);
            if !changed {
                break;
            }
        }
    }

    // Once nothing transparent remains above a primitive, its remaining
    // opaque-only edges no longer require composited handling.
    for i in 0..n {
        let overlap = match infos[i].as_mut() {
            Some(info) if info.overlap_has_transparency == 0 && !info.overlap.is_empty() => {
                std::mem::take(&mut info.overlap)
            }
            _ => continue,
        };
        for j in overlap {
            if let Some(above) = infos[j].as_mut() {
                above.underlay.retain(|&k| k != i);
            }
        }
    }
}

/// Rule: delete a primitive fully covered by an opaque primitive above it.
fn cover_delete(infos: &mut [Option<PrimitiveInfo>], i: usize) -> bool {
    let covered = {
        let Some(info) = &infos[i] else { return false };
        info.overlap.iter().any(|&j| {
            infos[j].as_ref().is_some_and(|above| {
                above.primitive.is_opaque()
                    && above.primitive.covering_shape().contains_rect(&info.bounds)
            })
        })
    };
    if covered {
        trace!("cover-delete: primitive {i} is hidden");
        delete(infos, i);
    }
    covered
}

/// Rule: delete an opaque-white fill with nothing underneath; it is a
/// background placeholder with no effect over the white page.
fn white_strip(infos: &mut [Option<PrimitiveInfo>], i: usize) -> bool {
    let strip = {
        let Some(info) = &infos[i] else { return false };
        info.underlay.is_empty()
            && matches!(&info.primitive, Primitive::Geometry(p) if p.pen.is_none())
            && info.primitive.common().opacity_mask.is_none()
            && primitive_brush(&info.primitive)
                .and_then(|b| b.as_solid())
                .is_some_and(|c| {
                    let [r, g, b, a] = c.components;
                    r.is_nearly_one() && g.is_nearly_one() && b.is_nearly_one() && a.is_nearly_one()
                })
    };
    if strip {
        trace!("white-strip: primitive {i} paints white on white");
        delete(infos, i);
    }
    strip
}

/// Rule: when an opaque primitive's nearest overlap fully covers it, blend
/// the pair's brushes into the lower shape and swap their paint order. The
/// smaller shape then paints last with an opaque blended brush, and the
/// larger one no longer spreads transparency over it.
fn blend_and_swap(infos: &mut [Option<PrimitiveInfo>], i: usize) -> bool {
    let (j, blended) = {
        let Some(info) = &infos[i] else { return false };
        if !info.primitive.is_opaque() {
            return false;
        }
        let Some(&j) = info.overlap.first() else {
            return false;
        };
        let Some(above) = &infos[j] else { return false };
        if !above.primitive.has_translucency() {
            return false;
        }
        // Only plain fills swap; pens, masks and glyph runs don't.
        if !matches!(&info.primitive, Primitive::Geometry(p) if p.pen.is_none())
            || !matches!(&above.primitive, Primitive::Geometry(p) if p.pen.is_none())
        {
            return false;
        }
        if !above.primitive.covering_shape().contains_rect(&info.bounds)
            || info.primitive.covering_shape().contains_rect(&above.bounds)
        {
            return false;
        }
        // Renaming the pair's indices is only sound when nothing between
        // them references either one.
        for k in (i + 1)..j {
            let conflicts = infos[k].as_ref().is_some_and(|between| {
                between.overlap.contains(&j) || between.underlay.contains(&i)
            });
            if conflicts {
                return false;
            }
        }
        let (Some(under), Some(over)) = (
            primitive_brush(&info.primitive),
            primitive_brush(&above.primitive),
        ) else {
            return false;
        };
        let blended = BrushProxy::blend(&under, &over);
        if blended.paint().is_none() || !blended.is_opaque() {
            return false;
        }
        (j, blended)
    };

    trace!("blend-and-swap: folding {j} into {i} and reordering");
    // The blended brush lands on the smaller shape, which moves above.
    if let Some(info) = infos[i].as_mut() {
        set_primitive_brush(&mut info.primitive, blended);
    }
    // Rename i <-> j everywhere else; the intervening range was checked
    // to hold no references.
    for (k, slot) in infos.iter_mut().enumerate() {
        if k == i || k == j {
            continue;
        }
        let Some(other) = slot else { continue };
        for list in [&mut other.overlap, &mut other.underlay] {
            for index in list.iter_mut() {
                if *index == i {
                    *index = j;
                } else if *index == j {
                    *index = i;
                }
            }
            list.sort_unstable();
        }
    }
    infos.swap(i, j);
    // Fix the pair's mutual edges for the new order: the old overlay (now
    // at position i) sits below the blended shape (now at position j).
    if let Some(lower) = infos[i].as_mut() {
        lower.underlay.retain(|&k| k != i);
        lower.overlap.insert(0, j);
        // The blended shape above is opaque.
    }
    if let Some(upper) = infos[j].as_mut() {
        upper.overlap.retain(|&k| k != j);
        upper.underlay.push(i);
        upper.underlay.sort_unstable();
        upper.overlap_has_transparency =
            upper.overlap_has_transparency.saturating_sub(1);
    }
    true
}

/// Rule: fold a transparent primitive's background into it so it becomes
/// opaque — from the white page when nothing is underneath, from a single
/// fully-covering opaque underlay, or (push-transparency-down) into each of
/// the simple covered primitives beneath it.
fn absorb_transparency(
    infos: &mut [Option<PrimitiveInfo>],
    i: usize,
    config: &FlattenerConfig,
    subtree: bool,
) -> bool {
    let translucent = infos[i]
        .as_ref()
        .is_some_and(|info| info.primitive.has_translucency());
    if !translucent || subtree {
        return false;
    }

    // Nothing underneath: the background is the white page.
    let underlay_empty = infos[i]
        .as_ref()
        .is_some_and(|info| info.underlay.is_empty());
    if underlay_empty {
        let folded = infos[i]
            .as_mut()
            .is_some_and(|info| blend_white_under(&mut info.primitive));
        if folded {
            trace!("absorbed page background into primitive {i}");
            mark_became_opaque(infos, i);
        }
        return folded;
    }

    // A single fully-covering opaque underlay blends straight in.
    let single = {
        let Some(info) = &infos[i] else { return false };
        match info.underlay.as_slice() {
            &[j] => {
                let Some(below) = &infos[j] else { return false };
                let covers = below.primitive.is_opaque()
                    && below.primitive.covering_shape().contains_rect(&info.bounds);
                covers.then(|| (j, primitive_brush(&below.primitive)))
            }
            _ => None,
        }
    };
    if let Some((j, Some(under))) = single {
        let blended = {
            let Some(info) = &infos[i] else { return false };
            let Some(over) = primitive_brush(&info.primitive) else {
                return false;
            };
            let blended = BrushProxy::blend(&under, &over);
            (blended.paint().is_some() && blended.is_opaque()).then_some(blended)
        };
        if let Some(blended) = blended {
            trace!("absorbed opaque underlay {j} into primitive {i}");
            if let Some(info) = infos[i].as_mut() {
                set_primitive_brush(&mut info.primitive, blended);
            }
            mark_became_opaque(infos, i);
            return true;
        }
        return false;
    }

    if config.enable_push_transparency_down {
        return push_transparency_down(infos, i);
    }
    false
}

/// Blend one transparent overlay into each of the simple opaque primitives
/// it covers, then shrink the overlay to the uncovered remainder. Inverts
/// the paint order: many small opaque shapes replace one transparent wash.
fn push_transparency_down(infos: &mut [Option<PrimitiveInfo>], i: usize) -> bool {
    // All-or-nothing: collect every mutation first, commit only if each
    // underlay accepts the blend and the remainder geometry stays analytic.
    let plan = {
        let Some(info) = &infos[i] else { return false };
        if !matches!(&info.primitive, Primitive::Geometry(p) if p.pen.is_none()) {
            return false;
        }
        // The exact shapes below ignore clips; any clip in play would make
        // the exclusion overshoot.
        if info.primitive.common().clip.is_some() {
            return false;
        }
        let Some(over) = primitive_brush(&info.primitive) else {
            return false;
        };
        let Some(mut remainder) = info.primitive.exact_shape() else {
            return false;
        };
        let shape_i = info.primitive.covering_shape();

        let mut blends = Vec::with_capacity(info.underlay.len());
        for &k in &info.underlay {
            let Some(below) = &infos[k] else { return false };
            // Each covered primitive must be opaque, unclipped, fully
            // inside the overlay, and have the overlay as its only overlap.
            if !below.primitive.is_opaque()
                || below.primitive.common().clip.is_some()
                || below.overlap.as_slice() != [i]
                || !shape_i.contains_rect(&below.bounds)
            {
                return false;
            }
            let Some(below_shape) = below.primitive.exact_shape() else {
                return false;
            };
            let Some(under) = primitive_brush(&below.primitive) else {
                return false;
            };
            let blended = BrushProxy::blend(&under, &over);
            if blended.paint().is_none() || !blended.is_opaque() {
                return false;
            }
            let Some(reduced) = remainder.difference(&below_shape) else {
                return false;
            };
            remainder = reduced;
            blends.push((k, blended));
        }
        Some((blends, remainder))
    };
    let Some((blends, remainder)) = plan else {
        return false;
    };

    trace!(
        "push-transparency-down: folding primitive {i} into {} underlays",
        blends.len()
    );
    for (k, blended) in blends {
        if let Some(below) = infos[k].as_mut() {
            set_primitive_brush(&mut below.primitive, blended);
            below.overlap.clear();
            below.overlap_has_transparency = 0;
        }
    }
    // The overlay keeps only the region no underlay covers, painted over
    // the white page.
    let emptied = infos[i].as_mut().is_none_or(|info| {
        info.underlay.clear();
        if let Primitive::Geometry(p) = &mut info.primitive {
            p.geometry = (!remainder.is_empty()).then_some(remainder);
        }
        !info.primitive.optimize() || !blend_white_under(&mut info.primitive)
    });
    if emptied {
        delete(infos, i);
    } else {
        mark_became_opaque(infos, i);
    }
    true
}

/// Rule: once an opaque fully-covering primitive sits between `i` and the
/// rest of its underlay chain, everything below it is invisible through
/// `i`'s region and the edges can be cut.
fn tie_reduction(infos: &mut [Option<PrimitiveInfo>], i: usize) -> bool {
    let (cut_below, translucent_i) = {
        let Some(info) = &infos[i] else { return false };
        let blocking = info.underlay.iter().rev().find(|&&j| {
            infos[j].as_ref().is_some_and(|below| {
                below.primitive.is_opaque()
                    && below.primitive.covering_shape().contains_rect(&info.bounds)
            })
        });
        match blocking {
            Some(&j) => (j, info.primitive.has_translucency()),
            None => return false,
        }
    };
    let removed: Vec<usize> = match infos[i].as_mut() {
        Some(info) => {
            let removed = info
                .underlay
                .iter()
                .copied()
                .filter(|&m| m < cut_below)
                .collect();
            info.underlay.retain(|&m| m >= cut_below);
            removed
        }
        None => return false,
    };
    if removed.is_empty() {
        return false;
    }
    trace!("tie-reduction: primitive {i} cut from {} underlays", removed.len());
    for m in removed {
        if let Some(below) = infos[m].as_mut() {
            below.overlap.retain(|&k| k != i);
            if translucent_i {
                below.overlap_has_transparency = below.overlap_has_transparency.saturating_sub(1);
            }
        }
    }
    true
}

/// Union-find clustering of the surviving transparent primitives, plus the
/// per-cluster rasterize-vs-analytic decision.
fn build_clusters(
    infos: &mut [Option<PrimitiveInfo>],
    config: &FlattenerConfig,
    subtree: bool,
) -> Vec<Cluster> {
    let member_indices: Vec<usize> = infos
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            let info = slot.as_ref()?;
            // A subtree must be composited as a unit; at top level only
            // transparency needs cluster treatment.
            (subtree || info.primitive.has_translucency()).then_some(i)
        })
        .collect();
    if member_indices.is_empty() {
        return Vec::new();
    }

    let mut parent: Vec<usize> = (0..infos.len()).collect();
    fn find(parent: &mut Vec<usize>, x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cursor = x;
        while parent[cursor] != root {
            cursor = std::mem::replace(&mut parent[cursor], root);
        }
        root
    }
    let mut union = |parent: &mut Vec<usize>, a: usize, b: usize| {
        let (ra, rb) = (find(parent, a), find(parent, b));
        if ra != rb {
            parent[rb.max(ra)] = rb.min(ra);
        }
    };

    if subtree {
        for pair in member_indices.windows(2) {
            union(&mut parent, pair[0], pair[1]);
        }
    } else {
        for (a, &i) in member_indices.iter().enumerate() {
            for &j in &member_indices[a + 1..] {
                let touch = match (&infos[i], &infos[j]) {
                    (Some(x), Some(y)) => rects_touch(x.bounds, y.bounds),
                    _ => false,
                };
                if touch {
                    union(&mut parent, i, j);
                }
            }
        }
    }

    // Group members by root, in index order.
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut root_to_cluster: Vec<Option<usize>> = vec![None; infos.len()];
    for &i in &member_indices {
        let root = find(&mut parent, i);
        let cluster_index = match root_to_cluster[root] {
            Some(c) => c,
            None => {
                clusters.push(Cluster {
                    members: Vec::new(),
                    bounds: Rect::ZERO,
                    rasterize: false,
                    emit_at: i,
                });
                root_to_cluster[root] = Some(clusters.len() - 1);
                clusters.len() - 1
            }
        };
        let Some(info) = infos[i].as_mut() else { continue };
        info.cluster = Some(cluster_index);
        let bounds = info.bounds;
        let cluster = &mut clusters[cluster_index];
        cluster.bounds = if cluster.members.is_empty() {
            bounds
        } else {
            cluster.bounds.union(bounds)
        };
        cluster.members.push(i);
        cluster.emit_at = cluster.emit_at.max(i);
    }

    // Transitively merge clusters whose union rectangles touch: a bitmap
    // for one would bake in pixels the other still owns.
    if !subtree {
        loop {
            let mut merged = None;
            'outer: for a in 0..clusters.len() {
                for b in (a + 1)..clusters.len() {
                    if rects_touch(clusters[a].bounds, clusters[b].bounds) {
                        merged = Some((a, b));
                        break 'outer;
                    }
                }
            }
            let Some((a, b)) = merged else { break };
            let absorbed = clusters.remove(b);
            let target = &mut clusters[a];
            target.bounds = target.bounds.union(absorbed.bounds);
            target.members.extend(absorbed.members);
            target.members.sort_unstable();
            target.emit_at = target.emit_at.max(absorbed.emit_at);
            for slot in infos.iter_mut().flatten() {
                match slot.cluster {
                    Some(c) if c == b => slot.cluster = Some(a),
                    Some(c) if c > b => slot.cluster = Some(c - 1),
                    _ => {}
                }
            }
        }
    }

    for cluster in &mut clusters {
        cluster.rasterize = decide_rasterize(cluster, infos, config);
        if cluster.rasterize {
            trace!(
                "cluster of {} primitives elects rasterization",
                cluster.members.len()
            );
        }
    }
    clusters
}

/// Rasterize when analytic composition would be more expensive than one
/// bitmap, or when any hard complexity trigger fires.
fn decide_rasterize(
    cluster: &Cluster,
    infos: &[Option<PrimitiveInfo>],
    config: &FlattenerConfig,
) -> bool {
    if cluster.members.len() > config.max_transparency_layers {
        return true;
    }
    let mut analytic = 0.0;
    for &i in &cluster.members {
        let Some(info) = &infos[i] else { continue };
        if info.primitive.point_count() > COMPLEXITY_LIMIT {
            return true;
        }
        if info.overlap.len() > config.max_decomposition_depth {
            return true;
        }
        // Every overlap multiplies the region splits the renderer emits.
        analytic += info.primitive.drawing_cost(config) * (1 + info.overlap.len()) as f64;
    }
    analytic > config.rasterization_cost(cluster.bounds.width(), cluster.bounds.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{FlattenState, Flattener};
    use opaline_common::geometry::Geometry;
    use peniko::color::AlphaColor;
    use peniko::color::palette::css::{BLUE, GREEN, RED};

    fn solid_rect(x0: f64, y0: f64, x1: f64, y1: f64, color: AlphaColor<peniko::color::Srgb>) -> Primitive {
        Primitive::geometry(
            Geometry::Rect(Rect::new(x0, y0, x1, y1)),
            BrushProxy::solid(color),
            None,
        )
    }

    fn analyze_list(primitives: Vec<Primitive>, config: &FlattenerConfig) -> Analysis {
        let mut flattener = Flattener::new(config);
        for p in primitives {
            flattener.flatten(p, FlattenState::default());
        }
        analyze(flattener.into_display_list(), config, false)
    }

    #[test]
    fn opaque_input_skips_flattening() {
        let config = FlattenerConfig::default();
        let analysis = analyze_list(
            vec![
                solid_rect(0.0, 0.0, 10.0, 10.0, RED),
                solid_rect(20.0, 0.0, 30.0, 10.0, GREEN),
            ],
            &config,
        );
        assert!(!analysis.needs_flattening);
        assert!(analysis.clusters.is_empty());
    }

    #[test]
    fn cover_delete_removes_hidden_primitive() {
        let config = FlattenerConfig::default();
        // Force the analysis on with one irrelevant translucent primitive.
        let analysis = analyze_list(
            vec![
                solid_rect(0.0, 0.0, 10.0, 10.0, RED),
                solid_rect(0.0, 0.0, 10.0, 10.0, GREEN),
                solid_rect(50.0, 50.0, 60.0, 60.0, BLUE).with_opacity(0.5),
            ],
            &config,
        );
        assert!(analysis.infos[0].is_none(), "covered red must be deleted");
        assert!(analysis.infos[1].is_some());
    }

    #[test]
    fn white_background_placeholder_is_stripped() {
        let config = FlattenerConfig::default();
        let analysis = analyze_list(
            vec![
                solid_rect(0.0, 0.0, 100.0, 100.0, AlphaColor::new([1.0, 1.0, 1.0, 1.0])),
                solid_rect(10.0, 10.0, 20.0, 20.0, BLUE).with_opacity(0.5),
            ],
            &config,
        );
        assert!(analysis.infos[0].is_none(), "white base must be stripped");
    }

    #[test]
    fn translucent_over_nothing_absorbs_the_page() {
        let config = FlattenerConfig::default();
        let analysis = analyze_list(
            vec![solid_rect(0.0, 0.0, 10.0, 10.0, BLUE).with_opacity(0.5)],
            &config,
        );
        let info = analysis.infos[0].as_ref().unwrap();
        assert!(info.primitive.is_opaque(), "page white folded in");
        let c = primitive_brush(&info.primitive).unwrap().as_solid().unwrap();
        // 50% blue over white.
        assert!((c.components[0] - 0.5).abs() < 1e-4);
        assert!((c.components[2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn translucent_over_covering_opaque_absorbs_it() {
        let config = FlattenerConfig::default();
        let analysis = analyze_list(
            vec![
                solid_rect(0.0, 0.0, 20.0, 20.0, RED),
                solid_rect(5.0, 5.0, 15.0, 15.0, BLUE).with_opacity(0.5),
            ],
            &config,
        );
        let info = analysis.infos[1].as_ref().unwrap();
        assert!(info.primitive.is_opaque());
        let c = primitive_brush(&info.primitive).unwrap().as_solid().unwrap();
        // 50% blue over opaque red.
        assert!((c.components[0] - 0.5).abs() < 1e-4);
        assert!((c.components[2] - 0.5).abs() < 1e-4);
        // The red base keeps painting below; no transparency left above it.
        let base = analysis.infos[0].as_ref().unwrap();
        assert_eq!(base.overlap_has_transparency, 0);
    }

    #[test]
    fn touching_translucents_share_a_cluster() {
        let config = FlattenerConfig {
            enable_push_transparency_down: false,
            ..Default::default()
        };
        // The opaque bases only partially cover the washes, so nothing can
        // be absorbed and the clusters stay observable.
        let analysis = analyze_list(
            vec![
                solid_rect(0.0, 0.0, 12.0, 12.0, RED),
                solid_rect(5.0, 5.0, 15.0, 15.0, BLUE).with_opacity(0.5),
                solid_rect(10.0, 10.0, 20.0, 20.0, GREEN).with_opacity(0.5),
                solid_rect(95.0, 95.0, 105.0, 105.0, RED),
                solid_rect(100.0, 100.0, 110.0, 110.0, BLUE).with_opacity(0.5),
            ],
            &config,
        );
        let cluster_of = |i: usize| analysis.infos[i].as_ref().unwrap().cluster;
        assert_eq!(cluster_of(1), cluster_of(2));
        assert_ne!(cluster_of(1), cluster_of(4));
    }

    #[test]
    fn cluster_partition_is_a_fixpoint() {
        let config = FlattenerConfig::default();
        let build = || {
            analyze_list(
                vec![
                    solid_rect(0.0, 0.0, 12.0, 12.0, RED),
                    solid_rect(5.0, 5.0, 15.0, 15.0, BLUE).with_opacity(0.5),
                    solid_rect(8.0, 8.0, 18.0, 18.0, GREEN).with_opacity(0.5),
                ],
                &config,
            )
        };
        let a = build();
        let b = build();
        let members =
            |x: &Analysis| x.clusters.iter().map(|c| c.members.clone()).collect::<Vec<_>>();
        assert_eq!(members(&a), members(&b));
    }

    #[test]
    fn oversized_stack_elects_rasterization() {
        let config = FlattenerConfig {
            max_transparency_layers: 2,
            enable_push_transparency_down: false,
            ..Default::default()
        };
        let mut prims = vec![solid_rect(0.0, 0.0, 40.0, 40.0, RED)];
        for k in 0..4 {
            let offset = k as f64;
            prims.push(
                solid_rect(offset, offset, 30.0 + offset, 30.0 + offset, BLUE).with_opacity(0.5),
            );
        }
        let analysis = analyze_list(prims, &config);
        assert!(analysis.clusters.iter().any(|c| c.rasterize));
    }
}
