// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Alpha flattening for legacy print devices.
//!
//! Opaline converts a drawing tree that uses transparency — group opacity,
//! opacity masks, translucent brushes, alpha images — into a stream of
//! fully opaque draw calls for a device that cannot composite (the
//! GDI-style printer driver model). The pipeline runs in three stages:
//!
//! 1. **Tree flattening** ([`flatten`]): canvas state (transform, clip,
//!    opacity, mask) is folded down the tree and leaves are recorded into a
//!    flat display list. Genuinely overlapping semi-transparent groups are
//!    resolved in isolation and replayed.
//! 2. **Overlap analysis** ([`overlap`]): pairwise overlap between list
//!    entries is computed, list rewrites remove hidden or foldable
//!    transparency, and the remaining transparent primitives are grouped
//!    into clusters.
//! 3. **Rendering** ([`render`]): each cluster is emitted analytically by
//!    region decomposition and brush blending where closed forms exist, and
//!    rasterized into a single opaque bitmap where they don't.
//!
//! The only approximation the pipeline ever makes is resolution: analytic
//! results are exact, and every fallback is a rasterization at the
//! configured DPI, never a reordering that changes color.
//!
//! # Features
//!
//! - `png` (enabled by default): forwarded to `opaline_common`; enables
//!   PNG pixmap IO.

#![warn(clippy::print_stdout, clippy::print_stderr)]
#![forbid(unsafe_code)]

pub mod brush;
pub mod flatten;
pub mod gradient;
pub mod image;
pub mod overlap;
pub mod primitive;
pub mod render;

pub use opaline_common::{blend, config, device, geometry, glyph, math, pixmap};
pub use peniko;
pub use peniko::color;
pub use peniko::kurbo;

use config::FlattenerConfig;
use device::LegacyDevice;
use flatten::{FlattenState, Flattener};
use geometry::Geometry;
use kurbo::Affine;
use primitive::Primitive;
use render::RenderMode;

/// Flatten a drawing tree and emit it to a device as opaque draw calls.
///
/// `transform` maps the tree's root coordinates to device-independent page
/// units; `page_clip` restricts output to the printable region, when given.
pub fn flatten_tree(
    root: Primitive,
    transform: Affine,
    page_clip: Option<Geometry>,
    config: &FlattenerConfig,
    device: &mut dyn LegacyDevice,
) {
    let mut flattener = Flattener::new(config);
    flattener.flatten(root, FlattenState::new(transform, page_clip));
    render::render_display_list(
        flattener.into_display_list(),
        config,
        device,
        RenderMode::TopLevel,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use brush::BrushProxy;
    use device::{DeviceBrush, DeviceCall, RecordingDevice};
    use kurbo::Rect;
    use peniko::color::palette::css::{BLUE, RED};

    #[test]
    fn end_to_end_group_opacity() {
        // A half-opacity group with one opaque child over the page flattens
        // to a single opaque call.
        let child = Primitive::geometry(
            Geometry::Rect(Rect::new(0.0, 0.0, 10.0, 10.0)),
            BrushProxy::solid(RED),
            None,
        );
        let root = Primitive::canvas(vec![child]).with_opacity(0.5);
        let mut device = RecordingDevice::new();
        flatten_tree(
            root,
            Affine::IDENTITY,
            None,
            &FlattenerConfig::default(),
            &mut device,
        );
        let solids: Vec<_> = device
            .draw_calls()
            .filter_map(|c| match c {
                DeviceCall::DrawGeometry {
                    brush: Some(DeviceBrush::Solid(color)),
                    ..
                } => Some(*color),
                _ => None,
            })
            .collect();
        assert_eq!(solids.len(), 1);
        // 50% red over white.
        let c = solids[0].components;
        assert!((c[0] - 1.0).abs() < 1e-4);
        assert!((c[1] - 0.5).abs() < 1e-4);
        assert!((c[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn page_clip_restricts_output() {
        let prim = Primitive::geometry(
            Geometry::Rect(Rect::new(0.0, 0.0, 100.0, 100.0)),
            BrushProxy::solid(BLUE),
            None,
        );
        let mut device = RecordingDevice::new();
        flatten_tree(
            prim,
            Affine::IDENTITY,
            Some(Geometry::Rect(Rect::new(0.0, 0.0, 50.0, 50.0))),
            &FlattenerConfig::default(),
            &mut device,
        );
        // The page clip travels to the device as an exact clip region
        // around the draw.
        let clip = device.calls.iter().find_map(|c| match c {
            DeviceCall::PushClip(clip) => Some(clip.bounds()),
            _ => None,
        });
        assert_eq!(clip, Some(Rect::new(0.0, 0.0, 50.0, 50.0)));
        assert_eq!(device.draw_calls().count(), 1);
    }
}
