// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end pipeline tests: a primitive tree goes in, opaque device
//! calls come out.

use opaline::brush::BrushProxy;
use opaline::config::FlattenerConfig;
use opaline::device::{DeviceBrush, DeviceCall, RecordingDevice};
use opaline::flatten_tree;
use opaline::geometry::Geometry;
use opaline::glyph::{Glyph, GlyphRun};
use opaline::kurbo::{Affine, Rect};
use opaline::peniko::color::palette::css::{BLACK, BLUE, GREEN, RED, WHITE};
use opaline::peniko::color::{AlphaColor, Srgb};
use opaline::primitive::Primitive;

fn solid_rect(x0: f64, y0: f64, x1: f64, y1: f64, color: AlphaColor<Srgb>) -> Primitive {
    Primitive::geometry(
        Geometry::Rect(Rect::new(x0, y0, x1, y1)),
        BrushProxy::solid(color),
        None,
    )
}

fn run_page(root: Primitive, config: &FlattenerConfig) -> RecordingDevice {
    let mut device = RecordingDevice::new();
    flatten_tree(root, Affine::IDENTITY, None, config, &mut device);
    device
}

/// Every solid the device sees must be fully opaque, and every image must
/// have its background baked in.
fn assert_output_opaque(device: &RecordingDevice) {
    for call in device.draw_calls() {
        match call {
            DeviceCall::DrawGeometry {
                brush: Some(DeviceBrush::Solid(color)),
                ..
            } => {
                assert!(
                    (color.components[3] - 1.0).abs() < 1e-4,
                    "translucent solid leaked to the device: {color:?}"
                );
            }
            DeviceCall::DrawImage { image, .. } => {
                assert!(image.is_opaque(), "translucent image leaked to the device");
            }
            _ => {}
        }
    }
}

#[test]
fn mixed_page_emits_only_opaque_paint() {
    // A white background placeholder, an opaque base, a wash over its
    // corner, and an isolated wash over bare paper.
    let page = Primitive::canvas(vec![
        solid_rect(0.0, 0.0, 100.0, 100.0, WHITE),
        solid_rect(10.0, 10.0, 30.0, 30.0, RED),
        solid_rect(20.0, 20.0, 40.0, 40.0, BLUE).with_opacity(0.5),
        solid_rect(60.0, 60.0, 80.0, 80.0, GREEN).with_opacity(0.5),
    ]);
    let device = run_page(page, &FlattenerConfig::default());
    assert_output_opaque(&device);

    let solids: Vec<[f32; 4]> = device
        .draw_calls()
        .filter_map(|call| match call {
            DeviceCall::DrawGeometry {
                brush: Some(DeviceBrush::Solid(color)),
                ..
            } => Some(color.components),
            _ => None,
        })
        .collect();
    // White placeholder stripped; base, two wash regions, isolated wash.
    assert_eq!(solids.len(), 4, "{solids:?}");
    // The corner where the wash crosses the base is half blue over red.
    let blended = solids
        .iter()
        .any(|c| (c[0] - 0.5).abs() < 1e-4 && c[1].abs() < 1e-4 && (c[2] - 0.5).abs() < 1e-4);
    assert!(blended, "missing blue-over-red region: {solids:?}");
}

#[test]
fn isolated_group_output_is_opaque() {
    // Two overlapping opaque siblings under group opacity force the
    // isolated-subtree path; whatever mix of analytic pieces and bitmaps
    // comes out, the page must end up opaque.
    let group = Primitive::canvas(vec![
        solid_rect(0.0, 0.0, 10.0, 10.0, RED),
        solid_rect(5.0, 5.0, 15.0, 15.0, BLUE),
    ])
    .with_opacity(0.5);
    let device = run_page(group, &FlattenerConfig::default());
    assert!(device.draw_calls().count() > 0);
    assert_output_opaque(&device);
}

#[test]
fn opaque_glyph_run_passes_through() {
    let run = GlyphRun::new(
        vec![
            Glyph { id: 7, x: 12.0, y: 24.0 },
            Glyph { id: 8, x: 19.0, y: 24.0 },
        ],
        12.0,
        Rect::new(12.0, 14.0, 26.0, 26.0),
    );
    let page = Primitive::canvas(vec![
        solid_rect(0.0, 0.0, 30.0, 30.0, RED),
        Primitive::glyphs(run, BrushProxy::solid(BLACK).expect("black is visible")),
        // Transparency elsewhere keeps the analysis active.
        solid_rect(100.0, 100.0, 120.0, 120.0, BLUE).with_opacity(0.5),
    ]);
    let device = run_page(page, &FlattenerConfig::default());
    assert_output_opaque(&device);

    let order: Vec<&DeviceCall> = device.draw_calls().collect();
    let base = order
        .iter()
        .position(|c| matches!(c, DeviceCall::DrawGeometry { .. }));
    let glyphs = order
        .iter()
        .position(|c| matches!(c, DeviceCall::DrawGlyphRun { .. }));
    let (Some(base), Some(glyphs)) = (base, glyphs) else {
        panic!("missing draw calls: {order:?}");
    };
    assert!(base < glyphs, "text must paint over its background");
    let Some(DeviceCall::DrawGlyphRun { brush, .. }) = order.get(glyphs) else {
        unreachable!()
    };
    assert!(matches!(brush, DeviceBrush::Solid(c) if c.components[3] == 1.0));
}
