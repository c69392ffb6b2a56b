// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The legacy device sink.
//!
//! The output of the whole pipeline is a sequence of calls against
//! [`LegacyDevice`]. Every brush that reaches the device is fully opaque;
//! the device is never asked to composite alpha. A [`RecordingDevice`] is
//! provided for tests and diagnostics.

use crate::geometry::Geometry;
use crate::glyph::GlyphRun;
use crate::pixmap::Pixmap;
use peniko::Gradient;
use peniko::color::{AlphaColor, Srgb};
use peniko::kurbo::{Affine, Rect, Stroke};
use std::sync::Arc;

/// A paint the legacy device can apply directly.
///
/// Gradients handed to the device are guaranteed to have fully opaque stops;
/// images are guaranteed to carry no alpha the device would have to blend.
#[derive(Debug, Clone)]
pub enum DeviceBrush {
    /// A solid opaque color.
    Solid(AlphaColor<Srgb>),
    /// A gradient with opaque stops.
    Gradient(Box<Gradient>),
    /// An opaque bitmap stretched into a destination rectangle.
    Image {
        /// Pixel source.
        pixmap: Arc<Pixmap>,
        /// Destination rectangle in current device coordinates.
        dest: Rect,
    },
}

/// Stroke shape plus the brush it is painted with.
#[derive(Debug, Clone)]
pub struct DevicePen {
    /// Stroke width, caps, joins and dashes.
    pub stroke: Stroke,
    /// Paint for the stroked outline.
    pub brush: DeviceBrush,
}

/// Sink for the flattened, fully opaque draw stream.
///
/// Push/pop calls nest; clip and transform stacks are independent, matching
/// the downstream driver model. Document and page lifecycle is pass-through
/// state the pipeline never inspects.
pub trait LegacyDevice {
    /// Begin a document.
    fn start_document(&mut self) {}
    /// Finish a document.
    fn end_document(&mut self) {}
    /// Begin a page of the given size in device-independent units.
    fn start_page(&mut self, _width: f64, _height: f64) {}
    /// Finish the current page.
    fn end_page(&mut self) {}

    /// Push a clip region; subsequent draws are restricted to it.
    fn push_clip(&mut self, clip: &Geometry);
    /// Pop the innermost clip.
    fn pop_clip(&mut self);
    /// Push a coordinate transform.
    fn push_transform(&mut self, transform: Affine);
    /// Pop the innermost transform.
    fn pop_transform(&mut self);

    /// Fill and/or stroke a geometry. At least one of `brush` and `pen` is
    /// present.
    fn draw_geometry(
        &mut self,
        brush: Option<&DeviceBrush>,
        pen: Option<&DevicePen>,
        geometry: &Geometry,
    );
    /// Draw an opaque image into a destination rectangle.
    fn draw_image(&mut self, image: &Pixmap, dest: Rect);
    /// Draw a glyph run with the given foreground brush.
    fn draw_glyph_run(&mut self, run: &GlyphRun, brush: &DeviceBrush);

    /// Diagnostic annotation; a no-op on production devices.
    fn comment(&mut self, _text: &str) {}
}

/// One recorded device call.
#[derive(Debug, Clone)]
pub enum DeviceCall {
    /// `start_document`
    StartDocument,
    /// `end_document`
    EndDocument,
    /// `start_page`
    StartPage(f64, f64),
    /// `end_page`
    EndPage,
    /// `push_clip`
    PushClip(Geometry),
    /// `pop_clip`
    PopClip,
    /// `push_transform`
    PushTransform(Affine),
    /// `pop_transform`
    PopTransform,
    /// `draw_geometry`
    DrawGeometry {
        /// Fill brush, if any.
        brush: Option<DeviceBrush>,
        /// Pen, if any.
        pen: Option<DevicePen>,
        /// The outline.
        geometry: Geometry,
    },
    /// `draw_image`
    DrawImage {
        /// The pixels.
        image: Pixmap,
        /// Destination rectangle.
        dest: Rect,
    },
    /// `draw_glyph_run`
    DrawGlyphRun {
        /// The run.
        run: GlyphRun,
        /// Foreground brush.
        brush: DeviceBrush,
    },
    /// `comment`
    Comment(String),
}

/// A device that records every call, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    /// The calls, in emission order.
    pub calls: Vec<DeviceCall>,
}

impl RecordingDevice {
    /// Create an empty recording device.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded drawing calls, ignoring state and lifecycle calls.
    pub fn draw_calls(&self) -> impl Iterator<Item = &DeviceCall> {
        self.calls.iter().filter(|c| {
            matches!(
                c,
                DeviceCall::DrawGeometry { .. }
                    | DeviceCall::DrawImage { .. }
                    | DeviceCall::DrawGlyphRun { .. }
            )
        })
    }
}

impl LegacyDevice for RecordingDevice {
    fn start_document(&mut self) {
        self.calls.push(DeviceCall::StartDocument);
    }

    fn end_document(&mut self) {
        self.calls.push(DeviceCall::EndDocument);
    }

    fn start_page(&mut self, width: f64, height: f64) {
        self.calls.push(DeviceCall::StartPage(width, height));
    }

    fn end_page(&mut self) {
        self.calls.push(DeviceCall::EndPage);
    }

    fn push_clip(&mut self, clip: &Geometry) {
        self.calls.push(DeviceCall::PushClip(clip.clone()));
    }

    fn pop_clip(&mut self) {
        self.calls.push(DeviceCall::PopClip);
    }

    fn push_transform(&mut self, transform: Affine) {
        self.calls.push(DeviceCall::PushTransform(transform));
    }

    fn pop_transform(&mut self) {
        self.calls.push(DeviceCall::PopTransform);
    }

    fn draw_geometry(
        &mut self,
        brush: Option<&DeviceBrush>,
        pen: Option<&DevicePen>,
        geometry: &Geometry,
    ) {
        self.calls.push(DeviceCall::DrawGeometry {
            brush: brush.cloned(),
            pen: pen.cloned(),
            geometry: geometry.clone(),
        });
    }

    fn draw_image(&mut self, image: &Pixmap, dest: Rect) {
        self.calls.push(DeviceCall::DrawImage {
            image: image.clone(),
            dest,
        });
    }

    fn draw_glyph_run(&mut self, run: &GlyphRun, brush: &DeviceBrush) {
        self.calls.push(DeviceCall::DrawGlyphRun {
            run: run.clone(),
            brush: brush.clone(),
        });
    }

    fn comment(&mut self, text: &str) {
        self.calls.push(DeviceCall::Comment(text.to_owned()));
    }
}
