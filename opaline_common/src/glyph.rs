// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph run payloads.
//!
//! Shaping and outline extraction are the host's job; the flattener only
//! needs positioned glyphs, a bounding box, and (optionally) the combined
//! outline so a glyph primitive can participate in geometry operations.

use crate::geometry::Geometry;
use peniko::Fill;
use peniko::kurbo::{BezPath, Rect};

/// A single positioned glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    /// Glyph identifier in the source font.
    pub id: u32,
    /// X offset of the glyph origin, in run coordinates.
    pub x: f64,
    /// Y offset of the glyph origin, in run coordinates.
    pub y: f64,
}

/// A positioned run of glyphs from a single font and size.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    /// The glyphs, in visual order.
    pub glyphs: Vec<Glyph>,
    /// Font size in device-independent units per em.
    pub font_size: f64,
    /// Ink bounding box of the run, in run coordinates.
    bounds: Rect,
    /// Combined outline of the run, when the host provided one.
    outline: Option<BezPath>,
}

impl GlyphRun {
    /// Create a run from positioned glyphs and a host-computed ink box.
    pub fn new(glyphs: Vec<Glyph>, font_size: f64, bounds: Rect) -> Self {
        Self {
            glyphs,
            font_size,
            bounds,
            outline: None,
        }
    }

    /// Attach the combined glyph outline.
    pub fn with_outline(mut self, outline: BezPath) -> Self {
        self.outline = Some(outline);
        self
    }

    /// Ink bounding box in run coordinates.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Whether the host supplied a real outline for this run.
    pub fn has_outline(&self) -> bool {
        self.outline.is_some()
    }

    /// Fill geometry of the run: the real outline if present, otherwise the
    /// ink box. The ink box is only a stand-in for bounds arithmetic; callers
    /// that need exact coverage must check [`has_outline`](Self::has_outline).
    pub fn fill_geometry(&self) -> Geometry {
        match &self.outline {
            Some(path) => Geometry::from_path(path.clone(), Fill::NonZero),
            None => Geometry::Rect(self.bounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::kurbo::Shape;

    #[test]
    fn fill_geometry_prefers_outline() {
        let run = GlyphRun::new(
            vec![Glyph { id: 3, x: 0.0, y: 0.0 }],
            12.0,
            Rect::new(0.0, -10.0, 8.0, 2.0),
        );
        assert!(matches!(run.fill_geometry(), Geometry::Rect(_)));

        let outlined = run.with_outline(Rect::new(0.0, -9.0, 7.0, 1.0).to_path(0.1));
        assert!(outlined.has_outline());
        assert!(matches!(outlined.fill_geometry(), Geometry::Path { .. }));
    }
}
