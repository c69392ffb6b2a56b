// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Decoded image wrapper used as a leaf paint and as the rasterization
//! fallback target.

use opaline_common::pixmap::Pixmap;
use peniko::color::{AlphaColor, PremulRgba8, Srgb};
use peniko::kurbo::Rect;

/// How an image participates in opacity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOpacity {
    /// Every pixel is fully opaque.
    Opaque,
    /// Every pixel is fully transparent.
    Transparent,
    /// Anything else.
    Translucent,
}

/// A decoded-pixel image with the blending operations the flattener needs.
///
/// The pixel buffer is owned; `Clone` is a deep copy, which is what makes
/// the copy-on-write discipline of brush blending structural rather than
/// conventional.
#[derive(Debug, Clone)]
pub struct ImageProxy {
    pixmap: Pixmap,
    opacity: ImageOpacity,
}

impl ImageProxy {
    /// Wrap a decoded pixmap.
    pub fn new(pixmap: Pixmap) -> Self {
        let opacity = classify(&pixmap);
        Self { pixmap, opacity }
    }

    /// Width in pixels.
    pub fn width(&self) -> u16 {
        self.pixmap.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u16 {
        self.pixmap.height()
    }

    /// The pixel source of truth.
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Consume the proxy, returning the pixmap.
    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    /// Opacity classification of the current pixels.
    pub fn opacity(&self) -> ImageOpacity {
        self.opacity
    }

    /// Whether the image fully covers what is beneath it.
    pub fn is_opaque(&self) -> bool {
        self.opacity == ImageOpacity::Opaque
    }

    /// Whether the image is invisible.
    pub fn is_transparent(&self) -> bool {
        self.opacity == ImageOpacity::Transparent
    }

    /// Scale the image's alpha by `opacity`.
    pub fn push_opacity(&mut self, opacity: f32) {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.pixmap.multiply_alpha(alpha);
        self.opacity = match (self.opacity, alpha) {
            (_, 255) => self.opacity,
            (ImageOpacity::Transparent, _) | (_, 0) => ImageOpacity::Transparent,
            _ => ImageOpacity::Translucent,
        };
    }

    /// Composite a color under the image so the result is what a viewer
    /// would see with `color` painted first.
    pub fn blend_under_color(&mut self, color: AlphaColor<Srgb>) {
        self.pixmap.blend_under_color(color);
        self.opacity = classify(&self.pixmap);
    }

    /// Composite a color over the image.
    pub fn blend_over_color(&mut self, color: AlphaColor<Srgb>) {
        self.pixmap.blend_over_color(color);
        self.opacity = classify(&self.pixmap);
    }

    /// Composite another image (already resampled to the same dimensions)
    /// underneath this one. Returns `false` without touching the pixels if
    /// the dimensions differ.
    pub fn blend_under_image(&mut self, under: &Self) -> bool {
        if (self.width(), self.height()) != (under.width(), under.height()) {
            return false;
        }
        self.pixmap.blend_under_pixmap(&under.pixmap);
        self.opacity = classify(&self.pixmap);
        true
    }

    /// Restrict the image to a sub-rectangle given in unit coordinates
    /// (`0..1` across each axis).
    pub fn clip_to_unit_rect(&mut self, unit: Rect) {
        let pixel_rect = Rect::new(
            unit.x0 * f64::from(self.width()),
            unit.y0 * f64::from(self.height()),
            unit.x1 * f64::from(self.width()),
            unit.y1 * f64::from(self.height()),
        );
        self.pixmap = self.pixmap.crop(pixel_rect);
        self.opacity = classify(&self.pixmap);
    }

    /// Nearest-neighbor sample at unit coordinates, as a straight color.
    pub fn sample(&self, u: f64, v: f64) -> AlphaColor<Srgb> {
        unpremultiply(self.pixmap.sample(u, v))
    }
}

fn classify(pixmap: &Pixmap) -> ImageOpacity {
    if pixmap.data().is_empty() || pixmap.is_transparent() {
        ImageOpacity::Transparent
    } else if pixmap.is_opaque() {
        ImageOpacity::Opaque
    } else {
        ImageOpacity::Translucent
    }
}

fn unpremultiply(pixel: PremulRgba8) -> AlphaColor<Srgb> {
    if pixel.a == 0 {
        return AlphaColor::new([0.0, 0.0, 0.0, 0.0]);
    }
    let a = f32::from(pixel.a) / 255.0;
    let un = |c: u8| (f32::from(c) / 255.0) / a;
    AlphaColor::new([un(pixel.r), un(pixel.g), un(pixel.b), a])
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{RED, WHITE};

    fn solid_image(color: AlphaColor<Srgb>) -> ImageProxy {
        let pixel = color.premultiply().to_rgba8();
        ImageProxy::new(Pixmap::from_parts(vec![pixel; 16], 4, 4))
    }

    #[test]
    fn classification_tracks_mutation() {
        let mut image = solid_image(RED);
        assert!(image.is_opaque());
        image.push_opacity(0.5);
        assert_eq!(image.opacity(), ImageOpacity::Translucent);
        image.blend_under_color(WHITE);
        assert!(image.is_opaque());
    }

    #[test]
    fn opacity_push_is_multiplicative() {
        let mut a = solid_image(RED);
        a.push_opacity(0.5);
        a.push_opacity(0.5);
        let mut b = solid_image(RED);
        b.push_opacity(0.25);
        let delta = i16::from(a.pixmap().pixel(0, 0).a) - i16::from(b.pixmap().pixel(0, 0).a);
        assert!(delta.abs() <= 1);
    }

    #[test]
    fn unit_clip_crops_pixels() {
        let mut image = solid_image(RED);
        image.clip_to_unit_rect(Rect::new(0.0, 0.0, 0.5, 0.5));
        assert_eq!((image.width(), image.height()), (2, 2));
    }

    #[test]
    fn sample_round_trips_color() {
        let image = solid_image(RED);
        let sampled = image.sample(0.5, 0.5);
        assert!((sampled.components[0] - 1.0).abs() < 0.01);
        assert!((sampled.components[3] - 1.0).abs() < 0.01);
    }
}
