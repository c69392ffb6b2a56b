// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A premultiplied RGBA8 pixel buffer.
//!
//! This is the target of every rasterization fallback and the pixel source
//! for image primitives. On top of plain storage it carries the blending
//! surface the flattener needs: compositing a color or another pixmap under
//! or over the existing pixels, alpha scaling, cropping, and opacity
//! classification.

use crate::blend::over_premul;
use peniko::color::{AlphaColor, PremulRgba8, Srgb};
use peniko::kurbo::Rect;

/// A pixmap of premultiplied RGBA8 pixels in row-major order.
#[derive(Debug, Clone)]
pub struct Pixmap {
    width: u16,
    height: u16,
    buf: Vec<PremulRgba8>,
}

impl Pixmap {
    /// Create a pixmap filled with transparent black.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            buf: vec![PremulRgba8::from_u32(0); usize::from(width) * usize::from(height)],
        }
    }

    /// Create a pixmap from existing premultiplied pixels.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != width * height`.
    pub fn from_parts(data: Vec<PremulRgba8>, width: u16, height: u16) -> Self {
        assert_eq!(
            data.len(),
            usize::from(width) * usize::from(height),
            "expected `data` to have length of exactly `width * height`"
        );
        Self {
            width,
            height,
            buf: data,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// The pixels, row-major.
    pub fn data(&self) -> &[PremulRgba8] {
        &self.buf
    }

    /// Mutable access to the pixels, row-major.
    pub fn data_mut(&mut self) -> &mut [PremulRgba8] {
        &mut self.buf
    }

    /// The pixel at `(x, y)`.
    pub fn pixel(&self, x: u16, y: u16) -> PremulRgba8 {
        self.buf[usize::from(y) * usize::from(self.width) + usize::from(x)]
    }

    /// Overwrite the pixel at `(x, y)`.
    pub fn set_pixel(&mut self, x: u16, y: u16, pixel: PremulRgba8) {
        self.buf[usize::from(y) * usize::from(self.width) + usize::from(x)] = pixel;
    }

    /// Nearest-neighbor sample at normalized coordinates in `[0, 1]`,
    /// clamped at the edges.
    pub fn sample(&self, u: f64, v: f64) -> PremulRgba8 {
        if self.buf.is_empty() {
            return PremulRgba8::from_u32(0);
        }
        let x = ((u * f64::from(self.width)).floor() as i64)
            .clamp(0, i64::from(self.width) - 1) as u16;
        let y = ((v * f64::from(self.height)).floor() as i64)
            .clamp(0, i64::from(self.height) - 1) as u16;
        self.pixel(x, y)
    }

    /// Whether every pixel is fully opaque.
    pub fn is_opaque(&self) -> bool {
        self.buf.iter().all(|p| p.a == 255)
    }

    /// Whether every pixel is fully transparent.
    pub fn is_transparent(&self) -> bool {
        self.buf.iter().all(|p| p.a == 0)
    }

    /// Scale every pixel's alpha (and color, since pixels are
    /// premultiplied) by `alpha / 255`.
    pub fn multiply_alpha(&mut self, alpha: u8) {
        if alpha == 255 {
            return;
        }
        let scale = |component| ((u16::from(alpha) * u16::from(component)) / 255) as u8;
        for pixel in &mut self.buf {
            *pixel = PremulRgba8 {
                r: scale(pixel.r),
                g: scale(pixel.g),
                b: scale(pixel.b),
                a: scale(pixel.a),
            };
        }
    }

    /// Composite a color underneath the image: wherever the image is not
    /// fully opaque, the color shows through.
    pub fn blend_under_color(&mut self, color: AlphaColor<Srgb>) {
        let under = color.premultiply().to_rgba8();
        for pixel in &mut self.buf {
            *pixel = over_premul(under, *pixel);
        }
    }

    /// Composite a color over the image.
    pub fn blend_over_color(&mut self, color: AlphaColor<Srgb>) {
        let over = color.premultiply().to_rgba8();
        for pixel in &mut self.buf {
            *pixel = over_premul(*pixel, over);
        }
    }

    /// Composite another pixmap of identical dimensions underneath this one.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ.
    pub fn blend_under_pixmap(&mut self, under: &Self) {
        assert_eq!(
            (self.width, self.height),
            (under.width, under.height),
            "blend_under_pixmap requires equal dimensions"
        );
        for (pixel, u) in self.buf.iter_mut().zip(under.buf.iter()) {
            *pixel = over_premul(*u, *pixel);
        }
    }

    /// Extract a sub-rectangle (in pixel coordinates, clamped to the image).
    pub fn crop(&self, rect: Rect) -> Self {
        let x0 = (rect.x0.floor().max(0.0) as usize).min(usize::from(self.width));
        let y0 = (rect.y0.floor().max(0.0) as usize).min(usize::from(self.height));
        let x1 = (rect.x1.ceil().max(0.0) as usize).min(usize::from(self.width));
        let y1 = (rect.y1.ceil().max(0.0) as usize).min(usize::from(self.height));
        let (w, h) = (x1.saturating_sub(x0), y1.saturating_sub(y0));
        let mut out = Vec::with_capacity(w * h);
        for y in y0..y1 {
            let row = y * usize::from(self.width);
            out.extend_from_slice(&self.buf[row + x0..row + x1]);
        }
        Self::from_parts(out, w as u16, h as u16)
    }

    /// Load a pixmap from PNG data, converting to premultiplied alpha.
    #[cfg(feature = "png")]
    pub fn from_png(data: impl std::io::Read) -> Result<Self, png::DecodingError> {
        let mut decoder = png::Decoder::new(data);
        decoder.set_transformations(
            png::Transformations::normalize_to_color8() | png::Transformations::ALPHA,
        );
        let mut reader = decoder.read_info()?;
        let mut img_data = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut img_data)?;
        img_data.truncate(info.buffer_size());

        let width = u16::try_from(info.width).map_err(|_| png::DecodingError::LimitsExceeded)?;
        let height = u16::try_from(info.height).map_err(|_| png::DecodingError::LimitsExceeded)?;

        let premultiply = |rgba: [u8; 4]| {
            let alpha = u16::from(rgba[3]);
            let scale = |c| ((alpha * u16::from(c)) / 255) as u8;
            PremulRgba8 {
                r: scale(rgba[0]),
                g: scale(rgba[1]),
                b: scale(rgba[2]),
                a: rgba[3],
            }
        };

        let buf = match info.color_type {
            png::ColorType::Rgba => img_data
                .chunks_exact(4)
                .map(|c| premultiply([c[0], c[1], c[2], c[3]]))
                .collect(),
            png::ColorType::GrayscaleAlpha => img_data
                .chunks_exact(2)
                .map(|c| premultiply([c[0], c[0], c[0], c[1]]))
                .collect(),
            // `normalize_to_color8` + `ALPHA` leave only the two cases above.
            _ => unreachable!("png transformations normalize to an alpha color type"),
        };

        Ok(Self::from_parts(buf, width, height))
    }

    /// Encode the pixmap as PNG with straight (unpremultiplied) alpha.
    #[cfg(feature = "png")]
    pub fn to_png(&self, out: impl std::io::Write) -> Result<(), png::EncodingError> {
        let mut encoder = png::Encoder::new(out, u32::from(self.width), u32::from(self.height));
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        let mut data = Vec::with_capacity(self.buf.len() * 4);
        for p in &self.buf {
            if p.a == 0 {
                data.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                let unscale = |c| ((u16::from(c) * 255) / u16::from(p.a)).min(255) as u8;
                data.extend_from_slice(&[unscale(p.r), unscale(p.g), unscale(p.b), p.a]);
            }
        }
        writer.write_image_data(&data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{BLUE, RED};

    fn solid(width: u16, height: u16, color: AlphaColor<Srgb>) -> Pixmap {
        let pixel = color.premultiply().to_rgba8();
        Pixmap::from_parts(
            vec![pixel; usize::from(width) * usize::from(height)],
            width,
            height,
        )
    }

    #[test]
    fn opacity_classification() {
        assert!(Pixmap::new(2, 2).is_transparent());
        assert!(solid(2, 2, RED).is_opaque());
        let mut half = solid(2, 2, RED);
        half.multiply_alpha(128);
        assert!(!half.is_opaque());
        assert!(!half.is_transparent());
    }

    #[test]
    fn blend_under_fills_transparent_pixels() {
        let mut pixmap = Pixmap::new(2, 2);
        pixmap.set_pixel(0, 0, RED.premultiply().to_rgba8());
        pixmap.blend_under_color(BLUE);
        assert!(pixmap.is_opaque());
        // The red pixel stays red, the rest becomes blue.
        assert_eq!(pixmap.pixel(0, 0).r, 255);
        assert_eq!(pixmap.pixel(1, 1).b, 255);
    }

    #[test]
    fn crop_clamps_to_image() {
        let mut pixmap = Pixmap::new(4, 4);
        pixmap.set_pixel(2, 2, RED.premultiply().to_rgba8());
        let cropped = pixmap.crop(Rect::new(2.0, 2.0, 10.0, 10.0));
        assert_eq!((cropped.width(), cropped.height()), (2, 2));
        assert_eq!(cropped.pixel(0, 0).r, 255);
    }

    #[test]
    fn sampling_is_clamped() {
        let pixmap = solid(2, 2, RED);
        assert_eq!(pixmap.sample(-1.0, 0.5).r, 255);
        assert_eq!(pixmap.sample(2.0, 2.0).r, 255);
    }
}
