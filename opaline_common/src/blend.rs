// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Alpha-compositing color arithmetic.
//!
//! All analytic brush blending bottoms out in the formulas here. Colors are
//! combined in straight (non-premultiplied) f32 components and only quantized
//! to premultiplied bytes at pixmap boundaries, so repeated blends don't
//! accumulate 8-bit rounding error.

use crate::math::{ALMOST_OPAQUE, ALMOST_TRANSPARENT};
use peniko::color::{AlphaColor, ColorSpace, LinearSrgb, PremulRgba8, Srgb};

/// Color space in which gradient stops are interpolated.
///
/// The host drawing model allows gradients to interpolate either in gamma
/// sRGB or in linear RGB; band decomposition and stop recoloring must match
/// whichever the source gradient declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorInterpolation {
    /// Interpolate raw sRGB components (the common legacy default).
    #[default]
    Srgb,
    /// Convert to linear RGB, interpolate, convert back.
    LinearSrgb,
}

/// Composite `over` on top of `under` using source-over alpha compositing.
///
/// Both inputs and the result are straight-alpha sRGB colors.
pub fn blend_colors(under: AlphaColor<Srgb>, over: AlphaColor<Srgb>) -> AlphaColor<Srgb> {
    let [ur, ug, ub, ua] = under.components;
    let [or, og, ob, oa] = over.components;

    let out_a = oa + ua * (1.0 - oa);
    if out_a <= 0.0 {
        return AlphaColor::new([0.0, 0.0, 0.0, 0.0]);
    }
    let blend = |u: f32, o: f32| (o * oa + u * ua * (1.0 - oa)) / out_a;
    AlphaColor::new([blend(ur, or), blend(ug, og), blend(ub, ob), out_a])
}

/// Scale a color's alpha by `opacity`, leaving the color components alone.
pub fn scale_alpha(color: AlphaColor<Srgb>, opacity: f32) -> AlphaColor<Srgb> {
    let [r, g, b, a] = color.components;
    AlphaColor::new([r, g, b, a * opacity.clamp(0.0, 1.0)])
}

/// Source-over compositing of two premultiplied RGBA8 pixels.
pub fn over_premul(under: PremulRgba8, over: PremulRgba8) -> PremulRgba8 {
    let inv_a = 255 - u16::from(over.a);
    let blend = |u: u8, o: u8| {
        let v = u16::from(o) + (u16::from(u) * inv_a + 127) / 255;
        v.min(255) as u8
    };
    PremulRgba8 {
        r: blend(under.r, over.r),
        g: blend(under.g, over.g),
        b: blend(under.b, over.b),
        a: blend(under.a, over.a),
    }
}

/// Whether a color covers everything beneath it.
pub fn color_is_opaque(color: AlphaColor<Srgb>) -> bool {
    color.components[3] > ALMOST_OPAQUE
}

/// Whether a color contributes nothing visible.
pub fn color_is_transparent(color: AlphaColor<Srgb>) -> bool {
    color.components[3] < ALMOST_TRANSPARENT
}

/// Linearly interpolate between two stop colors in the requested color space.
///
/// Alpha is always interpolated linearly; only the color components change
/// space. `t` is clamped to `[0, 1]`.
pub fn lerp_stop_colors(
    a: AlphaColor<Srgb>,
    b: AlphaColor<Srgb>,
    t: f32,
    interpolation: ColorInterpolation,
) -> AlphaColor<Srgb> {
    let t = t.clamp(0.0, 1.0);
    match interpolation {
        ColorInterpolation::Srgb => lerp_components(a, b, t),
        ColorInterpolation::LinearSrgb => {
            let la = convert_space::<Srgb, LinearSrgb>(a);
            let lb = convert_space::<Srgb, LinearSrgb>(b);
            convert_space::<LinearSrgb, Srgb>(lerp_components(la, lb, t))
        }
    }
}

fn lerp_components<CS: ColorSpace>(
    a: AlphaColor<CS>,
    b: AlphaColor<CS>,
    t: f32,
) -> AlphaColor<CS> {
    let ac = a.components;
    let bc = b.components;
    AlphaColor::new([
        ac[0] + (bc[0] - ac[0]) * t,
        ac[1] + (bc[1] - ac[1]) * t,
        ac[2] + (bc[2] - ac[2]) * t,
        ac[3] + (bc[3] - ac[3]) * t,
    ])
}

fn convert_space<From: ColorSpace, To: ColorSpace>(color: AlphaColor<From>) -> AlphaColor<To> {
    color.convert::<To>()
}

/// Perceptually weighted distance between two colors, in `[0, ~1.73]`.
///
/// Uses the classic luminance weights on the color delta plus the alpha
/// delta; good enough to size gradient decomposition bands, no more.
pub fn color_distance(a: AlphaColor<Srgb>, b: AlphaColor<Srgb>) -> f32 {
    let ac = a.components;
    let bc = b.components;
    let dr = (ac[0] - bc[0]) * 0.30;
    let dg = (ac[1] - bc[1]) * 0.59;
    let db = (ac[2] - bc[2]) * 0.11;
    let da = ac[3] - bc[3];
    (dr * dr + dg * dg + db * db + da * da).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{BLACK, BLUE, RED, WHITE};

    fn assert_close(a: AlphaColor<Srgb>, b: AlphaColor<Srgb>) {
        for i in 0..4 {
            assert!(
                (a.components[i] - b.components[i]).abs() < 1e-4,
                "component {i}: {:?} vs {:?}",
                a.components,
                b.components
            );
        }
    }

    #[test]
    fn opaque_over_wins() {
        assert_close(blend_colors(RED, BLUE), BLUE);
    }

    #[test]
    fn half_blue_over_red() {
        // Opaque red under 50%-alpha blue: result is opaque, components are
        // the midpoint of red and blue.
        let result = blend_colors(RED, scale_alpha(BLUE, 0.5));
        assert_close(result, AlphaColor::new([0.5, 0.0, 0.5, 1.0]));
    }

    #[test]
    fn half_blue_over_white() {
        let result = blend_colors(WHITE, scale_alpha(BLUE, 0.5));
        assert_close(result, AlphaColor::new([0.5, 0.5, 1.0, 1.0]));
        assert!(color_is_opaque(result));
    }

    #[test]
    fn transparent_over_is_identity() {
        let result = blend_colors(RED, scale_alpha(BLUE, 0.0));
        assert_close(result, RED);
    }

    #[test]
    fn premul_over_matches_float() {
        let under = RED.premultiply().to_rgba8();
        let over = scale_alpha(BLUE, 0.5).premultiply().to_rgba8();
        let out = over_premul(under, over);
        assert_eq!(out.a, 255);
        // Midpoint of red and blue, premultiplied by full alpha.
        assert!((i16::from(out.r) - 128).abs() <= 1);
        assert!((i16::from(out.b) - 128).abs() <= 1);
        assert_eq!(out.g, 0);
    }

    #[test]
    fn stop_lerp_spaces_agree_at_endpoints() {
        for interp in [ColorInterpolation::Srgb, ColorInterpolation::LinearSrgb] {
            assert_close(lerp_stop_colors(RED, BLUE, 0.0, interp), RED);
            assert_close(lerp_stop_colors(RED, BLUE, 1.0, interp), BLUE);
        }
    }

    #[test]
    fn linear_interpolation_differs_midway() {
        let srgb = lerp_stop_colors(BLACK, WHITE, 0.5, ColorInterpolation::Srgb);
        let linear = lerp_stop_colors(BLACK, WHITE, 0.5, ColorInterpolation::LinearSrgb);
        // Linear-space midpoint of black and white is brighter in sRGB terms.
        assert!(linear.components[0] > srgb.components[0]);
    }

    #[test]
    fn distance_bounds() {
        assert!(color_distance(RED, RED) < 1e-6);
        assert!(color_distance(BLACK, WHITE) > 0.5);
    }
}
