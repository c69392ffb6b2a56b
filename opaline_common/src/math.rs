// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Numeric and affine-transform predicates used throughout the pipeline.

use peniko::kurbo::Affine;

/// Tolerance for coordinate-space comparisons, in device-independent units.
pub const GEOMETRY_EPSILON: f64 = 1.0 / 1600.0;

/// Tolerance for normalized scalar comparisons (opacities, gradient offsets).
pub const SCALAR_EPSILON: f32 = 1.0 / 4096.0;

/// Opacity at or below which a paint is treated as fully transparent.
pub const ALMOST_TRANSPARENT: f32 = 1.0 / 255.0;

/// Opacity at or above which a paint is treated as fully opaque.
pub const ALMOST_OPAQUE: f32 = 254.5 / 255.0;

/// Float comparison helpers in the tolerance regime of this crate.
pub trait FloatExt {
    /// Whether the value is within [`SCALAR_EPSILON`] of zero.
    fn is_nearly_zero(self) -> bool;
    /// Whether the value is within [`SCALAR_EPSILON`] of one.
    fn is_nearly_one(self) -> bool;
}

impl FloatExt for f32 {
    fn is_nearly_zero(self) -> bool {
        self.abs() <= SCALAR_EPSILON
    }

    fn is_nearly_one(self) -> bool {
        (self - 1.0).abs() <= SCALAR_EPSILON
    }
}

impl FloatExt for f64 {
    fn is_nearly_zero(self) -> bool {
        self.abs() <= f64::from(SCALAR_EPSILON)
    }

    fn is_nearly_one(self) -> bool {
        (self - 1.0).abs() <= f64::from(SCALAR_EPSILON)
    }
}

/// Whether an opacity value renders as invisible.
pub fn is_almost_transparent(opacity: f32) -> bool {
    opacity < ALMOST_TRANSPARENT
}

/// Whether an opacity value renders as fully covering.
pub fn is_almost_opaque(opacity: f32) -> bool {
    opacity > ALMOST_OPAQUE
}

/// Clamp an opacity into `[0, 1]`, mapping NaN to zero.
pub fn normalize_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        0.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

/// Whether a transform consists of axis-aligned scaling and translation only.
pub fn is_scale_translate(transform: &Affine) -> bool {
    let [_, b, c, _, _, _] = transform.as_coeffs();
    b.is_nearly_zero() && c.is_nearly_zero()
}

/// Whether a transform is a uniform (aspect-preserving) scale plus
/// translation, with no rotation, skew or flip.
pub fn is_uniform_scale_translate(transform: &Affine) -> bool {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    b.is_nearly_zero() && c.is_nearly_zero() && (a - d).is_nearly_zero() && a > 0.0
}

/// Whether a transform maps any visible area to visible area at all.
///
/// Degenerate (non-invertible or NaN) transforms collapse everything they
/// are applied to, so callers cull the affected subtree.
pub fn is_degenerate(transform: &Affine) -> bool {
    let coeffs = transform.as_coeffs();
    if coeffs.iter().any(|c| !c.is_finite()) {
        return true;
    }
    transform.determinant().abs() < f64::from(SCALAR_EPSILON) * f64::from(SCALAR_EPSILON)
}

/// Extract scale factors from an affine transform using singular value
/// decomposition.
///
/// Returns `(scale_x, scale_y)`, each clamped to at least `1e-6` to avoid
/// division by zero downstream. This mirrors kurbo's internal SVD.
pub fn extract_scales(transform: &Affine) -> (f64, f64) {
    let [m00, m10, m01, m11, _, _] = transform.as_coeffs();
    let e = (m00 + m11) * 0.5;
    let f = (m00 - m11) * 0.5;
    let g = (m10 + m01) * 0.5;
    let h = (m10 - m01) * 0.5;

    let q = (e * e + h * h).sqrt();
    let r = (f * f + g * g).sqrt();

    let sx = (q + r).max(1e-6);
    let sy = (q - r).abs().max(1e-6);
    (sx, sy)
}

/// The largest linear magnification the transform applies in any direction.
pub fn max_scale(transform: &Affine) -> f64 {
    let (sx, sy) = extract_scales(transform);
    sx.max(sy)
}

/// Invert a transform, treating degenerate transforms as "no result".
pub fn safe_inverse(transform: &Affine) -> Option<Affine> {
    if is_degenerate(transform) {
        None
    } else {
        Some(transform.inverse())
    }
}
