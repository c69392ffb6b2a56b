// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Foundation types shared by the Opaline alpha-flattening pipeline.
//!
//! This crate should not be used on its own; it exists to back the
//! [`opaline`](https://crates.io/crates/opaline) flattener with:
//!
//! - Numeric and affine-transform predicates ([`math`]).
//! - Alpha-compositing color arithmetic in both floating-point and
//!   premultiplied-byte form ([`blend`]).
//! - A closed geometry representation with exact rectangle boolean
//!   operations and an explicit "no analytic result" escape hatch
//!   ([`geometry`]).
//! - A premultiplied RGBA8 pixel buffer with the blending surface the
//!   rasterization fallback needs ([`pixmap`]).
//! - The legacy device sink trait that consumes the flattened, fully
//!   opaque draw stream ([`device`]).
//!
//! # Features
//!
//! - `png` (enabled by default): Allow loading and storing
//!   [`Pixmap`][crate::pixmap::Pixmap]s as PNG images.

#![warn(clippy::print_stdout, clippy::print_stderr)]
#![forbid(unsafe_code)]

pub mod blend;
pub mod config;
pub mod device;
pub mod geometry;
pub mod glyph;
pub mod math;
pub mod pixmap;

pub use peniko;
pub use peniko::color;
pub use peniko::kurbo;
