// Copyright 2026 the Opaline Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline configuration.
//!
//! All tuning knobs are carried in one struct threaded by value through the
//! flattener and renderer; there is no global state, so tests can run with
//! different configurations concurrently.

/// Configuration for one flattening pass.
#[derive(Debug, Clone)]
pub struct FlattenerConfig {
    /// Resolution, in dots per inch, used when a region falls back to
    /// rasterization. Page coordinates are in 1/96-inch device-independent
    /// units.
    pub rasterization_dpi: f64,
    /// Maximum number of transparent primitives stacked over a region before
    /// analytic blending gives up and the whole cluster is rasterized.
    pub max_transparency_layers: usize,
    /// Maximum recursion depth for analytic brush decomposition before
    /// preferring rasterization.
    pub max_decomposition_depth: usize,
    /// Multiplier on gradient decomposition band density. `1.0` targets 20
    /// bands per inch of gradient span.
    pub gradient_decomposition_density: f32,
    /// Treat every primitive as opaque and skip transparency resolution.
    /// Used for draft-quality output.
    pub force_opaque: bool,
    /// Enable the blend-and-swap display-list rewrite. Disabling it routes
    /// affected primitives into cluster rasterization instead.
    pub enable_blend_and_swap: bool,
    /// Enable the push-transparency-down rewrite (blending one transparent
    /// overlay into each of the simple primitives beneath it). Disabling it
    /// routes affected primitives into cluster rasterization instead.
    pub enable_push_transparency_down: bool,
    /// Maximum number of tile repetitions a pattern brush may unfold into
    /// literal sub-primitives; beyond this the pattern is rasterized.
    pub pattern_unfold_limit: usize,
}

impl Default for FlattenerConfig {
    fn default() -> Self {
        Self {
            rasterization_dpi: 150.0,
            max_transparency_layers: 12,
            max_decomposition_depth: 6,
            gradient_decomposition_density: 1.0,
            force_opaque: false,
            enable_blend_and_swap: true,
            enable_push_transparency_down: true,
            pattern_unfold_limit: 64,
        }
    }
}

impl FlattenerConfig {
    /// Estimated cost of rasterizing a region of the given size (in
    /// device-independent units): a fixed setup charge plus three units per
    /// output pixel at the configured DPI.
    pub fn rasterization_cost(&self, width: f64, height: f64) -> f64 {
        let pixel_scale = self.rasterization_dpi / 96.0;
        1024.0 + width.max(0.0) * height.max(0.0) * pixel_scale * pixel_scale * 3.0
    }

    /// The number of device pixels a device-independent length maps to.
    pub fn to_pixels(&self, length: f64) -> usize {
        ((length * self.rasterization_dpi / 96.0).ceil().max(0.0)) as usize
    }
}
