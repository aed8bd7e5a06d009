//! Post-processing filters applied to captured subtree textures.
//!
//! A filter names a draw program plus up to four scalar parameters. Filters
//! self-report when their current configuration does nothing so the render
//! pass can skip the texture round-trip entirely.

use crate::renderer::ShaderKind;

/// A single post-processing pass over a captured texture.
pub trait Filter: std::fmt::Debug {
    /// True when this filter's current parameters leave the image
    /// unchanged; no-op filters are skipped without a render pass.
    fn is_noop(&self) -> bool;

    fn shader(&self) -> ShaderKind;

    /// Scalar parameters handed to the shader's uniform block.
    fn params(&self) -> [f32; 4];
}

/// Separable box blur with a pixel radius.
#[derive(Debug, Clone, Copy)]
pub struct BlurFilter {
    pub radius: f32,
}

impl BlurFilter {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }
}

impl Filter for BlurFilter {
    fn is_noop(&self) -> bool {
        self.radius <= 0.0
    }

    fn shader(&self) -> ShaderKind {
        ShaderKind::Blur
    }

    fn params(&self) -> [f32; 4] {
        [self.radius, 0.0, 0.0, 0.0]
    }
}

/// Desaturation; `amount` 0 leaves the image untouched, 1 is full
/// grayscale.
#[derive(Debug, Clone, Copy)]
pub struct GrayscaleFilter {
    pub amount: f32,
}

impl GrayscaleFilter {
    pub fn new(amount: f32) -> Self {
        Self {
            amount: amount.clamp(0.0, 1.0),
        }
    }
}

impl Filter for GrayscaleFilter {
    fn is_noop(&self) -> bool {
        self.amount <= 0.0
    }

    fn shader(&self) -> ShaderKind {
        ShaderKind::Grayscale
    }

    fn params(&self) -> [f32; 4] {
        [self.amount, 0.0, 0.0, 0.0]
    }
}
