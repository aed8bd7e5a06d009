//! GPU-facing output types and the wgpu execution layer.
//!
//! The scene core produces a [`FrameOutput`] per frame: one shared vertex
//! buffer, a flat list of draw runs, and the ordered render passes that
//! consume slices of that run list. The executor in [`gpu`] turns it into
//! one buffer upload and one GPU draw call per run.

pub mod atlas;
pub mod batch;
pub mod gpu;
pub mod pipeline;
pub mod target;

use std::ops::Range;

use crate::texture::TextureHandle;

pub use atlas::{AtlasRegion, AtlasUpload, TextureAtlasPacker, ATLAS_SIZE, MAX_ATLAS_DIM};
pub use batch::{QuadBatcher, QuadRun, QuadVertex};
pub use gpu::{FrameExecutor, GpuContext};
pub use target::RenderTargetPool;

/// Identifies a compiled draw program. The executor owns the registry
/// mapping kinds to pipelines; the core only names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Textured quad modulated by per-corner vertex color (also the
    /// capture program — solid rects sample the white pixel).
    Default,
    /// Separable box blur, radius in `params[0]`.
    Blur,
    /// Desaturation, amount 0..1 in `params[0]`.
    Grayscale,
}

/// Where a render pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Screen,
    Texture(TextureHandle),
}

/// One GPU render pass: a target plus a contiguous slice of the frame's
/// run list. A capture interrupted by a nested capture splits into several
/// passes on its target; only the first of those clears. A target entered
/// anew (a filter-chain pass, or a pooled handle re-acquired later in the
/// frame) is a fresh redraw and clears again.
#[derive(Debug, Clone)]
pub struct RenderPassDesc {
    pub target: PassTarget,
    pub clear: bool,
    pub runs: Range<usize>,
}

/// An offscreen target referenced this frame; the executor materializes
/// any it has not seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// Per-frame diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub quads: u32,
    pub runs: u32,
    pub passes: u32,
    pub atlas_uploads: u32,
}

/// Everything the GPU backend needs to draw one frame.
#[derive(Debug)]
pub struct FrameOutput {
    pub vertices: Vec<QuadVertex>,
    pub runs: Vec<QuadRun>,
    pub passes: Vec<RenderPassDesc>,
    pub targets: Vec<TargetSpec>,
    /// Target handles dropped by the pool; the executor frees their GPU
    /// textures.
    pub retired: Vec<TextureHandle>,
    /// Newly packed atlas entries to upload before the scene passes run.
    pub atlas_uploads: Vec<AtlasUpload>,
    /// The atlas was repacked; clear it before applying the uploads.
    pub atlas_clear: bool,
    pub stats: FrameStats,
}
