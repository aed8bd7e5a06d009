pub mod color;
pub mod filter;
pub mod geometry;
pub mod texture;
pub mod texturizer;
pub mod transform;
pub mod tree;

// Public for callers that drive the GPU backend themselves
pub mod renderer;

pub mod prelude {
    pub use crate::color::Color;
    pub use crate::filter::{BlurFilter, Filter, GrayscaleFilter};
    pub use crate::geometry::Rect;
    pub use crate::renderer::{
        FrameExecutor, FrameOutput, FrameStats, GpuContext, PassTarget, RenderPassDesc, ShaderKind,
    };
    pub use crate::texture::{TextureHandle, TextureId};
    pub use crate::tree::{NodeId, Stage};
}
