//! Node storage for the stage arena.

use crate::color::Color;
use crate::geometry::Rect;
use crate::texture::TextureId;
use crate::texturizer::Texturizer;
use crate::transform::LocalTransform;

use super::context::CoordContext;
use super::zcontext::ZRegistry;
use super::{Dirty, NodeId};

/// One scene node. Fields are written through `Stage` setters only, so
/// every mutation marks the right dirty bits.
#[derive(Debug)]
pub struct Node {
    pub(crate) alive: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Part of the tree reachable from the stage root.
    pub(crate) attached: bool,

    // Local properties.
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) width: f32,
    pub(crate) height: f32,
    /// Dimensions were set explicitly; a texture's own size never
    /// overrides them.
    pub(crate) explicit_size: bool,
    pub(crate) rotation: f32,
    pub(crate) scale_x: f32,
    pub(crate) scale_y: f32,
    pub(crate) pivot_x: f32,
    pub(crate) pivot_y: f32,
    pub(crate) mount_x: f32,
    pub(crate) mount_y: f32,
    pub(crate) alpha: f32,
    pub(crate) visible: bool,
    pub(crate) clipping: bool,
    /// Draw a solid rectangle via the atlas white pixel when no texture is
    /// set.
    pub(crate) rect: bool,
    /// Per-corner colors: top-left, top-right, bottom-right, bottom-left.
    pub(crate) colors: [Color; 4],
    pub(crate) texture: Option<TextureId>,

    // Cached update-pass results.
    pub(crate) local: LocalTransform,
    pub(crate) world: CoordContext,
    /// Coordinates local to the nearest render-to-texture ancestor.
    pub(crate) render: CoordContext,
    /// `render` mirrors `world` (no render-to-texture ancestor).
    pub(crate) render_is_world: bool,
    /// Active scissor in render-local coordinates, if clipped.
    pub(crate) scissor: Option<Rect>,
    pub(crate) visit_order: u64,

    // Invalidation.
    pub(crate) dirty: Dirty,
    /// Bits consumed by this frame's update pass, readable during render.
    pub(crate) frame_dirty: Dirty,
    /// This node or a descendant has pending updates.
    pub(crate) branch_pending: bool,

    // Z ordering.
    pub(crate) z_index: i32,
    pub(crate) force_z_context: bool,
    /// The z-context this node is registered with, when z_index != 0.
    pub(crate) z_parent: Option<NodeId>,
    pub(crate) z_registry: Option<Box<ZRegistry>>,

    pub(crate) texturizer: Option<Box<Texturizer>>,
}

impl Node {
    pub(crate) fn new() -> Self {
        Self {
            alive: true,
            parent: None,
            children: Vec::new(),
            attached: false,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            explicit_size: false,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            pivot_x: 0.0,
            pivot_y: 0.0,
            mount_x: 0.0,
            mount_y: 0.0,
            alpha: 1.0,
            visible: true,
            clipping: false,
            rect: false,
            colors: [Color::WHITE; 4],
            texture: None,
            local: LocalTransform::IDENTITY,
            world: CoordContext::IDENTITY,
            render: CoordContext::IDENTITY,
            render_is_world: true,
            scissor: None,
            visit_order: 0,
            dirty: Dirty::all(),
            frame_dirty: Dirty::empty(),
            branch_pending: true,
            z_index: 0,
            force_z_context: false,
            z_parent: None,
            z_registry: None,
            texturizer: None,
        }
    }

    /// Whether this node acts as a z-context boundary for descendants.
    pub(crate) fn is_z_context(&self, is_root: bool) -> bool {
        is_root
            || self.force_z_context
            || self.z_index != 0
            || self
                .texturizer
                .as_ref()
                .map(|tx| tx.in_use())
                .unwrap_or(false)
    }

    pub(crate) fn recompute_local(&mut self) {
        self.local = LocalTransform::compute(
            self.x,
            self.y,
            self.rotation,
            self.scale_x,
            self.scale_y,
            self.pivot_x,
            self.pivot_y,
            self.mount_x,
            self.mount_y,
            self.width,
            self.height,
        );
    }
}
