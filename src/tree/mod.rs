//! The retained scene tree: arena storage, dirty-flag update pass, and the
//! frame render pass.
//!
//! Nodes live in an arena owned by [`Stage`] and are addressed by plain
//! [`NodeId`] index handles. All property mutation goes through `Stage`
//! setters so dirty-flag propagation stays in one place.

pub mod context;
pub mod node;
mod render;
mod stage;
mod update;
pub mod zcontext;

pub use context::CoordContext;
pub use node::Node;
pub use stage::Stage;
pub use zcontext::ZRegistry;

bitflags::bitflags! {
    /// Pending invalidation on a node. Bits are consumed by the update pass
    /// and the consumed set is kept on the node (as `frame_dirty`) for the
    /// render pass of the same frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Dirty: u8 {
        const ALPHA = 1;
        const TRANSLATE = 1 << 1;
        const TRANSFORM = 1 << 2;
        const CLIPPING = 1 << 3;
        const DIMENSIONS = 1 << 4;
        const BECAME_VISIBLE = 1 << 7;
    }
}

impl Dirty {
    /// Bits an ancestor change forces onto descendants.
    pub(crate) fn inherited(self) -> Dirty {
        let mut down = self & (Dirty::ALPHA | Dirty::TRANSLATE | Dirty::TRANSFORM);
        // Moving or re-transforming a parent moves every descendant.
        if self.intersects(Dirty::TRANSFORM | Dirty::DIMENSIONS) {
            down |= Dirty::TRANSLATE | Dirty::TRANSFORM;
        }
        if self.contains(Dirty::TRANSLATE) {
            down |= Dirty::TRANSLATE;
        }
        down
    }
}

/// Index handle into the stage's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}
