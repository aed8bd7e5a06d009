//! Texture sources and GPU handle bookkeeping.
//!
//! Texture decode/upload is the loading collaborator's job; the scene core
//! only tracks per-source dimensions, the GPU handle once loaded, and the
//! set of subscribed nodes. Subscriptions are explicit (activate/deactivate
//! boundaries), so a source's lifetime is exactly that of its longest
//! holder — no implicit collection.

use crate::tree::NodeId;

/// Opaque handle naming a GPU texture or render target.
///
/// The core never dereferences handles; the GPU executor maps them to real
/// textures. Source textures, offscreen targets and the shared atlas all
/// share one namespace so a render-to-texture result can be sampled like
/// any other texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// The permanent 1×1 white texture, resident in the atlas at a fixed
/// coordinate and used for solid-rect draws.
pub const WHITE_TEXTURE: TextureHandle = TextureHandle(0);

/// The shared atlas surface.
pub const ATLAS_TEXTURE: TextureHandle = TextureHandle(1);

/// Issues fresh [`TextureHandle`]s; values 0 and 1 are reserved for the
/// white pixel and the atlas surface.
#[derive(Debug)]
pub struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self { next: 2 }
    }

    pub fn alloc(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next);
        self.next += 1;
        handle
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a texture source in the stage's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

impl TextureId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

/// A texture as seen from the scene core: dimensions, an optional GPU
/// handle, and the nodes currently displaying it.
#[derive(Debug)]
pub struct TextureSource {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) handle: Option<TextureHandle>,
    pub(crate) loading: bool,
    pub(crate) subscribers: Vec<NodeId>,
}

impl TextureSource {
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// The loader has been asked for this source but has not reported
    /// back yet.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Stage-owned registry of texture sources.
#[derive(Debug, Default)]
pub struct TextureRegistry {
    sources: Vec<TextureSource>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source that is still being loaded; dimensions become
    /// known when the loader reports completion.
    pub fn create(&mut self) -> TextureId {
        self.sources.push(TextureSource {
            width: 0,
            height: 0,
            handle: None,
            loading: true,
            subscribers: Vec::new(),
        });
        TextureId(self.sources.len() as u32 - 1)
    }

    pub fn get(&self, id: TextureId) -> &TextureSource {
        &self.sources[id.idx()]
    }

    /// Loader callback: the source finished decoding and uploading.
    pub(crate) fn mark_loaded(
        &mut self,
        id: TextureId,
        handle: TextureHandle,
        width: u32,
        height: u32,
    ) {
        let source = &mut self.sources[id.idx()];
        source.handle = Some(handle);
        source.width = width;
        source.height = height;
        source.loading = false;
    }

    /// Loader callback: loading failed; subscribed nodes are treated as
    /// textureless until a new source is set.
    pub(crate) fn mark_failed(&mut self, id: TextureId) {
        let source = &mut self.sources[id.idx()];
        source.handle = None;
        source.loading = false;
    }

    /// Returns true if this was the first subscriber (activation edge).
    pub(crate) fn subscribe(&mut self, id: TextureId, node: NodeId) -> bool {
        let source = &mut self.sources[id.idx()];
        if !source.subscribers.contains(&node) {
            source.subscribers.push(node);
        }
        source.subscribers.len() == 1
    }

    /// Returns true if this was the last subscriber (deactivation edge).
    pub(crate) fn unsubscribe(&mut self, id: TextureId, node: NodeId) -> bool {
        let source = &mut self.sources[id.idx()];
        source.subscribers.retain(|&n| n != node);
        source.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_allocator_skips_reserved() {
        let mut alloc = HandleAllocator::new();
        assert_eq!(alloc.alloc(), TextureHandle(2));
        assert_eq!(alloc.alloc(), TextureHandle(3));
    }

    #[test]
    fn subscribe_edges() {
        let mut reg = TextureRegistry::new();
        let tex = reg.create();
        let a = NodeId::from_raw(1);
        let b = NodeId::from_raw(2);
        assert!(reg.subscribe(tex, a));
        assert!(!reg.subscribe(tex, b));
        // Double subscribe is a no-op.
        assert!(!reg.subscribe(tex, a));
        assert_eq!(reg.get(tex).subscribers.len(), 2);
        assert!(!reg.unsubscribe(tex, a));
        assert!(reg.unsubscribe(tex, b));
    }

    #[test]
    fn load_failure_clears_handle() {
        let mut reg = TextureRegistry::new();
        let tex = reg.create();
        assert!(reg.get(tex).is_loading());
        reg.mark_loaded(tex, TextureHandle(7), 64, 32);
        assert!(reg.get(tex).is_loaded());
        assert!(!reg.get(tex).is_loading());
        reg.mark_failed(tex);
        assert!(!reg.get(tex).is_loaded());
        assert!(!reg.get(tex).is_loading());
    }
}
