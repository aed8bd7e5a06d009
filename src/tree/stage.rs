//! The stage: node arena, property setters, and frame orchestration.

use crate::color::Color;
use crate::filter::Filter;
use crate::renderer::{FrameOutput, TextureAtlasPacker, ATLAS_SIZE};
use crate::texture::{HandleAllocator, TextureHandle, TextureId, TextureRegistry, WHITE_TEXTURE};
use crate::texturizer::Texturizer;

use super::context::CoordContext;
use super::node::Node;
#[cfg(test)]
use super::zcontext::ZRegistry;
use super::{Dirty, NodeId};

use crate::renderer::target::RenderTargetPool;

/// Owns the scene tree and runs the per-frame update and render passes.
///
/// All mutation goes through setters here; a frame tick is one call to
/// [`Stage::frame`], which runs the update pass and then the render pass to
/// completion. Mutations made during rendering (from callbacks) become
/// visible the next frame.
#[derive(Debug)]
pub struct Stage {
    pub(crate) nodes: Vec<Node>,
    free: Vec<u32>,
    root: NodeId,
    width: u32,
    height: u32,

    pub(crate) textures: TextureRegistry,
    pub(crate) handles: HandleAllocator,
    pub(crate) atlas: TextureAtlasPacker,
    pub(crate) target_pool: RenderTargetPool,
    pub(crate) visit_counter: u64,
    frame_counter: u64,
}

impl Stage {
    pub fn new(width: u32, height: u32) -> Self {
        let mut root = Node::new();
        root.attached = true;
        root.width = width as f32;
        root.height = height as f32;

        let mut atlas = TextureAtlasPacker::new(ATLAS_SIZE);
        // The white pixel goes in first and stays resident forever; solid
        // rects sample it so they batch with atlased content.
        atlas.add(WHITE_TEXTURE, 1, 1);

        log::info!("stage created at {}x{}", width, height);

        Self {
            nodes: vec![root],
            free: Vec::new(),
            root: NodeId::from_raw(0),
            width,
            height,
            textures: TextureRegistry::new(),
            handles: HandleAllocator::new(),
            atlas,
            target_pool: RenderTargetPool::new(),
            visit_counter: 0,
            frame_counter: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.idx()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.idx()]
    }

    // ----- lifecycle -----

    pub fn create_node(&mut self) -> NodeId {
        if let Some(raw) = self.free.pop() {
            self.nodes[raw as usize] = Node::new();
            NodeId::from_raw(raw)
        } else {
            self.nodes.push(Node::new());
            NodeId::from_raw(self.nodes.len() as u32 - 1)
        }
    }

    /// Append `child` under `parent`, detaching it from any previous
    /// parent first.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || self.is_ancestor_of(child, parent) {
            log::error!("rejected add_child creating a cycle");
            return;
        }
        if self.node(child).parent.is_some() {
            self.remove_child(child);
        }
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);

        // A context with live z members must see new direct children in
        // its render item list.
        if let Some(reg) = self.node_mut(parent).z_registry.as_deref_mut() {
            if reg.usage() > 0 {
                reg.add_item(child);
            }
        }

        if self.node(parent).attached {
            self.set_attached(child, true);
        }
        self.mark_dirty(child, Dirty::all());
    }

    /// Detach `child` from its parent; the subtree stays alive and can be
    /// re-added elsewhere.
    pub fn remove_child(&mut self, child: NodeId) {
        let Some(parent) = self.node(child).parent else {
            return;
        };
        self.node_mut(parent).children.retain(|&c| c != child);
        if let Some(reg) = self.node_mut(parent).z_registry.as_deref_mut() {
            reg.remove_item(child);
        }
        self.node_mut(child).parent = None;
        if self.node(child).attached {
            self.set_attached(child, false);
        }
        self.invalidate(parent);
    }

    /// Destroy a node and its whole subtree, releasing held GPU targets.
    pub fn destroy_node(&mut self, id: NodeId) {
        if id == self.root {
            log::error!("cannot destroy the root node");
            return;
        }
        self.remove_child(id);
        self.destroy_subtree(id);
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.destroy_subtree(child);
        }
        if let Some(mut tx) = self.node_mut(id).texturizer.take() {
            for target in tx.release_targets() {
                self.target_pool.release(target);
            }
        }
        let node = self.node_mut(id);
        node.alive = false;
        self.free.push(id.idx() as u32);
    }

    /// Attach/detach recursion: texture subscriptions and z registration
    /// follow tree membership.
    fn set_attached(&mut self, id: NodeId, attached: bool) {
        if self.node(id).attached == attached {
            return;
        }
        self.node_mut(id).attached = attached;

        if let Some(texture) = self.node(id).texture {
            if attached {
                if self.textures.subscribe(texture, id) {
                    self.try_atlas(texture);
                }
                self.derive_dimensions(id, texture);
            } else if self.textures.unsubscribe(texture, id) {
                self.release_atlas_entry(texture);
            }
        }

        if self.node(id).z_index != 0 {
            if attached {
                self.register_z_member(id);
            } else {
                self.deregister_z_member(id);
            }
        }

        let children = self.node(id).children.clone();
        for child in children {
            self.set_attached(child, attached);
        }
    }

    // ----- property setters -----

    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) {
        let node = self.node_mut(id);
        if node.x == x && node.y == y {
            return;
        }
        node.x = x;
        node.y = y;
        self.mark_dirty(id, Dirty::TRANSLATE);
    }

    pub fn set_dimensions(&mut self, id: NodeId, width: f32, height: f32) {
        let node = self.node_mut(id);
        node.explicit_size = true;
        if node.width == width && node.height == height {
            return;
        }
        node.width = width;
        node.height = height;
        if width <= 0.0 || height <= 0.0 {
            self.release_texturizer_targets(id);
        }
        self.mark_dirty(id, Dirty::DIMENSIONS);
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: f32) {
        let node = self.node_mut(id);
        if node.rotation == rotation {
            return;
        }
        node.rotation = rotation;
        self.mark_dirty(id, Dirty::TRANSFORM);
    }

    pub fn set_scale(&mut self, id: NodeId, scale_x: f32, scale_y: f32) {
        let node = self.node_mut(id);
        if node.scale_x == scale_x && node.scale_y == scale_y {
            return;
        }
        node.scale_x = scale_x;
        node.scale_y = scale_y;
        self.mark_dirty(id, Dirty::TRANSFORM);
    }

    /// Pivot: the rotation/scale origin as a fraction of the node's size.
    pub fn set_pivot(&mut self, id: NodeId, pivot_x: f32, pivot_y: f32) {
        let node = self.node_mut(id);
        node.pivot_x = pivot_x;
        node.pivot_y = pivot_y;
        self.mark_dirty(id, Dirty::TRANSFORM);
    }

    /// Mount: which fractional point of the node lands on its position.
    pub fn set_mount(&mut self, id: NodeId, mount_x: f32, mount_y: f32) {
        let node = self.node_mut(id);
        node.mount_x = mount_x;
        node.mount_y = mount_y;
        self.mark_dirty(id, Dirty::TRANSFORM);
    }

    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) {
        let node = self.node_mut(id);
        if node.alpha == alpha {
            return;
        }
        let was_invisible = node.alpha <= 0.0 || !node.visible;
        node.alpha = alpha;
        let mut bits = Dirty::ALPHA;
        if was_invisible && alpha > 0.0 && node.visible {
            bits |= Dirty::BECAME_VISIBLE;
        }
        self.mark_dirty(id, bits);
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        let node = self.node_mut(id);
        if node.visible == visible {
            return;
        }
        node.visible = visible;
        let mut bits = Dirty::ALPHA;
        if visible {
            bits |= Dirty::BECAME_VISIBLE;
        }
        self.mark_dirty(id, bits);
    }

    pub fn set_clipping(&mut self, id: NodeId, clipping: bool) {
        let node = self.node_mut(id);
        if node.clipping == clipping {
            return;
        }
        node.clipping = clipping;
        self.mark_dirty(id, Dirty::CLIPPING);
    }

    /// Draw this node as a solid rectangle (white-pixel textured) when it
    /// has no texture of its own.
    pub fn set_rect(&mut self, id: NodeId, rect: bool) {
        self.node_mut(id).rect = rect;
        self.invalidate(id);
    }

    pub fn set_color(&mut self, id: NodeId, color: Color) {
        self.node_mut(id).colors = [color; 4];
        self.invalidate(id);
    }

    /// Per-corner colors: top-left, top-right, bottom-right, bottom-left.
    pub fn set_corner_colors(&mut self, id: NodeId, colors: [Color; 4]) {
        self.node_mut(id).colors = colors;
        self.invalidate(id);
    }

    pub fn set_texture(&mut self, id: NodeId, texture: Option<TextureId>) {
        let old = self.node(id).texture;
        if old == texture {
            return;
        }
        let attached = self.node(id).attached;
        if let Some(old) = old {
            if attached && self.textures.unsubscribe(old, id) {
                self.release_atlas_entry(old);
            }
        }
        self.node_mut(id).texture = texture;
        if let Some(new) = texture {
            if attached && self.textures.subscribe(new, id) {
                self.try_atlas(new);
            }
            self.derive_dimensions(id, new);
        } else if !self.node(id).explicit_size {
            let node = self.node_mut(id);
            node.width = 0.0;
            node.height = 0.0;
        }
        self.mark_dirty(id, Dirty::DIMENSIONS);
    }

    /// Nodes without an explicit size take their texture's dimensions once
    /// the source has loaded.
    fn derive_dimensions(&mut self, id: NodeId, texture: TextureId) {
        if self.node(id).explicit_size {
            return;
        }
        let source = self.textures.get(texture);
        if !source.is_loaded() {
            return;
        }
        let (width, height) = (source.width as f32, source.height as f32);
        let node = self.node_mut(id);
        node.width = width;
        node.height = height;
    }

    // ----- z ordering -----

    pub fn set_z_index(&mut self, id: NodeId, z_index: i32) {
        let old = self.node(id).z_index;
        if old == z_index {
            return;
        }
        let was_context = self.node(id).is_z_context(id == self.root);
        let attached = self.node(id).attached;

        if attached && old != 0 && z_index == 0 {
            self.deregister_z_member(id);
        }
        self.node_mut(id).z_index = z_index;
        if attached && old == 0 && z_index != 0 {
            self.register_z_member(id);
        } else if attached && old != 0 && z_index != 0 {
            if let Some(ctx) = self.node(id).z_parent {
                if let Some(reg) = self.node_mut(ctx).z_registry.as_deref_mut() {
                    reg.sort_pending = true;
                }
            }
        }

        let now_context = self.node(id).is_z_context(id == self.root);
        if was_context != now_context {
            if now_context {
                self.enable_z_context(id);
            } else {
                self.disable_z_context(id);
            }
        }
        self.invalidate(id);
    }

    pub fn set_force_z_context(&mut self, id: NodeId, force: bool) {
        if self.node(id).force_z_context == force {
            return;
        }
        let was_context = self.node(id).is_z_context(id == self.root);
        self.node_mut(id).force_z_context = force;
        let now_context = self.node(id).is_z_context(id == self.root);
        if was_context != now_context {
            if now_context {
                self.enable_z_context(id);
            } else {
                self.disable_z_context(id);
            }
        }
        self.invalidate(id);
    }

    /// Nearest strict-ancestor z-context of `id`; the root terminates every
    /// search.
    fn find_z_context(&self, id: NodeId) -> NodeId {
        let mut cur = self.node(id).parent;
        while let Some(c) = cur {
            if self.node(c).is_z_context(c == self.root) {
                return c;
            }
            cur = self.node(c).parent;
        }
        self.root
    }

    fn register_z_member(&mut self, id: NodeId) {
        let ctx = self.find_z_context(id);
        self.node_mut(id).z_parent = Some(ctx);
        // Seed the item list with the context's direct children the first
        // time the registry becomes live, so plain children keep their
        // tree-order slots relative to z-indexed members.
        let children = self.node(ctx).children.clone();
        let reg = self.node_mut(ctx).z_registry.get_or_insert_default();
        if reg.usage() == 0 {
            reg.items = children;
        }
        reg.add_member(id);
    }

    fn deregister_z_member(&mut self, id: NodeId) {
        let Some(ctx) = self.node_mut(id).z_parent.take() else {
            return;
        };
        let is_direct_child = self.node(id).parent == Some(ctx);
        if let Some(reg) = self.node_mut(ctx).z_registry.as_deref_mut() {
            reg.remove_member(id, is_direct_child);
        }
    }

    /// `id` became a z-context boundary: pull every member of the nearest
    /// ancestor context that is a strict descendant of `id` down into
    /// `id`'s own registry.
    fn enable_z_context(&mut self, id: NodeId) {
        let ancestor = self.find_z_context(id);
        let Some(reg) = self.node(ancestor).z_registry.as_deref() else {
            return;
        };
        let moved: Vec<NodeId> = reg
            .members
            .iter()
            .copied()
            .filter(|&m| m != id && self.is_ancestor_of(id, m))
            .collect();
        for member in moved {
            self.deregister_z_member(member);
            self.node_mut(member).z_parent = Some(id);
            let children = self.node(id).children.clone();
            let reg = self.node_mut(id).z_registry.get_or_insert_default();
            if reg.usage() == 0 {
                reg.items = children;
            }
            reg.add_member(member);
        }
    }

    /// `id` stopped being a boundary: hand its members up to the nearest
    /// remaining ancestor context.
    fn disable_z_context(&mut self, id: NodeId) {
        let Some(reg) = self.node_mut(id).z_registry.take() else {
            return;
        };
        for member in reg.members {
            self.node_mut(member).z_parent = None;
            if self.node(member).attached {
                self.register_z_member(member);
            }
        }
    }

    fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = self.node(node).parent;
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.node(c).parent;
        }
        false
    }

    // ----- render-to-texture -----

    pub fn set_render_to_texture(&mut self, id: NodeId, enabled: bool, lazy: bool) {
        let was_context = self.node(id).is_z_context(id == self.root);
        {
            let node = self.node_mut(id);
            let tx = node
                .texturizer
                .get_or_insert_with(|| Box::new(Texturizer::new()));
            tx.enabled = enabled;
            tx.lazy = lazy;
            tx.cache_valid = false;
        }
        if !enabled {
            self.release_texturizer_targets(id);
        }
        let now_context = self.node(id).is_z_context(id == self.root);
        if was_context != now_context {
            if now_context {
                self.enable_z_context(id);
            } else {
                self.disable_z_context(id);
            }
        }
        self.invalidate(id);
    }

    pub fn add_filter(&mut self, id: NodeId, filter: Box<dyn Filter>) {
        let was_context = self.node(id).is_z_context(id == self.root);
        self.node_mut(id)
            .texturizer
            .get_or_insert_with(|| Box::new(Texturizer::new()))
            .filters
            .push(filter);
        if !was_context && self.node(id).is_z_context(id == self.root) {
            self.enable_z_context(id);
        }
        self.invalidate(id);
    }

    pub fn clear_filters(&mut self, id: NodeId) {
        let was_context = self.node(id).is_z_context(id == self.root);
        let mut emptied = false;
        let mut filter_target = None;
        if let Some(tx) = self.node_mut(id).texturizer.as_deref_mut() {
            tx.filters.clear();
            emptied = !tx.enabled;
            // No filter pass will touch it again; the capture target
            // stays held while the capture itself remains enabled.
            filter_target = tx.filter_target.take();
        }
        if let Some(target) = filter_target {
            self.target_pool.release(target);
        }
        if emptied {
            self.release_texturizer_targets(id);
        }
        if was_context && !self.node(id).is_z_context(id == self.root) {
            self.disable_z_context(id);
        }
        self.invalidate(id);
    }

    /// This node's offscreen-rendered content as an ordinary texture, once
    /// a frame has produced it.
    pub fn result_texture(&self, id: NodeId) -> Option<TextureHandle> {
        self.node(id).texturizer.as_ref().and_then(|tx| tx.result)
    }

    fn release_texturizer_targets(&mut self, id: NodeId) {
        let released = self
            .node_mut(id)
            .texturizer
            .as_deref_mut()
            .map(|tx| tx.release_targets())
            .unwrap_or_default();
        for target in released {
            self.target_pool.release(target);
        }
    }

    // ----- textures -----

    /// Register a source the external loader is working on.
    pub fn create_texture(&mut self) -> TextureId {
        self.textures.create()
    }

    /// Loader callback: the source finished; subscribed nodes re-run their
    /// dimension and coordinate updates next frame.
    pub fn texture_loaded(&mut self, id: TextureId, handle: TextureHandle, width: u32, height: u32) {
        self.textures.mark_loaded(id, handle, width, height);
        if !self.textures.get(id).subscribers.is_empty() {
            self.try_atlas(id);
        }
        let subscribers = self.textures.get(id).subscribers.clone();
        for node in subscribers {
            self.derive_dimensions(node, id);
            self.mark_dirty(node, Dirty::DIMENSIONS);
        }
    }

    /// Loader callback: loading failed; subscribed nodes render textureless
    /// until a new source is set.
    pub fn texture_failed(&mut self, id: TextureId) {
        log::debug!("texture source {:?} failed to load", id);
        self.textures.mark_failed(id);
        let subscribers = self.textures.get(id).subscribers.clone();
        for node in subscribers {
            self.invalidate(node);
        }
    }

    fn try_atlas(&mut self, id: TextureId) {
        let source = self.textures.get(id);
        let Some(handle) = source.handle else {
            return;
        };
        let (w, h) = (source.width, source.height);
        if TextureAtlasPacker::eligible(w, h) && self.atlas.get(handle).is_none() {
            // Failure leaves the texture drawn via its own bind.
            self.atlas.add(handle, w, h);
        }
    }

    fn release_atlas_entry(&mut self, id: TextureId) {
        if let Some(handle) = self.textures.get(id).handle {
            self.atlas.remove(handle);
        }
    }

    // ----- invalidation -----

    /// Mark dirty bits on a node and walk to the root setting the
    /// branch-pending flag and invalidating lazy capture caches.
    pub(crate) fn mark_dirty(&mut self, id: NodeId, bits: Dirty) {
        self.node_mut(id).dirty |= bits;
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.node_mut(c);
            node.branch_pending = true;
            if let Some(tx) = node.texturizer.as_deref_mut() {
                tx.cache_valid = false;
            }
            cur = node.parent;
        }
    }

    /// Re-render without recomputing coordinates (color/texture changes).
    fn invalidate(&mut self, id: NodeId) {
        self.mark_dirty(id, Dirty::empty());
    }

    pub(crate) fn next_visit_order(&mut self) -> u64 {
        self.visit_counter += 1;
        self.visit_counter
    }

    // ----- frame tick -----

    /// One frame: atlas maintenance, update pass, render pass.
    pub fn frame(&mut self) -> FrameOutput {
        self.frame_counter += 1;
        if self.atlas.maintain(self.frame_counter) {
            log::debug!("atlas defragmented on frame {}", self.frame_counter);
        }
        self.run_update();
        self.run_render()
    }

    // ----- inspection (tests and diagnostics) -----

    pub fn world_context(&self, id: NodeId) -> CoordContext {
        self.node(id).world
    }

    pub fn render_context(&self, id: NodeId) -> CoordContext {
        let node = self.node(id);
        if node.render_is_world {
            node.world
        } else {
            node.render
        }
    }

    pub fn visit_order(&self, id: NodeId) -> u64 {
        self.node(id).visit_order
    }

    /// Dirty bits consumed at this node's last update visit, including
    /// bits inherited from ancestors.
    pub fn consumed_dirty(&self, id: NodeId) -> Dirty {
        self.node(id).frame_dirty
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).attached
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    #[cfg(test)]
    pub(crate) fn z_registry(&self, id: NodeId) -> Option<&ZRegistry> {
        self.node(id).z_registry.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_follows_tree_membership() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        let b = stage.create_node();
        stage.add_child(a, b);
        assert!(!stage.is_attached(b));
        stage.add_child(stage.root(), a);
        assert!(stage.is_attached(a));
        assert!(stage.is_attached(b));
        stage.remove_child(a);
        assert!(!stage.is_attached(b));
    }

    #[test]
    fn clearing_filters_releases_the_filter_target() {
        use crate::filter::BlurFilter;

        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.set_dimensions(a, 64.0, 64.0);
        stage.set_rect(a, true);
        stage.set_render_to_texture(a, true, false);
        stage.add_filter(a, Box::new(BlurFilter::new(2.0)));
        stage.frame();

        let tx = stage.node(a).texturizer.as_ref().unwrap();
        assert!(tx.render_target.is_some());
        assert!(tx.filter_target.is_some());

        stage.clear_filters(a);
        let tx = stage.node(a).texturizer.as_ref().unwrap();
        assert!(tx.render_target.is_some());
        assert!(tx.filter_target.is_none());
    }

    #[test]
    fn texture_subscription_tracks_attachment() {
        let mut stage = Stage::new(800, 600);
        let tex = stage.create_texture();
        stage.texture_loaded(tex, TextureHandle(42), 16, 16);
        let a = stage.create_node();
        stage.set_texture(a, Some(tex));
        assert!(stage.textures.get(tex).subscribers.is_empty());
        stage.add_child(stage.root(), a);
        assert_eq!(stage.textures.get(tex).subscribers.len(), 1);
        stage.destroy_node(a);
        assert!(stage.textures.get(tex).subscribers.is_empty());
    }

    #[test]
    fn loaded_small_texture_enters_atlas() {
        let mut stage = Stage::new(800, 600);
        let tex = stage.create_texture();
        let a = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.set_texture(a, Some(tex));
        stage.texture_loaded(tex, TextureHandle(42), 16, 16);
        assert!(stage.atlas.get(TextureHandle(42)).is_some());
        // Oversized sources stay out.
        let big = stage.create_texture();
        let b = stage.create_node();
        stage.add_child(stage.root(), b);
        stage.set_texture(b, Some(big));
        stage.texture_loaded(big, TextureHandle(43), 512, 512);
        assert!(stage.atlas.get(TextureHandle(43)).is_none());
    }

    #[test]
    fn z_member_registers_with_nearest_context() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        let b = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.add_child(a, b);
        stage.set_z_index(b, 3);
        assert_eq!(stage.node(b).z_parent, Some(stage.root()));
        let reg = stage.z_registry(stage.root()).unwrap();
        assert_eq!(reg.usage(), 1);
        // Items were seeded with the root's direct children.
        assert!(reg.items.contains(&a));
        assert!(reg.items.contains(&b));
    }

    #[test]
    fn enabling_a_context_captures_descendant_members() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        let b = stage.create_node();
        let c = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.add_child(stage.root(), c);
        stage.add_child(a, b);
        stage.set_z_index(b, 3);
        stage.set_z_index(c, 1);
        assert_eq!(stage.z_registry(stage.root()).unwrap().usage(), 2);

        // a becomes a boundary; b (a descendant) moves down, c stays.
        stage.set_force_z_context(a, true);
        assert_eq!(stage.node(b).z_parent, Some(a));
        assert_eq!(stage.node(c).z_parent, Some(stage.root()));
        assert_eq!(stage.z_registry(stage.root()).unwrap().usage(), 1);
        assert_eq!(stage.z_registry(a).unwrap().usage(), 1);

        // Disabling hands b back up.
        stage.set_force_z_context(a, false);
        assert_eq!(stage.node(b).z_parent, Some(stage.root()));
        assert_eq!(stage.z_registry(stage.root()).unwrap().usage(), 2);
    }

    #[test]
    fn zero_z_index_deregisters() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.set_z_index(a, 5);
        assert_eq!(stage.z_registry(stage.root()).unwrap().usage(), 1);
        stage.set_z_index(a, 0);
        assert_eq!(stage.z_registry(stage.root()).unwrap().usage(), 0);
        assert_eq!(stage.node(a).z_parent, None);
    }

    #[test]
    fn cycle_rejected() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        let b = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.add_child(a, b);
        stage.add_child(b, a);
        assert_eq!(stage.node(a).parent, Some(stage.root()));
    }
}
