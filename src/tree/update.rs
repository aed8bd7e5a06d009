//! The per-frame update pass: incremental recomputation of coordinate
//! contexts, scissors, and render-to-texture decisions.
//!
//! Only branches with pending work are visited. Dirty bits inherit
//! downward (a moved ancestor moves every descendant), the consumed set is
//! kept on each node for the render pass, and z-sorting is deferred to
//! render time.

use crate::geometry::Rect;

use super::context::CoordContext;
use super::stage::Stage;
use super::{Dirty, NodeId};

/// World alpha below this is clamped to zero so float noise cannot leave a
/// node in a false-visible state.
const ALPHA_EPSILON: f32 = 1e-5;

/// Parent-side state handed down the recursion.
struct UpdateFrame {
    world: CoordContext,
    render: CoordContext,
    /// The render context mirrors the world context (no render-to-texture
    /// ancestor below the current render root).
    render_is_world: bool,
    scissor: Option<Rect>,
    inherited: Dirty,
    /// The parent starts a fresh capture this frame: children ignore the
    /// inherited scissor and re-root their render context.
    fresh_capture: bool,
}

impl Stage {
    pub(crate) fn run_update(&mut self) {
        let frame = UpdateFrame {
            world: CoordContext::IDENTITY,
            render: CoordContext::IDENTITY,
            render_is_world: true,
            scissor: None,
            inherited: Dirty::empty(),
            fresh_capture: false,
        };
        self.update_node(self.root(), &frame);
    }

    fn update_node(&mut self, id: NodeId, parent: &UpdateFrame) {
        let combined = self.node(id).dirty | parent.inherited;
        if !self.node(id).branch_pending && combined.is_empty() {
            return;
        }

        if combined.intersects(Dirty::TRANSLATE | Dirty::TRANSFORM | Dirty::DIMENSIONS) {
            self.node_mut(id).recompute_local();
        }

        let (local, local_alpha, width, height, clipping) = {
            let node = self.node(id);
            (
                node.local,
                if node.visible { node.alpha } else { 0.0 },
                node.width,
                node.height,
                node.clipping,
            )
        };

        let mut world = parent.world;
        world.alpha = parent.world.alpha * local_alpha;
        if world.alpha < ALPHA_EPSILON {
            world.alpha = 0.0;
        }
        let (px, py) = parent.world.apply_translate(&local);
        let (ta, tb, tc, td) = parent.world.apply_transform(&local);
        world.px = px;
        world.py = py;
        world.ta = ta;
        world.tb = tb;
        world.tc = tc;
        world.td = td;

        // The render-local context only diverges below a capture root;
        // everywhere else it aliases the world context.
        let render_is_world = parent.render_is_world;
        let render = if render_is_world {
            world
        } else {
            let mut render = parent.render;
            render.alpha = parent.render.alpha * local_alpha;
            if render.alpha < ALPHA_EPSILON {
                render.alpha = 0.0;
            }
            let (px, py) = parent.render.apply_translate(&local);
            let (ta, tb, tc, td) = parent.render.apply_transform(&local);
            render.px = px;
            render.py = py;
            render.ta = ta;
            render.tb = tb;
            render.tc = tc;
            render.td = td;
            render
        };

        // Scissor lives in render-local coordinates. A capture root acts
        // as a clean coordinate origin, so its children start unclipped.
        let inherited_scissor = if parent.fresh_capture {
            None
        } else {
            parent.scissor
        };
        let clip_ctx = if render_is_world { world } else { render };
        let mut scissor = inherited_scissor;
        let mut clipped_out = false;
        if clipping && clip_ctx.is_axis_aligned() {
            let own = Rect::new(
                clip_ctx.px,
                clip_ctx.py,
                width * clip_ctx.ta,
                height * clip_ctx.td,
            );
            let clipped = match inherited_scissor {
                Some(outer) => own.intersect(&outer),
                None => own,
            };
            // Empty intersection hides the whole subtree without visiting
            // it at render time; bookkeeping below still runs.
            clipped_out = clipped.is_empty();
            scissor = Some(clipped);
        }

        let mut world = world;
        let mut render = render;
        if clipped_out {
            world.alpha = 0.0;
            render.alpha = 0.0;
        }

        let visit_order = self.next_visit_order();
        let mut captures = false;
        {
            let node = self.node_mut(id);
            node.world = world;
            node.render = if render_is_world { world } else { render };
            node.render_is_world = render_is_world;
            node.scissor = scissor;
            node.visit_order = visit_order;
            node.frame_dirty = combined;
            node.dirty = Dirty::empty();
            node.branch_pending = false;
            if let Some(reg) = node.z_registry.as_deref_mut() {
                reg.sort_pending = true;
            }
            if let Some(tx) = node.texturizer.as_deref_mut() {
                // Zero-size guard: never capture into a degenerate target.
                tx.active = width > 0.0 && height > 0.0 && tx.must_render_to_texture();
                captures = tx.active;
            }
        }

        let child_frame = UpdateFrame {
            world,
            render: if captures {
                CoordContext::IDENTITY
            } else if render_is_world {
                world
            } else {
                render
            },
            render_is_world: render_is_world && !captures,
            scissor,
            inherited: combined.inherited(),
            fresh_capture: captures,
        };
        let children = self.node(id).children.clone();
        for child in children {
            self.update_node(child, &child_frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_full_recompute() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        let b = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.add_child(a, b);
        stage.set_position(a, 10.0, 20.0);
        stage.set_scale(a, 2.0, 2.0);
        stage.set_position(b, 5.0, 5.0);
        stage.set_alpha(a, 0.5);
        stage.run_update();

        let wb = stage.world_context(b);
        assert_eq!((wb.px, wb.py), (20.0, 30.0));
        assert_eq!((wb.ta, wb.td), (2.0, 2.0));
        assert!((wb.alpha - 0.5).abs() < 1e-6);

        // Moving only the parent still updates the child.
        stage.set_position(a, 100.0, 20.0);
        stage.run_update();
        let wb = stage.world_context(b);
        assert_eq!((wb.px, wb.py), (110.0, 30.0));
        // The child consumed an inherited translate, nothing more.
        assert_eq!(stage.consumed_dirty(b), Dirty::TRANSLATE);
    }

    #[test]
    fn clean_branches_are_skipped() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        let b = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.add_child(stage.root(), b);
        stage.run_update();
        let order_b = stage.visit_order(b);

        stage.set_position(a, 1.0, 1.0);
        stage.run_update();
        // b was clean and never visited.
        assert_eq!(stage.visit_order(b), order_b);
        assert!(stage.visit_order(a) > order_b);
    }

    #[test]
    fn tiny_alpha_clamps_to_zero() {
        let mut stage = Stage::new(800, 600);
        let a = stage.create_node();
        stage.add_child(stage.root(), a);
        stage.set_alpha(a, 1e-7);
        stage.run_update();
        assert_eq!(stage.world_context(a).alpha, 0.0);
    }

    #[test]
    fn empty_scissor_intersection_hides_subtree() {
        let mut stage = Stage::new(800, 600);
        let clip = stage.create_node();
        let child = stage.create_node();
        stage.add_child(stage.root(), clip);
        stage.add_child(clip, child);
        stage.set_dimensions(clip, 100.0, 100.0);
        stage.set_clipping(clip, true);
        // Second clipper fully outside the first.
        stage.set_dimensions(child, 50.0, 50.0);
        stage.set_position(child, 200.0, 200.0);
        stage.set_clipping(child, true);
        stage.run_update();
        assert_eq!(stage.world_context(child).alpha, 0.0);

        // The child itself still got visited (visit order advanced).
        assert!(stage.visit_order(child) > stage.visit_order(clip));
    }

    #[test]
    fn rotated_clipper_does_not_scissor() {
        let mut stage = Stage::new(800, 600);
        let clip = stage.create_node();
        stage.add_child(stage.root(), clip);
        stage.set_dimensions(clip, 100.0, 100.0);
        stage.set_clipping(clip, true);
        stage.set_rotation(clip, 0.3);
        stage.run_update();
        assert!(stage.node(clip).scissor.is_none());
    }

    #[test]
    fn capture_root_children_get_identity_render_context() {
        let mut stage = Stage::new(800, 600);
        let rtt = stage.create_node();
        let child = stage.create_node();
        stage.add_child(stage.root(), rtt);
        stage.add_child(rtt, child);
        stage.set_position(rtt, 300.0, 300.0);
        stage.set_dimensions(rtt, 64.0, 64.0);
        stage.set_position(child, 8.0, 8.0);
        stage.set_render_to_texture(rtt, true, false);
        stage.run_update();

        let world = stage.world_context(child);
        assert_eq!((world.px, world.py), (308.0, 308.0));
        let render = stage.render_context(child);
        assert_eq!((render.px, render.py), (8.0, 8.0));
        assert!(!stage.node(child).render_is_world);
    }
}
