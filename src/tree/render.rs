//! The per-frame render pass: quad emission, z-ordered traversal, and
//! render-to-texture capture with filter chains.
//!
//! The pass produces a [`FrameOutput`]: one shared vertex buffer, a flat
//! run list, and the ordered render passes consuming slices of it. No GPU
//! calls happen here; the executor replays the output.

use std::collections::HashSet;

use crate::geometry::Rect;
use crate::renderer::batch::{full_uvs, pack_uv, QuadBatcher, MAX_QUADS};
use crate::renderer::{
    AtlasUpload, FrameOutput, FrameStats, PassTarget, RenderPassDesc, ShaderKind, TargetSpec,
    ATLAS_SIZE,
};
use crate::texture::{TextureHandle, ATLAS_TEXTURE, WHITE_TEXTURE};

use super::context::CoordContext;
use super::stage::Stage;
use super::zcontext::sort_items;
use super::NodeId;

/// Corner position tolerance for the single-quad reuse check.
const REUSE_EPSILON: f32 = 1e-3;

/// Accumulates quads, runs, and render passes while the tree is walked.
struct FrameBuilder {
    batcher: QuadBatcher,
    passes: Vec<RenderPassDesc>,
    targets: Vec<TargetSpec>,
    stack: Vec<PassTarget>,
    current: PassTarget,
    run_start: usize,
    /// Targets already cleared this frame; `None` keys the screen.
    cleared: HashSet<Option<TextureHandle>>,
}

impl FrameBuilder {
    fn new() -> Self {
        Self {
            batcher: QuadBatcher::new(MAX_QUADS),
            passes: Vec::new(),
            targets: Vec::new(),
            stack: Vec::new(),
            current: PassTarget::Screen,
            run_start: 0,
            cleared: HashSet::new(),
        }
    }

    fn target_key(target: PassTarget) -> Option<TextureHandle> {
        match target {
            PassTarget::Screen => None,
            PassTarget::Texture(h) => Some(h),
        }
    }

    /// Close the pass on the current target. `force` records the pass even
    /// without runs so an offscreen target still gets cleared.
    fn record_pass(&mut self, force: bool) {
        let end = self.batcher.run_count();
        let key = Self::target_key(self.current);
        let clear = !self.cleared.contains(&key);
        if end > self.run_start || (force && clear) {
            self.cleared.insert(key);
            self.passes.push(RenderPassDesc {
                target: self.current,
                clear,
                runs: self.run_start..end,
            });
        }
        self.run_start = end;
    }

    /// Redirect subsequent quads into an offscreen target. Entering a
    /// target is a full redraw, so any cleared mark from an earlier write
    /// to the same handle (a previous filter-chain pass, or a pooled
    /// handle re-acquired this frame) is dropped: the first pass clears
    /// again. Only the split continuation of an interrupted capture, which
    /// resumes without re-entering, keeps loading.
    fn begin_target(&mut self, spec: TargetSpec) {
        self.record_pass(false);
        self.stack.push(self.current);
        self.current = PassTarget::Texture(spec.handle);
        self.cleared.remove(&Some(spec.handle));
        if !self.targets.iter().any(|t| t.handle == spec.handle) {
            self.targets.push(spec);
        }
        self.batcher.set_barrier();
    }

    /// Finish the offscreen pass and resume the previous target.
    fn end_target(&mut self) {
        self.record_pass(true);
        self.current = self.stack.pop().unwrap_or(PassTarget::Screen);
        self.batcher.set_barrier();
    }

    /// Undo a speculative capture whose content gets reused directly. Only
    /// valid while no pass was recorded since the matching `begin_target`.
    fn abort_target(&mut self, quad_mark: usize, run_mark: usize) {
        self.batcher.rollback(quad_mark, run_mark);
        self.run_start = run_mark;
        self.current = self.stack.pop().unwrap_or(PassTarget::Screen);
        self.batcher.set_barrier();
    }

    fn quad_count(&self) -> usize {
        self.batcher.quad_count()
    }

    fn run_count(&self) -> usize {
        self.batcher.run_count()
    }

    fn pass_count(&self) -> usize {
        self.passes.len()
    }

    fn finish(mut self, atlas_uploads: Vec<AtlasUpload>, atlas_clear: bool) -> FrameOutput {
        self.record_pass(false);
        // A frame with no screen content still clears the screen.
        if !self.cleared.contains(&None) {
            let end = self.batcher.run_count();
            self.passes.push(RenderPassDesc {
                target: PassTarget::Screen,
                clear: true,
                runs: end..end,
            });
        }
        let (vertices, runs) = self.batcher.take();
        let stats = FrameStats {
            quads: (vertices.len() / 4) as u32,
            runs: runs.len() as u32,
            passes: self.passes.len() as u32,
            atlas_uploads: atlas_uploads.len() as u32,
        };
        FrameOutput {
            vertices,
            runs,
            passes: self.passes,
            targets: self.targets,
            retired: Vec::new(),
            atlas_uploads,
            atlas_clear,
            stats,
        }
    }
}

impl Stage {
    pub(crate) fn run_render(&mut self) -> FrameOutput {
        let mut fb = FrameBuilder::new();
        self.render_node(self.root(), &mut fb);
        let (uploads, cleared) = self.atlas.flush_uploads();
        let mut output = fb.finish(uploads, cleared);
        output.retired = self.target_pool.drain_retired();
        log::debug!(
            "frame: {} quads, {} runs, {} passes",
            output.stats.quads,
            output.stats.runs,
            output.stats.passes
        );
        output
    }

    fn render_node(&mut self, id: NodeId, fb: &mut FrameBuilder) {
        if !self.node(id).alive {
            return;
        }
        let ctx = self.active_context(id);
        if ctx.alpha == 0.0 {
            return;
        }

        // Lazy cache hit: composite the cached texture, skip the subtree.
        // Checked before the capture flag, which can go stale when the
        // update pass skips a clean branch.
        let cached = self.node(id).texturizer.as_ref().and_then(|tx| {
            (tx.enabled && tx.lazy && tx.cache_valid)
                .then_some(tx.result)
                .flatten()
        });
        if let Some(result) = cached {
            self.emit_composite(id, fb, result);
            return;
        }

        let captures = self
            .node(id)
            .texturizer
            .as_ref()
            .map(|tx| tx.active)
            .unwrap_or(false);
        if captures {
            self.render_captured(id, fb);
            return;
        }

        self.emit_node_quad(id, fb);
        self.render_children(id, fb);
    }

    fn active_context(&self, id: NodeId) -> CoordContext {
        let node = self.node(id);
        if node.render_is_world {
            node.world
        } else {
            node.render
        }
    }

    /// Children in paint order: the z item list when this context has live
    /// members, plain tree order otherwise. Plain traversal skips nodes
    /// registered with a z-context; those render at their context's level.
    fn render_children(&mut self, id: NodeId, fb: &mut FrameBuilder) {
        let has_z = self
            .node(id)
            .z_registry
            .as_ref()
            .map(|reg| reg.usage() > 0)
            .unwrap_or(false);
        if has_z {
            let reg = self.node_mut(id).z_registry.as_deref_mut().unwrap();
            let mut items = std::mem::take(&mut reg.items);
            let needs_sort = reg.sort_pending;
            if needs_sort {
                let nodes = &self.nodes;
                sort_items(&mut items, |n| {
                    let node = &nodes[n.idx()];
                    (node.z_index, node.visit_order)
                });
            }
            for &item in &items {
                self.render_node(item, fb);
            }
            if let Some(reg) = self.node_mut(id).z_registry.as_deref_mut() {
                reg.items = items;
                reg.sort_pending = false;
            }
        } else {
            let children = self.node(id).children.clone();
            for child in children {
                if self.node(child).z_parent.is_some() {
                    continue;
                }
                self.render_node(child, fb);
            }
        }
    }

    /// Capture the subtree into an offscreen target, run the filter chain,
    /// and composite the result back into the outer pass.
    fn render_captured(&mut self, id: NodeId, fb: &mut FrameBuilder) {
        let (width, height) = {
            let node = self.node(id);
            (node.width.ceil() as u32, node.height.ceil() as u32)
        };
        // Guarded during update, but a setter may have raced the passes.
        if width == 0 || height == 0 {
            return;
        }

        let mut tx = match self.node_mut(id).texturizer.take() {
            Some(tx) => tx,
            None => return,
        };

        // Reuse the held capture target when dimensions still match.
        let target = match tx.render_target.take() {
            Some(t) if t.width == width && t.height == height => t,
            old => {
                if let Some(old) = old {
                    self.target_pool.release(old);
                }
                self.target_pool
                    .acquire(&mut self.handles, width, height)
            }
        };

        fb.begin_target(target);
        let quad_mark = fb.quad_count();
        let run_mark = fb.run_count();
        let pass_mark = fb.pass_count();

        // Captured coordinates are local to the target: the node's own
        // quad lands at the origin, children follow their render contexts.
        let capture_ctx = CoordContext::IDENTITY;
        self.emit_quad_with(id, fb, capture_ctx, None);
        self.render_children(id, fb);

        let captured = fb.quad_count() - quad_mark;
        let reusable = captured == 1
            && fb.run_count() - run_mark == 1
            && fb.pass_count() == pass_mark
            && self.single_quad_covers_target(fb, quad_mark, run_mark, width, height);

        let capture_handle = if reusable {
            let handle = fb.batcher.runs()[run_mark].texture;
            fb.abort_target(quad_mark, run_mark);
            self.target_pool.release(target);
            handle
        } else {
            fb.end_target();
            tx.render_target = Some(target);
            target.handle
        };

        // Filter chain: 0 passes through, 1 writes straight into the
        // filter target, 2+ ping-pong so the last pass lands there.
        let filters = tx.active_filters();
        let result = if filters.is_empty() {
            capture_handle
        } else {
            let filter_target = match tx.filter_target.take() {
                Some(t) if t.width == width && t.height == height => t,
                old => {
                    if let Some(old) = old {
                        self.target_pool.release(old);
                    }
                    self.target_pool
                        .acquire(&mut self.handles, width, height)
                }
            };
            let final_handle = if filters.len() == 1 {
                self.emit_filter_pass(fb, capture_handle, filter_target, width, height, filters[0]);
                filter_target.handle
            } else {
                let scratch = self.target_pool.acquire(&mut self.handles, width, height);
                let targets = [filter_target, scratch];
                let count = filters.len();
                let mut src = capture_handle;
                for (i, &filter) in filters.iter().enumerate() {
                    let dst = targets[(count - 1 - i) % 2];
                    self.emit_filter_pass(fb, src, dst, width, height, filter);
                    src = dst.handle;
                }
                self.target_pool.release(scratch);
                filter_target.handle
            };
            tx.filter_target = Some(filter_target);
            final_handle
        };

        tx.result = Some(result);
        if tx.lazy {
            tx.cache_valid = true;
        }
        self.node_mut(id).texturizer = Some(tx);

        self.emit_composite(id, fb, result);
    }

    /// One full-target pass applying a filter from `src` into `dst`.
    fn emit_filter_pass(
        &mut self,
        fb: &mut FrameBuilder,
        src: TextureHandle,
        dst: TargetSpec,
        width: u32,
        height: u32,
        (shader, params): (ShaderKind, [f32; 4]),
    ) {
        fb.begin_target(dst);
        let (w, h) = (width as f32, height as f32);
        fb.batcher.push_quad(
            &[(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)],
            &full_uvs(),
            &[0xFFFF_FFFF; 4],
            src,
            None,
            shader,
            params,
        );
        fb.end_target();
    }

    /// Composite a node's captured/filtered result as one textured quad in
    /// the outer coordinate system, with only the context alpha applied
    /// (the node's own colors were baked into the capture).
    fn emit_composite(&mut self, id: NodeId, fb: &mut FrameBuilder, result: TextureHandle) {
        let ctx = self.active_context(id);
        let (width, height, scissor) = {
            let node = self.node(id);
            (node.width, node.height, node.scissor)
        };
        let corners = quad_corners(&ctx, width, height);
        let color = crate::color::Color::WHITE.premultiplied(ctx.alpha);
        fb.batcher.push_quad(
            &corners,
            &full_uvs(),
            &[color; 4],
            result,
            scissor,
            ShaderKind::Default,
            [0.0; 4],
        );
    }

    fn emit_node_quad(&mut self, id: NodeId, fb: &mut FrameBuilder) {
        let ctx = self.active_context(id);
        let scissor = self.node(id).scissor;
        self.emit_quad_with(id, fb, ctx, scissor);
    }

    /// Emit this node's own quad (if it displays anything) under an
    /// explicit context.
    fn emit_quad_with(
        &mut self,
        id: NodeId,
        fb: &mut FrameBuilder,
        ctx: CoordContext,
        scissor: Option<Rect>,
    ) {
        let node = self.node(id);
        if node.width <= 0.0 || node.height <= 0.0 {
            return;
        }

        let (texture, uvs) = if let Some(tid) = node.texture {
            let source = self.textures.get(tid);
            let Some(handle) = source.handle else {
                // Still loading or failed: textureless until further
                // notice.
                return;
            };
            match self.atlas.get(handle) {
                Some(region) => (ATLAS_TEXTURE, atlas_uvs(region)),
                None => (handle, full_uvs()),
            }
        } else if node.rect {
            let Some(white) = self.atlas.get(WHITE_TEXTURE) else {
                return;
            };
            let u = (white.x as f32 + 0.5) / ATLAS_SIZE as f32;
            let v = (white.y as f32 + 0.5) / ATLAS_SIZE as f32;
            (ATLAS_TEXTURE, [pack_uv(u, v); 4])
        } else {
            return;
        };

        let corners = quad_corners(&ctx, node.width, node.height);
        let colors = [
            node.colors[0].premultiplied(ctx.alpha),
            node.colors[1].premultiplied(ctx.alpha),
            node.colors[2].premultiplied(ctx.alpha),
            node.colors[3].premultiplied(ctx.alpha),
        ];
        fb.batcher.push_quad(
            &corners,
            &uvs,
            &colors,
            texture,
            scissor,
            ShaderKind::Default,
            [0.0; 4],
        );
    }

    /// Whether the single captured quad exactly fills the target with
    /// untinted corners and full-range texture coordinates, allowing its
    /// texture to stand in for the capture.
    fn single_quad_covers_target(
        &self,
        fb: &FrameBuilder,
        quad_mark: usize,
        run_mark: usize,
        width: u32,
        height: u32,
    ) -> bool {
        let run = &fb.batcher.runs()[run_mark];
        if run.shader != ShaderKind::Default || run.texture == ATLAS_TEXTURE {
            return false;
        }
        let verts = &fb.batcher.vertices()[quad_mark * 4..quad_mark * 4 + 4];
        let (w, h) = (width as f32, height as f32);
        let expected = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        let full = full_uvs();
        verts.iter().enumerate().all(|(i, vert)| {
            (vert.position[0] - expected[i].0).abs() <= REUSE_EPSILON
                && (vert.position[1] - expected[i].1).abs() <= REUSE_EPSILON
                && vert.color == 0xFFFF_FFFF
                && vert.uv == full[i]
        })
    }
}

fn quad_corners(ctx: &CoordContext, width: f32, height: f32) -> [(f32, f32); 4] {
    if ctx.is_axis_aligned() {
        // Cheap path: derive the far corner from the diagonal scale.
        let right = ctx.px + width * ctx.ta;
        let bottom = ctx.py + height * ctx.td;
        [
            (ctx.px, ctx.py),
            (right, ctx.py),
            (right, bottom),
            (ctx.px, bottom),
        ]
    } else {
        [
            ctx.transform_point(0.0, 0.0),
            ctx.transform_point(width, 0.0),
            ctx.transform_point(width, height),
            ctx.transform_point(0.0, height),
        ]
    }
}

fn atlas_uvs(region: crate::renderer::atlas::AtlasRegion) -> [u32; 4] {
    let size = ATLAS_SIZE as f32;
    let u0 = region.x as f32 / size;
    let v0 = region.y as f32 / size;
    let u1 = (region.x + region.width) as f32 / size;
    let v1 = (region.y + region.height) as f32 / size;
    [
        pack_uv(u0, v0),
        pack_uv(u1, v0),
        pack_uv(u1, v1),
        pack_uv(u0, v1),
    ]
}
