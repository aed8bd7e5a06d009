//! Render-to-texture state attached to a node.
//!
//! A texturizer redirects the node's subtree into an offscreen target,
//! optionally runs a filter chain over the capture, and exposes the result
//! as an ordinary texture. With the `lazy` flag set, a static subtree keeps
//! its cached capture and skips the GPU round-trip entirely.

use crate::filter::Filter;
use crate::renderer::TargetSpec;
use crate::texture::TextureHandle;

#[derive(Debug, Default)]
pub struct Texturizer {
    pub(crate) enabled: bool,
    /// Reuse the cached capture while the subtree is unchanged.
    pub(crate) lazy: bool,
    pub(crate) filters: Vec<Box<dyn Filter>>,
    /// Capture destination, held across frames while active.
    pub(crate) render_target: Option<TargetSpec>,
    /// Final filter-chain destination, separate from the capture target.
    pub(crate) filter_target: Option<TargetSpec>,
    /// The cached capture is still valid (lazy mode, no subtree changes
    /// since it was taken).
    pub(crate) cache_valid: bool,
    /// Decided during the update pass; the render pass only reads it.
    pub(crate) active: bool,
    /// Texture holding this node's rendered content, for `result_texture`.
    pub(crate) result: Option<TextureHandle>,
}

impl Texturizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything here forces an offscreen pass this frame: an
    /// unconditional (non-lazy) capture, a lazy capture whose cache went
    /// stale, or at least one filter doing real work.
    pub(crate) fn must_render_to_texture(&self) -> bool {
        if self.enabled && (!self.lazy || !self.cache_valid) {
            return true;
        }
        self.filters.iter().any(|f| !f.is_noop())
    }

    /// Filters that currently do something, in application order.
    pub(crate) fn active_filters(&self) -> Vec<(crate::renderer::ShaderKind, [f32; 4])> {
        self.filters
            .iter()
            .filter(|f| !f.is_noop())
            .map(|f| (f.shader(), f.params()))
            .collect()
    }

    pub(crate) fn in_use(&self) -> bool {
        self.enabled || !self.filters.is_empty()
    }

    /// Drop held targets, returning them for release back to the pool.
    /// Called on disable, zero-size, and node destruction.
    pub(crate) fn release_targets(&mut self) -> Vec<TargetSpec> {
        self.cache_valid = false;
        self.result = None;
        self.render_target
            .take()
            .into_iter()
            .chain(self.filter_target.take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{BlurFilter, GrayscaleFilter};

    #[test]
    fn eager_capture_always_renders() {
        let tx = Texturizer {
            enabled: true,
            ..Texturizer::default()
        };
        assert!(tx.must_render_to_texture());
    }

    #[test]
    fn lazy_capture_skips_when_cache_valid() {
        let mut tx = Texturizer {
            enabled: true,
            lazy: true,
            ..Texturizer::default()
        };
        assert!(tx.must_render_to_texture());
        tx.cache_valid = true;
        assert!(!tx.must_render_to_texture());
    }

    #[test]
    fn noop_filters_do_not_force_capture() {
        let mut tx = Texturizer::default();
        tx.filters.push(Box::new(BlurFilter::new(0.0)));
        assert!(!tx.must_render_to_texture());
        tx.filters.push(Box::new(GrayscaleFilter::new(0.5)));
        assert!(tx.must_render_to_texture());
        assert_eq!(tx.active_filters().len(), 1);
    }

    #[test]
    fn release_returns_held_targets() {
        let mut tx = Texturizer {
            enabled: true,
            render_target: Some(TargetSpec {
                handle: TextureHandle(9),
                width: 10,
                height: 10,
            }),
            filter_target: Some(TargetSpec {
                handle: TextureHandle(10),
                width: 10,
                height: 10,
            }),
            cache_valid: true,
            ..Texturizer::default()
        };
        let released = tx.release_targets();
        assert_eq!(released.len(), 2);
        assert!(tx.render_target.is_none());
        assert!(!tx.cache_valid);
        assert!(tx.release_targets().is_empty());
    }
}
