//! Pooling of offscreen render targets.
//!
//! Render-to-texture and filter passes churn through same-sized targets
//! every frame; the pool hands released targets back out instead of letting
//! the executor allocate fresh GPU textures each time. Reuse is exact-size
//! only.

use crate::texture::{HandleAllocator, TextureHandle};

use super::TargetSpec;

/// Upper bound on pooled (idle) targets; beyond this, released targets are
/// dropped and their GPU textures freed.
const MAX_POOLED: usize = 32;

/// Allocates and recycles offscreen target textures by exact dimensions.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    free: Vec<TargetSpec>,
    /// Handles whose GPU textures the executor should destroy.
    retired: Vec<TextureHandle>,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a target of exactly `width`×`height` pixels, reusing a
    /// released one when available.
    pub fn acquire(
        &mut self,
        alloc: &mut HandleAllocator,
        width: u32,
        height: u32,
    ) -> TargetSpec {
        if let Some(pos) = self
            .free
            .iter()
            .position(|t| t.width == width && t.height == height)
        {
            return self.free.swap_remove(pos);
        }
        TargetSpec {
            handle: alloc.alloc(),
            width,
            height,
        }
    }

    /// Return a target to the pool. Past the pool cap the target is retired
    /// instead; a cap this low being hit usually means targets leak.
    pub fn release(&mut self, target: TargetSpec) {
        if self.free.len() >= MAX_POOLED {
            log::error!(
                "render target pool full ({} idle); destroying {}x{} target",
                MAX_POOLED,
                target.width,
                target.height
            );
            self.retired.push(target.handle);
            return;
        }
        self.free.push(target);
    }

    /// Handles retired since the last call, for the executor to free.
    pub fn drain_retired(&mut self) -> Vec<TextureHandle> {
        std::mem::take(&mut self.retired)
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_target_is_reused() {
        let mut alloc = HandleAllocator::new();
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut alloc, 128, 64);
        pool.release(a);
        let b = pool.acquire(&mut alloc, 128, 64);
        assert_eq!(a.handle, b.handle);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn different_size_gets_fresh_handle() {
        let mut alloc = HandleAllocator::new();
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut alloc, 128, 64);
        pool.release(a);
        let b = pool.acquire(&mut alloc, 64, 128);
        assert_ne!(a.handle, b.handle);
        // The 128x64 target stays pooled.
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn overflow_retires_handles() {
        let mut alloc = HandleAllocator::new();
        let mut pool = RenderTargetPool::new();
        let targets: Vec<_> = (0..MAX_POOLED + 2)
            .map(|_| pool.acquire(&mut alloc, 10, 10))
            .collect();
        for t in targets {
            pool.release(t);
        }
        assert_eq!(pool.idle_count(), MAX_POOLED);
        assert_eq!(pool.drain_retired().len(), 2);
        assert!(pool.drain_retired().is_empty());
    }
}
