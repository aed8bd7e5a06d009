//! Quad batching into a shared vertex buffer.
//!
//! Every visible node contributes one quad (four interleaved vertices).
//! Consecutive quads with the same bound texture, scissor, and shader are
//! merged into a single run so the backend issues one draw call per run.

use wgpu::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

use crate::geometry::Rect;
use crate::texture::TextureHandle;

use super::ShaderKind;

/// Default quad capacity of the shared buffer (64k vertices).
pub const MAX_QUADS: usize = 16384;

/// One corner of a quad: position in target-local pixels, a packed pair of
/// 16-bit-normalized texture coordinates, and a packed premultiplied RGBA
/// color.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: u32,
    pub color: u32,
}

impl QuadVertex {
    pub fn desc() -> VertexBufferLayout<'static> {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    offset: 8,
                    shader_location: 1,
                    format: VertexFormat::Unorm16x2,
                },
                VertexAttribute {
                    offset: 12,
                    shader_location: 2,
                    format: VertexFormat::Unorm8x4,
                },
            ],
        }
    }
}

/// Pack normalized texture coordinates into two 16-bit-normalized lanes.
#[inline]
pub fn pack_uv(u: f32, v: f32) -> u32 {
    let ui = (u.clamp(0.0, 1.0) * 65535.0 + 0.5) as u32;
    let vi = (v.clamp(0.0, 1.0) * 65535.0 + 0.5) as u32;
    ui | (vi << 16)
}

/// The standard full-texture corner coordinates, in emit order
/// (top-left, top-right, bottom-right, bottom-left).
pub fn full_uvs() -> [u32; 4] {
    [
        pack_uv(0.0, 0.0),
        pack_uv(1.0, 0.0),
        pack_uv(1.0, 1.0),
        pack_uv(0.0, 1.0),
    ]
}

/// A contiguous range of quads sharing texture, scissor, and shader —
/// exactly one GPU draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadRun {
    pub texture: TextureHandle,
    pub scissor: Option<Rect>,
    pub shader: ShaderKind,
    pub params: [f32; 4],
    pub first_quad: u32,
    pub quad_count: u32,
}

/// Accumulates quads and groups them into runs.
#[derive(Debug)]
pub struct QuadBatcher {
    vertices: Vec<QuadVertex>,
    runs: Vec<QuadRun>,
    max_quads: usize,
    /// Runs before this index belong to earlier render passes and must
    /// never merge with new quads.
    barrier: usize,
    overflowed: bool,
}

impl QuadBatcher {
    pub fn new(max_quads: usize) -> Self {
        Self {
            vertices: Vec::new(),
            runs: Vec::new(),
            max_quads,
            barrier: 0,
            overflowed: false,
        }
    }

    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn runs(&self) -> &[QuadRun] {
        &self.runs
    }

    pub fn vertices(&self) -> &[QuadVertex] {
        &self.vertices
    }

    /// Mark a render-pass boundary: quads pushed after this never merge
    /// into runs created before it.
    pub fn set_barrier(&mut self) {
        self.barrier = self.runs.len();
    }

    /// Append one quad. Returns false (and drops the quad) when the shared
    /// buffer is full; rendering degrades rather than reallocating
    /// mid-frame.
    #[allow(clippy::too_many_arguments)]
    pub fn push_quad(
        &mut self,
        corners: &[(f32, f32); 4],
        uvs: &[u32; 4],
        colors: &[u32; 4],
        texture: TextureHandle,
        scissor: Option<Rect>,
        shader: ShaderKind,
        params: [f32; 4],
    ) -> bool {
        if self.quad_count() >= self.max_quads {
            if !self.overflowed {
                log::warn!(
                    "quad buffer full ({} quads); dropping further quads this frame",
                    self.max_quads
                );
                self.overflowed = true;
            }
            return false;
        }

        let first_quad = self.quad_count() as u32;
        for i in 0..4 {
            self.vertices.push(QuadVertex {
                position: [corners[i].0, corners[i].1],
                uv: uvs[i],
                color: colors[i],
            });
        }

        // Merge with the previous run when every piece of bind state
        // matches; adjacent runs with identical state must not exist.
        if self.runs.len() > self.barrier {
            if let Some(last) = self.runs.last_mut() {
                if last.texture == texture
                    && last.scissor == scissor
                    && last.shader == shader
                    && last.params == params
                {
                    last.quad_count += 1;
                    return true;
                }
            }
        }

        self.runs.push(QuadRun {
            texture,
            scissor,
            shader,
            params,
            first_quad,
            quad_count: 1,
        });
        true
    }

    /// Discard everything pushed at or after the given marks (used to
    /// undo a speculative render-to-texture capture).
    pub fn rollback(&mut self, quad_mark: usize, run_mark: usize) {
        self.vertices.truncate(quad_mark * 4);
        self.runs.truncate(run_mark);
        self.barrier = self.barrier.min(self.runs.len());
    }

    pub fn take(self) -> (Vec<QuadVertex>, Vec<QuadRun>) {
        (self.vertices, self.runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORNERS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

    fn push(batcher: &mut QuadBatcher, texture: u32) -> bool {
        batcher.push_quad(
            &CORNERS,
            &full_uvs(),
            &[0xFFFF_FFFF; 4],
            TextureHandle(texture),
            None,
            ShaderKind::Default,
            [0.0; 4],
        )
    }

    #[test]
    fn same_texture_merges_into_one_run() {
        let mut b = QuadBatcher::new(64);
        for _ in 0..5 {
            push(&mut b, 3);
        }
        assert_eq!(b.quad_count(), 5);
        assert_eq!(b.run_count(), 1);
        assert_eq!(b.runs()[0].quad_count, 5);
    }

    #[test]
    fn no_adjacent_runs_share_a_texture() {
        let mut b = QuadBatcher::new(64);
        for texture in [3, 3, 4, 4, 3, 5, 5, 5] {
            push(&mut b, texture);
        }
        let runs = b.runs();
        assert_eq!(runs.len(), 4);
        for pair in runs.windows(2) {
            assert_ne!(pair[0].texture, pair[1].texture);
        }
        assert_eq!(
            runs.iter().map(|r| r.quad_count).sum::<u32>(),
            b.quad_count() as u32
        );
    }

    #[test]
    fn scissor_change_breaks_run() {
        let mut b = QuadBatcher::new(64);
        push(&mut b, 3);
        b.push_quad(
            &CORNERS,
            &full_uvs(),
            &[0xFFFF_FFFF; 4],
            TextureHandle(3),
            Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
            ShaderKind::Default,
            [0.0; 4],
        );
        assert_eq!(b.run_count(), 2);
    }

    #[test]
    fn barrier_prevents_merge_across_passes() {
        let mut b = QuadBatcher::new(64);
        push(&mut b, 3);
        b.set_barrier();
        push(&mut b, 3);
        assert_eq!(b.run_count(), 2);
    }

    #[test]
    fn capacity_overflow_drops_quads() {
        let mut b = QuadBatcher::new(2);
        assert!(push(&mut b, 1));
        assert!(push(&mut b, 1));
        assert!(!push(&mut b, 1));
        assert_eq!(b.quad_count(), 2);
    }

    #[test]
    fn rollback_restores_marks() {
        let mut b = QuadBatcher::new(64);
        push(&mut b, 1);
        let quads = b.quad_count();
        let runs = b.run_count();
        push(&mut b, 2);
        push(&mut b, 2);
        b.rollback(quads, runs);
        assert_eq!(b.quad_count(), 1);
        assert_eq!(b.run_count(), 1);
    }

    #[test]
    fn pack_uv_endpoints() {
        assert_eq!(pack_uv(0.0, 0.0), 0);
        assert_eq!(pack_uv(1.0, 1.0), 0xFFFF_FFFF);
        assert_eq!(pack_uv(1.0, 0.0), 0x0000_FFFF);
    }
}
