//! Coordinate contexts propagated down the tree.
//!
//! A context is the accumulated alpha, translation and 2×2 transform at a
//! node. Every node carries a world context; a second render-local context
//! only diverges from it below a render-to-texture ancestor (captured
//! coordinates are local to the offscreen target, not the screen).

use crate::transform::LocalTransform;

/// Accumulated transform state at a node: alpha, translation and the 2×2
/// linear part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordContext {
    pub alpha: f32,
    pub px: f32,
    pub py: f32,
    pub ta: f32,
    pub tb: f32,
    pub tc: f32,
    pub td: f32,
}

impl CoordContext {
    pub const IDENTITY: Self = Self {
        alpha: 1.0,
        px: 0.0,
        py: 0.0,
        ta: 1.0,
        tb: 0.0,
        tc: 0.0,
        td: 1.0,
    };

    /// No shear/rotation component: quad corners can be derived from width
    /// and height directly instead of four matrix multiplications.
    pub fn is_axis_aligned(&self) -> bool {
        self.tb == 0.0 && self.tc == 0.0
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.px + self.ta * x + self.tb * y,
            self.py + self.tc * x + self.td * y,
        )
    }

    /// Child translation: this context applied to the child's local offset.
    pub fn apply_translate(&self, local: &LocalTransform) -> (f32, f32) {
        let mut px = self.px + local.px * self.ta;
        let mut py = self.py + local.py * self.td;
        if self.tb != 0.0 {
            px += local.py * self.tb;
        }
        if self.tc != 0.0 {
            py += local.px * self.tc;
        }
        (px, py)
    }

    /// Child 2×2 transform: matrix product of this context and the child's
    /// local linear part, with a fast path when the child has no
    /// shear/rotation component.
    pub fn apply_transform(&self, local: &LocalTransform) -> (f32, f32, f32, f32) {
        if local.complex {
            (
                self.ta * local.ta + self.tb * local.tc,
                self.ta * local.tb + self.tb * local.td,
                self.tc * local.ta + self.td * local.tc,
                self.tc * local.tb + self.td * local.td,
            )
        } else {
            (
                self.ta * local.ta,
                self.tb * local.td,
                self.tc * local.ta,
                self.td * local.td,
            )
        }
    }
}

impl Default for CoordContext {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn identity_translate() {
        let local = LocalTransform::compute(
            5.0, 7.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0,
        );
        assert_eq!(CoordContext::IDENTITY.apply_translate(&local), (5.0, 7.0));
    }

    #[test]
    fn scaled_parent_scales_child_offset() {
        let parent = CoordContext {
            ta: 2.0,
            td: 2.0,
            ..CoordContext::IDENTITY
        };
        let local = LocalTransform::compute(
            10.0, 10.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        );
        assert_eq!(parent.apply_translate(&local), (20.0, 20.0));
    }

    #[test]
    fn fast_path_matches_full_multiply() {
        let parent = CoordContext {
            ta: 0.5,
            tb: 0.3,
            tc: -0.3,
            td: 0.5,
            ..CoordContext::IDENTITY
        };
        // Simple (scale-only) child: fast path.
        let simple = LocalTransform::compute(
            0.0, 0.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        );
        let (ta, tb, tc, td) = parent.apply_transform(&simple);
        assert!(approx_eq(ta, 1.0));
        assert!(approx_eq(tb, 1.2));
        assert!(approx_eq(tc, -0.6));
        assert!(approx_eq(td, 2.0));

        // Force the general path with an equivalent complex local transform
        // and check the product agrees.
        let complex = LocalTransform {
            complex: true,
            ..simple
        };
        let (ga, gb, gc, gd) = parent.apply_transform(&complex);
        assert!(approx_eq(ta, ga));
        assert!(approx_eq(tb, gb));
        assert!(approx_eq(tc, gc));
        assert!(approx_eq(td, gd));
    }
}
