//! Local 2D transforms.
//!
//! A node's transform is a 2×2 linear part plus a translation, cached on the
//! node and recomputed only when a transform-affecting property changes. The
//! `complex` flag marks transforms with a shear/rotation component so the
//! update and render passes can take the cheap axis-aligned path otherwise.

/// A node's cached local transform relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub px: f32,
    pub py: f32,
    pub ta: f32,
    pub tb: f32,
    pub tc: f32,
    pub td: f32,
    /// True when `tb` or `tc` is non-zero (rotation or shear present).
    pub complex: bool,
}

impl LocalTransform {
    pub const IDENTITY: Self = Self {
        px: 0.0,
        py: 0.0,
        ta: 1.0,
        tb: 0.0,
        tc: 0.0,
        td: 1.0,
        complex: false,
    };

    /// Compute the local transform from node properties.
    ///
    /// The pivot is the rotation/scale origin expressed as a fraction of the
    /// node's dimensions; the mount offset shifts which point of the node
    /// lands on `(x, y)` (0 = top-left corner, 1 = bottom-right).
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        pivot_x: f32,
        pivot_y: f32,
        mount_x: f32,
        mount_y: f32,
        width: f32,
        height: f32,
    ) -> Self {
        let (ta, tb, tc, td, complex);
        if rotation % std::f32::consts::TAU != 0.0 {
            let (sin, cos) = rotation.sin_cos();
            ta = cos * scale_x;
            tb = -sin * scale_y;
            tc = sin * scale_x;
            td = cos * scale_y;
            complex = true;
        } else {
            ta = scale_x;
            tb = 0.0;
            tc = 0.0;
            td = scale_y;
            complex = false;
        }

        // Keep the pivot point fixed under rotation/scale, then shift by the
        // mount offset.
        let pivot_w = pivot_x * width;
        let pivot_h = pivot_y * height;
        let px = x - (pivot_w * ta + pivot_h * tb) + pivot_w - mount_x * width;
        let py = y - (pivot_w * tc + pivot_h * td) + pivot_h - mount_y * height;

        Self {
            px,
            py,
            ta,
            tb,
            tc,
            td,
            complex,
        }
    }

    /// Apply this transform to a point.
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.px + self.ta * x + self.tb * y,
            self.py + self.tc * x + self.td * y,
        )
    }
}

impl Default for LocalTransform {
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
    fn plain_translation() {
        let t = LocalTransform::compute(
            10.0, 20.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 100.0, 50.0,
        );
        assert!(!t.complex);
        assert_eq!((t.px, t.py), (10.0, 20.0));
        assert_eq!((t.ta, t.tb, t.tc, t.td), (1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn scale_is_not_complex() {
        let t = LocalTransform::compute(
            0.0, 0.0, 0.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0,
        );
        assert!(!t.complex);
        assert_eq!((t.ta, t.td), (2.0, 3.0));
    }

    #[test]
    fn rotation_is_complex() {
        let t = LocalTransform::compute(
            0.0,
            0.0,
            std::f32::consts::FRAC_PI_2,
            1.0,
            1.0,
            0.0,
            0.0,
            0.0,
            0.0,
            10.0,
            10.0,
        );
        assert!(t.complex);
        assert!(approx_eq(t.ta, 0.0));
        assert!(approx_eq(t.tb, -1.0));
        assert!(approx_eq(t.tc, 1.0));
        assert!(approx_eq(t.td, 0.0));
    }

    #[test]
    fn center_pivot_stays_fixed_under_rotation() {
        let t = LocalTransform::compute(
            0.0,
            0.0,
            std::f32::consts::FRAC_PI_2,
            1.0,
            1.0,
            0.5,
            0.5,
            0.0,
            0.0,
            100.0,
            100.0,
        );
        let (cx, cy) = t.transform_point(50.0, 50.0);
        assert!(approx_eq(cx, 50.0));
        assert!(approx_eq(cy, 50.0));
    }

    #[test]
    fn mount_offset_shifts_origin() {
        // Mount (1, 1): the bottom-right corner lands on (x, y).
        let t = LocalTransform::compute(
            100.0, 100.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 40.0, 30.0,
        );
        let (bx, by) = t.transform_point(40.0, 30.0);
        assert!(approx_eq(bx, 100.0));
        assert!(approx_eq(by, 100.0));
    }
}
