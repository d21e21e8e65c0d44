//! 4x4 matrix type, column-major like wgpu/WGSL.

use super::Vector3;

/// A 4x4 column-major matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4 {
    /// Column-major elements: `cols[column][row]`.
    pub cols: [[f32; 4]; 4],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    /// Identity matrix.
    pub const IDENTITY: Matrix4 = Matrix4 {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Matrix product `self * rhs` (applies `rhs` first).
    pub fn multiply(&self, rhs: &Matrix4) -> Matrix4 {
        let mut out = [[0.0f32; 4]; 4];
        for c in 0..4 {
            for r in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += self.cols[k][r] * rhs.cols[c][k];
                }
                out[c][r] = sum;
            }
        }
        Matrix4 { cols: out }
    }

    /// Right-handed look-at view matrix.
    pub fn look_at(eye: &Vector3, target: &Vector3, up: &Vector3) -> Matrix4 {
        let f = (*target - *eye).normalized();
        let s = f.cross(up).normalized();
        let u = s.cross(&f);

        Matrix4 {
            cols: [
                [s.x, u.x, -f.x, 0.0],
                [s.y, u.y, -f.y, 0.0],
                [s.z, u.z, -f.z, 0.0],
                [-s.dot(eye), -u.dot(eye), f.dot(eye), 1.0],
            ],
        }
    }

    /// Perspective projection with a [0, 1] depth range.
    ///
    /// `fov_y` is the vertical field of view in radians.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Matrix4 {
        let f = 1.0 / (fov_y * 0.5).tan();
        let range = 1.0 / (near - far);

        Matrix4 {
            cols: [
                [f / aspect, 0.0, 0.0, 0.0],
                [0.0, f, 0.0, 0.0],
                [0.0, 0.0, far * range, -1.0],
                [0.0, 0.0, near * far * range, 0.0],
            ],
        }
    }

    /// Orthographic projection with a [0, 1] depth range.
    pub fn orthographic(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Matrix4 {
        let rw = 1.0 / (right - left);
        let rh = 1.0 / (top - bottom);
        let rd = 1.0 / (near - far);

        Matrix4 {
            cols: [
                [2.0 * rw, 0.0, 0.0, 0.0],
                [0.0, 2.0 * rh, 0.0, 0.0],
                [0.0, 0.0, rd, 0.0],
                [
                    -(right + left) * rw,
                    -(top + bottom) * rh,
                    near * rd,
                    1.0,
                ],
            ],
        }
    }

    /// Uniform scale followed by translation.
    pub fn translation_scale(translation: &Vector3, scale: f32) -> Matrix4 {
        Matrix4 {
            cols: [
                [scale, 0.0, 0.0, 0.0],
                [0.0, scale, 0.0, 0.0],
                [0.0, 0.0, scale, 0.0],
                [translation.x, translation.y, translation.z, 1.0],
            ],
        }
    }

    /// Transform a point (w = 1) with perspective divide.
    pub fn transform_point(&self, p: &Vector3) -> Vector3 {
        let c = &self.cols;
        let x = c[0][0] * p.x + c[1][0] * p.y + c[2][0] * p.z + c[3][0];
        let y = c[0][1] * p.x + c[1][1] * p.y + c[2][1] * p.z + c[3][1];
        let z = c[0][2] * p.x + c[1][2] * p.y + c[2][2] * p.z + c[3][2];
        let w = c[0][3] * p.x + c[1][3] * p.y + c[2][3] * p.z + c[3][3];
        if w.abs() > f32::EPSILON {
            Vector3::new(x / w, y / w, z / w)
        } else {
            Vector3::new(x, y, z)
        }
    }

    /// Full 4x4 inverse via cofactor expansion.
    ///
    /// Returns the identity for a singular matrix; the pipeline only
    /// inverts view-projection matrices, which are invertible by
    /// construction.
    pub fn inverse(&self) -> Matrix4 {
        // Flatten to row-major m[row][col] for the cofactor formulas.
        let m = |r: usize, c: usize| self.cols[c][r];

        let a2323 = m(2, 2) * m(3, 3) - m(2, 3) * m(3, 2);
        let a1323 = m(2, 1) * m(3, 3) - m(2, 3) * m(3, 1);
        let a1223 = m(2, 1) * m(3, 2) - m(2, 2) * m(3, 1);
        let a0323 = m(2, 0) * m(3, 3) - m(2, 3) * m(3, 0);
        let a0223 = m(2, 0) * m(3, 2) - m(2, 2) * m(3, 0);
        let a0123 = m(2, 0) * m(3, 1) - m(2, 1) * m(3, 0);
        let a2313 = m(1, 2) * m(3, 3) - m(1, 3) * m(3, 2);
        let a1313 = m(1, 1) * m(3, 3) - m(1, 3) * m(3, 1);
        let a1213 = m(1, 1) * m(3, 2) - m(1, 2) * m(3, 1);
        let a2312 = m(1, 2) * m(2, 3) - m(1, 3) * m(2, 2);
        let a1312 = m(1, 1) * m(2, 3) - m(1, 3) * m(2, 1);
        let a1212 = m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1);
        let a0313 = m(1, 0) * m(3, 3) - m(1, 3) * m(3, 0);
        let a0213 = m(1, 0) * m(3, 2) - m(1, 2) * m(3, 0);
        let a0312 = m(1, 0) * m(2, 3) - m(1, 3) * m(2, 0);
        let a0212 = m(1, 0) * m(2, 2) - m(1, 2) * m(2, 0);
        let a0113 = m(1, 0) * m(3, 1) - m(1, 1) * m(3, 0);
        let a0112 = m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0);

        let det = m(0, 0) * (m(1, 1) * a2323 - m(1, 2) * a1323 + m(1, 3) * a1223)
            - m(0, 1) * (m(1, 0) * a2323 - m(1, 2) * a0323 + m(1, 3) * a0223)
            + m(0, 2) * (m(1, 0) * a1323 - m(1, 1) * a0323 + m(1, 3) * a0123)
            - m(0, 3) * (m(1, 0) * a1223 - m(1, 1) * a0223 + m(1, 2) * a0123);

        if det.abs() < f32::EPSILON {
            return Matrix4::IDENTITY;
        }
        let inv_det = 1.0 / det;

        // inv[row][col], then transposed back into column storage.
        let inv = [
            [
                (m(1, 1) * a2323 - m(1, 2) * a1323 + m(1, 3) * a1223) * inv_det,
                -(m(0, 1) * a2323 - m(0, 2) * a1323 + m(0, 3) * a1223) * inv_det,
                (m(0, 1) * a2313 - m(0, 2) * a1313 + m(0, 3) * a1213) * inv_det,
                -(m(0, 1) * a2312 - m(0, 2) * a1312 + m(0, 3) * a1212) * inv_det,
            ],
            [
                -(m(1, 0) * a2323 - m(1, 2) * a0323 + m(1, 3) * a0223) * inv_det,
                (m(0, 0) * a2323 - m(0, 2) * a0323 + m(0, 3) * a0223) * inv_det,
                -(m(0, 0) * a2313 - m(0, 2) * a0313 + m(0, 3) * a0213) * inv_det,
                (m(0, 0) * a2312 - m(0, 2) * a0312 + m(0, 3) * a0212) * inv_det,
            ],
            [
                (m(1, 0) * a1323 - m(1, 1) * a0323 + m(1, 3) * a0123) * inv_det,
                -(m(0, 0) * a1323 - m(0, 1) * a0323 + m(0, 3) * a0123) * inv_det,
                (m(0, 0) * a1313 - m(0, 1) * a0313 + m(0, 3) * a0113) * inv_det,
                -(m(0, 0) * a1312 - m(0, 1) * a0312 + m(0, 3) * a0112) * inv_det,
            ],
            [
                -(m(1, 0) * a1223 - m(1, 1) * a0223 + m(1, 2) * a0123) * inv_det,
                (m(0, 0) * a1223 - m(0, 1) * a0223 + m(0, 2) * a0123) * inv_det,
                -(m(0, 0) * a1213 - m(0, 1) * a0213 + m(0, 2) * a0113) * inv_det,
                (m(0, 0) * a1212 - m(0, 1) * a0212 + m(0, 2) * a0112) * inv_det,
            ],
        ];

        let mut cols = [[0.0f32; 4]; 4];
        for c in 0..4 {
            for r in 0..4 {
                cols[c][r] = inv[r][c];
            }
        }
        Matrix4 { cols }
    }

    /// Column-major 2D array, for uniform packing.
    #[inline]
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        self.cols
    }

    /// Element-wise approximate equality.
    pub fn approx_eq(&self, other: &Matrix4, epsilon: f32) -> bool {
        self.cols
            .iter()
            .zip(other.cols.iter())
            .all(|(a, b)| a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < epsilon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert!(Matrix4::IDENTITY.transform_point(&p).approx_eq(&p, 1e-6));
    }

    #[test]
    fn test_inverse_of_view() {
        let view = Matrix4::look_at(
            &Vector3::new(4.0, 3.0, 2.0),
            &Vector3::ZERO,
            &Vector3::UP,
        );
        let product = view.multiply(&view.inverse());
        assert!(product.approx_eq(&Matrix4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_inverse_of_view_projection() {
        let view = Matrix4::look_at(
            &Vector3::new(0.0, 5.0, 10.0),
            &Vector3::ZERO,
            &Vector3::UP,
        );
        let proj = Matrix4::perspective(1.0, 16.0 / 9.0, 0.1, 100.0);
        let vp = proj.multiply(&view);
        let product = vp.multiply(&vp.inverse());
        assert!(product.approx_eq(&Matrix4::IDENTITY, 1e-3));
    }

    #[test]
    fn test_orthographic_maps_box_to_clip() {
        let m = Matrix4::orthographic(-10.0, 10.0, -10.0, 10.0, 0.1, 50.0);
        let center = m.transform_point(&Vector3::new(0.0, 0.0, -0.1));
        assert!((center.z - 0.0).abs() < 1e-5);
        let far = m.transform_point(&Vector3::new(0.0, 0.0, -50.0));
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_translation_scale() {
        let m = Matrix4::translation_scale(&Vector3::new(1.0, 2.0, 3.0), 2.0);
        let p = m.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!(p.approx_eq(&Vector3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn test_look_at_centers_target() {
        let view = Matrix4::look_at(
            &Vector3::new(0.0, 0.0, 5.0),
            &Vector3::ZERO,
            &Vector3::UP,
        );
        let p = view.transform_point(&Vector3::ZERO);
        assert!(p.approx_eq(&Vector3::new(0.0, 0.0, -5.0), 1e-5));
    }
}
