//! Mathematical types shared between the simulation and render sides.
//!
//! Matrices are column-major (`m[col * 4 + row]`), the same layout the
//! rigid-body region stores, so a slot can be copied in and out verbatim.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, velocity, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// All ones
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians around `axis` (need not be normalized).
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize_or_zero();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Squared norm.
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Unit quaternion, or identity if degenerate.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length_squared().sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let inv = 1.0 / len;
        Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
    }

    /// Hamilton product `self * rhs`.
    #[must_use]
    pub fn mul(self, rhs: Self) -> Self {
        let (a, b) = (self, rhs);
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }

    /// Advances the rotation by angular velocity `omega` over `dt` seconds.
    #[must_use]
    pub fn integrate(self, omega: Vec3, dt: f32) -> Self {
        let spin = Self::new(omega.x, omega.y, omega.z, 0.0).mul(self);
        let h = 0.5 * dt;
        Self::new(
            self.x + spin.x * h,
            self.y + spin.y * h,
            self.z + spin.z * h,
            self.w + spin.w * h,
        )
        .normalize()
    }

    /// Extracts the rotation of a pure rotation matrix (upper 3x3 of `m`).
    #[must_use]
    pub fn from_rotation_matrix(m: &Mat4) -> Self {
        let e = &m.cols;
        let (m11, m12, m13) = (e[0], e[4], e[8]);
        let (m21, m22, m23) = (e[1], e[5], e[9]);
        let (m31, m32, m33) = (e[2], e[6], e[10]);
        let trace = m11 + m22 + m33;

        if trace > 0.0 {
            let s = 0.5 / (trace + 1.0).sqrt();
            Self::new((m32 - m23) * s, (m13 - m31) * s, (m21 - m12) * s, 0.25 / s)
        } else if m11 > m22 && m11 > m33 {
            let s = 2.0 * (1.0 + m11 - m22 - m33).sqrt();
            Self::new(0.25 * s, (m12 + m21) / s, (m13 + m31) / s, (m32 - m23) / s)
        } else if m22 > m33 {
            let s = 2.0 * (1.0 + m22 - m11 - m33).sqrt();
            Self::new((m12 + m21) / s, 0.25 * s, (m23 + m32) / s, (m13 - m31) / s)
        } else {
            let s = 2.0 * (1.0 + m33 - m11 - m22).sqrt();
            Self::new((m13 + m31) / s, (m23 + m32) / s, 0.25 * s, (m21 - m12) / s)
        }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 4x4 affine transform, column-major.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Mat4 {
    /// Elements, `cols[col * 4 + row]`.
    pub cols: [f32; 16],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        cols: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Creates from a column-major array.
    #[must_use]
    pub const fn from_cols_array(cols: [f32; 16]) -> Self {
        Self { cols }
    }

    /// Pure translation.
    #[must_use]
    pub fn from_translation(t: Vec3) -> Self {
        Self::compose(t, Quaternion::IDENTITY, Vec3::ONE)
    }

    /// Builds `T * R * S`.
    #[must_use]
    pub fn compose(position: Vec3, rotation: Quaternion, scale: Vec3) -> Self {
        let Quaternion { x, y, z, w } = rotation;
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);
        let Vec3 { x: sx, y: sy, z: sz } = scale;

        Self {
            cols: [
                (1.0 - (yy + zz)) * sx,
                (xy + wz) * sx,
                (xz - wy) * sx,
                0.0,
                (xy - wz) * sy,
                (1.0 - (xx + zz)) * sy,
                (yz + wx) * sy,
                0.0,
                (xz + wy) * sz,
                (yz - wx) * sz,
                (1.0 - (xx + yy)) * sz,
                0.0,
                position.x,
                position.y,
                position.z,
                1.0,
            ],
        }
    }

    /// Splits into position, rotation and scale.
    ///
    /// A negative determinant is folded into the X scale.
    #[must_use]
    pub fn decompose(&self) -> (Vec3, Quaternion, Vec3) {
        let e = &self.cols;
        let mut sx = Vec3::new(e[0], e[1], e[2]).length();
        let sy = Vec3::new(e[4], e[5], e[6]).length();
        let sz = Vec3::new(e[8], e[9], e[10]).length();
        if self.determinant() < 0.0 {
            sx = -sx;
        }

        let position = Vec3::new(e[12], e[13], e[14]);

        let mut rot = *self;
        let (ix, iy, iz) = (safe_recip(sx), safe_recip(sy), safe_recip(sz));
        for row in 0..3 {
            rot.cols[row] *= ix;
            rot.cols[4 + row] *= iy;
            rot.cols[8 + row] *= iz;
        }

        (
            position,
            Quaternion::from_rotation_matrix(&rot).normalize(),
            Vec3::new(sx, sy, sz),
        )
    }

    /// Translation column.
    #[must_use]
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.cols[12], self.cols[13], self.cols[14])
    }

    /// Determinant of the full 4x4.
    #[must_use]
    pub fn determinant(&self) -> f32 {
        let m = &self.cols;
        let (a00, a01, a02, a03) = (m[0], m[1], m[2], m[3]);
        let (a10, a11, a12, a13) = (m[4], m[5], m[6], m[7]);
        let (a20, a21, a22, a23) = (m[8], m[9], m[10], m[11]);
        let (a30, a31, a32, a33) = (m[12], m[13], m[14], m[15]);

        let b00 = a00 * a11 - a01 * a10;
        let b01 = a00 * a12 - a02 * a10;
        let b02 = a00 * a13 - a03 * a10;
        let b03 = a01 * a12 - a02 * a11;
        let b04 = a01 * a13 - a03 * a11;
        let b05 = a02 * a13 - a03 * a12;
        let b06 = a20 * a31 - a21 * a30;
        let b07 = a20 * a32 - a22 * a30;
        let b08 = a20 * a33 - a23 * a30;
        let b09 = a21 * a32 - a22 * a31;
        let b10 = a21 * a33 - a23 * a31;
        let b11 = a22 * a33 - a23 * a32;

        b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06
    }

    /// General inverse, `None` when singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let m = &self.cols;
        let (a00, a01, a02, a03) = (m[0], m[1], m[2], m[3]);
        let (a10, a11, a12, a13) = (m[4], m[5], m[6], m[7]);
        let (a20, a21, a22, a23) = (m[8], m[9], m[10], m[11]);
        let (a30, a31, a32, a33) = (m[12], m[13], m[14], m[15]);

        let b00 = a00 * a11 - a01 * a10;
        let b01 = a00 * a12 - a02 * a10;
        let b02 = a00 * a13 - a03 * a10;
        let b03 = a01 * a12 - a02 * a11;
        let b04 = a01 * a13 - a03 * a11;
        let b05 = a02 * a13 - a03 * a12;
        let b06 = a20 * a31 - a21 * a30;
        let b07 = a20 * a32 - a22 * a30;
        let b08 = a20 * a33 - a23 * a30;
        let b09 = a21 * a32 - a22 * a31;
        let b10 = a21 * a33 - a23 * a31;
        let b11 = a22 * a33 - a23 * a32;

        let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
        if det.abs() <= f32::EPSILON * f32::EPSILON {
            return None;
        }
        let inv = 1.0 / det;

        Some(Self {
            cols: [
                (a11 * b11 - a12 * b10 + a13 * b09) * inv,
                (a02 * b10 - a01 * b11 - a03 * b09) * inv,
                (a31 * b05 - a32 * b04 + a33 * b03) * inv,
                (a22 * b04 - a21 * b05 - a23 * b03) * inv,
                (a12 * b08 - a10 * b11 - a13 * b07) * inv,
                (a00 * b11 - a02 * b08 + a03 * b07) * inv,
                (a32 * b02 - a30 * b05 - a33 * b01) * inv,
                (a20 * b05 - a22 * b02 + a23 * b01) * inv,
                (a10 * b10 - a11 * b08 + a13 * b06) * inv,
                (a01 * b08 - a00 * b10 - a03 * b06) * inv,
                (a30 * b04 - a31 * b02 + a33 * b00) * inv,
                (a21 * b02 - a20 * b04 - a23 * b00) * inv,
                (a11 * b07 - a10 * b09 - a12 * b06) * inv,
                (a00 * b09 - a01 * b07 + a02 * b06) * inv,
                (a31 * b01 - a30 * b03 - a32 * b00) * inv,
                (a20 * b03 - a21 * b01 + a22 * b00) * inv,
            ],
        })
    }

    /// Transforms a point (w = 1).
    #[must_use]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let e = &self.cols;
        Vec3::new(
            e[0] * p.x + e[4] * p.y + e[8] * p.z + e[12],
            e[1] * p.x + e[5] * p.y + e[9] * p.z + e[13],
            e[2] * p.x + e[6] * p.y + e[10] * p.z + e[14],
        )
    }

    /// Transforms a surface normal by the inverse-transpose of the upper 3x3,
    /// renormalized. Falls back to the plain rotation for singular matrices.
    #[must_use]
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        let Some(inv) = self.inverse() else {
            return n.normalize_or_zero();
        };
        let e = &inv.cols;
        // transpose(inverse) applied to n: rows of inverse become columns
        Vec3::new(
            e[0] * n.x + e[1] * n.y + e[2] * n.z,
            e[4] * n.x + e[5] * n.y + e[6] * n.z,
            e[8] * n.x + e[9] * n.y + e[10] * n.z,
        )
        .normalize_or_zero()
    }

    /// Element-wise comparison within `eps`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        self.cols
            .iter()
            .zip(other.cols.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl std::ops::Mul for Mat4 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = a[row] * b[col * 4]
                    + a[4 + row] * b[col * 4 + 1]
                    + a[8 + row] * b[col * 4 + 2]
                    + a[12 + row] * b[col * 4 + 3];
            }
        }
        Self { cols: out }
    }
}

fn safe_recip(v: f32) -> f32 {
    if v.abs() > f32::EPSILON {
        1.0 / v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0);
        assert_eq!(Vec3::new(1.0, 0.0, 0.0).cross(Vec3::Y), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_compose_decompose() {
        let pos = Vec3::new(1.0, -2.0, 3.5);
        let rot = Quaternion::from_axis_angle(Vec3::new(0.3, 1.0, -0.2), 0.9);
        let scale = Vec3::new(2.0, 0.5, 1.5);

        let m = Mat4::compose(pos, rot, scale);
        let (p, r, s) = m.decompose();

        assert!((p - pos).length() < 1e-5);
        assert!((s - scale).length() < 1e-5);
        // q and -q are the same rotation
        let dot = r.x * rot.x + r.y * rot.y + r.z * rot.z + r.w * rot.w;
        assert!(dot.abs() > 1.0 - 1e-5);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Mat4::compose(
            Vec3::new(4.0, 5.0, 6.0),
            Quaternion::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 1.2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let inv = m.inverse().unwrap();
        assert!((m * inv).approx_eq(&Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let m = Mat4::compose(Vec3::ZERO, Quaternion::IDENTITY, Vec3::new(1.0, 0.0, 1.0));
        assert!(m.inverse().is_none());
    }

    #[test]
    fn test_mat4_bytemuck() {
        let m = Mat4::IDENTITY;
        let words: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&m));
        assert_eq!(words.len(), 16);
        assert_eq!(words[15], 1.0);
    }
}
