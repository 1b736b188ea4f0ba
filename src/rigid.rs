//! Rigid-body parameters and affine helpers
//!
//! Parameters are `[tx, ty, tz, rx, ry, rz]`: translations in mm, rotations
//! in radians about x, y and z. The matrix follows the SPM convention
//! `M = T * R1 * R2 * R3`.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Build the 4x4 homogeneous transform for a rigid parameter vector
pub fn rigid_matrix(p: &[f64; 6]) -> Matrix4<f64> {
    let t = Matrix4::new_translation(&Vector3::new(p[0], p[1], p[2]));

    let (s1, c1) = p[3].sin_cos();
    let (s2, c2) = p[4].sin_cos();
    let (s3, c3) = p[5].sin_cos();

    #[rustfmt::skip]
    let r1 = Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0,  c1,  s1, 0.0,
        0.0, -s1,  c1, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
    #[rustfmt::skip]
    let r2 = Matrix4::new(
         c2, 0.0,  s2, 0.0,
        0.0, 1.0, 0.0, 0.0,
        -s2, 0.0,  c2, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
    #[rustfmt::skip]
    let r3 = Matrix4::new(
         c3,  s3, 0.0, 0.0,
        -s3,  c3, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );

    t * r1 * r2 * r3
}

/// Inverse of a rigid transform (rotation transposed, translation rotated back)
pub fn rigid_inverse(m: &Matrix4<f64>) -> Matrix4<f64> {
    let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).transpose();
    let t: Vector3<f64> = -(r * m.fixed_view::<3, 1>(0, 3));
    let mut inv = Matrix4::identity();
    inv.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    inv.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
    inv
}

/// Voxel sizes (mm): norms of the first three affine columns
pub fn voxel_sizes(affine: &Matrix4<f64>) -> [f64; 3] {
    let mut vx = [0.0; 3];
    for (c, v) in vx.iter_mut().enumerate() {
        *v = affine.fixed_view::<3, 1>(0, c).norm();
    }
    vx
}

/// Re-express a 0-based voxel affine for 1-based voxel indices
pub fn one_based(affine: &Matrix4<f64>) -> Matrix4<f64> {
    affine * Matrix4::new_translation(&Vector3::new(-1.0, -1.0, -1.0))
}

/// Source affine after applying estimated parameters
///
/// The returned header places the source in register with the reference:
/// `rigid_matrix(params)^-1 * source_affine`.
pub fn realigned_affine(params: &[f64; 6], source_affine: &Matrix4<f64>) -> Matrix4<f64> {
    rigid_inverse(&rigid_matrix(params)) * source_affine
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_zero_params_is_identity() {
        let m = rigid_matrix(&[0.0; 6]);
        assert!((m - Matrix4::identity()).norm() < 1e-15);
    }

    #[test]
    fn test_translation_only() {
        let m = rigid_matrix(&[3.0, -2.0, 1.0, 0.0, 0.0, 0.0]);
        let p = m.transform_point(&Point3::new(1.0, 1.0, 1.0));
        assert!((p - Point3::new(4.0, -1.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_about_z_convention() {
        // R3 = [[c, s], [-s, c]]: a positive angle sends +x towards -y
        let m = rigid_matrix(&[0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
        let p = m.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((p - Point3::new(0.0, -1.0, 0.0)).norm() < 1e-12, "got {}", p);
    }

    #[test]
    fn test_rigid_inverse_matches_general_inverse() {
        let m = rigid_matrix(&[1.0, 2.0, -3.0, 0.1, -0.2, 0.3]);
        let inv = rigid_inverse(&m);
        assert!((m * inv - Matrix4::identity()).norm() < 1e-12);
        let general = m.try_inverse().unwrap();
        assert!((general - inv).norm() < 1e-12);
    }

    #[test]
    fn test_voxel_sizes_with_rotation() {
        let affine = rigid_matrix(&[0.0, 0.0, 0.0, 0.3, 0.2, 0.1])
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 3.0));
        let vx = voxel_sizes(&affine);
        assert!((vx[0] - 2.0).abs() < 1e-12);
        assert!((vx[1] - 1.0).abs() < 1e-12);
        assert!((vx[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_based_shifts_origin() {
        let affine = Matrix4::new_translation(&Vector3::new(10.0, 20.0, 30.0));
        let p = one_based(&affine).transform_point(&Point3::new(1.0, 1.0, 1.0));
        assert!((p - Point3::new(10.0, 20.0, 30.0)).norm() < 1e-12);
    }

    #[test]
    fn test_realigned_affine_undoes_motion() {
        let params = [4.0, 0.0, -1.0, 0.0, 0.05, 0.0];
        let affine = Matrix4::identity();
        let realigned = realigned_affine(&params, &affine);
        assert!((rigid_matrix(&params) * realigned - affine).norm() < 1e-12);
    }
}
