//! Conversions between the simulation server's coordinate convention and the renderer's.
//!
//! Server:   X-right, Y-up, Z-back, quaternions serialized as `[w, x, y, z]`.
//! Renderer: X-right, Y-up, Z-forward.
//!
//! Imported 3D models have the handedness flip baked in by the asset pipeline, so model
//! rotations go through the `*_model` variants which add a 180 degree turn about Y.

use glam::{Mat3, Quat, Vec3};

const MODEL_CORRECTION: Quat = Quat::from_xyzw(0.0, 1.0, 0.0, 0.0);

pub fn to_render_vector(v: [f32; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], -v[2])
}

pub fn to_server_vector(v: Vec3) -> [f32; 3] {
    [v.x, v.y, -v.z]
}

pub fn to_render_quat(q: [f32; 4]) -> Quat {
    Quat::from_xyzw(q[1], q[2], -q[3], -q[0])
}

pub fn to_server_quat(q: Quat) -> [f32; 4] {
    [-q.w, q.x, q.y, -q.z]
}

pub fn to_render_quat_model(q: [f32; 4]) -> Quat {
    MODEL_CORRECTION * Quat::from_xyzw(q[1], -q[2], -q[3], q[0])
}

pub fn to_server_quat_model(q: Quat) -> [f32; 4] {
    let c = MODEL_CORRECTION.conjugate() * q;
    [c.w, c.x, -c.y, -c.z]
}

/// Rotation taking the renderer's up (+Y) onto `up` and forward (+Z) onto `front`.
///
/// Used once per instance to orient assets authored with a different up/front basis.
/// Degenerate frames (zero or parallel axes) fall back to identity.
pub fn frame_rotation_offset(up: [f32; 3], front: [f32; 3]) -> Quat {
    look_rotation(Vec3::from(front), Vec3::from(up)).unwrap_or_else(|| {
        log::warn!("Degenerate frame up {:?} front {:?}, using identity", up, front);
        Quat::IDENTITY
    })
}

/// Rotation whose +Z points along `forward` and whose +Y lies in the `forward`/`up` plane.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let forward = forward.try_normalize()?;
    let right = up.cross(forward).try_normalize()?;
    let up = forward.cross(right);

    Some(Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize())
}

/// Validates a wire list as a 3-vector.
pub fn vec3_from_slice(list: &[f32]) -> Option<[f32; 3]> {
    list.try_into().ok()
}

/// Validates a wire list as a `[w, x, y, z]` quaternion.
pub fn quat_from_slice(list: &[f32]) -> Option<[f32; 4]> {
    list.try_into().ok()
}

/// Quaternion equality up to the double cover (`q` and `-q` are the same rotation).
pub fn same_rotation(a: Quat, b: Quat, epsilon: f32) -> bool {
    a.abs_diff_eq(b, epsilon) || a.abs_diff_eq(-b, epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn vectors_flip_z() {
        assert_eq!(to_render_vector([1.0, 0.0, 0.0]), Vec3::X);
        assert_eq!(to_render_vector([0.0, 1.0, 0.0]), Vec3::Y);
        assert_eq!(to_render_vector([0.0, 0.0, 1.0]), Vec3::NEG_Z);

        assert_eq!(to_server_vector(Vec3::X), [1.0, 0.0, 0.0]);
        assert_eq!(to_server_vector(Vec3::Z), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn base_quaternion_axes() {
        assert_eq!(
            to_render_quat([1.0, 1.0, 0.0, 0.0]),
            Quat::from_xyzw(1.0, 0.0, 0.0, -1.0)
        );
        assert_eq!(
            to_render_quat([1.0, 0.0, 0.0, 1.0]),
            Quat::from_xyzw(0.0, 0.0, -1.0, -1.0)
        );
        assert_eq!(
            to_server_quat(Quat::from_xyzw(0.0, 0.0, 1.0, 1.0)),
            [-1.0, 0.0, 0.0, -1.0]
        );
    }

    #[test]
    fn model_identity_is_half_turn() {
        let q = to_render_quat_model([1.0, 0.0, 0.0, 0.0]);
        assert!(same_rotation(
            q,
            Quat::from_rotation_y(std::f32::consts::PI),
            EPSILON
        ));
    }

    #[test]
    fn frame_offset_identity() {
        let offset = frame_rotation_offset([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
        assert!(same_rotation(offset, Quat::IDENTITY, EPSILON));
    }

    #[test]
    fn frame_offset_aligns_axes() {
        let up = [-1.0, 0.0, 0.0];
        let front = [0.0, -1.0, 0.0];
        let offset = frame_rotation_offset(up, front);

        assert!((offset * Vec3::Y).abs_diff_eq(Vec3::from(up), EPSILON));
        assert!((offset * Vec3::Z).abs_diff_eq(Vec3::from(front), EPSILON));
    }

    #[test]
    fn frame_offset_degenerate_is_identity() {
        let offset = frame_rotation_offset([0.0, 1.0, 0.0], [0.0, 2.0, 0.0]);
        assert_eq!(offset, Quat::IDENTITY);
    }

    #[test]
    fn slice_validation() {
        assert_eq!(vec3_from_slice(&[1.0, 2.0, 3.0]), Some([1.0, 2.0, 3.0]));
        assert_eq!(vec3_from_slice(&[1.0, 2.0]), None);
        assert_eq!(quat_from_slice(&[1.0, 0.0, 0.0]), None);
    }

    fn unit_quat() -> impl Strategy<Value = Quat> {
        (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0)
            .prop_filter("non-zero", |(x, y, z, w)| x * x + y * y + z * z + w * w > 0.01)
            .prop_map(|(x, y, z, w)| Quat::from_xyzw(x, y, z, w).normalize())
    }

    proptest! {
        #[test]
        fn vector_round_trip(x in -1e4f32..1e4, y in -1e4f32..1e4, z in -1e4f32..1e4) {
            let v = Vec3::new(x, y, z);
            prop_assert_eq!(to_render_vector(to_server_vector(v)), v);
            prop_assert_eq!(to_server_vector(to_render_vector([x, y, z])), [x, y, z]);
        }

        #[test]
        fn base_quat_round_trip(q in unit_quat()) {
            prop_assert!(same_rotation(to_render_quat(to_server_quat(q)), q, EPSILON));
        }

        #[test]
        fn model_quat_round_trip(q in unit_quat()) {
            prop_assert!(same_rotation(to_render_quat_model(to_server_quat_model(q)), q, EPSILON));
        }
    }
}
