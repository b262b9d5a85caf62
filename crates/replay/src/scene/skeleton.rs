use glam::{Quat, Vec3};

use crate::coords;
use crate::keyframe::BoneTransform;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for BonePose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkeletonError {
    NoSkin,
    BoneCountMismatch { asset: usize, rig: usize },
    BoneNameMismatch { matched: usize, rig: usize },
    NotConfigured,
    InvalidPose { expected: usize, received: usize },
}

/// Binding between a rig id and the bones of one skinned instance.
///
/// The asset's bone list includes the root while the rig's bone names do not. Any
/// mismatch disables the skeleton for good: later configure/pose calls are ignored.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub rig_id: i32,
    pub instance_key: i32,
    asset_bones: Vec<String>,
    /// Rig bone index -> asset bone index.
    mapping: Option<Vec<usize>>,
    poses: Vec<BonePose>,
    enabled: bool,
    last_error: Option<SkeletonError>,
}

impl Skeleton {
    pub fn new(rig_id: i32, instance_key: i32, asset_bones: Option<Vec<String>>) -> Self {
        let mut skeleton = Self {
            rig_id,
            instance_key,
            poses: Vec::new(),
            asset_bones: Vec::new(),
            mapping: None,
            enabled: true,
            last_error: None,
        };

        match asset_bones {
            Some(bones) => {
                skeleton.poses = vec![BonePose::default(); bones.len()];
                skeleton.asset_bones = bones;
            }
            None => skeleton.disable(SkeletonError::NoSkin),
        }

        skeleton
    }

    pub fn configure(&mut self, bone_names: &[String]) {
        if !self.enabled {
            return;
        }

        if self.asset_bones.len() != bone_names.len() + 1 {
            self.disable(SkeletonError::BoneCountMismatch {
                asset: self.asset_bones.len(),
                rig: bone_names.len(),
            });
            return;
        }

        let mapping: Vec<usize> = bone_names
            .iter()
            .filter_map(|name| self.asset_bones.iter().position(|bone| bone == name))
            .collect();

        if mapping.len() != bone_names.len() {
            self.disable(SkeletonError::BoneNameMismatch {
                matched: mapping.len(),
                rig: bone_names.len(),
            });
            return;
        }

        self.mapping = Some(mapping);
    }

    pub fn set_pose(&mut self, pose: &[BoneTransform]) {
        if !self.enabled {
            return;
        }

        let Some(mapping) = &self.mapping else {
            self.disable(SkeletonError::NotConfigured);
            return;
        };

        if pose.len() != mapping.len() {
            let expected = mapping.len();
            self.disable(SkeletonError::InvalidPose {
                expected,
                received: pose.len(),
            });
            return;
        }

        let mut converted = Vec::with_capacity(pose.len());
        for bone in pose {
            match (coords::vec3_from_slice(&bone.t), coords::quat_from_slice(&bone.r)) {
                (Some(t), Some(r)) => converted.push(BonePose {
                    position: coords::to_render_vector(t),
                    rotation: coords::to_render_quat_model(r),
                }),
                _ => {
                    self.disable(SkeletonError::InvalidPose {
                        expected: converted.len(),
                        received: pose.len(),
                    });
                    return;
                }
            }
        }

        for (&asset_index, bone) in mapping.iter().zip(converted) {
            self.poses[asset_index] = bone;
        }
    }

    fn disable(&mut self, error: SkeletonError) {
        log::error!(
            "Disabling skeleton of instance {} (rig {}): {:?}",
            self.instance_key,
            self.rig_id,
            error
        );
        self.enabled = false;
        self.last_error = Some(error);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Skinned meshes stay hidden until the rig has been configured.
    pub fn is_visible(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn last_error(&self) -> Option<SkeletonError> {
        self.last_error
    }

    /// Poses indexed like the asset's bone list.
    pub fn poses(&self) -> &[BonePose] {
        &self.poses
    }

    pub fn bone_pose(&self, name: &str) -> Option<&BonePose> {
        let index = self.asset_bones.iter().position(|bone| bone == name)?;
        self.poses.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bone(t: [f32; 3]) -> BoneTransform {
        BoneTransform {
            t: t.to_vec(),
            r: vec![1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_configure_and_pose() {
        let mut skeleton = Skeleton::new(1, 10, Some(names(&["root", "hip", "knee"])));
        assert!(!skeleton.is_visible());

        skeleton.configure(&names(&["knee", "hip"]));
        assert!(skeleton.is_enabled());
        assert!(skeleton.is_visible());

        skeleton.set_pose(&[bone([1.0, 0.0, 1.0]), bone([0.0, 2.0, 0.0])]);
        assert!(skeleton.is_enabled());
        assert_eq!(
            skeleton.bone_pose("knee").unwrap().position,
            Vec3::new(1.0, 0.0, -1.0)
        );
        assert_eq!(
            skeleton.bone_pose("hip").unwrap().position,
            Vec3::new(0.0, 2.0, 0.0)
        );
        assert_eq!(skeleton.bone_pose("root").unwrap(), &BonePose::default());
    }

    #[test]
    fn test_bone_count_mismatch_disables() {
        let mut skeleton = Skeleton::new(1, 10, Some(names(&["root", "hip"])));
        skeleton.configure(&names(&["hip", "knee"]));

        assert!(!skeleton.is_enabled());
        assert_eq!(
            skeleton.last_error(),
            Some(SkeletonError::BoneCountMismatch { asset: 2, rig: 2 })
        );
    }

    #[test]
    fn test_bone_name_mismatch_disables() {
        let mut skeleton = Skeleton::new(1, 10, Some(names(&["root", "hip", "knee"])));
        skeleton.configure(&names(&["hip", "ankle"]));
        assert!(!skeleton.is_enabled());

        // Stays disabled.
        skeleton.configure(&names(&["hip", "knee"]));
        assert!(!skeleton.is_enabled());
    }

    #[test]
    fn test_pose_before_configure_disables() {
        let mut skeleton = Skeleton::new(1, 10, Some(names(&["root", "hip"])));
        skeleton.set_pose(&[bone([0.0; 3])]);
        assert_eq!(skeleton.last_error(), Some(SkeletonError::NotConfigured));
    }

    #[test]
    fn test_wrong_pose_length_disables() {
        let mut skeleton = Skeleton::new(1, 10, Some(names(&["root", "hip"])));
        skeleton.configure(&names(&["hip"]));
        skeleton.set_pose(&[bone([0.0; 3]), bone([0.0; 3])]);
        assert!(!skeleton.is_enabled());
    }

    #[test]
    fn test_unskinned_asset_is_disabled() {
        let skeleton = Skeleton::new(1, 10, None);
        assert!(!skeleton.is_enabled());
        assert_eq!(skeleton.last_error(), Some(SkeletonError::NoSkin));
    }
}
