use std::collections::HashMap;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

use super::loader::{NodeHandle, ResourceLoader};
use super::motion::{self, MotionRecord};
use super::skeleton::Skeleton;
use crate::coords;
use crate::keyframe::{BoneTransform, Load};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    Immediate,
    #[default]
    Interpolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReclaimState {
    Idle,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneInstance {
    pub node: NodeHandle,
    pub filepath: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Fixed rotation from the load frame, applied below `rotation`.
    pub root_offset: Quat,
    pub rig_id: Option<i32>,
    pub semantic_id: i32,
    placed: bool,
}

impl SceneInstance {
    pub fn world_rotation(&self) -> Quat {
        self.rotation * self.root_offset
    }

    /// False until the first state update positions the instance.
    pub fn is_placed(&self) -> bool {
        self.placed
    }
}

pub struct SceneRegistry<L> {
    loader: L,
    instances: HashMap<i32, SceneInstance>,
    skeletons: HashMap<i32, Skeleton>,
    rig_bones: HashMap<i32, Vec<String>>,
    motions: HashMap<i32, MotionRecord>,
    keyframe_interval: Duration,
    reclaim: ReclaimState,
}

impl<L: ResourceLoader> SceneRegistry<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            instances: HashMap::new(),
            skeletons: HashMap::new(),
            rig_bones: HashMap::new(),
            motions: HashMap::new(),
            keyframe_interval: motion::keyframe_interval(motion::DEFAULT_KEYFRAME_RATE),
            reclaim: ReclaimState::Idle,
        }
    }

    pub fn create(
        &mut self,
        key: i32,
        load: Option<&Load>,
        scale: Option<[f32; 3]>,
        rig_id: Option<i32>,
    ) -> bool {
        let Some(load) = load else {
            log::warn!("Creation of instance {} references an unknown load", key);
            return false;
        };

        let Some(asset) = self.loader.load(&load.filepath) else {
            log::error!("Unable to load '{}' for instance {}", load.filepath, key);
            return false;
        };

        if self.instances.contains_key(&key) {
            log::warn!("Instance {} created twice, replacing previous node", key);
            self.delete(key);
            self.schedule_reclaim();
        }

        let root_offset = load
            .frame
            .as_ref()
            .map(|frame| coords::frame_rotation_offset(frame.up, frame.front))
            .unwrap_or(Quat::IDENTITY);

        if let Some(rig_id) = rig_id {
            let mut skeleton = Skeleton::new(rig_id, key, asset.bones);
            if let Some(names) = self.rig_bones.get(&rig_id) {
                skeleton.configure(names);
            }
            self.skeletons.insert(rig_id, skeleton);
        }

        self.instances.insert(
            key,
            SceneInstance {
                node: asset.node,
                filepath: load.filepath.clone(),
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: scale.map(Vec3::from).unwrap_or(Vec3::ONE),
                root_offset,
                rig_id,
                semantic_id: 0,
                placed: false,
            },
        );

        true
    }

    pub fn update_transform(
        &mut self,
        key: i32,
        position: Vec3,
        rotation: Quat,
        mode: TransformMode,
        now: Instant,
    ) -> bool {
        let Some(instance) = self.instances.get_mut(&key) else {
            return false;
        };

        if mode == TransformMode::Immediate || !instance.placed {
            instance.position = position;
            instance.rotation = rotation;
            instance.placed = true;
            self.motions.remove(&key);
            return true;
        }

        self.motions.insert(
            key,
            MotionRecord {
                from_position: instance.position,
                from_rotation: instance.rotation,
                to_position: position,
                to_rotation: rotation,
                start: now,
            },
        );

        true
    }

    pub fn set_semantic_id(&mut self, key: i32, semantic_id: i32) {
        if let Some(instance) = self.instances.get_mut(&key) {
            instance.semantic_id = semantic_id;
        }
    }

    pub fn configure_rig(&mut self, rig_id: i32, bone_names: Vec<String>) {
        if let Some(skeleton) = self.skeletons.get_mut(&rig_id) {
            skeleton.configure(&bone_names);
        }
        self.rig_bones.insert(rig_id, bone_names);
    }

    pub fn apply_rig_pose(&mut self, rig_id: i32, pose: &[BoneTransform]) {
        if let Some(skeleton) = self.skeletons.get_mut(&rig_id) {
            skeleton.set_pose(pose);
        }
    }

    pub fn delete(&mut self, key: i32) -> bool {
        let Some(instance) = self.instances.remove(&key) else {
            return false;
        };

        self.motions.remove(&key);
        if let Some(rig_id) = instance.rig_id {
            if self
                .skeletons
                .get(&rig_id)
                .is_some_and(|skeleton| skeleton.instance_key == key)
            {
                self.skeletons.remove(&rig_id);
            }
        }
        self.loader.destroy(instance.node);

        true
    }

    pub fn delete_all(&mut self) -> usize {
        let keys: Vec<i32> = self.instances.keys().copied().collect();
        let count = keys.len();
        for key in keys {
            self.delete(key);
        }
        self.rig_bones.clear();
        if count > 0 {
            self.schedule_reclaim();
        }
        count
    }

    pub fn advance_interpolations(&mut self, now: Instant) {
        let interval = self.keyframe_interval;
        let instances = &mut self.instances;

        self.motions.retain(|key, motion| {
            let Some(instance) = instances.get_mut(key) else {
                return false;
            };
            let t = motion.progress(now, interval);
            let (position, rotation) = motion.sample(t);
            instance.position = position;
            instance.rotation = rotation;
            t < 1.0
        });
    }

    pub fn schedule_reclaim(&mut self) {
        self.reclaim = ReclaimState::Pending;
    }

    pub fn reclaim_pending(&self) -> bool {
        self.reclaim == ReclaimState::Pending
    }

    /// Runs a scheduled reclamation. Returns true when one completed during this call.
    pub fn poll_reclaim(&mut self) -> bool {
        match self.reclaim {
            ReclaimState::Idle => false,
            ReclaimState::Pending => {
                self.loader.reclaim_unused();
                self.reclaim = ReclaimState::Idle;
                log::debug!("Reclaimed unused resources");
                true
            }
        }
    }

    pub fn set_keyframe_rate(&mut self, rate: f32) {
        self.keyframe_interval = motion::keyframe_interval(rate);
    }

    pub fn keyframe_interval(&self) -> Duration {
        self.keyframe_interval
    }

    pub fn get(&self, key: i32) -> Option<&SceneInstance> {
        self.instances.get(&key)
    }

    pub fn instances(&self) -> impl Iterator<Item = (i32, &SceneInstance)> {
        self.instances.iter().map(|(&key, instance)| (key, instance))
    }

    pub fn skeleton(&self, rig_id: i32) -> Option<&Skeleton> {
        self.skeletons.get(&rig_id)
    }

    pub fn is_interpolating(&self, key: i32) -> bool {
        self.motions.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }
}
