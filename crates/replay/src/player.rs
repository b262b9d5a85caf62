use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::consumers::{ConsumerSet, FrameContext, ViewState};
use crate::coords;
use crate::keyframe::{Keyframe, Load, Message};
use crate::scene::{ResourceLoader, SceneRegistry, TransformMode};

/// Applies keyframes to the scene registry and the message consumers.
///
/// A keyframe is applied in a fixed order: message pre-phase, loads, creations, rig
/// creations, rig updates, state updates, deletions, message post-phase. When the
/// deletions freed anything, the post-phase waits until the next [`ReplayPlayer::tick`]
/// has reclaimed the resources, and keyframes arriving meanwhile are queued behind it.
pub struct ReplayPlayer<L> {
    registry: SceneRegistry<L>,
    consumers: ConsumerSet,
    loads: HashMap<String, Load>,
    mode: TransformMode,
    view: ViewState,
    awaiting_reclaim: bool,
    deferred_message: Option<Message>,
    queued: VecDeque<Keyframe>,
    keyframes_applied: u64,
}

impl<L: ResourceLoader> ReplayPlayer<L> {
    pub fn new(loader: L, consumers: ConsumerSet, mode: TransformMode) -> Self {
        Self {
            registry: SceneRegistry::new(loader),
            consumers,
            loads: HashMap::new(),
            mode,
            view: ViewState::default(),
            awaiting_reclaim: false,
            deferred_message: None,
            queued: VecDeque::new(),
            keyframes_applied: 0,
        }
    }

    pub fn process_keyframe(&mut self, keyframe: Keyframe, now: Instant) {
        if self.awaiting_reclaim {
            log::debug!("Queueing keyframe behind pending reclamation");
            self.queued.push_back(keyframe);
            return;
        }
        self.apply(keyframe, now);
    }

    fn apply(&mut self, keyframe: Keyframe, now: Instant) {
        let ctx = FrameContext::at(now, self.view);

        if let Some(message) = &keyframe.message {
            self.consumers.process_message(message, &ctx);
        }

        for load in keyframe.loads {
            if load.filepath.is_empty() {
                log::warn!("Ignoring load without filepath");
                continue;
            }
            self.loads.insert(load.filepath.clone(), load);
        }

        for item in &keyframe.creations {
            let creation = &item.creation;
            let scale = match creation.scale.as_deref() {
                Some(list) => {
                    let scale = coords::vec3_from_slice(list);
                    if scale.is_none() {
                        log::warn!(
                            "Ignoring scale with {} components on instance {}",
                            list.len(),
                            item.instance_key
                        );
                    }
                    scale
                }
                None => None,
            };
            self.registry.create(
                item.instance_key,
                self.loads.get(&creation.filepath),
                scale,
                creation.rig(),
            );
        }

        for rig in keyframe.rig_creations {
            self.registry.configure_rig(rig.id, rig.bone_names);
        }

        for rig in &keyframe.rig_updates {
            self.registry.apply_rig_pose(rig.id, &rig.pose);
        }

        for update in &keyframe.state_updates {
            let transform = &update.state.abs_transform;
            let (Some(t), Some(r)) = (
                coords::vec3_from_slice(&transform.translation),
                coords::quat_from_slice(&transform.rotation),
            ) else {
                log::warn!(
                    "Ignoring malformed transform for instance {}",
                    update.instance_key
                );
                continue;
            };

            let applied = self.registry.update_transform(
                update.instance_key,
                coords::to_render_vector(t),
                coords::to_render_quat_model(r),
                self.mode,
                now,
            );
            if applied {
                self.registry
                    .set_semantic_id(update.instance_key, update.state.semantic_id);
            }
        }

        let deleted = keyframe
            .deletions
            .iter()
            .filter(|&&key| self.registry.delete(key))
            .count();

        self.keyframes_applied += 1;

        if deleted > 0 {
            self.registry.schedule_reclaim();
            self.awaiting_reclaim = true;
            self.deferred_message = keyframe.message;
            return;
        }

        if let Some(message) = &keyframe.message {
            self.consumers.post_process_message(message, &ctx);
        }
    }

    pub fn tick(&mut self, now: Instant, dt: f32) {
        self.registry.advance_interpolations(now);

        if self.registry.poll_reclaim() && self.awaiting_reclaim {
            self.awaiting_reclaim = false;
            let ctx = FrameContext::at(now, self.view);
            if let Some(message) = self.deferred_message.take() {
                self.consumers.post_process_message(&message, &ctx);
            }

            while !self.awaiting_reclaim {
                let Some(keyframe) = self.queued.pop_front() else {
                    break;
                };
                self.apply(keyframe, now);
            }
        }

        self.consumers
            .update(&FrameContext::new(now, dt, self.view));
    }

    pub fn set_view(&mut self, view: ViewState) {
        self.view = view;
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Stretches interpolation over the measured keyframe period, clamped to 10..=30 Hz.
    pub fn set_keyframe_rate(&mut self, rate: f32) {
        self.registry.set_keyframe_rate(rate);
    }

    pub fn set_transform_mode(&mut self, mode: TransformMode) {
        self.mode = mode;
    }

    pub fn transform_mode(&self) -> TransformMode {
        self.mode
    }

    pub fn delete_all_instances(&mut self) {
        let count = self.registry.delete_all();
        if count > 0 {
            log::info!("Deleted {} instances", count);
        }
    }

    pub fn registry(&self) -> &SceneRegistry<L> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SceneRegistry<L> {
        &mut self.registry
    }

    pub fn consumers(&self) -> &ConsumerSet {
        &self.consumers
    }

    pub fn consumers_mut(&mut self) -> &mut ConsumerSet {
        &mut self.consumers
    }

    pub fn load(&self, filepath: &str) -> Option<&Load> {
        self.loads.get(filepath)
    }

    pub fn queued_keyframes(&self) -> usize {
        self.queued.len()
    }

    pub fn is_awaiting_reclaim(&self) -> bool {
        self.awaiting_reclaim
    }

    pub fn keyframes_applied(&self) -> u64 {
        self.keyframes_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::{
        AbsTransform, Creation, CreationItem, Frame, StateData, StateUpdate,
    };
    use crate::scene::{LoadedAsset, NodeHandle};
    use glam::Vec3;

    #[derive(Default)]
    struct Loader {
        next: u64,
        reclaims: usize,
    }

    impl ResourceLoader for Loader {
        fn load(&mut self, _filepath: &str) -> Option<LoadedAsset> {
            self.next += 1;
            Some(LoadedAsset::new(NodeHandle(self.next)))
        }

        fn destroy(&mut self, _node: NodeHandle) {}

        fn reclaim_unused(&mut self) {
            self.reclaims += 1;
        }
    }

    fn player() -> ReplayPlayer<Loader> {
        ReplayPlayer::new(
            Loader::default(),
            ConsumerSet::default(),
            TransformMode::Interpolated,
        )
    }

    fn create(key: i32) -> Keyframe {
        Keyframe {
            loads: vec![Load {
                kind: 0,
                filepath: "a.glb".into(),
                frame: Some(Frame::default()),
            }],
            creations: vec![CreationItem {
                instance_key: key,
                creation: Creation {
                    filepath: "a.glb".into(),
                    ..Default::default()
                },
            }],
            ..Default::default()
        }
    }

    fn moved(key: i32, translation: Vec<f32>) -> Keyframe {
        Keyframe {
            state_updates: vec![StateUpdate {
                instance_key: key,
                state: StateData {
                    abs_transform: AbsTransform {
                        translation,
                        rotation: vec![1.0, 0.0, 0.0, 0.0],
                    },
                    semantic_id: 3,
                },
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_creation_without_load_is_skipped() {
        let mut player = player();
        let mut keyframe = create(1);
        keyframe.loads.clear();

        player.process_keyframe(keyframe, Instant::now());
        assert!(player.registry().is_empty());
    }

    #[test]
    fn test_load_persists_across_keyframes() {
        let mut player = player();
        let now = Instant::now();
        player.process_keyframe(create(1), now);

        let mut second = create(2);
        second.loads.clear();
        player.process_keyframe(second, now);

        assert_eq!(player.registry().len(), 2);
        assert!(player.load("a.glb").is_some());
    }

    #[test]
    fn test_malformed_state_update_skipped() {
        let mut player = player();
        let now = Instant::now();
        player.process_keyframe(create(1), now);

        let mut keyframe = moved(1, vec![1.0, 2.0]);
        keyframe
            .state_updates
            .extend(moved(1, vec![1.0, 2.0, 3.0]).state_updates);
        player.process_keyframe(keyframe, now);

        let instance = player.registry().get(1).unwrap();
        assert_eq!(instance.position, Vec3::new(1.0, 2.0, -3.0));
        assert_eq!(instance.semantic_id, 3);
    }

    #[test]
    fn test_deletion_defers_post_phase_and_queues() {
        let mut player = player();
        let now = Instant::now();
        player.process_keyframe(create(1), now);

        let deletion = Keyframe {
            deletions: vec![1],
            message: Some(Message {
                scene_changed: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        player.process_keyframe(deletion, now);
        assert!(player.is_awaiting_reclaim());
        assert!(player.consumers().effects.environment.fog_enabled);
        assert!(!player.consumers().effects.is_fading());

        player.process_keyframe(create(2), now);
        assert_eq!(player.queued_keyframes(), 1);
        assert!(player.registry().get(2).is_none());

        player.tick(now, 0.016);
        assert!(!player.is_awaiting_reclaim());
        assert!(player.consumers().effects.is_fading());
        assert_eq!(player.queued_keyframes(), 0);
        assert!(player.registry().get(2).is_some());
        assert_eq!(player.registry().loader().reclaims, 1);
    }

    #[test]
    fn test_immediate_mode() {
        let mut player = player();
        player.set_transform_mode(TransformMode::Immediate);
        let now = Instant::now();
        player.process_keyframe(create(1), now);
        player.process_keyframe(moved(1, vec![1.0, 0.0, 0.0]), now);
        player.process_keyframe(moved(1, vec![2.0, 0.0, 0.0]), now);

        assert_eq!(player.registry().get(1).unwrap().position, Vec3::new(2.0, 0.0, 0.0));
        assert!(!player.registry().is_interpolating(1));
    }
}
