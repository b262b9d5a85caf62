//! Fan-out of keyframe `message` payloads to the viewer's auxiliary systems.
//!
//! The pre-phase runs before any asset of the keyframe is touched, the post-phase after
//! the keyframe's deletions have been reclaimed. Consumers never write instance
//! transforms; those belong to the scene registry.

mod avatar;
mod camera;
mod effects;
mod highlights;
mod keyframe_id;
mod navmesh;
mod text;

use std::time::Instant;

use glam::{Quat, Vec2, Vec3};

use crate::keyframe::Message;

pub use avatar::AvatarTeleport;
pub use camera::CameraOverride;
pub use effects::{
    Environment, FOG_FADE_DURATION, OFFLINE_INDICATOR_DURATION, SceneEffects,
};
pub use highlights::{HighlightCircle, HighlightConfig, Highlights};
pub use keyframe_id::KeyframeIdTracker;
pub use navmesh::{DEFAULT_GROUND_PLANE_SIZE, Navmesh, NavmeshConsumer};
pub use text::{GazeFollower, ScreenLabel, StatusText, TextOverlay};

/// Where the local viewer currently is, as reported by the host each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub head_position: Vec3,
    pub head_rotation: Quat,
    /// Viewport size in pixels.
    pub screen_size: Vec2,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            head_position: Vec3::new(0.0, 1.6, 0.0),
            head_rotation: Quat::IDENTITY,
            screen_size: Vec2::new(1920.0, 1080.0),
        }
    }
}

impl ViewState {
    pub fn forward(&self) -> Vec3 {
        self.head_rotation * Vec3::Z
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub now: Instant,
    /// Seconds since the previous frame; zero outside of the frame tick.
    pub dt: f32,
    pub view: ViewState,
}

impl FrameContext {
    pub fn new(now: Instant, dt: f32, view: ViewState) -> Self {
        Self { now, dt, view }
    }

    pub fn at(now: Instant, view: ViewState) -> Self {
        Self { now, dt: 0.0, view }
    }
}

pub trait MessageConsumer {
    fn process_message(&mut self, message: &Message, ctx: &FrameContext);

    /// Called once the keyframe's asset changes are complete.
    fn post_process_message(&mut self, _message: &Message, _ctx: &FrameContext) {}

    fn update(&mut self, _ctx: &FrameContext) {}
}

/// Statically assembled consumer list, with room for host-provided extras.
pub struct ConsumerSet {
    pub highlights: Highlights,
    pub avatar: AvatarTeleport,
    pub camera: CameraOverride,
    pub texts: TextOverlay,
    pub status: StatusText,
    pub navmesh: NavmeshConsumer,
    pub keyframe_id: KeyframeIdTracker,
    pub effects: SceneEffects,
    extra: Vec<Box<dyn MessageConsumer>>,
}

impl ConsumerSet {
    pub fn new(highlights: HighlightConfig, text_pool_size: usize) -> Self {
        Self {
            highlights: Highlights::new(highlights),
            avatar: AvatarTeleport::default(),
            camera: CameraOverride::default(),
            texts: TextOverlay::new(text_pool_size),
            status: StatusText::default(),
            navmesh: NavmeshConsumer::default(),
            keyframe_id: KeyframeIdTracker::default(),
            effects: SceneEffects::default(),
            extra: Vec::new(),
        }
    }

    pub fn push(&mut self, consumer: Box<dyn MessageConsumer>) {
        self.extra.push(consumer);
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut (dyn MessageConsumer + 'static))) {
        f(&mut self.effects);
        f(&mut self.highlights);
        f(&mut self.avatar);
        f(&mut self.camera);
        f(&mut self.texts);
        f(&mut self.status);
        f(&mut self.navmesh);
        f(&mut self.keyframe_id);
        for consumer in &mut self.extra {
            f(consumer.as_mut());
        }
    }

    pub fn process_message(&mut self, message: &Message, ctx: &FrameContext) {
        self.for_each(|consumer| consumer.process_message(message, ctx));
    }

    pub fn post_process_message(&mut self, message: &Message, ctx: &FrameContext) {
        self.for_each(|consumer| consumer.post_process_message(message, ctx));
    }

    pub fn update(&mut self, ctx: &FrameContext) {
        self.for_each(|consumer| consumer.update(ctx));
    }

    /// Tracks connectivity for the online/offline indicator.
    pub fn set_online(&mut self, online: bool, ctx: &FrameContext) {
        self.effects.set_online(online, ctx);
    }

    /// Clears per-session state when a new connection opens.
    pub fn reset_session(&mut self) {
        self.keyframe_id.reset();
    }
}

impl Default for ConsumerSet {
    fn default() -> Self {
        Self::new(HighlightConfig::default(), text::DEFAULT_TEXT_POOL_SIZE)
    }
}
