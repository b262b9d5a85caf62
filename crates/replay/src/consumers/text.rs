use glam::{Quat, Vec2, Vec3};

use super::{FrameContext, MessageConsumer, ViewState};
use crate::coords;
use crate::keyframe::Message;

pub const DEFAULT_TEXT_POOL_SIZE: usize = 32;

const GAZE_FOLLOWING_SPEED: f32 = 10.0;
const PANEL_DISTANCE: f32 = 3.0;

/// World-space panel that drifts toward a spot in front of the viewer's gaze.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeFollower {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for GazeFollower {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl GazeFollower {
    pub fn target(view: &ViewState) -> (Vec3, Quat) {
        let forward = view.forward();
        let position = view.head_position + forward * PANEL_DISTANCE;
        let rotation = coords::look_rotation(forward, Vec3::Y).unwrap_or(view.head_rotation);
        (position, rotation)
    }

    pub fn snap(&mut self, view: &ViewState) {
        (self.position, self.rotation) = Self::target(view);
    }

    pub fn follow(&mut self, view: &ViewState, dt: f32) {
        let (position, rotation) = Self::target(view);
        let t = (dt * GAZE_FOLLOWING_SPEED).clamp(0.0, 1.0);
        self.position = self.position.lerp(position, t);
        self.rotation = self.rotation.slerp(rotation, t);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenLabel {
    pub visible: bool,
    pub text: String,
    /// Anchor in pixels from the bottom-left corner.
    pub position: Vec2,
}

/// Pool of screen-space labels positioned in normalized viewport coordinates.
#[derive(Debug, Clone)]
pub struct TextOverlay {
    pool: Vec<ScreenLabel>,
    active_count: usize,
}

impl TextOverlay {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool: vec![ScreenLabel::default(); pool_size],
            active_count: 0,
        }
    }

    pub fn active(&self) -> &[ScreenLabel] {
        &self.pool[..self.active_count]
    }
}

impl MessageConsumer for TextOverlay {
    fn process_message(&mut self, message: &Message, ctx: &FrameContext) {
        for label in &mut self.pool[..self.active_count] {
            label.visible = false;
        }
        self.active_count = 0;

        for text in message.texts.iter().take(self.pool.len()) {
            let &[x, y] = text.position.as_slice() else {
                log::warn!("Ignoring text with {} position components", text.position.len());
                continue;
            };

            let label = &mut self.pool[self.active_count];
            label.visible = true;
            label.text.clone_from(&text.text);
            label.position = Vec2::new(x, y) * ctx.view.screen_size;
            self.active_count += 1;
        }
    }
}

/// Free-form status line shown on a panel that follows the viewer's gaze.
#[derive(Debug, Clone, Default)]
pub struct StatusText {
    pub text: String,
    pub panel: GazeFollower,
}

impl StatusText {
    pub fn is_visible(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn set_text(&mut self, text: &str, view: &ViewState) {
        self.text.clear();
        self.text.push_str(text);
        if self.is_visible() {
            self.panel.snap(view);
        }
    }
}

impl MessageConsumer for StatusText {
    fn process_message(&mut self, message: &Message, ctx: &FrameContext) {
        let text = message.text_message.as_deref().unwrap_or_default();
        if text != self.text {
            self.set_text(text, &ctx.view);
        }
    }

    fn update(&mut self, ctx: &FrameContext) {
        if self.is_visible() {
            self.panel.follow(&ctx.view, ctx.dt);
        }
    }
}
