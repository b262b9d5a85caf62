use std::time::{Duration, Instant};

use super::text::GazeFollower;
use super::{FrameContext, MessageConsumer};
use crate::keyframe::Message;

pub const FOG_FADE_DURATION: Duration = Duration::from_millis(750);
pub const OFFLINE_INDICATOR_DURATION: Duration = Duration::from_secs(5);

const OFFLINE_AMBIENT: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

/// Global render settings the host copies into its renderer every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub fog_enabled: bool,
    pub fog_density: f32,
    pub fog_color: [f32; 4],
    pub ambient_light: [f32; 4],
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            fog_enabled: false,
            fog_density: 0.0,
            fog_color: [0.0, 0.0, 0.0, 1.0],
            ambient_light: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FogFade {
    start: Instant,
    initial_density: f32,
}

fn ease_in_cubic(x: f32) -> f32 {
    x * x * x
}

/// Scene transition fog and the connection-lost indicator.
#[derive(Debug, Clone)]
pub struct SceneEffects {
    pub environment: Environment,
    pub offline_indicator: GazeFollower,
    saved_ambient: [f32; 4],
    fade: Option<FogFade>,
    online: bool,
    indicator_until: Option<Instant>,
}

impl Default for SceneEffects {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}

impl SceneEffects {
    pub fn new(environment: Environment) -> Self {
        Self {
            saved_ambient: environment.ambient_light,
            environment,
            offline_indicator: GazeFollower::default(),
            fade: None,
            online: false,
            indicator_until: None,
        }
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn offline_indicator_visible(&self) -> bool {
        self.indicator_until.is_some()
    }

    pub fn set_online(&mut self, online: bool, ctx: &FrameContext) {
        if online == self.online {
            return;
        }
        self.online = online;

        if online {
            self.indicator_until = None;
            self.environment.ambient_light = self.saved_ambient;
        } else {
            self.saved_ambient = self.environment.ambient_light;
            self.environment.ambient_light = OFFLINE_AMBIENT;
            self.indicator_until = Some(ctx.now + OFFLINE_INDICATOR_DURATION);
            self.offline_indicator.snap(&ctx.view);
        }
    }
}

impl MessageConsumer for SceneEffects {
    fn process_message(&mut self, message: &Message, _ctx: &FrameContext) {
        if message.scene_changed {
            self.environment.fog_enabled = true;
            self.environment.fog_density = 1.0;
            self.fade = None;
        }
    }

    fn post_process_message(&mut self, message: &Message, ctx: &FrameContext) {
        if message.scene_changed {
            self.fade = Some(FogFade {
                start: ctx.now,
                initial_density: self.environment.fog_density,
            });
        }
    }

    fn update(&mut self, ctx: &FrameContext) {
        if let Some(fade) = self.fade {
            let elapsed = ctx.now.saturating_duration_since(fade.start);
            if elapsed >= FOG_FADE_DURATION {
                self.environment.fog_density = 0.0;
                self.environment.fog_enabled = false;
                self.fade = None;
            } else {
                let t = ease_in_cubic(elapsed.as_secs_f32() / FOG_FADE_DURATION.as_secs_f32());
                self.environment.fog_density = fade.initial_density * (1.0 - t);
            }
        }

        if let Some(until) = self.indicator_until {
            if ctx.now >= until {
                self.indicator_until = None;
            } else {
                self.offline_indicator.follow(&ctx.view, ctx.dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::ViewState;

    fn ctx(now: Instant) -> FrameContext {
        FrameContext::new(now, 0.016, ViewState::default())
    }

    #[test]
    fn test_scene_change_fog_fades_out() {
        let mut effects = SceneEffects::default();
        let start = Instant::now();
        let message = Message {
            scene_changed: true,
            ..Default::default()
        };

        effects.process_message(&message, &ctx(start));
        assert!(effects.environment.fog_enabled);
        assert_eq!(effects.environment.fog_density, 1.0);

        effects.post_process_message(&message, &ctx(start));
        effects.update(&ctx(start + FOG_FADE_DURATION / 2));
        assert!((effects.environment.fog_density - 0.875).abs() < 1e-4);

        effects.update(&ctx(start + FOG_FADE_DURATION));
        assert!(!effects.environment.fog_enabled);
        assert!(!effects.is_fading());
    }

    #[test]
    fn test_fog_untouched_without_scene_change() {
        let mut effects = SceneEffects::default();
        let now = Instant::now();
        effects.process_message(&Message::default(), &ctx(now));
        effects.post_process_message(&Message::default(), &ctx(now));
        assert!(!effects.environment.fog_enabled);
        assert!(!effects.is_fading());
    }

    #[test]
    fn test_offline_tints_and_restores_ambient() {
        let mut effects = SceneEffects::default();
        let original = effects.environment.ambient_light;
        let now = Instant::now();

        effects.set_online(true, &ctx(now));
        effects.set_online(false, &ctx(now));
        assert_eq!(effects.environment.ambient_light, OFFLINE_AMBIENT);
        assert!(effects.offline_indicator_visible());

        effects.update(&ctx(now + OFFLINE_INDICATOR_DURATION));
        assert!(!effects.offline_indicator_visible());
        assert_eq!(effects.environment.ambient_light, OFFLINE_AMBIENT);

        effects.set_online(true, &ctx(now + OFFLINE_INDICATOR_DURATION));
        assert_eq!(effects.environment.ambient_light, original);
    }
}
