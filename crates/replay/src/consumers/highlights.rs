use std::f32::consts::TAU;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{FrameContext, MessageConsumer};
use crate::coords;
use crate::keyframe::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Highlights beyond the pool size are dropped. Fixed at startup.
    pub pool_size: usize,
    /// Line segments per circle. Fixed at startup.
    pub circle_resolution: usize,
    pub default_color: [f32; 4],
    /// Line thickness in meters.
    pub width: f32,
    /// Multiplied by the radius received from the server.
    pub base_radius: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            pool_size: 32,
            circle_resolution: 32,
            default_color: [1.0, 1.0, 1.0, 1.0],
            width: 0.015,
            base_radius: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightCircle {
    pub active: bool,
    pub center: Vec3,
    pub radius: f32,
    pub color: [f32; 4],
    pub billboard: bool,
    /// Orientation of the circle plane; the unit circle lies in local XZ.
    pub rotation: Quat,
}

impl HighlightCircle {
    fn inactive(color: [f32; 4]) -> Self {
        Self {
            active: false,
            center: Vec3::ZERO,
            radius: 1.0,
            color,
            billboard: false,
            rotation: Quat::IDENTITY,
        }
    }

    /// Circle outline in world space.
    pub fn world_points<'a>(&'a self, unit_circle: &'a [Vec3]) -> impl Iterator<Item = Vec3> + 'a {
        unit_circle
            .iter()
            .map(move |&p| self.center + self.rotation * (p * self.radius))
    }
}

/// Pool of circle outlines drawn around points of interest.
pub struct Highlights {
    config: HighlightConfig,
    pool: Vec<HighlightCircle>,
    unit_circle: Vec<Vec3>,
    active_count: usize,
}

impl Highlights {
    pub fn new(config: HighlightConfig) -> Self {
        let resolution = config.circle_resolution.max(3);
        let arc = TAU / resolution as f32;
        let unit_circle = (0..resolution)
            .map(|i| {
                let angle = i as f32 * arc;
                Vec3::new(angle.sin(), 0.0, angle.cos())
            })
            .collect();

        let pool = vec![HighlightCircle::inactive(config.default_color); config.pool_size];

        Self {
            config,
            pool,
            unit_circle,
            active_count: 0,
        }
    }

    pub fn active(&self) -> &[HighlightCircle] {
        &self.pool[..self.active_count]
    }

    pub fn unit_circle(&self) -> &[Vec3] {
        &self.unit_circle
    }

    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    fn parse_color(&self, color: Option<&[f32]>) -> [f32; 4] {
        match color {
            Some(&[r, g, b]) => [r, g, b, 1.0],
            Some(&[r, g, b, a]) => [r, g, b, a],
            _ => self.config.default_color,
        }
    }

    fn face_viewer(center: Vec3, head: Vec3) -> Quat {
        match (head - center).try_normalize() {
            Some(to_viewer) => Quat::from_rotation_arc(Vec3::Y, to_viewer),
            None => Quat::IDENTITY,
        }
    }
}

impl MessageConsumer for Highlights {
    fn process_message(&mut self, message: &Message, ctx: &FrameContext) {
        for circle in &mut self.pool[..self.active_count] {
            circle.active = false;
        }
        self.active_count = 0;

        if message.highlights.len() > self.pool.len() {
            log::debug!(
                "Dropping {} highlights beyond pool size",
                message.highlights.len() - self.pool.len()
            );
        }

        for highlight in message.highlights.iter().take(self.pool.len()) {
            let Some(t) = coords::vec3_from_slice(&highlight.t) else {
                log::warn!("Ignoring highlight with {} center components", highlight.t.len());
                continue;
            };
            let center = coords::to_render_vector(t);
            let color = self.parse_color(highlight.color.as_deref());
            let rotation = if highlight.billboard {
                Self::face_viewer(center, ctx.view.head_position)
            } else {
                Quat::IDENTITY
            };

            let circle = &mut self.pool[self.active_count];
            circle.active = true;
            circle.center = center;
            circle.radius = self.config.base_radius * highlight.r;
            circle.color = color;
            circle.billboard = highlight.billboard;
            circle.rotation = rotation;
            self.active_count += 1;
        }
    }

    fn update(&mut self, ctx: &FrameContext) {
        for circle in &mut self.pool[..self.active_count] {
            if circle.billboard {
                circle.rotation = Self::face_viewer(circle.center, ctx.view.head_position);
            }
        }
    }
}
