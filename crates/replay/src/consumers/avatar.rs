use glam::Vec3;

use super::{FrameContext, MessageConsumer};
use crate::coords;
use crate::keyframe::Message;

/// Moves the local rig so the viewer's head lands on the server-requested spot.
///
/// Only the horizontal delta is applied; the tracked head height is left alone.
#[derive(Debug, Clone, Default)]
pub struct AvatarTeleport {
    /// Offset of the tracking space in the world. The host adds it to every tracked pose.
    pub origin: Vec3,
}

impl MessageConsumer for AvatarTeleport {
    fn process_message(&mut self, message: &Message, ctx: &FrameContext) {
        let Some(target) = message
            .teleport_avatar_base_position
            .as_deref()
            .and_then(coords::vec3_from_slice)
        else {
            return;
        };

        let delta = coords::to_render_vector(target) - ctx.view.head_position;
        // TODO: apply the Y delta once multi-floor scenes report floor heights.
        self.origin += Vec3::new(delta.x, 0.0, delta.z);
        log::debug!("Avatar teleported, origin now {}", self.origin);
    }
}
