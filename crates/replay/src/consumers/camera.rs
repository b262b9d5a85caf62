use glam::{Quat, Vec3};

use super::{FrameContext, MessageConsumer};
use crate::coords;
use crate::keyframe::Message;

/// Server-driven camera pose, for hosts that do not track the viewer's head.
#[derive(Debug, Clone, Default)]
pub struct CameraOverride {
    pub pose: Option<(Vec3, Quat)>,
}

impl MessageConsumer for CameraOverride {
    fn process_message(&mut self, message: &Message, _ctx: &FrameContext) {
        let Some(camera) = &message.camera else {
            return;
        };

        if let (Some(t), Some(r)) = (
            coords::vec3_from_slice(&camera.translation),
            coords::quat_from_slice(&camera.rotation),
        ) {
            self.pose = Some((coords::to_render_vector(t), coords::to_render_quat(r)));
        }
    }
}
