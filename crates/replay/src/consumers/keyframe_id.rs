use super::{FrameContext, MessageConsumer};
use crate::keyframe::Message;

/// Most recent server keyframe id, echoed by hosts that acknowledge keyframes.
#[derive(Debug, Clone, Default)]
pub struct KeyframeIdTracker {
    recent: Option<i32>,
}

impl KeyframeIdTracker {
    pub fn recent(&self) -> Option<i32> {
        self.recent
    }

    pub fn reset(&mut self) {
        self.recent = None;
    }
}

impl MessageConsumer for KeyframeIdTracker {
    fn process_message(&mut self, message: &Message, _ctx: &FrameContext) {
        self.recent = message.server_keyframe_id;
    }
}
