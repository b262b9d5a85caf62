//! Outbound client state: what the local user is doing, sampled once per send cycle.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::coords;
use crate::net::{ConnectionParams, TransportError};

pub const DEFAULT_SEND_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseData {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl PoseData {
    pub fn from_render(position: Vec3, rotation: Quat) -> Self {
        Self {
            position: coords::to_server_vector(position),
            rotation: coords::to_server_quat_model(rotation),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarData {
    pub root: PoseData,
    pub hands: [PoseData; 2],
}

/// Buttons held, released or pressed since the previous send cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonInputData {
    pub button_held: Vec<u32>,
    pub button_up: Vec<u32>,
    pub button_down: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseInputData {
    pub buttons: ButtonInputData,
    pub scroll_delta: [f32; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<AvatarData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ButtonInputData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse: Option<MouseInputData>,
    /// Only present on the first successful send of a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_params_dict: Option<ConnectionParams>,
}

pub trait ClientStateProducer {
    /// Writes everything gathered since the last `end_cycle`.
    fn update_client_state(&mut self, state: &mut ClientState);

    fn end_cycle(&mut self);
}

/// Edge tracking for a set of buttons across one send cycle.
#[derive(Debug, Clone, Default)]
pub struct ButtonTracker {
    physical: BTreeSet<u32>,
    held: BTreeSet<u32>,
    up: BTreeSet<u32>,
    down: BTreeSet<u32>,
}

impl ButtonTracker {
    pub fn press(&mut self, button: u32) {
        if self.physical.insert(button) {
            self.down.insert(button);
        }
        self.held.insert(button);
    }

    pub fn release(&mut self, button: u32) {
        if self.physical.remove(&button) {
            self.up.insert(button);
        }
        // A button released during the cycle does not count as held.
        self.held.remove(&button);
    }

    pub fn is_pressed(&self, button: u32) -> bool {
        self.physical.contains(&button)
    }

    pub fn snapshot(&self) -> ButtonInputData {
        ButtonInputData {
            button_held: self.held.iter().copied().collect(),
            button_up: self.up.iter().copied().collect(),
            button_down: self.down.iter().copied().collect(),
        }
    }

    pub fn end_cycle(&mut self) {
        self.up.clear();
        self.down.clear();
        self.held.clone_from(&self.physical);
    }
}

/// USB HID keyboard usage ids, as the server expects them.
pub mod hid {
    pub const RETURN: u32 = 0x28;
    pub const ESCAPE: u32 = 0x29;
    pub const BACKSPACE: u32 = 0x2A;
    pub const TAB: u32 = 0x2B;
    pub const SPACE: u32 = 0x2C;
    pub const RIGHT_ARROW: u32 = 0x4F;
    pub const LEFT_ARROW: u32 = 0x50;
    pub const DOWN_ARROW: u32 = 0x51;
    pub const UP_ARROW: u32 = 0x52;

    /// Usage id of the key producing `c` on a US layout, for letters, digits and a few controls.
    pub fn from_char(c: char) -> Option<u32> {
        match c.to_ascii_lowercase() {
            c @ 'a'..='z' => Some(0x04 + (c as u32 - 'a' as u32)),
            c @ '1'..='9' => Some(0x1E + (c as u32 - '1' as u32)),
            '0' => Some(0x27),
            ' ' => Some(SPACE),
            '\n' | '\r' => Some(RETURN),
            '\t' => Some(TAB),
            '-' => Some(0x2D),
            '=' => Some(0x2E),
            '[' => Some(0x2F),
            ']' => Some(0x30),
            '\\' => Some(0x31),
            ';' => Some(0x33),
            '\'' => Some(0x34),
            '`' => Some(0x35),
            ',' => Some(0x36),
            '.' => Some(0x37),
            '/' => Some(0x38),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyboardProducer {
    keys: ButtonTracker,
}

impl KeyboardProducer {
    pub fn press(&mut self, usage: u32) {
        self.keys.press(usage);
    }

    pub fn release(&mut self, usage: u32) {
        self.keys.release(usage);
    }
}

impl ClientStateProducer for KeyboardProducer {
    fn update_client_state(&mut self, state: &mut ClientState) {
        state.input = Some(self.keys.snapshot());
    }

    fn end_cycle(&mut self) {
        self.keys.end_cycle();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
}

#[derive(Debug, Clone, Default)]
pub struct MouseProducer {
    buttons: ButtonTracker,
    scroll: Vec2,
}

impl MouseProducer {
    pub fn press(&mut self, button: MouseButton) {
        self.buttons.press(button as u32);
    }

    pub fn release(&mut self, button: MouseButton) {
        self.buttons.release(button as u32);
    }

    /// Accumulates until the end of the send cycle.
    pub fn scroll(&mut self, delta: Vec2) {
        self.scroll += delta;
    }
}

impl ClientStateProducer for MouseProducer {
    fn update_client_state(&mut self, state: &mut ClientState) {
        state.mouse = Some(MouseInputData {
            buttons: self.buttons.snapshot(),
            scroll_delta: self.scroll.to_array(),
        });
    }

    fn end_cycle(&mut self) {
        self.buttons.end_cycle();
        self.scroll = Vec2::ZERO;
    }
}

/// Head and controller poses in renderer space.
#[derive(Debug, Clone)]
pub struct PoseProducer {
    pub head: (Vec3, Quat),
    pub left_hand: (Vec3, Quat),
    pub right_hand: (Vec3, Quat),
}

impl Default for PoseProducer {
    fn default() -> Self {
        let identity = (Vec3::ZERO, Quat::IDENTITY);
        Self {
            head: identity,
            left_hand: identity,
            right_hand: identity,
        }
    }
}

impl ClientStateProducer for PoseProducer {
    fn update_client_state(&mut self, state: &mut ClientState) {
        state.avatar = Some(AvatarData {
            root: PoseData::from_render(self.head.0, self.head.1),
            hands: [
                PoseData::from_render(self.left_hand.0, self.left_hand.1),
                PoseData::from_render(self.right_hand.0, self.right_hand.1),
            ],
        });
    }

    fn end_cycle(&mut self) {}
}

/// Gathers producers into one message per send cycle.
pub struct ClientStateAggregator {
    pub keyboard: Option<KeyboardProducer>,
    pub mouse: Option<MouseProducer>,
    pub pose: Option<PoseProducer>,
    extra: Vec<Box<dyn ClientStateProducer>>,
    params: ConnectionParams,
    pending_params: Option<ConnectionParams>,
    send_period: Duration,
    next_send: Option<Instant>,
}

impl ClientStateAggregator {
    pub fn new(params: ConnectionParams, send_period: Duration) -> Self {
        Self {
            keyboard: None,
            mouse: None,
            pose: None,
            extra: Vec::new(),
            pending_params: Some(params.clone()),
            params,
            send_period,
            next_send: None,
        }
    }

    pub fn with_keyboard(mut self) -> Self {
        self.keyboard = Some(KeyboardProducer::default());
        self
    }

    pub fn with_mouse(mut self) -> Self {
        self.mouse = Some(MouseProducer::default());
        self
    }

    pub fn with_pose(mut self) -> Self {
        self.pose = Some(PoseProducer::default());
        self
    }

    pub fn push(&mut self, producer: Box<dyn ClientStateProducer>) {
        self.extra.push(producer);
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut (dyn ClientStateProducer + 'static))) {
        if let Some(keyboard) = &mut self.keyboard {
            f(keyboard);
        }
        if let Some(mouse) = &mut self.mouse {
            f(mouse);
        }
        if let Some(pose) = &mut self.pose {
            f(pose);
        }
        for producer in &mut self.extra {
            f(producer.as_mut());
        }
    }

    /// Attaches the connection parameters to the next successful send again.
    pub fn rearm_handshake(&mut self) {
        self.pending_params = Some(self.params.clone());
    }

    pub fn handshake_pending(&self) -> bool {
        self.pending_params.is_some()
    }

    pub fn build(&mut self) -> ClientState {
        let mut state = ClientState::default();
        self.for_each(|producer| producer.update_client_state(&mut state));
        state.connection_params_dict = self.pending_params.clone();
        state
    }

    pub fn end_cycle(&mut self) {
        self.for_each(|producer| producer.end_cycle());
    }

    /// Advances the send schedule; true when a cycle starts at `now`.
    fn cycle_due(&mut self, now: Instant) -> bool {
        match self.next_send {
            Some(at) if now < at => false,
            Some(at) => {
                let next = at + self.send_period;
                self.next_send = Some(if next <= now { now + self.send_period } else { next });
                true
            }
            None => {
                self.next_send = Some(now + self.send_period);
                true
            }
        }
    }

    /// Runs one send cycle if due. Returns whether a message was handed to `send`.
    pub fn update<F>(&mut self, now: Instant, connected: bool, send: F) -> bool
    where
        F: FnOnce(&str) -> Result<(), TransportError>,
    {
        if !self.cycle_due(now) || !connected {
            return false;
        }

        let state = self.build();
        let text = match serde_json::to_string(&state) {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to encode client state: {}", e);
                return false;
            }
        };

        match send(&text) {
            Ok(()) => {
                if state.connection_params_dict.is_some() {
                    self.pending_params = None;
                }
                // Edges accumulate until a send succeeds.
                self.end_cycle();
                true
            }
            Err(e) => {
                log::warn!("Failed to send client state: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_edges() {
        let mut tracker = ButtonTracker::default();
        tracker.press(4);
        tracker.press(5);
        tracker.release(5);

        let data = tracker.snapshot();
        assert_eq!(data.button_held, vec![4]);
        assert_eq!(data.button_down, vec![4, 5]);
        assert_eq!(data.button_up, vec![5]);

        tracker.end_cycle();
        let data = tracker.snapshot();
        assert_eq!(data.button_held, vec![4]);
        assert!(data.button_down.is_empty());
        assert!(data.button_up.is_empty());

        tracker.release(4);
        let data = tracker.snapshot();
        assert!(data.button_held.is_empty());
        assert_eq!(data.button_up, vec![4]);
    }

    #[test]
    fn test_hid_codes() {
        assert_eq!(hid::from_char('a'), Some(0x04));
        assert_eq!(hid::from_char('W'), Some(0x1A));
        assert_eq!(hid::from_char('1'), Some(0x1E));
        assert_eq!(hid::from_char('0'), Some(0x27));
        assert_eq!(hid::from_char(' '), Some(hid::SPACE));
        assert_eq!(hid::from_char('é'), None);
    }

    #[test]
    fn test_mouse_scroll_accumulates() {
        let mut mouse = MouseProducer::default();
        mouse.press(MouseButton::Right);
        mouse.scroll(Vec2::new(0.0, 1.0));
        mouse.scroll(Vec2::new(0.0, 2.0));

        let mut state = ClientState::default();
        mouse.update_client_state(&mut state);
        let data = state.mouse.clone().unwrap();
        assert_eq!(data.scroll_delta, [0.0, 3.0]);
        assert_eq!(data.buttons.button_down, vec![1]);

        mouse.end_cycle();
        mouse.update_client_state(&mut state);
        assert_eq!(state.mouse.unwrap().scroll_delta, [0.0, 0.0]);
    }

    #[test]
    fn test_pose_uses_model_convention() {
        let mut pose = PoseProducer {
            head: (Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(std::f32::consts::PI)),
            ..Default::default()
        };
        let mut state = ClientState::default();
        pose.update_client_state(&mut state);

        let avatar = state.avatar.unwrap();
        assert_eq!(avatar.root.position, [1.0, 2.0, -3.0]);
        let back = coords::to_render_quat_model(avatar.root.rotation);
        assert!(coords::same_rotation(back, Quat::from_rotation_y(std::f32::consts::PI), 1e-5));
    }

    #[test]
    fn test_serialized_shape() {
        let mut aggregator =
            ClientStateAggregator::new(ConnectionParams::from_url("http://x?a=1"), DEFAULT_SEND_PERIOD)
                .with_keyboard();
        let state = aggregator.build();
        let json: serde_json::Value = serde_json::to_value(&state).unwrap();

        assert!(json.get("avatar").is_none());
        assert!(json.get("mouse").is_none());
        assert_eq!(json["input"]["buttonHeld"], serde_json::json!([]));
        assert_eq!(json["connection_params_dict"]["a"], "1");
    }

    #[test]
    fn test_params_sent_once_per_session() {
        let mut aggregator =
            ClientStateAggregator::new(ConnectionParams::from_url("http://x?a=1"), DEFAULT_SEND_PERIOD);
        let mut sent = Vec::new();
        let start = Instant::now();

        // Failed send keeps the params pending.
        assert!(!aggregator.update(start, true, |_| Err(TransportError::NotOpen)));
        assert!(aggregator.handshake_pending());

        let t1 = start + DEFAULT_SEND_PERIOD;
        assert!(aggregator.update(t1, true, |text| {
            sent.push(text.to_string());
            Ok(())
        }));
        assert!(!aggregator.handshake_pending());

        let t2 = t1 + DEFAULT_SEND_PERIOD;
        aggregator.update(t2, true, |text| {
            sent.push(text.to_string());
            Ok(())
        });

        assert!(sent[0].contains("connection_params_dict"));
        assert!(!sent[1].contains("connection_params_dict"));

        aggregator.rearm_handshake();
        assert!(aggregator.handshake_pending());
    }

    #[test]
    fn test_nothing_happens_while_disconnected() {
        let mut aggregator = ClientStateAggregator::new(ConnectionParams::default(), DEFAULT_SEND_PERIOD)
            .with_keyboard();
        if let Some(keyboard) = aggregator.keyboard.as_mut() {
            keyboard.press(hid::SPACE);
        }

        let sent = aggregator.update(Instant::now(), false, |_| panic!("must not send"));
        assert!(!sent);

        // Edges survive until a connected cycle consumes them.
        let state = aggregator.build();
        assert_eq!(state.input.unwrap().button_down, vec![hid::SPACE]);
    }

    #[test]
    fn test_schedule_resyncs_after_stall() {
        let mut aggregator = ClientStateAggregator::new(ConnectionParams::default(), DEFAULT_SEND_PERIOD);
        let start = Instant::now();
        let ok = |_: &str| Ok(());

        assert!(aggregator.update(start, true, ok));
        assert!(!aggregator.update(start + Duration::from_millis(50), true, ok));
        assert!(aggregator.update(start + Duration::from_millis(100), true, ok));

        // A long stall produces one cycle, not a burst of catch-up cycles.
        let late = start + Duration::from_millis(1000);
        assert!(aggregator.update(late, true, ok));
        assert!(!aggregator.update(late + Duration::from_millis(10), true, ok));
        assert!(aggregator.update(late + DEFAULT_SEND_PERIOD, true, ok));
    }
}
