use std::time::Instant;

use crate::client_state::ClientStateAggregator;
use crate::config::ClientConfig;
use crate::consumers::{ConsumerSet, FrameContext, ViewState};
use crate::keyframe::KeyframeEnvelope;
use crate::net::{
    ConnectionEvent, ConnectionManager, ConnectionParams, RateMeter, Transport, resolve_candidates,
};
use crate::player::ReplayPlayer;
use crate::scene::ResourceLoader;

/// Viewer session: connection, keyframe playback and client state, driven once per frame.
pub struct ReplayClient<T: Transport, L: ResourceLoader> {
    connection: ConnectionManager<T>,
    player: ReplayPlayer<L>,
    client_state: ClientStateAggregator,
    keyframe_rate: RateMeter,
    last_update: Option<Instant>,
}

impl<T: Transport, L: ResourceLoader> ReplayClient<T, L> {
    pub fn new(config: &ClientConfig, params: ConnectionParams, transport: T, loader: L) -> Self {
        let candidates =
            resolve_candidates(&config.server_locations, &params, config.default_port);
        log::info!(
            "Server candidates: {}",
            candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let connection = ConnectionManager::new(
            transport,
            candidates,
            params.clone(),
            config.connection.clone(),
        );
        let consumers = ConsumerSet::new(config.highlights.clone(), config.text_pool_size);
        let mut player = ReplayPlayer::new(loader, consumers, config.transform_mode);
        player.set_keyframe_rate(config.keyframe_rate);

        let client_state = ClientStateAggregator::new(params, config.send_period())
            .with_keyboard()
            .with_mouse()
            .with_pose();

        Self {
            connection,
            player,
            client_state,
            keyframe_rate: RateMeter::new(config.keyframe_rate),
            last_update: None,
        }
    }

    pub fn update(&mut self, now: Instant) {
        let dt = self
            .last_update
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32());
        self.last_update = Some(now);

        self.connection.update(now);
        let events: Vec<ConnectionEvent> = self.connection.drain_events().collect();
        for event in events {
            self.handle_event(event, now);
        }

        let online = self.connection.is_connected();
        let ctx = FrameContext::new(now, dt, *self.player.view());
        self.player.consumers_mut().set_online(online, &ctx);
        self.player.tick(now, dt);

        let connection = &mut self.connection;
        self.client_state
            .update(now, online, |text| connection.send(text));
    }

    fn handle_event(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Connected { endpoint } => {
                log::info!("Session open on {}", endpoint);
                self.client_state.rearm_handshake();
                self.player.consumers_mut().reset_session();
            }
            ConnectionEvent::SessionStarted => {
                log::info!("Session started, clearing scene");
                self.player.delete_all_instances();
                self.keyframe_rate.reset();
            }
            ConnectionEvent::Message(text) => self.handle_message(&text, now),
            ConnectionEvent::Disconnected {
                endpoint,
                reason,
                messages_received,
            } => {
                log::warn!(
                    "Lost connection to {} ({}, {} messages)",
                    endpoint,
                    reason.as_str(),
                    messages_received
                );
            }
        }
    }

    pub fn handle_message(&mut self, text: &str, now: Instant) {
        let envelope = match KeyframeEnvelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Dropping message: {}", e);
                return;
            }
        };

        self.keyframe_rate.record(now);
        self.player.set_keyframe_rate(self.keyframe_rate.rate());

        for keyframe in envelope.keyframes {
            self.player.process_keyframe(keyframe, now);
        }
    }

    /// Reports where the viewer is; feeds both the consumers and the outbound head pose.
    pub fn set_view(&mut self, view: ViewState) {
        self.player.set_view(view);
        if let Some(pose) = self.client_state.pose.as_mut() {
            pose.head = (view.head_position, view.head_rotation);
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn keyframe_rate(&self) -> f32 {
        self.keyframe_rate.rate()
    }

    pub fn player(&self) -> &ReplayPlayer<L> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut ReplayPlayer<L> {
        &mut self.player
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<T> {
        &mut self.connection
    }

    pub fn client_state_mut(&mut self) -> &mut ClientStateAggregator {
        &mut self.client_state
    }

    pub fn shutdown(&mut self) {
        self.connection.shutdown();
        self.player.delete_all_instances();
    }
}
