pub mod client;
pub mod client_state;
pub mod config;
pub mod consumers;
pub mod coords;
pub mod keyframe;
pub mod net;
pub mod player;
pub mod scene;

pub use client::ReplayClient;
pub use client_state::{
    ClientState, ClientStateAggregator, ClientStateProducer, KeyboardProducer, MouseButton,
    MouseProducer, PoseProducer,
};
pub use config::{ClientConfig, ConfigError};
pub use consumers::{ConsumerSet, FrameContext, MessageConsumer, ViewState};
pub use keyframe::{DecodeError, Keyframe, KeyframeEnvelope, Message};
pub use net::{
    ConnectionEvent, ConnectionManager, ConnectionParams, Endpoint, Socket, SocketState,
    Transport, TransportError,
};
pub use player::ReplayPlayer;
pub use scene::{LoadedAsset, NodeHandle, ResourceLoader, SceneInstance, SceneRegistry, TransformMode};
