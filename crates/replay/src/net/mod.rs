mod connection;
mod endpoint;
mod params;
mod rate;
mod transport;

pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, DisconnectReason, STATUS_ALL_SERVERS_BUSY,
    STATUS_DISCONNECTED, STATUS_SERVER_BUSY, STATUS_UNREACHABLE,
};
pub use endpoint::{DEFAULT_PORT, Endpoint, parse_location, random_start_index, resolve_candidates};
pub use params::{
    ConnectionParams, SERVER_HOSTNAME, SERVER_PORT, SERVER_PORT_RANGE, is_valid_hostname,
};
pub use rate::RateMeter;
pub use transport::{Socket, SocketState, Transport, TransportError};
