use super::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot connect to {endpoint}: {reason}")]
    Connect { endpoint: Endpoint, reason: String },
    #[error("socket is not open")]
    NotOpen,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text-message socket polled by the connection manager; never blocks.
pub trait Socket {
    fn state(&self) -> SocketState;

    fn try_recv(&mut self) -> Option<String>;

    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    fn close(&mut self);
}

pub trait Transport {
    type Socket: Socket;

    /// Starts connecting; the returned socket reports `Connecting` until the handshake ends.
    fn open(&mut self, endpoint: &Endpoint) -> Result<Self::Socket, TransportError>;
}
