//! Newline-delimited JSON over TCP, driven by tasks on the viewer's tokio runtime.
//!
//! The replay crate polls sockets once per frame; the tasks here feed channels that
//! `try_recv` drains without blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use replay::net::{Endpoint, Socket, SocketState, Transport, TransportError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Upper bound for a single TCP connect; the connection manager has its own, shorter, deadline.
const CONNECT_LIMIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn set(&self, state: u8) {
        // Closed is terminal.
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != CLOSED).then_some(state)
            });
    }

    fn get(&self) -> SocketState {
        match self.0.load(Ordering::SeqCst) {
            CONNECTING => SocketState::Connecting,
            OPEN => SocketState::Open,
            _ => SocketState::Closed,
        }
    }
}

pub struct TcpTransport {
    runtime: Handle,
}

impl TcpTransport {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Transport for TcpTransport {
    type Socket = TcpSocket;

    fn open(&mut self, endpoint: &Endpoint) -> Result<TcpSocket, TransportError> {
        let state = SharedState::default();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<String>();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<String>();

        let task = self.runtime.spawn(run_connection(
            endpoint.clone(),
            state.clone(),
            incoming_tx,
            outgoing_rx,
        ));

        Ok(TcpSocket {
            state,
            incoming: incoming_rx,
            outgoing: Some(outgoing_tx),
            task,
        })
    }
}

async fn run_connection(
    endpoint: Endpoint,
    state: SharedState,
    incoming: mpsc::UnboundedSender<String>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let address = endpoint.to_string();
    let stream = match tokio::time::timeout(CONNECT_LIMIT, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            log::debug!("Connect to {} failed: {}", endpoint, e);
            state.set(CLOSED);
            return;
        }
        Err(_) => {
            log::debug!("Connect to {} gave up", endpoint);
            state.set(CLOSED);
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    state.set(OPEN);

    let (read_half, write_half) = stream.into_split();

    let writer_state = state.clone();
    let writer = tokio::spawn(async move {
        let mut writer = BufWriter::new(write_half);
        while let Some(text) = outgoing.recv().await {
            let written = async {
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                log::warn!("Write failed: {}", e);
                writer_state.set(CLOSED);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if incoming.send(trimmed.to_string()).is_err() {
                    break;
                }
            }
            Ok(None) => {
                log::debug!("{} closed the connection", endpoint);
                break;
            }
            Err(e) => {
                log::warn!("Read from {} failed: {}", endpoint, e);
                break;
            }
        }
    }

    state.set(CLOSED);
    writer.abort();
}

pub struct TcpSocket {
    state: SharedState,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    task: JoinHandle<()>,
}

impl Socket for TcpSocket {
    fn state(&self) -> SocketState {
        // Lines that arrived before the close are still delivered.
        match self.state.get() {
            SocketState::Closed if !self.incoming.is_empty() => SocketState::Open,
            state => state,
        }
    }

    fn try_recv(&mut self) -> Option<String> {
        self.incoming.try_recv().ok()
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.state.get() != SocketState::Open {
            return Err(TransportError::NotOpen);
        }
        let Some(outgoing) = &self.outgoing else {
            return Err(TransportError::NotOpen);
        };
        outgoing
            .send(text.to_string())
            .map_err(|_| TransportError::NotOpen)
    }

    fn close(&mut self) {
        self.state.set(CLOSED);
        self.outgoing = None;
        self.task.abort();
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}
