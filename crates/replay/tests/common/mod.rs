#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use replay::net::{Endpoint, Socket, SocketState, Transport, TransportError};
use replay::scene::{LoadedAsset, NodeHandle, ResourceLoader};

#[derive(Debug)]
pub struct SocketInner {
    pub state: SocketState,
    pub inbox: VecDeque<String>,
    pub sent: Vec<String>,
    pub closed_by_client: bool,
}

#[derive(Debug, Clone)]
pub struct SocketHandle {
    pub endpoint: Endpoint,
    inner: Rc<RefCell<SocketInner>>,
}

impl SocketHandle {
    pub fn open(&self) {
        self.inner.borrow_mut().state = SocketState::Open;
    }

    pub fn close(&self) {
        self.inner.borrow_mut().state = SocketState::Closed;
    }

    pub fn push(&self, text: &str) {
        self.inner.borrow_mut().inbox.push_back(text.to_string());
    }

    pub fn push_many(&self, count: usize) {
        for _ in 0..count {
            self.push(r#"{"keyframes":[]}"#);
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.borrow().sent.clone()
    }

    pub fn closed_by_client(&self) -> bool {
        self.inner.borrow().closed_by_client
    }

    pub fn state(&self) -> SocketState {
        self.inner.borrow().state
    }
}

pub struct MockSocket {
    inner: Rc<RefCell<SocketInner>>,
}

impl Socket for MockSocket {
    fn state(&self) -> SocketState {
        self.inner.borrow().state
    }

    fn try_recv(&mut self) -> Option<String> {
        let mut inner = self.inner.borrow_mut();
        if inner.state != SocketState::Open {
            return None;
        }
        inner.inbox.pop_front()
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        if inner.state != SocketState::Open {
            return Err(TransportError::NotOpen);
        }
        inner.sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.state = SocketState::Closed;
        inner.closed_by_client = true;
    }
}

/// Records every socket it opens so tests can drive them by hand.
#[derive(Clone, Default)]
pub struct MockTransport {
    opened: Rc<RefCell<Vec<SocketHandle>>>,
    refused: Rc<RefCell<HashSet<Endpoint>>>,
}

impl MockTransport {
    pub fn socket(&self, index: usize) -> SocketHandle {
        self.opened.borrow()[index].clone()
    }

    pub fn last(&self) -> SocketHandle {
        self.opened
            .borrow()
            .last()
            .cloned()
            .expect("no socket opened")
    }

    pub fn opened(&self) -> usize {
        self.opened.borrow().len()
    }

    pub fn refuse(&self, endpoint: Endpoint) {
        self.refused.borrow_mut().insert(endpoint);
    }
}

impl Transport for MockTransport {
    type Socket = MockSocket;

    fn open(&mut self, endpoint: &Endpoint) -> Result<MockSocket, TransportError> {
        if self.refused.borrow().contains(endpoint) {
            return Err(TransportError::Connect {
                endpoint: endpoint.clone(),
                reason: "refused".into(),
            });
        }

        let inner = Rc::new(RefCell::new(SocketInner {
            state: SocketState::Connecting,
            inbox: VecDeque::new(),
            sent: Vec::new(),
            closed_by_client: false,
        }));
        self.opened.borrow_mut().push(SocketHandle {
            endpoint: endpoint.clone(),
            inner: inner.clone(),
        });
        Ok(MockSocket { inner })
    }
}

#[derive(Debug, Default)]
pub struct LoaderLog {
    pub loaded: Vec<String>,
    pub destroyed: Vec<NodeHandle>,
    pub reclaims: usize,
}

/// Loads anything except paths starting with `missing`; `skinned*` assets carry three bones.
#[derive(Clone, Default)]
pub struct MockLoader {
    next: Rc<RefCell<u64>>,
    pub log: Rc<RefCell<LoaderLog>>,
}

impl ResourceLoader for MockLoader {
    fn load(&mut self, filepath: &str) -> Option<LoadedAsset> {
        if filepath.starts_with("missing") {
            return None;
        }
        let mut next = self.next.borrow_mut();
        *next += 1;
        self.log.borrow_mut().loaded.push(filepath.to_string());

        let node = NodeHandle(*next);
        if filepath.starts_with("skinned") {
            let bones = vec!["root".to_string(), "hip".to_string(), "knee".to_string()];
            Some(LoadedAsset::skinned(node, bones))
        } else {
            Some(LoadedAsset::new(node))
        }
    }

    fn destroy(&mut self, node: NodeHandle) {
        self.log.borrow_mut().destroyed.push(node);
    }

    fn reclaim_unused(&mut self) {
        self.log.borrow_mut().reclaims += 1;
    }
}
