//! In-memory doubles for the target, its connection, transports and process
//! launching.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connect::launch::{ProcessLauncher, TargetProcess};
use crate::connect::transport::{Connection, ListenKey, TransportService};
use crate::error::{JdiError, Result};
use crate::request::{Reply, Request, RequestExecutor};

type Scripted = std::result::Result<Reply, u16>;

/// Scripted [`RequestExecutor`]. Answers are looked up by exact request;
/// one-shot answers take precedence over sticky ones.
#[derive(Debug, Default)]
pub struct MockTarget {
    sticky: Mutex<HashMap<Request, Scripted>>,
    once: Mutex<HashMap<Request, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Request>>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every future `request` with `reply`.
    pub fn reply(&self, request: Request, reply: Reply) {
        self.sticky.lock().insert(request, Ok(reply));
    }

    /// Answers the next `request` with `reply`.
    pub fn reply_once(&self, request: Request, reply: Reply) {
        self.once
            .lock()
            .entry(request)
            .or_default()
            .push_back(Ok(reply));
    }

    /// Fails every future `request` with the given JDWP error code.
    pub fn fail(&self, request: Request, error_code: u16) {
        self.sticky.lock().insert(request, Err(error_code));
    }

    /// Fails the next `request` with the given JDWP error code.
    pub fn fail_once(&self, request: Request, error_code: u16) {
        self.once
            .lock()
            .entry(request)
            .or_default()
            .push_back(Err(error_code));
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, request: &Request) -> usize {
        self.calls.lock().iter().filter(|r| *r == request).count()
    }
}

impl RequestExecutor for MockTarget {
    fn execute(&self, _connection: &mut dyn Connection, request: &Request) -> Result<Reply> {
        self.calls.lock().push(request.clone());
        let queued = self
            .once
            .lock()
            .get_mut(request)
            .and_then(VecDeque::pop_front);
        let scripted = match queued {
            Some(scripted) => scripted,
            None => self.sticky.lock().get(request).cloned().ok_or_else(|| {
                JdiError::Protocol(format!("no scripted reply for {}", request.name()))
            })?,
        };
        scripted.map_err(|error_code| JdiError::CommandFailed { error_code })
    }
}

/// A [`Connection`] that records written packets and replays queued ones.
#[derive(Debug)]
pub struct MockConnection {
    incoming: VecDeque<Vec<u8>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
    fail_close: bool,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            incoming: VecDeque::new(),
            written: Arc::default(),
            closed: Arc::default(),
            fail_close: false,
        }
    }

    /// Makes `close` report a transport error after marking the connection
    /// closed.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn with_incoming(mut self, packet: Vec<u8>) -> Self {
        self.incoming.push_back(packet);
        self
    }

    /// Shared flag set once the connection is closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    pub fn written(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.written.clone()
    }
}

impl Connection for MockConnection {
    fn read_packet(&mut self) -> Result<Vec<u8>> {
        if !self.is_open() {
            return Err(JdiError::transport("connection closed"));
        }
        Ok(self.incoming.pop_front().unwrap_or_default())
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(JdiError::transport("connection closed"));
        }
        self.written.lock().push(packet.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if self.fail_close {
            return Err(JdiError::transport("connection reset while closing"));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Attach { address: String, timeout_ms: u64 },
    /// Carries the resolved listen address.
    StartListening(String),
    Accept(String),
    StopListening(String),
}

/// In-memory [`TransportService`]. Wildcard listens get ports counting up
/// from 40000; every accept or attach yields a fresh [`MockConnection`].
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    events: Mutex<Vec<TransportEvent>>,
    listening: Mutex<HashSet<ListenKey>>,
    next_port: AtomicU16,
    fail_accept: AtomicBool,
    fail_attach: AtomicBool,
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Mutex::default(),
            listening: Mutex::default(),
            next_port: AtomicU16::new(40_000),
            fail_accept: AtomicBool::new(false),
            fail_attach: AtomicBool::new(false),
        }
    }

    pub fn fail_accept(&self, fail: bool) {
        self.fail_accept.store(fail, Ordering::Relaxed);
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::Relaxed);
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().clone()
    }

    /// Addresses currently listened on.
    pub fn listening(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self
            .listening
            .lock()
            .iter()
            .map(|key| key.address().to_string())
            .collect();
        addresses.sort();
        addresses
    }

    fn record(&self, event: TransportEvent) {
        self.events.lock().push(event);
    }
}

impl TransportService for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("in-memory {} transport", self.name)
    }

    fn attach(
        &self,
        address: &str,
        attach_timeout_ms: u64,
        _handshake_timeout_ms: u64,
    ) -> Result<Box<dyn Connection>> {
        self.record(TransportEvent::Attach {
            address: address.to_string(),
            timeout_ms: attach_timeout_ms,
        });
        if self.fail_attach.load(Ordering::Relaxed) {
            return Err(JdiError::transport(format!("connection refused: {address}")));
        }
        Ok(Box::new(MockConnection::new()))
    }

    fn start_listening(&self, address: Option<&str>) -> Result<ListenKey> {
        let address = address.map(str::trim).unwrap_or_default();
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("", address),
        };
        let host = if host.is_empty() { "localhost" } else { host };
        let port = match port {
            "" | "0" => self.next_port.fetch_add(1, Ordering::Relaxed).to_string(),
            port => port.to_string(),
        };
        let key = ListenKey::new(format!("{host}:{port}"));
        if !self.listening.lock().insert(key.clone()) {
            return Err(JdiError::transport(format!(
                "address already in use: {}",
                key.address()
            )));
        }
        self.record(TransportEvent::StartListening(key.address().to_string()));
        Ok(key)
    }

    fn accept(
        &self,
        key: &ListenKey,
        _accept_timeout_ms: u64,
        _handshake_timeout_ms: u64,
    ) -> Result<Box<dyn Connection>> {
        self.record(TransportEvent::Accept(key.address().to_string()));
        if !self.listening.lock().contains(key) {
            return Err(JdiError::transport(format!(
                "not listening on {}",
                key.address()
            )));
        }
        if self.fail_accept.load(Ordering::Relaxed) {
            return Err(JdiError::transport("timed out waiting for a connection"));
        }
        Ok(Box::new(MockConnection::new()))
    }

    fn stop_listening(&self, key: &ListenKey) -> Result<()> {
        self.record(TransportEvent::StopListening(key.address().to_string()));
        if self.listening.lock().remove(key) {
            Ok(())
        } else {
            Err(JdiError::transport(format!(
                "not listening on {}",
                key.address()
            )))
        }
    }
}

/// A [`TargetProcess`] that only records whether it was killed.
#[derive(Debug)]
pub struct MockProcess {
    id: u32,
    killed: Arc<AtomicBool>,
}

impl TargetProcess for MockProcess {
    fn id(&self) -> u32 {
        self.id
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::Release);
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.killed.load(Ordering::Acquire).then_some(-1))
    }
}

/// [`ProcessLauncher`] that records argv lists and hands out [`MockProcess`]es.
#[derive(Debug, Default)]
pub struct MockLauncher {
    launched: Mutex<Vec<Vec<String>>>,
    killed: Mutex<Vec<Arc<AtomicBool>>>,
    next_id: AtomicU32,
    fail: AtomicBool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1_000),
            ..Self::default()
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn launched(&self) -> Vec<Vec<String>> {
        self.launched.lock().clone()
    }

    /// Whether the `n`th launched process has been killed.
    pub fn was_killed(&self, n: usize) -> bool {
        self.killed
            .lock()
            .get(n)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, argv: &[String]) -> Result<Box<dyn TargetProcess>> {
        self.launched.lock().push(argv.to_vec());
        if self.fail.load(Ordering::Relaxed) {
            return Err(JdiError::Launch {
                command: argv.join(" "),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        let killed = Arc::new(AtomicBool::new(false));
        self.killed.lock().push(killed.clone());
        Ok(Box::new(MockProcess {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            killed,
        }))
    }
}
