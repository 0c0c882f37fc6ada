//! TCP and local-socket transports built on `std`.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connect::transport::{
    handshake, timeout_from_ms, Connection, ListenKey, StreamConnection, TransportService,
};
use crate::error::{JdiError, Result};

pub const SOCKET_TRANSPORT_NAME: &str = "Socket";
pub const UNIX_SOCKET_TRANSPORT_NAME: &str = "UnixSocket";

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Splits `host:port` (or a bare port) into its parts. Brackets around IPv6
/// hosts are removed.
pub(crate) fn split_address(address: &str) -> Result<(&str, u16)> {
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host.trim_start_matches('[').trim_end_matches(']'), port),
        None => ("", address),
    };
    let port = port.trim().parse().map_err(|_| {
        JdiError::argument(
            "address",
            format!("unable to parse port number in address `{address}`"),
        )
    })?;
    Ok((host, port))
}

/// A bound listener shared between `accept` callers and `stop_listening`.
/// The socket stays non-blocking for its whole life so every acceptor polls
/// and notices `stopped`; the socket closes when the last handle drops.
#[derive(Debug)]
struct Listening<L> {
    listener: L,
    stopped: AtomicBool,
}

impl<L> Listening<L> {
    fn new(listener: L) -> Arc<Self> {
        Arc::new(Self {
            listener,
            stopped: AtomicBool::new(false),
        })
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Polls `accept` until a peer arrives, `timeout` expires or the
    /// listener is stopped.
    fn accept_within<T>(
        &self,
        timeout: Option<Duration>,
        mut accept: impl FnMut(&L) -> io::Result<T>,
    ) -> Result<T> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Err(JdiError::transport(
                    "stopped listening while waiting for a connection",
                ));
            }
            match accept(&self.listener) {
                Ok(stream) => return Ok(stream),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                        if Instant::now() >= deadline {
                            return Err(JdiError::transport(format!(
                                "timed out after {}ms waiting for a connection",
                                timeout.as_millis()
                            )));
                        }
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(JdiError::transport_io("accept failed", err)),
            }
        }
    }
}

/// JDWP over TCP. Addresses are `host:port` or a bare port.
#[derive(Debug, Default)]
pub struct SocketTransport {
    listeners: Mutex<HashMap<ListenKey, Arc<Listening<TcpListener>>>>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect(addr: &SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
        match timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        }
    }
}

impl TransportService for SocketTransport {
    fn name(&self) -> &str {
        SOCKET_TRANSPORT_NAME
    }

    fn description(&self) -> String {
        "Socket transport".to_string()
    }

    fn attach(
        &self,
        address: &str,
        attach_timeout_ms: u64,
        handshake_timeout_ms: u64,
    ) -> Result<Box<dyn Connection>> {
        let (host, port) = split_address(address)?;
        let host = if host.is_empty() { "localhost" } else { host };
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|err| JdiError::transport_io(format!("unable to resolve `{host}`"), err))?
            .collect();

        let timeout = timeout_from_ms(attach_timeout_ms);
        let mut last_err = None;
        for addr in &addrs {
            match Self::connect(addr, timeout) {
                Ok(mut stream) => {
                    let _ = stream.set_nodelay(true);
                    handshake(&mut stream, handshake_timeout_ms)?;
                    tracing::debug!(target: "nova.jdi", %addr, "attached over socket");
                    return Ok(Box::new(StreamConnection::new(stream)));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) => JdiError::transport_io(format!("unable to connect to {host}:{port}"), err),
            None => JdiError::transport(format!("`{host}` did not resolve to any address")),
        })
    }

    fn start_listening(&self, address: Option<&str>) -> Result<ListenKey> {
        let address = address.map(str::trim).unwrap_or_default();
        let (host, port) = if address.is_empty() {
            ("", 0)
        } else {
            split_address(address)?
        };
        let bind_host = match host {
            "" | "localhost" => "127.0.0.1",
            "*" => "0.0.0.0",
            other => other,
        };
        let listener = TcpListener::bind((bind_host, port)).map_err(|err| {
            JdiError::transport_io(format!("unable to listen on {bind_host}:{port}"), err)
        })?;
        let bound = listener
            .local_addr()
            .map_err(|err| JdiError::transport_io("unable to read listening address", err))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| JdiError::transport_io("unable to configure listener", err))?;

        let display_host = match host {
            "" => "localhost",
            other => other,
        };
        let key = ListenKey::new(format!("{display_host}:{}", bound.port()));
        tracing::debug!(target: "nova.jdi", address = key.address(), "listening on socket");
        self.listeners.lock().insert(key.clone(), Listening::new(listener));
        Ok(key)
    }

    fn accept(
        &self,
        key: &ListenKey,
        accept_timeout_ms: u64,
        handshake_timeout_ms: u64,
    ) -> Result<Box<dyn Connection>> {
        let listening = self.listeners.lock().get(key).cloned().ok_or_else(|| {
            JdiError::transport(format!("not listening on {}", key.address()))
        })?;

        let (mut stream, peer) = listening
            .accept_within(timeout_from_ms(accept_timeout_ms), TcpListener::accept)?;
        drop(listening);
        stream
            .set_nonblocking(false)
            .map_err(|err| JdiError::transport_io("accept failed", err))?;
        let _ = stream.set_nodelay(true);
        handshake(&mut stream, handshake_timeout_ms)?;
        tracing::debug!(target: "nova.jdi", %peer, address = key.address(), "accepted socket connection");
        Ok(Box::new(StreamConnection::new(stream)))
    }

    fn stop_listening(&self, key: &ListenKey) -> Result<()> {
        match self.listeners.lock().remove(key) {
            Some(listening) => {
                listening.stop();
                tracing::debug!(target: "nova.jdi", address = key.address(), "stopped listening");
                Ok(())
            }
            None => Err(JdiError::transport(format!(
                "not listening on {}",
                key.address()
            ))),
        }
    }
}

#[cfg(unix)]
pub use unix::UnixSocketTransport;

#[cfg(unix)]
mod unix {
    use std::collections::HashMap;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{Listening, UNIX_SOCKET_TRANSPORT_NAME};
    use crate::connect::transport::{
        handshake, timeout_from_ms, Connection, ListenKey, StreamConnection, TransportService,
    };
    use crate::error::{JdiError, Result};

    /// JDWP over local stream sockets. Addresses are filesystem paths.
    #[derive(Debug, Default)]
    pub struct UnixSocketTransport {
        listeners: Mutex<HashMap<ListenKey, (Arc<Listening<UnixListener>>, PathBuf)>>,
        next_path: AtomicU64,
    }

    impl UnixSocketTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn fresh_path(&self) -> PathBuf {
            let n = self.next_path.fetch_add(1, Ordering::Relaxed);
            std::env::temp_dir().join(format!("nova-jdi-{}-{n}.sock", std::process::id()))
        }
    }

    impl TransportService for UnixSocketTransport {
        fn name(&self) -> &str {
            UNIX_SOCKET_TRANSPORT_NAME
        }

        fn description(&self) -> String {
            "Local socket transport".to_string()
        }

        fn attach(
            &self,
            address: &str,
            _attach_timeout_ms: u64,
            handshake_timeout_ms: u64,
        ) -> Result<Box<dyn Connection>> {
            let mut stream = UnixStream::connect(address)
                .map_err(|err| JdiError::transport_io(format!("unable to connect to {address}"), err))?;
            handshake(&mut stream, handshake_timeout_ms)?;
            tracing::debug!(target: "nova.jdi", address, "attached over local socket");
            Ok(Box::new(StreamConnection::new(stream)))
        }

        fn start_listening(&self, address: Option<&str>) -> Result<ListenKey> {
            let path = match address.map(str::trim) {
                Some(path) if !path.is_empty() => PathBuf::from(path),
                _ => self.fresh_path(),
            };
            let listener = UnixListener::bind(&path).map_err(|err| {
                JdiError::transport_io(format!("unable to listen on {}", path.display()), err)
            })?;
            if let Err(err) = listener.set_nonblocking(true) {
                let _ = std::fs::remove_file(&path);
                return Err(JdiError::transport_io("unable to configure listener", err));
            }
            let key = ListenKey::new(path.display().to_string());
            tracing::debug!(target: "nova.jdi", address = key.address(), "listening on local socket");
            self.listeners
                .lock()
                .insert(key.clone(), (Listening::new(listener), path));
            Ok(key)
        }

        fn accept(
            &self,
            key: &ListenKey,
            accept_timeout_ms: u64,
            handshake_timeout_ms: u64,
        ) -> Result<Box<dyn Connection>> {
            let listening = self
                .listeners
                .lock()
                .get(key)
                .map(|(listening, _)| Arc::clone(listening))
                .ok_or_else(|| {
                    JdiError::transport(format!("not listening on {}", key.address()))
                })?;

            let (mut stream, _) = listening
                .accept_within(timeout_from_ms(accept_timeout_ms), UnixListener::accept)?;
            drop(listening);
            stream
                .set_nonblocking(false)
                .map_err(|err| JdiError::transport_io("accept failed", err))?;
            handshake(&mut stream, handshake_timeout_ms)?;
            Ok(Box::new(StreamConnection::new(stream)))
        }

        fn stop_listening(&self, key: &ListenKey) -> Result<()> {
            let Some((listening, path)) = self.listeners.lock().remove(key) else {
                return Err(JdiError::transport(format!(
                    "not listening on {}",
                    key.address()
                )));
            };
            listening.stop();
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(JdiError::transport_io(
                    format!("unable to remove {}", path.display()),
                    err,
                )),
            }
        }
    }
}
