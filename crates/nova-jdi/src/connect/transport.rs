//! Byte-level connections and the transport services that produce them.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{JdiError, Result};

pub(crate) const HANDSHAKE: &[u8] = b"JDWP-Handshake";

/// A negotiated, handshaken link to a target.
///
/// Packets are whole JDWP packets including the 11-byte header; the first
/// four bytes carry the big-endian packet length.
pub trait Connection: Send {
    /// Reads the next packet. Returns an empty packet at end of stream.
    fn read_packet(&mut self) -> Result<Vec<u8>>;

    fn write_packet(&mut self, packet: &[u8]) -> Result<()>;

    /// Closes the link. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Identifies one listening endpoint of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenKey {
    address: String,
}

impl ListenKey {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The segment after the last `:`, if the address has one.
    pub fn port(&self) -> Option<&str> {
        self.address
            .rsplit_once(':')
            .map(|(_, port)| port)
            .filter(|port| !port.is_empty())
    }
}

/// A named mechanism for reaching targets (TCP sockets, local sockets, ...).
///
/// Timeouts are in milliseconds; `0` waits indefinitely.
pub trait TransportService: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    fn attach(
        &self,
        address: &str,
        attach_timeout_ms: u64,
        handshake_timeout_ms: u64,
    ) -> Result<Box<dyn Connection>>;

    /// Starts listening on `address`, or on a transport-chosen address when
    /// `None` or empty.
    fn start_listening(&self, address: Option<&str>) -> Result<ListenKey>;

    fn accept(
        &self,
        key: &ListenKey,
        accept_timeout_ms: u64,
        handshake_timeout_ms: u64,
    ) -> Result<Box<dyn Connection>>;

    fn stop_listening(&self, key: &ListenKey) -> Result<()>;
}

pub(crate) fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Stops listening on drop, whatever path the owner leaves by.
pub(crate) struct ListenGuard<'a> {
    transport: &'a dyn TransportService,
    key: ListenKey,
}

impl<'a> ListenGuard<'a> {
    pub(crate) fn new(transport: &'a dyn TransportService, key: ListenKey) -> Self {
        Self { transport, key }
    }

    pub(crate) fn key(&self) -> &ListenKey {
        &self.key
    }
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.transport.stop_listening(&self.key) {
            tracing::warn!(
                target: "nova.jdi",
                address = self.key.address(),
                error = %err,
                "failed to stop listening"
            );
        }
    }
}

/// Stream operations [`StreamConnection`] needs beyond `Read + Write`.
pub(crate) trait TransportStream: Read + Write + Send + 'static {
    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn shutdown_both(&self) -> io::Result<()>;
}

impl TransportStream for std::net::TcpStream {
    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
}

#[cfg(unix)]
impl TransportStream for std::os::unix::net::UnixStream {
    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
}

/// Exchanges the JDWP handshake. The debugger side always speaks first,
/// whichever side opened the connection.
pub(crate) fn handshake<S: TransportStream>(stream: &mut S, timeout_ms: u64) -> Result<()> {
    stream
        .set_read_deadline(timeout_from_ms(timeout_ms))
        .map_err(|err| JdiError::transport_io("failed to set handshake timeout", err))?;

    stream
        .write_all(HANDSHAKE)
        .and_then(|()| stream.flush())
        .map_err(|err| JdiError::transport_io("failed to send handshake", err))?;

    let mut reply = [0u8; HANDSHAKE.len()];
    stream
        .read_exact(&mut reply)
        .map_err(|err| JdiError::transport_io("failed to read handshake reply", err))?;
    if reply != HANDSHAKE {
        return Err(JdiError::transport(format!(
            "handshake failed: received {:?}",
            String::from_utf8_lossy(&reply)
        )));
    }

    stream
        .set_read_deadline(None)
        .map_err(|err| JdiError::transport_io("failed to clear handshake timeout", err))
}

/// A [`Connection`] over any byte stream, framed by the JDWP length prefix.
pub struct StreamConnection<S> {
    stream: S,
    open: bool,
}

impl<S: TransportStream> StreamConnection<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self { stream, open: true }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(JdiError::transport("connection closed"))
        }
    }
}

impl<S: TransportStream> Connection for StreamConnection<S> {
    fn read_packet(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(Vec::new()),
            Err(err) => return Err(JdiError::transport_io("failed to read packet", err)),
        }
        let length = u32::from_be_bytes(len_buf) as usize;
        crate::validate_jdwp_packet_length(length).map_err(JdiError::Protocol)?;

        let mut packet = Vec::new();
        packet.try_reserve_exact(length).map_err(|_| {
            JdiError::Protocol(format!("unable to allocate packet buffer ({length} bytes)"))
        })?;
        packet.extend_from_slice(&len_buf);
        packet.resize(length, 0);
        self.stream
            .read_exact(&mut packet[4..])
            .map_err(|err| JdiError::transport_io("failed to read packet", err))?;
        Ok(packet)
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if packet.len() < crate::JDWP_HEADER_LEN {
            return Err(JdiError::Protocol(format!(
                "packet is too short ({} bytes)",
                packet.len()
            )));
        }
        let declared = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]) as usize;
        if declared != packet.len() {
            return Err(JdiError::Protocol(format!(
                "packet length prefix {declared} does not match packet size {}",
                packet.len()
            )));
        }
        self.stream
            .write_all(packet)
            .and_then(|()| self.stream.flush())
            .map_err(|err| JdiError::transport_io("failed to write packet", err))
    }

    fn close(&mut self) -> Result<()> {
        if !std::mem::replace(&mut self.open, false) {
            return Ok(());
        }
        match self.stream.shutdown_both() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(JdiError::transport_io("failed to close connection", err)),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

type TransportConstructor = fn() -> Result<Arc<dyn TransportService>>;

/// Platform-local transports, by name, in probing order.
const NATIVE_TRANSPORTS: &[(&str, TransportConstructor)] = &[("UnixSocket", unix_socket_transport)];

fn unix_socket_transport() -> Result<Arc<dyn TransportService>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(crate::connect::socket::UnixSocketTransport::new()))
    }
    #[cfg(not(unix))]
    {
        Err(JdiError::transport(
            "local sockets are not supported on this platform",
        ))
    }
}

/// The first of `preferred` that can be constructed here, else TCP sockets.
///
/// Construction failures are logged and skipped.
pub fn default_transport(preferred: &[String]) -> Arc<dyn TransportService> {
    for name in preferred {
        let Some((_, construct)) = NATIVE_TRANSPORTS.iter().find(|(n, _)| n == name) else {
            if name != crate::connect::socket::SOCKET_TRANSPORT_NAME {
                tracing::debug!(target: "nova.jdi", transport = %name, "unknown transport");
            }
            continue;
        };
        match construct() {
            Ok(transport) => return transport,
            Err(err) => {
                tracing::debug!(
                    target: "nova.jdi",
                    transport = %name,
                    error = %err,
                    "transport unavailable"
                );
            }
        }
    }
    Arc::new(crate::connect::socket::SocketTransport::new())
}
