//! Outbound UDP transports, one per bridge generation.
//!
//! Neither protocol acknowledges commands, so a transport only reports local
//! socket failures and, for v6, handshake failures. Sockets are opened lazily
//! on the first send and dropped after an error so the next send starts
//! fresh.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::config::V6Config;
use crate::errors::Error;
use crate::protocol::v6::{self, SessionId};
use crate::protocol::{Frame, FramePayload};
use crate::runtime::{self, AsyncUdpSocket, BoxFuture, Instant, UdpSocket};
use crate::types::Generation;

type Result<T> = std::result::Result<T, Error>;

/// Command port of legacy bridges.
pub const LEGACY_PORT: u16 = 8899;
/// Command port of v6 bridges.
pub const V6_PORT: u16 = 5987;

/// Writes encoded frames to one bridge.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Write one frame to the bridge.
    fn send<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<()>>;

    /// Forget any session state; the next send starts a new session.
    fn refresh(&self);
}

/// Builds the transport for a bridge at a given address.
pub trait TransportFactory: Send + Sync {
    fn create(&self, ip: Ipv4Addr, generation: Generation, config: &V6Config) -> Arc<dyn Transport>;
}

/// The real UDP transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransportFactory;

impl TransportFactory for UdpTransportFactory {
    fn create(&self, ip: Ipv4Addr, generation: Generation, config: &V6Config) -> Arc<dyn Transport> {
        match generation {
            Generation::Legacy => Arc::new(LegacyTransport::new(ip)),
            Generation::V6 => Arc::new(V6Transport::new(ip, config)),
        }
    }
}

async fn open_socket() -> Result<UdpSocket> {
    UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .map_err(|e| Error::socket("bind", e))
}

/// Connectionless 3-byte frames to port 8899.
pub struct LegacyTransport {
    target: SocketAddr,
    socket: runtime::Mutex<Option<UdpSocket>>,
}

impl LegacyTransport {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            target: SocketAddr::from((ip, LEGACY_PORT)),
            socket: runtime::Mutex::new(None),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut slot = self.socket.lock().await;
        let socket = match slot.take() {
            Some(socket) => socket,
            None => open_socket().await?,
        };
        socket
            .send_to(bytes, self.target)
            .await
            .map_err(|e| Error::socket("send_to", e))?;
        *slot = Some(socket);
        Ok(())
    }
}

impl fmt::Debug for LegacyTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyTransport")
            .field("target", &self.target)
            .finish()
    }
}

impl Transport for LegacyTransport {
    fn send<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &frame.payload {
                FramePayload::Legacy(bytes) => self.write(bytes).await,
                FramePayload::V6 { .. } => Err(Error::validation(
                    "frame",
                    "v6 frame on a legacy transport",
                )),
            }
        })
    }

    fn refresh(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct Session {
    id: SessionId,
    last_used: Instant,
}

/// Session-based frames to port 5987.
///
/// A session is established on demand and re-established once it has been
/// idle for longer than the configured timeout, since bridges forget
/// sessions when power cycled.
pub struct V6Transport {
    ip: Ipv4Addr,
    idle_timeout: Duration,
    handshake_timeout: Duration,
    socket: runtime::Mutex<Option<UdpSocket>>,
    session: Mutex<Option<Session>>,
    sequence: AtomicU8,
}

impl V6Transport {
    pub fn new(ip: Ipv4Addr, config: &V6Config) -> Self {
        Self {
            ip,
            idle_timeout: config.session_idle_timeout,
            handshake_timeout: config.handshake_timeout,
            socket: runtime::Mutex::new(None),
            session: Mutex::new(None),
            sequence: AtomicU8::new(0),
        }
    }

    fn live_session(&self) -> Option<SessionId> {
        let session = *self.session.lock().unwrap_or_else(|e| e.into_inner());
        session
            .filter(|s| s.last_used.elapsed() < self.idle_timeout)
            .map(|s| s.id)
    }

    fn touch(&self, id: SessionId) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(Session {
            id,
            last_used: Instant::now(),
        });
    }

    async fn connect(&self) -> Result<UdpSocket> {
        let socket = open_socket().await?;
        socket
            .connect(SocketAddr::from((self.ip, V6_PORT)))
            .await
            .map_err(|e| Error::socket("connect", e))?;
        Ok(socket)
    }

    async fn handshake(&self, socket: &UdpSocket) -> Result<SessionId> {
        debug!("Requesting v6 session from {}", self.ip);
        socket
            .send(&v6::SESSION_REQUEST)
            .await
            .map_err(|e| Error::socket("send", e))?;

        let mut buffer = [0u8; 64];
        let size = runtime::timeout(self.handshake_timeout, socket.recv(&mut buffer))
            .await
            .map_err(|_| Error::handshake(self.ip, "no reply"))?
            .map_err(|e| Error::socket("recv", e))?;

        v6::parse_session_reply(&buffer[..size])
            .ok_or_else(|| Error::handshake(self.ip, format!("unexpected reply of {size} bytes")))
    }

    async fn write(&self, command: &[u8; 9], zone: u8) -> Result<()> {
        let mut slot = self.socket.lock().await;
        let socket = match slot.take() {
            Some(socket) => socket,
            None => self.connect().await?,
        };

        let session = match self.live_session() {
            Some(id) => id,
            None => self.handshake(&socket).await?,
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let packet = v6::envelope(session, sequence, command, zone);
        socket
            .send(&packet)
            .await
            .map_err(|e| Error::socket("send", e))?;

        self.touch(session);
        *slot = Some(socket);
        Ok(())
    }
}

impl fmt::Debug for V6Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("V6Transport")
            .field("ip", &self.ip)
            .field("session", &self.live_session())
            .finish()
    }
}

impl Transport for V6Transport {
    fn send<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &frame.payload {
                FramePayload::V6 { command, zone } => {
                    let result = self.write(command, *zone).await;
                    if let Err(e) = &result {
                        warn!("Send to v6 bridge {} failed: {e}", self.ip);
                        self.refresh();
                    }
                    result
                }
                FramePayload::Legacy(_) => Err(Error::validation(
                    "frame",
                    "legacy frame on a v6 transport",
                )),
            }
        })
    }

    fn refresh(&self) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_generation() {
        let config = V6Config::default();
        let ip = Ipv4Addr::new(192, 168, 1, 50);
        let legacy = UdpTransportFactory.create(ip, Generation::Legacy, &config);
        let v6 = UdpTransportFactory.create(ip, Generation::V6, &config);
        assert!(format!("{legacy:?}").contains("8899"));
        assert!(format!("{v6:?}").starts_with("V6Transport"));
    }

    #[test]
    fn test_refresh_drops_session() {
        let transport = V6Transport::new(Ipv4Addr::LOCALHOST, &V6Config::default());
        transport.touch(SessionId(1, 2));
        assert_eq!(transport.live_session(), Some(SessionId(1, 2)));
        transport.refresh();
        assert_eq!(transport.live_session(), None);
    }

    #[test]
    fn test_idle_session_is_stale() {
        let config = V6Config {
            session_idle_timeout: Duration::ZERO,
            ..V6Config::default()
        };
        let transport = V6Transport::new(Ipv4Addr::LOCALHOST, &config);
        transport.touch(SessionId(1, 2));
        assert_eq!(transport.live_session(), None);
    }

    #[tokio::test]
    async fn test_wrong_generation_frame_is_rejected() {
        let transport = LegacyTransport::new(Ipv4Addr::LOCALHOST);
        let frame = Frame::v6([0x31, 0, 0, 0x07, 0x03, 0x01, 0, 0, 0], 1);
        let err = transport.send(&frame).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_v6_handshake_and_envelope() {
        let bridge = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = bridge.local_addr().unwrap().port();
        let transport = V6Transport::new(Ipv4Addr::LOCALHOST, &V6Config::default());

        let fake_bridge = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, peer) = bridge.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &v6::SESSION_REQUEST);
            let mut reply = [0u8; 22];
            reply[0] = 0x28;
            reply[19] = 0xAA;
            reply[20] = 0xBB;
            bridge.send_to(&reply, peer).await.unwrap();
            let (n, _) = bridge.recv_from(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        // Point the transport at the fake bridge's ephemeral port.
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .unwrap();
        socket
            .connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .await
            .unwrap();
        *transport.socket.lock().await = Some(socket);

        let frame = Frame::v6([0x31, 0, 0, 0x08, 0x04, 0x01, 0, 0, 0], 2);
        transport.send(&frame).await.unwrap();

        let packet = fake_bridge.await.unwrap();
        assert_eq!(packet.len(), 22);
        assert_eq!(&packet[5..7], &[0xAA, 0xBB]);
        assert_eq!(packet[19], 2);
        assert_eq!(transport.live_session(), Some(SessionId(0xAA, 0xBB)));
    }
}
