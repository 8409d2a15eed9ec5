//! Bridge discovery via UDP broadcast.
//!
//! Bridges listen on port 48899 for an ASCII probe and answer with
//! `ip,mac[,model]`. Legacy (v3-v5) bridges answer `Link_Wi-Fi`; v6 bridges
//! answer `HF-A11ASSISTHREAD` and report the `HF-LPB100` model.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::runtime::{self, AsyncUdpSocket, BoxFuture, Instant, UdpSocket};
use crate::types::{Generation, MacAddress};

type Result<T> = std::result::Result<T, Error>;

/// Port bridges answer discovery probes on.
pub const DISCOVERY_PORT: u16 = 48899;

const LEGACY_PROBE: &[u8] = b"Link_Wi-Fi";
const V6_PROBE: &[u8] = b"HF-A11ASSISTHREAD";

/// Which bridge generations a discovery pass probes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    Legacy,
    V6,
    #[default]
    All,
}

impl DiscoveryKind {
    fn probes(self) -> &'static [&'static [u8]] {
        match self {
            DiscoveryKind::Legacy => &[LEGACY_PROBE],
            DiscoveryKind::V6 => &[V6_PROBE],
            DiscoveryKind::All => &[LEGACY_PROBE, V6_PROBE],
        }
    }
}

/// A bridge that answered a discovery probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredBridge {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    /// Model string from the reply, when the bridge sent one.
    pub model: Option<String>,
    pub generation: Generation,
}

/// Parse one discovery reply.
///
/// The IP field wins over the datagram's source address; the source is only
/// used when the field does not parse. Replies without a valid MAC are
/// rejected.
///
/// # Examples
///
/// ```
/// use milight_rs::Generation;
/// use milight_rs::discovery::parse_reply;
///
/// let bridge = parse_reply("192.168.1.20,ACCF23A1B2C3,HF-LPB100", None).unwrap();
/// assert_eq!(bridge.ip.to_string(), "192.168.1.20");
/// assert_eq!(bridge.generation, Generation::V6);
///
/// let legacy = parse_reply("192.168.1.21,ACCF23A1B2C4,", None).unwrap();
/// assert_eq!(legacy.model, None);
/// assert_eq!(legacy.generation, Generation::Legacy);
///
/// assert!(parse_reply("Link_Wi-Fi", None).is_none());
/// ```
pub fn parse_reply(reply: &str, source: Option<Ipv4Addr>) -> Option<DiscoveredBridge> {
    let mut fields = reply.trim().split(',').map(str::trim);
    let ip_field = fields.next()?;
    let mac: MacAddress = fields.next()?.parse().ok()?;
    let model = fields
        .next()
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    let ip = ip_field.parse().ok().or(source)?;
    let generation = Generation::from_model(model.as_deref());
    Some(DiscoveredBridge {
        ip,
        mac,
        model,
        generation,
    })
}

/// Options for a manager-level discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Register found bridges as temporary (pairing sessions).
    pub temp: bool,
    /// Override the configured listen timeout.
    pub timeout: Option<Duration>,
    /// Override the configured probe kind.
    pub kind: Option<DiscoveryKind>,
    /// Skip the single retry that follows an empty pass.
    pub no_retry: bool,
}

impl DiscoverOptions {
    pub fn temp() -> Self {
        Self {
            temp: true,
            ..Self::default()
        }
    }
}

/// Source of discovery passes.
///
/// [`UdpDiscoverer`] broadcasts on the local network; tests substitute a
/// scripted implementation.
pub trait Discoverer: Send + Sync {
    fn discover(
        &self,
        kind: DiscoveryKind,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredBridge>>>;
}

/// Broadcast discovery on `255.255.255.255:48899`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpDiscoverer;

impl Discoverer for UdpDiscoverer {
    fn discover(
        &self,
        kind: DiscoveryKind,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredBridge>>> {
        Box::pin(discover_bridges(kind, timeout))
    }
}

/// Broadcast one discovery pass and collect replies until `discovery_timeout`.
///
/// An empty result is not an error; only socket setup failures are.
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use milight_rs::discovery::{DiscoveryKind, discover_bridges};
///
/// let bridges = discover_bridges(DiscoveryKind::All, Duration::from_secs(3)).await?;
/// for bridge in bridges {
///     println!("{} {} {}", bridge.mac, bridge.ip, bridge.generation);
/// }
/// ```
pub async fn discover_bridges(
    kind: DiscoveryKind,
    discovery_timeout: Duration,
) -> Result<Vec<DiscoveredBridge>> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .map_err(|e| Error::socket("bind", e))?;

    socket
        .set_broadcast(true)
        .map_err(|e| Error::socket("set_broadcast", e))?;

    let target = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, DISCOVERY_PORT));
    info!("Starting bridge discovery ({kind:?})");
    for probe in kind.probes() {
        socket
            .send_to(probe, target)
            .await
            .map_err(|e| Error::socket("send_to", e))?;
    }

    let mut replies = ReplySet::new(kind);
    let start = Instant::now();
    let mut buffer = [0u8; 512];
    let recv_timeout = Duration::from_millis(500);

    while start.elapsed() < discovery_timeout {
        let remaining = discovery_timeout.saturating_sub(start.elapsed());
        match runtime::timeout(recv_timeout.min(remaining), socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, addr))) => {
                let source = match addr {
                    SocketAddr::V4(v4) => Some(*v4.ip()),
                    SocketAddr::V6(_) => None,
                };
                replies.add(&buffer[..size], source);
            }
            Ok(Err(e)) => {
                debug!("Discovery receive error: {e}");
                runtime::sleep(error_backoff(remaining)).await;
            }
            Err(_) => continue,
        }
    }

    let bridges = replies.into_bridges();
    info!("Discovery finished, {} bridge(s) found", bridges.len());
    Ok(bridges)
}

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Pause after a failed receive so a socket stuck in an error state does not
/// spin the loop.
fn error_backoff(remaining: Duration) -> Duration {
    RECV_ERROR_BACKOFF.min(remaining)
}

/// Replies of one discovery pass, one entry per MAC.
///
/// When a bridge answers more than once, a reply that carries a model wins
/// over one that does not, so a v6 bridge answering the legacy probe as well
/// keeps its generation.
struct ReplySet {
    kind: DiscoveryKind,
    bridges: HashMap<MacAddress, DiscoveredBridge>,
}

impl ReplySet {
    fn new(kind: DiscoveryKind) -> Self {
        Self {
            kind,
            bridges: HashMap::new(),
        }
    }

    fn add(&mut self, datagram: &[u8], source: Option<Ipv4Addr>) {
        // Our own broadcast probes loop back on some hosts
        if self.kind.probes().iter().any(|p| *p == datagram) {
            return;
        }
        let Ok(reply) = std::str::from_utf8(datagram) else {
            debug!("Ignoring non-text discovery reply from {source:?}");
            return;
        };
        let Some(bridge) = parse_reply(reply, source) else {
            warn!("Malformed discovery reply from {source:?}: {reply:?}");
            return;
        };

        debug!("Discovery reply from {}: {reply:?}", bridge.ip);
        match self.bridges.entry(bridge.mac) {
            Entry::Occupied(mut known) => {
                if bridge.model.is_some() || known.get().model.is_none() {
                    known.insert(bridge);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(bridge);
            }
        }
    }

    fn into_bridges(self) -> Vec<DiscoveredBridge> {
        let mut bridges: Vec<_> = self.bridges.into_values().collect();
        bridges.sort_by_key(|b| b.mac);
        bridges
    }
}
