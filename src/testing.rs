//! In-memory transports and discoverers for unit tests.

use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{ManagerConfig, PacingConfig, V6Config};
use crate::discovery::{DiscoveredBridge, Discoverer, DiscoveryKind};
use crate::errors::Error;
use crate::protocol::Frame;
use crate::runtime::{self, BoxFuture};
use crate::transport::{Transport, TransportFactory};
use crate::types::{Generation, MacAddress};

/// Pacing short enough for tests; frames are written once.
pub(crate) fn fast_pacing() -> PacingConfig {
    PacingConfig {
        debounce: Duration::from_millis(10),
        frame_gap: Duration::from_millis(1),
        command_repeat: 1,
    }
}

pub(crate) fn test_config() -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.pacing = fast_pacing();
    config.discovery.timeout = Duration::from_millis(5);
    config.poll_interval = Duration::from_millis(20);
    config
}

pub(crate) fn mac(last: u8) -> MacAddress {
    MacAddress::new([0xAC, 0xCF, 0x23, 0x00, 0x00, last])
}

pub(crate) fn found(last: u8, ip: Ipv4Addr, generation: Generation) -> DiscoveredBridge {
    DiscoveredBridge {
        ip,
        mac: mac(last),
        model: (generation == Generation::V6).then(|| "HF-LPB100".to_string()),
        generation,
    }
}

#[derive(Debug)]
pub(crate) struct SentFrame {
    pub ip: Ipv4Addr,
    pub frame: Frame,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    sent: Mutex<Vec<SentFrame>>,
    created: Mutex<Vec<(Ipv4Addr, Generation)>>,
    failing: AtomicBool,
    refreshes: AtomicUsize,
}

/// Records every frame written through the transports it creates.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransportFactory {
    state: Arc<MockState>,
}

impl MockTransportFactory {
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.state.sent.lock().unwrap().iter().map(|s| s.frame).collect()
    }

    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.frames().iter().map(Frame::body).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.state.sent.lock().unwrap().iter().map(|s| s.at).collect()
    }

    pub fn sent_to(&self) -> Vec<Ipv4Addr> {
        self.state.sent.lock().unwrap().iter().map(|s| s.ip).collect()
    }

    pub fn created(&self) -> Vec<(Ipv4Addr, Generation)> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.state.sent.lock().unwrap().clear();
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, ip: Ipv4Addr, generation: Generation, _config: &V6Config) -> Arc<dyn Transport> {
        self.state.created.lock().unwrap().push((ip, generation));
        Arc::new(MockTransport {
            ip,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
struct MockTransport {
    ip: Ipv4Addr,
    state: Arc<MockState>,
}

impl Transport for MockTransport {
    fn send<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if self.state.failing.load(Ordering::SeqCst) {
                return Err(Error::socket(
                    "send_to",
                    io::Error::new(io::ErrorKind::HostUnreachable, "unreachable"),
                ));
            }
            self.state.sent.lock().unwrap().push(SentFrame {
                ip: self.ip,
                frame: *frame,
                at: Instant::now(),
            });
            Ok(())
        })
    }

    fn refresh(&self) {
        self.state.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Script {
    bridges: Mutex<Vec<DiscoveredBridge>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

/// Answers every discovery pass with the bridges currently set.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedDiscoverer {
    script: Arc<Script>,
}

impl ScriptedDiscoverer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            script: Arc::new(Script {
                delay,
                ..Script::default()
            }),
        }
    }

    pub fn set(&self, bridges: Vec<DiscoveredBridge>) {
        *self.script.bridges.lock().unwrap() = bridges;
    }

    pub fn set_failing(&self, failing: bool) {
        self.script.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }
}

impl Discoverer for ScriptedDiscoverer {
    fn discover(
        &self,
        _kind: DiscoveryKind,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredBridge>, Error>> {
        Box::pin(async move {
            self.script.calls.fetch_add(1, Ordering::SeqCst);
            if !self.script.delay.is_zero() {
                runtime::sleep(self.script.delay).await;
            }
            if self.script.failing.load(Ordering::SeqCst) {
                return Err(Error::socket(
                    "bind",
                    io::Error::new(io::ErrorKind::AddrInUse, "in use"),
                ));
            }
            Ok(self.script.bridges.lock().unwrap().clone())
        })
    }
}
