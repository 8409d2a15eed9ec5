//! A physical bridge: its zones, send queue, liveness and lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::{ManagerConfig, V6Config};
use crate::dispatch::CommandQueue;
use crate::errors::Error;
use crate::events::{BridgeEvent, EventHub, ListenerId};
use crate::history::HistoryEntry;
use crate::transport::TransportFactory;
use crate::types::{Generation, MacAddress, ZoneType};
use crate::zone::Zone;

type Result<T> = std::result::Result<T, Error>;

/// Slot of the v6 bridge's own light within the RGBW zone set.
pub const BRIDGE_LIGHT_SLOT: u8 = 5;

/// Reachability of a bridge as seen by discovery and by the send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Liveness {
    /// Reachable; `missed` counts consecutive discovery passes without a reply.
    Online { missed: u32 },
    /// Marked offline until it answers discovery again.
    Offline,
}

fn zone_layout(generation: Generation) -> Vec<(ZoneType, u8)> {
    let mut layout = vec![(ZoneType::Rgb, 1)];
    layout.extend((0..=4).map(|n| (ZoneType::Rgbw, n)));
    if generation == Generation::V6 {
        layout.push((ZoneType::BridgeLight, BRIDGE_LIGHT_SLOT));
        layout.extend((0..=4).map(|n| (ZoneType::Rgbww, n)));
    }
    layout.extend((0..=4).map(|n| (ZoneType::White, n)));
    layout
}

/// A bridge known to a [`crate::BridgeManager`].
///
/// The hardware address identifies the bridge for its whole life; the IP
/// may change and is updated in place, keeping every zone's cached state.
pub struct Bridge {
    mac: MacAddress,
    generation: Generation,
    ip: Mutex<Ipv4Addr>,
    temp: AtomicBool,
    destroyed: AtomicBool,
    liveness: Mutex<Liveness>,
    devices: Mutex<BTreeSet<String>>,
    zones: Vec<Arc<Zone>>,
    queue: CommandQueue,
    factory: Arc<dyn TransportFactory>,
    v6_config: V6Config,
    events: EventHub,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Bridge {
    pub(crate) fn new(
        mac: MacAddress,
        ip: Ipv4Addr,
        generation: Generation,
        temp: bool,
        config: &ManagerConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Bridge>| {
            let this = this.clone();
            let transport = factory.create(ip, generation, &config.v6);
            let queue = CommandQueue::new(
                mac,
                config.pacing.clone(),
                transport,
                Box::new(move |err: &Error| {
                    if let Some(bridge) = this.upgrade() {
                        bridge.transport_failed(err);
                    }
                }),
            );

            let zones = zone_layout(generation)
                .into_iter()
                .map(|(zone_type, number)| {
                    let offset = config.hue_calibration.offset(generation, zone_type);
                    Arc::new(Zone::new(
                        mac,
                        zone_type,
                        number,
                        generation,
                        offset,
                        queue.clone(),
                    ))
                })
                .collect();

            Bridge {
                mac,
                generation,
                ip: Mutex::new(ip),
                temp: AtomicBool::new(temp),
                destroyed: AtomicBool::new(false),
                liveness: Mutex::new(Liveness::Online { missed: 0 }),
                devices: Mutex::new(BTreeSet::new()),
                zones,
                queue,
                factory,
                v6_config: config.v6.clone(),
                events: EventHub::default(),
            }
        })
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        *lock(&self.ip)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether the bridge was only registered for a pairing session.
    pub fn is_temp(&self) -> bool {
        self.temp.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_temp(&self) {
        self.temp.store(false, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn liveness(&self) -> Liveness {
        *lock(&self.liveness)
    }

    pub fn is_online(&self) -> bool {
        matches!(self.liveness(), Liveness::Online { .. })
    }

    /// Look up a zone. Number 0 is treated as 1; on v6 bridges RGBW slot 5 is
    /// the bridge's own light.
    pub fn zone(&self, zone_type: ZoneType, number: u8) -> Result<Arc<Zone>> {
        let slot = number.max(1);
        self.zones
            .iter()
            .filter(|z| !z.is_group())
            .find(|z| match zone_type {
                ZoneType::BridgeLight => z.zone_type() == ZoneType::BridgeLight,
                ZoneType::Rgbw if slot == BRIDGE_LIGHT_SLOT => {
                    z.zone_type() == ZoneType::BridgeLight
                }
                _ => z.zone_type() == zone_type && z.number() == slot,
            })
            .cloned()
            .ok_or(Error::ZoneNotFound { zone_type, number })
    }

    /// The zones of one type, group zone excluded. The RGBW set of a v6
    /// bridge includes the bridge light.
    pub fn zones(&self, zone_type: ZoneType) -> Vec<Arc<Zone>> {
        self.zones
            .iter()
            .filter(|z| !z.is_group())
            .filter(|z| {
                z.zone_type() == zone_type
                    || (zone_type == ZoneType::Rgbw && z.zone_type() == ZoneType::BridgeLight)
            })
            .cloned()
            .collect()
    }

    pub fn all_zones(&self) -> Vec<Arc<Zone>> {
        self.zones.iter().filter(|z| !z.is_group()).cloned().collect()
    }

    /// The zone addressing every zone of a type at once.
    pub fn group_zone(&self, zone_type: ZoneType) -> Result<Arc<Zone>> {
        self.zones
            .iter()
            .find(|z| z.is_group() && z.zone_type() == zone_type)
            .cloned()
            .ok_or(Error::ZoneNotFound {
                zone_type,
                number: 0,
            })
    }

    /// Point the bridge at a new address. Queued frames go out through the
    /// new transport; zone state is kept. Returns whether the IP changed.
    pub fn update_ip_address(&self, ip: Ipv4Addr) -> bool {
        {
            let mut current = lock(&self.ip);
            if *current == ip {
                return false;
            }
            info!("Bridge {} moved from {} to {ip}", self.mac, *current);
            *current = ip;
        }
        let transport = self.factory.create(ip, self.generation, &self.v6_config);
        self.queue.swap_transport(transport);
        true
    }

    /// Drop the v6 session so the next send performs a new handshake.
    pub fn refresh_session(&self) {
        self.queue.refresh_transport();
    }

    pub fn register_device(&self, device_id: impl Into<String>) {
        lock(&self.devices).insert(device_id.into());
    }

    /// Forget a device; the bridge destroys itself once none remain.
    pub fn deregister_device(&self, device_id: &str) {
        let empty = {
            let mut devices = lock(&self.devices);
            devices.remove(device_id);
            devices.is_empty()
        };
        if empty {
            self.destroy();
        }
    }

    pub fn devices(&self) -> Vec<String> {
        lock(&self.devices).iter().cloned().collect()
    }

    /// Stop accepting commands and emit [`BridgeEvent::Destroy`]. Only the
    /// first call has an effect.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Destroying bridge {}", self.mac);
        self.queue.close();
        self.events.emit(BridgeEvent::Destroy);
    }

    pub fn on_online<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events
            .subscribe(Some(BridgeEvent::Online), Arc::new(move |_: &BridgeEvent| listener()))
    }

    pub fn on_offline<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events
            .subscribe(Some(BridgeEvent::Offline), Arc::new(move |_: &BridgeEvent| listener()))
    }

    pub fn on_destroy<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events
            .subscribe(Some(BridgeEvent::Destroy), Arc::new(move |_: &BridgeEvent| listener()))
    }

    /// Listen to every lifecycle event.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(None, Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Discovery saw the bridge at `ip`.
    pub(crate) fn mark_seen(&self, ip: Ipv4Addr) {
        self.update_ip_address(ip);
        let recovered = {
            let mut liveness = lock(&self.liveness);
            let was_offline = *liveness == Liveness::Offline;
            *liveness = Liveness::Online { missed: 0 };
            was_offline
        };
        if recovered {
            if self.generation == Generation::V6 {
                self.refresh_session();
            }
            info!("Bridge {} is back online", self.mac);
            self.events.emit(BridgeEvent::Online);
        }
    }

    /// Discovery did not see the bridge. It goes offline once its misses
    /// exceed `threshold`.
    pub(crate) fn mark_missed(&self, threshold: u32) {
        let went_offline = {
            let mut liveness = lock(&self.liveness);
            match *liveness {
                Liveness::Online { missed } if missed + 1 > threshold => {
                    *liveness = Liveness::Offline;
                    true
                }
                Liveness::Online { missed } => {
                    *liveness = Liveness::Online { missed: missed + 1 };
                    false
                }
                Liveness::Offline => false,
            }
        };
        if went_offline {
            warn!("Bridge {} missed discovery, marking offline", self.mac);
            self.events.emit(BridgeEvent::Offline);
        }
    }

    fn transport_failed(&self, err: &Error) {
        let went_offline = {
            let mut liveness = lock(&self.liveness);
            let was_online = *liveness != Liveness::Offline;
            *liveness = Liveness::Offline;
            was_online
        };
        if went_offline {
            warn!("Bridge {} unreachable: {err}", self.mac);
            self.events.emit(BridgeEvent::Offline);
        }
    }

    /// Batches recently flushed to the bridge.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.queue.history_entries()
    }

    /// Snapshot of the bridge for debugging.
    pub fn diagnostics(&self) -> Value {
        let zones: Vec<Value> = self
            .all_zones()
            .iter()
            .map(|z| json!({"id": z.id(), "name": z.name(), "state": z.state()}))
            .collect();

        json!({
            "mac": self.mac.to_string(),
            "ip": self.ip().to_string(),
            "generation": self.generation,
            "liveness": self.liveness(),
            "temp": self.is_temp(),
            "destroyed": self.is_destroyed(),
            "devices": self.devices(),
            "pending_frames": self.queue.pending_frames(),
            "listeners": self.events.len(),
            "zones": zones,
            "history": self.queue.history_summary(),
        })
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("mac", &self.mac)
            .field("ip", &self.ip())
            .field("generation", &self.generation)
            .field("liveness", &self.liveness())
            .field("temp", &self.is_temp())
            .finish()
    }
}
