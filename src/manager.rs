//! Registry of bridges keyed by hardware address.
//!
//! The manager runs discovery (one pass at a time, shared by concurrent
//! callers), reconciles the results with its registry and tracks liveness by
//! re-running discovery on an interval.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::Shared;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::config::ManagerConfig;
use crate::discovery::{DiscoverOptions, DiscoveredBridge, Discoverer, DiscoveryKind, UdpDiscoverer};
use crate::errors::Error;
use crate::runtime::{self, BoxFuture};
use crate::transport::{TransportFactory, UdpTransportFactory};
use crate::types::{Generation, MacAddress};

type Result<T> = std::result::Result<T, Error>;

type PassOutcome = std::result::Result<Vec<DiscoveredBridge>, Arc<Error>>;
type SharedPass = Shared<BoxFuture<'static, PassOutcome>>;

/// A bridge to register, as reported by discovery or restored from device
/// settings. Fields are optional so incomplete records fail with a clear error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCandidate {
    pub ip: Option<Ipv4Addr>,
    pub mac: Option<String>,
    pub model: Option<String>,
    /// Takes precedence over the generation inferred from `model`.
    pub generation: Option<Generation>,
}

impl From<DiscoveredBridge> for BridgeCandidate {
    fn from(bridge: DiscoveredBridge) -> Self {
        Self {
            ip: Some(bridge.ip),
            mac: Some(bridge.mac.to_string()),
            model: bridge.model,
            generation: Some(bridge.generation),
        }
    }
}

/// Registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeQuery {
    pub mac: MacAddress,
    /// Skip bridges currently marked offline.
    pub available: bool,
}

impl BridgeQuery {
    pub fn available(mac: MacAddress) -> Self {
        Self {
            mac,
            available: true,
        }
    }
}

impl From<MacAddress> for BridgeQuery {
    fn from(mac: MacAddress) -> Self {
        Self {
            mac,
            available: false,
        }
    }
}

struct ManagerInner {
    config: ManagerConfig,
    discoverer: Arc<dyn Discoverer>,
    factory: Arc<dyn TransportFactory>,
    bridges: Mutex<HashMap<MacAddress, Arc<Bridge>>>,
    in_flight: Mutex<Option<SharedPass>>,
    polling: AtomicBool,
    /// Set by `stop_polling`; registration no longer starts the poll loop.
    polling_stopped: AtomicBool,
    /// Incremented on every start/stop so a stale poll loop exits.
    poll_generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ManagerInner {
    fn remove(&self, bridge: &Arc<Bridge>) -> bool {
        let mut bridges = lock(&self.bridges);
        let same = bridges
            .get(&bridge.mac())
            .is_some_and(|registered| Arc::ptr_eq(registered, bridge));
        if same {
            bridges.remove(&bridge.mac());
            info!("Deregistered bridge {}", bridge.mac());
        }
        same
    }
}

/// Owns every known bridge.
///
/// Cloning is cheap and yields a handle to the same registry.
///
/// # Examples
///
/// ```ignore
/// use milight_rs::{BridgeManager, ManagerConfig, ZoneType};
/// use milight_rs::discovery::DiscoverOptions;
///
/// let manager = BridgeManager::new(ManagerConfig::default());
///
/// for bridge in manager.discover_bridges(DiscoverOptions::default()).await? {
///     let zone = bridge.zone(ZoneType::Rgbw, 1)?;
///     zone.set_hue(0.6).await?;
/// }
/// ```
#[derive(Clone)]
pub struct BridgeManager {
    inner: Arc<ManagerInner>,
}

impl BridgeManager {
    /// A manager using UDP broadcast discovery and UDP transports.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_parts(config, Arc::new(UdpDiscoverer), Arc::new(UdpTransportFactory))
    }

    pub fn with_parts(
        config: ManagerConfig,
        discoverer: Arc<dyn Discoverer>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                discoverer,
                factory,
                bridges: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(None),
                polling: AtomicBool::new(false),
                polling_stopped: AtomicBool::new(false),
                poll_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Registered bridges, ordered by hardware address.
    pub fn bridges(&self) -> Vec<Arc<Bridge>> {
        let mut bridges: Vec<_> = lock(&self.inner.bridges).values().cloned().collect();
        bridges.sort_by_key(|b| b.mac());
        bridges
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.bridges).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.bridges).is_empty()
    }

    /// Look up a registered bridge.
    pub fn get_bridge(&self, query: impl Into<BridgeQuery>) -> Result<Arc<Bridge>> {
        let query = query.into();
        lock(&self.inner.bridges)
            .get(&query.mac)
            .filter(|b| !query.available || b.is_online())
            .cloned()
            .ok_or(Error::CouldNotFindBridge(query.mac))
    }

    /// Register a bridge, or refresh the registered one with the same MAC.
    ///
    /// A known bridge keeps its identity: its IP is updated when it changed,
    /// and `temp == false` makes it permanent. A permanent bridge never
    /// becomes temporary again.
    ///
    /// The first registration starts liveness polling unless
    /// [`stop_polling`](Self::stop_polling) was called, so it must happen
    /// inside the async runtime.
    pub fn register_bridge(
        &self,
        candidate: impl Into<BridgeCandidate>,
        temp: bool,
    ) -> Result<Arc<Bridge>> {
        let candidate = candidate.into();
        let ip = candidate.ip.ok_or(Error::MissingBridgeIp)?;
        let mac: MacAddress = candidate
            .mac
            .as_deref()
            .ok_or(Error::MissingBridgeMac)?
            .parse()?;
        let generation = candidate
            .generation
            .unwrap_or_else(|| Generation::from_model(candidate.model.as_deref()));

        let mut bridges = lock(&self.inner.bridges);
        if let Some(registered) = bridges.get(&mac).filter(|b| !b.is_destroyed()) {
            debug!("Bridge {mac} already registered");
            registered.update_ip_address(ip);
            if !temp {
                registered.clear_temp();
            }
            return Ok(Arc::clone(registered));
        }

        info!("Registering bridge {mac} at {ip} ({generation}, temp: {temp})");
        let bridge = Bridge::new(
            mac,
            ip,
            generation,
            temp,
            &self.inner.config,
            Arc::clone(&self.inner.factory),
        );

        let manager: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let instance: Weak<Bridge> = Arc::downgrade(&bridge);
        bridge.on_destroy(move || {
            if let (Some(manager), Some(bridge)) = (manager.upgrade(), instance.upgrade()) {
                manager.remove(&bridge);
            }
        });

        bridges.insert(mac, Arc::clone(&bridge));
        drop(bridges);

        if !self.inner.polling_stopped.load(Ordering::SeqCst) {
            self.start_polling();
        }
        Ok(bridge)
    }

    /// Remove a bridge from the registry. Only that exact instance is
    /// removed; a newer bridge registered under the same MAC stays.
    pub fn deregister_bridge(&self, bridge: &Arc<Bridge>) -> bool {
        self.inner.remove(bridge)
    }

    /// Destroy every bridge still registered as temporary.
    pub fn deregister_temp_bridges(&self) -> usize {
        let temporary: Vec<_> = lock(&self.inner.bridges)
            .values()
            .filter(|b| b.is_temp())
            .cloned()
            .collect();

        for bridge in &temporary {
            bridge.destroy();
            self.inner.remove(bridge);
        }
        debug!("Removed {} temporary bridge(s)", temporary.len());
        temporary.len()
    }

    /// One discovery pass, shared with any pass already in flight.
    fn shared_pass(&self, kind: DiscoveryKind, timeout: Duration) -> SharedPass {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(pass) = slot.as_ref() {
            debug!("Joining discovery pass in flight");
            return pass.clone();
        }

        let discoverer = Arc::clone(&self.inner.discoverer);
        let manager = Arc::downgrade(&self.inner);
        let pass: BoxFuture<'static, PassOutcome> = Box::pin(async move {
            let outcome = discoverer.discover(kind, timeout).await.map_err(Arc::new);
            if let Some(manager) = manager.upgrade() {
                *lock(&manager.in_flight) = None;
            }
            outcome
        });

        let shared = pass.shared();
        *slot = Some(shared.clone());
        shared
    }

    async fn discover(&self, kind: DiscoveryKind, timeout: Duration) -> Result<Vec<DiscoveredBridge>> {
        self.shared_pass(kind, timeout)
            .await
            .map_err(Error::Discovery)
    }

    /// Discover bridges and register every one found.
    ///
    /// An empty pass is retried once unless `no_retry` is set. Bridges that
    /// answer count as seen for liveness tracking.
    pub async fn discover_bridges(&self, options: DiscoverOptions) -> Result<Vec<Arc<Bridge>>> {
        let kind = options.kind.unwrap_or(self.inner.config.discovery.kind);
        let timeout = options.timeout.unwrap_or(self.inner.config.discovery.timeout);
        let mut retry = !options.no_retry;

        loop {
            let found = self.discover(kind, timeout).await?;
            info!("Discovery found {} bridge(s)", found.len());

            let mut registered = Vec::with_capacity(found.len());
            for candidate in found {
                let ip = candidate.ip;
                let bridge = self.register_bridge(candidate, options.temp)?;
                bridge.mark_seen(ip);
                registered.push(bridge);
            }

            if !registered.is_empty() || !retry {
                return Ok(registered);
            }
            debug!("No bridges found, retrying discovery once");
            retry = false;
        }
    }

    /// Return an available bridge, discovering once if it is unknown or
    /// marked offline.
    pub async fn find_bridge(&self, mac: MacAddress) -> Result<Arc<Bridge>> {
        if let Ok(bridge) = self.get_bridge(BridgeQuery::available(mac)) {
            return Ok(bridge);
        }

        debug!("Bridge {mac} not available, starting discovery");
        self.discover_bridges(DiscoverOptions::default()).await?;
        self.get_bridge(BridgeQuery::available(mac))
            .map_err(|_| Error::BridgeNotFoundAfterDiscovering(mac))
    }

    /// Run one liveness tick: discover, then mark every registered bridge as
    /// seen or missed. Does nothing while the registry is empty.
    pub async fn poll_liveness(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let discovery = &self.inner.config.discovery;
        let found = self.discover(discovery.kind, discovery.timeout).await?;
        debug!("Liveness pass found {} bridge(s)", found.len());

        for bridge in self.bridges() {
            match found.iter().find(|f| f.mac == bridge.mac()) {
                Some(reply) => bridge.mark_seen(reply.ip),
                None => bridge.mark_missed(self.inner.config.offline_threshold),
            }
        }
        Ok(())
    }

    /// Run [`poll_liveness`](Self::poll_liveness) every poll interval in a
    /// background task. Returns `false` if polling was already running.
    ///
    /// Registering the first bridge calls this automatically.
    pub fn start_polling(&self) -> bool {
        self.inner.polling_stopped.store(false, Ordering::SeqCst);
        if self.inner.polling.swap(true, Ordering::SeqCst) {
            return false;
        }
        let generation = self.inner.poll_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let interval = self.inner.config.poll_interval;
        let manager = Arc::downgrade(&self.inner);
        info!("Polling bridge liveness every {interval:?}");

        runtime::spawn(async move {
            loop {
                runtime::sleep(interval).await;
                let Some(inner) = manager.upgrade() else {
                    break;
                };
                if !inner.polling.load(Ordering::SeqCst)
                    || inner.poll_generation.load(Ordering::SeqCst) != generation
                {
                    break;
                }
                let handle = BridgeManager { inner };
                if let Err(e) = handle.poll_liveness().await {
                    warn!("Liveness poll failed: {e}");
                }
            }
        });
        true
    }

    /// Stop the poll loop. Later registrations do not restart it; call
    /// [`start_polling`](Self::start_polling) to resume.
    pub fn stop_polling(&self) {
        self.inner.polling_stopped.store(true, Ordering::SeqCst);
        if self.inner.polling.swap(false, Ordering::SeqCst) {
            self.inner.poll_generation.fetch_add(1, Ordering::SeqCst);
            info!("Stopped polling bridge liveness");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.polling.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for BridgeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeManager")
            .field("bridges", &self.bridges())
            .field("polling", &self.is_polling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::bridge::Liveness;
    use crate::events::BridgeEvent;
    use crate::testing::{MockTransportFactory, ScriptedDiscoverer, found, mac, test_config};
    use crate::types::ZoneType;

    const IP_A: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
    const IP_B: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 51);

    fn build(
        config: ManagerConfig,
        discoverer: &ScriptedDiscoverer,
    ) -> (BridgeManager, MockTransportFactory) {
        let factory = MockTransportFactory::default();
        let manager = BridgeManager::with_parts(
            config,
            Arc::new(discoverer.clone()),
            Arc::new(factory.clone()),
        );
        (manager, factory)
    }

    /// Background ticks are an hour apart, so tests drive liveness by hand.
    fn manager_with(discoverer: &ScriptedDiscoverer) -> (BridgeManager, MockTransportFactory) {
        let mut config = test_config();
        config.poll_interval = Duration::from_secs(3600);
        build(config, discoverer)
    }

    /// Polls every 20ms.
    fn polling_manager(discoverer: &ScriptedDiscoverer) -> (BridgeManager, MockTransportFactory) {
        build(test_config(), discoverer)
    }

    fn events(bridge: &Bridge) -> Arc<Mutex<Vec<BridgeEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bridge.subscribe(move |e| sink.lock().unwrap().push(*e));
        log
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (manager, _) = manager_with(&ScriptedDiscoverer::default());
        let first = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), true)
            .unwrap();
        let second = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), true)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
        assert!(first.is_temp());

        manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        assert!(!first.is_temp());
        manager
            .register_bridge(found(1, IP_A, Generation::Legacy), true)
            .unwrap();
        assert!(!first.is_temp());
    }

    #[tokio::test]
    async fn test_register_rejects_incomplete_candidates() {
        let (manager, _) = manager_with(&ScriptedDiscoverer::default());
        let no_ip = BridgeCandidate {
            mac: Some("AABBCCDDEEFF".into()),
            ..BridgeCandidate::default()
        };
        let no_mac = BridgeCandidate {
            ip: Some(IP_A),
            ..BridgeCandidate::default()
        };
        let bad_mac = BridgeCandidate {
            ip: Some(IP_A),
            mac: Some("AABB".into()),
            ..BridgeCandidate::default()
        };

        assert_eq!(manager.register_bridge(no_ip, false).unwrap_err(), Error::MissingBridgeIp);
        assert_eq!(manager.register_bridge(no_mac, false).unwrap_err(), Error::MissingBridgeMac);
        assert!(matches!(
            manager.register_bridge(bad_mac, false),
            Err(Error::InvalidMac(_))
        ));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_discovery_shares_one_pass() {
        let discoverer = ScriptedDiscoverer::with_delay(Duration::from_millis(50));
        discoverer.set(vec![
            found(1, IP_A, Generation::Legacy),
            found(2, IP_B, Generation::V6),
        ]);
        let (manager, _) = manager_with(&discoverer);

        let (a, b) = futures::join!(
            manager.discover_bridges(DiscoverOptions::default()),
            manager.discover_bridges(DiscoverOptions::default()),
        );
        let macs = |bridges: Vec<Arc<Bridge>>| {
            let mut macs: Vec<_> = bridges.iter().map(|b| b.mac()).collect();
            macs.sort();
            macs
        };

        assert_eq!(discoverer.calls(), 1);
        assert_eq!(macs(a.unwrap()), macs(b.unwrap()));
        assert_eq!(manager.len(), 2);

        // The next pass is a fresh broadcast.
        manager.discover_bridges(DiscoverOptions::default()).await.unwrap();
        assert_eq!(discoverer.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_discovery_retries_once() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = manager_with(&discoverer);

        let found = manager.discover_bridges(DiscoverOptions::default()).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(discoverer.calls(), 2);

        let options = DiscoverOptions {
            no_retry: true,
            ..DiscoverOptions::default()
        };
        manager.discover_bridges(options).await.unwrap();
        assert_eq!(discoverer.calls(), 3);
    }

    #[tokio::test]
    async fn test_discovery_failure_surfaces() {
        let discoverer = ScriptedDiscoverer::default();
        discoverer.set_failing(true);
        let (manager, _) = manager_with(&discoverer);

        let err = manager
            .discover_bridges(DiscoverOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery(ref inner) if matches!(**inner, Error::Socket { .. })));
    }

    #[tokio::test]
    async fn test_liveness_hysteresis() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = manager_with(&discoverer);
        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        let log = events(&bridge);

        manager.poll_liveness().await.unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bridge.liveness(), Liveness::Online { missed: 1 });

        manager.poll_liveness().await.unwrap();
        assert_eq!(bridge.liveness(), Liveness::Offline);
        assert_eq!(*log.lock().unwrap(), vec![BridgeEvent::Offline]);

        manager.poll_liveness().await.unwrap();
        assert_eq!(bridge.liveness(), Liveness::Offline);
        assert_eq!(*log.lock().unwrap(), vec![BridgeEvent::Offline]);
        assert!(manager.get_bridge(BridgeQuery::available(bridge.mac())).is_err());
        assert!(manager.get_bridge(bridge.mac()).is_ok());

        discoverer.set(vec![found(1, IP_A, Generation::Legacy)]);
        manager.poll_liveness().await.unwrap();
        manager.poll_liveness().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![BridgeEvent::Offline, BridgeEvent::Online]
        );
        assert_eq!(bridge.liveness(), Liveness::Online { missed: 0 });
    }

    #[tokio::test]
    async fn test_v6_recovery_refreshes_session_before_online() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, factory) = manager_with(&discoverer);
        let bridge = manager
            .register_bridge(found(2, IP_B, Generation::V6), false)
            .unwrap();

        let refreshes_at_online = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = Arc::clone(&refreshes_at_online);
        let probe = factory.clone();
        bridge.on_online(move || seen.store(probe.refreshes(), Ordering::SeqCst));

        manager.poll_liveness().await.unwrap();
        manager.poll_liveness().await.unwrap();
        discoverer.set(vec![found(2, IP_B, Generation::V6)]);
        manager.poll_liveness().await.unwrap();

        assert_eq!(refreshes_at_online.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ip_migration_keeps_bridge_and_zone_state() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, factory) = manager_with(&discoverer);
        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        let zone = bridge.zone(ZoneType::Rgbw, 3).unwrap();
        zone.set_brightness(0.4).await.unwrap().await.unwrap();
        let state = zone.state();

        discoverer.set(vec![found(1, IP_B, Generation::Legacy)]);
        manager.poll_liveness().await.unwrap();

        let same = manager.get_bridge(mac(1)).unwrap();
        assert!(Arc::ptr_eq(&bridge, &same));
        assert_eq!(same.ip(), IP_B);
        assert_eq!(same.zone(ZoneType::Rgbw, 3).unwrap().state(), state);

        factory.clear();
        zone.turn_on().await.unwrap().await.unwrap();
        assert_eq!(factory.sent_to(), vec![IP_B]);
    }

    #[tokio::test]
    async fn test_temp_bridges_are_removed_after_pairing() {
        let discoverer = ScriptedDiscoverer::default();
        discoverer.set(vec![
            found(1, IP_A, Generation::Legacy),
            found(2, IP_B, Generation::V6),
        ]);
        let (manager, _) = manager_with(&discoverer);

        let paired = manager.discover_bridges(DiscoverOptions::temp()).await.unwrap();
        assert_eq!(paired.len(), 2);
        assert!(paired.iter().all(|b| b.is_temp()));

        let kept = manager
            .register_bridge(found(2, IP_B, Generation::V6), false)
            .unwrap();
        kept.register_device("device-1");

        assert_eq!(manager.deregister_temp_bridges(), 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.get_bridge(mac(1)).is_err());
        assert!(!kept.is_destroyed());
    }

    #[tokio::test]
    async fn test_destroy_removes_only_that_instance() {
        let (manager, _) = manager_with(&ScriptedDiscoverer::default());
        let old = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        old.register_device("d");
        old.deregister_device("d");
        assert!(old.is_destroyed());
        assert!(manager.is_empty());

        let new = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!manager.deregister_bridge(&old));
        assert!(Arc::ptr_eq(&manager.get_bridge(mac(1)).unwrap(), &new));
    }

    #[tokio::test]
    async fn test_find_bridge() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = manager_with(&discoverer);

        discoverer.set(vec![found(1, IP_A, Generation::Legacy)]);
        let bridge = manager.find_bridge(mac(1)).await.unwrap();
        assert_eq!(discoverer.calls(), 1);

        // Known and available: no discovery.
        let again = manager.find_bridge(mac(1)).await.unwrap();
        assert!(Arc::ptr_eq(&bridge, &again));
        assert_eq!(discoverer.calls(), 1);

        assert_eq!(
            manager.find_bridge(mac(9)).await.unwrap_err(),
            Error::BridgeNotFoundAfterDiscovering(mac(9))
        );
    }

    #[tokio::test]
    async fn test_find_bridge_recovers_offline_bridge() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = manager_with(&discoverer);
        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        bridge.mark_missed(0);
        assert!(!bridge.is_online());

        discoverer.set(vec![found(1, IP_A, Generation::Legacy)]);
        let found = manager.find_bridge(mac(1)).await.unwrap();
        assert!(found.is_online());
    }

    #[tokio::test]
    async fn test_polling_loop() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = polling_manager(&discoverer);

        assert!(manager.start_polling());
        assert!(!manager.start_polling());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(discoverer.calls(), 0, "empty registry is not polled");

        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        let log = events(&bridge);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*log.lock().unwrap(), vec![BridgeEvent::Offline]);

        manager.stop_polling();
        assert!(!manager.is_polling());
        tokio::time::sleep(Duration::from_millis(40)).await;
        let calls = discoverer.calls();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(discoverer.calls(), calls);
    }

    #[tokio::test]
    async fn test_registration_starts_polling() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = polling_manager(&discoverer);
        assert!(!manager.is_polling());

        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        let log = events(&bridge);
        assert!(manager.is_polling());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(discoverer.calls() >= 2);
        assert_eq!(bridge.liveness(), Liveness::Offline);
        assert_eq!(*log.lock().unwrap(), vec![BridgeEvent::Offline]);

        discoverer.set(vec![found(1, IP_A, Generation::Legacy)]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(bridge.liveness(), Liveness::Online { missed: 0 });
        assert_eq!(
            *log.lock().unwrap(),
            vec![BridgeEvent::Offline, BridgeEvent::Online]
        );
    }

    #[tokio::test]
    async fn test_failed_send_recovers_on_next_discovery() {
        let discoverer = ScriptedDiscoverer::default();
        discoverer.set(vec![found(1, IP_A, Generation::Legacy)]);
        let (manager, factory) = polling_manager(&discoverer);
        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        let zone = bridge.zone(ZoneType::Rgbw, 1).unwrap();
        let log = events(&bridge);

        factory.set_failing(true);
        assert!(zone.turn_on().await.unwrap().await.is_err());

        factory.set_failing(false);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec![BridgeEvent::Offline, BridgeEvent::Online]
        );
        assert!(bridge.is_online());
        assert!(manager.get_bridge(BridgeQuery::available(mac(1))).is_ok());
    }

    #[tokio::test]
    async fn test_stopped_polling_stays_stopped() {
        let discoverer = ScriptedDiscoverer::default();
        let (manager, _) = polling_manager(&discoverer);
        manager.stop_polling();

        let bridge = manager
            .register_bridge(found(1, IP_A, Generation::Legacy), false)
            .unwrap();
        assert!(!manager.is_polling());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(discoverer.calls(), 0);
        assert_eq!(bridge.liveness(), Liveness::Online { missed: 0 });

        assert!(manager.start_polling());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(discoverer.calls() > 0);
    }

    #[tokio::test]
    async fn test_legacy_end_to_end() {
        let discoverer = ScriptedDiscoverer::default();
        discoverer.set(vec![DiscoveredBridge {
            ip: Ipv4Addr::new(192, 168, 1, 50),
            mac: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
            model: None,
            generation: Generation::Legacy,
        }]);
        let (manager, factory) = manager_with(&discoverer);

        let bridges = manager.discover_bridges(DiscoverOptions::default()).await.unwrap();
        let bridge = &bridges[0];
        assert_eq!(bridge.generation(), Generation::Legacy);
        assert!(bridge.zones(ZoneType::Rgbww).is_empty());
        assert!(bridge.zones(ZoneType::BridgeLight).is_empty());

        let zone = bridge.zone(ZoneType::Rgbw, 2).unwrap();
        zone.set_brightness(0.0).await.unwrap().await.unwrap();
        assert_eq!(factory.bodies(), vec![vec![0x48, 0x00, 0x55]]);
        assert_eq!(zone.state().brightness, 0.0);
        assert!(!zone.state().on);
    }

    #[tokio::test]
    async fn test_v6_end_to_end() {
        let discoverer = ScriptedDiscoverer::default();
        discoverer.set(vec![
            crate::discovery::parse_reply("10.0.0.5,11:22:33:44:55:66,HF-LPB100", None).unwrap(),
        ]);
        let (manager, factory) = manager_with(&discoverer);

        let bridge = manager
            .find_bridge("112233445566".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(bridge.generation(), Generation::V6);
        assert_eq!(
            bridge.zone(ZoneType::Rgbw, 5).unwrap().zone_type(),
            ZoneType::BridgeLight
        );
        assert_eq!(bridge.zones(ZoneType::Rgbww).len(), 4);

        let zone = bridge.zone(ZoneType::Rgbww, 1).unwrap();
        zone.enable_white_mode(Some(0.3)).await.unwrap().await.unwrap();
        let bodies = factory.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][3..6], &[0x08, 0x05, 70]);
    }
}
