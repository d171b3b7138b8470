//! Keeps one live snapshot of a hub up to date.
//!
//! Two channels feed the snapshot: a poll task that replaces it every update
//! interval, and (on hubs that support it) a broadcast task that merges the
//! partial real-time updates into it. Both apply their changes under the
//! same lock and notify subscribers afterwards.

use crate::api::{
    CurrentConditions, DeviceType, ListenerOptions, WeatherLinkApi, WeatherLinkBroadcast,
};
use crate::config::{DEFAULT_UPDATE_INTERVAL, Options};
use crate::error::{Result, WeatherLinkError};
use crate::notifier::{SubscriptionId, UpdateNotifier, UpdateSource};
use crate::units::UnitConfig;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;

/// Attempts per poll before the last known conditions are kept.
pub const POLL_ATTEMPTS: usize = 3;
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);
pub const BROADCAST_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub update_interval: Duration,
    pub units: UnitConfig,
    /// Only honoured if the device supports the real-time API.
    pub broadcast: bool,
    pub listener: ListenerOptions,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            units: UnitConfig::default(),
            broadcast: true,
            listener: ListenerOptions::default(),
        }
    }
}

impl CoordinatorSettings {
    /// Reject settings the background tasks cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.update_interval.is_zero() {
            return Err(WeatherLinkError::InvalidConfig(
                "update interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_options(options: &Options, broadcast: bool) -> Self {
        Self {
            update_interval: options.update_interval,
            units: options.units.clone(),
            broadcast,
            listener: ListenerOptions::default(),
        }
    }
}

/// State shared with the background tasks.
struct Shared {
    api: Arc<dyn WeatherLinkApi>,
    snapshot: RwLock<CurrentConditions>,
    notifier: UpdateNotifier,
}

impl Shared {
    fn replace(&self, snapshot: CurrentConditions) {
        let current = {
            let mut guard = self.snapshot.write();
            *guard = snapshot;
            guard.clone()
        };
        self.notifier.notify(&current, UpdateSource::Poll);
    }

    fn merge(&self, update: CurrentConditions) {
        let current = {
            let mut guard = self.snapshot.write();
            guard.update_from(update);
            guard.clone()
        };
        self.notifier.notify(&current, UpdateSource::Broadcast);
    }

    /// Fetch and apply a fresh snapshot. Returns `false` if every attempt
    /// failed, in which case the previous snapshot is kept.
    async fn refresh(&self) -> bool {
        for attempt in 1..=POLL_ATTEMPTS {
            match self.api.current_conditions().await {
                Ok(snapshot) => {
                    debug!("[Poll] Received conditions at {}", snapshot.ts);
                    self.replace(snapshot);
                    return true;
                }
                Err(e) => {
                    warn!("[Poll] Attempt {}/{} failed: {}", attempt, POLL_ATTEMPTS, e);
                    if attempt < POLL_ATTEMPTS {
                        sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        }

        error!(
            "[Poll] Giving up after {} attempts, keeping last known conditions",
            POLL_ATTEMPTS
        );
        false
    }
}

struct BackgroundTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(cancel.clone()));
        Self { cancel, handle }
    }

    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Background task failed: {}", e);
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, update_interval: Duration, cancel: CancellationToken) {
    // The first tick is one interval out: a snapshot was just fetched.
    let mut ticker = interval_at(Instant::now() + update_interval, update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.refresh() => {}
        }
    }
    debug!("[Poll] Stopped");
}

async fn broadcast_loop(shared: Arc<Shared>, options: ListenerOptions, cancel: CancellationToken) {
    let mut broadcast: Option<WeatherLinkBroadcast> = None;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = broadcast_step(&shared, &mut broadcast, options) => result,
        };

        if let Err(e) = result {
            error!(
                "[Broadcast] {}, retrying in {}s",
                e,
                BROADCAST_RETRY_DELAY.as_secs()
            );
            if let Some(broadcast) = broadcast.take() {
                broadcast.stop().await;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(BROADCAST_RETRY_DELAY) => {}
            }
        }
    }

    if let Some(broadcast) = broadcast.take() {
        broadcast.stop().await;
    }
    debug!("[Broadcast] Stopped");
}

/// Open the broadcast if needed, then wait for and merge one update.
async fn broadcast_step(
    shared: &Shared,
    broadcast: &mut Option<WeatherLinkBroadcast>,
    options: ListenerOptions,
) -> Result<()> {
    let broadcast = match broadcast.take() {
        Some(existing) => broadcast.insert(existing),
        None => {
            let started = WeatherLinkBroadcast::start(shared.api.clone(), options).await?;
            info!("[Broadcast] Listening on {}", started.local_addr());
            broadcast.insert(started)
        }
    };

    let update = broadcast.read().await?;
    shared.merge(update);
    Ok(())
}

#[derive(Default)]
struct Tasks {
    poll: Option<BackgroundTask>,
    broadcast: Option<BackgroundTask>,
    shut_down: bool,
}

pub struct UpdateCoordinator {
    shared: Arc<Shared>,
    settings: RwLock<CoordinatorSettings>,
    tasks: Mutex<Tasks>,
    device_id: String,
    device_name: String,
    device_type: DeviceType,
}

impl UpdateCoordinator {
    /// Fetch the first snapshot and start the background tasks.
    ///
    /// Fails if the settings are invalid or the first fetch fails; there is
    /// no earlier data to serve.
    pub async fn initialize(api: Arc<dyn WeatherLinkApi>, settings: CoordinatorSettings) -> Result<Self> {
        settings.validate()?;
        let snapshot = api.current_conditions().await?;
        let device_type = snapshot.device_type();
        let device_id = snapshot.did.clone();
        let device_name = snapshot.device_name();
        info!(
            "Connected to {} '{}' ({})",
            device_type.model_name(),
            device_name,
            device_id
        );

        let coordinator = Self {
            shared: Arc::new(Shared {
                api,
                snapshot: RwLock::new(snapshot),
                notifier: UpdateNotifier::new(),
            }),
            settings: RwLock::new(settings.clone()),
            tasks: Mutex::new(Tasks::default()),
            device_id,
            device_name,
            device_type,
        };

        {
            let mut tasks = coordinator.tasks.lock().await;
            coordinator.apply(&mut tasks, settings).await;
        }
        Ok(coordinator)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_model_name(&self) -> &'static str {
        self.device_type.model_name()
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Latest merged conditions.
    pub fn current_conditions(&self) -> CurrentConditions {
        self.shared.snapshot.read().clone()
    }

    /// Run `f` against the latest conditions without copying them.
    pub fn with_conditions<R>(&self, f: impl FnOnce(&CurrentConditions) -> R) -> R {
        f(&self.shared.snapshot.read())
    }

    pub fn units(&self) -> UnitConfig {
        self.settings.read().units.clone()
    }

    pub fn update_interval(&self) -> Duration {
        self.settings.read().update_interval
    }

    pub async fn broadcast_active(&self) -> bool {
        self.tasks.lock().await.broadcast.is_some()
    }

    /// Register a callback invoked after every applied poll or broadcast.
    pub fn subscribe(
        &self,
        callback: impl Fn(&CurrentConditions, UpdateSource) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.notifier.unsubscribe(id)
    }

    /// Poll now, outside the regular schedule.
    pub async fn refresh(&self) -> bool {
        self.shared.refresh().await
    }

    /// Apply new settings, restarting only the tasks affected by the change.
    ///
    /// Invalid settings are rejected and the running tasks are left as they are.
    pub async fn reconfigure(&self, settings: CoordinatorSettings) -> Result<()> {
        settings.validate()?;
        let mut tasks = self.tasks.lock().await;
        if tasks.shut_down {
            warn!("Ignoring reconfigure after shutdown");
            return Ok(());
        }
        self.apply(&mut tasks, settings).await;
        Ok(())
    }

    async fn apply(&self, tasks: &mut Tasks, settings: CoordinatorSettings) {
        let previous = std::mem::replace(&mut *self.settings.write(), settings.clone());

        if tasks.poll.is_none() || previous.update_interval != settings.update_interval {
            if let Some(task) = tasks.poll.take() {
                task.stop().await;
            }
            info!("[Poll] Polling every {:?}", settings.update_interval);
            let shared = self.shared.clone();
            let update_interval = settings.update_interval;
            tasks.poll = Some(BackgroundTask::spawn(move |cancel| {
                poll_loop(shared, update_interval, cancel)
            }));
        }

        let supported = self.device_type.supports_real_time_api();
        if settings.broadcast && !supported {
            debug!(
                "[Broadcast] {} does not support the real-time API",
                self.device_type.model_name()
            );
        }
        let enable = settings.broadcast && supported;
        let listener_changed = previous.listener != settings.listener;

        if let Some(task) = tasks.broadcast.take_if(|_| !enable || listener_changed) {
            info!("[Broadcast] Stopping");
            task.stop().await;
        }
        if enable && tasks.broadcast.is_none() {
            info!("[Broadcast] Starting");
            let shared = self.shared.clone();
            let listener = settings.listener;
            tasks.broadcast = Some(BackgroundTask::spawn(move |cancel| {
                broadcast_loop(shared, listener, cancel)
            }));
        }
    }

    /// Stop all background tasks. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        if tasks.shut_down {
            return;
        }
        tasks.shut_down = true;

        if let Some(task) = tasks.broadcast.take() {
            task.stop().await;
        }
        if let Some(task) = tasks.poll.take() {
            task.stop().await;
        }
        info!("Coordinator for {} shut down", self.device_name);
    }
}

impl Drop for UpdateCoordinator {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for task in [tasks.poll.take(), tasks.broadcast.take()].into_iter().flatten() {
            task.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::conditions::fixtures;
    use crate::api::testing::FakeApi;
    use crate::api::{ParseMode, RealTimeBroadcast};
    use crate::units::UnitSystemPreference;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn polling_only() -> CoordinatorSettings {
        CoordinatorSettings {
            broadcast: false,
            ..Default::default()
        }
    }

    fn with_broadcast() -> CoordinatorSettings {
        CoordinatorSettings {
            broadcast: true,
            listener: ListenerOptions {
                bind_ip: LOOPBACK,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn free_port() -> u16 {
        std::net::UdpSocket::bind((LOOPBACK, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn weatherlink_api() -> Arc<FakeApi> {
        weatherlink_api_on(free_port())
    }

    fn weatherlink_api_on(broadcast_port: u16) -> Arc<FakeApi> {
        let api = Arc::new(FakeApi::weatherlink());
        api.set_lease(RealTimeBroadcast {
            addr: LOOPBACK,
            broadcast_port,
            duration: 3600.0,
        });
        api
    }

    fn snapshot_at(ts: i64) -> CurrentConditions {
        let mut data = fixtures::weatherlink_data();
        data["ts"] = ts.into();
        CurrentConditions::from_json(&data, ParseMode::Strict).unwrap()
    }

    fn count_updates(coordinator: &UpdateCoordinator) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        coordinator.subscribe({
            let count = count.clone();
            move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_fails_without_first_snapshot() {
        let api = weatherlink_api();
        api.fail_polls(1);

        let result = UpdateCoordinator::initialize(api.clone(), polling_only()).await;
        assert!(matches!(result, Err(WeatherLinkError::Api { code: 503, .. })));
        assert_eq!(api.poll_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_derives_device_info() {
        let coordinator = UpdateCoordinator::initialize(weatherlink_api(), polling_only())
            .await
            .unwrap();

        assert_eq!(coordinator.device_id(), "001D0A7139D6");
        assert_eq!(coordinator.device_name(), "WeatherLink 001D0A7139D6");
        assert_eq!(coordinator.device_model_name(), "WeatherLink Live");
        assert_eq!(coordinator.device_type(), DeviceType::WeatherLink);
        assert_eq!(coordinator.current_conditions().conditions.len(), 3);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_replaces_snapshot_and_notifies() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();
        let updates = count_updates(&coordinator);

        api.set_current(snapshot_at(1610810700));
        sleep(Duration::from_secs(31)).await;

        assert_eq!(api.poll_calls(), 2);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.current_conditions().ts.timestamp(), 1610810700);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_keeps_last_known_good() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();
        let updates = count_updates(&coordinator);
        let before = coordinator.current_conditions();

        api.fail_polls(POLL_ATTEMPTS);
        api.set_current(snapshot_at(1610810700));
        sleep(Duration::from_secs(40)).await;

        assert_eq!(api.poll_calls(), 1 + POLL_ATTEMPTS);
        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.current_conditions(), before);

        // The next tick recovers.
        sleep(Duration::from_secs(30)).await;
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.current_conditions().ts.timestamp(), 1610810700);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_retries_after_short_delay() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();
        let updates = count_updates(&coordinator);

        api.fail_polls(2);
        sleep(Duration::from_secs(34)).await;
        assert_eq!(api.poll_calls(), 3);
        assert_eq!(updates.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(api.poll_calls(), 4);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_airlink_never_broadcasts() {
        let api = Arc::new(FakeApi::airlink());
        let coordinator = UpdateCoordinator::initialize(api.clone(), with_broadcast())
            .await
            .unwrap();

        assert_eq!(coordinator.device_type(), DeviceType::AirLink);
        assert_eq!(coordinator.device_name(), "Luftqualität");
        assert!(!coordinator.broadcast_active().await);

        coordinator.reconfigure(with_broadcast()).await.unwrap();
        sleep(Duration::from_secs(10)).await;
        assert!(!coordinator.broadcast_active().await);
        assert_eq!(api.lease_calls(), 0);
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_updates_are_merged() {
        let port = free_port();
        let api = weatherlink_api_on(port);
        let coordinator = UpdateCoordinator::initialize(api.clone(), with_broadcast())
            .await
            .unwrap();
        assert!(coordinator.broadcast_active().await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        coordinator.subscribe(move |snapshot, source| {
            let _ = tx.send((snapshot.clone(), source));
        });

        let sender = tokio::net::UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
        let received = timeout(Duration::from_secs(5), async {
            loop {
                sender
                    .send_to(fixtures::BROADCAST_DATAGRAM.as_bytes(), (LOOPBACK, port))
                    .await
                    .unwrap();
                if let Ok(Some(update)) = timeout(Duration::from_millis(100), rx.recv()).await {
                    return update;
                }
            }
        })
        .await
        .unwrap();

        let (snapshot, source) = received;
        assert_eq!(source, UpdateSource::Broadcast);
        let iss = snapshot.conditions.iss().unwrap();
        assert_eq!(iss.wind_dir_last, Some(270));
        assert_eq!(iss.temp, Some(-3.0));
        assert_eq!(snapshot.conditions.len(), 3);
        assert_eq!(coordinator.current_conditions(), snapshot);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_errors_are_retried() {
        let api = weatherlink_api();
        api.fail_leases(1);
        let coordinator = UpdateCoordinator::initialize(api.clone(), with_broadcast())
            .await
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        assert_eq!(api.lease_calls(), 1);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(api.lease_calls(), 2);
        assert!(coordinator.broadcast_active().await);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_toggles_broadcast() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();
        assert!(!coordinator.broadcast_active().await);

        coordinator.reconfigure(with_broadcast()).await.unwrap();
        assert!(coordinator.broadcast_active().await);

        coordinator.reconfigure(polling_only()).await.unwrap();
        assert!(!coordinator.broadcast_active().await);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_changes_interval_and_units() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();

        coordinator
            .reconfigure(CoordinatorSettings {
                update_interval: Duration::from_secs(10),
                units: UnitConfig::default_for(UnitSystemPreference::Imperial),
                ..polling_only()
            })
            .await
            .unwrap();
        assert_eq!(coordinator.update_interval(), Duration::from_secs(10));
        assert_eq!(coordinator.units(), UnitConfig::default_imperial());

        sleep(Duration::from_secs(21)).await;
        assert_eq!(api.poll_calls(), 3);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_rejected() {
        let api = weatherlink_api();
        let zero = CoordinatorSettings {
            update_interval: Duration::ZERO,
            ..polling_only()
        };

        let result = UpdateCoordinator::initialize(api.clone(), zero.clone()).await;
        assert!(matches!(result, Err(WeatherLinkError::InvalidConfig(_))));
        assert_eq!(api.poll_calls(), 0);

        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();
        let err = coordinator.reconfigure(zero).await.unwrap_err();
        assert!(matches!(err, WeatherLinkError::InvalidConfig(_)));
        assert_eq!(coordinator.update_interval(), DEFAULT_UPDATE_INTERVAL);

        // Polling keeps its previous cadence.
        sleep(Duration::from_secs(61)).await;
        assert_eq!(api.poll_calls(), 3);
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), with_broadcast())
            .await
            .unwrap();

        coordinator.shutdown().await;
        coordinator.shutdown().await;
        assert!(!coordinator.broadcast_active().await);

        coordinator.reconfigure(with_broadcast()).await.unwrap();
        assert!(!coordinator.broadcast_active().await);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(api.poll_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_notifications() {
        let api = weatherlink_api();
        let coordinator = UpdateCoordinator::initialize(api.clone(), polling_only())
            .await
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let id = coordinator.subscribe({
            let count = count.clone();
            move |_, source| {
                assert_eq!(source, UpdateSource::Poll);
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(coordinator.refresh().await);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(coordinator.unsubscribe(id));
        assert!(coordinator.refresh().await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        coordinator.shutdown().await;
    }
}
