//! Real-time UDP broadcasts from the hub.
//!
//! The hub only sends broadcasts while a lease obtained through
//! [`WeatherLinkApi::real_time`] is active. [`LeaseRenewer`] keeps that lease
//! alive, [`BroadcastListener`] receives and decodes the datagrams and
//! [`WeatherLinkBroadcast`] combines the two.

use super::WeatherLinkApi;
use super::conditions::{CurrentConditions, ParseMode};
use super::rest::RealTimeBroadcast;
use crate::error::{Result, WeatherLinkError};
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Lease duration requested from the hub.
pub const LEASE_DURATION: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_QUEUE_SIZE: usize = 16;

const RECV_BUFFER_SIZE: usize = 8192;

/// What to do with a new update when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueFullPolicy {
    /// Discard the incoming update.
    #[default]
    DropNewest,
    /// Evict the oldest queued update to make room.
    DropOldest,
}

/// Bounded queue between the receive task and the reader.
pub struct UpdateQueue {
    items: Mutex<VecDeque<CurrentConditions>>,
    capacity: usize,
    policy: QueueFullPolicy,
    notify: Notify,
}

impl UpdateQueue {
    pub fn new(capacity: usize, policy: QueueFullPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            notify: Notify::new(),
        }
    }

    pub fn policy(&self) -> QueueFullPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Enqueue an update. Returns `false` if an update was dropped.
    pub fn push(&self, update: CurrentConditions) -> bool {
        let mut items = self.items.lock();
        let accepted = if items.len() < self.capacity {
            items.push_back(update);
            true
        } else {
            match self.policy {
                QueueFullPolicy::DropNewest => false,
                QueueFullPolicy::DropOldest => {
                    items.pop_front();
                    items.push_back(update);
                    false
                }
            }
        };
        drop(items);

        self.notify.notify_one();
        accepted
    }

    pub fn try_pop(&self) -> Option<CurrentConditions> {
        self.items.lock().pop_front()
    }

    /// Wait for the next update.
    pub async fn pop(&self) -> CurrentConditions {
        loop {
            if let Some(update) = self.try_pop() {
                return update;
            }
            self.notify.notified().await;
        }
    }
}

/// Set once the receive task has stopped.
#[derive(Default)]
struct ConnectionLost {
    token: CancellationToken,
    reason: Mutex<Option<String>>,
}

impl ConnectionLost {
    fn mark(&self, reason: String) {
        *self.reason.lock() = Some(reason);
        self.token.cancel();
    }

    fn is_lost(&self) -> bool {
        self.token.is_cancelled()
    }

    fn error(&self) -> WeatherLinkError {
        let reason = self
            .reason
            .lock()
            .clone()
            .unwrap_or_else(|| "connection closed".to_string());
        WeatherLinkError::ConnectionLost(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Local address the UDP socket binds to.
    pub bind_ip: IpAddr,
    pub queue_size: usize,
    pub queue_full_policy: QueueFullPolicy,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            queue_size: DEFAULT_QUEUE_SIZE,
            queue_full_policy: QueueFullPolicy::default(),
        }
    }
}

fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Receives broadcast datagrams from one expected source address.
pub struct BroadcastListener {
    remote_addr: Arc<RwLock<IpAddr>>,
    local_addr: SocketAddr,
    queue: Arc<UpdateQueue>,
    lost: Arc<ConnectionLost>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BroadcastListener {
    pub async fn open(remote_addr: IpAddr, port: u16, options: ListenerOptions) -> Result<Self> {
        let socket = bind_udp(SocketAddr::new(options.bind_ip, port))?;
        let local_addr = socket.local_addr()?;
        debug!("Broadcast listener bound to {} (expecting {})", local_addr, remote_addr);

        let remote_addr = Arc::new(RwLock::new(remote_addr));
        let queue = Arc::new(UpdateQueue::new(options.queue_size, options.queue_full_policy));
        let lost = Arc::new(ConnectionLost::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let remote_addr = remote_addr.clone();
            let queue = queue.clone();
            let lost = lost.clone();
            let cancel = cancel.clone();
            async move {
                let reason = receive_loop(socket, &remote_addr, &queue, &cancel).await;
                debug!("Broadcast listener on {} stopped: {}", local_addr, reason);
                lost.mark(reason);
            }
        });

        Ok(Self {
            remote_addr,
            local_addr,
            queue,
            lost,
            cancel,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> IpAddr {
        *self.remote_addr.read()
    }

    /// Accept datagrams from `addr` from now on.
    pub fn set_remote_addr(&self, addr: IpAddr) {
        *self.remote_addr.write() = addr;
    }

    /// Wait for the next decoded update.
    ///
    /// Queued updates are returned even after the connection was lost. Once
    /// the queue is drained a lost connection is reported as an error.
    pub async fn read(&self) -> Result<CurrentConditions> {
        if let Some(update) = self.queue.try_pop() {
            return Ok(update);
        }
        if self.lost.is_lost() {
            return Err(self.lost.error());
        }

        tokio::select! {
            update = self.queue.pop() => Ok(update),
            _ = self.lost.token.cancelled() => Err(self.lost.error()),
        }
    }

    /// Close the socket and wait for the receive task to finish.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Broadcast listener task failed: {}", e);
        }
    }
}

impl Drop for BroadcastListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Runs until cancelled or the socket fails. Returns why it stopped.
async fn receive_loop(
    socket: UdpSocket,
    remote_addr: &RwLock<IpAddr>,
    queue: &UpdateQueue,
    cancel: &CancellationToken,
) -> String {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return "listener closed".to_string(),
            received = socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, from)) => handle_datagram(&buf[..len], from, remote_addr, queue),
            Err(e) => return e.to_string(),
        }
    }
}

fn handle_datagram(data: &[u8], from: SocketAddr, remote_addr: &RwLock<IpAddr>, queue: &UpdateQueue) {
    let expected = *remote_addr.read();
    if from.ip().to_canonical() != expected.to_canonical() {
        trace!("Ignoring datagram from unexpected sender {} (expecting {})", from, expected);
        return;
    }

    if queue.policy() == QueueFullPolicy::DropNewest && queue.is_full() {
        warn!("Ignoring broadcast from {} because the queue is full", from);
        return;
    }

    let value: serde_json::Value = match serde_json::from_slice(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "Failed to parse broadcast payload from {}: {} ({})",
                from,
                e,
                String::from_utf8_lossy(data)
            );
            return;
        }
    };

    match CurrentConditions::from_json(&value, ParseMode::Lenient) {
        Ok(update) => {
            if !queue.push(update) {
                warn!("Broadcast queue full, dropped an update from {}", from);
            }
        }
        Err(e) => warn!("Failed to decode broadcast from {}: {} ({})", from, e, value),
    }
}

/// Keeps a real-time broadcast lease alive.
pub struct LeaseRenewer {
    api: Arc<dyn WeatherLinkApi>,
    duration: Duration,
    lease: Option<RealTimeBroadcast>,
    // `None` until the first lease has been granted.
    renew_at: Option<Instant>,
}

impl LeaseRenewer {
    pub fn new(api: Arc<dyn WeatherLinkApi>, duration: Duration) -> Self {
        Self {
            api,
            duration,
            lease: None,
            renew_at: None,
        }
    }

    pub fn lease(&self) -> Option<&RealTimeBroadcast> {
        self.lease.as_ref()
    }

    pub fn renew_at(&self) -> Option<Instant> {
        self.renew_at
    }

    pub fn should_renew(&self) -> bool {
        match self.renew_at {
            Some(renew_at) => Instant::now() >= renew_at,
            None => true,
        }
    }

    /// Request a new lease if renewal is due. Returns whether it renewed.
    ///
    /// The next renewal is scheduled at half the granted duration.
    pub async fn update(&mut self) -> Result<bool> {
        if !self.should_renew() {
            return Ok(false);
        }

        info!("Renewing real-time broadcast");
        let lease = self.api.real_time(self.duration).await?;
        if !lease.duration.is_finite() || lease.duration <= 0.0 {
            return Err(WeatherLinkError::InvalidLease(format!(
                "duration {}",
                lease.duration
            )));
        }

        debug!(
            "Broadcast lease granted: {}:{} for {}s",
            lease.addr, lease.broadcast_port, lease.duration
        );
        self.renew_at = Some(Instant::now() + Duration::from_secs_f64(lease.duration / 2.0));
        self.lease = Some(lease);
        Ok(true)
    }
}

/// Stream of live updates from the hub.
pub struct WeatherLinkBroadcast {
    renewer: LeaseRenewer,
    listener: BroadcastListener,
    options: ListenerOptions,
}

impl WeatherLinkBroadcast {
    pub async fn start(api: Arc<dyn WeatherLinkApi>, options: ListenerOptions) -> Result<Self> {
        let mut renewer = LeaseRenewer::new(api, LEASE_DURATION);
        renewer.update().await?;
        let lease = renewer
            .lease()
            .ok_or_else(|| WeatherLinkError::InvalidLease("no lease granted".to_string()))?;
        let listener = BroadcastListener::open(lease.addr, lease.broadcast_port, options).await?;

        Ok(Self {
            renewer,
            listener,
            options,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Wait for the next update, renewing the lease whenever it is due.
    pub async fn read(&mut self) -> Result<CurrentConditions> {
        loop {
            if self.renewer.update().await? {
                self.apply_lease().await?;
            }

            let renew_at = self.renewer.renew_at();
            tokio::select! {
                update = self.listener.read() => return update,
                _ = renewal_due(renew_at) => {}
            }
        }
    }

    /// Point the listener at the current lease, rebinding if the port changed.
    async fn apply_lease(&mut self) -> Result<()> {
        let Some(lease) = self.renewer.lease().cloned() else {
            return Ok(());
        };

        if lease.broadcast_port != self.listener.local_addr().port() {
            info!("Broadcast port changed to {}, rebinding", lease.broadcast_port);
            self.listener.close().await;
            self.listener = BroadcastListener::open(lease.addr, lease.broadcast_port, self.options).await?;
        } else if lease.addr != self.listener.remote_addr() {
            info!("Broadcast source changed to {}", lease.addr);
            self.listener.set_remote_addr(lease.addr);
        }
        Ok(())
    }

    pub async fn stop(mut self) {
        self.listener.close().await;
    }
}

async fn renewal_due(renew_at: Option<Instant>) {
    match renew_at {
        Some(renew_at) => sleep_until(renew_at).await,
        None => std::future::pending().await,
    }
}
