//! In-memory hub used by tests.

use super::WeatherLinkApi;
use super::conditions::{CurrentConditions, ParseMode, fixtures};
use super::rest::RealTimeBroadcast;
use crate::error::{Result, WeatherLinkError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) struct FakeApi {
    current: Mutex<CurrentConditions>,
    lease: Mutex<RealTimeBroadcast>,
    failing_polls: AtomicUsize,
    failing_leases: AtomicUsize,
    poll_calls: AtomicUsize,
    lease_calls: AtomicUsize,
}

impl FakeApi {
    pub(crate) fn new(current: CurrentConditions) -> Self {
        Self {
            current: Mutex::new(current),
            lease: Mutex::new(RealTimeBroadcast {
                addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                broadcast_port: 22222,
                duration: 3600.0,
            }),
            failing_polls: AtomicUsize::new(0),
            failing_leases: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            lease_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn weatherlink() -> Self {
        let current =
            CurrentConditions::from_json(&fixtures::weatherlink_data(), ParseMode::Strict).unwrap();
        Self::new(current)
    }

    pub(crate) fn airlink() -> Self {
        let current =
            CurrentConditions::from_json(&fixtures::airlink_data(), ParseMode::Strict).unwrap();
        Self::new(current)
    }

    pub(crate) fn set_current(&self, current: CurrentConditions) {
        *self.current.lock() = current;
    }

    pub(crate) fn set_lease(&self, lease: RealTimeBroadcast) {
        *self.lease.lock() = lease;
    }

    /// Make the next `count` current-conditions requests fail.
    pub(crate) fn fail_polls(&self, count: usize) {
        self.failing_polls.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_leases(&self, count: usize) {
        self.failing_leases.store(count, Ordering::SeqCst);
    }

    pub(crate) fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn lease_calls(&self) -> usize {
        self.lease_calls.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl WeatherLinkApi for FakeApi {
    async fn current_conditions(&self) -> Result<CurrentConditions> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_polls) {
            return Err(WeatherLinkError::Api {
                code: 503,
                message: "hub unavailable".to_string(),
            });
        }
        Ok(self.current.lock().clone())
    }

    async fn real_time(&self, _duration: Duration) -> Result<RealTimeBroadcast> {
        self.lease_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_leases) {
            return Err(WeatherLinkError::Api {
                code: 503,
                message: "hub unavailable".to_string(),
            });
        }
        Ok(self.lease.lock().clone())
    }
}
