use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

#[derive(Default)]
struct Counts {
    per_ip: HashMap<IpAddr, usize>,
    total: usize,
}

/// Limits concurrent connections in total and per peer ip.
pub struct ConnectionTracker {
    counts: Mutex<Counts>,
    max_per_ip: usize,
    max_total: usize,
}

impl ConnectionTracker {
    pub fn new(max_per_ip: usize, max_total: usize) -> Arc<Self> {
        Arc::new(Self {
            counts: Mutex::new(Counts::default()),
            max_per_ip,
            max_total,
        })
    }

    /// Returns a permit holding the slot, or `None` if a limit is reached.
    pub fn try_acquire(self: &Arc<Self>, ip: IpAddr) -> Option<ConnectionPermit> {
        let mut counts = self.lock();
        if counts.total >= self.max_total {
            warn!(%ip, total = counts.total, max = self.max_total, "Connection rejected: total limit reached");
            return None;
        }
        let per_ip = counts.per_ip.get(&ip).copied().unwrap_or(0);
        if per_ip >= self.max_per_ip {
            warn!(%ip, count = per_ip, max = self.max_per_ip, "Connection rejected: per-ip limit reached");
            return None;
        }

        counts.per_ip.insert(ip, per_ip + 1);
        counts.total += 1;
        debug!(%ip, ip_connections = per_ip + 1, total = counts.total, "Connection accepted");
        Some(ConnectionPermit {
            tracker: Arc::clone(self),
            ip,
        })
    }

    pub fn active(&self) -> usize {
        self.lock().total
    }

    fn release(&self, ip: IpAddr) {
        let mut counts = self.lock();
        if let Some(count) = counts.per_ip.get_mut(&ip) {
            *count -= 1;
            if *count == 0 {
                counts.per_ip.remove(&ip);
            }
            counts.total -= 1;
        }
        debug!(%ip, total = counts.total, "Connection released");
    }

    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees its slot when dropped.
pub struct ConnectionPermit {
    tracker: Arc<ConnectionTracker>,
    ip: IpAddr,
}

impl ConnectionPermit {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.tracker.release(self.ip);
    }
}
