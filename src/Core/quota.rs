// Per-user resource accounting for in-flight messages

use crate::error::{Error, Result};
use crossbeam_utils::CachePadded;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_MAX_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_HANDLES: usize = 65536;
pub const DEFAULT_MAX_FDS: usize = 4096;

/// Upper bounds on what one user may have in flight across all peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserLimits {
    pub max_bytes: usize,
    pub max_handles: usize,
    pub max_fds: usize,
}

impl Default for UserLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_handles: DEFAULT_MAX_HANDLES,
            max_fds: DEFAULT_MAX_FDS,
        }
    }
}

/// Outstanding resources, either for a user globally or for a user on one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaStats {
    pub n_bytes: usize,
    pub n_handles: usize,
    pub n_fds: usize,
}

impl QuotaStats {
    pub fn is_empty(&self) -> bool {
        self.n_bytes == 0 && self.n_handles == 0 && self.n_fds == 0
    }
}

/// An accounted user. Messages keep an `Arc<User>` for as long as they hold
/// a charge against it.
pub struct User {
    uid: u32,
    limits: UserLimits,
    /// Charged counters, padded so users charged from different CPUs do not
    /// share cache lines.
    n_bytes: CachePadded<AtomicUsize>,
    n_handles: CachePadded<AtomicUsize>,
    n_fds: CachePadded<AtomicUsize>,
}

impl User {
    pub fn new(uid: u32) -> Arc<Self> {
        Self::with_limits(uid, UserLimits::default())
    }

    pub fn with_limits(uid: u32, limits: UserLimits) -> Arc<Self> {
        Arc::new(Self {
            uid,
            limits,
            n_bytes: CachePadded::new(AtomicUsize::new(0)),
            n_handles: CachePadded::new(AtomicUsize::new(0)),
            n_fds: CachePadded::new(AtomicUsize::new(0)),
        })
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn limits(&self) -> UserLimits {
        self.limits
    }

    /// Snapshot of everything this user currently has charged.
    pub fn usage(&self) -> QuotaStats {
        QuotaStats {
            n_bytes: self.n_bytes.load(Ordering::Acquire),
            n_handles: self.n_handles.load(Ordering::Acquire),
            n_fds: self.n_fds.load(Ordering::Acquire),
        }
    }

    fn try_charge(counter: &AtomicUsize, amount: usize, limit: usize) -> bool {
        if amount == 0 {
            return true;
        }

        loop {
            let current = counter.load(Ordering::Acquire);
            let next = match current.checked_add(amount) {
                Some(next) if next <= limit => next,
                _ => return false,
            };

            if counter
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
            std::hint::spin_loop();
        }
    }

    fn uncharge(counter: &AtomicUsize, amount: usize) {
        if amount == 0 {
            return;
        }

        let prev = counter.fetch_sub(amount, Ordering::AcqRel);
        debug_assert!(prev >= amount, "quota discharge below zero");
    }
}

/// Per-peer ledger of what each user has charged on this peer.
///
/// Lives inside `PeerInfo` and is therefore only mutated under the peer lock.
/// The global per-user counters in [`User`] are updated lock-free.
#[derive(Debug, Default)]
pub struct PeerQuota {
    stats: HashMap<u32, QuotaStats>,
}

impl PeerQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `user` for the given resources.
    ///
    /// Either all three counters are debited or none is.
    pub fn charge(&mut self, user: &User, n_bytes: usize, n_handles: usize, n_fds: usize) -> Result<()> {
        let limits = user.limits;

        if !User::try_charge(&user.n_bytes, n_bytes, limits.max_bytes) {
            return Err(Error::QuotaExceeded);
        }
        if !User::try_charge(&user.n_handles, n_handles, limits.max_handles) {
            User::uncharge(&user.n_bytes, n_bytes);
            return Err(Error::QuotaExceeded);
        }
        if !User::try_charge(&user.n_fds, n_fds, limits.max_fds) {
            User::uncharge(&user.n_handles, n_handles);
            User::uncharge(&user.n_bytes, n_bytes);
            return Err(Error::QuotaExceeded);
        }

        let entry = self.stats.entry(user.uid).or_default();
        entry.n_bytes += n_bytes;
        entry.n_handles += n_handles;
        entry.n_fds += n_fds;
        Ok(())
    }

    /// Reverse an earlier [`PeerQuota::charge`] with the same arguments.
    pub fn discharge(&mut self, user: &User, n_bytes: usize, n_handles: usize, n_fds: usize) {
        match self.stats.get_mut(&user.uid) {
            Some(entry)
                if entry.n_bytes >= n_bytes
                    && entry.n_handles >= n_handles
                    && entry.n_fds >= n_fds =>
            {
                entry.n_bytes -= n_bytes;
                entry.n_handles -= n_handles;
                entry.n_fds -= n_fds;
                if entry.is_empty() {
                    self.stats.remove(&user.uid);
                }
            }
            _ => {
                log::error!(
                    "quota discharge of uid {} exceeds its charge on this peer ({n_bytes}/{n_handles}/{n_fds})",
                    user.uid
                );
                debug_assert!(false, "unbalanced quota discharge");
                return;
            }
        }

        User::uncharge(&user.n_fds, n_fds);
        User::uncharge(&user.n_handles, n_handles);
        User::uncharge(&user.n_bytes, n_bytes);
    }

    /// What `uid` currently has charged on this peer.
    pub fn stats(&self, uid: u32) -> QuotaStats {
        self.stats.get(&uid).copied().unwrap_or_default()
    }

    /// Number of users with an outstanding charge on this peer.
    pub fn user_count(&self) -> usize {
        self.stats.len()
    }
}
