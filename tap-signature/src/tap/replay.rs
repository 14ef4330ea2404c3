//! Replay cache for `(keyid, nonce)` pairs.
//!
//! Entries live only until the associated signature could no longer pass the
//! freshness check; after that a replay is rejected as expired anyway. The
//! cache is therefore bounded by time, not by count.

use std::{
    collections::HashMap,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::debug;

/// Default interval between lazy sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// A nonce that has been accepted once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRecord {
    /// Key id the nonce was used with.
    pub key_id: String,
    /// The nonce.
    pub nonce: String,
    /// When the record was committed.
    pub seen_at: u64,
    /// When the record may be dropped.
    pub expires_at: u64,
}

/// Thread-safe set of recently accepted nonces.
///
/// [`record`](Self::record) is an atomic insert-if-absent: of several
/// concurrent calls for the same pair exactly one returns `true`.
#[derive(Debug)]
pub struct ReplayCache {
    records: RwLock<HashMap<(String, String), ReplayRecord>>,
    sweep_interval: u64,
    last_sweep: AtomicU64,
}

impl ReplayCache {
    /// Creates an empty cache with the default sweep interval.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    /// Creates an empty cache that sweeps expired records at most once per
    /// `sweep_interval` seconds.
    #[must_use]
    pub fn with_sweep_interval(sweep_interval: u64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            sweep_interval,
            last_sweep: AtomicU64::new(0),
        }
    }

    /// Returns `true` if the pair has been recorded and not yet evicted.
    ///
    /// Non-committing; a `false` here does not reserve the nonce.
    #[must_use]
    pub fn seen(&self, key_id: &str, nonce: &str) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.contains_key(&(key_id.to_owned(), nonce.to_owned()))
    }

    /// Records the pair unless it is already present.
    ///
    /// Returns `true` if this call inserted the record, `false` if the pair
    /// was already there. A stale record (`expires_at < now`) is replaced.
    pub fn record(&self, key_id: &str, nonce: &str, expires_at: u64, now: u64) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= self.sweep_interval {
            self.last_sweep.store(now, Ordering::Relaxed);
            let before = records.len();
            records.retain(|_, record| record.expires_at >= now);
            let evicted = before - records.len();
            if evicted > 0 {
                debug!(evicted, "replay cache swept");
            }
        }

        let key = (key_id.to_owned(), nonce.to_owned());
        if records.get(&key).is_some_and(|existing| existing.expires_at >= now) {
            return false;
        }
        records.insert(
            key,
            ReplayRecord {
                key_id: key_id.to_owned(),
                nonce: nonce.to_owned(),
                seen_at: now,
                expires_at,
            },
        );
        true
    }

    /// Drops every record with `expires_at < now`, returning how many went.
    pub fn evict(&self, now: u64) -> usize {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| record.expires_at >= now);
        self.last_sweep.store(now, Ordering::Relaxed);
        before - records.len()
    }

    /// Looks up the record for a pair.
    #[must_use]
    pub fn get(&self, key_id: &str, nonce: &str) -> Option<ReplayRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(&(key_id.to_owned(), nonce.to_owned())).cloned()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}
