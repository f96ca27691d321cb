//! Process-wide cache of issuer signing keys.
//!
//! The current key set is an immutable `Arc<KeySnapshot>`. Readers clone the
//! `Arc` and keep validating against it; a refresh builds a complete new
//! snapshot and swaps the pointer, so no reader ever sees a half-updated set.
//! At most one refresh runs at a time. While it runs, readers holding a stale
//! snapshot keep using it instead of waiting; callers with no snapshot at all
//! wait for it and share its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::GateConfig;
use crate::keys::{KeySet, KeySource, KeySourceError};

/// Immutable key set plus the instant it should next be refreshed.
#[derive(Debug)]
pub struct KeySnapshot {
    keys: KeySet,
    refresh_at: Instant,
}

impl KeySnapshot {
    fn new(keys: KeySet, refresh_at: Instant) -> Self {
        Self { keys, refresh_at }
    }

    pub fn key(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
    pub cooldown: Duration,
}

impl RefreshPolicy {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            ttl: config.metadata_ttl,
            fetch_timeout: config.fetch_timeout,
            attempts: config.fetch_attempts.max(1),
            backoff: config.retry_backoff,
            cooldown: config.retry_cooldown,
        }
    }
}

pub struct KeyCache {
    source: Arc<dyn KeySource>,
    policy: RefreshPolicy,
    current: RwLock<Option<Arc<KeySnapshot>>>,
    refresh: Mutex<RefreshState>,
    /// Bumped by the writer each time a refresh settles.
    settled: AtomicU64,
}

/// Writer-side bookkeeping, only touched while holding the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    /// Last failure while no snapshot existed, kept until `retry_at`.
    failure: Option<FailedRefresh>,
}

#[derive(Debug)]
struct FailedRefresh {
    error: KeySourceError,
    retry_at: Instant,
}

impl RefreshState {
    fn pending_failure(&self) -> Option<&KeySourceError> {
        self.failure
            .as_ref()
            .filter(|f| Instant::now() < f.retry_at)
            .map(|f| &f.error)
    }
}

impl KeyCache {
    pub fn new(source: Arc<dyn KeySource>, policy: RefreshPolicy) -> Self {
        Self {
            source,
            policy,
            current: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            settled: AtomicU64::new(0),
        }
    }

    /// Current snapshot, refreshing lazily when it is missing or past its TTL.
    ///
    /// Fails only when no snapshot has ever been obtained and fetching keeps
    /// failing; a failed refresh of an existing snapshot keeps serving it.
    /// Callers that queue behind an in-flight refresh get its outcome instead
    /// of fetching again, and a failed first fetch is remembered for the
    /// cooldown.
    pub async fn snapshot(&self) -> Result<Arc<KeySnapshot>, KeySourceError> {
        let previous = self.current();
        if let Some(snapshot) = previous.as_ref().filter(|s| s.is_fresh()) {
            return Ok(Arc::clone(snapshot));
        }

        let mut state = match (self.refresh.try_lock(), previous) {
            (Ok(guard), _) => guard,
            (Err(_), Some(stale)) => return Ok(stale),
            (Err(_), None) => {
                let seen = self.settled.load(Ordering::Acquire);
                let guard = self.refresh.lock().await;
                if self.settled.load(Ordering::Acquire) != seen {
                    if let Some(outcome) = self.shared_outcome(&guard) {
                        return outcome;
                    }
                }
                guard
            }
        };

        // A concurrent writer may have installed fresh keys while we waited.
        if let Some(snapshot) = self.current().filter(|s| s.is_fresh()) {
            return Ok(snapshot);
        }
        if let Some(err) = state.pending_failure() {
            return Err(err.clone());
        }

        let outcome = self.fetch_with_retry().await;
        let result = match outcome {
            Ok(keys) => {
                tracing::info!(source = %self.source.describe(), keys = keys.len(), "signing keys refreshed");
                state.failure = None;
                let snapshot = Arc::new(KeySnapshot::new(keys, deadline(self.policy.ttl)));
                self.install(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(err) => match self.current() {
                Some(stale) => {
                    tracing::warn!(
                        source = %self.source.describe(),
                        error = %err,
                        "key refresh failed; serving previous signing keys"
                    );
                    let deferred = Arc::new(KeySnapshot::new(stale.keys.clone(), deadline(self.policy.cooldown)));
                    self.install(Arc::clone(&deferred));
                    Ok(deferred)
                }
                None => {
                    tracing::error!(source = %self.source.describe(), error = %err, "signing keys unavailable");
                    state.failure = Some(FailedRefresh {
                        error: err.clone(),
                        retry_at: deadline(self.policy.cooldown),
                    });
                    Err(err)
                }
            },
        };
        self.settled.fetch_add(1, Ordering::Release);
        result
    }

    /// Outcome of the refresh that settled while this caller was queued.
    fn shared_outcome(&self, state: &RefreshState) -> Option<Result<Arc<KeySnapshot>, KeySourceError>> {
        match (self.current(), state.failure.as_ref()) {
            (Some(snapshot), _) => Some(Ok(snapshot)),
            (None, Some(failed)) => Some(Err(failed.error.clone())),
            (None, None) => None,
        }
    }

    /// Fetch keys ahead of the first request.
    pub async fn warm(&self) -> Result<(), KeySourceError> {
        self.snapshot().await.map(|_| ())
    }

    fn current(&self) -> Option<Arc<KeySnapshot>> {
        // The guarded value is a single pointer; a poisoned lock still holds a
        // complete snapshot.
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn install(&self, snapshot: Arc<KeySnapshot>) {
        match self.current.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }

    async fn fetch_with_retry(&self) -> Result<KeySet, KeySourceError> {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.policy.fetch_timeout, self.source.fetch()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(KeySourceError::Timeout { url: self.source.describe() }),
            };

            match outcome {
                Ok(keys) => return Ok(keys),
                Err(err) if err.is_transient() && attempt < self.policy.attempts => {
                    let delay = self.policy.backoff.saturating_mul(2u32.saturating_pow(attempt - 1));
                    tracing::debug!(attempt, error = %err, ?delay, "key fetch failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// `Instant::now() + after`, saturating at a distant instant instead of overflowing.
fn deadline(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);
