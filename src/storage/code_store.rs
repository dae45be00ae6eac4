//! In-memory authorization code store with a deadline-driven reaper.
//!
//! Live codes are kept in an index keyed by code and in a set ordered by
//! expiration. Both structures sit behind one mutex, so a code is either in
//! both or in neither. The reaper sleeps until the earliest expiration, or
//! until [`CodeStore::add`] signals that an earlier deadline arrived, and sends
//! every record it removes on the expiration channel.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::errors::CodeStoreError;
use crate::oauth::codegen;
use crate::oauth::pkce::{self, PkceMethod};
use crate::oauth::types::{AuthorizationCode, CodeOwner};

/// Default number of characters in a generated code.
pub const DEFAULT_CODE_LENGTH: usize = 42;

/// Shortest code length accepted by configuration.
pub const MIN_CODE_LENGTH: usize = 32;

/// Receives every record removed by the reaper.
pub type ExpirationReceiver = mpsc::UnboundedReceiver<AuthorizationCode>;

#[derive(Debug, Clone)]
pub struct CodeStoreSettings {
    /// How long a code stays redeemable after it is issued
    pub code_ttl: Duration,
    /// Number of characters in a generated code
    pub code_length: usize,
}

impl Default for CodeStoreSettings {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(5),
            code_length: DEFAULT_CODE_LENGTH,
        }
    }
}

#[derive(Default)]
struct State {
    ordering: BTreeSet<(DateTime<Utc>, String)>,
    index: HashMap<String, AuthorizationCode>,
}

pub struct CodeStore {
    state: Mutex<State>,
    settings: CodeStoreSettings,
    wake: Notify,
    shutdown: CancellationToken,
    expirations: mpsc::UnboundedSender<AuthorizationCode>,
}

impl CodeStore {
    /// Create a store and the receiving half of its expiration channel.
    ///
    /// Cancelling `shutdown` stops the reaper and makes further calls to
    /// [`CodeStore::add`] fail.
    pub fn new(
        settings: CodeStoreSettings,
        shutdown: CancellationToken,
    ) -> (Self, ExpirationReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let store = Self {
            state: Mutex::new(State::default()),
            settings,
            wake: Notify::new(),
            shutdown,
            expirations: sender,
        };
        (store, receiver)
    }

    /// Issue a new code bound to a PKCE challenge and an owner.
    pub fn add(
        &self,
        code_challenge: &str,
        code_challenge_method: PkceMethod,
        state: &str,
        owner: CodeOwner,
    ) -> Result<AuthorizationCode, CodeStoreError> {
        if self.shutdown.is_cancelled() {
            return Err(CodeStoreError::StoreUnavailable);
        }

        let record = AuthorizationCode {
            code: codegen::generate(self.settings.code_length)?,
            expires_at: Utc::now() + self.settings.code_ttl,
            code_challenge: code_challenge.to_string(),
            code_challenge_method,
            state: state.to_string(),
            owner,
        };

        self.insert(record.clone());

        tracing::debug!(
            code = record.log_prefix(),
            client_id = %record.owner.client_id,
            expires_at = %record.expires_at,
            "authorization code issued"
        );

        Ok(record)
    }

    fn insert(&self, record: AuthorizationCode) {
        let key = (record.expires_at, record.code.clone());

        let earliest = {
            let mut state = self.lock();
            if let Some(previous) = state.index.insert(record.code.clone(), record) {
                state.ordering.remove(&(previous.expires_at, previous.code));
            }
            state.ordering.insert(key.clone());
            state.ordering.first() == Some(&key)
        };

        if earliest {
            self.wake.notify_one();
        }
    }

    /// Consume a code.
    ///
    /// Any code that is found is removed, whether or not the exchange
    /// succeeds. An expired code that the reaper has not reached yet is
    /// reported as [`CodeStoreError::Expired`].
    pub fn redeem(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<AuthorizationCode, CodeStoreError> {
        self.redeem_at(code, code_verifier, Utc::now())
    }

    fn redeem_at(
        &self,
        code: &str,
        code_verifier: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCode, CodeStoreError> {
        let record = {
            let mut state = self.lock();
            let record = state
                .index
                .remove(code)
                .ok_or(CodeStoreError::NotFound)?;
            state
                .ordering
                .remove(&(record.expires_at, record.code.clone()));
            record
        };

        if record.is_expired_at(now) {
            tracing::debug!(code = record.log_prefix(), "expired authorization code presented");
            return Err(CodeStoreError::Expired);
        }

        if !pkce::verify(
            record.code_challenge_method,
            &record.code_challenge,
            code_verifier,
        ) {
            tracing::warn!(
                code = record.log_prefix(),
                client_id = %record.owner.client_id,
                "PKCE verification failed, authorization code discarded"
            );
            return Err(CodeStoreError::PkceMismatch);
        }

        Ok(record)
    }

    /// Number of live codes.
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record whose expiration is before `now`.
    fn sweep(&self, now: DateTime<Utc>) -> Vec<AuthorizationCode> {
        let mut expired = Vec::new();
        let mut state = self.lock();

        while let Some((expires_at, code)) = state.ordering.pop_first() {
            if expires_at >= now {
                state.ordering.insert((expires_at, code));
                break;
            }
            if let Some(record) = state.index.remove(&code) {
                expired.push(record);
            }
        }

        expired
    }

    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .ordering
            .first()
            .map(|(expires_at, _)| *expires_at)
    }

    /// Run the reaper until the shutdown token is cancelled.
    ///
    /// Cancellation is observed between sweeps only.
    pub async fn run_reaper(&self) {
        tracing::debug!("authorization code reaper started");

        loop {
            let wait = self
                .next_deadline()
                .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or_default());

            let deadline = async {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = deadline => {}
            }

            let expired = self.sweep(Utc::now());
            if !expired.is_empty() {
                tracing::debug!(count = expired.len(), "reaped expired authorization codes");
            }
            for record in expired {
                // Nobody listening is not an error for the reaper.
                let _ = self.expirations.send(record);
            }
        }

        tracing::debug!("authorization code reaper stopped");
    }

    /// Spawn [`CodeStore::run_reaper`] on `tracker`.
    pub fn spawn_reaper(self: &Arc<Self>, tracker: &TaskTracker) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tracker.spawn(async move { store.run_reaper().await })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves both structures consistent before it
        // can panic, so a poisoned guard is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Log every expired code until the channel closes or `shutdown` is cancelled.
pub async fn log_expirations(mut receiver: ExpirationReceiver, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = receiver.recv() => {
                let Some(record) = received else {
                    break;
                };
                tracing::info!(
                    code = record.log_prefix(),
                    client_id = %record.owner.client_id,
                    expired_at = %record.expires_at,
                    "authorization code expired"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn owner() -> CodeOwner {
        CodeOwner {
            client_id: "test_cc_grant".to_string(),
            subject: "jake".to_string(),
        }
    }

    fn store_with_ttl(code_ttl: Duration) -> (Arc<CodeStore>, ExpirationReceiver, CancellationToken) {
        let shutdown = CancellationToken::new();
        let (store, receiver) = CodeStore::new(
            CodeStoreSettings {
                code_ttl,
                ..CodeStoreSettings::default()
            },
            shutdown.clone(),
        );
        (Arc::new(store), receiver, shutdown)
    }

    #[test]
    fn test_add_returns_live_record() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let before = Utc::now();

        let record = store
            .add("challenge", PkceMethod::Plain, "xyz", owner())
            .unwrap();

        assert_eq!(record.code.len(), DEFAULT_CODE_LENGTH);
        assert_eq!(record.state, "xyz");
        assert_eq!(record.owner, owner());
        assert!(record.expires_at >= before + Duration::minutes(5));
        assert!(record.expires_at <= Utc::now() + Duration::minutes(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_redeem_is_single_use() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        let redeemed = store.redeem(&record.code, "x").unwrap();
        assert_eq!(redeemed.code, record.code);
        assert!(store.is_empty());

        assert!(matches!(
            store.redeem(&record.code, "x"),
            Err(CodeStoreError::NotFound)
        ));
    }

    #[test]
    fn test_redeem_unknown_code() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        assert!(matches!(
            store.redeem("never-issued", "x"),
            Err(CodeStoreError::NotFound)
        ));
    }

    #[test]
    fn test_pkce_mismatch_consumes_code() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let challenge = pkce::challenge_for("V1");
        let record = store.add(&challenge, PkceMethod::S256, "", owner()).unwrap();

        assert!(matches!(
            store.redeem(&record.code, "V2"),
            Err(CodeStoreError::PkceMismatch)
        ));
        assert!(matches!(
            store.redeem(&record.code, "V1"),
            Err(CodeStoreError::NotFound)
        ));
    }

    #[test]
    fn test_expired_code_is_rejected_before_reaping() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        let later = record.expires_at + Duration::seconds(1);
        assert!(matches!(
            store.redeem_at(&record.code, "x", later),
            Err(CodeStoreError::Expired)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_code_is_valid_until_its_deadline() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        let just_before = record.expires_at - Duration::milliseconds(1);
        assert!(store.redeem_at(&record.code, "x", just_before).is_ok());

        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();
        assert!(store.redeem_at(&record.code, "x", record.expires_at).is_ok());

        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();
        let just_after = record.expires_at + Duration::milliseconds(1);
        assert!(matches!(
            store.redeem_at(&record.code, "x", just_after),
            Err(CodeStoreError::Expired)
        ));
    }

    #[test]
    fn test_sweep_keeps_code_at_its_deadline() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        assert!(store.sweep(record.expires_at).is_empty());
        assert_eq!(store.len(), 1);

        let reaped = store.sweep(record.expires_at + Duration::nanoseconds(1));
        assert_eq!(reaped.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_colliding_code_replaces_ordering_entry() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let first = store.add("x", PkceMethod::Plain, "first", owner()).unwrap();

        let replacement = AuthorizationCode {
            expires_at: first.expires_at + Duration::minutes(1),
            state: "second".to_string(),
            ..first.clone()
        };
        store.insert(replacement);

        {
            let state = store.lock();
            assert_eq!(state.index.len(), 1);
            assert_eq!(state.ordering.len(), 1);
        }

        let redeemed = store.redeem(&first.code, "x").unwrap();
        assert_eq!(redeemed.state, "second");
        assert!(store.lock().ordering.is_empty());
    }

    #[test]
    fn test_sweep_only_removes_expired() {
        let (store, _receiver, _shutdown) = store_with_ttl(Duration::minutes(5));
        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();
        let _other = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        assert!(store.sweep(Utc::now()).is_empty());
        assert_eq!(store.len(), 2);

        let reaped = store.sweep(record.expires_at + Duration::minutes(1));
        assert_eq!(reaped.len(), 2);
        assert!(store.is_empty());
        assert!(store.lock().ordering.is_empty());
    }

    #[tokio::test]
    async fn test_reaper_removes_expired_codes() {
        let (store, mut receiver, shutdown) = store_with_ttl(Duration::milliseconds(100));
        let tracker = TaskTracker::new();
        store.spawn_reaper(&tracker);

        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        let expired = tokio::time::timeout(StdDuration::from_secs(2), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expired.code, record.code);
        assert!(store.is_empty());
        assert!(matches!(
            store.redeem(&record.code, "x"),
            Err(CodeStoreError::NotFound)
        ));

        shutdown.cancel();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_earlier_deadline_wakes_reaper() {
        let shutdown = CancellationToken::new();
        let (store, mut receiver) = CodeStore::new(CodeStoreSettings::default(), shutdown.clone());
        let store = Arc::new(store);
        let tracker = TaskTracker::new();
        store.spawn_reaper(&tracker);

        // The reaper is now sleeping toward a five minute deadline.
        let _long_lived = store.add("x", PkceMethod::Plain, "", owner()).unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let short_lived = AuthorizationCode {
            code: "short-lived".to_string(),
            expires_at: Utc::now() + Duration::milliseconds(100),
            code_challenge: String::new(),
            code_challenge_method: PkceMethod::None,
            state: String::new(),
            owner: owner(),
        };
        store.insert(short_lived);

        let expired = tokio::time::timeout(StdDuration::from_secs(2), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expired.code, "short-lived");
        assert_eq!(store.len(), 1);

        shutdown.cancel();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_reaper_and_rejects_add() {
        let (store, _receiver, shutdown) = store_with_ttl(Duration::minutes(5));
        let tracker = TaskTracker::new();
        let handle = store.spawn_reaper(&tracker);

        let record = store.add("x", PkceMethod::Plain, "", owner()).unwrap();

        shutdown.cancel();
        tokio::time::timeout(StdDuration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            store.add("x", PkceMethod::Plain, "", owner()),
            Err(CodeStoreError::StoreUnavailable)
        ));

        // Codes issued before shutdown can still be exchanged.
        assert!(store.redeem(&record.code, "x").is_ok());
    }

    #[tokio::test]
    async fn test_log_expirations_stops_on_shutdown() {
        let (_store, receiver, shutdown) = store_with_ttl(Duration::minutes(5));
        let logger = tokio::spawn(log_expirations(receiver, shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(StdDuration::from_secs(2), logger)
            .await
            .unwrap()
            .unwrap();
    }
}
