// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Jobber OAuth token lifecycle management.
//!
//! Produces a currently-valid access token for a user, refreshing the
//! stored pair when it is expired or about to expire. Concurrent callers
//! for the same user are resolved without any in-process lock: the store's
//! conditional replacement (matched on the refresh token just spent) lets
//! at most one refresh win per expiry, and losers converge by re-reading
//! the winner's record. This keeps the logic correct across multiple
//! server instances, where a mutex would not help.

use crate::error::AppError;
use crate::models::{ConnectionStatus, TokenRecord};
use crate::time_utils::{format_utc_rfc3339, parse_rfc3339};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Margin before token expiration when we proactively refresh (5 minutes).
///
/// Generous relative to network latency so a token handed to a caller
/// cannot expire mid-use.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Storage operations the token service needs.
///
/// Implemented by [`crate::db::FirestoreDb`] in production and by
/// in-memory mocks in tests.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current token record for a user, if any.
    async fn find_current(&self, user_id: &str) -> Result<Option<TokenRecord>, AppError>;

    /// Replace the record only if its refresh token still matches.
    ///
    /// Returns `true` iff this caller's replacement landed. Must be atomic
    /// at the storage level: under concurrent calls with the same expected
    /// value, at most one returns `true`.
    async fn replace_if_current(
        &self,
        user_id: &str,
        expected_refresh_token: &str,
        new_record: &TokenRecord,
    ) -> Result<bool, AppError>;

    /// Record the account's connection health.
    async fn set_connection_status(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), AppError>;
}

/// The remote authorization server's refresh exchange.
#[async_trait]
pub trait RefreshExchange: Send + Sync {
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError>;
}

/// A freshly minted token pair from the authorization server.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Failure modes of the refresh exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("token endpoint rejected the refresh token (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed token response: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    /// Whether the failure means the refresh token was already spent.
    ///
    /// Jobber invalidates a refresh token on first use, so a rejection of
    /// this shape usually means a concurrent caller won the exchange and
    /// the winner's record is already (or about to be) in the store.
    fn is_stale_grant(&self) -> bool {
        match self {
            ExchangeError::Rejected { status, body } => {
                *status == 401 || body.contains("invalid_grant")
            }
            _ => false,
        }
    }
}

/// Failures surfaced to callers of [`TokenService::get_valid_access_token`].
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// No linked account; a legitimate state, not logged as an error.
    #[error("no Jobber tokens stored for user")]
    NotFound,

    /// The refresh exchange or its resolution failed; the account has been
    /// marked disconnected and the user must re-authorize.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Reading the store failed before any refresh was attempted.
    /// Connection status is left untouched.
    #[error(transparent)]
    Store(AppError),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotFound => AppError::NotFound("Jobber tokens".to_string()),
            TokenError::RefreshFailed(_) => AppError::AccountDisconnected,
            TokenError::Store(inner) => inner,
        }
    }
}

/// High-level token manager for linked Jobber accounts.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    oauth: Arc<dyn RefreshExchange>,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>, oauth: Arc<dyn RefreshExchange>) -> Self {
        Self { store, oauth }
    }

    /// Get a valid (non-expiring) Jobber access token for a user.
    ///
    /// Fast path: the stored token is outside the refresh margin and is
    /// returned as-is, with no network call and no write. Slow path: the
    /// pair is refreshed with Jobber and conditionally stored; losing a
    /// concurrent refresh race is resolved by re-reading the winner's
    /// record. Connection status is updated only on refresh outcomes,
    /// never on read failures.
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, TokenError> {
        let record = self
            .store
            .find_current(user_id)
            .await
            .map_err(TokenError::Store)?
            .ok_or(TokenError::NotFound)?;

        if !is_expiring(&record.expires_at) {
            return Ok(record.access_token);
        }

        tracing::info!(user_id, "Access token expiring, refreshing");

        let grant = match self.oauth.refresh_tokens(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(e) if e.is_stale_grant() => {
                // A concurrent caller already spent this refresh token.
                tracing::info!(user_id, "Refresh token already spent, re-reading store");
                return self.resolve_lost_race(user_id).await;
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Token refresh failed");
                self.mark_disconnected(user_id).await;
                return Err(TokenError::RefreshFailed(e.to_string()));
            }
        };

        let new_record = TokenRecord {
            user_id: user_id.to_string(),
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token,
            expires_at: format_utc_rfc3339(grant.expires_at),
            created_at: format_utc_rfc3339(Utc::now()),
        };

        // Conditional replacement, matched on the refresh token we just
        // spent: the race-detection gate.
        let won = match self
            .store
            .replace_if_current(user_id, &record.refresh_token, &new_record)
            .await
        {
            Ok(won) => won,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Token replacement failed");
                self.mark_disconnected(user_id).await;
                return Err(TokenError::RefreshFailed(e.to_string()));
            }
        };

        if won {
            if let Err(e) = self
                .store
                .set_connection_status(user_id, ConnectionStatus::Connected)
                .await
            {
                tracing::warn!(user_id, error = %e, "Failed to record connected status");
            }
            tracing::info!(user_id, "Token refreshed");
            return Ok(grant.access_token);
        }

        // Another caller replaced the record first; our freshly minted pair
        // is discarded and the winner's record is authoritative.
        tracing::info!(user_id, "Lost refresh race, re-reading store");
        self.resolve_lost_race(user_id).await
    }

    /// Converge on the winner's record after losing a refresh race.
    ///
    /// Failures here count as refresh failures, not read failures: the
    /// caller was promised a valid token and we could not produce one.
    async fn resolve_lost_race(&self, user_id: &str) -> Result<String, TokenError> {
        let current = match self.store.find_current(user_id).await {
            Ok(record) => record,
            Err(e) => {
                self.mark_disconnected(user_id).await;
                return Err(TokenError::RefreshFailed(e.to_string()));
            }
        };

        if let Some(record) = current {
            if !is_expiring(&record.expires_at) {
                return Ok(record.access_token);
            }
        }

        // The record the winner left behind is itself expiring (or gone).
        // Should not normally happen; degrade to a hard failure.
        tracing::error!(user_id, "Record still expiring after lost refresh race");
        self.mark_disconnected(user_id).await;
        Err(TokenError::RefreshFailed(
            "token still expiring after concurrent refresh".to_string(),
        ))
    }

    /// Mark the account disconnected so the dashboard can prompt
    /// re-authorization. Best-effort: the caller is already failing.
    async fn mark_disconnected(&self, user_id: &str) {
        if let Err(e) = self
            .store
            .set_connection_status(user_id, ConnectionStatus::Disconnected)
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to record disconnected status");
        }
    }
}

/// Whether a stored expiry is within the refresh margin of now.
///
/// An unparseable timestamp counts as expiring so the record gets
/// replaced rather than served indefinitely.
fn is_expiring(expires_at: &str) -> bool {
    match parse_rfc3339(expires_at) {
        Some(expires_at) => Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= expires_at,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Barrier;

    fn record(user_id: &str, refresh_token: &str, expires_in_secs: i64) -> TokenRecord {
        TokenRecord {
            user_id: user_id.to_string(),
            access_token: format!("access-for-{}", refresh_token),
            refresh_token: refresh_token.to_string(),
            expires_at: format_utc_rfc3339(Utc::now() + Duration::seconds(expires_in_secs)),
            created_at: format_utc_rfc3339(Utc::now()),
        }
    }

    fn grant(tag: &str) -> TokenGrant {
        TokenGrant {
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    /// In-memory token store with compare-and-swap semantics.
    #[derive(Default)]
    struct MockStore {
        record: Mutex<Option<TokenRecord>>,
        statuses: Mutex<Vec<ConnectionStatus>>,
        /// Installed into `record` right after the next read, simulating a
        /// concurrent winner landing between this caller's read and write.
        after_next_find: Mutex<Option<TokenRecord>>,
        find_calls: AtomicUsize,
        replace_calls: AtomicUsize,
        replace_wins: AtomicUsize,
        fail_find: AtomicUsize,
    }

    impl MockStore {
        fn with_record(record: TokenRecord) -> Self {
            Self {
                record: Mutex::new(Some(record)),
                ..Self::default()
            }
        }

        /// Make the next `n` find_current calls fail.
        fn fail_next_finds(&self, n: usize) {
            self.fail_find.store(n, Ordering::SeqCst);
        }

        /// Have a concurrent "winner" replace the record as soon as the
        /// next read completes.
        fn install_after_next_find(&self, record: TokenRecord) {
            *self.after_next_find.lock().unwrap() = Some(record);
        }

        fn current(&self) -> Option<TokenRecord> {
            self.record.lock().unwrap().clone()
        }

        fn statuses(&self) -> Vec<ConnectionStatus> {
            self.statuses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenStore for MockStore {
        async fn find_current(&self, _user_id: &str) -> Result<Option<TokenRecord>, AppError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_find
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Database("simulated outage".to_string()));
            }
            let current = self.current();
            if let Some(winner) = self.after_next_find.lock().unwrap().take() {
                *self.record.lock().unwrap() = Some(winner);
            }
            Ok(current)
        }

        async fn replace_if_current(
            &self,
            _user_id: &str,
            expected_refresh_token: &str,
            new_record: &TokenRecord,
        ) -> Result<bool, AppError> {
            self.replace_calls.fetch_add(1, Ordering::SeqCst);
            let mut record = self.record.lock().unwrap();
            let matches = record
                .as_ref()
                .is_some_and(|r| r.refresh_token == expected_refresh_token);
            if matches {
                *record = Some(new_record.clone());
                self.replace_wins.fetch_add(1, Ordering::SeqCst);
            }
            Ok(matches)
        }

        async fn set_connection_status(
            &self,
            _user_id: &str,
            status: ConnectionStatus,
        ) -> Result<(), AppError> {
            self.statuses.lock().unwrap().push(status);
            Ok(())
        }
    }

    /// Scripted refresh exchange handing out queued results.
    struct MockExchange {
        results: Mutex<VecDeque<Result<TokenGrant, ExchangeError>>>,
        calls: AtomicUsize,
        /// When set, every call rendezvouses here after taking its result,
        /// so concurrent callers are guaranteed to have both exchanged
        /// before either one writes.
        barrier: Option<Arc<Barrier>>,
    }

    impl MockExchange {
        fn new(results: Vec<Result<TokenGrant, ExchangeError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                barrier: None,
            }
        }

        fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshExchange for MockExchange {
        async fn refresh_tokens(
            &self,
            _refresh_token: &str,
        ) -> Result<TokenGrant, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected refresh call");
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            result
        }
    }

    fn service(store: Arc<MockStore>, oauth: Arc<MockExchange>) -> TokenService {
        TokenService::new(store, oauth)
    }

    #[tokio::test]
    async fn test_fast_path_no_refresh() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-1", 3600)));
        let oauth = Arc::new(MockExchange::new(vec![]));
        let tokens = service(store.clone(), oauth.clone());

        for _ in 0..3 {
            let token = tokens.get_valid_access_token("u1").await.unwrap();
            assert_eq!(token, "access-for-rt-1");
        }

        // Far-from-expiry tokens never touch the network or the store's
        // write path; every call is a single read.
        assert_eq!(oauth.calls(), 0);
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.replace_calls.load(Ordering::SeqCst), 0);
        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        // One minute left: inside the five-minute margin.
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Ok(grant("new"))]));
        let tokens = service(store.clone(), oauth.clone());

        let token = tokens.get_valid_access_token("u1").await.unwrap();

        assert_eq!(token, "access-new");
        assert_eq!(oauth.calls(), 1);

        let stored = store.current().unwrap();
        assert_eq!(stored.refresh_token, "refresh-new");
        assert_eq!(stored.access_token, "access-new");
        assert_eq!(store.statuses(), vec![ConnectionStatus::Connected]);
    }

    #[tokio::test]
    async fn test_already_expired_token_is_refreshed() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", -10)));
        let oauth = Arc::new(MockExchange::new(vec![Ok(grant("new"))]));
        let tokens = service(store.clone(), oauth.clone());

        let token = tokens.get_valid_access_token("u1").await.unwrap();
        assert_eq!(token, "access-new");
    }

    #[tokio::test]
    async fn test_not_found_without_linked_account() {
        let store = Arc::new(MockStore::default());
        let oauth = Arc::new(MockExchange::new(vec![]));
        let tokens = service(store.clone(), oauth);

        let err = tokens.get_valid_access_token("u1").await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
        // Not having linked an account is not a connection failure.
        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_marks_disconnected() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Err(ExchangeError::Transport(
            "connection reset".to_string(),
        ))]));
        let tokens = service(store.clone(), oauth);

        let err = tokens.get_valid_access_token("u1").await.unwrap_err();

        assert!(matches!(err, TokenError::RefreshFailed(_)));
        assert_eq!(store.statuses(), vec![ConnectionStatus::Disconnected]);
        // The stored record is untouched.
        assert_eq!(store.current().unwrap().refresh_token, "rt-old");
    }

    #[tokio::test]
    async fn test_malformed_response_marks_disconnected() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Err(
            ExchangeError::InvalidResponse("missing access_token".to_string()),
        )]));
        let tokens = service(store.clone(), oauth);

        let err = tokens.get_valid_access_token("u1").await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshFailed(_)));
        assert_eq!(store.statuses(), vec![ConnectionStatus::Disconnected]);
    }

    #[tokio::test]
    async fn test_transient_read_failure_leaves_status_alone() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-1", 3600)));
        store.fail_next_finds(1);
        let oauth = Arc::new(MockExchange::new(vec![]));
        let tokens = service(store.clone(), oauth.clone());

        let err = tokens.get_valid_access_token("u1").await.unwrap_err();

        assert!(matches!(err, TokenError::Store(_)));
        assert!(store.statuses().is_empty());
        assert_eq!(oauth.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_refresh_reconnects() {
        // A previously disconnected account comes back on a successful
        // refresh; the store impl clears disconnected_at alongside.
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Ok(grant("new"))]));
        let tokens = service(store.clone(), oauth);

        tokens.get_valid_access_token("u1").await.unwrap();
        assert_eq!(store.statuses(), vec![ConnectionStatus::Connected]);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let barrier = Arc::new(Barrier::new(2));
        // Distinct pairs per caller, as the real endpoint would mint.
        let oauth = Arc::new(
            MockExchange::new(vec![Ok(grant("a")), Ok(grant("b"))]).with_barrier(barrier),
        );
        let tokens = service(store.clone(), oauth.clone());

        let (first, second) = tokio::join!(
            tokens.get_valid_access_token("u1"),
            tokens.get_valid_access_token("u1"),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        // Both callers exchanged (the barrier guarantees neither saw the
        // other's write first), but exactly one replacement landed.
        assert_eq!(oauth.calls(), 2);
        assert_eq!(store.replace_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.replace_wins.load(Ordering::SeqCst), 1);

        let stored = store.current().unwrap();
        assert!(stored.refresh_token == "refresh-a" || stored.refresh_token == "refresh-b");

        // Both callers converge on the winner's access token.
        assert_eq!(first, stored.access_token);
        assert_eq!(second, stored.access_token);
    }

    #[tokio::test]
    async fn test_lost_race_rereads_winner() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Ok(grant("loser"))]));
        let tokens = service(store.clone(), oauth);

        // The winner lands between our read and our write.
        store.install_after_next_find(record("u1", "rt-winner", 3600));

        let token = tokens.get_valid_access_token("u1").await.unwrap();

        assert_eq!(token, "access-for-rt-winner");
        assert_eq!(store.current().unwrap().refresh_token, "rt-winner");
        // The loser does not rewrite the winner's connected status.
        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_lost_race_with_expiring_record_degrades() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Ok(grant("loser"))]));
        let tokens = service(store.clone(), oauth);

        // The "winner" somehow left an expiring record behind.
        store.install_after_next_find(record("u1", "rt-winner", 30));

        let err = tokens.get_valid_access_token("u1").await.unwrap_err();

        assert!(matches!(err, TokenError::RefreshFailed(_)));
        assert_eq!(store.statuses(), vec![ConnectionStatus::Disconnected]);
        // State is degraded but not corrupted: the winner's record stands.
        assert_eq!(store.current().unwrap().refresh_token, "rt-winner");
    }

    #[tokio::test]
    async fn test_stale_grant_rejection_resolves_from_store() {
        // Jobber invalidates refresh tokens on use: a caller whose exchange
        // is rejected with invalid_grant lost to a concurrent refresher and
        // should pick up the winner's record instead of disconnecting.
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Err(ExchangeError::Rejected {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        })]));
        let tokens = service(store.clone(), oauth);

        store.install_after_next_find(record("u1", "rt-winner", 3600));

        let token = tokens.get_valid_access_token("u1").await.unwrap();
        assert_eq!(token, "access-for-rt-winner");
        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_stale_grant_without_winner_disconnects() {
        let store = Arc::new(MockStore::with_record(record("u1", "rt-old", 60)));
        let oauth = Arc::new(MockExchange::new(vec![Err(ExchangeError::Rejected {
            status: 401,
            body: "unauthorized".to_string(),
        })]));
        let tokens = service(store.clone(), oauth);

        let err = tokens.get_valid_access_token("u1").await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshFailed(_)));
        assert_eq!(store.statuses(), vec![ConnectionStatus::Disconnected]);
    }

    #[tokio::test]
    async fn test_unparseable_expiry_forces_refresh() {
        let mut stale = record("u1", "rt-old", 3600);
        stale.expires_at = "garbage".to_string();
        let store = Arc::new(MockStore::with_record(stale));
        let oauth = Arc::new(MockExchange::new(vec![Ok(grant("new"))]));
        let tokens = service(store.clone(), oauth.clone());

        let token = tokens.get_valid_access_token("u1").await.unwrap();
        assert_eq!(token, "access-new");
        assert_eq!(oauth.calls(), 1);
    }
}
