// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Accounts (linked Jobber accounts + connection status)
//! - Tokens (OAuth token records, with conditional replacement)
//! - Usage logs (lookup endpoint activity)
//! - Setup steps (onboarding progress)

use crate::db::collections;
use crate::error::AppError;
use crate::models::{ConnectionStatus, JobberAccount, SetupStep, TokenRecord, UsageLog};
use crate::services::tokens::TokenStore;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Use ExternalJwtFunctionSource to provide a dummy token without needing async-trait
        // or a custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Account Operations ──────────────────────────────────────

    /// Get the Jobber account linked to a user.
    pub async fn get_account(&self, user_id: &str) -> Result<Option<JobberAccount>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACCOUNTS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a Jobber account by its public lookup ID.
    pub async fn get_account_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<JobberAccount>, AppError> {
        let public_id = public_id.to_string();
        let mut matches: Vec<JobberAccount> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACCOUNTS)
            .filter(move |q| q.for_all([q.field("public_id").eq(public_id.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.pop())
    }

    /// Create or update a linked account.
    pub async fn upsert_account(&self, account: &JobberAccount) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACCOUNTS)
            .document_id(&account.user_id)
            .object(account)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List connection statuses for all linked accounts (status page).
    pub async fn list_account_statuses(
        &self,
    ) -> Result<Vec<crate::models::AccountStatus>, AppError> {
        let accounts: Vec<JobberAccount> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACCOUNTS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(accounts.iter().map(Into::into).collect())
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get the current token record for a user.
    pub async fn get_token_record(&self, user_id: &str) -> Result<Option<TokenRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a token record unconditionally.
    ///
    /// Used when seeding the first record at authorization time; refreshes
    /// must go through `replace_token_record_if_current` instead.
    pub async fn set_token_record(&self, record: &TokenRecord) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::TOKENS)
            .document_id(&record.user_id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Replace a user's token record only if its refresh token still matches.
    ///
    /// This is the race-detection gate for concurrent refreshes: the
    /// comparison and write run inside a Firestore transaction, so at most
    /// one concurrent caller observes `true` per stored refresh token. A
    /// mismatch, a missing record, or a commit conflict all report "lost"
    /// rather than an error; the caller re-reads to resolve.
    pub async fn replace_token_record_if_current(
        &self,
        user_id: &str,
        expected_refresh_token: &str,
        new_record: &TokenRecord,
    ) -> Result<bool, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read the current record within the transaction scope.
        // This registers the document for conflict detection.
        let current: Option<TokenRecord> = client
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read tokens in transaction: {}", e))
            })?;

        let matches = current
            .as_ref()
            .is_some_and(|record| record.refresh_token == expected_refresh_token);

        if !matches {
            // Another caller already replaced the record
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        client
            .fluent()
            .update()
            .in_col(collections::TOKENS)
            .document_id(user_id)
            .object(new_record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add token update to transaction: {}", e))
            })?;

        match transaction.commit().await {
            Ok(_) => Ok(true),
            Err(e) => {
                // A concurrent writer got there first; the commit conflict is
                // the same outcome as the refresh-token mismatch above.
                tracing::warn!(user_id, error = %e, "Token replacement commit lost");
                Ok(false)
            }
        }
    }

    /// Update the connection status on a user's account document.
    ///
    /// `disconnected_at` is set iff the status is `Disconnected`.
    pub async fn set_account_connection_status(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), AppError> {
        let Some(mut account) = self.get_account(user_id).await? else {
            tracing::warn!(user_id, "No account to update connection status on");
            return Ok(());
        };

        account.connection_status = status;
        account.disconnected_at = match status {
            ConnectionStatus::Connected => None,
            ConnectionStatus::Disconnected => Some(format_utc_rfc3339(chrono::Utc::now())),
        };

        self.upsert_account(&account).await
    }

    // ─── Usage Log Operations ────────────────────────────────────

    /// Append a usage log record.
    pub async fn insert_usage_log(&self, log: &UsageLog) -> Result<(), AppError> {
        let _: UsageLog = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USAGE_LOGS)
            .generate_document_id()
            .object(log)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Count usage log records for a user's account by log type and route.
    pub async fn count_usage_logs(
        &self,
        user_id: &str,
        account_public_id: &str,
        log_type: crate::models::LogType,
        route: &str,
    ) -> Result<usize, AppError> {
        let user_id = user_id.to_string();
        let account_public_id = account_public_id.to_string();
        let log_type_value = serde_json::to_value(log_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let route = route.to_string();

        let logs: Vec<UsageLog> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USAGE_LOGS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("account_public_id").eq(account_public_id.clone()),
                    q.field("log_type").eq(log_type_value.clone()),
                    q.field("route").eq(route.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(logs.len())
    }

    // ─── Setup Step Operations ───────────────────────────────────

    /// Get a user's onboarding progress.
    pub async fn get_setup_step(&self, user_id: &str) -> Result<Option<SetupStep>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SETUP_STEPS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a user's onboarding progress.
    pub async fn set_setup_step(&self, step: &SetupStep) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SETUP_STEPS)
            .document_id(&step.user_id)
            .object(step)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

// ─── Token Store Seam ────────────────────────────────────────────

#[async_trait]
impl TokenStore for FirestoreDb {
    async fn find_current(&self, user_id: &str) -> Result<Option<TokenRecord>, AppError> {
        self.get_token_record(user_id).await
    }

    async fn replace_if_current(
        &self,
        user_id: &str,
        expected_refresh_token: &str,
        new_record: &TokenRecord,
    ) -> Result<bool, AppError> {
        self.replace_token_record_if_current(user_id, expected_refresh_token, new_record)
            .await
    }

    async fn set_connection_status(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), AppError> {
        self.set_account_connection_status(user_id, status).await
    }
}
