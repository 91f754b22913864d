// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AccountStatus, JobberAccount, LogType, SetupStep};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const LOOKUP_ROUTE: &str = "send-lookup-email";

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/account", get(get_account))
        .route("/api/account/sync", post(sync_account))
        .route("/api/account/lookup-stats", get(get_lookup_stats))
        .route("/api/setup-step", get(get_setup_step).put(put_setup_step))
}

/// Public routes served alongside the dashboard API.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/statuses", get(get_account_statuses))
}

// ─── Account ─────────────────────────────────────────────────

/// Get the caller's linked Jobber account, if any.
///
/// Served from the database; does not call the Jobber API.
async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Option<JobberAccount>>> {
    let account = state.db.get_account(&user.user_id).await?;
    Ok(Json(account))
}

/// Refresh the caller's account profile from the Jobber API.
///
/// Keeps the stored public ID and connection status when the account is
/// already linked; a first sync mints a fresh public ID.
async fn sync_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<JobberAccount>> {
    let token = state
        .tokens
        .get_valid_access_token(&user.user_id)
        .await
        .map_err(AppError::from)?;

    let data = state.jobber.account_data(&token).await?;
    let existing = state.db.get_account(&user.user_id).await?;

    let account = JobberAccount {
        user_id: user.user_id.clone(),
        public_id: existing
            .as_ref()
            .map(|account| account.public_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        jobber_id: data.id,
        name: data.name,
        signup_name: data.signup_name,
        industry: data.industry,
        phone: data.phone,
        connection_status: existing
            .as_ref()
            .map(|account| account.connection_status)
            .unwrap_or(crate::models::ConnectionStatus::Connected),
        disconnected_at: existing.and_then(|account| account.disconnected_at),
    };

    state.db.upsert_account(&account).await?;

    Ok(Json(account))
}

/// Lookup email statistics for the caller's account.
#[derive(Serialize)]
pub struct LookupStats {
    pub api_calls: usize,
    pub emails_sent: usize,
}

async fn get_lookup_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<LookupStats>> {
    let account = state
        .db
        .get_account(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Jobber account".to_string()))?;

    let api_calls = state
        .db
        .count_usage_logs(
            &user.user_id,
            &account.public_id,
            LogType::ApiCall,
            LOOKUP_ROUTE,
        )
        .await?;
    let emails_sent = state
        .db
        .count_usage_logs(
            &user.user_id,
            &account.public_id,
            LogType::EmailSent,
            LOOKUP_ROUTE,
        )
        .await?;

    Ok(Json(LookupStats {
        api_calls,
        emails_sent,
    }))
}

/// Connection statuses for all linked accounts (public status page).
async fn get_account_statuses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AccountStatus>>> {
    let statuses = state.db.list_account_statuses().await?;
    Ok(Json(statuses))
}

// ─── Setup Steps ─────────────────────────────────────────────

/// Get the caller's onboarding progress.
async fn get_setup_step(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Option<u32>>> {
    let step = state.db.get_setup_step(&user.user_id).await?;
    Ok(Json(step.map(|record| record.step)))
}

#[derive(Deserialize, Validate)]
pub struct SetStepRequest {
    #[validate(range(max = 16))]
    pub step: u32,
}

/// Store the caller's onboarding progress.
async fn put_setup_step(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SetStepRequest>,
) -> Result<Json<SetupStep>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = SetupStep {
        user_id: user.user_id.clone(),
        step: request.step,
        updated_at: format_utc_rfc3339(chrono::Utc::now()),
    };

    state.db.set_setup_step(&record).await?;
    Ok(Json(record))
}
