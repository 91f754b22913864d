// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public email lookup endpoint.
//!
//! A business's customer submits their email address together with the
//! business's public account ID; we look the client up in Jobber, fetch
//! their quotes and invoices, and email them a summary.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{JobberAccount, LogMetadata, LogType, UsageLog};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

const ROUTE: &str = "send-lookup-email";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/send-lookup-email", get(send_lookup_email))
}

/// Query parameters for the lookup request.
#[derive(Debug, Deserialize, Validate)]
pub struct LookupParams {
    /// Public ID of the business's Jobber account
    pub id: String,
    /// The customer's email address
    #[validate(email)]
    pub email: String,
}

/// JSON response for the lookup request.
#[derive(Serialize)]
pub struct LookupResponse {
    pub success: bool,
    pub message: String,
}

/// Look up a client by email and send them their quotes & invoices.
async fn send_lookup_email(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Result<Json<LookupResponse>> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // Public IDs are uuids; reject junk before touching the database.
    if uuid::Uuid::parse_str(&params.id).is_err() {
        return Err(AppError::BadRequest("Invalid account id".to_string()));
    }

    let account = state
        .db
        .get_account_by_public_id(&params.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

    log_action(
        &state,
        &account,
        LogType::ApiCall,
        LogMetadata {
            request_email: Some(params.email.clone()),
            ..LogMetadata::default()
        },
    )
    .await;

    // Get a refreshed access token for the account's owner
    let token = state
        .tokens
        .get_valid_access_token(&account.user_id)
        .await
        .map_err(AppError::from)?;

    let Some(client) = state
        .jobber
        .find_client_by_email(&token, &params.email)
        .await?
    else {
        log_action(
            &state,
            &account,
            LogType::NoClientFound,
            LogMetadata {
                request_email: Some(params.email.clone()),
                ..LogMetadata::default()
            },
        )
        .await;

        return Ok(Json(LookupResponse {
            success: false,
            message: "Client's email could not be found in Jobber.".to_string(),
        }));
    };

    // Fetch invoices and quotes concurrently
    let (invoices, quotes) = tokio::try_join!(
        state.jobber.fetch_invoices(&token, &client.id),
        state.jobber.fetch_quotes(&token, &client.id),
    )?;

    log_action(
        &state,
        &account,
        LogType::EmailSent,
        LogMetadata {
            request_email: Some(params.email.clone()),
            client_id: Some(client.id.clone()),
            invoice_count: Some(invoices.len()),
            quote_count: Some(quotes.len()),
        },
    )
    .await;

    state
        .mailer
        .send_lookup_email(
            &params.email,
            account.name.as_deref(),
            &client,
            &quotes,
            &invoices,
        )
        .await?;

    Ok(Json(LookupResponse {
        success: true,
        message: "Email sent".to_string(),
    }))
}

/// Record a usage log entry; log failures are not fatal to the lookup.
async fn log_action(
    state: &Arc<AppState>,
    account: &JobberAccount,
    log_type: LogType,
    metadata: LogMetadata,
) {
    let log = UsageLog {
        user_id: account.user_id.clone(),
        account_public_id: Some(account.public_id.clone()),
        log_type,
        route: ROUTE.to_string(),
        metadata,
        created_at: format_utc_rfc3339(chrono::Utc::now()),
    };

    if let Err(e) = state.db.insert_usage_log(&log).await {
        tracing::warn!(error = %e, "Failed to record usage log");
    }
}
