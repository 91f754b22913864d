// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Jobber-Lookup API Server
//!
//! Lets a business's customers request an emailed summary of their own
//! quotes and invoices, backed by the business's linked Jobber account.

use jobber_lookup::{
    config::Config,
    db::FirestoreDb,
    services::{JobberClient, MailerService, TokenService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Jobber-Lookup API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize Jobber client and token manager
    let jobber = JobberClient::new(
        config.jobber_client_id.clone(),
        config.jobber_client_secret.clone(),
    );
    let tokens = TokenService::new(Arc::new(db.clone()), Arc::new(jobber.clone()));
    tracing::info!("Jobber client initialized");

    // Initialize mailer
    let mailer = MailerService::new(
        config.resend_api_key.clone(),
        config.mailer_address.clone(),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        jobber,
        tokens,
        mailer,
    });

    // Build router
    let app = jobber_lookup::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jobber_lookup=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
