// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use jobber_lookup::config::Config;
use jobber_lookup::db::FirestoreDb;
use jobber_lookup::routes::create_router;
use jobber_lookup::services::{JobberClient, MailerService, TokenService};
use jobber_lookup::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db_offline();

    let jobber = JobberClient::new(
        config.jobber_client_id.clone(),
        config.jobber_client_secret.clone(),
    );
    let tokens = TokenService::new(Arc::new(db.clone()), Arc::new(jobber.clone()));
    let mailer = MailerService::new_mock();

    let state = Arc::new(AppState {
        config,
        db,
        jobber,
        tokens,
        mailer,
    });

    (create_router(state.clone()), state)
}
