//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const ACCOUNTS: &str = "accounts";
    pub const TOKENS: &str = "tokens";
    pub const USAGE_LOGS: &str = "usage_logs";
    pub const SETUP_STEPS: &str = "setup_steps";
}
