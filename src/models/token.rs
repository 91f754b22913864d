//! OAuth token record for a linked Jobber account.

use serde::{Deserialize, Serialize};

/// A user's current Jobber access/refresh token pair.
///
/// Records are logically replaced on refresh, never mutated field by
/// field: the stored `refresh_token` doubles as the version check for
/// the conditional replacement in the token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Owning user (also the document ID)
    pub user_id: String,
    /// Short-lived bearer credential for the Jobber API
    pub access_token: String,
    /// Credential used to mint the next access token
    pub refresh_token: String,
    /// When the access token expires (ISO 8601)
    pub expires_at: String,
    /// When this record was written (ISO 8601)
    pub created_at: String,
}
