//! Jobber account model for storage and API.

use serde::{Deserialize, Serialize};

/// Health of a linked Jobber account's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// OAuth tokens are valid and working
    Connected,
    /// Token refresh failed, user needs to re-authorize
    Disconnected,
}

/// Jobber account linked to a user, stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobberAccount {
    /// Owning user (also used as document ID)
    pub user_id: String,
    /// Opaque identifier exposed on the public lookup endpoint
    pub public_id: String,
    /// Jobber's own account ID
    pub jobber_id: String,
    /// Business name
    pub name: Option<String>,
    /// Name used at Jobber signup
    pub signup_name: Option<String>,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub connection_status: ConnectionStatus,
    /// Set iff `connection_status` is `Disconnected` (ISO 8601)
    pub disconnected_at: Option<String>,
}

/// Public connection-status listing entry for the status page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatus {
    pub name: Option<String>,
    pub public_id: String,
    pub connection_status: ConnectionStatus,
    pub disconnected_at: Option<String>,
}

impl From<&JobberAccount> for AccountStatus {
    fn from(account: &JobberAccount) -> Self {
        Self {
            name: account.name.clone(),
            public_id: account.public_id.clone(),
            connection_status: account.connection_status,
            disconnected_at: account.disconnected_at.clone(),
        }
    }
}
