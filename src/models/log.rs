//! Usage logs for the public lookup endpoint.
//!
//! Each record represents one action, so a single lookup request can
//! produce multiple records (`api_call` then `email_sent`). The
//! dashboard derives its success rate from the counts per type.

use serde::{Deserialize, Serialize};

/// Kind of action being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    ApiCall,
    EmailSent,
    NoClientFound,
}

/// Structured metadata attached to a usage log record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_count: Option<usize>,
}

/// One logged action, stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub user_id: String,
    /// Public ID of the Jobber account the action touched, if any
    pub account_public_id: Option<String>,
    pub log_type: LogType,
    /// Route that produced the record (e.g. "send-lookup-email")
    pub route: String,
    #[serde(default)]
    pub metadata: LogMetadata,
    /// When the action happened (ISO 8601)
    pub created_at: String,
}
