//! Onboarding progress tracking.

use serde::{Deserialize, Serialize};

/// Highest setup step a user has completed, stored per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupStep {
    /// Owning user (also used as document ID)
    pub user_id: String,
    pub step: u32,
    /// When the step was last updated (ISO 8601)
    pub updated_at: String,
}
