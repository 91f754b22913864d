// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod account;
pub mod log;
pub mod setup;
pub mod token;

pub use account::{AccountStatus, ConnectionStatus, JobberAccount};
pub use log::{LogMetadata, LogType, UsageLog};
pub use setup::SetupStep;
pub use token::TokenRecord;
