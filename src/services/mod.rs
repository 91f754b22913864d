// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod jobber;
pub mod mailer;
pub mod tokens;

pub use jobber::JobberClient;
pub use mailer::MailerService;
pub use tokens::{TokenError, TokenService};
