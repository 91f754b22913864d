// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Jobber-Lookup: self-serve quote & invoice lookup for Jobber accounts
//!
//! This crate provides the backend API that lets a business's customers
//! request an emailed summary of their own quotes and invoices, backed
//! by the business's linked Jobber account.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{JobberClient, MailerService, TokenService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub jobber: JobberClient,
    pub tokens: TokenService,
    pub mailer: MailerService,
}
