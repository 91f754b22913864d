// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Jobber GraphQL API client.
//!
//! Handles:
//! - Client lookup by email address
//! - Invoice and quote fetching
//! - Account data fetching
//! - OAuth refresh-token exchange

use crate::error::AppError;
use crate::services::tokens::{ExchangeError, RefreshExchange, TokenGrant};
use crate::time_utils::parse_jobber_expiry;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// GraphQL schema version pinned for all requests.
const GRAPHQL_VERSION: &str = "2024-12-05";

/// Per-request timeout for Jobber calls.
///
/// Must stay well under the token refresh margin so an in-flight call
/// never outlives the token it was issued with.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Jobber API client.
#[derive(Clone)]
pub struct JobberClient {
    http: reqwest::Client,
    graphql_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl JobberClient {
    /// Create a new Jobber client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            graphql_url: "https://api.getjobber.com/api/graphql".to_string(),
            token_url: "https://api.getjobber.com/api/oauth/token".to_string(),
            client_id,
            client_secret,
        }
    }

    /// Find a client by email address.
    ///
    /// If multiple clients share the email, returns the most recently
    /// created one.
    pub async fn find_client_by_email(
        &self,
        access_token: &str,
        email: &str,
    ) -> Result<Option<ClientRecord>, AppError> {
        let query = r#"
            query ClientQuery($email: String!) {
              clientEmails(searchTerm: $email) {
                nodes {
                  client {
                    id
                    createdAt
                    name
                    companyName
                    isCompany
                  }
                }
              }
            }
        "#;

        let data: ClientEmailsData = self
            .graphql(access_token, query, serde_json::json!({ "email": email }))
            .await?;

        let mut clients: Vec<ClientRecord> = data
            .client_emails
            .nodes
            .into_iter()
            .map(|node| node.client)
            .collect();

        // Most recent first; createdAt is RFC3339 so string order matches
        // chronological order.
        clients.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(clients.into_iter().next())
    }

    /// Fetch all invoices for a client.
    pub async fn fetch_invoices(
        &self,
        access_token: &str,
        client_id: &str,
    ) -> Result<Vec<Invoice>, AppError> {
        let query = r#"
            query InvoiceQuery($clientId: ID!) {
              client(id: $clientId) {
                invoices {
                  nodes {
                    id
                    amounts {
                      total
                      invoiceBalance
                    }
                    invoiceNumber
                    invoiceStatus
                    issuedDate
                    dueDate
                    subject
                    clientHubUri
                  }
                }
              }
            }
        "#;

        let data: ClientInvoicesData = self
            .graphql(
                access_token,
                query,
                serde_json::json!({ "clientId": client_id }),
            )
            .await?;

        Ok(data.client.invoices.nodes)
    }

    /// Fetch all quotes for a client.
    pub async fn fetch_quotes(
        &self,
        access_token: &str,
        client_id: &str,
    ) -> Result<Vec<Quote>, AppError> {
        let query = r#"
            query QuoteQuery($clientId: ID!) {
              client(id: $clientId) {
                quotes {
                  nodes {
                    id
                    amounts {
                      total
                    }
                    quoteNumber
                    quoteStatus
                    message
                    title
                    clientHubUri
                  }
                }
              }
            }
        "#;

        let data: ClientQuotesData = self
            .graphql(
                access_token,
                query,
                serde_json::json!({ "clientId": client_id }),
            )
            .await?;

        Ok(data.client.quotes.nodes)
    }

    /// Fetch the authorized account's profile data.
    pub async fn account_data(&self, access_token: &str) -> Result<AccountData, AppError> {
        let query = r#"
            query AccountQuery {
              account {
                id
                name
                signupName
                industry
                phone
              }
            }
        "#;

        let data: AccountEnvelope = self
            .graphql(access_token, query, serde_json::Value::Null)
            .await?;

        let mut account = data.account;

        // Jobber reports a missing signup name as the literal string "Empty"
        if account.signup_name.as_deref() == Some("Empty") {
            account.signup_name = None;
        }

        Ok(account)
    }

    /// Generic GraphQL POST with typed response data.
    async fn graphql<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, AppError> {
        let mut body = serde_json::json!({ "query": query });
        if !variables.is_null() {
            body["variables"] = variables;
        }

        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(access_token)
            .header("X-JOBBER-GRAPHQL-VERSION", GRAPHQL_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::JobberApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Jobber rate limit hit (429)");
            }

            return Err(AppError::JobberApi(format!("HTTP {}: {}", status, body)));
        }

        let envelope: GraphqlEnvelope<T> = response
            .json()
            .await
            .map_err(|e| AppError::JobberApi(format!("JSON parse error: {}", e)))?;

        if let Some(error) = envelope.errors.first() {
            return Err(AppError::JobberApi(format!(
                "GraphQL error: {}",
                error.message
            )));
        }

        envelope
            .data
            .ok_or_else(|| AppError::JobberApi("GraphQL response missing data".to_string()))
    }
}

// ─── OAuth Refresh Exchange ──────────────────────────────────────

#[async_trait]
impl RefreshExchange for JobberClient {
    /// Exchange a refresh token for a new token pair.
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        // Jobber formats expires_at as "2024-04-09 21:04:31 UTC"; fall back
        // to one hour when the field doesn't parse.
        let expires_at = parse_jobber_expiry(&payload.expires_at)
            .unwrap_or_else(|| chrono::Utc::now() + chrono::Duration::hours(1));

        Ok(TokenGrant {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at,
        })
    }
}

/// Raw token payload from Jobber's OAuth endpoint.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_at: String,
}

// ─── GraphQL Response Types ──────────────────────────────────────

/// Envelope shared by all GraphQL responses.
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientEmailsData {
    client_emails: Nodes<ClientNode>,
}

#[derive(Debug, Deserialize)]
struct ClientNode {
    client: ClientRecord,
}

/// A Jobber client (the business's customer).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    pub created_at: String,
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub is_company: bool,
}

impl ClientRecord {
    /// Best display name for the client.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.company_name.as_deref())
            .unwrap_or("there")
    }
}

#[derive(Debug, Deserialize)]
struct ClientInvoicesData {
    client: InvoicesNode,
}

#[derive(Debug, Deserialize)]
struct InvoicesNode {
    invoices: Nodes<Invoice>,
}

/// Invoice summary as returned by Jobber.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub amounts: InvoiceAmounts,
    pub invoice_number: String,
    pub invoice_status: String,
    pub issued_date: Option<String>,
    pub due_date: Option<String>,
    pub subject: Option<String>,
    pub client_hub_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceAmounts {
    pub total: f64,
    pub invoice_balance: f64,
}

#[derive(Debug, Deserialize)]
struct ClientQuotesData {
    client: QuotesNode,
}

#[derive(Debug, Deserialize)]
struct QuotesNode {
    quotes: Nodes<Quote>,
}

/// Quote summary as returned by Jobber.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub amounts: QuoteAmounts,
    pub quote_number: String,
    pub quote_status: String,
    pub message: Option<String>,
    pub title: Option<String>,
    pub client_hub_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteAmounts {
    pub total: f64,
}

#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    account: AccountData,
}

/// Account profile from Jobber.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub id: String,
    pub name: Option<String>,
    pub signup_name: Option<String>,
    pub industry: Option<String>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_emails_response_shape() {
        let raw = serde_json::json!({
            "data": {
                "clientEmails": {
                    "nodes": [
                        {
                            "client": {
                                "id": "Z2lkOi8x",
                                "createdAt": "2024-01-15T10:00:00Z",
                                "name": "Pat Doe",
                                "companyName": null,
                                "isCompany": false
                            }
                        }
                    ]
                }
            }
        });

        let envelope: GraphqlEnvelope<ClientEmailsData> = serde_json::from_value(raw).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.client_emails.nodes.len(), 1);
        assert_eq!(data.client_emails.nodes[0].client.id, "Z2lkOi8x");
        assert!(!data.client_emails.nodes[0].client.is_company);
    }

    #[test]
    fn test_invoice_response_shape() {
        let raw = serde_json::json!({
            "data": {
                "client": {
                    "invoices": {
                        "nodes": [
                            {
                                "id": "aW52LzE",
                                "amounts": { "total": 150.0, "invoiceBalance": 25.5 },
                                "invoiceNumber": "42",
                                "invoiceStatus": "past_due",
                                "issuedDate": "2024-02-01",
                                "dueDate": null,
                                "subject": "Gutter cleaning",
                                "clientHubUri": "https://clienthub.getjobber.com/x"
                            }
                        ]
                    }
                }
            }
        });

        let envelope: GraphqlEnvelope<ClientInvoicesData> = serde_json::from_value(raw).unwrap();
        let invoices = envelope.data.unwrap().client.invoices.nodes;
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amounts.invoice_balance, 25.5);
        assert_eq!(invoices[0].due_date, None);
    }

    #[test]
    fn test_graphql_error_envelope() {
        let raw = serde_json::json!({
            "data": null,
            "errors": [ { "message": "Throttled" } ]
        });

        let envelope: GraphqlEnvelope<AccountEnvelope> = serde_json::from_value(raw).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.errors[0].message, "Throttled");
    }

    #[test]
    fn test_client_display_name_fallbacks() {
        let mut client = ClientRecord {
            id: "1".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            name: None,
            company_name: Some("Acme Lawn Care".to_string()),
            is_company: true,
        };
        assert_eq!(client.display_name(), "Acme Lawn Care");

        client.company_name = None;
        assert_eq!(client.display_name(), "there");
    }
}
