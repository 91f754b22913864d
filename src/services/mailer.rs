// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound transactional email via the Resend REST API.

use crate::error::AppError;
use crate::services::jobber::{ClientRecord, Invoice, Quote};
use std::time::Duration;

const RESEND_URL: &str = "https://api.resend.com/emails";

/// Mailer for customer-facing lookup emails.
#[derive(Clone)]
pub struct MailerService {
    /// None in offline mode: sends are logged and dropped.
    http: Option<reqwest::Client>,
    api_key: String,
    from_address: String,
}

impl MailerService {
    pub fn new(api_key: String, from_address: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http: Some(http),
            api_key,
            from_address,
        }
    }

    /// Create a mock mailer for testing (offline mode).
    pub fn new_mock() -> Self {
        Self {
            http: None,
            api_key: String::new(),
            from_address: "mailer@example.com".to_string(),
        }
    }

    /// Send a quotes & invoices summary to a client.
    pub async fn send_lookup_email(
        &self,
        to: &str,
        business_name: Option<&str>,
        client: &ClientRecord,
        quotes: &[Quote],
        invoices: &[Invoice],
    ) -> Result<(), AppError> {
        let subject = match business_name {
            Some(name) => format!("Your {} quotes & invoices", name),
            None => "Your quotes & invoices".to_string(),
        };
        let html = render_lookup_html(business_name, client, quotes, invoices);

        let Some(http) = &self.http else {
            tracing::info!(to, "Mock mailer: dropping lookup email");
            return Ok(());
        };

        let body = serde_json::json!({
            "from": format!("Jobber.Tools <{}>", self.from_address),
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = http
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Mailer(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Mailer(format!("HTTP {}: {}", status, body)));
        }

        tracing::info!(to, "Lookup email sent");
        Ok(())
    }
}

/// Render the plain HTML body for a lookup email.
fn render_lookup_html(
    business_name: Option<&str>,
    client: &ClientRecord,
    quotes: &[Quote],
    invoices: &[Invoice],
) -> String {
    let mut html = String::new();

    html.push_str(&format!(
        "<p>Hi {},</p>",
        escape_html(client.display_name())
    ));
    html.push_str(&format!(
        "<p>Here is a summary of your {}quotes and invoices.</p>",
        business_name
            .map(|name| format!("{} ", escape_html(name)))
            .unwrap_or_default()
    ));

    html.push_str("<h2>Quotes</h2>");
    if quotes.is_empty() {
        html.push_str("<p>No quotes on file.</p>");
    } else {
        html.push_str("<ul>");
        for quote in quotes {
            let label = quote
                .title
                .as_deref()
                .or(quote.message.as_deref())
                .unwrap_or("Quote");
            html.push_str(&format!(
                "<li>#{} — {} — ${:.2} ({}){}</li>",
                escape_html(&quote.quote_number),
                escape_html(label),
                quote.amounts.total,
                escape_html(&quote.quote_status),
                link_suffix(quote.client_hub_uri.as_deref()),
            ));
        }
        html.push_str("</ul>");
    }

    html.push_str("<h2>Invoices</h2>");
    if invoices.is_empty() {
        html.push_str("<p>No invoices on file.</p>");
    } else {
        html.push_str("<ul>");
        for invoice in invoices {
            let label = invoice.subject.as_deref().unwrap_or("Invoice");
            html.push_str(&format!(
                "<li>#{} — {} — ${:.2} total, ${:.2} due ({}){}</li>",
                escape_html(&invoice.invoice_number),
                escape_html(label),
                invoice.amounts.total,
                invoice.amounts.invoice_balance,
                escape_html(&invoice.invoice_status),
                link_suffix(invoice.client_hub_uri.as_deref()),
            ));
        }
        html.push_str("</ul>");
    }

    html
}

/// Render a "view online" link when a client hub URI is present.
fn link_suffix(uri: Option<&str>) -> String {
    match uri {
        Some(uri) => format!(" — <a href=\"{}\">view online</a>", escape_html(uri)),
        None => String::new(),
    }
}

/// Minimal HTML escaping for user-controlled strings.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::jobber::{InvoiceAmounts, QuoteAmounts};

    fn client() -> ClientRecord {
        ClientRecord {
            id: "c1".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            name: Some("Pat <script>".to_string()),
            company_name: None,
            is_company: false,
        }
    }

    #[test]
    fn test_render_includes_quotes_and_invoices() {
        let quotes = vec![Quote {
            id: "q1".to_string(),
            amounts: QuoteAmounts { total: 1200.5 },
            quote_number: "7".to_string(),
            quote_status: "awaiting_response".to_string(),
            message: None,
            title: Some("Fence repair".to_string()),
            client_hub_uri: Some("https://clienthub.getjobber.com/q/7".to_string()),
        }];
        let invoices = vec![Invoice {
            id: "i1".to_string(),
            amounts: InvoiceAmounts {
                total: 300.0,
                invoice_balance: 0.0,
            },
            invoice_number: "12".to_string(),
            invoice_status: "paid".to_string(),
            issued_date: Some("2024-03-01".to_string()),
            due_date: None,
            subject: Some("Spring cleanup".to_string()),
            client_hub_uri: None,
        }];

        let html = render_lookup_html(Some("Acme Lawn Care"), &client(), &quotes, &invoices);

        assert!(html.contains("Acme Lawn Care"));
        assert!(html.contains("Fence repair"));
        assert!(html.contains("$1200.50"));
        assert!(html.contains("Spring cleanup"));
        assert!(html.contains("$300.00 total, $0.00 due"));
        assert!(html.contains("https://clienthub.getjobber.com/q/7"));
    }

    #[test]
    fn test_render_escapes_user_content() {
        let html = render_lookup_html(None, &client(), &[], &[]);
        assert!(html.contains("Pat &lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("No quotes on file."));
        assert!(html.contains("No invoices on file."));
    }

    #[tokio::test]
    async fn test_mock_mailer_drops_sends() {
        let mailer = MailerService::new_mock();
        mailer
            .send_lookup_email("customer@example.com", None, &client(), &[], &[])
            .await
            .unwrap();
    }
}
