//! Stripe Checkout Sessions client over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentProvider, ProviderError};
use crate::config::PaymentConfig;

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

/// Hosted checkout backed by the Stripe API.
#[derive(Debug, Clone)]
pub struct StripeProvider {
    http_client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeProvider {
    /// Builds a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }
        Ok(response)
    }
}

/// Encodes a session request with Stripe's bracketed form keys.
fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("expires_at".to_string(), request.expires_at.timestamp().to_string()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        form.push((format!("{prefix}[price_data][currency]"), item.currency.clone()));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
    }

    // Mirrored onto the payment intent so payment_intent.* events carry it.
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value.clone()));
    }
    form
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .post_form("/v1/checkout/sessions", &session_form(request))
            .await?;
        let session: SessionResponse = response.json().await?;
        let url = session
            .url
            .ok_or_else(|| ProviderError::Response(format!("session {} has no url", session.id)))?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn expire_session(&self, session_id: &str) -> Result<(), ProviderError> {
        self.post_form(&format!("/v1/checkout/sessions/{session_id}/expire"), &[])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::provider::LineItem;
    use chrono::{TimeZone, Utc};

    fn request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            line_items: vec![LineItem {
                name: "Gala - A1".to_string(),
                unit_amount: 10_200,
                currency: "pln".to_string(),
                quantity: 2,
            }],
            metadata: vec![("eventId".to_string(), "e1".to_string())],
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
            client_reference_id: "r1".to_string(),
        }
    }

    fn value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn form_uses_bracketed_line_item_keys() {
        let form = session_form(&request());
        assert_eq!(value(&form, "line_items[0][quantity]"), Some("2"));
        assert_eq!(value(&form, "line_items[0][price_data][unit_amount]"), Some("10200"));
        assert_eq!(value(&form, "expires_at"), Some("1700000000"));
    }

    #[test]
    fn metadata_is_mirrored_to_payment_intent() {
        let form = session_form(&request());
        assert_eq!(value(&form, "metadata[eventId]"), Some("e1"));
        assert_eq!(value(&form, "payment_intent_data[metadata][eventId]"), Some("e1"));
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let config = PaymentConfig {
            api_base: "https://api.example.test/".to_string(),
            ..PaymentConfig::default()
        };
        let Ok(provider) = StripeProvider::new(&config, Duration::from_secs(1)) else {
            panic!("client builds");
        };
        assert_eq!(provider.api_base, "https://api.example.test");
    }
}
