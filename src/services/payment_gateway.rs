// Payment gateway adapter (Mercado Pago API shape)
// Creates hosted-checkout preferences and fetches authoritative payment
// status. Every call is bounded by the configured timeout; a gateway
// failure surfaces as GatewayUnavailable and never mutates our state.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app_config::PaymentGatewayConfig;

#[derive(thiserror::Error, Debug)]
pub enum PaymentGatewayError {
    #[error("Payment gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Payment gateway returned status {0}")]
    GatewayUnavailable(u16),

    #[error("Payment not found at gateway")]
    PaymentNotFound,
}

#[derive(Debug, Serialize)]
struct PreferenceItem {
    title: String,
    quantity: u32,
    currency_id: &'static str,
    unit_price: f64,
}

#[derive(Debug, Serialize)]
struct PreferencePayer {
    name: String,
}

#[derive(Debug, Serialize)]
struct BackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct CreatePreferenceRequest {
    items: Vec<PreferenceItem>,
    payer: PreferencePayer,
    back_urls: BackUrls,
    auto_return: &'static str,
    external_reference: String,
    notification_url: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    sandbox_init_point: Option<String>,
}

/// Checkout handle returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPreference {
    pub preference_id: String,
    pub init_point: String,
}

/// Authoritative payment record fetched from the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: serde_json::Value,
    pub status: String,
    pub external_reference: Option<String>,
    pub transaction_amount: Option<f64>,
}

impl GatewayPayment {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

#[derive(Clone)]
pub struct PaymentGatewayService {
    client: Client,
    config: PaymentGatewayConfig,
}

impl PaymentGatewayService {
    pub fn new(config: PaymentGatewayConfig) -> Result<Self, PaymentGatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a hosted-checkout preference. Returns the redirect URL the
    /// payer should be sent to (sandbox variant in sandbox mode).
    pub async fn create_preference(
        &self,
        title: &str,
        payer_name: &str,
        amount_cents: i64,
        external_reference: &str,
    ) -> Result<CheckoutPreference, PaymentGatewayError> {
        let request = CreatePreferenceRequest {
            items: vec![PreferenceItem {
                title: title.to_string(),
                quantity: 1,
                currency_id: "BRL",
                unit_price: amount_cents as f64 / 100.0,
            }],
            payer: PreferencePayer {
                name: payer_name.to_string(),
            },
            back_urls: BackUrls {
                success: self.config.back_url_success.clone(),
                failure: self.config.back_url_failure.clone(),
                pending: self.config.back_url_pending.clone(),
            },
            auto_return: "approved",
            external_reference: external_reference.to_string(),
            notification_url: self.config.notification_url.clone(),
        };

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.config.base_url))
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PaymentGatewayError::GatewayUnavailable(
                response.status().as_u16(),
            ));
        }

        let preference: PreferenceResponse = response.json().await?;
        let init_point = if self.config.sandbox {
            preference
                .sandbox_init_point
                .unwrap_or(preference.init_point)
        } else {
            preference.init_point
        };

        Ok(CheckoutPreference {
            preference_id: preference.id,
            init_point,
        })
    }

    /// Fetch a payment by gateway id; the webhook never trusts the payload
    /// status, only this response.
    pub async fn fetch_payment(
        &self,
        payment_id: &str,
    ) -> Result<GatewayPayment, PaymentGatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.config.base_url, payment_id))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentGatewayError::PaymentNotFound);
        }
        if !response.status().is_success() {
            return Err(PaymentGatewayError::GatewayUnavailable(
                response.status().as_u16(),
            ));
        }

        Ok(response.json::<GatewayPayment>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approved_status_check() {
        let payment = GatewayPayment {
            id: serde_json::json!(123),
            status: "approved".to_string(),
            external_reference: None,
            transaction_amount: Some(600.0),
        };
        assert!(payment.is_approved());

        let pending = GatewayPayment {
            status: "pending".to_string(),
            ..payment
        };
        assert!(!pending.is_approved());
    }

    #[test]
    fn test_payment_deserializes_numeric_and_string_ids() {
        let numeric: GatewayPayment =
            serde_json::from_str(r#"{"id": 12345, "status": "approved"}"#).unwrap();
        assert!(numeric.is_approved());

        let string: GatewayPayment =
            serde_json::from_str(r#"{"id": "12345", "status": "rejected"}"#).unwrap();
        assert!(!string.is_approved());
    }
}
