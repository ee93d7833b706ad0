// Payment webhook handler
// The gateway retries until it sees 200. Once the notification is durably
// recorded we acknowledge even when downstream processing fails; the
// recorded payload allows replay. Only an unusable request or a database
// failure earns a non-200.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::services::subscription::SubscriptionError;
use crate::utils::service_error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub id: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

/// Extract the gateway payment id from either the JSON body
/// ({type: "payment", data: {id}}) or the query string (?id=&topic=payment).
fn extract_payment_id(query: &WebhookQuery, body: &serde_json::Value) -> Option<String> {
    let body_type = body.get("type").and_then(|v| v.as_str());
    if body_type == Some("payment") {
        if let Some(id) = body.pointer("/data/id") {
            if let Some(s) = id.as_str() {
                return Some(s.to_string());
            }
            if let Some(n) = id.as_i64() {
                return Some(n.to_string());
            }
        }
    }

    let topic = query
        .topic
        .as_deref()
        .or(query.event_type.as_deref());
    if topic == Some("payment") || (topic.is_none() && body_type.is_none()) {
        return query.id.clone();
    }

    None
}

/// POST /api/webhooks/payment-success (public)
pub async fn payment_success(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Option<Json<serde_json::Value>>,
) -> Result<StatusCode, ServiceError> {
    let payload = body.map(|Json(v)| v).unwrap_or(serde_json::Value::Null);

    let Some(payment_id) = extract_payment_id(&query, &payload) else {
        tracing::warn!("Webhook without a payment id, ignoring: {:?}", query);
        return Err(ServiceError::BadRequest(
            "No payment id in notification".to_string(),
        ));
    };

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    match state
        .subscription
        .process_payment_notification(&mut conn, &payment_id, payload)
        .await
    {
        Ok(()) => Ok(StatusCode::OK),
        // the notification is recorded; acknowledge so the gateway stops
        // retrying, and rely on the stored payload for replay
        Err(SubscriptionError::Gateway(e)) => {
            tracing::error!(
                "Gateway lookup failed for payment {}, acknowledged for replay: {}",
                payment_id,
                e
            );
            Ok(StatusCode::OK)
        },
        Err(SubscriptionError::Database(e)) => {
            tracing::error!("Webhook processing failed for payment {}: {}", payment_id, e);
            Err(ServiceError::Internal)
        },
        Err(e) => {
            tracing::error!(
                "Webhook activation failed for payment {}, acknowledged: {}",
                payment_id,
                e
            );
            Ok(StatusCode::OK)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_body() {
        let query = WebhookQuery {
            id: None,
            topic: None,
            event_type: None,
        };
        let body = serde_json::json!({"type": "payment", "data": {"id": 12345}});
        assert_eq!(extract_payment_id(&query, &body), Some("12345".to_string()));

        let body = serde_json::json!({"type": "payment", "data": {"id": "abc-1"}});
        assert_eq!(extract_payment_id(&query, &body), Some("abc-1".to_string()));
    }

    #[test]
    fn test_extract_from_query() {
        let query = WebhookQuery {
            id: Some("987".to_string()),
            topic: Some("payment".to_string()),
            event_type: None,
        };
        assert_eq!(
            extract_payment_id(&query, &serde_json::Value::Null),
            Some("987".to_string())
        );
    }

    #[test]
    fn test_ignores_other_topics() {
        let query = WebhookQuery {
            id: Some("987".to_string()),
            topic: Some("merchant_order".to_string()),
            event_type: None,
        };
        assert_eq!(extract_payment_id(&query, &serde_json::Value::Null), None);

        let body = serde_json::json!({"type": "plan", "data": {"id": 1}});
        let bare = WebhookQuery {
            id: None,
            topic: None,
            event_type: None,
        };
        assert_eq!(extract_payment_id(&bare, &body), None);
    }
}
