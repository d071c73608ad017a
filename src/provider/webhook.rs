//! Decoding of provider webhook payloads into [`ProviderEvent`]s.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::ProviderEvent;
use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    #[serde(default)]
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Debug, Deserialize)]
struct RawPaymentError {
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Parses a verified webhook body.
///
/// Only string metadata values are kept. The failure code prefers the
/// card network's `decline_code` over the generic error `code`.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] when the body is not a provider
/// event envelope.
pub fn parse_event(body: &[u8]) -> Result<ProviderEvent, GatewayError> {
    let raw: RawEvent = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Validation(format!("unparseable webhook payload: {e}")))?;

    let metadata = raw
        .data
        .object
        .metadata
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect();

    let failure_code = raw
        .data
        .object
        .last_payment_error
        .and_then(|err| err.decline_code.or(err.code));

    Ok(ProviderEvent {
        id: raw.id,
        kind: raw.kind,
        object_id: raw.data.object.id,
        payment_status: raw.data.object.payment_status,
        failure_code,
        metadata,
    })
}
