use reqwest::Client;
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::Envelope;

pub(super) async fn post_envelope(
    client: &Client,
    url: &str,
    body: &Value,
) -> Result<Envelope, TransportError> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }

    let text = resp
        .text()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    parse_envelope(&text)
}

pub(super) fn parse_envelope(text: &str) -> Result<Envelope, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Malformed(e.to_string()))
}
