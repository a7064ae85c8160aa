use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::TransportError;
use crate::logging::log_call;

mod http;
pub mod scripted;

pub use scripted::ScriptedTransport;

/// `{ok, data, message}` wrapper around every service reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self { ok: true, data: Some(data), message: None }
    }

    pub fn ok_with_message(data: Value, message: &str) -> Self {
        Self { ok: true, data: Some(data), message: Some(message.to_string()) }
    }

    pub fn fail(message: &str) -> Self {
        Self { ok: false, data: None, message: Some(message.to_string()) }
    }

    /// Look up one field of `data`, treating JSON null as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref()?.get(name).filter(|v| !v.is_null())
    }
}

/// One request/response exchange with the service. No retries: each call
/// completes or fails exactly once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, action: &str, data: Value) -> Result<Envelope, TransportError>;
}

/// POSTs `{"action", "data"}` to a single configured endpoint.
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(cfg: &Config) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, url: cfg.api_url.clone() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, action: &str, data: Value) -> Result<Envelope, TransportError> {
        let started = Instant::now();
        let body = json!({ "action": action, "data": data });
        let result = http::post_envelope(&self.client, &self.url, &body).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(env) => log_call(action, elapsed_ms, Ok(env.ok)),
            Err(err) => log_call(action, elapsed_ms, Err(&err.to_string())),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_optional_fields() {
        let env: Envelope = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(env.ok);
        assert!(env.data.is_none());
        assert!(env.message.is_none());

        let env: Envelope =
            serde_json::from_str(r#"{"ok":false,"message":"no such user","data":{"credits":null}}"#)
                .unwrap();
        assert!(!env.ok);
        assert_eq!(env.message.as_deref(), Some("no such user"));
        assert!(env.field("credits").is_none());
    }

    #[test]
    fn test_envelope_requires_ok() {
        assert!(serde_json::from_str::<Envelope>(r#"{"data":{}}"#).is_err());
    }
}
