//! Shared HTTP plumbing for the REST and node-RPC variants.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::BackendError;

pub(crate) fn build_client(timeout: std::time::Duration) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Config(format!("http client: {e}")))
}

/// Map a non-success status to the layer's error kinds, consuming the body
/// for diagnostics.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(BackendError::NotFound("http 404".into())),
        StatusCode::TOO_MANY_REQUESTS => Err(BackendError::RateLimited),
        other => {
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::Transport {
                status: other.as_u16(),
                body,
            })
        }
    }
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<T, BackendError> {
    tracing::debug!(%url, "GET json");
    let response = check_status(client.get(url).send().await?).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| BackendError::Decode(format!("{url}: {e}")))
}

pub(crate) async fn get_text(client: &Client, url: &str) -> Result<String, BackendError> {
    tracing::debug!(%url, "GET text");
    let response = check_status(client.get(url).send().await?).await?;
    Ok(response.text().await?.trim().to_string())
}

pub(crate) async fn post_text_body(
    client: &Client,
    url: &str,
    body: String,
) -> Result<String, BackendError> {
    tracing::debug!(%url, "POST text");
    let response = check_status(client.post(url).body(body).send().await?).await?;
    Ok(response.text().await?.trim().to_string())
}

/// One JSON-RPC 2.0 exchange over HTTP, with the standard envelope checks.
pub(crate) async fn json_rpc(
    request: RequestBuilder,
    method: &str,
    params: Value,
) -> Result<Value, BackendError> {
    tracing::debug!(method, "json-rpc call");
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = check_status(request.json(&payload).send().await?).await?;
    let envelope: Value = response
        .json()
        .await
        .map_err(|e| BackendError::Decode(format!("{method}: {e}")))?;

    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown rpc error")
            .to_string();
        return Err(BackendError::Rpc { code, message });
    }
    envelope
        .get("result")
        .cloned()
        .ok_or_else(|| BackendError::Decode(format!("{method}: missing result")))
}
