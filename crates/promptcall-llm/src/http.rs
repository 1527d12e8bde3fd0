//! HTTP plumbing shared by the provider adapters

use crate::stream::SseStream;
use crate::{LLMError, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

pub(crate) type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// POST a JSON body and decode the JSON reply
///
/// Returns the typed response together with the raw body so the uniform
/// response can carry provider metadata untouched.
pub(crate) async fn post_json<Req, Res>(
    client: &Client,
    url: &str,
    headers: &[(&str, String)],
    body: &Req,
    model: &str,
) -> Result<(Res, Value)>
where
    Req: Serialize + ?Sized,
    Res: DeserializeOwned,
{
    let response = send(client, url, headers, body, model).await?;
    let text = response.text().await?;
    let raw: Value = serde_json::from_str(&text).map_err(|e| {
        LLMError::UnexpectedResponse(format!("Response body is not valid JSON: {e}"))
    })?;
    let typed = serde_json::from_value(raw.clone())
        .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))?;
    Ok((typed, raw))
}

/// POST a JSON body and hand back the reply as a server-sent-event stream
pub(crate) async fn post_stream<Req>(
    client: &Client,
    url: &str,
    headers: &[(&str, String)],
    body: &Req,
    model: &str,
) -> Result<SseStream<ByteStream>>
where
    Req: Serialize + ?Sized,
{
    let response = send(client, url, headers, body, model).await?;
    Ok(SseStream::new(response.bytes_stream().boxed()))
}

async fn send<Req>(
    client: &Client,
    url: &str,
    headers: &[(&str, String)],
    body: &Req,
    model: &str,
) -> Result<Response>
where
    Req: Serialize + ?Sized,
{
    let request = with_headers(client.post(url), headers)
        .header("content-type", "application/json")
        .json(body);

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        debug!(status = %status, "Provider request succeeded");
        return Ok(response);
    }

    let error_text = response.text().await?;
    Err(status_error(status.as_u16(), &status.to_string(), error_text, model))
}

fn with_headers(mut builder: RequestBuilder, headers: &[(&str, String)]) -> RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder
}

/// Map a non-success HTTP status onto the error taxonomy
pub(crate) fn status_error(code: u16, status: &str, body: String, model: &str) -> LLMError {
    match code {
        401 | 403 => LLMError::AuthenticationFailed,
        429 => LLMError::RateLimitExceeded(body),
        400 => LLMError::InvalidRequest(body),
        404 => LLMError::ModelNotFound(model.to_string()),
        _ => LLMError::RequestFailed(format!("HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(401, "401 Unauthorized", String::new(), "m"),
            LLMError::AuthenticationFailed
        ));
        assert!(matches!(
            status_error(429, "429 Too Many Requests", "slow".to_string(), "m"),
            LLMError::RateLimitExceeded(body) if body == "slow"
        ));
        assert!(matches!(
            status_error(404, "404 Not Found", String::new(), "gpt-9"),
            LLMError::ModelNotFound(model) if model == "gpt-9"
        ));

        let server = status_error(502, "502 Bad Gateway", "upstream".to_string(), "m");
        assert_eq!(
            server.to_string(),
            "API request failed: HTTP 502 Bad Gateway: upstream"
        );
        assert!(server.is_retryable());
    }
}
