//! LINE Messaging API client.
//!
//! Only the reply endpoint is used. A reply token is handed out with every
//! webhook event and may be used once, shortly after delivery. Authentication
//! is via the channel access token as a Bearer token.

use std::future::Future;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const REPLY_PATH: &str = "/v2/bot/message/reply";

/// Outbound side of the bot: anything that can answer a reply token.
pub trait Messenger: Clone + Send + Sync + 'static {
    /// Reply to the event identified by `reply_token` with a single text message.
    fn reply_text(
        &self,
        reply_token: &str,
        text: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<OutgoingMessage<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
enum OutgoingMessage<'a> {
    Text { text: &'a str },
}

/// Error envelope returned by the Messaging API on 4xx/5xx.
#[derive(Deserialize, Debug)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize, Debug)]
struct ErrorDetail {
    message: Option<String>,
    property: Option<String>,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for detail in &self.details {
            write!(
                f,
                " ({}: {})",
                detail.property.as_deref().unwrap_or("-"),
                detail.message.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}

/// Client for the LINE Messaging API.
#[derive(Clone)]
pub struct LineClient {
    access_token: String,
    base_url: String,
    http: reqwest::Client,
}

impl LineClient {
    pub fn new(access_token: String, base_url: impl Into<String>) -> Self {
        Self {
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Send a reply-message request.
    async fn reply(&self, reply_token: &str, messages: Vec<OutgoingMessage<'_>>) -> Result<()> {
        let body = ReplyRequest {
            reply_token,
            messages,
        };

        debug!(reply_token, "LINE reply request");

        let response = self
            .http
            .post(format!("{}{REPLY_PATH}", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to LINE API")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let response_text = response
            .text()
            .await
            .context("Failed to read LINE API response")?;

        match serde_json::from_str::<ErrorResponse>(&response_text) {
            Ok(api_err) => {
                error!(%status, error = %api_err, "LINE API error");
                bail!("LINE API returned HTTP {status}: {api_err}");
            }
            Err(_) => {
                error!(%status, body = %response_text, "LINE API HTTP error");
                bail!("LINE API returned HTTP {status}: {response_text}");
            }
        }
    }
}

impl Messenger for LineClient {
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<()> {
        self.reply(reply_token, vec![OutgoingMessage::Text { text }])
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn spawn_api(status: StatusCode, response: Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let sink = captured.clone();
        let router = Router::new().route(
            REPLY_PATH,
            post(move |headers: HeaderMap, Json::<Value>(body)| {
                let sink = sink.clone();
                let response = response.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    sink.lock().unwrap().push((auth, body));
                    (status, Json(response))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{addr}"), captured)
    }

    #[tokio::test]
    async fn reply_text_posts_single_text_message() {
        let (base, captured) = spawn_api(StatusCode::OK, json!({})).await;
        let client = LineClient::new("token-123".into(), format!("{base}/"));

        client.reply_text("rt-1", "hello").await.unwrap();

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (auth, body) = &calls[0];
        assert_eq!(auth.as_deref(), Some("Bearer token-123"));
        assert_eq!(
            body,
            &json!({
                "replyToken": "rt-1",
                "messages": [{ "type": "text", "text": "hello" }]
            })
        );
    }

    #[tokio::test]
    async fn api_error_is_surfaced() {
        let (base, _) = spawn_api(
            StatusCode::BAD_REQUEST,
            json!({
                "message": "Invalid reply token",
                "details": [{ "message": "expired", "property": "replyToken" }]
            }),
        )
        .await;
        let client = LineClient::new("token".into(), base);

        let err = client.reply_text("stale", "hi").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("400"), "{msg}");
        assert!(msg.contains("Invalid reply token"), "{msg}");
        assert!(msg.contains("replyToken: expired"), "{msg}");
    }

    #[tokio::test]
    async fn non_json_error_body_is_kept() {
        let (base, _) = spawn_api(StatusCode::INTERNAL_SERVER_ERROR, json!("oops")).await;
        let client = LineClient::new("token".into(), base);

        let err = client.reply_text("rt", "hi").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
