use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::sensor::PayloadError;

/// Everything that can abort a `/callback` request.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("missing X-Line-Signature header")]
    MissingHeader,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("device event has no replyToken")]
    MissingReplyToken,
    #[error("failed to send reply: {0:#}")]
    Reply(anyhow::Error),
}

impl CallbackError {
    pub fn status(&self) -> StatusCode {
        match self {
            CallbackError::MissingHeader | CallbackError::InvalidSignature => {
                StatusCode::BAD_REQUEST
            }
            CallbackError::MalformedBody(_)
            | CallbackError::Payload(_)
            | CallbackError::MissingReplyToken
            | CallbackError::Reply(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            CallbackError::InvalidSignature => {
                warn!("Invalid signature. Check the channel access token/channel secret.")
            }
            CallbackError::MissingHeader => warn!("{self}"),
            _ => error!("Callback failed: {self}"),
        }

        let body = if status.is_server_error() {
            "Internal Server Error"
        } else {
            "Bad Request"
        };
        (status, body).into_response()
    }
}
