//! LINE webhook endpoints.
//!
//! Each callback is checked against `X-Line-Signature` and then walked twice.
//! The typed pass echoes text messages. The raw pass handles LINE Things
//! scenario results, which the typed model does not cover, by decoding the
//! sensor payload and replying with the readings. The raw pass only runs on
//! a body whose signature has already been verified.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CallbackError;
use crate::line::Messenger;
use crate::parser::{Event, MessageContent};
use crate::sensor::SensorReading;
use crate::things::{RawCallback, RawEvent, Things, ThingsEvent};
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-line-signature";

pub fn router<M: Messenger>() -> Router<AppState<M>> {
    Router::new()
        .route("/", get(healthcheck))
        .route("/callback", post(callback::<M>))
}

async fn healthcheck() -> &'static str {
    "OK"
}

async fn callback<M: Messenger>(
    State(state): State<AppState<M>>,
    headers: HeaderMap,
    body: String,
) -> Result<&'static str, CallbackError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(CallbackError::MissingHeader)?;

    info!(body = %body, "Request body");

    let payload = state.parser.parse(&body, signature)?;
    debug!(
        destination = payload.destination.as_deref().unwrap_or("-"),
        events = payload.events.len(),
        "Signature verified"
    );

    for event in &payload.events {
        handle_message(&state.messenger, event).await?;
    }

    // Same bytes again, untyped, for device events.
    let device_pass: RawCallback = serde_json::from_str(&body)?;
    for value in device_pass.events {
        if let RawEvent::Things { event, raw } = RawEvent::try_from(value)? {
            handle_things_event(&state.messenger, &event, &raw).await?;
        }
    }

    Ok("OK")
}

async fn handle_message<M: Messenger>(messenger: &M, event: &Event) -> Result<(), CallbackError> {
    let Event::Message(message) = event else {
        debug!(kind = event.kind(), "Ignoring event");
        return Ok(());
    };
    let MessageContent::Text { id, text } = &message.message else {
        debug!("Ignoring non-text message");
        return Ok(());
    };
    let Some(reply_token) = message.reply_token.as_deref() else {
        debug!("Ignoring text message without reply token");
        return Ok(());
    };

    debug!(
        message_id = id.as_deref().unwrap_or("-"),
        chat_id = message.source.as_ref().map(|s| s.id()).unwrap_or("-"),
        user_id = message.source.as_ref().and_then(|s| s.user_id()).unwrap_or("-"),
        sent_at = ?message.sent_at(),
        "Echoing text message"
    );

    messenger
        .reply_text(reply_token, text)
        .await
        .map_err(CallbackError::Reply)
}

async fn handle_things_event<M: Messenger>(
    messenger: &M,
    event: &ThingsEvent,
    raw: &Value,
) -> Result<(), CallbackError> {
    let (device_id, result) = match &event.things {
        Things::ScenarioResult { device_id, result } => (device_id, result),
        Things::Link { device_id } | Things::Unlink { device_id } => {
            debug!(
                device_id = device_id.as_deref().unwrap_or("-"),
                "Ignoring device link change"
            );
            return Ok(());
        }
        Things::Other => {
            debug!("Ignoring things event");
            return Ok(());
        }
    };

    if !result.is_success() {
        warn!(
            result_code = %result.result_code,
            error_reason = result.error_reason.as_deref().unwrap_or("-"),
            event = %raw,
            "Error result"
        );
        return Ok(());
    }

    let Some(payload) = result.ble_notification_payload.as_deref() else {
        return Ok(());
    };

    let reading = SensorReading::from_base64(payload)?;
    let message = reading.to_string();
    info!(
        device_id = device_id.as_deref().unwrap_or("-"),
        scenario_id = result.scenario_id.as_deref().unwrap_or("-"),
        %message,
        "Sensor reading"
    );

    let reply_token = event
        .reply_token
        .as_deref()
        .ok_or(CallbackError::MissingReplyToken)?;

    messenger
        .reply_text(reply_token, &message)
        .await
        .map_err(CallbackError::Reply)
}
