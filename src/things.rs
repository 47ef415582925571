//! LINE Things device events.
//!
//! The typed webhook model has no `things` event type, so device events are
//! picked out of the same body in a second, untyped pass. An event belongs to
//! a device when it carries a `things` object. That object is then decoded
//! strictly, keyed on `things.type`. Each event is decoded on its own, so a
//! malformed event only fails once the events before it have been handled.

use serde::Deserialize;
use serde_json::Value;

/// The callback body as seen by the device-event pass.
#[derive(Deserialize, Debug)]
pub struct RawCallback {
    pub events: Vec<Value>,
}

#[derive(Debug)]
pub enum RawEvent {
    Things {
        event: ThingsEvent,
        /// The event exactly as received, for logging.
        raw: Value,
    },
    Other,
}

impl TryFrom<Value> for RawEvent {
    type Error = serde_json::Error;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        if raw.get("things").is_none() {
            return Ok(RawEvent::Other);
        }
        let event = ThingsEvent::deserialize(&raw)?;
        Ok(RawEvent::Things { event, raw })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ThingsEvent {
    pub reply_token: Option<String>,
    pub things: Things,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Things {
    #[serde(rename_all = "camelCase")]
    ScenarioResult {
        device_id: Option<String>,
        result: ScenarioResult,
    },
    #[serde(rename_all = "camelCase")]
    Link { device_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Unlink { device_id: Option<String> },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario_id: Option<String>,
    pub result_code: String,
    /// Base64 of the bytes the device sent in its BLE notification.
    pub ble_notification_payload: Option<String>,
    pub error_reason: Option<String>,
}

impl ScenarioResult {
    pub fn is_success(&self) -> bool {
        self.result_code == "success"
    }
}
