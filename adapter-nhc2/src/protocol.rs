//! Envelopes of the controller's hobby API.

use anyhow::{Context, Result};
use bridge_core::model::{Device, DeviceUuid, Event};
use serde::Serialize;

pub const TOPIC_CMD: &str = "hobby/control/devices/cmd";
pub const TOPIC_RSP: &str = "hobby/control/devices/rsp";
pub const TOPIC_EVT: &str = "hobby/control/devices/evt";
pub const TOPIC_ERR: &str = "hobby/control/devices/err";

pub const METHOD_DEVICES_LIST: &str = "devices.list";
pub const METHOD_DEVICES_CONTROL: &str = "devices.control";

#[derive(Debug, Serialize)]
struct Request<'a> {
    #[serde(rename = "Method")]
    method: &'a str,
    #[serde(rename = "Params", skip_serializing_if = "Vec::is_empty")]
    params: Vec<ControlParams<'a>>,
}

#[derive(Debug, Serialize)]
struct ControlParams<'a> {
    #[serde(rename = "Devices")]
    devices: Vec<ControlDevice<'a>>,
}

#[derive(Debug, Serialize)]
struct ControlDevice<'a> {
    #[serde(rename = "Uuid")]
    uuid: &'a str,
    #[serde(rename = "Properties")]
    properties: Vec<serde_json::Map<String, serde_json::Value>>,
}

pub fn list_request() -> Result<Vec<u8>> {
    serde_json::to_vec(&Request { method: METHOD_DEVICES_LIST, params: Vec::new() })
        .context("encode devices.list")
}

pub fn status_command(id: &DeviceUuid, on: bool) -> Result<Vec<u8>> {
    control(id, "Status", serde_json::Value::from(if on { "On" } else { "Off" }))
}

/// The controller expects the level as a string.
pub fn brightness_command(id: &DeviceUuid, level: u8) -> Result<Vec<u8>> {
    control(id, "Brightness", serde_json::Value::String(level.to_string()))
}

fn control(id: &DeviceUuid, key: &str, value: serde_json::Value) -> Result<Vec<u8>> {
    let mut property = serde_json::Map::new();
    property.insert(key.to_string(), value);
    let request = Request {
        method: METHOD_DEVICES_CONTROL,
        params: vec![ControlParams {
            devices: vec![ControlDevice { uuid: id.as_str(), properties: vec![property] }],
        }],
    };
    serde_json::to_vec(&request).context("encode devices.control")
}

/// Responses share the event envelope.
pub fn decode_message(payload: &[u8]) -> Result<Event> {
    serde_json::from_slice(payload).context("decode hobby api message")
}

/// `Some(devices)` when `payload` answers a `devices.list` request.
pub fn decode_list_response(payload: &[u8]) -> Result<Option<Vec<Device>>> {
    let message = decode_message(payload)?;
    if message.method.as_deref() != Some(METHOD_DEVICES_LIST) {
        return Ok(None);
    }
    Ok(Some(message.devices().cloned().collect()))
}
