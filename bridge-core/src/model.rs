use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use std::fmt;
use tracing::warn;

/// Opaque controller identity. The controller hands out UUID strings but the
/// bridge never interprets them.
#[repr(transparent)]
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceUuid(pub String);

impl DeviceUuid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceUuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    On,
    Off,
    Other(String),
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "On" => Status::On,
            "Off" => Status::Off,
            other => Status::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Status(Status),
    /// `None` when the controller reported null or something non-numeric.
    Brightness(Option<f64>),
    Unknown { key: String, value: serde_json::Value },
}

pub const KEY_STATUS: &str = "Status";
pub const KEY_BRIGHTNESS: &str = "Brightness";

impl Property {
    pub fn from_pair(key: &str, value: &serde_json::Value) -> Self {
        match key {
            KEY_STATUS => match value.as_str() {
                Some(s) => Property::Status(Status::from(s)),
                None => Property::Status(Status::Other(value.to_string())),
            },
            KEY_BRIGHTNESS => Property::Brightness(numeric(value)),
            _ => Property::Unknown { key: key.to_string(), value: value.clone() },
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Property::Status(_) => KEY_STATUS,
            Property::Brightness(_) => KEY_BRIGHTNESS,
            Property::Unknown { key, .. } => key,
        }
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v: &f64| v.is_finite())
}

/// Decodes a list entry by entry, skipping entries of the wrong shape so the
/// rest of the payload still gets through.
fn skip_undecodable<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(error = %err, "skipping undecodable entry");
                None
            }
        })
        .collect())
}

/// Wire shape of a device as the controller sends it.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawDevice {
    #[serde(rename = "Uuid")]
    uuid: String,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Model", default)]
    model: Option<String>,
    #[serde(rename = "Type", default)]
    device_type: Option<String>,
    #[serde(rename = "Properties", default)]
    properties: Option<Vec<serde_json::Value>>,
}

/// Immutable snapshot of a controller device. Event payloads carry partial
/// snapshots holding only the properties that changed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawDevice")]
pub struct Device {
    pub uuid: DeviceUuid,
    pub name: String,
    pub model: String,
    pub device_type: String,
    pub properties: Vec<Property>,
}

impl From<RawDevice> for Device {
    fn from(raw: RawDevice) -> Self {
        let properties = raw
            .properties
            .unwrap_or_default()
            .iter()
            .filter_map(serde_json::Value::as_object)
            .flat_map(|obj| obj.iter().map(|(k, v)| Property::from_pair(k, v)))
            .collect();
        Self {
            uuid: DeviceUuid(raw.uuid),
            name: raw.name.unwrap_or_default(),
            model: raw.model.unwrap_or_default(),
            device_type: raw.device_type.unwrap_or_default(),
            properties,
        }
    }
}

impl Device {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            uuid: DeviceUuid(uuid.into()),
            name: name.into(),
            model: model.into(),
            device_type: String::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EventParams {
    #[serde(rename = "Devices", default, deserialize_with = "skip_undecodable")]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Event {
    #[serde(rename = "Method", default)]
    pub method: Option<String>,
    #[serde(rename = "Params", default, deserialize_with = "skip_undecodable")]
    pub params: Vec<EventParams>,
}

impl Event {
    pub fn from_devices(devices: Vec<Device>) -> Self {
        Self { method: None, params: vec![EventParams { devices }] }
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.params.iter().flat_map(|p| p.devices.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_multi_key_property_objects() {
        let device: Device = serde_json::from_value(json!({
            "Uuid": "U1",
            "Name": "Kitchen",
            "Model": "dimmer",
            "Type": "action",
            "Properties": [{"Status": "On", "Brightness": "40"}, {"Aligned": "True"}]
        }))
        .unwrap();

        assert_eq!(device.uuid, DeviceUuid::from("U1"));
        assert_eq!(device.model, "dimmer");
        assert!(device.properties.contains(&Property::Status(Status::On)));
        assert!(device.properties.contains(&Property::Brightness(Some(40.0))));
        assert!(device.properties.iter().any(|p| p.key() == "Aligned"));
    }

    #[test]
    fn missing_fields_default() {
        let device: Device = serde_json::from_value(json!({"Uuid": "U2"})).unwrap();
        assert!(device.name.is_empty());
        assert!(device.properties.is_empty());
    }

    #[test]
    fn non_numeric_brightness_is_none() {
        assert_eq!(Property::from_pair("Brightness", &json!(null)), Property::Brightness(None));
        assert_eq!(Property::from_pair("Brightness", &json!("dim")), Property::Brightness(None));
        assert_eq!(Property::from_pair("Brightness", &json!(0)), Property::Brightness(Some(0.0)));
        for odd in ["NaN", "inf", "-infinity"] {
            assert_eq!(
                Property::from_pair("Brightness", &json!(odd)),
                Property::Brightness(None),
                "{odd}"
            );
        }
    }

    #[test]
    fn event_flattens_params() {
        let event: Event = serde_json::from_value(json!({
            "Method": "devices.status_changed",
            "Params": [
                {"Devices": [{"Uuid": "A", "Properties": [{"Status": "Off"}]}]},
                {"Devices": [{"Uuid": "B"}, {"Uuid": "A"}]}
            ]
        }))
        .unwrap();

        let ids: Vec<_> = event.devices().map(|d| d.uuid.as_str()).collect();
        assert_eq!(ids, ["A", "B", "A"]);
    }

    #[test]
    fn malformed_entries_do_not_sink_the_event() {
        let event: Event = serde_json::from_value(json!({
            "Params": [
                {"Devices": [
                    {"Uuid": "U1", "Properties": [{"Status": "Off"}]},
                    {"Uuid": "U2", "Properties": [{"Status": "On"}, null, 7]},
                    {"Name": "no uuid"},
                    "garbage"
                ]},
                null,
                {"Devices": null}
            ]
        }))
        .unwrap();

        let devices: Vec<_> = event.devices().collect();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].properties, vec![Property::Status(Status::Off)]);
        assert_eq!(devices[1].uuid, DeviceUuid::from("U2"));
        assert_eq!(devices[1].properties, vec![Property::Status(Status::On)]);
    }
}
