//! Typed view over the known raw payload shapes.
//!
//! The three sources do not share a schema. Broker uplinks nest
//! everything under `uplink_message`, the webhook persists a flattened
//! document with its own `decoded_payload`, and bucket objects may be
//! either. Instead of probing arbitrary paths, a payload is deserialized
//! once into [`Envelope`], a lenient struct per known layout, and the
//! extractor resolves each field through an explicit priority list.
//!
//! Deserialization here cannot fail: every leaf is a [`Value`], and a
//! nested object with an unexpected type degrades to `None`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Which known layout a payload matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// TTN-style broker uplink: `{ end_device_ids, uplink_message: { decoded_payload, .. } }`.
    Uplink,
    /// Stored document with a top-level `decoded_payload` (webhook-persisted
    /// or bucket object).
    Stored,
    /// Any other JSON object; the object itself is the decoded body.
    Flat,
    /// Not a JSON object at all.
    Opaque,
}

impl Shape {
    /// Stable name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uplink => "uplink",
            Self::Stored => "stored",
            Self::Flat => "flat",
            Self::Opaque => "opaque",
        }
    }
}

/// Fields of a decoded application payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DecodedFields {
    /// Stress level as reported by the device codec.
    pub stress_level: Option<Value>,
    /// Wearer name.
    pub username: Option<Value>,
    /// Explicit ISO-8601 sample time.
    pub timestamp_iso: Option<Value>,
}

/// LoRaWAN application identifiers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationIds {
    /// Application the device belongs to.
    pub application_id: Option<Value>,
}

/// LoRaWAN end-device identifiers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceIds {
    /// Network-assigned device name.
    pub device_id: Option<Value>,
    /// Device EUI.
    pub dev_eui: Option<Value>,
    /// Owning application.
    #[serde(deserialize_with = "lenient")]
    pub application_ids: Option<ApplicationIds>,
}

/// The `uplink_message` block of a broker envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UplinkMessage {
    /// Codec output.
    pub decoded_payload: Option<Value>,
    /// When the network server received the uplink.
    pub received_at: Option<Value>,
    /// Gateway metadata.
    pub rx_metadata: Option<Value>,
    /// Radio settings.
    pub settings: Option<Value>,
    /// Raw frame payload (base64).
    pub frm_payload: Option<Value>,
    /// Frame port.
    pub f_port: Option<Value>,
    /// Frame counter.
    pub f_cnt: Option<Value>,
}

/// Top-level fields that any of the layouts may carry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopLevel {
    /// Top-level decoded body (stored documents).
    pub decoded_payload: Option<Value>,
    /// Nested broker uplink.
    #[serde(deserialize_with = "lenient")]
    pub uplink_message: Option<UplinkMessage>,
    /// Device identifiers.
    #[serde(deserialize_with = "lenient")]
    pub end_device_ids: Option<DeviceIds>,
    /// Flat stress level.
    pub stress_level: Option<Value>,
    /// Flat wearer name.
    pub username: Option<Value>,
    /// Generic timestamp.
    pub timestamp: Option<Value>,
    /// Flat received-at time.
    pub received_at: Option<Value>,
    /// When the document was uploaded or stored.
    pub upload_timestamp: Option<Value>,
    /// Device address recorded by the webhook.
    pub device_address: Option<Value>,
    /// Flat device EUI.
    pub dev_eui: Option<Value>,
    /// Flat device id.
    pub device_id: Option<Value>,
    /// How the document got into the database.
    pub upload_method: Option<Value>,
    /// Original envelope retained by the webhook.
    pub raw_payload: Option<Value>,
}

/// A raw payload parsed into its known fields.
#[derive(Debug, Clone)]
pub struct Envelope {
    shape: Shape,
    top: TopLevel,
    decoded_top: Option<DecodedFields>,
    decoded_nested: Option<DecodedFields>,
}

impl Envelope {
    /// Parse a raw JSON value. Never fails.
    pub fn parse(raw: &Value) -> Self {
        if !raw.is_object() {
            return Self {
                shape: Shape::Opaque,
                top: TopLevel::default(),
                decoded_top: None,
                decoded_nested: None,
            };
        }

        let top = TopLevel::deserialize(raw).unwrap_or_default();
        let decoded_top = top.decoded_payload.as_ref().and_then(decoded_fields);
        let decoded_nested = top
            .uplink_message
            .as_ref()
            .and_then(|uplink| uplink.decoded_payload.as_ref())
            .and_then(decoded_fields);

        let shape = if present(top.decoded_payload.as_ref()).is_some() {
            Shape::Stored
        } else if top.uplink_message.is_some() {
            Shape::Uplink
        } else {
            Shape::Flat
        };

        Self {
            shape,
            top,
            decoded_top,
            decoded_nested,
        }
    }

    /// The layout this payload matched.
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Top-level fields.
    pub const fn top(&self) -> &TopLevel {
        &self.top
    }

    /// The nested broker uplink, if any.
    pub const fn uplink(&self) -> Option<&UplinkMessage> {
        self.top.uplink_message.as_ref()
    }

    /// Device identifiers, if any.
    pub const fn device_ids(&self) -> Option<&DeviceIds> {
        self.top.end_device_ids.as_ref()
    }

    /// Stress level candidates, nested before flat.
    pub fn stress_level_candidates(&self) -> [Option<&Value>; 3] {
        [
            self.decoded_top.as_ref().and_then(|d| d.stress_level.as_ref()),
            self.decoded_nested
                .as_ref()
                .and_then(|d| d.stress_level.as_ref()),
            self.top.stress_level.as_ref(),
        ]
    }

    /// Username candidates, nested before flat.
    pub fn username_candidates(&self) -> [Option<&Value>; 3] {
        [
            self.decoded_top.as_ref().and_then(|d| d.username.as_ref()),
            self.decoded_nested.as_ref().and_then(|d| d.username.as_ref()),
            self.top.username.as_ref(),
        ]
    }

    /// Sample-time candidates: explicit decoded ISO field, then the
    /// source's received-at, then a generic timestamp, then the upload time.
    pub fn timestamp_candidates(&self) -> [Option<&Value>; 6] {
        [
            self.decoded_top.as_ref().and_then(|d| d.timestamp_iso.as_ref()),
            self.decoded_nested
                .as_ref()
                .and_then(|d| d.timestamp_iso.as_ref()),
            self.uplink().and_then(|u| u.received_at.as_ref()),
            self.top.received_at.as_ref(),
            self.top.timestamp.as_ref(),
            self.top.upload_timestamp.as_ref(),
        ]
    }

    /// Received-time candidates (same list without the decoded ISO field).
    pub fn received_at_candidates(&self) -> [Option<&Value>; 4] {
        [
            self.uplink().and_then(|u| u.received_at.as_ref()),
            self.top.received_at.as_ref(),
            self.top.timestamp.as_ref(),
            self.top.upload_timestamp.as_ref(),
        ]
    }

    /// Contact handle candidates.
    pub fn contact_candidates(&self) -> [Option<&Value>; 4] {
        let ids = self.device_ids();
        [
            self.top.device_address.as_ref(),
            ids.and_then(|i| i.dev_eui.as_ref()),
            self.top.dev_eui.as_ref(),
            ids.and_then(|i| i.device_id.as_ref()),
        ]
    }

    /// Device id candidates.
    pub fn device_id_candidates(&self) -> [Option<&Value>; 2] {
        [
            self.device_ids().and_then(|i| i.device_id.as_ref()),
            self.top.device_id.as_ref(),
        ]
    }

    /// Application id from the device identifiers.
    pub fn application_id(&self) -> Option<&str> {
        self.device_ids()
            .and_then(|i| i.application_ids.as_ref())
            .and_then(|a| a.application_id.as_ref())
            .and_then(Value::as_str)
    }
}

/// First candidate that is present: not `null` and not an empty string.
pub fn first_present<'a, const N: usize>(candidates: [Option<&'a Value>; N]) -> Option<&'a Value> {
    candidates.into_iter().find_map(present)
}

/// First candidate that is a non-empty string.
pub fn first_string<'a, const N: usize>(candidates: [Option<&'a Value>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
}

fn present(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v),
    }
}

fn decoded_fields(value: &Value) -> Option<DecodedFields> {
    DecodedFields::deserialize(value).ok()
}

/// Deserialize into `T` if possible, else `None`, without failing the parent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_broker_uplink() {
        let raw = json!({
            "end_device_ids": { "device_id": "band-01", "dev_eui": "70B3D57ED0000001" },
            "uplink_message": {
                "decoded_payload": { "stress_level": 3 },
                "received_at": "2023-11-14T22:13:20Z"
            }
        });
        let envelope = Envelope::parse(&raw);
        assert_eq!(envelope.shape(), Shape::Uplink);
        assert_eq!(
            first_present(envelope.stress_level_candidates()),
            Some(&json!(3))
        );
    }

    #[test]
    fn classifies_stored_document() {
        let raw = json!({ "decoded_payload": { "stress_level": 2 }, "stress_level": 2 });
        assert_eq!(Envelope::parse(&raw).shape(), Shape::Stored);
    }

    #[test]
    fn classifies_flat_and_opaque() {
        assert_eq!(Envelope::parse(&json!({ "stress_level": 1 })).shape(), Shape::Flat);
        assert_eq!(Envelope::parse(&json!("text")).shape(), Shape::Opaque);
        assert_eq!(Envelope::parse(&json!(42)).shape(), Shape::Opaque);
    }

    #[test]
    fn wrong_nested_types_degrade_instead_of_failing() {
        let raw = json!({
            "uplink_message": "not an object",
            "end_device_ids": 7,
            "stress_level": 4
        });
        let envelope = Envelope::parse(&raw);
        assert_eq!(envelope.shape(), Shape::Flat);
        assert!(envelope.uplink().is_none());
        assert_eq!(
            first_present(envelope.stress_level_candidates()),
            Some(&json!(4))
        );
    }

    #[test]
    fn empty_strings_are_not_present() {
        let a = json!("");
        let b = json!("2023-11-14T22:13:20Z");
        assert_eq!(first_present([Some(&a), None, Some(&b)]), Some(&b));
        assert_eq!(first_string([Some(&a), Some(&json!(5)), Some(&b)]), b.as_str());
    }

    #[test]
    fn application_id_is_read_from_device_ids() {
        let raw = json!({
            "end_device_ids": { "application_ids": { "application_id": "stress-app" } },
            "uplink_message": {}
        });
        assert_eq!(Envelope::parse(&raw).application_id(), Some("stress-app"));
    }
}
