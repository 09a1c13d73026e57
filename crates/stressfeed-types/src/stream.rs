//! Messages on the live-update stream to the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::reading::Reading;

/// One server-sent message. Serialized with a `type` discriminator:
/// `{"type":"uplink","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Sent once, first, when a session opens.
    Connected {
        /// Server time at connect.
        timestamp: DateTime<Utc>,
    },
    /// A newly accepted reading.
    Uplink {
        /// The reading now held.
        data: Reading,
    },
    /// Periodic heartbeat. Receivers ignore its content.
    Keepalive {
        /// Server time of the heartbeat.
        timestamp: DateTime<Utc>,
    },
}

impl StreamMessage {
    /// The `type` discriminator as written on the wire.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Uplink { .. } => "uplink",
            Self::Keepalive { .. } => "keepalive",
        }
    }
}
