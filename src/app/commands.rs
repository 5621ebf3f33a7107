//! Inbound commands to the appliance and their replies.
//!
//! These represent actions requested by the transport layer on behalf of
//! connected clients.  The [`Appliance`](super::service::Appliance)
//! interprets and acts upon them.
//!
//! Both types have a JSON form so a transport (or the host binary's stdin
//! console) can pass them through unchanged:
//!
//! ```text
//!   {"event": "set_enabled", "data": true}
//!   {"event": "control_alarm", "data": false}
//!   {"event": "get_frame"}
//!   {"event": "get_status"}
//!   {"event": "client_connected", "data": {"client_id": 7}}
//! ```

use serde::{Deserialize, Serialize};

use super::events::StatusSnapshot;

/// Commands that external adapters can send into the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AppCommand {
    /// Arm or disarm the alarm.  Disarming silences it immediately.
    SetEnabled(bool),

    /// Manually start (`true`) or stop (`false`) the alarm.
    ControlAlarm(bool),

    /// Latest raw camera frame.
    GetFrame,

    /// Fresh status snapshot, returned directly.
    GetStatus,

    /// A client connected; publish the current status through the broadcaster.
    ClientConnected { client_id: u64 },
}

/// Direct answer to an [`AppCommand`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CommandReply {
    /// Accepted; any state change is published through the broadcaster.
    Ack,
    /// Base64 JPEG, `None` before the first frame.
    Frame(Option<String>),
    Status(StatusSnapshot),
}
