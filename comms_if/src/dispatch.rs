//! # Dispatch Messages
//!
//! This module defines the messages exchanged between the vehicle and dispatch (the rental
//! backend). Every message shares the same envelope:
//!
//! ```text
//! { "type": "service", "path": "/vehicle/rent", "payload": { ... } }
//! ```
//!
//! Inbound (dispatch to vehicle):
//! - `/vehicle/rent` - begin a pickup docking session
//! - `/vehicle/return` - begin a return docking session
//! - `/vehicle/cancel` - cancel the active docking session
//!
//! Outbound (vehicle to dispatch):
//! - `/vehicle/connect` - presence announcement, sent on every (re)connection
//! - `/vehicle/module/mount` - outcome and video of a pickup session
//! - `/vehicle/module/return` - outcome and video of a return session

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Message type used by every dispatch message.
pub const SERVICE_TYPE: &str = "service";

pub const PATH_RENT: &str = "/vehicle/rent";
pub const PATH_RETURN: &str = "/vehicle/return";
pub const PATH_CANCEL: &str = "/vehicle/cancel";
pub const PATH_CONNECT: &str = "/vehicle/connect";
pub const PATH_MODULE_MOUNT: &str = "/vehicle/module/mount";
pub const PATH_MODULE_RETURN: &str = "/vehicle/module/return";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The envelope shared by all dispatch messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMsg {
    #[serde(rename = "type")]
    pub msg_type: String,

    pub path: String,

    #[serde(default)]
    pub payload: Value,
}

/// Payload of the inbound session commands.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CmdPayload {
    #[serde(default, alias = "rent_id")]
    session_id: Option<SessionId>,

    #[serde(default)]
    target_marker_id: Option<u32>,

    #[serde(default, alias = "module_nfc_tag")]
    module_tag: Option<String>,
}

/// Payload of the outbound artifact messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    pub session_id: SessionId,

    /// Base64 encoded video container, `None` if no video was captured
    pub video: Option<String>,

    pub outcome: Outcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifier of a docking session, as issued by dispatch.
///
/// Dispatch may use either numeric or string identifiers, the original form is preserved so that
/// it can be echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionId {
    Num(u64),
    Text(String),
}

/// The direction of a docking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Pick a cargo module up from a dock
    Pickup,

    /// Return the carried module to a dock
    Return,
}

/// How the target marker of a session was specified.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetRef {
    /// Explicit marker identifier
    Marker(u32),

    /// Physical module tag, to be resolved to a marker through the fixture table
    ModuleTag(String),

    /// Nothing given, the default for the direction applies
    Unspecified,
}

/// A command received from dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchCmd {
    /// Begin a docking session
    Begin {
        direction: Direction,
        session_id: SessionId,
        target: TargetRef,
    },

    /// Cancel the active session. If a session id is given only that session is cancelled.
    Cancel {
        session_id: Option<SessionId>,
    },
}

/// Outcome of a docking session reported to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Errors which can occur while parsing an inbound dispatch message.
#[derive(Debug, Error)]
pub enum DispatchParseError {
    #[error("Message contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Message type {0:?} is not a service message")]
    UnknownType(String),

    #[error("Message path {0:?} is not a recognised command")]
    UnknownPath(String),

    #[error("Command payload is invalid: {0}")]
    InvalidPayload(serde_json::Error),

    #[error("Command {0} requires a session id")]
    MissingSessionId(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServiceMsg {
    /// Create a new service message
    pub fn new(path: &str, payload: Value) -> Self {
        Self {
            msg_type: SERVICE_TYPE.into(),
            path: path.into(),
            payload,
        }
    }

    /// The presence announcement sent on every (re)connection.
    pub fn connect() -> Self {
        Self::new(PATH_CONNECT, Value::Object(Default::default()))
    }

    /// Build the artifact message reporting the outcome of a session.
    pub fn artifact(direction: Direction, payload: &ArtifactPayload) -> Result<Self, serde_json::Error> {
        let path = match direction {
            Direction::Pickup => PATH_MODULE_MOUNT,
            Direction::Return => PATH_MODULE_RETURN,
        };

        Ok(Self::new(path, serde_json::to_value(payload)?))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl DispatchCmd {
    /// Parse a command from a JSON message received from dispatch.
    pub fn from_json(json_str: &str) -> Result<Self, DispatchParseError> {
        let msg: ServiceMsg = serde_json::from_str(json_str)
            .map_err(DispatchParseError::InvalidJson)?;

        if msg.msg_type != SERVICE_TYPE {
            return Err(DispatchParseError::UnknownType(msg.msg_type))
        }

        // A null payload is treated as empty, the per-command checks reject it if needed
        let payload: CmdPayload = match msg.payload {
            Value::Null => CmdPayload::default(),
            v => serde_json::from_value(v).map_err(DispatchParseError::InvalidPayload)?
        };

        let direction = match msg.path.as_str() {
            PATH_RENT => Direction::Pickup,
            PATH_RETURN => Direction::Return,
            PATH_CANCEL => return Ok(DispatchCmd::Cancel {
                session_id: payload.session_id
            }),
            _ => return Err(DispatchParseError::UnknownPath(msg.path))
        };

        let path = &msg.path;
        let session_id = payload.session_id
            .ok_or_else(|| DispatchParseError::MissingSessionId(path.clone()))?;

        let target = match (payload.target_marker_id, payload.module_tag) {
            (Some(id), _) => TargetRef::Marker(id),
            (None, Some(tag)) => TargetRef::ModuleTag(tag),
            (None, None) => TargetRef::Unspecified
        };

        Ok(DispatchCmd::Begin {
            direction,
            session_id,
            target
        })
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Num(n) => write!(f, "{}", n),
            SessionId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Pickup => write!(f, "pickup"),
            Direction::Return => write!(f, "return"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
