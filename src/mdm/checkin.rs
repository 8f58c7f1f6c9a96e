//! Check-in message decoding.
//!
//! Devices send check-ins as Apple property lists (XML or binary). Only the
//! fields the storage core needs are extracted; the raw bytes are kept on
//! every message so they can be persisted verbatim.

use super::plist_util::{dict, optional_data, optional_string, parse_plist, required_data, required_string};
use crate::core::error::StoreResult;
use serde::Serialize;

/// Push descriptor carried by a TokenUpdate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Push {
    /// APNs device token.
    pub token: Vec<u8>,
    pub push_magic: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticate {
    pub udid: Option<String>,
    pub serial_number: Option<String>,
    pub topic: Option<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub udid: Option<String>,
    pub push: Push,
    pub unlock_token: Option<Vec<u8>>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAuthenticate {
    pub digest_response: Option<String>,
    pub raw: Vec<u8>,
}

impl UserAuthenticate {
    /// Whether this is the digest follow-up rather than the initial message.
    pub fn has_digest_response(&self) -> bool {
        self.digest_response.as_deref().is_some_and(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBootstrapToken {
    pub bootstrap_token: Vec<u8>,
    pub raw: Vec<u8>,
}

/// A decoded check-in, by `MessageType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinMessage {
    Authenticate(Authenticate),
    TokenUpdate(TokenUpdate),
    UserAuthenticate(UserAuthenticate),
    SetBootstrapToken(SetBootstrapToken),
    GetBootstrapToken,
    CheckOut,
    /// A message type the storage core does not interpret.
    Other(String),
}

impl CheckinMessage {
    /// The `MessageType` this message was decoded from.
    pub fn message_type(&self) -> &str {
        match self {
            Self::Authenticate(_) => "Authenticate",
            Self::TokenUpdate(_) => "TokenUpdate",
            Self::UserAuthenticate(_) => "UserAuthenticate",
            Self::SetBootstrapToken(_) => "SetBootstrapToken",
            Self::GetBootstrapToken => "GetBootstrapToken",
            Self::CheckOut => "CheckOut",
            Self::Other(message_type) => message_type,
        }
    }
}

/// Decode a check-in property list.
pub fn decode_checkin(raw: &[u8]) -> StoreResult<CheckinMessage> {
    let value = parse_plist(raw)?;
    let fields = dict(&value, "check-in")?;
    let message_type = required_string(fields, "MessageType")?;

    let message = match message_type.as_str() {
        "Authenticate" => CheckinMessage::Authenticate(Authenticate {
            udid: optional_string(fields, "UDID"),
            serial_number: optional_string(fields, "SerialNumber"),
            topic: optional_string(fields, "Topic"),
            raw: raw.to_vec(),
        }),
        "TokenUpdate" => CheckinMessage::TokenUpdate(TokenUpdate {
            udid: optional_string(fields, "UDID"),
            push: Push {
                token: required_data(fields, "Token")?,
                push_magic: required_string(fields, "PushMagic")?,
                topic: required_string(fields, "Topic")?,
            },
            unlock_token: optional_data(fields, "UnlockToken"),
            raw: raw.to_vec(),
        }),
        "UserAuthenticate" => CheckinMessage::UserAuthenticate(UserAuthenticate {
            digest_response: optional_string(fields, "DigestResponse"),
            raw: raw.to_vec(),
        }),
        "SetBootstrapToken" => CheckinMessage::SetBootstrapToken(SetBootstrapToken {
            bootstrap_token: required_data(fields, "BootstrapToken")?,
            raw: raw.to_vec(),
        }),
        "GetBootstrapToken" => CheckinMessage::GetBootstrapToken,
        "CheckOut" => CheckinMessage::CheckOut,
        _ => CheckinMessage::Other(message_type),
    };

    Ok(message)
}
