//! Typed records.
//!
//! Each struct owns one row layout. Encoding is explicit per attribute and
//! decoding checks the key and every required attribute, so a malformed row
//! surfaces as a Decode error rather than as absence.

use super::keys::{self, strip_partition};
use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Timestamp;
use crate::storage::{AttributeValue, Item, ItemKey, Record};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Attribute names.
pub mod attr {
    pub const CERT: &str = "cert";
    pub const SERIAL: &str = "serial";
    pub const TOKEN: &str = "token";
    pub const TALLY: &str = "tally";
    pub const BOOTSTRAP_TOKEN: &str = "bstoken";
    pub const HASH: &str = "hash";
    pub const PAYLOAD: &str = "payload";
    pub const REQUEST_TYPE: &str = "request_type";
    pub const STATUS: &str = "status";
    pub const REPORT_STATUS: &str = "report_status";
    pub const ENQUEUED_AT: &str = "enqueued_at";
    pub const LAST_UPDATED: &str = "last_updated";
    pub const RESULT: &str = "result";
    pub const PEM: &str = "pem";
    pub const KEY: &str = "key";
    pub const STALE_TOKEN: &str = "staletoken";
}

fn require<'a>(item: &'a Item, name: &str, kind: &str) -> StoreResult<&'a AttributeValue> {
    item.get(name)
        .ok_or_else(|| StoreError::decode(kind, format!("{} missing attribute {name}", item.key())))
}

fn require_str(item: &Item, name: &str, kind: &str) -> StoreResult<String> {
    let value = require(item, name, kind)?;
    value.as_str().map(str::to_string).ok_or_else(|| {
        StoreError::decode(kind, format!("attribute {name} is {}, not S", value.type_name()))
    })
}

fn require_bytes(item: &Item, name: &str, kind: &str) -> StoreResult<Vec<u8>> {
    let value = require(item, name, kind)?;
    value.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| {
        StoreError::decode(kind, format!("attribute {name} is {}, not B", value.type_name()))
    })
}

fn require_i64(item: &Item, name: &str, kind: &str) -> StoreResult<i64> {
    let value = require(item, name, kind)?;
    value.as_i64().ok_or_else(|| {
        StoreError::decode(kind, format!("attribute {name} is {}, not N", value.type_name()))
    })
}

fn optional_str(item: &Item, name: &str, kind: &str) -> StoreResult<Option<String>> {
    match item.get(name) {
        None => Ok(None),
        Some(_) => require_str(item, name, kind).map(Some),
    }
}

fn optional_bytes(item: &Item, name: &str, kind: &str) -> StoreResult<Option<Vec<u8>>> {
    match item.get(name) {
        None => Ok(None),
        Some(_) => require_bytes(item, name, kind).map(Some),
    }
}

fn expect_sort_key(item: &Item, sk: &str, kind: &str) -> StoreResult<()> {
    if item.sk == sk {
        Ok(())
    } else {
        Err(StoreError::decode(kind, format!("sort key {:?}, expected {sk:?}", item.sk)))
    }
}

/// Device id from a `device#` row whose sort key must be `sk`.
fn device_row(item: &Item, sk: &str, kind: &str) -> StoreResult<String> {
    expect_sort_key(item, sk, kind)?;
    Ok(strip_partition(&item.pk, keys::DEVICE_PREFIX, kind)?.to_string())
}

/// Identity certificate and serial number from the latest Authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticateRecord {
    pub device_id: String,
    pub serial_number: String,
    /// PEM-encoded identity certificate.
    pub cert_pem: String,
}

impl Record for AuthenticateRecord {
    const KIND: &'static str = "AuthenticateRecord";

    fn key(&self) -> ItemKey {
        ItemKey::new(keys::device_pk(&self.device_id), keys::AUTHENTICATE)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key())
            .with(attr::SERIAL, self.serial_number.as_str())
            .with(attr::CERT, self.cert_pem.as_str())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            device_id: device_row(&item, keys::AUTHENTICATE, Self::KIND)?,
            serial_number: require_str(&item, attr::SERIAL, Self::KIND)?,
            cert_pem: require_str(&item, attr::CERT, Self::KIND)?,
        })
    }
}

/// The raw TokenUpdate check-in, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUpdateRecord {
    pub device_id: String,
    pub raw: Vec<u8>,
}

impl Record for TokenUpdateRecord {
    const KIND: &'static str = "TokenUpdateRecord";

    fn key(&self) -> ItemKey {
        ItemKey::new(keys::device_pk(&self.device_id), keys::TOKEN_UPDATE)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::TOKEN, self.raw.clone())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            device_id: device_row(&item, keys::TOKEN_UPDATE, Self::KIND)?,
            raw: require_bytes(&item, attr::TOKEN, Self::KIND)?,
        })
    }
}

/// Advisory count of TokenUpdate check-ins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUpdateTally {
    pub device_id: String,
    pub tally: i64,
}

impl TokenUpdateTally {
    /// Address of a device's tally row.
    pub fn key_for(device_id: &str) -> ItemKey {
        ItemKey::new(keys::device_pk(device_id), keys::TOKEN_UPDATE_TALLY)
    }
}

impl Record for TokenUpdateTally {
    const KIND: &'static str = "TokenUpdateTally";

    fn key(&self) -> ItemKey {
        Self::key_for(&self.device_id)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::TALLY, self.tally)
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            device_id: device_row(&item, keys::TOKEN_UPDATE_TALLY, Self::KIND)?,
            tally: require_i64(&item, attr::TALLY, Self::KIND)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockTokenRecord {
    pub device_id: String,
    pub token: Vec<u8>,
}

impl Record for UnlockTokenRecord {
    const KIND: &'static str = "UnlockTokenRecord";

    fn key(&self) -> ItemKey {
        ItemKey::new(keys::device_pk(&self.device_id), keys::UNLOCK_TOKEN)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::TOKEN, self.token.clone())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            device_id: device_row(&item, keys::UNLOCK_TOKEN, Self::KIND)?,
            token: require_bytes(&item, attr::TOKEN, Self::KIND)?,
        })
    }
}

/// Bootstrap token, persisted base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapTokenRecord {
    pub device_id: String,
    pub token: Vec<u8>,
}

impl Record for BootstrapTokenRecord {
    const KIND: &'static str = "BootstrapTokenRecord";

    fn key(&self) -> ItemKey {
        ItemKey::new(keys::device_pk(&self.device_id), keys::BOOTSTRAP_TOKEN)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::BOOTSTRAP_TOKEN, STANDARD.encode(&self.token))
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let encoded = require_str(&item, attr::BOOTSTRAP_TOKEN, Self::KIND)?;
        Ok(Self {
            device_id: device_row(&item, keys::BOOTSTRAP_TOKEN, Self::KIND)?,
            token: STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| StoreError::decode(Self::KIND, e))?,
        })
    }
}

/// A UserAuthenticate check-in. The digest follow-up lives under its own
/// sort key so it never overwrites the initial message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAuthRecord {
    pub device_id: String,
    pub raw: Vec<u8>,
    pub digest: bool,
}

impl UserAuthRecord {
    /// Sort key for the initial message or its digest follow-up.
    pub fn category(digest: bool) -> &'static str {
        if digest {
            keys::USER_AUTHENTICATE_DIGEST
        } else {
            keys::USER_AUTHENTICATE
        }
    }
}

impl Record for UserAuthRecord {
    const KIND: &'static str = "UserAuthRecord";

    fn key(&self) -> ItemKey {
        ItemKey::new(keys::device_pk(&self.device_id), Self::category(self.digest))
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::PAYLOAD, self.raw.clone())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let digest = match item.sk.as_str() {
            keys::USER_AUTHENTICATE => false,
            keys::USER_AUTHENTICATE_DIGEST => true,
            other => {
                return Err(StoreError::decode(
                    Self::KIND,
                    format!("unexpected sort key {other:?}"),
                ))
            }
        };
        Ok(Self {
            device_id: strip_partition(&item.pk, keys::DEVICE_PREFIX, Self::KIND)?.to_string(),
            raw: require_bytes(&item, attr::PAYLOAD, Self::KIND)?,
            digest,
        })
    }
}

/// Forward binding: device to certificate hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCertHash {
    pub device_id: String,
    pub hash: String,
}

impl DeviceCertHash {
    /// Address of a device's forward binding.
    pub fn key_for(device_id: &str) -> ItemKey {
        ItemKey::new(keys::device_pk(device_id), keys::DEVICE_TO_CERT_HASH)
    }
}

impl Record for DeviceCertHash {
    const KIND: &'static str = "DeviceCertHash";

    fn key(&self) -> ItemKey {
        Self::key_for(&self.device_id)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::HASH, self.hash.as_str())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            device_id: device_row(&item, keys::DEVICE_TO_CERT_HASH, Self::KIND)?,
            hash: require_str(&item, attr::HASH, Self::KIND)?,
        })
    }
}

/// Reverse binding: certificate hash to device. The device id is the sort
/// key, so every device bound to a hash shows up in one partition scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertHashDevice {
    pub hash: String,
    pub device_id: String,
}

impl CertHashDevice {
    pub fn key_for(hash: &str, device_id: &str) -> ItemKey {
        ItemKey::new(keys::hash_pk(hash), device_id)
    }
}

impl Record for CertHashDevice {
    const KIND: &'static str = "CertHashDevice";

    fn key(&self) -> ItemKey {
        Self::key_for(&self.hash, &self.device_id)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let hash = strip_partition(&item.pk, keys::HASH_PREFIX, Self::KIND)?.to_string();
        if item.sk.is_empty() {
            return Err(StoreError::decode(Self::KIND, "empty device id"));
        }
        Ok(Self {
            hash,
            device_id: item.sk,
        })
    }
}

/// Marks an enrollment as disabled until its next TokenUpdate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisabledRecord {
    pub device_id: String,
    pub disabled_at: Timestamp,
}

impl DisabledRecord {
    pub fn key_for(device_id: &str) -> ItemKey {
        ItemKey::new(keys::device_pk(device_id), keys::DISABLED)
    }
}

impl Record for DisabledRecord {
    const KIND: &'static str = "DisabledRecord";

    fn key(&self) -> ItemKey {
        Self::key_for(&self.device_id)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key()).with(attr::LAST_UPDATED, self.disabled_at.as_i64())
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(Self {
            device_id: device_row(&item, keys::DISABLED, Self::KIND)?,
            disabled_at: Timestamp::from_i64(require_i64(&item, attr::LAST_UPDATED, Self::KIND)?),
        })
    }
}

/// Lifecycle state of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueueStatus {
    /// Deliverable now.
    Queued,
    /// Deferred by the device; deliverable again later.
    NotNow,
    /// Terminal: the device reported a final status.
    Done,
    /// Administratively invalidated.
    Inactive,
}

impl QueueStatus {
    /// Persisted form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "Queue",
            Self::NotNow => "QueueNotNow",
            Self::Done => "QueueDone",
            Self::Inactive => "QueueInactive",
        }
    }

    /// Whether a report may still change this command.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Inactive)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queue" => Ok(Self::Queued),
            "QueueNotNow" => Ok(Self::NotNow),
            "QueueDone" => Ok(Self::Done),
            "QueueInactive" => Ok(Self::Inactive),
            other => Err(StoreError::decode(
                "QueueStatus",
                format!("unknown status {other:?}"),
            )),
        }
    }
}

impl From<QueueStatus> for AttributeValue {
    fn from(status: QueueStatus) -> Self {
        AttributeValue::S(status.as_str().to_string())
    }
}

/// One command in a device's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    pub device_id: String,
    pub command_uuid: String,
    pub request_type: String,
    /// The command plist, verbatim.
    pub payload: Vec<u8>,
    pub status: QueueStatus,
    /// Status string from the device's last report.
    pub report_status: Option<String>,
    pub enqueued_at: Timestamp,
    pub last_updated: Timestamp,
    /// Raw result report.
    pub result: Option<Vec<u8>>,
}

impl CommandRecord {
    pub fn key_for(device_id: &str, command_uuid: &str) -> ItemKey {
        ItemKey::new(keys::queue_pk(device_id), command_uuid)
    }
}

impl Record for CommandRecord {
    const KIND: &'static str = "CommandRecord";

    fn key(&self) -> ItemKey {
        Self::key_for(&self.device_id, &self.command_uuid)
    }

    fn to_item(&self) -> Item {
        let mut item = Item::at(self.key())
            .with(attr::REQUEST_TYPE, self.request_type.as_str())
            .with(attr::PAYLOAD, self.payload.clone())
            .with(attr::STATUS, self.status)
            .with(attr::ENQUEUED_AT, self.enqueued_at.as_i64())
            .with(attr::LAST_UPDATED, self.last_updated.as_i64());
        if let Some(report_status) = &self.report_status {
            item.set(attr::REPORT_STATUS, report_status.as_str());
        }
        if let Some(result) = &self.result {
            item.set(attr::RESULT, result.clone());
        }
        item
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        let device_id = strip_partition(&item.pk, keys::QUEUE_PREFIX, Self::KIND)?.to_string();
        let status = require_str(&item, attr::STATUS, Self::KIND)?.parse()?;
        Ok(Self {
            request_type: require_str(&item, attr::REQUEST_TYPE, Self::KIND)?,
            payload: require_bytes(&item, attr::PAYLOAD, Self::KIND)?,
            status,
            report_status: optional_str(&item, attr::REPORT_STATUS, Self::KIND)?,
            enqueued_at: Timestamp::from_i64(require_i64(&item, attr::ENQUEUED_AT, Self::KIND)?),
            last_updated: Timestamp::from_i64(require_i64(&item, attr::LAST_UPDATED, Self::KIND)?),
            result: optional_bytes(&item, attr::RESULT, Self::KIND)?,
            device_id,
            command_uuid: item.sk,
        })
    }
}

/// Push certificate and private key for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushCertRecord {
    pub topic: String,
    pub cert_pem: String,
    #[serde(skip_serializing)]
    pub key_pem: String,
    /// Write time in milliseconds; changes whenever the credential does.
    pub stale_token: i64,
}

impl PushCertRecord {
    pub fn key_for(topic: &str) -> ItemKey {
        ItemKey::new(keys::PUSH_CERT_PARTITION, topic)
    }
}

impl Record for PushCertRecord {
    const KIND: &'static str = "PushCertRecord";

    fn key(&self) -> ItemKey {
        Self::key_for(&self.topic)
    }

    fn to_item(&self) -> Item {
        Item::at(self.key())
            .with(attr::PEM, self.cert_pem.as_str())
            .with(attr::KEY, self.key_pem.as_str())
            .with(attr::STALE_TOKEN, self.stale_token)
    }

    fn from_item(item: Item) -> StoreResult<Self> {
        if item.pk != keys::PUSH_CERT_PARTITION {
            return Err(StoreError::decode(
                Self::KIND,
                format!("partition {:?} is not the push credential partition", item.pk),
            ));
        }
        Ok(Self {
            cert_pem: require_str(&item, attr::PEM, Self::KIND)?,
            key_pem: require_str(&item, attr::KEY, Self::KIND)?,
            stale_token: require_i64(&item, attr::STALE_TOKEN, Self::KIND)?,
            topic: item.sk,
        })
    }
}

/// Every row that can live in a `device#` partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category")]
pub enum DeviceRecord {
    Authenticate(AuthenticateRecord),
    TokenUpdate(TokenUpdateRecord),
    TokenUpdateTally(TokenUpdateTally),
    UnlockToken(UnlockTokenRecord),
    BootstrapToken(BootstrapTokenRecord),
    UserAuthenticate(UserAuthRecord),
    CertHash(DeviceCertHash),
    Disabled(DisabledRecord),
}

impl DeviceRecord {
    /// Decode a `device#` row by its sort key.
    pub fn from_item(item: Item) -> StoreResult<Self> {
        match item.sk.as_str() {
            keys::AUTHENTICATE => AuthenticateRecord::from_item(item).map(Self::Authenticate),
            keys::TOKEN_UPDATE => TokenUpdateRecord::from_item(item).map(Self::TokenUpdate),
            keys::TOKEN_UPDATE_TALLY => {
                TokenUpdateTally::from_item(item).map(Self::TokenUpdateTally)
            }
            keys::UNLOCK_TOKEN => UnlockTokenRecord::from_item(item).map(Self::UnlockToken),
            keys::BOOTSTRAP_TOKEN => {
                BootstrapTokenRecord::from_item(item).map(Self::BootstrapToken)
            }
            keys::USER_AUTHENTICATE | keys::USER_AUTHENTICATE_DIGEST => {
                UserAuthRecord::from_item(item).map(Self::UserAuthenticate)
            }
            keys::DEVICE_TO_CERT_HASH => DeviceCertHash::from_item(item).map(Self::CertHash),
            keys::DISABLED => DisabledRecord::from_item(item).map(Self::Disabled),
            other => Err(StoreError::decode(
                "DeviceRecord",
                format!("unknown category {other:?}"),
            )),
        }
    }

    /// The category (sort key) of this row.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => keys::AUTHENTICATE,
            Self::TokenUpdate(_) => keys::TOKEN_UPDATE,
            Self::TokenUpdateTally(_) => keys::TOKEN_UPDATE_TALLY,
            Self::UnlockToken(_) => keys::UNLOCK_TOKEN,
            Self::BootstrapToken(_) => keys::BOOTSTRAP_TOKEN,
            Self::UserAuthenticate(r) => UserAuthRecord::category(r.digest),
            Self::CertHash(_) => keys::DEVICE_TO_CERT_HASH,
            Self::Disabled(_) => keys::DISABLED,
        }
    }
}
