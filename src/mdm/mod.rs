//! MDM payloads.
//!
//! The storage core persists check-ins and commands verbatim; it decodes
//! only what it needs to pick record categories, key commands, and resolve
//! push descriptors.

pub mod cert;
pub mod checkin;
pub mod command;
mod plist_util;

pub use cert::{cert_hash, pem_certificate, topic_from_pem_cert, PushCertificate};
pub use checkin::{decode_checkin, CheckinMessage, Push};
pub use command::{decode_results, Command, CommandResults};
