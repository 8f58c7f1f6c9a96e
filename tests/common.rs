//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mdmkv::core::time::{ManualClock, Timestamp};
use mdmkv::storage::MemoryTable;
use mdmkv::{MdmStore, StoreOptions};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::sync::Arc;

/// Start time of every test clock.
pub const T0: u64 = 1_700_000_000_000;

/// A store over a fresh in-memory table, with a clock the test controls.
pub fn memory_store(options: StoreOptions) -> (MdmStore<MemoryTable>, Arc<ManualClock>) {
    let table = Arc::new(MemoryTable::new("test"));
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(T0)));
    let store = MdmStore::new(table, clock.clone(), options);
    (store, clock)
}

/// A self-signed push certificate for `topic`, as (certificate PEM, key PEM).
pub fn push_cert_pem(topic: &str) -> (String, String) {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, format!("Apple Push Services: {topic}"));
    dn.push(DnType::CustomDnType(vec![0, 9, 2342, 19200300, 100, 1, 1]), topic);
    params.distinguished_name = dn;
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// DER of a self-signed device identity certificate.
pub fn device_cert_der(common_name: &str) -> Vec<u8> {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().der().to_vec()
}

fn plist(body: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
{body}
</dict>
</plist>
"#
    )
    .into_bytes()
}

/// A TokenUpdate check-in.
pub fn token_update_plist(udid: &str, token: &[u8], push_magic: &str, topic: &str) -> Vec<u8> {
    plist(&format!(
        "<key>MessageType</key><string>TokenUpdate</string>
<key>UDID</key><string>{udid}</string>
<key>Token</key><data>{}</data>
<key>PushMagic</key><string>{push_magic}</string>
<key>Topic</key><string>{topic}</string>",
        STANDARD.encode(token)
    ))
}

/// An Authenticate check-in.
pub fn authenticate_plist(udid: &str, topic: &str) -> Vec<u8> {
    plist(&format!(
        "<key>MessageType</key><string>Authenticate</string>
<key>UDID</key><string>{udid}</string>
<key>Topic</key><string>{topic}</string>"
    ))
}

/// A command with the given UUID and request type.
pub fn command_plist(command_uuid: &str, request_type: &str) -> Vec<u8> {
    plist(&format!(
        "<key>CommandUUID</key><string>{command_uuid}</string>
<key>Command</key><dict><key>RequestType</key><string>{request_type}</string></dict>"
    ))
}

/// A command result report.
pub fn results_plist(udid: &str, command_uuid: &str, status: &str) -> Vec<u8> {
    plist(&format!(
        "<key>UDID</key><string>{udid}</string>
<key>CommandUUID</key><string>{command_uuid}</string>
<key>Status</key><string>{status}</string>"
    ))
}

/// An Idle report.
pub fn idle_plist(udid: &str) -> Vec<u8> {
    plist(&format!(
        "<key>UDID</key><string>{udid}</string>
<key>Status</key><string>Idle</string>"
    ))
}
