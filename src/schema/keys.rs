//! Key namespacing.
//!
//! Partition keys are a type prefix plus an identifier. Within a `device#`
//! partition the sort key names the record category. This layout is the
//! durable contract that migration and inspection tooling depend on.

use crate::core::error::{StoreError, StoreResult};

/// Per-device enrollment rows.
pub const DEVICE_PREFIX: &str = "device#";
/// Reverse certificate-hash bindings.
pub const HASH_PREFIX: &str = "hash#";
/// Per-device command queue.
pub const QUEUE_PREFIX: &str = "queue#";
/// Partition holding every push credential; the sort key is the topic.
pub const PUSH_CERT_PARTITION: &str = "pushcert#";

/// Identity certificate and serial number.
pub const AUTHENTICATE: &str = "Authenticate.plist";
/// Raw TokenUpdate check-in.
pub const TOKEN_UPDATE: &str = "TokenUpdate.plist";
/// TokenUpdate counter.
pub const TOKEN_UPDATE_TALLY: &str = "TokenUpdate.tally";
/// Unlock token bytes.
pub const UNLOCK_TOKEN: &str = "UnlockToken.dat";
/// Bootstrap token (base64).
pub const BOOTSTRAP_TOKEN: &str = "BootstrapToken";
/// Initial UserAuthenticate check-in.
pub const USER_AUTHENTICATE: &str = "UserAuthenticate.plist";
/// UserAuthenticate follow-up carrying a digest response.
pub const USER_AUTHENTICATE_DIGEST: &str = "UserAuthenticate.Digest.plist";
/// Forward certificate-hash binding.
pub const DEVICE_TO_CERT_HASH: &str = "DeviceToCertHash";
/// Disabled marker.
pub const DISABLED: &str = "Disabled";

/// `device#<id>`
pub fn device_pk(device_id: &str) -> String {
    format!("{DEVICE_PREFIX}{device_id}")
}

/// `hash#<hash>`
pub fn hash_pk(hash: &str) -> String {
    format!("{HASH_PREFIX}{hash}")
}

/// `queue#<id>`
pub fn queue_pk(device_id: &str) -> String {
    format!("{QUEUE_PREFIX}{device_id}")
}

/// Strip `prefix` from a partition key, or fail with a Decode error.
pub fn strip_partition<'a>(pk: &'a str, prefix: &str, kind: &str) -> StoreResult<&'a str> {
    pk.strip_prefix(prefix)
        .ok_or_else(|| StoreError::decode(kind, format!("partition {pk:?} lacks prefix {prefix:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_keys() {
        assert_eq!(device_pk("ABC-123"), "device#ABC-123");
        assert_eq!(hash_pk("ab"), "hash#ab");
        assert_eq!(queue_pk("ABC-123"), "queue#ABC-123");
    }

    #[test]
    fn strip_checks_prefix() {
        assert_eq!(strip_partition("device#x", DEVICE_PREFIX, "t").unwrap(), "x");
        assert!(strip_partition("queue#x", DEVICE_PREFIX, "t").is_err());
    }
}
