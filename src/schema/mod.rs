//! Persisted layout of MDM state.
//!
//! [`keys`] fixes how partitions and categories are named; [`records`]
//! defines one typed record per row layout and the [`DeviceRecord`] variant
//! set used to decode a whole device partition.

pub mod keys;
pub mod records;

pub use records::{
    AuthenticateRecord, BootstrapTokenRecord, CertHashDevice, CommandRecord, DeviceCertHash,
    DeviceRecord, DisabledRecord, PushCertRecord, QueueStatus, TokenUpdateRecord,
    TokenUpdateTally, UnlockTokenRecord, UserAuthRecord,
};
