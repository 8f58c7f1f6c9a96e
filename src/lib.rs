//! mdmkv - persistence core for an Apple MDM protocol server.
//!
//! mdmkv records device enrollment identity, binds enrollments to the hash
//! of their identity certificate, keeps a per-device command queue with
//! NotNow deferral, and stores push credentials. Everything lives in one
//! sparse table addressed by (partition key, sort key) that offers only
//! single-item writes and partition-scoped queries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Protocol server (not in this crate)             │
//! │        check-ins │ command reports │ push │ enqueue API         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           MdmStore                              │
//! │  Enrollments │ CertAuth (+ policy) │ CommandQueue │ PushCreds   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Schema: keys and typed records                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        KeyValueTable                            │
//! │          MemoryTable │ FileTable (WAL + snapshots)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::context`] - Request deadlines
//! - [`core::time`] - Timestamps and injectable clocks
//! - [`core::error`] - Error types
//!
//! ## Storage
//! - [`storage::table`] - The `KeyValueTable` contract
//! - [`storage::memory`] - In-memory backend
//! - [`storage::wal`] - Durable backend
//! - [`storage::compaction`] - Log compaction policy
//!
//! ## Schema
//! - [`schema::keys`] - Partition prefixes and record categories
//! - [`schema::records`] - Typed records and the device record variants
//!
//! ## MDM payloads
//! - [`mdm::checkin`] - Check-in decoding
//! - [`mdm::command`] - Commands and result reports
//! - [`mdm::cert`] - Certificate hashing and push certificate parsing
//!
//! ## Store
//! - [`store::enrollment`], [`store::certauth`], [`store::queue`],
//!   [`store::push`] - the four components, tied together by [`store::MdmStore`]
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Consistency
//!
//! Single-row operations are atomic. Composite operations (the two rows of
//! a certificate binding, enqueue batches, the TokenUpdate tally) are not;
//! each is built from deterministic keys so the caller can retry the whole
//! operation after a partial failure.

pub mod cli;
pub mod core;
pub mod mdm;
pub mod schema;
pub mod storage;
pub mod store;

pub use crate::core::config::Config;
pub use crate::core::context::RequestContext;
pub use crate::core::error::{ErrorKind, StoreError, StoreResult};
pub use crate::store::{MdmStore, StoreOptions};
