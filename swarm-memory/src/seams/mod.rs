//! Pluggable seams the manager calls through: access control, value
//! codecs, and replication. Each ships a permissive/identity default.

pub mod access;
pub mod codec;
pub mod replication;

pub use access::{AccessPolicy, AllowAll};
pub use codec::{CompressionCodec, EncodedValue, EncryptionCodec, IdentityCodec, ValueCodec};
pub use replication::{
    NoopReplication, RecordingReplication, ReplicationHook, SyncOptions, SyncReport,
};
