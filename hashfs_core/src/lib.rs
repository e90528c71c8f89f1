//! Core HashFS types and traits.
//!
//! This crate defines the shared types and traits used by all HashFS crates:
//!
//! - Content hashes (`hash::Hash`, blake3)
//! - Cryptographic primitives (`crypto`): passphrase key derivation,
//!   AES-256-GCM sealing, Ed25519 signatures
//! - Compression and archive codecs (`codec`): raw DEFLATE and ZIP
//! - The key-value storage abstraction (`store`): namespaced collections
//!   with atomic multi-key write batches
//!
//! The vault engine in `hashfs_vault` builds on these; the `stores/*`
//! crates provide `KvStore` backends.

pub mod codec;
pub mod crypto;
pub mod hash;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// --- Core Public Surface ---

// Hash type
pub use hash::Hash;

// Crypto primitives
pub use crypto::{CryptoError, SealedBlob, VaultKeys};

// Codec
pub use codec::CodecError;

// Storage traits
pub use store::{
    BatchOp, Collection, KvStore, OpenedStore, StoreError, StoreOpener, StoreResult, WriteBatch,
};
