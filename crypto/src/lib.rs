//! AEAD primitives, key derivation, constant-time comparisons, locked
//! memory buffers, and the KMS adapter that the envelope-encryption key
//! hierarchy is built on. This crate knows nothing about secrets, KEKs or
//! DEKs — it is the primitive layer the core service composes.

pub mod aead;
pub mod constant_time;
pub mod error;
pub mod kdf;
pub mod kms;
pub mod memory_security;

pub use aead::Algorithm;
pub use error::{CryptoError, CryptoResult, KmsError, KmsResult};
pub use kms::{open_keeper, Keeper};
