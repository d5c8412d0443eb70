//! The envelope-encryption key hierarchy and the engines built on top of
//! it (§1): Master Key Chain → KEK Chain → DEK Manager → Secrets /
//! Transit / Tokenization engines, plus the cryptographically-chained
//! audit log every mutating operation feeds.
//!
//! This crate has no HTTP layer, no OAuth2 bearer-token handling, and no
//! dependency-injection container of its own — those are external
//! collaborators per §1. What it exposes is the capability set each one
//! composes against: [`config::Config`] to start, a KMS [`crypto::Keeper`]
//! to unwrap the [`master::MasterKeyChain`], the chain to unwrap a
//! [`kek::KekChain`], and the engines in [`secrets`], [`transit`], and
//! [`tokenization`] built on [`dek::DekManager`].

pub mod audit_keys;
pub mod cache;
pub mod config;
pub mod db;
pub mod dek;
pub mod envelope;
pub mod error;
pub mod kek;
pub mod master;
pub mod model;
pub mod policy;
pub mod rotation;
pub mod secrets;
pub mod tokenization;
pub mod transit;

pub use cache::DekCache;
pub use config::Config;
pub use dek::DekManager;
pub use error::{CoreError, CoreResult};
pub use kek::KekChain;
pub use master::MasterKeyChain;
pub use secrets::SecretsEngine;
pub use tokenization::TokenizationEngine;
pub use transit::TransitEngine;
