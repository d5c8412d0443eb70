//! Cryptographically-chained audit log (§4.9). Every mutating operation
//! in the secrets service is recorded through an [`AuditChain`]; each row
//! is signed with a key derived from the KEK active at write time and can
//! be re-verified offline with [`AuditChain::verify_batch`].

pub mod chain;
pub mod entry;
pub mod error;

pub use chain::{AuditChain, AuditRepository, SigningKeySource, VerificationReport};
pub use entry::AuditLog;
pub use error::{AuditError, Result};
