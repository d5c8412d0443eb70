//! A `tracing` layer that masks any field whose name or value pattern
//! looks like key material before it reaches a subscriber. Every span and
//! event in the secrets service goes through this, so "don't log secret
//! bytes" is enforced once, here, rather than at each call site.
//!
//! ```rust
//! use logger_redacted::RedactingLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let subscriber = tracing_subscriber::registry()
//!     .with(tracing_subscriber::EnvFilter::from_default_env())
//!     .with(RedactingLayer::new());
//! tracing::subscriber::set_global_default(subscriber).ok();
//! ```

pub mod config;
pub mod layer;
pub mod macros;
pub mod redactor;

pub use config::LoggerConfig;
pub use layer::RedactingLayer;
pub use redactor::KeyMaterialRedactor;