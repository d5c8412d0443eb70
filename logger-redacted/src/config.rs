//! Logging configuration (§10.1, §10.3): verbosity is controlled entirely
//! through `RUST_LOG`/`EnvFilter`; this struct only toggles the redaction
//! layer and output shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub redaction_enabled: bool,
    pub json_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { redaction_enabled: true, json_output: false }
    }
}
