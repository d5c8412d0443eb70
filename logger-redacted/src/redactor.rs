//! Pattern- and field-name-based masking for anything that looks like key
//! material (§10.1): wrapped keys, unwrapped DEKs, AEAD ciphertext, audit
//! signatures, tokens. Nothing here ever sees real key bytes — it only
//! sees the `Debug`/`Display` text tracing would otherwise emit, and masks
//! it before a subscriber can write it anywhere.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A run of 24+ base64 or hex characters is, in this service, always
    /// either wrapped key material, ciphertext, or a signature — plaintext
    /// log messages don't naturally contain strings that long and that
    /// uniform.
    static ref LONG_ENCODED_RUN: Regex =
        Regex::new(r"\b[A-Za-z0-9+/=_-]{24,}\b").expect("static pattern is valid");
}

/// Field names whose *value* is always masked outright, regardless of
/// shape, because the field itself is declared sensitive at the call site.
const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "material",
    "key_material",
    "kek_material",
    "dek_material",
    "master_key",
    "unwrapped",
    "wrapped_material",
    "plaintext",
    "ciphertext",
    "signature",
    "signing_key",
    "nonce",
    "token",
    "password",
];

const MASK: &str = "[redacted]";

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyMaterialRedactor;

impl KeyMaterialRedactor {
    pub fn new() -> Self {
        Self
    }

    /// True if `field_name` is one this service never logs the value of.
    pub fn is_sensitive_field(&self, field_name: &str) -> bool {
        let lower = field_name.to_ascii_lowercase();
        SENSITIVE_FIELD_NAMES.iter().any(|s| lower.contains(s))
    }

    /// Mask a field value outright — used when [`is_sensitive_field`]
    /// already flagged the field name.
    pub fn mask_field_value(&self, _value: &str) -> String {
        MASK.to_string()
    }

    /// Scan free text (an event's formatted message, an error's `Display`)
    /// for long encoded runs and mask them in place. Unlike
    /// [`mask_field_value`] this preserves the surrounding text.
    pub fn redact_text(&self, text: &str) -> String {
        LONG_ENCODED_RUN.replace_all(text, MASK).to_string()
    }
}
