//! Persisted row shapes (§3 DATA MODEL, §6 persistence layout). These are
//! plain data; the engines in this crate are what gives them meaning.

use chrono::{DateTime, Utc};
use crypto::Algorithm;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `kek(id, algorithm, is_active, master_key_id, wrapped_material, created_at)`.
/// I5: at most one row has `is_active = true`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Kek {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub algorithm: AlgorithmColumn,
    pub is_active: bool,
    pub master_key_id: String,
    pub wrapped_material: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// `dek(id, kek_id, algorithm, wrapped_material, created_at)`. I6: `kek_id`
/// references some persisted Kek, not necessarily the active one.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Dek {
    pub id: Uuid,
    pub kek_id: Uuid,
    #[sqlx(try_from = "String")]
    pub algorithm: AlgorithmColumn,
    pub wrapped_material: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// `secret(id, path, version, dek_id, ciphertext, nonce, created_at)`.
/// `(path, version)` is unique.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Secret {
    pub id: Uuid,
    pub path: String,
    pub version: i64,
    pub dek_id: Uuid,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// `transit_key(id, name, version, dek_id, algorithm, created_at)`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TransitKey {
    pub id: Uuid,
    pub name: String,
    pub version: i64,
    pub dek_id: Uuid,
    #[sqlx(try_from = "String")]
    pub algorithm: AlgorithmColumn,
    pub created_at: DateTime<Utc>,
}

/// The shape of token a `TokenizationKey` issues (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    Uuid,
    Numeric,
    LuhnPreserving,
    Alphanumeric,
}

impl FormatType {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatType::Uuid => "uuid",
            FormatType::Numeric => "numeric",
            FormatType::LuhnPreserving => "luhn-preserving",
            FormatType::Alphanumeric => "alphanumeric",
        }
    }
}

impl std::str::FromStr for FormatType {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uuid" => Ok(FormatType::Uuid),
            "numeric" => Ok(FormatType::Numeric),
            "luhn-preserving" | "luhn_preserving" => Ok(FormatType::LuhnPreserving),
            "alphanumeric" => Ok(FormatType::Alphanumeric),
            other => Err(crate::error::CoreError::Validation(format!(
                "unknown tokenization format_type '{other}'"
            ))),
        }
    }
}

/// `tokenization_key(id, name, version, dek_id, format_type, is_deterministic, algorithm, created_at)`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TokenizationKey {
    pub id: Uuid,
    pub name: String,
    pub version: i64,
    pub dek_id: Uuid,
    #[sqlx(try_from = "String")]
    pub format_type: FormatTypeColumn,
    pub is_deterministic: bool,
    #[sqlx(try_from = "String")]
    pub algorithm: AlgorithmColumn,
    pub created_at: DateTime<Utc>,
}

/// `token(token PK, tokenization_key_id, version, ciphertext, nonce,
/// plaintext_hash NULL, expires_at NULL, created_at)`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub tokenization_key_id: Uuid,
    pub version: i64,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub plaintext_hash: Option<Vec<u8>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Thin wrapper so `Algorithm` (defined in `crypto`, which doesn't know
/// about sqlx) can still round-trip through a `TEXT` column via
/// `#[sqlx(try_from = "String")]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmColumn(pub Algorithm);

impl std::ops::Deref for AlgorithmColumn {
    type Target = Algorithm;
    fn deref(&self) -> &Algorithm {
        &self.0
    }
}

impl From<Algorithm> for AlgorithmColumn {
    fn from(a: Algorithm) -> Self {
        AlgorithmColumn(a)
    }
}

impl TryFrom<String> for AlgorithmColumn {
    type Error = crypto::CryptoError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse::<Algorithm>().map(AlgorithmColumn)
    }
}

impl Serialize for AlgorithmColumn {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for AlgorithmColumn {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Algorithm::deserialize(d).map(AlgorithmColumn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTypeColumn(pub FormatType);

impl std::ops::Deref for FormatTypeColumn {
    type Target = FormatType;
    fn deref(&self) -> &FormatType {
        &self.0
    }
}

impl From<FormatType> for FormatTypeColumn {
    fn from(f: FormatType) -> Self {
        FormatTypeColumn(f)
    }
}

impl TryFrom<String> for FormatTypeColumn {
    type Error = crate::error::CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse::<FormatType>().map(FormatTypeColumn)
    }
}

impl Serialize for FormatTypeColumn {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for FormatTypeColumn {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse::<FormatType>().map(FormatTypeColumn).map_err(serde::de::Error::custom)
    }
}
