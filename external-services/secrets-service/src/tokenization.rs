//! Tokenization Engine (§4.8): format-preserving token issuance and
//! lookup, optionally deterministic via a keyed plaintext index.

use crate::dek::{DekManager, DekRepository};
use crate::error::{CoreError, CoreResult};
use crate::kek::KekChain;
use crate::model::{FormatType, Token, TokenizationKey};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crypto::{aead, kdf::Kdf, Algorithm};
use rand::Rng;
use uuid::Uuid;

const DETERMINISTIC_INDEX_CONTEXT: &[u8] = b"det";
const MAX_INSERT_ATTEMPTS: u32 = 10;

#[async_trait]
pub trait TokenizationKeyRepository: Send + Sync {
    async fn latest(&self, name: &str) -> CoreResult<Option<TokenizationKey>>;
    async fn by_version(&self, name: &str, version: i64) -> CoreResult<Option<TokenizationKey>>;
    async fn insert(&self, key: TokenizationKey) -> CoreResult<()>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn get(&self, token: &str) -> CoreResult<Option<Token>>;
    async fn find_by_plaintext_hash(&self, tokenization_key_id: Uuid, plaintext_hash: &[u8]) -> CoreResult<Option<Token>>;
    /// Fails with `ConflictError` if `token.token` already exists, so
    /// callers can retry with a freshly generated string.
    async fn insert(&self, token: Token) -> CoreResult<()>;
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>, dry_run: bool) -> CoreResult<u64>;
}

pub struct TokenizationEngine;

impl TokenizationEngine {
    pub async fn create_key(
        repo: &dyn TokenizationKeyRepository,
        dek_repo: &dyn DekRepository,
        kek_chain: &KekChain,
        name: &str,
        format_type: FormatType,
        is_deterministic: bool,
        algorithm: Algorithm,
    ) -> CoreResult<TokenizationKey> {
        if repo.latest(name).await?.is_some() {
            return Err(CoreError::Conflict(format!("tokenization key '{name}' already exists")));
        }
        let (dek, _) = DekManager::create(dek_repo, kek_chain, algorithm).await?;
        let key = TokenizationKey {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: 1,
            dek_id: dek.id,
            format_type: format_type.into(),
            is_deterministic,
            algorithm: algorithm.into(),
            created_at: Utc::now(),
        };
        repo.insert(key.clone()).await?;
        Ok(key)
    }

    /// Inserts a new version sharing `name`; new `tokenize` calls use it
    /// while `detokenize` keeps resolving tokens bound to older versions.
    pub async fn rotate_key(repo: &dyn TokenizationKeyRepository, dek_repo: &dyn DekRepository, kek_chain: &KekChain, name: &str) -> CoreResult<TokenizationKey> {
        let current = repo
            .latest(name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no tokenization key named '{name}'")))?;
        let (dek, _) = DekManager::create(dek_repo, kek_chain, *current.algorithm).await?;
        let next = TokenizationKey {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: current.version + 1,
            dek_id: dek.id,
            format_type: current.format_type,
            is_deterministic: current.is_deterministic,
            algorithm: current.algorithm,
            created_at: Utc::now(),
        };
        repo.insert(next.clone()).await?;
        Ok(next)
    }

    pub async fn tokenize(
        key_repo: &dyn TokenizationKeyRepository,
        token_repo: &dyn TokenRepository,
        dek_repo: &dyn DekRepository,
        kek_chain: &KekChain,
        name: &str,
        plaintext: &[u8],
        expires_at: Option<DateTime<Utc>>,
    ) -> CoreResult<String> {
        let key = key_repo
            .latest(name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no tokenization key named '{name}'")))?;
        let dek = dek_repo.get(key.dek_id).await?;
        let material = DekManager::unwrap(kek_chain, &dek)?;

        let plaintext_hash = if key.is_deterministic {
            let index_key = Kdf::hkdf(&material, b"", DETERMINISTIC_INDEX_CONTEXT, 32)?;
            let hash = Kdf::hmac_sha256(&index_key, plaintext)?;
            if let Some(existing) = token_repo.find_by_plaintext_hash(key.id, &hash).await? {
                return Ok(existing.token);
            }
            Some(hash.to_vec())
        } else {
            None
        };

        let aad = key.id.as_bytes();
        let (nonce, ciphertext) = aead::encrypt(*key.algorithm, &material, plaintext, aad)?;

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let candidate = generate_token(*key.format_type, plaintext);
            let token = Token {
                token: candidate.clone(),
                tokenization_key_id: key.id,
                version: key.version,
                ciphertext: ciphertext.clone(),
                nonce: nonce.clone(),
                plaintext_hash: plaintext_hash.clone(),
                expires_at,
                created_at: Utc::now(),
            };
            match token_repo.insert(token).await {
                Ok(()) => return Ok(candidate),
                Err(CoreError::Conflict(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(CoreError::Conflict(format!("could not allocate a unique token after {MAX_INSERT_ATTEMPTS} attempts")))
    }

    /// Looks up `token`, loads the DEK by the token's own version (older
    /// versions must still resolve), and decrypts.
    pub async fn detokenize(
        key_repo: &dyn TokenizationKeyRepository,
        token_repo: &dyn TokenRepository,
        dek_repo: &dyn DekRepository,
        kek_chain: &KekChain,
        name: &str,
        token: &str,
    ) -> CoreResult<Vec<u8>> {
        let row = token_repo.get(token).await?.ok_or_else(|| CoreError::NotFound(format!("no such token '{token}'")))?;
        let key = key_repo
            .by_version(name, row.version)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("tokenization key '{name}' has no version {}", row.version)))?;
        if key.id != row.tokenization_key_id {
            return Err(CoreError::NotFound(format!("token '{token}' does not belong to key '{name}'")));
        }
        let dek = dek_repo.get(key.dek_id).await?;
        let material = DekManager::unwrap(kek_chain, &dek)?;
        Ok(aead::decrypt(*key.algorithm, &material, &row.nonce, &row.ciphertext, key.id.as_bytes())?)
    }

    /// Deletes tokens whose `expires_at + days < now`; `dry_run` counts
    /// without deleting.
    pub async fn cleanup_expired(token_repo: &dyn TokenRepository, retention_days: i64, dry_run: bool) -> CoreResult<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        token_repo.delete_expired_before(cutoff, dry_run).await
    }
}

fn generate_token(format_type: FormatType, plaintext: &[u8]) -> String {
    let mut rng = rand::thread_rng();
    match format_type {
        FormatType::Uuid => Uuid::new_v4().to_string(),
        FormatType::Numeric => (0..plaintext.len()).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect(),
        FormatType::LuhnPreserving => generate_luhn_preserving(plaintext.len(), &mut rng),
        FormatType::Alphanumeric => {
            const CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
            (0..plaintext.len())
                .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
                .collect()
        }
    }
}

fn generate_luhn_preserving(len: usize, rng: &mut impl Rng) -> String {
    if len == 0 {
        return String::new();
    }
    let mut digits: Vec<u8> = (0..len - 1).map(|_| rng.gen_range(0..10)).collect();
    let check_digit = luhn_check_digit(&digits);
    digits.push(check_digit);
    digits.into_iter().map(|d| char::from(b'0' + d)).collect()
}

/// Computes the Luhn check digit that makes `preceding_digits ++ [digit]`
/// pass the Luhn algorithm.
fn luhn_check_digit(preceding_digits: &[u8]) -> u8 {
    let mut sum = 0u32;
    for (i, &digit) in preceding_digits.iter().rev().enumerate() {
        let mut d = digit as u32;
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    ((10 - (sum % 10)) % 10) as u8
}

/// True if `digits` (as ASCII `'0'..='9'`) passes the Luhn check.
pub fn is_luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    for (i, c) in digits.bytes().rev().enumerate() {
        let mut d = (c - b'0') as u32;
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryTokenizationKeyRepository {
        rows: Mutex<HashMap<(String, i64), TokenizationKey>>,
    }

    #[async_trait]
    impl TokenizationKeyRepository for InMemoryTokenizationKeyRepository {
        async fn latest(&self, name: &str) -> CoreResult<Option<TokenizationKey>> {
            let rows = self.rows.lock().expect("lock poisoned");
            Ok(rows.values().filter(|k| k.name == name).max_by_key(|k| k.version).cloned())
        }

        async fn by_version(&self, name: &str, version: i64) -> CoreResult<Option<TokenizationKey>> {
            let rows = self.rows.lock().expect("lock poisoned");
            Ok(rows.get(&(name.to_string(), version)).cloned())
        }

        async fn insert(&self, key: TokenizationKey) -> CoreResult<()> {
            let mut rows = self.rows.lock().expect("lock poisoned");
            rows.insert((key.name.clone(), key.version), key);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct InMemoryTokenRepository {
        rows: Mutex<HashMap<String, Token>>,
    }

    #[async_trait]
    impl TokenRepository for InMemoryTokenRepository {
        async fn get(&self, token: &str) -> CoreResult<Option<Token>> {
            Ok(self.rows.lock().expect("lock poisoned").get(token).cloned())
        }

        async fn find_by_plaintext_hash(&self, tokenization_key_id: Uuid, plaintext_hash: &[u8]) -> CoreResult<Option<Token>> {
            let rows = self.rows.lock().expect("lock poisoned");
            Ok(rows
                .values()
                .find(|t| t.tokenization_key_id == tokenization_key_id && t.plaintext_hash.as_deref() == Some(plaintext_hash))
                .cloned())
        }

        async fn insert(&self, token: Token) -> CoreResult<()> {
            let mut rows = self.rows.lock().expect("lock poisoned");
            if rows.contains_key(&token.token) {
                return Err(CoreError::Conflict(format!("token '{}' already exists", token.token)));
            }
            rows.insert(token.token.clone(), token);
            Ok(())
        }

        async fn delete_expired_before(&self, cutoff: DateTime<Utc>, dry_run: bool) -> CoreResult<u64> {
            let mut rows = self.rows.lock().expect("lock poisoned");
            let expired: Vec<String> = rows
                .values()
                .filter(|t| t.expires_at.map(|e| e < cutoff).unwrap_or(false))
                .map(|t| t.token.clone())
                .collect();
            if !dry_run {
                for token in &expired {
                    rows.remove(token);
                }
            }
            Ok(expired.len() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{InMemoryTokenRepository, InMemoryTokenizationKeyRepository};
    use super::*;
    use crate::config::Config;
    use crate::dek::fakes::InMemoryDekRepository;
    use crate::kek::fakes::InMemoryKekRepository;
    use crate::kek::KekChain;
    use crate::master::MasterKeyChain;
    use crypto::kms::LocalKeeper;

    async fn kek_chain_with_active() -> KekChain {
        let kms_material = crypto::aead::generate_key();
        let keeper = LocalKeeper::new(kms_material);
        let ciphertext = keeper.encrypt(&crypto::aead::generate_key()).await.unwrap();

        let mut config = Config::minimal_for_test();
        config.master_keys = vec![(
            "m1".to_string(),
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &ciphertext),
        )];
        config.active_master_key_id = "m1".to_string();

        let master_chain = MasterKeyChain::load(&config, &keeper).await.unwrap();
        let kek_repo = InMemoryKekRepository::default();
        KekChain::create_kek(&kek_repo, &master_chain, Algorithm::Aes256Gcm).await.unwrap();
        KekChain::unwrap(&kek_repo, &master_chain).await.unwrap()
    }

    #[tokio::test]
    async fn deterministic_tokenization_is_idempotent() {
        let kek_chain = kek_chain_with_active().await;
        let key_repo = InMemoryTokenizationKeyRepository::default();
        let token_repo = InMemoryTokenRepository::default();
        let dek_repo = InMemoryDekRepository::default();

        TokenizationEngine::create_key(&key_repo, &dek_repo, &kek_chain, "cards", FormatType::Uuid, true, Algorithm::Aes256Gcm)
            .await
            .unwrap();

        let t1 = TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "cards", b"4111-1111-1111-1111", None)
            .await
            .unwrap();
        let t2 = TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "cards", b"4111-1111-1111-1111", None)
            .await
            .unwrap();
        assert_eq!(t1, t2);
    }

    #[tokio::test]
    async fn non_deterministic_tokenization_yields_different_tokens() {
        let kek_chain = kek_chain_with_active().await;
        let key_repo = InMemoryTokenizationKeyRepository::default();
        let token_repo = InMemoryTokenRepository::default();
        let dek_repo = InMemoryDekRepository::default();

        TokenizationEngine::create_key(&key_repo, &dek_repo, &kek_chain, "notes", FormatType::Alphanumeric, false, Algorithm::Aes256Gcm)
            .await
            .unwrap();

        let t1 = TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "notes", b"same plaintext", None).await.unwrap();
        let t2 = TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "notes", b"same plaintext", None).await.unwrap();
        assert_ne!(t1, t2);
    }

    #[tokio::test]
    async fn luhn_preserving_format_scenario() {
        let kek_chain = kek_chain_with_active().await;
        let key_repo = InMemoryTokenizationKeyRepository::default();
        let token_repo = InMemoryTokenRepository::default();
        let dek_repo = InMemoryDekRepository::default();

        TokenizationEngine::create_key(&key_repo, &dek_repo, &kek_chain, "luhn-cards", FormatType::LuhnPreserving, false, Algorithm::Aes256Gcm)
            .await
            .unwrap();

        assert!(is_luhn_valid("4111111111111111"));
        let token = TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "luhn-cards", b"4111111111111111", None)
            .await
            .unwrap();

        assert_eq!(token.len(), 16);
        assert!(token.bytes().all(|b| b.is_ascii_digit()));
        assert!(is_luhn_valid(&token));
    }

    #[tokio::test]
    async fn detokenize_resolves_after_rotation_using_token_own_version() {
        let kek_chain = kek_chain_with_active().await;
        let key_repo = InMemoryTokenizationKeyRepository::default();
        let token_repo = InMemoryTokenRepository::default();
        let dek_repo = InMemoryDekRepository::default();

        TokenizationEngine::create_key(&key_repo, &dek_repo, &kek_chain, "pii", FormatType::Uuid, false, Algorithm::Aes256Gcm)
            .await
            .unwrap();
        let token = TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "pii", b"jane.doe@example.com", None)
            .await
            .unwrap();

        TokenizationEngine::rotate_key(&key_repo, &dek_repo, &kek_chain, "pii").await.unwrap();
        TokenizationEngine::tokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "pii", b"other@example.com", None).await.unwrap();

        let plaintext = TokenizationEngine::detokenize(&key_repo, &token_repo, &dek_repo, &kek_chain, "pii", &token).await.unwrap();
        assert_eq!(plaintext, b"jane.doe@example.com");
    }

    #[tokio::test]
    async fn cleanup_expired_respects_dry_run() {
        let token_repo = InMemoryTokenRepository::default();
        let expired = Token {
            token: "tok-1".to_string(),
            tokenization_key_id: Uuid::new_v4(),
            version: 1,
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 12],
            plaintext_hash: None,
            expires_at: Some(Utc::now() - Duration::days(400)),
            created_at: Utc::now() - Duration::days(400),
        };
        token_repo.insert(expired).await.unwrap();

        let dry = TokenizationEngine::cleanup_expired(&token_repo, 365, true).await.unwrap();
        assert_eq!(dry, 1);
        assert!(token_repo.get("tok-1").await.unwrap().is_some(), "dry run must not delete");

        let real = TokenizationEngine::cleanup_expired(&token_repo, 365, false).await.unwrap();
        assert_eq!(real, 1);
        assert!(token_repo.get("tok-1").await.unwrap().is_none());
    }

    #[test]
    fn luhn_check_digit_makes_sequence_valid() {
        let digit = super::luhn_check_digit(&[4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]);
        let full: String = [4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, digit].iter().map(|d| char::from(b'0' + d)).collect();
        assert!(is_luhn_valid(&full));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_luhn_check_digit_always_validates(
            digits in proptest::collection::vec(0u8..10, 1..32),
        ) {
            let check = super::luhn_check_digit(&digits);
            let full: String = digits.iter().chain(std::iter::once(&check)).map(|d| char::from(b'0' + d)).collect();
            prop_assert!(is_luhn_valid(&full));
        }
    }
}
