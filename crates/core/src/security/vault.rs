//! Credential Vault (§4.2): AES-256-GCM encryption of `CollectionCredential` secrets
//! derived from a process-scoped master key via PBKDF2-HMAC-SHA256.
//!
//! Encoding is `IV (12 bytes) || ciphertext || tag (16 bytes)`, base64-standard. The
//! key is derived once at construction and held only in process memory; plaintext
//! produced by `decrypt` must never be logged or persisted by callers (§5).

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use tokio::sync::Mutex;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Ciphertext failed to authenticate: tampering or the wrong key (§4.2).
    TagMismatch,
    /// Input was not valid base64 or was shorter than `IV || tag`.
    MalformedCiphertext(String),
    /// The configured master key could not be decoded to 32 bytes.
    InvalidMasterKey(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::TagMismatch => write!(f, "authentication tag mismatch"),
            VaultError::MalformedCiphertext(msg) => write!(f, "malformed ciphertext: {msg}"),
            VaultError::InvalidMasterKey(msg) => write!(f, "invalid master key: {msg}"),
        }
    }
}

impl std::error::Error for VaultError {}

/// Result of `TestConnectivity`, cached for 60s per §4.2 to prevent thrash.
#[derive(Debug, Clone)]
pub struct ConnectivityResult {
    pub success: bool,
    pub message: String,
}

/// Holds the derived 256-bit key. Cloning is cheap (`Aes256Gcm` wraps the key
/// material); the vault is typically wrapped in an `Arc` by the composition root.
pub struct Vault {
    cipher: Aes256Gcm,
    test_cache: Mutex<std::collections::HashMap<String, (ConnectivityResult, std::time::Instant)>>,
    test_cache_ttl: std::time::Duration,
}

impl Vault {
    /// Derive the AES key from `master_key` (hex or raw bytes) and `salt` using
    /// PBKDF2-HMAC-SHA256 with `iterations` rounds (>= 100,000 per §4.2, enforced by
    /// `Config::load`).
    pub fn new(
        master_key: &str,
        salt: &str,
        iterations: u32,
        test_cache_ttl: std::time::Duration,
    ) -> Result<Self, VaultError> {
        let key_material = decode_master_key(master_key)?;
        let mut derived = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(&key_material, salt.as_bytes(), iterations, &mut derived);

        let key = Key::<Aes256Gcm>::from_slice(&derived);
        let cipher = Aes256Gcm::new(key);

        Ok(Self {
            cipher,
            test_cache: Mutex::new(std::collections::HashMap::new()),
            test_cache_ttl,
        })
    }

    /// Encrypt `plaintext`, returning base64(`IV || ciphertext || tag`).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut iv_bytes = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv_bytes);
        let nonce = Nonce::from_slice(&iv_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::TagMismatch)?;

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a value produced by `encrypt`. Fails with `TagMismatch` on tampering
    /// or a key mismatch, per the §8 testable property `Decrypt(c, k') != p`.
    pub fn decrypt(&self, encoded: &str) -> Result<String, VaultError> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|err| VaultError::MalformedCiphertext(err.to_string()))?;

        if raw.len() < IV_LEN + TAG_LEN {
            return Err(VaultError::MalformedCiphertext(
                "ciphertext shorter than IV + tag".to_string(),
            ));
        }

        let (iv_bytes, rest) = raw.split_at(IV_LEN);
        let nonce = Nonce::from_slice(iv_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, rest)
            .map_err(|_| VaultError::TagMismatch)?;

        String::from_utf8(plaintext)
            .map_err(|err| VaultError::MalformedCiphertext(err.to_string()))
    }

    /// Cache a `TestConnectivity` result for `service` for the configured TTL
    /// (default 60s) to prevent thrashing the upstream portal with repeated probes.
    pub async fn cache_test_result(&self, service: &str, result: ConnectivityResult) {
        let mut cache = self.test_cache.lock().await;
        cache.insert(service.to_string(), (result, std::time::Instant::now()));
    }

    pub async fn cached_test_result(&self, service: &str) -> Option<ConnectivityResult> {
        let cache = self.test_cache.lock().await;
        cache.get(service).and_then(|(result, at)| {
            if at.elapsed() < self.test_cache_ttl {
                Some(result.clone())
            } else {
                None
            }
        })
    }
}

/// Accepts either a 64-character hex string or a raw 32-byte secret, per §6's
/// `CREDENTIAL_MASTER_KEY` contract.
fn decode_master_key(master_key: &str) -> Result<Vec<u8>, VaultError> {
    if master_key.len() == KEY_LEN * 2 && master_key.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut bytes = Vec::with_capacity(KEY_LEN);
        for chunk in master_key.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(chunk).unwrap_or_default();
            let byte = u8::from_str_radix(pair, 16)
                .map_err(|err| VaultError::InvalidMasterKey(err.to_string()))?;
            bytes.push(byte);
        }
        Ok(bytes)
    } else if master_key.len() == KEY_LEN {
        Ok(master_key.as_bytes().to_vec())
    } else {
        Err(VaultError::InvalidMasterKey(format!(
            "expected 32 raw bytes or 64 hex characters, got {} characters",
            master_key.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault {
        Vault::new(
            &"a".repeat(32),
            "deployment-fixed-salt",
            100_000,
            std::time::Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let vault = vault();
        let ciphertext = vault.encrypt("super-secret-password").unwrap();
        let plaintext = vault.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, "super-secret-password");
    }

    #[test]
    fn decrypt_with_wrong_key_fails_with_tag_mismatch() {
        let vault_a = vault();
        let vault_b = Vault::new(
            &"b".repeat(32),
            "deployment-fixed-salt",
            100_000,
            std::time::Duration::from_secs(60),
        )
        .unwrap();

        let ciphertext = vault_a.encrypt("hello").unwrap();
        let err = vault_b.decrypt(&ciphertext).unwrap_err();
        assert_eq!(err, VaultError::TagMismatch);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let vault = vault();
        let mut ciphertext = STANDARD.decode(vault.encrypt("hello").unwrap()).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        let tampered = STANDARD.encode(ciphertext);

        assert_eq!(vault.decrypt(&tampered).unwrap_err(), VaultError::TagMismatch);
    }

    #[test]
    fn hex_and_raw_master_keys_derive_usably() {
        let hex_key = "00".repeat(32);
        let raw_key = "x".repeat(32);

        let from_hex = Vault::new(&hex_key, "salt", 100_000, std::time::Duration::from_secs(60)).unwrap();
        let from_raw = Vault::new(&raw_key, "salt", 100_000, std::time::Duration::from_secs(60)).unwrap();

        assert!(from_hex.decrypt(&from_hex.encrypt("x").unwrap()).is_ok());
        assert!(from_raw.decrypt(&from_raw.encrypt("x").unwrap()).is_ok());
    }
}
