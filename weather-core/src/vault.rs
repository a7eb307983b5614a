//! Encrypted storage of the upstream API key.
//!
//! The key is encrypted with AES-256-CBC under a passphrase built from two
//! process-wide secrets. The IV is derived from the same passphrase, so equal
//! plaintexts produce equal ciphertexts under unchanged secrets. This keeps
//! existing stored values readable; swapping in a random IV stored next to
//! the ciphertext only requires changing this module.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use std::{fmt, sync::Arc};
use tracing::{debug, info};

use crate::{error::WidgetError, store::OptionStore};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Option under which the encoded ciphertext is persisted.
pub const API_KEY_OPTION: &str = "wiw_encrypted_api_key";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// The decrypted API key. Only the fetch path should call [`Credential::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The two process-wide secrets the passphrase is built from.
#[derive(Clone)]
pub struct VaultSecrets {
    secure_auth_key: String,
    nonce_key: String,
}

impl VaultSecrets {
    pub fn new(secure_auth_key: impl Into<String>, nonce_key: impl Into<String>) -> Self {
        Self { secure_auth_key: secure_auth_key.into(), nonce_key: nonce_key.into() }
    }

    fn passphrase(&self) -> Vec<u8> {
        let mut passphrase = Vec::with_capacity(self.secure_auth_key.len() + self.nonce_key.len());
        passphrase.extend_from_slice(self.secure_auth_key.as_bytes());
        passphrase.extend_from_slice(self.nonce_key.as_bytes());
        passphrase
    }

    /// Passphrase truncated or NUL-padded to the AES-256 key length.
    fn key(&self) -> [u8; KEY_LEN] {
        let passphrase = self.passphrase();
        let mut key = [0u8; KEY_LEN];
        let len = passphrase.len().min(KEY_LEN);
        key[..len].copy_from_slice(&passphrase[..len]);
        key
    }

    /// First 16 bytes of SHA-256 over the passphrase.
    fn iv(&self) -> [u8; IV_LEN] {
        let digest = Sha256::digest(self.passphrase());
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&digest[..IV_LEN]);
        iv
    }
}

impl fmt::Debug for VaultSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultSecrets(<redacted>)")
    }
}

pub struct Vault {
    secrets: VaultSecrets,
    options: Arc<dyn OptionStore>,
}

impl Vault {
    pub fn new(secrets: VaultSecrets, options: Arc<dyn OptionStore>) -> Self {
        Self { secrets, options }
    }

    /// Encrypt and persist `raw`, replacing any stored key.
    pub fn store(&self, raw: &str) -> Result<(), WidgetError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(WidgetError::EmptyInput);
        }

        let encoded = self.encrypt(raw)?;
        self.options.set(API_KEY_OPTION, &encoded)?;
        info!("stored encrypted API key");
        Ok(())
    }

    /// Decrypt the stored key.
    pub fn retrieve(&self) -> Result<Credential, WidgetError> {
        let encoded = self
            .options
            .get(API_KEY_OPTION)?
            .filter(|value| !value.trim().is_empty())
            .ok_or(WidgetError::NotConfigured)?;

        let credential = self.decrypt(encoded.trim())?;
        debug!("decrypted API key");
        Ok(credential)
    }

    /// Whether a ciphertext is stored. Does not decrypt.
    pub fn is_configured(&self) -> Result<bool, WidgetError> {
        Ok(self.options.get(API_KEY_OPTION)?.is_some_and(|value| !value.trim().is_empty()))
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, WidgetError> {
        let cipher = Aes256CbcEnc::new_from_slices(&self.secrets.key(), &self.secrets.iv())
            .map_err(|e| WidgetError::Store(format!("invalid cipher parameters: {e}")))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        // Two layers of base64: the cipher output is text-encoded once, and that
        // text is encoded again for storage.
        Ok(STANDARD.encode(STANDARD.encode(ciphertext)))
    }

    fn decrypt(&self, encoded: &str) -> Result<Credential, WidgetError> {
        let inner = STANDARD
            .decode(encoded)
            .map_err(|e| WidgetError::Decryption(format!("invalid outer encoding: {e}")))?;
        let ciphertext = STANDARD
            .decode(inner)
            .map_err(|e| WidgetError::Decryption(format!("invalid inner encoding: {e}")))?;

        let cipher = Aes256CbcDec::new_from_slices(&self.secrets.key(), &self.secrets.iv())
            .map_err(|e| WidgetError::Decryption(format!("invalid cipher parameters: {e}")))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| WidgetError::Decryption("bad padding".to_string()))?;

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| WidgetError::Decryption("plaintext is not UTF-8".to_string()))?;
        if plaintext.is_empty() {
            return Err(WidgetError::Decryption("empty plaintext".to_string()));
        }

        Ok(Credential(plaintext))
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault").field("secrets", &self.secrets).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOptions;

    const AUTH_KEY: &str = "q8$Lm!2vR#pX9wZ@tY4nB&cE7gH*jK0sD^fA1uI%oP3lM6";
    const NONCE_KEY: &str = "N0nc3-K3y_with-some-length_for-tests-0123456789";

    fn vault_with(options: Arc<dyn OptionStore>, auth: &str, nonce: &str) -> Vault {
        Vault::new(VaultSecrets::new(auth, nonce), options)
    }

    #[test]
    fn store_then_retrieve_roundtrips() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        let vault = vault_with(options.clone(), AUTH_KEY, NONCE_KEY);

        vault.store("0123456789abcdef0123456789abcdef").unwrap();

        let credential = vault.retrieve().unwrap();
        assert_eq!(credential.expose(), "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn stored_value_is_not_plaintext() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        let vault = vault_with(options.clone(), AUTH_KEY, NONCE_KEY);

        vault.store("super-secret-key").unwrap();

        let stored = options.get(API_KEY_OPTION).unwrap().unwrap();
        assert!(!stored.contains("super-secret-key"));
        assert!(STANDARD.decode(&stored).is_ok());
    }

    #[test]
    fn store_trims_and_replaces() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        let vault = vault_with(options, AUTH_KEY, NONCE_KEY);

        vault.store("first").unwrap();
        vault.store("  second  ").unwrap();

        assert_eq!(vault.retrieve().unwrap().expose(), "second");
    }

    #[test]
    fn blank_input_is_rejected() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        let vault = vault_with(options, AUTH_KEY, NONCE_KEY);

        assert!(matches!(vault.store("   "), Err(WidgetError::EmptyInput)));
        assert!(matches!(vault.store(""), Err(WidgetError::EmptyInput)));
        assert!(!vault.is_configured().unwrap());
    }

    #[test]
    fn retrieve_without_key_is_not_configured() {
        let vault = vault_with(Arc::new(MemoryOptions::new()), AUTH_KEY, NONCE_KEY);
        assert!(matches!(vault.retrieve(), Err(WidgetError::NotConfigured)));
    }

    #[test]
    fn rotated_secrets_fail_to_decrypt() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        vault_with(options.clone(), AUTH_KEY, NONCE_KEY).store("abcdef0123456789").unwrap();

        let rotated = vault_with(options, "a-completely-different-auth-key-value!!", NONCE_KEY);
        assert!(matches!(rotated.retrieve(), Err(WidgetError::Decryption(_))));
    }

    #[test]
    fn corrupted_storage_fails_to_decrypt() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        options.set(API_KEY_OPTION, "%%% not base64 %%%").unwrap();

        let vault = vault_with(options, AUTH_KEY, NONCE_KEY);
        assert!(matches!(vault.retrieve(), Err(WidgetError::Decryption(_))));
    }

    #[test]
    fn short_secrets_are_padded() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        let vault = vault_with(options, "a", "b");

        vault.store("key").unwrap();
        assert_eq!(vault.retrieve().unwrap().expose(), "key");
        assert_eq!(&VaultSecrets::new("a", "b").key()[..3], b"ab\0");
    }

    #[test]
    fn same_plaintext_same_ciphertext() {
        let options: Arc<dyn OptionStore> = Arc::new(MemoryOptions::new());
        let vault = vault_with(options.clone(), AUTH_KEY, NONCE_KEY);

        vault.store("repeat").unwrap();
        let first = options.get(API_KEY_OPTION).unwrap();
        vault.store("repeat").unwrap();
        assert_eq!(options.get(API_KEY_OPTION).unwrap(), first);
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::new("visible?");
        assert!(!format!("{credential:?}").contains("visible?"));
        assert!(!format!("{:?}", VaultSecrets::new(AUTH_KEY, NONCE_KEY)).contains(AUTH_KEY));
    }
}
