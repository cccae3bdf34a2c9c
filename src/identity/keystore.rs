//! Encrypted keystore for the operator signing key.
//!
//! The keystore is a JSON document: PBKDF2-HMAC-SHA256 stretches the password into an
//! AES-256-GCM key which seals the 32-byte big-endian BN254 secret scalar. The compressed G2
//! public key is stored in the clear so it can be inspected without the password and
//! checked after decryption.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::OperatorKeypair;
use alloy::hex;

pub const KEYSTORE_VERSION: u32 = 2;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
const KDF_ALGORITHM: &str = "pbkdf2-hmac-sha256";
const CIPHER_ALGORITHM: &str = "aes-256-gcm";
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("failed to read keystore {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write keystore {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed keystore: {0}")]
    Malformed(String),

    #[error("unsupported keystore {field}: {value}")]
    Unsupported { field: &'static str, value: String },

    #[error("failed to decrypt keystore (wrong password?)")]
    Decryption,

    #[error("keystore public key does not match decrypted secret key")]
    PublicKeyMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: String,
    pub iterations: u32,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    pub algorithm: String,
    pub nonce: String,
}

/// On-disk keystore document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keystore {
    pub version: u32,
    pub public_key: String,
    pub kdf: KdfParams,
    pub cipher: CipherParams,
    pub ciphertext: String,
}

impl Keystore {
    /// Seal `keypair` under `password`
    pub fn encrypt(
        keypair: &OperatorKeypair,
        password: &str,
        iterations: u32,
    ) -> Result<Self, KeystoreError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let key = derive_key(password, &salt, iterations);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| KeystoreError::Malformed(format!("invalid derived key: {e}")))?;

        let secret = keypair.secret_bytes();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
            .map_err(|_| KeystoreError::Malformed("encryption failed".to_string()))?;

        Ok(Self {
            version: KEYSTORE_VERSION,
            public_key: keypair.public_key().to_string(),
            kdf: KdfParams {
                algorithm: KDF_ALGORITHM.to_string(),
                iterations,
                salt: hex::encode_prefixed(salt),
            },
            cipher: CipherParams {
                algorithm: CIPHER_ALGORITHM.to_string(),
                nonce: hex::encode_prefixed(nonce),
            },
            ciphertext: hex::encode_prefixed(ciphertext),
        })
    }

    /// Unseal the keypair and check it against the stored public key
    pub fn decrypt(&self, password: &str) -> Result<OperatorKeypair, KeystoreError> {
        self.check_supported()?;

        let salt = hex::decode(&self.kdf.salt)
            .map_err(|e| KeystoreError::Malformed(format!("salt: {e}")))?;
        let nonce: [u8; NONCE_LEN] = hex::decode_to_array(&self.cipher.nonce)
            .map_err(|e| KeystoreError::Malformed(format!("nonce: {e}")))?;
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|e| KeystoreError::Malformed(format!("ciphertext: {e}")))?;

        let key = derive_key(password, &salt, self.kdf.iterations);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| KeystoreError::Malformed(format!("invalid derived key: {e}")))?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
                .map_err(|_| KeystoreError::Decryption)?,
        );
        let secret: Zeroizing<[u8; 32]> = Zeroizing::new(
            plaintext
                .as_slice()
                .try_into()
                .map_err(|_| KeystoreError::Malformed("secret key must be 32 bytes".to_string()))?,
        );

        let keypair = OperatorKeypair::from_secret_bytes(&secret)
            .map_err(|e| KeystoreError::Malformed(e.to_string()))?;
        if !keypair
            .public_key()
            .to_string()
            .eq_ignore_ascii_case(&self.public_key)
        {
            return Err(KeystoreError::PublicKeyMismatch);
        }
        Ok(keypair)
    }

    pub fn load(path: &Path) -> Result<Self, KeystoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| KeystoreError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| KeystoreError::Malformed(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), KeystoreError> {
        let write_error = |source| KeystoreError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KeystoreError::Malformed(e.to_string()))?;
        std::fs::write(path, content).map_err(write_error)
    }

    fn check_supported(&self) -> Result<(), KeystoreError> {
        if self.version != KEYSTORE_VERSION {
            return Err(KeystoreError::Unsupported {
                field: "version",
                value: self.version.to_string(),
            });
        }
        if self.kdf.algorithm != KDF_ALGORITHM {
            return Err(KeystoreError::Unsupported {
                field: "kdf",
                value: self.kdf.algorithm.clone(),
            });
        }
        if self.cipher.algorithm != CIPHER_ALGORITHM {
            return Err(KeystoreError::Unsupported {
                field: "cipher",
                value: self.cipher.algorithm.clone(),
            });
        }
        Ok(())
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut_slice());
    key
}

/// Read a keystore password from the environment.
///
/// A missing variable is tolerated: the empty password is used and a warning logged.
pub fn password_from_env(var_name: &str) -> Zeroizing<String> {
    match std::env::var(var_name) {
        Ok(password) => Zeroizing::new(password),
        Err(_) => {
            warn!("{var_name} env var not set. using empty string");
            Zeroizing::new(String::new())
        }
    }
}

/// Load and unlock the signing key at `path` with the password held in `password_env`
pub fn load_signing_key(path: &Path, password_env: &str) -> Result<OperatorKeypair, KeystoreError> {
    let password = password_from_env(password_env);
    let keystore = Keystore::load(path)?;
    let keypair = keystore.decrypt(&password)?;
    debug!(path = %path.display(), public_key = %keypair.public_key(), "Unlocked signing key");
    Ok(keypair)
}
