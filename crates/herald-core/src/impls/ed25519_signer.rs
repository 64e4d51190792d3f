//! Ed25519Signer - 鍵ファイルから読み込む署名者
//!
//! 鍵ファイルは 32 バイトの seed を hex で 1 行書いたもの。
//! アドレスは検証鍵（公開鍵）の hex。

use std::fmt;
use std::io::Write;
use std::path::Path;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::ports::{Signer, SignerAddress};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("key seed must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed_hex(seed: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(seed.trim())?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn from_key_file(path: &Path) -> Result<Self, KeyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_seed_hex(&raw)
    }

    /// 鍵ファイルを書き出す。既存ファイルは上書きしない。
    pub fn write_key_file(&self, path: &Path) -> Result<(), KeyError> {
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        writeln!(file, "{}", hex::encode(self.key.to_bytes()))?;
        file.sync_all()?;
        Ok(())
    }
}

impl Signer for Ed25519Signer {
    fn address(&self) -> SignerAddress {
        SignerAddress::new(hex::encode(self.key.verifying_key().to_bytes()))
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// `signature` が `address` の鍵で `payload` に付けられたものか
pub fn verify_signature(address: &SignerAddress, payload: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = hex::decode(address.as_str()) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(payload, &signature).is_ok()
}
