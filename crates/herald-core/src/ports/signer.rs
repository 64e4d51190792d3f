//! Signer port - 署名付きアイデンティティ
//!
//! ウォレット管理そのものは扱わない。Publisher が必要とするのは
//! 「アドレス」と「バイト列への署名」だけ。

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ledger-facing address of a signer (hex-encoded public key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerAddress(String);

impl SignerAddress {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signer は台帳に書き込む主体
///
/// # Thread Safety
/// - `Send + Sync` を要求（`Arc<dyn Signer>` で共有する）
pub trait Signer: Send + Sync {
    fn address(&self) -> SignerAddress;

    /// Detached signature over `message`.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}
