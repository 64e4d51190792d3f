//! LedgerClient port - 追記専用・レート制限付きの台帳
//!
//! 台帳は署名者ごとに最小書き込み間隔を強制する。
//! その制約は台帳側のもので、このクレートは観測するだけ。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signer::SignerAddress;
use crate::domain::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("rate limited: next write allowed in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("signer {0} is not registered on this network")]
    NotRegistered(SignerAddress),

    #[error("signature does not verify for signer {0}")]
    InvalidSignature(SignerAddress),

    #[error("payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("record has an empty content hash or commit token")]
    IncompleteRecord,

    /// 台帳の保存内容が読めない。人手で直すまで何度読んでも同じ
    #[error("ledger state is corrupted: {0}")]
    Corrupted(String),
}

impl LedgerError {
    /// 認可系・形式系は何度送っても結果が変わらない
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::RateLimited { .. } | LedgerError::Unavailable(_) => ErrorKind::Transient,
            LedgerError::NotRegistered(_)
            | LedgerError::InvalidSignature(_)
            | LedgerError::PayloadTooLarge { .. }
            | LedgerError::MalformedPayload(_)
            | LedgerError::IncompleteRecord
            | LedgerError::Corrupted(_) => ErrorKind::Permanent,
        }
    }
}

/// 署名済みのコミットメント（台帳に渡す単位）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCommitment {
    pub address: SignerAddress,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// 台帳が書き込みを受理した証拠
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub sequence: u64,
    pub committed_at: DateTime<Utc>,
}

/// LedgerClient は台帳への読み書き
///
/// # 設計原則
/// - リトライしない（ポリシーは Publisher が持つ）
/// - 1 レコードの書き込みはアトミック（途中まで書かれることはない）
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// 署名者がこのネットワークに登録済みか
    async fn is_registered(&self, address: &SignerAddress) -> Result<bool, LedgerError>;

    async fn submit(&self, commitment: SignedCommitment) -> Result<CommitReceipt, LedgerError>;
}
