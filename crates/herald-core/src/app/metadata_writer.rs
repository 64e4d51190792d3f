//! LedgerMetadataWriter - レコードを署名して台帳に送る
//!
//! # 設計原則
//! - ステートレス（呼び出し間で状態を持たない）
//! - リトライしない（visibility と commit を 1 単位で Publisher がリトライする）

use std::sync::Arc;

use tracing::debug;

use crate::domain::LedgerRecord;
use crate::ports::{CommitReceipt, LedgerClient, LedgerError, SignedCommitment, Signer};

pub struct LedgerMetadataWriter {
    ledger: Arc<dyn LedgerClient>,
}

impl LedgerMetadataWriter {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// `record` を `signer` として台帳に書き込む
    ///
    /// hash / token が空のレコードは送信せずに `IncompleteRecord` を返す。
    pub async fn commit(
        &self,
        signer: &dyn Signer,
        record: &LedgerRecord,
    ) -> Result<CommitReceipt, LedgerError> {
        if !record.is_complete() {
            return Err(LedgerError::IncompleteRecord);
        }
        let payload = record
            .to_payload()
            .map_err(|e| LedgerError::MalformedPayload(e.to_string()))?;
        let signature = signer.sign(&payload);
        let commitment = SignedCommitment {
            address: signer.address(),
            payload,
            signature,
        };
        debug!(
            signer = %commitment.address,
            bytes = commitment.payload.len(),
            "submitting commitment"
        );
        self.ledger.submit(commitment).await
    }
}
