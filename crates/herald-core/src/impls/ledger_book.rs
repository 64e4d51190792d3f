//! LedgerBook - 台帳の受理ルール
//!
//! InMemoryLedger と FileLedger はこの規則を共有する。
//!
//! # 受理条件
//! - 署名者が登録済み
//! - payload が MAX_PAYLOAD_BYTES 以下
//! - 署名がアドレスの鍵で検証できる
//! - payload が完全な LedgerRecord として読める
//! - 同じ署名者の前回の書き込みから min_write_interval 以上経過している

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ed25519_signer::verify_signature;
use crate::domain::LedgerRecord;
use crate::ports::{CommitReceipt, LedgerError, SignedCommitment, SignerAddress};

pub const MAX_PAYLOAD_BYTES: usize = 1024;

/// Minimum interval between two writes from the same signer.
pub const DEFAULT_MIN_WRITE_INTERVAL: Duration = Duration::from_secs(60);

/// 台帳に記録された 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub address: SignerAddress,
    pub record: LedgerRecord,
    /// hex
    pub signature: String,
    pub committed_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn receipt(&self) -> CommitReceipt {
        CommitReceipt {
            sequence: self.sequence,
            committed_at: self.committed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerBook {
    min_write_interval: Duration,
    registered: BTreeSet<SignerAddress>,
    entries: Vec<LedgerEntry>,
}

impl LedgerBook {
    pub fn new(min_write_interval: Duration) -> Self {
        Self {
            min_write_interval,
            registered: BTreeSet::new(),
            entries: Vec::new(),
        }
    }

    pub fn with_state(
        min_write_interval: Duration,
        registered: BTreeSet<SignerAddress>,
        entries: Vec<LedgerEntry>,
    ) -> Self {
        Self {
            min_write_interval,
            registered,
            entries,
        }
    }

    pub fn register(&mut self, address: SignerAddress) -> bool {
        self.registered.insert(address)
    }

    pub fn is_registered(&self, address: &SignerAddress) -> bool {
        self.registered.contains(address)
    }

    pub fn registered(&self) -> &BTreeSet<SignerAddress> {
        &self.registered
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn latest(&self, address: &SignerAddress) -> Option<&LedgerEntry> {
        self.entries.iter().rev().find(|e| &e.address == address)
    }

    /// 規則を検査し、受理したら追記してそのエントリを返す
    pub fn apply(
        &mut self,
        commitment: SignedCommitment,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let SignedCommitment {
            address,
            payload,
            signature,
        } = commitment;

        if !self.is_registered(&address) {
            return Err(LedgerError::NotRegistered(address));
        }
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(LedgerError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_PAYLOAD_BYTES,
            });
        }
        if !verify_signature(&address, &payload, &signature) {
            return Err(LedgerError::InvalidSignature(address));
        }
        let record = LedgerRecord::from_payload(&payload)
            .map_err(|e| LedgerError::MalformedPayload(e.to_string()))?;
        if !record.is_complete() {
            return Err(LedgerError::IncompleteRecord);
        }

        if let Some(last) = self.latest(&address) {
            // 時計が巻き戻った場合は経過 0 とみなす
            let elapsed = now
                .signed_duration_since(last.committed_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed < self.min_write_interval {
                return Err(LedgerError::RateLimited {
                    retry_after: self.min_write_interval - elapsed,
                });
            }
        }

        let entry = LedgerEntry {
            sequence: self.entries.len() as u64,
            address,
            record,
            signature: hex::encode(signature),
            committed_at: now,
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }
}
