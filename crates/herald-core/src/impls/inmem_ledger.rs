//! InMemoryLedger - 開発・テスト用の台帳
//!
//! LedgerBook を Mutex で包み、時刻は Clock から取る。
//! ManualClock と組み合わせるとレート制限を決定的に再現できる。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::ledger_book::{LedgerBook, LedgerEntry};
use crate::ports::{Clock, CommitReceipt, LedgerClient, LedgerError, SignedCommitment, SignerAddress};

pub struct InMemoryLedger {
    book: Mutex<LedgerBook>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLedger {
    pub fn new(clock: Arc<dyn Clock>, min_write_interval: Duration) -> Self {
        Self {
            book: Mutex::new(LedgerBook::new(min_write_interval)),
            clock,
        }
    }

    pub fn register(&self, address: SignerAddress) {
        self.book.lock().unwrap().register(address);
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.book.lock().unwrap().entries().to_vec()
    }

    pub fn latest(&self, address: &SignerAddress) -> Option<LedgerEntry> {
        self.book.lock().unwrap().latest(address).cloned()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn is_registered(&self, address: &SignerAddress) -> Result<bool, LedgerError> {
        Ok(self.book.lock().unwrap().is_registered(address))
    }

    async fn submit(&self, commitment: SignedCommitment) -> Result<CommitReceipt, LedgerError> {
        let now = self.clock.now();
        let entry = self.book.lock().unwrap().apply(commitment, now)?;
        Ok(entry.receipt())
    }
}
