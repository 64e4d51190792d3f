//! FileLedger - ファイルに追記する台帳
//!
//! # レイアウト
//! ```text
//! <root>/<netuid>/registry.json       登録済みアドレス
//! <root>/<netuid>/commitments.jsonl   受理されたエントリ（1 行 1 件、追記のみ）
//! ```
//!
//! 書き込みのたびにファイルから LedgerBook を再構築して規則を検査する。
//! 1 件の追記は 1 回の write で行い、途中までの行は残さない。

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ledger_book::{LedgerBook, LedgerEntry};
use crate::ports::{Clock, CommitReceipt, LedgerClient, LedgerError, SignedCommitment, SignerAddress};

const REGISTRY_FILE: &str = "registry.json";
const COMMITMENTS_FILE: &str = "commitments.jsonl";

#[derive(Debug, Clone)]
pub struct FileLedgerConfig {
    pub root: PathBuf,
    pub netuid: u16,
    pub min_write_interval: Duration,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    registered: BTreeSet<SignerAddress>,
}

pub struct FileLedger {
    dir: PathBuf,
    min_write_interval: Duration,
    clock: Arc<dyn Clock>,
    // プロセス内の書き込みを直列化する
    write_lock: Arc<Mutex<()>>,
}

impl FileLedger {
    pub fn open(config: FileLedgerConfig, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        let dir = config.root.join(config.netuid.to_string());
        std::fs::create_dir_all(&dir).map_err(unavailable)?;
        Ok(Self {
            dir,
            min_write_interval: config.min_write_interval,
            clock,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// アドレスを登録する。すでに登録済みなら false。
    pub fn register(&self, address: SignerAddress) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut registry = read_registry(&self.dir)?;
        let added = registry.registered.insert(address);
        if added {
            write_registry(&self.dir, &registry)?;
        }
        Ok(added)
    }

    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_entries(&self.dir)
    }

    pub fn latest(&self, address: &SignerAddress) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(read_entries(&self.dir)?
            .into_iter()
            .rev()
            .find(|e| &e.address == address))
    }
}

#[async_trait]
impl LedgerClient for FileLedger {
    async fn is_registered(&self, address: &SignerAddress) -> Result<bool, LedgerError> {
        let dir = self.dir.clone();
        let address = address.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, LedgerError> {
            Ok(read_registry(&dir)?.registered.contains(&address))
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("registry lookup failed: {e}")))?
    }

    async fn submit(&self, commitment: SignedCommitment) -> Result<CommitReceipt, LedgerError> {
        let now = self.clock.now();
        let dir = self.dir.clone();
        let interval = self.min_write_interval;
        let lock = self.write_lock.clone();

        tokio::task::spawn_blocking(move || -> Result<CommitReceipt, LedgerError> {
            let _guard = lock.lock().unwrap();
            let registry = read_registry(&dir)?;
            let entries = read_entries(&dir)?;
            let mut book = LedgerBook::with_state(interval, registry.registered, entries);

            let entry = book.apply(commitment, now)?;
            append_entry(&dir, &entry)?;
            debug!(sequence = entry.sequence, signer = %entry.address, "appended ledger entry");
            Ok(entry.receipt())
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("submit failed: {e}")))?
    }
}

fn unavailable(e: std::io::Error) -> LedgerError {
    LedgerError::Unavailable(e.to_string())
}

fn read_registry(dir: &Path) -> Result<Registry, LedgerError> {
    let path = dir.join(REGISTRY_FILE);
    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| LedgerError::Corrupted(format!("{REGISTRY_FILE}: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Registry::default()),
        Err(e) => Err(unavailable(e)),
    }
}

fn write_registry(dir: &Path, registry: &Registry) -> Result<(), LedgerError> {
    let tmp = dir.join(format!("{REGISTRY_FILE}.tmp"));
    let raw = serde_json::to_vec_pretty(registry)
        .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
    std::fs::write(&tmp, raw).map_err(unavailable)?;
    std::fs::rename(&tmp, dir.join(REGISTRY_FILE)).map_err(unavailable)
}

fn read_entries(dir: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
    let file = match std::fs::File::open(dir.join(COMMITMENTS_FILE)) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(unavailable(e)),
    };
    let mut entries = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(unavailable)?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: LedgerEntry = serde_json::from_str(&line).map_err(|e| {
            LedgerError::Corrupted(format!("{COMMITMENTS_FILE} line {}: {e}", i + 1))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn append_entry(dir: &Path, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let mut line =
        serde_json::to_vec(entry).map_err(|e| LedgerError::Unavailable(e.to_string()))?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(COMMITMENTS_FILE))
        .map_err(unavailable)?;
    file.write_all(&line).map_err(unavailable)?;
    file.sync_data().map_err(unavailable)
}
