//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **LocalArtifactStore**: ファイルシステム上のコンテンツアドレス型ストア
//! - **InMemoryLedger**: テスト用の台帳
//! - **FileLedger**: JSON Lines に永続化する開発用台帳
//! - **Ed25519Signer**: 鍵ファイルから読み込むウォレット
//!
//! 台帳の検証ルール（登録・署名・サイズ・書き込み間隔）は `LedgerBook` に集約し、
//! 2 つの台帳実装で共有します。

pub mod ed25519_signer;
pub mod ledger_book;
pub mod inmem_ledger;
pub mod file_ledger;
pub mod local_store;

// 主要な型を再エクスポート
pub use self::ed25519_signer::{verify_signature, Ed25519Signer, KeyError};
pub use self::ledger_book::{LedgerBook, LedgerEntry, DEFAULT_MIN_WRITE_INTERVAL, MAX_PAYLOAD_BYTES};
pub use self::inmem_ledger::InMemoryLedger;
pub use self::file_ledger::{FileLedger, FileLedgerConfig};
pub use self::local_store::{CommitManifest, LocalArtifactStore, LocalStoreConfig, ManifestEntry};
