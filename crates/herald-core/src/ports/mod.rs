//! Ports - 抽象化レイヤー
//!
//! 外部システム（オブジェクトストア、台帳、ウォレット、時刻）への
//! インターフェースを定義し、実装の詳細を隠蔽します。
//!
//! すべての port は `Send + Sync` で、`Arc<dyn _>` として Publisher に渡します。
//! テストでは一時的な失敗を決定的に再現する fake を差し込みます。

pub mod artifact_store;
pub mod ledger;
pub mod signer;
pub mod clock;

// 主要な trait を再エクスポート
pub use self::artifact_store::{ArtifactStore, StoreError};
pub use self::ledger::{CommitReceipt, LedgerClient, LedgerError, SignedCommitment};
pub use self::signer::{Signer, SignerAddress};
pub use self::clock::{Clock, ManualClock, SystemClock};
