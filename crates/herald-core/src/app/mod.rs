//! App - アプリケーション層
//!
//! ports を組み合わせて公開パイプラインを実装します。
//!
//! # 主要コンポーネント
//! - **Publisher**: validate → upload → visibility + commit（リトライ）
//! - **LedgerMetadataWriter**: レコードの署名と送信
//! - **RetryPolicy**: バックオフ間隔と試行回数の上限

pub mod publisher;
pub mod metadata_writer;
pub mod retry;

// 主要な型を再エクスポート
pub use self::publisher::{PublishError, PublishReceipt, PublishRequest, PublishStage, Publisher};
pub use self::metadata_writer::LedgerMetadataWriter;
pub use self::retry::{DEFAULT_BACKOFF, RetryPolicy};
