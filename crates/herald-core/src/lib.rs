//! herald-core
//!
//! ローカルで学習したモデルを評価ネットワークへ公開するためのパイプライン。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（identity, artifact, record, competition, errors）
//! - **ports**: 抽象化レイヤー（ArtifactStore, LedgerClient, Signer, Clock）
//! - **validator**: モデルディレクトリの検証
//! - **app**: アプリケーションロジック（Publisher, LedgerMetadataWriter, RetryPolicy）
//! - **impls**: ports の実装（LocalArtifactStore, FileLedger, InMemoryLedger, Ed25519Signer）

pub mod domain;
pub mod ports;
pub mod validator;
pub mod app;
pub mod impls;

pub use app::{LedgerMetadataWriter, PublishError, PublishReceipt, PublishRequest, Publisher, RetryPolicy};
pub use domain::{
    CompetitionParameters, CompetitionSchedule, LedgerRecord, ModelArtifactDescriptor, ModelIdentity,
    RemoteArtifactReference,
};
pub use validator::{ArtifactValidator, ValidatedArtifact, ValidationError};
