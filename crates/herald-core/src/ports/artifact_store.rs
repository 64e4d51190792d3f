//! ArtifactStore port - コンテンツアドレス型のリモートストア
//!
//! # 契約
//! - `upload` は成果物全体が取得可能になるまで成功を返さない
//! - `upload` の失敗は 1 回の公開処理の中ではリトライしない
//! - `set_visibility` は台帳コミット直前に呼ばれ、リトライ対象

use async_trait::async_trait;

use crate::domain::{CompetitionParameters, ErrorKind, ModelIdentity, RemoteArtifactReference};
use crate::validator::ValidatedArtifact;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("artifact is {size} bytes, competition allows at most {limit}")]
    Quota { size: u64, limit: u64 },

    #[error("credential is not authorized for repository {0}")]
    Unauthorized(String),

    #[error("repository {0} not found")]
    RepositoryNotFound(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transfer(_) => ErrorKind::Transient,
            StoreError::Quota { .. }
            | StoreError::Unauthorized(_)
            | StoreError::RepositoryNotFound(_) => ErrorKind::Permanent,
        }
    }
}

/// ArtifactStore は検証済みモデルを保存して参照を返す
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(
        &self,
        artifact: &ValidatedArtifact,
        parameters: &CompetitionParameters,
    ) -> Result<RemoteArtifactReference, StoreError>;

    async fn set_visibility(&self, identity: &ModelIdentity, public: bool)
        -> Result<(), StoreError>;
}
