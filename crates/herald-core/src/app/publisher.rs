//! Publisher - 公開パイプライン本体
//!
//! # フロー
//! 1. VALIDATE: ArtifactValidator でディレクトリを検査
//! 2. PREFLIGHT: 署名者が台帳に登録済みか確認（アップロード前に失敗させる）
//! 3. UPLOAD: ArtifactStore::upload を 1 回だけ実行
//! 4. SET_VISIBLE_AND_COMMIT: set_visibility(public) → commit をペアでリトライ
//! 5. DONE
//!
//! 1〜3 の失敗は終端。4 は一時的なエラーならバックオフしてペアの先頭からやり直す。
//! DONE に遷移するのは同じ試行の中で visibility と commit が両方成功したときだけ。
//! 4 の試行は始まったら最後まで走らせ、キャンセルは試行の前とバックオフ中にだけ効く。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::metadata_writer::LedgerMetadataWriter;
use super::retry::RetryPolicy;
use crate::domain::{
    CompetitionParameters, ErrorKind, LedgerRecord, ModelArtifactDescriptor, ModelIdentity,
    RemoteArtifactReference,
};
use crate::ports::{
    ArtifactStore, Clock, CommitReceipt, LedgerClient, LedgerError, Signer, SignerAddress,
    StoreError,
};
use crate::validator::{ArtifactValidator, ValidationError};

/// Pipeline stage, used in logs and in `PublishError::Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Validate,
    Preflight,
    Upload,
    Commit,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublishStage::Validate => "validate",
            PublishStage::Preflight => "preflight",
            PublishStage::Upload => "upload",
            PublishStage::Commit => "commit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("model competition {model:?} does not match parameters for {parameters:?}")]
    CompetitionMismatch { model: String, parameters: String },

    #[error("signer {0} is not registered; register before publishing")]
    NotRegistered(SignerAddress),

    #[error("registration lookup failed: {0}")]
    RegistrationLookup(#[source] LedgerError),

    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("store returned an unusable reference: {0}")]
    InvalidReference(String),

    #[error("failed to make model public: {0}")]
    Visibility(#[source] StoreError),

    #[error("ledger rejected the commitment: {0}")]
    Commit(#[source] LedgerError),

    #[error("gave up after {attempts} attempts, last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("cancelled during {0}")]
    Cancelled(PublishStage),
}

/// 公開要求
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub descriptor: ModelArtifactDescriptor,
    pub parameters: CompetitionParameters,
}

/// 公開が完了したときに呼び出し元へ返す内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub reference: RemoteArtifactReference,
    pub record: LedgerRecord,
    pub signer: SignerAddress,
    pub receipt: CommitReceipt,
    /// visibility + commit ペアの試行回数（成功した回を含む）
    pub attempts: u32,
}

/// One failed iteration of the retrying tail.
#[derive(Debug)]
enum TailFailure {
    Visibility(StoreError),
    Commit(LedgerError),
}

impl TailFailure {
    fn kind(&self) -> ErrorKind {
        match self {
            TailFailure::Visibility(e) => e.kind(),
            TailFailure::Commit(e) => e.kind(),
        }
    }

    fn into_error(self) -> PublishError {
        match self {
            TailFailure::Visibility(e) => PublishError::Visibility(e),
            TailFailure::Commit(e) => PublishError::Commit(e),
        }
    }
}

impl fmt::Display for TailFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailFailure::Visibility(e) => write!(f, "set visibility: {e}"),
            TailFailure::Commit(e) => write!(f, "commit: {e}"),
        }
    }
}

/// Publisher は公開パイプラインを順に実行し、エラー回復ポリシーを持つ
///
/// # 使用例
/// ```ignore
/// let publisher = Publisher::new(store, ledger, signer, Arc::new(SystemClock))
///     .with_retry_policy(RetryPolicy::default());
/// let receipt = publisher.publish(request, shutdown_rx).await?;
/// ```
pub struct Publisher {
    validator: ArtifactValidator,
    store: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn LedgerClient>,
    writer: LedgerMetadataWriter,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validator: ArtifactValidator::new(),
            store,
            writer: LedgerMetadataWriter::new(ledger.clone()),
            ledger,
            signer,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// パイプラインを最後まで実行する
    ///
    /// `shutdown` に `true` が送られると、次の待機点で `Cancelled` を返す。
    /// 待機点は preflight・upload・各試行の前・バックオフ中で、実行中の
    /// visibility + commit の試行は中断しない。その試行が成功すれば結果は成功になる。
    /// sender が drop された場合はキャンセルされないものとして扱う。
    pub async fn publish(
        &self,
        request: PublishRequest,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<PublishReceipt, PublishError> {
        let PublishRequest {
            descriptor,
            parameters,
        } = request;

        if descriptor.identity.competition_id() != parameters.competition_id {
            return Err(PublishError::CompetitionMismatch {
                model: descriptor.identity.competition_id().to_string(),
                parameters: parameters.competition_id,
            });
        }

        // VALIDATE
        info!(
            model = %descriptor.identity,
            path = %descriptor.local_path().display(),
            "validating model directory"
        );
        let artifact = self.validator.validate(descriptor).inspect_err(|e| {
            error!(stage = %PublishStage::Validate, error = %e, "model directory is not publishable");
        })?;

        // PREFLIGHT
        let address = self.signer.address();
        let registered = until_cancelled(
            &mut shutdown,
            PublishStage::Preflight,
            self.ledger.is_registered(&address),
        )
        .await?
        .map_err(PublishError::RegistrationLookup)?;
        if !registered {
            error!(signer = %address, "signer is not registered");
            return Err(PublishError::NotRegistered(address));
        }

        // UPLOAD
        info!(
            repo = %artifact.descriptor().identity.repo_id(),
            weights = artifact.report().weight_files.len(),
            declared_bytes = artifact.report().declared_total_size,
            "uploading model"
        );
        let reference = until_cancelled(
            &mut shutdown,
            PublishStage::Upload,
            self.store.upload(&artifact, &parameters),
        )
        .await?
        .map_err(|e| {
            error!(stage = %PublishStage::Upload, error = %e, "upload failed");
            PublishError::Upload(e)
        })?;
        check_reference(&reference, &artifact.descriptor().identity)?;
        info!(
            content_hash = reference.content_hash(),
            commit_token = reference.commit_token(),
            "model uploaded"
        );

        // レコードは upload が返した参照からのみ作る
        let record = LedgerRecord::from_reference(&reference);

        // SET_VISIBLE_AND_COMMIT
        let (receipt, attempts) = self
            .commit_with_retry(reference.identity(), &record, &mut shutdown)
            .await?;
        info!(
            signer = %address,
            sequence = receipt.sequence,
            attempts,
            "committed model to the ledger"
        );

        Ok(PublishReceipt {
            reference,
            record,
            signer: address,
            receipt,
            attempts,
        })
    }

    async fn commit_with_retry(
        &self,
        identity: &ModelIdentity,
        record: &LedgerRecord,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(CommitReceipt, u32), PublishError> {
        let mut attempts: u32 = 0;
        loop {
            if *shutdown.borrow_and_update() {
                warn!(stage = %PublishStage::Commit, "publication cancelled");
                return Err(PublishError::Cancelled(PublishStage::Commit));
            }
            attempts += 1;
            let failure = match self.attempt_commit(identity, record).await {
                Ok(receipt) => return Ok((receipt, attempts)),
                Err(failure) => failure,
            };

            if !failure.kind().is_retriable() {
                error!(attempt = attempts, error = %failure, "permanent failure, not retrying");
                return Err(failure.into_error());
            }
            if !self.retry.allows_retry_after(attempts) {
                error!(attempt = attempts, error = %failure, "retry budget exhausted");
                return Err(PublishError::RetriesExhausted {
                    attempts,
                    last_error: failure.to_string(),
                });
            }

            let mut delay = self.retry.next_delay(attempts);
            // 台帳が次の書き込み可能時刻を教えてくれた場合はそれより早く起きない
            if let TailFailure::Commit(LedgerError::RateLimited { retry_after }) = &failure {
                delay = delay.max(*retry_after);
            }
            warn!(
                attempt = attempts,
                error = %failure,
                retry_in_secs = delay.as_secs(),
                "failed to advertise model on the ledger, retrying"
            );
            until_cancelled(shutdown, PublishStage::Commit, self.clock.sleep(delay)).await?;
        }
    }

    /// visibility → commit を 1 回試す
    ///
    /// 台帳への送信は途中で止められない（送った後に future を捨てても書き込みは残りうる）ため、
    /// 試行はキャンセルと競合させず最後まで待つ。
    async fn attempt_commit(
        &self,
        identity: &ModelIdentity,
        record: &LedgerRecord,
    ) -> Result<CommitReceipt, TailFailure> {
        self.store
            .set_visibility(identity, true)
            .await
            .map_err(TailFailure::Visibility)?;
        self.writer
            .commit(self.signer.as_ref(), record)
            .await
            .map_err(TailFailure::Commit)
    }
}

fn check_reference(
    reference: &RemoteArtifactReference,
    expected: &ModelIdentity,
) -> Result<(), PublishError> {
    if !reference.is_complete() {
        return Err(PublishError::InvalidReference(
            "empty content hash or commit token".to_string(),
        ));
    }
    if reference.identity() != expected {
        return Err(PublishError::InvalidReference(format!(
            "reference is for {}, expected {}",
            reference.identity(),
            expected
        )));
    }
    Ok(())
}

/// `fut` とキャンセル通知を競合させる
async fn until_cancelled<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    stage: PublishStage,
    fut: F,
) -> Result<F::Output, PublishError> {
    if *shutdown.borrow_and_update() {
        return Err(PublishError::Cancelled(stage));
    }
    tokio::select! {
        out = fut => Ok(out),
        _ = cancelled(shutdown) => {
            warn!(stage = %stage, "publication cancelled");
            Err(PublishError::Cancelled(stage))
        }
    }
}

async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if shutdown.changed().await.is_err() {
            // sender が drop された: もうキャンセルは来ない
            std::future::pending::<()>().await;
        }
        if *shutdown.borrow_and_update() {
            return;
        }
    }
}
