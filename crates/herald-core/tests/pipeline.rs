//! 開発用バックエンドを実際に組み合わせた公開フロー

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::watch;

use herald_core::impls::{
    verify_signature, Ed25519Signer, InMemoryLedger, LocalArtifactStore, LocalStoreConfig,
    DEFAULT_MIN_WRITE_INTERVAL,
};
use herald_core::ports::{ManualClock, Signer};
use herald_core::validator::{
    GENERATION_CONFIG_FILE, MODEL_CONFIG_FILE, SHARD_INDEX_FILE, SPECIAL_TOKENS_MAP_FILE,
    TOKENIZER_FILE,
};
use herald_core::{
    CompetitionSchedule, LedgerRecord, ModelArtifactDescriptor, ModelIdentity, PublishRequest,
    Publisher, RetryPolicy,
};

fn write_model(dir: &Path) {
    fs::write(dir.join("model-00001-of-00002.safetensors"), vec![1u8; 2048]).unwrap();
    fs::write(dir.join("model-00002-of-00002.safetensors"), vec![2u8; 1024]).unwrap();
    for f in [
        TOKENIZER_FILE,
        MODEL_CONFIG_FILE,
        GENERATION_CONFIG_FILE,
        SPECIAL_TOKENS_MAP_FILE,
    ] {
        fs::write(dir.join(f), b"{}").unwrap();
    }
    fs::write(
        dir.join(SHARD_INDEX_FILE),
        r#"{"metadata":{"total_size":3072},"weight_map":{}}"#,
    )
    .unwrap();
}

#[tokio::test]
async fn second_publish_waits_out_the_ledger_interval() {
    let model = tempfile::tempdir().unwrap();
    write_model(model.path());
    let store_root = tempfile::tempdir().unwrap();

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    ));
    let store = Arc::new(
        LocalArtifactStore::new(LocalStoreConfig {
            root: store_root.path().to_path_buf(),
            access_token: "hf_test".to_string(),
        })
        .unwrap(),
    );
    let ledger = Arc::new(InMemoryLedger::new(clock.clone(), DEFAULT_MIN_WRITE_INTERVAL));
    let signer = Arc::new(Ed25519Signer::generate());
    ledger.register(signer.address());

    let publisher = Publisher::new(store.clone(), ledger.clone(), signer.clone(), clock.clone())
        .with_retry_policy(RetryPolicy::fixed(Duration::from_secs(10)));

    let parameters = CompetitionSchedule::builtin()
        .get("original")
        .unwrap()
        .clone();
    let request = || PublishRequest {
        descriptor: ModelArtifactDescriptor::new(
            ModelIdentity::from_repo_id("jdoe/roleplay-7b", "original").unwrap(),
            model.path(),
        ),
        parameters: parameters.clone(),
    };
    let (_tx, rx) = watch::channel(false);

    let first = publisher.publish(request(), rx.clone()).await.unwrap();
    assert_eq!(first.attempts, 1);
    assert!(clock.sleeps().is_empty());

    // 同じ署名者の 2 回目は最短間隔に引っかかり、台帳のヒント（60s）だけ待つ
    let second = publisher.publish(request(), rx).await.unwrap();
    assert_eq!(second.attempts, 2);
    assert_eq!(clock.sleeps(), vec![DEFAULT_MIN_WRITE_INTERVAL]);
    assert_ne!(first.reference.commit_token(), second.reference.commit_token());
    assert_eq!(first.reference.content_hash(), second.reference.content_hash());

    // 台帳の最新エントリは 2 回目の upload 参照と一致し、ストア上で検証できる
    let entry = ledger.latest(&signer.address()).unwrap();
    assert_eq!(entry.record, LedgerRecord::from_reference(&second.reference));
    assert_eq!(entry.record, second.record);
    assert_eq!(ledger.entries().len(), 2);
    store.verify(&second.reference).await.unwrap();
    assert!(store.is_public(second.reference.identity()).await.unwrap());

    let payload = entry.record.to_payload().unwrap();
    let signature = hex::decode(&entry.signature).unwrap();
    assert!(verify_signature(&entry.address, &payload, &signature));
}
