//! LocalArtifactStore - ファイルシステム上のコンテンツアドレス型ストア
//!
//! # レイアウト
//! ```text
//! <root>/<namespace>/<name>/repo.json                 所有者・公開状態・コミット一覧
//! <root>/<namespace>/<name>/commits/<commit_token>/   保存されたファイル
//! <root>/<namespace>/<name>/manifests/<commit_token>.json
//! ```
//!
//! # 実装詳細
//! - 新しいリポジトリは非公開で作られる
//! - コピーは staging ディレクトリに行い、完了後に rename で commits/ に昇格する
//! - content hash は保存後のファイルから計算する（＝取得可能なバイト列のハッシュ）
//! - 所有者はアクセストークンの SHA-256 の先頭 16 桁で識別する
//! - ファイル I/O は spawn_blocking で実行する

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use ulid::Ulid;
use walkdir::WalkDir;

use crate::domain::{CompetitionParameters, ModelIdentity, RemoteArtifactReference};
use crate::ports::{ArtifactStore, StoreError};
use crate::validator::ValidatedArtifact;

const REPO_FILE: &str = "repo.json";
const COMMITS_DIR: &str = "commits";
const MANIFESTS_DIR: &str = "manifests";

#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    pub root: PathBuf,
    /// Bearer credential; identifies the repository owner.
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RepoState {
    owner: String,
    public: bool,
    head: Option<String>,
    commits: Vec<String>,
}

/// One stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitManifest {
    pub commit_token: String,
    pub content_hash: String,
    pub total_bytes: u64,
    pub files: Vec<ManifestEntry>,
}

pub struct LocalArtifactStore {
    root: PathBuf,
    owner: String,
}

impl LocalArtifactStore {
    pub fn new(config: LocalStoreConfig) -> Result<Self, StoreError> {
        if config.access_token.is_empty() {
            return Err(StoreError::Unauthorized(
                "<missing access token>".to_string(),
            ));
        }
        Ok(Self {
            root: config.root,
            owner: owner_fingerprint(&config.access_token),
        })
    }

    fn repo_dir(&self, identity: &ModelIdentity) -> PathBuf {
        repo_dir(&self.root, identity)
    }

    /// 保存済みコミットのハッシュを再計算して参照と一致するか確認する
    pub async fn verify(&self, reference: &RemoteArtifactReference) -> Result<(), StoreError> {
        let commit_dir = self
            .repo_dir(reference.identity())
            .join(COMMITS_DIR)
            .join(reference.commit_token());
        let expected = reference.content_hash().to_string();
        let repo_id = reference.identity().repo_id();

        blocking(move || {
            if !commit_dir.is_dir() {
                return Err(StoreError::RepositoryNotFound(repo_id));
            }
            let (files, _) = manifest_of(&commit_dir).map_err(transfer)?;
            let actual = content_hash(&files);
            if actual != expected {
                return Err(StoreError::Transfer(format!(
                    "content hash mismatch for {repo_id}: stored {actual}, referenced {expected}"
                )));
            }
            Ok(())
        })
        .await
    }

    pub async fn is_public(&self, identity: &ModelIdentity) -> Result<bool, StoreError> {
        let dir = self.repo_dir(identity);
        let repo_id = identity.repo_id();
        blocking(move || {
            read_repo(&dir)?
                .map(|state| state.public)
                .ok_or(StoreError::RepositoryNotFound(repo_id))
        })
        .await
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(
        &self,
        artifact: &ValidatedArtifact,
        parameters: &CompetitionParameters,
    ) -> Result<RemoteArtifactReference, StoreError> {
        let identity = artifact.descriptor().identity.clone();
        let source = artifact.local_path().to_path_buf();
        let dir = self.repo_dir(&identity);
        let owner = self.owner.clone();
        let limit = parameters.max_model_bytes;

        blocking(move || {
            let repo_id = identity.repo_id();
            let mut state = read_repo(&dir)?.unwrap_or_else(|| RepoState {
                owner: owner.clone(),
                public: false,
                head: None,
                commits: Vec::new(),
            });
            if state.owner != owner {
                return Err(StoreError::Unauthorized(repo_id));
            }

            let size = tree_size(&source).map_err(transfer)?;
            if size > limit {
                return Err(StoreError::Quota { size, limit });
            }

            let commit_token = Ulid::new().to_string();
            let staging = dir.join(format!(".staging-{commit_token}"));
            let commit_dir = dir.join(COMMITS_DIR).join(&commit_token);
            let copied = copy_tree(&source, &staging)
                .and_then(|()| fs::create_dir_all(dir.join(COMMITS_DIR)))
                .and_then(|()| fs::rename(&staging, &commit_dir));
            if let Err(e) = copied {
                let _ = fs::remove_dir_all(&staging);
                return Err(transfer(e));
            }

            let manifest_path = dir.join(MANIFESTS_DIR).join(format!("{commit_token}.json"));
            let manifest =
                match record_commit(&dir, &commit_dir, &manifest_path, &commit_token, &mut state) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        // repo.json から辿れない commit は残さない
                        let _ = fs::remove_dir_all(&commit_dir);
                        let _ = fs::remove_file(&manifest_path);
                        return Err(e);
                    }
                };

            debug!(repo = %repo_id, commit = %commit_token, bytes = manifest.total_bytes, "stored commit");
            Ok(RemoteArtifactReference::new(
                identity,
                manifest.content_hash,
                commit_token,
            ))
        })
        .await
    }

    async fn set_visibility(
        &self,
        identity: &ModelIdentity,
        public: bool,
    ) -> Result<(), StoreError> {
        let dir = self.repo_dir(identity);
        let repo_id = identity.repo_id();
        let owner = self.owner.clone();

        blocking(move || {
            let mut state =
                read_repo(&dir)?.ok_or_else(|| StoreError::RepositoryNotFound(repo_id.clone()))?;
            if state.owner != owner {
                return Err(StoreError::Unauthorized(repo_id));
            }
            if state.public != public {
                state.public = public;
                write_json(&dir.join(REPO_FILE), &state)?;
            }
            Ok(())
        })
        .await
    }
}

/// 昇格済みの commit について manifest を書き、repo.json の head を進める
fn record_commit(
    dir: &Path,
    commit_dir: &Path,
    manifest_path: &Path,
    commit_token: &str,
    state: &mut RepoState,
) -> Result<CommitManifest, StoreError> {
    let (files, total_bytes) = manifest_of(commit_dir).map_err(transfer)?;
    let manifest = CommitManifest {
        commit_token: commit_token.to_string(),
        content_hash: content_hash(&files),
        total_bytes,
        files,
    };
    write_json(manifest_path, &manifest)?;

    state.head = Some(commit_token.to_string());
    state.commits.push(commit_token.to_string());
    write_json(&dir.join(REPO_FILE), state)?;
    Ok(manifest)
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Transfer(format!("store task failed: {e}")))?
}

fn transfer(e: io::Error) -> StoreError {
    StoreError::Transfer(e.to_string())
}

fn repo_dir(root: &Path, identity: &ModelIdentity) -> PathBuf {
    root.join(identity.namespace()).join(identity.name())
}

fn owner_fingerprint(token: &str) -> String {
    let digest = hex::encode(Sha256::digest(token.as_bytes()));
    digest[..16].to_string()
}

fn read_repo(dir: &Path) -> Result<Option<RepoState>, StoreError> {
    match fs::read(dir.join(REPO_FILE)) {
        Ok(raw) => serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::Transfer(format!("corrupt {REPO_FILE}: {e}"))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(transfer(e)),
    }
}

/// tmp に書いてから rename する
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Transfer(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(transfer)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).map_err(transfer)?;
    fs::rename(&tmp, path).map_err(transfer)
}

/// `root` 配下のファイルを相対パス順に列挙する（symlink は辿る）
fn files_under(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn tree_size(root: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for (_, path) in files_under(root)? {
        total += fs::metadata(&path)?.len();
    }
    Ok(total)
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for (rel, path) in files_under(source)? {
        let target = dest.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&path, &target)?;
    }
    Ok(())
}

fn manifest_of(root: &Path) -> io::Result<(Vec<ManifestEntry>, u64)> {
    let mut entries = Vec::new();
    let mut total = 0u64;
    for (rel, path) in files_under(root)? {
        let mut file = fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let size = io::copy(&mut file, &mut hasher)?;
        total += size;
        entries.push(ManifestEntry {
            path: rel,
            size,
            sha256: hex::encode(hasher.finalize()),
        });
    }
    Ok((entries, total))
}

/// manifest 全体のハッシュ。1 行 `path \t size \t sha256 \n` を順に連結したものの SHA-256。
fn content_hash(files: &[ManifestEntry]) -> String {
    let mut hasher = Sha256::new();
    for f in files {
        hasher.update(f.path.as_bytes());
        hasher.update(b"\t");
        hasher.update(f.size.to_string().as_bytes());
        hasher.update(b"\t");
        hasher.update(f.sha256.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelArtifactDescriptor;
    use crate::validator::{
        ArtifactValidator, GENERATION_CONFIG_FILE, MODEL_CONFIG_FILE, SHARD_INDEX_FILE,
        SPECIAL_TOKENS_MAP_FILE, TOKENIZER_FILE,
    };

    fn model_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("model-00001-of-00001.safetensors"), vec![7u8; 4096]).unwrap();
        for f in [
            TOKENIZER_FILE,
            MODEL_CONFIG_FILE,
            GENERATION_CONFIG_FILE,
            SPECIAL_TOKENS_MAP_FILE,
        ] {
            fs::write(p.join(f), b"{}").unwrap();
        }
        fs::write(p.join(SHARD_INDEX_FILE), r#"{"metadata":{"total_size":4096}}"#).unwrap();
        dir
    }

    fn validated(dir: &Path) -> ValidatedArtifact {
        let identity = ModelIdentity::from_repo_id("jdoe/finetuned", "c1").unwrap();
        ArtifactValidator::new()
            .validate(ModelArtifactDescriptor::new(identity, dir))
            .unwrap()
    }

    fn params(max_model_bytes: u64) -> CompetitionParameters {
        CompetitionParameters {
            competition_id: "c1".into(),
            max_model_bytes,
            description: String::new(),
        }
    }

    fn store(root: &Path, token: &str) -> LocalArtifactStore {
        LocalArtifactStore::new(LocalStoreConfig {
            root: root.to_path_buf(),
            access_token: token.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn upload_returns_verifiable_reference() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path(), "token");

        let reference = store.upload(&validated(model.path()), &params(1 << 20)).await.unwrap();

        assert!(reference.is_complete());
        assert_eq!(reference.identity().repo_id(), "jdoe/finetuned");
        store.verify(&reference).await.unwrap();
        let stored = root
            .path()
            .join("jdoe/finetuned/commits")
            .join(reference.commit_token())
            .join("model-00001-of-00001.safetensors");
        assert_eq!(fs::read(stored).unwrap(), vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn same_bytes_hash_the_same_across_commits() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path(), "token");
        let artifact = validated(model.path());

        let first = store.upload(&artifact, &params(1 << 20)).await.unwrap();
        let second = store.upload(&artifact, &params(1 << 20)).await.unwrap();

        assert_eq!(first.content_hash(), second.content_hash());
        assert_ne!(first.commit_token(), second.commit_token());
    }

    #[tokio::test]
    async fn tampered_commit_fails_verification() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path(), "token");
        let reference = store.upload(&validated(model.path()), &params(1 << 20)).await.unwrap();

        let stored = root
            .path()
            .join("jdoe/finetuned/commits")
            .join(reference.commit_token())
            .join(TOKENIZER_FILE);
        fs::write(stored, b"{\"changed\":true}").unwrap();

        assert!(matches!(store.verify(&reference).await, Err(StoreError::Transfer(_))));
    }

    #[tokio::test]
    async fn quota_is_enforced() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path(), "token");

        let err = store.upload(&validated(model.path()), &params(100)).await.unwrap_err();

        assert!(matches!(err, StoreError::Quota { limit: 100, .. }));
        assert!(!root.path().join("jdoe/finetuned/commits").exists());
    }

    #[tokio::test]
    async fn failed_bookkeeping_leaves_no_orphan_commit() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join("jdoe/finetuned");
        fs::create_dir_all(&repo).unwrap();
        // manifests/ を作れないようにする
        fs::write(repo.join(MANIFESTS_DIR), b"").unwrap();
        let store = store(root.path(), "token");

        let err = store.upload(&validated(model.path()), &params(1 << 20)).await.unwrap_err();

        assert!(matches!(err, StoreError::Transfer(_)));
        assert_eq!(fs::read_dir(repo.join(COMMITS_DIR)).unwrap().count(), 0);
        assert!(!repo.join(REPO_FILE).exists());
    }

    #[tokio::test]
    async fn new_repositories_are_private_until_flipped() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path(), "token");
        let reference = store.upload(&validated(model.path()), &params(1 << 20)).await.unwrap();

        assert!(!store.is_public(reference.identity()).await.unwrap());
        store.set_visibility(reference.identity(), true).await.unwrap();
        assert!(store.is_public(reference.identity()).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_credential_is_rejected() {
        let model = model_dir();
        let root = tempfile::tempdir().unwrap();
        let artifact = validated(model.path());
        store(root.path(), "alice").upload(&artifact, &params(1 << 20)).await.unwrap();

        let mallory = store(root.path(), "mallory");
        let err = mallory.upload(&artifact, &params(1 << 20)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(repo) if repo == "jdoe/finetuned"));

        let err = mallory
            .set_visibility(&artifact.descriptor().identity, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn visibility_on_unknown_repository_fails() {
        let root = tempfile::tempdir().unwrap();
        let identity = ModelIdentity::from_repo_id("jdoe/missing", "c1").unwrap();

        let err = store(root.path(), "token")
            .set_visibility(&identity, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RepositoryNotFound(_)));
    }

    #[test]
    fn empty_token_is_rejected() {
        let result = LocalArtifactStore::new(LocalStoreConfig {
            root: PathBuf::from("/tmp"),
            access_token: String::new(),
        });
        assert!(matches!(result, Err(StoreError::Unauthorized(_))));
    }
}
