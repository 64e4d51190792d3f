//! ArtifactValidator - モデルディレクトリの検証
//!
//! 下流のローダーが必要とする最小ファイル集合が揃っているかを確認する。
//! 読み取り専用で、ディレクトリを修正することはない。
//!
//! # チェック順
//! 1. ディレクトリが存在する
//! 2. 重みファイル（`.safetensors`）が 1 つ以上ある
//! 3. `tokenizer.json`
//! 4. `config.json`
//! 5. `generation_config.json`
//! 6. `special_tokens_map.json`
//! 7. `model.safetensors.index.json` があり、`metadata.total_size` を含む

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::ModelArtifactDescriptor;

/// Extensions accepted as weight files.
pub const WEIGHT_EXTENSIONS: &[&str] = &["safetensors"];

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const MODEL_CONFIG_FILE: &str = "config.json";
pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";
pub const SPECIAL_TOKENS_MAP_FILE: &str = "special_tokens_map.json";
pub const SHARD_INDEX_FILE: &str = "model.safetensors.index.json";

/// One requirement of a loadable model directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactComponent {
    WeightFile,
    Tokenizer,
    ModelConfig,
    GenerationConfig,
    SpecialTokensMap,
    ShardIndex,
    /// The shard index exists but has no `metadata.total_size`.
    ShardIndexTotalSize,
}

impl fmt::Display for ArtifactComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactComponent::WeightFile => write!(f, "weight file (*.safetensors)"),
            ArtifactComponent::Tokenizer => write!(f, "{TOKENIZER_FILE}"),
            ArtifactComponent::ModelConfig => write!(f, "{MODEL_CONFIG_FILE}"),
            ArtifactComponent::GenerationConfig => write!(f, "{GENERATION_CONFIG_FILE}"),
            ArtifactComponent::SpecialTokensMap => write!(f, "{SPECIAL_TOKENS_MAP_FILE}"),
            ArtifactComponent::ShardIndex => write!(f, "{SHARD_INDEX_FILE}"),
            ArtifactComponent::ShardIndexTotalSize => {
                write!(f, "metadata.total_size in {SHARD_INDEX_FILE}")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("model directory {} not found", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("model directory {} is missing {component}", .path.display())]
    MissingArtifactComponent {
        path: PathBuf,
        component: ArtifactComponent,
    },

    #[error("model.safetensors.index.json in {} is not valid JSON: {source}", .path.display())]
    MalformedShardIndex {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ValidationError {
    /// The missing requirement, if that is what failed.
    pub fn missing_component(&self) -> Option<ArtifactComponent> {
        match self {
            ValidationError::MissingArtifactComponent { component, .. } => Some(*component),
            _ => None,
        }
    }
}

/// Pass branch of a validation: what was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub weight_files: Vec<String>,
    pub declared_total_size: u64,
}

/// A descriptor whose directory passed validation.
///
/// Only `ArtifactValidator::validate` produces this, and `ArtifactStore::upload`
/// only accepts this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedArtifact {
    descriptor: ModelArtifactDescriptor,
    report: ValidationReport,
}

impl ValidatedArtifact {
    pub fn descriptor(&self) -> &ModelArtifactDescriptor {
        &self.descriptor
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn local_path(&self) -> &Path {
        self.descriptor.local_path()
    }
}

/// ArtifactValidator はステートレス（呼び出し間で状態を持たない）
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactValidator;

impl ArtifactValidator {
    pub fn new() -> Self {
        Self
    }

    /// descriptor を消費して ValidatedArtifact を返す
    pub fn validate(
        &self,
        descriptor: ModelArtifactDescriptor,
    ) -> Result<ValidatedArtifact, ValidationError> {
        let report = self.check_dir(descriptor.local_path())?;
        Ok(ValidatedArtifact { descriptor, report })
    }

    /// ディレクトリを検査する。最初に満たされなかった要件で失敗する。
    pub fn check_dir(&self, dir: &Path) -> Result<ValidationReport, ValidationError> {
        if !dir.is_dir() {
            return Err(ValidationError::DirectoryNotFound(dir.to_path_buf()));
        }

        let files = list_files(dir)?;
        let missing = |component| ValidationError::MissingArtifactComponent {
            path: dir.to_path_buf(),
            component,
        };

        let weight_files: Vec<String> = files
            .iter()
            .filter(|name| is_weight_file(name))
            .cloned()
            .collect();
        if weight_files.is_empty() {
            return Err(missing(ArtifactComponent::WeightFile));
        }

        let required = [
            (TOKENIZER_FILE, ArtifactComponent::Tokenizer),
            (MODEL_CONFIG_FILE, ArtifactComponent::ModelConfig),
            (GENERATION_CONFIG_FILE, ArtifactComponent::GenerationConfig),
            (SPECIAL_TOKENS_MAP_FILE, ArtifactComponent::SpecialTokensMap),
            (SHARD_INDEX_FILE, ArtifactComponent::ShardIndex),
        ];
        for (file, component) in required {
            if !files.contains(file) {
                return Err(missing(component));
            }
        }

        let declared_total_size = read_total_size(&dir.join(SHARD_INDEX_FILE), dir)?
            .ok_or_else(|| missing(ArtifactComponent::ShardIndexTotalSize))?;

        Ok(ValidationReport {
            weight_files,
            declared_total_size,
        })
    }
}

fn list_files(dir: &Path) -> Result<BTreeSet<String>, ValidationError> {
    let io_err = |source| ValidationError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = BTreeSet::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        // symlink は辿った先がファイルなら受け入れる
        let is_file = std::fs::metadata(entry.path())
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_file && let Some(name) = entry.file_name().to_str() {
            files.insert(name.to_string());
        }
    }
    Ok(files)
}

fn is_weight_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| WEIGHT_EXTENSIONS.contains(&ext))
}

fn read_total_size(index_path: &Path, dir: &Path) -> Result<Option<u64>, ValidationError> {
    let raw = std::fs::read(index_path).map_err(|source| ValidationError::Io {
        path: index_path.to_path_buf(),
        source,
    })?;
    let index: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|source| ValidationError::MalformedShardIndex {
            path: dir.to_path_buf(),
            source,
        })?;
    Ok(index
        .get("metadata")
        .and_then(|m| m.get("total_size"))
        .and_then(|v| v.as_u64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelIdentity;
    use rstest::rstest;
    use std::fs;

    const INDEX_OK: &str = r#"{"metadata":{"total_size":1234},"weight_map":{}}"#;

    fn complete_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("model-00001-of-00001.safetensors"), b"weights").unwrap();
        fs::write(p.join(TOKENIZER_FILE), b"{}").unwrap();
        fs::write(p.join(MODEL_CONFIG_FILE), b"{}").unwrap();
        fs::write(p.join(GENERATION_CONFIG_FILE), b"{}").unwrap();
        fs::write(p.join(SPECIAL_TOKENS_MAP_FILE), b"{}").unwrap();
        fs::write(p.join(SHARD_INDEX_FILE), INDEX_OK).unwrap();
        dir
    }

    #[test]
    fn complete_directory_passes() {
        let dir = complete_dir();
        let report = ArtifactValidator::new().check_dir(dir.path()).unwrap();
        assert_eq!(report.weight_files, vec!["model-00001-of-00001.safetensors".to_string()]);
        assert_eq!(report.declared_total_size, 1234);
    }

    #[test]
    fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = ArtifactValidator::new().check_dir(&missing).unwrap_err();
        assert!(matches!(err, ValidationError::DirectoryNotFound(p) if p == missing));
    }

    #[rstest]
    #[case::weights("model-00001-of-00001.safetensors", ArtifactComponent::WeightFile)]
    #[case::tokenizer(TOKENIZER_FILE, ArtifactComponent::Tokenizer)]
    #[case::config(MODEL_CONFIG_FILE, ArtifactComponent::ModelConfig)]
    #[case::generation_config(GENERATION_CONFIG_FILE, ArtifactComponent::GenerationConfig)]
    #[case::special_tokens(SPECIAL_TOKENS_MAP_FILE, ArtifactComponent::SpecialTokensMap)]
    #[case::shard_index(SHARD_INDEX_FILE, ArtifactComponent::ShardIndex)]
    fn names_the_missing_component(#[case] file: &str, #[case] expected: ArtifactComponent) {
        let dir = complete_dir();
        fs::remove_file(dir.path().join(file)).unwrap();

        let err = ArtifactValidator::new().check_dir(dir.path()).unwrap_err();
        assert_eq!(err.missing_component(), Some(expected));
    }

    #[rstest]
    #[case::no_metadata(r#"{"weight_map":{}}"#)]
    #[case::no_total_size(r#"{"metadata":{"format":"pt"}}"#)]
    #[case::non_numeric(r#"{"metadata":{"total_size":"big"}}"#)]
    fn index_without_total_size_is_specific(#[case] index: &str) {
        let dir = complete_dir();
        fs::write(dir.path().join(SHARD_INDEX_FILE), index).unwrap();

        let err = ArtifactValidator::new().check_dir(dir.path()).unwrap_err();
        assert_eq!(err.missing_component(), Some(ArtifactComponent::ShardIndexTotalSize));
    }

    #[test]
    fn malformed_index_is_reported() {
        let dir = complete_dir();
        fs::write(dir.path().join(SHARD_INDEX_FILE), "{not json").unwrap();

        let err = ArtifactValidator::new().check_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedShardIndex { .. }));
    }

    #[test]
    fn generation_config_does_not_stand_in_for_config() {
        let dir = complete_dir();
        fs::remove_file(dir.path().join(MODEL_CONFIG_FILE)).unwrap();
        assert!(dir.path().join(GENERATION_CONFIG_FILE).exists());

        let err = ArtifactValidator::new().check_dir(dir.path()).unwrap_err();
        assert_eq!(err.missing_component(), Some(ArtifactComponent::ModelConfig));
    }

    #[test]
    fn weight_file_in_subdirectory_does_not_count() {
        let dir = complete_dir();
        fs::remove_file(dir.path().join("model-00001-of-00001.safetensors")).unwrap();
        fs::create_dir(dir.path().join("nested.safetensors")).unwrap();

        let err = ArtifactValidator::new().check_dir(dir.path()).unwrap_err();
        assert_eq!(err.missing_component(), Some(ArtifactComponent::WeightFile));
    }

    #[test]
    fn validation_is_idempotent() {
        let dir = complete_dir();
        let validator = ArtifactValidator::new();
        assert_eq!(
            validator.check_dir(dir.path()).unwrap(),
            validator.check_dir(dir.path()).unwrap()
        );

        fs::remove_file(dir.path().join(TOKENIZER_FILE)).unwrap();
        let first = validator.check_dir(dir.path()).unwrap_err();
        let second = validator.check_dir(dir.path()).unwrap_err();
        assert_eq!(first.missing_component(), second.missing_component());
    }

    #[test]
    fn validate_keeps_descriptor() {
        let dir = complete_dir();
        let identity = ModelIdentity::from_repo_id("jdoe/finetuned", "c1").unwrap();
        let descriptor = ModelArtifactDescriptor::new(identity.clone(), dir.path());

        let validated = ArtifactValidator::new().validate(descriptor).unwrap();
        assert_eq!(validated.descriptor().identity, identity);
        assert_eq!(validated.local_path(), dir.path());
    }
}
