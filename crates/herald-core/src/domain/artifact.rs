//! Artifact descriptors: the local directory and the remote reference.

use std::path::{Path, PathBuf};

use super::identity::ModelIdentity;

/// A local, not yet validated model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifactDescriptor {
    pub identity: ModelIdentity,
    pub local_path: PathBuf,
}

impl ModelArtifactDescriptor {
    pub fn new(identity: ModelIdentity, local_path: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            local_path: local_path.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}

/// Durable reference to an uploaded artifact.
///
/// Only an `ArtifactStore::upload` implementation should construct one: a
/// reference asserts that the bytes behind `content_hash` / `commit_token`
/// are retrievable from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifactReference {
    identity: ModelIdentity,
    content_hash: String,
    commit_token: String,
}

impl RemoteArtifactReference {
    pub fn new(
        identity: ModelIdentity,
        content_hash: impl Into<String>,
        commit_token: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            content_hash: content_hash.into(),
            commit_token: commit_token.into(),
        }
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn commit_token(&self) -> &str {
        &self.commit_token
    }

    /// Both halves of the content reference are present.
    pub fn is_complete(&self) -> bool {
        !self.content_hash.is_empty() && !self.commit_token.is_empty()
    }
}
