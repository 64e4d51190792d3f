//! Model identity.

use std::fmt;

use serde::Serialize;

/// Separator between namespace and name in a remote repository id.
pub const REPO_ID_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid repo id {0:?}: expected exactly one '/' between a non-empty namespace and name")]
    InvalidRepoId(String),

    #[error("competition id must not be empty")]
    EmptyCompetitionId,
}

/// Identifies a model independently of where its bytes live.
///
/// Fields are private so the non-empty invariants hold for every value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModelIdentity {
    namespace: String,
    name: String,
    competition_id: String,
}

impl ModelIdentity {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        competition_id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let namespace = namespace.into();
        let name = name.into();
        let competition_id = competition_id.into();
        if namespace.is_empty()
            || name.is_empty()
            || namespace.contains(REPO_ID_SEPARATOR)
            || name.contains(REPO_ID_SEPARATOR)
        {
            return Err(IdentityError::InvalidRepoId(format!(
                "{namespace}{REPO_ID_SEPARATOR}{name}"
            )));
        }
        if competition_id.is_empty() {
            return Err(IdentityError::EmptyCompetitionId);
        }
        Ok(Self {
            namespace,
            name,
            competition_id,
        })
    }

    /// Parse `namespace/name` and attach the competition.
    pub fn from_repo_id(repo_id: &str, competition_id: &str) -> Result<Self, IdentityError> {
        let (namespace, name) = repo_id
            .split_once(REPO_ID_SEPARATOR)
            .ok_or_else(|| IdentityError::InvalidRepoId(repo_id.to_string()))?;
        Self::new(namespace, name, competition_id)
            .map_err(|e| match e {
                IdentityError::InvalidRepoId(_) => IdentityError::InvalidRepoId(repo_id.to_string()),
                other => other,
            })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn competition_id(&self) -> &str {
        &self.competition_id
    }

    pub fn repo_id(&self) -> String {
        format!("{}{}{}", self.namespace, REPO_ID_SEPARATOR, self.name)
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.repo_id(), self.competition_id)
    }
}
