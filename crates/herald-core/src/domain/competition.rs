//! Competition schedule and per-competition parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Competition used when none is selected.
pub const DEFAULT_COMPETITION_ID: &str = "original";

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown competition {id:?} (known: {known:?})")]
    UnknownCompetition { id: String, known: Vec<String> },

    #[error("duplicate competition {0:?} in schedule")]
    DuplicateCompetition(String),

    #[error("failed to read competition schedule: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse competition schedule: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters an uploaded artifact is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionParameters {
    pub competition_id: String,
    /// Upper bound for the sum of all file sizes in the artifact.
    pub max_model_bytes: u64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionSchedule {
    competitions: Vec<CompetitionParameters>,
}

impl CompetitionSchedule {
    pub fn new(competitions: Vec<CompetitionParameters>) -> Result<Self, ScheduleError> {
        for (i, c) in competitions.iter().enumerate() {
            if competitions[..i]
                .iter()
                .any(|other| other.competition_id == c.competition_id)
            {
                return Err(ScheduleError::DuplicateCompetition(c.competition_id.clone()));
            }
        }
        Ok(Self { competitions })
    }

    /// Schedule compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            competitions: vec![CompetitionParameters {
                competition_id: DEFAULT_COMPETITION_ID.to_string(),
                max_model_bytes: 32 * 1024 * 1024 * 1024,
                description: "Original roleplay track".to_string(),
            }],
        }
    }

    /// Load a schedule from a JSON file of the same shape as the serialized schedule.
    pub fn from_json_file(path: &Path) -> Result<Self, ScheduleError> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: CompetitionSchedule = serde_json::from_str(&raw)?;
        Self::new(parsed.competitions)
    }

    pub fn get(&self, competition_id: &str) -> Result<&CompetitionParameters, ScheduleError> {
        self.competitions
            .iter()
            .find(|c| c.competition_id == competition_id)
            .ok_or_else(|| ScheduleError::UnknownCompetition {
                id: competition_id.to_string(),
                known: self.ids(),
            })
    }

    pub fn ids(&self) -> Vec<String> {
        self.competitions
            .iter()
            .map(|c| c.competition_id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompetitionParameters> {
        self.competitions.iter()
    }
}

impl Default for CompetitionSchedule {
    fn default() -> Self {
        Self::builtin()
    }
}
