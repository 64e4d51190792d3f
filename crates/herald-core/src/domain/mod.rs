//! Domain model (identity, artifact, record, competition, errors).
//!
//! データは一方向にだけ流れる:
//! ローカルディレクトリ → ValidatedArtifact → RemoteArtifactReference → LedgerRecord

pub mod identity;
pub mod artifact;
pub mod record;
pub mod competition;
pub mod errors;

pub use self::identity::{IdentityError, ModelIdentity};
pub use self::artifact::{ModelArtifactDescriptor, RemoteArtifactReference};
pub use self::record::{LedgerRecord, RECORD_VERSION};
pub use self::competition::{CompetitionParameters, CompetitionSchedule, ScheduleError};
pub use self::errors::ErrorKind;
