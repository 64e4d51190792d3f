//! LedgerRecord - 台帳に書き込むポインタ
//!
//! # 不変条件
//! - content_hash / commit_token は upload が返した参照そのもの
//! - コミットされるレコードでは両方とも空でない

use serde::{Deserialize, Serialize};

use super::artifact::RemoteArtifactReference;

/// Current wire version of the record schema.
pub const RECORD_VERSION: u16 = 1;

/// LedgerRecord は台帳上のコミットメント本体
///
/// ワイヤ形式は camelCase の JSON:
/// `{"version":1,"namespace":..,"name":..,"contentHash":..,"commitToken":..,"competitionId":..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    version: u16,
    namespace: String,
    name: String,
    content_hash: String,
    commit_token: String,
    competition_id: String,
}

impl LedgerRecord {
    /// upload の戻り値からレコードを作る（`from_payload` は台帳から読み戻すときだけ使う）
    pub fn from_reference(reference: &RemoteArtifactReference) -> Self {
        let identity = reference.identity();
        Self {
            version: RECORD_VERSION,
            namespace: identity.namespace().to_string(),
            name: identity.name().to_string(),
            content_hash: reference.content_hash().to_string(),
            commit_token: reference.commit_token().to_string(),
            competition_id: identity.competition_id().to_string(),
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn commit_token(&self) -> &str {
        &self.commit_token
    }

    pub fn competition_id(&self) -> &str {
        &self.competition_id
    }

    /// すべての必須フィールドが埋まっているか
    pub fn is_complete(&self) -> bool {
        !self.namespace.is_empty()
            && !self.name.is_empty()
            && !self.content_hash.is_empty()
            && !self.commit_token.is_empty()
            && !self.competition_id.is_empty()
    }

    /// 署名対象のバイト列
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelIdentity;

    fn reference() -> RemoteArtifactReference {
        let identity = ModelIdentity::from_repo_id("jdoe/finetuned", "c1").unwrap();
        RemoteArtifactReference::new(identity, "ab12", "01HZX")
    }

    #[test]
    fn record_copies_reference_fields() {
        let reference = reference();
        let record = LedgerRecord::from_reference(&reference);

        assert_eq!(record.version, RECORD_VERSION);
        assert_eq!(record.namespace, "jdoe");
        assert_eq!(record.name, "finetuned");
        assert_eq!(record.content_hash, reference.content_hash());
        assert_eq!(record.commit_token, reference.commit_token());
        assert_eq!(record.competition_id, "c1");
        assert!(record.is_complete());
    }

    #[test]
    fn payload_uses_camel_case_schema() {
        let record = LedgerRecord::from_reference(&reference());
        let value: serde_json::Value = serde_json::from_slice(&record.to_payload().unwrap()).unwrap();

        assert_eq!(value["contentHash"], "ab12");
        assert_eq!(value["commitToken"], "01HZX");
        assert_eq!(value["competitionId"], "c1");
        assert_eq!(LedgerRecord::from_payload(&record.to_payload().unwrap()).unwrap(), record);
    }

    #[test]
    fn decoded_record_keeps_wire_fields() {
        let raw = br#"{"version":1,"namespace":"jdoe","name":"finetuned","contentHash":"ab12","commitToken":"01HZX","competitionId":"c1"}"#;
        let record = LedgerRecord::from_payload(raw).unwrap();

        assert_eq!(record, LedgerRecord::from_reference(&reference()));
        assert_eq!(record.version(), RECORD_VERSION);
        assert_eq!(record.content_hash(), "ab12");
    }

    #[test]
    fn empty_hash_is_incomplete() {
        let mut record = LedgerRecord::from_reference(&reference());
        record.content_hash.clear();
        assert!(!record.is_complete());
    }
}
