//! Records persisted by the node besides patients: match records, peer nodes, clients and
//! pending asynchronous queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Patient;

/// Type of a match record.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MatchType {
    /// Match against the local patients.
    Internal,
    /// Match against the patients of peer nodes.
    External,
    /// Late results posted back by a peer node.
    ExternalAsync,
}

/// Reference to a node, either this node or a peer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, derive_new::new)]
pub struct NodeRef {
    pub id: String,
    pub label: String,
}

/// Score of a match result.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default, derive_new::new)]
pub struct Score {
    /// Combined score in `[0, 1]`, named `patient` in the MME API.
    #[serde(rename = "patient")]
    pub combined: f64,
    /// Genotype part of the score.
    #[serde(rename = "_genotype", default)]
    pub genotype: f64,
    /// Phenotype part of the score.
    #[serde(rename = "_phenotype", default)]
    pub phenotype: f64,
}

/// One matching patient with its score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub score: Score,
    pub patient: Patient,
}

/// Results returned by one node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultGroup {
    pub node: NodeRef,
    pub patients: Vec<MatchResult>,
}

/// Error reported while querying a node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MatchError {
    pub node: NodeRef,
    pub message: String,
}

/// The outcome of one matching operation, as stored in the `matches` collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// Unique ID of the record.
    pub id: uuid::Uuid,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Whether at least one result group contains at least one patient.
    pub has_matches: bool,
    /// Type of the match.
    pub match_type: MatchType,
    /// ID of the query patient.
    pub query_patient_id: String,
    /// The query patient, absent for records of type `external-async`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Patient>,
    /// Result groups, one per answering node.
    #[serde(default)]
    pub results: Vec<ResultGroup>,
    /// Errors that occured while querying peers.
    #[serde(default)]
    pub errors: Vec<MatchError>,
}

impl MatchRecord {
    /// Create a new record with fresh ID and timestamp; `has_matches` is derived from `results`.
    pub fn new(
        match_type: MatchType,
        query_patient_id: String,
        query: Option<Patient>,
        results: Vec<ResultGroup>,
        errors: Vec<MatchError>,
    ) -> Self {
        let has_matches = results.iter().any(|group| !group.patients.is_empty());
        Self {
            id: uuid::Uuid::new_v4(),
            created: Utc::now(),
            has_matches,
            match_type,
            query_patient_id,
            query,
            results,
            errors,
        }
    }

    /// Whether the patient with the given ID is the query patient or one of the results.
    pub fn involves_patient(&self, patient_id: &str) -> bool {
        self.query_patient_id == patient_id
            || self
                .results
                .iter()
                .flat_map(|group| group.patients.iter())
                .any(|result| result.patient.id == patient_id)
    }

    /// The patients of all result groups.
    pub fn result_patients(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().flat_map(|group| group.patients.iter())
    }
}

/// A federated peer node.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PeerNode {
    pub id: String,
    pub label: String,
    /// Token sent in the `X-Auth-Token` header of outbound requests.
    pub auth_token: String,
    /// URL of the `/match` endpoint of the peer.
    pub matching_url: String,
    /// Content type sent to the peer.
    pub accepted_content: String,
    pub contact: Option<String>,
    pub created: DateTime<Utc>,
}

impl PeerNode {
    /// Reference to the node for result groups and errors.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.id.clone(), self.label.clone())
    }
}

/// A client authorized to call the API.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    /// Token expected in the `X-Auth-Token` header of inbound requests.
    pub auth_token: String,
    pub base_url: Option<String>,
    pub contact: Option<String>,
    pub created: DateTime<Utc>,
}

/// An outbound query that a peer answered with a deferred query ID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAsyncQuery {
    pub query_id: String,
    pub query_patient_id: String,
    pub node: NodeRef,
    pub created: DateTime<Utc>,
}

/// Body of a match request, sent to `/match` of this node and of peers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub patient: Patient,
}

/// Body of a match response.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchResponse {
    pub results: Vec<MatchResult>,
    pub disclaimer: Option<String>,
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::test::patient;

    fn result(id: &str, score: f64) -> MatchResult {
        MatchResult {
            score: Score::new(score, score, 0.0),
            patient: patient(id, &[], &[]),
        }
    }

    #[rstest::rstest]
    #[case(MatchType::Internal, "internal")]
    #[case(MatchType::External, "external")]
    #[case(MatchType::ExternalAsync, "external-async")]
    fn match_type_names(#[case] match_type: MatchType, #[case] name: &str) -> Result<(), anyhow::Error> {
        assert_eq!(match_type.to_string(), name);
        assert_eq!(name.parse::<MatchType>()?, match_type);
        assert_eq!(
            serde_json::to_value(match_type)?,
            serde_json::Value::String(name.to_string())
        );
        Ok(())
    }

    #[test]
    fn has_matches_derived_from_results() {
        let node = NodeRef::new("node".into(), "Node".into());
        let empty = MatchRecord::new(
            MatchType::Internal,
            "P1".into(),
            None,
            vec![ResultGroup {
                node: node.clone(),
                patients: vec![],
            }],
            vec![],
        );
        assert!(!empty.has_matches);

        let full = MatchRecord::new(
            MatchType::Internal,
            "P1".into(),
            None,
            vec![ResultGroup {
                node,
                patients: vec![result("P2", 0.5)],
            }],
            vec![],
        );
        assert!(full.has_matches);
        assert!(full.involves_patient("P1"));
        assert!(full.involves_patient("P2"));
        assert!(!full.involves_patient("P3"));
        assert_eq!(full.result_patients().count(), 1);
    }

    #[test]
    fn score_wire_names() -> Result<(), anyhow::Error> {
        let value = serde_json::to_value(Score::new(0.75, 0.5, 0.25))?;
        assert_eq!(
            value,
            serde_json::json!({"patient": 0.75, "_genotype": 0.5, "_phenotype": 0.25})
        );

        let peer_score: Score = serde_json::from_str(r#"{"patient": 0.4}"#)?;
        assert_eq!(peer_score, Score::new(0.4, 0.0, 0.0));

        Ok(())
    }
}
