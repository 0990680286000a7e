//! Persisted document shapes.
//!
//! Three schema versions are understood: the current flat revision document, the
//! nested (deep) document where responses embed their child conversations, and the
//! legacy question/answer scatter-chart document, which is read-only input.

use serde::{Deserialize, Serialize};
use tracing::warn;

fn conversation_type() -> String {
    "conversation".to_string()
}

fn response_type() -> String {
    "response".to_string()
}

/// Shallow projection of a response: own fields plus neighbour ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    #[serde(rename = "type", default = "response_type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub children_ids: Vec<String>,
}

/// Conversations list their responses and parents either as bare ids or as shallow
/// response records. Records are what the serializer writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseRef {
    Id(String),
    Record(ResponseRecord),
}

impl ResponseRef {
    pub fn id(&self) -> &str {
        match self {
            ResponseRef::Id(id) => id,
            ResponseRef::Record(record) => &record.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    #[serde(rename = "type", default = "conversation_type")]
    pub kind: String,
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub expression_url: String,
    #[serde(default)]
    pub expression_name: String,
    #[serde(rename = "hasParents", default)]
    pub has_parents: bool,
    #[serde(rename = "hasChildren", default)]
    pub has_children: bool,
    #[serde(default)]
    pub responses: Vec<ResponseRef>,
    #[serde(default)]
    pub parents: Vec<ResponseRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub points: f64,
    pub conversation_id: String,
    pub response_id: String,
}

/// Current flat revision schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionDocument {
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
    #[serde(default)]
    pub responses: Vec<ResponseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<RelationshipRecord>>,
}

/// Deep projection of a conversation, expanded down to the leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedConversation {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "conversation_type")]
    pub kind: String,
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub expression_url: String,
    #[serde(default)]
    pub expression_name: String,
    #[serde(rename = "hasChildren", default)]
    pub has_children: bool,
    #[serde(default)]
    pub response_children: Vec<NestedResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedResponse {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "response_type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "hasChildren", default)]
    pub has_children: bool,
    #[serde(default)]
    pub conversation_children: Vec<NestedConversation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyAnswer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "move", default)]
    pub movement: [f64; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyQuestion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub position: [f64; 2],
    #[serde(default)]
    pub answers: Vec<LegacyAnswer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyDocument {
    #[serde(default)]
    pub questions: Vec<LegacyQuestion>,
}

/// Construction input handed over by the host page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub character: String,
    #[serde(rename = "scenarioData", default, skip_serializing_if = "Option::is_none")]
    pub scenario_data: Option<RevisionDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<LegacyQuestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedConversation>,
}

/// Which schema the graph is built from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioSource {
    Fresh,
    Current(RevisionDocument),
    Nested(NestedConversation),
    Legacy(Vec<LegacyQuestion>),
}

impl EditorConfig {
    pub fn fresh(character: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            ..Default::default()
        }
    }

    /// A revision with a relationships section selects the current schema; otherwise
    /// legacy questions are migrated; with neither, a fresh single-root graph is made.
    pub fn source(&self) -> ScenarioSource {
        if let Some(doc) = &self.scenario_data {
            if doc.relationships.is_some() {
                return ScenarioSource::Current(doc.clone());
            }
        }
        if let Some(questions) = &self.questions {
            return ScenarioSource::Legacy(questions.clone());
        }
        if let Some(nested) = &self.nested {
            return ScenarioSource::Nested(nested.clone());
        }
        if self.scenario_data.is_some() {
            warn!("scenario data has no relationships section and no legacy questions; starting fresh");
        }
        ScenarioSource::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_prefers_current_schema() {
        let config: EditorConfig = serde_json::from_str(
            r#"{"character":"ava","scenarioData":{"conversations":[],"responses":[],"relationships":[]},"questions":[]}"#,
        )
        .unwrap();
        assert!(matches!(config.source(), ScenarioSource::Current(_)));
    }

    #[test]
    fn missing_relationships_falls_back_to_legacy() {
        let config: EditorConfig = serde_json::from_str(
            r#"{"character":"ava","scenarioData":{"conversations":[]},"questions":[{"text":"hi","position":[0,0],"answers":[]}]}"#,
        )
        .unwrap();
        match config.source() {
            ScenarioSource::Legacy(questions) => assert_eq!(questions.len(), 1),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn empty_config_is_fresh() {
        assert_eq!(EditorConfig::fresh("ava").source(), ScenarioSource::Fresh);
    }

    #[test]
    fn response_refs_accept_ids_and_records() {
        let record: ConversationRecord = serde_json::from_str(
            r#"{"id":"c1","depth":1,"responses":["r1",{"id":"r2","text":"yes","parent_id":"c1","children_ids":[]}]}"#,
        )
        .unwrap();
        let ids: Vec<&str> = record.responses.iter().map(ResponseRef::id).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(record.kind, "conversation");
        assert!(record.parents.is_empty());
    }

    #[test]
    fn legacy_answer_reads_move_field() {
        let answer: LegacyAnswer = serde_json::from_str(r#"{"text":"ok","move":[0.5,-0.25]}"#).unwrap();
        assert_eq!(answer.movement, [0.5, -0.25]);
        assert!(answer.id.is_empty());
    }
}
