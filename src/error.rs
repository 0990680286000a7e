use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("To continue, please make sure each conversation belongs to at least one response block.")]
    OrphanConversations(Vec<String>),
    #[error("Please make sure each response connect at least one sub conversation.")]
    DeadEndResponses(Vec<String>),
    #[error("Each conversation can not have more than {limit} responses.")]
    MaxResponsesReached { conversation: String, limit: usize },
    #[error("This connecting will cause conversations playback, please select another one.")]
    WouldCreateCycle { conversation: String, response: String },
    #[error("A conversation can not be connected to one of its own responses.")]
    SelfLoop { conversation: String, response: String },
    #[error("The starting conversation can not have a parent response.")]
    RootHasNoParent,
    #[error("This response has sub-conversations, you need to remove them before deleting.")]
    ResponseHasChildren(String),
    #[error("This conversation has sub-conversations, please remove them first.")]
    ConversationHasSubConversations(String),
    #[error("This conversation still has responses, please remove them first.")]
    ConversationHasResponses(String),
    #[error("You need to connect this conversation to another response before deleting this relationship.")]
    LastParentRelationship(String),
    #[error("The starting conversation can not be removed.")]
    CannotRemoveRoot,
    #[error("operation cancelled")]
    Cancelled,
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("response not found: {0}")]
    ResponseNotFound(String),
    #[error("relationship not found: {0}")]
    RelationshipNotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EditorError {
    /// Recoverable failures: the user action is aborted and the offenders flagged.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EditorError::OrphanConversations(_)
                | EditorError::DeadEndResponses(_)
                | EditorError::MaxResponsesReached { .. }
                | EditorError::WouldCreateCycle { .. }
                | EditorError::SelfLoop { .. }
                | EditorError::RootHasNoParent
                | EditorError::ResponseHasChildren(_)
                | EditorError::ConversationHasSubConversations(_)
                | EditorError::ConversationHasResponses(_)
                | EditorError::LastParentRelationship(_)
                | EditorError::CannotRemoveRoot
        )
    }

    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            EditorError::ConversationNotFound(_)
                | EditorError::ResponseNotFound(_)
                | EditorError::RelationshipNotFound(_)
        )
    }

    /// Ids the rendering surface should flag red for this failure.
    pub fn offenders(&self) -> Vec<String> {
        match self {
            EditorError::OrphanConversations(ids) | EditorError::DeadEndResponses(ids) => ids.clone(),
            EditorError::MaxResponsesReached { conversation, .. } => vec![conversation.clone()],
            EditorError::WouldCreateCycle { conversation, response }
            | EditorError::SelfLoop { conversation, response } => {
                vec![conversation.clone(), response.clone()]
            }
            EditorError::ResponseHasChildren(id)
            | EditorError::ConversationHasSubConversations(id)
            | EditorError::ConversationHasResponses(id)
            | EditorError::LastParentRelationship(id) => vec![id.clone()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_and_lookup_are_disjoint() {
        let cycle = EditorError::WouldCreateCycle {
            conversation: "c".into(),
            response: "r".into(),
        };
        assert!(cycle.is_validation());
        assert!(!cycle.is_lookup_miss());
        assert_eq!(cycle.offenders(), vec!["c".to_string(), "r".to_string()]);

        let miss = EditorError::ResponseNotFound("r".into());
        assert!(miss.is_lookup_miss());
        assert!(!miss.is_validation());
        assert!(miss.offenders().is_empty());
    }

    #[test]
    fn messages_match_editor_prompts() {
        let err = EditorError::MaxResponsesReached {
            conversation: "c".into(),
            limit: 4,
        };
        assert_eq!(err.to_string(), "Each conversation can not have more than 4 responses.");
    }
}
