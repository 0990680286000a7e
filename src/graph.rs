//! The live dialogue graph.
//!
//! Entities live in id-indexed maps owned by [`Scenario`]; links between them are plain
//! id lists on the entities. Every mutation performs its checks before touching the
//! maps, so a failed call leaves the graph exactly as it was.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, error, info};

use crate::constants::{MAX_RESPONSES_COUNT, ROOT_DEPTH, UNATTACHED_DEPTH};
use crate::error::{EditorError, Result};
use crate::ids::{IdGenerator, UuidIds};
use crate::model::{next_expression, Conversation, RelationshipLine, Response};
use crate::validate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    pub character: String,
    pub max_responses: usize,
}

impl ScenarioSettings {
    pub fn new(character: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            max_responses: MAX_RESPONSES_COUNT,
        }
    }
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self::new(String::new())
    }
}

pub(crate) fn missing_conversation(id: &str) -> EditorError {
    error!("conversation {id} is not part of the scenario");
    EditorError::ConversationNotFound(id.to_string())
}

pub(crate) fn missing_response(id: &str) -> EditorError {
    error!("response {id} is not part of the scenario");
    EditorError::ResponseNotFound(id.to_string())
}

pub(crate) fn missing_relationship(id: &str) -> EditorError {
    error!("relationship {id} is not part of the scenario");
    EditorError::RelationshipNotFound(id.to_string())
}

pub struct Scenario {
    settings: ScenarioSettings,
    ids: Box<dyn IdGenerator>,
    root: String,
    conversations: HashMap<String, Conversation>,
    conversation_order: Vec<String>,
    responses: HashMap<String, Response>,
    response_order: Vec<String>,
    relationships: HashMap<String, RelationshipLine>,
    relationship_order: Vec<String>,
    version: u64,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("settings", &self.settings)
            .field("root", &self.root)
            .field("conversations", &self.conversation_order.len())
            .field("responses", &self.response_order.len())
            .field("relationships", &self.relationship_order.len())
            .field("version", &self.version)
            .finish()
    }
}

impl Scenario {
    /// A graph holding only an empty root conversation.
    pub fn new(settings: ScenarioSettings, ids: Box<dyn IdGenerator>) -> Self {
        let mut scenario = Self::empty(settings, ids);
        let root = scenario.next_id();
        let conversation = Conversation::new(root.clone(), ROOT_DEPTH, &scenario.settings.character);
        scenario.insert_conversation(conversation);
        scenario.root = root;
        scenario
    }

    pub fn with_character(character: impl Into<String>) -> Self {
        Self::new(ScenarioSettings::new(character), Box::new(UuidIds))
    }

    pub(crate) fn empty(settings: ScenarioSettings, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            settings,
            ids,
            root: String::new(),
            conversations: HashMap::new(),
            conversation_order: Vec::new(),
            responses: HashMap::new(),
            response_order: Vec::new(),
            relationships: HashMap::new(),
            relationship_order: Vec::new(),
            version: 0,
        }
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    pub fn character(&self) -> &str {
        &self.settings.character
    }

    /// Bumped by every mutation; consumers compare it to detect stale derived state.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    pub fn next_id(&mut self) -> String {
        loop {
            let id = self.ids.next_id();
            if !self.conversations.contains_key(&id) && !self.responses.contains_key(&id) {
                return id;
            }
        }
    }

    // ---------------- Lookups ----------------

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> Result<&Conversation> {
        self.conversation(&self.root)
    }

    pub fn is_root(&self, conversation_id: &str) -> bool {
        self.root == conversation_id
    }

    pub fn get_conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn conversation(&self, id: &str) -> Result<&Conversation> {
        self.conversations.get(id).ok_or_else(|| missing_conversation(id))
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations.get_mut(id).ok_or_else(|| missing_conversation(id))
    }

    pub fn get_response(&self, id: &str) -> Option<&Response> {
        self.responses.get(id)
    }

    pub fn response(&self, id: &str) -> Result<&Response> {
        self.responses.get(id).ok_or_else(|| missing_response(id))
    }

    fn response_mut(&mut self, id: &str) -> Result<&mut Response> {
        self.responses.get_mut(id).ok_or_else(|| missing_response(id))
    }

    pub fn get_relationship(&self, id: &str) -> Option<&RelationshipLine> {
        self.relationships.get(id)
    }

    pub fn relationship(&self, id: &str) -> Result<&RelationshipLine> {
        self.relationships.get(id).ok_or_else(|| missing_relationship(id))
    }

    pub fn relationship_between(&self, conversation_id: &str, response_id: &str) -> Option<&RelationshipLine> {
        self.relationships
            .get(&RelationshipLine::combined_id(conversation_id, response_id))
            .or_else(|| {
                self.relationships
                    .values()
                    .find(|line| line.conversation() == conversation_id && line.response() == response_id)
            })
    }

    /// Conversations in creation order.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> + '_ {
        self.conversation_order
            .iter()
            .filter_map(|id| self.conversations.get(id))
    }

    pub fn responses(&self) -> impl Iterator<Item = &Response> + '_ {
        self.response_order.iter().filter_map(|id| self.responses.get(id))
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipLine> + '_ {
        self.relationship_order
            .iter()
            .filter_map(|id| self.relationships.get(id))
    }

    pub fn conversation_count(&self) -> usize {
        self.conversation_order.len()
    }

    pub fn response_count(&self) -> usize {
        self.response_order.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationship_order.len()
    }

    /// Owning conversation of a response.
    pub fn owner_of(&self, response_id: &str) -> Result<&Conversation> {
        let response = self.response(response_id)?;
        self.conversation(response.parent())
    }

    pub fn is_connected(&self, conversation_id: &str, response_id: &str) -> bool {
        self.responses
            .get(response_id)
            .is_some_and(|response| response.children().iter().any(|id| id == conversation_id))
    }

    // ---------------- Raw insertion (builders) ----------------

    pub(crate) fn set_root(&mut self, id: impl Into<String>) {
        self.root = id.into();
    }

    pub(crate) fn insert_conversation(&mut self, conversation: Conversation) {
        let id = conversation.id().to_string();
        if self.conversations.insert(id.clone(), conversation).is_none() {
            self.conversation_order.push(id);
        }
    }

    pub(crate) fn conversation_entry(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub(crate) fn insert_response(&mut self, response: Response) {
        let id = response.id().to_string();
        if self.responses.insert(id.clone(), response).is_none() {
            self.response_order.push(id);
        }
    }

    pub(crate) fn response_entry(&mut self, id: &str) -> Option<&mut Response> {
        self.responses.get_mut(id)
    }

    /// Existing lines win; re-adding a pair keeps the original colour and values.
    pub(crate) fn insert_relationship(&mut self, line: RelationshipLine) -> String {
        if let Some(existing) = self.relationships.values().find(|existing| {
            existing.conversation() == line.conversation() && existing.response() == line.response()
        }) {
            return existing.id().to_string();
        }
        let id = line.id().to_string();
        if self.relationships.insert(id.clone(), line).is_none() {
            self.relationship_order.push(id.clone());
        }
        id
    }

    /// Links both sides of an edge without any checks.
    pub(crate) fn link(&mut self, conversation_id: &str, response_id: &str) {
        if let Some(response) = self.responses.get_mut(response_id) {
            response.add_conversation(conversation_id);
        }
        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            conversation.add_parent(response_id);
        }
    }

    fn remove_relationships_touching(&mut self, id: &str) {
        let relationships = &mut self.relationships;
        self.relationship_order.retain(|line_id| {
            let keep = relationships.get(line_id).is_some_and(|line| !line.touches(id));
            if !keep {
                relationships.remove(line_id);
            }
            keep
        });
    }

    fn remove_relationship_pair(&mut self, conversation_id: &str, response_id: &str) {
        let relationships = &mut self.relationships;
        self.relationship_order.retain(|line_id| {
            let keep = relationships
                .get(line_id)
                .is_some_and(|line| !(line.conversation() == conversation_id && line.response() == response_id));
            if !keep {
                relationships.remove(line_id);
            }
            keep
        });
    }

    fn drop_conversation(&mut self, id: &str) {
        self.conversations.remove(id);
        self.conversation_order.retain(|existing| existing != id);
    }

    fn drop_response(&mut self, id: &str) {
        self.responses.remove(id);
        self.response_order.retain(|existing| existing != id);
    }

    // ---------------- Mutations ----------------

    /// Creates an unattached conversation.
    pub fn add_conversation(&mut self) -> String {
        let id = self.next_id();
        let conversation = Conversation::new(id.clone(), UNATTACHED_DEPTH, &self.settings.character);
        self.insert_conversation(conversation);
        self.touch();
        debug!("added conversation {id}");
        id
    }

    pub fn add_response(&mut self, conversation_id: &str, text: impl Into<String>) -> Result<String> {
        let limit = self.settings.max_responses;
        if self.conversation(conversation_id)?.is_max_responses_reached(limit) {
            return Err(EditorError::MaxResponsesReached {
                conversation: conversation_id.to_string(),
                limit,
            });
        }
        let id = self.next_id();
        self.insert_response(Response::new(id.clone(), conversation_id, text));
        self.conversation_mut(conversation_id)?.add_response(&id);
        self.touch();
        debug!("added response {id} to {conversation_id}");
        Ok(id)
    }

    pub fn remove_response(&mut self, response_id: &str) -> Result<()> {
        validate::check_response_removal(self, response_id)?;
        let parent = self.response(response_id)?.parent().to_string();
        if let Some(owner) = self.conversations.get_mut(&parent) {
            owner.remove_response(response_id);
        }
        self.remove_relationships_touching(response_id);
        self.drop_response(response_id);
        self.touch();
        debug!("removed response {response_id}");
        Ok(())
    }

    /// Makes `conversation_id` a child of `response_id` and returns the relationship id.
    ///
    /// The conversation's depth becomes the larger of its current depth and one below the
    /// response's owner; descendants are pushed down accordingly. Connecting under a
    /// response whose owner is itself unattached leaves the depth untouched.
    pub fn connect(&mut self, conversation_id: &str, response_id: &str) -> Result<String> {
        validate::check_connection(self, conversation_id, response_id)?;
        let owner_depth = self.owner_of(response_id)?.depth();

        self.link(conversation_id, response_id);
        let line_id = self.insert_relationship(RelationshipLine::new(conversation_id, response_id));

        if owner_depth > UNATTACHED_DEPTH {
            let conversation = self.conversation_mut(conversation_id)?;
            let depth = conversation.depth().max(owner_depth.saturating_add(1));
            conversation.set_depth(depth);
            self.deepen(conversation_id);
        }
        self.touch();
        debug!("connected {conversation_id} under {response_id}");
        Ok(line_id)
    }

    /// Creates a new conversation directly under `response_id`.
    pub fn add_outcome(&mut self, response_id: &str) -> Result<String> {
        let owner_depth = self.owner_of(response_id)?.depth();
        let id = self.next_id();
        let depth = if owner_depth > UNATTACHED_DEPTH {
            owner_depth.saturating_add(1)
        } else {
            UNATTACHED_DEPTH
        };
        let conversation = Conversation::new(id.clone(), depth, &self.settings.character);
        self.insert_conversation(conversation);
        self.link(&id, response_id);
        self.insert_relationship(RelationshipLine::new(&id, response_id));
        self.touch();
        debug!("added outcome {id} under {response_id}");
        Ok(id)
    }

    /// Removes one parent edge. The conversation must keep at least one other parent.
    pub fn disconnect(&mut self, conversation_id: &str, response_id: &str) -> Result<()> {
        let conversation = self.conversation(conversation_id)?;
        self.response(response_id)?;
        if !self.is_connected(conversation_id, response_id) {
            return Err(missing_relationship(&RelationshipLine::combined_id(
                conversation_id,
                response_id,
            )));
        }
        if !conversation.has_multi_parents() {
            return Err(EditorError::LastParentRelationship(conversation_id.to_string()));
        }

        if let Some(response) = self.responses.get_mut(response_id) {
            response.remove_conversation(conversation_id);
        }
        self.remove_relationship_pair(conversation_id, response_id);
        self.conversation_mut(conversation_id)?.remove_parent(response_id);
        self.reattach_depth(conversation_id);
        self.touch();
        debug!("disconnected {conversation_id} from {response_id}");
        Ok(())
    }

    pub fn remove_relationship(&mut self, relationship_id: &str) -> Result<()> {
        let line = self.relationship(relationship_id)?;
        let (conversation, response) = (line.conversation().to_string(), line.response().to_string());
        self.disconnect(&conversation, &response)
    }

    /// Removes a conversation that owns no responses, together with its parent links.
    pub fn remove_conversation(&mut self, conversation_id: &str) -> Result<()> {
        validate::check_conversation_removal(self, conversation_id)?;
        self.detach_and_drop(conversation_id);
        self.touch();
        debug!("removed conversation {conversation_id}");
        Ok(())
    }

    /// Removes a conversation, its responses, and every descendant that is left without
    /// any parent response. Returns the removed conversation ids.
    pub fn remove_subtree(&mut self, conversation_id: &str) -> Result<Vec<String>> {
        self.conversation(conversation_id)?;
        if self.is_root(conversation_id) {
            return Err(EditorError::CannotRemoveRoot);
        }

        let mut removed = Vec::new();
        let mut survivors = HashSet::new();
        let mut pending = vec![conversation_id.to_string()];
        while let Some(current) = pending.pop() {
            let Some(conversation) = self.conversations.get(&current) else {
                continue;
            };
            let owned: Vec<String> = conversation.responses().to_vec();
            for response_id in owned {
                let children: Vec<String> = self
                    .responses
                    .get(&response_id)
                    .map(|response| response.children().to_vec())
                    .unwrap_or_default();
                for child in children {
                    if let Some(child_conversation) = self.conversations.get_mut(&child) {
                        child_conversation.remove_parent(&response_id);
                        if child_conversation.has_parents() || child == self.root {
                            survivors.insert(child.clone());
                        } else {
                            survivors.remove(&child);
                            pending.push(child.clone());
                        }
                    }
                }
                self.remove_relationships_touching(&response_id);
                self.drop_response(&response_id);
            }
            self.detach_and_drop(&current);
            removed.push(current);
        }

        let mut survivors: Vec<String> = survivors.into_iter().collect();
        survivors.sort();
        for survivor in survivors {
            if self.conversations.contains_key(&survivor) {
                self.reattach_depth(&survivor);
            }
        }
        self.touch();
        info!("removed {} conversation(s) with {conversation_id}", removed.len());
        Ok(removed)
    }

    fn detach_and_drop(&mut self, conversation_id: &str) {
        let parents: Vec<String> = self
            .conversations
            .get(conversation_id)
            .map(|conversation| conversation.parents().to_vec())
            .unwrap_or_default();
        for parent in parents {
            if let Some(response) = self.responses.get_mut(&parent) {
                response.remove_conversation(conversation_id);
            }
        }
        self.remove_relationships_touching(conversation_id);
        self.drop_conversation(conversation_id);
    }

    /// Depth follows the deepest attached owner among the remaining parents, then
    /// descendants are pushed down to match.
    fn reattach_depth(&mut self, conversation_id: &str) {
        let Some(conversation) = self.conversations.get(conversation_id) else {
            return;
        };
        let deepest_owner = conversation
            .parents()
            .iter()
            .filter_map(|parent| self.responses.get(parent))
            .filter_map(|response| self.conversations.get(response.parent()))
            .map(Conversation::depth)
            .filter(|depth| *depth > UNATTACHED_DEPTH)
            .max();
        let Some(owner_depth) = deepest_owner else {
            return;
        };
        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            conversation.set_depth(owner_depth.saturating_add(1));
        }
        self.deepen(conversation_id);
    }

    /// Pushes descendants of `start` down so each sits below its deepest attached parent.
    /// Depths never exceed the conversation count, which bounds the walk on cyclic input.
    fn deepen(&mut self, start: &str) {
        let cap = self.conversation_count() as i32;
        let mut stack = vec![start.to_string()];
        while let Some(current) = stack.pop() {
            let Some(conversation) = self.conversations.get(&current) else {
                continue;
            };
            let depth = conversation.depth();
            if depth <= UNATTACHED_DEPTH || depth >= cap {
                continue;
            }
            let next_depth = depth + 1;
            let children: Vec<String> = conversation
                .responses()
                .iter()
                .filter_map(|id| self.responses.get(id))
                .flat_map(|response| response.children().iter().cloned())
                .collect();
            for child in children {
                if let Some(child_conversation) = self.conversations.get_mut(&child) {
                    if child_conversation.depth() < next_depth {
                        child_conversation.set_depth(next_depth);
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// Recomputes every depth as the longest path from the root. Conversations not
    /// reachable from the root become unattached.
    pub fn refresh_depths(&mut self) {
        let root = self.root.clone();
        for (id, conversation) in self.conversations.iter_mut() {
            conversation.set_depth(if *id == root { ROOT_DEPTH } else { UNATTACHED_DEPTH });
        }
        self.deepen(&root);
        self.touch();
    }

    // ---------------- Field edits ----------------

    pub fn set_context(&mut self, conversation_id: &str, context: impl Into<String>) -> Result<()> {
        self.conversation_mut(conversation_id)?.set_context(context);
        self.touch();
        Ok(())
    }

    pub fn set_response_text(&mut self, response_id: &str, text: impl Into<String>) -> Result<()> {
        self.response_mut(response_id)?.set_text(text);
        self.touch();
        Ok(())
    }

    pub fn set_relationship_values(&mut self, relationship_id: &str, weight: f64, points: f64) -> Result<()> {
        let line = self
            .relationships
            .get_mut(relationship_id)
            .ok_or_else(|| missing_relationship(relationship_id))?;
        line.set_weight(weight);
        line.set_points(points);
        self.touch();
        Ok(())
    }

    /// Advances the conversation to the next expression and returns its name.
    pub fn cycle_expression(&mut self, conversation_id: &str) -> Result<String> {
        let character = self.settings.character.clone();
        let conversation = self.conversation_mut(conversation_id)?;
        let next = next_expression(conversation.expression_name());
        conversation.set_expression_name(&character, next);
        self.touch();
        Ok(next.to_string())
    }

    pub fn set_expression(&mut self, conversation_id: &str, expression_name: &str) -> Result<()> {
        let character = self.settings.character.clone();
        self.conversation_mut(conversation_id)?
            .set_expression_name(&character, expression_name);
        self.touch();
        Ok(())
    }

    pub fn set_character(&mut self, character: impl Into<String>) {
        self.settings.character = character.into();
        for conversation in self.conversations.values_mut() {
            conversation.update_expression(&self.settings.character);
        }
        self.touch();
        info!("character set to {}", self.settings.character);
    }
}
