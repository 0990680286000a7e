//! Construction of a [`Scenario`] from each supported document schema.
//!
//! Builders never fail: missing optional fields fall back to defaults, dangling ids are
//! skipped with a warning, and a document without a root gets a fresh empty one.

use tracing::{info, warn};

use crate::constants::{LEGACY_CIRCLE_RADIUS, LEGACY_X_AXIS_RATE, ROOT_DEPTH, UNATTACHED_DEPTH};
use crate::graph::{Scenario, ScenarioSettings};
use crate::ids::{IdGenerator, UuidIds};
use crate::model::{Conversation, RelationshipLine, Response};
use crate::schema::{
    EditorConfig, LegacyQuestion, NestedConversation, RevisionDocument, ScenarioSource,
};
use crate::validate;

pub struct ScenarioBuilder {
    settings: ScenarioSettings,
    ids: Box<dyn IdGenerator>,
}

impl ScenarioBuilder {
    pub fn new(settings: ScenarioSettings, ids: Box<dyn IdGenerator>) -> Self {
        Self { settings, ids }
    }

    pub fn with_character(character: impl Into<String>) -> Self {
        Self::new(ScenarioSettings::new(character), Box::new(UuidIds))
    }

    pub fn from_config(config: &EditorConfig, ids: Box<dyn IdGenerator>) -> Scenario {
        Self::new(ScenarioSettings::new(config.character.clone()), ids).build(config.source())
    }

    pub fn build(self, source: ScenarioSource) -> Scenario {
        match source {
            ScenarioSource::Fresh => self.fresh(),
            ScenarioSource::Current(doc) => self.flat(&doc),
            ScenarioSource::Nested(nested) => self.recursive(&nested),
            ScenarioSource::Legacy(questions) => self.legacy(&questions),
        }
    }

    pub fn fresh(self) -> Scenario {
        Scenario::new(self.settings, self.ids)
    }

    /// Two passes over the flat lists: every conversation first, then responses wired to
    /// them by id. Record order is preserved so the serializer can reproduce the input.
    pub fn flat(self, doc: &RevisionDocument) -> Scenario {
        let mut scenario = Scenario::empty(self.settings, self.ids);
        let character = scenario.character().to_string();

        for record in &doc.conversations {
            if record.id.is_empty() || scenario.get_conversation(&record.id).is_some() {
                warn!("skipping conversation record with empty or duplicate id {:?}", record.id);
                continue;
            }
            let mut conversation = Conversation::new(record.id.clone(), record.depth, &character);
            conversation.set_context(record.context.clone());
            conversation.set_assets(&character, &record.expression_name, &record.expression_url);
            scenario.insert_conversation(conversation);
        }

        let root = doc
            .conversations
            .iter()
            .find(|record| record.depth == ROOT_DEPTH && scenario.get_conversation(&record.id).is_some())
            .map(|record| record.id.clone());
        match root {
            Some(root) => scenario.set_root(root),
            None => {
                warn!("revision has no root conversation; creating an empty one");
                attach_fresh_root(&mut scenario, &character);
            }
        }

        for record in &doc.responses {
            if record.id.is_empty() || scenario.get_response(&record.id).is_some() {
                warn!("skipping response record with empty or duplicate id {:?}", record.id);
                continue;
            }
            let Some(owner) = scenario.conversation_entry(&record.parent_id) else {
                warn!("response {} belongs to missing conversation {:?}", record.id, record.parent_id);
                continue;
            };
            owner.add_response(&record.id);
            scenario.insert_response(Response::new(record.id.clone(), record.parent_id.clone(), record.text.clone()));
        }

        for record in &doc.responses {
            if scenario.get_response(&record.id).is_none() {
                continue;
            }
            for child in &record.children_ids {
                if scenario.get_conversation(child).is_some() {
                    scenario.link(child, &record.id);
                } else {
                    warn!("response {} points at missing conversation {child}", record.id);
                }
            }
        }

        for record in &doc.conversations {
            let parents: Vec<String> = record.parents.iter().map(|r| r.id().to_string()).collect();
            for parent in &parents {
                if scenario.get_response(parent).is_some() {
                    scenario.link(&record.id, parent);
                }
            }
            let responses: Vec<String> = record.responses.iter().map(|r| r.id().to_string()).collect();
            if let Some(conversation) = scenario.conversation_entry(&record.id) {
                conversation.order_responses(&responses);
                conversation.order_parents(&parents);
            }
        }

        for record in doc.relationships.iter().flatten() {
            if scenario.get_conversation(&record.conversation_id).is_none()
                || scenario.get_response(&record.response_id).is_none()
            {
                warn!("relationship {} references missing entities", record.id);
                continue;
            }
            scenario.link(&record.conversation_id, &record.response_id);
            scenario.insert_relationship(RelationshipLine::with_values(
                record.id.clone(),
                &record.conversation_id,
                &record.response_id,
                record.weight,
                record.points,
            ));
        }
        fill_missing_relationships(&mut scenario);
        repair_depths(&mut scenario);

        info!(
            "built scenario with {} conversations, {} responses, {} relationships",
            scenario.conversation_count(),
            scenario.response_count(),
            scenario.relationship_count()
        );
        scenario
    }

    /// Depth-first walk of a nested document. A conversation id seen before resolves to
    /// the existing instance, so shared outcomes stay shared.
    pub fn recursive(self, nested: &NestedConversation) -> Scenario {
        let mut scenario = Scenario::empty(self.settings, self.ids);
        let character = scenario.character().to_string();

        let root = materialize_conversation(&mut scenario, nested, &character);
        scenario.set_root(root.clone());
        if let Some(conversation) = scenario.conversation_entry(&root) {
            if conversation.depth() != ROOT_DEPTH {
                warn!("nested root {root} stored depth {}; using {ROOT_DEPTH}", conversation.depth());
                conversation.set_depth(ROOT_DEPTH);
            }
        }
        fill_missing_relationships(&mut scenario);
        repair_depths(&mut scenario);

        info!(
            "built nested scenario with {} conversations, {} responses",
            scenario.conversation_count(),
            scenario.response_count()
        );
        scenario
    }

    /// Rebuilds edges from the legacy scatter chart: every answer links to each question
    /// whose position lies within [`LEGACY_CIRCLE_RADIUS`] of the answer's end point.
    pub fn legacy(self, questions: &[LegacyQuestion]) -> Scenario {
        if questions.is_empty() {
            warn!("legacy document has no questions; starting fresh");
            return self.fresh();
        }
        let mut scenario = Scenario::empty(self.settings, self.ids);
        let character = scenario.character().to_string();

        let mut question_ids = Vec::with_capacity(questions.len());
        for question in questions {
            let id = if question.id.is_empty() || scenario.get_conversation(&question.id).is_some() {
                scenario.next_id()
            } else {
                question.id.clone()
            };
            let mut conversation = Conversation::new(id.clone(), UNATTACHED_DEPTH, &character);
            conversation.set_context(question.text.clone());
            scenario.insert_conversation(conversation);
            question_ids.push(id);
        }

        let root_index = questions
            .iter()
            .position(|question| question.position[0].abs() < f64::EPSILON && question.position[1].abs() < f64::EPSILON)
            .unwrap_or(0);
        let root = question_ids[root_index].clone();
        scenario.set_root(root.clone());
        if let Some(conversation) = scenario.conversation_entry(&root) {
            conversation.set_depth(ROOT_DEPTH);
        }

        let mut candidates = Vec::new();
        for (question, owner) in questions.iter().zip(&question_ids) {
            for answer in &question.answers {
                let id = if answer.id.is_empty() || scenario.get_response(&answer.id).is_some() {
                    scenario.next_id()
                } else {
                    answer.id.clone()
                };
                if let Some(conversation) = scenario.conversation_entry(owner) {
                    conversation.add_response(&id);
                }
                scenario.insert_response(Response::new(id.clone(), owner.clone(), answer.text.clone()));

                let end = (
                    (question.position[0] + answer.movement[0]) * LEGACY_X_AXIS_RATE,
                    question.position[1] + answer.movement[1],
                );
                for (target, target_id) in questions.iter().zip(&question_ids) {
                    let dx = end.0 - target.position[0] * LEGACY_X_AXIS_RATE;
                    let dy = end.1 - target.position[1];
                    if (dx * dx + dy * dy).sqrt() <= LEGACY_CIRCLE_RADIUS {
                        candidates.push((target_id.clone(), id.clone()));
                    }
                }
            }
        }

        let mut rejected = 0;
        for (conversation_id, response_id) in &candidates {
            if let Err(err) = validate::check_connection(&scenario, conversation_id, response_id) {
                warn!("legacy link {response_id} -> {conversation_id} dropped: {err}");
                rejected += 1;
                continue;
            }
            scenario.link(conversation_id, response_id);
            scenario.insert_relationship(RelationshipLine::new(conversation_id, response_id));
        }
        scenario.refresh_depths();

        info!(
            "migrated {} questions and {} answers into {} relationships ({} rejected)",
            questions.len(),
            scenario.response_count(),
            scenario.relationship_count(),
            rejected
        );
        scenario
    }
}

fn attach_fresh_root(scenario: &mut Scenario, character: &str) {
    let id = scenario.next_id();
    scenario.insert_conversation(Conversation::new(id.clone(), ROOT_DEPTH, character));
    scenario.set_root(id);
}

fn materialize_conversation(scenario: &mut Scenario, node: &NestedConversation, character: &str) -> String {
    let id = if node.id.is_empty() {
        scenario.next_id()
    } else {
        node.id.clone()
    };
    if scenario.get_conversation(&id).is_some() {
        return id;
    }
    let mut conversation = Conversation::new(id.clone(), node.depth, character);
    conversation.set_context(node.context.clone());
    conversation.set_assets(character, &node.expression_name, &node.expression_url);
    scenario.insert_conversation(conversation);

    for response_node in &node.response_children {
        let response_id = if response_node.id.is_empty() {
            scenario.next_id()
        } else {
            response_node.id.clone()
        };
        if scenario.get_response(&response_id).is_some() {
            warn!("response {response_id} appears under more than one conversation; keeping the first");
            continue;
        }
        scenario.insert_response(Response::new(response_id.clone(), id.clone(), response_node.text.clone()));
        if let Some(owner) = scenario.conversation_entry(&id) {
            owner.add_response(&response_id);
        }
        for child in &response_node.conversation_children {
            let child_id = materialize_conversation(scenario, child, character);
            scenario.link(&child_id, &response_id);
        }
    }
    id
}

/// Every edge gets a line; edges loaded without one receive default values.
/// Stored depths outside `[-1, conversation count]` cannot come from the editor, so the
/// whole graph is re-leveled from the root instead of trusting any of them.
fn repair_depths(scenario: &mut Scenario) {
    let cap = scenario.conversation_count() as i32;
    let bad: Vec<String> = scenario
        .conversations()
        .filter(|conversation| conversation.depth() < UNATTACHED_DEPTH || conversation.depth() > cap)
        .map(|conversation| conversation.id().to_string())
        .collect();
    if bad.is_empty() {
        return;
    }
    warn!("stored depths out of range for {bad:?}; recomputing from the root");
    scenario.refresh_depths();
}

fn fill_missing_relationships(scenario: &mut Scenario) {
    let edges: Vec<(String, String)> = scenario
        .responses()
        .flat_map(|response| {
            response
                .children()
                .iter()
                .map(move |child| (child.clone(), response.id().to_string()))
        })
        .filter(|(conversation, response)| scenario.relationship_between(conversation, response).is_none())
        .collect();
    for (conversation, response) in edges {
        scenario.insert_relationship(RelationshipLine::new(&conversation, &response));
    }
}
