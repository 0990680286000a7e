//! Editing session.
//!
//! Every user action runs validation, then confirmation, then mutation, then relayout.
//! A failed check or a declined prompt returns before anything is mutated.

use std::collections::HashMap;

use bevy::math::Vec2;
use tracing::{debug, info, warn};

use crate::builder::ScenarioBuilder;
use crate::constants::{NodeMarks, MAX_ZOOM, MIN_ZOOM, UNATTACHED_DEPTH};
use crate::error::{EditorError, Result};
use crate::graph::Scenario;
use crate::ids::IdGenerator;
use crate::layout::{LayoutConfig, LayoutEngine};
use crate::revision;
use crate::schema::{EditorConfig, RevisionDocument};
use crate::validate;

pub const CONFIRM_REMOVE_RESPONSE: &str = "Are you sure you want to delete this response?";
pub const CONFIRM_REMOVE_CONVERSATION: &str = "Are you sure you want to delete this conversation?";
pub const CONFIRM_REMOVE_SUBTREE: &str =
    "Delete this conversation and every conversation that can only be reached through it?";
pub const CONFIRM_REMOVE_RELATIONSHIP: &str = "Are you sure you want to delete this relationship?";

/// Yes/no prompt shown before destructive actions.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug)]
pub struct Editor {
    scenario: Scenario,
    layout: LayoutEngine,
    marks: HashMap<String, NodeMarks>,
    zoom: f32,
    compiled: Option<(u64, RevisionDocument)>,
    editing_relationship: Option<String>,
}

impl Editor {
    pub fn new(scenario: Scenario, layout: LayoutConfig) -> Self {
        let mut editor = Self {
            scenario,
            layout: LayoutEngine::new(layout),
            marks: HashMap::new(),
            zoom: MAX_ZOOM,
            compiled: None,
            editing_relationship: None,
        };
        editor.relayout();
        editor
    }

    pub fn from_config(config: &EditorConfig, layout: LayoutConfig, ids: Box<dyn IdGenerator>) -> Self {
        Self::new(ScenarioBuilder::from_config(config, ids), layout)
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> (&Scenario, &mut LayoutEngine) {
        (&self.scenario, &mut self.layout)
    }

    pub fn marks(&self, id: &str) -> NodeMarks {
        self.marks.get(id).copied().unwrap_or_default()
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoom
    }

    pub fn editing_relationship(&self) -> Option<&str> {
        self.editing_relationship.as_deref()
    }

    // ---------------- Structure ----------------

    pub fn add_conversation(&mut self) -> String {
        if self.zoom < MAX_ZOOM {
            self.zoom = MAX_ZOOM;
        }
        let id = self.scenario.add_conversation();
        self.relayout();
        id
    }

    pub fn add_response(&mut self, conversation_id: &str, text: &str) -> Result<String> {
        let result = self
            .require_no_orphans()
            .and_then(|_| self.scenario.add_response(conversation_id, text));
        let id = self.flag(result)?;
        self.relayout();
        Ok(id)
    }

    pub fn add_outcome(&mut self, response_id: &str) -> Result<String> {
        let id = self.scenario.add_outcome(response_id)?;
        self.relayout();
        Ok(id)
    }

    pub fn remove_response(&mut self, response_id: &str, confirm: &mut dyn Confirm) -> Result<()> {
        let checked = self
            .require_no_orphans()
            .and_then(|_| validate::check_response_removal(&self.scenario, response_id));
        self.flag(checked)?;
        if !confirm.confirm(CONFIRM_REMOVE_RESPONSE) {
            return Err(EditorError::Cancelled);
        }
        self.scenario.remove_response(response_id)?;
        self.relayout();
        Ok(())
    }

    /// Hangs a conversation under a response. Rejected connections flag both ends.
    pub fn connect(&mut self, conversation_id: &str, response_id: &str) -> Result<String> {
        let result = self.scenario.connect(conversation_id, response_id);
        let line = self.flag(result)?;
        self.relayout();
        Ok(line)
    }

    pub fn remove_relationship(&mut self, relationship_id: &str, confirm: &mut dyn Confirm) -> Result<()> {
        let checked = self.scenario.relationship(relationship_id).and_then(|line| {
            let conversation = self.scenario.conversation(line.conversation())?;
            if conversation.has_multi_parents() {
                Ok(())
            } else {
                Err(EditorError::LastParentRelationship(conversation.id().to_string()))
            }
        });
        self.flag(checked)?;
        if !confirm.confirm(CONFIRM_REMOVE_RELATIONSHIP) {
            return Err(EditorError::Cancelled);
        }
        self.scenario.remove_relationship(relationship_id)?;
        if self.editing_relationship.as_deref() == Some(relationship_id) {
            self.editing_relationship = None;
        }
        self.relayout();
        Ok(())
    }

    /// Attached conversations need a clean graph and a confirmation; orphans go at once.
    pub fn remove_conversation(&mut self, conversation_id: &str, confirm: &mut dyn Confirm) -> Result<()> {
        let checked = validate::check_conversation_removal(&self.scenario, conversation_id);
        self.flag(checked)?;
        let attached = self.scenario.conversation(conversation_id)?.depth() > UNATTACHED_DEPTH;
        if attached {
            let orphans = self.require_no_orphans();
            self.flag(orphans)?;
            if !confirm.confirm(CONFIRM_REMOVE_CONVERSATION) {
                return Err(EditorError::Cancelled);
            }
        }
        self.scenario.remove_conversation(conversation_id)?;
        self.marks.remove(conversation_id);
        self.relayout();
        Ok(())
    }

    pub fn remove_subtree(&mut self, conversation_id: &str, confirm: &mut dyn Confirm) -> Result<Vec<String>> {
        self.scenario.conversation(conversation_id)?;
        if self.scenario.is_root(conversation_id) {
            return self.flag(Err(EditorError::CannotRemoveRoot));
        }
        if !confirm.confirm(CONFIRM_REMOVE_SUBTREE) {
            return Err(EditorError::Cancelled);
        }
        let removed = self.scenario.remove_subtree(conversation_id)?;
        for id in &removed {
            self.marks.remove(id);
        }
        self.relayout();
        Ok(removed)
    }

    /// Throws away manual drags and lays the graph out again.
    pub fn tidy(&mut self) -> Result<()> {
        let checked = self.require_no_orphans();
        self.flag(checked)?;
        self.relayout();
        Ok(())
    }

    // ---------------- Field edits ----------------

    pub fn set_context(&mut self, conversation_id: &str, context: &str) -> Result<()> {
        self.scenario.set_context(conversation_id, context)
    }

    pub fn set_response_text(&mut self, response_id: &str, text: &str) -> Result<()> {
        self.scenario.set_response_text(response_id, text)
    }

    pub fn cycle_expression(&mut self, conversation_id: &str) -> Result<String> {
        self.scenario.cycle_expression(conversation_id)
    }

    pub fn set_character(&mut self, character: &str) {
        self.scenario.set_character(character);
    }

    /// Opens the weight/points editor of a relationship and returns the current values.
    pub fn begin_relationship_edit(&mut self, relationship_id: &str) -> Result<(f64, f64)> {
        let line = self.scenario.relationship(relationship_id)?;
        let values = (line.weight(), line.points());
        if let Some(previous) = self.editing_relationship.replace(relationship_id.to_string()) {
            self.unmark(&previous, NodeMarks::EDITING);
        }
        self.mark(relationship_id, NodeMarks::EDITING);
        Ok(values)
    }

    pub fn set_relationship_values(&mut self, relationship_id: &str, weight: f64, points: f64) -> Result<()> {
        self.scenario.set_relationship_values(relationship_id, weight, points)
    }

    pub fn end_relationship_edit(&mut self) {
        if let Some(previous) = self.editing_relationship.take() {
            self.unmark(&previous, NodeMarks::EDITING);
        }
    }

    // ---------------- Drag ----------------

    pub fn drag_start(&mut self, conversation_id: &str) -> Result<Vec2> {
        let origin = self.layout.drag_start(conversation_id)?;
        self.mark(conversation_id, NodeMarks::ACTIVE);
        Ok(origin)
    }

    /// `delta` is in screen pixels and is scaled by the current zoom.
    pub fn drag_move(&mut self, delta: Vec2) -> Option<Vec2> {
        self.layout.drag_move(&self.scenario, delta / self.zoom)
    }

    pub fn drag_end(&mut self) -> Option<Vec2> {
        let position = self.layout.drag_end(&self.scenario);
        for marks in self.marks.values_mut() {
            marks.remove(NodeMarks::ACTIVE);
        }
        position
    }

    // ---------------- Save ----------------

    /// Validates for save, then compiles and caches the revision.
    pub fn finish(&mut self) -> Result<RevisionDocument> {
        let checked = validate::validate_for_save(&self.scenario);
        self.flag(checked)?;
        let doc = revision::to_revision(&self.scenario);
        self.compiled = Some((self.scenario.version(), doc.clone()));
        info!("scenario compiled at version {}", self.scenario.version());
        Ok(doc)
    }

    /// Revision of the current graph, compiled only when the graph changed.
    pub fn compiled_revision(&mut self) -> &RevisionDocument {
        let version = self.scenario.version();
        let stale = !matches!(&self.compiled, Some((compiled_at, _)) if *compiled_at == version);
        if stale {
            debug!("recompiling revision at version {version}");
            self.compiled = None;
        }
        let (_, doc) = self
            .compiled
            .get_or_insert_with(|| (version, revision::to_revision(&self.scenario)));
        doc
    }

    // ---------------- Internals ----------------

    fn require_no_orphans(&self) -> Result<()> {
        validate::check_orphans(&self.scenario)
    }

    fn flag<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_validation() {
                warn!("{err}");
                for id in err.offenders() {
                    self.mark(&id, NodeMarks::ERROR);
                }
            }
        }
        result
    }

    fn mark(&mut self, id: &str, mark: NodeMarks) {
        self.marks.entry(id.to_string()).or_default().insert(mark);
    }

    fn unmark(&mut self, id: &str, mark: NodeMarks) {
        if let Some(marks) = self.marks.get_mut(id) {
            marks.remove(mark);
        }
    }

    /// Full layout plus connector decoration. Error flags from earlier attempts clear.
    fn relayout(&mut self) {
        self.layout.layout(&self.scenario);

        let mut marks: HashMap<String, NodeMarks> = HashMap::new();
        for conversation in self.scenario.conversations() {
            let mut mark = NodeMarks::empty();
            if self.scenario.is_root(conversation.id()) {
                mark |= NodeMarks::START;
            }
            if conversation.has_multi_parents() {
                mark |= NodeMarks::MULTI;
            } else if conversation.has_parents() {
                mark |= NodeMarks::SINGLE;
            }
            marks.insert(conversation.id().to_string(), mark);
        }
        for response in self.scenario.responses() {
            let mark = if response.has_multi_children() {
                NodeMarks::MULTI
            } else if response.has_children() {
                NodeMarks::SINGLE
            } else {
                NodeMarks::empty()
            };
            marks.insert(response.id().to_string(), mark);
        }
        if let Some(editing) = &self.editing_relationship {
            marks.insert(editing.clone(), NodeMarks::EDITING);
        }
        self.marks = marks;
    }
}
