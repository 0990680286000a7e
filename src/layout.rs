//! Node placement and connector geometry.
//!
//! Conversations are laid out in columns by depth. Within a column each conversation is
//! stacked below the previous one, leaving room for the previous ones' response rows.
//! Anchor points and connector curves are memoized per node and per relationship; a
//! structural change throws every cache away, a drag only the moved node's entries.

use std::collections::{HashMap, HashSet};

use bevy::math::{Rect, Vec2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::CubicConnector;
use crate::constants::*;
use crate::error::Result;
use crate::graph::{missing_conversation, missing_response, Scenario};
use crate::model::{Conversation, RelationshipLine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f32,
    pub node_height: f32,
    pub response_height: f32,
    pub space_x: f32,
    pub space_y: f32,
    pub canvas_margin: f32,
    pub connector_width: f32,
    pub node_inset: f32,
    pub stack_step: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Position of the "add conversation" control; new unattached nodes appear near it.
    pub staging_anchor: [f32; 2],
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: CONVERSATION_WIDTH,
            node_height: CONVERSATION_HEIGHT,
            response_height: RESPONSE_HEIGHT,
            space_x: CONVERSATION_SPACE_X,
            space_y: CONVERSATION_SPACE_Y,
            canvas_margin: CANVAS_LEFT_TOP_SPACE,
            connector_width: CONVERSATION_CONNECTOR_WIDTH,
            node_inset: CONVERSATION_LEFT_TOP_OFFSET,
            stack_step: CONVERSATION_STACK_SPACE_TEMP,
            viewport_width: WINDOW_WIDTH,
            viewport_height: WINDOW_HEIGHT,
            staging_anchor: [WINDOW_WIDTH - 100.0, WINDOW_HEIGHT - 100.0],
        }
    }
}

impl LayoutConfig {
    pub fn column_width(&self) -> f32 {
        self.node_width + self.space_x
    }

    pub fn row_height(&self) -> f32 {
        self.node_height + self.space_y
    }

    pub fn viewport(&self) -> Vec2 {
        Vec2::new(self.viewport_width, self.viewport_height)
    }

    /// Full height of a conversation box including its response rows.
    pub fn node_extent(&self, responses: usize) -> Vec2 {
        Vec2::new(
            self.node_width + self.connector_width,
            self.node_height + responses as f32 * self.response_height,
        )
    }
}

/// Supplies connector anchor points. A rendering surface that knows where it actually
/// drew each node can stand in for the computed [`Geometry`].
pub trait AnchorSource {
    /// Incoming connector of a conversation.
    fn conversation_anchor(&self, conversation_id: &str) -> Option<Vec2>;
    /// Outgoing connector of a response.
    fn response_anchor(&self, response_id: &str) -> Option<Vec2>;
}

/// Anchors derived from laid-out positions.
pub struct Geometry<'a> {
    positions: &'a HashMap<String, Vec2>,
    config: &'a LayoutConfig,
    scenario: &'a Scenario,
}

impl<'a> Geometry<'a> {
    pub fn new(positions: &'a HashMap<String, Vec2>, config: &'a LayoutConfig, scenario: &'a Scenario) -> Self {
        Self {
            positions,
            config,
            scenario,
        }
    }
}

impl AnchorSource for Geometry<'_> {
    fn conversation_anchor(&self, conversation_id: &str) -> Option<Vec2> {
        let position = self.positions.get(conversation_id)?;
        Some(*position + Vec2::new(self.config.node_inset, self.config.node_inset + 10.0))
    }

    fn response_anchor(&self, response_id: &str) -> Option<Vec2> {
        let response = self.scenario.get_response(response_id)?;
        let owner = self.scenario.get_conversation(response.parent())?;
        let index = owner.responses().iter().position(|id| id == response_id)?;
        let position = self.positions.get(owner.id())?;
        Some(
            *position
                + Vec2::new(
                    self.config.node_width + self.config.connector_width,
                    self.config.node_height
                        + index as f32 * self.config.response_height
                        + self.config.response_height / 2.0,
                ),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DragState {
    conversation: String,
    origin: Vec2,
}

#[derive(Debug, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
    positions: HashMap<String, Vec2>,
    canvas: Vec2,
    scroll: Vec2,
    conversation_stack: HashMap<i32, usize>,
    response_stack: HashMap<i32, usize>,
    anchor_cache: HashMap<String, Vec2>,
    line_cache: HashMap<String, (Vec2, Vec2)>,
    curve_cache: HashMap<String, String>,
    drag: Option<DragState>,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        let canvas = config.viewport();
        Self {
            config,
            canvas,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn position(&self, conversation_id: &str) -> Option<Vec2> {
        self.positions.get(conversation_id).copied()
    }

    pub fn positions(&self) -> &HashMap<String, Vec2> {
        &self.positions
    }

    pub fn canvas_size(&self) -> Vec2 {
        self.canvas
    }

    pub fn set_scroll(&mut self, scroll: Vec2) {
        self.scroll = scroll;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn node_rect(&self, conversation: &Conversation) -> Option<Rect> {
        let min = self.position(conversation.id())?;
        let size = self.config.node_extent(conversation.responses().len());
        Some(Rect::from_corners(min, min + size))
    }

    /// Full relayout: every position is recomputed and every cache dropped.
    pub fn layout(&mut self, scenario: &Scenario) {
        self.positions.clear();
        self.conversation_stack.clear();
        self.response_stack.clear();
        self.invalidate_all();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![scenario.root_id()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(conversation) = scenario.get_conversation(id) else {
                continue;
            };
            if conversation.is_attached() {
                self.place(conversation);
            }
            let children: Vec<&str> = conversation
                .responses()
                .iter()
                .filter_map(|response_id| scenario.get_response(response_id))
                .flat_map(|response| response.children().iter().map(String::as_str))
                .collect();
            stack.extend(children.into_iter().rev());
        }

        let mut staged = 0;
        for conversation in scenario.conversations() {
            if self.positions.contains_key(conversation.id()) {
                continue;
            }
            if conversation.is_attached() {
                self.place(conversation);
            } else {
                staged += 1;
                let position = self.staging_position(staged);
                self.positions.insert(conversation.id().to_string(), position);
            }
        }

        self.canvas = self.compute_canvas();
        debug!(
            "laid out {} conversations ({} staged) on {}x{} canvas",
            self.positions.len(),
            staged,
            self.canvas.x,
            self.canvas.y
        );
    }

    fn place(&mut self, conversation: &Conversation) {
        let depth = conversation.depth();
        let stacked = self.conversation_stack.get(&depth).copied().unwrap_or(0);
        let prior_responses = self.response_stack.get(&depth).copied().unwrap_or(0);

        let x = self.config.canvas_margin + depth as f32 * self.config.column_width();
        let y = if stacked == 0 {
            self.config.canvas_margin
        } else {
            stacked as f32 * self.config.row_height() + prior_responses as f32 * self.config.response_height
        };
        self.positions.insert(conversation.id().to_string(), Vec2::new(x, y));

        *self.conversation_stack.entry(depth).or_default() += 1;
        *self.response_stack.entry(depth).or_default() += conversation.responses().len();
    }

    /// Position of the `index`-th (1-based) unattached conversation.
    pub fn staging_position(&self, index: usize) -> Vec2 {
        let [anchor_x, anchor_y] = self.config.staging_anchor;
        let offset = index as f32 * self.config.stack_step;
        Vec2::new(
            anchor_x - 40.0 - self.config.node_inset + self.scroll.x + offset,
            anchor_y - self.config.node_height - 50.0 - self.config.node_inset + self.scroll.y + offset,
        )
        .max(Vec2::ZERO)
    }

    fn compute_canvas(&self) -> Vec2 {
        let deepest = self.conversation_stack.keys().copied().max().unwrap_or(0);

        let mut max_y: f32 = 0.0;
        for (depth, stacked) in &self.conversation_stack {
            let conversations = *stacked as f32;
            let responses = self.response_stack.get(depth).copied().unwrap_or(0) as f32;
            let spaces = if conversations > 1.0 {
                (conversations - 1.0) * self.config.space_y
            } else {
                conversations * self.config.space_y
            };
            let height = conversations * self.config.node_height + responses * self.config.response_height + spaces;
            max_y = max_y.max(height);
        }

        let columns = deepest.max(0) as f32 + 2.0;
        Vec2::new(columns * self.config.column_width(), max_y + self.config.space_y).max(self.config.viewport())
    }

    // ---------------- Caches ----------------

    pub fn invalidate_all(&mut self) {
        self.anchor_cache.clear();
        self.line_cache.clear();
        self.curve_cache.clear();
    }

    /// Drops the cached anchors of one conversation, its responses, and every connector
    /// that ends on any of them.
    pub fn invalidate_conversation(&mut self, scenario: &Scenario, conversation_id: &str) {
        let mut touched: HashSet<&str> = HashSet::new();
        touched.insert(conversation_id);
        if let Some(conversation) = scenario.get_conversation(conversation_id) {
            touched.extend(conversation.responses().iter().map(String::as_str));
        }
        for id in &touched {
            self.anchor_cache.remove(*id);
        }
        for line in scenario.relationships() {
            if touched.contains(line.conversation()) || touched.contains(line.response()) {
                self.line_cache.remove(line.id());
                self.curve_cache.remove(line.id());
            }
        }
    }

    pub fn cached_curves(&self) -> usize {
        self.curve_cache.len()
    }

    /// Start (response side) and end (conversation side) of a connector.
    pub fn line_endpoints(&mut self, scenario: &Scenario, relationship_id: &str) -> Result<(Vec2, Vec2)> {
        if let Some(endpoints) = self.line_cache.get(relationship_id) {
            return Ok(*endpoints);
        }
        let line = scenario.relationship(relationship_id)?;
        let geometry = Geometry::new(&self.positions, &self.config, scenario);
        let endpoints = resolve_endpoints(&mut self.anchor_cache, &geometry, line)?;
        self.line_cache.insert(relationship_id.to_string(), endpoints);
        Ok(endpoints)
    }

    /// Same as [`line_endpoints`](Self::line_endpoints) with anchors from an external
    /// surface. Results still go through the caches.
    pub fn line_endpoints_from(
        &mut self,
        source: &dyn AnchorSource,
        scenario: &Scenario,
        relationship_id: &str,
    ) -> Result<(Vec2, Vec2)> {
        if let Some(endpoints) = self.line_cache.get(relationship_id) {
            return Ok(*endpoints);
        }
        let line = scenario.relationship(relationship_id)?;
        let endpoints = resolve_endpoints(&mut self.anchor_cache, source, line)?;
        self.line_cache.insert(relationship_id.to_string(), endpoints);
        Ok(endpoints)
    }

    pub fn connector(&mut self, scenario: &Scenario, relationship_id: &str) -> Result<CubicConnector> {
        let (start, end) = self.line_endpoints(scenario, relationship_id)?;
        Ok(CubicConnector::between(start, end))
    }

    /// SVG path data of a connector, memoized per relationship.
    pub fn curve(&mut self, scenario: &Scenario, relationship_id: &str) -> Result<String> {
        if let Some(path) = self.curve_cache.get(relationship_id) {
            return Ok(path.clone());
        }
        let path = self.connector(scenario, relationship_id)?.path_data();
        self.curve_cache.insert(relationship_id.to_string(), path.clone());
        Ok(path)
    }

    pub fn setting_anchor(&mut self, scenario: &Scenario, relationship_id: &str) -> Result<Vec2> {
        Ok(self.connector(scenario, relationship_id)?.setting_anchor())
    }

    // ---------------- Drag ----------------

    pub fn drag_start(&mut self, conversation_id: &str) -> Result<Vec2> {
        let origin = self
            .position(conversation_id)
            .ok_or_else(|| missing_conversation(conversation_id))?;
        self.drag = Some(DragState {
            conversation: conversation_id.to_string(),
            origin,
        });
        Ok(origin)
    }

    /// Moves the dragged conversation by `delta`, clamped at the canvas origin.
    pub fn drag_move(&mut self, scenario: &Scenario, delta: Vec2) -> Option<Vec2> {
        let id = self.drag.as_ref()?.conversation.clone();
        let current = self.position(&id)?;
        Some(self.place_at(scenario, &id, current + delta))
    }

    /// Ends the drag, growing the canvas when the node now reaches past it.
    pub fn drag_end(&mut self, scenario: &Scenario) -> Option<Vec2> {
        let drag = self.drag.take()?;
        let position = self.position(&drag.conversation)?;
        if let Some(conversation) = scenario.get_conversation(&drag.conversation) {
            let far_corner = position + self.config.node_extent(conversation.responses().len());
            self.canvas = self.canvas.max(far_corner + Vec2::splat(self.config.canvas_margin));
        }
        debug!("dragged {} from {:?} to {:?}", drag.conversation, drag.origin, position);
        Some(position)
    }

    pub fn move_conversation(&mut self, scenario: &Scenario, conversation_id: &str, position: Vec2) -> Result<Vec2> {
        if !self.positions.contains_key(conversation_id) {
            return Err(missing_conversation(conversation_id));
        }
        Ok(self.place_at(scenario, conversation_id, position))
    }

    fn place_at(&mut self, scenario: &Scenario, conversation_id: &str, position: Vec2) -> Vec2 {
        let clamped = position.max(Vec2::ZERO);
        self.positions.insert(conversation_id.to_string(), clamped);
        self.invalidate_conversation(scenario, conversation_id);
        clamped
    }
}

fn cached_anchor(cache: &mut HashMap<String, Vec2>, id: &str, resolve: impl FnOnce() -> Option<Vec2>) -> Option<Vec2> {
    if let Some(anchor) = cache.get(id) {
        return Some(*anchor);
    }
    let anchor = resolve()?;
    cache.insert(id.to_string(), anchor);
    Some(anchor)
}

fn resolve_endpoints(
    cache: &mut HashMap<String, Vec2>,
    source: &dyn AnchorSource,
    line: &RelationshipLine,
) -> Result<(Vec2, Vec2)> {
    let start = cached_anchor(cache, line.response(), || source.response_anchor(line.response()))
        .ok_or_else(|| missing_response(line.response()))?;
    let end = cached_anchor(cache, line.conversation(), || source.conversation_anchor(line.conversation()))
        .ok_or_else(|| missing_conversation(line.conversation()))?;
    Ok((start, end))
}
