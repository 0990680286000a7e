use std::collections::HashSet;
use std::fmt;

use rand::Rng;

use crate::constants::{
    EXPRESSION_NAMES, IMAGE_ASSETS_PATH, IMAGE_ASSETS_TYPE, LINE_LIGHTNESS, LINE_SATURATION,
    ROOT_DEPTH, UNATTACHED_DEPTH,
};
use crate::graph::Scenario;
use crate::schema::{
    ConversationRecord, NestedConversation, NestedResponse, RelationshipRecord, ResponseRecord,
    ResponseRef,
};

pub fn expression_url(character: &str, expression_name: &str) -> String {
    format!("{IMAGE_ASSETS_PATH}{character}/{expression_name}.{IMAGE_ASSETS_TYPE}")
}

/// Round-robin over the known expressions; unknown names restart the list.
pub fn next_expression(current: &str) -> &'static str {
    let next = EXPRESSION_NAMES
        .iter()
        .position(|name| *name == current)
        .map_or(0, |index| (index + 1) % EXPRESSION_NAMES.len());
    EXPRESSION_NAMES[next]
}

fn push_unique(set: &mut Vec<String>, id: &str) -> bool {
    if set.iter().any(|existing| existing == id) {
        return false;
    }
    set.push(id.to_string());
    true
}

fn remove_id(set: &mut Vec<String>, id: &str) -> bool {
    let before = set.len();
    set.retain(|existing| existing != id);
    before != set.len()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    id: String,
    depth: i32,
    context: String,
    expression_name: String,
    expression_url: String,
    responses: Vec<String>,
    parents: Vec<String>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, depth: i32, character: &str) -> Self {
        let expression_name = EXPRESSION_NAMES[0].to_string();
        Self {
            id: id.into(),
            depth,
            context: String::new(),
            expression_url: expression_url(character, &expression_name),
            expression_name,
            responses: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn set_depth(&mut self, depth: i32) {
        self.depth = depth;
    }

    pub fn is_root(&self) -> bool {
        self.depth == ROOT_DEPTH && self.parents.is_empty()
    }

    pub fn is_attached(&self) -> bool {
        self.depth > UNATTACHED_DEPTH
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    pub fn expression_name(&self) -> &str {
        &self.expression_name
    }

    pub fn expression_url(&self) -> &str {
        &self.expression_url
    }

    /// An empty url or name is replaced by the defaults for `character`.
    pub fn set_assets(&mut self, character: &str, expression_name: &str, url: &str) {
        self.expression_name = if expression_name.is_empty() {
            EXPRESSION_NAMES[0].to_string()
        } else {
            expression_name.to_string()
        };
        self.expression_url = if url.is_empty() {
            expression_url(character, &self.expression_name)
        } else {
            url.to_string()
        };
    }

    pub fn set_expression_name(&mut self, character: &str, expression_name: &str) {
        self.expression_name = expression_name.to_string();
        self.update_expression(character);
    }

    pub fn update_expression(&mut self, character: &str) {
        self.expression_url = expression_url(character, &self.expression_name);
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn add_response(&mut self, response_id: &str) -> bool {
        push_unique(&mut self.responses, response_id)
    }

    pub fn remove_response(&mut self, response_id: &str) -> bool {
        remove_id(&mut self.responses, response_id)
    }

    pub fn add_parent(&mut self, response_id: &str) -> bool {
        push_unique(&mut self.parents, response_id)
    }

    pub fn remove_parent(&mut self, response_id: &str) -> bool {
        remove_id(&mut self.parents, response_id)
    }

    pub(crate) fn order_responses(&mut self, preferred: &[String]) {
        reorder(&mut self.responses, preferred);
    }

    pub(crate) fn order_parents(&mut self, preferred: &[String]) {
        reorder(&mut self.parents, preferred);
    }

    pub fn has_children(&self) -> bool {
        !self.responses.is_empty()
    }

    pub fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }

    pub fn has_multi_parents(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_max_responses_reached(&self, limit: usize) -> bool {
        self.responses.len() >= limit
    }

    /// Shallow projection: own fields plus immediate responses and parents.
    pub fn to_record(&self, scenario: &Scenario) -> ConversationRecord {
        let project = |ids: &[String]| -> Vec<ResponseRef> {
            ids.iter()
                .map(|id| match scenario.get_response(id) {
                    Some(response) => ResponseRef::Record(response.to_record()),
                    None => ResponseRef::Id(id.clone()),
                })
                .collect()
        };
        ConversationRecord {
            id: self.id.clone(),
            kind: "conversation".to_string(),
            depth: self.depth,
            context: self.context.clone(),
            expression_url: self.expression_url.clone(),
            expression_name: self.expression_name.clone(),
            has_parents: self.has_parents(),
            has_children: self.has_children(),
            responses: project(&self.responses),
            parents: project(&self.parents),
        }
    }

    /// Deep projection down to the leaves. A conversation already on the current path
    /// is emitted without children so malformed cyclic input still terminates.
    pub fn deep_parse(&self, scenario: &Scenario) -> NestedConversation {
        let mut path = HashSet::new();
        self.deep_parse_on_path(scenario, &mut path)
    }

    fn deep_parse_on_path(&self, scenario: &Scenario, path: &mut HashSet<String>) -> NestedConversation {
        let mut nested = NestedConversation {
            id: self.id.clone(),
            kind: "conversation".to_string(),
            depth: self.depth,
            context: self.context.clone(),
            expression_url: self.expression_url.clone(),
            expression_name: self.expression_name.clone(),
            has_children: self.has_children(),
            response_children: Vec::new(),
        };
        if !path.insert(self.id.clone()) {
            return nested;
        }
        nested.response_children = self
            .responses
            .iter()
            .filter_map(|id| scenario.get_response(id))
            .map(|response| response.deep_parse_on_path(scenario, path))
            .collect();
        path.remove(&self.id);
        nested
    }
}

fn reorder(ids: &mut Vec<String>, preferred: &[String]) {
    let mut ordered: Vec<String> = preferred
        .iter()
        .filter(|id| ids.contains(id))
        .cloned()
        .collect();
    ordered.dedup();
    for id in ids.iter() {
        if !ordered.contains(id) {
            ordered.push(id.clone());
        }
    }
    *ids = ordered;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    id: String,
    text: String,
    parent: String,
    children: Vec<String>,
}

impl Response {
    pub fn new(id: impl Into<String>, parent: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            parent: parent.into(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn set_parent(&mut self, parent: impl Into<String>) {
        self.parent = parent.into();
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn add_conversation(&mut self, conversation_id: &str) -> bool {
        push_unique(&mut self.children, conversation_id)
    }

    pub fn remove_conversation(&mut self, conversation_id: &str) -> bool {
        remove_id(&mut self.children, conversation_id)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn has_multi_children(&self) -> bool {
        self.children.len() > 1
    }

    pub fn to_record(&self) -> ResponseRecord {
        ResponseRecord {
            id: self.id.clone(),
            kind: "response".to_string(),
            text: self.text.clone(),
            parent_id: self.parent.clone(),
            children_ids: self.children.clone(),
        }
    }

    pub fn deep_parse(&self, scenario: &Scenario) -> NestedResponse {
        let mut path = HashSet::new();
        self.deep_parse_on_path(scenario, &mut path)
    }

    fn deep_parse_on_path(&self, scenario: &Scenario, path: &mut HashSet<String>) -> NestedResponse {
        NestedResponse {
            id: self.id.clone(),
            kind: "response".to_string(),
            text: self.text.clone(),
            has_children: self.has_children(),
            conversation_children: self
                .children
                .iter()
                .filter_map(|id| scenario.get_conversation(id))
                .map(|conversation| conversation.deep_parse_on_path(scenario, path))
                .collect(),
        }
    }
}

/// Stroke colour of a connector, fixed when the line is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineColor {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl LineColor {
    /// `#ffa700`
    pub const DEFAULT: LineColor = LineColor {
        hue: 39,
        saturation: 100,
        lightness: 50,
    };

    pub fn random() -> Self {
        Self {
            hue: rand::rng().random_range(0..360),
            saturation: LINE_SATURATION,
            lightness: LINE_LIGHTNESS,
        }
    }

    pub fn to_rgb(self) -> [u8; 3] {
        let h = f32::from(self.hue % 360) / 60.0;
        let s = f32::from(self.saturation.min(100)) / 100.0;
        let l = f32::from(self.lightness.min(100)) / 100.0;
        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u8 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        [channel(r), channel(g), channel(b)]
    }
}

impl Default for LineColor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for LineColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsl({},{}%,{}%)", self.hue, self.saturation, self.lightness)
    }
}

/// Edge record between a response ("after" connector) and a conversation ("before").
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipLine {
    id: String,
    conversation: String,
    response: String,
    weight: f64,
    points: f64,
    color: LineColor,
}

impl RelationshipLine {
    pub fn combined_id(conversation_id: &str, response_id: &str) -> String {
        format!("comb_{conversation_id}_{response_id}")
    }

    pub fn new(conversation_id: &str, response_id: &str) -> Self {
        Self::with_values(
            Self::combined_id(conversation_id, response_id),
            conversation_id,
            response_id,
            0.0,
            0.0,
        )
    }

    pub fn with_values(
        id: impl Into<String>,
        conversation_id: &str,
        response_id: &str,
        weight: f64,
        points: f64,
    ) -> Self {
        Self {
            id: id.into(),
            conversation: conversation_id.to_string(),
            response: response_id.to_string(),
            weight,
            points,
            color: LineColor::random(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn setting_id(&self) -> &str {
        self.id.strip_prefix("comb").unwrap_or(&self.id)
    }

    pub fn conversation(&self) -> &str {
        &self.conversation
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn points(&self) -> f64 {
        self.points
    }

    pub fn set_points(&mut self, points: f64) {
        self.points = points;
    }

    pub fn color(&self) -> LineColor {
        self.color
    }

    pub fn touches(&self, id: &str) -> bool {
        self.conversation == id || self.response == id
    }

    pub fn to_record(&self) -> RelationshipRecord {
        RelationshipRecord {
            id: self.id.clone(),
            weight: self.weight,
            points: self.points,
            conversation_id: self.conversation.clone(),
            response_id: self.response.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_links_behave_like_sets() {
        let mut conversation = Conversation::new("c1", 1, "ava");
        assert!(conversation.add_response("r1"));
        assert!(!conversation.add_response("r1"));
        assert!(conversation.add_parent("r0"));
        assert!(conversation.add_parent("r9"));
        assert!(conversation.has_multi_parents());
        assert!(conversation.remove_parent("r0"));
        assert!(!conversation.remove_parent("r0"));
        assert_eq!(conversation.parents(), ["r9".to_string()]);
        assert_eq!(conversation.responses().len(), 1);
    }

    #[test]
    fn max_responses_counts_current_children() {
        let mut conversation = Conversation::new("c1", 0, "ava");
        for i in 0..4 {
            conversation.add_response(&format!("r{i}"));
        }
        assert!(conversation.is_max_responses_reached(4));
        assert!(!conversation.is_max_responses_reached(5));
    }

    #[test]
    fn expression_url_follows_character() {
        let mut conversation = Conversation::new("c1", 0, "ava");
        assert_eq!(conversation.expression_url(), "assets/images/characters/ava/default.png");
        conversation.set_expression_name("ava", next_expression(conversation.expression_name()));
        assert_eq!(conversation.expression_name(), "happy");
        conversation.update_expression("ben");
        assert_eq!(conversation.expression_url(), "assets/images/characters/ben/happy.png");
    }

    #[test]
    fn expressions_wrap_around() {
        let last = EXPRESSION_NAMES[EXPRESSION_NAMES.len() - 1];
        assert_eq!(next_expression(last), EXPRESSION_NAMES[0]);
        assert_eq!(next_expression("unknown"), EXPRESSION_NAMES[0]);
    }

    #[test]
    fn relationship_id_is_derived_from_pair() {
        let line = RelationshipLine::new("c1", "r1");
        assert_eq!(line.id(), "comb_c1_r1");
        assert_eq!(line.setting_id(), "_c1_r1");
        assert_eq!(line.weight(), 0.0);
        assert_eq!(line.points(), 0.0);
        assert!(line.touches("c1") && line.touches("r1") && !line.touches("c2"));
    }

    #[test]
    fn line_color_renders_css_and_rgb() {
        assert_eq!(LineColor::DEFAULT.to_string(), "hsl(39,100%,50%)");
        assert_eq!(LineColor::DEFAULT.to_rgb(), [255, 166, 0]);
        let random = LineColor::random();
        assert!(random.hue < 360);
        assert_eq!(random.saturation, 88);
    }

    #[test]
    fn response_record_lists_children() {
        let mut response = Response::new("r1", "c0", "hello");
        response.add_conversation("c1");
        response.add_conversation("c2");
        let record = response.to_record();
        assert_eq!(record.parent_id, "c0");
        assert_eq!(record.children_ids, vec!["c1".to_string(), "c2".to_string()]);
        assert!(response.has_multi_children());
    }
}
