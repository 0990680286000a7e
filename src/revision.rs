//! Projections of the live graph back into persisted shapes.

use std::collections::HashMap;

use bevy::math::Vec2;
use svg::node::element::{Circle, Group, Rectangle};
use svg::Document;
use tracing::{debug, info};

use crate::constants::{LEGACY_STEP_X, LEGACY_STEP_Y, SVG_CIRCLE_RADIUS, UNATTACHED_DEPTH};
use crate::error::Result;
use crate::graph::Scenario;
use crate::layout::LayoutEngine;
use crate::schema::{LegacyAnswer, LegacyDocument, LegacyQuestion, NestedConversation, RevisionDocument};

/// Flat revision document; the exact inverse of the flat builder.
pub fn to_revision(scenario: &Scenario) -> RevisionDocument {
    let doc = RevisionDocument {
        conversations: scenario
            .conversations()
            .map(|conversation| conversation.to_record(scenario))
            .collect(),
        responses: scenario.responses().map(|response| response.to_record()).collect(),
        relationships: Some(scenario.relationships().map(|line| line.to_record()).collect()),
    };
    debug!(
        "compiled revision: {} conversations, {} responses",
        doc.conversations.len(),
        doc.responses.len()
    );
    doc
}

/// Whole tree expanded from the root.
pub fn to_nested(scenario: &Scenario) -> Result<NestedConversation> {
    Ok(scenario.root()?.deep_parse(scenario))
}

/// Approximate legacy scatter chart.
///
/// Answers fan out one step to the right of their question, spread vertically around
/// it. A question sits on the average end point of the answers leading to it. Siblings
/// with several answers each can put answers on the same end point, so migrating back
/// may reattach a child under a neighbouring answer; shared and unattached
/// conversations are only placed approximately too.
pub fn to_legacy(scenario: &Scenario) -> LegacyDocument {
    let mut ordered: Vec<_> = scenario.conversations().collect();
    ordered.sort_by_key(|conversation| {
        if conversation.depth() == UNATTACHED_DEPTH {
            i32::MAX
        } else {
            conversation.depth()
        }
    });

    let mut answer_points: HashMap<&str, [f64; 2]> = HashMap::new();
    let mut questions = Vec::with_capacity(ordered.len());
    let mut fallback = 0;

    for conversation in ordered {
        let parent_points: Vec<[f64; 2]> = conversation
            .parents()
            .iter()
            .filter_map(|parent| answer_points.get(parent.as_str()).copied())
            .collect();
        let position = if scenario.is_root(conversation.id()) {
            [0.0, 0.0]
        } else if !parent_points.is_empty() {
            let n = parent_points.len() as f64;
            [
                parent_points.iter().map(|p| p[0]).sum::<f64>() / n,
                parent_points.iter().map(|p| p[1]).sum::<f64>() / n,
            ]
        } else {
            fallback += 1;
            [
                conversation.depth().max(1) as f64 * LEGACY_STEP_X,
                -(fallback as f64) * LEGACY_STEP_Y,
            ]
        };

        let count = conversation.responses().len();
        let answers = conversation
            .responses()
            .iter()
            .enumerate()
            .filter_map(|(index, id)| scenario.get_response(id).map(|response| (index, response)))
            .map(|(index, response)| {
                let movement = [
                    LEGACY_STEP_X,
                    (index as f64 - (count as f64 - 1.0) / 2.0) * LEGACY_STEP_Y,
                ];
                answer_points.insert(
                    response.id(),
                    [position[0] + movement[0], position[1] + movement[1]],
                );
                LegacyAnswer {
                    id: response.id().to_string(),
                    text: response.text().to_string(),
                    movement,
                }
            })
            .collect();

        questions.push(LegacyQuestion {
            id: conversation.id().to_string(),
            text: conversation.context().to_string(),
            position,
            answers,
        });
    }

    info!("exported {} legacy questions", questions.len());
    LegacyDocument { questions }
}

/// Vector scene of the laid-out graph: one rectangle per conversation, one cubic path
/// and marker per relationship.
pub fn render_svg(scenario: &Scenario, layout: &mut LayoutEngine) -> Result<Document> {
    let canvas = layout.canvas_size();
    let config = layout.config().clone();

    let mut nodes = Group::new().set("class", "conversations");
    for conversation in scenario.conversations() {
        let Some(position) = layout.position(conversation.id()) else {
            continue;
        };
        let mut node = Group::new().set("data-id", conversation.id()).add(
            Rectangle::new()
                .set("x", position.x)
                .set("y", position.y)
                .set("width", config.node_width)
                .set("height", config.node_height)
                .set("fill", "#ffffff")
                .set("stroke", "#333333"),
        );
        for (index, response_id) in conversation.responses().iter().enumerate() {
            let row = position + Vec2::new(0.0, config.node_height + index as f32 * config.response_height);
            node = node.add(
                Rectangle::new()
                    .set("data-id", response_id.as_str())
                    .set("x", row.x)
                    .set("y", row.y)
                    .set("width", config.node_width)
                    .set("height", config.response_height)
                    .set("fill", "#f4f4f4")
                    .set("stroke", "#999999"),
            );
        }
        nodes = nodes.add(node);
    }

    let mut lines = Group::new().set("class", "relationships");
    let relationship_ids: Vec<String> = scenario.relationships().map(|line| line.id().to_string()).collect();
    for id in relationship_ids {
        let line = scenario.relationship(&id)?;
        let connector = layout.connector(scenario, &id)?;
        let marker = connector.setting_anchor() + Vec2::splat(SVG_CIRCLE_RADIUS);
        lines = lines.add(connector.to_svg_path(&id, line.color())).add(
            Circle::new()
                .set("cx", marker.x)
                .set("cy", marker.y)
                .set("r", SVG_CIRCLE_RADIUS)
                .set("fill", line.color().to_string()),
        );
    }

    Ok(Document::new()
        .set("viewBox", (0.0, 0.0, canvas.x, canvas.y))
        .set("width", canvas.x)
        .set("height", canvas.y)
        .add(lines)
        .add(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ScenarioBuilder;
    use crate::graph::ScenarioSettings;
    use crate::ids::SequentialIds;
    use crate::layout::LayoutConfig;
    use crate::schema::ResponseRef;

    fn branching() -> Scenario {
        let mut scenario = Scenario::new(ScenarioSettings::new("ava"), Box::new(SequentialIds::new("n")));
        let root = scenario.root_id().to_string();
        scenario.set_context(&root, "Hi there").unwrap();
        let yes = scenario.add_response(&root, "yes").unwrap();
        let no = scenario.add_response(&root, "no").unwrap();
        let accepted = scenario.add_outcome(&yes).unwrap();
        scenario.add_outcome(&no).unwrap();
        let more = scenario.add_response(&accepted, "more").unwrap();
        scenario.add_outcome(&more).unwrap();
        scenario
    }

    #[test]
    fn revision_lists_everything_in_creation_order() {
        let scenario = branching();
        let doc = to_revision(&scenario);
        assert_eq!(doc.conversations.len(), 4);
        assert_eq!(doc.responses.len(), 3);
        assert_eq!(doc.relationships.as_ref().map(Vec::len), Some(3));

        let root = &doc.conversations[0];
        assert_eq!(root.context, "Hi there");
        assert!(root.has_children && !root.has_parents);
        assert!(matches!(root.responses[0], ResponseRef::Record(ref r) if r.text == "yes"));
    }

    #[test]
    fn nested_export_reaches_leaves() {
        let scenario = branching();
        let nested = to_nested(&scenario).unwrap();
        assert_eq!(nested.response_children.len(), 2);
        let accepted = &nested.response_children[0].conversation_children[0];
        assert_eq!(accepted.depth, 1);
        assert_eq!(accepted.response_children[0].conversation_children.len(), 1);
    }

    #[test]
    fn legacy_export_migrates_back_to_same_shape() {
        let scenario = branching();
        let legacy = to_legacy(&scenario);
        assert_eq!(legacy.questions[0].position, [0.0, 0.0]);
        assert_eq!(legacy.questions[0].answers[0].movement, [1.0, -0.5]);

        let migrated = ScenarioBuilder::new(ScenarioSettings::new("ava"), Box::new(SequentialIds::new("m")))
            .legacy(&legacy.questions);
        assert_eq!(migrated.conversation_count(), 4);
        assert_eq!(migrated.relationship_count(), 3);
        for line in scenario.relationships() {
            assert!(migrated.is_connected(line.conversation(), line.response()));
        }
    }

    #[test]
    fn legacy_sibling_answers_can_share_an_end_point() {
        let mut scenario = Scenario::new(ScenarioSettings::new("ava"), Box::new(SequentialIds::new("n")));
        let root = scenario.root_id().to_string();
        let yes = scenario.add_response(&root, "yes").unwrap();
        let no = scenario.add_response(&root, "no").unwrap();
        let upper = scenario.add_outcome(&yes).unwrap();
        let lower = scenario.add_outcome(&no).unwrap();
        for conversation in [&upper, &lower] {
            scenario.add_response(conversation, "a").unwrap();
            scenario.add_response(conversation, "b").unwrap();
        }

        let legacy = to_legacy(&scenario);
        let end = |question: &str, answer: usize| {
            let question = legacy.questions.iter().find(|q| q.id == question).unwrap();
            let movement = question.answers[answer].movement;
            [question.position[0] + movement[0], question.position[1] + movement[1]]
        };
        assert_eq!(end(upper.as_str(), 1), end(lower.as_str(), 0));
    }

    #[test]
    fn svg_scene_has_a_path_per_relationship() {
        let scenario = branching();
        let mut layout = LayoutEngine::new(LayoutConfig::default());
        layout.layout(&scenario);
        let document = render_svg(&scenario, &mut layout).unwrap().to_string();
        assert_eq!(document.matches("<path").count(), 3);
        assert_eq!(document.matches("<circle").count(), 3);
        assert!(document.contains("hsl("));
    }
}
