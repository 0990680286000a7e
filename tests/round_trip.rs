//! Serializer and builder agree: whatever the editor writes, it reads back unchanged.

use std::collections::BTreeSet;

use scenario_drawer::ids::SequentialIds;
use scenario_drawer::revision::{to_nested, to_revision};
use scenario_drawer::schema::{EditorConfig, LegacyDocument, RevisionDocument};
use scenario_drawer::{Scenario, ScenarioBuilder, ScenarioSettings};

fn builder(prefix: &str) -> ScenarioBuilder {
    ScenarioBuilder::new(ScenarioSettings::new("ava"), Box::new(SequentialIds::new(prefix)))
}

/// Root with two answers, a shared outcome reached from two responses, a tuned
/// relationship, and one conversation nobody points at yet.
fn sample() -> Scenario {
    let mut scenario = Scenario::new(ScenarioSettings::new("ava"), Box::new(SequentialIds::new("s")));
    let root = scenario.root_id().to_string();
    scenario.set_context(&root, "Where to?").unwrap();
    let north = scenario.add_response(&root, "North").unwrap();
    let south = scenario.add_response(&root, "South").unwrap();
    let forest = scenario.add_outcome(&north).unwrap();
    scenario.set_context(&forest, "A dark forest").unwrap();
    scenario.cycle_expression(&forest).unwrap();
    let deeper = scenario.add_response(&forest, "Go deeper").unwrap();
    let clearing = scenario.add_outcome(&deeper).unwrap();
    let line = scenario.connect(&clearing, &south).unwrap();
    scenario.set_relationship_values(&line, 0.75, 3.0).unwrap();
    let ending = scenario.add_response(&clearing, "Rest").unwrap();
    scenario.add_outcome(&ending).unwrap();
    scenario.add_conversation();
    scenario
}

fn connections(scenario: &Scenario) -> BTreeSet<(String, String)> {
    scenario
        .relationships()
        .map(|line| (line.conversation().to_string(), line.response().to_string()))
        .collect()
}

#[test]
fn flat_document_survives_rebuild() {
    let original = to_revision(&sample());
    let rebuilt = builder("r").flat(&original);
    assert_eq!(to_revision(&rebuilt), original);
}

#[test]
fn json_text_survives_rebuild() {
    let json = serde_json::to_string_pretty(&to_revision(&sample())).unwrap();
    let parsed: RevisionDocument = serde_json::from_str(&json).unwrap();
    let rebuilt = builder("r").flat(&parsed);
    assert_eq!(serde_json::to_string_pretty(&to_revision(&rebuilt)).unwrap(), json);
}

#[test]
fn relationship_values_come_back() {
    let scenario = sample();
    let rebuilt = builder("r").flat(&to_revision(&scenario));
    let tuned = rebuilt
        .relationships()
        .find(|line| line.weight() > 0.0)
        .expect("tuned relationship");
    assert_eq!(tuned.weight(), 0.75);
    assert_eq!(tuned.points(), 3.0);
    assert_eq!(connections(&rebuilt), connections(&scenario));
}

#[test]
fn nested_document_keeps_shared_outcomes_shared() {
    let scenario = sample();
    let nested = to_nested(&scenario).unwrap();
    let rebuilt = builder("n").recursive(&nested);

    // the floating conversation is not reachable from the root, so it is not nested
    assert_eq!(rebuilt.conversation_count(), scenario.conversation_count() - 1);
    assert_eq!(rebuilt.response_count(), scenario.response_count());
    assert_eq!(connections(&rebuilt), connections(&scenario));
    assert_eq!(rebuilt.root_id(), scenario.root_id());
}

#[test]
fn config_without_relationships_migrates_legacy_questions() {
    let config: EditorConfig = serde_json::from_str(
        r#"{
            "character": "ava",
            "scenarioData": {"conversations": []},
            "questions": [
                {"id": "q0", "text": "Hello", "position": [0, 0],
                 "answers": [{"id": "a0", "text": "Hi", "move": [1, 0.5]},
                             {"id": "a1", "text": "Bye", "move": [1, -0.5]}]},
                {"id": "q1", "text": "Nice to meet you", "position": [1, 0.5], "answers": []},
                {"id": "q2", "text": "See you", "position": [1, -0.5], "answers": []}
            ]
        }"#,
    )
    .unwrap();
    let scenario = ScenarioBuilder::from_config(&config, Box::new(SequentialIds::new("m")));

    assert_eq!(scenario.root_id(), "q0");
    assert!(scenario.is_connected("q1", "a0"));
    assert!(scenario.is_connected("q2", "a1"));
    assert_eq!(scenario.conversation("q1").unwrap().depth(), 1);
    assert!(scenario_drawer::validate::validate_for_save(&scenario).is_ok());
}

#[test]
fn legacy_links_that_would_loop_are_dropped() {
    let doc: LegacyDocument = serde_json::from_str(
        r#"{"questions": [
            {"id": "q0", "text": "Start", "position": [0, 0],
             "answers": [{"id": "a0", "text": "on", "move": [1, 0]}]},
            {"id": "q1", "text": "Next", "position": [1, 0],
             "answers": [{"id": "a1", "text": "back", "move": [-1, 0]}]}
        ]}"#,
    )
    .unwrap();
    let scenario = builder("m").legacy(&doc.questions);

    assert!(scenario.is_connected("q1", "a0"));
    assert!(!scenario.is_connected("q0", "a1"));
    assert_eq!(scenario.relationship_count(), 1);
}
