//! End-to-end editing session: build a small dialogue from an empty config, exercise
//! the connection guards, and check what the session refuses to do.

use scenario_drawer::constants::NodeMarks;
use scenario_drawer::ids::SequentialIds;
use scenario_drawer::schema::EditorConfig;
use scenario_drawer::{Editor, EditorError, LayoutConfig};

fn empty_editor() -> Editor {
    Editor::from_config(
        &EditorConfig::fresh("ava"),
        LayoutConfig::default(),
        Box::new(SequentialIds::new("id_")),
    )
}

fn always() -> impl FnMut(&str) -> bool {
    |_| true
}

// ═════════════════════════════════════════════════════════════════════════════
// First branch
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn first_branch_from_empty_config() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    {
        let root = editor.scenario().root().unwrap();
        assert_eq!(root.depth(), 0);
        assert!(root.responses().is_empty());
    }

    let r0a = editor.add_response(&r0, "Tell me more").unwrap();
    let root = editor.scenario().root().unwrap();
    assert_eq!(root.responses().len(), 1);
    assert_eq!(editor.scenario().settings().max_responses - root.responses().len(), 3);

    let c1 = editor.add_outcome(&r0a).unwrap();
    let scenario = editor.scenario();
    assert_eq!(scenario.conversation(&c1).unwrap().depth(), 1);
    let line = scenario.relationship(&format!("comb_{c1}_{r0a}")).unwrap();
    assert_eq!(line.weight(), 0.0);
    assert_eq!(line.points(), 0.0);
    assert!(scenario_drawer::validate::unreachable_conversations(scenario).is_empty());
}

#[test]
fn looping_back_to_the_root_is_rejected() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let r0a = editor.add_response(&r0, "Tell me more").unwrap();
    let c1 = editor.add_outcome(&r0a).unwrap();
    let c1a = editor.add_response(&c1, "Start over").unwrap();
    let relationships = editor.scenario().relationship_count();

    let err = editor.connect(&r0, &c1a).unwrap_err();
    assert!(matches!(err, EditorError::WouldCreateCycle { .. }));
    assert!(!editor.scenario().is_connected(&r0, &c1a));
    assert_eq!(editor.scenario().relationship_count(), relationships);
    assert!(editor.marks(&r0).contains(NodeMarks::ERROR));
    assert!(editor.marks(&c1a).contains(NodeMarks::ERROR));
}

#[test]
fn response_with_outcome_cannot_be_deleted() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let r0a = editor.add_response(&r0, "Tell me more").unwrap();
    let c1 = editor.add_outcome(&r0a).unwrap();

    let err = editor.remove_response(&r0a, &mut always()).unwrap_err();
    assert!(matches!(err, EditorError::ResponseHasChildren(_)));
    assert!(editor.scenario().is_connected(&c1, &r0a));
}

// ═════════════════════════════════════════════════════════════════════════════
// Limits and validation
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn fifth_response_is_refused() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    for i in 0..4 {
        editor.add_response(&r0, &format!("option {i}")).unwrap();
    }
    let err = editor.add_response(&r0, "one too many").unwrap_err();
    assert!(matches!(err, EditorError::MaxResponsesReached { limit: 4, .. }));
    assert_eq!(editor.scenario().root().unwrap().responses().len(), 4);
}

#[test]
fn orphan_is_invalid_until_connected() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let r0a = editor.add_response(&r0, "go").unwrap();
    editor.add_outcome(&r0a).unwrap();
    let floating = editor.add_conversation();

    match editor.finish() {
        Err(EditorError::OrphanConversations(ids)) => assert_eq!(ids, vec![floating.clone()]),
        other => panic!("expected orphan failure, got {other:?}"),
    }

    editor.connect(&floating, &r0a).unwrap();
    assert!(editor.finish().is_ok());
}

#[test]
fn dead_end_clears_once_response_leads_somewhere() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let r0a = editor.add_response(&r0, "go").unwrap();

    match editor.finish() {
        Err(EditorError::DeadEndResponses(ids)) => assert_eq!(ids, vec![r0a.clone()]),
        other => panic!("expected dead end failure, got {other:?}"),
    }

    editor.add_outcome(&r0a).unwrap();
    assert!(editor.finish().is_ok());
}

// ═════════════════════════════════════════════════════════════════════════════
// Removal flows
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn depth_never_drops_below_parent_owner() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let a = editor.add_response(&r0, "a").unwrap();
    let c1 = editor.add_outcome(&a).unwrap();
    let b = editor.add_response(&c1, "b").unwrap();
    let c2 = editor.add_outcome(&b).unwrap();
    let c = editor.add_response(&c2, "c").unwrap();
    let shared = editor.add_outcome(&a).unwrap();

    editor.connect(&shared, &c).unwrap();
    let scenario = editor.scenario();
    for parent in scenario.conversation(&shared).unwrap().parents() {
        let owner = scenario.owner_of(parent).unwrap();
        assert!(scenario.conversation(&shared).unwrap().depth() >= owner.depth() + 1);
    }
}

#[test]
fn subtree_removal_cascades_after_confirmation() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let a = editor.add_response(&r0, "a").unwrap();
    let c1 = editor.add_outcome(&a).unwrap();
    let b = editor.add_response(&c1, "b").unwrap();
    let c2 = editor.add_outcome(&b).unwrap();

    let err = editor.remove_subtree(&c1, &mut |_: &str| false).unwrap_err();
    assert!(matches!(err, EditorError::Cancelled));
    assert_eq!(editor.scenario().conversation_count(), 3);

    let removed = editor.remove_subtree(&c1, &mut always()).unwrap();
    assert_eq!(removed, vec![c1.clone(), c2.clone()]);
    assert_eq!(editor.scenario().conversation_count(), 1);
    assert!(editor.scenario().response(&a).unwrap().children().is_empty());
}

#[test]
fn attached_conversation_removal_asks_first() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let a = editor.add_response(&r0, "a").unwrap();
    let c1 = editor.add_outcome(&a).unwrap();

    let mut prompts = Vec::new();
    let mut record = |message: &str| {
        prompts.push(message.to_string());
        true
    };
    editor.remove_conversation(&c1, &mut record).unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(editor.scenario().get_conversation(&c1).is_none());
    assert!(matches!(
        editor.remove_conversation(&r0, &mut always()),
        Err(EditorError::CannotRemoveRoot)
    ));
}

// ═════════════════════════════════════════════════════════════════════════════
// Depth after edges go away
// ═════════════════════════════════════════════════════════════════════════════

fn assert_below_every_parent(editor: &Editor, conversation: &str) {
    let scenario = editor.scenario();
    let depth = scenario.conversation(conversation).unwrap().depth();
    for parent in scenario.conversation(conversation).unwrap().parents() {
        let owner = scenario.owner_of(parent).unwrap();
        assert!(
            depth >= owner.depth() + 1,
            "{conversation} at depth {depth} sits beside its parent owner {} at {}",
            owner.id(),
            owner.depth()
        );
    }
}

#[test]
fn removing_shallow_relationship_keeps_deeper_parent_depth() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let a = editor.add_response(&r0, "a").unwrap();
    let b = editor.add_response(&r0, "b").unwrap();
    let c1 = editor.add_outcome(&a).unwrap();
    let c = editor.add_response(&c1, "c").unwrap();
    let c2 = editor.add_outcome(&c).unwrap();
    let d = editor.add_response(&c2, "d").unwrap();
    let x = editor.add_outcome(&a).unwrap();

    editor.connect(&x, &d).unwrap();
    let shallow = editor.connect(&x, &b).unwrap();
    assert_eq!(editor.scenario().conversation(&x).unwrap().depth(), 3);

    editor.remove_relationship(&shallow, &mut always()).unwrap();
    assert_eq!(editor.scenario().conversation(&x).unwrap().depth(), 3);
    assert_below_every_parent(&editor, &x);
}

#[test]
fn subtree_survivor_keeps_deeper_second_parent() {
    let mut editor = empty_editor();
    let r0 = editor.scenario().root_id().to_string();
    let a = editor.add_response(&r0, "a").unwrap();
    let b = editor.add_response(&r0, "b").unwrap();
    let c1 = editor.add_outcome(&a).unwrap();
    let c = editor.add_response(&c1, "c").unwrap();
    let c2 = editor.add_outcome(&c).unwrap();
    let d = editor.add_response(&c2, "d").unwrap();
    let branch = editor.add_outcome(&b).unwrap();
    let e = editor.add_response(&branch, "e").unwrap();
    let x = editor.add_outcome(&e).unwrap();
    editor.connect(&x, &a).unwrap();
    editor.connect(&x, &d).unwrap();
    assert_eq!(editor.scenario().conversation(&x).unwrap().parents(), [e.clone(), a.clone(), d.clone()]);

    let removed = editor.remove_subtree(&branch, &mut always()).unwrap();
    assert_eq!(removed, vec![branch.clone()]);
    assert_eq!(editor.scenario().conversation(&x).unwrap().parents(), [a.clone(), d.clone()]);
    assert_eq!(editor.scenario().conversation(&x).unwrap().depth(), 3);
    assert_below_every_parent(&editor, &x);
}

#[test]
fn corrupt_stored_depth_loads_and_lays_out() {
    let config: EditorConfig = serde_json::from_str(
        r#"{
            "character": "ava",
            "scenarioData": {
                "conversations": [
                    {"id": "c0", "depth": 0, "responses": ["r0"]},
                    {"id": "c1", "depth": 2147483647, "parents": ["r0"]}
                ],
                "responses": [{"id": "r0", "parent_id": "c0", "children_ids": ["c1"]}],
                "relationships": []
            }
        }"#,
    )
    .unwrap();
    let editor = Editor::from_config(&config, LayoutConfig::default(), Box::new(SequentialIds::new("id_")));

    assert_eq!(editor.scenario().conversation("c1").unwrap().depth(), 1);
    assert_below_every_parent(&editor, "c1");
    let canvas = editor.layout().canvas_size();
    assert!(canvas.x.is_finite() && canvas.x <= 1920.0);
}
