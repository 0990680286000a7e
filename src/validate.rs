use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::algo::{is_cyclic_directed, kosaraju_scc};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::constants::UNATTACHED_DEPTH;
use crate::error::{EditorError, Result};
use crate::graph::Scenario;
use crate::model::Conversation;

/// True when `response_id` can already be reached going down from `conversation_id`,
/// i.e. hanging the conversation under that response would loop back into itself.
pub fn would_create_cycle(scenario: &Scenario, conversation_id: &str, response_id: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![conversation_id];

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let Some(conversation) = scenario.get_conversation(current) else {
            continue;
        };
        for id in conversation.responses() {
            if id == response_id {
                return true;
            }
            if let Some(response) = scenario.get_response(id) {
                stack.extend(response.children().iter().map(String::as_str));
            }
        }
    }
    false
}

/// Guards for a proposed edge, checked in order: self-loop, cycle, root parent.
pub fn check_connection(scenario: &Scenario, conversation_id: &str, response_id: &str) -> Result<()> {
    scenario.conversation(conversation_id)?;
    let owner = scenario.response(response_id)?.parent();
    if owner == conversation_id {
        return Err(EditorError::SelfLoop {
            conversation: conversation_id.to_string(),
            response: response_id.to_string(),
        });
    }
    if would_create_cycle(scenario, conversation_id, response_id) {
        return Err(EditorError::WouldCreateCycle {
            conversation: conversation_id.to_string(),
            response: response_id.to_string(),
        });
    }
    if scenario.is_root(conversation_id) {
        return Err(EditorError::RootHasNoParent);
    }
    Ok(())
}

/// Conversations not yet hanging under any response.
pub fn orphan_conversations(scenario: &Scenario) -> Vec<String> {
    scenario
        .conversations()
        .filter(|conversation| {
            !conversation.is_attached()
                || (!scenario.is_root(conversation.id()) && !conversation.has_parents())
        })
        .map(|conversation| conversation.id().to_string())
        .collect()
}

/// Responses that lead nowhere.
pub fn dead_end_responses(scenario: &Scenario) -> Vec<String> {
    scenario
        .responses()
        .filter(|response| !response.has_children())
        .map(|response| response.id().to_string())
        .collect()
}

pub fn check_orphans(scenario: &Scenario) -> Result<()> {
    let orphans = orphan_conversations(scenario);
    if orphans.is_empty() {
        Ok(())
    } else {
        Err(EditorError::OrphanConversations(orphans))
    }
}

/// Orphans are reported before dead ends.
pub fn validate_for_save(scenario: &Scenario) -> Result<()> {
    check_orphans(scenario)?;
    let dead_ends = dead_end_responses(scenario);
    if !dead_ends.is_empty() {
        return Err(EditorError::DeadEndResponses(dead_ends));
    }
    Ok(())
}

pub fn check_response_removal(scenario: &Scenario, response_id: &str) -> Result<()> {
    if scenario.response(response_id)?.has_children() {
        return Err(EditorError::ResponseHasChildren(response_id.to_string()));
    }
    Ok(())
}

pub fn check_conversation_removal(scenario: &Scenario, conversation_id: &str) -> Result<()> {
    let conversation = scenario.conversation(conversation_id)?;
    if scenario.is_root(conversation_id) {
        return Err(EditorError::CannotRemoveRoot);
    }
    let has_sub_conversations = conversation
        .responses()
        .iter()
        .filter_map(|id| scenario.get_response(id))
        .any(|response| response.has_children());
    if has_sub_conversations {
        return Err(EditorError::ConversationHasSubConversations(conversation_id.to_string()));
    }
    if conversation.has_children() {
        return Err(EditorError::ConversationHasResponses(conversation_id.to_string()));
    }
    Ok(())
}

// ---------------- Graph diagnostics ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScenarioNode {
    Conversation(String),
    Response(String),
}

impl ScenarioNode {
    fn id(&self) -> &str {
        match self {
            ScenarioNode::Conversation(id) | ScenarioNode::Response(id) => id,
        }
    }
}

impl fmt::Display for ScenarioNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioNode::Conversation(id) => write!(f, "conversation {id}"),
            ScenarioNode::Response(id) => write!(f, "response {id}"),
        }
    }
}

/// Conversations own their responses; responses lead to follow-up conversations.
type ScenarioGraph = DiGraph<ScenarioNode, &'static str>;

fn build_scenario_graph(scenario: &Scenario) -> (ScenarioGraph, HashMap<String, NodeIndex>) {
    let mut graph = ScenarioGraph::new();
    let mut indices = HashMap::new();

    for conversation in scenario.conversations() {
        let idx = graph.add_node(ScenarioNode::Conversation(conversation.id().to_string()));
        indices.insert(conversation.id().to_string(), idx);
    }
    for response in scenario.responses() {
        let idx = graph.add_node(ScenarioNode::Response(response.id().to_string()));
        indices.insert(response.id().to_string(), idx);
    }

    for response in scenario.responses() {
        let Some(&response_idx) = indices.get(response.id()) else {
            continue;
        };
        if let Some(&owner_idx) = indices.get(response.parent()) {
            graph.add_edge(owner_idx, response_idx, "offers");
        }
        for child in response.children() {
            if let Some(&child_idx) = indices.get(child) {
                graph.add_edge(response_idx, child_idx, "leads to");
            }
        }
    }

    (graph, indices)
}

/// A group of conversations that feed back into each other, and the response whose
/// edge closes the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueLoop {
    pub conversations: Vec<String>,
    pub closing_response: String,
    pub reentry: String,
}

impl DialogueLoop {
    pub fn describe(&self, scenario: &Scenario) -> String {
        let names: Vec<String> = self
            .conversations
            .iter()
            .map(|id| conversation_label(scenario, id))
            .collect();
        let owner = scenario
            .get_response(&self.closing_response)
            .map(|response| response.parent().to_string())
            .unwrap_or_default();
        format!(
            "Loop through {}: answering {} in {} goes back to {}",
            names.join(" -> "),
            response_label(scenario, &self.closing_response),
            conversation_label(scenario, &owner),
            conversation_label(scenario, &self.reentry)
        )
    }
}

fn conversation_label(scenario: &Scenario, id: &str) -> String {
    match scenario.get_conversation(id) {
        Some(conversation) if !conversation.context().is_empty() => format!("\"{}\"", conversation.context()),
        _ => id.to_string(),
    }
}

fn response_label(scenario: &Scenario, id: &str) -> String {
    match scenario.get_response(id) {
        Some(response) if !response.text().is_empty() => format!("\"{}\"", response.text()),
        _ => id.to_string(),
    }
}

fn labels(ids: &[String], label: impl Fn(&str) -> String) -> String {
    ids.iter().map(|id| label(id.as_str())).collect::<Vec<_>>().join(", ")
}

/// Loops already present in the graph. Only input loaded from documents can carry
/// these; the connection guards keep new edges acyclic.
pub fn existing_cycles(scenario: &Scenario) -> Vec<DialogueLoop> {
    let (graph, _) = build_scenario_graph(scenario);
    if !is_cyclic_directed(&graph) {
        return Vec::new();
    }
    kosaraju_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .filter_map(|component| {
            let members: HashSet<&str> = component.iter().map(|idx| graph[*idx].id()).collect();
            dialogue_loop(scenario, &members)
        })
        .collect()
}

/// The closing edge is the first one that leads back to a conversation no deeper than
/// the response's owner.
fn dialogue_loop(scenario: &Scenario, members: &HashSet<&str>) -> Option<DialogueLoop> {
    let conversations: Vec<String> = scenario
        .conversations()
        .filter(|conversation| members.contains(conversation.id()))
        .map(|conversation| conversation.id().to_string())
        .collect();
    let edges: Vec<(&str, &str, &str)> = scenario
        .responses()
        .filter(|response| members.contains(response.id()))
        .flat_map(|response| {
            response
                .children()
                .iter()
                .filter(|child| members.contains(child.as_str()))
                .map(move |child| (response.id(), response.parent(), child.as_str()))
        })
        .collect();
    let depth = |id: &str| scenario.get_conversation(id).map_or(UNATTACHED_DEPTH, Conversation::depth);
    let &(response, _, reentry) = edges
        .iter()
        .find(|edge| depth(edge.2) <= depth(edge.1))
        .or_else(|| edges.first())?;
    Some(DialogueLoop {
        conversations,
        closing_response: response.to_string(),
        reentry: reentry.to_string(),
    })
}

/// Conversations the root cannot reach.
pub fn unreachable_conversations(scenario: &Scenario) -> Vec<String> {
    let (graph, indices) = build_scenario_graph(scenario);
    let Some(&start) = indices.get(scenario.root_id()) else {
        return scenario.conversations().map(|c| c.id().to_string()).collect();
    };

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut stack = vec![start];
    while let Some(idx) = stack.pop() {
        if visited.insert(idx) {
            stack.extend(graph.neighbors(idx));
        }
    }

    scenario
        .conversations()
        .filter(|conversation| {
            indices
                .get(conversation.id())
                .is_some_and(|idx| !visited.contains(idx))
        })
        .map(|conversation| conversation.id().to_string())
        .collect()
}

/// Graphviz rendering with "offers" / "leads to" edge labels.
pub fn export_dot(scenario: &Scenario) -> String {
    let (graph, _) = build_scenario_graph(scenario);
    Dot::new(&graph).to_string()
}

/// Human-readable summary of everything that would block a save or looks suspicious.
pub fn report(scenario: &Scenario) -> Vec<String> {
    let mut lines = Vec::new();
    let conversation = |id: &str| conversation_label(scenario, id);
    let response = |id: &str| response_label(scenario, id);

    let orphans = orphan_conversations(scenario);
    if !orphans.is_empty() {
        lines.push(format!(
            "Not under any response yet: {}",
            labels(&orphans, conversation)
        ));
    }
    let dead_ends = dead_end_responses(scenario);
    if !dead_ends.is_empty() {
        lines.push(format!("Responses that lead nowhere: {}", labels(&dead_ends, response)));
    }
    for dialogue_loop in existing_cycles(scenario) {
        lines.push(dialogue_loop.describe(scenario));
    }
    let unreachable = unreachable_conversations(scenario);
    if !unreachable.is_empty() {
        lines.push(format!(
            "Never reached from the start: {}",
            labels(&unreachable, conversation)
        ));
    }

    if lines.is_empty() {
        lines.push("Every conversation is reachable and every response leads somewhere.".into());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ScenarioSettings;
    use crate::ids::SequentialIds;

    struct Chain {
        scenario: Scenario,
        root: String,
        r0: String,
        c1: String,
        r1: String,
        c2: String,
        r2: String,
    }

    fn chain() -> Chain {
        let mut scenario = Scenario::new(ScenarioSettings::new("ava"), Box::new(SequentialIds::new("n")));
        let root = scenario.root_id().to_string();
        let r0 = scenario.add_response(&root, "").unwrap();
        let c1 = scenario.add_outcome(&r0).unwrap();
        let r1 = scenario.add_response(&c1, "").unwrap();
        let c2 = scenario.add_outcome(&r1).unwrap();
        let r2 = scenario.add_response(&c2, "").unwrap();
        Chain { scenario, root, r0, c1, r1, c2, r2 }
    }

    #[test]
    fn cycle_is_found_through_descendants() {
        let chain = chain();
        assert!(would_create_cycle(&chain.scenario, &chain.c1, &chain.r2));
        assert!(would_create_cycle(&chain.scenario, &chain.root, &chain.r1));
        assert!(!would_create_cycle(&chain.scenario, &chain.c2, &chain.r0));
    }

    #[test]
    fn connection_guards_run_in_order() {
        let chain = chain();
        let scenario = &chain.scenario;
        assert!(matches!(
            check_connection(scenario, &chain.c1, &chain.r1),
            Err(EditorError::SelfLoop { .. })
        ));
        assert!(matches!(
            check_connection(scenario, &chain.c1, &chain.r2),
            Err(EditorError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            check_connection(scenario, &chain.root, &chain.r2),
            Err(EditorError::WouldCreateCycle { .. })
        ));
        assert!(check_connection(scenario, &chain.c2, &chain.r0).is_ok());
    }

    #[test]
    fn root_cannot_hang_under_floating_response() {
        let mut chain = chain();
        let floating = chain.scenario.add_conversation();
        let response = chain.scenario.add_response(&floating, "").unwrap();
        assert!(matches!(
            check_connection(&chain.scenario, &chain.root, &response),
            Err(EditorError::RootHasNoParent)
        ));
    }

    #[test]
    fn orphans_block_before_dead_ends() {
        let mut chain = chain();
        assert!(orphan_conversations(&chain.scenario).is_empty());
        assert_eq!(dead_end_responses(&chain.scenario), vec![chain.r2.clone()]);

        let floating = chain.scenario.add_conversation();
        match validate_for_save(&chain.scenario) {
            Err(EditorError::OrphanConversations(ids)) => assert_eq!(ids, vec![floating.clone()]),
            other => panic!("unexpected {other:?}"),
        }

        chain.scenario.connect(&floating, &chain.r2).unwrap();
        assert!(validate_for_save(&chain.scenario).is_ok());
    }

    #[test]
    fn any_negative_depth_counts_as_orphan() {
        let mut chain = chain();
        if let Some(conversation) = chain.scenario.conversation_entry(&chain.c2) {
            conversation.set_depth(-3);
        }
        assert_eq!(orphan_conversations(&chain.scenario), vec![chain.c2.clone()]);
    }

    #[test]
    fn conversation_removal_needs_empty_response_list() {
        let mut chain = chain();
        assert!(matches!(
            check_conversation_removal(&chain.scenario, &chain.c1),
            Err(EditorError::ConversationHasSubConversations(_))
        ));
        assert!(matches!(
            check_conversation_removal(&chain.scenario, &chain.c2),
            Err(EditorError::ConversationHasResponses(_))
        ));
        chain.scenario.remove_response(&chain.r2).unwrap();
        assert!(check_conversation_removal(&chain.scenario, &chain.c2).is_ok());
        assert!(matches!(
            check_conversation_removal(&chain.scenario, &chain.root),
            Err(EditorError::CannotRemoveRoot)
        ));
    }

    #[test]
    fn diagnostics_report_unreachable_and_dot() {
        let mut chain = chain();
        let floating = chain.scenario.add_conversation();
        assert_eq!(unreachable_conversations(&chain.scenario), vec![floating]);
        assert!(existing_cycles(&chain.scenario).is_empty());

        let dot = export_dot(&chain.scenario);
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains(&chain.c2));
        assert!(dot.contains("leads to"));
        assert!(report(&chain.scenario)
            .iter()
            .any(|line| line.starts_with("Not under any response yet")));
    }

    #[test]
    fn loaded_loop_is_reported_by_context() {
        let mut chain = chain();
        chain.scenario.set_context(&chain.root, "Hello").unwrap();
        chain.scenario.set_context(&chain.c2, "Goodbye").unwrap();
        chain.scenario.set_response_text(&chain.r2, "Start over").unwrap();
        chain.scenario.link(&chain.root, &chain.r2);

        let loops = existing_cycles(&chain.scenario);
        assert_eq!(loops.len(), 1);
        let found = &loops[0];
        assert_eq!(found.conversations, vec![chain.root.clone(), chain.c1.clone(), chain.c2.clone()]);
        assert_eq!(found.closing_response, chain.r2);
        assert_eq!(found.reentry, chain.root);

        let described = found.describe(&chain.scenario);
        assert!(described.contains("\"Start over\""));
        assert!(described.ends_with("in \"Goodbye\" goes back to \"Hello\""));
        assert!(report(&chain.scenario).contains(&described));
    }
}
