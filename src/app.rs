//! Bevy + egui editor surface.
//!
//! The UI systems never touch the graph directly. They read a snapshot of the laid-out
//! scene, paint it, and queue [`EditorAction`]s; `apply_actions` runs them against the
//! [`Editor`] once the frame's UI is built. Actions that need a confirmation are parked
//! until the user answers the prompt and are then replayed with the answer.

use std::path::PathBuf;

use bevy::math::Vec2;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin, EguiPrimaryContextPass};

use crate::constants::{NodeMarks, SVG_CIRCLE_RADIUS};
use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::model::LineColor;
use crate::storage;

#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    AddConversation,
    AddResponse(String),
    AddOutcome(String),
    RemoveResponse(String),
    RemoveConversation(String),
    RemoveSubtree(String),
    BeginConnect(String),
    CancelConnect,
    Connect { conversation: String, response: String },
    EditRelationship(String),
    SetRelationshipValues { relationship: String, weight: f64, points: f64 },
    CloseRelationship,
    RemoveRelationship(String),
    SetContext { conversation: String, context: String },
    SetResponseText { response: String, text: String },
    CycleExpression(String),
    DragStart(String),
    DragMove(Vec2),
    DragEnd,
    Zoom(f32),
    Tidy,
    Save,
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    prompt: String,
    action: EditorAction,
}

#[derive(Resource)]
pub struct EditorState {
    pub editor: Editor,
    pub output: PathBuf,
    connecting_from: Option<String>,
    pending: Option<PendingConfirmation>,
    notice: Option<String>,
    dirty: bool,
}

impl EditorState {
    pub fn new(editor: Editor, output: PathBuf) -> Self {
        Self {
            editor,
            output,
            connecting_from: None,
            pending: None,
            notice: None,
            dirty: false,
        }
    }
}

#[derive(Resource, Default)]
struct QueuedActions(Vec<EditorAction>);

pub struct EditorPlugin;

impl Plugin for EditorPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin::default())
            .init_resource::<QueuedActions>()
            .add_systems(Startup, setup_camera)
            .add_systems(
                EguiPrimaryContextPass,
                (toolbar_system, canvas_system, dialog_system, apply_actions).chain(),
            );
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}

// ---------------- Scene snapshot ----------------

struct ResponseView {
    id: String,
    text: String,
    marks: NodeMarks,
}

struct NodeView {
    id: String,
    position: Vec2,
    context: String,
    expression: String,
    marks: NodeMarks,
    responses: Vec<ResponseView>,
}

struct LineView {
    id: String,
    points: [Vec2; 4],
    marker: Vec2,
    color: LineColor,
    marks: NodeMarks,
}

struct SceneView {
    canvas: Vec2,
    zoom: f32,
    node_size: Vec2,
    response_height: f32,
    nodes: Vec<NodeView>,
    lines: Vec<LineView>,
}

fn snapshot(editor: &mut Editor) -> SceneView {
    let zoom = editor.zoom();
    let mut lines = Vec::new();
    {
        let (scenario, layout) = editor.layout_mut();
        for line in scenario.relationships() {
            match layout.connector(scenario, line.id()) {
                Ok(connector) => lines.push(LineView {
                    id: line.id().to_string(),
                    points: connector.points(),
                    marker: connector.setting_anchor() + Vec2::splat(SVG_CIRCLE_RADIUS),
                    color: line.color(),
                    marks: NodeMarks::empty(),
                }),
                Err(err) => warn!("skipping connector {}: {err}", line.id()),
            }
        }
    }
    for line in &mut lines {
        line.marks = editor.marks(&line.id);
    }

    let scenario = editor.scenario();
    let layout = editor.layout();
    let nodes = scenario
        .conversations()
        .filter_map(|conversation| {
            let position = layout.position(conversation.id())?;
            Some(NodeView {
                id: conversation.id().to_string(),
                position,
                context: conversation.context().to_string(),
                expression: conversation.expression_name().to_string(),
                marks: editor.marks(conversation.id()),
                responses: conversation
                    .responses()
                    .iter()
                    .filter_map(|id| scenario.get_response(id))
                    .map(|response| ResponseView {
                        id: response.id().to_string(),
                        text: response.text().to_string(),
                        marks: editor.marks(response.id()),
                    })
                    .collect(),
            })
        })
        .collect();

    let config = layout.config();
    SceneView {
        canvas: layout.canvas_size(),
        zoom,
        node_size: Vec2::new(config.node_width, config.node_height),
        response_height: config.response_height,
        nodes,
        lines,
    }
}

fn line_color(color: LineColor) -> egui::Color32 {
    let [r, g, b] = color.to_rgb();
    egui::Color32::from_rgb(r, g, b)
}

fn outline(marks: NodeMarks) -> egui::Stroke {
    if marks.contains(NodeMarks::ERROR) {
        egui::Stroke::new(3.0, egui::Color32::from_rgb(220, 40, 40))
    } else if marks.intersects(NodeMarks::EDITING | NodeMarks::ACTIVE) {
        egui::Stroke::new(3.0, egui::Color32::from_rgb(240, 200, 40))
    } else if marks.contains(NodeMarks::START) {
        egui::Stroke::new(2.0, egui::Color32::from_rgb(60, 170, 90))
    } else {
        egui::Stroke::new(1.0, egui::Color32::GRAY)
    }
}

// ---------------- Systems ----------------

fn toolbar_system(mut contexts: EguiContexts, state: Res<EditorState>, mut queue: ResMut<QueuedActions>) {
    let ctx = match contexts.ctx_mut() {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!("toolbar_system: no primary egui context yet ({:?}); skipping frame", err);
            return;
        }
    };

    egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui.button("Add Conversation").clicked() {
                queue.0.push(EditorAction::AddConversation);
            }
            if ui.button("Tidy").clicked() {
                queue.0.push(EditorAction::Tidy);
            }
            if ui.button("Save").clicked() {
                queue.0.push(EditorAction::Save);
            }
            ui.separator();
            ui.label(format!("Zoom: {:.0}%", state.editor.zoom() * 100.0));
            if ui.button("-").clicked() {
                queue.0.push(EditorAction::Zoom(state.editor.zoom() - 0.1));
            }
            if ui.button("+").clicked() {
                queue.0.push(EditorAction::Zoom(state.editor.zoom() + 0.1));
            }
            ui.separator();
            if let Some(response) = &state.connecting_from {
                ui.label(format!("Linking from {response}: click a conversation header"));
                if ui.button("Cancel").clicked() {
                    queue.0.push(EditorAction::CancelConnect);
                }
            } else if state.dirty {
                ui.label("* Unsaved changes");
            } else {
                ui.label("Saved");
            }
            ui.label(format!("Path: {}", state.output.display()));
        });
    });
}

fn canvas_system(mut contexts: EguiContexts, mut state: ResMut<EditorState>, mut queue: ResMut<QueuedActions>) {
    let ctx = match contexts.ctx_mut() {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!("canvas_system: no primary egui context yet ({:?}); skipping frame", err);
            return;
        }
    };

    let scene = snapshot(&mut state.editor);
    let connecting = state.connecting_from.is_some();

    let zoom_delta = ctx.input(|i| i.zoom_delta());
    if (zoom_delta - 1.0).abs() > f32::EPSILON {
        queue.0.push(EditorAction::Zoom(scene.zoom * zoom_delta));
    }
    if connecting && ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
        queue.0.push(EditorAction::CancelConnect);
    }

    egui::CentralPanel::default().show(ctx, |ui| {
        egui::ScrollArea::both().show(ui, |ui| {
            let size = scene.canvas * scene.zoom;
            let (canvas, painter) = ui.allocate_painter(egui::vec2(size.x, size.y), egui::Sense::hover());
            let origin = canvas.rect.min;
            let to_screen = |p: Vec2| origin + egui::vec2(p.x, p.y) * scene.zoom;
            let rect_at = |min: Vec2, size: Vec2| egui::Rect::from_min_size(to_screen(min), egui::vec2(size.x, size.y) * scene.zoom);

            for line in &scene.lines {
                let [a, b, c, d] = line.points.map(to_screen);
                let width = if line.marks.contains(NodeMarks::EDITING) { 4.0 } else { 2.0 };
                painter.add(egui::epaint::CubicBezierShape::from_points_stroke(
                    [a, b, c, d],
                    false,
                    egui::Color32::TRANSPARENT,
                    egui::Stroke::new(width, line_color(line.color)),
                ));
                let marker = to_screen(line.marker);
                painter.circle_filled(marker, SVG_CIRCLE_RADIUS * scene.zoom, line_color(line.color));
                let hit = egui::Rect::from_center_size(marker, egui::Vec2::splat(2.0 * SVG_CIRCLE_RADIUS * scene.zoom));
                if ui
                    .interact(hit, egui::Id::new(("relationship", &line.id)), egui::Sense::click())
                    .clicked()
                {
                    queue.0.push(EditorAction::EditRelationship(line.id.clone()));
                }
            }

            for node in &scene.nodes {
                let body = rect_at(node.position, scene.node_size);
                painter.rect_filled(body, 4.0, egui::Color32::from_gray(250));
                painter.rect_stroke(body, 4.0, outline(node.marks), egui::StrokeKind::Inside);

                let header = rect_at(node.position, Vec2::new(scene.node_size.x, 30.0));
                painter.rect_filled(header, 4.0, egui::Color32::from_gray(220));
                painter.text(
                    header.left_center() + egui::vec2(8.0, 0.0),
                    egui::Align2::LEFT_CENTER,
                    &node.id,
                    egui::FontId::proportional(12.0),
                    egui::Color32::DARK_GRAY,
                );
                let grip = ui.interact(header, egui::Id::new(("conversation", &node.id)), egui::Sense::click_and_drag());
                if grip.drag_started() {
                    queue.0.push(EditorAction::DragStart(node.id.clone()));
                }
                if grip.dragged() {
                    let delta = grip.drag_delta();
                    queue.0.push(EditorAction::DragMove(Vec2::new(delta.x, delta.y)));
                }
                if grip.drag_stopped() {
                    queue.0.push(EditorAction::DragEnd);
                }
                if connecting && grip.clicked() {
                    if let Some(response) = &state.connecting_from {
                        queue.0.push(EditorAction::Connect {
                            conversation: node.id.clone(),
                            response: response.clone(),
                        });
                    }
                }

                let mut context = node.context.clone();
                let text_rect = rect_at(node.position + Vec2::new(10.0, 40.0), scene.node_size - Vec2::new(20.0, 90.0));
                if ui.put(text_rect, egui::TextEdit::multiline(&mut context)).changed() {
                    queue.0.push(EditorAction::SetContext {
                        conversation: node.id.clone(),
                        context,
                    });
                }

                let row_y = scene.node_size.y - 40.0;
                let buttons = [
                    ("+ Response", EditorAction::AddResponse(node.id.clone())),
                    (node.expression.as_str(), EditorAction::CycleExpression(node.id.clone())),
                    ("Delete", EditorAction::RemoveConversation(node.id.clone())),
                    ("Delete branch", EditorAction::RemoveSubtree(node.id.clone())),
                ];
                for (index, (label, action)) in buttons.into_iter().enumerate() {
                    let at = node.position + Vec2::new(10.0 + index as f32 * 72.0, row_y);
                    if ui.put(rect_at(at, Vec2::new(68.0, 28.0)), egui::Button::new(label)).clicked() {
                        queue.0.push(action);
                    }
                }

                for (index, response) in node.responses.iter().enumerate() {
                    let row = node.position + Vec2::new(0.0, scene.node_size.y + index as f32 * scene.response_height);
                    let row_rect = rect_at(row, Vec2::new(scene.node_size.x, scene.response_height));
                    painter.rect_filled(row_rect, 0.0, egui::Color32::from_gray(240));
                    painter.rect_stroke(row_rect, 0.0, outline(response.marks), egui::StrokeKind::Inside);

                    let mut text = response.text.clone();
                    let text_rect = rect_at(row + Vec2::new(10.0, 10.0), Vec2::new(scene.node_size.x - 20.0, 60.0));
                    if ui.put(text_rect, egui::TextEdit::multiline(&mut text)).changed() {
                        queue.0.push(EditorAction::SetResponseText {
                            response: response.id.clone(),
                            text,
                        });
                    }

                    let actions = [
                        ("+ Outcome", EditorAction::AddOutcome(response.id.clone())),
                        ("Link", EditorAction::BeginConnect(response.id.clone())),
                        ("Delete", EditorAction::RemoveResponse(response.id.clone())),
                    ];
                    for (slot, (label, action)) in actions.into_iter().enumerate() {
                        let at = row + Vec2::new(10.0 + slot as f32 * 90.0, 85.0);
                        if ui.put(rect_at(at, Vec2::new(84.0, 28.0)), egui::Button::new(label)).clicked() {
                            queue.0.push(action);
                        }
                    }
                }
            }
        });
    });
}

fn dialog_system(mut contexts: EguiContexts, mut state: ResMut<EditorState>, mut queue: ResMut<QueuedActions>) {
    let ctx = match contexts.ctx_mut() {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!("dialog_system: no primary egui context yet ({:?}); skipping frame", err);
            return;
        }
    };

    if let Some(pending) = state.pending.clone() {
        let mut answer = None;
        egui::Window::new("Confirm")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(pending.prompt.as_str());
                ui.horizontal(|ui| {
                    if ui.button("Yes").clicked() {
                        answer = Some(true);
                    }
                    if ui.button("No").clicked() {
                        answer = Some(false);
                    }
                });
            });
        match answer {
            Some(true) => {
                state.pending = None;
                let result = run(&mut state, &pending.action, &mut |_: &str| true);
                report(&mut state, result);
            }
            Some(false) => state.pending = None,
            None => {}
        }
    }

    if let Some(notice) = state.notice.clone() {
        let mut open = true;
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label(notice);
            });
        if !open {
            state.notice = None;
        }
    }

    if let Some(relationship) = state.editor.editing_relationship().map(str::to_string) {
        let Some(line) = state.editor.scenario().get_relationship(&relationship) else {
            return;
        };
        let (mut weight, mut points) = (line.weight(), line.points());
        egui::Window::new("Relationship").collapsible(false).show(ctx, |ui| {
            ui.label(line.setting_id());
            let mut changed = false;
            ui.horizontal(|ui| {
                ui.label("Weight:");
                changed |= ui.add(egui::DragValue::new(&mut weight).speed(0.1)).changed();
            });
            ui.horizontal(|ui| {
                ui.label("Points:");
                changed |= ui.add(egui::DragValue::new(&mut points).speed(1.0)).changed();
            });
            if changed {
                queue.0.push(EditorAction::SetRelationshipValues {
                    relationship: relationship.clone(),
                    weight,
                    points,
                });
            }
            ui.horizontal(|ui| {
                if ui.button("Delete").clicked() {
                    queue.0.push(EditorAction::RemoveRelationship(relationship.clone()));
                }
                if ui.button("Close").clicked() {
                    queue.0.push(EditorAction::CloseRelationship);
                }
            });
        });
    }
}

fn apply_actions(mut state: ResMut<EditorState>, mut queue: ResMut<QueuedActions>) {
    for action in std::mem::take(&mut queue.0) {
        let mut prompt = None;
        let result = {
            let mut ask = |message: &str| {
                prompt = Some(message.to_string());
                false
            };
            run(&mut state, &action, &mut ask)
        };
        match (result, prompt) {
            (Err(EditorError::Cancelled), Some(prompt)) => {
                state.pending = Some(PendingConfirmation { prompt, action });
            }
            (result, _) => report(&mut state, result),
        }
    }
}

fn report(state: &mut EditorState, result: Result<()>) {
    if let Err(err) = result {
        if !err.is_validation() {
            error!("{err}");
        }
        state.notice = Some(err.to_string());
    }
}

fn run(state: &mut EditorState, action: &EditorAction, confirm: &mut dyn crate::editor::Confirm) -> Result<()> {
    let editor = &mut state.editor;
    let structural = !matches!(
        action,
        EditorAction::BeginConnect(_)
            | EditorAction::CancelConnect
            | EditorAction::EditRelationship(_)
            | EditorAction::CloseRelationship
            | EditorAction::DragStart(_)
            | EditorAction::DragMove(_)
            | EditorAction::Zoom(_)
            | EditorAction::Save
    );
    match action {
        EditorAction::AddConversation => {
            editor.add_conversation();
        }
        EditorAction::AddResponse(conversation) => {
            editor.add_response(conversation, "")?;
        }
        EditorAction::AddOutcome(response) => {
            editor.add_outcome(response)?;
        }
        EditorAction::RemoveResponse(response) => editor.remove_response(response, confirm)?,
        EditorAction::RemoveConversation(conversation) => editor.remove_conversation(conversation, confirm)?,
        EditorAction::RemoveSubtree(conversation) => {
            editor.remove_subtree(conversation, confirm)?;
        }
        EditorAction::BeginConnect(response) => state.connecting_from = Some(response.clone()),
        EditorAction::CancelConnect => state.connecting_from = None,
        EditorAction::Connect { conversation, response } => {
            state.connecting_from = None;
            editor.connect(conversation, response)?;
        }
        EditorAction::EditRelationship(relationship) => {
            editor.begin_relationship_edit(relationship)?;
        }
        EditorAction::SetRelationshipValues {
            relationship,
            weight,
            points,
        } => editor.set_relationship_values(relationship, *weight, *points)?,
        EditorAction::CloseRelationship => editor.end_relationship_edit(),
        EditorAction::RemoveRelationship(relationship) => editor.remove_relationship(relationship, confirm)?,
        EditorAction::SetContext { conversation, context } => editor.set_context(conversation, context)?,
        EditorAction::SetResponseText { response, text } => editor.set_response_text(response, text)?,
        EditorAction::CycleExpression(conversation) => {
            editor.cycle_expression(conversation)?;
        }
        EditorAction::DragStart(conversation) => {
            editor.drag_start(conversation)?;
        }
        EditorAction::DragMove(delta) => {
            editor.drag_move(*delta);
        }
        EditorAction::DragEnd => {
            editor.drag_end();
        }
        EditorAction::Zoom(zoom) => {
            editor.set_zoom(*zoom);
        }
        EditorAction::Tidy => editor.tidy()?,
        EditorAction::Save => {
            let doc = editor.finish()?;
            storage::save_revision(&state.output, &doc)?;
            state.dirty = false;
            info!("saved scenario to {}", state.output.display());
            return Ok(());
        }
    }
    if structural {
        state.dirty = true;
    }
    Ok(())
}
