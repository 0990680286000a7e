use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy::window::{Window, WindowPlugin};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scenario_drawer::app::{EditorPlugin, EditorState};
use scenario_drawer::builder::ScenarioBuilder;
use scenario_drawer::constants::{WINDOW_HEIGHT, WINDOW_WIDTH};
use scenario_drawer::editor::Editor;
use scenario_drawer::graph::Scenario;
use scenario_drawer::ids::UuidIds;
use scenario_drawer::layout::LayoutEngine;
use scenario_drawer::schema::EditorConfig;
use scenario_drawer::{revision, storage, validate};

const DEFAULT_CHARACTER: &str = "default";

#[derive(Parser)]
#[command(name = "scenario_drawer", version, about = "Branching dialogue scenario editor")]
struct Cli {
    #[arg(long, global = true, help = "Scenario file (config, revision or legacy document)")]
    scenario: Option<PathBuf>,

    #[arg(long, global = true, help = "Character whose expression images are used")]
    character: Option<String>,

    #[arg(long, global = true, help = "Where saves and exports are written")]
    output: Option<PathBuf>,

    #[arg(long, global = true, help = "Layout settings JSON")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    #[command(about = "Check the scenario for orphans, dead ends, cycles and unreachable conversations")]
    Validate,
    #[command(about = "Rewrite the scenario in the current revision schema")]
    Migrate,
    #[command(about = "Lay the scenario out and write it as an SVG scene")]
    ExportSvg,
    #[command(about = "Write the scenario in the legacy question/answer schema")]
    ExportLegacy,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        None => match open_editor(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        Some(ref command) => {
            init_tracing();
            match run_headless(&cli, command) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    tracing::error!("{err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> scenario_drawer::Result<EditorConfig> {
    match &cli.scenario {
        Some(path) => storage::load_config(path, cli.character.as_deref()),
        None => Ok(EditorConfig::fresh(cli.character.as_deref().unwrap_or(DEFAULT_CHARACTER))),
    }
}

fn load_scenario(cli: &Cli) -> scenario_drawer::Result<Scenario> {
    let config = load_config(cli)?;
    Ok(ScenarioBuilder::from_config(&config, Box::new(UuidIds)))
}

fn output_path(cli: &Cli, default: &str) -> PathBuf {
    cli.output.clone().unwrap_or_else(|| PathBuf::from(default))
}

fn run_headless(cli: &Cli, command: &CliCommand) -> scenario_drawer::Result<()> {
    let scenario = load_scenario(cli)?;
    match command {
        CliCommand::Validate => {
            for msg in validate::report(&scenario) {
                println!("{msg}");
            }
            validate::validate_for_save(&scenario)
        }
        CliCommand::Migrate => {
            let path = output_path(cli, "scenario.json");
            storage::save_revision(&path, &revision::to_revision(&scenario))
        }
        CliCommand::ExportSvg => {
            let path = output_path(cli, "scenario.svg");
            let mut layout = LayoutEngine::new(storage::load_layout_config(cli.settings.as_deref())?);
            layout.layout(&scenario);
            let document = revision::render_svg(&scenario, &mut layout)?;
            ensure_parent(&path)?;
            svg::save(&path, &document)?;
            tracing::info!("wrote {}", path.display());
            Ok(())
        }
        CliCommand::ExportLegacy => {
            let path = output_path(cli, "scenario.legacy.json");
            storage::save_legacy(&path, &revision::to_legacy(&scenario))
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

fn open_editor(cli: &Cli) -> scenario_drawer::Result<()> {
    let scenario = load_scenario(cli)?;
    let layout = storage::load_layout_config(cli.settings.as_deref())?;
    let output = output_path(cli, "scenario.json");
    let editor = Editor::new(scenario, layout);

    App::new()
        .add_plugins(
            DefaultPlugins
                .set(LogPlugin {
                    level: Level::INFO,
                    filter: "wgpu=error,bevy_render=warn".to_string(),
                    ..default()
                })
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Scenario Drawer".to_string(),
                        resolution: (WINDOW_WIDTH as u32, WINDOW_HEIGHT as u32).into(),
                        ..default()
                    }),
                    ..default()
                }),
        )
        .add_plugins(EditorPlugin)
        .insert_resource(EditorState::new(editor, output))
        .run();
    Ok(())
}
