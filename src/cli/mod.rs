//! CLI subcommands — init, validate, graph, synth.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use crate::core::{graph, parser, synth, types};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new tejer project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a composition file without synthesizing
    Validate {
        /// Path to the composition file
        #[arg(short, long, default_value = "tejer.yaml")]
        file: PathBuf,
    },

    /// Show the derived dependency graph and synthesis order
    Graph {
        /// Path to the composition file
        #[arg(short, long, default_value = "tejer.yaml")]
        file: PathBuf,
    },

    /// Synthesize artifacts in dependency order
    Synth {
        /// Path to the composition file
        #[arg(short, long, default_value = "tejer.yaml")]
        file: PathBuf,

        /// Output directory for artifacts
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Graph { file } => cmd_graph(&file),
        Commands::Synth { file, out_dir } => cmd_synth(&file, &out_dir),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("tejer.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let template = r#"version: "1.0"
name: my-composition

# Declare stacks, their resources, and the references wired between them.
# See demos/pipeline.yaml in the tejer repository for a worked example.
stacks: {}
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized tejer project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let composition = parser::parse_composition_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_composition(&composition);

    if errors.is_empty() {
        let resources: usize = composition
            .stacks
            .values()
            .map(|s| s.resources.len())
            .sum();
        println!(
            "OK: {} ({} stacks, {} resources)",
            composition.name,
            composition.stacks.len(),
            resources
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a composition file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::Composition, String> {
    let composition = parser::parse_composition_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_composition(&composition);
    if errors.is_empty() {
        return Ok(composition);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

fn cmd_graph(file: &Path) -> Result<(), String> {
    let composition = parse_and_validate(file)?;
    let plan = graph::build(&composition).map_err(|e| e.to_string())?;

    println!(
        "Composition: {} ({} stacks)",
        composition.name,
        plan.order.len()
    );
    println!();
    println!("Synthesis order:");
    for (i, id) in plan.order.iter().enumerate() {
        println!("  {}. {}", i + 1, id);
    }
    println!();
    if plan.edges.is_empty() {
        println!("Edges: none (all stacks independent)");
    } else {
        println!("Edges:");
        for edge in &plan.edges {
            println!("  {} -> {}", edge.from, edge.to);
        }
    }
    Ok(())
}

fn cmd_synth(file: &Path, out_dir: &Path) -> Result<(), String> {
    let composition = parse_and_validate(file)?;
    let plan = graph::build(&composition).map_err(|e| e.to_string())?;
    let synthesis = synth::synthesize(&composition, &plan).map_err(|e| e.to_string())?;

    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("cannot create {}: {}", out_dir.display(), e))?;

    for artifact in &synthesis.artifacts {
        let path = out_dir.join(format!("{}.json", artifact.stack));
        let json = serde_json::to_string_pretty(artifact)
            .map_err(|e| format!("artifact serialize error: {}", e))?;
        std::fs::write(&path, json)
            .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        println!(
            "  {}: {} resources, {} exports ({})",
            artifact.stack,
            artifact.resources.len(),
            artifact.exports.len(),
            artifact.fingerprint
        );
    }

    write_manifest(out_dir, &composition, &plan)?;
    write_events(out_dir, &synthesis.events)?;

    println!();
    println!(
        "Synthesized {} artifacts to {}/ (apply in manifest order).",
        synthesis.artifacts.len(),
        out_dir.display()
    );
    Ok(())
}

/// Apply order and the raw edge set, for executors that fan out.
fn write_manifest(
    out_dir: &Path,
    composition: &types::Composition,
    plan: &types::SynthesisPlan,
) -> Result<(), String> {
    let manifest = serde_json::json!({
        "composition": composition.name,
        "order": plan.order,
        "edges": plan.edges,
    });
    let path = out_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| format!("manifest serialize error: {}", e))?;
    std::fs::write(&path, json).map_err(|e| format!("cannot write {}: {}", path.display(), e))
}

/// Append-style JSONL event log of the synthesis run.
fn write_events(out_dir: &Path, events: &[types::SynthesisEvent]) -> Result<(), String> {
    let mut lines = String::new();
    for event in events {
        let json =
            serde_json::to_string(event).map_err(|e| format!("event serialize error: {}", e))?;
        lines.push_str(&json);
        lines.push('\n');
    }
    let path = out_dir.join("events.jsonl");
    std::fs::write(&path, lines).map_err(|e| format!("cannot write {}: {}", path.display(), e))
}
