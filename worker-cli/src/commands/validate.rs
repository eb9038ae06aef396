use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use worker_service::{Checkpoint, GraphDocument};

/// Validate a build graph file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the build graph (YAML or JSON)
    pub graph: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let graph_path = &args.graph;

    if !graph_path.exists() {
        color_eyre::eyre::bail!("Graph file not found: {}", graph_path.display());
    }

    output::status("Validating", &format!("{}", graph_path.display()));

    let document = match GraphDocument::from_file(graph_path) {
        Ok(document) => document,
        Err(e) => {
            output::error(&e.message);
            std::process::exit(1);
        }
    };
    output::check("Syntax valid");

    let explicit = document.checkpoints.is_some();
    let graph = match document.into_graph() {
        Ok(graph) => graph,
        Err(e) => {
            output::error(&format!("{:?}: {}", e.kind, e.message));
            std::process::exit(1);
        }
    };
    output::check(&format!(
        "Structure: {} nodes, {} checkpoints ({})",
        graph.nodes().len(),
        graph.checkpoints().len(),
        if explicit { "explicit" } else { "derived" }
    ));

    println!();
    for (index, checkpoint) in graph.checkpoints().iter().enumerate() {
        let label = graph.checkpoint_label(checkpoint);
        match checkpoint {
            Checkpoint::Sequential(_) => println!("  {:>3}  {}", index, label),
            Checkpoint::FanOut(edges) => {
                println!("  {:>3}  fan-out[{}]: {}", index, edges.len(), label)
            }
        }
    }
    println!();

    output::success("Build graph is valid");
    Ok(())
}
