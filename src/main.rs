//! notegraph CLI - query the link graph of a notes folder

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use notegraph::config::Settings;
use notegraph::highlight::classify_links;
use notegraph::inclusion::InclusionResolver;
use notegraph::patterns::outline;
use notegraph::rename::{DocumentChange, OpenDocument, Propagator};
use notegraph::resolve::TargetResolver;
use notegraph::vault::graph::LinkGraph;
use notegraph::vault::{workspace_relative, Workspace};

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(about = "Link graph index for folders of markdown notes", long_about = None)]
struct Cli {
    /// Workspace root
    #[arg(long, global = true, default_value = ".", env = "NOTEGRAPH_ROOT")]
    root: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace and print index statistics
    Scan,

    /// Documents linking to FILE
    Backlinks { file: PathBuf },

    /// Forward links of FILE with their resolution
    Links { file: PathBuf },

    /// Link spans of FILE marked valid, broken or fenced
    Check { file: PathBuf },

    /// Render FILE to HTML with inclusions expanded
    Render {
        file: PathBuf,

        /// Override the configured maximum inclusion depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Headings of FILE
    Outline { file: PathBuf },

    /// Groups of documents that include each other
    Cycles,

    /// Rewrite references after OLD was renamed to NEW
    Rename {
        old: PathBuf,
        new: PathBuf,

        /// Write the rewritten documents back to disk
        #[arg(long)]
        write: bool,
    },

    /// Remove references to a deleted FILE
    Delete {
        file: PathBuf,

        /// Write the rewritten documents back to disk
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("NOTEGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let settings = Settings::new(&cli.root).context("loading settings")?;

    match cli.command {
        Commands::Scan => cmd_scan(&cli.root, settings, cli.json),
        Commands::Backlinks { file } => cmd_backlinks(&cli.root, settings, &file, cli.json),
        Commands::Links { file } => cmd_links(&cli.root, settings, &file, cli.json),
        Commands::Check { file } => cmd_check(&settings, &file, cli.json),
        Commands::Render { file, max_depth } => cmd_render(&settings, &file, max_depth, cli.json),
        Commands::Outline { file } => cmd_outline(&file, cli.json),
        Commands::Cycles => cmd_cycles(&cli.root, settings, cli.json),
        Commands::Rename { old, new, write } => {
            let propagator = Propagator::new(settings.clone());
            propagate(&cli.root, &settings, write, cli.json, |docs| {
                propagator.on_rename(&old, &new, docs)
            })
        }
        Commands::Delete { file, write } => {
            let propagator = Propagator::new(settings.clone());
            propagate(&cli.root, &settings, write, cli.json, |docs| {
                propagator.on_delete(&file, docs)
            })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn built_graph(root: &Path, settings: Settings) -> Result<LinkGraph> {
    let graph = LinkGraph::new(settings);
    let report = graph.build_from_scan(root)?;
    for skipped in &report.skipped {
        eprintln!(
            "skipped {}: {}",
            skipped
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            skipped.reason
        );
    }
    Ok(graph)
}

/// `path` relative to the scanned root when it lies inside it.
fn shown(graph: &LinkGraph, path: &Path) -> String {
    graph
        .root_dir()
        .and_then(|root| workspace_relative(&root, path))
        .filter(|relative| !relative.starts_with(".."))
        .unwrap_or_else(|| path.display().to_string())
}

fn cmd_scan(root: &Path, settings: Settings, json: bool) -> Result<()> {
    let graph = built_graph(root, settings)?;
    let stats = graph.stats();

    if json {
        return print_json(&stats);
    }
    println!("documents:        {}", stats.documents);
    println!("links:            {}", stats.links);
    println!("  resolved:       {}", stats.resolved_links);
    println!("  unresolved:     {}", stats.unresolved_links);
    println!("linked documents: {}", stats.linked_documents);
    println!("inclusion cycles: {}", stats.inclusion_cycles);
    Ok(())
}

fn cmd_backlinks(root: &Path, settings: Settings, file: &Path, json: bool) -> Result<()> {
    let graph = built_graph(root, settings)?;
    let backlinks = graph.backlinks_for(file);

    if json {
        return print_json(&backlinks);
    }
    for path in backlinks {
        println!("{}", shown(&graph, &path));
    }
    Ok(())
}

fn cmd_links(root: &Path, settings: Settings, file: &Path, json: bool) -> Result<()> {
    let graph = built_graph(root, settings)?;
    let links = graph.resolved_links(file);

    if json {
        return print_json(&links);
    }
    for link in links {
        match link.target.path() {
            Some(path) => println!("{} -> {}", link.raw_target, shown(&graph, path)),
            None => println!("{} -> (unresolved)", link.raw_target),
        }
    }
    Ok(())
}

fn cmd_check(settings: &Settings, file: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let spans = classify_links(&text, file, &TargetResolver::new(settings));

    if json {
        return print_json(&spans);
    }
    for span in spans {
        println!(
            "{}:{} {} {:?}",
            span.range.start.line + 1,
            span.range.start.character + 1,
            span.raw_target,
            span.status
        );
    }
    Ok(())
}

fn cmd_render(settings: &Settings, file: &Path, max_depth: Option<usize>, json: bool) -> Result<()> {
    let resolver = InclusionResolver::new(settings);
    let rendered = match max_depth {
        Some(depth) => resolver.render_with_inclusions(file, depth)?,
        None => resolver.render(file)?,
    };

    if json {
        return print_json(&rendered);
    }
    println!("{}", rendered.html);
    for error in rendered.errors() {
        eprintln!("{}: {} {:?}", error.source.display(), error.raw_target, error.status);
    }
    Ok(())
}

fn cmd_outline(file: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let headings = outline(&text);

    if json {
        return print_json(&headings);
    }
    for heading in headings {
        println!(
            "{}{}",
            "  ".repeat(heading.level.0.saturating_sub(1)),
            heading.heading_text
        );
    }
    Ok(())
}

fn cmd_cycles(root: &Path, settings: Settings, json: bool) -> Result<()> {
    let graph = built_graph(root, settings)?;
    let cycles = graph.inclusion_cycles();

    if json {
        return print_json(&cycles);
    }
    for cycle in cycles {
        let names = cycle.iter().map(|p| shown(&graph, p)).collect::<Vec<_>>();
        println!("{}", names.join(" -> "));
    }
    Ok(())
}

/// Treats every workspace document as open, rewrites them and reports the edits.
fn propagate(
    root: &Path,
    settings: &Settings,
    write: bool,
    json: bool,
    apply: impl FnOnce(&mut [OpenDocument]) -> Vec<DocumentChange>,
) -> Result<()> {
    let workspace = Workspace::discover(settings, root)?;
    let mut documents = workspace
        .documents()
        .iter()
        .filter_map(|path| match fs::read_to_string(path) {
            Ok(text) => Some(OpenDocument::new(path.clone(), text)),
            Err(err) => {
                eprintln!("skipped {}: {err}", path.display());
                None
            }
        })
        .collect::<Vec<_>>();

    let changes = apply(&mut documents);

    if write {
        for change in &changes {
            if let Some(document) = documents.iter().find(|doc| doc.path == change.path) {
                fs::write(&document.path, &document.text)
                    .with_context(|| format!("writing {}", document.path.display()))?;
            }
        }
    }

    if json {
        return print_json(&changes);
    }
    for change in &changes {
        println!("{}: {} edit(s)", change.path.display(), change.edits.len());
        for edit in &change.edits {
            println!(
                "  {}:{} -> {:?}",
                edit.position.start.line + 1,
                edit.position.start.character + 1,
                edit.new_text
            );
        }
    }
    Ok(())
}
