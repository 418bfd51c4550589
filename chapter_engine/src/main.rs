use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use chapter_engine::chapter_graph::ChapterGraph;
use chapter_engine::cli::Args;
use chapter_engine::runner::{run_chapter, RunOptions, RunReport};
use clap::Parser;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    args.validate()?;

    let mut graph = ChapterGraph::from_json_file(&args.chapters).context("loading chapter graph")?;
    if let Some(width) = args.frame_width {
        graph.frame.width = width;
    }
    if let Some(height) = args.frame_height {
        graph.frame.height = height;
    }
    if let Some(language) = args.language.clone() {
        graph.language = language;
    }

    let extra_script = match args.script.as_ref() {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?,
        ),
        None => None,
    };

    let options = RunOptions {
        start: args.enter,
        extra_script,
        pointer: args.pointer_events(),
        max_hops: args.max_hops,
    };
    let report = run_chapter(Rc::new(graph), options)?;

    if let Some(path) = args.report_json.as_ref() {
        persist_report(path, &report)?;
        println!("Saved run report to {}", path.display());
    }
    describe_report(&report);
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn persist_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing run report to JSON")?;
    fs::write(path, json).with_context(|| format!("writing run report to {}", path.display()))
}

fn describe_report(report: &RunReport) {
    println!("Visited chapters:");
    for (idx, chapter) in report.visited.iter().enumerate() {
        println!("  {:>2}. {} [{}]", idx + 1, chapter.name, chapter.uid);
    }
    match report.final_chapter.as_ref() {
        Some(chapter) => println!("Final chapter: {} [{}]", chapter.name, chapter.uid),
        None => println!("Final chapter: <none>"),
    }
    if report.hop_limit_reached {
        println!("!! hop limit reached; remaining jumps were dropped");
    }

    if !report.selections.is_empty() {
        println!("Selections:");
        for entry in &report.selections {
            println!(
                "  - {:<12} => {}",
                entry.group.as_deref().unwrap_or("<ungrouped>"),
                entry.uid
            );
        }
    }

    let failed = report.failed_scripts();
    println!(
        "Scripts run: {} | failed: {} | regions: {}",
        report.scripts.len(),
        failed,
        report.regions.len()
    );
}
