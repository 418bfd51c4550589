use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::navigation::ChapterUid;
use crate::runner::{PointerEvent, DEFAULT_MAX_HOPS};

#[derive(Parser, Debug)]
#[command(
    about = "Runs Matroska chapter-codec scripts against a chapter graph and its choice overlay",
    version
)]
pub struct Args {
    /// Path to the chapter graph JSON (segments, chapters and their scripts)
    #[arg(long)]
    pub chapters: PathBuf,

    /// Chapter uid to enter first (default: first chapter of the graph)
    #[arg(long)]
    pub enter: Option<ChapterUid>,

    /// Extra script file evaluated once the entry chapter has settled
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Pointer event as click:X,Y or hover:X,Y; repeatable, replayed in
    /// command-line order before any --hover and --click
    #[arg(long, value_parser = parse_pointer_event)]
    pub pointer: Vec<PointerEvent>,

    /// Pointer press at X,Y in frame pixels; repeatable, replayed after all
    /// --pointer and --hover events
    #[arg(long, value_parser = parse_point)]
    pub click: Vec<(u32, u32)>,

    /// Pointer move at X,Y in frame pixels; repeatable, replayed after all
    /// --pointer events and before any --click
    #[arg(long, value_parser = parse_point)]
    pub hover: Vec<(u32, u32)>,

    /// Override the frame width from the chapter graph
    #[arg(long)]
    pub frame_width: Option<u32>,

    /// Override the frame height from the chapter graph
    #[arg(long)]
    pub frame_height: Option<u32>,

    /// Language used for button labels
    #[arg(long)]
    pub language: Option<String>,

    /// Maximum number of chapter jumps followed in one run
    #[arg(long, default_value_t = DEFAULT_MAX_HOPS)]
    pub max_hops: usize,

    /// Path to write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Log script commands and session events
    #[arg(long)]
    pub verbose: bool,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.frame_width == Some(0) || self.frame_height == Some(0) {
            bail!("--frame-width and --frame-height must be non-zero");
        }
        Ok(())
    }

    /// Pointer input in replay order: `--pointer` entries as given, then
    /// `--hover`, then `--click`.
    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        let ordered = self.pointer.iter().copied();
        let hovers = self
            .hover
            .iter()
            .map(|&(x, y)| PointerEvent::Hover { x, y });
        let clicks = self
            .click
            .iter()
            .map(|&(x, y)| PointerEvent::Click { x, y });
        ordered.chain(hovers).chain(clicks).collect()
    }
}

fn parse_pointer_event(raw: &str) -> Result<PointerEvent> {
    let (kind, point) = raw
        .split_once(':')
        .with_context(|| format!("expected click:X,Y or hover:X,Y but got '{raw}'"))?;
    let (x, y) = parse_point(point)?;
    match kind.trim() {
        "click" => Ok(PointerEvent::Click { x, y }),
        "hover" => Ok(PointerEvent::Hover { x, y }),
        other => bail!("unknown pointer event kind '{other}' in '{raw}'"),
    }
}

fn parse_point(raw: &str) -> Result<(u32, u32)> {
    let (x, y) = raw
        .split_once(',')
        .with_context(|| format!("expected X,Y but got '{raw}'"))?;
    let x = x
        .trim()
        .parse()
        .with_context(|| format!("invalid x coordinate in '{raw}'"))?;
    let y = y
        .trim()
        .parse()
        .with_context(|| format!("invalid y coordinate in '{raw}'"))?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points_and_orders_pointer_events() {
        let args = Args::try_parse_from([
            "chapter_engine",
            "--chapters",
            "graph.json",
            "--click",
            "250,95",
            "--hover",
            " 10 , 20 ",
            "--click",
            "5,5",
        ])
        .expect("args parse");
        assert_eq!(args.max_hops, DEFAULT_MAX_HOPS);
        assert_eq!(
            args.pointer_events(),
            [
                PointerEvent::Hover { x: 10, y: 20 },
                PointerEvent::Click { x: 250, y: 95 },
                PointerEvent::Click { x: 5, y: 5 },
            ]
        );
    }

    #[test]
    fn pointer_option_keeps_mixed_input_in_order() {
        let args = Args::try_parse_from([
            "chapter_engine",
            "--chapters",
            "graph.json",
            "--pointer",
            "click:50,95",
            "--pointer",
            "hover:150,95",
            "--pointer",
            "click:250,95",
            "--hover",
            "1,1",
        ])
        .expect("args parse");
        assert_eq!(
            args.pointer_events(),
            [
                PointerEvent::Click { x: 50, y: 95 },
                PointerEvent::Hover { x: 150, y: 95 },
                PointerEvent::Click { x: 250, y: 95 },
                PointerEvent::Hover { x: 1, y: 1 },
            ]
        );
        assert!(parse_pointer_event("drag:1,2").is_err());
        assert!(parse_pointer_event("1,2").is_err());
    }

    #[test]
    fn rejects_malformed_points() {
        assert!(parse_point("12").is_err());
        assert!(parse_point("a,1").is_err());
        assert!(parse_point("-1,3").is_err());
    }

    #[test]
    fn zero_frame_size_is_rejected() {
        let args = Args::try_parse_from([
            "chapter_engine",
            "--chapters",
            "graph.json",
            "--frame-width",
            "0",
        ])
        .expect("args parse");
        assert!(args.validate().is_err());
    }
}
