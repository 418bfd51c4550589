use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::navigation::{ChapterHandle, ChapterUid};

pub const DEFAULT_FRAME_WIDTH: u32 = 1920;
pub const DEFAULT_FRAME_HEIGHT: u32 = 1080;

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

/// Scripts attached to one chapter, keyed by the moment they run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterScripts {
    #[serde(default)]
    pub enter: Option<String>,
    #[serde(default)]
    pub leave: Option<String>,
    /// Runs once pointer input for the chapter's menu has been replayed.
    #[serde(default)]
    pub after_input: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub uid: ChapterUid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub scripts: ChapterScripts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub chapters: Vec<ChapterEntry>,
}

/// Chapter layout of a playback session, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterGraph {
    #[serde(default)]
    pub frame: FrameSize,
    #[serde(default = "default_language")]
    pub language: String,
    pub segments: Vec<SegmentEntry>,
    #[serde(skip)]
    index: BTreeMap<ChapterUid, (usize, usize)>,
}

impl ChapterGraph {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read chapter graph: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to parse chapter graph: {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let graph: ChapterGraph = serde_json::from_str(raw).context("decoding chapter graph")?;
        graph.indexed()
    }

    pub fn new(segments: Vec<SegmentEntry>) -> Result<Self> {
        ChapterGraph {
            frame: FrameSize::default(),
            language: default_language(),
            segments,
            index: BTreeMap::new(),
        }
        .indexed()
    }

    fn indexed(mut self) -> Result<Self> {
        let mut index = BTreeMap::new();
        for (segment_idx, segment) in self.segments.iter().enumerate() {
            for (chapter_idx, chapter) in segment.chapters.iter().enumerate() {
                if index.insert(chapter.uid, (segment_idx, chapter_idx)).is_some() {
                    bail!("chapter uid {} appears more than once", chapter.uid);
                }
            }
        }
        self.index = index;
        Ok(self)
    }

    pub fn chapter(&self, uid: ChapterUid) -> Option<&ChapterEntry> {
        let (segment, chapter) = *self.index.get(&uid)?;
        self.segments.get(segment)?.chapters.get(chapter)
    }

    pub fn handle(&self, uid: ChapterUid) -> Option<ChapterHandle> {
        let (segment, _) = *self.index.get(&uid)?;
        let entry = self.chapter(uid)?;
        Some(ChapterHandle {
            uid,
            segment,
            name: entry
                .name
                .clone()
                .unwrap_or_else(|| format!("chapter {uid}")),
        })
    }

    pub fn scripts(&self, uid: ChapterUid) -> Option<&ChapterScripts> {
        self.chapter(uid).map(|entry| &entry.scripts)
    }

    pub fn first_chapter(&self) -> Option<ChapterUid> {
        self.segments
            .iter()
            .flat_map(|segment| segment.chapters.iter())
            .map(|chapter| chapter.uid)
            .next()
    }

    pub fn chapter_count(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "frame": { "width": 640, "height": 360 },
        "segments": [
            { "name": "main", "chapters": [
                { "uid": 10, "name": "Intro", "enter": "LogMsg('hi')" },
                { "uid": 11 }
            ] },
            { "chapters": [ { "uid": 20, "after_input": "GetChoice('g')" } ] }
        ]
    }"#;

    #[test]
    fn parses_segments_and_scripts() {
        let graph = ChapterGraph::from_json_str(SAMPLE).expect("graph parses");
        assert_eq!(graph.frame.width, 640);
        assert_eq!(graph.language, "en");
        assert_eq!(graph.chapter_count(), 3);
        assert_eq!(graph.first_chapter(), Some(10));

        let intro = graph.handle(10).expect("intro exists");
        assert_eq!(intro.name, "Intro");
        assert_eq!(intro.segment, 0);
        assert_eq!(
            graph.scripts(10).and_then(|s| s.enter.as_deref()),
            Some("LogMsg('hi')")
        );

        let late = graph.handle(20).expect("second segment chapter");
        assert_eq!(late.segment, 1);
        assert_eq!(late.name, "chapter 20");
        assert!(graph.scripts(20).unwrap().after_input.is_some());
        assert!(graph.handle(99).is_none());
    }

    #[test]
    fn duplicate_uids_are_rejected() {
        let raw = r#"{ "segments": [ { "chapters": [ { "uid": 1 }, { "uid": 1 } ] } ] }"#;
        let err = ChapterGraph::from_json_str(raw).expect_err("duplicate uid");
        assert!(format!("{err:#}").contains("more than once"));
    }

    #[test]
    fn reads_graph_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("chapters.json");
        fs::write(&path, SAMPLE)?;
        let graph = ChapterGraph::from_json_file(&path)?;
        assert_eq!(graph.frame.height, 360);
        Ok(())
    }
}
