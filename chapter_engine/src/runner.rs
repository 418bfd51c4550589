//! Drives one playback session: enters a chapter, follows the jumps its
//! scripts request, replays pointer input against the choice overlay and
//! collects everything observable into a [`RunReport`].

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use chapter_menu::{ChoiceGroup, ChoiceSet, ChoiceUid, InteractiveRegion, RegionPrimitive};
use log::{info, warn};
use serde::Serialize;

use crate::chapter_graph::ChapterGraph;
use crate::navigation::{ChapterHandle, ChapterNavigator, ChapterUid};
use crate::script_host::ChapterScriptInterpreter;
use crate::session::PlaybackSession;

pub const DEFAULT_MAX_HOPS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Click { x: u32, y: u32 },
    Hover { x: u32, y: u32 },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Chapter to enter first; defaults to the first chapter of the graph.
    pub start: Option<ChapterUid>,
    /// Ad-hoc script evaluated after the entry chapter settles.
    pub extra_script: Option<String>,
    pub pointer: Vec<PointerEvent>,
    pub max_hops: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start: None,
            extra_script: None,
            pointer: Vec::new(),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStage {
    Enter,
    Leave,
    Extra,
    AfterInput,
}

impl ScriptStage {
    pub fn label(self) -> &'static str {
        match self {
            ScriptStage::Enter => "enter",
            ScriptStage::Leave => "leave",
            ScriptStage::Extra => "extra",
            ScriptStage::AfterInput => "after_input",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptOutcome {
    pub chapter: ChapterUid,
    pub stage: ScriptStage,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionEntry {
    pub group: ChoiceGroup,
    pub uid: ChoiceUid,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub visited: Vec<ChapterHandle>,
    pub final_chapter: Option<ChapterHandle>,
    pub hop_limit_reached: bool,
    pub scripts: Vec<ScriptOutcome>,
    pub published_choices: Vec<ChoiceSet>,
    pub selections: Vec<SelectionEntry>,
    pub regions: Vec<InteractiveRegion>,
    pub redraw: Vec<RegionPrimitive>,
    pub events: Vec<String>,
}

impl RunReport {
    pub fn selection(&self, group: Option<&str>) -> Option<&str> {
        self.selections
            .iter()
            .find(|entry| entry.group.as_deref() == group)
            .map(|entry| entry.uid.as_str())
    }

    pub fn failed_scripts(&self) -> usize {
        self.scripts.iter().filter(|outcome| !outcome.ok).count()
    }
}

struct ChapterRun {
    graph: Rc<ChapterGraph>,
    session: Rc<RefCell<PlaybackSession>>,
    interpreter: ChapterScriptInterpreter,
    outcomes: Vec<ScriptOutcome>,
}

impl ChapterRun {
    fn run_stage(&mut self, chapter: ChapterUid, stage: ScriptStage) {
        let Some(scripts) = self.graph.scripts(chapter) else {
            return;
        };
        let source = match stage {
            ScriptStage::Enter => scripts.enter.clone(),
            ScriptStage::Leave => scripts.leave.clone(),
            ScriptStage::AfterInput => scripts.after_input.clone(),
            ScriptStage::Extra => None,
        };
        if let Some(source) = source {
            self.run_source(chapter, stage, &source);
        }
    }

    fn run_source(&mut self, chapter: ChapterUid, stage: ScriptStage, source: &str) {
        let ok = self.interpreter.interpret(source.as_bytes());
        let stage_label = stage.label();
        if !ok {
            warn!("{stage_label} script of chapter {chapter} failed");
        }
        let status = if ok { "ok" } else { "failed" };
        self.session
            .borrow_mut()
            .log_event(format!("script.{stage_label} {chapter} {status}"));
        self.outcomes.push(ScriptOutcome { chapter, stage, ok });
    }

    /// Follows queued jumps until none remain or `max_hops` were taken.
    /// Returns whether the limit cut the chain short.
    fn follow_jumps(&mut self, from: &mut ChapterUid, max_hops: usize, hops: &mut usize) -> bool {
        loop {
            let next = self.session.borrow_mut().take_pending_jump();
            let Some(next) = next else {
                return false;
            };
            if *hops >= max_hops {
                warn!("hop limit {max_hops} reached before entering {next}");
                self.session
                    .borrow_mut()
                    .log_event(format!("chapter.hop_limit {}", next.uid));
                return true;
            }
            *hops += 1;
            self.run_stage(*from, ScriptStage::Leave);
            *from = next.uid;
            self.run_stage(next.uid, ScriptStage::Enter);
        }
    }
}

pub fn run_chapter(graph: Rc<ChapterGraph>, options: RunOptions) -> Result<RunReport> {
    let start = options
        .start
        .or_else(|| graph.first_chapter())
        .ok_or_else(|| anyhow!("chapter graph has no chapters"))?;

    let session = Rc::new(RefCell::new(PlaybackSession::new(graph.clone())));
    if session.borrow_mut().start_at(start).is_none() {
        return Err(anyhow!("start chapter {start} is not part of the graph"));
    }
    let choices = session.borrow().choices();
    let interpreter = ChapterScriptInterpreter::new(session.clone(), choices)?;

    let mut run = ChapterRun {
        graph,
        session: session.clone(),
        interpreter,
        outcomes: Vec::new(),
    };

    info!("entering chapter {start}");
    let mut current = start;
    let mut hops = 0usize;
    run.run_stage(current, ScriptStage::Enter);
    let mut hop_limit_reached = run.follow_jumps(&mut current, options.max_hops, &mut hops);

    if let Some(source) = options.extra_script.as_deref() {
        run.run_source(current, ScriptStage::Extra, source);
        hop_limit_reached |= run.follow_jumps(&mut current, options.max_hops, &mut hops);
    }

    for event in &options.pointer {
        match *event {
            PointerEvent::Click { x, y } => run.interpreter.handle_mouse_pressed(x, y),
            PointerEvent::Hover { x, y } => session.borrow_mut().handle_mouse_over(x, y),
        }
        session.borrow_mut().update_overlay();
    }

    run.run_stage(current, ScriptStage::AfterInput);
    hop_limit_reached |= run.follow_jumps(&mut current, options.max_hops, &mut hops);

    let ChapterRun { outcomes, .. } = run;
    let state = session.borrow();
    let choices = state.choices();
    let selections: Vec<SelectionEntry> = choices
        .borrow()
        .selections()
        .iter()
        .map(|(group, uid)| SelectionEntry {
            group: group.clone(),
            uid: uid.clone(),
        })
        .collect();
    let redraw = state.redraw_list().regions().to_vec();

    let report = RunReport {
        visited: state.visited().to_vec(),
        final_chapter: state.current_chapter(),
        hop_limit_reached,
        scripts: outcomes,
        published_choices: state.published().to_vec(),
        selections,
        regions: state.overlay().regions(),
        redraw,
        events: state.events().to_vec(),
    };
    Ok(report)
}
