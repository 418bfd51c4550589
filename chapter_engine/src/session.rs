//! In-memory playback side of a chapter session.
//!
//! Stands in for the media player's chapter VM: it knows the chapter graph,
//! tracks the current chapter, queues jump requests issued by scripts, and
//! owns the choice overlay that committed choices are presented on.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use chapter_menu::{
    ChoiceGroup, ChoiceRegistry, ChoiceSet, ChoiceUid, OverlayController, RedrawList,
    SharedChoices,
};
use log::{debug, info};

use crate::chapter_graph::ChapterGraph;
use crate::navigation::{ChapterHandle, ChapterNavigator, ChapterUid};

pub struct PlaybackSession {
    graph: Rc<ChapterGraph>,
    current: Option<ChapterHandle>,
    pending_jumps: VecDeque<ChapterHandle>,
    visited: Vec<ChapterHandle>,
    choices: SharedChoices,
    redraw: Rc<RefCell<RedrawList>>,
    overlay: OverlayController,
    published: Vec<ChoiceSet>,
    events: Vec<String>,
}

impl PlaybackSession {
    pub fn new(graph: Rc<ChapterGraph>) -> Self {
        let choices = ChoiceRegistry::shared();
        let redraw = Rc::new(RefCell::new(RedrawList::new()));
        let overlay = OverlayController::new(
            graph.frame.width,
            graph.frame.height,
            choices.clone(),
            redraw.clone(),
        )
        .with_language(graph.language.clone());
        Self {
            graph,
            current: None,
            pending_jumps: VecDeque::new(),
            visited: Vec::new(),
            choices,
            redraw,
            overlay,
            published: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Rc<ChapterGraph> {
        &self.graph
    }

    pub fn choices(&self) -> SharedChoices {
        self.choices.clone()
    }

    pub fn log_event(&mut self, event: impl Into<String>) {
        let event = event.into();
        debug!("[session] {event}");
        self.events.push(event);
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Makes `uid` the current chapter without going through a jump.
    pub fn start_at(&mut self, uid: ChapterUid) -> Option<ChapterHandle> {
        let handle = self.graph.handle(uid)?;
        self.log_event(format!("chapter.start {}", handle.uid));
        self.visited.push(handle.clone());
        self.current = Some(handle.clone());
        Some(handle)
    }

    pub fn take_pending_jump(&mut self) -> Option<ChapterHandle> {
        self.pending_jumps.pop_front()
    }

    pub fn has_pending_jump(&self) -> bool {
        !self.pending_jumps.is_empty()
    }

    pub fn visited(&self) -> &[ChapterHandle] {
        &self.visited
    }

    pub fn published(&self) -> &[ChoiceSet] {
        &self.published
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayController {
        &mut self.overlay
    }

    pub fn redraw_list(&self) -> Ref<'_, RedrawList> {
        self.redraw.borrow()
    }

    pub fn handle_mouse_over(&mut self, x: u32, y: u32) {
        self.overlay.try_mouse_over(x, y);
    }

    /// Refreshes the overlay if input changed the selection.
    pub fn update_overlay(&mut self) -> bool {
        let redrawn = self.overlay.update();
        if redrawn {
            self.log_event("overlay.redraw");
        }
        redrawn
    }
}

impl ChapterNavigator for PlaybackSession {
    fn find_chapter_by_uid(&self, uid: ChapterUid) -> Option<ChapterHandle> {
        self.graph.handle(uid)
    }

    fn current_chapter(&self) -> Option<ChapterHandle> {
        self.current.clone()
    }

    fn enter_and_leave(
        &mut self,
        target: &ChapterHandle,
        current: Option<&ChapterHandle>,
        force: bool,
    ) -> bool {
        if !force && current == Some(target) {
            self.log_event(format!("chapter.reenter.skip {}", target.uid));
            return true;
        }
        false
    }

    fn jump_to(&mut self, segment: usize, chapter: &ChapterHandle) {
        info!("jumping to {chapter}");
        self.log_event(format!("chapter.jump {} {}", segment, chapter.uid));
        self.current = Some(chapter.clone());
        self.visited.push(chapter.clone());
        self.pending_jumps.push_back(chapter.clone());
    }

    fn add_choices(&mut self, choices: &ChoiceSet) {
        self.log_event(format!("choices.commit {}", choices.len()));
        self.overlay.present(choices);
        self.published.push(choices.clone());
    }

    fn get_choice(&self, group: &ChoiceGroup) -> Option<ChoiceUid> {
        self.choices.borrow().selected(group).map(str::to_string)
    }

    fn handle_mouse_clicked(&mut self, x: u32, y: u32) {
        let pressed = self.overlay.try_mouse_click(x, y);
        self.log_event(format!(
            "mouse.click {x},{y} {}",
            if pressed { "hit" } else { "miss" }
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PlaybackSession {
        let graph = ChapterGraph::from_json_str(
            r#"{
                "frame": { "width": 300, "height": 100 },
                "segments": [ { "chapters": [ { "uid": 1, "name": "One" }, { "uid": 2 } ] } ]
            }"#,
        )
        .expect("graph");
        PlaybackSession::new(Rc::new(graph))
    }

    #[test]
    fn self_reentry_is_suppressed_unless_forced() {
        let mut session = session();
        let one = session.start_at(1).expect("chapter 1");
        assert!(session.enter_and_leave(&one, Some(&one), false));
        assert!(!session.enter_and_leave(&one, Some(&one), true));
        let two = session.find_chapter_by_uid(2).unwrap();
        assert!(!session.enter_and_leave(&two, Some(&one), false));
    }

    #[test]
    fn jumps_are_queued_and_become_current() {
        let mut session = session();
        session.start_at(1);
        let two = session.find_chapter_by_uid(2).unwrap();
        session.jump_to(two.segment, &two);
        assert_eq!(session.current_chapter(), Some(two.clone()));
        assert_eq!(session.take_pending_jump(), Some(two));
        assert!(!session.has_pending_jump());
        assert_eq!(session.visited().len(), 2);
    }

    #[test]
    fn committed_choices_drive_clicks_into_selection() {
        let mut session = session();
        let set = {
            let choices = session.choices();
            let mut registry = choices.borrow_mut();
            registry.add_choice("left", Some("side".to_string()));
            registry.add_choice("right", Some("side".to_string()));
            registry.commit().unwrap()
        };
        session.add_choices(&set);
        assert_eq!(session.overlay().regions().len(), 2);

        session.handle_mouse_clicked(250, 95);
        assert!(session.update_overlay());
        assert_eq!(
            session.get_choice(&Some("side".to_string())).as_deref(),
            Some("right")
        );
        assert!(session
            .events()
            .iter()
            .any(|event| event == "mouse.click 250,95 hit"));
    }
}
