use std::fmt;

use chapter_menu::{ChoiceGroup, ChoiceSet, ChoiceUid};
use serde::Serialize;

pub type ChapterUid = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterHandle {
    pub uid: ChapterUid,
    pub segment: usize,
    pub name: String,
}

impl fmt::Display for ChapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{}, segment {})", self.name, self.uid, self.segment)
    }
}

/// Playback-side operations chapter scripts are allowed to trigger.
pub trait ChapterNavigator {
    fn find_chapter_by_uid(&self, uid: ChapterUid) -> Option<ChapterHandle>;

    fn current_chapter(&self) -> Option<ChapterHandle>;

    /// Leaves `current` and enters `target`. Returns true when the
    /// transition is already taken care of and no jump must be issued.
    fn enter_and_leave(
        &mut self,
        target: &ChapterHandle,
        current: Option<&ChapterHandle>,
        force: bool,
    ) -> bool;

    fn jump_to(&mut self, segment: usize, chapter: &ChapterHandle);

    /// Publishes a committed choice set for presentation.
    fn add_choices(&mut self, choices: &ChoiceSet);

    fn get_choice(&self, group: &ChoiceGroup) -> Option<ChoiceUid>;

    fn handle_mouse_clicked(&mut self, x: u32, y: u32);
}
