//! Choice palette drawn over the bottom of the video frame.
//!
//! One button per committed choice, tiled left to right across the frame
//! width and one tenth of the frame height tall. Buttons never store whether
//! they are selected; that is read from the shared [`ChoiceRegistry`] every
//! time they are drawn.
//!
//! [`ChoiceRegistry`]: crate::choices::ChoiceRegistry

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::Serialize;

use crate::choices::{ChapterChoice, ChoiceGroup, ChoiceSet, ChoiceUid, SharedChoices};
use crate::mouse::{MouseDispatcher, MouseOperable, RegionBounds};
use crate::render::{
    Outline, RedrawSink, RegionRect, TextStyle, BUTTON_BACKGROUND, BUTTON_FONT_COLOR,
    SELECTED_OUTLINE_COLOR,
};

/// Buttons take this fraction (1/N) of the frame height.
pub const BUTTON_HEIGHT_DIVISOR: u32 = 10;
const OUTLINE_WIDTH_DIVISOR: u32 = 30;

pub const DEFAULT_OVERLAY_LANGUAGE: &str = "en";

pub type SharedSink = Rc<RefCell<dyn RedrawSink>>;

/// State the buttons reach through when pressed or redrawn.
pub struct ChoicePalette {
    choices: SharedChoices,
    sink: SharedSink,
    language: String,
    button_width: u32,
    button_height: u32,
}

impl ChoicePalette {
    pub fn mark_group_choice_selected(&mut self, uid: &str, group: &ChoiceGroup) {
        debug!("choice {uid} selected in group {}", group_label(group));
        self.choices.borrow_mut().set_selected(uid, group.clone());
    }

    pub fn is_choice_selected(&self, uid: &str, group: &ChoiceGroup) -> bool {
        self.choices.borrow().is_selected(uid, group)
    }

    pub fn button_width(&self) -> u32 {
        self.button_width
    }

    pub fn button_height(&self) -> u32 {
        self.button_height
    }
}

#[derive(Debug, Clone)]
pub struct ChoiceButton {
    uid: ChoiceUid,
    group: ChoiceGroup,
    label: String,
    index: u32,
    bounds: RegionBounds,
}

impl ChoiceButton {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn group(&self) -> &ChoiceGroup {
        &self.group
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    fn rect(&self) -> RegionRect {
        RegionRect {
            x: self.bounds.x_start,
            y: self.bounds.y_start,
            width: self.bounds.x_end - self.bounds.x_start,
            height: self.bounds.y_end - self.bounds.y_start,
        }
    }
}

impl MouseOperable for ChoiceButton {
    type Context = ChoicePalette;

    fn bounds(&self) -> RegionBounds {
        self.bounds
    }

    fn on_pressed(&mut self, palette: &mut ChoicePalette) {
        palette.mark_group_choice_selected(&self.uid, &self.group);
    }

    fn on_over(&mut self, _palette: &mut ChoicePalette) {}

    fn update(&mut self, palette: &mut ChoicePalette) {
        let rect = self.rect();
        let outline = palette
            .is_choice_selected(&self.uid, &self.group)
            .then(|| Outline {
                color: SELECTED_OUTLINE_COLOR,
                width: palette.button_width / OUTLINE_WIDTH_DIVISOR,
            });
        let mut sink = palette.sink.borrow_mut();
        sink.push_background(rect, BUTTON_BACKGROUND);
        sink.push_text(
            rect,
            &self.label,
            TextStyle {
                font_color: BUTTON_FONT_COLOR,
                outline,
            },
        );
    }
}

/// Snapshot of one live region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractiveRegion {
    pub uid: ChoiceUid,
    pub group: ChoiceGroup,
    pub rect: RegionRect,
    pub selected: bool,
}

pub struct OverlayController {
    dispatcher: MouseDispatcher<ChoiceButton>,
    palette: ChoicePalette,
    button_count: u32,
    requires_update: bool,
}

impl OverlayController {
    pub fn new(
        frame_width: u32,
        frame_height: u32,
        choices: SharedChoices,
        sink: SharedSink,
    ) -> Self {
        Self {
            dispatcher: MouseDispatcher::new(frame_width, frame_height),
            palette: ChoicePalette {
                choices,
                sink,
                language: DEFAULT_OVERLAY_LANGUAGE.to_string(),
                button_width: frame_width,
                button_height: frame_height / BUTTON_HEIGHT_DIVISOR,
            },
            button_count: 0,
            requires_update: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.palette.language = language.into();
        self
    }

    /// Replaces the current batch of buttons with one per entry of `set`
    /// and draws the new batch.
    pub fn present(&mut self, set: &ChoiceSet) {
        self.clear_buttons();
        self.set_number_of_buttons(set.len() as u32);
        for (uid, choice) in set {
            self.create_button(uid, choice);
        }
        debug!("presenting {} choice buttons", self.button_count);
        self.redraw();
    }

    pub fn set_number_of_buttons(&mut self, count: u32) {
        self.button_count = count;
        self.palette.button_width = self.dispatcher.frame_width() / count.max(1);
    }

    pub fn create_button(&mut self, uid: &str, choice: &ChapterChoice) {
        let index = self.dispatcher.len() as u32;
        let label = choice
            .display_text(&self.palette.language)
            .unwrap_or(uid)
            .to_string();
        let bounds = self.button_bounds(index);
        self.dispatcher.add(ChoiceButton {
            uid: uid.to_string(),
            group: choice.group.clone(),
            label,
            index,
            bounds,
        });
    }

    /// Drops the live batch. Its visuals stay in the sink until the next
    /// redraw.
    pub fn clear_buttons(&mut self) {
        self.dispatcher.clear();
    }

    /// Re-lays out the live batch for a new frame size.
    pub fn resize(&mut self, frame_width: u32, frame_height: u32) {
        self.dispatcher.set_frame_size(frame_width, frame_height);
        self.palette.button_height = frame_height / BUTTON_HEIGHT_DIVISOR;
        self.set_number_of_buttons(self.button_count);
        let bounds: Vec<RegionBounds> = (0..self.dispatcher.len() as u32)
            .map(|index| self.button_bounds(index))
            .collect();
        for (button, bounds) in self.dispatcher.operables_mut().iter_mut().zip(bounds) {
            button.bounds = bounds;
        }
        self.redraw();
    }

    pub fn try_mouse_click(&mut self, x: u32, y: u32) -> bool {
        let pressed = self.dispatcher.press(x, y, &mut self.palette);
        self.requires_update |= pressed;
        pressed
    }

    pub fn try_mouse_over(&mut self, x: u32, y: u32) {
        self.dispatcher.hover(x, y, &mut self.palette);
    }

    /// Redraws the buttons if a press changed something since the last
    /// call. Returns whether a redraw happened.
    pub fn update(&mut self) -> bool {
        if !self.requires_update {
            return false;
        }
        self.requires_update = false;
        self.redraw();
        true
    }

    pub fn requires_update(&self) -> bool {
        self.requires_update
    }

    pub fn mark_group_choice_selected(&mut self, uid: &str, group: &ChoiceGroup) {
        self.palette.mark_group_choice_selected(uid, group);
    }

    pub fn is_choice_selected(&self, uid: &str, group: &ChoiceGroup) -> bool {
        self.palette.is_choice_selected(uid, group)
    }

    pub fn buttons(&self) -> &[ChoiceButton] {
        self.dispatcher.operables()
    }

    pub fn regions(&self) -> Vec<InteractiveRegion> {
        self.buttons()
            .iter()
            .map(|button| InteractiveRegion {
                uid: button.uid.clone(),
                group: button.group.clone(),
                rect: button.rect(),
                selected: self.is_choice_selected(&button.uid, &button.group),
            })
            .collect()
    }

    pub fn hits(&self, x: u32, y: u32) -> Vec<usize> {
        self.dispatcher.hits(x, y)
    }

    fn redraw(&mut self) {
        self.palette.sink.borrow_mut().clear();
        self.dispatcher.update(&mut self.palette);
    }

    fn button_bounds(&self, index: u32) -> RegionBounds {
        let width = self.dispatcher.frame_width() as u64;
        let count = self.button_count.max(1) as u64;
        let index = index as u64;
        RegionBounds {
            x_start: (width * index / count) as u32,
            y_start: 0,
            x_end: (width * (index + 1) / count) as u32,
            y_end: self.palette.button_height,
        }
    }
}

fn group_label(group: &ChoiceGroup) -> &str {
    group.as_deref().unwrap_or("<ungrouped>")
}
