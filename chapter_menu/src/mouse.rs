//! Pointer routing for overlay regions.
//!
//! Regions describe their bounds relative to the bottom-left corner of the
//! video frame (the way subtitle regions are aligned), while pointer events
//! arrive in window space with the origin at the top-left. The dispatcher
//! does the conversion so regions never have to know about it.

/// Inclusive bounds of a region, bottom-left relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    pub x_start: u32,
    pub y_start: u32,
    pub x_end: u32,
    pub y_end: u32,
}

impl RegionBounds {
    /// Hit test for a top-left relative point inside a frame `frame_height`
    /// pixels tall.
    pub fn contains(&self, frame_height: u32, x: u32, y: u32) -> bool {
        let screen_bottom = frame_height.saturating_sub(self.y_start);
        let screen_top = frame_height.saturating_sub(self.y_end);
        (self.x_start..=self.x_end).contains(&x) && (screen_top..=screen_bottom).contains(&y)
    }
}

/// Something the pointer can interact with. The context is whatever state
/// the region needs to mutate or draw into; it is handed over explicitly on
/// every call instead of being stored in the region.
pub trait MouseOperable {
    type Context;

    fn bounds(&self) -> RegionBounds;
    fn on_pressed(&mut self, ctx: &mut Self::Context);
    fn on_over(&mut self, ctx: &mut Self::Context);
    fn update(&mut self, ctx: &mut Self::Context);
}

#[derive(Debug)]
pub struct MouseDispatcher<T> {
    operables: Vec<T>,
    frame_width: u32,
    frame_height: u32,
}

impl<T: MouseOperable> MouseDispatcher<T> {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            operables: Vec::new(),
            frame_width,
            frame_height,
        }
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn set_frame_size(&mut self, frame_width: u32, frame_height: u32) {
        self.frame_width = frame_width;
        self.frame_height = frame_height;
    }

    pub fn add(&mut self, operable: T) {
        self.operables.push(operable);
    }

    /// Drops every registered region.
    pub fn clear(&mut self) {
        self.operables.clear();
    }

    pub fn len(&self) -> usize {
        self.operables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operables.is_empty()
    }

    pub fn operables(&self) -> &[T] {
        &self.operables
    }

    pub fn operables_mut(&mut self) -> &mut [T] {
        &mut self.operables
    }

    /// Indices of the regions under the point, in registration order.
    pub fn hits(&self, x: u32, y: u32) -> Vec<usize> {
        self.operables
            .iter()
            .enumerate()
            .filter(|(_, op)| op.bounds().contains(self.frame_height, x, y))
            .map(|(index, _)| index)
            .collect()
    }

    /// Notifies every region under the point. Overlapping regions are all
    /// notified. Returns whether anything matched.
    pub fn press(&mut self, x: u32, y: u32, ctx: &mut T::Context) -> bool {
        let frame_height = self.frame_height;
        let mut pressed = false;
        for op in &mut self.operables {
            if op.bounds().contains(frame_height, x, y) {
                op.on_pressed(ctx);
                pressed = true;
            }
        }
        pressed
    }

    pub fn hover(&mut self, x: u32, y: u32, ctx: &mut T::Context) {
        let frame_height = self.frame_height;
        for op in &mut self.operables {
            if op.bounds().contains(frame_height, x, y) {
                op.on_over(ctx);
            }
        }
    }

    pub fn update(&mut self, ctx: &mut T::Context) {
        for op in &mut self.operables {
            op.update(ctx);
        }
    }
}
