use serde::Serialize;

/// Rectangle in frame pixels, anchored at the bottom-left corner of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn from_rgb(rgb: u32, a: u8) -> Self {
        Self {
            r: ((rgb >> 16) & 0xff) as u8,
            g: ((rgb >> 8) & 0xff) as u8,
            b: (rgb & 0xff) as u8,
            a,
        }
    }
}

pub const BUTTON_BACKGROUND: Rgba = Rgba::from_rgb(0x10_10_10, 0x00);
pub const BUTTON_FONT_COLOR: Rgba = Rgba::from_rgb(0xff_ff_ff, 0xff);
pub const SELECTED_OUTLINE_COLOR: Rgba = Rgba::from_rgb(0xf4_8b_00, 0xff);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outline {
    pub color: Rgba,
    pub width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextStyle {
    pub font_color: Rgba,
    pub outline: Option<Outline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionPrimitive {
    Background {
        rect: RegionRect,
        color: Rgba,
    },
    Text {
        rect: RegionRect,
        text: String,
        style: TextStyle,
    },
}

/// Receives the primitives making up one overlay frame.
pub trait RedrawSink {
    fn clear(&mut self);
    fn push_background(&mut self, rect: RegionRect, color: Rgba);
    fn push_text(&mut self, rect: RegionRect, text: &str, style: TextStyle);
}

/// Redraw list that simply records what was pushed, in order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RedrawList {
    regions: Vec<RegionPrimitive>,
    generation: u32,
}

impl RedrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn regions(&self) -> &[RegionPrimitive] {
        &self.regions
    }

    /// Number of times the list was cleared for a redraw.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn outlined_texts(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().filter_map(|region| match region {
            RegionPrimitive::Text {
                text,
                style: TextStyle {
                    outline: Some(_), ..
                },
                ..
            } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl RedrawSink for RedrawList {
    fn clear(&mut self) {
        self.regions.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    fn push_background(&mut self, rect: RegionRect, color: Rgba) {
        self.regions.push(RegionPrimitive::Background { rect, color });
    }

    fn push_text(&mut self, rect: RegionRect, text: &str, style: TextStyle) {
        self.regions.push(RegionPrimitive::Text {
            rect,
            text: text.to_string(),
            style,
        });
    }
}
