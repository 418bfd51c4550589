//! Interactive chapter menus: the choices a chapter script offers, the
//! per-group selection state, and the overlay buttons that turn pointer
//! input into selections.

pub mod choices;
pub mod mouse;
pub mod overlay;
pub mod render;

pub use choices::{
    ChapterChoice, ChoiceGroup, ChoiceLookupMiss, ChoiceRegistry, ChoiceSet, ChoiceUid,
    SharedChoices,
};
pub use mouse::{MouseDispatcher, MouseOperable, RegionBounds};
pub use overlay::{InteractiveRegion, OverlayController, SharedSink};
pub use render::{RedrawList, RedrawSink, RegionPrimitive, RegionRect};
