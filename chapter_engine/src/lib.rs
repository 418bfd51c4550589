pub mod chapter_graph;
pub mod cli;
pub mod navigation;
pub mod runner;
pub mod script_host;
pub mod session;

pub use chapter_graph::{ChapterEntry, ChapterGraph, ChapterScripts, FrameSize, SegmentEntry};
pub use navigation::{ChapterHandle, ChapterNavigator, ChapterUid};
pub use runner::{run_chapter, PointerEvent, RunOptions, RunReport, ScriptStage};
pub use script_host::{ChapterScriptInterpreter, ScriptFailure, SCRIPT_TIMEOUT};
pub use session::PlaybackSession;
