mod commands;
mod timer;

pub use commands::{
    CommandContext, CommandError, CommandRegistry, CommandReply, ScriptArg, SharedNavigator,
    CMD_ADD_CHOICE, CMD_COMMIT_CHOICES, CMD_GET_CHOICE, CMD_GOTO_AND_PLAY, CMD_LOG_MSG,
    CMD_SET_CHOICE_DEFAULT, CMD_SET_CHOICE_TEXT, DIAGNOSTIC_LANGUAGE,
};
pub use timer::{OneShotTimer, TimerError};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chapter_menu::SharedChoices;
use log::{debug, error, warn};
use mlua::{
    ChunkMode, Error as LuaError, Function, HookTriggers, Lua, LuaOptions, MultiValue,
    Result as LuaResult, StdLib, Value, Variadic,
};
use thiserror::Error;

use commands::install_commands;

/// Wall-clock budget for one `interpret` call.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(3);

/// VM instructions between two checks of the timeout flag.
pub const STEP_HOOK_INSTRUCTIONS: u32 = 1000;

pub const DEFAULT_HEAP_LIMIT: usize = 16 * 1024 * 1024;

const CHUNK_NAME: &str = "=chapter_script";

/// Globals removed from the base library; chapter scripts come from the
/// media file and must not reach the filesystem or load bytecode.
const STRIPPED_GLOBALS: [&str; 5] = ["dofile", "loadfile", "load", "loadstring", "module"];

/// Protected-call builtins that must not swallow a timeout interrupt.
const GUARDED_PROTECTED_CALLS: [&str; 2] = ["pcall", "xpcall"];

#[derive(Debug, Error)]
pub enum ScriptFailure {
    #[error("Execution TimedOut!\n{trace}")]
    Timeout { trace: String },
    #[error("Evaluation Failed!\n{trace}")]
    Fault { trace: String },
    #[error("fatal error occurred during script execution: {message}")]
    Fatal { message: String },
}

#[derive(Debug, Error)]
#[error("script interrupted after {}s", SCRIPT_TIMEOUT.as_secs())]
struct ScriptInterrupted;

/// Runs chapter scripts against one Lua state.
///
/// Scripts get a fixed table of host commands (see [`CommandRegistry`]) and
/// [`SCRIPT_TIMEOUT`] to finish. Every failure, including timeouts and fatal
/// VM conditions, ends up in the log and as `false` from [`interpret`].
///
/// [`interpret`]: ChapterScriptInterpreter::interpret
pub struct ChapterScriptInterpreter {
    lua: Lua,
    context: Rc<CommandContext>,
    registry: Rc<CommandRegistry>,
    timed_out: Arc<AtomicBool>,
}

impl ChapterScriptInterpreter {
    pub fn new(navigator: SharedNavigator, choices: SharedChoices) -> Result<Self> {
        let lua = Lua::new_with(
            StdLib::STRING | StdLib::TABLE | StdLib::MATH,
            LuaOptions::default(),
        )
        .context("initialising Lua runtime for chapter scripts")?;

        let context = Rc::new(CommandContext {
            navigator,
            choices,
        });
        let registry = Rc::new(CommandRegistry::chapter_commands());
        let timed_out = Arc::new(AtomicBool::new(false));

        sandbox_globals(&lua).context("restricting chapter script globals")?;
        guard_protected_calls(&lua, timed_out.clone())
            .context("guarding protected calls against interrupts")?;
        install_commands(&lua, registry.clone(), context.clone())
            .context("installing chapter script commands")?;
        install_step_hook(&lua, timed_out.clone());

        let interpreter = Self {
            lua,
            context,
            registry,
            timed_out,
        };
        interpreter.set_heap_limit(DEFAULT_HEAP_LIMIT);
        Ok(interpreter)
    }

    pub fn with_heap_limit(self, limit: usize) -> Self {
        self.set_heap_limit(limit);
        self
    }

    fn set_heap_limit(&self, limit: usize) {
        if let Err(err) = self.lua.set_memory_limit(limit) {
            warn!("chapter script heap limit not applied: {err}");
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn choices(&self) -> SharedChoices {
        self.context.choices.clone()
    }

    pub fn navigator(&self) -> SharedNavigator {
        self.context.navigator.clone()
    }

    pub fn handle_mouse_pressed(&self, x: u32, y: u32) {
        self.context.navigator.borrow_mut().handle_mouse_clicked(x, y);
    }

    /// Evaluates one chapter script. Returns whether it ran to completion
    /// within [`SCRIPT_TIMEOUT`]; details of any failure go to the log.
    ///
    /// Commands already executed when a script fails or times out keep
    /// their effects. Loops are interrupted at the next step hook check, so
    /// a single long-running builtin call can overrun the budget.
    pub fn interpret(&mut self, command: &[u8]) -> bool {
        match self.evaluate(command) {
            Ok(()) => {
                debug!("chapter script evaluation complete");
                true
            }
            Err(failure) => {
                error!("{failure}");
                false
            }
        }
    }

    fn evaluate(&mut self, command: &[u8]) -> Result<(), ScriptFailure> {
        let source = String::from_utf8_lossy(command);
        debug!("command input : {source}");

        self.timed_out.store(false, Ordering::SeqCst);
        let flag = self.timed_out.clone();
        let timer = OneShotTimer::schedule(SCRIPT_TIMEOUT, move || {
            error!(
                "Script taking too long ({}s) to execute, stopping",
                SCRIPT_TIMEOUT.as_secs()
            );
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|err| ScriptFailure::Fatal {
            message: format!("timer initialization failed: {err}"),
        })?;

        let lua = &self.lua;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            lua.load(&*source)
                .set_name(CHUNK_NAME)
                .set_mode(ChunkMode::Text)
                .exec()
        }));
        drop(timer);

        let timed_out = self.timed_out.load(Ordering::SeqCst);
        classify_outcome(outcome, timed_out)
    }
}

fn classify_outcome(
    outcome: std::thread::Result<LuaResult<()>>,
    timed_out: bool,
) -> Result<(), ScriptFailure> {
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            return Err(ScriptFailure::Fatal {
                message: panic_message(payload.as_ref()),
            })
        }
    };

    if timed_out {
        let trace = match &result {
            Err(err) => err.to_string(),
            Ok(()) => "<script finished as the timer fired>".to_string(),
        };
        return Err(ScriptFailure::Timeout { trace });
    }

    match result {
        Ok(()) => Ok(()),
        Err(err) => match root_cause(&err) {
            LuaError::MemoryError(message) | LuaError::SafetyError(message) => {
                Err(ScriptFailure::Fatal {
                    message: message.clone(),
                })
            }
            _ => Err(ScriptFailure::Fault {
                trace: err.to_string(),
            }),
        },
    }
}

fn root_cause(err: &LuaError) -> &LuaError {
    match err {
        LuaError::CallbackError { cause, .. } => root_cause(cause),
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn sandbox_globals(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    for name in STRIPPED_GLOBALS {
        globals.set(name, Value::Nil)?;
    }

    let print = lua.create_function(|_, args: Variadic<Value>| {
        let line = args
            .iter()
            .map(|value| match value {
                Value::String(text) => text.to_string_lossy().into_owned(),
                Value::Integer(i) => i.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Boolean(b) => b.to_string(),
                Value::Nil => "nil".to_string(),
                other => format!("<{}>", other.type_name()),
            })
            .collect::<Vec<_>>()
            .join("\t");
        debug!("[script] {line}");
        Ok(())
    })?;
    globals.set("print", print)?;
    Ok(())
}

/// Wraps `pcall`/`xpcall` so a caught error is raised again once the
/// timeout flag is set; the interrupt then unwinds every protected frame.
fn guard_protected_calls(lua: &Lua, timed_out: Arc<AtomicBool>) -> LuaResult<()> {
    let globals = lua.globals();
    for name in GUARDED_PROTECTED_CALLS {
        let builtin: Function = globals.get(name)?;
        let builtin_key = lua.create_registry_value(builtin)?;
        let timed_out = timed_out.clone();
        let guarded = lua.create_function(move |lua, args: MultiValue| {
            let builtin: Function = lua.registry_value(&builtin_key)?;
            let results: MultiValue = builtin.call(args)?;
            let caught = matches!(results.iter().next(), Some(Value::Boolean(false)));
            if caught && timed_out.load(Ordering::SeqCst) {
                return Err(LuaError::external(ScriptInterrupted));
            }
            Ok(results)
        })?;
        globals.set(name, guarded)?;
    }
    Ok(())
}

fn install_step_hook(lua: &Lua, timed_out: Arc<AtomicBool>) {
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(STEP_HOOK_INSTRUCTIONS),
        move |_lua, _debug| {
            if timed_out.load(Ordering::Relaxed) {
                Err(LuaError::external(ScriptInterrupted))
            } else {
                Ok(())
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Instant;

    use crate::chapter_graph::ChapterGraph;
    use crate::navigation::ChapterNavigator;
    use crate::session::PlaybackSession;

    fn interpreter() -> (ChapterScriptInterpreter, Rc<RefCell<PlaybackSession>>) {
        let graph = ChapterGraph::from_json_str(
            r#"{
                "frame": { "width": 300, "height": 100 },
                "segments": [ { "chapters": [ { "uid": 1 }, { "uid": 7, "name": "Ending" } ] } ]
            }"#,
        )
        .expect("graph");
        let session = Rc::new(RefCell::new(PlaybackSession::new(Rc::new(graph))));
        session.borrow_mut().start_at(1);
        let choices = session.borrow().choices();
        let interpreter =
            ChapterScriptInterpreter::new(session.clone(), choices).expect("interpreter");
        (interpreter, session)
    }

    #[test]
    fn runs_commands_and_reports_success() {
        let (mut interpreter, session) = interpreter();
        let ok = interpreter.interpret(
            br#"
            AddChoice("A", "g1")
            AddChoice("B", "g1")
            AddChoice("C", "g1")
            SetChoiceText("B", "Second", "en")
            SetChoiceDefault("B", "g1")
            assert(GetChoice("g1") == "B")
            CommitChoices()
            "#,
        );
        assert!(ok);
        let session = session.borrow();
        assert_eq!(session.published().len(), 1);
        let uids: Vec<String> = session
            .overlay()
            .regions()
            .into_iter()
            .map(|region| region.uid)
            .collect();
        assert_eq!(uids, ["A", "B", "C"]);
    }

    #[test]
    fn syntax_and_runtime_errors_fail_the_call() {
        let (mut interpreter, _) = interpreter();
        assert!(!interpreter.interpret(b"AddChoice(("));
        assert!(!interpreter.interpret(b"error('boom')"));
        assert!(interpreter.interpret(b"LogMsg('still alive')"));
    }

    #[test]
    fn argument_type_errors_are_catchable_and_side_effect_free() {
        let (mut interpreter, _) = interpreter();
        assert!(!interpreter.interpret(b"AddChoice(42, 'g')"));
        assert!(interpreter.choices().borrow().is_empty());

        let ok = interpreter.interpret(
            br#"
            local ok, err = pcall(SetChoiceDefault, "A", 5)
            assert(not ok)
            assert(string.find(tostring(err), "argument 2 must be a string"))
            "#,
        );
        assert!(ok);
        assert!(interpreter.choices().borrow().selections().is_empty());
    }

    #[test]
    fn set_choice_text_on_unknown_uid_returns_false_to_script() {
        let (mut interpreter, _) = interpreter();
        let ok = interpreter.interpret(
            br#"
            AddChoice("known")
            assert(SetChoiceText("unknown", "Text", "en") == false)
            assert(SetChoiceText("known", "Text", "en") == true)
            "#,
        );
        assert!(ok);
        let choices = interpreter.choices();
        let registry = choices.borrow();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.text("known", "en"), Some("Text"));
    }

    #[test]
    fn goto_and_play_requests_jump_only_for_known_chapters() {
        let (mut interpreter, session) = interpreter();
        assert!(interpreter.interpret(b"assert(GotoAndPlay('99') == false)"));
        assert!(!session.borrow().has_pending_jump());

        assert!(interpreter.interpret(b"assert(GotoAndPlay('7'))"));
        let jump = session.borrow_mut().take_pending_jump().expect("jump");
        assert_eq!(jump.name, "Ending");
    }

    #[test]
    fn get_choice_without_selection_is_nil() {
        let (mut interpreter, _) = interpreter();
        assert!(interpreter.interpret(b"assert(GetChoice() == nil)"));
        assert!(interpreter.interpret(b"assert(GetChoice('none') == nil)"));
    }

    #[test]
    fn filesystem_and_bytecode_loaders_are_unavailable() {
        let (mut interpreter, _) = interpreter();
        assert!(interpreter.interpret(
            b"assert(dofile == nil and loadfile == nil and loadstring == nil and io == nil and os == nil)"
        ));
        assert!(!interpreter.interpret(b"\x1bLua\x51\x00"));
    }

    #[test]
    fn unbounded_loop_times_out_and_interpreter_recovers() {
        let (mut interpreter, _) = interpreter();
        let started = Instant::now();
        assert!(!interpreter.interpret(b"AddChoice('before') while true do end"));
        let elapsed = started.elapsed();
        assert!(elapsed >= SCRIPT_TIMEOUT);
        assert!(elapsed < SCRIPT_TIMEOUT + Duration::from_secs(5));
        // effects applied before the timeout stay
        assert!(interpreter.choices().borrow().choice("before").is_some());

        assert!(interpreter.interpret(b"LogMsg('after timeout')"));
    }

    #[test]
    fn protected_calls_cannot_swallow_the_timeout() {
        let (mut interpreter, _) = interpreter();
        for script in [
            &b"while true do pcall(function() while true do end end) end"[..],
            &b"while true do xpcall(function() while true do end end, function(e) return e end) end"[..],
        ] {
            let started = Instant::now();
            assert!(!interpreter.interpret(script));
            assert!(started.elapsed() < SCRIPT_TIMEOUT + Duration::from_secs(2));
        }
        assert!(interpreter.interpret(
            b"local ok, err = pcall(error, 'plain') assert(not ok and string.find(err, 'plain'))"
        ));
    }

    #[test]
    fn memory_exhaustion_is_reported_as_failure() {
        let (interpreter, _) = interpreter();
        let mut interpreter = interpreter.with_heap_limit(2 * 1024 * 1024);
        let ok = interpreter.interpret(
            br#"
            local hoard = {}
            for i = 1, 1e8 do hoard[i] = string.rep("x", 4096) .. i end
            "#,
        );
        assert!(!ok);
    }

    #[test]
    fn mouse_presses_reach_the_overlay() {
        let (mut interpreter, session) = interpreter();
        assert!(interpreter.interpret(
            br#"
            AddChoice("A", "g1")
            AddChoice("B", "g1")
            AddChoice("C", "g1")
            SetChoiceDefault("B", "g1")
            CommitChoices()
            "#
        ));
        interpreter.handle_mouse_pressed(250, 95);
        assert!(interpreter.interpret(b"assert(GetChoice('g1') == 'C')"));
        assert_eq!(
            session.borrow().get_choice(&Some("g1".to_string())).as_deref(),
            Some("C")
        );
    }

    #[test]
    fn panic_payloads_become_fatal_failures() {
        let outcome: std::thread::Result<LuaResult<()>> =
            panic::catch_unwind(|| panic!("engine gave up"));
        match classify_outcome(outcome, false) {
            Err(ScriptFailure::Fatal { message }) => assert_eq!(message, "engine gave up"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn timed_out_flag_overrides_engine_status() {
        assert!(matches!(
            classify_outcome(Ok(Ok(())), true),
            Err(ScriptFailure::Timeout { .. })
        ));
        assert!(classify_outcome(Ok(Ok(())), false).is_ok());
    }
}
