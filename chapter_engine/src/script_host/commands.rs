//! Host commands exposed to chapter scripts.
//!
//! Every command is a plain function over a [`CommandContext`] and the
//! already-converted arguments, so the Lua side only needs one generic
//! trampoline per name. Arguments are checked before anything is touched:
//! a command that rejects its arguments has no side effect.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Result;
use chapter_menu::{ChoiceGroup, SharedChoices};
use log::{debug, warn};
use mlua::{Error as LuaError, IntoLua, Lua, Result as LuaResult, Value, Variadic};
use thiserror::Error;

use crate::navigation::{ChapterNavigator, ChapterUid};

pub const CMD_GOTO_AND_PLAY: &str = "GotoAndPlay";
pub const CMD_LOG_MSG: &str = "LogMsg";
pub const CMD_ADD_CHOICE: &str = "AddChoice";
pub const CMD_COMMIT_CHOICES: &str = "CommitChoices";
pub const CMD_SET_CHOICE_TEXT: &str = "SetChoiceText";
pub const CMD_SET_CHOICE_DEFAULT: &str = "SetChoiceDefault";
pub const CMD_GET_CHOICE: &str = "GetChoice";

/// Language whose texts CommitChoices reports in the log.
pub const DIAGNOSTIC_LANGUAGE: &str = "en";

pub type SharedNavigator = Rc<RefCell<dyn ChapterNavigator>>;

/// Everything a command may read or mutate, handed to each invocation.
pub struct CommandContext {
    pub navigator: SharedNavigator,
    pub choices: SharedChoices,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptArg {
    Absent,
    Str(String),
    Other(&'static str),
}

impl ScriptArg {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Nil => ScriptArg::Absent,
            Value::String(text) => ScriptArg::Str(match text.to_str() {
                Ok(text) => text.to_string(),
                Err(_) => String::from_utf8_lossy(text.as_bytes()).into_owned(),
            }),
            other => ScriptArg::Other(other.type_name()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ScriptArg::Absent => "nil",
            ScriptArg::Str(_) => "string",
            ScriptArg::Other(name) => *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Nothing,
    Flag(bool),
    Text(Option<String>),
}

impl<'lua> IntoLua<'lua> for CommandReply {
    fn into_lua(self, lua: &'lua Lua) -> LuaResult<Value<'lua>> {
        match self {
            CommandReply::Nothing | CommandReply::Text(None) => Ok(Value::Nil),
            CommandReply::Flag(flag) => Ok(Value::Boolean(flag)),
            CommandReply::Text(Some(text)) => lua.create_string(&text).map(Value::String),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{command}: argument {position} must be {expected}, got {found}")]
    ArgumentType {
        command: &'static str,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unknown command {0}")]
    UnknownCommand(String),
}

type CommandHandler = fn(&CommandContext, &[ScriptArg]) -> Result<CommandReply, CommandError>;

#[derive(Clone, Copy)]
struct CommandSpec {
    arity: usize,
    handler: CommandHandler,
}

/// Name → handler table consulted on every script call.
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    pub fn chapter_commands() -> Self {
        let mut registry = CommandRegistry {
            commands: BTreeMap::new(),
        };
        registry.register(CMD_GOTO_AND_PLAY, 1, goto_and_play);
        registry.register(CMD_LOG_MSG, 1, log_msg);
        registry.register(CMD_ADD_CHOICE, 2, add_choice);
        registry.register(CMD_COMMIT_CHOICES, 0, commit_choices);
        registry.register(CMD_SET_CHOICE_DEFAULT, 2, set_choice_default);
        registry.register(CMD_SET_CHOICE_TEXT, 3, set_choice_text);
        registry.register(CMD_GET_CHOICE, 1, get_choice);
        registry
    }

    fn register(&mut self, name: &'static str, arity: usize, handler: CommandHandler) {
        self.commands.insert(name, CommandSpec { arity, handler });
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.commands.get(name).map(|spec| spec.arity)
    }

    /// Runs `name` with the raw script values. Extra values are ignored and
    /// missing ones count as absent, matching the declared arity.
    pub fn dispatch(
        &self,
        name: &str,
        ctx: &CommandContext,
        values: &[Value],
    ) -> Result<CommandReply, CommandError> {
        let spec = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        let args: Vec<ScriptArg> = (0..spec.arity)
            .map(|index| {
                values
                    .get(index)
                    .map(ScriptArg::from_value)
                    .unwrap_or(ScriptArg::Absent)
            })
            .collect();
        self.call(name, spec, ctx, &args)
    }

    pub fn dispatch_args(
        &self,
        name: &str,
        ctx: &CommandContext,
        args: &[ScriptArg],
    ) -> Result<CommandReply, CommandError> {
        let spec = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        let mut args = args.to_vec();
        args.resize(spec.arity, ScriptArg::Absent);
        self.call(name, spec, ctx, &args)
    }

    fn call(
        &self,
        name: &str,
        spec: &CommandSpec,
        ctx: &CommandContext,
        args: &[ScriptArg],
    ) -> Result<CommandReply, CommandError> {
        let result = (spec.handler)(ctx, args);
        if let Err(err) = &result {
            debug!("{name} rejected: {err}");
        }
        result
    }
}

/// Publishes every command of `registry` as a Lua global.
pub fn install_commands(
    lua: &Lua,
    registry: Rc<CommandRegistry>,
    context: Rc<CommandContext>,
) -> Result<()> {
    let globals = lua.globals();
    for name in registry.names() {
        let registry = registry.clone();
        let context = context.clone();
        let trampoline = lua.create_function(move |_, args: Variadic<Value>| {
            registry
                .dispatch(name, &context, &args)
                .map_err(LuaError::external)
        })?;
        globals.set(name, trampoline)?;
    }
    Ok(())
}

fn string_arg<'a>(
    command: &'static str,
    args: &'a [ScriptArg],
    index: usize,
) -> Result<&'a str, CommandError> {
    match args.get(index) {
        Some(ScriptArg::Str(text)) => Ok(text),
        other => Err(CommandError::ArgumentType {
            command,
            position: index + 1,
            expected: "a string",
            found: other.map(ScriptArg::type_name).unwrap_or("nil"),
        }),
    }
}

fn optional_string_arg<'a>(
    command: &'static str,
    args: &'a [ScriptArg],
    index: usize,
) -> Result<Option<&'a str>, CommandError> {
    match args.get(index) {
        None | Some(ScriptArg::Absent) => Ok(None),
        Some(ScriptArg::Str(text)) => Ok(Some(text)),
        Some(other) => Err(CommandError::ArgumentType {
            command,
            position: index + 1,
            expected: "a string or nil",
            found: other.type_name(),
        }),
    }
}

fn group_label(group: &ChoiceGroup) -> &str {
    group.as_deref().unwrap_or("Null")
}

fn goto_and_play(ctx: &CommandContext, args: &[ScriptArg]) -> Result<CommandReply, CommandError> {
    let raw_uid = string_arg(CMD_GOTO_AND_PLAY, args, 0)?;
    let Ok(uid) = raw_uid.trim().parse::<ChapterUid>() else {
        debug!("Chapter {raw_uid} not found");
        return Ok(CommandReply::Flag(false));
    };

    let mut navigator = ctx.navigator.borrow_mut();
    let Some(target) = navigator.find_chapter_by_uid(uid) else {
        debug!("Chapter {uid} not found");
        return Ok(CommandReply::Flag(false));
    };
    let current = navigator.current_chapter();
    if !navigator.enter_and_leave(&target, current.as_ref(), false) {
        navigator.jump_to(target.segment, &target);
    }
    Ok(CommandReply::Flag(true))
}

fn log_msg(_ctx: &CommandContext, args: &[ScriptArg]) -> Result<CommandReply, CommandError> {
    let text = string_arg(CMD_LOG_MSG, args, 0)?;
    debug!("{text}");
    Ok(CommandReply::Nothing)
}

fn add_choice(ctx: &CommandContext, args: &[ScriptArg]) -> Result<CommandReply, CommandError> {
    let uid = string_arg(CMD_ADD_CHOICE, args, 0)?;
    let group = optional_string_arg(CMD_ADD_CHOICE, args, 1)?;
    ctx.choices
        .borrow_mut()
        .add_choice(uid, group.map(str::to_string));
    Ok(CommandReply::Nothing)
}

fn commit_choices(ctx: &CommandContext, _args: &[ScriptArg]) -> Result<CommandReply, CommandError> {
    let Some(published) = ctx.choices.borrow_mut().commit() else {
        debug!("No choices to process");
        return Ok(CommandReply::Nothing);
    };

    ctx.navigator.borrow_mut().add_choices(&published);

    for (uid, choice) in &published {
        let group = group_label(&choice.group);
        match choice.text(DIAGNOSTIC_LANGUAGE) {
            Some(text) => {
                debug!("Displaying choice with uuid: {uid}, string: {text}, group: {group}")
            }
            None => debug!("Unspecified choice text for uuid: {uid}, group: {group}"),
        }
    }
    Ok(CommandReply::Nothing)
}

fn set_choice_text(ctx: &CommandContext, args: &[ScriptArg]) -> Result<CommandReply, CommandError> {
    let uid = string_arg(CMD_SET_CHOICE_TEXT, args, 0)?;
    let text = string_arg(CMD_SET_CHOICE_TEXT, args, 1)?;
    let lang = string_arg(CMD_SET_CHOICE_TEXT, args, 2)?;
    match ctx.choices.borrow_mut().set_choice_text(uid, lang, text) {
        Ok(()) => Ok(CommandReply::Flag(true)),
        Err(miss) => {
            warn!("{miss}");
            Ok(CommandReply::Flag(false))
        }
    }
}

fn set_choice_default(
    ctx: &CommandContext,
    args: &[ScriptArg],
) -> Result<CommandReply, CommandError> {
    let uid = string_arg(CMD_SET_CHOICE_DEFAULT, args, 0)?;
    let group = string_arg(CMD_SET_CHOICE_DEFAULT, args, 1)?;
    ctx.choices
        .borrow_mut()
        .set_selected(uid, Some(group.to_string()));
    Ok(CommandReply::Nothing)
}

fn get_choice(ctx: &CommandContext, args: &[ScriptArg]) -> Result<CommandReply, CommandError> {
    let group: ChoiceGroup = optional_string_arg(CMD_GET_CHOICE, args, 0)?.map(str::to_string);
    let local = ctx
        .choices
        .borrow()
        .selected(&group)
        .map(str::to_string);
    let selected = match local {
        Some(uid) => Some(uid),
        None => ctx.navigator.borrow().get_choice(&group),
    };
    Ok(CommandReply::Text(selected))
}
