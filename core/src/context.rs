//! Execution context handed to action symbols.
//!
//! Symbols never mutate the session directly: navigation is recorded as
//! [`NavOp`] requests and applied by the session owner once the action run
//! completes. The plugin boundary carries no errors; everything a sym
//! reports travels as (retcode, output).

use std::os::fd::OwnedFd;

use crate::entry::EntryId;
use crate::pargv::Parg;
use crate::pargv::Pargv;
use crate::scheme::Scheme;
use crate::session::SessionInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Action,
    ServiceAction,
    PluginInit,
    PluginFini,
}

impl ActionKind {
    /// Value of `KLISH_TYPE` in an action child's environment.
    pub fn as_env_str(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::ServiceAction => "service_action",
            Self::PluginInit => "plugin_init",
            Self::PluginFini => "plugin_fini",
        }
    }
}

/// Navigation request recorded by a sym, applied to the session path by
/// its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOp {
    Push(String),
    Pop(usize),
    Top,
    Exit,
}

/// Stage stdio endpoints. Symbols that stream clone what they need; the
/// stage runner owns the originals and closes them when the stage is done.
#[derive(Debug, Default)]
pub struct StageStdio {
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
    pub stderr: Option<OwnedFd>,
}

pub struct Context<'a> {
    pub kind: ActionKind,
    pub scheme: &'a Scheme,
    pub session: &'a SessionInfo,
    /// View names on the path, bottom first.
    pub path_names: &'a [String],
    pub pargv: Option<&'a Pargv>,
    pub parent_pargv: Option<&'a Pargv>,
    /// Entry owning the running action.
    pub entry: Option<EntryId>,
    /// The running action's script payload.
    pub script: Option<String>,
    pub dry_run: bool,
    /// Captured stdout/stderr of the current action. The stage runner
    /// flushes these into the stage stdio after each action.
    pub out: Vec<u8>,
    pub err: Vec<u8>,
    pub stdio: Option<&'a StageStdio>,
    pub nav: Vec<NavOp>,
}

impl<'a> Context<'a> {
    pub fn script(&self) -> &str {
        self.script.as_deref().unwrap_or("")
    }

    /// The candidate parg under validation, seen through the parent pargv.
    pub fn candidate(&self) -> Option<&Parg> {
        self.parent_pargv.and_then(|p| p.candidate.as_ref())
    }

    pub fn candidate_entry(&self) -> Option<EntryId> {
        self.candidate().map(|p| p.entry)
    }

    pub fn candidate_value(&self) -> Option<&str> {
        self.candidate().and_then(|p| p.value.as_deref())
    }

    pub fn print(&mut self, text: &str) {
        self.out.extend_from_slice(text.as_bytes());
    }

    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.out.push(b'\n');
    }

    pub fn eprintln(&mut self, text: &str) {
        self.err.extend_from_slice(text.as_bytes());
        self.err.push(b'\n');
    }

    /// Environment a sym must export to any process it spawns.
    pub fn env(&self) -> std::collections::BTreeMap<String, String> {
        crate::env::action_env(self)
    }
}
