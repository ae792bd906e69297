//! Action attached to an entry: a symbol reference plus execution
//! modifiers.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionIo {
    #[default]
    False,
    True,
    Tty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecOn {
    Fail,
    #[default]
    Success,
    Always,
    Never,
}

/// Three-valued flag: unset falls back to the engine default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriFlag {
    #[default]
    Undefined,
    True,
    False,
}

impl TriFlag {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Self::Undefined => default,
            Self::True => true,
            Self::False => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    /// Logical symbol name, optionally suffixed `@plugin`.
    pub sym_ref: String,
    /// Text payload handed to the symbol at invocation.
    pub script: Option<String>,
    /// Named lock taken for the duration of the action.
    pub lock: Option<String>,
    pub interrupt: bool,
    pub input: ActionIo,
    pub output: ActionIo,
    pub exec_on: ExecOn,
    pub update_retcode: bool,
    /// Run even in dry-run mode when resolved true.
    pub permanent: TriFlag,
    pub sync: TriFlag,
}

impl Action {
    pub fn new(sym_ref: &str) -> Self {
        Self {
            sym_ref: sym_ref.to_string(),
            script: None,
            lock: None,
            interrupt: false,
            input: ActionIo::False,
            output: ActionIo::True,
            exec_on: ExecOn::Success,
            update_retcode: true,
            permanent: TriFlag::Undefined,
            sync: TriFlag::Undefined,
        }
    }

    /// Should this action run given the running retcode so far?
    pub fn meets_exec_on(&self, running_retcode: i32) -> bool {
        match self.exec_on {
            ExecOn::Always => true,
            ExecOn::Never => false,
            ExecOn::Success => running_retcode == 0,
            ExecOn::Fail => running_retcode != 0,
        }
    }
}
