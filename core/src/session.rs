//! Per-session state: the view path plus the user's identity and terminal
//! geometry.

use crate::entry::EntryId;
use crate::error::KlishError;
use crate::error::Result;
use crate::scheme::Scheme;

/// Identity and terminal facts, cheap to clone into action contexts.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub uid: u32,
    pub user: String,
    pub pid: u32,
    pub term_width: u16,
    pub term_height: u16,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            uid: 0,
            user: "unknown".to_string(),
            pid: std::process::id(),
            term_width: 80,
            term_height: 25,
        }
    }
}

/// Stack of view levels; the bottom is the daemon's start view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    levels: Vec<EntryId>,
}

impl Path {
    pub fn push(&mut self, view: EntryId) {
        self.levels.push(view);
    }

    /// Pop one level; the bottom level never pops.
    pub fn pop(&mut self) -> bool {
        if self.levels.len() > 1 {
            self.levels.pop();
            true
        } else {
            false
        }
    }

    pub fn truncate(&mut self, len: usize) {
        if len >= 1 {
            self.levels.truncate(len);
        }
    }

    pub fn current(&self) -> Option<EntryId> {
        self.levels.last().copied()
    }

    pub fn levels(&self) -> &[EntryId] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Deepest-first iteration, the order the parser and the prompt
    /// generator walk.
    pub fn iter_deepest_first(&self) -> impl Iterator<Item = (usize, EntryId)> + '_ {
        self.levels
            .iter()
            .copied()
            .enumerate()
            .rev()
    }
}

#[derive(Debug)]
pub struct Session {
    pub info: SessionInfo,
    pub path: Path,
    /// Set by actions (e.g. `nav` with `exit`) to finish the session.
    pub done: bool,
}

impl Session {
    /// Apply navigation requests recorded by actions. Unknown views were
    /// already rejected by the `nav` sym, but a stale request after a
    /// scheme reload degrades to a no-op.
    pub fn apply_nav(&mut self, scheme: &Scheme, ops: &[crate::context::NavOp]) {
        use crate::context::NavOp;
        for op in ops {
            match op {
                NavOp::Push(view) => {
                    if let Some(id) = scheme.find_root(view) {
                        self.path.push(id);
                    }
                }
                NavOp::Pop(n) => {
                    for _ in 0..*n {
                        if !self.path.pop() {
                            break;
                        }
                    }
                }
                NavOp::Top => self.path.truncate(1),
                NavOp::Exit => self.done = true,
            }
        }
    }

    /// A command with `restore=true` truncates the path to the level it
    /// was found at before its actions run.
    pub fn apply_restore(&mut self, scheme: &Scheme, pargv: &crate::pargv::Pargv) {
        let Some(cmd) = pargv.command else {
            return;
        };
        if scheme.restore(cmd) && pargv.level > 0 {
            self.path.truncate(pargv.level);
        }
    }

    pub fn new(scheme: &Scheme, start_view: &str, info: SessionInfo) -> Result<Self> {
        let view = scheme
            .find_root(start_view)
            .ok_or_else(|| KlishError::UnknownView(start_view.to_string()))?;
        let mut path = Path::default();
        path.push(view);
        Ok(Self {
            info,
            path,
            done: false,
        })
    }
}
