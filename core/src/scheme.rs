//! The live scheme: an arena of entries plus the root list.
//!
//! All field reads go through accessors here so link entries transparently
//! forward to their targets. The scheme is immutable after load; the daemon
//! shares it behind an `Arc` and swaps the whole thing on reload.

use crate::action::Action;
use crate::action::ActionIo;
use crate::entry::Entry;
use crate::entry::EntryId;
use crate::entry::EntryMode;
use crate::entry::EntryPurpose;
use crate::entry::Filter;
use crate::entry::Hotkey;

#[derive(Debug, Default)]
pub struct Scheme {
    pub(crate) arena: Vec<Entry>,
    pub(crate) roots: Vec<EntryId>,
}

impl Scheme {
    pub(crate) fn node(&self, id: EntryId) -> &Entry {
        &self.arena[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.arena[id.0]
    }

    /// Follow link forwarding to the owned entry. Cycle-free after load.
    pub fn resolve(&self, id: EntryId) -> EntryId {
        let mut cur = id;
        while let Some(shell) = &self.node(cur).link {
            match shell.target {
                Some(t) => cur = t,
                None => break,
            }
        }
        cur
    }

    /// Top-level entries (views and ptypes) in registration order.
    pub fn roots(&self) -> &[EntryId] {
        &self.roots
    }

    pub fn find_root(&self, name: &str) -> Option<EntryId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    /// Resolve a `/`-separated reference path from the scheme root.
    pub fn find_by_path(&self, path: &str) -> Option<EntryId> {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let first = components.next()?;
        let mut cur = self.find_root(first)?;
        for component in components {
            cur = self.find_child(cur, component)?;
        }
        Some(cur)
    }

    /// Find a direct child by its own name (links are matched by their own
    /// shell name, not the target's).
    pub fn find_child(&self, parent: EntryId, name: &str) -> Option<EntryId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    // Field accessors. `name` is always the entry's own; the attributes a
    // link may override come from the shell when set; everything else is
    // the target's.

    pub fn name(&self, id: EntryId) -> &str {
        &self.node(id).name
    }

    pub fn help(&self, id: EntryId) -> Option<&str> {
        let node = self.node(id);
        if let Some(shell) = &node.link {
            if let Some(help) = &shell.help {
                return Some(help);
            }
            return self.help(self.resolve(id));
        }
        node.help.as_deref()
    }

    pub fn min(&self, id: EntryId) -> usize {
        let node = self.node(id);
        match &node.link {
            Some(shell) => shell.min.unwrap_or_else(|| self.min(self.resolve(id))),
            None => node.min,
        }
    }

    /// Effective max: the stored 0 means unbounded.
    pub fn max(&self, id: EntryId) -> usize {
        let node = self.node(id);
        let raw = match &node.link {
            Some(shell) => shell
                .max
                .unwrap_or_else(|| self.raw_max(self.resolve(id))),
            None => node.max,
        };
        if raw == 0 { usize::MAX } else { raw }
    }

    fn raw_max(&self, id: EntryId) -> usize {
        self.node(self.resolve(id)).max
    }

    pub fn value(&self, id: EntryId) -> Option<&str> {
        let node = self.node(id);
        if let Some(shell) = &node.link {
            if let Some(value) = &shell.value {
                return Some(value);
            }
            return self.value(self.resolve(id));
        }
        node.value.as_deref()
    }

    pub fn restore(&self, id: EntryId) -> bool {
        let node = self.node(id);
        match &node.link {
            Some(shell) => shell
                .restore
                .unwrap_or_else(|| self.restore(self.resolve(id))),
            None => node.restore,
        }
    }

    pub fn order(&self, id: EntryId) -> bool {
        let node = self.node(id);
        match &node.link {
            Some(shell) => shell.order.unwrap_or_else(|| self.order(self.resolve(id))),
            None => node.order,
        }
    }

    pub fn container(&self, id: EntryId) -> bool {
        self.node(self.resolve(id)).container
    }

    pub fn mode(&self, id: EntryId) -> EntryMode {
        self.node(self.resolve(id)).mode
    }

    pub fn purpose(&self, id: EntryId) -> EntryPurpose {
        self.node(self.resolve(id)).purpose
    }

    pub fn filter(&self, id: EntryId) -> Filter {
        self.node(self.resolve(id)).filter
    }

    pub fn interactive(&self, id: EntryId) -> bool {
        self.node(self.resolve(id)).interactive
    }

    pub fn actions(&self, id: EntryId) -> &[Action] {
        &self.node(self.resolve(id)).actions
    }

    pub fn hotkeys(&self, id: EntryId) -> &[Hotkey] {
        &self.node(self.resolve(id)).hotkeys
    }

    pub fn children(&self, id: EntryId) -> &[EntryId] {
        &self.node(self.resolve(id)).children
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.node(id).parent
    }

    /// O(1) lookup of the nested child carrying a special purpose.
    pub fn purpose_child(&self, id: EntryId, purpose: EntryPurpose) -> Option<EntryId> {
        self.node(self.resolve(id)).nested_by_purpose[purpose.slot()]
    }

    /// Aggregate `in` demand over the entry's actions (false < true < tty).
    pub fn io_in(&self, id: EntryId) -> ActionIo {
        self.actions(id)
            .iter()
            .map(|a| a.input)
            .max_by_key(|io| *io as u8)
            .unwrap_or(ActionIo::False)
    }

    /// Aggregate `out` demand over the entry's actions.
    pub fn io_out(&self, id: EntryId) -> ActionIo {
        self.actions(id)
            .iter()
            .map(|a| a.output)
            .max_by_key(|io| *io as u8)
            .unwrap_or(ActionIo::False)
    }

    /// First-set of literal tokens an entry can consume, used by help when
    /// no generator action is available: the entry's `value` falls back to
    /// its name.
    pub fn token_text(&self, id: EntryId) -> &str {
        self.value(id).unwrap_or_else(|| self.name(id))
    }
}
